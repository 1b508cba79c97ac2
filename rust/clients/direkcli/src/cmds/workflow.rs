use super::read_file;
use crate::cli::WorkflowCommands;
use crate::errors::CliResult;
use crate::output::{InNamespace, OutputFormat};
use direktiv_api::dispatcher::CommandDispatcher;
use direktiv_api::types::{
    WorkflowAdd, WorkflowDelete, WorkflowGet, WorkflowInvoke, WorkflowList, WorkflowUpdate,
};
use nats_utils::request_client::RequestBus;
use std::io::Write;

pub(crate) async fn run<B, W>(
    dispatcher: &CommandDispatcher<B>,
    command: WorkflowCommands,
    out: &mut W,
    format: OutputFormat,
) -> CliResult<()>
where
    B: RequestBus,
    W: Write,
{
    match command {
        WorkflowCommands::List { namespace } => {
            let workflows = dispatcher
                .call(WorkflowList {
                    namespace: namespace.clone(),
                })
                .await?;
            format.write(
                out,
                &InNamespace {
                    namespace: &namespace,
                    value: &workflows,
                },
            )
        }
        WorkflowCommands::Get { namespace, id } => {
            let workflow = dispatcher.call(WorkflowGet { namespace, id }).await?;
            format.write(out, &workflow)
        }
        WorkflowCommands::Add {
            namespace,
            workflow,
        } => {
            let workflow = read_file(&workflow)?;
            let created = dispatcher.call(WorkflowAdd { namespace, workflow }).await?;
            let message = format!("Created workflow '{}'", created.id);
            format.write_outcome(out, &created, &message)
        }
        WorkflowCommands::Update {
            namespace,
            id,
            workflow,
        } => {
            let workflow = read_file(&workflow)?;
            let updated = dispatcher
                .call(WorkflowUpdate {
                    namespace,
                    id,
                    workflow,
                    active: None,
                })
                .await?;
            let message = format!("Successfully updated '{}'", updated.id);
            format.write_outcome(out, &updated, &message)
        }
        WorkflowCommands::Delete { namespace, id } => {
            let deleted = dispatcher.call(WorkflowDelete { namespace, id }).await?;
            let message = format!("Deleted workflow '{}'", deleted.id);
            format.write_outcome(out, &deleted, &message)
        }
        WorkflowCommands::Execute {
            namespace,
            id,
            input,
        } => {
            let input = input.as_deref().map(read_file).transpose()?;
            let invocation = dispatcher
                .call(WorkflowInvoke {
                    namespace,
                    id,
                    input,
                })
                .await?;
            let message = format!(
                "Successfully invoked, Instance ID: {}",
                invocation.instance_id
            );
            format.write_outcome(out, &invocation, &message)
        }
        WorkflowCommands::Toggle { namespace, id } => {
            // resend the current definition with `active` flipped
            let current = dispatcher
                .call(WorkflowGet {
                    namespace: namespace.clone(),
                    id: id.clone(),
                })
                .await?;
            let active = !current.active;
            let updated = dispatcher
                .call(WorkflowUpdate {
                    namespace,
                    id: id.clone(),
                    workflow: current.workflow,
                    active: Some(active),
                })
                .await?;

            let message = match active {
                true => format!("Enabled workflow '{id}'"),
                false => format!("Disabled workflow '{id}'"),
            };
            format.write_outcome(out, &updated, &message)
        }
    }
}
