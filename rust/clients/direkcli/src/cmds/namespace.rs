use super::read_file;
use crate::cli::NamespaceCommands;
use crate::errors::CliResult;
use crate::output::OutputFormat;
use direktiv_api::dispatcher::CommandDispatcher;
use direktiv_api::types::{NamespaceCreate, NamespaceDelete, NamespaceList, NamespaceSendEvent};
use nats_utils::request_client::RequestBus;
use std::io::Write;

pub(crate) async fn run<B, W>(
    dispatcher: &CommandDispatcher<B>,
    command: NamespaceCommands,
    out: &mut W,
    format: OutputFormat,
) -> CliResult<()>
where
    B: RequestBus,
    W: Write,
{
    match command {
        NamespaceCommands::List => {
            let namespaces = dispatcher.call(NamespaceList {}).await?;
            format.write(out, &namespaces)
        }
        NamespaceCommands::Create { name } => {
            let namespace = dispatcher.call(NamespaceCreate { name }).await?;
            let message = format!("Created namespace: {}", namespace.name);
            format.write_outcome(out, &namespace, &message)
        }
        NamespaceCommands::Delete { name } => {
            let namespace = dispatcher.call(NamespaceDelete { name }).await?;
            let message = format!("Deleted namespace: {}", namespace.name);
            format.write_outcome(out, &namespace, &message)
        }
        NamespaceCommands::SendEvent { namespace, event } => {
            let cloudevent = read_file(&event)?;
            let ack = dispatcher
                .call(NamespaceSendEvent {
                    namespace: namespace.clone(),
                    cloudevent,
                })
                .await?;
            let message = format!("Successfully sent event to '{namespace}'");
            format.write_outcome(out, &ack, &message)
        }
    }
}
