use crate::cli::InstanceCommands;
use crate::errors::CliResult;
use crate::output::{InNamespace, OutputFormat};
use direktiv_api::dispatcher::CommandDispatcher;
use direktiv_api::types::{InstanceGet, InstanceList, InstanceLogsQuery};
use nats_utils::request_client::RequestBus;
use std::io::Write;

pub(crate) async fn run<B, W>(
    dispatcher: &CommandDispatcher<B>,
    command: InstanceCommands,
    out: &mut W,
    format: OutputFormat,
) -> CliResult<()>
where
    B: RequestBus,
    W: Write,
{
    match command {
        InstanceCommands::List { namespace } => {
            let instances = dispatcher
                .call(InstanceList {
                    namespace: namespace.clone(),
                })
                .await?;
            format.write(
                out,
                &InNamespace {
                    namespace: &namespace,
                    value: &instances,
                },
            )
        }
        InstanceCommands::Get { id } => {
            let instance = dispatcher.call(InstanceGet { id }).await?;
            format.write(out, &instance)
        }
        InstanceCommands::Logs { id, offset, limit } => {
            let logs = dispatcher
                .call(InstanceLogsQuery { id, offset, limit })
                .await?;
            format.write(out, &logs)
        }
    }
}
