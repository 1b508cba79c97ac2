use crate::cli::RegistryCommands;
use crate::errors::CliResult;
use crate::output::{InNamespace, OutputFormat};
use direktiv_api::dispatcher::CommandDispatcher;
use direktiv_api::types::{RegistryDelete, RegistryList, RegistryStore};
use nats_utils::request_client::RequestBus;
use std::io::Write;

pub(crate) async fn run<B, W>(
    dispatcher: &CommandDispatcher<B>,
    command: RegistryCommands,
    out: &mut W,
    format: OutputFormat,
) -> CliResult<()>
where
    B: RequestBus,
    W: Write,
{
    match command {
        RegistryCommands::List { namespace } => {
            let registries = dispatcher
                .call(RegistryList {
                    namespace: namespace.clone(),
                })
                .await?;
            format.write(
                out,
                &InNamespace {
                    namespace: &namespace,
                    value: &registries,
                },
            )
        }
        RegistryCommands::Create {
            namespace,
            name,
            value,
        } => {
            let ack = dispatcher
                .call(RegistryStore {
                    namespace,
                    name: name.clone(),
                    data: value.into_bytes(),
                })
                .await?;
            format.write_outcome(out, &ack, &format!("Successfully created registry '{name}'."))
        }
        RegistryCommands::Delete { namespace, name } => {
            let ack = dispatcher
                .call(RegistryDelete {
                    namespace,
                    name: name.clone(),
                })
                .await?;
            format.write_outcome(out, &ack, &format!("Successfully removed registry '{name}'."))
        }
    }
}
