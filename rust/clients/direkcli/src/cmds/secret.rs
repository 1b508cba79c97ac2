use crate::cli::SecretCommands;
use crate::errors::CliResult;
use crate::output::{InNamespace, OutputFormat};
use direktiv_api::dispatcher::CommandDispatcher;
use direktiv_api::types::{SecretDelete, SecretList, SecretStore};
use nats_utils::request_client::RequestBus;
use std::io::Write;

pub(crate) async fn run<B, W>(
    dispatcher: &CommandDispatcher<B>,
    command: SecretCommands,
    out: &mut W,
    format: OutputFormat,
) -> CliResult<()>
where
    B: RequestBus,
    W: Write,
{
    match command {
        SecretCommands::List { namespace } => {
            let secrets = dispatcher
                .call(SecretList {
                    namespace: namespace.clone(),
                })
                .await?;
            format.write(
                out,
                &InNamespace {
                    namespace: &namespace,
                    value: &secrets,
                },
            )
        }
        SecretCommands::Create {
            namespace,
            name,
            value,
        } => {
            let ack = dispatcher
                .call(SecretStore {
                    namespace,
                    name: name.clone(),
                    data: value.into_bytes(),
                })
                .await?;
            format.write_outcome(out, &ack, &format!("Successfully created secret '{name}'."))
        }
        SecretCommands::Delete { namespace, name } => {
            let ack = dispatcher
                .call(SecretDelete {
                    namespace,
                    name: name.clone(),
                })
                .await?;
            format.write_outcome(out, &ack, &format!("Successfully removed secret '{name}'."))
        }
    }
}
