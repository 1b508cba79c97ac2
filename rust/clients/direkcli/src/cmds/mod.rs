pub mod instance;
pub mod namespace;
pub mod registry;
pub mod secret;
pub mod workflow;

use crate::cli::{CommandScopes, ResourceCommands, Root};
use crate::errors::{CliError, CliResult};
use crate::output::{OutputFormat, TableDisplay};
use direktiv_api::dispatcher::CommandDispatcher;
use nats_utils::nats_client::NatsClient;
use nats_utils::request_client::{CorrelatedRequester, RequestBus, Session};
use nats_utils::types::RequestPolicy;
use serde::Serialize;
use std::future::Future;
use std::io::Write;
use std::path::Path;

const CLIENT_NAME: &str = "direkcli";

/// Opens the NATS session, runs one command on it and closes the session again,
/// whether the command succeeded or not.
pub(crate) async fn run(root: Root) -> CliResult<()> {
    let endpoint = root.nats_remote_args.nats_url.to_string();
    let policy = root.policy();
    let client = NatsClient::new(root.client_builder()).await?;

    let mut out = std::io::stdout();
    match root.scope {
        CommandScopes::Ping {} => {
            let work = ping(&client, &endpoint, &mut out, root.output);
            in_session(&client, work).await
        }
        CommandScopes::Resource(command) => {
            run_resource(client, policy, &root.subject, command, &mut out, root.output).await
        }
    }
}

/// Sends a resource command over `session` and closes the session afterwards.
pub(crate) async fn run_resource<S, W>(
    session: S,
    policy: RequestPolicy,
    subject: &str,
    command: ResourceCommands,
    out: &mut W,
    format: OutputFormat,
) -> CliResult<()>
where
    S: Session + Clone,
    W: Write,
{
    let requester = CorrelatedRequester::new(session.clone(), policy, CLIENT_NAME);
    let dispatcher = CommandDispatcher::new(requester, subject, CLIENT_NAME);
    in_session(&session, execute(&dispatcher, command, out, format)).await
}

/// Awaits `work`, then closes `session` no matter how `work` ended.
pub(crate) async fn in_session<S, F, T>(session: &S, work: F) -> CliResult<T>
where
    S: Session,
    F: Future<Output = CliResult<T>>,
{
    let result = work.await;
    if let Err(e) = session.close_session().await {
        log::warn!("Failed to close the NATS session: {e}");
    }
    result
}

/// Runs a resource command through `dispatcher` and writes its result to `out`.
pub(crate) async fn execute<B, W>(
    dispatcher: &CommandDispatcher<B>,
    command: ResourceCommands,
    out: &mut W,
    format: OutputFormat,
) -> CliResult<()>
where
    B: RequestBus,
    W: Write,
{
    match command {
        ResourceCommands::Namespaces { command } => {
            namespace::run(dispatcher, command, out, format).await
        }
        ResourceCommands::Workflows { command } => {
            workflow::run(dispatcher, command, out, format).await
        }
        ResourceCommands::Instances { command } => {
            instance::run(dispatcher, command, out, format).await
        }
        ResourceCommands::Secrets { command } => secret::run(dispatcher, command, out, format).await,
        ResourceCommands::Registries { command } => {
            registry::run(dispatcher, command, out, format).await
        }
    }
}

#[derive(Debug, Serialize)]
struct SessionInfo {
    endpoint: String,
    server_name: String,
    version: String,
    state: String,
}

impl TableDisplay for SessionInfo {
    fn write_table<W: Write>(&self, writer: &mut W) -> CliResult<()> {
        writeln!(
            writer,
            "{} to {} at {} (NATS {})",
            self.state, self.server_name, self.endpoint, self.version
        )?;
        Ok(())
    }
}

async fn ping<W: Write>(
    client: &NatsClient,
    endpoint: &str,
    out: &mut W,
    format: OutputFormat,
) -> CliResult<()> {
    let state = client
        .check_connection()
        .await
        .map_err(|e| CliError::Connection(e.to_string()))?;
    log::info!("Connection check result: {state}");

    let server = client.get_server_info();
    format.write(
        out,
        &SessionInfo {
            endpoint: endpoint.to_string(),
            server_name: server.server_name,
            version: server.version,
            state: state.to_string(),
        },
    )
}

pub(crate) fn read_file(path: &Path) -> CliResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| CliError::read_file(path, e))
}
