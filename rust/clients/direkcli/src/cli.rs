use crate::output::OutputFormat;
use clap::{Parser, Subcommand};
use direktiv_api::dispatcher::DIREKTIV_SUBJECT_DEFAULT;
use direktiv_api::types::{LOGS_LIMIT_DEFAULT, LOGS_OFFSET_DEFAULT};
use nats_utils::types::{NatsClientBuilder, NatsRemoteArgs, RequestArgs, RequestPolicy};
use std::path::PathBuf;
use std::time::Duration;

/// Clap Derive structs that make up the command line. Every resource command is sent to the
/// Direktiv service over NATS; `ping` only checks the connection.
#[derive(Parser, Clone, Debug)]
#[command(
    name = "direkcli",
    version,
    about,
    long_about = "Command line interface for managing namespaces, workflows, instances, secrets and registries on Direktiv"
)]
pub struct Root {
    #[clap(flatten)]
    pub nats_remote_args: NatsRemoteArgs,

    #[clap(flatten)]
    pub request_args: RequestArgs,

    #[arg(
        long,
        env = "DIREKTIV_SUBJECT",
        default_value = DIREKTIV_SUBJECT_DEFAULT,
        help = "subject the Direktiv service listens on for commands"
    )]
    pub subject: String,

    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub scope: CommandScopes,
}

impl Root {
    pub fn policy(&self) -> RequestPolicy {
        RequestPolicy::from(&self.request_args)
    }

    pub fn client_builder(&self) -> NatsClientBuilder {
        NatsClientBuilder {
            nats_remote_args: self.nats_remote_args.clone(),
            connect_timeout: Some(Duration::from_secs(self.request_args.connect_timeout_secs)),
            policy: self.policy(),
            ..Default::default()
        }
    }
}

#[derive(Subcommand, Clone, Debug)]
pub enum CommandScopes {
    /// Check the connection to the NATS server.
    Ping {},

    #[command(flatten)]
    Resource(ResourceCommands),
}

#[derive(Subcommand, Clone, Debug)]
pub enum ResourceCommands {
    /// List, create and delete namespaces.
    Namespaces {
        #[command(subcommand)]
        command: NamespaceCommands,
    },
    /// List, add, get and execute workflows.
    Workflows {
        #[command(subcommand)]
        command: WorkflowCommands,
    },
    /// List, get and retrieve logs for workflow instances.
    Instances {
        #[command(subcommand)]
        command: InstanceCommands,
    },
    /// List, create and delete secrets of a namespace.
    Secrets {
        #[command(subcommand)]
        command: SecretCommands,
    },
    /// List, create and delete container registries of a namespace.
    Registries {
        #[command(subcommand)]
        command: RegistryCommands,
    },
}

#[derive(Subcommand, Clone, Debug)]
pub enum NamespaceCommands {
    /// Returns a list of namespaces.
    List,
    /// Creates a new namespace.
    Create { name: String },
    /// Deletes a namespace.
    Delete { name: String },
    /// Sends a cloud event read from a file to a namespace.
    SendEvent { namespace: String, event: PathBuf },
}

#[derive(Subcommand, Clone, Debug)]
pub enum WorkflowCommands {
    /// Lists all workflows under a namespace.
    List { namespace: String },
    /// Prints the yaml of a workflow.
    Get { namespace: String, id: String },
    /// Adds a new workflow from a yaml file.
    Add { namespace: String, workflow: PathBuf },
    /// Replaces an existing workflow with the content of a yaml file.
    Update {
        namespace: String,
        id: String,
        workflow: PathBuf,
    },
    /// Deletes an existing workflow.
    Delete { namespace: String, id: String },
    /// Executes the workflow with the given id.
    Execute {
        namespace: String,
        id: String,
        /// File with the json input of the instance.
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Enables a disabled workflow, disables an enabled one.
    Toggle { namespace: String, id: String },
}

#[derive(Subcommand, Clone, Debug)]
pub enum InstanceCommands {
    /// Lists all workflow instances of a namespace.
    List { namespace: String },
    /// Shows details about a workflow instance.
    Get { id: String },
    /// Prints the logs of a workflow instance.
    Logs {
        id: String,
        #[arg(long, default_value_t = LOGS_OFFSET_DEFAULT)]
        offset: i32,
        #[arg(long, default_value_t = LOGS_LIMIT_DEFAULT)]
        limit: i32,
    },
}

#[derive(Subcommand, Clone, Debug)]
pub enum SecretCommands {
    /// Lists the secrets of a namespace.
    List { namespace: String },
    /// Stores a secret in a namespace.
    Create {
        namespace: String,
        name: String,
        value: String,
    },
    /// Removes a secret from a namespace.
    Delete { namespace: String, name: String },
}

#[derive(Subcommand, Clone, Debug)]
pub enum RegistryCommands {
    /// Lists the registries of a namespace.
    List { namespace: String },
    /// Stores the credentials of a registry in a namespace.
    Create {
        namespace: String,
        /// Registry url, e.g. `https://index.docker.io`.
        name: String,
        /// Credentials in the form `user:token`.
        value: String,
    },
    /// Removes a registry from a namespace.
    Delete { namespace: String, name: String },
}
