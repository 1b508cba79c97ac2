use nats_utils::envelope::{Envelope, EnvelopeError, ErrorPayload, KIND_OK};
use nats_utils::types::TransportError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};
use std::str::FromStr;
use strum_macros::{AsRefStr, EnumIter, EnumString, IntoStaticStr};
use thiserror::Error;

pub const LOGS_OFFSET_DEFAULT: i32 = 0;
pub const LOGS_LIMIT_DEFAULT: i32 = 10000;

fn logs_limit_default() -> i32 {
    LOGS_LIMIT_DEFAULT
}

// ==================== Commands ====================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NamespaceCreate {
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NamespaceDelete {
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct NamespaceList {}

/// Broadcasts a cloud event into a namespace.
#[serde_as]
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NamespaceSendEvent {
    pub namespace: String,
    #[serde_as(as = "Base64")]
    pub cloudevent: Vec<u8>,
}

#[serde_as]
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct WorkflowAdd {
    pub namespace: String,
    #[serde_as(as = "Base64")]
    pub workflow: Vec<u8>,
}

/// Replaces the definition of a workflow. `active` is left untouched when absent.
#[serde_as]
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct WorkflowUpdate {
    pub namespace: String,
    pub id: String,
    #[serde_as(as = "Base64")]
    pub workflow: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct WorkflowDelete {
    pub namespace: String,
    pub id: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct WorkflowGet {
    pub namespace: String,
    pub id: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct WorkflowList {
    pub namespace: String,
}

#[serde_as]
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct WorkflowInvoke {
    pub namespace: String,
    pub id: String,
    #[serde_as(as = "Option<Base64>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Vec<u8>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct InstanceGet {
    pub id: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct InstanceList {
    pub namespace: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct InstanceLogsQuery {
    pub id: String,
    #[serde(default)]
    pub offset: i32,
    #[serde(default = "logs_limit_default")]
    pub limit: i32,
}

impl InstanceLogsQuery {
    /// Queries the whole log of an instance, up to the default limit.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            offset: LOGS_OFFSET_DEFAULT,
            limit: LOGS_LIMIT_DEFAULT,
        }
    }
}

#[serde_as]
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SecretStore {
    pub namespace: String,
    pub name: String,
    #[serde_as(as = "Base64")]
    pub data: Vec<u8>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SecretDelete {
    pub namespace: String,
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SecretList {
    pub namespace: String,
}

#[serde_as]
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RegistryStore {
    pub namespace: String,
    pub name: String,
    #[serde_as(as = "Base64")]
    pub data: Vec<u8>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RegistryDelete {
    pub namespace: String,
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RegistryList {
    pub namespace: String,
}

// ==================== Replies ====================

/// Success without a meaningful body. Whatever the service sends along is ignored.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub struct Ack;

impl From<serde_json::Value> for Ack {
    fn from(_: serde_json::Value) -> Self {
        Ack
    }
}

impl From<Ack> for serde_json::Value {
    fn from(_: Ack) -> Self {
        serde_json::json!({})
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Namespace {
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Namespaces {
    #[serde(default)]
    pub namespaces: Vec<Namespace>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct WorkflowRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

#[serde_as]
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Workflow {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde_as(as = "Base64")]
    pub workflow: Vec<u8>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct WorkflowSummary {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Workflows {
    #[serde(default)]
    pub workflows: Vec<WorkflowSummary>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub instance_id: String,
}

#[serde_as]
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Instance {
    pub id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoked_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub begin_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde_as(as = "Base64")]
    #[serde(default)]
    pub input: Vec<u8>,
    #[serde_as(as = "Base64")]
    #[serde(default)]
    pub output: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct InstanceSummary {
    pub id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub begin_time: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Instances {
    #[serde(default)]
    pub instances: Vec<InstanceSummary>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub message: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct InstanceLogs {
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Secret {
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Secrets {
    #[serde(default)]
    pub secrets: Vec<Secret>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Registry {
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Registries {
    #[serde(default)]
    pub registries: Vec<Registry>,
}

// ==================== Errors ====================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Payload of '{kind}' does not match the expected shape: {reason}")]
    SchemaMismatch { kind: String, reason: String },

    #[error("Request timed out: no reply on '{subject}' after {attempts} attempt(s)")]
    TransportTimeout { subject: String, attempts: u32 },

    #[error("Transport failure towards '{endpoint}': {reason}")]
    Transport { endpoint: String, reason: String },

    #[error("{message}")]
    Remote { message: String },

    #[error("Unexpected reply '{received}' to '{command}', expected '{expected}'")]
    UnexpectedReply {
        command: String,
        expected: String,
        received: String,
    },
}

impl CommandError {
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
        }
    }

    pub fn is_malformed_envelope(&self) -> bool {
        matches!(self, Self::MalformedEnvelope(_))
    }

    pub fn is_schema_mismatch(&self) -> bool {
        matches!(self, Self::SchemaMismatch { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TransportTimeout { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }

    pub fn is_unexpected_reply(&self) -> bool {
        matches!(self, Self::UnexpectedReply { .. })
    }
}

impl From<EnvelopeError> for CommandError {
    fn from(e: EnvelopeError) -> Self {
        match e {
            EnvelopeError::Malformed(reason) => Self::MalformedEnvelope(reason),
            EnvelopeError::SchemaMismatch { kind, reason } => Self::SchemaMismatch { kind, reason },
        }
    }
}

impl From<TransportError> for CommandError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Timeout { subject, attempts } => {
                Self::TransportTimeout { subject, attempts }
            }
            TransportError::Connection { endpoint, reason } => Self::Transport { endpoint, reason },
        }
    }
}

pub type CommandResult<T> = Result<T, CommandError>;

// ==================== Command set ====================

/// Which tag a successful reply to a command carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyTag {
    /// The reserved `ok` tag, used by mutations.
    Ok,
    /// The command's own tag, used by queries.
    Own,
}

/// A typed request together with the shape of its successful reply.
pub trait DirektivCommand: Serialize + DeserializeOwned + Into<Command> {
    const KIND: CommandKind;
    type Response: Serialize + DeserializeOwned;
}

macro_rules! direktiv_commands {
    ($( $kind:ident($command:ident) -> $response:ty, $reply:ident; )*) => {
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, AsRefStr, strum_macros::Display, EnumString,
            EnumIter, IntoStaticStr,
        )]
        #[strum(serialize_all = "snake_case")]
        pub enum CommandKind {
            $( $kind, )*
        }

        impl CommandKind {
            /// The wire `type` tag of the command.
            pub fn tag(self) -> &'static str {
                self.into()
            }

            pub fn reply_tag(self) -> &'static str {
                let reply = match self {
                    $( Self::$kind => ReplyTag::$reply, )*
                };
                match reply {
                    ReplyTag::Ok => KIND_OK,
                    ReplyTag::Own => self.tag(),
                }
            }
        }

        /// Every command the service understands.
        #[derive(Clone, Debug, PartialEq)]
        pub enum Command {
            $( $kind($command), )*
        }

        impl Command {
            pub fn kind(&self) -> CommandKind {
                match self {
                    $( Self::$kind(_) => CommandKind::$kind, )*
                }
            }

            pub fn to_envelope(&self, id: &str) -> Result<Envelope, EnvelopeError> {
                let kind = self.kind().tag();
                match self {
                    $( Self::$kind(command) => Envelope::new(id, kind, command), )*
                }
            }

            /// Reads a request envelope back into the command its `type` tag names.
            pub fn from_envelope(envelope: &Envelope) -> Result<Self, EnvelopeError> {
                let kind = CommandKind::from_str(&envelope.kind).map_err(|_| {
                    EnvelopeError::SchemaMismatch {
                        kind: envelope.kind.clone(),
                        reason: "unknown command".to_string(),
                    }
                })?;

                Ok(match kind {
                    $( CommandKind::$kind => Self::$kind(envelope.decode_payload()?), )*
                })
            }
        }

        /// The successful reply to any command.
        #[derive(Clone, Debug, PartialEq)]
        pub enum Reply {
            $( $kind($response), )*
        }

        impl Reply {
            pub fn kind(&self) -> CommandKind {
                match self {
                    $( Self::$kind(_) => CommandKind::$kind, )*
                }
            }

            pub fn to_envelope(&self, id: &str) -> Result<Envelope, EnvelopeError> {
                let tag = self.kind().reply_tag();
                match self {
                    $( Self::$kind(response) => Envelope::new(id, tag, response), )*
                }
            }

            /// Decodes the reply to a command of the given kind.
            pub fn from_envelope(command: CommandKind, envelope: &Envelope) -> CommandResult<Self> {
                expect_reply(command, envelope)?;
                Ok(match command {
                    $( CommandKind::$kind => Self::$kind(envelope.decode_payload()?), )*
                })
            }
        }

        $(
            impl DirektivCommand for $command {
                const KIND: CommandKind = CommandKind::$kind;
                type Response = $response;
            }

            impl From<$command> for Command {
                fn from(command: $command) -> Self {
                    Self::$kind(command)
                }
            }
        )*
    };
}

direktiv_commands! {
    NamespaceCreate(NamespaceCreate) -> Namespace, Ok;
    NamespaceDelete(NamespaceDelete) -> Namespace, Ok;
    NamespaceList(NamespaceList) -> Namespaces, Own;
    NamespaceSendEvent(NamespaceSendEvent) -> Ack, Ok;
    WorkflowAdd(WorkflowAdd) -> WorkflowRef, Ok;
    WorkflowUpdate(WorkflowUpdate) -> WorkflowRef, Ok;
    WorkflowDelete(WorkflowDelete) -> WorkflowRef, Ok;
    WorkflowGet(WorkflowGet) -> Workflow, Own;
    WorkflowList(WorkflowList) -> Workflows, Own;
    WorkflowInvoke(WorkflowInvoke) -> Invocation, Ok;
    InstanceGet(InstanceGet) -> Instance, Own;
    InstanceList(InstanceList) -> Instances, Own;
    InstanceLogsQuery(InstanceLogsQuery) -> InstanceLogs, Own;
    SecretStore(SecretStore) -> Ack, Ok;
    SecretDelete(SecretDelete) -> Ack, Ok;
    SecretList(SecretList) -> Secrets, Own;
    RegistryStore(RegistryStore) -> Ack, Ok;
    RegistryDelete(RegistryDelete) -> Ack, Ok;
    RegistryList(RegistryList) -> Registries, Own;
}

/// Sorts a reply envelope into success, remote failure or protocol fault.
///
/// `error` becomes [`CommandError::Remote`]; any tag other than the one the command
/// answers with is an [`CommandError::UnexpectedReply`].
pub fn expect_reply(command: CommandKind, envelope: &Envelope) -> CommandResult<()> {
    if envelope.is_error() {
        let ErrorPayload { message } = envelope.decode_payload()?;
        return Err(CommandError::Remote { message });
    }

    let expected = command.reply_tag();
    if envelope.kind != expected {
        return Err(CommandError::UnexpectedReply {
            command: command.tag().to_string(),
            expected: expected.to_string(),
            received: envelope.kind.clone(),
        });
    }

    Ok(())
}
