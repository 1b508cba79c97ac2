use anyhow::{Context, Result};
use async_nats::ServerAddr;
use educe::Educe;
use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const NATS_URL_DEFAULT: &str = "nats://127.0.0.1:4222";

pub const REQUEST_TIMEOUT_DEFAULT: Duration = Duration::from_millis(500);
pub const REQUEST_ATTEMPTS_DEFAULT: u32 = 3;
pub const REQUEST_COOLDOWN_DEFAULT: Duration = Duration::from_millis(5);
pub const CONNECT_TIMEOUT_DEFAULT: Duration = Duration::from_secs(3);

#[derive(Clone, Debug)]
pub enum Credentials {
    /// A `.creds` file holding a user JWT and its nkey seed.
    Path(PathBuf),
    Password(String, String),
    Token(String),
}

#[derive(Educe)]
#[educe(Default)]
pub struct NatsClientBuilder {
    pub nats_remote_args: NatsRemoteArgs,
    #[educe(Default = "direkcli")]
    pub name: String,
    #[educe(Default = "_INBOX.direkcli")]
    pub inbox_prefix: String,
    pub credentials: Option<Vec<Credentials>>,
    pub ping_interval: Option<Duration>,
    pub connect_timeout: Option<Duration>, // Defaults to 3s
    pub policy: RequestPolicy,
}

#[derive(Clone, Debug, Educe)]
#[educe(Deref)]
pub struct DeServerAddr(pub ServerAddr);

impl AsRef<ServerAddr> for DeServerAddr {
    fn as_ref(&self) -> &ServerAddr {
        &self.0
    }
}

impl FromStr for DeServerAddr {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(ServerAddr::from_str(s)?))
    }
}

impl From<ServerAddr> for DeServerAddr {
    fn from(value: ServerAddr) -> Self {
        Self(value)
    }
}

impl fmt::Display for DeServerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.0.host(), self.0.port())
    }
}

#[derive(Debug, Clone, clap::Args, Educe)]
#[educe(Default)]
pub struct NatsRemoteArgs {
    #[clap(
        long,
        env = "NATS_CREDS_FILE",
        help = "path to NATS credentials (user JWT and nkey seed) used for the connection"
    )]
    pub nats_creds_file: Option<PathBuf>,

    #[clap(long, env = "NATS_PASSWORD_FILE")]
    pub nats_password_file: Option<PathBuf>,

    #[clap(long, env = "NATS_PASSWORD", hide_env_values = true)]
    pub nats_password: Option<String>,

    #[clap(long, env = "NATS_USER")]
    pub nats_user: Option<String>,

    #[clap(long, env = "NATS_TOKEN", hide_env_values = true)]
    pub nats_token: Option<String>,

    #[clap(long, env = "NATS_URL", default_value = NATS_URL_DEFAULT)]
    #[educe(Default( expression = DeServerAddr(ServerAddr::from_str(NATS_URL_DEFAULT).expect("default nats url to parse"))))]
    pub nats_url: DeServerAddr,
}

impl NatsRemoteArgs {
    pub fn try_new(url: &str) -> anyhow::Result<Self> {
        Ok(Self {
            nats_url: url.parse()?,

            ..Default::default()
        })
    }

    pub fn maybe_user_password(&self) -> anyhow::Result<Option<(String, String)>> {
        let maybe_user = self
            .nats_user
            .clone()
            .or(self.nats_url.username().map(ToString::to_string));
        let maybe_password = self
            .nats_password
            .clone()
            .or(self.nats_url.password().map(ToString::to_string));

        let maybe = match (maybe_user, maybe_password, &self.nats_password_file) {
            // incomplete data provided
            (None, None, None)
            | (None, None, Some(_))
            | (None, Some(_), None)
            | (Some(_), None, None)
            | (None, Some(_), Some(_)) => return Ok(None),

            // prefer password_file
            (Some(user), _, Some(password_file)) => {
                let pass = std::fs::read_to_string(password_file)
                    .context(format!("reading {password_file:?}"))?
                    .trim()
                    .to_string();

                log::debug!("user '{user}' and a password provided.");

                Some((user.clone(), pass))
            }
            (Some(user), Some(pass), None) => Some((user.clone(), pass.clone())),
        };

        Ok(maybe)
    }

    /// Collects every credential given on the command line or in the environment.
    /// A token and a user/password pair may both be present; the server decides which one it accepts.
    pub fn credentials(&self) -> Result<Vec<Credentials>> {
        let mut credentials = vec![];
        if let Some(path) = &self.nats_creds_file {
            credentials.push(Credentials::Path(path.clone()));
        }
        if let Some((user, pass)) = self.maybe_user_password()? {
            credentials.push(Credentials::Password(user, pass));
        }
        if let Some(token) = &self.nats_token {
            credentials.push(Credentials::Token(token.clone()));
        }
        Ok(credentials)
    }
}

/// Bounds for a single correlated request: how long one attempt waits for its reply,
/// how many attempts are made in total and the constant pause between them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestPolicy {
    pub timeout: Duration,
    pub attempts: u32,
    pub cooldown: Duration,
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self {
            timeout: REQUEST_TIMEOUT_DEFAULT,
            attempts: REQUEST_ATTEMPTS_DEFAULT,
            cooldown: REQUEST_COOLDOWN_DEFAULT,
        }
    }
}

#[derive(Debug, Clone, clap::Args)]
pub struct RequestArgs {
    #[arg(
        long,
        env = "DIREKTIV_REQUEST_TIMEOUT_MS",
        default_value_t = 500,
        help = "how long a single attempt waits for its reply (in milliseconds)"
    )]
    pub request_timeout_ms: u64,

    #[arg(
        long,
        env = "DIREKTIV_REQUEST_ATTEMPTS",
        default_value_t = REQUEST_ATTEMPTS_DEFAULT,
        value_parser = clap::value_parser!(u32).range(1..),
        help = "total number of attempts before a request times out"
    )]
    pub request_attempts: u32,

    #[arg(
        long,
        env = "DIREKTIV_REQUEST_COOLDOWN_MS",
        default_value_t = 5,
        help = "pause between two attempts (in milliseconds)"
    )]
    pub request_cooldown_ms: u64,

    #[arg(
        long,
        env = "DIREKTIV_CONNECT_TIMEOUT_SECS",
        default_value_t = 3,
        help = "how long to wait for the NATS connection to be established (in seconds)"
    )]
    pub connect_timeout_secs: u64,
}

impl From<&RequestArgs> for RequestPolicy {
    fn from(args: &RequestArgs) -> Self {
        Self {
            timeout: Duration::from_millis(args.request_timeout_ms),
            attempts: args.request_attempts.max(1),
            cooldown: Duration::from_millis(args.request_cooldown_ms),
        }
    }
}

#[derive(Debug)]
pub struct ErrClientDisconnected;
impl fmt::Display for ErrClientDisconnected {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Could not reach nats: connection closed")
    }
}
impl Error for ErrClientDisconnected {}

/// Failure of a single bus primitive (subscribe or publish).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("Send failed: {0}")]
    Send(String),

    #[error("No responders available on the request subject")]
    NoResponders,

    #[error("Connection rejected: {0}")]
    Rejected(String),
}

impl BusError {
    /// Returns true if the fault may clear up by itself and the attempt is worth repeating
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("No reply received on '{subject}' after {attempts} attempt(s)")]
    Timeout { subject: String, attempts: u32 },

    #[error("Transport failure towards '{endpoint}': {reason}")]
    Connection { endpoint: String, reason: String },
}

impl TransportError {
    pub fn connection(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Connection {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if this is a Timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
