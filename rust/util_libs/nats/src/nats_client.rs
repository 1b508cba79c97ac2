use super::{
    request_client::{ReplyStream, RequestBus, Session},
    types::{
        BusError, Credentials, DeServerAddr, ErrClientDisconnected, NatsClientBuilder,
        TransportError, CONNECT_TIMEOUT_DEFAULT,
    },
};
use async_nats::{ConnectErrorKind, ServerInfo, StatusCode};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;

impl std::fmt::Debug for NatsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsClient")
            .field("url", &self.url)
            .field("name", &self.name)
            .field("client", &self.client)
            .field("service_log_prefix", &self.service_log_prefix)
            .finish()
    }
}

/// One session on the bus. The connection is opened by [`NatsClient::new`] and stays up until
/// [`NatsClient::close`]; clones share it.
#[derive(Clone)]
pub struct NatsClient {
    url: DeServerAddr,
    pub name: String,
    service_log_prefix: String,
    client: async_nats::Client,
}

impl NatsClient {
    pub async fn new(p: NatsClientBuilder) -> Result<Self, TransportError> {
        let url = p.nats_remote_args.nats_url.clone();
        let service_log_prefix = format!("NATS-CLIENT-LOG::{}::", p.name);

        let mut credentials = p.credentials.unwrap_or_default();
        credentials.extend(
            p.nats_remote_args
                .credentials()
                .map_err(|e| TransportError::connection(url.to_string(), e.to_string()))?,
        );

        let ping_interval = p.ping_interval.unwrap_or(Duration::from_secs(120));
        let connect_timeout = p.connect_timeout.unwrap_or(CONNECT_TIMEOUT_DEFAULT);
        let attempts = AtomicU32::new(0);
        let connect_options = || {
            attempts.fetch_add(1, Ordering::SeqCst);
            let credentials = credentials.clone();
            let name = p.name.clone();
            let inbox_prefix = p.inbox_prefix.clone();
            let server_addr = url.0.clone();
            async move {
                let mut connect_options = async_nats::ConnectOptions::new()
                    .name(name)
                    .ping_interval(ping_interval)
                    .connection_timeout(connect_timeout)
                    .custom_inbox_prefix(inbox_prefix);

                for credentials in credentials {
                    match credentials {
                        Credentials::Password(user, pw) => {
                            connect_options = connect_options.user_and_password(user, pw);
                        }
                        Credentials::Path(cp) => {
                            connect_options =
                                connect_options.credentials_file(&cp).await.map_err(|e| {
                                    ConnectFailure::Fatal(format!(
                                        "reading credentials file {cp:?}: {e}"
                                    ))
                                })?;
                        }
                        Credentials::Token(t) => {
                            connect_options = connect_options.token(t);
                        }
                    }
                }

                connect_options
                    .connect(server_addr)
                    .await
                    .map_err(ConnectFailure::from)
            }
        };

        let cooldowns = FixedInterval::new(p.policy.cooldown)
            .take(p.policy.attempts.saturating_sub(1) as usize);
        let client = RetryIf::spawn(cooldowns, connect_options, |e: &ConnectFailure| {
            let retry = e.retry_after(attempts.load(Ordering::SeqCst), p.policy.attempts);
            if retry {
                log::warn!("{service_log_prefix}Retrying connection to {url}: {e:?}");
            }
            retry
        })
        .await
        .map_err(|e| TransportError::connection(url.to_string(), e.to_string()))?;

        log::info!("{service_log_prefix}Connected to NATS server at {url}");

        Ok(NatsClient {
            url,
            name: p.name,
            service_log_prefix,
            client,
        })
    }

    pub fn get_server_info(&self) -> ServerInfo {
        self.client.server_info()
    }

    pub async fn check_connection(
        &self,
    ) -> Result<async_nats::connection::State, async_nats::Error> {
        let conn_state = self.client.connection_state();
        if let async_nats::connection::State::Disconnected = conn_state {
            Err(Box::new(ErrClientDisconnected))
        } else {
            Ok(conn_state)
        }
    }

    /// Flushes everything still buffered and closes the connection of every clone.
    pub async fn close(&self) -> Result<(), async_nats::Error> {
        log::debug!("{}Closing connection to {}", self.service_log_prefix, self.url);
        self.client.drain().await?;
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) enum ConnectFailure {
    Transient(String),
    Fatal(String),
}

impl ConnectFailure {
    /// Whether another connect attempt follows `attempt` (1-based) within `budget` attempts.
    pub(crate) fn retry_after(&self, attempt: u32, budget: u32) -> bool {
        matches!(self, Self::Transient(_)) && attempt < budget
    }
}

impl std::fmt::Display for ConnectFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient(reason) | Self::Fatal(reason) => write!(f, "{reason}"),
        }
    }
}

impl From<async_nats::ConnectError> for ConnectFailure {
    fn from(e: async_nats::ConnectError) -> Self {
        match e.kind() {
            ConnectErrorKind::Authentication
            | ConnectErrorKind::AuthorizationViolation
            | ConnectErrorKind::Tls
            | ConnectErrorKind::ServerParse => Self::Fatal(e.to_string()),
            _ => Self::Transient(e.to_string()),
        }
    }
}

#[async_trait]
impl RequestBus for NatsClient {
    fn new_inbox(&self) -> String {
        self.client.new_inbox()
    }

    async fn subscribe_inbox(&self, inbox: String) -> Result<ReplyStream, BusError> {
        let subscriber = self
            .client
            .subscribe(inbox)
            .await
            .map_err(|e| BusError::Send(e.to_string()))?;

        let replies = subscriber.map(|msg| {
            if msg.status == Some(StatusCode::NO_RESPONDERS) {
                Err(BusError::NoResponders)
            } else {
                Ok(msg.payload)
            }
        });

        Ok(Box::pin(replies))
    }

    async fn publish_request(
        &self,
        subject: String,
        inbox: String,
        payload: Bytes,
    ) -> Result<(), BusError> {
        log::trace!(
            "{}Publishing request: subj={subject}, reply={inbox}, data={payload:?}",
            self.service_log_prefix
        );

        self.client
            .publish_with_reply(subject, inbox, payload)
            .await
            .map_err(|e| match e.kind() {
                async_nats::client::PublishErrorKind::MaxPayloadExceeded => {
                    BusError::Rejected(e.to_string())
                }
                _ => BusError::Send(e.to_string()),
            })
    }
}

#[async_trait]
impl Session for NatsClient {
    async fn close_session(&self) -> Result<(), BusError> {
        self.close().await.map_err(|e| BusError::Send(e.to_string()))
    }
}
