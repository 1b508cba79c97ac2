//! Request/reply on top of fire-and-forget publish/subscribe.
//!
//! Each attempt subscribes to a fresh inbox, publishes the request with that inbox as reply subject
//! and waits a bounded time for the first reply carrying the request's correlation id. The inbox is
//! dropped when the attempt ends, so replies to abandoned attempts and duplicate deliveries never reach
//! the caller.

use super::envelope::Envelope;
use super::types::{BusError, RequestPolicy, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;

pub type ReplyStream = Pin<Box<dyn Stream<Item = Result<Bytes, BusError>> + Send>>;

/// The publish/subscribe primitives a correlated request needs.
#[async_trait]
pub trait RequestBus: Send + Sync {
    /// A subject nobody else listens on.
    fn new_inbox(&self) -> String;

    /// Starts listening on `inbox`. Dropping the stream ends the subscription.
    async fn subscribe_inbox(&self, inbox: String) -> Result<ReplyStream, BusError>;

    async fn publish_request(
        &self,
        subject: String,
        inbox: String,
        payload: Bytes,
    ) -> Result<(), BusError>;
}

#[async_trait]
impl<B> RequestBus for Arc<B>
where
    B: RequestBus + ?Sized,
{
    fn new_inbox(&self) -> String {
        (**self).new_inbox()
    }

    async fn subscribe_inbox(&self, inbox: String) -> Result<ReplyStream, BusError> {
        (**self).subscribe_inbox(inbox).await
    }

    async fn publish_request(
        &self,
        subject: String,
        inbox: String,
        payload: Bytes,
    ) -> Result<(), BusError> {
        (**self).publish_request(subject, inbox, payload).await
    }
}

/// A bus connection that is held for a whole session and released once at its end.
#[async_trait]
pub trait Session: RequestBus {
    async fn close_session(&self) -> Result<(), BusError>;
}

#[async_trait]
impl<S> Session for Arc<S>
where
    S: Session + ?Sized,
{
    async fn close_session(&self) -> Result<(), BusError> {
        (**self).close_session().await
    }
}

#[derive(Debug)]
pub(crate) enum AttemptError {
    TimedOut,
    Bus(BusError),
}

impl AttemptError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::TimedOut => true,
            Self::Bus(e) => e.is_transient(),
        }
    }

    /// Whether another attempt follows `attempt` (1-based) within a budget of `budget` attempts.
    pub(crate) fn retry_after(&self, attempt: u32, budget: u32) -> bool {
        self.is_retryable() && attempt < budget
    }
}

impl From<BusError> for AttemptError {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

pub struct CorrelatedRequester<B> {
    bus: B,
    policy: RequestPolicy,
    log_prefix: String,
}

impl<B> std::fmt::Debug for CorrelatedRequester<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelatedRequester")
            .field("policy", &self.policy)
            .field("log_prefix", &self.log_prefix)
            .finish()
    }
}

impl<B> CorrelatedRequester<B>
where
    B: RequestBus,
{
    pub fn new(bus: B, policy: RequestPolicy, name: &str) -> Self {
        Self {
            bus,
            policy,
            log_prefix: format!("REQUESTER-LOG::{name}::"),
        }
    }

    pub fn policy(&self) -> &RequestPolicy {
        &self.policy
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Publishes `request` on `subject` and returns the raw bytes of the one reply correlated to it.
    ///
    /// Attempts that time out or hit a transient bus fault are repeated after a constant cooldown,
    /// up to the policy's attempt budget. A rejected connection ends the loop immediately.
    pub async fn request(
        &self,
        subject: &str,
        correlation_id: &str,
        request: Bytes,
    ) -> Result<Bytes, TransportError> {
        let attempts = AtomicU32::new(0);
        let cooldowns = FixedInterval::new(self.policy.cooldown)
            .take(self.policy.attempts.saturating_sub(1) as usize);

        let result = RetryIf::spawn(
            cooldowns,
            || {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                self.attempt(subject, correlation_id, request.clone(), attempt)
            },
            |e: &AttemptError| {
                let retry = e.retry_after(attempts.load(Ordering::SeqCst), self.policy.attempts);
                if retry {
                    log::warn!(
                        "{}Retrying request (id={correlation_id}, subject={subject}) after {e:?}",
                        self.log_prefix
                    );
                }
                retry
            },
        )
        .await;

        match result {
            Ok(reply) => Ok(reply),
            Err(AttemptError::Bus(e)) if !e.is_transient() => {
                log::error!(
                    "{}Request failed (id={correlation_id}, subject={subject}): {e}",
                    self.log_prefix
                );
                Err(TransportError::connection(subject, e.to_string()))
            }
            Err(e) => {
                let attempts = attempts.load(Ordering::SeqCst);
                log::error!(
                    "{}Giving up on request (id={correlation_id}, subject={subject}, attempts={attempts}): {e:?}",
                    self.log_prefix
                );
                Err(TransportError::Timeout {
                    subject: subject.to_string(),
                    attempts,
                })
            }
        }
    }

    async fn attempt(
        &self,
        subject: &str,
        correlation_id: &str,
        request: Bytes,
        attempt: u32,
    ) -> Result<Bytes, AttemptError> {
        log::debug!(
            "{}Attempting request... (id={correlation_id}, subject={subject}, attempt={attempt})",
            self.log_prefix
        );

        let inbox = self.bus.new_inbox();
        // subscribe before publishing so a fast reply cannot slip past us
        let mut replies = self.bus.subscribe_inbox(inbox.clone()).await?;
        self.bus
            .publish_request(subject.to_string(), inbox, request)
            .await?;

        let deadline = Instant::now() + self.policy.timeout;
        loop {
            let reply = match tokio::time::timeout_at(deadline, replies.next()).await {
                Err(_) => return Err(AttemptError::TimedOut),
                Ok(None) => {
                    return Err(AttemptError::Bus(BusError::Send(
                        "reply subscription closed".to_string(),
                    )))
                }
                Ok(Some(reply)) => reply?,
            };

            match Envelope::peek_id(&reply) {
                Some(id) if id != correlation_id => {
                    log::warn!(
                        "{}Discarding reply for id={id} while waiting on id={correlation_id}",
                        self.log_prefix
                    );
                }
                _ => return Ok(reply),
            }
        }
    }
}
