/*
Verb-level calls on top of the correlated requester. Each call:
  - draws a fresh correlation id
  - wraps the command in an envelope and sends it on the service subject
  - sorts the reply into a typed success, a remote error or a protocol fault

Transport faults come back unchanged as `TransportTimeout`/`Transport`. Nothing is retried at
this layer; the requester already spent its attempt budget.
*/

use crate::types::{expect_reply, Command, CommandResult, DirektivCommand, Reply};
use nats_utils::envelope::Envelope;
use nats_utils::request_client::{CorrelatedRequester, RequestBus};

pub const DIREKTIV_SUBJECT_DEFAULT: &str = "direktiv";

#[derive(Debug)]
pub struct CommandDispatcher<B> {
    requester: CorrelatedRequester<B>,
    subject: String,
    log_prefix: String,
}

impl<B> CommandDispatcher<B>
where
    B: RequestBus,
{
    pub fn new(requester: CorrelatedRequester<B>, subject: &str, name: &str) -> Self {
        Self {
            requester,
            subject: subject.to_string(),
            log_prefix: format!("DISPATCHER-LOG::{name}::"),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn requester(&self) -> &CorrelatedRequester<B> {
        &self.requester
    }

    /// Sends `command` on the default subject and returns its typed response.
    pub async fn call<C>(&self, command: C) -> CommandResult<C::Response>
    where
        C: DirektivCommand,
    {
        self.call_on(&self.subject, command).await
    }

    pub async fn call_on<C>(&self, subject: &str, command: C) -> CommandResult<C::Response>
    where
        C: DirektivCommand,
    {
        let kind = C::KIND;
        let reply = self.exchange(subject, command.into()).await?;
        expect_reply(kind, &reply)?;

        Ok(reply.decode_payload::<C::Response>()?)
    }

    /// Same as [`Self::call`] for a command only known at runtime.
    pub async fn dispatch(&self, command: Command) -> CommandResult<Reply> {
        let kind = command.kind();
        let reply = self.exchange(&self.subject, command).await?;

        Reply::from_envelope(kind, &reply)
    }

    async fn exchange(&self, subject: &str, command: Command) -> CommandResult<Envelope> {
        let id = uuid::Uuid::new_v4().to_string();
        let kind = command.kind();
        let request = command.to_envelope(&id)?.encode()?;

        log::debug!(
            "{}Sending '{kind}' (id={id}, subject={subject})",
            self.log_prefix
        );

        let reply = self.requester.request(subject, &id, request).await?;
        let reply = Envelope::decode(&reply).inspect_err(|e| {
            log::error!("{}Reply to '{kind}' (id={id}) is not an envelope: {e}", self.log_prefix);
        })?;

        log::debug!(
            "{}Received '{}' for '{kind}' (id={id})",
            self.log_prefix,
            reply.kind
        );
        Ok(reply)
    }
}
