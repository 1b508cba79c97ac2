use async_trait::async_trait;
use bytes::Bytes;
use nats_utils::request_client::{ReplyStream, RequestBus, Session};
use nats_utils::types::BusError;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Builds the reply bytes from the request bytes.
pub type Responder = Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>;

/// What the bus does with one published request.
#[derive(Clone)]
pub enum MockReply {
    /// The request is lost, nobody answers.
    Drop,
    Reply(Responder),
    /// The reply is delivered twice to the same inbox.
    Duplicate(Responder),
    /// Several replies are delivered to the same inbox, in order.
    Sequence(Vec<Responder>),
    /// The reply shows up after the given delay.
    Delayed(Duration, Responder),
    SendFailure(String),
    NoResponders,
    Rejected(String),
}

impl std::fmt::Debug for MockReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let t = match self {
            Self::Drop => "MockReply::Drop".to_string(),
            Self::Reply(_) => "MockReply::Reply(<function>)".to_string(),
            Self::Duplicate(_) => "MockReply::Duplicate(<function>)".to_string(),
            Self::Sequence(r) => format!("MockReply::Sequence(<{} functions>)", r.len()),
            Self::Delayed(d, _) => format!("MockReply::Delayed({d:?}, <function>)"),
            Self::SendFailure(e) => format!("MockReply::SendFailure({e})"),
            Self::NoResponders => "MockReply::NoResponders".to_string(),
            Self::Rejected(e) => format!("MockReply::Rejected({e})"),
        };

        write!(f, "{}", t)
    }
}

#[derive(Clone, Debug)]
pub struct PublishedRequest {
    pub subject: String,
    pub inbox: String,
    pub payload: Bytes,
}

type InboxSender = mpsc::UnboundedSender<Result<Bytes, BusError>>;

/// In-memory stand-in for the NATS session. Each publish consumes the next scripted [`MockReply`];
/// once the script is exhausted the fallback behaviour applies.
pub struct MockBus {
    script: Mutex<VecDeque<MockReply>>,
    fallback: MockReply,
    inboxes: Arc<Mutex<HashMap<String, InboxSender>>>,
    published: Mutex<Vec<PublishedRequest>>,
    inbox_counter: AtomicU64,
    closed: AtomicUsize,
}

impl MockBus {
    pub fn new(script: Vec<MockReply>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: MockReply::Drop,
            inboxes: Arc::new(Mutex::new(HashMap::new())),
            published: Mutex::new(vec![]),
            inbox_counter: AtomicU64::new(0),
            closed: AtomicUsize::new(0),
        }
    }

    /// Every request is answered by `responder`.
    pub fn responding(responder: Responder) -> Self {
        Self::new(vec![]).with_fallback(MockReply::Reply(responder))
    }

    pub fn with_fallback(mut self, fallback: MockReply) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn published(&self) -> Vec<PublishedRequest> {
        self.published.lock().expect("published lock").clone()
    }

    pub fn publish_count(&self) -> usize {
        self.published.lock().expect("published lock").len()
    }

    /// How often the session was closed.
    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of inboxes somebody still listens on.
    pub fn open_inboxes(&self) -> usize {
        self.inboxes
            .lock()
            .expect("inbox lock")
            .values()
            .filter(|tx| !tx.is_closed())
            .count()
    }

    fn deliver(inboxes: &Mutex<HashMap<String, InboxSender>>, inbox: &str, reply: Vec<u8>) {
        let inboxes = inboxes.lock().expect("inbox lock");
        match inboxes.get(inbox) {
            // a closed receiver means the waiter gave up on this inbox
            Some(tx) => {
                if tx.send(Ok(reply.into())).is_err() {
                    log::debug!("MOCK-BUS::Reply to abandoned inbox {inbox} discarded");
                }
            }
            None => log::debug!("MOCK-BUS::Reply to unknown inbox {inbox} discarded"),
        }
    }

    fn next_reply(&self) -> MockReply {
        self.script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl RequestBus for MockBus {
    fn new_inbox(&self) -> String {
        let n = self.inbox_counter.fetch_add(1, Ordering::SeqCst);
        format!("_INBOX.mock.{n}")
    }

    async fn subscribe_inbox(&self, inbox: String) -> Result<ReplyStream, BusError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inboxes.lock().expect("inbox lock").insert(inbox, tx);
        let replies = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|reply| (reply, rx))
        });
        Ok(Box::pin(replies))
    }

    async fn publish_request(
        &self,
        subject: String,
        inbox: String,
        payload: Bytes,
    ) -> Result<(), BusError> {
        self.published
            .lock()
            .expect("published lock")
            .push(PublishedRequest {
                subject,
                inbox: inbox.clone(),
                payload: payload.clone(),
            });

        match self.next_reply() {
            MockReply::Drop => {}
            MockReply::Reply(responder) => Self::deliver(&self.inboxes, &inbox, responder(&payload)),
            MockReply::Duplicate(responder) => {
                Self::deliver(&self.inboxes, &inbox, responder(&payload));
                Self::deliver(&self.inboxes, &inbox, responder(&payload));
            }
            MockReply::Sequence(responders) => {
                for responder in responders {
                    Self::deliver(&self.inboxes, &inbox, responder(&payload));
                }
            }
            MockReply::Delayed(delay, responder) => {
                let inboxes = self.inboxes.clone();
                let reply = responder(&payload);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    Self::deliver(&inboxes, &inbox, reply);
                });
            }
            MockReply::SendFailure(e) => return Err(BusError::Send(e)),
            MockReply::NoResponders => {
                if let Some(tx) = self.inboxes.lock().expect("inbox lock").get(&inbox) {
                    let _ = tx.send(Err(BusError::NoResponders));
                }
            }
            MockReply::Rejected(e) => return Err(BusError::Rejected(e)),
        }

        Ok(())
    }
}

#[async_trait]
impl Session for MockBus {
    async fn close_session(&self) -> Result<(), BusError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
