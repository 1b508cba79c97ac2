use bytes::Bytes;
use mock_utils::bus::{MockBus, MockReply, Responder};
use nats_utils::envelope::{Envelope, KIND_OK};
use nats_utils::request_client::CorrelatedRequester;
use nats_utils::types::{RequestPolicy, TransportError};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const SUBJECT: &str = "direktiv";

fn test_policy() -> RequestPolicy {
    RequestPolicy {
        timeout: Duration::from_millis(100),
        attempts: 3,
        cooldown: Duration::from_millis(5),
    }
}

fn requester(bus: MockBus) -> CorrelatedRequester<Arc<MockBus>> {
    CorrelatedRequester::new(Arc::new(bus), test_policy(), "test")
}

fn request_bytes(id: &str) -> Bytes {
    Envelope::new(id, "namespace_create", &json!({ "name": "prod" }))
        .unwrap()
        .encode()
        .unwrap()
}

/// Answers with an `ok` envelope for the request's id, tagged with `marker`.
fn reply_with(marker: &'static str) -> Responder {
    Arc::new(move |request: &[u8]| {
        let request = Envelope::decode(request).unwrap();
        Envelope::new(request.id, KIND_OK, &json!({ "marker": marker }))
            .unwrap()
            .encode()
            .unwrap()
            .to_vec()
    })
}

/// Answers with an `ok` envelope carrying someone else's correlation id.
fn reply_for_other_id() -> Responder {
    Arc::new(|_: &[u8]| {
        Envelope::new("someone-else", KIND_OK, &json!({ "marker": "stray" }))
            .unwrap()
            .encode()
            .unwrap()
            .to_vec()
    })
}

fn marker_of(reply: &[u8]) -> String {
    let envelope = Envelope::decode(reply).unwrap();
    envelope.payload["marker"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_reply_on_first_attempt() {
    let requester = requester(MockBus::new(vec![MockReply::Reply(reply_with("first"))]));

    let reply = requester
        .request(SUBJECT, "id-1", request_bytes("id-1"))
        .await
        .unwrap();

    assert_eq!(marker_of(&reply), "first");
    assert_eq!(Envelope::peek_id(&reply), Some("id-1".to_string()));

    let published = requester.bus().published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].subject, SUBJECT);
    assert_eq!(published[0].payload, request_bytes("id-1"));
}

#[tokio::test]
async fn test_retry_then_succeed() {
    for dropped in 0..3 {
        let mut script = vec![MockReply::Drop; dropped];
        script.push(MockReply::Reply(reply_with("delivered")));
        let requester = requester(MockBus::new(script));

        let reply = requester
            .request(SUBJECT, "id-2", request_bytes("id-2"))
            .await
            .unwrap();

        assert_eq!(marker_of(&reply), "delivered");
        assert_eq!(requester.bus().publish_count(), dropped + 1);
    }
}

#[tokio::test]
async fn test_all_attempts_dropped_times_out() {
    let requester = requester(MockBus::new(vec![MockReply::Drop; 3]));

    let err = requester
        .request(SUBJECT, "id-3", request_bytes("id-3"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        TransportError::Timeout {
            subject: SUBJECT.to_string(),
            attempts: 3,
        }
    );
    assert_eq!(requester.bus().publish_count(), 3);
    assert_eq!(requester.bus().open_inboxes(), 0);
}

#[tokio::test]
async fn test_transient_send_faults_are_retried() {
    let requester = requester(MockBus::new(vec![
        MockReply::SendFailure("broken pipe".to_string()),
        MockReply::NoResponders,
        MockReply::Reply(reply_with("third")),
    ]));

    let reply = requester
        .request(SUBJECT, "id-4", request_bytes("id-4"))
        .await
        .unwrap();

    assert_eq!(marker_of(&reply), "third");
    assert_eq!(requester.bus().publish_count(), 3);
}

#[tokio::test]
async fn test_exhausted_send_faults_time_out() {
    let requester = requester(
        MockBus::new(vec![]).with_fallback(MockReply::SendFailure("broken pipe".to_string())),
    );

    let err = requester
        .request(SUBJECT, "id-5", request_bytes("id-5"))
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(requester.bus().publish_count(), 3);
}

#[tokio::test]
async fn test_rejection_short_circuits_retries() {
    let requester = requester(MockBus::new(vec![
        MockReply::Rejected("authorization violation".to_string()),
        MockReply::Reply(reply_with("never")),
    ]));

    let err = requester
        .request(SUBJECT, "id-6", request_bytes("id-6"))
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::Connection { .. }));
    assert_eq!(requester.bus().publish_count(), 1);
}

#[tokio::test]
async fn test_duplicate_reply_is_surfaced_once() {
    let requester = requester(MockBus::new(vec![
        MockReply::Duplicate(reply_with("dup")),
        MockReply::Reply(reply_with("next")),
    ]));

    let first = requester
        .request(SUBJECT, "id-7", request_bytes("id-7"))
        .await
        .unwrap();
    assert_eq!(marker_of(&first), "dup");
    assert_eq!(requester.bus().open_inboxes(), 0);

    // the second delivery of the first reply must not leak into the next request
    let second = requester
        .request(SUBJECT, "id-8", request_bytes("id-8"))
        .await
        .unwrap();
    assert_eq!(marker_of(&second), "next");
    assert_eq!(Envelope::peek_id(&second), Some("id-8".to_string()));
}

#[tokio::test]
async fn test_reply_for_other_id_is_discarded() {
    let requester = requester(MockBus::new(vec![MockReply::Sequence(vec![
        reply_for_other_id(),
        reply_with("mine"),
    ])]));

    let reply = requester
        .request(SUBJECT, "id-9", request_bytes("id-9"))
        .await
        .unwrap();

    assert_eq!(marker_of(&reply), "mine");
    assert_eq!(requester.bus().publish_count(), 1);
}

#[tokio::test]
async fn test_only_stray_replies_times_out() {
    let requester = requester(
        MockBus::new(vec![]).with_fallback(MockReply::Reply(reply_for_other_id())),
    );

    let err = requester
        .request(SUBJECT, "id-10", request_bytes("id-10"))
        .await
        .unwrap_err();

    assert!(err.is_timeout());
}

#[tokio::test]
async fn test_late_reply_of_abandoned_attempt_is_not_surfaced() {
    // attempt 1 times out at 100ms, its reply lands at 150ms while attempt 2 is waiting
    let requester = requester(MockBus::new(vec![
        MockReply::Delayed(Duration::from_millis(150), reply_with("late")),
        MockReply::Delayed(Duration::from_millis(70), reply_with("fresh")),
    ]));

    let reply = requester
        .request(SUBJECT, "id-11", request_bytes("id-11"))
        .await
        .unwrap();

    assert_eq!(marker_of(&reply), "fresh");
    assert_eq!(requester.bus().publish_count(), 2);
}

#[tokio::test]
async fn test_undecodable_reply_is_handed_up() {
    let requester = requester(MockBus::new(vec![MockReply::Reply(Arc::new(|_: &[u8]| {
        b"{\"id\": \"id-12\", \"type\"".to_vec()
    }))]));

    let reply = requester
        .request(SUBJECT, "id-12", request_bytes("id-12"))
        .await
        .unwrap();

    assert!(Envelope::decode(&reply).is_err());
}

#[tokio::test]
async fn test_concurrent_requests_get_their_own_reply() {
    let requester = CorrelatedRequester::new(
        Arc::new(MockBus::responding(Arc::new(|request: &[u8]| {
            let request = Envelope::decode(request).unwrap();
            Envelope::new(request.id.clone(), KIND_OK, &json!({ "echo": request.id }))
                .unwrap()
                .encode()
                .unwrap()
                .to_vec()
        }))),
        test_policy(),
        "test",
    );

    let (x, y) = tokio::join!(
        requester.request(SUBJECT, "x", request_bytes("x")),
        requester.request(SUBJECT, "y", request_bytes("y")),
    );

    let x = Envelope::decode(&x.unwrap()).unwrap();
    let y = Envelope::decode(&y.unwrap()).unwrap();
    assert_eq!((x.id.as_str(), x.payload["echo"].as_str()), ("x", Some("x")));
    assert_eq!((y.id.as_str(), y.payload["echo"].as_str()), ("y", Some("y")));
}

#[tokio::test]
async fn test_requester_is_reusable_across_calls() {
    let requester = requester(MockBus::responding(reply_with("again")));

    for i in 0..5 {
        let id = format!("id-seq-{i}");
        let reply = requester
            .request(SUBJECT, &id, request_bytes(&id))
            .await
            .unwrap();
        assert_eq!(Envelope::peek_id(&reply), Some(id));
    }
    assert_eq!(requester.bus().publish_count(), 5);
    assert_eq!(requester.bus().open_inboxes(), 0);
}
