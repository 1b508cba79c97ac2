use direktiv_api::dispatcher::CommandDispatcher;
use direktiv_api::types::*;
use mock_utils::bus::{MockBus, MockReply, Responder};
use nats_utils::envelope::Envelope;
use nats_utils::request_client::CorrelatedRequester;
use nats_utils::types::RequestPolicy;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn dispatcher(bus: MockBus) -> CommandDispatcher<Arc<MockBus>> {
    let policy = RequestPolicy {
        timeout: Duration::from_millis(50),
        attempts: 3,
        cooldown: Duration::from_millis(5),
    };
    let requester = CorrelatedRequester::new(Arc::new(bus), policy, "test");
    CommandDispatcher::new(requester, "direktiv", "test")
}

/// Replies under the request's correlation id with the given tag and payload.
fn respond(kind: &'static str, payload: serde_json::Value) -> Responder {
    Arc::new(move |request: &[u8]| {
        let request = Envelope::decode(request).unwrap();
        Envelope::new(request.id, kind, &payload)
            .unwrap()
            .encode()
            .unwrap()
            .to_vec()
    })
}

/// A tiny in-memory service answering every command it understands.
fn fake_service() -> Responder {
    Arc::new(|request: &[u8]| {
        let request = Envelope::decode(request).unwrap();
        let reply = match Command::from_envelope(&request).unwrap() {
            Command::NamespaceCreate(c) => Reply::NamespaceCreate(Namespace { name: c.name }),
            Command::WorkflowGet(c) => Reply::WorkflowGet(Workflow {
                id: c.id,
                uid: Some("uid-1".to_string()),
                active: true,
                description: None,
                workflow: b"id: greeter\n".to_vec(),
            }),
            Command::SecretList(_) => Reply::SecretList(Secrets::default()),
            other => {
                return Envelope::error(request.id, format!("unsupported: {}", other.kind()))
                    .encode()
                    .unwrap()
                    .to_vec()
            }
        };
        reply.to_envelope(&request.id).unwrap().encode().unwrap().to_vec()
    })
}

#[tokio::test]
async fn test_namespace_create_ok() {
    let dispatcher = dispatcher(MockBus::new(vec![MockReply::Reply(respond(
        "ok",
        json!({ "name": "prod" }),
    ))]));

    let namespace = dispatcher
        .call(NamespaceCreate {
            name: "prod".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(
        namespace,
        Namespace {
            name: "prod".to_string()
        }
    );

    let published = dispatcher.requester().bus().published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].subject, "direktiv");
    let request = Envelope::decode(&published[0].payload).unwrap();
    assert_eq!(request.kind, "namespace_create");
    assert_eq!(request.payload, json!({ "name": "prod" }));
}

#[tokio::test]
async fn test_each_call_uses_a_fresh_correlation_id() {
    let dispatcher = dispatcher(MockBus::responding(fake_service()));

    for _ in 0..3 {
        dispatcher
            .call(SecretList {
                namespace: "prod".to_string(),
            })
            .await
            .unwrap();
    }

    let mut ids: Vec<String> = dispatcher
        .requester()
        .bus()
        .published()
        .iter()
        .map(|p| Envelope::decode(&p.payload).unwrap().id)
        .collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);
}

#[tokio::test]
async fn test_remote_error() {
    let dispatcher = dispatcher(MockBus::new(vec![MockReply::Reply(respond(
        "error",
        json!({ "message": "namespace already exists" }),
    ))]));

    let err = dispatcher
        .call(NamespaceCreate {
            name: "prod".to_string(),
        })
        .await
        .unwrap_err();

    assert_eq!(err, CommandError::remote("namespace already exists"));
    // remote errors are final, the request went out once
    assert_eq!(dispatcher.requester().bus().publish_count(), 1);
}

#[tokio::test]
async fn test_reply_for_other_variant_is_unexpected() {
    let dispatcher = dispatcher(MockBus::new(vec![MockReply::Reply(respond(
        "workflow_list",
        json!({ "workflows": [] }),
    ))]));

    let err = dispatcher
        .call(NamespaceList {})
        .await
        .unwrap_err();

    assert!(err.is_unexpected_reply());
    assert_eq!(dispatcher.requester().bus().publish_count(), 1);
}

#[tokio::test]
async fn test_undecodable_reply_is_malformed() {
    let dispatcher = dispatcher(MockBus::new(vec![MockReply::Reply(Arc::new(|_: &[u8]| {
        b"not json".to_vec()
    }))]));

    let err = dispatcher
        .call(NamespaceList {})
        .await
        .unwrap_err();

    assert!(err.is_malformed_envelope());
}

#[tokio::test]
async fn test_reply_with_wrong_shape_is_schema_mismatch() {
    let dispatcher = dispatcher(MockBus::new(vec![MockReply::Reply(respond(
        "instance_get",
        json!({ "id": "i-1" }),
    ))]));

    let err = dispatcher
        .call(InstanceGet {
            id: "i-1".to_string(),
        })
        .await
        .unwrap_err();

    assert!(err.is_schema_mismatch());
}

#[tokio::test]
async fn test_timeout_propagates() {
    let dispatcher = dispatcher(MockBus::new(vec![]));

    let err = dispatcher
        .call(WorkflowList {
            namespace: "prod".to_string(),
        })
        .await
        .unwrap_err();

    assert_eq!(
        err,
        CommandError::TransportTimeout {
            subject: "direktiv".to_string(),
            attempts: 3,
        }
    );
}

#[tokio::test]
async fn test_rejection_propagates_as_transport_error() {
    let dispatcher = dispatcher(MockBus::new(vec![MockReply::Rejected(
        "authorization violation".to_string(),
    )]));

    let err = dispatcher
        .call(WorkflowList {
            namespace: "prod".to_string(),
        })
        .await
        .unwrap_err();

    assert!(err.is_transport());
}

#[tokio::test]
async fn test_retried_request_succeeds() {
    let dispatcher = dispatcher(MockBus::new(vec![
        MockReply::Drop,
        MockReply::Drop,
        MockReply::Reply(fake_service()),
    ]));

    let workflow = dispatcher
        .call(WorkflowGet {
            namespace: "prod".to_string(),
            id: "greeter".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(workflow.id, "greeter");
    assert_eq!(workflow.workflow, b"id: greeter\n".to_vec());
    assert_eq!(dispatcher.requester().bus().publish_count(), 3);
}

#[tokio::test]
async fn test_dispatch_runtime_command() {
    let dispatcher = dispatcher(MockBus::responding(fake_service()));

    let reply = dispatcher
        .dispatch(Command::SecretList(SecretList {
            namespace: "prod".to_string(),
        }))
        .await
        .unwrap();
    assert_eq!(reply, Reply::SecretList(Secrets::default()));

    let err = dispatcher
        .dispatch(Command::RegistryList(RegistryList {
            namespace: "prod".to_string(),
        }))
        .await
        .unwrap_err();
    assert_eq!(err, CommandError::remote("unsupported: registry_list"));
}

#[tokio::test]
async fn test_call_on_other_subject() {
    let dispatcher = dispatcher(MockBus::responding(fake_service()));

    dispatcher
        .call_on(
            "direktiv.staging",
            NamespaceCreate {
                name: "prod".to_string(),
            },
        )
        .await
        .unwrap();

    assert_eq!(
        dispatcher.requester().bus().published()[0].subject,
        "direktiv.staging"
    );
}
