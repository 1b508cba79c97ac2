#![cfg(feature = "tests_integration_nats")]

use anyhow::Result;
use futures::StreamExt;
use mock_utils::test_nats_server::{check_nats_server, TestNatsServer};
use nats_utils::{
    envelope::{Envelope, KIND_OK},
    nats_client::NatsClient,
    request_client::CorrelatedRequester,
    types::{Credentials, NatsClientBuilder, NatsRemoteArgs, RequestPolicy, TransportError},
};
use serde_json::json;
use serial_test::serial;
use std::time::Duration;

const SUBJECT: &str = "direktiv.test";

fn builder(server: &TestNatsServer) -> Result<NatsClientBuilder> {
    let _ = env_logger::builder().is_test(true).try_init();
    Ok(NatsClientBuilder {
        nats_remote_args: NatsRemoteArgs::try_new(&server.url())?,
        name: "test_client".to_string(),
        inbox_prefix: "_INBOX.test".to_string(),
        ping_interval: Some(Duration::from_secs(10)),
        connect_timeout: Some(Duration::from_secs(2)),
        policy: RequestPolicy {
            timeout: Duration::from_millis(300),
            attempts: 3,
            cooldown: Duration::from_millis(5),
        },
        ..Default::default()
    })
}

/// Answers every request on `SUBJECT` with an `ok` envelope for the same id.
async fn spawn_responder(server: &TestNatsServer) -> Result<tokio::task::JoinHandle<()>> {
    let responder = server.connect().await?;
    let mut requests = responder.subscribe(SUBJECT).await?;
    responder.flush().await?;

    Ok(tokio::spawn(async move {
        while let Some(msg) = requests.next().await {
            let (Some(reply_to), Ok(request)) = (msg.reply, Envelope::decode(&msg.payload)) else {
                continue;
            };
            let reply = Envelope::new(request.id, KIND_OK, &json!({}))
                .and_then(|envelope| envelope.encode());
            if let Ok(reply) = reply {
                let _ = responder.publish(reply_to, reply).await;
            }
        }
    }))
}

#[tokio::test]
#[serial]
async fn test_client_initialization() -> Result<()> {
    if !check_nats_server() {
        log::debug!("Skipping test: nats-server not available");
        return Ok(());
    }

    let server = TestNatsServer::new().await?;
    let client = NatsClient::new(builder(&server)?).await?;

    assert_eq!(client.name, "test_client");
    let state = client
        .check_connection()
        .await
        .expect("Failed to get NatsClient state...");
    assert!(matches!(state, async_nats::connection::State::Connected));

    client.close().await.expect("Failed to drain NatsClient");
    let _ = server.shutdown().await;
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_request_reply_round_trip() -> Result<()> {
    if !check_nats_server() {
        log::debug!("Skipping test: nats-server not available");
        return Ok(());
    }

    let server = TestNatsServer::new().await?;
    let responder = spawn_responder(&server).await?;

    let builder = builder(&server)?;
    let policy = builder.policy;
    let client = NatsClient::new(builder).await?;
    let requester = CorrelatedRequester::new(client.clone(), policy, "test");

    for id in ["first", "second"] {
        let request = Envelope::new(id, "namespace_list", &json!({}))?.encode()?;
        let reply = requester.request(SUBJECT, id, request).await?;
        let reply = Envelope::decode(&reply)?;
        assert_eq!(reply.id, id);
        assert_eq!(reply.kind, KIND_OK);
    }

    responder.abort();
    client.close().await.expect("Failed to drain NatsClient");
    let _ = server.shutdown().await;
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_request_without_responders_times_out() -> Result<()> {
    if !check_nats_server() {
        log::debug!("Skipping test: nats-server not available");
        return Ok(());
    }

    let server = TestNatsServer::new().await?;
    let builder = builder(&server)?;
    let policy = builder.policy;
    let client = NatsClient::new(builder).await?;
    let requester = CorrelatedRequester::new(client.clone(), policy, "test");

    let request = Envelope::new("lonely", "namespace_list", &json!({}))?.encode()?;
    let err = requester
        .request(SUBJECT, "lonely", request)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        TransportError::Timeout {
            subject: SUBJECT.to_string(),
            attempts: 3,
        }
    );

    client.close().await.expect("Failed to drain NatsClient");
    let _ = server.shutdown().await;
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_token_authentication() -> Result<()> {
    if !check_nats_server() {
        log::debug!("Skipping test: nats-server not available");
        return Ok(());
    }

    let server = TestNatsServer::with_token("s3cr3t").await?;

    let rejected = NatsClient::new(NatsClientBuilder {
        credentials: Some(vec![Credentials::Token("wrong".to_string())]),
        ..builder(&server)?
    })
    .await;
    assert!(matches!(rejected, Err(TransportError::Connection { .. })));

    let accepted = NatsClient::new(NatsClientBuilder {
        credentials: Some(vec![Credentials::Token("s3cr3t".to_string())]),
        ..builder(&server)?
    })
    .await?;
    accepted.close().await.expect("Failed to drain NatsClient");

    let _ = server.shutdown().await;
    Ok(())
}
