pub mod envelope;
pub mod nats_client;
pub mod request_client;
pub mod types;
