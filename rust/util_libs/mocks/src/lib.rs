pub mod bus;
pub mod test_nats_server;
