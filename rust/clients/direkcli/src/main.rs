/*
 This client talks to the Direktiv service over NATS.

// It is responsible for:
  - managing namespaces, workflows, secrets and registries
  - executing workflows and inspecting their instances
  - checking the connection to the NATS server

Every command is one correlated request/reply on the service subject, sent over a single
NATS session that is opened before and closed after the command.
*/

mod cli;
mod cmds;
mod errors;
mod output;

use clap::Parser;
use dotenv::dotenv;

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();

    let root = cli::Root::parse();
    if let Err(e) = cmds::run(root).await {
        log::error!("{e}");
        errors::report(&mut std::io::stderr(), &e);
        std::process::exit(1);
    }
}
