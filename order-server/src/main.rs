use order_server::common::logger;
use order_server::{Config, Server, ServerState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logger::init_logger();

    let config = Config::from_env();
    tracing::info!(
        environment = %config.environment,
        port = config.http_port,
        "order server starting"
    );

    let state = ServerState::initialize(&config)?;
    Server::with_state(config, state).run().await
}
