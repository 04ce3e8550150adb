// src/main.rs
use dotenvy::dotenv;
use poll_site::{config::Config, BoxError};

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    dotenv().ok(); // Load environment variables from .env file
    poll_site::init_tracing();

    let config = Config::load()?;
    poll_site::start_server(config).await
}
