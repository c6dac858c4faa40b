use anyhow::Result;
use env_logger;
use log::error;
use ruft_client::{Client, Config};
use std::process::exit;

#[tokio::main]
async fn main() -> () {
    env_logger::init();

    let config = Config::new_from_args();

    match run(config).await {
        Ok(_) => exit(0),
        Err(err) => {
            error!("transfer failed: {:?}", err);
            exit(1)
        }
    }
}

async fn run(config: Config) -> Result<u64> {
    let mut client = Client::connect(config).await?;

    client.start_transfer().await
}
