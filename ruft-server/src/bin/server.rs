use anyhow::Result;
use env_logger;
use log::*;
use ruft_server::{Config, Server};
use tokio::signal;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = Config::new_from_args()?;
    let mut server = Server::bind(config).await?;

    tokio::select! {
        result = server.start(None) => {
            if let Err(err) = result {
                error!("server error occurred: {}", err);
                return Err(err);
            }
        }
        _ = signal::ctrl_c() => info!("interrupt received, shutting down"),
    }

    info!("ruft server exiting");
    Ok(())
}
