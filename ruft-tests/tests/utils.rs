use anyhow::Result;
use ruft_client::{Client, Config as ClientConfig};
use ruft_server::{Config as ServerConfig, Server};
use ruft_shared::TransferOp;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const TEST_TIMEOUT_MS: u64 = 200;

/// A server running in a background task, stoppable through its terminate
/// channel so the final registry state can be inspected.
pub struct RunningServer {
    pub addr: SocketAddr,
    pub storage_dir: PathBuf,
    terminate_tx: mpsc::Sender<()>,
    handle: JoinHandle<Server>,
}

impl RunningServer {
    pub async fn start() -> Self {
        let storage_dir = temp_dir("server");

        let config = ServerConfig::default()
            .with_bind_addr("127.0.0.1:0".parse().unwrap())
            .with_storage_dir(storage_dir.clone())
            .with_timeout(Duration::from_millis(TEST_TIMEOUT_MS));

        let mut server = Server::bind(config).await.unwrap();
        let addr = server.local_addr().unwrap();

        let (terminate_tx, terminate_rx) = mpsc::channel(1);
        let handle = tokio::spawn(async move {
            server.start(Some(terminate_rx)).await.unwrap();
            server
        });

        Self {
            addr,
            storage_dir,
            terminate_tx,
            handle,
        }
    }

    pub async fn stop(self) -> Server {
        self.terminate_tx.send(()).await.unwrap();
        self.handle.await.unwrap()
    }

    pub fn stored_file(&self, name: &str) -> PathBuf {
        self.storage_dir.join(name)
    }
}

pub fn temp_dir(prefix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "ruft-tests-{}-{}",
        prefix,
        rand::random::<u32>()
    ));

    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Deterministic payload so corruption and reordering show up in comparisons.
pub fn test_content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

pub fn client_config(server_addr: SocketAddr, mode: TransferOp, filename: &str) -> ClientConfig {
    ClientConfig::new(
        &server_addr.ip().to_string(),
        server_addr.port(),
        mode,
        filename,
    )
    .with_timeout(Duration::from_millis(TEST_TIMEOUT_MS))
}

pub async fn upload_file(server_addr: SocketAddr, path: &Path) -> Result<u64> {
    let config = client_config(server_addr, TransferOp::Upload, path.to_str().unwrap());

    let mut client = Client::connect(config).await?;
    client.start_transfer().await
}

pub async fn download_file(server_addr: SocketAddr, filename: &str, output: &Path) -> Result<u64> {
    let config = client_config(server_addr, TransferOp::Download, filename)
        .with_output_path(output.to_owned());

    let mut client = Client::connect(config).await?;
    client.start_transfer().await
}

/// A UDP proxy which forwards datagrams between one client and the server,
/// dropping every `drop_to_server`-th datagram heading to the server and
/// every `drop_to_client`-th datagram heading back (0 disables dropping for
/// that direction).
pub async fn start_lossy_proxy(
    upstream: SocketAddr,
    drop_to_server: usize,
    drop_to_client: usize,
) -> SocketAddr {
    assert!(drop_to_server != 1 && drop_to_client != 1);

    let client_side = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
    let proxy_addr = client_side.local_addr().unwrap();

    let server_side = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
    server_side.connect(upstream).await.unwrap();

    let client_addr = Arc::new(Mutex::new(None::<SocketAddr>));

    {
        let client_side = Arc::clone(&client_side);
        let server_side = Arc::clone(&server_side);
        let client_addr = Arc::clone(&client_addr);

        tokio::spawn(async move {
            let mut buff = [0u8; 2048];
            let mut count = 0usize;

            loop {
                let (read, from_addr) = match client_side.recv_from(&mut buff).await {
                    Ok(received) => received,
                    Err(_) => break,
                };

                *client_addr.lock().unwrap() = Some(from_addr);

                count += 1;
                if drop_to_server != 0 && count % drop_to_server == 0 {
                    log::debug!("proxy dropping datagram #{} to server", count);
                    continue;
                }

                let _ = server_side.send(&buff[..read]).await;
            }
        });
    }

    tokio::spawn(async move {
        let mut buff = [0u8; 2048];
        let mut count = 0usize;

        loop {
            let read = match server_side.recv(&mut buff).await {
                Ok(read) => read,
                Err(_) => break,
            };

            count += 1;
            if drop_to_client != 0 && count % drop_to_client == 0 {
                log::debug!("proxy dropping datagram #{} to client", count);
                continue;
            }

            let destination = *client_addr.lock().unwrap();
            if let Some(addr) = destination {
                let _ = client_side.send_to(&buff[..read], addr).await;
            }
        }
    });

    proxy_addr
}
