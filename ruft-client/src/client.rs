use crate::Config;
use anyhow::{Context, Error, Result};
use log::*;
use rand::Rng;
use ruft_shared::{
    HandshakeRequest, Packet, PacketType, SequenceNumber, TransferOp, MAX_DATAGRAM_SIZE,
};
use std::path::Path;
use tokio::fs::File;
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// Drives a single upload or download against a remote server.
pub struct Client {
    pub(crate) config: Config,
    pub(crate) socket: UdpSocket,
    pub(crate) session_id: u32,

    /// The last sequence number used in the client-to-server direction
    pub(crate) sequence_number: SequenceNumber,
}

impl Client {
    /// Binds a local socket towards the server and seeds a fresh session id
    /// and initial sequence number.
    pub async fn connect(config: Config) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .context("failed to bind local socket")?;

        socket
            .connect((config.host(), config.port()))
            .await
            .with_context(|| {
                format!(
                    "failed to resolve server address {}:{}",
                    config.host(),
                    config.port()
                )
            })?;

        let mut rng = rand::thread_rng();

        Ok(Self {
            config,
            socket,
            session_id: rng.gen(),
            sequence_number: SequenceNumber(rng.gen_range(1..1000)),
        })
    }

    /// Runs the transfer selected by the config to completion, returning the
    /// number of payload bytes moved.
    pub async fn start_transfer(&mut self) -> Result<u64> {
        match self.config.mode() {
            TransferOp::Upload => {
                let path = self.config.filename().to_owned();
                let mut source = File::open(&path)
                    .await
                    .with_context(|| format!("failed to open {}", path))?;

                self.handshake().await?;
                let bytes = self.upload_from(&mut source).await?;

                info!("uploaded {} bytes from {}", bytes, path);
                Ok(bytes)
            }
            TransferOp::Download => {
                let server_seq = self.handshake().await?;

                let output = self.config.output_path();
                let mut sink = File::create(&output)
                    .await
                    .with_context(|| format!("failed to create {}", output.display()))?;

                let bytes = self.download_to(&mut sink, server_seq).await?;

                info!("downloaded {} bytes to {}", bytes, output.display());
                Ok(bytes)
            }
        }
    }

    /// Performs the SYN / SYN-ACK exchange, retransmitting the SYN on
    /// timeout, and returns the server's initial sequence number.
    pub(crate) async fn handshake(&mut self) -> Result<SequenceNumber> {
        let filename = match self.config.mode() {
            // Uploads are stored under their basename on the server
            TransferOp::Upload => Path::new(self.config.filename())
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    Error::msg(format!("invalid file name: {}", self.config.filename()))
                })?,
            TransferOp::Download => self.config.filename().to_owned(),
        };

        let request = HandshakeRequest::new(self.config.mode(), &filename);
        let syn = Packet::syn(self.sequence_number, self.session_id, request.to_payload());

        info!(
            "requesting {} of {} [session: {}]",
            self.config.mode(),
            filename,
            self.session_id
        );

        for attempt in 1..=self.config.retry_limit() {
            self.socket
                .send(syn.to_vec().as_slice())
                .await
                .context("failed to send SYN")?;

            match self.recv_packet().await? {
                Some(packet) if packet.packet_type == PacketType::SynAck => {
                    debug!("received SYN-ACK [seq: {}]", packet.sequence_number);
                    return Ok(packet.sequence_number);
                }
                Some(packet) if packet.packet_type == PacketType::Error => {
                    return Err(Error::msg(format!(
                        "server rejected transfer: {}",
                        String::from_utf8_lossy(packet.payload.as_slice())
                    )));
                }
                Some(packet) => debug!(
                    "ignoring {:?} packet while waiting for SYN-ACK",
                    packet.packet_type
                ),
                None => warn!(
                    "timed out waiting for SYN-ACK, retrying ({}/{})",
                    attempt,
                    self.config.retry_limit()
                ),
            }
        }

        Err(Error::msg("server did not respond to handshake"))
    }

    /// Waits up to the configured timeout for the next packet belonging to
    /// this session. Undecodable datagrams and packets for other sessions
    /// are discarded without consuming the attempt.
    pub(crate) async fn recv_packet(&self) -> Result<Option<Packet>> {
        let mut buff = [0u8; MAX_DATAGRAM_SIZE];

        loop {
            let read = match timeout(self.config.timeout(), self.socket.recv(&mut buff)).await {
                Ok(Ok(read)) => read,
                Ok(Err(err)) => {
                    return Err(Error::from(err)).context("error while receiving datagram")
                }
                Err(_) => return Ok(None),
            };

            let packet = match Packet::parse(&buff[..read]) {
                Ok(packet) => packet,
                Err(err) => {
                    debug!("discarding undecodable datagram: {}", err);
                    continue;
                }
            };

            if packet.session_id != self.session_id {
                debug!("ignoring packet for foreign session {}", packet.session_id);
                continue;
            }

            return Ok(Some(packet));
        }
    }
}
