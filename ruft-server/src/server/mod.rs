use crate::session::{Session, SessionOutcome};
use crate::Config;
use anyhow::{Context, Error, Result};
use log::*;
use ruft_shared::{
    HandshakeRequest, Packet, PacketType, TransferOp, MAX_DATAGRAM_SIZE,
};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs::File;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::timeout;


/// The server end of the protocol: one UDP socket multiplexing any number of
/// concurrent transfer sessions, demultiplexed by session id.
pub struct Server {
    config: Config,
    socket: UdpSocket,
    sessions: HashMap<u32, Session>,
}

impl Server {
    /// Binds the server socket and creates the storage directory if it does
    /// not exist yet.
    pub async fn bind(config: Config) -> Result<Self> {
        tokio::fs::create_dir_all(config.storage_dir())
            .await
            .with_context(|| {
                format!(
                    "failed to create storage directory {}",
                    config.storage_dir().display()
                )
            })?;

        let socket = UdpSocket::bind(config.bind_addr())
            .await
            .with_context(|| format!("failed to bind to {}", config.bind_addr()))?;

        info!("server listening on {}", socket.local_addr()?);
        info!("storage directory: {}", config.storage_dir().display());

        Ok(Self {
            config,
            socket,
            sessions: HashMap::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(Error::from)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Runs the receive loop until an unrecoverable socket error occurs or a
    /// message arrives on the terminate channel. Whenever the socket sits
    /// idle for a full timeout the session registry is swept for due
    /// retransmissions and stale sessions.
    pub async fn start(&mut self, terminate_rx: Option<mpsc::Receiver<()>>) -> Result<()> {
        // If the terminate channel is not supplied we create a default channel
        // that is never invoked
        let (_tx, mut terminate_rx) = match terminate_rx {
            Some(rx) => (None, rx),
            None => {
                let (tx, rx) = mpsc::channel(1);
                (Some(tx), rx)
            }
        };

        let mut buff = [0u8; MAX_DATAGRAM_SIZE];

        loop {
            if terminate_rx.try_recv().is_ok() {
                break;
            }

            let received = timeout(self.config.timeout(), self.socket.recv_from(&mut buff)).await;

            match received {
                Ok(Ok((read, peer_addr))) => self.handle_datagram(&buff[..read], peer_addr).await,
                Ok(Err(err)) => {
                    return Err(Error::from(err)).context("error while receiving datagram")
                }
                Err(_) => self.sweep_sessions().await,
            }
        }

        Ok(())
    }

    pub(crate) async fn handle_datagram(&mut self, data: &[u8], peer_addr: SocketAddr) {
        let packet = match Packet::parse(data) {
            Ok(packet) => packet,
            Err(err) => {
                debug!("discarding undecodable datagram from {}: {}", peer_addr, err);
                return;
            }
        };

        debug!(
            "received {:?} [seq: {}, session: {}] from {}",
            packet.packet_type, packet.sequence_number, packet.session_id, peer_addr
        );

        let result = match packet.packet_type {
            PacketType::Syn => self.handle_syn(&packet, peer_addr).await,
            _ => self.dispatch_to_session(&packet).await,
        };

        if let Err(err) = result {
            warn!(
                "error while handling {:?} packet from {}: {}",
                packet.packet_type, peer_addr, err
            );
        }
    }

    /// Interprets the SYN payload and either establishes a session, replying
    /// with SYN-ACK, or rejects the request with an ERROR packet.
    async fn handle_syn(&mut self, packet: &Packet, peer_addr: SocketAddr) -> Result<()> {
        let request = match HandshakeRequest::parse(packet.payload.as_slice()) {
            Ok(request) => request,
            Err(err) => {
                info!("rejecting malformed SYN from {}: {}", peer_addr, err);
                return self
                    .send_error(packet, peer_addr, "Invalid SYN payload format")
                    .await;
            }
        };

        // A retransmitted SYN replaces any half-open session with the same
        // id, recovering from a lost SYN-ACK
        if self.sessions.remove(&packet.session_id).is_some() {
            debug!(
                "session {} re-established by retransmitted SYN",
                packet.session_id
            );
        }

        let path = self.resolve_path(&request.filename);

        match request.op {
            TransferOp::Download => {
                let file = match File::open(&path).await {
                    Ok(file) => file,
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {
                        info!(
                            "rejecting DOWNLOAD of missing file {} from {}",
                            path.display(),
                            peer_addr
                        );
                        return self.send_error(packet, peer_addr, "File not found").await;
                    }
                    Err(err) => {
                        return Err(Error::from(err))
                            .with_context(|| format!("failed to open {}", path.display()))
                    }
                };

                info!(
                    "starting DOWNLOAD of {} for session {}",
                    path.display(),
                    packet.session_id
                );

                let syn_ack = Packet::syn_ack(packet.sequence_number.next(), packet.session_id);
                self.socket
                    .send_to(syn_ack.to_vec().as_slice(), peer_addr)
                    .await
                    .context("failed to send SYN-ACK")?;

                let mut session = Session::download(
                    packet.session_id,
                    peer_addr,
                    file,
                    syn_ack.sequence_number,
                );

                // The first chunk goes out on the heels of the SYN-ACK
                session.send_next_chunk(&self.socket).await?;

                self.sessions.insert(packet.session_id, session);
            }
            TransferOp::Upload => {
                let file = File::create(&path)
                    .await
                    .with_context(|| format!("failed to create {}", path.display()))?;

                info!(
                    "starting UPLOAD to {} for session {}",
                    path.display(),
                    packet.session_id
                );

                let syn_ack = Packet::syn_ack(packet.sequence_number.next(), packet.session_id);
                self.socket
                    .send_to(syn_ack.to_vec().as_slice(), peer_addr)
                    .await
                    .context("failed to send SYN-ACK")?;

                self.sessions.insert(
                    packet.session_id,
                    Session::upload(
                        packet.session_id,
                        peer_addr,
                        file,
                        packet.sequence_number.next(),
                    ),
                );
            }
        }

        Ok(())
    }

    async fn dispatch_to_session(&mut self, packet: &Packet) -> Result<()> {
        let session = match self.sessions.get_mut(&packet.session_id) {
            Some(session) => session,
            None => {
                info!(
                    "received {:?} packet for unknown session {}",
                    packet.packet_type, packet.session_id
                );
                return Ok(());
            }
        };

        session.touch();

        let outcome = match packet.packet_type {
            PacketType::Data => session.handle_data(&self.socket, packet).await,
            PacketType::Ack | PacketType::FinAck => session.handle_ack(&self.socket, packet).await,
            PacketType::Fin => session.handle_fin(&self.socket, packet).await,
            _ => {
                debug!(
                    "ignoring unexpected {:?} packet for session {}",
                    packet.packet_type, packet.session_id
                );
                Ok(SessionOutcome::Continue)
            }
        };

        match outcome {
            Ok(SessionOutcome::Continue) => {}
            Ok(SessionOutcome::Closed) => {
                self.sessions.remove(&packet.session_id);
            }
            Err(err) => {
                error!(
                    "session {} failed and will be removed: {}",
                    packet.session_id, err
                );
                self.sessions.remove(&packet.session_id);
            }
        }

        Ok(())
    }

    async fn send_error(
        &self,
        packet: &Packet,
        peer_addr: SocketAddr,
        reason: &str,
    ) -> Result<()> {
        let error = Packet::error(packet.sequence_number.next(), packet.session_id, reason);

        self.socket
            .send_to(error.to_vec().as_slice(), peer_addr)
            .await
            .context("failed to send ERROR")?;

        Ok(())
    }

    /// Retransmits due in-flight packets and evicts sessions which have had
    /// no packet activity for the stale-session TTL.
    pub(crate) async fn sweep_sessions(&mut self) {
        let now = Instant::now();
        let retransmit_timeout = self.config.timeout();

        for session in self.sessions.values_mut() {
            if let Err(err) = session
                .retransmit_if_due(&self.socket, retransmit_timeout, now)
                .await
            {
                warn!("failed to retransmit for session {}: {}", session.session_id, err);
            }
        }

        let ttl = self.config.stale_session_ttl();
        self.sessions.retain(|session_id, session| {
            let stale = session.is_stale(ttl, now);

            if stale {
                warn!("evicting stale session {}", session_id);
            }

            !stale
        });
    }

    /// Only the final path component of the requested filename is honored,
    /// protecting the storage directory against traversal.
    fn resolve_path(&self, filename: &str) -> PathBuf {
        let basename = Path::new(filename)
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();

        self.config.storage_dir().join(basename)
    }
}
