use crate::session::{DownloadState, Session, SessionOutcome, Transfer};
use anyhow::{Context, Result};
use log::*;
use ruft_shared::{Packet, MAX_PAYLOAD_SIZE};
use std::time::{Duration, Instant};
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::net::UdpSocket;

impl Session {
    /// Puts the next packet of the download in flight: a DATA packet holding
    /// the next chunk of the file, or a FIN once the file is exhausted.
    ///
    /// Does nothing while a packet is already awaiting acknowledgement, the
    /// timeout sweep owns retransmission of in-flight packets.
    pub(crate) async fn send_next_chunk(&mut self, socket: &UdpSocket) -> Result<()> {
        let (file, next_seq, unacked, last_send, state) = match &mut self.transfer {
            Transfer::Download {
                file,
                next_seq,
                unacked,
                last_send,
                state,
            } => (file, next_seq, unacked, last_send, state),
            Transfer::Upload { .. } => return Ok(()),
        };

        if unacked.is_some() {
            return Ok(());
        }

        let chunk = read_chunk(file)
            .await
            .context("failed to read from stored file")?;

        *next_seq = next_seq.next();

        let packet = if chunk.is_empty() {
            debug!("EOF reached for session {}, sending FIN", self.session_id);
            *state = DownloadState::FinWait;
            Packet::fin(*next_seq, self.session_id)
        } else {
            Packet::data(*next_seq, self.session_id, chunk)
        };

        socket
            .send_to(packet.to_vec().as_slice(), self.peer_addr)
            .await
            .context("failed to send datagram")?;

        debug!(
            "sent {:?} [seq: {}] to session {}",
            packet.packet_type, packet.sequence_number, self.session_id
        );

        *unacked = Some(packet);
        *last_send = Instant::now();

        Ok(())
    }

    /// Processes an ACK (or FIN-ACK) from the downloading client. A matching
    /// acknowledgement releases the in-flight packet and either advances the
    /// transfer or, in FIN_WAIT, completes the session.
    pub(crate) async fn handle_ack(
        &mut self,
        socket: &UdpSocket,
        packet: &Packet,
    ) -> Result<SessionOutcome> {
        let state = match &mut self.transfer {
            Transfer::Download { unacked, state, .. } => {
                match unacked {
                    Some(sent) if sent.sequence_number == packet.sequence_number => {}
                    Some(sent) => {
                        debug!(
                            "ignoring ACK [seq: {}] while awaiting [seq: {}] on session {}",
                            packet.sequence_number, sent.sequence_number, self.session_id
                        );
                        return Ok(SessionOutcome::Continue);
                    }
                    None => {
                        debug!(
                            "ignoring ACK [seq: {}] with no packet in flight on session {}",
                            packet.sequence_number, self.session_id
                        );
                        return Ok(SessionOutcome::Continue);
                    }
                }

                *unacked = None;
                *state
            }
            Transfer::Upload { .. } => return Ok(SessionOutcome::Continue),
        };

        match state {
            DownloadState::Transferring => {
                self.send_next_chunk(socket).await?;
                Ok(SessionOutcome::Continue)
            }
            DownloadState::FinWait => {
                info!("received FIN-ACK for session {}, closing", self.session_id);
                Ok(SessionOutcome::Closed)
            }
        }
    }

    /// Retransmits the in-flight packet when it has gone unacknowledged for
    /// longer than the retransmission timeout.
    pub(crate) async fn retransmit_if_due(
        &mut self,
        socket: &UdpSocket,
        timeout: Duration,
        now: Instant,
    ) -> Result<()> {
        if let Transfer::Download {
            unacked: Some(packet),
            last_send,
            ..
        } = &mut self.transfer
        {
            if now.duration_since(*last_send) > timeout {
                warn!(
                    "timeout, retransmitting {:?} [seq: {}] to session {}",
                    packet.packet_type, packet.sequence_number, self.session_id
                );

                socket
                    .send_to(packet.to_vec().as_slice(), self.peer_addr)
                    .await
                    .context("failed to retransmit datagram")?;

                *last_send = now;
            }
        }

        Ok(())
    }
}

/// Reads up to MAX_PAYLOAD_SIZE bytes, only returning short on EOF.
async fn read_chunk<R>(source: &mut R) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; MAX_PAYLOAD_SIZE];
    let mut filled = 0;

    while filled < chunk.len() {
        let read = source.read(&mut chunk[filled..]).await?;

        if read == 0 {
            break;
        }

        filled += read;
    }

    chunk.truncate(filled);
    Ok(chunk)
}
