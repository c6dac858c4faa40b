use crate::session::{Session, SessionOutcome, Transfer};
use anyhow::{Context, Result};
use log::*;
use ruft_shared::Packet;
use tokio::io::AsyncWriteExt;
use tokio::net::UdpSocket;

impl Session {
    /// Accepts a DATA packet from the uploading client. Only the expected
    /// in-order packet is written to the file; earlier sequence numbers are
    /// duplicates whose ACK was lost and are re-acknowledged without
    /// writing, later ones are dropped for the client to resend in order.
    pub(crate) async fn handle_data(
        &mut self,
        socket: &UdpSocket,
        packet: &Packet,
    ) -> Result<SessionOutcome> {
        let (file, expected_seq) = match &mut self.transfer {
            Transfer::Upload { file, expected_seq } => (file, expected_seq),
            Transfer::Download { .. } => {
                debug!(
                    "ignoring DATA packet on download session {}",
                    self.session_id
                );
                return Ok(SessionOutcome::Continue);
            }
        };

        if packet.sequence_number == *expected_seq {
            file.write_all(packet.payload.as_slice())
                .await
                .context("failed to write to stored file")?;

            *expected_seq = expected_seq.next();

            let ack = Packet::ack(packet.sequence_number, self.session_id);
            socket
                .send_to(ack.to_vec().as_slice(), self.peer_addr)
                .await
                .context("failed to send ACK")?;
        } else if packet.sequence_number < *expected_seq {
            debug!(
                "duplicate DATA [seq: {}] on session {}, resending ACK",
                packet.sequence_number, self.session_id
            );

            let ack = Packet::ack(packet.sequence_number, self.session_id);
            socket
                .send_to(ack.to_vec().as_slice(), self.peer_addr)
                .await
                .context("failed to send ACK")?;
        } else {
            debug!(
                "dropping out of order DATA [seq: {}, expected: {}] on session {}",
                packet.sequence_number, expected_seq, self.session_id
            );
        }

        Ok(SessionOutcome::Continue)
    }

    /// Completes an upload: the file is flushed to disk before the FIN-ACK
    /// goes out so the stored file is whole once the client sees the reply.
    pub(crate) async fn handle_fin(
        &mut self,
        socket: &UdpSocket,
        packet: &Packet,
    ) -> Result<SessionOutcome> {
        match &mut self.transfer {
            Transfer::Upload { file, .. } => {
                file.flush()
                    .await
                    .context("failed to flush stored file")?;

                let fin_ack = Packet::fin_ack(packet.sequence_number, self.session_id);
                socket
                    .send_to(fin_ack.to_vec().as_slice(), self.peer_addr)
                    .await
                    .context("failed to send FIN-ACK")?;

                info!("upload session {} completed", self.session_id);
                Ok(SessionOutcome::Closed)
            }
            Transfer::Download { .. } => {
                debug!("ignoring FIN packet on download session {}", self.session_id);
                Ok(SessionOutcome::Continue)
            }
        }
    }
}
