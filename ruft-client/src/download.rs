use crate::Client;
use anyhow::{Context, Error, Result};
use log::*;
use ruft_shared::{Packet, PacketType, SequenceNumber};
use tokio::io::{AsyncWrite, AsyncWriteExt};

impl Client {
    /// Receives the server's DATA stream into the sink, acknowledging each
    /// in-order packet. Duplicates are re-acknowledged without being
    /// written; packets ahead of the expected sequence are dropped and left
    /// for the server to retransmit.
    pub async fn download_to<W>(&mut self, sink: &mut W, server_seq: SequenceNumber) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut expected_seq = server_seq.next();
        let mut received = 0u64;
        let mut idle_attempts = 0;

        loop {
            let packet = match self.recv_packet().await? {
                Some(packet) => {
                    idle_attempts = 0;
                    packet
                }
                None => {
                    idle_attempts += 1;

                    if idle_attempts >= self.config.retry_limit() {
                        return Err(Error::msg("timed out waiting for data from server"));
                    }

                    warn!(
                        "no data received, waiting for server retransmission ({}/{})",
                        idle_attempts,
                        self.config.retry_limit()
                    );
                    continue;
                }
            };

            match packet.packet_type {
                PacketType::Data => {
                    if packet.sequence_number == expected_seq {
                        sink.write_all(packet.payload.as_slice())
                            .await
                            .context("failed to write to destination")?;

                        received += packet.payload.len() as u64;

                        let ack = Packet::ack(packet.sequence_number, self.session_id);
                        self.socket
                            .send(ack.to_vec().as_slice())
                            .await
                            .context("failed to send ACK")?;

                        expected_seq = expected_seq.next();
                    } else if packet.sequence_number < expected_seq {
                        debug!(
                            "duplicate DATA [seq: {}], resending ACK",
                            packet.sequence_number
                        );

                        let ack = Packet::ack(packet.sequence_number, self.session_id);
                        self.socket
                            .send(ack.to_vec().as_slice())
                            .await
                            .context("failed to send ACK")?;
                    } else {
                        debug!(
                            "dropping out of order DATA [seq: {}, expected: {}]",
                            packet.sequence_number, expected_seq
                        );
                    }
                }
                PacketType::Fin => {
                    sink.flush().await.context("failed to flush destination")?;

                    let fin_ack = Packet::fin_ack(packet.sequence_number, self.session_id);
                    self.socket
                        .send(fin_ack.to_vec().as_slice())
                        .await
                        .context("failed to send FIN-ACK")?;

                    debug!(
                        "received FIN [seq: {}], download finished",
                        packet.sequence_number
                    );
                    return Ok(received);
                }
                PacketType::Error => {
                    return Err(Error::msg(format!(
                        "server error: {}",
                        String::from_utf8_lossy(packet.payload.as_slice())
                    )));
                }
                _ => debug!(
                    "ignoring {:?} packet during download",
                    packet.packet_type
                ),
            }
        }
    }
}
