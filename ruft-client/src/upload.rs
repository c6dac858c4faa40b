use crate::Client;
use anyhow::{Context, Error, Result};
use log::*;
use ruft_shared::{Packet, PacketType, SequenceNumber, MAX_PAYLOAD_SIZE};
use tokio::io::{AsyncRead, AsyncReadExt};

impl Client {
    /// Streams the source to the server using a Go-Back-N window: up to
    /// `window_size` DATA packets are kept in flight, ACKs advance the
    /// window cumulatively, and a receive timeout rolls the send position
    /// back to the oldest unacknowledged packet.
    pub async fn upload_from<R>(&mut self, source: &mut R) -> Result<u64>
    where
        R: AsyncRead + Unpin,
    {
        let chunks = read_chunks(source)
            .await
            .context("failed to read source")?;

        let base_seq = self.sequence_number.next();
        let total = chunks.len();
        let bytes = chunks.iter().map(|chunk| chunk.len() as u64).sum();

        let packets = chunks
            .into_iter()
            .enumerate()
            .map(|(idx, chunk)| {
                Packet::data(base_seq + SequenceNumber(idx as u32), self.session_id, chunk)
            })
            .collect::<Vec<Packet>>();

        info!(
            "uploading {} bytes in {} chunks (window size {})",
            bytes,
            total,
            self.config.window_size()
        );

        let mut base = 0;
        let mut next_idx = 0;

        while base < total {
            // Fill the window with any unsent packets
            while next_idx < total && next_idx < base + self.config.window_size() {
                debug!(
                    "sending DATA [seq: {}] ({}/{})",
                    packets[next_idx].sequence_number,
                    next_idx + 1,
                    total
                );

                self.socket
                    .send(packets[next_idx].to_vec().as_slice())
                    .await
                    .context("failed to send DATA")?;

                next_idx += 1;
            }

            match self.recv_packet().await? {
                Some(packet) if packet.packet_type == PacketType::Ack => {
                    let acked_idx = packet.sequence_number.offset_from(base_seq) as usize;

                    // A cumulative ACK moves the window past the acked packet
                    if acked_idx >= base && acked_idx < total {
                        base = acked_idx + 1;
                    }
                }
                Some(packet) => debug!(
                    "ignoring {:?} packet during upload",
                    packet.packet_type
                ),
                None => {
                    warn!(
                        "timed out waiting for ACK [seq: {}], resending window",
                        packets[base].sequence_number
                    );
                    next_idx = base;
                }
            }
        }

        self.sequence_number = base_seq + SequenceNumber(total as u32);
        self.finalise_upload().await?;

        Ok(bytes)
    }

    /// FIN / FIN-ACK teardown, bounded by the retry limit.
    async fn finalise_upload(&mut self) -> Result<()> {
        let fin = Packet::fin(self.sequence_number, self.session_id);

        for attempt in 1..=self.config.retry_limit() {
            self.socket
                .send(fin.to_vec().as_slice())
                .await
                .context("failed to send FIN")?;

            match self.recv_packet().await? {
                Some(packet)
                    if packet.packet_type == PacketType::FinAck
                        && packet.sequence_number == fin.sequence_number =>
                {
                    debug!("received FIN-ACK [seq: {}]", packet.sequence_number);
                    return Ok(());
                }
                Some(packet) => debug!(
                    "ignoring {:?} packet while waiting for FIN-ACK",
                    packet.packet_type
                ),
                None => warn!(
                    "timed out waiting for FIN-ACK, retrying ({}/{})",
                    attempt,
                    self.config.retry_limit()
                ),
            }
        }

        Err(Error::msg("no FIN-ACK received from server"))
    }
}

/// Splits the source into MAX_PAYLOAD_SIZE chunks, short-reading only at EOF.
async fn read_chunks<R>(source: &mut R) -> std::io::Result<Vec<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut chunks = vec![];

    loop {
        let mut chunk = vec![0u8; MAX_PAYLOAD_SIZE];
        let mut filled = 0;

        while filled < chunk.len() {
            let read = source.read(&mut chunk[filled..]).await?;

            if read == 0 {
                break;
            }

            filled += read;
        }

        if filled == 0 {
            break;
        }

        chunk.truncate(filled);
        chunks.push(chunk);
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::runtime::Runtime;

    #[test]
    fn test_read_chunks_empty_source() {
        Runtime::new().unwrap().block_on(async {
            let mut source: &[u8] = &[];

            let chunks = read_chunks(&mut source).await.unwrap();

            assert_eq!(chunks.len(), 0);
        });
    }

    #[test]
    fn test_read_chunks_single_partial_chunk() {
        Runtime::new().unwrap().block_on(async {
            let mut source: &[u8] = &[1, 2, 3];

            let chunks = read_chunks(&mut source).await.unwrap();

            assert_eq!(chunks, vec![vec![1, 2, 3]]);
        });
    }

    #[test]
    fn test_read_chunks_exact_multiple() {
        Runtime::new().unwrap().block_on(async {
            let data = vec![7u8; MAX_PAYLOAD_SIZE * 2];
            let mut source = data.as_slice();

            let chunks = read_chunks(&mut source).await.unwrap();

            assert_eq!(chunks.len(), 2);
            assert_eq!(chunks[0].len(), MAX_PAYLOAD_SIZE);
            assert_eq!(chunks[1].len(), MAX_PAYLOAD_SIZE);
        });
    }

    #[test]
    fn test_read_chunks_one_byte_over_window() {
        Runtime::new().unwrap().block_on(async {
            let data = vec![5u8; MAX_PAYLOAD_SIZE * 4 + 1];
            let mut source = data.as_slice();

            let chunks = read_chunks(&mut source).await.unwrap();

            let sizes = chunks.iter().map(|chunk| chunk.len()).collect::<Vec<_>>();
            assert_eq!(
                sizes,
                vec![
                    MAX_PAYLOAD_SIZE,
                    MAX_PAYLOAD_SIZE,
                    MAX_PAYLOAD_SIZE,
                    MAX_PAYLOAD_SIZE,
                    1
                ]
            );
        });
    }
}
