use ruft_shared::{Packet, SequenceNumber};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::fs::File;

/// State held for each in-flight transfer, keyed by session id in the
/// server's registry. A session exclusively owns its file handle, which is
/// released whenever the session is removed from the registry.
pub(crate) struct Session {
    pub(crate) session_id: u32,

    /// Where datagrams for this session are sent, fixed at SYN time
    pub(crate) peer_addr: SocketAddr,

    pub(crate) transfer: Transfer,

    /// The last time a packet for this session arrived
    pub(crate) last_activity: Instant,
}

pub(crate) enum Transfer {
    /// The server is streaming a stored file to the client, one packet at a
    /// time, waiting for each ACK before reading the next chunk.
    Download {
        file: File,

        /// The last sequence number used in the server-to-client direction
        next_seq: SequenceNumber,

        /// The in-flight packet, retransmitted by the sweeper until acknowledged
        unacked: Option<Packet>,

        last_send: Instant,

        state: DownloadState,
    },

    /// The server is receiving a file from the client and acknowledging
    /// each in-order DATA packet.
    Upload {
        file: File,

        /// The next in-order sequence number expected from the client
        expected_seq: SequenceNumber,
    },
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub(crate) enum DownloadState {
    Transferring,
    FinWait,
}

/// Tells the dispatch loop whether the session survives the packet
/// that was just handled.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SessionOutcome {
    Continue,
    Closed,
}

impl Session {
    pub(crate) fn download(
        session_id: u32,
        peer_addr: SocketAddr,
        file: File,
        syn_ack_seq: SequenceNumber,
    ) -> Self {
        Self {
            session_id,
            peer_addr,
            transfer: Transfer::Download {
                file,
                next_seq: syn_ack_seq,
                unacked: None,
                last_send: Instant::now(),
                state: DownloadState::Transferring,
            },
            last_activity: Instant::now(),
        }
    }

    pub(crate) fn upload(
        session_id: u32,
        peer_addr: SocketAddr,
        file: File,
        expected_seq: SequenceNumber,
    ) -> Self {
        Self {
            session_id,
            peer_addr,
            transfer: Transfer::Upload { file, expected_seq },
            last_activity: Instant::now(),
        }
    }

    pub(crate) fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub(crate) fn is_stale(&self, ttl: Duration, now: Instant) -> bool {
        now.duration_since(self.last_activity) > ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::runtime::Runtime;

    #[test]
    fn test_session_staleness() {
        Runtime::new().unwrap().block_on(async {
            let file = File::create(std::env::temp_dir().join("ruft-session-test.bin"))
                .await
                .unwrap();

            let mut session = Session::upload(
                1,
                "127.0.0.1:9000".parse().unwrap(),
                file,
                SequenceNumber(1),
            );

            let now = Instant::now();
            assert_eq!(session.is_stale(Duration::from_millis(100), now), false);

            let later = now + Duration::from_millis(500);
            assert_eq!(session.is_stale(Duration::from_millis(100), later), true);

            session.last_activity = later;
            assert_eq!(session.is_stale(Duration::from_millis(100), later), false);
        });
    }
}
