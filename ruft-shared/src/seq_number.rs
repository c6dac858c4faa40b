use std::fmt::Display;
use std::{cmp, ops};

/// Position of a packet within one direction of a session. Each direction
/// counts packets independently, starting from the initial value exchanged
/// during the handshake, and wraps around once the u32 space is exhausted.
#[derive(Debug, PartialEq, Copy, Clone, Hash, Eq)]
pub struct SequenceNumber(pub u32);

impl SequenceNumber {
    /// The sequence number consumed by the next packet sent in this direction.
    pub fn next(self) -> Self {
        self + SequenceNumber(1)
    }

    /// Number of sequence steps from `base` up to this number, accounting
    /// for wrap. The upload window uses this to turn an ACK back into a
    /// chunk index.
    pub fn offset_from(self, base: SequenceNumber) -> u32 {
        self.0.wrapping_sub(base.0)
    }
}

impl ops::Add<SequenceNumber> for SequenceNumber {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.wrapping_add(rhs.0))
    }
}

/// Receivers compare sequence numbers to tell a stale duplicate
/// (`seq < expected`, re-acknowledge without writing) from a packet ahead
/// of the expected position (drop, the sender will retransmit in order).
/// That distinction has to survive the counter wrapping mid-transfer, so
/// instead of comparing raw values we look at the forward distance: a
/// number counts as ahead of another when it lies less than half the
/// sequence space past it. Hence `Seq(0)` is greater than `Seq(u32::MAX)`.
impl cmp::PartialOrd for SequenceNumber {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        let forward = self.offset_from(*other);

        if forward == 0 {
            Some(cmp::Ordering::Equal)
        } else if forward < u32::MAX / 2 {
            Some(cmp::Ordering::Greater)
        } else {
            Some(cmp::Ordering::Less)
        }
    }
}

impl Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Seq({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_wraps() {
        assert_eq!(SequenceNumber(1) + SequenceNumber(1), SequenceNumber(2));
        assert_eq!(
            SequenceNumber(u32::MAX) + SequenceNumber(1),
            SequenceNumber(0)
        );
    }

    #[test]
    fn test_next() {
        assert_eq!(SequenceNumber(10).next(), SequenceNumber(11));
        assert_eq!(SequenceNumber(u32::MAX).next(), SequenceNumber(0));
    }

    #[test]
    fn test_offset_from() {
        assert_eq!(SequenceNumber(10).offset_from(SequenceNumber(4)), 6);
        assert_eq!(SequenceNumber(4).offset_from(SequenceNumber(4)), 0);
        assert_eq!(SequenceNumber(1).offset_from(SequenceNumber(u32::MAX)), 2);
    }

    #[test]
    fn test_ordering_detects_stale_duplicates() {
        let expected = SequenceNumber(1000);

        assert!(SequenceNumber(999) < expected);
        assert!(SequenceNumber(500) < expected);
        assert!(!(SequenceNumber(1000) < expected));
        assert!(SequenceNumber(1001) > expected);
    }

    #[test]
    fn test_ordering_survives_wrap() {
        // A duplicate from just before the wrap is still recognised as old
        assert!(SequenceNumber(u32::MAX) < SequenceNumber(0));
        assert!(SequenceNumber(u32::MAX - 5) < SequenceNumber(3));

        // And the freshly wrapped numbers count as ahead
        assert!(SequenceNumber(0) > SequenceNumber(u32::MAX));
        assert!(SequenceNumber(3) > SequenceNumber(u32::MAX - 5));
    }

    #[test]
    fn test_ordering_is_consistent() {
        let pairs = [
            (SequenceNumber(1), SequenceNumber(2)),
            (SequenceNumber(500), SequenceNumber(1000)),
            (SequenceNumber(u32::MAX), SequenceNumber(4)),
        ];

        for (smaller, larger) in pairs {
            assert!(smaller < larger);
            assert!(smaller <= larger);
            assert!(larger > smaller);
            assert!(larger >= smaller);
            assert_ne!(smaller, larger);
        }

        assert!(SequenceNumber(7) <= SequenceNumber(7));
        assert!(SequenceNumber(7) >= SequenceNumber(7));
    }
}
