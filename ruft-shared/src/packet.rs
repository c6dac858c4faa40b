use crate::SequenceNumber;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::convert::TryFrom;
use std::io::Cursor;
use thiserror::Error;

/// Total packed size of the packet header in bytes
pub const HEADER_SIZE: usize = 12;

/// Maximum number of payload bytes carried by a single packet
pub const MAX_PAYLOAD_SIZE: usize = 1024;

/// Largest datagram either endpoint will send or accept
pub const MAX_DATAGRAM_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD_SIZE;

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum PacketType {
    Syn,
    SynAck,
    Data,
    Ack,
    Fin,
    FinAck,
    Error,
}

impl PacketType {
    pub fn type_id(&self) -> u8 {
        match self {
            Self::Syn => 0,
            Self::SynAck => 1,
            Self::Data => 2,
            Self::Ack => 3,
            Self::Fin => 4,
            Self::FinAck => 5,
            Self::Error => 6,
        }
    }
}

impl TryFrom<u8> for PacketType {
    type Error = PacketParseError;

    fn try_from(type_id: u8) -> Result<Self, PacketParseError> {
        let packet_type = match type_id {
            0 => Self::Syn,
            1 => Self::SynAck,
            2 => Self::Data,
            3 => Self::Ack,
            4 => Self::Fin,
            5 => Self::FinAck,
            6 => Self::Error,
            _ => return Err(PacketParseError::UnknownPacketType(type_id)),
        };

        Ok(packet_type)
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Packet {
    pub packet_type: PacketType,

    /// The position of this packet within its direction of the session
    pub sequence_number: SequenceNumber,

    /// Identifies which session the packet belongs to
    pub session_id: u32,

    /// The payload of the packet
    pub payload: Vec<u8>,
}

#[derive(Error, Debug, PartialEq)]
pub enum PacketParseError {
    #[error("received packet is too small: {0} bytes")]
    BufferTooSmall(usize),
    #[error("received packet payload length mismatch, expected {0} != actual {1}")]
    PayloadLengthMismatch(usize, usize),
    #[error("received packet payload length {0} exceeds the {MAX_PAYLOAD_SIZE} byte limit")]
    PayloadTooLarge(usize),
    #[error("unknown packet type id: {0}")]
    UnknownPacketType(u8),
    #[error("packet checksum mismatch, expected {expected} != actual {actual}")]
    ChecksumMismatch { expected: u8, actual: u8 },
}

impl Packet {
    pub fn syn(sequence_number: SequenceNumber, session_id: u32, payload: Vec<u8>) -> Self {
        Self::new(PacketType::Syn, sequence_number, session_id, payload)
    }

    pub fn syn_ack(sequence_number: SequenceNumber, session_id: u32) -> Self {
        Self::new(
            PacketType::SynAck,
            sequence_number,
            session_id,
            b"OK".to_vec(),
        )
    }

    pub fn data(sequence_number: SequenceNumber, session_id: u32, payload: Vec<u8>) -> Self {
        assert!(payload.len() <= MAX_PAYLOAD_SIZE);

        Self::new(PacketType::Data, sequence_number, session_id, payload)
    }

    pub fn ack(sequence_number: SequenceNumber, session_id: u32) -> Self {
        Self::new(PacketType::Ack, sequence_number, session_id, vec![])
    }

    pub fn fin(sequence_number: SequenceNumber, session_id: u32) -> Self {
        Self::new(PacketType::Fin, sequence_number, session_id, vec![])
    }

    pub fn fin_ack(sequence_number: SequenceNumber, session_id: u32) -> Self {
        Self::new(PacketType::FinAck, sequence_number, session_id, vec![])
    }

    pub fn error(sequence_number: SequenceNumber, session_id: u32, reason: &str) -> Self {
        Self::new(
            PacketType::Error,
            sequence_number,
            session_id,
            reason.as_bytes().to_vec(),
        )
    }

    fn new(
        packet_type: PacketType,
        sequence_number: SequenceNumber,
        session_id: u32,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            packet_type,
            sequence_number,
            session_id,
            payload,
        }
    }

    pub fn parse(data: &[u8]) -> Result<Packet, PacketParseError> {
        if data.len() < HEADER_SIZE {
            return Err(PacketParseError::BufferTooSmall(data.len()));
        }

        let mut cursor = Cursor::new(data);

        let type_id = cursor.read_u8().unwrap();
        let sequence_number = SequenceNumber(cursor.read_u32::<BigEndian>().unwrap());
        let session_id = cursor.read_u32::<BigEndian>().unwrap();
        let length = cursor.read_u16::<BigEndian>().unwrap() as usize;
        let checksum = cursor.read_u8().unwrap();

        if length > MAX_PAYLOAD_SIZE {
            return Err(PacketParseError::PayloadTooLarge(length));
        }

        let payload_start = cursor.position() as usize;
        let payload_end = payload_start + length;
        let data = cursor.into_inner();

        if data.len() < payload_end {
            return Err(PacketParseError::PayloadLengthMismatch(
                length,
                data.len() - payload_start,
            ));
        }

        // Datagrams longer than the stated payload length are truncated,
        // the trailing bytes are not part of the packet.
        let payload = data[payload_start..payload_end].to_vec();

        let packet_type = PacketType::try_from(type_id)?;
        let packet = Packet::new(packet_type, sequence_number, session_id, payload);

        let expected = packet.calculate_checksum();
        if expected != checksum {
            return Err(PacketParseError::ChecksumMismatch {
                expected,
                actual: checksum,
            });
        }

        Ok(packet)
    }

    pub fn to_vec(&self) -> Vec<u8> {
        use std::io::Write;

        let buff = Vec::with_capacity(HEADER_SIZE + self.payload.len());

        let mut cursor = Cursor::new(buff);
        cursor.write_u8(self.packet_type.type_id()).unwrap();
        cursor
            .write_u32::<BigEndian>(self.sequence_number.0)
            .unwrap();
        cursor.write_u32::<BigEndian>(self.session_id).unwrap();
        cursor
            .write_u16::<BigEndian>(self.payload.len() as u16)
            .unwrap();
        cursor.write_u8(self.calculate_checksum()).unwrap();
        cursor.write_all(self.payload.as_slice()).unwrap();

        cursor.into_inner()
    }

    /// XOR of every header byte except the checksum byte itself, followed by
    /// every payload byte.
    pub fn calculate_checksum(&self) -> u8 {
        let mut header = [0u8; HEADER_SIZE - 1];
        header[0] = self.packet_type.type_id();
        header[1..5].copy_from_slice(&self.sequence_number.0.to_be_bytes());
        header[5..9].copy_from_slice(&self.session_id.to_be_bytes());
        header[9..11].copy_from_slice(&(self.payload.len() as u16).to_be_bytes());

        header
            .iter()
            .chain(self.payload.iter())
            .fold(0, |checksum, byte| checksum ^ byte)
    }
}
