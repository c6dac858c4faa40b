use std::convert::TryFrom;
use std::fmt::Display;
use std::str;
use thiserror::Error;

/// Which direction a session moves file data in, from the client's
/// point of view.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum TransferOp {
    Upload,
    Download,
}

/// The request carried in a SYN payload, formatted as `OP|FILENAME`.
///
/// The filename is split off at the first `|` so that filenames containing
/// the separator survive the round trip.
#[derive(Debug, PartialEq, Clone)]
pub struct HandshakeRequest {
    pub op: TransferOp,
    pub filename: String,
}

#[derive(Error, Debug, PartialEq)]
pub enum HandshakeParseError {
    #[error("handshake payload is not valid utf-8")]
    InvalidUtf8,
    #[error("handshake payload is missing the '|' separator")]
    MissingSeparator,
    #[error("unknown transfer operation: {0}")]
    UnknownOp(String),
}

impl HandshakeRequest {
    pub fn new(op: TransferOp, filename: &str) -> Self {
        Self {
            op,
            filename: filename.to_owned(),
        }
    }

    pub fn parse(payload: &[u8]) -> Result<Self, HandshakeParseError> {
        let payload = str::from_utf8(payload).map_err(|_| HandshakeParseError::InvalidUtf8)?;

        let (op, filename) = match payload.find('|') {
            Some(idx) => (&payload[..idx], &payload[idx + 1..]),
            None => return Err(HandshakeParseError::MissingSeparator),
        };

        Ok(Self {
            op: TransferOp::try_from(op)?,
            filename: filename.to_owned(),
        })
    }

    pub fn to_payload(&self) -> Vec<u8> {
        format!("{}|{}", self.op, self.filename).into_bytes()
    }
}

impl TryFrom<&str> for TransferOp {
    type Error = HandshakeParseError;

    fn try_from(value: &str) -> Result<Self, HandshakeParseError> {
        let op = match value {
            "UPLOAD" => Self::Upload,
            "DOWNLOAD" => Self::Download,
            _ => return Err(HandshakeParseError::UnknownOp(value.to_owned())),
        };

        Ok(op)
    }
}

impl Display for TransferOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upload => write!(f, "UPLOAD"),
            Self::Download => write!(f, "DOWNLOAD"),
        }
    }
}
