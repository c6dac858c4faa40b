mod handshake;
mod packet;
mod seq_number;

pub use handshake::*;
pub use packet::*;
pub use seq_number::*;
