//! MCU bridge link over USB CDC.
//!
//! Implements the framed request/response protocol spoken by the
//! concentrator's microcontroller: register access, chunked bursts and
//! the firmware handshake, serialized by one lock per link.

mod client;
mod device;
mod io;
mod protocol;
mod transfer;
mod types;


// Re-export public API
pub use client::McuLink;
pub use device::{Connector, TtyConnector};
pub use io::Transport;
pub use protocol::{Command, answer_read_len};
pub use types::{ACK_KO, ACK_OK, Answer, Opcode, RX_PAYLOAD_MAX, TX_PAYLOAD_MAX};
