//! MCU bridge frame building and parsing.

use super::types::{CMD_HEADER_RX_SIZE, CMD_HEADER_TX_SIZE, Opcode, REQUEST_FRAME_MAX, TX_PAYLOAD_MAX, USB_PACKET_SIZE};
use crate::error::{LinkError, Result};

/// Request sent to the MCU.
///
/// Wire layout: `[cmd][len_msb][len_lsb][addr][payload...]`, length big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command<'a> {
    pub cmd: Opcode,
    pub addr: u8,
    pub payload: &'a [u8],
}

/// Encoded request frame in inline storage.
#[derive(Debug)]
pub(crate) struct RequestFrame {
    buf: [u8; REQUEST_FRAME_MAX],
    len: usize,
}

impl RequestFrame {
    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl<'a> Command<'a> {
    pub fn new(cmd: Opcode, addr: u8, payload: &'a [u8]) -> Self {
        Self { cmd, addr, payload }
    }

    /// Encode into a request frame of `4 + payload.len()` bytes.
    pub(crate) fn encode(&self) -> Result<RequestFrame> {
        let len = self.payload.len();
        if len > TX_PAYLOAD_MAX {
            return Err(LinkError::invalid(format!(
                "payload of {len} bytes exceeds TX capacity {TX_PAYLOAD_MAX}"
            )));
        }

        let mut buf = [0u8; REQUEST_FRAME_MAX];
        let [len_msb, len_lsb] = (len as u16).to_be_bytes();
        buf[0] = self.cmd.as_byte();
        buf[1] = len_msb;
        buf[2] = len_lsb;
        buf[3] = self.addr;
        buf[CMD_HEADER_TX_SIZE..CMD_HEADER_TX_SIZE + len].copy_from_slice(self.payload);

        Ok(RequestFrame {
            buf,
            len: CMD_HEADER_TX_SIZE + len,
        })
    }

    /// Parse a request frame, as the MCU side would.
    pub fn decode(frame: &'a [u8]) -> Result<Self> {
        if frame.len() < CMD_HEADER_TX_SIZE {
            return Err(LinkError::framing(format!("request too short: {} bytes", frame.len())));
        }
        let cmd = Opcode::from_byte(frame[0])
            .ok_or_else(|| LinkError::framing(format!("unknown command byte {:#04x}", frame[0])))?;
        let len = u16::from_be_bytes([frame[1], frame[2]]) as usize;
        if frame.len() != CMD_HEADER_TX_SIZE + len {
            return Err(LinkError::framing(format!(
                "request declares {len} payload bytes, carries {}",
                frame.len() - CMD_HEADER_TX_SIZE
            )));
        }
        Ok(Self {
            cmd,
            addr: frame[3],
            payload: &frame[CMD_HEADER_TX_SIZE..],
        })
    }
}

/// Answer header: `[cmd][len_msb][len_lsb]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AnswerHeader {
    pub cmd: Opcode,
    pub declared_len: usize,
}

/// Accept a header only if its first byte belongs to the command set.
pub(crate) fn parse_answer_header(header: &[u8; CMD_HEADER_RX_SIZE]) -> Option<AnswerHeader> {
    let cmd = Opcode::from_byte(header[0])?;
    Some(AnswerHeader {
        cmd,
        declared_len: u16::from_be_bytes([header[1], header[2]]) as usize,
    })
}

/// Bytes to read after the header for a payload of `declared_len`.
///
/// When the whole answer fills an exact number of USB packets the driver
/// appends one padding byte, which must be consumed.
pub fn answer_read_len(declared_len: usize) -> usize {
    if (CMD_HEADER_RX_SIZE + declared_len) % USB_PACKET_SIZE == 0 {
        declared_len + 1
    } else {
        declared_len
    }
}

/// Two-byte read burst request payload carrying the chunk length.
pub(crate) fn read_request_payload(chunk_len: usize) -> [u8; 2] {
    (chunk_len as u16).to_be_bytes()
}
