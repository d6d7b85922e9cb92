//! Burst transfer orchestration (chunked reads and writes).

use super::io::{Transport, read_answer, write_frame};
use super::protocol::{Command, read_request_payload};
use super::types::{Answer, ChunkKind, Direction};
use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use std::ops::Range;
use tracing::{debug, error, warn};

/// Send one command and read its answer. The caller holds the link lock.
///
/// An answer whose opcode does not echo the request is logged and still returned.
pub(crate) fn send_command<T: Transport + ?Sized>(
    port: &mut T,
    config: &LinkConfig,
    command: &Command<'_>,
) -> Result<Answer> {
    let frame = command.encode()?;
    write_frame(port, &frame)?;
    let answer = read_answer(port, config)?;
    if answer.cmd != command.cmd {
        warn!("Answer {} does not echo request {}", answer.cmd, command.cmd);
    }
    Ok(answer)
}

/// One chunk of a burst.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Chunk {
    pub kind: ChunkKind,
    pub range: Range<usize>,
}

/// Splits `total` bytes into chunks of at most `cap` bytes.
///
/// A transfer that fits in one chunk is `Atomic`; otherwise the sequence is
/// `First`, any number of `Middle`, then one `End` carrying the residue
/// (a full chunk when `total` is a multiple of `cap`).
#[derive(Debug, Clone)]
pub(crate) struct ChunkPlan {
    total: usize,
    cap: usize,
    offset: usize,
}

impl ChunkPlan {
    pub(crate) fn new(total: usize, cap: usize) -> Self {
        Self { total, cap, offset: 0 }
    }
}

impl Iterator for ChunkPlan {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.offset >= self.total || self.cap == 0 {
            return None;
        }

        let remaining = self.total - self.offset;
        let chunk = if remaining > self.cap {
            let kind = if self.offset == 0 {
                ChunkKind::First
            } else {
                ChunkKind::Middle
            };
            Chunk {
                kind,
                range: self.offset..self.offset + self.cap,
            }
        } else {
            let kind = if self.total <= self.cap {
                ChunkKind::Atomic
            } else {
                ChunkKind::End
            };
            Chunk {
                kind,
                range: self.offset..self.total,
            }
        };

        self.offset = chunk.range.end;
        Some(chunk)
    }
}

/// Write `data` to `addr`, chunked by the TX capacity.
///
/// Aborts on the first failing chunk; MCU state after that is undefined.
pub(crate) fn write_burst<T: Transport + ?Sized>(
    port: &mut T,
    config: &LinkConfig,
    addr: u8,
    data: &[u8],
) -> Result<()> {
    if data.is_empty() {
        return Err(LinkError::invalid("write burst of zero bytes"));
    }

    debug!("Write burst: addr={addr:#04x}, size={}", data.len());
    for chunk in ChunkPlan::new(data.len(), config.tx_capacity) {
        let opcode = Direction::Write.opcode(chunk.kind);
        let command = Command::new(opcode, addr, &data[chunk.range.clone()]);
        if let Err(e) = send_command(port, config, &command) {
            error!("Write burst aborted at offset {} ({opcode}): {e}", chunk.range.start);
            return Err(e);
        }
    }

    Ok(())
}

/// Fill `buf` from `addr`, chunked by the RX capacity.
///
/// Each request carries the wanted chunk length as its two-byte payload.
pub(crate) fn read_burst<T: Transport + ?Sized>(
    port: &mut T,
    config: &LinkConfig,
    addr: u8,
    buf: &mut [u8],
) -> Result<()> {
    if buf.is_empty() {
        return Err(LinkError::invalid("read burst of zero bytes"));
    }

    debug!("Read burst: addr={addr:#04x}, size={}", buf.len());
    for chunk in ChunkPlan::new(buf.len(), config.rx_capacity) {
        let opcode = Direction::Read.opcode(chunk.kind);
        let wanted = chunk.range.len();
        let request = read_request_payload(wanted);
        let answer = send_command(port, config, &Command::new(opcode, addr, &request)).map_err(|e| {
            error!("Read burst aborted at offset {} ({opcode}): {e}", chunk.range.start);
            e
        })?;

        let payload = answer.payload();
        if payload.len() < wanted {
            error!(
                "Read burst chunk at offset {} short: wanted {wanted}, got {}",
                chunk.range.start,
                payload.len()
            );
            return Err(LinkError::PayloadTruncated {
                expected: wanted,
                received: payload.len(),
            });
        }
        buf[chunk.range].copy_from_slice(&payload[..wanted]);
    }

    Ok(())
}
