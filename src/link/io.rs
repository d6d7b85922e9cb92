//! Low-level byte-stream I/O: frame writes and answer synchronization.

use super::protocol::{AnswerHeader, RequestFrame, answer_read_len, parse_answer_header};
use super::types::{Answer, CMD_HEADER_RX_SIZE, RX_PAYLOAD_MAX};
use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use std::io::{self, ErrorKind, Read, Write};
use std::thread;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Blocking byte-stream endpoint to the MCU.
///
/// Implemented for every `Read + Write` type, so an opened tty `File`
/// qualifies directly.
pub trait Transport {
    /// Write `bytes`, returning how many were accepted.
    fn send(&mut self, bytes: &[u8]) -> io::Result<usize>;

    /// Read up to `buf.len()` bytes; `Ok(0)` means nothing arrived in time.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl<T: Read + Write> Transport for T {
    fn send(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let written = self.write(bytes)?;
        self.flush()?;
        Ok(written)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read(buf)
    }
}

/// USB CDC reads report these between frames; they are retried.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
    )
}

/// Write one request frame in a single call.
pub(crate) fn write_frame<T: Transport + ?Sized>(port: &mut T, frame: &RequestFrame) -> Result<()> {
    let bytes = frame.as_bytes();
    let written = port.send(bytes).map_err(|e| {
        error!("Write failed: {e}");
        LinkError::Write(format!("write failed: {e}"))
    })?;
    if written != bytes.len() {
        error!("Short write: {written} of {} bytes", bytes.len());
        return Err(LinkError::Write(format!(
            "short write: {written} of {} bytes",
            bytes.len()
        )));
    }

    debug!(
        "TX '{}' ({} bytes): {:02X?}",
        bytes[0] as char,
        bytes.len(),
        &bytes[..bytes.len().min(16)]
    );
    Ok(())
}

/// Wait for an answer header, skipping empty reads and garbage.
///
/// The MCU writes the header atomically, so a partial delivery is a
/// framing failure rather than something to stitch together.
pub(crate) fn read_header<T: Transport + ?Sized>(port: &mut T, retries: u32) -> Result<AnswerHeader> {
    let mut header = [0u8; CMD_HEADER_RX_SIZE];

    for attempt in 1..=retries {
        header.fill(0);
        match port.recv(&mut header) {
            Ok(0) => {
                debug!("No answer data yet (attempt {attempt}/{retries})");
            }
            Ok(n) if n < CMD_HEADER_RX_SIZE => {
                error!("Incomplete answer header: {:02X?}", &header[..n]);
                return Err(LinkError::framing(format!(
                    "incomplete answer header: {n} of {CMD_HEADER_RX_SIZE} bytes"
                )));
            }
            Ok(_) => match parse_answer_header(&header) {
                Some(parsed) => return Ok(parsed),
                None => warn!("Discarding unexpected bytes {header:02X?}, resynchronizing"),
            },
            Err(e) if is_transient(&e) => {
                warn!("Transient read error (attempt {attempt}/{retries}): {e}");
            }
            Err(e) => {
                error!("Read failed: {e}");
                return Err(LinkError::Io(e));
            }
        }
    }

    error!("No answer header after {retries} reads");
    Err(LinkError::SyncTimeout { attempts: retries })
}

/// Read the payload announced by `header`, consuming any USB padding byte.
pub(crate) fn read_payload<T: Transport + ?Sized>(
    port: &mut T,
    header: AnswerHeader,
    config: &LinkConfig,
) -> Result<Answer> {
    let declared_len = header.declared_len;
    if declared_len > RX_PAYLOAD_MAX {
        error!("Answer declares {declared_len} bytes, buffer holds {RX_PAYLOAD_MAX}");
        return Err(LinkError::framing(format!(
            "answer length {declared_len} exceeds {RX_PAYLOAD_MAX}"
        )));
    }

    // Give the MCU time to queue the payload on USB.
    thread::sleep(config.payload_delay(declared_len));

    let read_len = answer_read_len(declared_len);
    let deadline = config.payload_timeout().map(|t| Instant::now() + t);
    let mut answer = Answer::new(header.cmd);
    let target = answer.fill_target(declared_len, read_len);

    let mut received = 0;
    while received < read_len {
        match port.recv(&mut target[received..]) {
            Ok(n) if n > 0 => received += n,
            Ok(_) => {
                if !deadline.is_some_and(|d| Instant::now() < d) {
                    break;
                }
            }
            Err(e) if is_transient(&e) => {
                if !deadline.is_some_and(|d| Instant::now() < d) {
                    warn!("Payload read gave up: {e}");
                    break;
                }
            }
            Err(e) => {
                error!("Payload read failed: {e}");
                return Err(LinkError::Io(e));
            }
        }
    }

    if received < read_len {
        error!("Payload truncated: expected {read_len} bytes, got {received}");
        return Err(LinkError::PayloadTruncated {
            expected: read_len,
            received,
        });
    }
    if read_len > declared_len {
        debug!("Discarded USB padding byte after {declared_len}-byte payload");
    }

    Ok(answer)
}

/// Read one complete answer: header sync, pacing delay, payload.
pub(crate) fn read_answer<T: Transport + ?Sized>(port: &mut T, config: &LinkConfig) -> Result<Answer> {
    let header = read_header(port, config.header_retries)?;
    let answer = read_payload(port, header, config)?;
    debug!(
        "RX {} ({} bytes): {:02X?}",
        answer.cmd,
        answer.payload().len(),
        &answer.payload()[..answer.payload().len().min(16)]
    );
    Ok(answer)
}
