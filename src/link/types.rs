//! MCU bridge protocol types and constants.

use std::fmt;

// Frame geometry
pub(crate) const CMD_HEADER_TX_SIZE: usize = 4; // cmd + len_msb + len_lsb + addr
pub(crate) const CMD_HEADER_RX_SIZE: usize = 3; // cmd + len_msb + len_lsb
pub(crate) const USB_PACKET_SIZE: usize = 64;

/// Largest write burst chunk the MCU accepts.
pub const TX_PAYLOAD_MAX: usize = 600;
/// Largest answer payload the host buffers.
pub const RX_PAYLOAD_MAX: usize = 1024 + 16 * 44;

pub(crate) const REQUEST_FRAME_MAX: usize = CMD_HEADER_TX_SIZE + TX_PAYLOAD_MAX;
// One extra byte for the USB padding quirk.
pub(crate) const ANSWER_BUFFER_SIZE: usize = RX_PAYLOAD_MAX + 1;

const _: () = assert!(TX_PAYLOAD_MAX <= u16::MAX as usize);
const _: () = assert!(RX_PAYLOAD_MAX <= u16::MAX as usize);

// Acknowledge codes carried in answer payload[0]
pub const ACK_OK: u8 = 0x01;
pub const ACK_KO: u8 = 0x00;

/// Single-letter command opcodes understood by the MCU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    ReadRegister = b'r',
    ReadBurstFirst = b's',
    ReadBurstMiddle = b't',
    ReadBurstEnd = b'u',
    ReadBurstAtomic = b'p',
    WriteRegister = b'w',
    WriteBurstFirst = b'x',
    WriteBurstMiddle = b'y',
    WriteBurstEnd = b'z',
    WriteBurstAtomic = b'a',
    Receive = b'b',
    Send = b'f',
    RxRfSetconf = b'c',
    RxIfSetconf = b'd',
    TxGainSetconf = b'h',
    BoardSetconf = b'i',
    CalibrationSnapshot = b'j',
    Trigger = b'q',
    CheckFirmware = b'l',
    McuReset = b'm',
    EnterDfu = b'n',
}

impl Opcode {
    /// Decode a wire byte; `None` for anything outside the command set.
    pub fn from_byte(byte: u8) -> Option<Self> {
        let op = match byte {
            b'r' => Self::ReadRegister,
            b's' => Self::ReadBurstFirst,
            b't' => Self::ReadBurstMiddle,
            b'u' => Self::ReadBurstEnd,
            b'p' => Self::ReadBurstAtomic,
            b'w' => Self::WriteRegister,
            b'x' => Self::WriteBurstFirst,
            b'y' => Self::WriteBurstMiddle,
            b'z' => Self::WriteBurstEnd,
            b'a' => Self::WriteBurstAtomic,
            b'b' => Self::Receive,
            b'f' => Self::Send,
            b'c' => Self::RxRfSetconf,
            b'd' => Self::RxIfSetconf,
            b'h' => Self::TxGainSetconf,
            b'i' => Self::BoardSetconf,
            b'j' => Self::CalibrationSnapshot,
            b'q' => Self::Trigger,
            b'l' => Self::CheckFirmware,
            b'm' => Self::McuReset,
            b'n' => Self::EnterDfu,
            _ => return None,
        };
        Some(op)
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", self.as_byte() as char)
    }
}

/// Position of a chunk within a burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChunkKind {
    First,
    Middle,
    End,
    Atomic,
}

/// Transfer direction of a burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Read,
    Write,
}

impl Direction {
    /// Opcode tagging a chunk of this direction.
    pub(crate) fn opcode(self, kind: ChunkKind) -> Opcode {
        match (self, kind) {
            (Self::Read, ChunkKind::First) => Opcode::ReadBurstFirst,
            (Self::Read, ChunkKind::Middle) => Opcode::ReadBurstMiddle,
            (Self::Read, ChunkKind::End) => Opcode::ReadBurstEnd,
            (Self::Read, ChunkKind::Atomic) => Opcode::ReadBurstAtomic,
            (Self::Write, ChunkKind::First) => Opcode::WriteBurstFirst,
            (Self::Write, ChunkKind::Middle) => Opcode::WriteBurstMiddle,
            (Self::Write, ChunkKind::End) => Opcode::WriteBurstEnd,
            (Self::Write, ChunkKind::Atomic) => Opcode::WriteBurstAtomic,
        }
    }
}

/// Answer received from the MCU, held in fixed inline storage.
#[derive(Clone)]
pub struct Answer {
    /// Opcode echoed by the MCU
    pub cmd: Opcode,
    len: usize,
    buf: [u8; ANSWER_BUFFER_SIZE],
}

impl Answer {
    pub(crate) fn new(cmd: Opcode) -> Self {
        Self {
            cmd,
            len: 0,
            buf: [0; ANSWER_BUFFER_SIZE],
        }
    }

    /// Declared payload bytes, without any USB padding.
    pub fn payload(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// First payload byte, the acknowledge code for control commands.
    pub fn ack(&self) -> Option<u8> {
        self.payload().first().copied()
    }

    /// Buffer the payload is read into; `read_len` may include the pad byte.
    pub(crate) fn fill_target(&mut self, declared_len: usize, read_len: usize) -> &mut [u8] {
        self.len = declared_len;
        &mut self.buf[..read_len]
    }
}

impl fmt::Debug for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Answer")
            .field("cmd", &self.cmd)
            .field("payload", &self.payload())
            .finish()
    }
}
