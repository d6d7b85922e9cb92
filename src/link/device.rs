//! Endpoint discovery: opening candidate device nodes.

use super::io::Transport;
use crate::error::{LinkError, Result};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use tracing::debug;

/// Opens and prepares the byte-stream endpoint behind a candidate path.
pub trait Connector {
    type Port: Transport;

    /// Open the candidate; an error moves discovery on to the next one.
    fn connect(&mut self, path: &Path) -> io::Result<Self::Port>;

    /// Prepare an opened endpoint; an error aborts discovery.
    fn configure(&mut self, _port: &mut Self::Port, _path: &Path) -> Result<()> {
        Ok(())
    }
}

/// Connector for USB CDC ACM tty nodes.
///
/// Opens the node without making it the controlling terminal, then puts it
/// in raw 8N1 mode with a non-blocking read that gives up after 100 ms, so
/// an idle link reads as empty instead of blocking.
#[derive(Debug, Default, Clone, Copy)]
pub struct TtyConnector;

impl Connector for TtyConnector {
    type Port = File;

    fn connect(&mut self, path: &Path) -> io::Result<File> {
        debug!("Opening {}", path.display());
        let mut options = OpenOptions::new();
        options.read(true).write(true);
        #[cfg(unix)]
        {
            use nix::fcntl::OFlag;
            use std::os::unix::fs::OpenOptionsExt;
            options.custom_flags((OFlag::O_NOCTTY | OFlag::O_SYNC).bits());
        }
        options.open(path)
    }

    fn configure(&mut self, port: &mut File, path: &Path) -> Result<()> {
        let metadata = port
            .metadata()
            .map_err(|e| LinkError::config(format!("{}: {e}", path.display())))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::FileTypeExt;
            if !metadata.file_type().is_char_device() {
                return Err(LinkError::config(format!(
                    "{} is not a character device",
                    path.display()
                )));
            }
            termios::set_raw(port)
                .map_err(|e| LinkError::config(format!("{}: line setup failed: {e}", path.display())))?;
            debug!("Configured {} as raw 8N1", path.display());
        }
        #[cfg(not(unix))]
        {
            if metadata.is_dir() {
                return Err(LinkError::config(format!("{} is a directory", path.display())));
            }
        }

        Ok(())
    }
}

#[cfg(unix)]
mod termios {
    use nix::sys::termios::{
        BaudRate, ControlFlags, InputFlags, SetArg, SpecialCharacterIndices, cfmakeraw, cfsetspeed, tcgetattr,
        tcsetattr,
    };
    use std::fs::File;

    #[cfg(any(target_os = "linux", target_os = "android"))]
    const LINE_SPEED: BaudRate = BaudRate::B921600;
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    const LINE_SPEED: BaudRate = BaudRate::B230400;

    // Tenths of a second a read waits for the first byte.
    const READ_TIMEOUT_DECISECONDS: u8 = 1;

    /// Raw 8N1, no flow control, VMIN=0 with a short VTIME.
    pub(super) fn set_raw(port: &File) -> nix::Result<()> {
        let mut tty = tcgetattr(port)?;
        cfmakeraw(&mut tty);
        cfsetspeed(&mut tty, LINE_SPEED)?;

        tty.control_flags |= ControlFlags::CLOCAL | ControlFlags::CREAD;
        tty.control_flags &= !(ControlFlags::PARENB | ControlFlags::CSTOPB);
        tty.input_flags &= !(InputFlags::IXON | InputFlags::IXOFF | InputFlags::IXANY);
        tty.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
        tty.control_chars[SpecialCharacterIndices::VTIME as usize] = READ_TIMEOUT_DECISECONDS;

        tcsetattr(port, SetArg::TCSANOW, &tty)
    }
}
