//! McuLink struct and public API.

use super::device::{Connector, TtyConnector};
use super::io::Transport;
use super::protocol::Command;
use super::transfer::{read_burst, send_command, write_burst};
use super::types::{ACK_OK, Answer, Opcode};
use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use std::fs::File;
use std::sync::Mutex;
use tracing::{debug, error, info};

/// Session with one MCU bridge over a USB CDC link.
///
/// Every method takes the link lock for the whole exchange, bursts
/// included, so a shared `Arc<McuLink<_>>` never interleaves frames.
#[derive(Debug)]
pub struct McuLink<T: Transport> {
    port: Mutex<Option<T>>,
    config: LinkConfig,
}

impl McuLink<File> {
    /// Open the first responding tty among `config.ports` and check its firmware.
    pub fn open(config: LinkConfig) -> Result<Self> {
        Self::open_with(&mut TtyConnector, config)
    }
}

impl<T: Transport> McuLink<T> {
    /// Open the first candidate `connector` can reach and check its firmware.
    ///
    /// A configuration failure or a firmware mismatch ends discovery; the
    /// endpoint is released before the error is returned.
    pub fn open_with<C>(connector: &mut C, config: LinkConfig) -> Result<Self>
    where
        C: Connector<Port = T>,
    {
        config.validate().map_err(|e| LinkError::config(e.to_string()))?;

        for path in &config.ports {
            let mut port = match connector.connect(path) {
                Ok(port) => port,
                Err(e) => {
                    debug!("Cannot open {}: {e}", path.display());
                    continue;
                }
            };

            if let Err(e) = connector.configure(&mut port, path) {
                error!("Failed to configure {}: {e}", path.display());
                return Err(e);
            }

            info!("Opened MCU bridge on {}", path.display());
            let link = Self::with_port(port, config.clone());
            link.check_firmware()?;
            return Ok(link);
        }

        error!("No MCU bridge among {} candidate ports", config.ports.len());
        Err(LinkError::NoDevice)
    }

    /// Wrap an already opened endpoint without any handshake.
    pub fn with_port(port: T, config: LinkConfig) -> Self {
        Self {
            port: Mutex::new(Some(port)),
            config,
        }
    }

    /// Release the endpoint. Later calls fail with `NotConnected`.
    pub fn close(&self) -> Result<()> {
        let port = self.port.lock().map_err(|_| LinkError::LockPoisoned)?.take();
        match port {
            Some(port) => {
                drop(port);
                info!("MCU bridge link closed");
                Ok(())
            }
            None => Err(LinkError::NotConnected),
        }
    }

    /// Check if the endpoint is still held.
    pub fn is_connected(&self) -> bool {
        self.port.lock().map(|port| port.is_some()).unwrap_or(false)
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Ask the MCU to acknowledge the expected firmware version.
    pub fn check_firmware(&self) -> Result<()> {
        let expected = self.config.firmware_version;
        let version = expected.to_be_bytes();
        let answer = self.exchange(Opcode::CheckFirmware, 0, &version)?;

        match answer.ack() {
            Some(ACK_OK) => {
                info!("MCU firmware version checked: {expected:#010x}");
                Ok(())
            }
            Some(code) => {
                error!("Wrong MCU firmware version (answer code {code:#04x}), expected {expected:#010x}");
                Err(LinkError::FirmwareMismatch { expected })
            }
            None => {
                error!("Empty answer to firmware check");
                Err(LinkError::framing("empty answer to firmware check"))
            }
        }
    }

    /// Write one register.
    pub fn write_register(&self, addr: u8, value: u8) -> Result<()> {
        self.exchange(Opcode::WriteRegister, addr, &[value])?;
        Ok(())
    }

    /// Read one register.
    pub fn read_register(&self, addr: u8) -> Result<u8> {
        let answer = self.exchange(Opcode::ReadRegister, addr, &[0])?;
        answer.ack().ok_or(LinkError::PayloadTruncated {
            expected: 1,
            received: 0,
        })
    }

    /// Write `data` starting at `addr`, split into as many chunks as needed.
    pub fn write_burst(&self, addr: u8, data: &[u8]) -> Result<()> {
        self.locked(|port, config| write_burst(port, config, addr, data))
    }

    /// Fill `buf` from `addr`, split into as many chunks as needed.
    pub fn read_burst(&self, addr: u8, buf: &mut [u8]) -> Result<()> {
        self.locked(|port, config| read_burst(port, config, addr, buf))
    }

    /// Send any single command and return the MCU's answer.
    pub fn exchange(&self, cmd: Opcode, addr: u8, payload: &[u8]) -> Result<Answer> {
        let command = Command::new(cmd, addr, payload);
        self.locked(|port, config| send_command(port, config, &command))
    }

    /// Run `f` on the endpoint while holding the link lock.
    fn locked<R>(&self, f: impl FnOnce(&mut T, &LinkConfig) -> Result<R>) -> Result<R> {
        let mut guard = self.port.lock().map_err(|_| LinkError::LockPoisoned)?;
        let port = guard.as_mut().ok_or(LinkError::NotConnected)?;
        f(port, &self.config)
    }

    /// Take the endpoint back, for tests that inspect the wire trace.
    #[cfg(test)]
    pub(crate) fn into_port(self) -> Option<T> {
        self.port.into_inner().ok().flatten()
    }
}
