//! Handlers for external devices connected to the Simulator.
//!
//! Devices are accessed through memory-mapped IO:
//! each device claims a range of addresses outside of physical memory,
//! and loads and stores to that range are forwarded to the device.
//!
//! The core types here are:
//! - [`ExternalDevice`]: A device which can be connected to the Simulator.
//! - [`DeviceHandler`]: The handler for the Simulator's IO ports.
//!
//! This module also provides:
//! - [`SerialPort`]: Output-only serial port that sends each written byte through a channel.

use std::ops::Range;

use crossbeam_channel as cbc;

use crate::Word;

/// The address of the serial port's data register.
pub const SERIAL_PORT: Word = 0xa000_03f8;

/// An external device, which can be accessed via memory-mapped IO.
pub trait ExternalDevice: Send + 'static {
    /// The name of the device (used in logs).
    fn name(&self) -> &str;

    /// Reads `len` bytes at the given offset into the device's address range.
    ///
    /// Reads do not have side effects, since expressions can read device memory.
    /// If unsuccessful, this returns `None`.
    fn io_read(&self, offset: Word, len: usize) -> Option<Word>;

    /// Writes the low `len` bytes of `data` at the given offset into the device's address range.
    ///
    /// This returns whether the write was successful or not.
    fn io_write(&mut self, offset: Word, len: usize, data: Word) -> bool;
}

struct Mapping {
    range: Range<Word>,
    device: Box<dyn ExternalDevice>
}

/// The central hub for all external devices for the Simulator.
#[derive(Default)]
pub struct DeviceHandler {
    mappings: Vec<Mapping>
}
impl DeviceHandler {
    /// Creates a new device handler with no devices.
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps a device to a range of addresses.
    ///
    /// # Errors
    /// If the range is empty or overlaps with another device's range,
    /// the device is returned back to the user.
    pub fn add_device<D: ExternalDevice>(&mut self, dev: D, range: Range<Word>) -> Result<(), D> {
        let overlaps = self.mappings.iter()
            .any(|m| m.range.start < range.end && range.start < m.range.end);
        if range.is_empty() || overlaps { return Err(dev) };

        tracing::debug!("mapped device {} at 0x{:08x}..0x{:08x}", dev.name(), range.start, range.end);
        self.mappings.push(Mapping { range, device: Box::new(dev) });
        Ok(())
    }

    /// Finds the mapping which fully contains the given access.
    fn find(&self, addr: Word, len: usize) -> Option<(usize, Word)> {
        let last = addr.checked_add(Word::try_from(len).ok()?.checked_sub(1)?)?;
        self.mappings.iter()
            .position(|m| m.range.contains(&addr) && m.range.contains(&last))
            .map(|i| (i, addr - self.mappings[i].range.start))
    }

    /// Accesses the device mapped to the given address and tries [`ExternalDevice::io_read`] on it.
    pub fn io_read(&self, addr: Word, len: usize) -> Option<Word> {
        let (i, offset) = self.find(addr, len)?;
        self.mappings[i].device.io_read(offset, len)
    }

    /// Accesses the device mapped to the given address and tries [`ExternalDevice::io_write`] on it.
    pub fn io_write(&mut self, addr: Word, len: usize, data: Word) -> bool {
        let Some((i, offset)) = self.find(addr, len) else { return false };
        self.mappings[i].device.io_write(offset, len, data)
    }
}
impl std::fmt::Debug for DeviceHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.mappings.iter().map(|m| (m.device.name(), &m.range)))
            .finish()
    }
}

/// A serial port which sends each byte written to its data register through a channel.
///
/// The port occupies 8 bytes starting at [`SERIAL_PORT`].
/// Only the data register (offset 0) is writable, and all reads return 0.
#[derive(Debug, Clone)]
pub struct SerialPort {
    tx: cbc::Sender<u8>
}
impl SerialPort {
    /// The address range the serial port occupies.
    pub const RANGE: Range<Word> = SERIAL_PORT..SERIAL_PORT + 8;

    /// Creates a new serial port, returning the receiving end of its output.
    pub fn new() -> (Self, cbc::Receiver<u8>) {
        let (tx, rx) = cbc::unbounded();
        (Self { tx }, rx)
    }
}
impl ExternalDevice for SerialPort {
    fn name(&self) -> &str {
        "serial"
    }

    fn io_read(&self, _offset: Word, _len: usize) -> Option<Word> {
        Some(0)
    }

    fn io_write(&mut self, offset: Word, _len: usize, data: Word) -> bool {
        match offset {
            // If the receiver hung up, output is dropped.
            0 => {
                let _ = self.tx.send(data as u8);
                true
            },
            _ => false
        }
    }
}
