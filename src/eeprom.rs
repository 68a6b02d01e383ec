// Copyright 2021 The gd32f1x0-hal authors.
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AT24Cxx serial EEPROM
//!
//! The EEPROM accepts at most one page per write cycle and wraps around inside the page when
//! more bytes arrive, so longer writes are split with [`page_plan`]. After each page the device
//! ignores its address until the internal write cycle completes; [`At24cxx::wait_standby_state`]
//! polls for the acknowledge that signals it is ready again.
//!
//! ```rust,ignore
//! let mut eeprom = At24cxx::new(i2c, delay, eeprom::Config::default());
//! eeprom.buffer_write(0x00, &data)?;
//! eeprom.buffer_read(0x00, &mut buffer)?;
//! ```

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{I2c, Operation};
use log::{debug, trace, warn};

/// EEPROM error
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error<E> {
    /// The bus reported an error
    #[error("I2C error: {0:?}")]
    I2c(E),
    /// The range does not fit in the device
    #[error("Address range outside the device")]
    OutOfRange,
    /// A page write would cross a page boundary
    #[error("Data crosses a page boundary")]
    PageOverflow,
    /// The device did not come back from its write cycle
    #[error("Device did not leave its write cycle")]
    Timeout,
    /// Read-back differs from what was written
    #[error("Read-back mismatch at offset {offset}")]
    Mismatch { offset: usize },
}

/// Device geometry and timing
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Config {
    /// 7-bit bus address
    pub address: u8,
    pub page_size: u8,
    /// Size in bytes
    pub capacity: usize,
    /// Fixed wait after a page write when `standby_retries` is 0
    pub write_cycle_ms: u32,
    /// Acknowledge-polling attempts before giving up, 0 to wait `write_cycle_ms` instead
    pub standby_retries: u32,
}

impl Default for Config {
    /// An AT24C02 with A2..A0 tied low.
    fn default() -> Self {
        Config {
            address: 0x50,
            page_size: 8,
            capacity: 256,
            write_cycle_ms: 5,
            standby_retries: 1000,
        }
    }
}

impl Config {
    pub fn address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    pub fn page_size(mut self, page_size: u8) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn write_cycle_ms(mut self, ms: u32) -> Self {
        self.write_cycle_ms = ms;
        self
    }

    pub fn standby_retries(mut self, retries: u32) -> Self {
        self.standby_retries = retries;
        self
    }
}

/// One page write: `len` bytes from `offset` in the source buffer go to `address`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Chunk {
    pub address: u8,
    pub offset: usize,
    pub len: usize,
}

/// Iterator returned by [`page_plan`]
#[derive(Clone, Debug)]
pub struct PagePlan {
    address: usize,
    offset: usize,
    remaining: usize,
    page_size: usize,
}

/// Splits `len` bytes starting at `address` into writes that never cross a page.
///
/// An unaligned start yields a leading partial page, then whole pages follow, then the
/// remainder. The caller is responsible for checking the range against the device capacity.
pub fn page_plan(address: u8, len: usize, page_size: u8) -> PagePlan {
    PagePlan {
        address: usize::from(address),
        offset: 0,
        remaining: len,
        page_size: usize::from(page_size.max(1)),
    }
}

impl Iterator for PagePlan {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.remaining == 0 {
            return None;
        }
        let room = self.page_size - self.address % self.page_size;
        let len = room.min(self.remaining);
        let chunk = Chunk {
            address: self.address as u8,
            offset: self.offset,
            len,
        };
        self.address += len;
        self.offset += len;
        self.remaining -= len;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.remaining == 0 {
            return (0, Some(0));
        }
        let lead = (self.page_size - self.address % self.page_size).min(self.remaining);
        let n = 1 + (self.remaining - lead).div_ceil(self.page_size);
        (n, Some(n))
    }
}

impl ExactSizeIterator for PagePlan {}

/// AT24Cxx driver over a blocking I2C bus
pub struct At24cxx<I2C, D> {
    i2c: I2C,
    delay: D,
    config: Config,
}

impl<I2C, D> At24cxx<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    pub fn new(i2c: I2C, delay: D, config: Config) -> Self {
        At24cxx { i2c, delay, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Releases the bus and the delay
    pub fn free(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    fn check_range(&self, address: u8, len: usize) -> Result<(), Error<I2C::Error>> {
        if usize::from(address) + len > self.config.capacity {
            Err(Error::OutOfRange)
        } else {
            Ok(())
        }
    }

    /// Writes `data` at `address` in a single write cycle. `data` must stay inside one page.
    ///
    /// Returns as soon as the bytes are on the bus; the device is busy until its write cycle
    /// ends.
    pub fn page_write(&mut self, address: u8, data: &[u8]) -> Result<(), Error<I2C::Error>> {
        self.check_range(address, data.len())?;
        let page_size = usize::from(self.config.page_size);
        if usize::from(address) % page_size + data.len() > page_size {
            return Err(Error::PageOverflow);
        }
        trace!("eeprom: page write {} bytes at {:#04x}", data.len(), address);
        self.i2c
            .transaction(
                self.config.address,
                &mut [Operation::Write(&[address]), Operation::Write(data)],
            )
            .map_err(Error::I2c)
    }

    /// Writes `data` from `address` on, one page at a time, waiting out each write cycle.
    pub fn buffer_write(&mut self, address: u8, data: &[u8]) -> Result<(), Error<I2C::Error>> {
        self.check_range(address, data.len())?;
        for chunk in page_plan(address, data.len(), self.config.page_size) {
            self.page_write(chunk.address, &data[chunk.offset..chunk.offset + chunk.len])?;
            if self.config.standby_retries == 0 {
                self.delay.delay_ms(self.config.write_cycle_ms);
            } else {
                self.wait_standby_state()?;
            }
        }
        Ok(())
    }

    /// Reads `buffer.len()` bytes starting at `address` in one sequential read.
    pub fn buffer_read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), Error<I2C::Error>> {
        self.check_range(address, buffer.len())?;
        if buffer.is_empty() {
            return Ok(());
        }
        trace!("eeprom: read {} bytes at {:#04x}", buffer.len(), address);
        self.i2c
            .write_read(self.config.address, &[address], buffer)
            .map_err(Error::I2c)
    }

    /// Polls the device with empty writes until it acknowledges its address.
    pub fn wait_standby_state(&mut self) -> Result<(), Error<I2C::Error>> {
        for attempt in 0..self.config.standby_retries {
            if self.i2c.write(self.config.address, &[]).is_ok() {
                if attempt > 0 {
                    debug!("eeprom: ready after {} polls", attempt + 1);
                }
                return Ok(());
            }
            self.delay.delay_us(10);
        }
        warn!("eeprom: still in write cycle after {} polls", self.config.standby_retries);
        Err(Error::Timeout)
    }

    /// Fills `write` with a counting pattern, stores it from address 0, reads it back into
    /// `read` and compares.
    ///
    /// Only the first `min(write.len(), read.len())` bytes take part.
    pub fn self_test(&mut self, write: &mut [u8], read: &mut [u8]) -> Result<(), Error<I2C::Error>> {
        let len = write.len().min(read.len());
        let (write, read) = (&mut write[..len], &mut read[..len]);
        for (i, byte) in write.iter_mut().enumerate() {
            *byte = i as u8;
        }
        self.buffer_write(0, write)?;
        self.buffer_read(0, read)?;
        match write.iter().zip(read.iter()).position(|(w, r)| w != r) {
            Some(offset) => {
                warn!("eeprom: read-back mismatch at {}", offset);
                Err(Error::Mismatch { offset })
            }
            None => Ok(()),
        }
    }
}
