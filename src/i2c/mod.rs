// Copyright 2021 The gd32f1x0-hal authors.
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inter-Integrated Circuit (I2C) bus
//!
//! The master-mode sequencing lives in two drivers:
//!
//! - [`interrupt::InterruptTransfer`] advances one step per event interrupt and never blocks
//!   on the bus except for the two short byte-transfer-complete waits the peripheral requires;
//! - [`blocking::BlockingI2c`] polls the flags from the foreground with explicit timeouts and
//!   implements the `embedded-hal` I2C trait.
//!
//! Both drive the hardware through [`I2cPeripheral`], which exposes exactly the flag tests and
//! control bits the sequences need.

// This document describes a correct i2c implementation and is what
// parts of this code is based on
// https://www.st.com/content/ccc/resource/technical/document/application_note/5d/ae/a3/6f/08/69/4e/9b/CD00209826.pdf/files/CD00209826.pdf/jcr:content/translations/en.CD00209826.pdf

use crate::time::Hertz;
use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
use nb::Error::{Other, WouldBlock};

pub mod blocking;
#[cfg(test)]
pub(crate) mod fake;
#[cfg(feature = "device-selected")]
pub mod gd32;
pub mod interrupt;

/// I2C error
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Bus error
    #[error("Bus error")]
    Bus,
    /// Arbitration loss
    #[error("Arbitration lost")]
    Arbitration,
    /// No ack received
    #[error("No acknowledge received")]
    Acknowledge,
    /// Overrun/underrun
    #[error("Overrun or underrun")]
    Overrun,
    /// PEC mismatch, SMBus mode only
    #[error("PEC mismatch")]
    Pec,
    /// Bus timeout, SMBus mode only
    #[error("SMBus timeout")]
    SmbusTimeout,
    /// Alert, SMBus mode only
    #[error("SMBus alert")]
    SmbusAlert,
    /// A flag did not come up within the allowed time
    #[error("Timed out waiting for the bus")]
    Timeout,
    /// A transfer is already in flight on this peripheral
    #[error("Transfer already in progress")]
    Busy,
    /// The transfer does not fit in the driver's buffer
    #[error("Transfer longer than the driver buffer")]
    BufferTooLong,
    /// Zero-length data phase
    #[error("Empty transfer")]
    EmptyTransfer,
}

impl embedded_hal::i2c::Error for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Bus => ErrorKind::Bus,
            Self::Arbitration => ErrorKind::ArbitrationLoss,
            Self::Acknowledge => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown),
            Self::Overrun => ErrorKind::Overrun,
            _ => ErrorKind::Other,
        }
    }
}

/// SCL low to high ratio in fast mode (`DTCY`)
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FastDuty {
    Low2High1,
    Low16High9,
}

/// SCL timing of the master. Frequencies above 100 kHz select fast mode.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BusConfig {
    pub frequency: Hertz,
    pub fast_duty: FastDuty,
}

impl Default for BusConfig {
    fn default() -> Self {
        BusConfig {
            frequency: Hertz(100_000),
            fast_duty: FastDuty::Low2High1,
        }
    }
}

impl BusConfig {
    pub const MAX_FREQUENCY: Hertz = Hertz(400_000);

    pub fn frequency<F: Into<Hertz>>(mut self, frequency: F) -> Self {
        self.frequency = frequency.into();
        self
    }

    pub fn fast_duty(mut self, duty: FastDuty) -> Self {
        self.fast_duty = duty;
        self
    }

    pub fn is_fast(&self) -> bool {
        self.frequency.0 > 100_000
    }

    /// `I2C_RT`: maximum SCL rise time (1000 ns standard, 300 ns fast) in PCLK1 periods, plus one.
    pub fn rise_time(&self, pclk1: Hertz) -> u8 {
        let mhz = pclk1.0 / 1_000_000;
        let periods = if self.is_fast() { mhz * 300 / 1000 } else { mhz };
        (periods + 1).min(0x3F) as u8
    }

    /// `I2C_CKCFG`: the `CLKC` divider and the `DTCY` bit for a peripheral clock of `pclk1`.
    pub fn clock_control(&self, pclk1: Hertz) -> (u16, bool) {
        let frequency = self.frequency.0.max(1);
        if !self.is_fast() {
            return ((pclk1.0 / (frequency * 2)).clamp(4, 0xFFF) as u16, false);
        }
        match self.fast_duty {
            FastDuty::Low2High1 => ((pclk1.0 / (frequency * 3)).clamp(1, 0xFFF) as u16, false),
            FastDuty::Low16High9 => ((pclk1.0 / (frequency * 25)).clamp(1, 0xFFF) as u16, true),
        }
    }
}

/// Direction bit appended to the 7-bit slave address
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    Transmitter,
    Receiver,
}

impl Direction {
    /// The address byte that goes on the bus for `address` in this direction.
    pub const fn address_byte(self, address: u8) -> u8 {
        match self {
            Direction::Transmitter => address << 1,
            Direction::Receiver => (address << 1) | 1,
        }
    }
}

/// Status flags of `I2C_STAT0` and `I2C_STAT1`
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Flag {
    /// Start condition sent (master mode)
    Sbsend,
    /// Address sent (master) or matched (slave)
    Addsend,
    /// Byte transmission completed
    Btc,
    /// Stop condition detected (slave mode)
    Stpdet,
    /// Receive buffer not empty
    Rbne,
    /// Transmit buffer empty
    Tbe,
    /// Bus error
    Berr,
    /// Arbitration lost
    Lostarb,
    /// Acknowledge error
    Aerr,
    /// Overrun or underrun
    Ouerr,
    /// PEC error
    Pecerr,
    /// SMBus timeout
    Smbto,
    /// SMBus alert
    Smbalt,
    /// Bus busy, from `I2C_STAT1`
    I2cbsy,
}

impl Flag {
    /// Sticky error flags in the order the error handler services them.
    pub const ERRORS: [Flag; 7] = [
        Flag::Aerr,
        Flag::Smbalt,
        Flag::Smbto,
        Flag::Ouerr,
        Flag::Lostarb,
        Flag::Berr,
        Flag::Pecerr,
    ];

    /// The error a sticky flag reports, `None` for status flags.
    pub const fn error(self) -> Option<Error> {
        match self {
            Flag::Berr => Some(Error::Bus),
            Flag::Lostarb => Some(Error::Arbitration),
            Flag::Aerr => Some(Error::Acknowledge),
            Flag::Ouerr => Some(Error::Overrun),
            Flag::Pecerr => Some(Error::Pec),
            Flag::Smbto => Some(Error::SmbusTimeout),
            Flag::Smbalt => Some(Error::SmbusAlert),
            _ => None,
        }
    }
}

/// Interrupt sources of the I2C peripheral (`I2C_CTL1`)
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Interrupt {
    /// `EVIE`: SBSEND, ADDSEND, BTC, STPDET
    Event,
    /// `BUFIE`: TBE and RBNE, on top of `Event`
    Buffer,
    /// `ERRIE`: sticky error flags
    Error,
}

impl Interrupt {
    pub const ALL: [Interrupt; 3] = [Interrupt::Error, Interrupt::Buffer, Interrupt::Event];
}

/// Register-level access to one I2C peripheral in master mode.
///
/// Each method maps onto a single register operation of the GD32 I2C block, so the sequences in
/// [`interrupt`] and [`blocking`] read the same as the reference manual's flowcharts.
pub trait I2cPeripheral {
    /// Whether `flag` is currently set.
    fn flag(&self, flag: Flag) -> bool;

    /// Clears a sticky error flag. Status flags are cleared by their data or address access
    /// and are ignored here.
    fn clear_flag(&mut self, flag: Flag);

    /// Clears ADDSEND by reading `I2C_STAT0` followed by `I2C_STAT1`.
    fn clear_addsend(&mut self);

    /// Generates a START (or repeated START) condition.
    fn send_start(&mut self);

    /// Generates a STOP condition.
    fn send_stop(&mut self);

    /// Whether a requested STOP has not yet been put on the bus.
    fn stop_pending(&self) -> bool;

    /// Sends the 7-bit `address` with the direction bit. This also clears SBSEND.
    fn send_address(&mut self, address: u8, direction: Direction);

    /// Writes a byte to `I2C_DATA`.
    fn write_data(&mut self, byte: u8);

    /// Reads a byte from `I2C_DATA`.
    fn read_data(&mut self) -> u8;

    /// Enables or disables ACK generation for received bytes.
    fn set_ack(&mut self, enable: bool);

    /// Sets `POAP`, making the ACK bit apply to the next byte rather than the current one.
    fn set_ack_position_next(&mut self, next: bool);

    fn listen(&mut self, interrupt: Interrupt);

    fn unlisten(&mut self, interrupt: Interrupt);

    /// Resets the peripheral state machine and reapplies the bus configuration.
    fn software_reset(&mut self);
}

/// A free-running counter used to bound busy waits.
///
/// The counter may wrap; only differences between two readings are used.
pub trait Ticks {
    fn now(&mut self) -> u32;
}

/// Returns and clears the first pending error among the flags the polled sequences check.
pub(crate) fn take_error<P: I2cPeripheral>(i2c: &mut P) -> Option<Error> {
    [Flag::Berr, Flag::Lostarb, Flag::Aerr, Flag::Ouerr]
        .into_iter()
        .find(|flag| i2c.flag(*flag))
        .and_then(|flag| {
            i2c.clear_flag(flag);
            flag.error()
        })
}

/// Checks `flag`, reporting any pending bus error first. `WouldBlock` means "not yet".
pub(crate) fn check_flag<P: I2cPeripheral>(i2c: &mut P, flag: Flag) -> nb::Result<(), Error> {
    if let Some(error) = take_error(i2c) {
        Err(Other(error))
    } else if i2c.flag(flag) {
        Ok(())
    } else {
        Err(WouldBlock)
    }
}
