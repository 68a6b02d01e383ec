// Copyright 2021 The gd32f1x0-hal authors.
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interrupt-driven EEPROM transfers
//!
//! [`InterruptTransfer`] runs one memory write or memory read against a device with a one-byte
//! internal address (AT24C01/02 and compatibles). The foreground starts a transfer and polls for
//! completion; the I2C event interrupt calls [`InterruptTransfer::on_event`], which checks the
//! flag the current [`Process`] step waits for and, if it is set, performs the step and moves
//! on. The error interrupt calls [`InterruptTransfer::on_error`].
//!
//! Write:
//!
//! ```text
//! SendAddressFirst -> ClearAddressFlagFirst -> TransmitWriteReadAdd -> TransmitData -> Stop
//! ```
//!
//! Read (repeated START after the internal address):
//!
//! ```text
//! SendAddressFirst -> ClearAddressFlagFirst -> TransmitWriteReadAdd
//!     -> SendAddressSecond -> ClearAddressFlagSecond -> TransmitData
//! ```
//!
//! Standby (ACK polling after a write cycle, restarted on every NACK):
//!
//! ```text
//! SendAddressFirst -> ClearAddressFlagFirst -> STOP
//! ```

use super::{Direction, Error, Flag, I2cPeripheral, Interrupt};
use core::hint::spin_loop;
use heapless::Vec;
use log::{trace, warn};
use nb::Error::{Other, WouldBlock};

/// Step of the transfer currently waiting for its flag
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Process {
    /// Waiting for SBSEND to send the slave address as transmitter
    SendAddressFirst,
    /// Waiting for ADDSEND after the first address phase
    ClearAddressFlagFirst,
    /// Waiting for TBE to send the EEPROM internal address
    TransmitWriteReadAdd,
    /// Waiting for SBSEND of the repeated START to send the slave address as receiver
    SendAddressSecond,
    /// Waiting for ADDSEND after the second address phase
    ClearAddressFlagSecond,
    /// Moving data bytes: TBE when writing, RBNE when reading
    TransmitData,
    /// All bytes written, STOP goes out on the next event
    Stop,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Operation {
    Write,
    Read,
    Standby,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Config {
    /// Polls of BTC allowed inside the interrupt handler before giving up.
    pub btc_spin_limit: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            btc_spin_limit: 10_000,
        }
    }
}

impl Config {
    pub fn btc_spin_limit(mut self, limit: u32) -> Self {
        self.btc_spin_limit = limit;
        self
    }
}

/// One-transfer-at-a-time interrupt driven EEPROM access.
///
/// `N` bounds the number of data bytes of a single transfer.
pub struct InterruptTransfer<P, const N: usize> {
    i2c: P,
    config: Config,
    process: Process,
    operation: Option<Operation>,
    slave: u8,
    mem_address: u8,
    nbytes: usize,
    tx: Vec<u8, N>,
    tx_index: usize,
    rx: Vec<u8, N>,
    result: Option<Result<(), Error>>,
    ack_position_next: bool,
    standby_left: u32,
}

impl<P, const N: usize> InterruptTransfer<P, N>
where
    P: I2cPeripheral,
{
    pub fn new(i2c: P, config: Config) -> Self {
        InterruptTransfer {
            i2c,
            config,
            process: Process::SendAddressFirst,
            operation: None,
            slave: 0,
            mem_address: 0,
            nbytes: 0,
            tx: Vec::new(),
            tx_index: 0,
            rx: Vec::new(),
            result: None,
            ack_position_next: false,
            standby_left: 0,
        }
    }

    /// Starts writing `data` at internal address `mem_address` of the device at `slave`.
    ///
    /// `data` must fit in one EEPROM page; splitting is the caller's job (see
    /// [`crate::eeprom::page_plan`]). Returns `WouldBlock` while another master holds the bus.
    pub fn start_write(&mut self, slave: u8, mem_address: u8, data: &[u8]) -> nb::Result<(), Error> {
        self.check_start(data.len())?;
        self.tx.clear();
        self.tx
            .extend_from_slice(data)
            .map_err(|_| Other(Error::BufferTooLong))?;
        self.begin(Operation::Write, slave, mem_address, data.len());
        Ok(())
    }

    /// Starts reading `len` bytes from internal address `mem_address` of the device at `slave`.
    pub fn start_read(&mut self, slave: u8, mem_address: u8, len: usize) -> nb::Result<(), Error> {
        self.check_start(len)?;
        self.begin(Operation::Read, slave, mem_address, len);
        Ok(())
    }

    /// Polls the device at `slave` with address-only writes until it acknowledges, at most
    /// `retries` times. The transfer fails with `Timeout` if every attempt is NACKed.
    pub fn start_standby(&mut self, slave: u8, retries: u32) -> nb::Result<(), Error> {
        self.check_idle()?;
        self.begin(Operation::Standby, slave, 0, 0);
        self.standby_left = retries.max(1);
        Ok(())
    }

    fn check_idle(&mut self) -> nb::Result<(), Error> {
        if self.operation.is_some() {
            return Err(Other(Error::Busy));
        }
        if self.i2c.flag(Flag::I2cbsy) {
            return Err(WouldBlock);
        }
        Ok(())
    }

    fn check_start(&mut self, len: usize) -> nb::Result<(), Error> {
        if self.operation.is_some() {
            return Err(Other(Error::Busy));
        }
        if len == 0 {
            return Err(Other(Error::EmptyTransfer));
        }
        if len > N {
            return Err(Other(Error::BufferTooLong));
        }
        self.check_idle()
    }

    fn begin(&mut self, operation: Operation, slave: u8, mem_address: u8, len: usize) {
        trace!("i2c: {:?} {} bytes at {:#04x}", operation, len, mem_address);
        self.operation = Some(operation);
        self.slave = slave;
        self.mem_address = mem_address;
        self.nbytes = len;
        self.tx_index = 0;
        self.rx.clear();
        self.result = None;
        self.process = Process::SendAddressFirst;

        self.i2c.set_ack(true);
        if operation == Operation::Read && len == 2 {
            // ACKEN has to act on the second byte, which is in the shift register when the
            // first one lands in I2C_DATA.
            self.i2c.set_ack_position_next(true);
            self.ack_position_next = true;
        }
        for interrupt in Interrupt::ALL {
            self.i2c.listen(interrupt);
        }
        self.i2c.send_start();
    }

    /// Body of the I2C event interrupt handler.
    pub fn on_event(&mut self) {
        match self.operation {
            Some(Operation::Write) => self.write_event(),
            Some(Operation::Read) => self.read_event(),
            Some(Operation::Standby) => self.standby_event(),
            None => {}
        }
    }

    fn standby_event(&mut self) {
        match self.process {
            Process::SendAddressFirst => {
                if self.i2c.flag(Flag::Sbsend) {
                    self.i2c.send_address(self.slave, Direction::Transmitter);
                    self.advance(Process::ClearAddressFlagFirst);
                }
            }
            Process::ClearAddressFlagFirst => {
                if self.i2c.flag(Flag::Addsend) {
                    self.i2c.clear_addsend();
                    self.i2c.send_stop();
                    self.finish(Ok(()));
                }
            }
            _ => self.abort(Error::Bus),
        }
    }

    fn write_event(&mut self) {
        match self.process {
            Process::SendAddressFirst => {
                if self.i2c.flag(Flag::Sbsend) {
                    self.i2c.send_address(self.slave, Direction::Transmitter);
                    self.advance(Process::ClearAddressFlagFirst);
                }
            }
            Process::ClearAddressFlagFirst => {
                if self.i2c.flag(Flag::Addsend) {
                    self.i2c.clear_addsend();
                    self.advance(Process::TransmitWriteReadAdd);
                }
            }
            Process::TransmitWriteReadAdd => {
                if self.i2c.flag(Flag::Tbe) {
                    self.i2c.write_data(self.mem_address);
                    if self.wait_btc() {
                        self.advance(Process::TransmitData);
                    }
                }
            }
            Process::TransmitData => {
                if self.i2c.flag(Flag::Tbe) {
                    let byte = self.tx.get(self.tx_index).copied().unwrap_or_default();
                    self.i2c.write_data(byte);
                    self.tx_index += 1;
                    self.nbytes -= 1;
                    if self.nbytes == 0 {
                        self.advance(Process::Stop);
                    }
                }
            }
            Process::Stop => {
                self.i2c.send_stop();
                self.finish(Ok(()));
            }
            Process::SendAddressSecond | Process::ClearAddressFlagSecond => {
                // Not part of the write path.
                self.abort(Error::Bus);
            }
        }
    }

    fn read_event(&mut self) {
        match self.process {
            Process::SendAddressFirst => {
                if self.i2c.flag(Flag::Sbsend) {
                    self.i2c.send_address(self.slave, Direction::Transmitter);
                    self.advance(Process::ClearAddressFlagFirst);
                }
            }
            Process::ClearAddressFlagFirst => {
                if self.i2c.flag(Flag::Addsend) {
                    self.i2c.clear_addsend();
                    self.advance(Process::TransmitWriteReadAdd);
                }
            }
            Process::TransmitWriteReadAdd => {
                if self.i2c.flag(Flag::Tbe) {
                    self.i2c.write_data(self.mem_address);
                    if self.wait_btc() {
                        self.i2c.send_start();
                        self.advance(Process::SendAddressSecond);
                    }
                }
            }
            Process::SendAddressSecond => {
                if self.i2c.flag(Flag::Sbsend) {
                    self.i2c.send_address(self.slave, Direction::Receiver);
                    if self.nbytes < 3 {
                        self.i2c.set_ack(false);
                    }
                    self.advance(Process::ClearAddressFlagSecond);
                }
            }
            Process::ClearAddressFlagSecond => {
                if self.i2c.flag(Flag::Addsend) {
                    self.i2c.clear_addsend();
                    if self.nbytes == 1 || self.nbytes == 2 {
                        self.i2c.set_ack(false);
                    }
                    self.advance(Process::TransmitData);
                }
            }
            Process::TransmitData => {
                if self.i2c.flag(Flag::Rbne) && self.nbytes > 0 {
                    if self.nbytes == 3 {
                        // N-2 is in I2C_DATA and N-1 in the shift register once BTC is up, so
                        // the NACK lands on the last byte.
                        if !self.wait_btc() {
                            return;
                        }
                        self.i2c.set_ack(false);
                    }
                    let byte = self.i2c.read_data();
                    if self.rx.push(byte).is_err() {
                        self.abort(Error::BufferTooLong);
                        return;
                    }
                    self.nbytes -= 1;
                    if self.nbytes == 0 {
                        self.i2c.send_stop();
                        self.i2c.set_ack(true);
                        self.finish(Ok(()));
                    }
                }
            }
            Process::Stop => {
                self.i2c.send_stop();
                self.finish(Ok(()));
            }
        }
    }

    /// Body of the I2C error interrupt handler.
    ///
    /// Clears every sticky error flag that is set. If any was, the transfer in flight is
    /// abandoned and [`poll`](Self::poll) reports the first one.
    pub fn on_error(&mut self) {
        let mut first = None;
        for flag in Flag::ERRORS {
            if self.i2c.flag(flag) {
                self.i2c.clear_flag(flag);
                first = first.or(flag.error());
            }
        }
        let Some(error) = first else {
            return;
        };
        if error == Error::Acknowledge && self.operation == Some(Operation::Standby) {
            self.i2c.send_stop();
            self.standby_left = self.standby_left.saturating_sub(1);
            if self.standby_left > 0 {
                trace!("i2c: {:#04x} still busy, {} polls left", self.slave, self.standby_left);
                self.i2c.send_start();
                self.advance(Process::SendAddressFirst);
            } else {
                self.i2c.set_ack(true);
                self.finish(Err(Error::Timeout));
            }
            return;
        }
        warn!("i2c: {} during {:?}", error, self.process);
        if error == Error::Acknowledge {
            self.i2c.send_stop();
        }
        self.i2c.set_ack(true);
        if self.operation.is_some() {
            self.finish(Err(error));
        } else {
            self.disable_interrupts();
        }
    }

    /// `WouldBlock` while a transfer is in flight, then the outcome of the last transfer.
    pub fn poll(&self) -> nb::Result<(), Error> {
        if self.operation.is_some() {
            return Err(WouldBlock);
        }
        match self.result {
            Some(Err(error)) => Err(Other(error)),
            _ => Ok(()),
        }
    }

    /// Bytes received by the last completed read.
    pub fn read_data(&self) -> &[u8] {
        &self.rx
    }

    pub fn is_idle(&self) -> bool {
        self.operation.is_none()
    }

    pub fn state(&self) -> Process {
        self.process
    }

    /// Data bytes still to move in the current transfer.
    pub fn remaining(&self) -> usize {
        self.nbytes
    }

    /// Releases the I2C peripheral
    pub fn free(self) -> P {
        self.i2c
    }

    fn advance(&mut self, next: Process) {
        trace!("i2c: {:?} -> {:?}", self.process, next);
        self.process = next;
    }

    /// Bounded wait for BTC; aborts the transfer and returns `false` on timeout.
    fn wait_btc(&mut self) -> bool {
        for _ in 0..self.config.btc_spin_limit {
            if self.i2c.flag(Flag::Btc) {
                return true;
            }
            spin_loop();
        }
        self.abort(Error::Timeout);
        false
    }

    fn abort(&mut self, error: Error) {
        warn!("i2c: aborting in {:?}: {}", self.process, error);
        self.i2c.send_stop();
        self.i2c.set_ack(true);
        self.finish(Err(error));
    }

    fn finish(&mut self, result: Result<(), Error>) {
        if self.ack_position_next {
            self.i2c.set_ack_position_next(false);
            self.ack_position_next = false;
        }
        self.disable_interrupts();
        self.process = Process::SendAddressFirst;
        self.operation = None;
        self.result = Some(result);
    }

    fn disable_interrupts(&mut self) {
        for interrupt in Interrupt::ALL {
            self.i2c.unlisten(interrupt);
        }
    }
}
