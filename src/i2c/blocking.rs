// Copyright 2021 The gd32f1x0-hal authors.
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Polled I2C master with explicit timeouts
//!
//! Every flag wait is bounded by a tick budget taken from [`Timeouts`]; running out of budget is
//! reported as [`Error::Timeout`] instead of hanging the caller on a stalled bus.

use super::{Direction, Error, Flag, I2cPeripheral, Ticks, check_flag};
use crate::time::Hertz;
use embedded_hal::i2c::{ErrorType, I2c, Operation, SevenBitAddress};
use log::warn;
use nb::Error::{Other, WouldBlock};

/// Tick budgets for each phase of a transfer
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timeouts {
    pub start: u32,
    pub start_retries: u8,
    pub addr: u32,
    pub data: u32,
}

impl Timeouts {
    /// Converts microsecond budgets into cycles of a counter running at `sysclk`.
    pub fn from_micros(
        sysclk: Hertz,
        start_timeout_us: u32,
        start_retries: u8,
        addr_timeout_us: u32,
        data_timeout_us: u32,
    ) -> Self {
        let sysclk_mhz = sysclk.to_mhz();
        Timeouts {
            start: start_timeout_us * sysclk_mhz,
            start_retries,
            addr: addr_timeout_us * sysclk_mhz,
            data: data_timeout_us * sysclk_mhz,
        }
    }
}

macro_rules! busy_wait {
    ($ticks:expr, $nb_expr:expr, $limit:expr) => {{
        let started = $ticks.now();
        let limit = $limit;
        loop {
            match $nb_expr {
                Ok(value) => break Ok(value),
                Err(Other(error)) => break Err(error),
                Err(WouldBlock) => {}
            }
            if $ticks.now().wrapping_sub(started) >= limit {
                break Err(Error::Timeout);
            }
        }
    }};
}

/// Destination of received bytes, possibly spread over several buffers.
trait Sink {
    fn len(&self) -> usize;
    fn put(&mut self, index: usize, byte: u8);
}

impl Sink for [u8] {
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    fn put(&mut self, index: usize, byte: u8) {
        self[index] = byte;
    }
}

impl Sink for [Operation<'_>] {
    fn len(&self) -> usize {
        self.iter()
            .map(|operation| match operation {
                Operation::Read(buffer) => buffer.len(),
                Operation::Write(_) => 0,
            })
            .sum()
    }

    fn put(&mut self, mut index: usize, byte: u8) {
        for operation in self.iter_mut() {
            if let Operation::Read(buffer) = operation {
                if index < buffer.len() {
                    buffer[index] = byte;
                    return;
                }
                index -= buffer.len();
            }
        }
    }
}

/// embedded-hal compatible blocking I2C implementation
///
/// **NOTE**: with the DWT tick source the cycle counter must be enabled first, using
/// `DWT::enable_cycle_counter`.
pub struct BlockingI2c<P, T> {
    i2c: P,
    ticks: T,
    timeouts: Timeouts,
}

impl<P, T> BlockingI2c<P, T>
where
    P: I2cPeripheral,
    T: Ticks,
{
    pub fn new(i2c: P, ticks: T, timeouts: Timeouts) -> Self {
        BlockingI2c {
            i2c,
            ticks,
            timeouts,
        }
    }

    /// Releases the I2C peripheral and the tick source
    pub fn free(self) -> (P, T) {
        (self.i2c, self.ticks)
    }

    fn wait_for_stop(&mut self) -> Result<(), Error> {
        let limit = self.timeouts.data;
        busy_wait!(
            self.ticks,
            if self.i2c.stop_pending() {
                Err(WouldBlock)
            } else {
                Ok(())
            },
            limit
        )
    }

    fn wait_flag(&mut self, flag: Flag, limit: u32) -> Result<(), Error> {
        busy_wait!(self.ticks, check_flag(&mut self.i2c, flag), limit)
    }

    /// Sends START, resetting the peripheral and trying again when SBSEND does not come up.
    /// `ack_position_next` is applied before every START since the reset clears it.
    fn send_start_and_wait(&mut self, ack_position_next: bool) -> Result<(), Error> {
        // According to http://www.st.com/content/ccc/resource/technical/document/errata_sheet/f5/50/c9/46/56/db/4a/f6/CD00197763.pdf/files/CD00197763.pdf/jcr:content/translations/en.CD00197763.pdf
        // 2.14.4 Wrong behavior of I2C peripheral in master mode after a misplaced STOP
        let mut retries_left = self.timeouts.start_retries.max(1);
        let mut last_ret = Err(Error::Timeout);
        while retries_left > 0 {
            if ack_position_next {
                self.i2c.set_ack_position_next(true);
            }
            self.i2c.send_start();
            last_ret = self.wait_flag(Flag::Sbsend, self.timeouts.start);
            if last_ret.is_err() {
                warn!("i2c: no START, resetting peripheral");
                self.i2c.software_reset();
            } else {
                break;
            }
            retries_left -= 1;
        }
        last_ret
    }

    fn send_addr_and_wait(&mut self, addr: u8, direction: Direction) -> Result<(), Error> {
        self.i2c.send_address(addr, direction);
        let ret = self.wait_flag(Flag::Addsend, self.timeouts.addr);
        if ret == Err(Error::Acknowledge) {
            self.i2c.send_stop();
        }
        ret
    }

    fn write_bytes_and_wait(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.i2c.clear_addsend();

        let Some((first, rest)) = bytes.split_first() else {
            return Ok(());
        };
        self.i2c.write_data(*first);
        for byte in rest {
            self.wait_flag(Flag::Tbe, self.timeouts.data)?;
            self.i2c.write_data(*byte);
        }
        self.wait_flag(Flag::Btc, self.timeouts.data)
    }

    fn write_without_stop(&mut self, addr: u8, bytes: &[u8]) -> Result<(), Error> {
        self.send_start_and_wait(false)?;
        self.send_addr_and_wait(addr, Direction::Transmitter)?;

        let ret = self.write_bytes_and_wait(bytes);
        if ret == Err(Error::Acknowledge) {
            self.i2c.send_stop();
        }
        ret
    }

    /// Receives `buffer.len()` bytes, NACKing the last one and ending with STOP.
    fn receive<S: Sink + ?Sized>(&mut self, addr: u8, buffer: &mut S) -> Result<(), Error> {
        // A two byte read NACKs the byte in the shift register, so POAP is set up front and only
        // dropped once STOP is out.
        let two_bytes = buffer.len() == 2;
        let ret = self.receive_bytes(addr, buffer, two_bytes);
        if two_bytes {
            self.i2c.set_ack_position_next(false);
        }
        ret
    }

    fn receive_bytes<S: Sink + ?Sized>(
        &mut self,
        addr: u8,
        buffer: &mut S,
        ack_position_next: bool,
    ) -> Result<(), Error> {
        self.send_start_and_wait(ack_position_next)?;
        self.send_addr_and_wait(addr, Direction::Receiver)?;

        let data = self.timeouts.data;
        match buffer.len() {
            0 => {
                self.i2c.clear_addsend();
                self.i2c.send_stop();
                self.wait_for_stop()?;
            }
            1 => {
                self.i2c.set_ack(false);
                self.i2c.clear_addsend();
                self.i2c.send_stop();

                self.wait_flag(Flag::Rbne, data)?;
                buffer.put(0, self.i2c.read_data());

                self.wait_for_stop()?;
                self.i2c.set_ack(true);
            }
            2 => {
                self.i2c.set_ack(true);
                self.i2c.clear_addsend();
                self.i2c.set_ack(false);

                self.wait_flag(Flag::Btc, data)?;
                self.i2c.send_stop();
                buffer.put(0, self.i2c.read_data());
                buffer.put(1, self.i2c.read_data());

                self.wait_for_stop()?;
                self.i2c.set_ack(true);
            }
            buffer_len => {
                self.i2c.set_ack(true);
                self.i2c.clear_addsend();

                for index in 0..buffer_len - 3 {
                    self.wait_flag(Flag::Rbne, data)?;
                    buffer.put(index, self.i2c.read_data());
                }

                self.wait_flag(Flag::Btc, data)?;
                self.i2c.set_ack(false);
                buffer.put(buffer_len - 3, self.i2c.read_data());
                self.i2c.send_stop();
                buffer.put(buffer_len - 2, self.i2c.read_data());
                self.wait_flag(Flag::Rbne, data)?;
                buffer.put(buffer_len - 1, self.i2c.read_data());

                self.wait_for_stop()?;
                self.i2c.set_ack(true);
            }
        }

        Ok(())
    }

    /// Writes `bytes` to the device at `addr` and ends with STOP.
    ///
    /// An empty `bytes` only runs the address phase, which is how an EEPROM is polled for the
    /// end of its write cycle.
    pub fn write(&mut self, addr: u8, bytes: &[u8]) -> Result<(), Error> {
        self.write_without_stop(addr, bytes)?;
        self.i2c.send_stop();
        self.wait_for_stop()
    }

    pub fn read(&mut self, addr: u8, buffer: &mut [u8]) -> Result<(), Error> {
        self.receive(addr, buffer)
    }

    /// Writes `bytes`, then reads into `buffer` after a repeated START.
    pub fn write_read(&mut self, addr: u8, bytes: &[u8], buffer: &mut [u8]) -> Result<(), Error> {
        if !bytes.is_empty() {
            self.write_without_stop(addr, bytes)?;
        }

        if !buffer.is_empty() {
            self.read(addr, buffer)?;
        } else if !bytes.is_empty() {
            self.i2c.send_stop();
            self.wait_for_stop()?;
        }

        Ok(())
    }
}

impl<P, T> ErrorType for BlockingI2c<P, T> {
    type Error = Error;
}

impl<P, T> I2c<SevenBitAddress> for BlockingI2c<P, T>
where
    P: I2cPeripheral,
    T: Ticks,
{
    /// Adjacent operations of the same direction share one address phase. A write following a
    /// read starts a new transfer: the receive sequence of this peripheral ends with STOP.
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut start = 0;
        while start < operations.len() {
            let reading = matches!(operations[start], Operation::Read(_));
            let end = operations[start..]
                .iter()
                .position(|operation| matches!(operation, Operation::Read(_)) != reading)
                .map_or(operations.len(), |offset| start + offset);
            let run = &mut operations[start..end];

            if reading {
                self.receive(address, run)?;
            } else {
                self.send_start_and_wait(false)?;
                self.send_addr_and_wait(address, Direction::Transmitter)?;
                self.i2c.clear_addsend();
                for operation in run.iter() {
                    if let Operation::Write(bytes) = operation {
                        for byte in bytes.iter() {
                            self.wait_flag(Flag::Tbe, self.timeouts.data)?;
                            self.i2c.write_data(*byte);
                        }
                    }
                }
                self.wait_flag(Flag::Btc, self.timeouts.data)?;
                if end == operations.len() {
                    self.i2c.send_stop();
                    self.wait_for_stop()?;
                }
            }
            start = end;
        }
        Ok(())
    }
}

#[cfg(feature = "embedded-hal-02")]
mod eh02 {
    use super::*;
    use embedded_hal_02::blocking::i2c::{Read, Write, WriteRead};

    impl<P, T> Write for BlockingI2c<P, T>
    where
        P: I2cPeripheral,
        T: Ticks,
    {
        type Error = Error;

        fn write(&mut self, addr: u8, bytes: &[u8]) -> Result<(), Self::Error> {
            BlockingI2c::write(self, addr, bytes)
        }
    }

    impl<P, T> Read for BlockingI2c<P, T>
    where
        P: I2cPeripheral,
        T: Ticks,
    {
        type Error = Error;

        fn read(&mut self, addr: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
            BlockingI2c::read(self, addr, buffer)
        }
    }

    impl<P, T> WriteRead for BlockingI2c<P, T>
    where
        P: I2cPeripheral,
        T: Ticks,
    {
        type Error = Error;

        fn write_read(
            &mut self,
            addr: u8,
            bytes: &[u8],
            buffer: &mut [u8],
        ) -> Result<(), Self::Error> {
            BlockingI2c::write_read(self, addr, bytes, buffer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i2c::fake::{FakeEeprom, Op, StepTicks};
    use crate::time::U32Ext;

    fn timeouts() -> Timeouts {
        Timeouts {
            start: 10,
            start_retries: 3,
            addr: 10,
            data: 10,
        }
    }

    fn i2c(eeprom: FakeEeprom) -> BlockingI2c<FakeEeprom, StepTicks> {
        BlockingI2c::new(eeprom, StepTicks(0), timeouts())
    }

    fn counting_memory() -> FakeEeprom {
        let mut eeprom = FakeEeprom::new();
        for (i, byte) in eeprom.memory.iter_mut().enumerate() {
            *byte = i as u8;
        }
        eeprom
    }

    #[test]
    fn timeouts_scale_with_sysclk() {
        let timeouts = Timeouts::from_micros(8.mhz(), 100, 2, 50, 10);
        assert_eq!(timeouts.start, 800);
        assert_eq!(timeouts.addr, 400);
        assert_eq!(timeouts.data, 80);
        assert_eq!(timeouts.start_retries, 2);
    }

    #[test]
    fn write_then_read_back() {
        let mut bus = i2c(FakeEeprom::new());
        bus.write(0x50, &[0x18, 1, 2, 3, 4]).unwrap();
        let mut buffer = [0; 4];
        bus.write_read(0x50, &[0x18], &mut buffer).unwrap();
        assert_eq!(buffer, [1, 2, 3, 4]);
    }

    #[test]
    fn read_lengths_use_matching_nack_sequence() {
        for len in 1..=6 {
            let mut bus = i2c(counting_memory());
            bus.write(0x50, &[0x30]).unwrap();
            let mut buffer = [0; 6];
            bus.read(0x50, &mut buffer[..len]).unwrap();
            let expected: Vec<u8> = (0x30..0x30 + len as u8).collect();
            assert_eq!(&buffer[..len], &expected[..]);

            let (eeprom, _) = bus.free();
            assert_eq!(eeprom.reads(), len);
            assert!(eeprom.ack_enabled());
            assert_eq!(eeprom.nacked_byte(), Some(len - 1), "len {}", len);
            let uses_poap = eeprom.count(Op::AckPositionNext(true)) == 1;
            assert_eq!(uses_poap, len == 2);
        }
    }

    #[test]
    fn two_byte_read_sets_ack_position_before_start() {
        let mut bus = i2c(counting_memory());
        bus.write(0x50, &[0x70]).unwrap();
        let mut buffer = [0; 2];
        bus.read(0x50, &mut buffer).unwrap();
        assert_eq!(buffer, [0x70, 0x71]);

        let (eeprom, _) = bus.free();
        let poap = eeprom.position(Op::AckPositionNext(true)).unwrap();
        let read_start = eeprom.log.iter().rposition(|op| *op == Op::Start).unwrap();
        assert!(poap < read_start);
        let poap_off = eeprom
            .log
            .iter()
            .rposition(|op| *op == Op::AckPositionNext(false))
            .unwrap();
        let stop = eeprom.log.iter().rposition(|op| *op == Op::Stop).unwrap();
        assert!(poap_off > stop);
        assert_eq!(eeprom.nacked_byte(), Some(1));
    }

    #[test]
    fn nack_on_address_sends_stop() {
        let mut bus = i2c(FakeEeprom::new());
        assert_eq!(bus.write(0x51, &[0]), Err(Error::Acknowledge));
        let (eeprom, _) = bus.free();
        assert_eq!(eeprom.count(Op::Stop), 1);
    }

    #[test]
    fn start_is_retried_then_times_out() {
        let mut eeprom = FakeEeprom::new();
        eeprom.stuck = Some(Flag::Sbsend);
        let mut bus = i2c(eeprom);
        assert_eq!(bus.write(0x50, &[0]), Err(Error::Timeout));
        let (eeprom, _) = bus.free();
        assert_eq!(eeprom.count(Op::Start), 3);
        assert_eq!(eeprom.count(Op::Reset), 3);
    }

    #[test]
    fn stalled_data_phase_times_out() {
        let mut eeprom = FakeEeprom::new();
        eeprom.stuck = Some(Flag::Rbne);
        let mut bus = i2c(eeprom);
        let mut buffer = [0; 4];
        assert_eq!(bus.read(0x50, &mut buffer), Err(Error::Timeout));
    }

    #[test]
    fn transaction_merges_adjacent_operations() {
        let mut bus = i2c(counting_memory());
        let mut first = [0; 2];
        let mut second = [0; 3];
        bus.transaction(
            0x50,
            &mut [
                Operation::Write(&[0x10]),
                Operation::Read(&mut first),
                Operation::Read(&mut second),
            ],
        )
        .unwrap();
        assert_eq!(first, [0x10, 0x11]);
        assert_eq!(second, [0x12, 0x13, 0x14]);

        let (eeprom, _) = bus.free();
        assert_eq!(eeprom.count(Op::Start), 2);
        assert_eq!(eeprom.count(Op::Stop), 1);
    }

    #[test]
    fn transaction_split_writes_form_one_page_write() {
        let mut bus = i2c(FakeEeprom::new());
        bus.transaction(
            0x50,
            &mut [Operation::Write(&[0x40]), Operation::Write(&[7, 8, 9])],
        )
        .unwrap();
        let (eeprom, _) = bus.free();
        assert_eq!(&eeprom.memory[0x40..0x43], &[7, 8, 9]);
        assert_eq!(eeprom.count(Op::Start), 1);
    }

    #[test]
    fn empty_write_runs_only_the_address_phase() {
        let mut eeprom = FakeEeprom::new();
        eeprom.write_cycle_length = 2;
        let mut bus = i2c(eeprom);
        bus.write(0x50, &[0x00, 0xAB]).unwrap();
        assert_eq!(bus.write(0x50, &[]), Err(Error::Acknowledge));
        assert_eq!(bus.write(0x50, &[]), Err(Error::Acknowledge));
        assert_eq!(bus.write(0x50, &[]), Ok(()));
    }
}
