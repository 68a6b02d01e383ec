// Copyright 2021 The gd32f1x0-hal authors.
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`I2cPeripheral`] for the on-chip I2C blocks.
//!
//! Pin muxing is left to the caller: SCL and SDA must already be in their open-drain alternate
//! function before the first transfer.

use super::{BusConfig, Direction, Flag, I2cPeripheral, Interrupt, Ticks};
use crate::pac::{DWT, I2c0, I2c1, i2c0};
use crate::rcu::{APB1, Enable, Reset};
use crate::time::Hertz;
use core::ops::Deref;

pub type I2cRegisterBlock = i2c0::RegisterBlock;

/// I2C peripheral operating in master mode
pub struct I2c<I2C> {
    i2c: I2C,
    bus: BusConfig,
    pclk1: Hertz,
}

impl I2c<I2c0> {
    /// Creates an I2C0 master clocked from `pclk1`.
    pub fn i2c0(i2c: I2c0, bus: BusConfig, pclk1: Hertz, apb: &mut APB1) -> Self {
        Self::_i2c(i2c, bus, pclk1, apb)
    }
}

impl I2c<I2c1> {
    /// Creates an I2C1 master clocked from `pclk1`.
    pub fn i2c1(i2c: I2c1, bus: BusConfig, pclk1: Hertz, apb: &mut APB1) -> Self {
        Self::_i2c(i2c, bus, pclk1, apb)
    }
}

impl<I2C> I2c<I2C>
where
    I2C: Deref<Target = I2cRegisterBlock> + Enable<Bus = APB1> + Reset,
{
    fn _i2c(i2c: I2C, bus: BusConfig, pclk1: Hertz, apb: &mut APB1) -> Self {
        I2C::enable(apb);
        I2C::reset(apb);

        assert!(bus.frequency <= BusConfig::MAX_FREQUENCY);

        let mut i2c = I2c {
            i2c,
            bus,
            pclk1,
        };
        i2c.init();
        i2c
    }
}

impl<I2C> I2c<I2C>
where
    I2C: Deref<Target = I2cRegisterBlock>,
{
    /// Configures `I2C_RT`, `I2C_CTL1` and `I2C_CKCFG` from the bus config, then enables the
    /// peripheral.
    fn init(&mut self) {
        let pclk1_mhz = (self.pclk1.0 / 1_000_000) as u8;
        let (clkc, dtcy) = self.bus.clock_control(self.pclk1);
        let fast = self.bus.is_fast();
        let rise = self.bus.rise_time(self.pclk1);

        self.i2c
            .ctl1()
            .write(|w| unsafe { w.i2cclk().bits(pclk1_mhz) });
        self.i2c.ctl0().write(|w| w.i2cen().clear_bit());
        self.i2c
            .rt()
            .write(|w| unsafe { w.risetime().bits(rise) });
        self.i2c
            .ckcfg()
            .write(|w| unsafe { w.clkc().bits(clkc).dtcy().bit(dtcy).fast().bit(fast) });

        self.i2c.ctl0().modify(|_, w| w.i2cen().set_bit());
    }

    /// Releases the I2C peripheral
    pub fn free(self) -> I2C {
        self.i2c
    }
}

impl<I2C> I2cPeripheral for I2c<I2C>
where
    I2C: Deref<Target = I2cRegisterBlock>,
{
    fn flag(&self, flag: Flag) -> bool {
        let stat0 = self.i2c.stat0().read();
        match flag {
            Flag::Sbsend => stat0.sbsend().bit_is_set(),
            Flag::Addsend => stat0.addsend().bit_is_set(),
            Flag::Btc => stat0.btc().bit_is_set(),
            Flag::Stpdet => stat0.stpdet().bit_is_set(),
            Flag::Rbne => stat0.rbne().bit_is_set(),
            Flag::Tbe => stat0.tbe().bit_is_set(),
            Flag::Berr => stat0.berr().bit_is_set(),
            Flag::Lostarb => stat0.lostarb().bit_is_set(),
            Flag::Aerr => stat0.aerr().bit_is_set(),
            Flag::Ouerr => stat0.ouerr().bit_is_set(),
            Flag::Pecerr => stat0.pecerr().bit_is_set(),
            Flag::Smbto => stat0.smbto().bit_is_set(),
            Flag::Smbalt => stat0.smbalt().bit_is_set(),
            Flag::I2cbsy => self.i2c.stat1().read().i2cbsy().bit_is_set(),
        }
    }

    fn clear_flag(&mut self, flag: Flag) {
        let stat0 = self.i2c.stat0();
        match flag {
            Flag::Berr => stat0.modify(|_, w| w.berr().clear_bit()),
            Flag::Lostarb => stat0.modify(|_, w| w.lostarb().clear_bit()),
            Flag::Aerr => stat0.modify(|_, w| w.aerr().clear_bit()),
            Flag::Ouerr => stat0.modify(|_, w| w.ouerr().clear_bit()),
            Flag::Pecerr => stat0.modify(|_, w| w.pecerr().clear_bit()),
            Flag::Smbto => stat0.modify(|_, w| w.smbto().clear_bit()),
            Flag::Smbalt => stat0.modify(|_, w| w.smbalt().clear_bit()),
            _ => {}
        };
    }

    fn clear_addsend(&mut self) {
        self.i2c.stat0().read();
        self.i2c.stat1().read();
    }

    fn send_start(&mut self) {
        self.i2c.ctl0().modify(|_, w| w.start().set_bit());
    }

    fn send_stop(&mut self) {
        self.i2c.ctl0().modify(|_, w| w.stop().set_bit());
    }

    fn stop_pending(&self) -> bool {
        self.i2c.ctl0().read().stop().bit_is_set()
    }

    fn send_address(&mut self, address: u8, direction: Direction) {
        self.i2c
            .data()
            .write(|w| unsafe { w.trb().bits(direction.address_byte(address)) });
    }

    fn write_data(&mut self, byte: u8) {
        self.i2c.data().write(|w| unsafe { w.trb().bits(byte) });
    }

    fn read_data(&mut self) -> u8 {
        self.i2c.data().read().trb().bits()
    }

    fn set_ack(&mut self, enable: bool) {
        self.i2c.ctl0().modify(|_, w| w.acken().bit(enable));
    }

    fn set_ack_position_next(&mut self, next: bool) {
        self.i2c.ctl0().modify(|_, w| w.poap().bit(next));
    }

    fn listen(&mut self, interrupt: Interrupt) {
        self.i2c.ctl1().modify(|_, w| match interrupt {
            Interrupt::Event => w.evie().set_bit(),
            Interrupt::Buffer => w.bufie().set_bit(),
            Interrupt::Error => w.errie().set_bit(),
        });
    }

    fn unlisten(&mut self, interrupt: Interrupt) {
        self.i2c.ctl1().modify(|_, w| match interrupt {
            Interrupt::Event => w.evie().clear_bit(),
            Interrupt::Buffer => w.bufie().clear_bit(),
            Interrupt::Error => w.errie().clear_bit(),
        });
    }

    fn software_reset(&mut self) {
        self.i2c
            .ctl0()
            .write(|w| w.i2cen().set_bit().sreset().set_bit());
        self.i2c.ctl0().reset();
        self.init();
    }
}

/// [`Ticks`] backed by the DWT cycle counter.
///
/// **NOTE**: the cycle counter must be enabled with `DCB::enable_trace` and
/// `DWT::enable_cycle_counter` before any timeout is meaningful.
pub struct DwtTicks;

impl Ticks for DwtTicks {
    fn now(&mut self) -> u32 {
        DWT::cycle_count()
    }
}
