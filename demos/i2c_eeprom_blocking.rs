//! Self test of an AT24C02 on I2C0 (PB6 = SCL, PB7 = SDA) using the polled master and the
//! embedded-hal EEPROM driver.

#![no_main]
#![no_std]

use panic_halt as _;

use cortex_m::asm;
use cortex_m_rt::entry;
use cortex_m_semihosting::hprintln;
use embedded_hal::delay::DelayNs;
use gd32_xfer::{
    eeprom::{At24cxx, Config},
    i2c::{
        BusConfig,
        blocking::{BlockingI2c, Timeouts},
        gd32::{DwtTicks, I2c},
    },
    pac::{CorePeripherals, Gpiob, Peripherals, Rcu},
    prelude::*,
};

const SYSCLK_HZ: u32 = 8_000_000;

/// Busy-wait delay counted in core cycles.
struct CycleDelay {
    cycles_per_us: u32,
}

impl DelayNs for CycleDelay {
    fn delay_ns(&mut self, ns: u32) {
        asm::delay((ns / 1000 + 1) * self.cycles_per_us);
    }
}

/// PB6 and PB7 to AF1, open drain with pull-ups.
fn i2c0_pins(rcu: &Rcu, gpiob: &Gpiob) {
    rcu.ahben().modify(|r, w| unsafe { w.bits(r.bits() | 1 << 18) });
    gpiob
        .afsel0()
        .modify(|r, w| unsafe { w.bits(r.bits() & !(0xFF << 24) | (0x11 << 24)) });
    gpiob.omode().modify(|r, w| unsafe { w.bits(r.bits() | 0b11 << 6) });
    gpiob
        .pud()
        .modify(|r, w| unsafe { w.bits(r.bits() & !(0b1111 << 12) | (0b0101 << 12)) });
    gpiob
        .ctl()
        .modify(|r, w| unsafe { w.bits(r.bits() & !(0b1111 << 12) | (0b1010 << 12)) });
}

#[entry]
fn main() -> ! {
    let mut cp = CorePeripherals::take().unwrap();
    let dp = Peripherals::take().unwrap();

    // The timeouts count DWT cycles.
    cp.DCB.enable_trace();
    cp.DWT.enable_cycle_counter();

    i2c0_pins(&dp.rcu, &dp.gpiob);
    let mut rcu = dp.rcu.constrain();

    let i2c = I2c::i2c0(
        dp.i2c0,
        BusConfig::default().frequency(400.khz()),
        SYSCLK_HZ.hz(),
        &mut rcu.apb1,
    );
    let i2c = BlockingI2c::new(
        i2c,
        DwtTicks,
        Timeouts::from_micros(SYSCLK_HZ.hz(), 1000, 10, 1000, 1000),
    );
    let delay = CycleDelay {
        cycles_per_us: SYSCLK_HZ / 1_000_000,
    };
    let mut eeprom = At24cxx::new(i2c, delay, Config::default());

    let mut write = [0u8; 256];
    let mut read = [0u8; 256];
    match eeprom.self_test(&mut write, &mut read) {
        Ok(()) => hprintln!("EEPROM self test passed"),
        Err(error) => hprintln!("EEPROM self test failed: {}", error),
    }

    loop {
        asm::wfi();
    }
}
