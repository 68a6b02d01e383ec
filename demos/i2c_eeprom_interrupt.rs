//! Writes a pattern to an AT24C02 on I2C0 (PB6 = SCL, PB7 = SDA) and reads it back, with the
//! transfer driven from the I2C0 event and error interrupts.

#![no_main]
#![no_std]

use panic_halt as _;

use core::cell::RefCell;
use cortex_m::{asm, interrupt::Mutex};
use cortex_m_rt::entry;
use cortex_m_semihosting::hprintln;
use gd32_xfer::{
    eeprom::{self, page_plan},
    i2c::{
        BusConfig, Error,
        gd32::I2c,
        interrupt::{Config, InterruptTransfer},
    },
    pac::{Gpiob, I2c0, Interrupt, Peripherals, Rcu, interrupt},
    prelude::*,
};

const SYSCLK_HZ: u32 = 8_000_000;
const LEN: usize = 16;

type Transfer = InterruptTransfer<I2c<I2c0>, LEN>;

static G_EEPROM: Mutex<RefCell<Option<Transfer>>> = Mutex::new(RefCell::new(None));

#[interrupt]
fn I2C0_EV() {
    cortex_m::interrupt::free(|cs| {
        if let Some(transfer) = G_EEPROM.borrow(cs).borrow_mut().as_mut() {
            transfer.on_event();
        }
    });
}

#[interrupt]
fn I2C0_ER() {
    cortex_m::interrupt::free(|cs| {
        if let Some(transfer) = G_EEPROM.borrow(cs).borrow_mut().as_mut() {
            transfer.on_error();
        }
    });
}

/// Retries `op` on the shared transfer until it stops returning `WouldBlock`.
fn block_on(mut op: impl FnMut(&mut Transfer) -> nb::Result<(), Error>) -> Result<(), Error> {
    loop {
        let result = cortex_m::interrupt::free(|cs| {
            match G_EEPROM.borrow(cs).borrow_mut().as_mut() {
                Some(transfer) => op(transfer),
                None => Err(nb::Error::WouldBlock),
            }
        });
        match result {
            Ok(()) => return Ok(()),
            Err(nb::Error::Other(error)) => return Err(error),
            Err(nb::Error::WouldBlock) => asm::nop(),
        }
    }
}

fn write(config: &eeprom::Config, address: u8, data: &[u8]) -> Result<(), Error> {
    for chunk in page_plan(address, data.len(), config.page_size) {
        let bytes = &data[chunk.offset..chunk.offset + chunk.len];
        block_on(|t| t.start_write(config.address, chunk.address, bytes))?;
        block_on(|t| t.poll())?;
        // ACK polling until the write cycle is over.
        block_on(|t| t.start_standby(config.address, config.standby_retries))?;
        block_on(|t| t.poll())?;
    }
    Ok(())
}

fn read(config: &eeprom::Config, address: u8, buffer: &mut [u8]) -> Result<(), Error> {
    block_on(|t| t.start_read(config.address, address, buffer.len()))?;
    block_on(|t| t.poll())?;
    cortex_m::interrupt::free(|cs| {
        if let Some(transfer) = G_EEPROM.borrow(cs).borrow().as_ref() {
            buffer.copy_from_slice(transfer.read_data());
        }
    });
    Ok(())
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
    let dp = Peripherals::take().unwrap();

    i2c0_pins(&dp.rcu, &dp.gpiob);
    let mut rcu = dp.rcu.constrain();

    let i2c = I2c::i2c0(
        dp.i2c0,
        BusConfig::default().frequency(400.khz()),
        SYSCLK_HZ.hz(),
        &mut rcu.apb1,
    );
    let transfer = InterruptTransfer::new(i2c, Config::default());
    cortex_m::interrupt::free(|cs| *G_EEPROM.borrow(cs).borrow_mut() = Some(transfer));

    unsafe {
        cortex_m::peripheral::NVIC::unmask(Interrupt::I2C0_EV);
        cortex_m::peripheral::NVIC::unmask(Interrupt::I2C0_ER);
    }

    let config = eeprom::Config::default();
    let mut pattern = [0u8; LEN];
    for (i, byte) in pattern.iter_mut().enumerate() {
        *byte = i as u8;
    }
    let mut readback = [0u8; LEN];

    let result = write(&config, 0x05, &pattern).and_then(|()| read(&config, 0x05, &mut readback));
    match result {
        Ok(()) if readback == pattern => hprintln!("EEPROM test passed"),
        Ok(()) => hprintln!("EEPROM test failed: read back {:?}", readback),
        Err(error) => hprintln!("EEPROM test failed: {}", error),
    }

    loop {
        asm::wfi();
    }
}
