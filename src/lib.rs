// Copyright 2021 The gd32f1x0-hal authors.
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Transfer state machines for GD32 microcontrollers
//!
//! This crate contains the two pieces of the GD32 firmware examples that carry real protocol
//! state:
//!
//! - an interrupt-driven I2C master that walks an AT24Cxx EEPROM through
//!   START → address → data → STOP one flag at a time ([`i2c::interrupt`]), along with a polled
//!   master with explicit timeouts ([`i2c::blocking`]) and an EEPROM driver on top of
//!   [`embedded-hal`] ([`eeprom`]);
//! - a USB device control pipe ([`usb::device`]) with byte-exact descriptors
//!   ([`usb::descriptor`]) and a HID + Printer composite class that routes requests and endpoint
//!   events to the right handler ([`usb::composite`]).
//!
//! The protocol logic talks to hardware through small traits ([`i2c::I2cPeripheral`],
//! [`usb::EndpointIo`]) so it builds for any target. The bindings to the GD32F1x0 register blocks
//! are only compiled when a microcontroller is selected with a feature, for example
//! `gd32f150x8`.
//!
//! ## Variants
//!
//! - `gd32f130x4`, `gd32f130x6`, `gd32f130x8`
//! - `gd32f150x4`, `gd32f150x6`, `gd32f150x8`
//! - `gd32f170x4`, `gd32f170x6`, `gd32f170x8`
//! - `gd32f190x4`, `gd32f190x6`, `gd32f190x8`
//!
//! ## Sharing a driver with an interrupt handler
//!
//! Drivers are plain structs. Move them into a `cortex_m::interrupt::Mutex` and call the event
//! handler from the ISR:
//!
//! ```rust,ignore
//! static G_EEPROM: Mutex<RefCell<Option<InterruptTransfer<I2c0, 16>>>> =
//!     Mutex::new(RefCell::new(None));
//!
//! #[interrupt]
//! fn I2C0_EV() {
//!     cortex_m::interrupt::free(|cs| {
//!         if let Some(transfer) = G_EEPROM.borrow(cs).borrow_mut().as_mut() {
//!             transfer.on_event();
//!         }
//!     });
//! }
//! ```
//!
//! See the [demos] folder for complete programs.
//!
//! [`embedded-hal`]: https://crates.io/crates/embedded-hal
//! [demos]: https://github.com/gd32-rust/gd32-xfer/tree/main/demos

#![cfg_attr(not(test), no_std)]
#![deny(rustdoc::broken_intra_doc_links)]

// If any two or more targets are specified, print error message.
#[cfg(any(
    all(feature = "gd32f130", feature = "gd32f150"),
    all(feature = "gd32f130", feature = "gd32f170"),
    all(feature = "gd32f130", feature = "gd32f190"),
    all(feature = "gd32f150", feature = "gd32f170"),
    all(feature = "gd32f150", feature = "gd32f190"),
    all(feature = "gd32f170", feature = "gd32f190"),
    all(feature = "gd32f130x4", feature = "gd32f130x6"),
    all(feature = "gd32f130x4", feature = "gd32f130x8"),
    all(feature = "gd32f130x6", feature = "gd32f130x8"),
    all(feature = "gd32f150x4", feature = "gd32f150x6"),
    all(feature = "gd32f150x4", feature = "gd32f150x8"),
    all(feature = "gd32f150x6", feature = "gd32f150x8"),
    all(feature = "gd32f170x4", feature = "gd32f170x6"),
    all(feature = "gd32f170x4", feature = "gd32f170x8"),
    all(feature = "gd32f170x6", feature = "gd32f170x8"),
    all(feature = "gd32f190x4", feature = "gd32f190x6"),
    all(feature = "gd32f190x4", feature = "gd32f190x8"),
    all(feature = "gd32f190x6", feature = "gd32f190x8"),
))]
compile_error!(
    "Multiple targets specified. Only a single `--features <target-name>` can be specified."
);

#[cfg(feature = "gd32f130")]
pub use gd32f1::gd32f130 as pac;
#[cfg(feature = "gd32f150")]
pub use gd32f1::gd32f150 as pac;
#[cfg(feature = "gd32f170")]
pub use gd32f1::gd32f170 as pac;
#[cfg(feature = "gd32f190")]
pub use gd32f1::gd32f190 as pac;

pub mod eeprom;
pub mod i2c;
pub mod prelude;
#[cfg(feature = "device-selected")]
pub mod rcu;
pub mod ring;
pub mod time;
pub mod usb;
