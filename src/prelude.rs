// Copyright 2021 The gd32f1x0-hal authors.
//
// SPDX-License-Identifier: MIT OR Apache-2.0

#[cfg(feature = "device-selected")]
pub use crate::rcu::RcuExt as _gd32_xfer_rcu_RcuExt;
pub use crate::time::U32Ext as _gd32_xfer_time_U32Ext;
pub use crate::usb::class::UsbClass as _gd32_xfer_usb_UsbClass;
pub use embedded_hal::delay::DelayNs as _embedded_hal_delay_DelayNs;
pub use embedded_hal::i2c::I2c as _embedded_hal_i2c_I2c;
