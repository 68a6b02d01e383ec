// Copyright 2021 The gd32f1x0-hal authors.
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Reset & Clock Unit
//!
//! Only the APB1 enable and reset bits of the I2C peripherals are handled here; clock tree
//! configuration is left to the application.

use crate::pac::{Rcu as RCU, rcu};

/// Extension trait that constrains the `RCU` peripheral
pub trait RcuExt {
    /// Constrains the `RCU` peripheral so it plays nicely with the other abstractions
    fn constrain(self) -> Rcu;
}

impl RcuExt for RCU {
    fn constrain(self) -> Rcu {
        Rcu {
            apb1: APB1 { _0: () },
        }
    }
}

/// Constrained RCU peripheral
///
/// ```rust,ignore
/// let dp = pac::Peripherals::take().unwrap();
/// let mut rcu = dp.rcu.constrain();
/// ```
pub struct Rcu {
    /// Advanced Peripheral Bus 1 (APB1) registers
    pub apb1: APB1,
}

/// Advanced Peripheral Bus 1 (APB1) registers
pub struct APB1 {
    _0: (),
}

impl APB1 {
    pub(crate) fn enr(&mut self) -> &rcu::Apb1en {
        // NOTE(unsafe) this proxy grants exclusive access to this register
        unsafe { (*RCU::ptr()).apb1en() }
    }

    pub(crate) fn rstr(&mut self) -> &rcu::Apb1rst {
        // NOTE(unsafe) this proxy grants exclusive access to this register
        unsafe { (*RCU::ptr()).apb1rst() }
    }
}

pub(crate) mod sealed {
    /// Bus associated to peripheral
    pub trait RcuBus {
        /// Bus type;
        type Bus;
    }
}
use sealed::RcuBus;

/// Enable/disable peripheral
pub trait Enable: RcuBus {
    fn enable(apb: &mut Self::Bus);
    fn disable(apb: &mut Self::Bus);
}

/// Reset peripheral
pub trait Reset: RcuBus {
    fn reset(apb: &mut Self::Bus);
}

macro_rules! bus {
    ($($PER:ident => ($apbX:ty, $peren:ident, $perrst:ident),)+) => {
        $(
            impl RcuBus for crate::pac::$PER {
                type Bus = $apbX;
            }
            impl Enable for crate::pac::$PER {
                #[inline(always)]
                fn enable(apb: &mut Self::Bus) {
                    apb.enr().modify(|_, w| w.$peren().set_bit());
                }
                #[inline(always)]
                fn disable(apb: &mut Self::Bus) {
                    apb.enr().modify(|_, w| w.$peren().clear_bit());
                }
            }
            impl Reset for crate::pac::$PER {
                #[inline(always)]
                fn reset(apb: &mut Self::Bus) {
                    apb.rstr().modify(|_, w| w.$perrst().set_bit());
                    apb.rstr().modify(|_, w| w.$perrst().clear_bit());
                }
            }
        )+
    }
}

bus! {
    I2c0 => (APB1, i2c0en, i2c0rst),
    I2c1 => (APB1, i2c1en, i2c1rst),
}
