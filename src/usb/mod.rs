// Copyright 2021 The gd32f1x0-hal authors.
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! USB device side: endpoint-0 control pipe, descriptors and the HID + Printer composite class.
//!
//! Hardware access goes through [`EndpointIo`]. The device core ([`device::UsbDevice`]) is fed
//! the controller's events (bus reset, SETUP received, IN complete, OUT received) and answers
//! them through that trait, so any USB controller driver can sit underneath.

use log::warn;

pub mod class;
pub mod composite;
pub mod descriptor;
pub mod device;
#[cfg(test)]
pub(crate) mod fake;
pub mod hid;
pub mod printer;
pub mod request;

/// USB error
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum UsbError {
    /// The request is not supported; the control pipe answers with STALL
    #[error("Request not supported")]
    Stall,
    /// No class owns the endpoint
    #[error("No class owns endpoint {0}")]
    UnknownEndpoint(u8),
    /// The previous IN transfer on the endpoint has not completed
    #[error("Endpoint busy")]
    Busy,
    /// The data does not fit in the buffer or packet
    #[error("Buffer too small")]
    BufferTooSmall,
    /// Malformed SETUP packet or request outside the allowed state
    #[error("Invalid request")]
    InvalidRequest,
}

/// USB deals in two transfer directions: OUT (host-to-device) and IN (device-to-host).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum UsbDirection {
    Out = 0x00,
    In = 0x80,
}

/// Endpoint address: number in bits 0..3, direction in bit 7.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct EndpointAddress(pub u8);

impl EndpointAddress {
    pub const EP0_OUT: EndpointAddress = EndpointAddress::new(0, UsbDirection::Out);
    pub const EP0_IN: EndpointAddress = EndpointAddress::new(0, UsbDirection::In);

    pub const fn new(number: u8, direction: UsbDirection) -> Self {
        EndpointAddress((number & 0x0F) | direction as u8)
    }

    /// Endpoint number, the address with the direction bit masked off.
    pub const fn number(self) -> u8 {
        self.0 & 0x7F
    }

    pub const fn direction(self) -> UsbDirection {
        if self.0 & 0x80 != 0 {
            UsbDirection::In
        } else {
            UsbDirection::Out
        }
    }

    pub const fn is_in(self) -> bool {
        matches!(self.direction(), UsbDirection::In)
    }
}

/// Transfer type, as encoded in `bmAttributes` of an endpoint descriptor
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum EndpointType {
    Control = 0x00,
    Isochronous = 0x01,
    Bulk = 0x02,
    Interrupt = 0x03,
}

/// Endpoint operations the USB controller driver provides.
pub trait EndpointIo {
    /// Activates an endpoint with the given transfer type and maximum packet size.
    fn open(&mut self, ep: EndpointAddress, ep_type: EndpointType, max_packet_size: u16);

    /// Deactivates an endpoint.
    fn close(&mut self, ep: EndpointAddress);

    /// Queues one packet on an IN endpoint. An empty `data` sends a zero-length packet.
    fn transmit(&mut self, ep: EndpointAddress, data: &[u8]) -> Result<(), UsbError>;

    /// Arms an OUT endpoint to accept up to `max_len` bytes.
    fn prepare_receive(&mut self, ep: EndpointAddress, max_len: usize);

    fn stall(&mut self, ep: EndpointAddress);

    fn clear_stall(&mut self, ep: EndpointAddress);

    fn is_stalled(&self, ep: EndpointAddress) -> bool;

    /// Programs the device address the controller answers to.
    fn set_address(&mut self, address: u8);
}

/// Reports an endpoint event that no class claimed.
pub(crate) fn unknown_endpoint(event: &str, ep_num: u8) -> UsbError {
    warn!("usb: {} on unclaimed endpoint {}", event, ep_num);
    UsbError::UnknownEndpoint(ep_num)
}
