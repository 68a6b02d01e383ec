// Copyright 2021 The gd32f1x0-hal authors.
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The interface between the device core and a class driver.

use super::request::SetupPacket;
use super::{EndpointIo, UsbError};

/// How a class answers a control request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ControlResponse {
    /// No data stage, or OUT data already consumed: acknowledge with a zero-length status.
    Ack,
    /// Send the first `n` bytes of the buffer passed to [`UsbClass::setup`].
    DataIn(usize),
    /// Accept `wLength` bytes from the host, then hand them to [`UsbClass::control_out`].
    DataOut,
}

/// Callbacks a class driver implements.
///
/// All methods run in the context of the USB interrupt and must not block.
pub trait UsbClass {
    /// Configuration `config` was selected: open the class endpoints.
    fn init<IO: EndpointIo>(&mut self, io: &mut IO, config: u8) -> Result<(), UsbError>;

    /// The configuration was dropped: close the class endpoints.
    fn deinit<IO: EndpointIo>(&mut self, io: &mut IO, config: u8) -> Result<(), UsbError>;

    /// A request addressed to one of the class interfaces. IN data goes into `buf`.
    fn setup<IO: EndpointIo>(
        &mut self,
        io: &mut IO,
        req: &SetupPacket,
        buf: &mut [u8],
    ) -> Result<ControlResponse, UsbError>;

    /// The data stage of a request answered with [`ControlResponse::DataOut`] completed.
    fn control_out<IO: EndpointIo>(
        &mut self,
        _io: &mut IO,
        _req: &SetupPacket,
        _data: &[u8],
    ) -> Result<(), UsbError> {
        Err(UsbError::Stall)
    }

    /// An IN transfer on endpoint number `ep_num` completed.
    fn data_in<IO: EndpointIo>(&mut self, io: &mut IO, ep_num: u8) -> Result<(), UsbError>;

    /// `data` arrived on OUT endpoint number `ep_num`.
    fn data_out<IO: EndpointIo>(
        &mut self,
        io: &mut IO,
        ep_num: u8,
        data: &[u8],
    ) -> Result<(), UsbError>;
}

/// Copies `data` into the control buffer and answers with it.
pub(crate) fn reply(buf: &mut [u8], data: &[u8]) -> Result<ControlResponse, UsbError> {
    buf.get_mut(..data.len())
        .ok_or(UsbError::BufferTooSmall)?
        .copy_from_slice(data);
    Ok(ControlResponse::DataIn(data.len()))
}
