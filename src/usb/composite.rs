// Copyright 2021 The gd32f1x0-hal authors.
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HID + Printer composite class.
//!
//! One device, two interfaces: requests are routed by the interface number in `wIndex`, endpoint
//! events by endpoint number. Lifecycle events go to both classes, HID first.

use super::class::{ControlResponse, UsbClass};
use super::descriptor::{
    CUSTOMHID_IN_EP, CUSTOMHID_OUT_EP, HID_INTERFACE, PRINTER_IN_EP, PRINTER_OUT_EP,
};
use super::hid::CustomHid;
use super::printer::Printer;
use super::request::SetupPacket;
use super::{EndpointIo, UsbError, unknown_endpoint};
use log::debug;

pub struct HidPrinter<const N: usize = 512> {
    pub hid: CustomHid,
    pub printer: Printer<N>,
}

impl<const N: usize> Default for HidPrinter<N> {
    fn default() -> Self {
        HidPrinter {
            hid: CustomHid::new(),
            printer: Printer::default(),
        }
    }
}

impl<const N: usize> HidPrinter<N> {
    pub const fn new(hid: CustomHid, printer: Printer<N>) -> Self {
        HidPrinter { hid, printer }
    }
}

impl<const N: usize> UsbClass for HidPrinter<N> {
    fn init<IO: EndpointIo>(&mut self, io: &mut IO, config: u8) -> Result<(), UsbError> {
        self.hid.init(io, config)?;
        self.printer.init(io, config)
    }

    fn deinit<IO: EndpointIo>(&mut self, io: &mut IO, config: u8) -> Result<(), UsbError> {
        self.hid.deinit(io, config)?;
        self.printer.deinit(io, config)
    }

    fn setup<IO: EndpointIo>(
        &mut self,
        io: &mut IO,
        req: &SetupPacket,
        buf: &mut [u8],
    ) -> Result<ControlResponse, UsbError> {
        if req.interface() == HID_INTERFACE {
            debug!("composite: request {:#04x} to HID", req.request);
            self.hid.setup(io, req, buf)
        } else {
            debug!("composite: request {:#04x} to printer", req.request);
            self.printer.setup(io, req, buf)
        }
    }

    fn control_out<IO: EndpointIo>(
        &mut self,
        io: &mut IO,
        req: &SetupPacket,
        data: &[u8],
    ) -> Result<(), UsbError> {
        if req.interface() == HID_INTERFACE {
            self.hid.control_out(io, req, data)
        } else {
            self.printer.control_out(io, req, data)
        }
    }

    fn data_in<IO: EndpointIo>(&mut self, io: &mut IO, ep_num: u8) -> Result<(), UsbError> {
        if ep_num == CUSTOMHID_IN_EP.number() {
            self.hid.data_in(io, ep_num)
        } else if ep_num == PRINTER_IN_EP.number() {
            self.printer.data_in(io, ep_num)
        } else {
            Err(unknown_endpoint("IN complete", ep_num))
        }
    }

    fn data_out<IO: EndpointIo>(
        &mut self,
        io: &mut IO,
        ep_num: u8,
        data: &[u8],
    ) -> Result<(), UsbError> {
        if ep_num == CUSTOMHID_OUT_EP.number() {
            self.hid.data_out(io, ep_num, data)
        } else if ep_num == PRINTER_OUT_EP.number() {
            self.printer.data_out(io, ep_num, data)
        } else {
            Err(unknown_endpoint("OUT data", ep_num))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::EndpointType;
    use crate::usb::fake::{Call, RecordingIo};
    use crate::usb::hid;
    use crate::usb::printer;

    fn composite() -> (HidPrinter, RecordingIo) {
        (HidPrinter::default(), RecordingIo::new())
    }

    #[test]
    fn init_and_deinit_run_hid_first() {
        let (mut class, mut io) = composite();
        class.init(&mut io, 1).unwrap();
        assert_eq!(
            &io.calls[..2],
            &[
                Call::Open(CUSTOMHID_IN_EP, EndpointType::Interrupt, 2),
                Call::Open(CUSTOMHID_OUT_EP, EndpointType::Interrupt, 2),
            ]
        );
        let printer_open = io
            .calls
            .iter()
            .position(|c| *c == Call::Open(PRINTER_IN_EP, EndpointType::Bulk, 64));
        assert_eq!(printer_open, Some(3));

        io.clear();
        class.deinit(&mut io, 1).unwrap();
        assert_eq!(
            io.calls,
            [
                Call::Close(CUSTOMHID_IN_EP),
                Call::Close(CUSTOMHID_OUT_EP),
                Call::Close(PRINTER_IN_EP),
                Call::Close(PRINTER_OUT_EP),
            ]
        );
    }

    #[test]
    fn setup_routes_by_interface_in_low_byte_of_index() {
        let (mut class, mut io) = composite();
        let mut buf = [0; 128];

        // Each class answers from its own state.
        let to_hid = SetupPacket::new(0xA1, hid::request::GET_IDLE, 0, 0x0000, 1);
        assert_eq!(class.setup(&mut io, &to_hid, &mut buf), Ok(ControlResponse::DataIn(1)));
        assert_eq!(buf[0], 0);

        let to_printer = SetupPacket::new(0xA1, printer::request::GET_PORT_STATUS, 0, 0x0001, 1);
        assert_eq!(class.setup(&mut io, &to_printer, &mut buf), Ok(ControlResponse::DataIn(1)));
        assert_eq!(buf[0], 0x18);

        // Only the low byte selects the interface.
        let high_byte_set = SetupPacket::new(0xA1, hid::request::GET_PROTOCOL, 0, 0x0100, 1);
        assert_eq!(class.setup(&mut io, &high_byte_set, &mut buf), Ok(ControlResponse::DataIn(1)));
        assert_eq!(buf[0], hid::PROTOCOL_REPORT);
    }

    #[test]
    fn endpoint_events_route_by_number() {
        let (mut class, mut io) = composite();
        class.hid.send_report(&mut io, &[1, 2]).unwrap();
        class.printer.transmit(&mut io, &[0x18]).unwrap();

        class.data_in(&mut io, 1).unwrap();
        assert!(!class.hid.in_busy());
        assert_eq!(class.printer.transmit(&mut io, &[0]), Err(UsbError::Busy));
        class.data_in(&mut io, 2).unwrap();
        assert_eq!(class.printer.transmit(&mut io, &[0]), Ok(()));

        class.data_out(&mut io, 1, &[7, 7]).unwrap();
        assert_eq!(class.hid.take_report(), Some(&[7, 7][..]));
        class.data_out(&mut io, 2, b"print").unwrap();
        assert_eq!(class.printer.pending(), 5);
    }

    #[test]
    fn unmatched_endpoints_do_nothing() {
        let (mut class, mut io) = composite();
        assert_eq!(class.data_in(&mut io, 3), Err(UsbError::UnknownEndpoint(3)));
        assert_eq!(class.data_out(&mut io, 0, &[1]), Err(UsbError::UnknownEndpoint(0)));
        assert!(io.calls.is_empty());
        assert_eq!(class.hid.take_report(), None);
        assert_eq!(class.printer.pending(), 0);
    }
}
