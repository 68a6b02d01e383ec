// Copyright 2021 The gd32f1x0-hal authors.
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Custom HID class: one interrupt IN and one interrupt OUT endpoint carrying fixed-size
//! vendor reports.

use super::class::{ControlResponse, UsbClass, reply};
use super::descriptor::{
    CUSTOMHID_DESCRIPTOR, CUSTOMHID_IN_EP, CUSTOMHID_IN_PACKET, CUSTOMHID_OUT_EP,
    CUSTOMHID_OUT_PACKET, CUSTOMHID_REPORT_DESCRIPTOR, descriptor_type,
};
use super::request::{RequestKind, SetupPacket, StandardRequest};
use super::{EndpointIo, EndpointType, UsbError};
use heapless::Vec;
use log::{debug, trace, warn};
use zerocopy::AsBytes;

/// HID class request codes
pub mod request {
    pub const GET_REPORT: u8 = 0x01;
    pub const GET_IDLE: u8 = 0x02;
    pub const GET_PROTOCOL: u8 = 0x03;
    pub const SET_REPORT: u8 = 0x09;
    pub const SET_IDLE: u8 = 0x0A;
    pub const SET_PROTOCOL: u8 = 0x0B;
}

const IN_PACKET: usize = CUSTOMHID_IN_PACKET as usize;
const OUT_PACKET: usize = CUSTOMHID_OUT_PACKET as usize;

/// Report protocol, the default after configuration
pub const PROTOCOL_REPORT: u8 = 1;

pub struct CustomHid {
    in_busy: bool,
    protocol: u8,
    idle_rate: u8,
    input_report: [u8; IN_PACKET],
    output_report: Vec<u8, OUT_PACKET>,
    fresh: bool,
}

impl Default for CustomHid {
    fn default() -> Self {
        Self::new()
    }
}

impl CustomHid {
    pub const fn new() -> Self {
        CustomHid {
            in_busy: false,
            protocol: PROTOCOL_REPORT,
            idle_rate: 0,
            input_report: [0; IN_PACKET],
            output_report: Vec::new(),
            fresh: false,
        }
    }

    /// Sends an input report. Fails with `Busy` until the previous one has been collected.
    pub fn send_report<IO: EndpointIo>(&mut self, io: &mut IO, report: &[u8]) -> Result<(), UsbError> {
        if self.in_busy {
            return Err(UsbError::Busy);
        }
        let stored = self
            .input_report
            .get_mut(..report.len())
            .ok_or(UsbError::BufferTooSmall)?;
        stored.copy_from_slice(report);
        io.transmit(CUSTOMHID_IN_EP, report)?;
        self.in_busy = true;
        Ok(())
    }

    /// The last output report from the host, once.
    pub fn take_report(&mut self) -> Option<&[u8]> {
        if self.fresh {
            self.fresh = false;
            Some(&self.output_report)
        } else {
            None
        }
    }

    pub fn in_busy(&self) -> bool {
        self.in_busy
    }

    pub fn protocol(&self) -> u8 {
        self.protocol
    }

    /// Idle rate in units of 4 ms; 0 reports only on change.
    pub fn idle_rate(&self) -> u8 {
        self.idle_rate
    }

    /// Keeps the previous report when `data` is longer than an OUT packet.
    fn store_output(&mut self, data: &[u8]) -> Result<(), UsbError> {
        if data.len() > OUT_PACKET {
            warn!("hid: {} byte output report dropped", data.len());
            return Err(UsbError::BufferTooSmall);
        }
        self.output_report.clear();
        self.output_report
            .extend_from_slice(data)
            .map_err(|_| UsbError::BufferTooSmall)?;
        self.fresh = true;
        Ok(())
    }
}

impl UsbClass for CustomHid {
    fn init<IO: EndpointIo>(&mut self, io: &mut IO, _config: u8) -> Result<(), UsbError> {
        io.open(CUSTOMHID_IN_EP, EndpointType::Interrupt, CUSTOMHID_IN_PACKET);
        io.open(CUSTOMHID_OUT_EP, EndpointType::Interrupt, CUSTOMHID_OUT_PACKET);
        io.prepare_receive(CUSTOMHID_OUT_EP, OUT_PACKET);
        *self = Self::new();
        Ok(())
    }

    fn deinit<IO: EndpointIo>(&mut self, io: &mut IO, _config: u8) -> Result<(), UsbError> {
        io.close(CUSTOMHID_IN_EP);
        io.close(CUSTOMHID_OUT_EP);
        self.in_busy = false;
        Ok(())
    }

    fn setup<IO: EndpointIo>(
        &mut self,
        _io: &mut IO,
        req: &SetupPacket,
        buf: &mut [u8],
    ) -> Result<ControlResponse, UsbError> {
        match req.kind() {
            RequestKind::Standard => match req.standard_request() {
                Some(StandardRequest::GetDescriptor) => match req.descriptor_type_index().0 {
                    descriptor_type::REPORT => {
                        debug!("hid: report descriptor");
                        reply(buf, &CUSTOMHID_REPORT_DESCRIPTOR)
                    }
                    descriptor_type::HID => reply(buf, CUSTOMHID_DESCRIPTOR.as_bytes()),
                    _ => Err(UsbError::Stall),
                },
                _ => Err(UsbError::Stall),
            },
            RequestKind::Class => match req.request {
                request::GET_REPORT => reply(buf, &self.input_report),
                request::SET_REPORT => Ok(ControlResponse::DataOut),
                request::GET_IDLE => reply(buf, &[self.idle_rate]),
                request::SET_IDLE => {
                    self.idle_rate = (req.value() >> 8) as u8;
                    trace!("hid: idle rate {}", self.idle_rate);
                    Ok(ControlResponse::Ack)
                }
                request::GET_PROTOCOL => reply(buf, &[self.protocol]),
                request::SET_PROTOCOL => {
                    self.protocol = req.value() as u8;
                    Ok(ControlResponse::Ack)
                }
                _ => Err(UsbError::Stall),
            },
            _ => Err(UsbError::Stall),
        }
    }

    fn control_out<IO: EndpointIo>(
        &mut self,
        _io: &mut IO,
        req: &SetupPacket,
        data: &[u8],
    ) -> Result<(), UsbError> {
        if req.request != request::SET_REPORT {
            return Err(UsbError::Stall);
        }
        self.store_output(data)
    }

    fn data_in<IO: EndpointIo>(&mut self, _io: &mut IO, _ep_num: u8) -> Result<(), UsbError> {
        self.in_busy = false;
        Ok(())
    }

    fn data_out<IO: EndpointIo>(
        &mut self,
        io: &mut IO,
        _ep_num: u8,
        data: &[u8],
    ) -> Result<(), UsbError> {
        trace!("hid: output report {:?}", data);
        let stored = self.store_output(data);
        io.prepare_receive(CUSTOMHID_OUT_EP, OUT_PACKET);
        stored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::fake::{Call, RecordingIo};

    fn class_request(request_type: u8, request: u8, value: u16, length: u16) -> SetupPacket {
        SetupPacket::new(request_type, request, value, 0, length)
    }

    #[test]
    fn init_opens_interrupt_endpoints_and_arms_out() {
        let mut io = RecordingIo::new();
        let mut hid = CustomHid::new();
        hid.init(&mut io, 1).unwrap();
        assert_eq!(
            io.calls,
            [
                Call::Open(CUSTOMHID_IN_EP, EndpointType::Interrupt, 2),
                Call::Open(CUSTOMHID_OUT_EP, EndpointType::Interrupt, 2),
                Call::Receive(CUSTOMHID_OUT_EP, 2),
            ]
        );
    }

    #[test]
    fn report_descriptor_request() {
        let mut io = RecordingIo::new();
        let mut hid = CustomHid::new();
        let mut buf = [0; 64];
        let req = class_request(0x81, 0x06, 0x2200, 64);
        assert_eq!(
            hid.setup(&mut io, &req, &mut buf),
            Ok(ControlResponse::DataIn(CUSTOMHID_REPORT_DESCRIPTOR.len()))
        );
        assert_eq!(&buf[..3], &[0x06, 0x00, 0xFF]);

        let req = class_request(0x81, 0x06, 0x2100, 9);
        assert_eq!(hid.setup(&mut io, &req, &mut buf), Ok(ControlResponse::DataIn(9)));
        assert_eq!(buf[1], 0x21);
    }

    #[test]
    fn idle_and_protocol() {
        let mut io = RecordingIo::new();
        let mut hid = CustomHid::new();
        let mut buf = [0; 8];
        hid.setup(&mut io, &class_request(0x21, request::SET_IDLE, 0x0A00, 0), &mut buf)
            .unwrap();
        assert_eq!(hid.idle_rate(), 10);
        assert_eq!(
            hid.setup(&mut io, &class_request(0xA1, request::GET_IDLE, 0, 1), &mut buf),
            Ok(ControlResponse::DataIn(1))
        );
        assert_eq!(buf[0], 10);

        hid.setup(&mut io, &class_request(0x21, request::SET_PROTOCOL, 0, 0), &mut buf)
            .unwrap();
        hid.setup(&mut io, &class_request(0xA1, request::GET_PROTOCOL, 0, 1), &mut buf)
            .unwrap();
        assert_eq!(buf[0], 0);
    }

    #[test]
    fn in_report_waits_for_previous() {
        let mut io = RecordingIo::new();
        let mut hid = CustomHid::new();
        hid.send_report(&mut io, &[1, 0]).unwrap();
        assert_eq!(hid.send_report(&mut io, &[2, 0]), Err(UsbError::Busy));
        hid.data_in(&mut io, 1).unwrap();
        hid.send_report(&mut io, &[3, 1]).unwrap();
        assert_eq!(io.transmitted(CUSTOMHID_IN_EP), [vec![1, 0], vec![3, 1]]);

        let mut buf = [0; 8];
        assert_eq!(
            hid.setup(&mut io, &class_request(0xA1, request::GET_REPORT, 0x0100, 2), &mut buf),
            Ok(ControlResponse::DataIn(2))
        );
        assert_eq!(&buf[..2], &[3, 1]);
    }

    #[test]
    fn oversized_report_is_rejected() {
        let mut io = RecordingIo::new();
        let mut hid = CustomHid::new();
        assert_eq!(hid.send_report(&mut io, &[0; 3]), Err(UsbError::BufferTooSmall));
        assert!(!hid.in_busy());
    }

    #[test]
    fn out_report_is_stored_and_rearmed() {
        let mut io = RecordingIo::new();
        let mut hid = CustomHid::new();
        hid.data_out(&mut io, 1, &[0x11, 0x01]).unwrap();
        assert_eq!(io.last(), Some(&Call::Receive(CUSTOMHID_OUT_EP, 2)));
        assert_eq!(hid.take_report(), Some(&[0x11, 0x01][..]));
        assert_eq!(hid.take_report(), None);

        let req = class_request(0x21, request::SET_REPORT, 0x0200, 2);
        let mut buf = [0; 8];
        assert_eq!(hid.setup(&mut io, &req, &mut buf), Ok(ControlResponse::DataOut));
        hid.control_out(&mut io, &req, &[0x22, 0x00]).unwrap();
        assert_eq!(hid.take_report(), Some(&[0x22, 0x00][..]));
    }

    #[test]
    fn oversized_out_report_is_refused_and_rearmed() {
        let mut io = RecordingIo::new();
        let mut hid = CustomHid::new();
        hid.data_out(&mut io, 1, &[0x01, 0x02]).unwrap();
        assert_eq!(
            hid.data_out(&mut io, 1, &[0x03, 0x04, 0x05]),
            Err(UsbError::BufferTooSmall)
        );
        assert_eq!(io.last(), Some(&Call::Receive(CUSTOMHID_OUT_EP, 2)));
        assert_eq!(hid.take_report(), Some(&[0x01, 0x02][..]));

        let req = class_request(0x21, request::SET_REPORT, 0x0200, 3);
        assert_eq!(
            hid.control_out(&mut io, &req, &[0; 3]),
            Err(UsbError::BufferTooSmall)
        );
        assert_eq!(hid.take_report(), None);
    }

    #[test]
    fn unknown_class_request_stalls() {
        let mut io = RecordingIo::new();
        let mut hid = CustomHid::new();
        let mut buf = [0; 8];
        assert_eq!(
            hid.setup(&mut io, &class_request(0xA1, 0x55, 0, 0), &mut buf),
            Err(UsbError::Stall)
        );
    }
}
