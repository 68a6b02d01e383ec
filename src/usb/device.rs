// Copyright 2021 The gd32f1x0-hal authors.
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! USB device core: device state and the endpoint-0 control transfer state machine.
//!
//! The controller driver forwards its events:
//!
//! - bus reset → [`UsbDevice::reset`]
//! - SETUP packet on EP0 → [`UsbDevice::setup`]
//! - IN transfer complete → [`UsbDevice::data_in`]
//! - OUT data received → [`UsbDevice::data_out`]
//! - suspend / resume → [`UsbDevice::suspend`], [`UsbDevice::resume`]
//!
//! Standard requests are answered here; interface and class requests go to the [`UsbClass`].

use super::class::{ControlResponse, UsbClass, reply};
use super::descriptor::{
    self, ENG_LANGID, HID_PRINTER_CONFIG_DESCRIPTOR, HID_PRINTER_DEVICE_DESCRIPTOR,
    descriptor_type,
};
use super::request::{Recipient, RequestKind, SetupPacket, StandardRequest, feature};
use super::{EndpointAddress, EndpointIo, EndpointType, UsbError};
use log::{debug, trace, warn};
use zerocopy::AsBytes;

/// Size of the buffer holding control transfer data stages
pub const CONTROL_BUFFER_SIZE: usize = 256;

/// Device core configuration
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Config {
    /// Maximum packet size of endpoint 0; must match the device descriptor
    pub ep0_max_packet: u8,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ep0_max_packet: descriptor::EP0_MAX_PACKET_SIZE,
        }
    }
}

impl Config {
    pub fn ep0_max_packet(mut self, size: u8) -> Self {
        self.ep0_max_packet = size;
        self
    }
}

/// Descriptors served by GET_DESCRIPTOR
#[derive(Clone, Copy, Debug)]
pub struct Descriptors<'a> {
    pub device: &'a [u8],
    /// The complete configuration set, configuration descriptor first
    pub configuration: &'a [u8],
    pub langid: u16,
    /// String descriptors 1, 2, ...
    pub strings: &'a [&'a str],
}

impl<'a> Descriptors<'a> {
    /// The HID + Printer device with the given manufacturer, product and serial strings.
    pub fn hid_printer(strings: &'a [&'a str]) -> Self {
        Descriptors {
            device: HID_PRINTER_DEVICE_DESCRIPTOR.as_bytes(),
            configuration: HID_PRINTER_CONFIG_DESCRIPTOR.as_bytes(),
            langid: ENG_LANGID,
            strings,
        }
    }

    fn configuration_value(&self) -> Option<u8> {
        self.configuration.get(5).copied()
    }

    fn num_interfaces(&self) -> u8 {
        self.configuration.get(4).copied().unwrap_or(0)
    }

    /// Whether an endpoint descriptor of the configuration set declares `ep`.
    fn declares_endpoint(&self, ep: EndpointAddress) -> bool {
        let mut rest = self.configuration;
        while let [length, kind, ..] = *rest {
            let length = usize::from(length);
            if length < 2 || length > rest.len() {
                return false;
            }
            if kind == descriptor_type::ENDPOINT && rest.get(2) == Some(&ep.0) {
                return true;
            }
            rest = &rest[length..];
        }
        false
    }

    fn self_powered(&self) -> bool {
        self.configuration.get(7).is_some_and(|attributes| attributes & 0x40 != 0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeviceState {
    Default,
    Addressed,
    Configured,
    Suspended,
}

/// Stage of the control transfer in progress on endpoint 0
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ControlStage {
    Idle,
    /// `offset` bytes of `len` queued so far
    DataIn { offset: usize, len: usize },
    DataOut { expected: usize, received: usize },
    /// Zero-length IN status packet queued
    StatusIn,
    /// Waiting for the host's zero-length OUT status packet
    StatusOut,
}

pub struct UsbDevice<'a, C> {
    class: C,
    descriptors: Descriptors<'a>,
    config: Config,
    state: DeviceState,
    resume_state: DeviceState,
    address: u8,
    pending_address: Option<u8>,
    configuration: u8,
    remote_wakeup: bool,
    stage: ControlStage,
    request: SetupPacket,
    zlp_pending: bool,
    buffer: [u8; CONTROL_BUFFER_SIZE],
}

impl<'a, C: UsbClass> UsbDevice<'a, C> {
    pub fn new(class: C, descriptors: Descriptors<'a>, config: Config) -> Self {
        UsbDevice {
            class,
            descriptors,
            config,
            state: DeviceState::Default,
            resume_state: DeviceState::Default,
            address: 0,
            pending_address: None,
            configuration: 0,
            remote_wakeup: false,
            stage: ControlStage::Idle,
            request: SetupPacket::new(0, 0, 0, 0, 0),
            zlp_pending: false,
            buffer: [0; CONTROL_BUFFER_SIZE],
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn stage(&self) -> ControlStage {
        self.stage
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Selected configuration value, 0 when not configured.
    pub fn configuration(&self) -> u8 {
        self.configuration
    }

    pub fn remote_wakeup_enabled(&self) -> bool {
        self.remote_wakeup
    }

    pub fn class(&self) -> &C {
        &self.class
    }

    pub fn class_mut(&mut self) -> &mut C {
        &mut self.class
    }

    fn ep0_size(&self) -> usize {
        usize::from(self.config.ep0_max_packet)
    }

    /// Bus reset: back to the default state at address 0 with endpoint 0 open.
    pub fn reset<IO: EndpointIo>(&mut self, io: &mut IO) {
        if self.state == DeviceState::Configured
            || (self.state == DeviceState::Suspended && self.resume_state == DeviceState::Configured)
        {
            if let Err(error) = self.class.deinit(io, self.configuration) {
                warn!("usb: class deinit on reset: {}", error);
            }
        }
        trace!("usb: reset");
        self.state = DeviceState::Default;
        self.resume_state = DeviceState::Default;
        self.address = 0;
        self.pending_address = None;
        self.configuration = 0;
        self.remote_wakeup = false;
        self.stage = ControlStage::Idle;
        self.zlp_pending = false;

        let size = u16::from(self.config.ep0_max_packet);
        io.open(EndpointAddress::EP0_OUT, EndpointType::Control, size);
        io.open(EndpointAddress::EP0_IN, EndpointType::Control, size);
        io.set_address(0);
        io.prepare_receive(EndpointAddress::EP0_OUT, self.ep0_size());
    }

    pub fn suspend(&mut self) {
        if self.state != DeviceState::Suspended {
            trace!("usb: suspend from {:?}", self.state);
            self.resume_state = self.state;
            self.state = DeviceState::Suspended;
        }
    }

    pub fn resume(&mut self) {
        if self.state == DeviceState::Suspended {
            trace!("usb: resume to {:?}", self.resume_state);
            self.state = self.resume_state;
        }
    }

    /// A SETUP packet arrived on endpoint 0.
    ///
    /// Returns the error the request was stalled with, if it was.
    pub fn setup<IO: EndpointIo>(&mut self, io: &mut IO, packet: &[u8]) -> Result<(), UsbError> {
        for ep in [EndpointAddress::EP0_IN, EndpointAddress::EP0_OUT] {
            if io.is_stalled(ep) {
                io.clear_stall(ep);
            }
        }
        self.stage = ControlStage::Idle;
        self.zlp_pending = false;

        let Some(req) = SetupPacket::parse(packet) else {
            self.stall(io, UsbError::InvalidRequest);
            return Err(UsbError::InvalidRequest);
        };
        self.request = req;
        debug!(
            "usb: setup type {:#04x} request {:#04x} value {:#06x} index {:#06x} length {}",
            req.request_type,
            req.request,
            req.value(),
            req.index(),
            req.length()
        );

        let response = match (req.kind(), req.recipient()) {
            (RequestKind::Standard, Recipient::Device) => self.standard_device(io, &req),
            (RequestKind::Standard, Recipient::Interface) => self.standard_interface(io, &req),
            (RequestKind::Standard, Recipient::Endpoint) => self.standard_endpoint(io, &req),
            (RequestKind::Class, Recipient::Interface | Recipient::Endpoint) => {
                if self.state == DeviceState::Configured {
                    self.class.setup(io, &req, &mut self.buffer)
                } else {
                    Err(UsbError::InvalidRequest)
                }
            }
            _ => Err(UsbError::Stall),
        };

        match response.and_then(|response| self.respond(io, &req, response)) {
            Ok(()) => Ok(()),
            Err(error) => {
                self.stall(io, error);
                Err(error)
            }
        }
    }

    /// An IN transfer completed on endpoint number `ep_num`.
    pub fn data_in<IO: EndpointIo>(&mut self, io: &mut IO, ep_num: u8) -> Result<(), UsbError> {
        if ep_num != 0 {
            if self.state != DeviceState::Configured {
                return Err(UsbError::InvalidRequest);
            }
            return self.class.data_in(io, ep_num);
        }

        match self.stage {
            ControlStage::DataIn { offset, len } if offset < len => self.send_chunk(io),
            ControlStage::DataIn { .. } if self.zlp_pending => {
                trace!("usb: ep0 zero-length packet");
                self.zlp_pending = false;
                io.transmit(EndpointAddress::EP0_IN, &[])
            }
            ControlStage::DataIn { .. } => {
                self.stage = ControlStage::StatusOut;
                io.prepare_receive(EndpointAddress::EP0_OUT, 0);
                Ok(())
            }
            ControlStage::StatusIn => {
                self.stage = ControlStage::Idle;
                if let Some(address) = self.pending_address.take() {
                    io.set_address(address);
                    self.address = address;
                    self.state = if address == 0 {
                        DeviceState::Default
                    } else {
                        DeviceState::Addressed
                    };
                    debug!("usb: address {}", address);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// `data` arrived on OUT endpoint number `ep_num`.
    pub fn data_out<IO: EndpointIo>(
        &mut self,
        io: &mut IO,
        ep_num: u8,
        data: &[u8],
    ) -> Result<(), UsbError> {
        if ep_num != 0 {
            if self.state != DeviceState::Configured {
                return Err(UsbError::InvalidRequest);
            }
            return self.class.data_out(io, ep_num, data);
        }

        match self.stage {
            ControlStage::DataOut { expected, received } => {
                let n = data.len().min(expected - received);
                self.buffer[received..received + n].copy_from_slice(&data[..n]);
                let received = received + n;
                if received < expected && data.len() == self.ep0_size() {
                    self.stage = ControlStage::DataOut { expected, received };
                    io.prepare_receive(
                        EndpointAddress::EP0_OUT,
                        self.ep0_size().min(expected - received),
                    );
                    return Ok(());
                }
                let req = self.request;
                match self.class.control_out(io, &req, &self.buffer[..received]) {
                    Ok(()) => self.status_in(io),
                    Err(error) => {
                        self.stall(io, error);
                        Err(error)
                    }
                }
            }
            ControlStage::StatusOut => {
                self.stage = ControlStage::Idle;
                io.prepare_receive(EndpointAddress::EP0_OUT, self.ep0_size());
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn respond<IO: EndpointIo>(
        &mut self,
        io: &mut IO,
        req: &SetupPacket,
        response: ControlResponse,
    ) -> Result<(), UsbError> {
        let requested = usize::from(req.length());
        match response {
            ControlResponse::Ack => self.status_in(io),
            ControlResponse::DataIn(n) => {
                let len = n.min(requested);
                self.zlp_pending = len > 0 && len < requested && len % self.ep0_size() == 0;
                self.stage = ControlStage::DataIn { offset: 0, len };
                self.send_chunk(io)
            }
            ControlResponse::DataOut if requested == 0 => {
                self.class.control_out(io, req, &[])?;
                self.status_in(io)
            }
            ControlResponse::DataOut => {
                if requested > CONTROL_BUFFER_SIZE {
                    return Err(UsbError::BufferTooSmall);
                }
                self.stage = ControlStage::DataOut {
                    expected: requested,
                    received: 0,
                };
                io.prepare_receive(EndpointAddress::EP0_OUT, self.ep0_size().min(requested));
                Ok(())
            }
        }
    }

    fn send_chunk<IO: EndpointIo>(&mut self, io: &mut IO) -> Result<(), UsbError> {
        let ControlStage::DataIn { offset, len } = self.stage else {
            return Ok(());
        };
        let n = self.ep0_size().min(len - offset);
        trace!("usb: ep0 IN {}..{} of {}", offset, offset + n, len);
        io.transmit(EndpointAddress::EP0_IN, &self.buffer[offset..offset + n])?;
        self.stage = ControlStage::DataIn {
            offset: offset + n,
            len,
        };
        Ok(())
    }

    fn status_in<IO: EndpointIo>(&mut self, io: &mut IO) -> Result<(), UsbError> {
        self.stage = ControlStage::StatusIn;
        io.transmit(EndpointAddress::EP0_IN, &[])
    }

    fn stall<IO: EndpointIo>(&mut self, io: &mut IO, error: UsbError) {
        warn!(
            "usb: stall request {:#04x} type {:#04x}: {}",
            self.request.request, self.request.request_type, error
        );
        io.stall(EndpointAddress::EP0_IN);
        io.stall(EndpointAddress::EP0_OUT);
        self.stage = ControlStage::Idle;
        self.zlp_pending = false;
    }

    fn standard_device<IO: EndpointIo>(
        &mut self,
        io: &mut IO,
        req: &SetupPacket,
    ) -> Result<ControlResponse, UsbError> {
        match req.standard_request() {
            Some(StandardRequest::GetDescriptor) => self.get_descriptor(req),
            Some(StandardRequest::SetAddress) => {
                let address = req.value();
                if address > 127 || req.length() != 0 || self.state == DeviceState::Configured {
                    return Err(UsbError::InvalidRequest);
                }
                self.pending_address = Some(address as u8);
                Ok(ControlResponse::Ack)
            }
            Some(StandardRequest::SetConfiguration) => self.set_configuration(io, req.value()),
            Some(StandardRequest::GetConfiguration) => {
                if self.state == DeviceState::Default {
                    return Err(UsbError::InvalidRequest);
                }
                reply(&mut self.buffer, &[self.configuration])
            }
            Some(StandardRequest::GetStatus) => {
                let status = u16::from(self.descriptors.self_powered())
                    | u16::from(self.remote_wakeup) << 1;
                reply(&mut self.buffer, &status.to_le_bytes())
            }
            Some(request @ (StandardRequest::SetFeature | StandardRequest::ClearFeature))
                if req.value() == feature::DEVICE_REMOTE_WAKEUP =>
            {
                self.remote_wakeup = request == StandardRequest::SetFeature;
                Ok(ControlResponse::Ack)
            }
            _ => Err(UsbError::Stall),
        }
    }

    fn get_descriptor(&mut self, req: &SetupPacket) -> Result<ControlResponse, UsbError> {
        let (kind, index) = req.descriptor_type_index();
        match kind {
            descriptor_type::DEVICE => reply(&mut self.buffer, self.descriptors.device),
            descriptor_type::CONFIGURATION => {
                reply(&mut self.buffer, self.descriptors.configuration)
            }
            descriptor_type::STRING => {
                let len = match index {
                    0 => descriptor::write_langid(&mut self.buffer, self.descriptors.langid),
                    n => self
                        .descriptors
                        .strings
                        .get(usize::from(n) - 1)
                        .and_then(|s| descriptor::write_string(&mut self.buffer, s)),
                };
                len.map(ControlResponse::DataIn).ok_or(UsbError::Stall)
            }
            _ => Err(UsbError::Stall),
        }
    }

    fn set_configuration<IO: EndpointIo>(
        &mut self,
        io: &mut IO,
        value: u16,
    ) -> Result<ControlResponse, UsbError> {
        if self.state == DeviceState::Default {
            return Err(UsbError::InvalidRequest);
        }
        if value == 0 {
            if self.state == DeviceState::Configured {
                self.class.deinit(io, self.configuration)?;
                debug!("usb: deconfigured");
            }
            self.configuration = 0;
            self.state = DeviceState::Addressed;
            return Ok(ControlResponse::Ack);
        }
        if Some(value) != self.descriptors.configuration_value().map(u16::from) {
            return Err(UsbError::InvalidRequest);
        }
        if self.state != DeviceState::Configured {
            self.class.init(io, value as u8)?;
            self.configuration = value as u8;
            self.state = DeviceState::Configured;
            debug!("usb: configured {}", value);
        }
        Ok(ControlResponse::Ack)
    }

    fn standard_interface<IO: EndpointIo>(
        &mut self,
        io: &mut IO,
        req: &SetupPacket,
    ) -> Result<ControlResponse, UsbError> {
        if self.state != DeviceState::Configured {
            return Err(UsbError::InvalidRequest);
        }
        if req.interface() >= self.descriptors.num_interfaces() {
            return Err(UsbError::Stall);
        }
        match req.standard_request() {
            Some(StandardRequest::GetStatus) => reply(&mut self.buffer, &[0, 0]),
            Some(StandardRequest::GetInterface) => reply(&mut self.buffer, &[0]),
            Some(StandardRequest::SetInterface) if req.value() == 0 => Ok(ControlResponse::Ack),
            Some(StandardRequest::SetInterface) => Err(UsbError::Stall),
            _ => self.class.setup(io, req, &mut self.buffer),
        }
    }

    fn standard_endpoint<IO: EndpointIo>(
        &mut self,
        io: &mut IO,
        req: &SetupPacket,
    ) -> Result<ControlResponse, UsbError> {
        let ep = EndpointAddress((req.index() & 0xFF) as u8);
        if ep.number() != 0 {
            if self.state != DeviceState::Configured {
                return Err(UsbError::InvalidRequest);
            }
            if !self.descriptors.declares_endpoint(ep) {
                warn!("usb: request for unknown endpoint {:#04x}", ep.0);
                return Err(UsbError::Stall);
            }
        }
        match req.standard_request() {
            Some(StandardRequest::GetStatus) => {
                reply(&mut self.buffer, &[u8::from(io.is_stalled(ep)), 0])
            }
            Some(StandardRequest::SetFeature) if req.value() == feature::ENDPOINT_HALT => {
                io.stall(ep);
                Ok(ControlResponse::Ack)
            }
            Some(StandardRequest::ClearFeature) if req.value() == feature::ENDPOINT_HALT => {
                io.clear_stall(ep);
                Ok(ControlResponse::Ack)
            }
            _ => Err(UsbError::Stall),
        }
    }
}
