// Copyright 2021 The gd32f1x0-hal authors.
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SETUP packets and standard request codes.

use super::UsbDirection;
use zerocopy::byteorder::{LittleEndian, U16};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

/// Layout of the 8-byte SETUP packet that opens every control transfer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, AsBytes, FromZeroes, FromBytes, Unaligned)]
pub struct SetupPacket {
    /// `bmRequestType`: direction in bit 7, type in bits 5..6, recipient in bits 0..4
    pub request_type: u8,
    pub request: u8,
    pub value: U16<LittleEndian>,
    pub index: U16<LittleEndian>,
    /// Exact (OUT) or maximum (IN) length of the data stage
    pub length: U16<LittleEndian>,
}

/// Bits 5..6 of `bmRequestType`
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RequestKind {
    Standard,
    Class,
    Vendor,
    Reserved,
}

/// Bits 0..4 of `bmRequestType`
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Recipient {
    Device,
    Interface,
    Endpoint,
    Other,
}

/// Standard request codes (USB 2.0, table 9-4)
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum StandardRequest {
    GetStatus = 0x00,
    ClearFeature = 0x01,
    SetFeature = 0x03,
    SetAddress = 0x05,
    GetDescriptor = 0x06,
    SetDescriptor = 0x07,
    GetConfiguration = 0x08,
    SetConfiguration = 0x09,
    GetInterface = 0x0A,
    SetInterface = 0x0B,
    SynchFrame = 0x0C,
}

impl StandardRequest {
    pub const fn from_u8(request: u8) -> Option<Self> {
        Some(match request {
            0x00 => Self::GetStatus,
            0x01 => Self::ClearFeature,
            0x03 => Self::SetFeature,
            0x05 => Self::SetAddress,
            0x06 => Self::GetDescriptor,
            0x07 => Self::SetDescriptor,
            0x08 => Self::GetConfiguration,
            0x09 => Self::SetConfiguration,
            0x0A => Self::GetInterface,
            0x0B => Self::SetInterface,
            0x0C => Self::SynchFrame,
            _ => return None,
        })
    }
}

/// Feature selectors for SET_FEATURE and CLEAR_FEATURE
pub mod feature {
    pub const ENDPOINT_HALT: u16 = 0;
    pub const DEVICE_REMOTE_WAKEUP: u16 = 1;
}

impl SetupPacket {
    /// Reads a SETUP packet from the 8 bytes the controller captured.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        Self::read_from(bytes)
    }

    pub fn new(request_type: u8, request: u8, value: u16, index: u16, length: u16) -> Self {
        SetupPacket {
            request_type,
            request,
            value: U16::new(value),
            index: U16::new(index),
            length: U16::new(length),
        }
    }

    pub fn direction(&self) -> UsbDirection {
        if self.request_type & 0x80 != 0 {
            UsbDirection::In
        } else {
            UsbDirection::Out
        }
    }

    pub fn kind(&self) -> RequestKind {
        match (self.request_type >> 5) & 0x03 {
            0 => RequestKind::Standard,
            1 => RequestKind::Class,
            2 => RequestKind::Vendor,
            _ => RequestKind::Reserved,
        }
    }

    pub fn recipient(&self) -> Recipient {
        match self.request_type & 0x1F {
            0 => Recipient::Device,
            1 => Recipient::Interface,
            2 => Recipient::Endpoint,
            _ => Recipient::Other,
        }
    }

    pub fn standard_request(&self) -> Option<StandardRequest> {
        match self.kind() {
            RequestKind::Standard => StandardRequest::from_u8(self.request),
            _ => None,
        }
    }

    pub fn value(&self) -> u16 {
        self.value.get()
    }

    pub fn index(&self) -> u16 {
        self.index.get()
    }

    pub fn length(&self) -> u16 {
        self.length.get()
    }

    /// Descriptor type and index of a GET_DESCRIPTOR request, from the high and low bytes of
    /// `wValue`.
    pub fn descriptor_type_index(&self) -> (u8, u8) {
        let [index, descriptor_type] = self.value().to_le_bytes();
        (descriptor_type, index)
    }

    /// Interface number of an interface-recipient request.
    pub fn interface(&self) -> u8 {
        (self.index() & 0xFF) as u8
    }
}
