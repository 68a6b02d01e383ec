// Copyright 2021 The gd32f1x0-hal authors.
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Standard and HID descriptors, laid out byte for byte as they go on the wire.
//!
//! Every struct is `repr(C)` over single bytes and little-endian `U16`s, so it has no padding
//! and `as_bytes()` is the wire encoding.

use super::{EndpointAddress, EndpointType, UsbDirection};
use core::mem::size_of;
use zerocopy::byteorder::{LittleEndian, U16};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

/// Descriptor type codes
pub mod descriptor_type {
    pub const DEVICE: u8 = 0x01;
    pub const CONFIGURATION: u8 = 0x02;
    pub const STRING: u8 = 0x03;
    pub const INTERFACE: u8 = 0x04;
    pub const ENDPOINT: u8 = 0x05;
    pub const DEVICE_QUALIFIER: u8 = 0x06;
    pub const HID: u8 = 0x21;
    pub const REPORT: u8 = 0x22;
}

/// Class codes used by the HID + Printer device
pub mod class_code {
    pub const HID: u8 = 0x03;
    pub const PRINTER: u8 = 0x07;
    pub const PRINTER_SUBCLASS: u8 = 0x01;
    /// Bi-directional printer interface
    pub const PRINTER_PROTOCOL_BIDIRECTIONAL: u8 = 0x02;
}

/// String descriptor indices
pub mod string_index {
    pub const LANGID: u8 = 0;
    pub const MANUFACTURER: u8 = 1;
    pub const PRODUCT: u8 = 2;
    pub const SERIAL: u8 = 3;
}

pub const USBD_VID: u16 = 0x28E9;
pub const USBD_PID: u16 = 0x325A;
/// English (United States)
pub const ENG_LANGID: u16 = 0x0409;
pub const EP0_MAX_PACKET_SIZE: u8 = 64;

pub const HID_INTERFACE: u8 = 0x00;
pub const PRINTER_INTERFACE: u8 = 0x01;

pub const CUSTOMHID_IN_EP: EndpointAddress = EndpointAddress::new(1, UsbDirection::In);
pub const CUSTOMHID_OUT_EP: EndpointAddress = EndpointAddress::new(1, UsbDirection::Out);
pub const CUSTOMHID_IN_PACKET: u16 = 2;
pub const CUSTOMHID_OUT_PACKET: u16 = 2;

pub const PRINTER_IN_EP: EndpointAddress = EndpointAddress::new(2, UsbDirection::In);
pub const PRINTER_OUT_EP: EndpointAddress = EndpointAddress::new(2, UsbDirection::Out);
pub const PRINTER_IN_PACKET: u16 = 64;
pub const PRINTER_OUT_PACKET: u16 = 64;

const fn le16(value: u16) -> U16<LittleEndian> {
    U16::from_bytes(value.to_le_bytes())
}

#[repr(C)]
#[derive(Clone, Copy, Debug, AsBytes, FromZeroes, FromBytes, Unaligned)]
pub struct DeviceDescriptor {
    pub length: u8,
    pub descriptor_type: u8,
    pub bcd_usb: U16<LittleEndian>,
    pub device_class: u8,
    pub device_subclass: u8,
    pub device_protocol: u8,
    pub max_packet_size0: u8,
    pub vendor: U16<LittleEndian>,
    pub product: U16<LittleEndian>,
    pub bcd_device: U16<LittleEndian>,
    pub manufacturer_s: u8,
    pub product_s: u8,
    pub serial_s: u8,
    pub num_configurations: u8,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, AsBytes, FromZeroes, FromBytes, Unaligned)]
pub struct ConfigurationDescriptor {
    pub length: u8,
    pub descriptor_type: u8,
    /// Length of this descriptor and everything that follows it in the configuration set
    pub total_length: U16<LittleEndian>,
    pub num_interfaces: u8,
    pub configuration_value: u8,
    pub configuration_s: u8,
    /// Bit 7 reserved (set), bit 6 self-powered, bit 5 remote wakeup
    pub attributes: u8,
    /// In units of 2 mA
    pub max_power: u8,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, AsBytes, FromZeroes, FromBytes, Unaligned)]
pub struct InterfaceDescriptor {
    pub length: u8,
    pub descriptor_type: u8,
    pub interface_number: u8,
    pub alternate_setting: u8,
    pub num_endpoints: u8,
    pub interface_class: u8,
    pub interface_subclass: u8,
    pub interface_protocol: u8,
    pub interface_s: u8,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, AsBytes, FromZeroes, FromBytes, Unaligned)]
pub struct HidDescriptor {
    pub length: u8,
    pub descriptor_type: u8,
    pub bcd_hid: U16<LittleEndian>,
    pub country_code: u8,
    pub num_descriptors: u8,
    pub report_descriptor_type: u8,
    pub report_descriptor_length: U16<LittleEndian>,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, AsBytes, FromZeroes, FromBytes, Unaligned)]
pub struct EndpointDescriptor {
    pub length: u8,
    pub descriptor_type: u8,
    pub endpoint_address: u8,
    pub attributes: u8,
    pub max_packet_size: U16<LittleEndian>,
    /// Polling interval in frames for interrupt endpoints
    pub interval: u8,
}

impl EndpointDescriptor {
    pub const fn new(
        address: EndpointAddress,
        ep_type: EndpointType,
        max_packet_size: u16,
        interval: u8,
    ) -> Self {
        EndpointDescriptor {
            length: size_of::<EndpointDescriptor>() as u8,
            descriptor_type: descriptor_type::ENDPOINT,
            endpoint_address: address.0,
            attributes: ep_type as u8,
            max_packet_size: le16(max_packet_size),
            interval,
        }
    }
}

/// The complete configuration returned for GET_DESCRIPTOR(CONFIGURATION)
#[repr(C)]
#[derive(Clone, Copy, Debug, AsBytes, FromZeroes, FromBytes, Unaligned)]
pub struct HidPrinterConfigSet {
    pub config: ConfigurationDescriptor,
    pub hid_itf: InterfaceDescriptor,
    pub hid_vendor: HidDescriptor,
    pub hid_epin: EndpointDescriptor,
    pub hid_epout: EndpointDescriptor,
    pub printer_itf: InterfaceDescriptor,
    pub printer_epin: EndpointDescriptor,
    pub printer_epout: EndpointDescriptor,
}

const _: () = assert!(size_of::<DeviceDescriptor>() == 18);
const _: () = assert!(size_of::<ConfigurationDescriptor>() == 9);
const _: () = assert!(size_of::<InterfaceDescriptor>() == 9);
const _: () = assert!(size_of::<HidDescriptor>() == 9);
const _: () = assert!(size_of::<EndpointDescriptor>() == 7);
const _: () = assert!(size_of::<HidPrinterConfigSet>() == 64);

/// Vendor-defined HID report descriptor: two-byte input and output reports.
pub const CUSTOMHID_REPORT_DESCRIPTOR: [u8; 27] = [
    0x06, 0x00, 0xFF, // Usage Page (Vendor Defined 0xFF00)
    0x09, 0x01, // Usage (0x01)
    0xA1, 0x01, // Collection (Application)
    0x15, 0x00, //   Logical Minimum (0)
    0x26, 0xFF, 0x00, //   Logical Maximum (255)
    0x75, 0x08, //   Report Size (8)
    0x95, 0x02, //   Report Count (2)
    0x09, 0x02, //   Usage (0x02)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    0x95, 0x02, //   Report Count (2)
    0x09, 0x03, //   Usage (0x03)
    0x91, 0x02, //   Output (Data, Variable, Absolute)
    0xC0, // End Collection
];

pub static HID_PRINTER_DEVICE_DESCRIPTOR: DeviceDescriptor = DeviceDescriptor {
    length: size_of::<DeviceDescriptor>() as u8,
    descriptor_type: descriptor_type::DEVICE,
    bcd_usb: le16(0x0200),
    device_class: 0x00,
    device_subclass: 0x00,
    device_protocol: 0x00,
    max_packet_size0: EP0_MAX_PACKET_SIZE,
    vendor: le16(USBD_VID),
    product: le16(USBD_PID),
    bcd_device: le16(0x0100),
    manufacturer_s: string_index::MANUFACTURER,
    product_s: string_index::PRODUCT,
    serial_s: string_index::SERIAL,
    num_configurations: 1,
};

/// HID class descriptor of the custom HID interface
pub const CUSTOMHID_DESCRIPTOR: HidDescriptor = HidDescriptor {
    length: size_of::<HidDescriptor>() as u8,
    descriptor_type: descriptor_type::HID,
    bcd_hid: le16(0x0111),
    country_code: 0x00,
    num_descriptors: 1,
    report_descriptor_type: descriptor_type::REPORT,
    report_descriptor_length: le16(CUSTOMHID_REPORT_DESCRIPTOR.len() as u16),
};

pub static HID_PRINTER_CONFIG_DESCRIPTOR: HidPrinterConfigSet = HidPrinterConfigSet {
    config: ConfigurationDescriptor {
        length: size_of::<ConfigurationDescriptor>() as u8,
        descriptor_type: descriptor_type::CONFIGURATION,
        total_length: le16(size_of::<HidPrinterConfigSet>() as u16),
        num_interfaces: 0x02,
        configuration_value: 0x01,
        configuration_s: 0x00,
        attributes: 0x80,
        max_power: 0x32,
    },
    hid_itf: InterfaceDescriptor {
        length: size_of::<InterfaceDescriptor>() as u8,
        descriptor_type: descriptor_type::INTERFACE,
        interface_number: HID_INTERFACE,
        alternate_setting: 0x00,
        num_endpoints: 0x02,
        interface_class: class_code::HID,
        interface_subclass: 0x00,
        interface_protocol: 0x00,
        interface_s: 0x00,
    },
    hid_vendor: CUSTOMHID_DESCRIPTOR,
    hid_epin: EndpointDescriptor::new(
        CUSTOMHID_IN_EP,
        EndpointType::Interrupt,
        CUSTOMHID_IN_PACKET,
        0x20,
    ),
    hid_epout: EndpointDescriptor::new(
        CUSTOMHID_OUT_EP,
        EndpointType::Interrupt,
        CUSTOMHID_OUT_PACKET,
        0x20,
    ),
    printer_itf: InterfaceDescriptor {
        length: size_of::<InterfaceDescriptor>() as u8,
        descriptor_type: descriptor_type::INTERFACE,
        interface_number: PRINTER_INTERFACE,
        alternate_setting: 0x00,
        num_endpoints: 0x02,
        interface_class: class_code::PRINTER,
        interface_subclass: class_code::PRINTER_SUBCLASS,
        interface_protocol: class_code::PRINTER_PROTOCOL_BIDIRECTIONAL,
        interface_s: 0x00,
    },
    printer_epin: EndpointDescriptor::new(PRINTER_IN_EP, EndpointType::Bulk, PRINTER_IN_PACKET, 0),
    printer_epout: EndpointDescriptor::new(
        PRINTER_OUT_EP,
        EndpointType::Bulk,
        PRINTER_OUT_PACKET,
        0,
    ),
};

pub const MANUFACTURER_STRING: &str = "GigaDevice";
pub const PRODUCT_STRING: &str = "GD32-HID_PRINTER";

/// Writes the LANGID table (string descriptor 0) into `buf`, returning its length.
pub fn write_langid(buf: &mut [u8], langid: u16) -> Option<usize> {
    let bytes = buf.get_mut(..4)?;
    let [lo, hi] = langid.to_le_bytes();
    bytes.copy_from_slice(&[4, descriptor_type::STRING, lo, hi]);
    Some(4)
}

/// Encodes `s` as a UTF-16LE string descriptor into `buf`, returning its length.
///
/// Returns `None` if `buf` is too small or the descriptor would exceed 255 bytes.
pub fn write_string(buf: &mut [u8], s: &str) -> Option<usize> {
    let len = 2 + 2 * s.encode_utf16().count();
    if len > usize::from(u8::MAX) || len > buf.len() {
        return None;
    }
    buf[0] = len as u8;
    buf[1] = descriptor_type::STRING;
    for (unit, out) in s.encode_utf16().zip(buf[2..len].chunks_exact_mut(2)) {
        out.copy_from_slice(&unit.to_le_bytes());
    }
    Some(len)
}

/// Builds the 12-character serial number from the 96-bit unique device ID.
///
/// The first and third words are summed into eight hex digits; the upper half of the second
/// word gives the last four.
pub fn serial_number(unique_id: [u32; 3]) -> [u8; 12] {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let first = unique_id[0].wrapping_add(unique_id[2]);
    let second = unique_id[1] >> 16;
    let mut serial = [0; 12];
    for (i, digit) in serial[..8].iter_mut().enumerate() {
        *digit = HEX[((first >> (28 - 4 * i)) & 0xF) as usize];
    }
    for (i, digit) in serial[8..].iter_mut().enumerate() {
        *digit = HEX[((second >> (12 - 4 * i)) & 0xF) as usize];
    }
    serial
}
