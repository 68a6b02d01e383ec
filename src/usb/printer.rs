// Copyright 2021 The gd32f1x0-hal authors.
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Printer class, bi-directional interface: print data arrives on the bulk OUT endpoint and is
//! queued until the application drains it.

use super::class::{ControlResponse, UsbClass, reply};
use super::descriptor::{PRINTER_IN_EP, PRINTER_IN_PACKET, PRINTER_OUT_EP, PRINTER_OUT_PACKET};
use super::request::{RequestKind, SetupPacket};
use super::{EndpointIo, EndpointType, UsbError};
use heapless::Deque;
use log::{debug, trace};

/// Printer class request codes
pub mod request {
    pub const GET_DEVICE_ID: u8 = 0x00;
    pub const GET_PORT_STATUS: u8 = 0x01;
    pub const SOFT_RESET: u8 = 0x02;
}

/// Port status: selected, no error, paper present
pub const PORT_STATUS_OK: u8 = 0x18;

/// IEEE 1284 device ID reported by default
pub const DEFAULT_DEVICE_ID: &str =
    "MANUFACTURER:GigaDevice;COMMAND SET:PJL,PCL;MODEL:GD32-HID_PRINTER;CLASS:PRINTER;";

const OUT_PACKET: usize = PRINTER_OUT_PACKET as usize;

/// Printer class with an `N`-byte receive queue
pub struct Printer<const N: usize = 512> {
    device_id: &'static str,
    port_status: u8,
    queue: Deque<u8, N>,
    /// OUT endpoint left un-armed until the queue has room for a full packet
    paused: bool,
    in_busy: bool,
}

impl<const N: usize> Default for Printer<N> {
    fn default() -> Self {
        Self::new(DEFAULT_DEVICE_ID)
    }
}

impl<const N: usize> Printer<N> {
    pub const fn new(device_id: &'static str) -> Self {
        Printer {
            device_id,
            port_status: PORT_STATUS_OK,
            queue: Deque::new(),
            paused: false,
            in_busy: false,
        }
    }

    pub fn set_port_status(&mut self, status: u8) {
        self.port_status = status;
    }

    pub fn in_busy(&self) -> bool {
        self.in_busy
    }

    /// Bytes received and not yet drained.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Moves queued print data into `sink`, re-arming the OUT endpoint if it was paused.
    ///
    /// Stops early if `sink` accepts no more bytes; returns the number of bytes moved.
    pub fn drain_into<IO, W>(&mut self, io: &mut IO, sink: &mut W) -> Result<usize, W::Error>
    where
        IO: EndpointIo,
        W: embedded_io::Write,
    {
        let mut moved = 0;
        while !self.queue.is_empty() {
            let (front, _) = self.queue.as_slices();
            let written = sink.write(front)?;
            if written == 0 {
                break;
            }
            for _ in 0..written {
                self.queue.pop_front();
            }
            moved += written;
        }
        self.resume(io);
        Ok(moved)
    }

    /// Sends status or reply data on the bulk IN endpoint.
    pub fn transmit<IO: EndpointIo>(&mut self, io: &mut IO, data: &[u8]) -> Result<(), UsbError> {
        if self.in_busy {
            return Err(UsbError::Busy);
        }
        if data.len() > usize::from(PRINTER_IN_PACKET) {
            return Err(UsbError::BufferTooSmall);
        }
        io.transmit(PRINTER_IN_EP, data)?;
        self.in_busy = true;
        Ok(())
    }

    fn room(&self) -> usize {
        N - self.queue.len()
    }

    fn resume<IO: EndpointIo>(&mut self, io: &mut IO) {
        if self.paused && self.room() >= OUT_PACKET {
            trace!("printer: resuming OUT");
            self.paused = false;
            io.prepare_receive(PRINTER_OUT_EP, OUT_PACKET);
        }
    }

    fn rearm<IO: EndpointIo>(&mut self, io: &mut IO) {
        if self.room() >= OUT_PACKET {
            io.prepare_receive(PRINTER_OUT_EP, OUT_PACKET);
        } else {
            trace!("printer: queue full, pausing OUT");
            self.paused = true;
        }
    }
}

impl<const N: usize> UsbClass for Printer<N> {
    fn init<IO: EndpointIo>(&mut self, io: &mut IO, _config: u8) -> Result<(), UsbError> {
        io.open(PRINTER_IN_EP, EndpointType::Bulk, PRINTER_IN_PACKET);
        io.open(PRINTER_OUT_EP, EndpointType::Bulk, PRINTER_OUT_PACKET);
        self.queue.clear();
        self.paused = false;
        self.in_busy = false;
        self.rearm(io);
        Ok(())
    }

    fn deinit<IO: EndpointIo>(&mut self, io: &mut IO, _config: u8) -> Result<(), UsbError> {
        io.close(PRINTER_IN_EP);
        io.close(PRINTER_OUT_EP);
        self.in_busy = false;
        self.paused = false;
        Ok(())
    }

    fn setup<IO: EndpointIo>(
        &mut self,
        io: &mut IO,
        req: &SetupPacket,
        buf: &mut [u8],
    ) -> Result<ControlResponse, UsbError> {
        if req.kind() != RequestKind::Class {
            return Err(UsbError::Stall);
        }
        match req.request {
            request::GET_DEVICE_ID => {
                let id = self.device_id.as_bytes();
                let len = id.len() + 2;
                let reply_buf = buf.get_mut(..len).ok_or(UsbError::BufferTooSmall)?;
                // The length prefix is big-endian and counts itself.
                reply_buf[..2].copy_from_slice(&(len as u16).to_be_bytes());
                reply_buf[2..].copy_from_slice(id);
                debug!("printer: device id, {} bytes", len);
                Ok(ControlResponse::DataIn(len))
            }
            request::GET_PORT_STATUS => reply(buf, &[self.port_status]),
            request::SOFT_RESET => {
                debug!("printer: soft reset");
                self.queue.clear();
                self.paused = false;
                self.in_busy = false;
                self.rearm(io);
                Ok(ControlResponse::Ack)
            }
            _ => Err(UsbError::Stall),
        }
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
        trace!("printer: {} bytes", data.len());
        if data.len() > self.room() {
            self.paused = true;
            return Err(UsbError::BufferTooSmall);
        }
        for byte in data {
            self.queue
                .push_back(*byte)
                .map_err(|_| UsbError::BufferTooSmall)?;
        }
        self.rearm(io);
        Ok(())
    }
}
