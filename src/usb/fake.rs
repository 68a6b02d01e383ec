// Copyright 2021 The gd32f1x0-hal authors.
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recording [`EndpointIo`] for tests.

use super::{EndpointAddress, EndpointIo, EndpointType, UsbError};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Call {
    Open(EndpointAddress, EndpointType, u16),
    Close(EndpointAddress),
    Transmit(EndpointAddress, Vec<u8>),
    Receive(EndpointAddress, usize),
    Stall(EndpointAddress),
    ClearStall(EndpointAddress),
    SetAddress(u8),
}

#[derive(Default)]
pub struct RecordingIo {
    pub calls: Vec<Call>,
    stalled: Vec<EndpointAddress>,
}

impl RecordingIo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Packets queued on `ep`, oldest first.
    pub fn transmitted(&self, ep: EndpointAddress) -> Vec<Vec<u8>> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Transmit(e, data) if *e == ep => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last(&self) -> Option<&Call> {
        self.calls.last()
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

impl EndpointIo for RecordingIo {
    fn open(&mut self, ep: EndpointAddress, ep_type: EndpointType, max_packet_size: u16) {
        self.calls.push(Call::Open(ep, ep_type, max_packet_size));
    }

    fn close(&mut self, ep: EndpointAddress) {
        self.calls.push(Call::Close(ep));
    }

    fn transmit(&mut self, ep: EndpointAddress, data: &[u8]) -> Result<(), UsbError> {
        self.calls.push(Call::Transmit(ep, data.to_vec()));
        Ok(())
    }

    fn prepare_receive(&mut self, ep: EndpointAddress, max_len: usize) {
        self.calls.push(Call::Receive(ep, max_len));
    }

    fn stall(&mut self, ep: EndpointAddress) {
        self.calls.push(Call::Stall(ep));
        if !self.stalled.contains(&ep) {
            self.stalled.push(ep);
        }
    }

    fn clear_stall(&mut self, ep: EndpointAddress) {
        self.calls.push(Call::ClearStall(ep));
        self.stalled.retain(|e| *e != ep);
    }

    fn is_stalled(&self, ep: EndpointAddress) -> bool {
        self.stalled.contains(&ep)
    }

    fn set_address(&mut self, address: u8) {
        self.calls.push(Call::SetAddress(address));
    }
}
