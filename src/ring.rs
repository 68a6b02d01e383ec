// Copyright 2021 The gd32f1x0-hal authors.
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chained DMA descriptor rings, as used by the GD32 Ethernet and USB high-speed DMA engines.
//!
//! Each descriptor points at its own buffer and at the next descriptor; the last one points back
//! at the first. Ownership of a descriptor is carried by the DAV bit of its status word: while it
//! is set the DMA engine may touch the descriptor and its buffer, once it is clear the CPU may.
//!
//! The ring holds raw bus addresses, so it must not move after [`DescriptorRing::init_chain`].
//! Put it in a `static` or otherwise pin it in memory.

use core::ptr;
use core::sync::atomic::{Ordering, compiler_fence};
use log::{trace, warn};
use thiserror::Error;

/// Status word bits
pub mod status {
    /// Descriptor available: owned by DMA
    pub const DAV: u32 = 1 << 31;
    /// TX: last segment of the frame
    pub const LSG: u32 = 1 << 29;
    /// TX: first segment of the frame
    pub const FSG: u32 = 1 << 28;
    /// TX: second address is the next descriptor
    pub const TCHM: u32 = 1 << 20;
    /// RX: frame length, bits 16..29
    pub const FRML_SHIFT: u32 = 16;
    pub const FRML_MASK: u32 = 0x3FFF << FRML_SHIFT;
    /// RX: error summary
    pub const ERRS: u32 = 1 << 15;
    /// RX: first descriptor of the frame
    pub const FDES: u32 = 1 << 9;
    /// RX: last descriptor of the frame
    pub const LDES: u32 = 1 << 8;
}

/// Control word bits
pub mod control {
    /// RX: second address is the next descriptor
    pub const RCHM: u32 = 1 << 14;
    pub const BUFFER1_SIZE_MASK: u32 = 0x1FFF;
}

#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum Error {
    /// The received frame was flagged with an error or did not fit in one descriptor.
    #[error("Received frame is damaged or split")]
    FrameError,
    /// The frame is larger than a descriptor buffer.
    #[error("Frame does not fit in a descriptor buffer")]
    TooLarge,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Kind {
    Rx,
    Tx,
}

/// One DMA descriptor in chained mode.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct Descriptor {
    pub status: u32,
    pub control_buffer_size: u32,
    pub buffer1_addr: u32,
    pub buffer2_next_desc_addr: u32,
}

impl Descriptor {
    const fn new() -> Self {
        Descriptor {
            status: 0,
            control_buffer_size: 0,
            buffer1_addr: 0,
            buffer2_next_desc_addr: 0,
        }
    }
}

/// `N` descriptors, each with a `SIZE`-byte buffer.
pub struct DescriptorRing<const N: usize, const SIZE: usize> {
    descriptors: [Descriptor; N],
    buffers: [[u8; SIZE]; N],
    current: usize,
    kind: Kind,
}

impl<const N: usize, const SIZE: usize> Default for DescriptorRing<N, SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize, const SIZE: usize> DescriptorRing<N, SIZE> {
    const VALID: () = assert!(N > 0 && SIZE > 0 && SIZE <= control::BUFFER1_SIZE_MASK as usize);

    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let _ = Self::VALID;
        DescriptorRing {
            descriptors: [Descriptor::new(); N],
            buffers: [[0; SIZE]; N],
            current: 0,
            kind: Kind::Rx,
        }
    }

    /// Links the descriptors into a ring and sets their buffer sizes. RX descriptors are handed
    /// to DMA straight away; TX descriptors stay with the CPU until [`Self::transmit`].
    pub fn init_chain(&mut self, kind: Kind) {
        self.kind = kind;
        self.current = 0;
        // RX keeps its chain bit in the control word, TX in the status word.
        let (initial_status, control) = match kind {
            Kind::Rx => (0, control::RCHM | SIZE as u32),
            Kind::Tx => (status::TCHM, SIZE as u32),
        };
        for i in 0..N {
            let next = &self.descriptors[(i + 1) % N] as *const Descriptor;
            let buffer = self.buffers[i].as_ptr();
            let desc = &mut self.descriptors[i];
            desc.control_buffer_size = control;
            desc.buffer1_addr = bus_address(buffer);
            desc.buffer2_next_desc_addr = bus_address(next);
            desc.status = initial_status;
        }
        if kind == Kind::Rx {
            compiler_fence(Ordering::Release);
            for i in 0..N {
                self.set_status(i, status::DAV);
            }
        }
        trace!("ring: {} {:?} descriptors of {} bytes", N, kind, SIZE);
    }

    /// Address of the first descriptor, for the DMA descriptor table register.
    pub fn head(&self) -> *const Descriptor {
        self.descriptors.as_ptr()
    }

    /// Index of the descriptor the CPU looks at next.
    pub fn current(&self) -> usize {
        self.current
    }

    /// Returns the frame in the current RX descriptor once DMA has released it.
    ///
    /// The descriptor stays with the CPU until [`Self::release`]. A damaged frame is handed back
    /// to DMA immediately.
    pub fn receive(&mut self) -> nb::Result<&[u8], Error> {
        let status = self.status(self.current);
        if status & status::DAV != 0 {
            return Err(nb::Error::WouldBlock);
        }
        compiler_fence(Ordering::Acquire);

        let whole = status::FDES | status::LDES;
        if status & status::ERRS != 0 || status & whole != whole {
            warn!("ring: bad frame in descriptor {}, status {:#010x}", self.current, status);
            self.release();
            return Err(nb::Error::Other(Error::FrameError));
        }
        let len = ((status & status::FRML_MASK) >> status::FRML_SHIFT) as usize;
        if len > SIZE {
            self.release();
            return Err(nb::Error::Other(Error::FrameError));
        }
        Ok(&self.buffers[self.current][..len])
    }

    /// Gives the current RX descriptor back to DMA and moves to the next one.
    pub fn release(&mut self) {
        compiler_fence(Ordering::Release);
        self.set_status(self.current, status::DAV);
        self.advance();
    }

    /// Copies `data` into the current TX descriptor and hands it to DMA as a whole frame.
    pub fn transmit(&mut self, data: &[u8]) -> nb::Result<(), Error> {
        if data.len() > SIZE {
            return Err(nb::Error::Other(Error::TooLarge));
        }
        if self.status(self.current) & status::DAV != 0 {
            return Err(nb::Error::WouldBlock);
        }
        compiler_fence(Ordering::Acquire);

        let i = self.current;
        self.buffers[i][..data.len()].copy_from_slice(data);
        self.descriptors[i].control_buffer_size = data.len() as u32;
        compiler_fence(Ordering::Release);
        self.set_status(i, status::DAV | status::FSG | status::LSG | status::TCHM);
        trace!("ring: tx {} bytes in descriptor {}", data.len(), i);
        self.advance();
        Ok(())
    }

    fn advance(&mut self) {
        self.current = (self.current + 1) % N;
    }

    fn status(&self, i: usize) -> u32 {
        // SAFETY: the reference is valid and aligned; DMA may change the word concurrently.
        unsafe { ptr::read_volatile(&self.descriptors[i].status) }
    }

    fn set_status(&mut self, i: usize, value: u32) {
        // SAFETY: as for `status`.
        unsafe { ptr::write_volatile(&mut self.descriptors[i].status, value) }
    }
}

/// The DMA engines see a 32-bit address space.
fn bus_address<T>(p: *const T) -> u32 {
    p as usize as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Plays the part of the DMA engine, completing descriptors in ring order.
    struct SoftDma {
        next: usize,
    }

    impl SoftDma {
        fn new() -> Self {
            SoftDma { next: 0 }
        }

        /// Delivers a frame into the next RX descriptor. Returns false if DMA does not own it.
        fn deliver<const N: usize, const SIZE: usize>(
            &mut self,
            ring: &mut DescriptorRing<N, SIZE>,
            frame: &[u8],
            extra: u32,
        ) -> bool {
            let desc = ring.descriptors[self.next];
            if desc.status & status::DAV == 0 {
                return false;
            }
            ring.buffers[self.next][..frame.len()].copy_from_slice(frame);
            ring.descriptors[self.next].status = ((frame.len() as u32) << status::FRML_SHIFT)
                | status::FDES
                | status::LDES
                | extra;
            self.next = (self.next + 1) % N;
            true
        }

        /// Sends the next TX descriptor, if DMA owns it.
        fn send<const N: usize, const SIZE: usize>(
            &mut self,
            ring: &mut DescriptorRing<N, SIZE>,
        ) -> Option<Vec<u8>> {
            let desc = ring.descriptors[self.next];
            if desc.status & status::DAV == 0 {
                return None;
            }
            assert_eq!(desc.status & (status::FSG | status::LSG), status::FSG | status::LSG);
            let len = (desc.control_buffer_size & control::BUFFER1_SIZE_MASK) as usize;
            let frame = ring.buffers[self.next][..len].to_vec();
            assert_ne!(desc.status & status::TCHM, 0, "TX descriptor left chain mode");
            ring.descriptors[self.next].status = desc.status & !status::DAV;
            self.next = (self.next + 1) % N;
            Some(frame)
        }
    }

    #[test]
    fn chain_links_back_to_start() {
        let mut ring: Box<DescriptorRing<3, 64>> = Box::default();
        ring.init_chain(Kind::Rx);
        for i in 0..3 {
            let desc = ring.descriptors[i];
            assert_eq!(desc.status, status::DAV);
            assert_eq!(desc.control_buffer_size, control::RCHM | 64);
            assert_eq!(desc.buffer1_addr, bus_address(ring.buffers[i].as_ptr()));
            let next = &ring.descriptors[(i + 1) % 3] as *const Descriptor;
            assert_eq!(desc.buffer2_next_desc_addr, bus_address(next));
        }

        ring.init_chain(Kind::Tx);
        for desc in ring.descriptors.iter() {
            assert_eq!(desc.status, status::TCHM);
            assert_eq!(desc.control_buffer_size, 64);
        }
    }

    #[test]
    fn tx_chain_bit_lives_in_the_status_word() {
        let mut ring: Box<DescriptorRing<2, 64>> = Box::default();
        ring.init_chain(Kind::Tx);
        ring.transmit(b"frame").unwrap();

        let desc = ring.descriptors[0];
        assert_eq!(
            desc.status,
            status::DAV | status::FSG | status::LSG | status::TCHM
        );
        // Bits 28:16 of the control word are the second buffer size.
        assert_eq!(desc.control_buffer_size, 5);
        assert_eq!(desc.control_buffer_size & !control::BUFFER1_SIZE_MASK, 0);
    }

    #[test]
    fn receive_waits_for_dma() {
        let mut ring: Box<DescriptorRing<2, 32>> = Box::default();
        let mut dma = SoftDma::new();
        ring.init_chain(Kind::Rx);
        assert_eq!(ring.receive(), Err(nb::Error::WouldBlock));

        assert!(dma.deliver(&mut ring, b"first", 0));
        assert!(dma.deliver(&mut ring, b"second", 0));
        // Both descriptors are now with the CPU.
        assert!(!dma.deliver(&mut ring, b"third", 0));

        assert_eq!(ring.receive(), Ok(&b"first"[..]));
        ring.release();
        assert_eq!(ring.receive(), Ok(&b"second"[..]));
        ring.release();
        assert_eq!(ring.current(), 0);
        assert_eq!(ring.receive(), Err(nb::Error::WouldBlock));

        assert!(dma.deliver(&mut ring, b"third", 0));
        assert_eq!(ring.receive(), Ok(&b"third"[..]));
    }

    #[test]
    fn damaged_frame_goes_back_to_dma() {
        let mut ring: Box<DescriptorRing<2, 32>> = Box::default();
        let mut dma = SoftDma::new();
        ring.init_chain(Kind::Rx);
        assert!(dma.deliver(&mut ring, b"bad", status::ERRS));
        assert_eq!(ring.receive(), Err(nb::Error::Other(Error::FrameError)));
        assert_eq!(ring.descriptors[0].status, status::DAV);
        assert_eq!(ring.current(), 1);
    }

    #[test]
    fn split_frame_is_rejected() {
        let mut ring: Box<DescriptorRing<2, 32>> = Box::default();
        ring.init_chain(Kind::Rx);
        ring.descriptors[0].status = (4 << status::FRML_SHIFT) | status::FDES;
        assert_eq!(ring.receive(), Err(nb::Error::Other(Error::FrameError)));
    }

    #[test]
    fn transmit_fills_until_dma_catches_up() {
        let mut ring: Box<DescriptorRing<2, 16>> = Box::default();
        let mut dma = SoftDma::new();
        ring.init_chain(Kind::Tx);

        assert_eq!(ring.transmit(b"ping"), Ok(()));
        assert_eq!(ring.transmit(b"pong"), Ok(()));
        assert_eq!(ring.transmit(b"more"), Err(nb::Error::WouldBlock));

        assert_eq!(dma.send(&mut ring), Some(b"ping".to_vec()));
        assert_eq!(ring.transmit(b"more"), Ok(()));
        assert_eq!(dma.send(&mut ring), Some(b"pong".to_vec()));
        assert_eq!(dma.send(&mut ring), Some(b"more".to_vec()));
        assert_eq!(dma.send(&mut ring), None);
    }

    #[test]
    fn oversized_frame_is_refused() {
        let mut ring: Box<DescriptorRing<2, 16>> = Box::default();
        ring.init_chain(Kind::Tx);
        assert_eq!(ring.transmit(&[0; 17]), Err(nb::Error::Other(Error::TooLarge)));
        assert_eq!(ring.current(), 0);
    }
}
