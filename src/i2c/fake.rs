// Copyright 2021 The gd32f1x0-hal authors.
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Flag-level model of an AT24C02 sitting behind the I2C peripheral, for tests.

use super::{Direction, Flag, I2cPeripheral, Interrupt, Ticks};
use core::cell::Cell;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Op {
    Start,
    Stop,
    Address(u8, Direction),
    ClearAddsend,
    Write(u8),
    Read(u8),
    Ack(bool),
    AckPositionNext(bool),
    Reset,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase {
    Idle,
    Started,
    Addressed(Direction),
    Transmitting,
    Receiving,
}

pub struct FakeEeprom {
    pub memory: [u8; 256],
    pub slave: u8,
    pub page_size: u8,
    /// Address attempts NACKed after each committed write.
    pub write_cycle_length: u32,
    /// A status flag that never comes up.
    pub stuck: Option<Flag>,
    pub log: Vec<Op>,
    pub listening: Vec<Interrupt>,
    phase: Phase,
    sbsend: bool,
    addsend: bool,
    busy: bool,
    bus_held: bool,
    ack: bool,
    word_address_seen: bool,
    pointer: u8,
    pending: Vec<(u8, u8)>,
    write_cycle: u32,
    errors: Vec<Flag>,
    stop_polls: Cell<u32>,
    ack_position_next: bool,
    rx_index: usize,
    /// Received bytes whose ACK bit has already been driven.
    rx_decided: Cell<usize>,
    nacked: Cell<Option<usize>>,
}

impl FakeEeprom {
    pub fn new() -> Self {
        FakeEeprom {
            memory: [0xFF; 256],
            slave: 0x50,
            page_size: 8,
            write_cycle_length: 0,
            stuck: None,
            log: Vec::new(),
            listening: Vec::new(),
            phase: Phase::Idle,
            sbsend: false,
            addsend: false,
            busy: false,
            bus_held: false,
            ack: true,
            word_address_seen: false,
            pointer: 0,
            pending: Vec::new(),
            write_cycle: 0,
            errors: Vec::new(),
            stop_polls: Cell::new(0),
            ack_position_next: false,
            rx_index: 0,
            rx_decided: Cell::new(0),
            nacked: Cell::new(None),
        }
    }

    /// Raises a sticky error flag as the hardware would.
    pub fn raise(&mut self, flag: Flag) {
        if !self.errors.contains(&flag) {
            self.errors.push(flag);
        }
    }

    /// Pretends another master holds the bus.
    pub fn hold_bus(&mut self, held: bool) {
        self.bus_held = held;
    }

    pub fn ack_enabled(&self) -> bool {
        self.ack
    }

    pub fn count(&self, op: Op) -> usize {
        self.log.iter().filter(|o| **o == op).count()
    }

    pub fn position(&self, op: Op) -> Option<usize> {
        self.log.iter().position(|o| *o == op)
    }

    pub fn reads(&self) -> usize {
        self.log.iter().filter(|o| matches!(o, Op::Read(_))).count()
    }

    /// Index of the received byte the master answered with NACK.
    pub fn nacked_byte(&self) -> Option<usize> {
        self.settle();
        self.nacked.get()
    }

    fn reset_receiver(&mut self) {
        self.rx_index = 0;
        self.rx_decided.set(0);
        self.nacked.set(None);
    }

    /// The ACK bit of the next undecided byte follows ACKEN. Nothing is clocked after a NACK.
    fn decide_next(&self, acked: bool) {
        if self.nacked.get().is_some() {
            return;
        }
        let index = self.rx_decided.get();
        self.rx_decided.set(index + 1);
        if !acked {
            self.nacked.set(Some(index));
        }
    }

    /// Two bytes are in flight once the receiver phase starts. With POAP set, ACKEN applies to
    /// the second of them and the first is always acknowledged.
    fn settle(&self) {
        if self.phase != Phase::Receiving || self.rx_decided.get() > 0 {
            return;
        }
        if self.ack_position_next {
            self.decide_next(true);
        } else {
            self.decide_next(self.ack);
        }
        self.decide_next(self.ack);
    }

    fn next_pointer(&self, pointer: u8) -> u8 {
        let mask = self.page_size - 1;
        (pointer & !mask) | (pointer.wrapping_add(1) & mask)
    }

    fn commit(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        for (address, value) in self.pending.drain(..) {
            self.memory[usize::from(address)] = value;
        }
        self.write_cycle = self.write_cycle_length;
    }
}

impl I2cPeripheral for FakeEeprom {
    fn flag(&self, flag: Flag) -> bool {
        if self.stuck == Some(flag) {
            return false;
        }
        if matches!(flag, Flag::Rbne | Flag::Btc) {
            self.settle();
        }
        match flag {
            Flag::Sbsend => self.sbsend,
            Flag::Addsend => self.addsend,
            Flag::Tbe => self.phase == Phase::Transmitting,
            Flag::Btc => matches!(self.phase, Phase::Transmitting | Phase::Receiving),
            Flag::Rbne => self.phase == Phase::Receiving,
            Flag::I2cbsy => self.busy || self.bus_held,
            Flag::Stpdet => false,
            error => self.errors.contains(&error),
        }
    }

    fn clear_flag(&mut self, flag: Flag) {
        self.errors.retain(|f| *f != flag);
    }

    fn clear_addsend(&mut self) {
        self.log.push(Op::ClearAddsend);
        if !self.addsend {
            return;
        }
        self.addsend = false;
        self.phase = match self.phase {
            Phase::Addressed(Direction::Transmitter) => {
                self.word_address_seen = false;
                Phase::Transmitting
            }
            Phase::Addressed(Direction::Receiver) => {
                self.reset_receiver();
                Phase::Receiving
            }
            other => other,
        };
    }

    fn send_start(&mut self) {
        self.log.push(Op::Start);
        self.pending.clear();
        self.reset_receiver();
        self.sbsend = true;
        self.busy = true;
        self.phase = Phase::Started;
    }

    fn send_stop(&mut self) {
        self.log.push(Op::Stop);
        self.settle();
        self.commit();
        self.sbsend = false;
        self.addsend = false;
        self.busy = false;
        self.stop_polls.set(1);
        // Bytes already shifted in stay readable after the STOP request.
        if self.phase != Phase::Receiving {
            self.phase = Phase::Idle;
        }
    }

    fn stop_pending(&self) -> bool {
        let polls = self.stop_polls.get();
        if polls > 0 {
            self.stop_polls.set(polls - 1);
            true
        } else {
            false
        }
    }

    fn send_address(&mut self, address: u8, direction: Direction) {
        self.log.push(Op::Address(address, direction));
        self.sbsend = false;
        if address == self.slave && self.write_cycle == 0 {
            self.addsend = true;
            self.phase = Phase::Addressed(direction);
        } else {
            self.write_cycle = self.write_cycle.saturating_sub(1);
            self.raise(Flag::Aerr);
        }
    }

    fn write_data(&mut self, byte: u8) {
        self.log.push(Op::Write(byte));
        if self.phase != Phase::Transmitting {
            return;
        }
        if !self.word_address_seen {
            self.pointer = byte;
            self.word_address_seen = true;
        } else {
            self.pending.push((self.pointer, byte));
            self.pointer = self.next_pointer(self.pointer);
        }
    }

    fn read_data(&mut self) -> u8 {
        self.settle();
        let index = self.rx_index;
        self.rx_index += 1;
        // The slave releases SDA once a byte is NACKed.
        let byte = match self.nacked.get() {
            Some(nacked) if index > nacked => 0xFF,
            _ => {
                let byte = self.memory[usize::from(self.pointer)];
                self.pointer = self.pointer.wrapping_add(1);
                byte
            }
        };
        if self.phase == Phase::Receiving {
            self.decide_next(self.ack);
        }
        self.log.push(Op::Read(byte));
        byte
    }

    fn set_ack(&mut self, enable: bool) {
        self.log.push(Op::Ack(enable));
        self.ack = enable;
    }

    fn set_ack_position_next(&mut self, next: bool) {
        self.log.push(Op::AckPositionNext(next));
        self.ack_position_next = next;
    }

    fn listen(&mut self, interrupt: Interrupt) {
        if !self.listening.contains(&interrupt) {
            self.listening.push(interrupt);
        }
    }

    fn unlisten(&mut self, interrupt: Interrupt) {
        self.listening.retain(|i| *i != interrupt);
    }

    fn software_reset(&mut self) {
        self.log.push(Op::Reset);
        self.errors.clear();
        self.sbsend = false;
        self.addsend = false;
        self.busy = false;
        self.ack_position_next = false;
        self.phase = Phase::Idle;
        self.reset_receiver();
    }
}

/// Advances by one on every reading.
pub struct StepTicks(pub u32);

impl Ticks for StepTicks {
    fn now(&mut self) -> u32 {
        self.0 = self.0.wrapping_add(1);
        self.0
    }
}
