// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Simulated SWD target used by the property tests.
//!
//! [`MockTarget`] hands out a [`MockSwdio`]/[`MockSwclk`] pin pair that can
//! be passed straight into [`SwdInterface::from_pins`]. The pins share a
//! [`MockBus`], which watches the sequence of `set`/`get` calls the bit
//! engine makes against SWDIO and replays a scripted target: command
//! headers are decoded from the last 8 bits driven, an ACK is supplied
//! (scripted, or OK by default), and - for OK acks - 33 bits of data are
//! either captured (write) or served (read) in the same shape
//! [`SwdProtocol`](swd_proto::protocol::SwdProtocol) expects on the wire.
//!
//! `swd-proto` never stops driving bits between operations (line resets,
//! JTAG-to-SWD switches, retry headers), so the header decoder always
//! looks at a sliding window of the last 8 driven bits rather than trying
//! to track "where a header starts" - whatever 8 bits are in the window
//! when the first ACK bit is requested *is* the header.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use swd_proto::pin::{Level, Pin};

pub const ACK_OK: u8 = 1;
pub const ACK_WAIT: u8 = 2;
pub const ACK_FAULT: u8 = 4;

/// DP CTRL/STAT bit positions used to script Fault Handler scenarios.
pub const STICKYORUN: u32 = 1 << 1;
pub const STICKYERR: u32 = 1 << 5;
pub const READOK: u32 = 1 << 6;
pub const WDATAERR: u32 = 1 << 7;
pub const CDBGPWRUPACK: u32 = 1 << 29;
pub const CSYSPWRUPACK: u32 = 1 << 31;

/// ABORT register bit positions, mirrored from `swd_core::arm::dp::Abort`,
/// to check captured ABORT writes without depending on its private layout.
pub const DAPABORT: u32 = 1 << 0;
pub const STKERRCLR: u32 = 1 << 2;
pub const WDERRCLR: u32 = 1 << 3;

#[derive(Debug, Clone, Copy)]
struct Decoded {
    is_ap: bool,
    is_write: bool,
    addr2: u8,
    parity_ok: bool,
}

enum Phase {
    Idle,
    Ack { idx: u8, ack: u8, op: Decoded },
    ReadData { bits: VecDeque<bool>, op: Decoded, value: u32 },
    WriteData { bits: Vec<bool>, discarded: bool, op: Decoded },
}

/// A single completed wire transaction, as observed by the target.
#[derive(Debug, Clone)]
pub struct WireEvent {
    pub is_ap: bool,
    pub is_write: bool,
    pub addr2: u8,
    pub ack: u8,
    pub data: Option<u32>,
    pub parity_ok: bool,
}

struct MockBus {
    window: VecDeque<bool>,
    phase: Phase,

    ack_script: VecDeque<u8>,
    default_ack: u8,

    dp_read_values: HashMap<u8, VecDeque<u32>>,
    dp_read_default: HashMap<u8, u32>,

    // Single posted-read latch shared across AP register reads, mirroring
    // the MEM-AP's own single-deep read pipeline.
    ap_pending: u32,
    ap_addr_ptr: u32,
    memory: HashMap<u32, u32>,
    tar: u32,
    csw: u32,

    pub events: Vec<WireEvent>,
    pub abort_writes: Vec<u32>,
    pub select_writes: Vec<u32>,
}

fn ack_bit(ack: u8, idx: u8) -> bool {
    (ack >> idx) & 1 == 1
}

fn encode_33(value: u32) -> VecDeque<bool> {
    let mut bits = VecDeque::with_capacity(33);
    for i in 0..32 {
        bits.push_back((value >> i) & 1 == 1);
    }
    bits.push_back(value.count_ones() % 2 == 1);
    bits
}

impl MockBus {
    fn new() -> Self {
        let mut dp_read_default = HashMap::new();
        // Steady state once powered up: READOK plus both power-up acks set,
        // no sticky errors. Lets `power_up_debug_domain()` and the
        // CTRL/STAT sanity reads every write/read performs succeed without
        // any scripting, unless a test explicitly queues something else.
        dp_read_default.insert(0x04u8, READOK | CDBGPWRUPACK | CSYSPWRUPACK);

        Self {
            window: VecDeque::with_capacity(8),
            phase: Phase::Idle,
            ack_script: VecDeque::new(),
            default_ack: ACK_OK,
            dp_read_values: HashMap::new(),
            dp_read_default,
            ap_pending: 0,
            ap_addr_ptr: 0,
            memory: HashMap::new(),
            tar: 0,
            csw: 0,
            events: Vec::new(),
            abort_writes: Vec::new(),
            select_writes: Vec::new(),
        }
    }

    fn decode_header(&self) -> Decoded {
        let bits: Vec<bool> = self.window.iter().copied().collect();
        let b = |i: usize| bits.get(i).copied().unwrap_or(false);
        let apndp = b(1);
        let rnw = b(2);
        let a2 = b(3);
        let a3 = b(4);
        let parity = b(5);
        let computed = (apndp as u8 + rnw as u8 + a2 as u8 + a3 as u8) % 2 == 1;
        Decoded {
            is_ap: apndp,
            is_write: !rnw,
            addr2: ((a2 as u8) << 2) | ((a3 as u8) << 3),
            parity_ok: parity == computed,
        }
    }

    fn fetch_ap_next(&mut self, addr2: u8) -> u32 {
        match addr2 {
            0x0C => {
                let v = *self.memory.get(&self.ap_addr_ptr).unwrap_or(&0);
                self.ap_addr_ptr = self.ap_addr_ptr.wrapping_add(4);
                v
            }
            0x04 => self.tar,
            0x00 => self.csw,
            _ => 0,
        }
    }

    fn ap_read(&mut self, addr2: u8) -> u32 {
        let ret = self.ap_pending;
        self.ap_pending = self.fetch_ap_next(addr2);
        ret
    }

    fn rdbuff_read(&self) -> u32 {
        self.ap_pending
    }

    fn dp_read(&mut self, addr2: u8) -> u32 {
        if let Some(q) = self.dp_read_values.get_mut(&addr2) {
            if let Some(v) = q.pop_front() {
                return v;
            }
        }
        *self.dp_read_default.get(&addr2).unwrap_or(&0)
    }

    fn fetch_read_value(&mut self, op: Decoded) -> u32 {
        if op.is_ap {
            self.ap_read(op.addr2)
        } else if op.addr2 == 0x0C {
            self.rdbuff_read()
        } else {
            self.dp_read(op.addr2)
        }
    }

    fn finish_write(&mut self, op: Decoded, bits: Vec<bool>) {
        let mut value: u32 = 0;
        for (i, bit) in bits.iter().take(32).enumerate() {
            if *bit {
                value |= 1 << i;
            }
        }
        let parity_ok = bits[32] == (value.count_ones() % 2 == 1);

        match (op.is_ap, op.addr2) {
            (true, 0x04) => {
                self.tar = value;
                self.ap_addr_ptr = value;
            }
            (true, 0x00) => self.csw = value,
            (true, 0x0C) => {
                self.memory.insert(self.ap_addr_ptr, value);
                self.ap_addr_ptr = self.ap_addr_ptr.wrapping_add(4);
            }
            (false, 0x00) => self.abort_writes.push(value),
            (false, 0x08) => self.select_writes.push(value),
            _ => {}
        }

        self.events.push(WireEvent {
            is_ap: op.is_ap,
            is_write: true,
            addr2: op.addr2,
            ack: ACK_OK,
            data: Some(value),
            parity_ok,
        });
    }

    fn advance_ack(&mut self) -> bool {
        let (idx, ack, op) = match &self.phase {
            Phase::Ack { idx, ack, op } => (*idx, *ack, *op),
            _ => unreachable!("advance_ack called outside Ack phase"),
        };
        let bit = ack_bit(ack, idx);
        let next_idx = idx + 1;

        if next_idx == 3 {
            if ack != ACK_OK {
                self.events.push(WireEvent {
                    is_ap: op.is_ap,
                    is_write: op.is_write,
                    addr2: op.addr2,
                    ack,
                    data: None,
                    parity_ok: op.parity_ok,
                });
                self.phase = Phase::Idle;
            } else if op.is_write {
                self.phase = Phase::WriteData {
                    bits: Vec::with_capacity(33),
                    discarded: false,
                    op,
                };
            } else {
                let value = self.fetch_read_value(op);
                self.phase = Phase::ReadData {
                    bits: encode_33(value),
                    op,
                    value,
                };
            }
        } else {
            self.phase = Phase::Ack { idx: next_idx, ack, op };
        }

        bit
    }

    fn on_set(&mut self, bit: bool) {
        let mut finish = None;
        match &mut self.phase {
            Phase::WriteData { bits, discarded, op } => {
                if !*discarded {
                    *discarded = true;
                } else {
                    bits.push(bit);
                    if bits.len() == 33 {
                        finish = Some((*op, std::mem::take(bits)));
                    }
                }
            }
            _ => {
                self.window.push_back(bit);
                if self.window.len() > 8 {
                    self.window.pop_front();
                }
            }
        }

        if let Some((op, bits)) = finish {
            self.phase = Phase::Idle;
            self.finish_write(op, bits);
        }
    }

    fn on_get(&mut self) -> bool {
        match &mut self.phase {
            Phase::Idle => {
                let op = self.decode_header();
                let ack = self.ack_script.pop_front().unwrap_or(self.default_ack);
                self.phase = Phase::Ack { idx: 0, ack, op };
                self.advance_ack()
            }
            Phase::Ack { .. } => self.advance_ack(),
            Phase::ReadData { .. } => {
                let (bit, done) = match &mut self.phase {
                    Phase::ReadData { bits, .. } => {
                        let bit = bits.pop_front().unwrap_or(false);
                        (bit, bits.is_empty())
                    }
                    _ => unreachable!(),
                };
                if done {
                    if let Phase::ReadData { op, value, .. } =
                        std::mem::replace(&mut self.phase, Phase::Idle)
                    {
                        self.events.push(WireEvent {
                            is_ap: op.is_ap,
                            is_write: false,
                            addr2: op.addr2,
                            ack: ACK_OK,
                            data: Some(value),
                            parity_ok: op.parity_ok,
                        });
                    }
                }
                bit
            }
            Phase::WriteData { .. } => false,
        }
    }
}

/// SWDIO pin backed by a [`MockBus`]. Cheap to clone - all clones share the
/// same target state.
#[derive(Clone)]
pub struct MockSwdio {
    bus: Rc<RefCell<MockBus>>,
}

impl Pin for MockSwdio {
    fn set(&mut self, level: Level) {
        self.bus.borrow_mut().on_set(level.is_high());
    }

    fn get(&self) -> Level {
        Level::from(self.bus.borrow_mut().on_get())
    }

    fn set_input(&mut self) {}

    fn set_output(&mut self) {}

    fn delay(&self, _cycles: u32) {}
}

/// SWCLK pin. Edges aren't separately observed - the bus advances purely
/// from the deterministic sequence of SWDIO calls the bit engine makes.
#[derive(Default, Clone)]
pub struct MockSwclk;

impl Pin for MockSwclk {
    fn set(&mut self, _level: Level) {}

    fn get(&self) -> Level {
        Level::Low
    }

    fn set_input(&mut self) {}

    fn set_output(&mut self) {}

    fn delay(&self, _cycles: u32) {}
}

/// Handle to a simulated SWD target, used to script responses and inspect
/// the wire-level trace after exercising an [`SwdInterface`] built from its
/// pins.
pub struct MockTarget {
    bus: Rc<RefCell<MockBus>>,
}

impl MockTarget {
    pub fn new() -> Self {
        Self {
            bus: Rc::new(RefCell::new(MockBus::new())),
        }
    }

    /// Returns a fresh SWDIO/SWCLK pin pair wired to this target.
    pub fn pins(&self) -> (MockSwdio, MockSwclk) {
        (
            MockSwdio {
                bus: Rc::clone(&self.bus),
            },
            MockSwclk,
        )
    }

    /// Always respond to headers with `ack` until told otherwise.
    pub fn set_default_ack(&self, ack: u8) {
        self.bus.borrow_mut().default_ack = ack;
    }

    /// Queue one-shot ACKs, consumed oldest-first; once drained, falls back
    /// to the default ACK (OK unless [`Self::set_default_ack`] was called).
    pub fn queue_acks<I: IntoIterator<Item = u8>>(&self, acks: I) {
        self.bus.borrow_mut().ack_script.extend(acks);
    }

    /// Queue a one-shot value to be returned for the next DP read of
    /// `addr2` (e.g. `0x04` for CTRL/STAT, `0x00` for IDCODE).
    pub fn queue_dp_read(&self, addr2: u8, value: u32) {
        self.bus
            .borrow_mut()
            .dp_read_values
            .entry(addr2)
            .or_default()
            .push_back(value);
    }

    /// Sets the steady-state value returned for DP reads of `addr2` once
    /// any queued values are exhausted.
    pub fn set_dp_default(&self, addr2: u8, value: u32) {
        self.bus.borrow_mut().dp_read_default.insert(addr2, value);
    }

    pub fn write_memory(&self, addr: u32, value: u32) {
        self.bus.borrow_mut().memory.insert(addr, value);
    }

    pub fn read_memory(&self, addr: u32) -> u32 {
        *self.bus.borrow().memory.get(&addr).unwrap_or(&0)
    }

    pub fn events(&self) -> Vec<WireEvent> {
        self.bus.borrow().events.clone()
    }

    pub fn clear_events(&self) {
        let mut bus = self.bus.borrow_mut();
        bus.events.clear();
        bus.abort_writes.clear();
        bus.select_writes.clear();
    }

    pub fn abort_writes(&self) -> Vec<u32> {
        self.bus.borrow().abort_writes.clone()
    }

    pub fn select_writes(&self) -> Vec<u32> {
        self.bus.borrow().select_writes.clone()
    }

    /// Count of completed header/ACK transactions matching `pred`.
    pub fn count(&self, pred: impl Fn(&WireEvent) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }
}

impl Default for MockTarget {
    fn default() -> Self {
        Self::new()
    }
}
