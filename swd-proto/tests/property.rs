// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Property and scenario tests for the SWD Transactor and Fault Handler,
//! run against the simulated target in `tests/common`.

mod common;

use proptest::prelude::*;

use swd_core::arm::dp::{CtrlStat, CtrlStatRegister, Select};
use swd_core::arm::map::{Csw, CswRegister, Tar, TarRegister};
use swd_core::target::TargetDescriptor;
use swd_proto::SwdError;
use swd_proto::interface::SwdInterface;

use common::{
    ACK_FAULT, ACK_OK, ACK_WAIT, DAPABORT, MockSwclk, MockSwdio, MockTarget, READOK, STICKYERR,
    STKERRCLR, WDATAERR, WDERRCLR,
};

fn new_interface(target: &MockTarget) -> SwdInterface<MockSwdio, MockSwclk> {
    let (swdio, swclk) = target.pins();
    SwdInterface::from_pins(swdio, swclk, TargetDescriptor::stm32f103())
}

/// Powers up the debug domain using the target's default CTRL/STAT
/// scripting (no explicit ACKs or values required).
fn powered_up(target: &MockTarget) -> SwdInterface<MockSwdio, MockSwclk> {
    let mut swd = new_interface(target);
    swd.power_up_debug_domain().expect("power up");
    target.clear_events();
    swd
}

// P1: header parity is APnDP ^ RnW ^ A2 ^ A3, for both DP and AP writes.
proptest! {
    #[test]
    fn header_parity_holds_for_dp_and_ap_writes(raw in any::<u32>()) {
        let target = MockTarget::new();
        let mut swd = powered_up(&target);

        swd.write_dp_register(CtrlStatRegister, CtrlStat::from(raw), true).ok();
        swd.write_ap_register(TarRegister, Tar::from(raw), true).ok();

        for event in target.events() {
            prop_assert!(event.parity_ok, "header parity mismatch: {event:?}");
        }
    }
}

// P2: 32-bit payload parity is the XOR of the data bits, for values
// actually driven onto the wire by a write.
proptest! {
    #[test]
    fn payload_parity_holds_for_written_data(value in any::<u32>()) {
        let target = MockTarget::new();
        let mut swd = powered_up(&target);

        swd.write_dp_register(CtrlStatRegister, CtrlStat::from(value), true).unwrap();

        let writes: Vec<_> = target
            .events()
            .into_iter()
            .filter(|e| e.is_write && e.data == Some(value))
            .collect();
        prop_assert_eq!(writes.len(), 1);
        prop_assert!(writes[0].parity_ok);
    }
}

// P3: an always-WAIT target causes exactly N+1 header emissions (N retries
// plus the initial attempt), then the transaction fails with WaitAck.
proptest! {
    #[test]
    fn wait_exhaustion_retries_exactly_n_plus_one_times(retries in 0u32..12) {
        let target = MockTarget::new();
        target.set_default_ack(ACK_WAIT);
        let mut swd = new_interface(&target);
        swd.set_wait_retries(retries);

        let result = swd.write_dp_register(CtrlStatRegister, CtrlStat::from(0), false);

        prop_assert_eq!(result, Err(SwdError::WaitAck));
        let waits = target.count(|e| e.ack == ACK_WAIT);
        // N+1 from the retry loop, plus the DAPABORT attempt this WaitAck
        // error now triggers.
        prop_assert_eq!(waits, (retries + 2) as usize);
    }
}

// Exhausting the WAIT retry budget writes DP ABORT with only DAPABORT set.
#[test]
fn wait_exhaustion_sends_dapabort_only() {
    let target = MockTarget::new();
    target.queue_acks([ACK_WAIT, ACK_WAIT, ACK_WAIT, ACK_OK]);
    let mut swd = new_interface(&target);
    swd.set_wait_retries(2);

    let result = swd.write_dp_register(CtrlStatRegister, CtrlStat::from(0), false);

    assert_eq!(result, Err(SwdError::WaitAck));
    assert_eq!(target.abort_writes(), vec![DAPABORT]);
}

// P4: a FAULT ack with STICKYERR set causes exactly one ABORT write, with
// only STKERRCLR set.
#[test]
fn fault_with_stickyerr_clears_only_stkerrclr() {
    let target = MockTarget::new();
    target.queue_acks([ACK_FAULT, ACK_OK, ACK_OK, ACK_OK]);
    target.queue_dp_read(0x04, STICKYERR);
    target.queue_dp_read(0x04, READOK);
    let mut swd = new_interface(&target);

    let result = swd.write_dp_register(CtrlStatRegister, CtrlStat::from(0), true);

    assert_eq!(result, Err(SwdError::FaultAck));
    assert_eq!(target.abort_writes(), vec![STKERRCLR]);
}

// P5: a FAULT ack with WDATAERR set causes one ABORT write with WDERRCLR,
// then a JTAG-to-SWD resync, then exactly one IDCODE read.
#[test]
fn fault_with_wdataerr_resyncs_and_rereads_idcode() {
    let target = MockTarget::new();
    target.queue_acks([ACK_FAULT, ACK_OK, ACK_OK, ACK_OK, ACK_OK]);
    target.queue_dp_read(0x04, WDATAERR);
    target.queue_dp_read(0x00, 0x2BA0_1477);
    target.queue_dp_read(0x04, READOK);
    let mut swd = new_interface(&target);

    let result = swd.write_dp_register(CtrlStatRegister, CtrlStat::from(0), true);

    assert_eq!(result, Err(SwdError::FaultAck));
    assert_eq!(target.abort_writes(), vec![WDERRCLR]);
    let idcode_reads = target.count(|e| !e.is_ap && !e.is_write && e.addr2 == 0x00 && e.ack == ACK_OK);
    assert_eq!(idcode_reads, 1);
}

fn displace_ap_bank(swd: &mut SwdInterface<MockSwdio, MockSwclk>) {
    let mut select = Select::default();
    select.set_apbanksel(0xF);
    swd.update_dp_select(select).expect("displace AP bank");
}

// P6: reading N words issues one SELECT, one TAR write, N DRW reads and one
// RDBUFF read, and the payload matches target memory.
proptest! {
    #[test]
    fn read_mem_bulk_has_expected_wire_shape(n in 1usize..32, seed in any::<u32>()) {
        let target = MockTarget::new();
        let mut swd = powered_up(&target);
        displace_ap_bank(&mut swd);
        target.clear_events();

        let base = TargetDescriptor::stm32f103().sram.base;
        let expected: Vec<u32> = (0..n as u32).map(|i| seed ^ i.wrapping_mul(0x1000_0001)).collect();
        for (i, v) in expected.iter().enumerate() {
            target.write_memory(base + (i as u32 * 4), *v);
        }

        let mut buf = vec![0u32; n];
        swd.read_mem_bulk(base, &mut buf, false).expect("read_mem_bulk");

        prop_assert_eq!(&buf, &expected);
        prop_assert_eq!(target.select_writes().len(), 1);
        prop_assert_eq!(target.count(|e| e.is_ap && e.is_write && e.addr2 == 0x04), 1);
        prop_assert_eq!(target.count(|e| e.is_ap && !e.is_write && e.addr2 == 0x0C), n);
        prop_assert_eq!(target.count(|e| !e.is_ap && !e.is_write && e.addr2 == 0x0C), 1);
    }
}

// P7: writing N words issues one SELECT, one TAR write, N DRW writes, and
// target memory matches the input.
proptest! {
    #[test]
    fn write_mem_bulk_has_expected_wire_shape(n in 1usize..32, seed in any::<u32>()) {
        let target = MockTarget::new();
        let mut swd = powered_up(&target);
        displace_ap_bank(&mut swd);
        target.clear_events();

        let base = TargetDescriptor::stm32f103().sram.base;
        let input: Vec<u32> = (0..n as u32).map(|i| seed ^ i.wrapping_mul(0x1000_0001)).collect();

        swd.write_mem_bulk(base, &input, false).expect("write_mem_bulk");

        for (i, v) in input.iter().enumerate() {
            prop_assert_eq!(target.read_memory(base + (i as u32 * 4)), *v);
        }
        prop_assert_eq!(target.select_writes().len(), 1);
        prop_assert_eq!(target.count(|e| e.is_ap && e.is_write && e.addr2 == 0x04), 1);
        prop_assert_eq!(target.count(|e| e.is_ap && e.is_write && e.addr2 == 0x0C), n);
    }
}

// P8: a 1KiB burst at a 1KiB-aligned address uses exactly one TAR setup.
#[test]
fn aligned_1kib_burst_uses_one_tar_setup() {
    let target = MockTarget::new();
    let mut swd = powered_up(&target);
    displace_ap_bank(&mut swd);
    target.clear_events();

    let base = TargetDescriptor::stm32f103().sram.base;
    assert_eq!(base & 0x3FF, 0, "fixture address must be 1KiB aligned");

    let mut buf = vec![0u32; 256];
    swd.read_mem_bulk(base, &mut buf, false).expect("read_mem_bulk");

    assert_eq!(target.count(|e| e.is_ap && e.is_write && e.addr2 == 0x04), 1);
}

// P9: programming then reading back a value round-trips through the bulk
// memory path used by flash programming.
#[test]
fn memory_round_trip_after_write() {
    let target = MockTarget::new();
    let mut swd = powered_up(&target);

    let base = TargetDescriptor::stm32f103().sram.base;
    let words = [0xDEAD_BEEFu32, 0x1234_5678, 0, u32::MAX];
    swd.write_mem_bulk(base, &words, false).expect("write");

    let mut readback = vec![0u32; words.len()];
    swd.read_mem_bulk(base, &mut readback, false).expect("read");

    assert_eq!(readback, words);
}

// Sanity check on the CSW access-port path (single register read/write),
// exercised through the same AP read pipeline as DRW/RDBUFF.
#[test]
fn single_ap_register_round_trip() {
    let target = MockTarget::new();
    let mut swd = powered_up(&target);

    let mut csw = Csw::default();
    csw.set_addrinc(Csw::ADDRINC_SINGLE);
    swd.write_ap_register(CswRegister, csw, true).unwrap();

    let readback: Csw = swd.read_ap_register(CswRegister, true).unwrap();
    assert_eq!(readback, csw);
}

// End-to-end: a single word write followed by a single word read matches,
// exercising `write_mem`/`read_mem` (TAR readback included).
#[test]
fn single_word_write_then_read() {
    let target = MockTarget::new();
    let mut swd = powered_up(&target);

    let addr = TargetDescriptor::stm32f103().sram.base;
    swd.write_mem(addr, 0xCAFE_F00D).unwrap();
    assert_eq!(swd.read_mem(addr).unwrap(), 0xCAFE_F00D);
}
