// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM SWD Interface
//!
//! This module implements the SWD interface for communicating with ARM
//! devices.  It provides `SwdInterface` for performing SWD operations, and
//! `SwdOp` for creating low-level SWD operations.

use std::fmt;
use std::thread;
use std::time::Duration;
#[allow(unused_imports)]
use log::{debug, trace, warn};

use swd_core::Mcu;
use swd_core::arm::Cortex;
use swd_core::arm::ap::{IDR_AHB_AP_KNOWN, Idr, IdrRegister};
use swd_core::arm::dp::{Abort, CtrlStat, IdCode, RdBuff, Select};
use swd_core::arm::dp::{
    AbortRegister, CtrlStatRegister, IdCodeRegister, RdBuffRegister, SelectRegister,
};
use swd_core::arm::map::{Csw, CswRegister, Drw, DrwRegister, Tar, TarRegister};
use swd_core::arm::register::{
    ApRegister, DpRegister, ReadableRegister, RegisterDescriptor, WritableRegister,
};
use swd_core::stm::{StmDetails, StmDeviceId, StmFlashSize, StmUniqueId};
use swd_core::target::TargetDescriptor;

use crate::SwdError;
use crate::pin::Pin;
use crate::protocol::{POST_SINGLE_OPERATION_CYCLES, Speed, SwdProtocol, calculate_parity};

// SWD wraps read/writes using auto-incrementing at a 1K boundary, although
// this is implementation dependent.
pub(crate) const SWD_MEMORY_BOUNDARY: u32 = 0x400;

/// SWD Interface object
///
/// This is used by [`DebugInterface`] to perform individual SWD operations
/// on the target.  It exposes a low-level interface to perform SWD
/// operations. Most applications will prefer to use [`DebugInterface`],
/// which provides a higher-level interface for common groups of SWD
/// operations.
///
/// Create using `SwdInterface::new()` passing in an [`SwdProtocol`]
/// instance and the [`TargetDescriptor`] for the attached target.
pub struct SwdInterface<D, C>
where
    D: Pin,
    C: Pin,
{
    protocol: SwdProtocol<D, C>,
    target: TargetDescriptor,
    idcode: Option<IdCode>,
    mcu: Option<Mcu>,
    idr: Option<Idr>,
    powered_up: bool,
    dp_select: Select,
    addr_inc: bool,
    wait_retries: u32,
    check_power: bool,
}

impl<D, C> SwdInterface<D, C>
where
    D: Pin,
    C: Pin,
{
    fn reset_internal_state(&mut self) {
        self.idcode = None;
        self.mcu = None;
        self.idr = None;
        self.powered_up = false;
        self.dp_select = Select::default();
        self.addr_inc = false;
        self.check_power = true;
    }

    /// Creates a new SWD interface using the given [`SwdProtocol`] instance
    /// and target descriptor.
    ///
    /// It may be preferable to use [`SwdInterface::from_pins`] rather than
    /// this function, to avoid having to create the [`SwdProtocol`] instance
    /// manually.
    pub fn new(protocol: SwdProtocol<D, C>, target: TargetDescriptor) -> Self {
        Self {
            protocol,
            wait_retries: target.wait_retries,
            target,
            idcode: None,
            mcu: None,
            idr: None,
            powered_up: false,
            dp_select: Select::default(),
            addr_inc: false,
            check_power: true,
        }
    }

    /// Creates a new SWD interface from the given pins and target
    /// descriptor.
    pub fn from_pins(swdio: D, swclk: C, target: TargetDescriptor) -> Self {
        let swd = SwdProtocol::new(swdio, swclk);
        Self::new(swd, target)
    }

    /// Sets the SWD speed for this interface.
    ///
    /// Can be changed at any time.  For example, if [`Self::reset_target()`]
    /// fails, retry with a slow speed.
    pub fn set_swd_speed(&mut self, speed: Speed) {
        trace!("Exec:  Set {speed:?}");
        self.protocol.set_speed(speed);
    }

    /// Gets the SWD speed for this interface.
    pub fn swd_speed(&self) -> Speed {
        self.protocol.speed()
    }

    /// Returns whether the SWD interface is currently connected to a target.
    pub fn is_connected(&self) -> bool {
        self.idcode.is_some()
    }

    /// Returns the target descriptor this interface was created with.
    pub fn target(&self) -> &TargetDescriptor {
        &self.target
    }

    /// Connects to the target given its IDCODE, read during
    /// [`Self::reset_sequence()`].
    ///
    /// This
    /// - clears any errors on the ABORT register
    /// - reads RDBUFF and discards the value
    /// - powers up the debug domain
    /// - configures the MEM-AP
    /// - attempts to retrieve the MCU details.
    ///
    /// Returns:
    /// - `Ok(Some(Mcu))`: if the target was successfully enabled, returning
    ///   the MCU details.
    /// - `Ok(None)`: if the target was successfully enabled, but no MCU
    ///   details were retrieved.
    /// - `Err(SwdError)`: if there was an error during the enabling process.
    pub fn enable_target(&mut self, idcode: IdCode) -> Result<Option<Mcu>, SwdError> {
        trace!("Exec:  Clear ABORT");
        self.clear_errors()?;

        trace!("Exec:  Read RDBUFF");
        let _ = self.read_rd_buff_fast(false)?;

        trace!("Exec:  Power up debug domain");
        self.power_up_debug_domain()?;

        trace!("Exec:  Configure MEM-AP");
        self.configure_mem_ap()?;

        let mcu = self.get_mcu(idcode).map(Some)?;
        debug!("Value: {mcu:?}");

        Ok(mcu)
    }

    /// Resets and connects to the target's SWD interface.
    ///
    /// This performs the standard SWD reset sequence and then performs the
    /// necessary steps to connect to the target's SWD interface.
    pub fn reset_target(&mut self) -> Result<(), SwdError> {
        trace!("Exec:  Reset and enable SWD");
        let idcode = self.reset_sequence()?;

        let mcu = self.enable_target(idcode)?;

        self.mcu = mcu;
        self.idcode = Some(idcode);

        Ok(())
    }

    /// Call to perform a SWD line reset, but **does not** fully connect to
    /// the target.  Use [`Self::reset_target()`] to perform the entire
    /// sequence.  Use this function when you want more control over the
    /// connection process.
    ///
    /// Must be called before any other operations on the target, and must
    /// also be called if any permanent failures occur while communicating
    /// with the target.
    ///
    /// Returns:
    /// - `Ok(IdCode)` if the reset sequence was successful and the IDCODE
    ///   was read from the target.
    /// - `Err(SwdError)` if there was an error performing the reset
    ///   sequence, or if the IDCODE could not be read from the target.
    pub fn reset_sequence(&mut self) -> Result<IdCode, SwdError> {
        trace!("Exec:  Reset SWD");
        self.reset_internal_state();

        // Start off with a known state and a brief pause
        self.protocol.reset_prep();

        // 50+ clocks with SWDIO high
        self.protocol.pre_line_reset();
        thread::sleep(Duration::from_micros(100));

        self.protocol.jtag_to_swd_sequence();
        thread::sleep(Duration::from_micros(100));

        self.protocol.line_reset_after();

        // Read IDCODE to confirm SWD is now running
        let idcode = self.read_idcode()?;
        trace!("Value: IDCODE: {idcode}");

        if idcode == IdCode::from(0) || idcode == IdCode::from(u32::MAX) {
            return Err(SwdError::NoDevice);
        }

        Ok(idcode)
    }

    /// Checks the target is initialized.
    ///
    /// Returns:
    /// - `Ok(())`: if the interface is initialized.
    /// - `Err(SwdError::NotReady)`: if the interface is not initialized.
    pub fn check_connected(&self) -> Result<(), SwdError> {
        if self.idcode.is_some() {
            Ok(())
        } else {
            debug!("Attempt to perform SWD action before initialization/reset");
            Err(SwdError::NotReady)
        }
    }

    /// Performs a SWD operation to read the IDCODE register.
    pub fn read_idcode(&mut self) -> Result<IdCode, SwdError> {
        // IDCODE register never needs DP SELECT update, so read it directly
        let op = SwdOp::DpRead(IdCodeRegister::ADDRESS);
        let idcode = self.do_read_op(op, true)?;

        Ok(idcode.into())
    }

    /// Performs a keepalive on the SWD interface by re-reading IDCODE.
    pub fn keepalive(&mut self) -> Result<(), SwdError> {
        self.read_idcode()
            .map(|_| ())
            .inspect_err(|_| self.reset_internal_state())
    }

    /// Write a Debug Port register.
    ///
    /// This function automatically handles setting the DP SELECT register
    /// if it is required.
    ///
    /// `handle_err` controls whether a FAULT or protocol error on this
    /// transaction triggers the Fault Handler (clearing sticky errors)
    /// before the error is returned to the caller.
    pub fn write_dp_register<R>(
        &mut self,
        _reg: R,
        value: R::Value,
        handle_err: bool,
    ) -> Result<(), SwdError>
    where
        R: WritableRegister + DpRegister,
        u32: From<R::Value>,
    {
        let op = SwdOp::DpWrite(R::ADDRESS);
        let raw_data = R::to_raw(value);

        self.write_operation(op, raw_data, true, handle_err)
    }

    /// Write an Access Port register.
    ///
    /// This function automatically handles setting the DP SELECT register
    /// if it is required.
    ///
    /// `handle_err` controls whether a FAULT or protocol error on this
    /// transaction triggers the Fault Handler (clearing sticky errors)
    /// before the error is returned to the caller.
    pub fn write_ap_register<R>(
        &mut self,
        _reg: R,
        value: R::Value,
        handle_err: bool,
    ) -> Result<(), SwdError>
    where
        R: WritableRegister + ApRegister,
        u32: From<R::Value>,
    {
        let op = SwdOp::ApWrite(R::ADDRESS);
        let raw_data = R::to_raw(value);

        self.write_operation(op, raw_data, true, handle_err)
    }

    /// Read a Debug Port register.
    ///
    /// This function automatically handles setting the DP SELECT register
    /// if it is required.
    ///
    /// `handle_err` controls whether a FAULT or protocol error on this
    /// transaction triggers the Fault Handler (clearing sticky errors)
    /// before the error is returned to the caller.
    pub fn read_dp_register<R>(&mut self, _reg: R, handle_err: bool) -> Result<R::Value, SwdError>
    where
        R: ReadableRegister + DpRegister,
        R::Value: From<u32>,
    {
        let op = SwdOp::DpRead(R::ADDRESS);
        let raw_data = self.read_operation(op, true, handle_err)?;

        Ok(R::from_raw(raw_data))
    }

    /// Read an Access Port register.
    ///
    /// This function automatically handles setting the DP SELECT register
    /// if it is required.  It also reads the AP read result from the DP
    /// RDBUFF register automatically.
    ///
    /// `handle_err` controls whether a FAULT or protocol error on this
    /// transaction triggers the Fault Handler (clearing sticky errors)
    /// before the error is returned to the caller.
    pub fn read_ap_register<R>(&mut self, _reg: R, handle_err: bool) -> Result<R::Value, SwdError>
    where
        R: ReadableRegister + ApRegister,
        R::Value: From<u32>,
    {
        let op = SwdOp::ApRead(R::ADDRESS);
        let raw_data = self.read_operation(op, true, handle_err)?;
        Ok(R::from_raw(raw_data))
    }

    /// Call to update the DP SELECT register.
    ///
    /// It is unnecessary to call this function directly when writing DP and
    /// AP registers using `write_dp_register` and `write_ap_register`, as
    /// those functions will automatically update the DP SELECT register if
    /// required.
    pub fn update_dp_select(&mut self, select: Select) -> Result<(), SwdError> {
        self.do_write_op(SwdOp::DpWrite(SelectRegister::ADDRESS), select.into(), true)?;

        self.check_dp_errors(false)?;

        self.dp_select = select;

        Ok(())
    }

    /// Call to read the DP CTRL/STAT register.
    pub fn read_ctrl_stat(&mut self) -> Result<CtrlStat, SwdError> {
        let op = SwdOp::DpRead(CtrlStatRegister::ADDRESS);
        let raw_data = self.do_read_op(op, true)?;

        Ok(CtrlStat::from(raw_data))
    }

    /// Call to check for errors in the Debug Port status.
    ///
    /// Arguments:
    /// - `check_read_ok`: If true, checks that the read OK bit is set, in
    ///   addition to the other error checks.
    pub fn check_dp_errors(&mut self, check_read_ok: bool) -> Result<(), SwdError> {
        let status: CtrlStat = self.read_ctrl_stat()?;
        if status.has_errors() {
            warn!("DP status errors detected: {}", status.error_states());
        } else if check_read_ok && !status.readok() {
            warn!("DP read OK bit not set");
        }

        if status.has_errors() || (check_read_ok && !status.readok()) {
            return Err(SwdError::DpError);
        }

        Ok(())
    }

    /// Call to clear any errors on the Debug Port.
    ///
    /// Only clears the ABORT bits that correspond to sticky errors actually
    /// set in CTRL/STAT, and resynchronizes via the JTAG-to-SWD sequence
    /// plus an IDCODE re-read if WDATAERR was set - mirroring how a stuck
    /// write data phase is recovered on the wire.
    pub fn clear_errors(&mut self) -> Result<(), SwdError> {
        trace!("Exec:  Clear errors");

        let status = self.read_ctrl_stat()?;

        if !status.has_errors() {
            trace!("OK:    No errors to clear");
            return Ok(());
        }

        let wdataerr = status.wdataerr();
        self.set_abort(
            false,
            status.stickyerr(),
            wdataerr,
            status.stickyorun(),
        )?;

        if wdataerr {
            // A stuck write data phase requires resynchronizing the line
            // before the target will respond again.
            self.protocol.jtag_to_swd_sequence();
            self.protocol.line_reset_after();
            let _ = self.read_idcode();
        }

        thread::sleep(Duration::from_millis(1));

        self.check_dp_errors(false)?;

        trace!("OK:    Clear errors");
        Ok(())
    }

    /// Reads the DRW register from the Access Port multiple times in
    /// succession.  Takes care of reading from DRW directly or RDBUFF as
    /// appropriate.
    ///
    /// It only normally makes sense to call this function if the CSW
    /// AddrInc bits are set to 0b01 (auto-increment single enabled).
    fn read_drw_bulk(&mut self, buf: &mut [u32], fast: bool) -> Result<(), (SwdError, usize)> {
        let count = buf.len();
        trace!("Exec:  Read DRW Bulk {count} {}", if fast { "fast" } else { "slow" });

        let drw_op = SwdOp::ApRead(DrwRegister::ADDRESS);
        self.check_and_update_dp_select(drw_op).map_err(|e| (e, 0))?;

        // Read the first (to be discarded) value from the DRW register
        let _ = self.read_drw_fast().map_err(|e| (e, 0))?;

        let mut read_count = 0;
        for item in buf.iter_mut().take(count - 1) {
            let data = self.read_drw_fast().map_err(|e| (e, read_count))?;

            if !fast {
                self.check_dp_errors(true).map_err(|e| (e, read_count))?;
            }

            *item = data.into();
            read_count += 1;
        }

        // Flush the final value via RDBUFF
        let data = self.read_rd_buff_fast(true).map_err(|e| (e, read_count))?;

        if !fast {
            self.check_dp_errors(true).map_err(|e| (e, read_count))?;
        }

        buf[read_count] = data.into();
        read_count += 1;

        if fast {
            self.check_dp_errors(true).map_err(|e| (e, read_count))?;
        }

        Ok(())
    }

    /// Writes to the DRW register from the Access Port multiple times in
    /// succession.
    fn write_drw_bulk(&mut self, buf: &[u32], fast: bool) -> Result<(), (SwdError, usize)> {
        let count = buf.len();
        trace!("Exec:  Write DRW Bulk {count} {}", if fast { "fast" } else { "slow" });

        if buf.is_empty() {
            return Ok(());
        }

        let drw_op = SwdOp::ApWrite(DrwRegister::ADDRESS);
        self.check_and_update_dp_select(drw_op).map_err(|e| (e, 0))?;

        let mut write_count = 0;
        for &value in buf {
            let last = write_count == (count - 1);

            self.write_drw_fast(value.into(), last)
                .map_err(|e| (e, write_count))?;

            self.check_dp_errors(false).map_err(|e| (e, write_count))?;

            write_count += 1;
        }

        if fast {
            self.check_dp_errors(false).map_err(|e| (e, write_count))?;
        }

        Ok(())
    }

    /// Sets the number of automatic retries after each SWD operation if a
    /// WAIT ack is received.  Defaults to the target descriptor's
    /// `wait_retries`.
    pub fn set_wait_retries(&mut self, retries: u32) {
        self.wait_retries = retries;
    }

    /// Sets the CSW AddrInc field to the given value.
    pub fn set_addr_inc(&mut self, addr_inc: bool) -> Result<(), SwdError> {
        let mut csw: Csw = self.read_ap_register(CswRegister, true)?;

        let cur_addr_inc = csw.addrinc();
        if (cur_addr_inc == Csw::ADDRINC_OFF && !addr_inc)
            || (cur_addr_inc == Csw::ADDRINC_SINGLE && addr_inc)
        {
            return Ok(());
        }

        let new_addr_inc = if addr_inc {
            Csw::ADDRINC_SINGLE
        } else {
            Csw::ADDRINC_OFF
        };
        csw.set_addrinc(new_addr_inc);

        self.write_ap_register(CswRegister, csw, true)?;

        let final_csw: Csw = self.read_ap_register(CswRegister, true)?;
        if final_csw != csw {
            warn!("CSW AddrInc write failed: expected {csw}, got {final_csw}");
            return Err(SwdError::OperationFailed(
                "csw addrinc write failed".to_string(),
            ));
        }

        Ok(())
    }

    /// Powers up the debug domain of the target device.
    pub fn power_up_debug_domain(&mut self) -> Result<(), SwdError> {
        self.update_dp_select(Select::default())?;

        let mut ctrl_stat = CtrlStat::default();
        ctrl_stat.set_cdbgpwrupreq(true);
        ctrl_stat.set_csyspwrupreq(true);
        self.write_dp_register(CtrlStatRegister, ctrl_stat, true)?;

        let status = self.read_dp_register(CtrlStatRegister, true)?;
        if !status.cdbgpwrupack() || !status.csyspwrupack() {
            return Err(SwdError::OperationFailed(
                "debug domain power up failed".to_string(),
            ));
        }

        debug!("OK:   Debug domain powered up {}", status.power_states());
        self.powered_up = true;

        Ok(())
    }

    /// Configures the MEM-AP for access.
    pub fn configure_mem_ap(&mut self) -> Result<(), SwdError> {
        if self.check_power && !self.powered_up {
            return Err(SwdError::NotReady);
        }

        let _ = self.read_ap_register(CswRegister, true)?;

        let mut new_csw = Csw::default();
        let addr_inc = if self.addr_inc {
            Csw::ADDRINC_SINGLE
        } else {
            Csw::ADDRINC_OFF
        };
        new_csw.set_addrinc(addr_inc);
        self.write_ap_register(CswRegister, new_csw, true)?;

        let csw_readback: Csw = self.read_ap_register(CswRegister, true)?;

        self.addr_inc = csw_readback.addrinc() != Csw::ADDRINC_OFF;

        trace!("Value: CSW readback {csw_readback}");
        let csw_readback_check = csw_readback.value() & 0xFFFFFF;
        let set_csw = new_csw.value() & 0xFFFFFF;
        if csw_readback_check != set_csw {
            warn!("CSW configuration mismatch after write: expected {new_csw}, got {csw_readback}");
        }

        let idr: Idr = self.read_ap_register(IdrRegister, true)?;
        self.idr = Some(idr);
        for check_idr in IDR_AHB_AP_KNOWN {
            if idr == check_idr {
                trace!("Value: MEM-AP IDR {idr} matches known IDR {check_idr}");
                return Ok(());
            }
        }

        warn!("Unknown MEM-AP IDR {idr}");

        Ok(())
    }

    /// Retrieves the IDCODE of the target device, if available.
    pub fn idcode(&self) -> Option<IdCode> {
        self.idcode
    }

    /// Retrieves the MCU information, if available.
    pub fn mcu(&self) -> Option<Mcu> {
        self.mcu
    }

    /// Retrieves the IDR of the MEM-AP, if available.
    pub fn idr(&self) -> Option<Idr> {
        self.idr
    }

    /// Retrieves whether the CSW AddrInc is set to auto-increment single.
    pub fn addr_inc(&self) -> bool {
        self.addr_inc
    }

    /// Reads a 32-bit value from the target's memory at the specified
    /// address.
    pub fn read_mem(&mut self, addr: u32) -> Result<u32, SwdError> {
        let tar = Tar::from(addr);
        self.write_ap_register(TarRegister, tar, true)?;

        let tar_readback: Tar = self.read_ap_register(TarRegister, true)?;
        if tar != tar_readback {
            warn!("TAR readback mismatch: expected {tar}, got {tar_readback}");
            return Err(SwdError::OperationFailed(format!(
                "unexpected tar {tar_readback}"
            )));
        }

        let data = self.read_ap_register(DrwRegister, true)?;

        Ok(data.into())
    }

    /// Writes a 32-bit value to the target's memory at the specified
    /// address.
    ///
    /// Note that to write to flash, the MCU usually requires magic values
    /// be written to its flash register(s) before it can be programmed. See
    /// [`DebugInterface::unlock_flash()`].
    pub fn write_mem(&mut self, addr: u32, data: u32) -> Result<(), SwdError> {
        let tar = Tar::from(addr);
        self.write_ap_register(TarRegister, tar, true)?;

        let tar_readback: Tar = self.read_ap_register(TarRegister, true)?;
        if tar != tar_readback {
            warn!("TAR readback mismatch: expected {tar}, got {tar_readback}");
            return Err(SwdError::OperationFailed(format!(
                "unexpected tar {tar_readback}"
            )));
        }

        let data = data.into();
        self.write_ap_register(DrwRegister, data, true)?;

        Ok(())
    }

    /// Reads a block of memory from the target device.
    ///
    /// Is aware of SWD memory wrapping and handles it (at the 1KB
    /// boundary).
    pub fn read_mem_bulk(
        &mut self,
        addr: u32,
        buf: &mut [u32],
        fast: bool,
    ) -> Result<(), (SwdError, usize)> {
        if addr & 0x3 != 0 {
            return Err((SwdError::Api, 0));
        }
        if buf.is_empty() {
            return Ok(());
        }

        let mut remaining = buf;
        let mut current_addr = addr;
        let mut total_read = 0;

        while !remaining.is_empty() {
            let boundary_offset = SWD_MEMORY_BOUNDARY - (current_addr & (SWD_MEMORY_BOUNDARY - 1));
            let max_words = (boundary_offset / 4) as usize;
            let chunk_size = remaining.len().min(max_words);

            let tar = Tar::from(current_addr);
            self.write_ap_register(TarRegister, tar, true)
                .map_err(|e| (e, total_read))?;

            let (chunk, rest) = remaining.split_at_mut(chunk_size);
            self.read_drw_bulk(chunk, fast)
                .map_err(|(e, partial)| (e, total_read + partial))?;

            remaining = rest;
            current_addr += (chunk_size * 4) as u32;
            total_read += chunk_size;
        }

        Ok(())
    }

    /// Writes a block of memory to the target device.
    ///
    /// Is aware of SWD memory wrapping and handles it (at the 1KB
    /// boundary).
    pub fn write_mem_bulk(
        &mut self,
        addr: u32,
        buf: &[u32],
        fast: bool,
    ) -> Result<(), (SwdError, usize)> {
        if addr & 0x3 != 0 {
            return Err((SwdError::Api, 0));
        }
        if buf.is_empty() {
            return Ok(());
        }

        let mut remaining = buf;
        let mut current_addr = addr;
        let mut total_written = 0;

        while !remaining.is_empty() {
            let boundary_offset = SWD_MEMORY_BOUNDARY - (current_addr & (SWD_MEMORY_BOUNDARY - 1));
            let max_words = (boundary_offset / 4) as usize;
            let chunk_size = remaining.len().min(max_words);

            let tar = Tar::from(current_addr);
            self.write_ap_register(TarRegister, tar, true)
                .map_err(|e| (e, total_written))?;

            let (chunk, rest) = remaining.split_at(chunk_size);
            self.write_drw_bulk(chunk, fast)
                .map_err(|(e, partial)| (e, total_written + partial))?;

            remaining = rest;
            current_addr += (chunk_size * 4) as u32;
            total_written += chunk_size;
        }

        Ok(())
    }
}

// Internal functions
impl<D, C> SwdInterface<D, C>
where
    D: Pin,
    C: Pin,
{
    fn do_write_op(&mut self, op: SwdOp, data: u32, single: bool) -> Result<(), SwdError> {
        let cmd = op.to_cmd();
        trace!("Exec:  {op} SWD: {cmd:#04X} {data:#010X}");

        self.protocol.set_swdio_output();

        let mut attempt = 0;
        let result = loop {
            self.protocol.write_cmd_turnaround(cmd);

            match self.protocol.read_ack() {
                Ok(()) => {
                    self.protocol.turnaround_write_u32_parity(data);

                    // Reference manuals call for 2 extra SWCLK cycles after
                    // a write, after the parity bit.
                    self.protocol.set_swdio_low();
                    self.protocol.clock(2);

                    if single {
                        self.protocol.clock(POST_SINGLE_OPERATION_CYCLES - 2);
                    }

                    break Ok(());
                }
                Err(SwdError::WaitAck) => trace!("Exec:  {op} Wait ACK"),
                Err(e) => break Err(e),
            }

            attempt += 1;
            if attempt > self.wait_retries {
                self.send_dapabort();
                break Err(SwdError::WaitAck);
            } else {
                trace!("Retry: {op} {}", attempt - 1);
            }
        };

        match &result {
            Ok(()) => trace!("OK:    {op}"),
            Err(e) => debug!("Error: {op} {data:#010X}: {e:?}"),
        }

        result
    }

    // Lowest level read operation which actually drives the SWD protocol.
    fn do_read_op(&mut self, op: SwdOp, single: bool) -> Result<u32, SwdError> {
        let cmd = op.to_cmd();
        trace!("Exec:  {op}  SWD: {cmd:#04X}");

        self.protocol.set_swdio_output();

        let mut attempt = 0;
        let result = loop {
            self.protocol.write_cmd_turnaround(cmd);

            match self.protocol.read_ack() {
                Ok(()) => {
                    let data = match self.protocol.read_u32_parity_turnaround() {
                        Ok(data) => data,
                        Err(e) => break Err(e),
                    };

                    if single {
                        self.protocol.clock(POST_SINGLE_OPERATION_CYCLES);
                    }

                    break Ok(data);
                }
                Err(SwdError::WaitAck) => trace!("Wait:  {op}"),
                Err(e) => break Err(e),
            }

            attempt += 1;
            if attempt > self.wait_retries {
                self.send_dapabort();
                break Err(SwdError::WaitAck);
            } else {
                trace!("Retry: {op} {}", attempt - 1);
            }
        };

        match &result {
            Ok(data) => trace!("OK:    {op}            {data:#010X}"),
            Err(e) => debug!("Error: {op}  {e:?}"),
        }

        result
    }

    // `handle_err`: if a FAULT or protocol error occurs on this
    // transaction, run the Fault Handler (clearing sticky errors) before
    // returning the error to the caller.
    fn write_operation(
        &mut self,
        op: SwdOp,
        data: u32,
        single: bool,
        handle_err: bool,
    ) -> Result<(), SwdError> {
        if self.check_power && op.requires_power_up() && !self.powered_up {
            return Err(SwdError::NotReady);
        }

        self.check_and_update_dp_select(op)?;

        let result = self
            .do_write_op(op, data, single)
            .and_then(|()| self.check_dp_errors(false));

        if result.is_err() && handle_err {
            let _ = self.clear_errors();
        }

        result
    }

    // Handles both DP and AP reads.  AP reads take 2 transactions, hence
    // the loop to handle the switch from AP read to DP read.
    //
    // `handle_err`: if a FAULT or protocol error occurs on this
    // transaction, run the Fault Handler (clearing sticky errors) before
    // returning the error to the caller.
    fn read_operation(&mut self, op: SwdOp, single: bool, handle_err: bool) -> Result<u32, SwdError> {
        if self.check_power && op.requires_power_up() && !self.powered_up {
            return Err(SwdError::NotReady);
        }

        self.check_and_update_dp_select(op)?;

        let result = match op {
            SwdOp::DpRead(_) => self.do_read_op(op, single),
            SwdOp::ApRead(_) => {
                // For AP reads, we need to read RDBUFF after the initial
                // read operation.
                self.do_read_op(op, false).and_then(|_| {
                    self.check_dp_errors(true)?;

                    // We ignore the data from the ApRead - it won't be
                    // from this operation, but may be from a previous
                    // read.  RDBUFF never requires a DP SELECT update.
                    self.do_read_op(SwdOp::DpRead(RdBuffRegister::ADDRESS), single)
                })
            }
            _ => unreachable!("Read operation should be either DpRead or ApRead"),
        };

        if result.is_err() && handle_err {
            let _ = self.clear_errors();
        }

        result
    }

    fn check_and_update_dp_select(&mut self, op: SwdOp) -> Result<(), SwdError> {
        let check = match op {
            SwdOp::DpWrite(addr) => !matches!(
                addr,
                AbortRegister::ADDRESS | SelectRegister::ADDRESS | RdBuffRegister::ADDRESS
            ),
            SwdOp::DpRead(addr) => !matches!(
                addr,
                IdCodeRegister::ADDRESS | SelectRegister::ADDRESS | RdBuffRegister::ADDRESS
            ),
            SwdOp::ApWrite(_) | SwdOp::ApRead(_) => true,
        };

        if !check {
            return Ok(());
        }

        if !op.check_dp_select(self.dp_select) {
            let (mut select, _) = op.dp_select();

            let select_new = match op {
                SwdOp::DpRead(addr) | SwdOp::DpWrite(addr) => {
                    select.set_dpbanksel_from_addr(addr);
                    select
                }
                SwdOp::ApRead(addr) | SwdOp::ApWrite(addr) => {
                    select.set_apbanksel_from_addr(addr);
                    select
                }
            };

            self.update_dp_select(select_new)?;
        }

        Ok(())
    }

    fn read_rd_buff_fast(&mut self, last: bool) -> Result<RdBuff, SwdError> {
        let op = SwdOp::DpRead(RdBuffRegister::ADDRESS);
        let rdbuff = self.do_read_op(op, !last)?;
        Ok(rdbuff.into())
    }

    // Assumes DP SELECT is set, and won't be a single operation
    fn read_drw_fast(&mut self) -> Result<Drw, SwdError> {
        let op = SwdOp::ApRead(DrwRegister::ADDRESS);
        let drw = self.do_read_op(op, false)?;
        Ok(drw.into())
    }

    // Assumes DP SELECT is set, and won't be a single operation
    fn write_drw_fast(&mut self, value: Drw, last: bool) -> Result<(), SwdError> {
        let op = SwdOp::ApWrite(DrwRegister::ADDRESS);
        let raw_data = value.into();
        self.do_write_op(op, raw_data, !last)?;
        Ok(())
    }

    fn set_abort(
        &mut self,
        stkcmpclr: bool,
        stkerrclr: bool,
        wderrclr: bool,
        orunerrclr: bool,
    ) -> Result<(), SwdError> {
        let mut abort = Abort::default();
        abort.set_stkcmpclr(stkcmpclr);
        abort.set_stkerrclr(stkerrclr);
        abort.set_wderrclr(wderrclr);
        abort.set_orunerrclr(orunerrclr);

        let op = SwdOp::DpWrite(AbortRegister::ADDRESS);
        self.do_write_op(op, abort.into(), true)?;

        Ok(())
    }

    // Writes ABORT with only DAPABORT set, cancelling a pending transfer
    // after a bare WAIT the retry loop in `do_write_op`/`do_read_op`
    // couldn't clear. Issued as a single best-effort attempt, not routed
    // through `do_write_op`, since the transactor's retry budget is
    // already exhausted by the time this runs.
    fn send_dapabort(&mut self) {
        let mut abort = Abort::default();
        abort.set_dapabort(true);

        let op = SwdOp::DpWrite(AbortRegister::ADDRESS);
        let cmd = op.to_cmd();

        trace!("Exec:  {op} DAPABORT");
        self.protocol.set_swdio_output();
        self.protocol.write_cmd_turnaround(cmd);
        if self.protocol.read_ack().is_ok() {
            self.protocol.turnaround_write_u32_parity(abort.into());
            self.protocol.set_swdio_low();
            self.protocol.clock(2);
            self.protocol.clock(POST_SINGLE_OPERATION_CYCLES - 2);
        }
    }

    /// Gets details about target MCU.  Currently only supports STM32
    /// devices.
    fn get_mcu(&mut self, idcode: IdCode) -> Result<Mcu, SwdError> {
        match idcode {
            Cortex::IDCODE_M3 | Cortex::IDCODE_M4 => {
                let addr = StmDeviceId::ADDRESS;
                let data = self.read_mem(addr)?;
                let device_id = StmDeviceId::new(data);

                let uid_addr = StmUniqueId::addr_from_family(device_id.family());
                let unique_id = if let Some(uid_addr) = uid_addr {
                    let mut uid = [0; 3];
                    for (ii, uid) in uid.iter_mut().enumerate() {
                        *uid = self.read_mem(uid_addr + (ii as u32 * 4))?;
                    }
                    Some(StmUniqueId::new(uid))
                } else {
                    None
                };

                let flash_size_addr = StmFlashSize::addr_from_family(device_id.family());
                let flash_size = if let Some(flash_size_addr) = flash_size_addr {
                    let flash_size_raw = self.read_mem(flash_size_addr)?;
                    let flash_size_raw = (flash_size_raw >> 16) as u16;
                    Some(StmFlashSize::new(flash_size_raw))
                } else {
                    None
                };

                let stm = StmDetails::new(device_id, idcode, unique_id, flash_size);

                Ok(Mcu::Stm32(stm))
            }
            _ => {
                debug!("Unknown MCU family: {idcode}");
                Ok(Mcu::Unknown(idcode))
            }
        }
    }
}

/// SWD Operations
///
/// Each operation contains the register address as a u8 (0x0, 0x4, etc).
///
/// SWD command format:
/// - Bit 0: Start (1)
/// - Bit 1: APnDP (0=DP, 1=AP)
/// - Bit 2: RnW (0=write, 1=read)
/// - Bit 3: A2 (address bit 2)
/// - Bit 4: A3 (address bit 3)
/// - Bit 5: Parity
/// - Bit 6: Stop (0)
/// - Bit 7: Park (1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwdOp {
    DpRead(u8),
    DpWrite(u8),
    ApRead(u8),
    ApWrite(u8),
}

impl SwdOp {
    #[allow(clippy::wrong_self_convention)]
    pub(crate) fn to_cmd(&self) -> u8 {
        let (base, addr) = match self {
            SwdOp::DpRead(a) => (0x85, a),
            SwdOp::DpWrite(a) => (0x81, a),
            SwdOp::ApRead(a) => (0x87, a),
            SwdOp::ApWrite(a) => (0x83, a),
        };

        let cmd = base | ((addr & 0x0C) << 1); // A[3:2] to bits 4:3
        Self::add_parity(cmd)
    }

    fn add_parity(cmd: u8) -> u8 {
        let parity_bits = cmd & 0x1E;
        let parity = calculate_parity(parity_bits) as u8;
        cmd | (parity << 5)
    }

    /// Returns the DP SELECT register value required for this operation,
    /// and the bit mask with the relevant bits.
    pub(crate) fn dp_select(&self) -> (Select, u32) {
        let mut select = Select::default();
        match self {
            SwdOp::DpRead(addr) | SwdOp::DpWrite(addr) => {
                select.set_dpbanksel_from_addr(*addr);
                (select, Select::DPBANKSEL_MASK)
            }
            SwdOp::ApRead(addr) | SwdOp::ApWrite(addr) => {
                select.set_apbanksel_from_addr(*addr);
                (select, Select::APBANKSEL_MASK)
            }
        }
    }

    /// Checks if the given SELECT register value has the correct bits
    /// already set.
    pub(crate) fn check_dp_select(&self, select: Select) -> bool {
        let (bank, mask) = match self {
            SwdOp::DpRead(addr) | SwdOp::DpWrite(addr) => {
                let bank = (((addr >> 4) & 0xF) << Select::DPBANKSEL_SHIFT) as u32;
                let mask = Select::DPBANKSEL_MASK << Select::DPBANKSEL_SHIFT;
                (bank, mask)
            }
            SwdOp::ApRead(addr) | SwdOp::ApWrite(addr) => {
                let bank = (((addr >> 4) & 0xF) << Select::APBANKSEL_SHIFT) as u32;
                let mask = Select::APBANKSEL_MASK << Select::APBANKSEL_SHIFT;
                (bank, mask)
            }
        };
        (select.value() & mask) == bank
    }

    /// Whether this operation requires the debug domain to be powered up.
    pub(crate) fn requires_power_up(&self) -> bool {
        match self {
            SwdOp::DpRead(_) | SwdOp::DpWrite(_) => false,
            SwdOp::ApRead(_) | SwdOp::ApWrite(_) => true,
        }
    }
}

impl fmt::Display for SwdOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwdOp::DpRead(a) => write!(f, "DP Read 0x{a:02X}"),
            SwdOp::DpWrite(a) => write!(f, "DP Write 0x{a:02X}"),
            SwdOp::ApRead(a) => write!(f, "AP Read 0x{a:02X}"),
            SwdOp::ApWrite(a) => write!(f, "AP Write 0x{a:02X}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dp_read_cmd_has_correct_bits() {
        let cmd = SwdOp::DpRead(0x4).to_cmd();
        assert_eq!(cmd & 0x01, 0x01); // start
        assert_eq!(cmd & 0x02, 0x00); // APnDP = DP
        assert_eq!(cmd & 0x04, 0x04); // RnW = read
    }

    #[test]
    fn ap_write_cmd_has_correct_bits() {
        let cmd = SwdOp::ApWrite(0xC).to_cmd();
        assert_eq!(cmd & 0x02, 0x02); // APnDP = AP
        assert_eq!(cmd & 0x04, 0x00); // RnW = write
    }

    #[test]
    fn requires_power_up_only_for_ap_ops() {
        assert!(!SwdOp::DpRead(0).requires_power_up());
        assert!(!SwdOp::DpWrite(0).requires_power_up());
        assert!(SwdOp::ApRead(0).requires_power_up());
        assert!(SwdOp::ApWrite(0).requires_power_up());
    }
}
