// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! High-level debug interface: target bring-up, halt/unhalt/reset, memory
//! access and flash programming.
//!
//! This is the interface most applications should use. It wraps
//! [`SwdInterface`] and adds the Cortex-M core-control and flash-program
//! state machines on top, so callers don't need to know DP/AP register
//! addresses or flash controller magic constants.
//!
//! Create with [`DebugInterface::from_pins`] and call [`DebugInterface::init`]
//! before anything else. To drop to lower-level SWD access, use
//! [`DebugInterface::swd_if`]/[`DebugInterface::swd_if_mut`].

use log::{debug, warn};

use swd_core::Mcu;
use swd_core::arm::cortexm::{Aircr, Demcr, Dhcsr};
use swd_core::arm::dp::IdCode;
use swd_core::target::TargetDescriptor;

use crate::SwdError;
use crate::flash;
use crate::interface::SwdInterface;
use crate::orchestrator;
use crate::pin::Pin;

/// High-level debug interface for a Cortex-M target over SWD.
pub struct DebugInterface<D, C>
where
    D: Pin,
    C: Pin,
{
    swd: SwdInterface<D, C>,
}

impl<D, C> DebugInterface<D, C>
where
    D: Pin,
    C: Pin,
{
    /// Wraps an existing [`SwdInterface`].
    pub fn new(swd: SwdInterface<D, C>) -> Self {
        Self { swd }
    }

    /// Creates a new debug interface from the given pins and target
    /// descriptor.
    pub fn from_pins(swdio: D, swclk: C, target: TargetDescriptor) -> Self {
        Self {
            swd: SwdInterface::from_pins(swdio, swclk, target),
        }
    }

    /// Returns a reference to the underlying [`SwdInterface`], for callers
    /// that need lower-level control.
    pub fn swd_if(&self) -> &SwdInterface<D, C> {
        &self.swd
    }

    /// Returns a mutable reference to the underlying [`SwdInterface`].
    pub fn swd_if_mut(&mut self) -> &mut SwdInterface<D, C> {
        &mut self.swd
    }

    /// Returns the target descriptor this interface was created with.
    pub fn target(&self) -> &TargetDescriptor {
        self.swd.target()
    }

    /// Performs a line reset, wakes the DAP, powers up the debug domain
    /// and configures the MEM-AP. Must be called before any other method.
    pub fn init(&mut self) -> Result<(), SwdError> {
        self.swd.reset_target()
    }

    /// Returns the target's IDCODE, if [`Self::init`] has succeeded.
    pub fn idcode(&self) -> Option<IdCode> {
        self.swd.idcode()
    }

    /// Returns the identified MCU, if [`Self::init`] has succeeded and the
    /// MCU was recognized.
    pub fn mcu(&self) -> Option<Mcu> {
        self.swd.mcu()
    }

    /// Checks the MEM-AP's IDR against the value expected for the
    /// identified MCU, if known. Logs a warning rather than failing on
    /// mismatch, since some debug probes and silicon revisions report IDR
    /// values slightly off from the reference manual's.
    pub fn check_mem_ap(&self) -> Result<(), SwdError> {
        let idr = self.swd.idr().ok_or(SwdError::NotReady)?;

        if let Some(mcu) = self.swd.mcu()
            && let Some(expected) = mcu.expected_idr()
            && idr != expected
        {
            warn!("MEM-AP IDR {idr} does not match expected {expected} for {mcu}");
        }

        Ok(())
    }

    /// Reads IDCODE as a liveness check - doesn't require the target to
    /// already be halted or otherwise in any particular state.
    pub fn liveness(&mut self) -> Result<IdCode, SwdError> {
        self.swd.read_idcode()
    }

    /// Halts the core: configures the MEM-AP for 32-bit auto-incrementing
    /// transfers, then writes the debug-halt, vector-catch and
    /// local-reset sequence into DHCSR/DEMCR/AIRCR.
    pub fn halt(&mut self) -> Result<(), SwdError> {
        self.swd.check_connected()?;
        self.swd.set_addr_inc(true)?;

        self.swd.write_mem(Dhcsr::ADDRESS, Dhcsr::HALT)?;
        self.swd.write_mem(Demcr::ADDRESS, Demcr::VECTOR_CATCH)?;
        self.swd.write_mem(Aircr::ADDRESS, Aircr::RESET_ASSERT)?;

        debug!("Core halted");
        Ok(())
    }

    /// Releases the core from halt and requests a system reset
    /// (`SYSRESETREQ`).
    pub fn unhalt(&mut self) -> Result<(), SwdError> {
        self.swd.check_connected()?;

        self.swd.write_mem(Dhcsr::ADDRESS, Dhcsr::UNHALT)?;
        self.swd.write_mem(Aircr::ADDRESS, Aircr::RESET_RELEASE)?;

        debug!("Core unhalted");
        Ok(())
    }

    /// Requests a system reset (`SYSRESETREQ`) without touching the
    /// core's halt state. Use to reset a running target without stopping
    /// it under debug first.
    pub fn reset(&mut self) -> Result<(), SwdError> {
        self.swd.check_connected()?;
        self.swd.write_mem(Aircr::ADDRESS, Aircr::RESET_RELEASE)?;
        Ok(())
    }

    /// Reads DHCSR and returns whether the core is currently halted.
    pub fn is_halted(&mut self) -> Result<bool, SwdError> {
        self.swd.check_connected()?;
        let raw = self.swd.read_mem(Dhcsr::ADDRESS)?;
        Ok(Dhcsr::from(raw).is_halted())
    }

    /// Reads a single 32-bit word from target memory.
    pub fn read_mem(&mut self, addr: u32) -> Result<u32, SwdError> {
        self.swd.check_connected()?;
        self.swd.read_mem(addr)
    }

    /// Writes a single 32-bit word to target memory.
    pub fn write_mem(&mut self, addr: u32, data: u32) -> Result<(), SwdError> {
        self.swd.check_connected()?;
        self.swd.write_mem(addr, data)
    }

    /// Reads a block of 32-bit words from target memory, auto-incrementing
    /// TAR and splitting at the 1 KiB MEM-AP wrap boundary.
    pub fn read_mem_bulk(&mut self, addr: u32, buf: &mut [u32]) -> Result<(), (SwdError, usize)> {
        self.swd.check_connected().map_err(|e| (e, 0))?;
        self.swd.set_addr_inc(true).map_err(|e| (e, 0))?;

        let result = self.swd.read_mem_bulk(addr, buf, false);

        let _ = self.swd.set_addr_inc(false);
        result
    }

    /// Writes a block of 32-bit words to target memory, auto-incrementing
    /// TAR and splitting at the 1 KiB MEM-AP wrap boundary.
    pub fn write_mem_bulk(&mut self, addr: u32, buf: &[u32]) -> Result<(), (SwdError, usize)> {
        self.swd.check_connected().map_err(|e| (e, 0))?;
        self.swd.set_addr_inc(true).map_err(|e| (e, 0))?;

        let result = self.swd.write_mem_bulk(addr, buf, false);

        let _ = self.swd.set_addr_inc(false);
        result
    }

    /// Unlocks the flash controller. A no-op if already unlocked.
    pub fn unlock_flash(&mut self) -> Result<(), SwdError> {
        self.swd.check_connected()?;
        flash::unlock(&mut self.swd)
    }

    /// Locks the flash controller.
    pub fn lock_flash(&mut self) -> Result<(), SwdError> {
        self.swd.check_connected()?;
        flash::lock(&mut self.swd)
    }

    /// Erases the whole flash array.
    pub fn erase_all(&mut self) -> Result<(), SwdError> {
        self.swd.check_connected()?;
        flash::erase_all(&mut self.swd)
    }

    /// Erases every page/sector overlapping `[offset, offset+len)`,
    /// relative to the start of flash.
    pub fn erase_range(&mut self, offset: u32, len: u32) -> Result<(), SwdError> {
        self.swd.check_connected()?;
        flash::erase_range(&mut self.swd, offset, len)
    }

    /// Writes `data` to flash at byte `offset` from the start of flash.
    ///
    /// Pages/sectors only partially covered by `data` are staged via a
    /// read-modify-write buffer so bytes outside `[offset, offset+len)`
    /// survive the erase. Retries a page up to 10 times on verify failure
    /// before giving up.
    pub fn write_flash(&mut self, offset: u32, data: &[u8]) -> Result<(), SwdError> {
        self.swd.check_connected()?;
        orchestrator::write(&mut self.swd, offset, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pin::Level;

    struct NullPin;

    impl Pin for NullPin {
        fn set(&mut self, _level: Level) {}
        fn get(&self) -> Level {
            Level::Low
        }
        fn set_input(&mut self) {}
        fn set_output(&mut self) {}
        fn delay(&self, _cycles: u32) {}
    }

    #[test]
    fn operations_require_init_first() {
        let target = TargetDescriptor::stm32f103();
        let mut debug = DebugInterface::from_pins(NullPin, NullPin, target);
        assert_eq!(debug.halt().err(), Some(SwdError::NotReady));
        assert_eq!(debug.read_mem(0x2000_0000).err(), Some(SwdError::NotReady));
    }
}
