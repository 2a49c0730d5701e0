// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Single-writer session over a pair of SWD pins.
//!
//! Only one [`Session`] may be open at a time, process-wide - enforced by
//! a single [`AtomicBool`], the Rust equivalent of the original's
//! module-scope open/release hooks. A second `open()` while one is held
//! fails fast with [`SwdError::Busy`] rather than blocking, since there is
//! no way to share the underlying pins safely.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use swd_core::target::TargetDescriptor;

use crate::SwdError;
use crate::debug::DebugInterface;
use crate::pin::Pin;

static BUSY: AtomicBool = AtomicBool::new(false);

/// An open handle over a target's SWD lines.
///
/// Dropping a `Session` always releases the busy flag, even if `release()`
/// was never called explicitly - this is the RAII backstop for the
/// original's `release()` lifecycle hook.
pub struct Session<D, C>
where
    D: Pin,
    C: Pin,
{
    debug: DebugInterface<D, C>,
    seek: u32,
}

impl<D, C> Session<D, C>
where
    D: Pin,
    C: Pin,
{
    /// Opens a session: acquires the process-wide busy flag, brings up and
    /// halts the target, and sets the seek position to the start of flash.
    ///
    /// Fails with [`SwdError::Busy`] if another session is already open.
    /// On any other failure the busy flag is released before returning.
    pub fn open(swdio: D, swclk: C, target: TargetDescriptor) -> Result<Self, SwdError> {
        if BUSY
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SwdError::Busy);
        }

        let mut debug = DebugInterface::from_pins(swdio, swclk, target);
        if let Err(e) = debug.init().and_then(|_| debug.halt()) {
            BUSY.store(false, Ordering::Release);
            return Err(e);
        }

        Ok(Self {
            debug,
            seek: target.flash.base,
        })
    }

    /// Returns a reference to the underlying [`DebugInterface`].
    pub fn debug(&self) -> &DebugInterface<D, C> {
        &self.debug
    }

    /// Returns a mutable reference to the underlying [`DebugInterface`].
    pub fn debug_mut(&mut self) -> &mut DebugInterface<D, C> {
        &mut self.debug
    }

    /// Returns the current seek position (used by the read-back side only;
    /// writes always take an explicit address).
    pub fn seek(&self) -> u32 {
        self.seek
    }

    /// Sets the seek position. `whence` follows `SEEK_SET`/`SEEK_CUR`
    /// semantics: `relative = false` sets an absolute position,
    /// `relative = true` adds `offset` to the current position.
    pub fn set_seek(&mut self, offset: i64, relative: bool) -> Result<(), SwdError> {
        let base = if relative { self.seek as i64 } else { 0 };
        let new_pos = base + offset;
        if new_pos < 0 || new_pos > u32::MAX as i64 {
            return Err(SwdError::Invalid);
        }
        self.seek = new_pos as u32;
        Ok(())
    }

    /// Reads `buf.len()` bytes from the current seek position, advancing
    /// it. Chopped to 1 KiB banks internally by the memory transport.
    pub fn read(&mut self, buf: &mut [u32]) -> Result<(), (SwdError, usize)> {
        self.debug
            .swd_if_mut()
            .read_mem_bulk(self.seek, buf, false)?;
        self.seek += (buf.len() * 4) as u32;
        Ok(())
    }

    /// Closes the session: runs a line reset and releases the busy flag.
    /// Equivalent to dropping the session, but lets the caller observe the
    /// line-reset result.
    pub fn release(mut self) -> Result<(), SwdError> {
        self.debug.swd_if_mut().reset_sequence().map(|_| ())
    }
}

impl<D, C> Drop for Session<D, C>
where
    D: Pin,
    C: Pin,
{
    fn drop(&mut self) {
        BUSY.store(false, Ordering::Release);
    }
}

impl<D, C> fmt::Debug for Session<D, C>
where
    D: Pin,
    C: Pin,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("target", self.debug.target())
            .field("seek", &self.seek)
            .finish()
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
    fn second_open_fails_busy_while_first_held() {
        BUSY.store(true, Ordering::SeqCst);

        let target = TargetDescriptor::stm32f103();
        let result = Session::open(NullPin, NullPin, target);
        assert_eq!(result.err(), Some(SwdError::Busy));

        BUSY.store(false, Ordering::SeqCst);
    }
}
