// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Cortex-M system control block registers used to halt, unhalt and reset
//! a core over the debug access port.
//!
//! These are memory-mapped registers, read and written via MEM-AP DRW
//! transfers rather than DP/AP register selects, so they don't implement
//! [`crate::arm::register::DpRegister`]/[`crate::arm::register::ApRegister`] -
//! they're plain addressed words.

use core::fmt;

/// Debug Halting Control and Status Register
pub struct Dhcsr(u32);

impl Dhcsr {
    /// Memory address of DHCSR
    pub const ADDRESS: u32 = 0xE000_EDF0;

    /// Value written to halt the core: debug key, `C_HALT`, `C_DEBUGEN`.
    pub const HALT: u32 = 0xA05F_0003;

    /// Value written to release the core from halt: debug key only.
    pub const UNHALT: u32 = 0xA05F_0000;

    /// Whether the core is currently halted (`S_HALT`, bit 17).
    pub fn is_halted(&self) -> bool {
        (self.0 >> 17) & 1 != 0
    }
}

impl From<u32> for Dhcsr {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<Dhcsr> for u32 {
    fn from(value: Dhcsr) -> Self {
        value.0
    }
}

/// Debug Exception and Monitor Control Register
pub struct Demcr;

impl Demcr {
    /// Memory address of DEMCR
    pub const ADDRESS: u32 = 0xE000_EDFC;

    /// Value enabling vector catch on reset (`VC_CORERESET`).
    pub const VECTOR_CATCH: u32 = 0x0000_0001;
}

/// Application Interrupt and Reset Control Register
pub struct Aircr;

impl Aircr {
    /// Memory address of AIRCR
    pub const ADDRESS: u32 = 0xE000_ED0C;

    /// Value asserting a local (core) reset via `VECTRESET`, with the
    /// required `VECTKEY` write key in the upper halfword.
    pub const RESET_ASSERT: u32 = 0x05FA_0004;

    /// Value requesting a full system reset via `SYSRESETREQ`.
    pub const RESET_RELEASE: u32 = 0x05FA_0007;
}

impl fmt::Display for Dhcsr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X} (halted: {})", self.0, self.is_halted())
    }
}
