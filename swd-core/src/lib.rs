// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swd-core - Core protocol, MCU and target concepts used by the SWD
//! debug tooling in this workspace.
//!
//! Designed to be used in conjunction with the `swd-proto` crate, which
//! implements the ARM Serial Wire Debug (SWD) wire protocol, MEM-AP
//! transport and flash programming state machines on top of the types
//! defined here.

pub mod arm;
pub mod stm;
pub mod target;

use core::fmt;
use core::ops::RangeInclusive;
use static_assertions::const_assert;

use crate::arm::ap::Idr;
use crate::arm::dp::IdCode;

/// Represents a target's microcontroller unit.
///
/// `swd-proto` can be used to identify the MCU type using this object. See
/// `swd_proto::debug::DebugInterface::mcu()`.
#[derive(Debug, Clone, Copy)]
pub enum Mcu {
    /// An STM32 MCU.
    Stm32(stm::StmDetails),

    /// An unknown MCU, identified by its IDCODE.
    Unknown(IdCode),
}

impl Mcu {
    /// Returns MCU's flash base address if available.
    pub fn flash_base(&self) -> Option<u32> {
        match self {
            Mcu::Stm32(details) => details.flash_base(),
            Mcu::Unknown(_) => None,
        }
    }

    /// Returns the MCU's RAM base address if available.
    pub fn ram_base(&self) -> Option<u32> {
        match self {
            Mcu::Stm32(details) => details.ram_base(),
            Mcu::Unknown(_) => None,
        }
    }

    /// Returns the MCU's flash size in bytes if available.
    pub fn flash_size_bytes(&self) -> Option<u32> {
        self.flash_size_kb().map(|size| size * 1024)
    }

    /// Returns the MCU's flash size in KB if available.
    pub fn flash_size_kb(&self) -> Option<u32> {
        match self {
            Mcu::Stm32(details) => details.flash_size_kb().map(|size| size.raw() as u32),
            Mcu::Unknown(_) => None,
        }
    }

    /// Returns the MCU's RAM size in bytes if available.
    pub fn ram_size_bytes(&self) -> Option<u32> {
        self.ram_size_kb().map(|size| size * 1024)
    }

    /// Returns the MCU's RAM size in KB if available.
    pub fn ram_size_kb(&self) -> Option<u32> {
        match self {
            Mcu::Stm32(details) => details.mcu().line().ram_size_kb(),
            Mcu::Unknown(_) => None,
        }
    }

    /// Returns whether this is an STM32 MCU.
    pub fn is_stm32(&self) -> bool {
        matches!(self, Mcu::Stm32(_))
    }

    /// Returns whether this is an STM32F4 MCU.
    pub fn is_stm32f4(&self) -> bool {
        match self {
            Mcu::Stm32(stm) => stm.is_stm32f4(),
            Mcu::Unknown(_) => false,
        }
    }

    /// Returns whether this is an STM32F1 MCU.
    pub fn is_stm32f1(&self) -> bool {
        match self {
            Mcu::Stm32(stm) => stm.is_stm32f1(),
            Mcu::Unknown(_) => false,
        }
    }

    /// Returns the size of the specified flash sector in bytes.
    pub fn get_sector_size_bytes(&self, sector: u8) -> Option<u32> {
        match self {
            Mcu::Stm32(details) => details.get_sector_size_bytes(sector),
            Mcu::Unknown(_) => None,
        }
    }

    /// Returns the size of the specified flash sector in words.
    pub fn get_sector_size_words(&self, sector: u8) -> Option<u32> {
        self.get_sector_size_bytes(sector).map(|size| size / 4)
    }

    /// Returns the size of the specified flash sector in KB.
    pub fn get_sector_size_kb(&self, sector: u8) -> Option<u32> {
        self.get_sector_size_bytes(sector).map(|size| size / 1024)
    }

    /// Maximum number of flash sectors for STM32 devices.
    pub const MAX_SECTORS: u8 = 12;

    /// Returns the sector number or numbers for the given word range.
    ///
    /// Note that the word range is relative to the start of flash.
    pub fn get_sectors_from_word_range(
        &self,
        range: RangeInclusive<u32>,
        sectors: &mut [u8; Self::MAX_SECTORS as usize],
    ) -> Option<usize> {
        const_assert!(Mcu::MAX_SECTORS <= stm::StmDetails::MAX_SECTORS);
        match self {
            Mcu::Stm32(details) => details.get_sectors_from_word_range(range, sectors),
            Mcu::Unknown(_) => None,
        }
    }

    /// Returns the expected Access Port Identification Register (IDR) value
    /// for this MCU.
    pub fn expected_idr(&self) -> Option<Idr> {
        match self {
            Mcu::Stm32(details) => details.expected_idr(),
            Mcu::Unknown(_) => None,
        }
    }
}

impl fmt::Display for Mcu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mcu::Stm32(details) => {
                if f.alternate() {
                    write!(f, "STM32 MCU: {details:#}")
                } else {
                    write!(f, "{details}")
                }
            }
            Mcu::Unknown(idcode) => {
                if f.alternate() {
                    write!(f, "Unknown MCU (IDCODE: {idcode:#})")
                } else {
                    write!(f, "Unknown MCU (IDCODE: {idcode})")
                }
            }
        }
    }
}
