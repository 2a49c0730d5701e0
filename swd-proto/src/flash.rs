// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Per-target flash controller capability surface.
//!
//! STM32F1 and STM32F4 parts carry two different, incompatible flash
//! controllers behind the same memory-mapped register idea: unlock keys,
//! a busy/error status word, and an erase/program control word. This
//! module implements `unlock`/`lock`/`erase_all`/`erase_range`/`program`
//! once each, branching internally on [`FlashVariant`] for the constants
//! and sequencing that differ.
//!
//! None of these functions touch the orchestration policy (chunking,
//! read-modify-write, retry) - that lives in [`crate::orchestrator`].

use log::{debug, trace, warn};

use swd_core::arm::map::{Csw, CswRegister};
use swd_core::stm::{
    Stm32F1FlashAr, Stm32F1FlashCr, Stm32F1FlashKeyr, Stm32F1FlashSr, Stm32F4FlashCr,
    Stm32F4FlashKeyr, Stm32F4FlashSr,
};
use swd_core::target::{FlashVariant, Segment};

use crate::SwdError;
use crate::interface::SwdInterface;
use crate::pin::Pin;

/// Unlocks the flash controller for erase/program operations.
///
/// A no-op if the controller is already unlocked.
pub fn unlock<D: Pin, C: Pin>(swd: &mut SwdInterface<D, C>) -> Result<(), SwdError> {
    match swd.target().flash_variant {
        FlashVariant::UniformPage { .. } => unlock_f1(swd),
        FlashVariant::Sector { .. } => unlock_f4(swd),
    }
}

/// Locks the flash controller, preventing further erase/program operations.
pub fn lock<D: Pin, C: Pin>(swd: &mut SwdInterface<D, C>) -> Result<(), SwdError> {
    match swd.target().flash_variant {
        FlashVariant::UniformPage { .. } => {
            let cr = swd.read_mem(Stm32F1FlashCr::ADDRESS)?;
            swd.write_mem(Stm32F1FlashCr::ADDRESS, cr | (1 << Stm32F1FlashCr::LOCK_BIT))
        }
        FlashVariant::Sector { .. } => {
            let cr = swd.read_mem(Stm32F4FlashCr::ADDRESS)?;
            swd.write_mem(Stm32F4FlashCr::ADDRESS, cr | (1 << Stm32F4FlashCr::LOCK_BIT))
        }
    }
}

/// Erases the whole flash array.
pub fn erase_all<D: Pin, C: Pin>(swd: &mut SwdInterface<D, C>) -> Result<(), SwdError> {
    unlock(swd)?;

    let result = match swd.target().flash_variant {
        FlashVariant::UniformPage { .. } => erase_all_f1(swd),
        FlashVariant::Sector { .. } => erase_all_f4(swd),
    };

    lock(swd)?;
    result
}

/// Erases every page/sector overlapping the half-open byte range
/// `[offset, offset+len)` (offsets relative to the start of flash).
pub fn erase_range<D: Pin, C: Pin>(
    swd: &mut SwdInterface<D, C>,
    offset: u32,
    len: u32,
) -> Result<(), SwdError> {
    if len == 0 {
        return Ok(());
    }

    unlock(swd)?;

    let flash_base = swd.target().flash.base;
    let result = match swd.target().flash_variant {
        FlashVariant::UniformPage { page_size } => {
            erase_range_f1(swd, flash_base, offset, len, page_size)
        }
        FlashVariant::Sector { segments } => erase_range_f4(swd, offset, len, segments),
    };

    lock(swd)?;
    result
}

/// Programs `data` (32-bit words) at byte `offset` from the start of
/// flash, then reads it back to verify.
///
/// On a verify mismatch the enclosing page/sector is erased and
/// `SwdError::VerifyFailed` is returned; the caller (the orchestrator) is
/// expected to retry the whole page from a freshly staged buffer.
pub fn program<D: Pin, C: Pin>(
    swd: &mut SwdInterface<D, C>,
    offset: u32,
    data: &[u32],
) -> Result<(), SwdError> {
    if data.is_empty() {
        return Ok(());
    }

    unlock(swd)?;

    let flash_base = swd.target().flash.base;
    let addr = flash_base + offset;
    let variant = swd.target().flash_variant;

    let result = match variant {
        FlashVariant::Sector { .. } => program_f4(swd, addr, data),
        FlashVariant::UniformPage { .. } => program_f1(swd, addr, data),
    };
    result?;
    lock(swd)?;

    verify(swd, addr, offset, data, variant)
}

fn verify<D: Pin, C: Pin>(
    swd: &mut SwdInterface<D, C>,
    addr: u32,
    offset: u32,
    data: &[u32],
    variant: FlashVariant,
) -> Result<(), SwdError> {
    let mut readback = vec![0u32; data.len()];
    swd.set_addr_inc(true)?;
    let read_result = swd.read_mem_bulk(addr, &mut readback, false);
    swd.set_addr_inc(false)?;
    read_result.map_err(|(e, _)| e)?;

    if readback.as_slice() == data {
        return Ok(());
    }

    warn!("Flash verify mismatch at 0x{addr:08X}, re-erasing enclosing segment");
    let seg = variant.segment_containing(offset).ok_or(SwdError::Invalid)?;
    erase_range(swd, seg.offset, seg.size)?;
    Err(SwdError::VerifyFailed)
}

// --- STM32F1 (uniform page) ---

fn unlock_f1<D: Pin, C: Pin>(swd: &mut SwdInterface<D, C>) -> Result<(), SwdError> {
    let cr = swd.read_mem(Stm32F1FlashCr::ADDRESS)?;
    if cr & (1 << Stm32F1FlashCr::LOCK_BIT) == 0 {
        return Ok(());
    }

    swd.write_mem(Stm32F1FlashKeyr::ADDRESS, Stm32F1FlashKeyr::KEY1)?;
    swd.write_mem(Stm32F1FlashKeyr::ADDRESS, Stm32F1FlashKeyr::KEY2)?;

    for _ in 0..swd.target().flash_busy_retries {
        let cr = swd.read_mem(Stm32F1FlashCr::ADDRESS)?;
        if cr & (1 << Stm32F1FlashCr::LOCK_BIT) == 0 {
            return Ok(());
        }
    }

    Err(SwdError::Locked)
}

fn wait_busy_f1<D: Pin, C: Pin>(swd: &mut SwdInterface<D, C>) -> Result<(), SwdError> {
    for _ in 0..swd.target().flash_busy_retries {
        let sr = Stm32F1FlashSr::from(swd.read_mem(Stm32F1FlashSr::ADDRESS)?);
        if sr.errors() {
            return Err(SwdError::OperationFailed("flash controller error flag set".into()));
        }
        if !sr.busy() {
            return Ok(());
        }
    }
    Err(SwdError::Busy)
}

fn erase_all_f1<D: Pin, C: Pin>(swd: &mut SwdInterface<D, C>) -> Result<(), SwdError> {
    let cr = swd.read_mem(Stm32F1FlashCr::ADDRESS)?;
    swd.write_mem(Stm32F1FlashCr::ADDRESS, cr | (1 << Stm32F1FlashCr::MER_BIT))?;

    let cr = swd.read_mem(Stm32F1FlashCr::ADDRESS)?;
    swd.write_mem(Stm32F1FlashCr::ADDRESS, cr | (1 << Stm32F1FlashCr::STRT_BIT))?;

    wait_busy_f1(swd)?;

    let cr = swd.read_mem(Stm32F1FlashCr::ADDRESS)?;
    swd.write_mem(Stm32F1FlashCr::ADDRESS, cr & !(1 << Stm32F1FlashCr::MER_BIT))
}

fn erase_range_f1<D: Pin, C: Pin>(
    swd: &mut SwdInterface<D, C>,
    flash_base: u32,
    offset: u32,
    len: u32,
    page_size: u32,
) -> Result<(), SwdError> {
    let mut cur = (offset / page_size) * page_size;
    let end = offset.saturating_add(len);

    while cur < end {
        trace!("Erasing STM32F1 page at offset 0x{cur:08X}");

        let cr = swd.read_mem(Stm32F1FlashCr::ADDRESS)?;
        swd.write_mem(Stm32F1FlashCr::ADDRESS, cr | (1 << Stm32F1FlashCr::PER_BIT))?;
        swd.write_mem(Stm32F1FlashAr::ADDRESS, flash_base + cur)?;

        let cr = swd.read_mem(Stm32F1FlashCr::ADDRESS)?;
        swd.write_mem(Stm32F1FlashCr::ADDRESS, cr | (1 << Stm32F1FlashCr::STRT_BIT))?;

        wait_busy_f1(swd)?;

        cur += page_size;
    }

    let cr = swd.read_mem(Stm32F1FlashCr::ADDRESS)?;
    swd.write_mem(Stm32F1FlashCr::ADDRESS, cr & !(1 << Stm32F1FlashCr::PER_BIT))
}

fn program_f1<D: Pin, C: Pin>(
    swd: &mut SwdInterface<D, C>,
    addr: u32,
    data: &[u32],
) -> Result<(), SwdError> {
    let sr = Stm32F1FlashSr::from(swd.read_mem(Stm32F1FlashSr::ADDRESS)?);
    if sr.busy() {
        return Err(SwdError::Busy);
    }

    let cr = swd.read_mem(Stm32F1FlashCr::ADDRESS)?;
    swd.write_mem(Stm32F1FlashCr::ADDRESS, cr | (1 << Stm32F1FlashCr::PG_BIT))?;

    // The F1 controller only accepts 16-bit half-word writes to the flash
    // array; drop the MEM-AP's transfer size to match for the duration of
    // the write, restoring the caller's 32-bit default afterwards.
    let orig_csw: Csw = swd.read_ap_register(CswRegister, true)?;
    let mut half_csw = orig_csw;
    half_csw.set_size(Csw::SIZE_16BIT);
    half_csw.set_addrinc(Csw::ADDRINC_SINGLE);
    swd.write_ap_register(CswRegister, half_csw, true)?;

    let write_result = (|| -> Result<(), SwdError> {
        for (i, &word) in data.iter().enumerate() {
            let word_addr = addr + (i as u32) * 4;
            swd.write_mem(word_addr, word & 0xFFFF)?;
            wait_busy_f1(swd)?;
            swd.write_mem(word_addr + 2, (word >> 16) & 0xFFFF)?;
            wait_busy_f1(swd)?;
        }
        Ok(())
    })();

    swd.write_ap_register(CswRegister, orig_csw, true)?;
    write_result?;

    let cr = swd.read_mem(Stm32F1FlashCr::ADDRESS)?;
    swd.write_mem(Stm32F1FlashCr::ADDRESS, cr & !(1 << Stm32F1FlashCr::PG_BIT))
}

// --- STM32F4 (sector) ---

fn unlock_f4<D: Pin, C: Pin>(swd: &mut SwdInterface<D, C>) -> Result<(), SwdError> {
    let cr = swd.read_mem(Stm32F4FlashCr::ADDRESS)?;
    if cr & (1 << Stm32F4FlashCr::LOCK_BIT) == 0 {
        return Ok(());
    }

    swd.write_mem(Stm32F4FlashKeyr::ADDRESS, Stm32F4FlashKeyr::KEY1)?;
    swd.write_mem(Stm32F4FlashKeyr::ADDRESS, Stm32F4FlashKeyr::KEY2)?;

    for _ in 0..swd.target().flash_busy_retries {
        let cr = swd.read_mem(Stm32F4FlashCr::ADDRESS)?;
        if cr & (1 << Stm32F4FlashCr::LOCK_BIT) == 0 {
            return Ok(());
        }
    }

    Err(SwdError::Locked)
}

fn wait_busy_f4<D: Pin, C: Pin>(swd: &mut SwdInterface<D, C>) -> Result<(), SwdError> {
    for _ in 0..swd.target().flash_busy_retries {
        let sr = Stm32F4FlashSr::from(swd.read_mem(Stm32F4FlashSr::ADDRESS)?);
        if sr.errors() {
            return Err(SwdError::OperationFailed("flash controller error flag set".into()));
        }
        if !sr.busy() {
            return Ok(());
        }
    }
    Err(SwdError::Busy)
}

fn erase_all_f4<D: Pin, C: Pin>(swd: &mut SwdInterface<D, C>) -> Result<(), SwdError> {
    let cr = swd.read_mem(Stm32F4FlashCr::ADDRESS)?;
    swd.write_mem(Stm32F4FlashCr::ADDRESS, cr | (1 << Stm32F4FlashCr::MER_BIT))?;

    let cr = swd.read_mem(Stm32F4FlashCr::ADDRESS)?;
    swd.write_mem(Stm32F4FlashCr::ADDRESS, cr | (1 << Stm32F4FlashCr::STRT_BIT))?;

    wait_busy_f4(swd)?;

    let cr = swd.read_mem(Stm32F4FlashCr::ADDRESS)?;
    swd.write_mem(Stm32F4FlashCr::ADDRESS, cr & !(1 << Stm32F4FlashCr::MER_BIT))
}

fn erase_range_f4<D: Pin, C: Pin>(
    swd: &mut SwdInterface<D, C>,
    offset: u32,
    len: u32,
    segments: &'static [Segment],
) -> Result<(), SwdError> {
    let mut cur = offset;
    let end = offset.saturating_add(len);

    while cur < end {
        let idx = segments
            .iter()
            .position(|s| cur >= s.offset && cur < s.end())
            .ok_or(SwdError::Invalid)?;
        let seg = segments[idx];

        debug!("Erasing STM32F4 sector {idx} (offset 0x{:08X}, {} bytes)", seg.offset, seg.size);

        let mut cr = swd.read_mem(Stm32F4FlashCr::ADDRESS)?;
        cr |= 1 << Stm32F4FlashCr::SER_BIT;
        cr = (cr & !(Stm32F4FlashCr::SNB_MASK << Stm32F4FlashCr::SNB_SHIFT))
            | ((idx as u32) << Stm32F4FlashCr::SNB_SHIFT);
        swd.write_mem(Stm32F4FlashCr::ADDRESS, cr)?;

        let cr = swd.read_mem(Stm32F4FlashCr::ADDRESS)?;
        swd.write_mem(Stm32F4FlashCr::ADDRESS, cr | (1 << Stm32F4FlashCr::STRT_BIT))?;

        wait_busy_f4(swd)?;

        cur = seg.end();
    }

    let cr = swd.read_mem(Stm32F4FlashCr::ADDRESS)?;
    let cr = cr & !(1 << Stm32F4FlashCr::SER_BIT);
    let cr = cr & !(Stm32F4FlashCr::SNB_MASK << Stm32F4FlashCr::SNB_SHIFT);
    swd.write_mem(Stm32F4FlashCr::ADDRESS, cr)
}

fn program_f4<D: Pin, C: Pin>(
    swd: &mut SwdInterface<D, C>,
    addr: u32,
    data: &[u32],
) -> Result<(), SwdError> {
    let sr = Stm32F4FlashSr::from(swd.read_mem(Stm32F4FlashSr::ADDRESS)?);
    if sr.busy() {
        return Err(SwdError::Busy);
    }

    let mut cr = swd.read_mem(Stm32F4FlashCr::ADDRESS)?;
    cr &= !(Stm32F4FlashCr::PSIZE_MASK << Stm32F4FlashCr::PSIZE_SHIFT);
    cr |= Stm32F4FlashCr::PSIZE_X32 << Stm32F4FlashCr::PSIZE_SHIFT;
    cr |= 1 << Stm32F4FlashCr::PG_BIT;
    swd.write_mem(Stm32F4FlashCr::ADDRESS, cr)?;

    swd.set_addr_inc(true)?;
    let write_result = swd.write_mem_bulk(addr, data, false);
    swd.set_addr_inc(false)?;
    write_result.map_err(|(e, _)| e)?;

    wait_busy_f4(swd)?;

    let cr = swd.read_mem(Stm32F4FlashCr::ADDRESS)?;
    swd.write_mem(Stm32F4FlashCr::ADDRESS, cr & !(1 << Stm32F4FlashCr::PG_BIT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flash_register_addresses_match_expected_layout() {
        assert_eq!(Stm32F1FlashCr::ADDRESS, 0x4002_2010);
        assert_eq!(Stm32F4FlashCr::ADDRESS, 0x4002_3C10);
        assert_eq!(Stm32F1FlashCr::LOCK_BIT, 7);
        assert_eq!(Stm32F4FlashCr::LOCK_BIT, 31);
        assert_eq!(Stm32F1FlashSr::BSY_BIT, 0);
        assert_eq!(Stm32F4FlashSr::BSY_BIT, 16);
    }
}
