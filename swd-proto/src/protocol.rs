// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ARM SWD Wire Protocol Implementation
//!
//! This module implements the SWD protocol for communicating with ARM-based
//! MCUs.  It provides the `SwdProtocol` struct for low-level SWD operations,
//! generic over any pair of [`Pin`] implementations.

use std::result::Result;
use std::thread;
use std::time::Duration;
#[allow(unused_imports)]
use log::{debug, trace};

use crate::SwdError;
use crate::pin::{Level, Pin};

#[doc(inline)]
pub use crate::debug::DebugInterface;
#[doc(inline)]
pub use crate::interface::SwdInterface;

// JTAG-to-SWD sequence as documented: 0111100111100111
const JTAG_TO_SWD_DOCUMENTED: u16 = 0b0111100111100111; // 0x79E7

// Reversed for SWD LSB-first transmission
const JTAG_TO_SWD_SEQUENCE: u16 = JTAG_TO_SWD_DOCUMENTED.reverse_bits(); // 0xE79E

// 50+ clock cycles with SWDIO high
const LINE_RESET_SWDIO_HIGH_CYCLES: u32 = 51;

// 2+ clock cycles with SWDIO low
const LINE_RESET_SWDIO_LOW_CYCLES: u32 = 3;

// Minimum 8 clocks after a single operation
pub(crate) const POST_SINGLE_OPERATION_CYCLES: u32 = 8;

/// SWD protocol speed setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Speed {
    /// Aims to be roughly 500kHz clock
    #[default]
    Slow,

    /// Aims to be roughly 1MHz clock
    Medium,

    /// Aims to be roughly 2MHz clock
    Fast,
}

impl Speed {
    /// Returns the **approximate** speed in kHz for this SWD speed setting.
    pub fn speed_khz(&self) -> u32 {
        match self {
            Speed::Slow => 500,
            Speed::Medium => 1000,
            Speed::Fast => 2000,
        }
    }

    fn clock_cycles(&self) -> u32 {
        match self {
            Speed::Slow => 75,
            Speed::Medium => 33,
            Speed::Fast => 10,
        }
    }
}

/// SWD Protocol object
///
/// This is used by [`SwdInterface`] to communicate with the target.  It is
/// not expected to be used directly by applications, hence the only public
/// methods are `new()`, `speed()` and `set_speed()`.
///
/// You should use [`DebugInterface`] (preferred) or [`SwdInterface`]
/// instead.
pub struct SwdProtocol<D, C>
where
    D: Pin,
    C: Pin,
{
    swdio: D,
    swclk: C,
    speed: Speed,
    clock_cycles: u32,
}

impl<D, C> SwdProtocol<D, C>
where
    D: Pin,
    C: Pin,
{
    /// Create a new SWD protocol instance.
    ///
    /// This initializes the SWDIO and SWCLK pins for SWD communication.
    ///
    /// Arguments:
    /// - `swdio`: The pin to use for SWDIO.
    /// - `swclk`: The pin to use for SWCLK.
    ///
    /// Returns:
    /// - A new `SwdProtocol` instance configured for SWD communication.
    pub fn new(mut swdio: D, mut swclk: C) -> Self {
        // Start SWDIO as input.  We do not set a pull - it is the target's
        // responsibility to pull SWDIO high, and it only does it after
        // we've sent the JTAG-to-SWD sequence - possibly not until we've
        // read the IDCODE.
        swdio.set_input();

        // Start SWCLK as output, initially LOW
        swclk.set_output();
        swclk.set(Level::Low);

        debug!("SWD interface created, SWDIO input without pull, SWCLK output low");

        let speed = Speed::default();
        let clock_cycles = speed.clock_cycles();

        Self {
            swclk,
            swdio,
            speed,
            clock_cycles,
        }
    }

    pub fn speed(&self) -> Speed {
        self.speed
    }

    pub fn set_speed(&mut self, speed: Speed) {
        self.speed = speed;
        self.clock_cycles = speed.clock_cycles();
        debug!("SWD speed set to {speed:?}");
    }

    #[inline]
    pub(crate) fn set_swdio_output(&mut self) {
        self.swdio.set_output();
    }

    #[inline]
    pub(crate) fn set_swdio_input(&mut self) {
        self.swdio.set_input();
    }

    #[inline]
    pub(crate) fn set_swdio_high(&mut self) {
        self.swdio.set(Level::High);
    }

    #[inline]
    pub(crate) fn set_swdio_low(&mut self) {
        self.swdio.set(Level::Low);
    }

    #[inline]
    pub(crate) fn set_swclk_high(&mut self) {
        self.swclk.set(Level::High);
    }

    #[inline]
    pub(crate) fn set_swclk_low(&mut self) {
        self.swclk.set(Level::Low);
    }

    #[inline]
    fn write_bit(&mut self, bit: bool) {
        if bit {
            self.set_swdio_high();
        } else {
            self.set_swdio_low();
        }
        self.set_swclk_low();
        self.swclk.delay(self.clock_cycles);
        self.set_swclk_high();
        self.swclk.delay(self.clock_cycles);
    }

    #[inline]
    fn read_bit(&mut self) -> bool {
        self.set_swclk_low();
        self.swclk.delay(self.clock_cycles);

        // We read the bit before setting SWCLK high, as the target uses
        // the clock going high to trigger the next bit.
        let bit = self.swdio.get().is_high();

        self.set_swclk_high();
        self.swclk.delay(self.clock_cycles);
        bit
    }

    #[inline]
    pub(crate) fn read_u32_parity_turnaround(&mut self) -> Result<u32, SwdError> {
        let mut data = 0u32;
        for ii in 0..32 {
            if self.read_bit() {
                data |= 1 << ii;
            }
        }

        // Read parity bit
        let parity = self.read_bit();
        self.turnaround_to_output();

        // Check parity
        if calculate_parity(data) != parity {
            // We do the turnaround anyway, as the target won't know there's
            // been an error, and it's unlikely the caller will send another
            // operation immediately given the error.
            debug!("SWD read parity error: data=0x{data:08X}, parity={parity}");
            return Err(SwdError::ReadParity);
        }

        Ok(data)
    }

    pub(crate) fn write_cmd_turnaround(&mut self, data: u8) {
        self.write_bits(8, data as u64);

        self.set_swdio_input(); // Set SWDIO to input for turnaround
        self.clock(1); // Clock for turnaround bit, leaves swclk low
    }

    #[inline]
    fn turnaround_to_output(&mut self) {
        self.clock(1);
        self.set_swdio_output();
        self.set_swdio_low();
        self.set_swclk_low();
    }

    pub(crate) fn turnaround_write_u32_parity(&mut self, data: u32) {
        self.turnaround_to_output();

        self.write_u32_parity(data);
    }

    #[inline]
    pub(crate) fn write_u32_parity(&mut self, data: u32) {
        let data: u64 = if calculate_parity(data) {
            data as u64 | (1 << 32)
        } else {
            data as u64
        };

        self.write_bits(33, data);
    }

    /// Read the ACK response from the target.  If the ACK is an error
    /// response, this will also write a turnaround bit.
    pub(crate) fn read_ack(&mut self) -> Result<(), SwdError> {
        let mut ack = 0u8;
        for ii in 0..3 {
            if self.read_bit() {
                ack |= 1 << ii;
            }
        }
        let result = SwdError::from_ack(ack);

        // The protocol requires a turnaround bit after a Wait or Fault
        // response.  We do so here (and also if we get an invalid ACK
        // value).  This also leaves SWDIO low.
        match &result {
            Ok(_) => (),
            Err(SwdError::WaitAck) | Err(SwdError::FaultAck) => {
                trace!("ACK error - turnaround: {result:?}");
                self.turnaround_to_output();
            }
            Err(e) => {
                trace!("ACK error - no turnaround: {e:?}");
                self.set_swdio_low();
                self.set_swclk_low();
            }
        }

        result
    }

    #[inline]
    pub(crate) fn clock(&mut self, cycles: u32) {
        for _ in 0..cycles {
            self.set_swclk_low();
            self.swclk.delay(self.clock_cycles);
            self.set_swclk_high();
            self.swclk.delay(self.clock_cycles);
        }

        self.set_swclk_low(); // Leave SWCLK low
    }

    // Brief pause with all lines low so we start from a known state
    pub(crate) fn reset_prep(&mut self) {
        self.set_swdio_output();
        self.set_swdio_low();
        self.set_swclk_low();
        thread::sleep(Duration::from_micros(500));
    }

    // Perform line reset before JTAG-to-SWD sequence
    pub(crate) fn pre_line_reset(&mut self) {
        // 50+ clock cycles with SWDIO high
        self.set_swdio_high();
        self.clock(LINE_RESET_SWDIO_HIGH_CYCLES);
    }

    // Perform line reset after JTAG-to-SWD sequence.  Includes 2+ clock
    // cycles with SWDIO low.
    pub(crate) fn line_reset_after(&mut self) {
        self.set_swdio_output();

        // 50+ clock cycles with SWDIO high
        self.set_swdio_high();
        self.clock(LINE_RESET_SWDIO_HIGH_CYCLES);

        // 2+ clock cycles with SWDIO low
        self.set_swdio_low();
        self.clock(LINE_RESET_SWDIO_LOW_CYCLES);

        // Brief pause
        thread::sleep(Duration::from_micros(100));
    }

    #[inline]
    pub(crate) fn write_bits(&mut self, count: usize, data: u64) {
        trace!("Writing {count} bits: 0x{data:0X}");
        let mut data = data;
        for _ in 0..count {
            self.write_bit(data & 1 == 1);
            data >>= 1;
        }
        self.set_swclk_low(); // Leave SWCLK low
    }

    pub(crate) fn jtag_to_swd_sequence(&mut self) {
        self.write_bits(16, JTAG_TO_SWD_SEQUENCE as u64);
        self.set_swdio_high(); // Set swdio to high when we're done
        self.set_swclk_low(); // And clock to low
    }
}

/// Calculate SWD parity - 1 for an odd number of bits set to 1, 0 otherwise.
pub(crate) fn calculate_parity<T>(value: T) -> bool
where
    T: Into<u64>,
{
    (value.into().count_ones() % 2) == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parity_even_bits_is_false() {
        assert!(!calculate_parity(0b0000_0000u32));
        assert!(!calculate_parity(0b0000_0011u32));
    }

    #[test]
    fn parity_odd_bits_is_true() {
        assert!(calculate_parity(0b0000_0001u32));
        assert!(calculate_parity(0b0000_0111u32));
    }

    #[test]
    fn jtag_to_swd_sequence_is_reversed_bits() {
        assert_eq!(JTAG_TO_SWD_SEQUENCE, 0xE79E);
    }
}
