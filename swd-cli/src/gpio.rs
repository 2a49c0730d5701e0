// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! `rppal`-backed [`Pin`] implementation, bit-banging SWDIO/SWCLK over a
//! Raspberry Pi's BCM GPIO lines.

use rppal::gpio::{Gpio, IoPin, Level as RppalLevel, Mode};

use swd_proto::pin::{Level, Pin};

use crate::error::CliError;

/// A single BCM GPIO line, switchable between input and output on the fly -
/// SWDIO needs this, SWCLK only ever drives output.
pub struct GpioPin {
    pin: IoPin,
}

impl GpioPin {
    /// Claims BCM GPIO line `bcm` and leaves it configured as an input.
    pub fn new(bcm: u8) -> Result<Self, CliError> {
        let pin = Gpio::new()?.get(bcm)?.into_io(Mode::Input);
        Ok(Self { pin })
    }
}

impl Pin for GpioPin {
    fn set(&mut self, level: Level) {
        self.pin.write(match level {
            Level::High => RppalLevel::High,
            Level::Low => RppalLevel::Low,
        });
    }

    fn get(&self) -> Level {
        match self.pin.read() {
            RppalLevel::High => Level::High,
            RppalLevel::Low => Level::Low,
        }
    }

    fn set_input(&mut self) {
        self.pin.set_mode(Mode::Input);
    }

    fn set_output(&mut self) {
        self.pin.set_mode(Mode::Output);
    }

    fn delay(&self, cycles: u32) {
        for _ in 0..cycles {
            std::hint::spin_loop();
        }
    }
}
