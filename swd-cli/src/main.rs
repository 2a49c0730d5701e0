// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swd-cli - host-side CLI for halting, resetting, inspecting and
//! reflashing Cortex-M targets over bit-banged SWD.
//!
//! Talks to the target through two Raspberry Pi GPIO lines (SWDIO/SWCLK),
//! wired via [`gpio::GpioPin`] into the synchronous `swd-core`/`swd-proto`
//! stack. See `--help` for the subcommand list.

mod error;
mod gpio;

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use log::info;

use swd_core::target::TargetDescriptor;
use swd_proto::Session;

use crate::error::{CliError, ErrorKind};
use crate::gpio::GpioPin;

#[derive(Parser)]
#[command(name = "swd-cli", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect to the target and print its IDCODE/MCU details.
    Probe {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Halt the core.
    Halt {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Release the core from halt and request a system reset.
    Unhalt {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Request a system reset without touching the halt state.
    Reset {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Read a block of target memory and print it as hex.
    Read {
        #[command(flatten)]
        target: TargetArgs,
        /// Address to start reading from.
        #[arg(long, value_parser = parse_u32)]
        addr: u32,
        /// Number of bytes to read - must be a multiple of 4.
        #[arg(long)]
        len: u32,
    },
    /// Write a file's contents into target RAM.
    WriteRam {
        #[command(flatten)]
        target: TargetArgs,
        /// Address to start writing to.
        #[arg(long, value_parser = parse_u32)]
        addr: u32,
        /// File whose contents are written - length must be a multiple of
        /// 4 bytes.
        #[arg(long)]
        file: PathBuf,
    },
    /// Erase the whole flash array.
    Erase {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Erase every page/sector overlapping a byte range of flash.
    EraseRange {
        #[command(flatten)]
        target: TargetArgs,
        /// Offset from the start of flash.
        #[arg(long, value_parser = parse_u32)]
        offset: u32,
        /// Number of bytes to erase.
        #[arg(long)]
        len: u32,
    },
    /// Program a file's contents into flash, starting at an offset.
    Flash {
        #[command(flatten)]
        target: TargetArgs,
        /// Offset from the start of flash.
        #[arg(long, value_parser = parse_u32, default_value = "0")]
        offset: u32,
        /// File to program.
        #[arg(long)]
        file: PathBuf,
    },
}

#[derive(clap::Args)]
struct TargetArgs {
    /// Target MCU.
    #[arg(long, value_enum)]
    target: TargetName,
    /// BCM GPIO line driving SWDIO.
    #[arg(long)]
    swdio: u8,
    /// BCM GPIO line driving SWCLK.
    #[arg(long)]
    swclk: u8,
}

impl TargetArgs {
    fn descriptor(&self) -> TargetDescriptor {
        self.target.descriptor()
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum TargetName {
    Stm32f103,
    Stm32f411,
}

impl TargetName {
    fn descriptor(self) -> TargetDescriptor {
        match self {
            TargetName::Stm32f103 => TargetDescriptor::stm32f103(),
            TargetName::Stm32f411 => TargetDescriptor::stm32f411(),
        }
    }
}

fn parse_u32(s: &str) -> Result<u32, std::num::ParseIntError> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        s.parse()
    }
}

fn open_session(target_args: &TargetArgs) -> Result<Session<GpioPin, GpioPin>, CliError> {
    let swdio = GpioPin::new(target_args.swdio)?;
    let swclk = GpioPin::new(target_args.swclk)?;
    Session::open(swdio, swclk, target_args.descriptor()).map_err(CliError::from)
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Probe { target } => {
            let session = open_session(&target)?;
            let debug = session.debug();
            println!("target:  {}", debug.target());
            if let Some(idcode) = debug.idcode() {
                println!("idcode:  {idcode}");
            }
            if let Some(mcu) = debug.mcu() {
                println!("mcu:     {mcu:#}");
            }
        }
        Command::Halt { target } => {
            // Session::open() already halts the core on the way in.
            let session = open_session(&target)?;
            info!("Target halted");
            session.release()?;
        }
        Command::Unhalt { target } => {
            let mut session = open_session(&target)?;
            session.debug_mut().unhalt()?;
            session.release()?;
        }
        Command::Reset { target } => {
            let mut session = open_session(&target)?;
            session.debug_mut().reset()?;
            session.release()?;
        }
        Command::Read { target, addr, len } => {
            if len % 4 != 0 {
                return Err(CliError::Cli(ErrorKind::UnalignedLength));
            }
            let mut session = open_session(&target)?;
            let mut buf = vec![0u32; (len / 4) as usize];
            session
                .debug_mut()
                .read_mem_bulk(addr, &mut buf)
                .map_err(|(e, _)| e)?;
            for (ii, word) in buf.iter().enumerate() {
                println!("0x{:08X}: 0x{word:08X}", addr + (ii as u32 * 4));
            }
            session.release()?;
        }
        Command::WriteRam { target, addr, file } => {
            let bytes = fs::read(&file)?;
            if bytes.is_empty() {
                return Err(CliError::Cli(ErrorKind::EmptyFile));
            }
            if bytes.len() % 4 != 0 {
                return Err(CliError::Cli(ErrorKind::UnalignedLength));
            }
            let words: Vec<u32> = bytes
                .chunks_exact(4)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();

            let mut session = open_session(&target)?;
            session
                .debug_mut()
                .write_mem_bulk(addr, &words)
                .map_err(|(e, _)| e)?;
            session.release()?;
        }
        Command::Erase { target } => {
            let mut session = open_session(&target)?;
            session.debug_mut().erase_all()?;
            session.release()?;
        }
        Command::EraseRange {
            target,
            offset,
            len,
        } => {
            let mut session = open_session(&target)?;
            session.debug_mut().erase_range(offset, len)?;
            session.release()?;
        }
        Command::Flash {
            target,
            offset,
            file,
        } => {
            let bytes = fs::read(&file)?;
            if bytes.is_empty() {
                return Err(CliError::Cli(ErrorKind::EmptyFile));
            }
            if offset.saturating_add(bytes.len() as u32) > target.descriptor().flash.size {
                return Err(CliError::Cli(ErrorKind::FileTooLarge));
            }

            let mut session = open_session(&target)?;
            session.debug_mut().write_flash(offset, &bytes)?;
            session.release()?;
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("swd-cli: {e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
