// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swd-cli - Error types

use std::fmt;

use swd_proto::SwdError;

/// swd-cli top-level error type.
#[derive(Debug)]
pub enum CliError {
    Swd(SwdError),
    Cli(ErrorKind),
    Gpio(rppal::gpio::Error),
    Io(std::io::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Swd(swd) => write!(f, "{swd}"),
            CliError::Cli(kind) => write!(f, "{kind}"),
            CliError::Gpio(e) => write!(f, "GPIO error: {e}"),
            CliError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for CliError {}

/// `CliError::Cli` error kinds - problems with the invocation itself, as
/// opposed to errors surfaced by the target over SWD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    UnalignedLength,
    FileTooLarge,
    EmptyFile,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::UnalignedLength => write!(f, "length must be a multiple of 4 bytes"),
            ErrorKind::FileTooLarge => write!(f, "file is larger than the target region"),
            ErrorKind::EmptyFile => write!(f, "file is empty"),
        }
    }
}

impl CliError {
    /// Maps this error to a process exit code, in rough order of severity.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Swd(swd) => Self::exit_code_from_swd_error(swd),
            CliError::Cli(_) => 64,  // EX_USAGE
            CliError::Gpio(_) => 71, // EX_OSERR
            CliError::Io(_) => 66,   // EX_NOINPUT
        }
    }

    fn exit_code_from_swd_error(swd: &SwdError) -> i32 {
        match swd {
            SwdError::NoDevice => 2,
            SwdError::Busy => 3,
            SwdError::Locked | SwdError::VerifyFailed => 4,
            SwdError::Invalid => 64, // EX_USAGE
            SwdError::Unsupported => 69,
            _ => 1,
        }
    }
}

impl From<SwdError> for CliError {
    fn from(error: SwdError) -> Self {
        CliError::Swd(error)
    }
}

impl From<rppal::gpio::Error> for CliError {
    fn from(error: rppal::gpio::Error) -> Self {
        CliError::Gpio(error)
    }
}

impl From<std::io::Error> for CliError {
    fn from(error: std::io::Error) -> Self {
        CliError::Io(error)
    }
}
