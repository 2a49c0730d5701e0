// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! swd-proto library
//!
//! ARM Serial Wire Debug (SWD) implementation.
//!
//! This can be used to perform debugging, programming, and co-processing
//! with ARM-based MCUs using the
//! [ARM SWD protocol](https://developer.arm.com/documentation/ihi0031/latest/)
//!
//! It is a synchronous, `std` library designed to run on a Linux-class host
//! talking to a target over two bit-banged GPIO lines (SWDIO/SWCLK), such as
//! a Raspberry Pi.
//!
//! ```text
//!   swd-cli Application
//! ----------------------
//!     DebugInterface      \
//! ----------------------   \
//!      SwdInterface         |--  SwdError
//! ----------------------   /
//!      SwdProtocol        /
//! ----------------------
//!   Host GPIO pins      >======================<       SWD Target
//!                          3.3V SWDIO/SWCLK/GND
//! ```
//!
//! * [`DebugInterface`] provides the highest-level and most abstracted
//!   interface to perform groups of SWD operations: target init, halt,
//!   reset and flash programming.
//! * [`SwdInterface`] provides a lower-level interface to perform individual
//!   DP/AP register and memory transfers.
//! * [`SwdProtocol`] implements the SWD wire protocol through bit-banging,
//!   generic over any [`pin::Pin`] implementation.
//!
//! Most applications should use [`DebugInterface`], but those that require
//! tighter control over the target, or are timing sensitive, may want to use
//! [`SwdInterface`] directly.
//!
//! `swd-proto` uses and is designed to be used alongside the `swd-core`
//! library, which provides target, MCU and register concepts used by SWD
//! and the debug interface, but which are not SWD wire-protocol specific.

pub mod debug;
pub mod flash;
pub mod interface;
pub mod orchestrator;
pub mod pin;
pub mod protocol;
pub mod session;

#[doc(inline)]
pub use crate::debug::DebugInterface;
#[doc(inline)]
pub use crate::interface::SwdInterface;
#[doc(inline)]
pub use crate::pin::Pin;
#[doc(inline)]
pub use crate::protocol::SwdProtocol;
#[doc(inline)]
pub use crate::session::Session;

use std::fmt;
use serde::Serialize;

/// Core error type used by all swd-proto objects.
///
/// Methods are provided to make it easier to handle errors, by checking if
/// either a retry or reset is required:
///
/// - [`SwdError::requires_retry()`]
/// - [`SwdError::requires_reset()`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwdError {
    /// Transient error that can likely be retried successfully.  When
    /// [`SwdInterface`] is configured to retry on waits, this error is
    /// returned when too many waits have occurred.
    WaitAck,

    /// Represents a fault condition on the target.  This typically means
    /// the target has got into a fault state and needs to be reset using
    /// either [`DebugInterface::init()`] or a hard reset.
    FaultAck,

    /// Represents no acknowledgement from the target.  This typically means
    /// it got into a bad state and needs to be reset, hopefully via
    /// [`DebugInterface::init()`], but an external reset may be required.
    /// The value received is included - but it is unlikely to be terribly
    /// useful. 7 means the SWDIO line was high for the entire acknowledge
    /// cycle, which is the most common case.
    NoAck(u8),

    /// A parity error was detected while reading from the target.  It means
    /// we cannot trust the data read.
    ///
    /// A significant number of parity errors suggest either:
    /// - A noise issue on the SWD lines
    /// - Running the SWD protocol too fast for the SWD lines or target
    ///
    /// To reset, either use [`DebugInterface::init()`] or perform a hard
    /// reset of the target.
    ReadParity,

    /// A Debug Port error was detected, signalled via the DP CTRL/STAT
    /// register.  This usually requires either writing the ABORT register,
    /// via [`SwdInterface::clear_errors()`], to clear, or resetting the
    /// target.  In reality, a target reset using [`DebugInterface::init()`]
    /// or a hard reset are likely to be required.
    DpError,

    /// A fault was reported by the protocol layer that doesn't map to one
    /// of the more specific variants above, e.g. an unexpected response
    /// during line reset or the JTAG-to-SWD switch sequence.
    ProtocolFault,

    /// While there wasn't a SWD protocol level error, the requested option
    /// failed.  Often occurs when a DP/AP register write doesn't "take".
    /// The operation can be retried, but may fail again.  If a target reset
    /// doesn't resolve the issue, it may be a configuration or user error.
    OperationFailed(String),

    /// The target is not ready to receive the requested operation.  This
    /// normally means that the debug domain has not yet been powered up
    /// using [`SwdInterface::power_up_debug_domain()`].  This is done
    /// automatically by [`DebugInterface::init()`], so if you see this
    /// error, ensure you have called one of those functions first.
    NotReady,

    /// No target responded on the SWD lines at all - the IDCODE read during
    /// line reset came back as all ones or all zeroes.  Check wiring and
    /// that the target is powered.
    NoDevice,

    /// Another session already holds the SWD lines.  See
    /// [`Session::open()`].
    Busy,

    /// Flash is locked and the requested operation requires it to be
    /// unlocked first, via the relevant unlock operation.
    Locked,

    /// A flash write did not read back correctly after programming.
    VerifyFailed,

    /// The request was invalid for this target, e.g. an address or length
    /// outside of the target's flash or RAM regions.
    Invalid,

    /// The API was called incorrectly.
    Api,

    /// A timeout occurred while waiting for a response.
    Timeout,

    /// The requested operation is not supported by `swd-proto`.
    Unsupported,
}

impl SwdError {
    fn from_ack(ack: u8) -> Result<(), SwdError> {
        match ack {
            1 => Ok(()),
            2 => Err(SwdError::WaitAck),
            4 => Err(SwdError::FaultAck),
            _ => Err(SwdError::NoAck(ack)),
        }
    }

    /// Returns true if the error requires a target reset to recover.  In
    /// this case issue a new [`DebugInterface::init()`].  If the error
    /// persists, the target may require a hard reset.
    pub fn requires_reset(&self) -> bool {
        matches!(
            self,
            SwdError::NoAck(_)
                | SwdError::FaultAck
                | SwdError::ReadParity
                | SwdError::DpError
                | SwdError::ProtocolFault
        )
    }

    /// Returns true if the error is a transient error that can be retried.
    /// This is typically just the `Wait` error from the SWD target.
    pub fn requires_retry(&self) -> bool {
        matches!(self, SwdError::WaitAck)
    }

    /// Returns true if the error requires neither a reset nor a retry to
    /// recover.  Normally this means an application error - the API has
    /// probably been used incorrectly, or the request itself was invalid.
    pub fn requires_other(&self) -> bool {
        !self.requires_reset() && !self.requires_retry()
    }

    /// Returns a string representation of the error.
    pub fn as_str(&self) -> &'static str {
        match self {
            SwdError::WaitAck => "Wait ACK",
            SwdError::FaultAck => "Fault ACK",
            SwdError::NoAck(_) => "No ACK",
            SwdError::ReadParity => "Read Parity Error",
            SwdError::DpError => "Debug Port Error",
            SwdError::ProtocolFault => "Protocol Fault",
            SwdError::OperationFailed(_) => "Operation Failed",
            SwdError::NotReady => "Not Ready",
            SwdError::NoDevice => "No Device Detected",
            SwdError::Busy => "Session Busy",
            SwdError::Locked => "Flash Locked",
            SwdError::VerifyFailed => "Verify Failed",
            SwdError::Invalid => "Invalid Request",
            SwdError::Api => "API Error",
            SwdError::Timeout => "Timeout",
            SwdError::Unsupported => "Unsupported Operation",
        }
    }
}

impl Serialize for SwdError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("SwdError", 2)?;

        let kind = match self {
            SwdError::WaitAck => "wait ack",
            SwdError::FaultAck => "fault ack",
            SwdError::NoAck(_) => "no ack",
            SwdError::ReadParity => "read parity",
            SwdError::DpError => "debug port",
            SwdError::ProtocolFault => "protocol fault",
            SwdError::OperationFailed(_) => "operation failed",
            SwdError::NotReady => "not ready",
            SwdError::NoDevice => "no device",
            SwdError::Busy => "busy",
            SwdError::Locked => "locked",
            SwdError::VerifyFailed => "verify failed",
            SwdError::Invalid => "invalid",
            SwdError::Api => "api error",
            SwdError::Timeout => "timeout",
            SwdError::Unsupported => "unsupported",
        };

        state.serialize_field("kind", kind)?;

        let detail = match self {
            SwdError::OperationFailed(msg) => msg.as_str(),
            SwdError::NoAck(code) => &format!("{code}"),
            _ => "",
        };
        state.serialize_field("detail", detail)?;
        state.end()
    }
}

impl fmt::Display for SwdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwdError::NoAck(ack) => write!(f, "{}: {ack}", self.as_str()),
            SwdError::OperationFailed(str) => write!(f, "{}: {str}", self.as_str()),
            _ => write!(f, "{}", self.as_str()),
        }
    }
}

impl std::error::Error for SwdError {}
