//! Error types for the passthrough initializer.
//!
//! A device that is already in passthrough (or bootloader) mode is not an
//! error and never shows up here, see [`Handshake`](crate::passthrough::Handshake).

use std::fmt;

use thiserror::Error;

/// Main error type for passthrough operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The flight controller refused a precondition of the handshake
    #[error("{0}")]
    Refused(Refusal),

    /// I/O errors from the transport
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port errors (opening or configuring the port)
    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// No usable serial port could be selected
    #[error("Port discovery failed: {0}")]
    PortNotFound(String),
}

impl From<Refusal> for Error {
    fn from(refusal: Refusal) -> Self {
        Error::Refused(refusal)
    }
}

/// Reason the flight controller cannot be put in passthrough.
///
/// Both cases are fixable by the operator, the rendered message says how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refusal {
    /// One or more `serialrx_*` settings hold an unsupported value
    InvalidConfig {
        /// One human readable line per failed setting
        mismatches: Vec<String>,
    },
    /// No UART is configured with the serial RX function
    RxSerialNotFound,
}

impl fmt::Display for Refusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Refusal::InvalidConfig { mismatches } => {
                writeln!(f, "[ERROR] Invalid serial RX configuration detected:")?;
                for mismatch in mismatches {
                    writeln!(f, "    !!! {} !!!", mismatch)?;
                }
                write!(f, "\n    Please change the configuration and try again!")
            }
            Refusal::RxSerialNotFound => {
                write!(f, "!!! RX Serial not found !!!\n  Check configuration and try again...")
            }
        }
    }
}

/// Convenience type alias for Results using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
