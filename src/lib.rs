//! # Crate to enable serial passthrough on a Betaflight flight controller
//!
//! This crate prepares a receiver wired behind a Betaflight flight controller
//! for a firmware upload. It talks to the flight controller CLI over its USB
//! serial port and issues the `serialpassthrough` command that bridges the
//! port to the UART the receiver sits on. The flashing tool can then reopen
//! the same port and talk to the receiver bootloader directly.
//!
//! # Passthrough handshake
//!
//! The flight controller CLI is a line oriented text console. Setting up
//! passthrough goes through four steps, each a single exchange bounded by a
//! read timeout:
//! - Wake-up: send `#` at 115200 baud. A `CCC` banner means a receiver
//!   bootloader is already answering (passthrough is active), silence means
//!   there is no CLI; in both cases the device is left alone.
//! - Validation: `get serialrx_provider`, `get serialrx_inverted` and
//!   `get serialrx_halfduplex` must report values the receiver protocol
//!   supports. Every mismatch is reported.
//! - Discovery: the `serial` listing gives the UART whose function mask is the
//!   serial receiver one (64).
//! - Passthrough: `serialpassthrough <uart> <baudrate>`, then the port is closed.
//!
//! Uploading the firmware itself (XMODEM or otherwise) is left to another tool.
//!
//! See `src/main.rs` for a command line front-end.

#![deny(missing_docs)]

pub mod error;
pub mod fc_cli;
mod line_reader;
pub mod logging;
mod passthrough;
pub mod port;
pub mod responses;

pub use error::{Error, Refusal, Result};
pub use line_reader::{DEFAULT_READ_TIMEOUT, LineReader};
pub use passthrough::{DEFAULT_BAUD_RATE, Handshake, Passthrough, PassthroughConfig, ScanMode};
