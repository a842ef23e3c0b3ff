//! # Interface to the flight controller CLI
//!
//! One method per CLI command used to set up passthrough. Each method drives
//! a single command/response exchange over a [`LineReader`] and returns the
//! parsed reply; sequencing the commands is left to
//! [`Passthrough`](crate::Passthrough).

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::line_reader::LineReader;
use crate::logging::prelude::*;
use crate::passthrough::ScanMode;
use crate::responses::{SerialPortConfig, SettingCheck, WakeResponse, ends_serial_listing};

/// Printed by the receiver bootloader (XMODEM 'C' polling) once passthrough is active
pub const BOOTLOADER_BANNER: &str = "CCC";
/// Betaflight CLI prompt
pub const CLI_PROMPT: &str = "# ";
/// `serial` function mask of a UART running the serial receiver (FUNCTION_RX_SERIAL)
pub const FUNCTION_RX_SERIAL: u32 = 64;

// CLI commands
const CMD_WAKE_UP: &str = "#\r\n";
const CMD_GET_SERIALRX: &str = "get serialrx_";
const CMD_SERIAL: &str = "serial\r\n";
const CMD_SERIAL_PASSTHROUGH: &str = "serialpassthrough";

// The CLI needs a moment to print its banner on entry
const WAKE_UP_TIMEOUT: Duration = Duration::from_secs(2);
const GET_TIMEOUT: Duration = Duration::from_secs(1);

/// Command layer of the Betaflight CLI
pub struct FcCli {
    half_duplex: bool,
}

impl FcCli {
    /// Create a new CLI interface
    ///
    /// # Arguments
    ///
    /// * `half_duplex` - Pace the wake-up command for a half duplex link
    pub fn new(half_duplex: bool) -> Self {
        FcCli { half_duplex }
    }

    /// Send the `#` command that enters CLI mode and classify the answer
    ///
    /// Both the bootloader banner and the prompt terminate the read, whichever
    /// comes first.
    pub async fn wake_up<T>(&self, link: &mut LineReader<T>) -> io::Result<WakeResponse>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        link.set_delimiters(&[BOOTLOADER_BANNER, CLI_PROMPT]);
        link.clear().await?;
        link.write(CMD_WAKE_UP, self.half_duplex).await?;
        let response = link.read_line_timeout(WAKE_UP_TIMEOUT).await?;
        Ok(WakeResponse::classify(&response))
    }

    /// Query `serialrx_<key>` and evaluate it against `check`
    ///
    /// # Returns
    ///
    /// `true` if the reported value is one of the accepted ones. A reply that
    /// does not arrive within the timeout counts as a mismatch.
    pub async fn check_setting<T>(&self, link: &mut LineReader<T>, check: &SettingCheck) -> io::Result<bool>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        link.set_delimiters(&[CLI_PROMPT]);
        link.clear().await?;
        link.write(&format!("{}{}\r\n", CMD_GET_SERIALRX, check.key()), false).await?;
        let response = link.read_line_timeout(GET_TIMEOUT).await?;
        let satisfied = check.is_satisfied(&response);
        if !satisfied {
            debug!("serialrx_{} is not one of {:?}", check.key(), check.accepted());
        }
        Ok(satisfied)
    }

    /// List the UART configuration and find the one running the serial receiver
    ///
    /// Lines are read until a blank line, the prompt, or a read timeout.
    ///
    /// # Arguments
    ///
    /// * `link` - The link to the flight controller
    /// * `scan_mode` - Stop at the first receiver UART, or read the whole
    ///   listing and keep the last one
    ///
    /// # Returns
    ///
    /// The receiver UART configuration, `None` if no UART has the receiver function
    pub async fn find_rx_serial<T>(&self, link: &mut LineReader<T>, scan_mode: ScanMode) -> io::Result<Option<SerialPortConfig>>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        link.set_delimiters(&["\n"]);
        link.clear().await?;
        link.write(CMD_SERIAL, false).await?;

        let mut rx_serial = None;
        loop {
            let line = link.read_line().await?;
            let line = line.trim();
            if ends_serial_listing(line) {
                break;
            }
            if !line.starts_with("serial") {
                continue;
            }

            if scan_mode == ScanMode::Exhaustive {
                debug!("  '{}'", line);
            }
            if let Some(config) = SerialPortConfig::parse(line).filter(SerialPortConfig::is_rx_serial) {
                info!("    ** Serial RX config detected: '{}'", line);
                rx_serial = Some(config);
                if scan_mode == ScanMode::FirstMatch {
                    break;
                }
            }
        }
        Ok(rx_serial)
    }

    /// Hand the UART over to the receiver
    ///
    /// No reply is read: once the command is accepted the flight controller
    /// stops talking CLI on this port.
    ///
    /// # Arguments
    ///
    /// * `link` - The link to the flight controller
    /// * `index` - UART identifier, as reported by `serial`
    /// * `baud_rate` - Baud rate the bridged link runs at
    pub async fn serial_passthrough<T>(&self, link: &mut LineReader<T>, index: u16, baud_rate: u32) -> io::Result<()>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let command = format!("{} {} {}", CMD_SERIAL_PASSTHROUGH, index, baud_rate);
        info!("  CMD: '{}'", command);
        link.write(&format!("{}\r\n", command), false).await
    }
}
