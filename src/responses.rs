//! # Parsing of flight controller CLI replies
//!
//! This module interprets the text the Betaflight CLI sends back to the
//! commands issued by [`FcCli`](crate::fc_cli::FcCli). Parsing is purely
//! textual: the CLI output is meant for humans, so matching is done on stable
//! substrings and whitespace separated fields only.

use std::fmt::{self, Display};

use crate::fc_cli::{BOOTLOADER_BANNER, FUNCTION_RX_SERIAL};

/// How the flight controller answered the wake-up command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeResponse {
    /// The bootloader banner came back: passthrough (or a bootloader) already owns the UART
    Bootloader,
    /// Nothing usable came back, there is no interactive CLI on the other end
    NoCli,
    /// The CLI prompt came back, commands can be issued
    Prompt,
}

impl WakeResponse {
    /// Classify the reply to the wake-up command
    ///
    /// The banner wins over anything else. Otherwise the reply, once surrounding
    /// whitespace is trimmed, must end with the `#` of the CLI prompt.
    pub fn classify(response: &str) -> Self {
        let response = response.trim();
        if response.contains(BOOTLOADER_BANNER) {
            WakeResponse::Bootloader
        } else if response.is_empty() || !response.ends_with('#') {
            WakeResponse::NoCli
        } else {
            WakeResponse::Prompt
        }
    }
}

/// Expected value of one `serialrx_*` setting
///
/// A check is satisfied when the reply to `get serialrx_<key>` contains
/// `" = <value>"` for any of the accepted values. Matching is case sensitive
/// and ignores where in the reply the substring appears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingCheck {
    key: &'static str,
    accepted: &'static [&'static str],
}

impl SettingCheck {
    /// Create a check for `serialrx_<key>`
    pub const fn new(key: &'static str, accepted: &'static [&'static str]) -> Self {
        SettingCheck { key, accepted }
    }

    /// Receiver protocol: CRSF or ELRS on a full duplex link, GHST on a half duplex one
    pub const fn provider(half_duplex: bool) -> Self {
        if half_duplex {
            SettingCheck::new("provider", &["GHST"])
        } else {
            SettingCheck::new("provider", &["CRSF", "ELRS"])
        }
    }

    /// Signal inversion must be off
    pub const fn inverted() -> Self {
        SettingCheck::new("inverted", &["OFF"])
    }

    /// Hardware half duplex must be off or left to auto detection
    pub const fn halfduplex() -> Self {
        SettingCheck::new("halfduplex", &["OFF", "AUTO"])
    }

    /// Setting name without the `serialrx_` prefix
    pub fn key(&self) -> &'static str {
        self.key
    }

    /// Values the setting may hold
    pub fn accepted(&self) -> &'static [&'static str] {
        self.accepted
    }

    /// True if `response` reports one of the accepted values
    pub fn is_satisfied(&self, response: &str) -> bool {
        self.accepted
            .iter()
            .any(|value| response.contains(&format!(" = {}", value)))
    }

    /// Operator facing description of a failed check
    pub fn mismatch(&self) -> String {
        format!("serialrx_{} != {}", self.key, self.accepted.join("/"))
    }
}

// Serial line structure, one line per UART:
// serial <identifier> <function mask> <msp baud> <gps baud> <telemetry baud> <blackbox baud>

/// One UART entry of the `serial` command output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialPortConfig {
    index: u16,
    function_mask: u32,
}

impl SerialPortConfig {
    /// Parse a `serial <index> <function-mask> ...` line
    ///
    /// Returns `None` for anything else, including the echoed `serial` command,
    /// lines whose first two fields are not integers, and lines that stop right
    /// after the function mask.
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();
        if fields.next()? != "serial" {
            return None;
        }
        let index = fields.next()?.parse().ok()?;
        let function_mask = fields.next()?.parse().ok()?;
        // Baud rate fields follow the mask on every real listing line
        fields.next()?;
        Some(SerialPortConfig { index, function_mask })
    }

    /// UART identifier used by `serialpassthrough`
    pub fn index(&self) -> u16 {
        self.index
    }

    /// Function mask configured on this UART
    pub fn function_mask(&self) -> u32 {
        self.function_mask
    }

    /// True if this UART carries the serial receiver
    pub fn is_rx_serial(&self) -> bool {
        self.function_mask == FUNCTION_RX_SERIAL
    }
}

impl Display for SerialPortConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UART {} (function mask {})", self.index, self.function_mask)
    }
}

/// True if `line` terminates the `serial` listing: a blank line or the prompt
pub fn ends_serial_listing(line: &str) -> bool {
    let line = line.trim();
    line.is_empty() || line.contains('#')
}
