// High-level passthrough initialization
// Drives the flight controller CLI from wake-up to the serialpassthrough
// command, deciding at each step whether to go on, give up, or leave the
// device alone.

use std::fmt;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::SerialStream;

use crate::error::{Error, Refusal, Result};
use crate::fc_cli::FcCli;
use crate::line_reader::{DEFAULT_READ_TIMEOUT, LineReader};
use crate::logging::prelude::*;
use crate::port::{self, CONTROL_BAUD_RATE};
use crate::responses::{SerialPortConfig, SettingCheck, WakeResponse};

/// Baud rate requested for the receiver link when none is given
pub const DEFAULT_BAUD_RATE: u32 = 420_000;

// Time for the flight controller to switch the UART over before the port is closed
const SETTLE_DELAY: Duration = Duration::from_millis(200);

/// How the `serial` listing is scanned for the receiver UART
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanMode {
    /// Stop at the first UART with the receiver function
    #[default]
    FirstMatch,
    /// Read and log the whole listing, the last receiver UART wins
    Exhaustive,
}

/// Parameters of one passthrough attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassthroughConfig {
    /// Baud rate the receiver link runs at once passthrough is active
    pub baud_rate: u32,
    /// The flight controller link is half duplex
    pub half_duplex: bool,
    /// Receiver UART scan policy
    pub scan_mode: ScanMode,
}

impl Default for PassthroughConfig {
    fn default() -> Self {
        PassthroughConfig {
            baud_rate: DEFAULT_BAUD_RATE,
            half_duplex: false,
            scan_mode: ScanMode::default(),
        }
    }
}

impl PassthroughConfig {
    /// Set the requested receiver baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set whether the link is half duplex
    pub fn with_half_duplex(mut self, half_duplex: bool) -> Self {
        self.half_duplex = half_duplex;
        self
    }

    /// Set the receiver UART scan policy
    pub fn with_scan_mode(mut self, scan_mode: ScanMode) -> Self {
        self.scan_mode = scan_mode;
        self
    }
}

/// Successful end of a passthrough attempt
pub enum Handshake<T> {
    /// Passthrough was enabled and the port closed
    Enabled {
        /// UART the receiver is bridged to
        uart: u16,
        /// Baud rate of the bridged link
        baud_rate: u32,
    },
    /// The device was already in passthrough or bootloader mode, or showed no CLI
    ///
    /// Nothing was changed on the device. The link is handed back untouched so
    /// the caller decides what happens to the port.
    AlreadyActive {
        /// Why the handshake stopped
        reason: String,
        /// The still open link
        link: LineReader<T>,
    },
}

impl<T> fmt::Debug for Handshake<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handshake::Enabled { uart, baud_rate } => f
                .debug_struct("Enabled")
                .field("uart", uart)
                .field("baud_rate", baud_rate)
                .finish(),
            Handshake::AlreadyActive { reason, .. } => f
                .debug_struct("AlreadyActive")
                .field("reason", reason)
                .finish_non_exhaustive(),
        }
    }
}

/// Serial passthrough initializer for a Betaflight flight controller
///
/// # Example
///
/// ```no_run
/// # async fn example() -> bf_passthrough::Result<()> {
/// use bf_passthrough::{Handshake, Passthrough, PassthroughConfig};
///
/// let passthrough = Passthrough::open("/dev/ttyACM0", PassthroughConfig::default()).await?;
/// match passthrough.run().await? {
///     Handshake::Enabled { uart, .. } => println!("Receiver on UART {} is reachable", uart),
///     Handshake::AlreadyActive { reason, .. } => println!("{}", reason),
/// }
/// # Ok(())
/// # }
/// ```
pub struct Passthrough<T> {
    link: LineReader<T>,
    cli: FcCli,
    config: PassthroughConfig,
}

impl Passthrough<SerialStream> {
    /// Open the flight controller serial port at the CLI baud rate
    ///
    /// # Arguments
    ///
    /// * `port_name` - System name of the serial port
    /// * `config` - Parameters of the attempt
    ///
    /// # Errors
    ///
    /// Returns an error if the port cannot be opened
    pub async fn open(port_name: &str, config: PassthroughConfig) -> Result<Self> {
        info!("  Trying to initialize {} @ {}", port_name, config.baud_rate);
        debug!("Opening {} at {} baud for the CLI", port_name, CONTROL_BAUD_RATE);
        let port = port::open_control_port(port_name)?;
        Ok(Passthrough::new(port, config))
    }
}

impl<T> Passthrough<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a passthrough initializer over an already open transport
    ///
    /// The transport must already run at the CLI baud rate.
    pub fn new(transport: T, config: PassthroughConfig) -> Self {
        Passthrough {
            link: LineReader::new(transport, DEFAULT_READ_TIMEOUT, &[]),
            cli: FcCli::new(config.half_duplex),
            config,
        }
    }

    /// Parameters of this attempt
    pub fn config(&self) -> &PassthroughConfig {
        &self.config
    }

    /// Run the handshake to completion
    ///
    /// The sequence is: wake up the CLI, validate the serial receiver settings,
    /// find the receiver UART, then issue `serialpassthrough`. Each step runs
    /// exactly once, retrying means opening a new session.
    ///
    /// # Returns
    ///
    /// [`Handshake::Enabled`] once the command is issued and the port closed, or
    /// [`Handshake::AlreadyActive`] with the untouched link if the device was
    /// not presenting a CLI.
    ///
    /// # Errors
    ///
    /// [`Error::Refused`] when the receiver settings are wrong or no receiver UART
    /// exists (the port is closed first). Transport errors are propagated as-is.
    pub async fn run(mut self) -> Result<Handshake<T>> {
        info!("======== PASSTHROUGH INIT ========");

        if let Some(reason) = self.wake_up().await? {
            warn!("{}", reason);
            return Ok(Handshake::AlreadyActive { reason, link: self.link });
        }

        let rx_serial = match self.configure().await {
            Ok(rx_serial) => rx_serial,
            Err(Error::Refused(refusal)) => {
                error!("{}", refusal);
                if let Err(e) = self.link.close().await {
                    debug!("Closing the port after a refusal failed: {}", e);
                }
                return Err(Error::Refused(refusal));
            }
            Err(e) => return Err(e),
        };

        self.enable(rx_serial).await
    }

    // Returns the reason to stop if the device is not sitting at a CLI prompt
    async fn wake_up(&mut self) -> Result<Option<String>> {
        let reason = match self.cli.wake_up(&mut self.link).await? {
            WakeResponse::Bootloader => Some("Passthrough already enabled and bootloader active".to_string()),
            WakeResponse::NoCli => Some("No CLI available. Already in passthrough mode?".to_string()),
            WakeResponse::Prompt => None,
        };
        Ok(reason)
    }

    async fn configure(&mut self) -> Result<SerialPortConfig> {
        self.validate_serialrx().await?;
        self.detect_rx_serial().await
    }

    // All checks run, so the operator sees every bad setting at once
    async fn validate_serialrx(&mut self) -> Result<()> {
        let checks = [
            SettingCheck::provider(self.config.half_duplex),
            SettingCheck::inverted(),
            SettingCheck::halfduplex(),
        ];

        let mut mismatches = Vec::new();
        for check in &checks {
            if !self.cli.check_setting(&mut self.link, check).await? {
                mismatches.push(check.mismatch());
            }
        }

        if mismatches.is_empty() {
            Ok(())
        } else {
            Err(Refusal::InvalidConfig { mismatches }.into())
        }
    }

    async fn detect_rx_serial(&mut self) -> Result<SerialPortConfig> {
        info!("Attempting to detect FC UART configuration...");
        self.cli
            .find_rx_serial(&mut self.link, self.config.scan_mode)
            .await?
            .ok_or(Error::Refused(Refusal::RxSerialNotFound))
    }

    async fn enable(mut self, rx_serial: SerialPortConfig) -> Result<Handshake<T>> {
        info!("Enabling serial passthrough on {}...", rx_serial);
        self.cli
            .serial_passthrough(&mut self.link, rx_serial.index(), self.config.baud_rate)
            .await?;
        tokio::time::sleep(SETTLE_DELAY).await;
        self.link.close().await?;

        info!("======== PASSTHROUGH DONE ========");
        Ok(Handshake::Enabled {
            uart: rx_serial.index(),
            baud_rate: self.config.baud_rate,
        })
    }
}
