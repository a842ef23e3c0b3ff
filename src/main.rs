use anyhow::Result;
use bf_passthrough::{DEFAULT_BAUD_RATE, Handshake, Passthrough, PassthroughConfig, ScanMode, logging, port};
use clap::Parser;

/// Enable serial passthrough from a Betaflight flight controller to its receiver
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Baud rate of the receiver link once passthrough is active (420000 if missing or invalid)
    baud_rate: Option<String>,

    /// Serial port of the flight controller, discovered when omitted
    #[arg(short, long)]
    port: Option<String>,

    /// The receiver link is half duplex (GHST)
    #[arg(long)]
    half_duplex: bool,

    /// Read the whole UART listing and use the last receiver UART
    #[arg(long)]
    exhaustive_scan: bool,

    /// Debug logging unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

fn parse_baud_rate(arg: Option<&str>) -> u32 {
    arg.and_then(|s| s.trim().parse().ok()).unwrap_or(DEFAULT_BAUD_RATE)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_stdout(args.verbose);

    let scan_mode = if args.exhaustive_scan { ScanMode::Exhaustive } else { ScanMode::FirstMatch };
    let config = PassthroughConfig::default()
        .with_baud_rate(parse_baud_rate(args.baud_rate.as_deref()))
        .with_half_duplex(args.half_duplex)
        .with_scan_mode(scan_mode);

    let port_name = match args.port {
        Some(port_name) => port_name,
        None => port::find_serial_port()?,
    };

    let passthrough = Passthrough::open(&port_name, config).await?;
    match passthrough.run().await? {
        Handshake::Enabled { uart, baud_rate } => {
            println!("Passthrough enabled: {} is bridged to UART {} @ {} baud", port_name, uart, baud_rate);
        }
        // Expected when the receiver is already reachable, not a failure
        Handshake::AlreadyActive { reason, .. } => println!("{}", reason),
    }

    Ok(())
}
