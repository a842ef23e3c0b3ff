//! Serial port access: opening the flight controller port and picking it when
//! the operator did not name one.

use std::time::Duration;

use tokio_serial::{
    DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialPortInfo, SerialPortType, SerialStream,
    StopBits,
};

use crate::error::{Error, Result};

/// Baud rate of the flight controller CLI
pub const CONTROL_BAUD_RATE: u32 = 115_200;

const CONTROL_PORT_TIMEOUT: Duration = Duration::from_secs(1);

/// Open `port_name` at the CLI baud rate, 8N1 without flow control
///
/// Must be called from within a tokio runtime.
pub fn open_control_port(port_name: &str) -> Result<SerialStream> {
    let port = tokio_serial::new(port_name, CONTROL_BAUD_RATE)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(CONTROL_PORT_TIMEOUT)
        .open_native_async()?;
    Ok(port)
}

/// Find the flight controller serial port
///
/// USB ports are preferred over anything else. Exactly one candidate must
/// remain, otherwise the operator has to name the port.
///
/// # Errors
///
/// [`Error::PortNotFound`] when there is no candidate or more than one
pub fn find_serial_port() -> Result<String> {
    let ports = tokio_serial::available_ports()?;
    select_port(ports)
}

fn select_port(ports: Vec<SerialPortInfo>) -> Result<String> {
    // On macOS only the cu.* (calling unit) devices are usable for outgoing connections
    let ports: Vec<SerialPortInfo> = ports
        .into_iter()
        .filter(|p| !(cfg!(target_os = "macos") && p.port_name.starts_with("/dev/tty.")))
        .collect();

    let (usb, other): (Vec<_>, Vec<_>) = ports
        .into_iter()
        .partition(|p| matches!(p.port_type, SerialPortType::UsbPort(_)));
    let mut candidates = if usb.is_empty() { other } else { usb };

    match candidates.len() {
        0 => Err(Error::PortNotFound("no serial port found".to_string())),
        1 => Ok(candidates.remove(0).port_name),
        _ => {
            let names: Vec<String> = candidates.into_iter().map(|p| p.port_name).collect();
            Err(Error::PortNotFound(format!(
                "several candidates ({}), select one with --port",
                names.join(", ")
            )))
        }
    }
}
