//! Fake Betaflight flight controller for handshake tests.

#![allow(dead_code)]

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};
use tokio::task::JoinHandle;

pub const CLI_BANNER: &str = "\r\nEntering CLI Mode, type 'exit' to return, or 'help'\r\n\r\n# ";

/// Everything the fake flight controller received during a session.
#[derive(Debug, Default)]
pub struct Recording {
    /// Received lines, without line endings
    pub commands: Vec<String>,
    /// Received bytes, as sent by the host
    pub raw: Vec<u8>,
}

/// Serial receiver settings and UART listing reported by the fake CLI.
#[derive(Debug, Clone)]
pub struct FcSettings {
    pub provider: &'static str,
    pub inverted: &'static str,
    pub halfduplex: &'static str,
    pub serial: Vec<&'static str>,
}

impl Default for FcSettings {
    fn default() -> Self {
        FcSettings {
            provider: "CRSF",
            inverted: "OFF",
            halfduplex: "OFF",
            serial: vec![
                "serial 20 1 115200 57600 0 115200",
                "serial 0 0 115200 57600 0 115200",
                "serial 1 64 9600 57600 0 115200",
            ],
        }
    }
}

fn get_reply(name: &str, value: &str) -> String {
    format!(
        "{} = {}\r\nAllowed values: OFF, ON\r\nDefault value: OFF\r\n\r\n# ",
        name, value
    )
}

/// CLI responder answering like a Betaflight 4.x target.
pub fn betaflight(settings: FcSettings) -> impl FnMut(&str) -> Option<String> + Send + 'static {
    move |command| match command {
        "#" => Some(CLI_BANNER.to_string()),
        "get serialrx_provider" => Some(get_reply("serialrx_provider", settings.provider)),
        "get serialrx_inverted" => Some(get_reply("serialrx_inverted", settings.inverted)),
        "get serialrx_halfduplex" => Some(get_reply("serialrx_halfduplex", settings.halfduplex)),
        "serial" => Some(format!("{}\r\n\r\n# ", settings.serial.join("\r\n"))),
        _ => None,
    }
}

/// Wrap a responder so every command is echoed back first, as on a half duplex wire.
pub fn echoing<F>(mut respond: F) -> impl FnMut(&str) -> Option<String> + Send + 'static
where
    F: FnMut(&str) -> Option<String> + Send + 'static,
{
    move |command| Some(format!("{}\r\n{}", command, respond(command).unwrap_or_default()))
}

/// Spawn a fake flight controller on one end of an in-memory pipe.
///
/// Returns the host end and a handle resolving to the session recording once
/// the host end is closed or dropped.
pub fn spawn_fc<F>(mut respond: F) -> (DuplexStream, JoinHandle<Recording>)
where
    F: FnMut(&str) -> Option<String> + Send + 'static,
{
    let (host, mut device) = duplex(4096);

    let handle = tokio::spawn(async move {
        let mut recording = Recording::default();
        let mut pending = Vec::new();
        let mut chunk = [0u8; 256];

        loop {
            let n = match device.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            recording.raw.extend_from_slice(&chunk[..n]);
            pending.extend_from_slice(&chunk[..n]);

            while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                let command = String::from_utf8_lossy(&line).trim().to_string();
                let reply = respond(&command);
                recording.commands.push(command);
                if let Some(reply) = reply {
                    // The host may already be gone after the last command
                    let _ = device.write_all(reply.as_bytes()).await;
                }
            }
        }
        recording
    });

    (host, handle)
}

/// Wait for the fake flight controller to see the host end closed.
pub async fn finished(handle: JoinHandle<Recording>) -> Recording {
    tokio::time::timeout(Duration::from_secs(30), handle)
        .await
        .expect("host end of the link was not closed")
        .expect("fake flight controller panicked")
}
