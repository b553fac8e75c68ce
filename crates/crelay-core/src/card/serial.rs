//! USB-serial relay modules (CH340 "LCUS" family).
//!
//! The module listens on a USB-serial device node at 9600 8N1. Switching a
//! relay is a four byte frame `A0 <channel> <state> <checksum>`; the single
//! byte `FF` asks for a status reply with one `CH<n>:ON|OFF` line per relay.
//!
//! The port is opened per operation and closed when it returns.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::debug;

use crate::BoxFuture;

use super::{CardError, CardType, Channel, RelayBackend, RelayCard, RelayState};

/// Frame start byte.
const FRAME_HEADER: u8 = 0xA0;

/// Status query command.
const STATUS_QUERY: u8 = 0xFF;

/// Line speed of the LCUS modules.
const BAUD_RATE: u32 = 9600;

/// Default sysfs class directory used to look up USB serial numbers.
const TTY_SYSFS_ROOT: &str = "/sys/class/tty";

/// Encode the frame that switches `channel` to `state`.
pub fn switch_frame(channel: Channel, state: RelayState) -> Result<[u8; 4], CardError> {
    let value = match state {
        RelayState::On => 0x01,
        RelayState::Off => 0x00,
        RelayState::Invalid => return Err(CardError::InvalidState(state)),
    };
    let ch = channel.number();
    let checksum = FRAME_HEADER.wrapping_add(ch).wrapping_add(value);
    Ok([FRAME_HEADER, ch, value, checksum])
}

/// Find the state of `channel` in a status reply.
pub fn parse_status(reply: &str, channel: Channel) -> Option<RelayState> {
    reply.lines().find_map(|line| {
        let (name, state) = line.trim().split_once(':')?;
        let number: u8 = name.trim().strip_prefix("CH")?.parse().ok()?;
        if number != channel.number() {
            return None;
        }
        match state.trim().to_ascii_uppercase().as_str() {
            "ON" => Some(RelayState::On),
            "OFF" => Some(RelayState::Off),
            _ => None,
        }
    })
}

/// Backend for USB-serial relay modules.
#[derive(Debug, Clone)]
pub struct SerialBackend {
    device_dir: PathBuf,
    prefix: String,
    num_relays: u8,
    timeout: Duration,
    tty_root: PathBuf,
}

impl SerialBackend {
    pub fn new(device_dir: impl Into<PathBuf>, prefix: &str, num_relays: u8, timeout: Duration) -> Self {
        Self {
            device_dir: device_dir.into(),
            prefix: prefix.to_string(),
            num_relays: super::clamp_relay_count(num_relays.max(1)),
            timeout,
            tty_root: PathBuf::from(TTY_SYSFS_ROOT),
        }
    }

    /// Builder: look up USB serial numbers under a different sysfs root.
    pub fn with_tty_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.tty_root = root.into();
        self
    }

    /// USB serial number of the adapter behind `node`, falling back to the
    /// node name when sysfs does not expose one.
    async fn serial_for(&self, node: &str) -> String {
        let path = self.tty_root.join(node).join("device/../../serial");
        match tokio::fs::read_to_string(&path).await {
            Ok(s) if !s.trim().is_empty() => s.trim().to_string(),
            _ => node.to_string(),
        }
    }

    async fn candidate_nodes(&self) -> Vec<String> {
        let mut nodes = Vec::new();
        let Ok(mut entries) = tokio::fs::read_dir(&self.device_dir).await else {
            return nodes;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(&self.prefix) {
                nodes.push(name);
            }
        }
        nodes.sort();
        nodes
    }

    /// Check that the node can be opened read-write, without touching the
    /// line settings.
    async fn accessible(path: &Path) -> Result<(), CardError> {
        tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .await
            .map(drop)
            .map_err(|e| CardError::io(path, e))
    }

    /// Open the port in raw 9600 8N1 mode.
    fn open_port(path: &Path) -> Result<SerialStream, CardError> {
        tokio_serial::new(path.to_string_lossy(), BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()
            .map_err(|e| CardError::io(path, e.into()))
    }

    /// Collect a status reply until every relay has reported or the
    /// response timeout expires.
    async fn read_reply(&self, port: &mut SerialStream, path: &Path) -> Result<String, CardError> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 64];
        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            match tokio::time::timeout_at(deadline, port.read(&mut chunk)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => {
                    buf.extend_from_slice(&chunk[..n]);
                    let lines = buf.iter().filter(|b| **b == b'\n').count();
                    if lines >= usize::from(self.num_relays) {
                        break;
                    }
                }
                Ok(Err(e)) => return Err(CardError::io(path, e)),
                Err(_) if buf.is_empty() => {
                    return Err(CardError::io(
                        path,
                        std::io::Error::new(std::io::ErrorKind::TimedOut, "no status reply"),
                    ));
                }
                Err(_) => break,
            }
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

impl RelayBackend for SerialBackend {
    fn card_type(&self) -> CardType {
        CardType::Serial
    }

    fn probe(&self) -> BoxFuture<'_, Result<Vec<RelayCard>, CardError>> {
        Box::pin(async move {
            let mut cards = Vec::new();
            for node in self.candidate_nodes().await {
                let path = self.device_dir.join(&node);
                if let Err(e) = Self::accessible(&path).await {
                    // Usually a permissions problem: the node belongs to a group
                    // (dialout, uucp) the caller is not a member of.
                    debug!(path = %path.display(), error = %e, "Skipping serial node");
                    continue;
                }
                cards.push(RelayCard {
                    card_type: CardType::Serial,
                    path: path.display().to_string(),
                    serial: Some(self.serial_for(&node).await),
                    relay_count: self.num_relays,
                });
            }
            Ok(cards)
        })
    }

    fn get<'a>(
        &'a self,
        card: &'a RelayCard,
        channel: Channel,
    ) -> BoxFuture<'a, Result<RelayState, CardError>> {
        Box::pin(async move {
            let path = PathBuf::from(&card.path);
            let mut port = Self::open_port(&path)?;
            port.write_all(&[STATUS_QUERY])
                .await
                .map_err(|e| CardError::io(&path, e))?;
            port.flush().await.map_err(|e| CardError::io(&path, e))?;

            let reply = self.read_reply(&mut port, &path).await?;
            parse_status(&reply, channel).ok_or_else(|| CardError::Protocol {
                path,
                message: format!("no status for relay {channel} in reply {reply:?}"),
            })
        })
    }

    fn set<'a>(
        &'a self,
        card: &'a RelayCard,
        channel: Channel,
        state: RelayState,
    ) -> BoxFuture<'a, Result<(), CardError>> {
        Box::pin(async move {
            let frame = switch_frame(channel, state)?;
            let path = PathBuf::from(&card.path);
            let mut port = Self::open_port(&path)?;
            debug!(backend = "serial", path = %path.display(), %channel, %state, "Set relay");
            port.write_all(&frame)
                .await
                .map_err(|e| CardError::io(&path, e))?;
            port.flush().await.map_err(|e| CardError::io(&path, e))
        })
    }
}
