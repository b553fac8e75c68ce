//! Transport-independent request execution.
//!
//! Every request runs the same steps: resolve a card, validate the channel,
//! act through the controller, then read back every channel so callers
//! always render a complete table.

use std::fmt::Write as _;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crelay_config::AppConfig;

use crate::card::{Channel, RelayBackend, RelayCard, RelayState};
use crate::command::{Action, Command};
use crate::discovery::Discovery;
use crate::error::RelayError;

/// Relay table of one card after a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub card: RelayCard,
    /// Channel the request addressed, if any.
    pub target: Option<Channel>,
    /// State of every channel, in channel order.
    pub channels: Vec<(Channel, RelayState)>,
}

impl Snapshot {
    pub fn state_of(&self, channel: Channel) -> Option<RelayState> {
        self.channels
            .iter()
            .find(|(c, _)| *c == channel)
            .map(|(_, s)| *s)
    }

    /// Plain-text API rendering, one `Relay N:S` line per channel.
    pub fn to_table(&self) -> String {
        let mut out = String::new();
        for (channel, state) in &self.channels {
            let _ = writeln!(out, "Relay {channel}:{}", state.code());
        }
        out
    }
}

/// Result of a successfully dispatched request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Every attached card (`ListCards`).
    Cards(Vec<RelayCard>),
    /// The resolved card (`Info`).
    Card(RelayCard),
    /// Relay table after a query, set or pulse.
    Snapshot(Snapshot),
}

/// Executes [`Command`]s against the attached hardware.
///
/// Holds one async mutex for the whole of each request, so hardware access
/// from concurrent requests never overlaps. A pulse keeps it for its full
/// duration and later requests wait behind it.
pub struct Dispatcher {
    discovery: Discovery,
    pulse_duration: Duration,
    hardware: Mutex<()>,
}

impl Dispatcher {
    pub fn new(discovery: Discovery, pulse_duration: Duration) -> Self {
        Self {
            discovery,
            pulse_duration,
            hardware: Mutex::new(()),
        }
    }

    /// Dispatcher over the backends enabled by `config`.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(Discovery::from_config(config), config.pulse_duration())
    }

    /// Dispatcher over an explicit backend list.
    pub fn with_backends(backends: Vec<Box<dyn RelayBackend>>, pulse_duration: Duration) -> Self {
        Self::new(Discovery::new(backends), pulse_duration)
    }

    pub fn pulse_duration(&self) -> Duration {
        self.pulse_duration
    }

    pub fn discovery(&self) -> &Discovery {
        &self.discovery
    }

    /// Run one request to completion.
    pub async fn dispatch(&self, command: &Command) -> Result<Outcome, RelayError> {
        let _hardware = self.hardware.lock().await;
        let serial = command.serial.as_deref();
        debug!(action = ?command.action, serial, "Dispatching");

        match command.action {
            Action::ListCards => {
                let cards = self.discovery.detect_all(serial).collect().await;
                if cards.is_empty() {
                    return Err(RelayError::NoDeviceFound {
                        serial: command.serial.clone(),
                    });
                }
                Ok(Outcome::Cards(cards))
            }
            Action::Info => {
                let resolved = self.discovery.detect_first(serial).await?;
                Ok(Outcome::Card(resolved.card))
            }
            Action::Query(_) | Action::SetState(..) | Action::Pulse(_) => {
                let resolved = self.discovery.detect_first(serial).await?;
                let card = &resolved.card;

                let target = match command.action.channel() {
                    Some(number) => Some(card.channel(number).ok_or(
                        RelayError::ChannelOutOfRange {
                            channel: number,
                            relay_count: card.relay_count,
                        },
                    )?),
                    None => None,
                };

                let controller = resolved.controller();
                match command.action {
                    Action::SetState(number, state) => {
                        let observed = controller.apply(number, state).await?;
                        info!(card_type = %card.card_type, channel = number, %observed, "Relay switched");
                    }
                    Action::Pulse(number) => {
                        controller.pulse(number, self.pulse_duration).await?;
                    }
                    _ => {}
                }

                let channels = controller.snapshot().await?;
                Ok(Outcome::Snapshot(Snapshot {
                    card: card.clone(),
                    target,
                    channels,
                }))
            }
        }
    }
}
