//! Relay card capability contract.
//!
//! Every driver backend implements [`RelayBackend`]: probe for attached
//! cards, read one channel, write one channel. The dispatcher and the
//! controller only ever talk to a card through this trait, so adding a
//! backend never changes the contract.
//!
//! ```text
//!            ┌──────────────────────────────┐
//!            │          Discovery           │
//!            └──────────────┬───────────────┘
//!                           │ probe / detect
//!      ┌────────────────────┼─────────────────────┐
//!  ┌───▼────┐          ┌────▼─────┐          ┌────▼────┐
//!  │  Gpio  │          │  Serial  │          │ Virtual │
//!  │ sysfs  │          │ ttyUSB*  │          │ memory  │
//!  └────────┘          └──────────┘          └─────────┘
//! ```

pub mod gpio;
pub mod serial;
pub mod sim;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crelay_config::{AppConfig, MAX_NUM_RELAYS};

use crate::BoxFuture;

pub use gpio::GpioBackend;
pub use serial::SerialBackend;
pub use sim::VirtualBackend;

/// Errors reported by a card backend.
#[derive(Debug, thiserror::Error)]
pub enum CardError {
    #[error("no {0} card found")]
    NotFound(CardType),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected reply from {path}: {message}")]
    Protocol { path: PathBuf, message: String },

    #[error("refusing to write state {0} to hardware")]
    InvalidState(RelayState),
}

impl CardError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Supported hardware families, in discovery priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CardType {
    /// Relays wired to GPIO pins, driven through Linux sysfs.
    Gpio,
    /// USB-serial relay modules (CH340 "LCUS" family).
    Serial,
    /// Simulated in-memory card.
    Virtual,
}

impl CardType {
    /// All card types, in probe order.
    pub const ALL: [CardType; 3] = [CardType::Gpio, CardType::Serial, CardType::Virtual];

    /// Human-readable card family name.
    pub fn display_name(&self) -> &'static str {
        match self {
            CardType::Gpio => "Generic GPIO relays",
            CardType::Serial => "LCUS USB-serial relay module",
            CardType::Virtual => "Virtual relay card",
        }
    }
}

impl fmt::Display for CardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardType::Gpio => write!(f, "gpio"),
            CardType::Serial => write!(f, "serial"),
            CardType::Virtual => write!(f, "virtual"),
        }
    }
}

/// State of one relay channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayState {
    Off,
    On,
    /// Not yet determined. Never a hardware state and never written.
    Invalid,
}

impl RelayState {
    /// Numeric code used on the HTTP API (`0` off, `1` on).
    pub fn code(&self) -> u8 {
        match self {
            RelayState::Off => 0,
            RelayState::On => 1,
            RelayState::Invalid => 3,
        }
    }

    /// The opposite switching state. `Invalid` has no opposite.
    pub fn inverted(&self) -> RelayState {
        match self {
            RelayState::Off => RelayState::On,
            RelayState::On => RelayState::Off,
            RelayState::Invalid => RelayState::Invalid,
        }
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayState::Off => write!(f, "off"),
            RelayState::On => write!(f, "on"),
            RelayState::Invalid => write!(f, "invalid"),
        }
    }
}

/// A relay channel number already checked against a card's relay count.
///
/// Obtain one through [`RelayCard::channel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Channel(u8);

impl Channel {
    /// One-based channel number.
    pub fn number(&self) -> u8 {
        self.0
    }

    /// Zero-based index, for slice access.
    pub fn index(&self) -> usize {
        usize::from(self.0) - 1
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One physical relay card found by discovery.
///
/// Read-only for the rest of the request and never cached across requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayCard {
    /// Hardware family.
    pub card_type: CardType,
    /// Communication path (device node, sysfs root, ...).
    pub path: String,
    /// Serial identifier, if the card has one.
    pub serial: Option<String>,
    /// Number of relay channels, `1..=MAX_NUM_RELAYS`.
    pub relay_count: u8,
}

impl RelayCard {
    /// Validate a requested channel number against this card.
    ///
    /// Returns `None` when `number` is outside `1..=relay_count`.
    pub fn channel(&self, number: u32) -> Option<Channel> {
        if number >= 1 && number <= u32::from(self.relay_count) {
            u8::try_from(number).ok().map(Channel)
        } else {
            None
        }
    }

    /// Every channel of this card in ascending order.
    pub fn channels(&self) -> impl Iterator<Item = Channel> + '_ {
        (1..=self.relay_count).map(Channel)
    }

    /// Whether this card satisfies an optional serial filter.
    pub fn matches_serial(&self, filter: Option<&str>) -> bool {
        match filter {
            None => true,
            Some(wanted) => self.serial.as_deref() == Some(wanted),
        }
    }
}

/// Driver backend for one [`CardType`].
///
/// Implementations must be `Send + Sync` for use from the HTTP server.
/// Uses [`BoxFuture`] so backends can be held as `Box<dyn RelayBackend>`.
pub trait RelayBackend: Send + Sync {
    /// Card family this backend drives.
    fn card_type(&self) -> CardType;

    /// Enumerate every card of this type that is currently reachable.
    ///
    /// An empty list means no hardware is attached.
    fn probe(&self) -> BoxFuture<'_, Result<Vec<RelayCard>, CardError>>;

    /// Read the current state of one channel without side effects.
    fn get<'a>(
        &'a self,
        card: &'a RelayCard,
        channel: Channel,
    ) -> BoxFuture<'a, Result<RelayState, CardError>>;

    /// Write the state of one channel. Writing the current state is a no-op
    /// that still succeeds.
    fn set<'a>(
        &'a self,
        card: &'a RelayCard,
        channel: Channel,
        state: RelayState,
    ) -> BoxFuture<'a, Result<(), CardError>>;

    /// Probe and return the first card whose serial matches `serial_filter`.
    fn detect<'a>(
        &'a self,
        serial_filter: Option<&'a str>,
    ) -> BoxFuture<'a, Result<RelayCard, CardError>> {
        Box::pin(async move {
            let cards = self.probe().await?;
            cards
                .into_iter()
                .find(|card| card.matches_serial(serial_filter))
                .ok_or(CardError::NotFound(self.card_type()))
        })
    }
}

/// Build the compiled-in backends enabled by the configuration, in probe
/// order.
pub fn backends_from_config(config: &AppConfig) -> Vec<Box<dyn RelayBackend>> {
    let mut backends: Vec<Box<dyn RelayBackend>> = Vec::new();

    if !config.gpio_pins().is_empty() {
        backends.push(Box::new(GpioBackend::new(
            &config.gpio.sysfs_root,
            config.gpio_pins().to_vec(),
            config.gpio.active_value,
        )));
    }
    if config.serial.enabled {
        backends.push(Box::new(SerialBackend::new(
            &config.serial.device_dir,
            &config.serial.device_prefix,
            config.serial.num_relays,
            Duration::from_millis(config.serial.response_timeout_ms),
        )));
    }
    if config.virtual_card.num_relays > 0 {
        backends.push(Box::new(VirtualBackend::new(
            &config.virtual_card.serial,
            config.virtual_card.num_relays,
        )));
    }

    backends
}

/// Clamp a relay count reported by hardware to the supported range.
pub(crate) fn clamp_relay_count(count: u8) -> u8 {
    count.min(MAX_NUM_RELAYS as u8)
}
