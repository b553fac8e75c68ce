//! Request normalisation.
//!
//! Command-line arguments and HTTP form parameters are both reduced to a
//! [`Command`], the only thing the dispatcher understands.

use crate::card::RelayState;
use crate::error::RelayError;

/// HTTP `status` value requesting a pulse.
pub const PULSE_CODE: i64 = 2;

/// What a request asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Enumerate every attached card.
    ListCards,
    /// Describe the resolved card.
    Info,
    /// Read relay states. `None` asks for the full table without naming a
    /// channel.
    Query(Option<u32>),
    /// Switch one channel on or off.
    SetState(u32, RelayState),
    /// Momentarily invert one channel.
    Pulse(u32),
}

impl Action {
    /// Channel number the action addresses, if any.
    pub fn channel(&self) -> Option<u32> {
        match self {
            Action::Query(channel) => *channel,
            Action::SetState(channel, _) | Action::Pulse(channel) => Some(*channel),
            Action::ListCards | Action::Info => None,
        }
    }
}

/// A normalised request: an action plus an optional card serial filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub action: Action,
    pub serial: Option<String>,
}

impl Command {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            serial: None,
        }
    }

    /// Builder: restrict the request to the card with this serial.
    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }

    /// Parse command-line arguments (program name and global flags already
    /// removed).
    ///
    /// ```text
    /// -i                          list cards
    /// [-s SERIAL] info            describe card
    /// [-s SERIAL] CHANNEL         query
    /// [-s SERIAL] CHANNEL on|off|pulse
    /// ```
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Result<Self, RelayError> {
        let mut serial = None;
        let mut words = Vec::new();
        let mut iter = args.iter().map(AsRef::as_ref);
        while let Some(arg) = iter.next() {
            if arg == "-s" {
                let value = iter
                    .next()
                    .ok_or_else(|| RelayError::MalformedRequest("-s needs a serial number".into()))?;
                serial = Some(value.to_string());
            } else {
                words.push(arg);
            }
        }

        let action = match words.as_slice() {
            [] => return Err(RelayError::MalformedRequest("missing command".into())),
            ["-i"] => Action::ListCards,
            ["info"] => Action::Info,
            [channel] => Action::Query(Some(parse_channel(channel)?)),
            [channel, state] => {
                let channel = parse_channel(channel)?;
                match state.to_ascii_lowercase().as_str() {
                    "on" => Action::SetState(channel, RelayState::On),
                    "off" => Action::SetState(channel, RelayState::Off),
                    "pulse" => Action::Pulse(channel),
                    other => {
                        return Err(RelayError::MalformedRequest(format!(
                            "unknown relay state {other:?}"
                        )));
                    }
                }
            }
            _ => return Err(RelayError::MalformedRequest("too many arguments".into())),
        };
        Ok(Self { action, serial })
    }

    /// Decode HTTP parameters (`pin`, `status`, `serial`) from a query string
    /// or form body.
    ///
    /// Never fails. Anything that does not name a channel and a known status
    /// becomes a plain status query, so partial or exploratory clients still
    /// get the relay table.
    pub fn from_form(input: &str) -> Self {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(input).unwrap_or_default();
        let field = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.trim())
        };

        let pin = field("pin")
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|pin| *pin != 0);
        let status = field("status").and_then(|v| v.parse::<i64>().ok());
        let serial = field("serial")
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let action = match (pin, status) {
            (Some(pin), Some(0)) => Action::SetState(pin, RelayState::Off),
            (Some(pin), Some(1)) => Action::SetState(pin, RelayState::On),
            (Some(pin), Some(PULSE_CODE)) => Action::Pulse(pin),
            _ => Action::Query(None),
        };
        Self { action, serial }
    }
}

fn parse_channel(word: &str) -> Result<u32, RelayError> {
    word.parse()
        .map_err(|_| RelayError::MalformedRequest(format!("invalid relay number {word:?}")))
}
