//! Simulated (virtual) relay card.
//!
//! Keeps relay states in memory for the lifetime of the process. Useful for
//! demos and for exercising the web page without hardware attached.

use std::sync::Mutex;

use crate::BoxFuture;

use super::{CardError, CardType, Channel, RelayBackend, RelayCard, RelayState, clamp_relay_count};

/// In-memory relay card backend.
#[derive(Debug)]
pub struct VirtualBackend {
    serial: String,
    states: Mutex<Vec<RelayState>>,
}

impl VirtualBackend {
    /// Create a simulated card with `num_relays` channels, all off.
    pub fn new(serial: &str, num_relays: u8) -> Self {
        let count = clamp_relay_count(num_relays.max(1));
        Self {
            serial: serial.to_string(),
            states: Mutex::new(vec![RelayState::Off; usize::from(count)]),
        }
    }

    fn relay_count(&self) -> u8 {
        self.states.lock().map(|s| s.len() as u8).unwrap_or(0)
    }

    fn card(&self) -> RelayCard {
        RelayCard {
            card_type: CardType::Virtual,
            path: "memory".to_string(),
            serial: Some(self.serial.clone()),
            relay_count: self.relay_count(),
        }
    }

    fn poisoned() -> CardError {
        CardError::io(
            "memory",
            std::io::Error::other("virtual card state lock poisoned"),
        )
    }
}

impl RelayBackend for VirtualBackend {
    fn card_type(&self) -> CardType {
        CardType::Virtual
    }

    fn probe(&self) -> BoxFuture<'_, Result<Vec<RelayCard>, CardError>> {
        Box::pin(async move { Ok(vec![self.card()]) })
    }

    fn get<'a>(
        &'a self,
        _card: &'a RelayCard,
        channel: Channel,
    ) -> BoxFuture<'a, Result<RelayState, CardError>> {
        Box::pin(async move {
            let states = self.states.lock().map_err(|_| Self::poisoned())?;
            states
                .get(channel.index())
                .copied()
                .ok_or_else(|| CardError::Protocol {
                    path: "memory".into(),
                    message: format!("no relay {channel}"),
                })
        })
    }

    fn set<'a>(
        &'a self,
        _card: &'a RelayCard,
        channel: Channel,
        state: RelayState,
    ) -> BoxFuture<'a, Result<(), CardError>> {
        Box::pin(async move {
            if state == RelayState::Invalid {
                return Err(CardError::InvalidState(state));
            }
            let mut states = self.states.lock().map_err(|_| Self::poisoned())?;
            match states.get_mut(channel.index()) {
                Some(slot) => {
                    tracing::debug!(backend = "virtual", %channel, %state, "Set relay");
                    *slot = state;
                    Ok(())
                }
                None => Err(CardError::Protocol {
                    path: "memory".into(),
                    message: format!("no relay {channel}"),
                }),
            }
        })
    }
}
