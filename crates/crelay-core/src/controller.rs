//! Relay state transitions against one resolved card.

use std::time::Duration;

use tracing::{info, warn};

use crate::card::{CardError, Channel, RelayBackend, RelayCard, RelayState};
use crate::error::RelayError;

/// Get, set and pulse operations on the channels of one card.
///
/// Every operation validates the channel number before touching hardware.
pub struct RelayController<'a> {
    backend: &'a dyn RelayBackend,
    card: &'a RelayCard,
}

impl<'a> RelayController<'a> {
    pub fn new(backend: &'a dyn RelayBackend, card: &'a RelayCard) -> Self {
        Self { backend, card }
    }

    pub fn card(&self) -> &RelayCard {
        self.card
    }

    fn channel(&self, number: u32) -> Result<Channel, RelayError> {
        self.card
            .channel(number)
            .ok_or(RelayError::ChannelOutOfRange {
                channel: number,
                relay_count: self.card.relay_count,
            })
    }

    /// Current state of one channel. Read failures are reported, not retried.
    pub async fn query(&self, number: u32) -> Result<RelayState, RelayError> {
        let channel = self.channel(number)?;
        Ok(self.backend.get(self.card, channel).await?)
    }

    /// Switch a channel and return the state read back afterwards.
    pub async fn apply(&self, number: u32, target: RelayState) -> Result<RelayState, RelayError> {
        let channel = self.channel(number)?;
        if target == RelayState::Invalid {
            return Err(CardError::InvalidState(target).into());
        }
        self.backend.set(self.card, channel, target).await?;
        Ok(self.backend.get(self.card, channel).await?)
    }

    /// Invert a channel for `duration`, then restore it.
    ///
    /// Blocks the caller for the whole pulse and cannot be cancelled. A
    /// channel whose state cannot be read is treated as off. If either write
    /// fails the sequence stops there, so the channel may be left inverted.
    pub async fn pulse(&self, number: u32, duration: Duration) -> Result<RelayState, RelayError> {
        let channel = self.channel(number)?;
        let before = match self.backend.get(self.card, channel).await {
            Ok(state) => state,
            Err(e) => {
                warn!(%channel, error = %e, "State unknown before pulse, assuming off");
                RelayState::Off
            }
        };
        let restore = match before {
            RelayState::On => RelayState::On,
            _ => RelayState::Off,
        };
        let during = restore.inverted();

        info!(%channel, from = %restore, to = %during, duration_ms = duration.as_millis() as u64, "Pulse");
        self.backend.set(self.card, channel, during).await?;
        tokio::time::sleep(duration).await;
        self.backend.set(self.card, channel, restore).await?;

        Ok(self.backend.get(self.card, channel).await?)
    }

    /// State of every channel, in channel order.
    pub async fn snapshot(&self) -> Result<Vec<(Channel, RelayState)>, RelayError> {
        let mut states = Vec::with_capacity(usize::from(self.card.relay_count));
        for channel in self.card.channels() {
            states.push((channel, self.backend.get(self.card, channel).await?));
        }
        Ok(states)
    }
}
