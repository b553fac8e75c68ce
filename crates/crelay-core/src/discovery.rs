//! Card discovery across every compiled-in backend.
//!
//! Backends are tried in [`CardType`](crate::card::CardType) priority order.
//! Nothing is cached: every request re-resolves its card, since relay
//! modules are hot-pluggable.

use tracing::{debug, warn};

use crelay_config::AppConfig;

use crate::card::{CardError, RelayBackend, RelayCard, backends_from_config};
use crate::controller::RelayController;
use crate::error::RelayError;

/// A detected card together with the backend that drives it.
pub struct Resolved<'a> {
    pub card: RelayCard,
    pub backend: &'a dyn RelayBackend,
}

impl<'a> Resolved<'a> {
    /// Controller bound to this card.
    pub fn controller(&self) -> RelayController<'_> {
        RelayController::new(self.backend, &self.card)
    }
}

impl std::fmt::Debug for Resolved<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolved")
            .field("card", &self.card)
            .field("backend", &self.backend.card_type())
            .finish()
    }
}

/// Ordered set of backends to probe.
pub struct Discovery {
    backends: Vec<Box<dyn RelayBackend>>,
}

impl Discovery {
    /// Use the given backends, probed in the order supplied.
    pub fn new(backends: Vec<Box<dyn RelayBackend>>) -> Self {
        Self { backends }
    }

    /// Backends enabled by the configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(backends_from_config(config))
    }

    /// Number of backends that will be probed.
    pub fn backend_count(&self) -> usize {
        self.backends.len()
    }

    /// Return the first card that matches `serial`, in backend priority
    /// order.
    ///
    /// Backends that fail to probe are logged and skipped; only after every
    /// backend has been tried is [`RelayError::NoDeviceFound`] returned.
    pub async fn detect_first(&self, serial: Option<&str>) -> Result<Resolved<'_>, RelayError> {
        for backend in &self.backends {
            match backend.detect(serial).await {
                Ok(card) => {
                    debug!(card_type = %card.card_type, path = %card.path, "Card detected");
                    return Ok(Resolved {
                        card,
                        backend: backend.as_ref(),
                    });
                }
                Err(CardError::NotFound(card_type)) => {
                    debug!(%card_type, "No card of this type");
                }
                Err(e) => {
                    warn!(card_type = %backend.card_type(), error = %e, "Probe failed");
                }
            }
        }
        Err(RelayError::NoDeviceFound {
            serial: serial.map(str::to_string),
        })
    }

    /// Scan every backend for cards matching `serial`.
    ///
    /// The returned cursor probes lazily, one backend at a time. Call again
    /// to restart the scan from the first backend.
    pub fn detect_all<'a>(&'a self, serial: Option<&'a str>) -> CardScan<'a> {
        CardScan {
            backends: self.backends.iter(),
            pending: Vec::new().into_iter(),
            current: None,
            serial,
        }
    }
}

/// Lazy cursor over every detected card. See [`Discovery::detect_all`].
pub struct CardScan<'a> {
    backends: std::slice::Iter<'a, Box<dyn RelayBackend>>,
    pending: std::vec::IntoIter<RelayCard>,
    current: Option<&'a dyn RelayBackend>,
    serial: Option<&'a str>,
}

impl<'a> CardScan<'a> {
    /// Next matching card, or `None` once every backend has been probed.
    pub async fn next(&mut self) -> Option<Resolved<'a>> {
        loop {
            if let (Some(card), Some(backend)) = (self.pending.next(), self.current) {
                return Some(Resolved { card, backend });
            }
            let backend = self.backends.next()?;
            self.current = Some(backend.as_ref());
            match backend.probe().await {
                Ok(cards) => {
                    let serial = self.serial;
                    self.pending = cards
                        .into_iter()
                        .filter(|card| card.matches_serial(serial))
                        .collect::<Vec<_>>()
                        .into_iter();
                }
                Err(e) => {
                    warn!(card_type = %backend.card_type(), error = %e, "Probe failed");
                    self.pending = Vec::new().into_iter();
                }
            }
        }
    }

    /// Drain the scan into a list of cards.
    pub async fn collect(mut self) -> Vec<RelayCard> {
        let mut cards = Vec::new();
        while let Some(resolved) = self.next().await {
            cards.push(resolved.card);
        }
        cards
    }
}
