//! Linux sysfs GPIO backend.
//!
//! Each relay channel is wired to one GPIO pin. Pins are exported through
//! `<root>/export` on first detection and switched by writing the `value`
//! file of `<root>/gpioN`. Boards differ in polarity, so the pin level that
//! energises a relay is configurable (`active_value`).

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::BoxFuture;

use super::{CardError, CardType, Channel, RelayBackend, RelayCard, RelayState};

/// GPIO sysfs relay backend.
#[derive(Debug, Clone)]
pub struct GpioBackend {
    root: PathBuf,
    pins: Vec<u32>,
    active_value: u8,
}

impl GpioBackend {
    /// Create a backend driving `pins` (one per channel) under `root`.
    pub fn new(root: impl Into<PathBuf>, pins: Vec<u32>, active_value: u8) -> Self {
        Self {
            root: root.into(),
            pins,
            active_value: active_value.min(1),
        }
    }

    fn pin_dir(&self, pin: u32) -> PathBuf {
        self.root.join(format!("gpio{pin}"))
    }

    fn value_path(&self, channel: Channel) -> Option<PathBuf> {
        self.pins
            .get(channel.index())
            .map(|pin| self.pin_dir(*pin).join("value"))
    }

    /// Export a pin if needed and configure it as an output.
    ///
    /// The direction is only written right after export, because writing
    /// `out` to an already configured pin drives it low.
    async fn prepare_pin(&self, pin: u32) -> Result<(), CardError> {
        let dir = self.pin_dir(pin);
        if !dir.exists() {
            let export = self.root.join("export");
            debug!(pin, path = %export.display(), "Exporting GPIO pin");
            write_sysfs(&export, &pin.to_string()).await?;
            if !dir.exists() {
                return Err(CardError::io(
                    &dir,
                    std::io::Error::new(std::io::ErrorKind::NotFound, "pin did not appear after export"),
                ));
            }
            write_sysfs(&dir.join("direction"), "out").await?;
        }
        let value = dir.join("value");
        if !value.exists() {
            return Err(CardError::io(
                &value,
                std::io::Error::new(std::io::ErrorKind::NotFound, "missing value file"),
            ));
        }
        Ok(())
    }

    fn level_for(&self, state: RelayState) -> Result<u8, CardError> {
        match state {
            RelayState::On => Ok(self.active_value),
            RelayState::Off => Ok(1 - self.active_value),
            RelayState::Invalid => Err(CardError::InvalidState(state)),
        }
    }

    fn missing_pin(&self, channel: Channel) -> CardError {
        CardError::Protocol {
            path: self.root.clone(),
            message: format!("no GPIO pin assigned to relay {channel}"),
        }
    }
}

impl RelayBackend for GpioBackend {
    fn card_type(&self) -> CardType {
        CardType::Gpio
    }

    fn probe(&self) -> BoxFuture<'_, Result<Vec<RelayCard>, CardError>> {
        Box::pin(async move {
            if self.pins.is_empty() {
                return Ok(Vec::new());
            }
            for pin in &self.pins {
                if let Err(e) = self.prepare_pin(*pin).await {
                    warn!(pin, error = %e, "GPIO pin unavailable, GPIO card not detected");
                    return Ok(Vec::new());
                }
            }
            Ok(vec![RelayCard {
                card_type: CardType::Gpio,
                path: self.root.display().to_string(),
                serial: None,
                relay_count: super::clamp_relay_count(self.pins.len() as u8),
            }])
        })
    }

    fn get<'a>(
        &'a self,
        _card: &'a RelayCard,
        channel: Channel,
    ) -> BoxFuture<'a, Result<RelayState, CardError>> {
        Box::pin(async move {
            let path = self.value_path(channel).ok_or_else(|| self.missing_pin(channel))?;
            let raw = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| CardError::io(&path, e))?;
            let level: u8 = raw.trim().parse().map_err(|_| CardError::Protocol {
                path: path.clone(),
                message: format!("expected 0 or 1, got {:?}", raw.trim()),
            })?;
            Ok(if level == self.active_value {
                RelayState::On
            } else {
                RelayState::Off
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
            let level = self.level_for(state)?;
            let path = self.value_path(channel).ok_or_else(|| self.missing_pin(channel))?;
            debug!(backend = "gpio", %channel, %state, level, "Set relay");
            write_sysfs(&path, &level.to_string()).await
        })
    }
}

async fn write_sysfs(path: &Path, value: &str) -> Result<(), CardError> {
    tokio::fs::write(path, value)
        .await
        .map_err(|e| CardError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    /// Lay out an already-exported sysfs tree for `pins`, all at level 0.
    fn sysfs_tree(pins: &[u32]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("export"), "").unwrap();
        for pin in pins {
            let dir = tmp.path().join(format!("gpio{pin}"));
            std::fs::create_dir(&dir).unwrap();
            std::fs::write(dir.join("direction"), "out").unwrap();
            std::fs::write(dir.join("value"), "0\n").unwrap();
        }
        tmp
    }

    fn read_value(tmp: &TempDir, pin: u32) -> String {
        std::fs::read_to_string(tmp.path().join(format!("gpio{pin}/value")))
            .unwrap()
            .trim()
            .to_string()
    }

    #[tokio::test]
    async fn test_probe_detects_exported_pins() {
        let tmp = sysfs_tree(&[17, 18, 27, 22]);
        let backend = GpioBackend::new(tmp.path(), vec![17, 18, 27, 22], 1);
        let cards = backend.probe().await.unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].relay_count, 4);
        assert_eq!(cards[0].serial, None);
        assert_eq!(cards[0].path, tmp.path().display().to_string());
    }

    #[tokio::test]
    async fn test_probe_without_pins_finds_nothing() {
        let tmp = sysfs_tree(&[]);
        let backend = GpioBackend::new(tmp.path(), Vec::new(), 1);
        assert!(backend.probe().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_probe_writes_export_for_missing_pin() {
        let tmp = sysfs_tree(&[]);
        let backend = GpioBackend::new(tmp.path(), vec![5], 1);
        // No kernel behind the fake tree, so the pin never appears.
        assert!(backend.probe().await.unwrap().is_empty());
        let exported = std::fs::read_to_string(tmp.path().join("export")).unwrap();
        assert_eq!(exported, "5");
    }

    #[tokio::test]
    async fn test_probe_on_missing_root_finds_nothing() {
        let backend = GpioBackend::new("/nonexistent/gpio", vec![5], 1);
        assert!(backend.probe().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_serial_filter_never_matches_gpio() {
        let tmp = sysfs_tree(&[4]);
        let backend = GpioBackend::new(tmp.path(), vec![4], 1);
        assert!(backend.detect(Some("anything")).await.is_err());
        assert!(backend.detect(None).await.is_ok());
    }

    #[tokio::test]
    async fn test_set_and_get_active_high() {
        let tmp = sysfs_tree(&[17, 18]);
        let backend = GpioBackend::new(tmp.path(), vec![17, 18], 1);
        let card = backend.detect(None).await.unwrap();
        let ch2 = card.channel(2).unwrap();

        backend.set(&card, ch2, RelayState::On).await.unwrap();
        assert_eq!(read_value(&tmp, 18), "1");
        assert_eq!(read_value(&tmp, 17), "0");
        assert_eq!(backend.get(&card, ch2).await.unwrap(), RelayState::On);

        backend.set(&card, ch2, RelayState::Off).await.unwrap();
        assert_eq!(read_value(&tmp, 18), "0");
        assert_eq!(backend.get(&card, ch2).await.unwrap(), RelayState::Off);
    }

    #[tokio::test]
    async fn test_set_and_get_active_low() {
        let tmp = sysfs_tree(&[17]);
        let backend = GpioBackend::new(tmp.path(), vec![17], 0);
        let card = backend.detect(None).await.unwrap();
        let ch1 = card.channel(1).unwrap();

        // Level 0 means energised on active-low boards.
        assert_eq!(backend.get(&card, ch1).await.unwrap(), RelayState::On);
        backend.set(&card, ch1, RelayState::Off).await.unwrap();
        assert_eq!(read_value(&tmp, 17), "1");
        assert_eq!(backend.get(&card, ch1).await.unwrap(), RelayState::Off);
    }

    #[tokio::test]
    async fn test_rejects_invalid_state() {
        let tmp = sysfs_tree(&[17]);
        let backend = GpioBackend::new(tmp.path(), vec![17], 1);
        let card = backend.detect(None).await.unwrap();
        let err = backend
            .set(&card, card.channel(1).unwrap(), RelayState::Invalid)
            .await
            .unwrap_err();
        assert!(matches!(err, CardError::InvalidState(_)));
        assert_eq!(read_value(&tmp, 17), "0");
    }

    #[tokio::test]
    async fn test_get_reports_garbage_value() {
        let tmp = sysfs_tree(&[17]);
        let backend = GpioBackend::new(tmp.path(), vec![17], 1);
        let card = backend.detect(None).await.unwrap();
        std::fs::write(tmp.path().join("gpio17/value"), "x").unwrap();
        let err = backend
            .get(&card, card.channel(1).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, CardError::Protocol { .. }));
    }
}
