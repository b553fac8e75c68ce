//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`AppConfig`] values without
//! repeating boilerplate across crate boundaries. Unlike
//! `AppConfig::default()`, the builder starts with the serial backend
//! disabled, so tests never probe the host's real `/dev` nodes.

use std::path::Path;

use crelay_config::AppConfig;

/// Fluent builder for [`AppConfig`] in tests.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .virtual_card(4)
///     .pulse_duration(2)
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        let mut config = AppConfig::default();
        config.serial.enabled = false;
        Self { config }
    }

    pub fn iface(mut self, iface: &str) -> Self {
        self.config.server.iface = iface.to_string();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    pub fn pulse_duration(mut self, secs: u64) -> Self {
        self.config.server.pulse_duration = secs;
        self
    }

    /// Set the file label of channel `n` (1-based). Out-of-range channels
    /// are ignored.
    pub fn label(mut self, n: usize, label: &str) -> Self {
        let labels = &mut self.config.labels;
        let slot = match n {
            1 => &mut labels.relay1,
            2 => &mut labels.relay2,
            3 => &mut labels.relay3,
            4 => &mut labels.relay4,
            5 => &mut labels.relay5,
            6 => &mut labels.relay6,
            7 => &mut labels.relay7,
            8 => &mut labels.relay8,
            _ => return self,
        };
        *slot = Some(label.to_string());
        self
    }

    /// Enable the GPIO backend on a sysfs tree, one pin per channel.
    pub fn gpio(mut self, root: &Path, pins: &[u32], active_value: u8) -> Self {
        self.config.gpio.sysfs_root = root.display().to_string();
        self.config.gpio.num_relays = pins.len() as u8;
        self.config.gpio.pins = pins.to_vec();
        self.config.gpio.active_value = active_value;
        self
    }

    /// Enable the serial backend on a device directory.
    pub fn serial(mut self, device_dir: &Path, prefix: &str, num_relays: u8) -> Self {
        self.config.serial.enabled = true;
        self.config.serial.device_dir = device_dir.display().to_string();
        self.config.serial.device_prefix = prefix.to_string();
        self.config.serial.num_relays = num_relays;
        self
    }

    /// Enable the in-memory card with `num_relays` channels.
    pub fn virtual_card(mut self, num_relays: u8) -> Self {
        self.config.virtual_card.num_relays = num_relays;
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }

    /// Render the configuration as TOML, for tests that need a config file.
    pub fn to_toml(&self) -> String {
        toml::to_string(&self.config).expect("test config serialises")
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
