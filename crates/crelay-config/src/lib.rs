#![deny(unsafe_code)]

//! Configuration loading and validation for crelay.
//!
//! Loads the TOML configuration file read once at daemon start and validates
//! it against the supported sections. Every table rejects unknown keys, so a
//! typo in the file is a load error rather than a silently ignored setting.
//! [`AppConfig`] is the central configuration structure; it is immutable once
//! loaded and passed by reference to the dispatcher and the page renderer.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

/// Highest number of relay channels any supported card exposes.
pub const MAX_NUM_RELAYS: usize = 8;

/// Configuration file used when none is given on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/crelay.toml";

/// Port the HTTP server binds when the file does not name one.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Per-channel labels shown on the web page.
    #[serde(default)]
    pub labels: LabelsConfig,

    /// GPIO sysfs backend parameters.
    #[serde(default)]
    pub gpio: GpioConfig,

    /// USB-serial relay backend parameters.
    #[serde(default)]
    pub serial: SerialConfig,

    /// Simulated in-memory card.
    #[serde(default, rename = "virtual")]
    pub virtual_card: VirtualConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration for the built-in HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Interface address the server listens on.
    #[serde(default = "default_iface")]
    pub iface: String,

    /// Port the server listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// How long a pulse holds the inverted state, in whole seconds.
    #[serde(default = "default_pulse_duration")]
    pub pulse_duration: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            iface: default_iface(),
            port: default_port(),
            pulse_duration: default_pulse_duration(),
        }
    }
}

fn default_iface() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_SERVER_PORT
}

fn default_pulse_duration() -> u64 {
    1
}

/// Relay labels as written in the `[labels]` table.
///
/// ```toml
/// [labels]
/// relay1 = "Garage door"
/// relay3 = "Garden pump"
/// ```
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabelsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay3: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay5: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay6: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay7: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay8: Option<String>,
}

impl LabelsConfig {
    /// File-supplied labels in channel order.
    pub fn as_array(&self) -> [Option<&str>; MAX_NUM_RELAYS] {
        [
            self.relay1.as_deref(),
            self.relay2.as_deref(),
            self.relay3.as_deref(),
            self.relay4.as_deref(),
            self.relay5.as_deref(),
            self.relay6.as_deref(),
            self.relay7.as_deref(),
            self.relay8.as_deref(),
        ]
    }
}

/// Linux sysfs GPIO backend parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GpioConfig {
    /// Number of relays wired to GPIO pins (0 disables the backend).
    #[serde(default)]
    pub num_relays: u8,

    /// Pin value that energises a relay (boards differ in polarity).
    #[serde(default = "default_active_value")]
    pub active_value: u8,

    /// GPIO pin number for each channel, in channel order.
    #[serde(default)]
    pub pins: Vec<u32>,

    /// Root of the sysfs GPIO class directory.
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: String,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            num_relays: 0,
            active_value: default_active_value(),
            pins: Vec::new(),
            sysfs_root: default_sysfs_root(),
        }
    }
}

fn default_active_value() -> u8 {
    1
}

fn default_sysfs_root() -> String {
    "/sys/class/gpio".to_string()
}

/// USB-serial relay module parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SerialConfig {
    /// Whether serial device nodes are probed at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory holding the device nodes.
    #[serde(default = "default_device_dir")]
    pub device_dir: String,

    /// Prefix of the device node names to probe (e.g. `ttyUSB`).
    #[serde(default = "default_device_prefix")]
    pub device_prefix: String,

    /// Relay channels on the attached module.
    #[serde(default = "default_serial_num_relays")]
    pub num_relays: u8,

    /// Upper bound for waiting on a status reply, in milliseconds.
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            device_dir: default_device_dir(),
            device_prefix: default_device_prefix(),
            num_relays: default_serial_num_relays(),
            response_timeout_ms: default_response_timeout_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_device_dir() -> String {
    "/dev".to_string()
}

fn default_device_prefix() -> String {
    "ttyUSB".to_string()
}

fn default_serial_num_relays() -> u8 {
    4
}

fn default_response_timeout_ms() -> u64 {
    500
}

/// Simulated card configuration.
///
/// A virtual card keeps its relay states in memory for the lifetime of the
/// process. It is disabled unless `num_relays` is non-zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VirtualConfig {
    /// Number of simulated relays (0 disables the card).
    #[serde(default)]
    pub num_relays: u8,

    /// Serial identifier the simulated card reports.
    #[serde(default = "default_virtual_serial")]
    pub serial: String,
}

impl Default for VirtualConfig {
    fn default() -> Self {
        Self {
            num_relays: 0,
            serial: default_virtual_serial(),
        }
    }
}

fn default_virtual_serial() -> String {
    "VIRTUAL".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port must be non-zero".to_string(),
            ));
        }
        if self.server.iface.parse::<IpAddr>().is_err() {
            return Err(ConfigError::Validation(format!(
                "server.iface must be an IP address, got {:?}",
                self.server.iface
            )));
        }
        if self.server.pulse_duration == 0 {
            return Err(ConfigError::Validation(
                "server.pulse_duration must be at least 1 second".to_string(),
            ));
        }

        // GPIO backend
        let gpio = &self.gpio;
        if usize::from(gpio.num_relays) > MAX_NUM_RELAYS {
            return Err(ConfigError::Validation(format!(
                "gpio.num_relays must be at most {MAX_NUM_RELAYS}, got {}",
                gpio.num_relays
            )));
        }
        if gpio.active_value > 1 {
            return Err(ConfigError::Validation(format!(
                "gpio.active_value must be 0 or 1, got {}",
                gpio.active_value
            )));
        }
        if gpio.pins.len() < usize::from(gpio.num_relays) {
            return Err(ConfigError::Validation(format!(
                "gpio.num_relays is {} but only {} pins are assigned in gpio.pins",
                gpio.num_relays,
                gpio.pins.len()
            )));
        }
        let mut seen = HashSet::new();
        for pin in self.gpio_pins() {
            if !seen.insert(pin) {
                return Err(ConfigError::Validation(format!(
                    "gpio.pins assigns pin {pin} to more than one relay"
                )));
            }
        }
        if gpio.sysfs_root.is_empty() {
            return Err(ConfigError::Validation(
                "gpio.sysfs_root must not be empty".to_string(),
            ));
        }

        // Serial backend
        let serial = &self.serial;
        if serial.num_relays == 0 || usize::from(serial.num_relays) > MAX_NUM_RELAYS {
            return Err(ConfigError::Validation(format!(
                "serial.num_relays must be in 1..={MAX_NUM_RELAYS}, got {}",
                serial.num_relays
            )));
        }
        if serial.device_prefix.is_empty() {
            return Err(ConfigError::Validation(
                "serial.device_prefix must not be empty".to_string(),
            ));
        }
        if serial.response_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "serial.response_timeout_ms must be non-zero".to_string(),
            ));
        }

        // Virtual card
        if usize::from(self.virtual_card.num_relays) > MAX_NUM_RELAYS {
            return Err(ConfigError::Validation(format!(
                "virtual.num_relays must be at most {MAX_NUM_RELAYS}, got {}",
                self.virtual_card.num_relays
            )));
        }
        if self.virtual_card.serial.is_empty() {
            return Err(ConfigError::Validation(
                "virtual.serial must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// The pins actually driven by the GPIO backend, one per channel.
    ///
    /// Pins listed beyond `gpio.num_relays` are ignored.
    pub fn gpio_pins(&self) -> &[u32] {
        let n = usize::from(self.gpio.num_relays).min(self.gpio.pins.len());
        &self.gpio.pins[..n]
    }

    /// Pulse duration as a [`Duration`].
    pub fn pulse_duration(&self) -> Duration {
        Duration::from_secs(self.server.pulse_duration)
    }

    /// Socket address the HTTP server binds.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.server.iface.parse().map_err(|_| {
            ConfigError::Validation(format!(
                "server.iface must be an IP address, got {:?}",
                self.server.iface
            ))
        })?;
        Ok(SocketAddr::new(ip, self.server.port))
    }

    /// Effective relay labels for all channels.
    ///
    /// Command-line labels take precedence over file labels, in channel
    /// order; anything beyond [`MAX_NUM_RELAYS`] is ignored. Channels without
    /// either fall back to `My appliance N`.
    pub fn labels_with_overrides(&self, overrides: &[String]) -> Vec<String> {
        self.labels
            .as_array()
            .iter()
            .enumerate()
            .map(|(i, file_label)| {
                overrides
                    .get(i)
                    .cloned()
                    .or_else(|| file_label.map(str::to_string))
                    .unwrap_or_else(|| format!("My appliance {}", i + 1))
            })
            .collect()
    }

    /// Log the effective configuration at daemon start.
    pub fn log_effective(&self) {
        info!(
            iface = %self.server.iface,
            port = self.server.port,
            pulse_duration = self.server.pulse_duration,
            "HTTP server parameters"
        );
        for (i, label) in self.labels.as_array().iter().enumerate() {
            if let Some(label) = label {
                info!(relay = i + 1, label = %label, "Relay label from config");
            }
        }
        if self.gpio.num_relays > 0 {
            info!(
                num_relays = self.gpio.num_relays,
                active_value = self.gpio.active_value,
                pins = ?self.gpio_pins(),
                root = %self.gpio.sysfs_root,
                "GPIO backend parameters"
            );
        }
        if self.serial.enabled {
            info!(
                dir = %self.serial.device_dir,
                prefix = %self.serial.device_prefix,
                num_relays = self.serial.num_relays,
                "Serial backend parameters"
            );
        }
        if self.virtual_card.num_relays > 0 {
            info!(
                num_relays = self.virtual_card.num_relays,
                serial = %self.virtual_card.serial,
                "Virtual card enabled"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.iface, "0.0.0.0");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.pulse_duration, 1);
        assert_eq!(config.gpio.num_relays, 0);
        assert_eq!(config.gpio.active_value, 1);
        assert!(config.serial.enabled);
        assert_eq!(config.virtual_card.num_relays, 0);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.pulse_duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
            [server]
            iface = "127.0.0.1"
            port = 8080
            pulse_duration = 3

            [labels]
            relay1 = "Garage door"
            relay4 = "Garden pump"

            [gpio]
            num_relays = 4
            active_value = 0
            pins = [17, 18, 27, 22]
            sysfs_root = "/tmp/gpio"

            [serial]
            enabled = false
            num_relays = 8

            [virtual]
            num_relays = 2
            serial = "DEMO"

            [logging]
            level = "debug"
        "#;
        let config = AppConfig::parse(toml).unwrap();
        assert_eq!(config.server.iface, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.pulse_duration(), Duration::from_secs(3));
        assert_eq!(config.labels.relay1.as_deref(), Some("Garage door"));
        assert_eq!(config.labels.relay2, None);
        assert_eq!(config.gpio_pins(), &[17, 18, 27, 22]);
        assert_eq!(config.gpio.active_value, 0);
        assert!(!config.serial.enabled);
        assert_eq!(config.virtual_card.serial, "DEMO");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.listen_addr().unwrap(),
            "127.0.0.1:8080".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_rejects_unknown_key() {
        let toml = r#"
            [server]
            server_port = 9000
        "#;
        assert!(matches!(AppConfig::parse(toml), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_rejects_unknown_section() {
        let toml = r#"
            [sainsmart]
            num_relays = 4
        "#;
        assert!(matches!(AppConfig::parse(toml), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_rejects_ninth_label() {
        let toml = r#"
            [labels]
            relay9 = "Too many"
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_zero_port() {
        let toml = r#"
            [server]
            port = 0
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_bad_iface() {
        let toml = r#"
            [server]
            iface = "eth0"
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_zero_pulse() {
        let toml = r#"
            [server]
            pulse_duration = 0
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_more_relays_than_pins() {
        let toml = r#"
            [gpio]
            num_relays = 8
            pins = [17, 18, 27, 22]
        "#;
        let err = AppConfig::parse(toml).unwrap_err();
        assert_eq!(
            err.to_string(),
            "validation error: gpio.num_relays is 8 but only 4 pins are assigned in gpio.pins"
        );
    }

    #[test]
    fn test_extra_pins_are_ignored() {
        let toml = r#"
            [gpio]
            num_relays = 2
            pins = [17, 18, 27, 22]
        "#;
        let config = AppConfig::parse(toml).unwrap();
        assert_eq!(config.gpio_pins(), &[17, 18]);
    }

    #[test]
    fn test_validation_rejects_duplicate_pin() {
        let toml = r#"
            [gpio]
            num_relays = 3
            pins = [17, 18, 17]
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_bad_active_value() {
        let toml = r#"
            [gpio]
            active_value = 2
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_too_many_gpio_relays() {
        let toml = r#"
            [gpio]
            num_relays = 9
            pins = [1, 2, 3, 4, 5, 6, 7, 8, 9]
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_zero_serial_relays() {
        let toml = r#"
            [serial]
            num_relays = 0
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_empty_virtual_serial() {
        let toml = r#"
            [virtual]
            num_relays = 4
            serial = ""
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    // ── Labels ────────────────────────────────────────────────────────

    #[test]
    fn test_default_labels() {
        let labels = AppConfig::default().labels_with_overrides(&[]);
        assert_eq!(labels.len(), MAX_NUM_RELAYS);
        assert_eq!(labels[0], "My appliance 1");
        assert_eq!(labels[7], "My appliance 8");
    }

    #[test]
    fn test_command_line_labels_override_file_labels() {
        let toml = r#"
            [labels]
            relay1 = "From file 1"
            relay2 = "From file 2"
            relay3 = "From file 3"
        "#;
        let config = AppConfig::parse(toml).unwrap();
        let labels = config.labels_with_overrides(&["Cli 1".to_string(), "Cli 2".to_string()]);
        assert_eq!(labels[0], "Cli 1");
        assert_eq!(labels[1], "Cli 2");
        assert_eq!(labels[2], "From file 3");
        assert_eq!(labels[3], "My appliance 4");
    }

    #[test]
    fn test_command_line_labels_beyond_max_are_ignored() {
        let overrides: Vec<String> = (1..=10).map(|i| format!("L{i}")).collect();
        let labels = AppConfig::default().labels_with_overrides(&overrides);
        assert_eq!(labels.len(), MAX_NUM_RELAYS);
        assert_eq!(labels[7], "L8");
    }

    // ── Async file-based loading ──────────────────────────────────────

    #[test_log::test(tokio::test)]
    async fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("crelay.toml");
        tokio::fs::write(&path, b"[server]\nport = 4242\niface = \"127.0.0.1\"\n")
            .await
            .unwrap();

        let config = AppConfig::load(&path).await.unwrap();
        assert_eq!(config.server.port, 4242);
        assert_eq!(config.server.iface, "127.0.0.1");
    }

    #[tokio::test]
    async fn test_load_nonexistent_file() {
        let result = AppConfig::load(Path::new("/nonexistent/crelay.toml")).await;
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[tokio::test]
    async fn test_load_invalid_toml_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        tokio::fs::write(&path, b"not valid toml [[[").await.unwrap();

        let result = AppConfig::load(&path).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = AppConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        assert!(text.contains("[server]"));
        assert!(text.contains("[virtual]"));
        assert!(AppConfig::parse(&text).is_ok());
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Validation("bad value".to_string());
        assert_eq!(err.to_string(), "validation error: bad value");
    }
}
