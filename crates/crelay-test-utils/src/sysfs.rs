//! Fake Linux GPIO sysfs tree.
//!
//! [`FakeSysfs`] lays out `<root>/export` and `<root>/gpioN/{direction,value}`
//! in a temporary directory so the GPIO backend can run without hardware.
//! The directory is removed when the value is dropped.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A temporary, already-exported GPIO sysfs tree.
pub struct FakeSysfs {
    dir: TempDir,
}

impl FakeSysfs {
    /// Create a tree with `pins` exported as outputs, all at level 0.
    pub fn with_pins(pins: &[u32]) -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        std::fs::write(dir.path().join("export"), "").expect("failed to write export");
        let sysfs = Self { dir };
        for pin in pins {
            sysfs.add_pin(*pin);
        }
        sysfs
    }

    /// Root directory, as passed to `gpio.sysfs_root`.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    fn pin_dir(&self, pin: u32) -> PathBuf {
        self.root().join(format!("gpio{pin}"))
    }

    /// Export another pin at level 0.
    pub fn add_pin(&self, pin: u32) {
        let dir = self.pin_dir(pin);
        std::fs::create_dir_all(&dir).expect("failed to create pin dir");
        std::fs::write(dir.join("direction"), "out").expect("failed to write direction");
        std::fs::write(dir.join("value"), "0\n").expect("failed to write value");
    }

    /// Current level of a pin (`0` or `1`).
    pub fn level(&self, pin: u32) -> u8 {
        std::fs::read_to_string(self.pin_dir(pin).join("value"))
            .expect("failed to read value")
            .trim()
            .parse()
            .expect("value is not a number")
    }

    /// Force the level of a pin, as if wired externally.
    pub fn set_level(&self, pin: u32, level: u8) {
        std::fs::write(self.pin_dir(pin).join("value"), format!("{level}\n"))
            .expect("failed to write value");
    }

    /// Remove a pin's directory, simulating an unexported or missing pin.
    pub fn remove_pin(&self, pin: u32) {
        std::fs::remove_dir_all(self.pin_dir(pin)).expect("failed to remove pin dir");
    }

    /// Whatever was last written to `<root>/export`.
    pub fn exported(&self) -> String {
        std::fs::read_to_string(self.root().join("export")).unwrap_or_default()
    }
}
