//! Serial link abstraction.
//!
//! The engine only needs a half-duplex byte pipe: flush pending input, write
//! a frame, poll for whatever bytes have arrived. [`SerialLink`] captures
//! exactly that so the engine runs unchanged against a real port, the
//! [`SimulatedBus`](crate::sim::SimulatedBus) or a scripted test double.
//!
//! Backends are created by name through a [`LinkRegistry`].

use crate::error::LinkError;
use crate::sim::SimulatedBus;
use bold_common::hardware::config::HardwareConfig;
use serialport::{ClearBuffer, SerialPort};
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::info;

/// Read timeout of the serial port. The engine polls in a loop against its
/// own packet deadline, so this only bounds a single poll.
const POLL_TIMEOUT: Duration = Duration::from_millis(1);

/// Byte pipe to the CM730.
pub trait SerialLink: Send {
    /// Backend name, for logs.
    fn name(&self) -> &'static str;

    /// Discard any bytes received but not yet read.
    fn clear_input(&mut self) -> Result<(), LinkError>;

    /// Write bytes, returning how many the link accepted.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<usize, LinkError>;

    /// Read whatever is available into `buf`. Returns 0 when nothing arrived.
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, LinkError>;

    /// Change the link speed [bit/s].
    fn set_baud_rate(&mut self, baud: u32) -> Result<(), LinkError>;

    /// Current link speed [bit/s].
    fn baud_rate(&self) -> u32;

    /// Block for a settle delay, e.g. after switching actuator power.
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

// ─── Serial port backend ────────────────────────────────────────────

/// CM730 attached to a tty.
pub struct SerialportLink {
    port: Box<dyn SerialPort>,
    baud: u32,
}

impl SerialportLink {
    /// Open `path` at `baud`, 8N1, no flow control.
    pub fn open(path: &str, baud: u32) -> Result<Self, LinkError> {
        let port = serialport::new(path, baud)
            .timeout(POLL_TIMEOUT)
            .open()
            .map_err(|e| LinkError::OpenFailed {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
        info!(path, baud, "serial link opened");
        Ok(Self { port, baud })
    }
}

impl SerialLink for SerialportLink {
    fn name(&self) -> &'static str {
        "serial"
    }

    fn clear_input(&mut self) -> Result<(), LinkError> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<usize, LinkError> {
        let written = self.port.write(bytes)?;
        self.port.flush()?;
        Ok(written)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn set_baud_rate(&mut self, baud: u32) -> Result<(), LinkError> {
        self.port
            .set_baud_rate(baud)
            .map_err(|_| LinkError::UnsupportedBaud(baud))?;
        self.baud = baud;
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.baud
    }
}

// ─── Registry ───────────────────────────────────────────────────────

/// Factory function type for creating links.
pub type LinkFactory = fn(&HardwareConfig) -> Result<Box<dyn SerialLink>, LinkError>;

fn create_serial(config: &HardwareConfig) -> Result<Box<dyn SerialLink>, LinkError> {
    Ok(Box::new(SerialportLink::open(
        &config.device_path,
        config.baud_rate,
    )?))
}

fn create_simulation(config: &HardwareConfig) -> Result<Box<dyn SerialLink>, LinkError> {
    Ok(Box::new(SimulatedBus::with_baud(config.baud_rate)))
}

/// Registry of available link backends.
///
/// Constructed at startup and queried by name. No global state.
pub struct LinkRegistry {
    factories: HashMap<&'static str, LinkFactory>,
}

impl LinkRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the `serial` and `simulation` backends.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("serial", create_serial);
        registry.register("simulation", create_simulation);
        registry
    }

    /// Register a link factory.
    ///
    /// # Panics
    /// Panics if a link with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: LinkFactory) {
        if self.factories.contains_key(name) {
            panic!("Link '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    /// Create a link by name.
    ///
    /// # Errors
    /// `LinkError::LinkNotFound` if no link with the given name is registered,
    /// or whatever the factory reports.
    pub fn create(
        &self,
        name: &str,
        config: &HardwareConfig,
    ) -> Result<Box<dyn SerialLink>, LinkError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| LinkError::LinkNotFound(name.to_string()))?;
        factory(config)
    }

    /// List all registered link names.
    pub fn list(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }
}

impl Default for LinkRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bold_common::hardware::config::LinkKind;

    #[test]
    fn defaults_include_both_backends() {
        let registry = LinkRegistry::with_defaults();
        let mut names = registry.list();
        names.sort();
        assert_eq!(names, vec!["serial", "simulation"]);
    }

    #[test]
    fn creates_simulation_link() {
        let registry = LinkRegistry::with_defaults();
        let config = HardwareConfig {
            driver: LinkKind::Simulation,
            ..Default::default()
        };
        let link = registry.create(config.driver.name(), &config).unwrap();
        assert_eq!(link.name(), "simulation");
        assert_eq!(link.baud_rate(), 1_000_000);
    }

    #[test]
    fn unknown_link_not_found() {
        let registry = LinkRegistry::new();
        let result = registry.create("ethercat", &HardwareConfig::default());
        assert!(matches!(result, Err(LinkError::LinkNotFound(_))));
    }

    #[test]
    fn serial_open_failure_reported() {
        let result = SerialportLink::open("/nonexistent/tty", 1_000_000);
        assert!(matches!(result, Err(LinkError::OpenFailed { .. })));
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn duplicate_registration_panics() {
        let mut registry = LinkRegistry::with_defaults();
        registry.register("serial", create_serial);
    }
}
