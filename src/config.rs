//! Configuration and alternate setting state.

use crate::descriptor::{config_attributes, descriptor_type, Descriptors};
use crate::{Result, UsbError};
use heapless::Vec;

/// Maximum number of interfaces in one configuration.
pub const MAX_INTERFACES: usize = 8;

/// Value of `bConfigurationValue` that means the device is not configured.
pub const UNCONFIGURED: u8 = 0;

/// The default value for bAlternateSetting for all interfaces.
pub const DEFAULT_ALTERNATE_SETTING: u8 = 0;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
struct InterfaceState {
    interface: u8,
    alt_setting: u8,
}

/// The current configuration value and the alternate setting of each of its interfaces.
#[derive(Clone, Debug)]
pub struct DeviceConfigState {
    configuration: u8,
    interfaces: Vec<InterfaceState, MAX_INTERFACES>,
}

impl DeviceConfigState {
    /// Creates an unconfigured state.
    pub const fn new() -> Self {
        DeviceConfigState {
            configuration: UNCONFIGURED,
            interfaces: Vec::new(),
        }
    }

    /// Gets the current `bConfigurationValue`, or 0 if unconfigured.
    pub fn configuration(&self) -> u8 {
        self.configuration
    }

    /// Returns whether a configuration is active.
    pub fn is_configured(&self) -> bool {
        self.configuration != UNCONFIGURED
    }

    /// Returns to the unconfigured state.
    pub fn reset(&mut self) {
        self.configuration = UNCONFIGURED;
        self.interfaces.clear();
    }

    /// Activates a configuration. Every interface it declares starts at alternate setting 0.
    ///
    /// On error the previous state is kept.
    ///
    /// # Errors
    ///
    /// * [`BufferOverflow`](crate::UsbError::BufferOverflow) - The configuration has more
    ///   interfaces than can be tracked.
    pub fn configure(&mut self, configuration: &[u8]) -> Result<()> {
        let value = *configuration.get(5).ok_or(UsbError::ParseError)?;
        let mut interfaces = Vec::new();

        for (interface, alt_setting) in interface_settings(configuration) {
            if alt_setting != DEFAULT_ALTERNATE_SETTING {
                continue;
            }

            let state = InterfaceState {
                interface,
                alt_setting: DEFAULT_ALTERNATE_SETTING,
            };

            if !interfaces.contains(&state) {
                interfaces
                    .push(state)
                    .map_err(|_| UsbError::BufferOverflow)?;
            }
        }

        // Nothing changes unless every interface fits
        self.interfaces = interfaces;
        self.configuration = value;
        Ok(())
    }

    /// Gets the current alternate setting of an interface of the active configuration.
    pub fn alt_setting(&self, interface: u8) -> Option<u8> {
        self.interfaces
            .iter()
            .find(|i| i.interface == interface)
            .map(|i| i.alt_setting)
    }

    /// Selects an alternate setting for an interface of the active configuration.
    ///
    /// # Errors
    ///
    /// * [`InvalidState`](crate::UsbError::InvalidState) - The device is not configured.
    /// * [`Unsupported`](crate::UsbError::Unsupported) - `configuration` has no such interface
    ///   and alternate setting pair.
    pub fn set_alt_setting(
        &mut self,
        configuration: &[u8],
        interface: u8,
        alt_setting: u8,
    ) -> Result<()> {
        if !self.is_configured() {
            return Err(UsbError::InvalidState);
        }

        if !interface_settings(configuration).any(|pair| pair == (interface, alt_setting)) {
            return Err(UsbError::Unsupported);
        }

        let state = self
            .interfaces
            .iter_mut()
            .find(|i| i.interface == interface)
            .ok_or(UsbError::Unsupported)?;

        state.alt_setting = alt_setting;
        Ok(())
    }
}

impl Default for DeviceConfigState {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterates over the `(bInterfaceNumber, bAlternateSetting)` pairs declared by a configuration.
pub fn interface_settings(configuration: &[u8]) -> impl Iterator<Item = (u8, u8)> + '_ {
    Descriptors::new(configuration)
        .filter(|desc| desc[1] == descriptor_type::INTERFACE && desc.len() >= 4)
        .map(|desc| (desc[2], desc[3]))
}

/// Returns whether a configuration declares the device self-powered.
pub fn is_self_powered(configuration: &[u8]) -> bool {
    configuration
        .get(7)
        .map_or(false, |attributes| attributes & config_attributes::SELF_POWERED != 0)
}
