//! Handlers for class and vendor specific control requests.

use crate::control::Request;

/// Result of offering a control OUT transfer to a class.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlOutResult {
    /// The request was not for this class. It is offered to the next one.
    Ignore,
    /// The request was accepted. The status stage is acknowledged.
    Ok,
    /// The request was for this class but failed. Endpoint 0 is stalled.
    Err,
}

/// Result of offering a control IN transfer to a class.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlInResult {
    /// The request was not for this class. It is offered to the next one.
    Ignore,
    /// The request was accepted and the given number of bytes were written to the buffer. The data
    /// is truncated to the request's `length`.
    Ok(usize),
    /// The request was for this class but failed. Endpoint 0 is stalled.
    Err,
}

/// Handler for class and vendor specific control requests.
///
/// Standard requests are handled by [`UsbDevice`](crate::device::UsbDevice) and never reach a
/// class. Class and vendor requests are offered to each registered class in order until one
/// returns something other than `Ignore`; if none does, the request is stalled.
pub trait UsbClass {
    /// Called when the host resets the device or the active configuration changes.
    fn reset(&mut self) {}

    /// Called after SET_CONFIGURATION. `configuration` is 0 when the device has been unconfigured.
    fn configured(&mut self, configuration: u8) {
        let _ = configuration;
    }

    /// Called after SET_INTERFACE changed the alternate setting of an interface.
    fn alt_setting_changed(&mut self, interface: u8, alt_setting: u8) {
        let _ = (interface, alt_setting);
    }

    /// Handles a control OUT request. `data` holds the complete data stage, and is empty for
    /// requests without one.
    fn control_out(&mut self, req: &Request, data: &[u8]) -> ControlOutResult {
        let _ = (req, data);
        ControlOutResult::Ignore
    }

    /// Handles a control IN request by writing up to `buf.len()` bytes of response into `buf`.
    fn control_in(&mut self, req: &Request, buf: &mut [u8]) -> ControlInResult {
        let _ = (req, buf);
        ControlInResult::Ignore
    }
}
