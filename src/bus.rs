//! The hardware seam between the engine and a USB device controller.

use crate::endpoint::EndpointAddress;
use crate::interrupt::InterruptSource;
use crate::{Result, UsbError};

/// A trait for the device's USB serial interface engine. Implement this to add support for a new
/// hardware platform.
///
/// The bus is shared by reference between the interrupt handlers
/// ([`InterruptService`](crate::interrupt::InterruptService)) and the foreground
/// [`UsbDevice`](crate::device::UsbDevice), so any required mutability must be implemented using
/// interior mutability. The interrupt handlers only ever call [`read_setup`](UsbBus::read_setup)
/// and [`clear_interrupt`](UsbBus::clear_interrupt); every other method is called from the
/// foreground.
pub trait UsbBus {
    /// Enables the USB interrupt sources used by
    /// [`InterruptService`](crate::interrupt::InterruptService) and arms the bulk OUT endpoints.
    /// Called once by [`UsbDevice::new`](crate::device::UsbDevice::new).
    fn enable(&self);

    /// Reads the 8 byte SETUP packet the hardware has captured. Called from interrupt context.
    fn read_setup(&self) -> [u8; 8];

    /// Acknowledges an interrupt source so that it can fire again. Called from interrupt context.
    fn clear_interrupt(&self, source: InterruptSource);

    /// Writes a single packet of data to an IN endpoint and arms it for transmission. Returns the
    /// number of bytes written.
    ///
    /// # Errors
    ///
    /// * [`InvalidEndpoint`](crate::UsbError::InvalidEndpoint) - The `ep_addr` does not point to a
    ///   valid endpoint.
    /// * [`WouldBlock`](crate::UsbError::WouldBlock) - A previously written packet is still pending
    ///   to be sent.
    /// * [`BufferOverflow`](crate::UsbError::BufferOverflow) - The packet is too long to fit in the
    ///   transmission buffer.
    fn write(&self, ep_addr: EndpointAddress, buf: &[u8]) -> Result<usize>;

    /// Reads a single packet of data from an OUT endpoint and returns the actual length of the
    /// packet. This must not re-arm the endpoint; see [`arm_out`](UsbBus::arm_out).
    ///
    /// # Errors
    ///
    /// * [`InvalidEndpoint`](crate::UsbError::InvalidEndpoint) - The `ep_addr` does not point to a
    ///   valid endpoint.
    /// * [`WouldBlock`](crate::UsbError::WouldBlock) - There is no packet to be read. Note that
    ///   this is different from a received zero-length packet, which is valid in USB. A zero-length
    ///   packet will return `Ok(0)`.
    /// * [`BufferOverflow`](crate::UsbError::BufferOverflow) - The received packet is too long to
    ///   fit in `buf`.
    fn read(&self, ep_addr: EndpointAddress, buf: &mut [u8]) -> Result<usize>;

    /// Hands an OUT endpoint buffer back to the hardware so it can accept the next packet. Until
    /// this is called the hardware NAKs further OUT packets on the endpoint.
    fn arm_out(&self, ep_addr: EndpointAddress);

    /// Sets or clears the STALL condition for an endpoint.
    ///
    /// Stalling endpoint 0 rejects the current control transfer. Hardware clears an endpoint 0
    /// stall by itself when the next SETUP packet arrives.
    fn set_stalled(&self, ep_addr: EndpointAddress, stalled: bool);

    /// Resets the data toggle of an endpoint to DATA0.
    fn reset_data_toggle(&self, ep_addr: EndpointAddress);

    /// Gets the current USB frame number.
    ///
    /// The default implementation returns `Unsupported`.
    fn frame_number(&self) -> Result<u16> {
        Err(UsbError::Unsupported)
    }

    /// Sets the device USB address to `addr`. Called after the status stage of a SET_ADDRESS
    /// request has completed.
    ///
    /// Transceivers that latch the address themselves when they acknowledge SET_ADDRESS can leave
    /// the default implementation, which does nothing.
    fn set_device_address(&self, addr: u8) {
        let _ = addr;
    }
}
