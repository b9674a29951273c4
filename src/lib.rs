//! Control transfer engine for USB 1.1 device firmware.
//!
//! The crate splits the work of a USB device into two execution contexts. The
//! [`InterruptService`](interrupt::InterruptService) runs from the controller's interrupt vectors,
//! captures SETUP packets and endpoint events and raises signals in a [`UsbShared`]. The foreground
//! loop calls [`UsbDevice::poll`](device::UsbDevice::poll), which consumes those signals, answers
//! standard control requests from a [`DescriptorStore`](descriptor::DescriptorStore) and moves bulk
//! data between the hardware and the application.
//!
//! ```ignore
//! static SHARED: UsbShared = UsbShared::new();
//!
//! #[interrupt]
//! fn USB() {
//!     InterruptService::new(bus(), &SHARED).handle_vector(vector());
//! }
//!
//! fn main() -> ! {
//!     let mut usb_dev = UsbDevice::new(bus(), &SHARED, &tables::DESCRIPTORS);
//!
//!     loop {
//!         usb_dev.poll(&mut [&mut vendor], &mut app_buffers);
//!     }
//! }
//! ```
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

#[macro_use]
mod macros;

/// A USB stack error.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UsbError {
    /// An operation would block because the hardware is busy or there is no data to read.
    WouldBlock,

    /// Parsing failed due to invalid input.
    ParseError,

    /// A buffer too short for the data to read was passed, or provided data cannot fit within
    /// length constraints.
    BufferOverflow,

    /// The endpoint address is not known to the device or the bus.
    InvalidEndpoint,

    /// A SETUP packet could not be parsed.
    InvalidSetupPacket,

    /// An operation was attempted in a state that does not allow it, such as answering a control
    /// transfer that is not waiting for a response.
    InvalidState,

    /// Operation is not supported by the device or the bus implementation.
    Unsupported,
}

/// Result for USB operations.
pub type Result<T> = core::result::Result<T, UsbError>;

/// USB transfer direction.
#[repr(u8)]
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UsbDirection {
    /// Host to device (OUT)
    Out = 0x00,
    /// Device to host (IN)
    In = 0x80,
}

impl From<u8> for UsbDirection {
    fn from(value: u8) -> Self {
        if value & 0x80 != 0 {
            UsbDirection::In
        } else {
            UsbDirection::Out
        }
    }
}

pub mod bus;
pub mod bulk;
pub mod class;
pub mod config;
pub mod control;
mod control_pipe;
pub mod descriptor;
pub mod device;
mod device_standard_control;
pub mod endpoint;
pub mod interrupt;
pub mod signal;
pub mod tables;

pub use crate::signal::UsbShared;

/// Prelude for firmware that wires the engine to a USB peripheral.
pub mod prelude {
    pub use crate::bulk::BulkBuffers;
    pub use crate::bus::UsbBus;
    pub use crate::class::{ControlInResult, ControlOutResult, UsbClass};
    pub use crate::descriptor::DescriptorStore;
    pub use crate::device::{UsbDevice, UsbDeviceState};
    pub use crate::interrupt::{InterruptService, InterruptSource};
    pub use crate::signal::UsbShared;
    pub use crate::{UsbDirection, UsbError};
}
