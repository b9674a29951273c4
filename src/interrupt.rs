//! Interrupt service layer.
//!
//! Handlers here run in interrupt context. They never parse requests, look up descriptors or wait;
//! they capture what the hardware reports, raise a signal in [`UsbShared`] and acknowledge the
//! interrupt. Everything else happens in [`UsbDevice::poll`](crate::device::UsbDevice::poll).

use crate::bus::UsbBus;
use crate::signal::{Event, UsbShared};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// USB interrupt sources, numbered like the controller's interrupt vectors.
///
/// The discriminants are in the controller's priority order, highest first.
#[repr(u8)]
#[derive(Copy, Clone, Eq, PartialEq, Debug, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(missing_docs)]
pub enum InterruptSource {
    /// SETUP data valid.
    SetupData = 13,
    /// Start of frame.
    StartOfFrame,
    /// SETUP token received.
    SetupToken,
    /// Bus suspend.
    Suspend,
    /// Bus reset.
    BusReset,
    /// IN-bulk-NAK.
    InBulkNak,
    Ep0In,
    Ep0Out,
    Ep1In,
    Ep1Out,
    Ep2In,
    Ep2Out,
    Ep3In,
    Ep3Out,
    Ep4In,
    Ep4Out,
    Ep5In,
    Ep5Out,
    Ep6In,
    Ep6Out,
    Ep7In,
    Ep7Out,
}

/// What a handler does for one interrupt source.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Action {
    /// Capture the SETUP packet and post it to the mailbox.
    CaptureSetup,
    /// Raise a signal.
    Raise(Event),
    /// Only acknowledge the interrupt.
    Acknowledge,
}

impl InterruptSource {
    /// Gets the handler action for this source.
    pub fn action(self) -> Action {
        use InterruptSource::*;

        match self {
            SetupData => Action::CaptureSetup,
            BusReset => Action::Raise(Event::BusReset),
            Ep0In => Action::Raise(Event::ControlInComplete),
            Ep0Out => Action::Raise(Event::ControlOutReceived),
            StartOfFrame | SetupToken | Suspend | InBulkNak => Action::Acknowledge,
            _ => match self.endpoint() {
                Some((n, true)) => Action::Raise(Event::BulkInFree(n)),
                Some((n, false)) => Action::Raise(Event::BulkOutReady(n)),
                None => Action::Acknowledge,
            },
        }
    }

    /// For endpoint sources, gets the endpoint number and whether the source is the IN direction.
    pub fn endpoint(self) -> Option<(u8, bool)> {
        let vector = u8::from(self);
        let first = u8::from(InterruptSource::Ep0In);

        if vector < first {
            return None;
        }

        let offset = vector - first;
        Some((offset / 2, offset % 2 == 0))
    }
}

/// Interrupt handlers for a USB peripheral.
pub struct InterruptService<'a, B: UsbBus> {
    bus: &'a B,
    shared: &'a UsbShared,
}

impl<'a, B: UsbBus> InterruptService<'a, B> {
    /// Creates the interrupt service. This is cheap enough to do at the start of every interrupt.
    pub fn new(bus: &'a B, shared: &'a UsbShared) -> Self {
        InterruptService { bus, shared }
    }

    /// Handles an interrupt given its raw vector number. Unknown vectors are ignored.
    pub fn handle_vector(&self, vector: u8) {
        if let Ok(source) = InterruptSource::try_from(vector) {
            self.handle(source);
        }
    }

    /// Handles one interrupt source.
    pub fn handle(&self, source: InterruptSource) {
        match source.action() {
            Action::CaptureSetup => self.shared.setup.post(self.bus.read_setup()),
            Action::Raise(event) => self.shared.signals.raise(event),
            Action::Acknowledge => {}
        }

        self.bus.clear_interrupt(source);
    }

    /// Handles every source in `pending`, in priority order. Convenient for controllers that report
    /// all USB interrupts through one vector and a pending-bits register.
    pub fn handle_all(&self, pending: impl IntoIterator<Item = InterruptSource>) {
        let mut sources: heapless::Vec<InterruptSource, 22> = heapless::Vec::new();

        for source in pending {
            if !sources.contains(&source) {
                // At most one entry per source, and there are 22 sources.
                let _ = sources.push(source);
            }
        }

        sources.sort_unstable_by_key(|s| u8::from(*s));

        for source in sources {
            self.handle(source);
        }
    }
}
