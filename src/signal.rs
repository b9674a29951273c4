//! Signals shared between the interrupt and foreground contexts.
//!
//! Every signal has exactly one producer, the
//! [`InterruptService`](crate::interrupt::InterruptService), and one consumer, the foreground
//! [`UsbDevice`](crate::device::UsbDevice). Producers only ever set signals and consumers only
//! ever clear them. Clearing is always an atomic test-and-clear so that an event raised between
//! the consumer's check and its clear is never lost. Events of the
//! same kind are not queued: raising a signal that is already set has no further effect.

use crate::control::Request;
use core::cell::Cell;
use critical_section::Mutex;
use portable_atomic::{AtomicBool, AtomicU16, Ordering};

/// An event raised from interrupt context.
///
/// SETUP packets are not represented here because they carry data; they go through the
/// [`SetupMailbox`] instead.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// An IN packet on endpoint 0 has been sent and acknowledged by the host.
    ControlInComplete,

    /// An OUT packet has been received on endpoint 0 and is waiting to be read.
    ControlOutReceived,

    /// A bulk OUT packet has been received on the endpoint with the given number.
    BulkOutReady(u8),

    /// The IN buffer of the bulk endpoint with the given number is free.
    BulkInFree(u8),

    /// The host has reset the bus.
    BusReset,
}

/// Single-slot mailbox carrying the most recent SETUP packet from interrupt to foreground context.
///
/// A full slot is the control-command-pending signal. Posting and taking both run inside a critical
/// section, so the foreground always takes a complete packet together with the pending flag. A
/// SETUP packet posted while the slot is still full replaces the previous one, which matches USB's
/// rule that a new SETUP aborts the control transfer in progress.
pub struct SetupMailbox {
    slot: Mutex<Cell<Option<[u8; Request::SIZE]>>>,
}

impl SetupMailbox {
    /// Creates an empty mailbox.
    pub const fn new() -> Self {
        SetupMailbox {
            slot: Mutex::new(Cell::new(None)),
        }
    }

    /// Producer side: stores a SETUP packet and marks the command as pending.
    pub fn post(&self, packet: [u8; Request::SIZE]) {
        critical_section::with(|cs| self.slot.borrow(cs).set(Some(packet)));
    }

    /// Consumer side: takes the pending SETUP packet, if any, and clears the pending flag.
    pub fn take(&self) -> Option<[u8; Request::SIZE]> {
        critical_section::with(|cs| self.slot.borrow(cs).take())
    }

    /// Returns whether a SETUP packet is waiting to be taken.
    pub fn is_pending(&self) -> bool {
        critical_section::with(|cs| self.slot.borrow(cs).get().is_some())
    }
}

impl Default for SetupMailbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Atomic event flags. Bulk events keep one bit per endpoint number.
pub struct Signals {
    control_in: AtomicBool,
    control_out: AtomicBool,
    bulk_out: AtomicU16,
    bulk_in: AtomicU16,
    bus_reset: AtomicBool,
}

impl Signals {
    /// Creates a set of cleared signals.
    pub const fn new() -> Self {
        Signals {
            control_in: AtomicBool::new(false),
            control_out: AtomicBool::new(false),
            bulk_out: AtomicU16::new(0),
            bulk_in: AtomicU16::new(0),
            bus_reset: AtomicBool::new(false),
        }
    }

    /// Producer side: raises the signal for `event`.
    pub fn raise(&self, event: Event) {
        match event {
            Event::ControlInComplete => self.control_in.store(true, Ordering::Release),
            Event::ControlOutReceived => self.control_out.store(true, Ordering::Release),
            Event::BulkOutReady(n) => {
                self.bulk_out.fetch_or(endpoint_bit(n), Ordering::AcqRel);
            }
            Event::BulkInFree(n) => {
                self.bulk_in.fetch_or(endpoint_bit(n), Ordering::AcqRel);
            }
            Event::BusReset => self.bus_reset.store(true, Ordering::Release),
        }
    }

    /// Consumer side: clears the signal for `event` and returns whether it was set.
    ///
    /// For bulk events only the bit of the named endpoint is consumed.
    pub fn take(&self, event: Event) -> bool {
        match event {
            Event::ControlInComplete => self.control_in.swap(false, Ordering::AcqRel),
            Event::ControlOutReceived => self.control_out.swap(false, Ordering::AcqRel),
            Event::BulkOutReady(n) => take_bits(&self.bulk_out, endpoint_bit(n)) != 0,
            Event::BulkInFree(n) => take_bits(&self.bulk_in, endpoint_bit(n)) != 0,
            Event::BusReset => self.bus_reset.swap(false, Ordering::AcqRel),
        }
    }

    /// Consumer side: clears the bulk OUT bits in `mask` and returns which of them were set.
    pub fn take_bulk_out(&self, mask: u16) -> u16 {
        take_bits(&self.bulk_out, mask)
    }

    /// Consumer side: clears the bulk IN bits in `mask` and returns which of them were set.
    pub fn take_bulk_in(&self, mask: u16) -> u16 {
        take_bits(&self.bulk_in, mask)
    }

    /// Consumer side: clears every signal.
    pub fn clear(&self) {
        self.control_in.store(false, Ordering::Release);
        self.control_out.store(false, Ordering::Release);
        self.bulk_out.store(0, Ordering::Release);
        self.bulk_in.store(0, Ordering::Release);
        self.bus_reset.store(false, Ordering::Release);
    }

    /// Returns whether the signal for `event` is set without consuming it.
    pub fn is_raised(&self, event: Event) -> bool {
        match event {
            Event::ControlInComplete => self.control_in.load(Ordering::Acquire),
            Event::ControlOutReceived => self.control_out.load(Ordering::Acquire),
            Event::BulkOutReady(n) => self.bulk_out.load(Ordering::Acquire) & endpoint_bit(n) != 0,
            Event::BulkInFree(n) => self.bulk_in.load(Ordering::Acquire) & endpoint_bit(n) != 0,
            Event::BusReset => self.bus_reset.load(Ordering::Acquire),
        }
    }
}

impl Default for Signals {
    fn default() -> Self {
        Self::new()
    }
}

fn endpoint_bit(number: u8) -> u16 {
    1 << (number & 0x0f)
}

fn take_bits(flags: &AtomicU16, mask: u16) -> u16 {
    flags.fetch_and(!mask, Ordering::AcqRel) & mask
}

/// State shared by the interrupt handlers and the foreground loop. Usually placed in a `static`.
pub struct UsbShared {
    /// The SETUP packet mailbox.
    pub setup: SetupMailbox,
    /// Event flags.
    pub signals: Signals,
}

impl UsbShared {
    /// Creates the shared state with no pending events.
    pub const fn new() -> Self {
        UsbShared {
            setup: SetupMailbox::new(),
            signals: Signals::new(),
        }
    }
}

impl Default for UsbShared {
    fn default() -> Self {
        Self::new()
    }
}
