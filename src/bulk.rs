//! Bulk endpoint handoff between the hardware and the application.
//!
//! Readiness arrives from the interrupt handlers as one bit per endpoint number. A bit is
//! remembered locally until the data could actually be moved, so an application that is not ready
//! simply leaves the hardware NAKing.

use crate::bus::UsbBus;
use crate::endpoint::{EndpointAddress, EndpointTable};
use crate::signal::Signals;
use crate::{UsbDirection, UsbError};
use core::cmp::min;

/// Application side of bulk transfers.
pub trait BulkBuffers {
    /// Gets a buffer to receive the next packet from the OUT endpoint `ep`. Returning `None` leaves
    /// the packet in the hardware buffer and the endpoint un-armed; it is offered again on a later
    /// poll.
    ///
    /// The buffer must hold a packet of the endpoint's maximum packet size. A shorter buffer is
    /// treated like `None`.
    fn out_buffer(&mut self, ep: EndpointAddress) -> Option<&mut [u8]>;

    /// Called after `len` bytes have been received into the buffer from
    /// [`out_buffer`](BulkBuffers::out_buffer).
    fn out_received(&mut self, ep: EndpointAddress, len: usize);

    /// Gets the data waiting to be sent on the IN endpoint `ep`, or `None` if there is nothing to
    /// send. At most one packet is taken per call.
    fn in_data(&mut self, ep: EndpointAddress) -> Option<&[u8]>;

    /// Called after the first `len` bytes of [`in_data`](BulkBuffers::in_data) have been loaded
    /// into the hardware.
    fn in_loaded(&mut self, ep: EndpointAddress, len: usize);
}

/// Buffers nothing. Received packets stay in the hardware and nothing is ever sent.
impl BulkBuffers for () {
    fn out_buffer(&mut self, _ep: EndpointAddress) -> Option<&mut [u8]> {
        None
    }

    fn out_received(&mut self, _ep: EndpointAddress, _len: usize) {}

    fn in_data(&mut self, _ep: EndpointAddress) -> Option<&[u8]> {
        None
    }

    fn in_loaded(&mut self, _ep: EndpointAddress, _len: usize) {}
}

pub(crate) struct BulkHandoff {
    out_pending: u16,
    in_free: u16,
}

impl BulkHandoff {
    pub const fn new() -> Self {
        BulkHandoff {
            out_pending: 0,
            in_free: 0,
        }
    }

    /// Drops all remembered readiness.
    pub fn reset(&mut self) {
        self.out_pending = 0;
        self.in_free = 0;
    }

    /// Starts bulk traffic for a freshly activated configuration. Every bulk OUT endpoint is armed
    /// and every bulk IN buffer is free.
    pub fn configure<B: UsbBus>(&mut self, bus: &B, signals: &Signals, endpoints: &EndpointTable) {
        let out_mask = endpoints.bulk_mask(UsbDirection::Out);
        let in_mask = endpoints.bulk_mask(UsbDirection::In);

        // Events from the previous configuration are meaningless now
        signals.take_bulk_out(0xffff);
        signals.take_bulk_in(0xffff);

        self.out_pending = 0;
        self.in_free = in_mask;

        for n in bits(out_mask) {
            bus.arm_out(EndpointAddress::from_parts(n, UsbDirection::Out));
        }
    }

    /// Moves data for every bulk endpoint that is ready. Returns `true` if any data was moved.
    pub fn poll<B: UsbBus>(
        &mut self,
        bus: &B,
        signals: &Signals,
        endpoints: &EndpointTable,
        buffers: &mut dyn BulkBuffers,
    ) -> bool {
        let out_mask = endpoints.bulk_mask(UsbDirection::Out);
        let in_mask = endpoints.bulk_mask(UsbDirection::In);

        self.out_pending |= signals.take_bulk_out(out_mask);
        self.in_free |= signals.take_bulk_in(in_mask);

        let mut activity = false;

        let ready = self.out_pending & !endpoints.halted_mask(UsbDirection::Out);
        for n in bits(ready) {
            let ep = EndpointAddress::from_parts(n, UsbDirection::Out);
            let max_packet_size = endpoints
                .get(ep)
                .map_or(0, |state| state.max_packet_size as usize);

            let buf = match buffers.out_buffer(ep) {
                Some(buf) if buf.len() >= max_packet_size => buf,
                // Stays pending, the hardware keeps NAKing
                _ => continue,
            };

            let result = bus.read(ep, buf);
            self.out_pending &= !ep.bit();

            match result {
                Ok(len) => {
                    usb_trace!("bulk OUT {:?}: {} bytes", ep, len);
                    buffers.out_received(ep, len);
                    activity = true;
                }
                Err(UsbError::WouldBlock) => {
                    // Spurious readiness, the endpoint is still armed
                    continue;
                }
                Err(_err) => {
                    // Longer than the endpoint allows, nothing sensible to keep
                    usb_debug!("bulk OUT {:?} dropped packet: {:?}", ep, _err);
                }
            }

            bus.arm_out(ep);
        }

        let ready = self.in_free & !endpoints.halted_mask(UsbDirection::In);
        for n in bits(ready) {
            let ep = EndpointAddress::from_parts(n, UsbDirection::In);
            let max_packet_size = endpoints
                .get(ep)
                .map_or(0, |state| state.max_packet_size as usize);

            let data = match buffers.in_data(ep) {
                Some(data) => data,
                // The free buffer is remembered until there is something to send
                None => continue,
            };

            let len = min(data.len(), max_packet_size);
            match bus.write(ep, &data[..len]) {
                Ok(written) => {
                    usb_trace!("bulk IN {:?}: {} bytes", ep, written);
                    self.in_free &= !ep.bit();
                    buffers.in_loaded(ep, written);
                    activity = true;
                }
                Err(UsbError::WouldBlock) => {
                    // Still busy after all, wait for the next free event
                    self.in_free &= !ep.bit();
                }
                Err(_err) => {
                    usb_debug!("bulk IN {:?} write failed: {:?}", ep, _err);
                }
            }
        }

        activity
    }
}

/// Iterates over the endpoint numbers set in `mask`, lowest first.
fn bits(mask: u16) -> impl Iterator<Item = u8> {
    (0..16u8).filter(move |n| mask & (1 << n) != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_iteration() {
        let mut it = bits(0b1000_0000_0010_0100);
        assert_eq!(it.next(), Some(2));
        assert_eq!(it.next(), Some(5));
        assert_eq!(it.next(), Some(15));
        assert_eq!(it.next(), None);
        assert_eq!(bits(0).count(), 0);
    }
}
