use crate::bus::UsbBus;
use crate::control::Request;
use crate::endpoint::EndpointAddress;
use crate::{Result, UsbDirection, UsbError};
use core::cmp::min;

/// Externally visible stage of the control transfer in progress.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlStage {
    /// No control transfer in progress.
    Idle,
    /// A SETUP packet has been taken and is being handled.
    SetupReceived,
    /// Sending the IN data stage.
    DataIn,
    /// Receiving the OUT data stage.
    DataOut,
    /// A request without data stage is being handled.
    NoData,
    /// Waiting for the status stage to complete.
    Status,
    /// Endpoint 0 is stalled until the next SETUP packet.
    Stalled,
}

#[derive(Debug)]
enum ControlState {
    Idle,
    CompleteIn(Request),
    DataIn,
    DataInZlp,
    DataInLast,
    StatusOut,
    DataOut(Request),
    CompleteOut,
    NoData,
    StatusIn,
    Error,
}

// Maximum length of control transfer data stage in bytes. 128 bytes by default. You can define the
// feature "control-buffer-256" to make it 256 bytes if you have larger control transfers.
#[cfg(not(feature = "control-buffer-256"))]
pub(crate) const CONTROL_BUF_LEN: usize = 128;
#[cfg(feature = "control-buffer-256")]
pub(crate) const CONTROL_BUF_LEN: usize = 256;

/// Drives endpoint 0 through the stages of a control transfer.
pub(crate) struct ControlPipe<'a, B: UsbBus> {
    bus: &'a B,
    max_packet_size: usize,
    state: ControlState,
    buf: [u8; CONTROL_BUF_LEN],
    static_in_buf: Option<&'a [u8]>,
    i: usize,
    len: usize,
    in_limit: usize,
}

impl<'a, B: UsbBus> ControlPipe<'a, B> {
    pub fn new(bus: &'a B, max_packet_size: u8) -> ControlPipe<'a, B> {
        ControlPipe {
            bus,
            max_packet_size: max_packet_size as usize,
            state: ControlState::Idle,
            buf: [0; CONTROL_BUF_LEN],
            static_in_buf: None,
            i: 0,
            len: 0,
            in_limit: 0,
        }
    }

    pub fn stage(&self) -> ControlStage {
        match self.state {
            ControlState::Idle => ControlStage::Idle,
            ControlState::CompleteIn(_) => ControlStage::SetupReceived,
            ControlState::DataIn | ControlState::DataInZlp | ControlState::DataInLast => {
                ControlStage::DataIn
            }
            ControlState::DataOut(_) | ControlState::CompleteOut => ControlStage::DataOut,
            ControlState::NoData => ControlStage::NoData,
            ControlState::StatusOut | ControlState::StatusIn => ControlStage::Status,
            ControlState::Error => ControlStage::Stalled,
        }
    }

    pub fn waiting_for_response(&self) -> bool {
        matches!(
            self.state,
            ControlState::CompleteIn(_) | ControlState::CompleteOut | ControlState::NoData
        )
    }

    pub fn data(&self) -> &[u8] {
        &self.buf[0..self.len]
    }

    pub fn reset(&mut self) {
        self.state = ControlState::Idle;
        self.static_in_buf = None;
        self.i = 0;
        self.len = 0;
        self.in_limit = 0;
    }

    /// Starts a new control transfer from a SETUP packet, abandoning any transfer in progress.
    /// Returns the request if it is ready to be handled now.
    pub fn handle_setup(&mut self, packet: &[u8]) -> Option<Request> {
        if !matches!(self.state, ControlState::Idle | ControlState::Error) {
            usb_debug!("SETUP aborts control transfer in {:?}", self.stage());
        }

        self.reset();

        let req = match Request::parse(packet) {
            Ok(req) => req,
            Err(_) => {
                // Failed to parse SETUP packet
                self.set_error();
                return None;
            }
        };

        usb_trace!(
            "SETUP {:?} {:?} {:?} req:{} val:{} idx:{} len:{}",
            req.direction,
            req.request_type,
            req.recipient,
            req.request,
            req.value,
            req.index,
            req.length
        );

        if req.direction == UsbDirection::Out {
            // OUT transfer

            if req.length > 0 {
                // Has data stage

                if req.length as usize > self.buf.len() {
                    // Data stage won't fit in buffer
                    self.set_error();
                    return None;
                }

                self.len = req.length as usize;
                self.state = ControlState::DataOut(req);
                self.bus.arm_out(EndpointAddress::CONTROL_OUT);

                None
            } else {
                // No data stage

                self.state = ControlState::NoData;
                Some(req)
            }
        } else if req.length == 0 {
            // IN request without data stage. Unusual, but valid.

            self.state = ControlState::NoData;
            Some(req)
        } else {
            // IN transfer

            self.state = ControlState::CompleteIn(req);
            Some(req)
        }
    }

    /// Handles an OUT packet on endpoint 0. Returns the request once its data stage is complete.
    pub fn handle_out(&mut self) -> Option<Request> {
        match self.state {
            ControlState::DataOut(req) => {
                let count = match self
                    .bus
                    .read(EndpointAddress::CONTROL_OUT, &mut self.buf[self.i..self.len])
                {
                    Ok(count) => count,
                    Err(UsbError::WouldBlock) => return None,
                    Err(_) => {
                        // Failed to read or buffer overflow (overflow is only possible if the host
                        // sends more data than it indicated in the SETUP request)
                        self.set_error();
                        return None;
                    }
                };

                self.i += count;

                if self.i >= self.len || count < self.max_packet_size {
                    self.len = self.i;
                    self.state = ControlState::CompleteOut;
                    return Some(req);
                }

                self.bus.arm_out(EndpointAddress::CONTROL_OUT);
            }
            ControlState::StatusOut
            | ControlState::DataIn
            | ControlState::DataInZlp
            | ControlState::DataInLast => {
                // Status stage of an IN transfer. The host may also end the data stage early.
                self.bus
                    .read(EndpointAddress::CONTROL_OUT, &mut [])
                    .ok();
                self.reset();
            }
            _ => {
                // Unexpected OUT packet
                self.set_error();
            }
        }

        None
    }

    /// Handles completion of an IN packet on endpoint 0. Returns `true` when the status stage of a
    /// control OUT (or no-data) transfer has completed.
    pub fn handle_in_complete(&mut self) -> bool {
        match self.state {
            ControlState::DataIn => {
                self.write_in_chunk();
            }
            ControlState::DataInZlp => {
                if self.bus.write(EndpointAddress::CONTROL_IN, &[]).is_err() {
                    // There isn't much we can do if the write fails, except to wait for another
                    // poll or for the host to resend the request.
                    return false;
                }

                self.state = ControlState::DataInLast;
            }
            ControlState::DataInLast => {
                self.bus.arm_out(EndpointAddress::CONTROL_OUT);
                self.state = ControlState::StatusOut;
            }
            ControlState::StatusIn => {
                self.reset();
                return true;
            }
            ControlState::Idle | ControlState::Error => {
                // Stale completion from an abandoned transfer
            }
            _ => {
                // Unexpected IN packet
                self.set_error();
            }
        };

        false
    }

    fn write_in_chunk(&mut self) {
        let count = min(self.len - self.i, self.max_packet_size);

        let buffer = self.static_in_buf.unwrap_or(&self.buf);
        if self
            .bus
            .write(EndpointAddress::CONTROL_IN, &buffer[self.i..(self.i + count)])
            .is_err()
        {
            // There isn't much we can do if the write fails, except to wait for another poll or for
            // the host to resend the request.
            return;
        };

        self.i += count;

        if self.i >= self.len {
            self.static_in_buf = None;

            self.state = if count == self.max_packet_size && self.len < self.in_limit {
                ControlState::DataInZlp
            } else {
                ControlState::DataInLast
            };
        }
    }

    /// Acknowledges a control OUT or no-data transfer by sending the zero-length status packet.
    pub fn accept_out(&mut self) -> Result<()> {
        match self.state {
            ControlState::CompleteOut | ControlState::NoData => {}
            _ => return Err(UsbError::InvalidState),
        };

        self.bus.write(EndpointAddress::CONTROL_IN, &[]).ok();
        self.state = ControlState::StatusIn;
        Ok(())
    }

    /// Starts the IN data stage with data written into the internal buffer by `f`.
    pub fn accept_in(&mut self, f: impl FnOnce(&mut [u8]) -> Result<usize>) -> Result<()> {
        let req = match self.state {
            ControlState::CompleteIn(req) => req,
            _ => return Err(UsbError::InvalidState),
        };

        let len = match f(&mut self.buf[..]) {
            Ok(len) => len,
            Err(err) => {
                self.set_error();
                return Err(err);
            }
        };

        if len > self.buf.len() {
            self.set_error();
            return Err(UsbError::BufferOverflow);
        }

        self.start_in_transfer(req, len);
        Ok(())
    }

    /// Starts the IN data stage with data served directly from `data`.
    pub fn accept_in_static(&mut self, data: &'a [u8]) -> Result<()> {
        let req = match self.state {
            ControlState::CompleteIn(req) => req,
            _ => return Err(UsbError::InvalidState),
        };

        self.static_in_buf = Some(data);

        self.start_in_transfer(req, data.len());
        Ok(())
    }

    fn start_in_transfer(&mut self, req: Request, data_len: usize) {
        self.in_limit = req.length as usize;
        self.len = min(data_len, self.in_limit);
        self.i = 0;
        self.state = ControlState::DataIn;
        self.write_in_chunk();
    }

    pub fn reject(&mut self) -> Result<()> {
        if !self.waiting_for_response() {
            return Err(UsbError::InvalidState);
        }

        self.set_error();
        Ok(())
    }

    fn set_error(&mut self) {
        usb_debug!("control transfer stalled");

        self.state = ControlState::Error;
        self.static_in_buf = None;
        self.bus.set_stalled(EndpointAddress::CONTROL_OUT, true);
        self.bus.set_stalled(EndpointAddress::CONTROL_IN, true);
    }
}
