//! The foreground half of the device: signal consumption, request dispatch and bus reset.

use crate::bulk::{BulkBuffers, BulkHandoff};
use crate::bus::UsbBus;
use crate::class::{ControlInResult, ControlOutResult, UsbClass};
use crate::config::{self, DeviceConfigState, DEFAULT_ALTERNATE_SETTING};
use crate::control::{Request, RequestType};
use crate::control_pipe::ControlPipe;
use crate::descriptor::DescriptorStore;
use crate::endpoint::{EndpointAddress, EndpointState, EndpointTable};
use crate::signal::{Event, UsbShared};
use crate::{Result, UsbDirection, UsbError};

pub use crate::control_pipe::ControlStage;

/// The global state of the USB device.
///
/// In general class traffic is only possible in the `Configured` state.
#[repr(u8)]
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UsbDeviceState {
    /// The USB device has just been created or reset.
    Default,

    /// The USB device has received an address from the host.
    Addressed,

    /// The USB device has been configured and is fully functional.
    Configured,
}

pub(crate) type ClassList<'c> = [&'c mut dyn UsbClass];

/// The foreground half of a USB device.
///
/// Consumes the signals raised by [`InterruptService`](crate::interrupt::InterruptService),
/// answers standard control requests from the [`DescriptorStore`], offers class and vendor requests
/// to the application's [`UsbClass`] handlers and moves bulk data through [`BulkBuffers`].
pub struct UsbDevice<'a, B: UsbBus> {
    pub(crate) bus: &'a B,
    pub(crate) shared: &'a UsbShared,
    pub(crate) descriptors: &'a DescriptorStore<'a>,
    pub(crate) control: ControlPipe<'a, B>,
    pub(crate) endpoints: EndpointTable,
    pub(crate) config: DeviceConfigState,
    pub(crate) bulk: BulkHandoff,
    pub(crate) device_state: UsbDeviceState,
    pub(crate) remote_wakeup_enabled: bool,
    pub(crate) pending_address: Option<u8>,
}

impl<'a, B: UsbBus> UsbDevice<'a, B> {
    /// Creates the device: loads the descriptor tables, resets endpoint and configuration state,
    /// discards stale signals and enables the bus interrupts. Call once at start-up, before the
    /// interrupt handlers can run.
    pub fn new(bus: &'a B, shared: &'a UsbShared, descriptors: &'a DescriptorStore<'a>) -> Self {
        debug_assert!(descriptors.validate().is_ok(), "inconsistent descriptor tables");

        let max_packet_size_0 = descriptors.max_packet_size_0();

        let mut dev = UsbDevice {
            bus,
            shared,
            descriptors,
            control: ControlPipe::new(bus, max_packet_size_0),
            endpoints: EndpointTable::new(max_packet_size_0 as u16),
            config: DeviceConfigState::new(),
            bulk: BulkHandoff::new(),
            device_state: UsbDeviceState::Default,
            remote_wakeup_enabled: false,
            pending_address: None,
        };

        let configuration = descriptors.default_configuration().unwrap_or(&[]);
        if dev
            .endpoints
            .load(configuration, |_| DEFAULT_ALTERNATE_SETTING)
            .is_err()
        {
            usb_debug!("too many endpoints in the default configuration");
        }

        shared.setup.take();
        shared.signals.clear();

        bus.enable();

        dev
    }

    /// Gets the current state of the device.
    ///
    /// In general class traffic is only possible in the `Configured` state.
    pub fn state(&self) -> UsbDeviceState {
        self.device_state
    }

    /// Gets the current `bConfigurationValue`, or 0 if the device is not configured.
    pub fn configuration(&self) -> u8 {
        self.config.configuration()
    }

    /// Gets the current alternate setting of an interface of the active configuration.
    pub fn alt_setting(&self, interface: u8) -> Option<u8> {
        self.config.alt_setting(interface)
    }

    /// Gets whether host remote wakeup has been enabled by the host.
    pub fn remote_wakeup_enabled(&self) -> bool {
        self.remote_wakeup_enabled
    }

    /// Gets whether the device reports itself as self powered, according to the attributes of the
    /// active configuration, or the default one when unconfigured.
    pub fn self_powered(&self) -> bool {
        self.active_configuration()
            .or_else(|| self.descriptors.default_configuration())
            .map_or(false, config::is_self_powered)
    }

    /// Gets the stage of the control transfer in progress.
    pub fn control_stage(&self) -> ControlStage {
        self.control.stage()
    }

    /// Gets the state of an endpoint.
    pub fn endpoint(&self, ep_addr: EndpointAddress) -> Option<&EndpointState> {
        self.endpoints.get(ep_addr)
    }

    /// Processes every pending event. Returns `true` if anything happened, `false` otherwise.
    ///
    /// Call this from the foreground loop as often as possible. It never blocks. Events are handled
    /// in a fixed order: bus reset, a new SETUP packet, control OUT data, control IN completion and
    /// finally bulk traffic.
    ///
    /// Note: The list of classes passed in must be the same for every call, or the device may
    /// misbehave. The easiest way to do this is to call the `poll` method in only one place in your
    /// code, as follows:
    ///
    /// ``` ignore
    /// usb_dev.poll(&mut [&mut class1, &mut class2], &mut buffers);
    /// ```
    pub fn poll(&mut self, classes: &mut ClassList<'_>, buffers: &mut dyn BulkBuffers) -> bool {
        let shared = self.shared;
        let mut activity = false;

        if shared.signals.take(Event::BusReset) {
            self.reset(classes);
            activity = true;
        }

        if let Some(packet) = shared.setup.take() {
            // Completions still flagged belong to the transfer this SETUP aborts
            shared.signals.take(Event::ControlInComplete);
            shared.signals.take(Event::ControlOutReceived);
            self.pending_address = None;

            if let Some(req) = self.control.handle_setup(&packet) {
                self.dispatch(req, classes);
            }

            activity = true;
        }

        if shared.signals.take(Event::ControlOutReceived) {
            if let Some(req) = self.control.handle_out() {
                self.dispatch(req, classes);
            }

            activity = true;
        }

        if shared.signals.take(Event::ControlInComplete) {
            let completed = self.control.handle_in_complete();

            if completed {
                if let Some(addr) = self.pending_address.take() {
                    usb_debug!("address {}", addr);
                    self.bus.set_device_address(addr);

                    if self.device_state != UsbDeviceState::Configured {
                        self.device_state = if addr == 0 {
                            UsbDeviceState::Default
                        } else {
                            UsbDeviceState::Addressed
                        };
                    }
                }
            }

            activity = true;
        }

        if self.device_state == UsbDeviceState::Configured {
            activity |= self
                .bulk
                .poll(self.bus, &shared.signals, &self.endpoints, buffers);
        }

        activity
    }

    fn dispatch(&mut self, req: Request, classes: &mut ClassList<'_>) {
        let data_in = req.direction == UsbDirection::In && req.length > 0;

        match req.request_type {
            RequestType::Standard => {
                let result = if data_in {
                    self.standard_control_in(&req)
                } else {
                    self.standard_control_out(&req, classes)
                };

                if let Err(_err) = result {
                    usb_debug!("standard request {} rejected: {:?}", req.request, _err);
                    self.control.reject().ok();
                }
            }

            RequestType::Class | RequestType::Vendor => {
                if data_in {
                    self.class_control_in(&req, classes);
                } else {
                    self.class_control_out(&req, classes);
                }
            }

            RequestType::Reserved => {
                self.control.reject().ok();
            }
        }
    }

    fn class_control_in(&mut self, req: &Request, classes: &mut ClassList<'_>) {
        self.control
            .accept_in(|buf| {
                for cls in classes.iter_mut() {
                    match cls.control_in(req, buf) {
                        ControlInResult::Ignore => continue,
                        ControlInResult::Ok(len) => return Ok(len),
                        ControlInResult::Err => break,
                    }
                }

                Err(UsbError::Unsupported)
            })
            .ok();
    }

    fn class_control_out(&mut self, req: &Request, classes: &mut ClassList<'_>) {
        let data = self.control.data();
        let mut result = ControlOutResult::Ignore;

        for cls in classes.iter_mut() {
            result = cls.control_out(req, data);

            if result != ControlOutResult::Ignore {
                break;
            }
        }

        match result {
            ControlOutResult::Ok => self.control.accept_out(),
            _ => self.control.reject(),
        }
        .ok();
    }

    /// Gets the configuration descriptor of the active configuration, or `None` when unconfigured.
    pub(crate) fn active_configuration(&self) -> Option<&'a [u8]> {
        if self.config.is_configured() {
            self.descriptors.configuration(self.config.configuration())
        } else {
            None
        }
    }

    /// Replaces the endpoint table with the endpoints `configuration` declares for the alternate
    /// settings selected in `state`. Endpoints leaving the table are unstalled. Every data endpoint
    /// of the new table is unstalled and its data toggle reset. On error nothing changes.
    pub(crate) fn switch_endpoints(
        &mut self,
        configuration: &[u8],
        state: &DeviceConfigState,
    ) -> Result<()> {
        let mut endpoints = EndpointTable::new(self.descriptors.max_packet_size_0() as u16);
        endpoints.load(configuration, |interface| {
            state
                .alt_setting(interface)
                .unwrap_or(DEFAULT_ALTERNATE_SETTING)
        })?;

        let bus = self.bus;
        for ep in self.endpoints.data_endpoints() {
            if endpoints.get(ep.address).is_none() {
                bus.set_stalled(ep.address, false);
            }
        }

        self.endpoints = endpoints;
        self.reset_data_endpoints();

        Ok(())
    }

    /// Clears the halt of every data endpoint and resets its data toggle.
    fn reset_data_endpoints(&mut self) {
        let bus = self.bus;

        for ep in self.endpoints.data_endpoints() {
            bus.set_stalled(ep.address, false);
            bus.reset_data_toggle(ep.address);
        }

        self.endpoints.clear_halts();
    }

    fn reset(&mut self, classes: &mut ClassList<'_>) {
        usb_debug!("bus reset");

        self.device_state = UsbDeviceState::Default;
        self.remote_wakeup_enabled = false;
        self.pending_address = None;

        self.control.reset();
        self.config.reset();
        self.bulk.reset();

        let configuration = self.descriptors.default_configuration().unwrap_or(&[]);
        if self
            .switch_endpoints(configuration, &DeviceConfigState::new())
            .is_err()
        {
            usb_debug!("too many endpoints in the default configuration");
        }

        for cls in classes {
            cls.reset();
        }
    }
}
