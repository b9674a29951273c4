use crate::bus::UsbBus;
use crate::control::{FeatureSelector, Recipient, Request, StandardRequest};
use crate::config::DeviceConfigState;
use crate::device::{ClassList, UsbDevice, UsbDeviceState};
use crate::endpoint::{EndpointAddress, EndpointType};
use crate::{Result, UsbDirection, UsbError};

impl<'a, B: UsbBus> UsbDevice<'a, B> {
    /// Handles a standard request without an IN data stage. Every supported request here is a
    /// host-to-device request without data stage; anything else is rejected. On success the status
    /// stage has been started.
    pub(crate) fn standard_control_out(
        &mut self,
        req: &Request,
        classes: &mut ClassList<'_>,
    ) -> Result<()> {
        use FeatureSelector as fs;
        use Recipient as r;
        use StandardRequest as sr;

        let request = req.standard_request().ok_or(UsbError::Unsupported)?;
        let feature = FeatureSelector::try_from(req.value).ok();

        if req.direction != UsbDirection::Out || req.length != 0 {
            return Err(UsbError::Unsupported);
        }

        match (req.recipient, request, feature) {
            (r::Device, sr::ClearFeature, Some(fs::DeviceRemoteWakeup)) => {
                self.remote_wakeup_enabled = false;
            }

            (r::Endpoint, sr::ClearFeature, Some(fs::EndpointHalt)) => {
                let ep = endpoint_from_index(req.index)?;
                self.endpoints.set_halted(ep, false)?;
                self.bus.set_stalled(ep, false);
                self.bus.reset_data_toggle(ep);
            }

            (r::Device, sr::SetFeature, Some(fs::DeviceRemoteWakeup)) => {
                self.remote_wakeup_enabled = true;
            }

            (r::Endpoint, sr::SetFeature, Some(fs::EndpointHalt)) => {
                let ep = endpoint_from_index(req.index)?;
                self.endpoints.set_halted(ep, true)?;
                self.bus.set_stalled(ep, true);
            }

            (r::Device, sr::SetAddress, _) => {
                if req.value > 127 {
                    return Err(UsbError::Unsupported);
                }

                // Takes effect once the status stage has completed
                self.pending_address = Some(req.value as u8);
            }

            (r::Device, sr::SetConfiguration, _) => {
                let value = u8::try_from(req.value).map_err(|_| UsbError::Unsupported)?;
                self.set_configuration(value, classes)?;
            }

            (r::Interface, sr::SetInterface, _) => {
                let interface = u8::try_from(req.index).map_err(|_| UsbError::Unsupported)?;
                let alt_setting = u8::try_from(req.value).map_err(|_| UsbError::Unsupported)?;
                self.set_interface(interface, alt_setting, classes)?;
            }

            // SET_DESCRIPTOR is not supported, descriptors are read-only
            _ => return Err(UsbError::Unsupported),
        }

        self.control.accept_out()
    }

    /// Handles a standard request with an IN data stage. On success the data stage has been
    /// started.
    pub(crate) fn standard_control_in(&mut self, req: &Request) -> Result<()> {
        use Recipient as r;
        use StandardRequest as sr;

        let request = req.standard_request().ok_or(UsbError::Unsupported)?;

        match (req.recipient, request) {
            (r::Device, sr::GetStatus) => {
                let status: u16 = 0x0000
                    | if self.self_powered() { 0x0001 } else { 0x0000 }
                    | if self.remote_wakeup_enabled { 0x0002 } else { 0x0000 };

                self.accept_with(&status.to_le_bytes())
            }

            (r::Endpoint, sr::GetStatus) => {
                let ep = endpoint_from_index(req.index)?;
                let state = self.endpoints.get(ep).ok_or(UsbError::InvalidEndpoint)?;

                let status: u16 = if state.halted { 0x0001 } else { 0x0000 };

                self.accept_with(&status.to_le_bytes())
            }

            (r::Device, sr::GetDescriptor) => {
                let (dtype, index) = req.descriptor_type_index();

                let descriptor = self
                    .descriptors
                    .get_descriptor(dtype, index, req.index)
                    .ok_or(UsbError::Unsupported)?;

                self.control.accept_in_static(descriptor)
            }

            (r::Device, sr::GetConfiguration) => {
                let value = self.config.configuration();
                self.accept_with(&[value])
            }

            (r::Interface, sr::GetInterface) => {
                if !self.config.is_configured() {
                    return Err(UsbError::InvalidState);
                }

                let interface = u8::try_from(req.index).map_err(|_| UsbError::Unsupported)?;
                let alt_setting = self
                    .config
                    .alt_setting(interface)
                    .ok_or(UsbError::Unsupported)?;

                self.accept_with(&[alt_setting])
            }

            (r::Endpoint, sr::SynchFrame) => {
                let ep = endpoint_from_index(req.index)?;
                let state = self.endpoints.get(ep).ok_or(UsbError::InvalidEndpoint)?;

                if state.ep_type != EndpointType::Isochronous {
                    return Err(UsbError::Unsupported);
                }

                let frame = self.bus.frame_number()?;
                self.accept_with(&frame.to_le_bytes())
            }

            _ => Err(UsbError::Unsupported),
        }
    }

    fn accept_with(&mut self, data: &[u8]) -> Result<()> {
        self.control.accept_in(|buf| {
            let dest = buf.get_mut(..data.len()).ok_or(UsbError::BufferOverflow)?;
            dest.copy_from_slice(data);
            Ok(data.len())
        })
    }

    fn set_configuration(&mut self, value: u8, classes: &mut ClassList<'_>) -> Result<()> {
        if value == 0 {
            usb_debug!("unconfigured");

            let configuration = self.descriptors.default_configuration().unwrap_or(&[]);
            self.switch_endpoints(configuration, &DeviceConfigState::new())?;
            self.config.reset();
            self.bulk.reset();

            if self.device_state == UsbDeviceState::Configured {
                self.device_state = UsbDeviceState::Addressed;
            }
        } else {
            let configuration = self
                .descriptors
                .configuration(value)
                .ok_or(UsbError::Unsupported)?;

            usb_debug!("configuration {}", value);

            let mut state = DeviceConfigState::new();
            state.configure(configuration)?;
            self.switch_endpoints(configuration, &state)?;
            self.config = state;

            self.bulk
                .configure(self.bus, &self.shared.signals, &self.endpoints);

            self.device_state = UsbDeviceState::Configured;
        }

        for cls in classes.iter_mut() {
            cls.reset();
            cls.configured(value);
        }

        Ok(())
    }

    fn set_interface(
        &mut self,
        interface: u8,
        alt_setting: u8,
        classes: &mut ClassList<'_>,
    ) -> Result<()> {
        let configuration = self.active_configuration().ok_or(UsbError::InvalidState)?;

        let mut state = self.config.clone();
        state.set_alt_setting(configuration, interface, alt_setting)?;
        self.switch_endpoints(configuration, &state)?;
        self.config = state;

        // Endpoints of the new setting start out free and armed
        self.bulk
            .configure(self.bus, &self.shared.signals, &self.endpoints);

        usb_debug!("interface {} alternate setting {}", interface, alt_setting);

        for cls in classes.iter_mut() {
            cls.alt_setting_changed(interface, alt_setting);
        }

        Ok(())
    }
}

fn endpoint_from_index(index: u16) -> Result<EndpointAddress> {
    EndpointAddress::from_request_index(index).ok_or(UsbError::InvalidEndpoint)
}
