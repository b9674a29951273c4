#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};

use usb_control_core::bulk::BulkBuffers;
use usb_control_core::bus::UsbBus;
use usb_control_core::class::{ControlInResult, ControlOutResult, UsbClass};
use usb_control_core::control::{Request, RequestType};
use usb_control_core::descriptor::{
    config_attributes, configuration_length, encode_configuration, lang_id,
    ConfigurationDescriptor, DescriptorStore, DeviceDescriptor, EndpointDescriptor,
    InterfaceDescriptor, StringTable, DEVICE_DESCRIPTOR_LEN,
};
use usb_control_core::device::UsbDevice;
use usb_control_core::endpoint::{EndpointAddress, EndpointType};
use usb_control_core::interrupt::{InterruptService, InterruptSource};
use usb_control_core::{language_descriptor, string_descriptor, tables};
use usb_control_core::{Result, UsbDirection, UsbError, UsbShared};

// This drives the device through a simulated host and transceiver. Everything runs on the test
// thread; "interrupts" are raised explicitly between calls to `poll`.

pub const EP0_OUT: u8 = 0x00;
pub const EP0_IN: u8 = 0x80;

pub const HW_PACKET_SIZE: usize = 64;

#[derive(Default)]
struct BusState {
    enabled: bool,
    setup: [u8; 8],
    cleared: Vec<InterruptSource>,
    in_buffers: HashMap<u8, Vec<u8>>,
    out_buffers: HashMap<u8, Vec<u8>>,
    armed: HashSet<u8>,
    stalled: HashSet<u8>,
    toggle_resets: HashMap<u8, usize>,
    address: Option<u8>,
    frame: u16,
}

/// A transceiver that records what the device does to it.
#[derive(Default)]
pub struct MockBus {
    state: RefCell<BusState>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host side: sends a SETUP packet. Like real hardware this clears an endpoint 0 stall and
    /// flushes both endpoint 0 buffers.
    pub fn host_setup(&self, packet: [u8; 8]) {
        let mut s = self.state.borrow_mut();
        s.setup = packet;
        s.stalled.remove(&EP0_OUT);
        s.stalled.remove(&EP0_IN);
        s.in_buffers.remove(&EP0_IN);
        s.out_buffers.remove(&EP0_OUT);
        s.armed.remove(&EP0_OUT);
    }

    /// Host side: sends an OUT packet. Returns `false` if the endpoint NAKs or STALLs it.
    pub fn host_out(&self, ep: u8, data: &[u8]) -> bool {
        let mut s = self.state.borrow_mut();

        if s.stalled.contains(&ep) || !s.armed.remove(&ep) {
            return false;
        }

        s.out_buffers.insert(ep, data.to_vec());
        true
    }

    /// Host side: takes the packet waiting on an IN endpoint, if any.
    pub fn host_in(&self, ep: u8) -> Option<Vec<u8>> {
        let mut s = self.state.borrow_mut();

        if s.stalled.contains(&ep) {
            return None;
        }

        s.in_buffers.remove(&ep)
    }

    pub fn pending_in(&self, ep: u8) -> Option<Vec<u8>> {
        self.state.borrow().in_buffers.get(&ep).cloned()
    }

    pub fn is_stalled(&self, ep: u8) -> bool {
        self.state.borrow().stalled.contains(&ep)
    }

    pub fn is_armed(&self, ep: u8) -> bool {
        self.state.borrow().armed.contains(&ep)
    }

    pub fn is_enabled(&self) -> bool {
        self.state.borrow().enabled
    }

    pub fn address(&self) -> Option<u8> {
        self.state.borrow().address
    }

    pub fn toggle_resets(&self, ep: u8) -> usize {
        self.state.borrow().toggle_resets.get(&ep).copied().unwrap_or(0)
    }

    pub fn set_frame(&self, frame: u16) {
        self.state.borrow_mut().frame = frame;
    }

    pub fn set_setup_buffer(&self, packet: [u8; 8]) {
        self.state.borrow_mut().setup = packet;
    }

    pub fn cleared(&self) -> Vec<InterruptSource> {
        self.state.borrow().cleared.clone()
    }
}

impl UsbBus for MockBus {
    fn enable(&self) {
        self.state.borrow_mut().enabled = true;
    }

    fn read_setup(&self) -> [u8; 8] {
        self.state.borrow().setup
    }

    fn clear_interrupt(&self, source: InterruptSource) {
        self.state.borrow_mut().cleared.push(source);
    }

    fn write(&self, ep_addr: EndpointAddress, buf: &[u8]) -> Result<usize> {
        let mut s = self.state.borrow_mut();
        let ep = u8::from(ep_addr);

        if ep_addr.direction() != UsbDirection::In {
            return Err(UsbError::InvalidEndpoint);
        }

        if buf.len() > HW_PACKET_SIZE {
            return Err(UsbError::BufferOverflow);
        }

        if s.in_buffers.contains_key(&ep) {
            return Err(UsbError::WouldBlock);
        }

        s.in_buffers.insert(ep, buf.to_vec());
        Ok(buf.len())
    }

    fn read(&self, ep_addr: EndpointAddress, buf: &mut [u8]) -> Result<usize> {
        let mut s = self.state.borrow_mut();
        let ep = u8::from(ep_addr);

        let data = s.out_buffers.remove(&ep).ok_or(UsbError::WouldBlock)?;

        if data.len() > buf.len() {
            return Err(UsbError::BufferOverflow);
        }

        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }

    fn arm_out(&self, ep_addr: EndpointAddress) {
        self.state.borrow_mut().armed.insert(ep_addr.into());
    }

    fn set_stalled(&self, ep_addr: EndpointAddress, stalled: bool) {
        let mut s = self.state.borrow_mut();
        let ep = u8::from(ep_addr);

        if stalled {
            s.stalled.insert(ep);
        } else {
            s.stalled.remove(&ep);
        }
    }

    fn reset_data_toggle(&self, ep_addr: EndpointAddress) {
        *self
            .state
            .borrow_mut()
            .toggle_resets
            .entry(ep_addr.into())
            .or_insert(0) += 1;
    }

    fn frame_number(&self) -> Result<u16> {
        Ok(self.state.borrow().frame)
    }

    fn set_device_address(&self, addr: u8) {
        self.state.borrow_mut().address = Some(addr);
    }
}

pub const REQ_SET_VALUE: u8 = 1;
pub const REQ_GET_VALUE: u8 = 2;
pub const REQ_STORE: u8 = 3;
pub const REQ_READ: u8 = 4;
pub const REQ_FAIL: u8 = 5;
pub const REQ_UNKNOWN: u8 = 42;

/// Vendor request handler used by the tests.
#[derive(Default)]
pub struct TestClass {
    pub value: u16,
    pub stored: Vec<u8>,
    pub resets: usize,
    pub configured: Option<u8>,
    pub alt_changes: Vec<(u8, u8)>,
}

impl UsbClass for TestClass {
    fn reset(&mut self) {
        self.resets += 1;
    }

    fn configured(&mut self, configuration: u8) {
        self.configured = Some(configuration);
    }

    fn alt_setting_changed(&mut self, interface: u8, alt_setting: u8) {
        self.alt_changes.push((interface, alt_setting));
    }

    fn control_out(&mut self, req: &Request, data: &[u8]) -> ControlOutResult {
        if req.request_type != RequestType::Vendor {
            return ControlOutResult::Ignore;
        }

        match req.request {
            REQ_SET_VALUE => {
                self.value = req.value;
                ControlOutResult::Ok
            }
            REQ_STORE => {
                self.stored = data.to_vec();
                ControlOutResult::Ok
            }
            REQ_FAIL => ControlOutResult::Err,
            _ => ControlOutResult::Ignore,
        }
    }

    fn control_in(&mut self, req: &Request, buf: &mut [u8]) -> ControlInResult {
        if req.request_type != RequestType::Vendor {
            return ControlInResult::Ignore;
        }

        match req.request {
            REQ_GET_VALUE => {
                buf[..2].copy_from_slice(&self.value.to_le_bytes());
                ControlInResult::Ok(2)
            }
            REQ_READ => {
                buf[..self.stored.len()].copy_from_slice(&self.stored);
                ControlInResult::Ok(self.stored.len())
            }
            REQ_FAIL => ControlInResult::Err,
            _ => ControlInResult::Ignore,
        }
    }
}

/// Application bulk buffers used by the tests.
pub struct TestBuffers {
    pub ready: bool,
    /// Length of the receive buffer handed out for OUT packets.
    pub out_len: usize,
    buf: [u8; 64],
    pub received: Vec<(u8, Vec<u8>)>,
    pub outgoing: VecDeque<Vec<u8>>,
}

impl Default for TestBuffers {
    fn default() -> Self {
        TestBuffers {
            ready: true,
            out_len: 64,
            buf: [0; 64],
            received: Vec::new(),
            outgoing: VecDeque::new(),
        }
    }
}

impl BulkBuffers for TestBuffers {
    fn out_buffer(&mut self, _ep: EndpointAddress) -> Option<&mut [u8]> {
        if self.ready {
            Some(&mut self.buf[..self.out_len])
        } else {
            None
        }
    }

    fn out_received(&mut self, ep: EndpointAddress, len: usize) {
        self.received.push((ep.into(), self.buf[..len].to_vec()));
    }

    fn in_data(&mut self, _ep: EndpointAddress) -> Option<&[u8]> {
        self.outgoing.front().map(|data| data.as_slice())
    }

    fn in_loaded(&mut self, _ep: EndpointAddress, len: usize) {
        if let Some(front) = self.outgoing.front_mut() {
            front.drain(..len);

            if front.is_empty() {
                self.outgoing.pop_front();
            }
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum HostError {
    /// The device stalled the transfer.
    Stall,
    /// The device did not respond.
    Nak,
}

pub type HostResult<T> = std::result::Result<T, HostError>;

pub fn setup(request_type: u8, request: u8, value: u16, index: u16, length: u16) -> [u8; 8] {
    let v = value.to_le_bytes();
    let i = index.to_le_bytes();
    let l = length.to_le_bytes();
    [request_type, request, v[0], v[1], i[0], i[1], l[0], l[1]]
}

/// Interrupt source of a data endpoint, given its address.
pub fn endpoint_source(ep: u8) -> InterruptSource {
    let out = if ep & 0x80 != 0 { 0 } else { 1 };
    let vector = u8::from(InterruptSource::Ep0In) + (ep & 0x0f) * 2 + out;
    InterruptSource::try_from(vector).unwrap()
}

/// A device wired to a simulated host.
pub struct Host {
    pub bus: &'static MockBus,
    pub shared: &'static UsbShared,
    pub device: UsbDevice<'static, MockBus>,
    pub class: TestClass,
    pub buffers: TestBuffers,
    pub max_packet_size_0: usize,
}

impl Host {
    pub fn new() -> Self {
        Self::with_descriptors(&tables::DESCRIPTORS)
    }

    pub fn with_descriptors(descriptors: &'static DescriptorStore<'static>) -> Self {
        let bus: &'static MockBus = Box::leak(Box::new(MockBus::new()));
        let shared: &'static UsbShared = Box::leak(Box::new(UsbShared::new()));

        Host {
            bus,
            shared,
            device: UsbDevice::new(bus, shared, descriptors),
            class: TestClass::default(),
            buffers: TestBuffers::default(),
            max_packet_size_0: descriptors.max_packet_size_0() as usize,
        }
    }

    pub fn interrupt(&self, source: InterruptSource) {
        InterruptService::new(self.bus, self.shared).handle(source);
    }

    pub fn poll(&mut self) -> bool {
        self.device.poll(&mut [&mut self.class], &mut self.buffers)
    }

    /// Sends a SETUP packet and lets the device see it.
    pub fn send_setup(&mut self, packet: [u8; 8]) {
        self.bus.host_setup(packet);
        self.interrupt(InterruptSource::SetupData);
        self.poll();
    }

    /// Runs a complete control IN transfer and returns the data stage.
    pub fn control_in(&mut self, packet: [u8; 8]) -> HostResult<Vec<u8>> {
        let length = u16::from_le_bytes([packet[6], packet[7]]) as usize;

        self.send_setup(packet);

        let mut data = Vec::new();

        loop {
            if self.bus.is_stalled(EP0_IN) {
                return Err(HostError::Stall);
            }

            let chunk = self.bus.host_in(EP0_IN).ok_or(HostError::Nak)?;
            assert!(chunk.len() <= self.max_packet_size_0, "packet too long");
            data.extend_from_slice(&chunk);

            self.interrupt(InterruptSource::Ep0In);
            self.poll();

            if chunk.len() < self.max_packet_size_0 || data.len() >= length {
                break;
            }
        }

        assert!(data.len() <= length, "device sent more than requested");

        // Status stage
        if !self.bus.host_out(EP0_OUT, &[]) {
            return Err(if self.bus.is_stalled(EP0_OUT) {
                HostError::Stall
            } else {
                HostError::Nak
            });
        }

        self.interrupt(InterruptSource::Ep0Out);
        self.poll();

        Ok(data)
    }

    /// Runs a complete control OUT transfer, with a data stage if `data` is not empty.
    pub fn control_out(&mut self, packet: [u8; 8], data: &[u8]) -> HostResult<()> {
        self.send_setup(packet);

        for chunk in data.chunks(self.max_packet_size_0) {
            if self.bus.is_stalled(EP0_OUT) {
                return Err(HostError::Stall);
            }

            if !self.bus.host_out(EP0_OUT, chunk) {
                return Err(HostError::Nak);
            }

            self.interrupt(InterruptSource::Ep0Out);
            self.poll();
        }

        // Status stage
        if self.bus.is_stalled(EP0_IN) {
            return Err(HostError::Stall);
        }

        let status = self.bus.host_in(EP0_IN).ok_or(HostError::Nak)?;
        assert!(status.is_empty(), "status stage must be a zero-length packet");

        self.interrupt(InterruptSource::Ep0In);
        self.poll();

        Ok(())
    }

    pub fn get_descriptor(
        &mut self,
        dtype: u8,
        index: u8,
        lang: u16,
        length: u16,
    ) -> HostResult<Vec<u8>> {
        let value = ((dtype as u16) << 8) | index as u16;
        self.control_in(setup(0x80, 6, value, lang, length))
    }

    pub fn get_status(&mut self, request_type: u8, index: u16) -> HostResult<u16> {
        let data = self.control_in(setup(request_type, 0, 0, index, 2))?;
        assert_eq!(data.len(), 2);
        Ok(u16::from_le_bytes([data[0], data[1]]))
    }

    pub fn endpoint_status(&mut self, ep: u8) -> HostResult<u16> {
        self.get_status(0x82, ep as u16)
    }

    pub fn set_feature(&mut self, request_type: u8, feature: u16, index: u16) -> HostResult<()> {
        self.control_out(setup(request_type, 3, feature, index, 0), &[])
    }

    pub fn clear_feature(&mut self, request_type: u8, feature: u16, index: u16) -> HostResult<()> {
        self.control_out(setup(request_type, 1, feature, index, 0), &[])
    }

    pub fn set_address(&mut self, addr: u16) -> HostResult<()> {
        self.control_out(setup(0x00, 5, addr, 0, 0), &[])
    }

    pub fn get_configuration(&mut self) -> HostResult<u8> {
        let data = self.control_in(setup(0x80, 8, 0, 0, 1))?;
        assert_eq!(data.len(), 1);
        Ok(data[0])
    }

    pub fn set_configuration(&mut self, value: u16) -> HostResult<()> {
        self.control_out(setup(0x00, 9, value, 0, 0), &[])
    }

    pub fn get_interface(&mut self, interface: u16) -> HostResult<u8> {
        let data = self.control_in(setup(0x81, 10, 0, interface, 1))?;
        assert_eq!(data.len(), 1);
        Ok(data[0])
    }

    pub fn set_interface(&mut self, interface: u16, alt_setting: u16) -> HostResult<()> {
        self.control_out(setup(0x01, 11, alt_setting, interface, 0), &[])
    }

    /// Enumerates the device: assigns address 5 and selects configuration 1.
    pub fn configure(&mut self) {
        self.set_address(5).expect("set address");
        self.set_configuration(1).expect("set configuration");
    }

    /// Sends a bulk OUT packet and raises its interrupt. Returns `false` if the device NAKed it.
    pub fn bulk_out(&mut self, ep: u8, data: &[u8]) -> bool {
        if !self.bus.host_out(ep, data) {
            return false;
        }

        self.interrupt(endpoint_source(ep));
        true
    }

    /// Takes a bulk IN packet and raises its interrupt.
    pub fn bulk_in(&mut self, ep: u8) -> Option<Vec<u8>> {
        let data = self.bus.host_in(ep)?;
        self.interrupt(endpoint_source(ep));
        Some(data)
    }
}

// A second descriptor set with an 8 byte endpoint 0, two configurations, alternate settings, an
// isochronous endpoint and two languages.

const ALT_DEVICE: DeviceDescriptor = DeviceDescriptor {
    usb_release: 0x0110,
    device_class: 0,
    device_sub_class: 0,
    device_protocol: 0,
    max_packet_size_0: 8,
    vendor_id: 0x1209,
    product_id: 0x0001,
    device_release: 0x0001,
    manufacturer: 1,
    product: 2,
    serial_number: 0,
    num_configurations: 2,
};

const BULK_ENDPOINTS: &[EndpointDescriptor] = &[
    EndpointDescriptor {
        address: EndpointAddress::from_parts(1, UsbDirection::Out),
        ep_type: EndpointType::Bulk,
        max_packet_size: 64,
        interval: 0,
    },
    EndpointDescriptor {
        address: EndpointAddress::from_parts(1, UsbDirection::In),
        ep_type: EndpointType::Bulk,
        max_packet_size: 64,
        interval: 0,
    },
];

const ISO_ENDPOINTS: &[EndpointDescriptor] = &[EndpointDescriptor {
    address: EndpointAddress::from_parts(3, UsbDirection::In),
    ep_type: EndpointType::Isochronous,
    max_packet_size: 128,
    interval: 1,
}];

const fn interface(
    number: u8,
    alt: u8,
    endpoints: &'static [EndpointDescriptor],
) -> InterfaceDescriptor<'static> {
    InterfaceDescriptor {
        interface_number: number,
        alternate_setting: alt,
        interface_class: 0xff,
        interface_sub_class: 0,
        interface_protocol: 0,
        interface_string: 0,
        endpoints,
    }
}

const ALT_CONFIG_1: ConfigurationDescriptor = ConfigurationDescriptor {
    configuration_value: 1,
    configuration_string: 0,
    attributes: 0,
    max_power: 50,
    interfaces: &[
        interface(0, 0, BULK_ENDPOINTS),
        interface(0, 1, ISO_ENDPOINTS),
        interface(1, 0, &[]),
    ],
};

const ALT_CONFIG_2: ConfigurationDescriptor = ConfigurationDescriptor {
    configuration_value: 2,
    configuration_string: 0,
    attributes: config_attributes::SELF_POWERED | config_attributes::REMOTE_WAKEUP,
    max_power: 0,
    interfaces: &[interface(0, 0, BULK_ENDPOINTS)],
};

static ALT_DEVICE_BYTES: [u8; DEVICE_DESCRIPTOR_LEN] = ALT_DEVICE.encode();
static ALT_CONFIG_1_BYTES: [u8; configuration_length(&ALT_CONFIG_1)] =
    encode_configuration(&ALT_CONFIG_1);
static ALT_CONFIG_2_BYTES: [u8; configuration_length(&ALT_CONFIG_2)] =
    encode_configuration(&ALT_CONFIG_2);

static ALT_STRINGS_EN: [&[u8]; 2] = [string_descriptor!("Manufacturer"), string_descriptor!("Alt")];
static ALT_STRINGS_DE: [&[u8]; 1] = [string_descriptor!("Hersteller")];

pub static ALT_DESCRIPTORS: DescriptorStore<'static> = DescriptorStore {
    device: &ALT_DEVICE_BYTES,
    configurations: &[&ALT_CONFIG_1_BYTES, &ALT_CONFIG_2_BYTES],
    languages: language_descriptor!(lang_id::ENGLISH_US, lang_id::GERMAN),
    strings: &[
        StringTable {
            lang_id: lang_id::ENGLISH_US,
            strings: &ALT_STRINGS_EN,
        },
        StringTable {
            lang_id: lang_id::GERMAN,
            strings: &ALT_STRINGS_DE,
        },
    ],
};
