//! Endpoint addresses and the per-endpoint halt table.

use crate::descriptor::{descriptor_type, Descriptors};
use crate::{Result, UsbDirection, UsbError};
use heapless::Vec;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Maximum number of endpoints tracked by the device, including both directions of endpoint 0.
pub const MAX_ENDPOINTS: usize = 16;

/// USB endpoint address that contains a direction and number.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EndpointAddress(u8);

impl From<u8> for EndpointAddress {
    #[inline]
    fn from(addr: u8) -> EndpointAddress {
        EndpointAddress(addr)
    }
}

impl From<EndpointAddress> for u8 {
    #[inline]
    fn from(addr: EndpointAddress) -> u8 {
        addr.0
    }
}

impl EndpointAddress {
    const INBITS: u8 = UsbDirection::In as u8;

    /// The OUT half of the default control endpoint.
    pub const CONTROL_OUT: EndpointAddress = EndpointAddress(0x00);

    /// The IN half of the default control endpoint.
    pub const CONTROL_IN: EndpointAddress = EndpointAddress(0x80);

    /// Constructs a new EndpointAddress with the given number and direction.
    #[inline]
    pub const fn from_parts(number: u8, dir: UsbDirection) -> Self {
        EndpointAddress((number & 0x0f) | dir as u8)
    }

    /// Gets the raw address byte, as used in `bEndpointAddress`.
    #[inline]
    pub const fn to_u8(self) -> u8 {
        self.0
    }

    /// Extracts an endpoint address from the `wIndex` field of an endpoint-recipient request.
    /// Returns `None` if any reserved bit is set.
    #[inline]
    pub fn from_request_index(index: u16) -> Option<Self> {
        if index & !0x008f != 0 {
            return None;
        }

        Some(EndpointAddress(index as u8))
    }

    /// Gets the direction part of the address.
    #[inline]
    pub fn direction(&self) -> UsbDirection {
        if (self.0 & Self::INBITS) != 0 {
            UsbDirection::In
        } else {
            UsbDirection::Out
        }
    }

    /// Gets the number part of the endpoint address.
    #[inline]
    pub fn number(&self) -> u8 {
        self.0 & 0x0f
    }

    /// Gets the single-bit mask used for this endpoint number in event bit fields.
    #[inline]
    pub fn bit(&self) -> u16 {
        1 << self.number()
    }
}

/// USB endpoint transfer type. The values of this enum can be directly cast into `u8` to get the
/// bmAttributes transfer type bits.
#[repr(u8)]
#[derive(Copy, Clone, Eq, PartialEq, Debug, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EndpointType {
    /// Control endpoint. Used for device management. Only the host can initiate requests. Usually
    /// used only endpoint 0.
    Control = 0b00,

    /// Isochronous endpoint. Used for time-critical unreliable data. Not scheduled by this crate.
    Isochronous = 0b01,

    /// Bulk endpoint. Used for large amounts of best-effort reliable data.
    Bulk = 0b10,

    /// Interrupt endpoint. Used for small amounts of time-critical reliable data.
    Interrupt = 0b11,
}

impl EndpointType {
    /// Gets the transfer type from an endpoint descriptor's `bmAttributes`.
    pub fn from_attributes(attributes: u8) -> EndpointType {
        match attributes & 0b11 {
            0b00 => EndpointType::Control,
            0b01 => EndpointType::Isochronous,
            0b10 => EndpointType::Bulk,
            _ => EndpointType::Interrupt,
        }
    }
}

/// State of a single endpoint.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EndpointState {
    /// Endpoint address.
    pub address: EndpointAddress,

    /// Endpoint transfer type.
    pub ep_type: EndpointType,

    /// Maximum packet size.
    pub max_packet_size: u16,

    /// Whether the endpoint is halted.
    pub halted: bool,
}

impl EndpointState {
    /// Creates a new, not halted endpoint state.
    pub const fn new(
        address: EndpointAddress,
        ep_type: EndpointType,
        max_packet_size: u16,
    ) -> Self {
        EndpointState {
            address,
            ep_type,
            max_packet_size,
            halted: false,
        }
    }

    /// Gets the direction of the endpoint.
    pub fn direction(&self) -> UsbDirection {
        self.address.direction()
    }
}

/// Halt state of every endpoint known to the device.
///
/// The table always contains both halves of endpoint 0 and is otherwise populated from the endpoint
/// descriptors of one configuration. Only the alternate setting currently selected for each
/// interface contributes endpoints.
pub struct EndpointTable {
    endpoints: Vec<EndpointState, MAX_ENDPOINTS>,
}

impl EndpointTable {
    /// Creates a table containing only the control endpoint.
    pub fn new(max_packet_size_0: u16) -> Self {
        let mut endpoints = Vec::new();
        // Capacity is at least two.
        let _ = endpoints.push(EndpointState::new(
            EndpointAddress::CONTROL_OUT,
            EndpointType::Control,
            max_packet_size_0,
        ));
        let _ = endpoints.push(EndpointState::new(
            EndpointAddress::CONTROL_IN,
            EndpointType::Control,
            max_packet_size_0,
        ));

        EndpointTable { endpoints }
    }

    /// Replaces all non-control endpoints with the endpoints declared by `configuration` for the
    /// alternate settings selected by `alt_setting`, which maps an interface number to its current
    /// alternate setting. Every endpoint starts out not halted.
    ///
    /// # Errors
    ///
    /// * [`BufferOverflow`](crate::UsbError::BufferOverflow) - The selected settings declare more
    ///   endpoints than the table can hold. The table is left unchanged.
    pub fn load(&mut self, configuration: &[u8], alt_setting: impl Fn(u8) -> u8) -> Result<()> {
        let mut endpoints = self.endpoints.clone();
        endpoints.truncate(2);

        let mut selected = false;

        for desc in Descriptors::new(configuration) {
            match desc[1] {
                descriptor_type::INTERFACE if desc.len() >= 4 => {
                    selected = alt_setting(desc[2]) == desc[3];
                }
                descriptor_type::ENDPOINT if selected && desc.len() >= 7 => {
                    let address = EndpointAddress::from(desc[2]);
                    if address.number() == 0 || endpoints.iter().any(|ep| ep.address == address) {
                        continue;
                    }

                    let state = EndpointState::new(
                        address,
                        EndpointType::from_attributes(desc[3]),
                        u16::from_le_bytes([desc[4], desc[5]]),
                    );

                    endpoints
                        .push(state)
                        .map_err(|_| UsbError::BufferOverflow)?;
                }
                _ => {}
            }
        }

        self.endpoints = endpoints;
        Ok(())
    }

    /// Gets the state of an endpoint.
    pub fn get(&self, address: EndpointAddress) -> Option<&EndpointState> {
        self.endpoints.iter().find(|ep| ep.address == address)
    }

    /// Sets or clears the halt flag of a non-control endpoint.
    ///
    /// # Errors
    ///
    /// * [`InvalidEndpoint`](crate::UsbError::InvalidEndpoint) - The endpoint is unknown or is a
    ///   control endpoint.
    pub fn set_halted(&mut self, address: EndpointAddress, halted: bool) -> Result<()> {
        match self.endpoints.iter_mut().find(|ep| ep.address == address) {
            Some(ep) if ep.ep_type != EndpointType::Control => {
                ep.halted = halted;
                Ok(())
            }
            _ => Err(UsbError::InvalidEndpoint),
        }
    }

    /// Clears the halt flag on every endpoint.
    pub fn clear_halts(&mut self) {
        for ep in self.endpoints.iter_mut() {
            ep.halted = false;
        }
    }

    /// Iterates over all endpoints.
    pub fn iter(&self) -> impl Iterator<Item = &EndpointState> {
        self.endpoints.iter()
    }

    /// Iterates over the non-control endpoints.
    pub fn data_endpoints(&self) -> impl Iterator<Item = &EndpointState> {
        self.endpoints
            .iter()
            .filter(|ep| ep.ep_type != EndpointType::Control)
    }

    /// Gets a bit field of the numbers of the bulk endpoints in one direction.
    pub fn bulk_mask(&self, direction: UsbDirection) -> u16 {
        self.endpoints
            .iter()
            .filter(|ep| ep.ep_type == EndpointType::Bulk && ep.direction() == direction)
            .fold(0, |mask, ep| mask | ep.address.bit())
    }

    /// Gets a bit field of the numbers of the halted endpoints in one direction.
    pub fn halted_mask(&self, direction: UsbDirection) -> u16 {
        self.endpoints
            .iter()
            .filter(|ep| ep.halted && ep.direction() == direction)
            .fold(0, |mask, ep| mask | ep.address.bit())
    }
}
