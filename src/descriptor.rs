//! Descriptor encoding and the read-only descriptor store.
//!
//! Descriptors are encoded at compile time by the `const fn` encoders in this module and served
//! verbatim from [`DescriptorStore`]. The encoders fill in every length and count field
//! (`bLength`, `wTotalLength`, `bNumInterfaces`, `bNumEndpoints`) themselves, so a table built with
//! them is self-describing by construction.

use crate::config::MAX_INTERFACES;
use crate::endpoint::{EndpointAddress, EndpointType, MAX_ENDPOINTS};
use crate::{Result, UsbError};

/// Standard descriptor types.
#[allow(missing_docs)]
pub mod descriptor_type {
    pub const DEVICE: u8 = 1;
    pub const CONFIGURATION: u8 = 2;
    pub const STRING: u8 = 3;
    pub const INTERFACE: u8 = 4;
    pub const ENDPOINT: u8 = 5;
    pub const HID: u8 = 0x21;
    pub const REPORT: u8 = 0x22;
    pub const PHYSICAL: u8 = 0x23;
    pub const HUB: u8 = 0x29;
}

/// String descriptor language IDs.
#[allow(missing_docs)]
pub mod lang_id {
    pub const ENGLISH_US: u16 = 0x0409;
    pub const ENGLISH_UK: u16 = 0x0809;
    pub const GERMAN: u16 = 0x0407;
    pub const GERMAN_CH: u16 = 0x0807;
    pub const GERMAN_AT: u16 = 0x0c07;
    pub const GERMAN_LU: u16 = 0x1007;
    pub const GERMAN_LI: u16 = 0x1407;
}

/// Device and interface class codes.
#[allow(missing_docs)]
pub mod class_code {
    /// Only valid for `bDeviceClass`: the class is specified per interface.
    pub const PER_INTERFACE: u8 = 0x00;
    pub const AUDIO: u8 = 0x01;
    pub const COMM: u8 = 0x02;
    pub const HID: u8 = 0x03;
    pub const PTP: u8 = 0x06;
    pub const PRINTER: u8 = 0x07;
    pub const MASS_STORAGE: u8 = 0x08;
    pub const HUB: u8 = 0x09;
    pub const DATA: u8 = 0x0a;
    pub const VENDOR_SPECIFIC: u8 = 0xff;
}

/// Configuration `bmAttributes` bits.
#[allow(missing_docs)]
pub mod config_attributes {
    /// Must always be set in USB 1.1 and later.
    pub const RESERVED: u8 = 0x80;
    pub const SELF_POWERED: u8 = 0x40;
    pub const REMOTE_WAKEUP: u8 = 0x20;
}

/// Encoded size of a device descriptor.
pub const DEVICE_DESCRIPTOR_LEN: usize = 18;
/// Encoded size of a configuration descriptor header.
pub const CONFIGURATION_DESCRIPTOR_LEN: usize = 9;
/// Encoded size of an interface descriptor.
pub const INTERFACE_DESCRIPTOR_LEN: usize = 9;
/// Encoded size of an endpoint descriptor.
pub const ENDPOINT_DESCRIPTOR_LEN: usize = 7;

/// Device descriptor fields. See USB 1.1 section 9.6.1.
#[derive(Copy, Clone, Debug)]
pub struct DeviceDescriptor {
    /// USB specification release number in BCD, `0x0110` for USB 1.1.
    pub usb_release: u16,
    /// Class code.
    pub device_class: u8,
    /// Subclass code.
    pub device_sub_class: u8,
    /// Protocol code.
    pub device_protocol: u8,
    /// Maximum packet size of endpoint 0. One of 8, 16, 32 or 64.
    pub max_packet_size_0: u8,
    /// Vendor ID.
    pub vendor_id: u16,
    /// Product ID.
    pub product_id: u16,
    /// Device release number in BCD.
    pub device_release: u16,
    /// Index of the manufacturer string, 0 if none.
    pub manufacturer: u8,
    /// Index of the product string, 0 if none.
    pub product: u8,
    /// Index of the serial number string, 0 if none.
    pub serial_number: u8,
    /// Number of configurations.
    pub num_configurations: u8,
}

impl DeviceDescriptor {
    /// Encodes the descriptor.
    pub const fn encode(&self) -> [u8; DEVICE_DESCRIPTOR_LEN] {
        let usb = self.usb_release.to_le_bytes();
        let vid = self.vendor_id.to_le_bytes();
        let pid = self.product_id.to_le_bytes();
        let rel = self.device_release.to_le_bytes();

        [
            DEVICE_DESCRIPTOR_LEN as u8,
            descriptor_type::DEVICE,
            usb[0],
            usb[1],
            self.device_class,
            self.device_sub_class,
            self.device_protocol,
            self.max_packet_size_0,
            vid[0],
            vid[1],
            pid[0],
            pid[1],
            rel[0],
            rel[1],
            self.manufacturer,
            self.product,
            self.serial_number,
            self.num_configurations,
        ]
    }
}

/// Configuration descriptor fields. `wTotalLength` and `bNumInterfaces` are computed by
/// [`encode_configuration`].
#[derive(Copy, Clone, Debug)]
pub struct ConfigurationDescriptor<'a> {
    /// Value used by SET_CONFIGURATION to select this configuration. Must not be 0.
    pub configuration_value: u8,
    /// Index of the configuration string, 0 if none.
    pub configuration_string: u8,
    /// `bmAttributes`, see [`config_attributes`]. The reserved bit is always set by the encoder.
    pub attributes: u8,
    /// Maximum power consumption in 2 mA units.
    pub max_power: u8,
    /// Interfaces, including alternate settings, in descriptor order.
    pub interfaces: &'a [InterfaceDescriptor<'a>],
}

/// Interface descriptor fields. `bNumEndpoints` is computed from `endpoints`.
#[derive(Copy, Clone, Debug)]
pub struct InterfaceDescriptor<'a> {
    /// Interface number.
    pub interface_number: u8,
    /// Alternate setting number.
    pub alternate_setting: u8,
    /// Class code.
    pub interface_class: u8,
    /// Subclass code.
    pub interface_sub_class: u8,
    /// Protocol code.
    pub interface_protocol: u8,
    /// Index of the interface string, 0 if none.
    pub interface_string: u8,
    /// Endpoints used by this alternate setting, excluding endpoint 0.
    pub endpoints: &'a [EndpointDescriptor],
}

/// Endpoint descriptor fields.
#[derive(Copy, Clone, Debug)]
pub struct EndpointDescriptor {
    /// Endpoint address.
    pub address: EndpointAddress,
    /// Transfer type.
    pub ep_type: EndpointType,
    /// Maximum packet size.
    pub max_packet_size: u16,
    /// Polling interval in frames. Ignored for bulk endpoints.
    pub interval: u8,
}

/// Gets the encoded size of a configuration including all nested interface and endpoint
/// descriptors. This is the value of `wTotalLength`.
pub const fn configuration_length(config: &ConfigurationDescriptor<'_>) -> usize {
    let mut len = CONFIGURATION_DESCRIPTOR_LEN;
    let mut i = 0;

    while i < config.interfaces.len() {
        len += INTERFACE_DESCRIPTOR_LEN
            + ENDPOINT_DESCRIPTOR_LEN * config.interfaces[i].endpoints.len();
        i += 1;
    }

    len
}

const fn num_interfaces(config: &ConfigurationDescriptor<'_>) -> u8 {
    let mut count = 0;
    let mut i = 0;

    while i < config.interfaces.len() {
        if config.interfaces[i].alternate_setting == 0 {
            count += 1;
        }
        i += 1;
    }

    count
}

/// Encodes a configuration and all of its interfaces and endpoints into one contiguous descriptor
/// block, as returned by GET_DESCRIPTOR(CONFIGURATION). `N` must equal
/// [`configuration_length`].
pub const fn encode_configuration<const N: usize>(config: &ConfigurationDescriptor<'_>) -> [u8; N] {
    let total = configuration_length(config);
    assert!(total == N, "configuration length does not match the buffer size");
    assert!(total <= u16::MAX as usize, "configuration is too long");
    assert!(config.configuration_value != 0, "configuration value 0 is reserved");

    let mut buf = [0u8; N];
    let total = (total as u16).to_le_bytes();

    buf[0] = CONFIGURATION_DESCRIPTOR_LEN as u8;
    buf[1] = descriptor_type::CONFIGURATION;
    buf[2] = total[0];
    buf[3] = total[1];
    buf[4] = num_interfaces(config);
    buf[5] = config.configuration_value;
    buf[6] = config.configuration_string;
    buf[7] = config.attributes | config_attributes::RESERVED;
    buf[8] = config.max_power;

    let mut pos = CONFIGURATION_DESCRIPTOR_LEN;
    let mut i = 0;

    while i < config.interfaces.len() {
        let iface = &config.interfaces[i];

        buf[pos] = INTERFACE_DESCRIPTOR_LEN as u8;
        buf[pos + 1] = descriptor_type::INTERFACE;
        buf[pos + 2] = iface.interface_number;
        buf[pos + 3] = iface.alternate_setting;
        buf[pos + 4] = iface.endpoints.len() as u8;
        buf[pos + 5] = iface.interface_class;
        buf[pos + 6] = iface.interface_sub_class;
        buf[pos + 7] = iface.interface_protocol;
        buf[pos + 8] = iface.interface_string;
        pos += INTERFACE_DESCRIPTOR_LEN;

        let mut e = 0;
        while e < iface.endpoints.len() {
            let ep = &iface.endpoints[e];
            let mps = ep.max_packet_size.to_le_bytes();

            buf[pos] = ENDPOINT_DESCRIPTOR_LEN as u8;
            buf[pos + 1] = descriptor_type::ENDPOINT;
            buf[pos + 2] = ep.address.to_u8();
            buf[pos + 3] = ep.ep_type as u8;
            buf[pos + 4] = mps[0];
            buf[pos + 5] = mps[1];
            buf[pos + 6] = ep.interval;
            pos += ENDPOINT_DESCRIPTOR_LEN;

            e += 1;
        }

        i += 1;
    }

    buf
}

/// Gets the encoded size of a string descriptor for an ASCII string.
pub const fn string_length(string: &str) -> usize {
    2 + 2 * string.len()
}

/// Encodes an ASCII string as a string descriptor with UTF-16LE code units. `N` must equal
/// [`string_length`]. See also [`string_descriptor!`](crate::string_descriptor).
pub const fn encode_string<const N: usize>(string: &str) -> [u8; N] {
    assert!(string_length(string) == N, "string length does not match the buffer size");
    assert!(N <= u8::MAX as usize, "string is too long for a descriptor");

    let bytes = string.as_bytes();
    let mut buf = [0u8; N];
    buf[0] = N as u8;
    buf[1] = descriptor_type::STRING;

    let mut i = 0;
    while i < bytes.len() {
        assert!(bytes[i] < 0x80, "only ASCII strings can be encoded at compile time");
        buf[2 + 2 * i] = bytes[i];
        i += 1;
    }

    buf
}

/// Gets the encoded size of a language descriptor.
pub const fn language_length(langs: &[u16]) -> usize {
    2 + 2 * langs.len()
}

/// Encodes the language descriptor (string index 0) listing `langs`. `N` must equal
/// [`language_length`]. See also [`language_descriptor!`](crate::language_descriptor).
pub const fn encode_languages<const N: usize>(langs: &[u16]) -> [u8; N] {
    assert!(language_length(langs) == N, "language list does not match the buffer size");

    let mut buf = [0u8; N];
    buf[0] = N as u8;
    buf[1] = descriptor_type::STRING;

    let mut i = 0;
    while i < langs.len() {
        let lang = langs[i].to_le_bytes();
        buf[2 + 2 * i] = lang[0];
        buf[3 + 2 * i] = lang[1];
        i += 1;
    }

    buf
}

/// Iterator over the descriptors in a contiguous descriptor block, such as a full configuration.
///
/// Iteration stops at the first descriptor with a length shorter than 2 or extending past the end
/// of the block.
pub struct Descriptors<'a> {
    buf: &'a [u8],
}

impl<'a> Descriptors<'a> {
    /// Creates an iterator over `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Descriptors { buf }
    }
}

impl<'a> Iterator for Descriptors<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        let len = *self.buf.first()? as usize;

        if len < 2 || len > self.buf.len() {
            self.buf = &[];
            return None;
        }

        let (desc, rest) = self.buf.split_at(len);
        self.buf = rest;
        Some(desc)
    }
}

/// String descriptors for one language.
#[derive(Copy, Clone)]
pub struct StringTable<'a> {
    /// The language ID the strings are in.
    pub lang_id: u16,
    /// Encoded string descriptors. The first entry is string index 1.
    pub strings: &'a [&'a [u8]],
}

/// Read-only table of every descriptor the device serves.
#[derive(Copy, Clone)]
pub struct DescriptorStore<'a> {
    /// Encoded device descriptor.
    pub device: &'a [u8],
    /// Encoded configurations, each including its nested interface and endpoint descriptors. The
    /// first entry is the default configuration.
    pub configurations: &'a [&'a [u8]],
    /// Encoded language descriptor, served as string index 0.
    pub languages: &'a [u8],
    /// String descriptors per supported language.
    pub strings: &'a [StringTable<'a>],
}

impl<'a> DescriptorStore<'a> {
    /// Looks up a descriptor by type, index and language. Returns `None` if the descriptor does not
    /// exist.
    ///
    /// The device descriptor ignores `index` and `lang_id`. Configurations ignore `lang_id` and
    /// fall back to the default configuration for an out of range index. String index 0 is the
    /// language descriptor regardless of `lang_id`; other strings must exist in the requested
    /// language.
    /// Interface and endpoint descriptors are only served as part of their configuration.
    pub fn get_descriptor(&self, dtype: u8, index: u8, lang_id: u16) -> Option<&'a [u8]> {
        match dtype {
            descriptor_type::DEVICE => Some(self.device),

            descriptor_type::CONFIGURATION => self
                .configurations
                .get(index as usize)
                .or_else(|| self.configurations.first())
                .copied(),

            descriptor_type::STRING => {
                if index == 0 {
                    Some(self.languages)
                } else {
                    self.string(index, lang_id)
                }
            }

            _ => None,
        }
    }

    fn string(&self, index: u8, lang_id: u16) -> Option<&'a [u8]> {
        self.strings
            .iter()
            .find(|table| table.lang_id == lang_id)?
            .strings
            .get(index as usize - 1)
            .copied()
    }

    /// Gets the maximum packet size of endpoint 0 declared by the device descriptor.
    pub fn max_packet_size_0(&self) -> u8 {
        match self.device.get(7) {
            Some(&size @ (8 | 16 | 32 | 64)) => size,
            _ => 8,
        }
    }

    /// Gets the configuration whose `bConfigurationValue` is `value`.
    pub fn configuration(&self, value: u8) -> Option<&'a [u8]> {
        self.configurations
            .iter()
            .copied()
            .find(|config| config.get(5) == Some(&value))
    }

    /// Gets the default (first) configuration.
    pub fn default_configuration(&self) -> Option<&'a [u8]> {
        self.configurations.first().copied()
    }

    /// Gets the language IDs listed in the language descriptor.
    pub fn lang_ids(&self) -> impl Iterator<Item = u16> + 'a {
        self.languages
            .get(2..)
            .unwrap_or(&[])
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
    }

    /// Checks that every descriptor is self-describing: each `bLength` matches its encoded size,
    /// the configuration `wTotalLength` and counts match the nested descriptors, and every string
    /// table language is listed in the language descriptor. Also checks that every configuration
    /// fits the device's interface and endpoint tables.
    ///
    /// # Errors
    ///
    /// * [`ParseError`](crate::UsbError::ParseError) - A descriptor is inconsistent.
    /// * [`BufferOverflow`](crate::UsbError::BufferOverflow) - A configuration declares more than
    ///   [`MAX_INTERFACES`] interfaces, or more endpoints than [`MAX_ENDPOINTS`] minus the two
    ///   halves of endpoint 0.
    pub fn validate(&self) -> Result<()> {
        check_header(self.device, descriptor_type::DEVICE)?;
        if self.device.len() != DEVICE_DESCRIPTOR_LEN
            || self.device[17] as usize != self.configurations.len()
        {
            return Err(UsbError::ParseError);
        }

        if self.configurations.is_empty() {
            return Err(UsbError::ParseError);
        }

        for config in self.configurations {
            validate_configuration(config)?;
        }

        check_header(self.languages, descriptor_type::STRING)?;
        if self.languages.len() % 2 != 0 {
            return Err(UsbError::ParseError);
        }

        for table in self.strings {
            if !self.lang_ids().any(|id| id == table.lang_id) {
                return Err(UsbError::ParseError);
            }

            for s in table.strings {
                check_header(s, descriptor_type::STRING)?;
            }
        }

        Ok(())
    }
}

fn check_header(desc: &[u8], dtype: u8) -> Result<()> {
    if desc.len() < 2 || desc[0] as usize != desc.len() || desc[1] != dtype {
        return Err(UsbError::ParseError);
    }

    Ok(())
}

fn validate_configuration(config: &[u8]) -> Result<()> {
    if config.len() < CONFIGURATION_DESCRIPTOR_LEN
        || config[0] as usize != CONFIGURATION_DESCRIPTOR_LEN
        || config[1] != descriptor_type::CONFIGURATION
        || u16::from_le_bytes([config[2], config[3]]) as usize != config.len()
    {
        return Err(UsbError::ParseError);
    }

    let mut total = 0;
    let mut interfaces = 0;
    let mut expected_endpoints = 0;
    // One bit per endpoint address, OUT in the low half
    let mut addresses = 0u32;

    for desc in Descriptors::new(config) {
        total += desc.len();

        match desc[1] {
            descriptor_type::INTERFACE => {
                if desc.len() != INTERFACE_DESCRIPTOR_LEN || expected_endpoints != 0 {
                    return Err(UsbError::ParseError);
                }

                if desc[3] == 0 {
                    interfaces += 1;
                }
                expected_endpoints = desc[4];
            }
            descriptor_type::ENDPOINT => {
                if desc.len() != ENDPOINT_DESCRIPTOR_LEN || expected_endpoints == 0 {
                    return Err(UsbError::ParseError);
                }

                expected_endpoints -= 1;

                let address = EndpointAddress::from(desc[2]);
                if address.number() != 0 {
                    let half = if desc[2] & 0x80 != 0 { 16 } else { 0 };
                    addresses |= 1 << (half + address.number());
                }
            }
            _ => {}
        }
    }

    if total != config.len() || interfaces != config[4] || expected_endpoints != 0 {
        return Err(UsbError::ParseError);
    }

    // Endpoint 0 takes two entries of the endpoint table
    if interfaces as usize > MAX_INTERFACES
        || addresses.count_ones() as usize + 2 > MAX_ENDPOINTS
    {
        return Err(UsbError::BufferOverflow);
    }

    Ok(())
}
