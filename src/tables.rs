//! Default descriptor tables: a vendor-specific JTAG adapter with one bulk OUT and one bulk IN
//! endpoint.

use crate::descriptor::{
    class_code, configuration_length, encode_configuration, lang_id, ConfigurationDescriptor,
    DescriptorStore, DeviceDescriptor, EndpointDescriptor, InterfaceDescriptor, StringTable,
    DEVICE_DESCRIPTOR_LEN,
};
use crate::endpoint::{EndpointAddress, EndpointType};
use crate::UsbDirection;

/// Vendor ID.
pub const VENDOR_ID: u16 = 0xc251;

/// Product ID.
pub const PRODUCT_ID: u16 = 0x2710;

/// Maximum packet size of endpoint 0.
pub const MAX_PACKET_SIZE_0: u8 = 64;

/// Maximum packet size of the bulk endpoints.
pub const BULK_PACKET_SIZE: u16 = 64;

/// The bulk OUT endpoint commands arrive on.
pub const EP_COMMAND_OUT: EndpointAddress = EndpointAddress::from_parts(2, UsbDirection::Out);

/// The bulk IN endpoint responses are sent on.
pub const EP_RESPONSE_IN: EndpointAddress = EndpointAddress::from_parts(2, UsbDirection::In);

/// The `bConfigurationValue` of the only configuration.
pub const CONFIGURATION_VALUE: u8 = 1;

const DEVICE: DeviceDescriptor = DeviceDescriptor {
    usb_release: 0x0110,
    device_class: class_code::VENDOR_SPECIFIC,
    device_sub_class: 0xff,
    device_protocol: 0xff,
    max_packet_size_0: MAX_PACKET_SIZE_0,
    vendor_id: VENDOR_ID,
    product_id: PRODUCT_ID,
    device_release: 0x0100,
    manufacturer: 1,
    product: 2,
    serial_number: 3,
    num_configurations: 1,
};

const ENDPOINTS: &[EndpointDescriptor] = &[
    EndpointDescriptor {
        address: EP_COMMAND_OUT,
        ep_type: EndpointType::Bulk,
        max_packet_size: BULK_PACKET_SIZE,
        interval: 0,
    },
    EndpointDescriptor {
        address: EP_RESPONSE_IN,
        ep_type: EndpointType::Bulk,
        max_packet_size: BULK_PACKET_SIZE,
        interval: 0,
    },
];

const INTERFACES: &[InterfaceDescriptor] = &[InterfaceDescriptor {
    interface_number: 0,
    alternate_setting: 0,
    interface_class: class_code::VENDOR_SPECIFIC,
    interface_sub_class: 0xff,
    interface_protocol: 0xff,
    interface_string: 4,
    endpoints: ENDPOINTS,
}];

const CONFIGURATION: ConfigurationDescriptor = ConfigurationDescriptor {
    configuration_value: CONFIGURATION_VALUE,
    configuration_string: 0,
    // Bus powered, no remote wakeup
    attributes: 0,
    // 100 mA
    max_power: 50,
    interfaces: INTERFACES,
};

static DEVICE_BYTES: [u8; DEVICE_DESCRIPTOR_LEN] = DEVICE.encode();

static CONFIGURATION_BYTES: [u8; configuration_length(&CONFIGURATION)] =
    encode_configuration(&CONFIGURATION);

static STRINGS_EN_US: [&[u8]; 4] = [
    string_descriptor!("OpenULINK"),
    string_descriptor!("ULINK"),
    string_descriptor!("000001"),
    string_descriptor!("JTAG Adapter"),
];

/// The default descriptor set.
pub static DESCRIPTORS: DescriptorStore<'static> = DescriptorStore {
    device: &DEVICE_BYTES,
    configurations: &[&CONFIGURATION_BYTES],
    languages: language_descriptor!(lang_id::ENGLISH_US),
    strings: &[StringTable {
        lang_id: lang_id::ENGLISH_US,
        strings: &STRINGS_EN_US,
    }],
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::descriptor_type;

    #[test]
    fn tables_are_consistent() {
        assert_eq!(DESCRIPTORS.validate(), Ok(()));
        assert_eq!(DESCRIPTORS.max_packet_size_0(), 64);
    }

    #[test]
    fn device_descriptor() {
        let device = DESCRIPTORS
            .get_descriptor(descriptor_type::DEVICE, 0, 0)
            .unwrap();

        assert_eq!(
            device,
            &[
                18, 1, 0x10, 0x01, 0xff, 0xff, 0xff, 64, 0x51, 0xc2, 0x10, 0x27, 0x00, 0x01, 1, 2,
                3, 1
            ]
        );
    }

    #[test]
    fn configuration_descriptor() {
        let config = DESCRIPTORS
            .get_descriptor(descriptor_type::CONFIGURATION, 0, 0)
            .unwrap();

        assert_eq!(config.len(), 32);
        assert_eq!(&config[..9], &[9, 2, 32, 0, 1, 1, 0, 0x80, 50]);
        assert_eq!(&config[9..18], &[9, 4, 0, 0, 2, 0xff, 0xff, 0xff, 4]);
        assert_eq!(&config[18..25], &[7, 5, 0x02, 0x02, 64, 0, 0]);
        assert_eq!(&config[25..32], &[7, 5, 0x82, 0x02, 64, 0, 0]);
    }

    #[test]
    fn every_descriptor_starts_with_its_length() {
        let lookups = [
            (descriptor_type::DEVICE, 0),
            (descriptor_type::CONFIGURATION, 0),
            (descriptor_type::STRING, 0),
            (descriptor_type::STRING, 1),
            (descriptor_type::STRING, 2),
            (descriptor_type::STRING, 3),
            (descriptor_type::STRING, 4),
        ];

        for (dtype, index) in lookups {
            let desc = DESCRIPTORS
                .get_descriptor(dtype, index, lang_id::ENGLISH_US)
                .unwrap();

            assert_eq!(desc[0] as usize, desc.len());
            assert_eq!(desc[1], dtype);
        }
    }

    #[test]
    fn strings() {
        let product = DESCRIPTORS
            .get_descriptor(descriptor_type::STRING, 2, lang_id::ENGLISH_US)
            .unwrap();
        assert_eq!(product, &[12, 3, b'U', 0, b'L', 0, b'I', 0, b'N', 0, b'K', 0]);

        assert_eq!(
            DESCRIPTORS.get_descriptor(descriptor_type::STRING, 5, lang_id::ENGLISH_US),
            None
        );
        assert_eq!(
            DESCRIPTORS.get_descriptor(descriptor_type::STRING, 1, lang_id::GERMAN),
            None
        );
    }
}
