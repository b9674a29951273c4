//! SETUP packet parsing and standard request constants.

use crate::{Result, UsbDirection, UsbError};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Control request type.
#[repr(u8)]
#[derive(Copy, Clone, Eq, PartialEq, Debug, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RequestType {
    /// Request is a USB standard request. Handled by [`UsbDevice`](crate::device::UsbDevice).
    Standard = 0,
    /// Request is intended for a USB class.
    Class = 1,
    /// Request is vendor-specific.
    Vendor = 2,
    /// Reserved.
    Reserved = 3,
}

/// Control request recipient.
#[repr(u8)]
#[derive(Copy, Clone, Eq, PartialEq, Debug, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Recipient {
    /// Request is intended for the entire device.
    Device = 0,
    /// Request is intended for an interface. Generally, the `index` field of the request specifies
    /// the interface number.
    Interface = 1,
    /// Request is intended for an endpoint. Generally, the `index` field of the request specifies
    /// the endpoint address.
    Endpoint = 2,
    /// None of the above.
    Other = 3,
    /// Reserved.
    Reserved = 4,
}

/// Standard request codes (`bRequest`). Values 2 and 4 are reserved by the USB specification.
#[repr(u8)]
#[derive(Copy, Clone, Eq, PartialEq, Debug, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StandardRequest {
    /// GET_STATUS
    GetStatus = 0,
    /// CLEAR_FEATURE
    ClearFeature = 1,
    /// SET_FEATURE
    SetFeature = 3,
    /// SET_ADDRESS
    SetAddress = 5,
    /// GET_DESCRIPTOR
    GetDescriptor = 6,
    /// SET_DESCRIPTOR
    SetDescriptor = 7,
    /// GET_CONFIGURATION
    GetConfiguration = 8,
    /// SET_CONFIGURATION
    SetConfiguration = 9,
    /// GET_INTERFACE
    GetInterface = 10,
    /// SET_INTERFACE
    SetInterface = 11,
    /// SYNCH_FRAME
    SynchFrame = 12,
}

/// Standard feature selectors for CLEAR_FEATURE and SET_FEATURE.
#[repr(u16)]
#[derive(Copy, Clone, Eq, PartialEq, Debug, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FeatureSelector {
    /// Halt an endpoint. Recipient must be an endpoint.
    EndpointHalt = 0,
    /// Allow the device to wake up the host. Recipient must be the device.
    DeviceRemoteWakeup = 1,
}

/// A control request read from a SETUP packet.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Request {
    /// Direction of the request.
    pub direction: UsbDirection,
    /// Type of the request.
    pub request_type: RequestType,
    /// Recipient of the request.
    pub recipient: Recipient,
    /// Request code. The meaning of the value depends on the previous fields.
    pub request: u8,
    /// Request value. The meaning of the value depends on the previous fields.
    pub value: u16,
    /// Request index. The meaning of the value depends on the previous fields.
    pub index: u16,
    /// Length of the DATA stage. For control OUT transfers this is the exact length of the data the
    /// host sent. For control IN transfers this is the maximum length of data the device should
    /// return.
    pub length: u16,
}

impl Request {
    /// Size of a SETUP packet on the wire.
    pub const SIZE: usize = 8;

    /// Parses a SETUP packet.
    pub fn parse(buf: &[u8]) -> Result<Request> {
        if buf.len() != Self::SIZE {
            return Err(UsbError::InvalidSetupPacket);
        }

        let rt = buf[0];

        Ok(Request {
            direction: rt.into(),
            request_type: RequestType::try_from((rt >> 5) & 0b11)
                .map_err(|_| UsbError::InvalidSetupPacket)?,
            recipient: Recipient::try_from(rt & 0b11111).unwrap_or(Recipient::Reserved),
            request: buf[1],
            value: u16::from_le_bytes([buf[2], buf[3]]),
            index: u16::from_le_bytes([buf[4], buf[5]]),
            length: u16::from_le_bytes([buf[6], buf[7]]),
        })
    }

    /// Encodes the request back into its 8 byte wire format.
    pub fn to_bytes(&self) -> [u8; 8] {
        let value = self.value.to_le_bytes();
        let index = self.index.to_le_bytes();
        let length = self.length.to_le_bytes();

        [
            self.request_type_byte(),
            self.request,
            value[0],
            value[1],
            index[0],
            index[1],
            length[0],
            length[1],
        ]
    }

    /// Gets the raw `bmRequestType` byte.
    pub fn request_type_byte(&self) -> u8 {
        (self.direction as u8) | (u8::from(self.request_type) << 5) | u8::from(self.recipient)
    }

    /// Gets the standard request code, if `request` is one.
    pub fn standard_request(&self) -> Option<StandardRequest> {
        StandardRequest::try_from(self.request).ok()
    }

    /// Gets the descriptor type and index from the value field of a GET_DESCRIPTOR request.
    pub fn descriptor_type_index(&self) -> (u8, u8) {
        ((self.value >> 8) as u8, self.value as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_get_device_descriptor() {
        let req = Request::parse(&[0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x40, 0x00]).unwrap();

        assert_eq!(req.direction, UsbDirection::In);
        assert_eq!(req.request_type, RequestType::Standard);
        assert_eq!(req.recipient, Recipient::Device);
        assert_eq!(req.standard_request(), Some(StandardRequest::GetDescriptor));
        assert_eq!(req.descriptor_type_index(), (1, 0));
        assert_eq!(req.length, 64);
    }

    #[test]
    fn parse_vendor_endpoint_request() {
        let req = Request::parse(&[0x42, 0x01, 0x34, 0x12, 0x82, 0x00, 0x00, 0x00]).unwrap();

        assert_eq!(req.direction, UsbDirection::Out);
        assert_eq!(req.request_type, RequestType::Vendor);
        assert_eq!(req.recipient, Recipient::Endpoint);
        assert_eq!(req.value, 0x1234);
        assert_eq!(req.index, 0x0082);
    }

    #[test]
    fn reserved_recipients_collapse() {
        let req = Request::parse(&[0x1f, 0x00, 0, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(req.recipient, Recipient::Reserved);
    }

    #[test]
    fn reserved_request_codes_are_not_standard() {
        for code in [2u8, 4, 13, 0xff] {
            let req = Request::parse(&[0x00, code, 0, 0, 0, 0, 0, 0]).unwrap();
            assert_eq!(req.standard_request(), None);
        }
    }

    #[test]
    fn short_packet_is_rejected() {
        assert_eq!(Request::parse(&[0x80, 0x06, 0x00]), Err(UsbError::InvalidSetupPacket));
    }

    #[test]
    fn wire_format_is_preserved() {
        let raw = [0xc1, 0x2a, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
        assert_eq!(Request::parse(&raw).unwrap().to_bytes(), raw);
    }
}
