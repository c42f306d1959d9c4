// Copyright (c) 2024 Huawei Technologies Co.,Ltd. All rights reserved.
//
// StratoVirt is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan
// PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//         http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY
// KIND, EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO
// NON-INFRINGEMENT, MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

pub mod config;
pub mod error;
pub mod gadget;
pub mod streaming_control;
pub mod uvc;

pub use error::UsbError;

use anyhow::{bail, Result};
use byteorder::{ByteOrder, LittleEndian};
use strum_macros::Display;

use config::*;

/// Kind of a control request, bits 5..6 of bmRequestType.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Display)]
pub enum RequestKind {
    #[strum(serialize = "standard")]
    Standard,
    #[strum(serialize = "class")]
    Class,
    #[strum(serialize = "vendor")]
    Vendor,
    #[strum(serialize = "reserved")]
    Reserved,
}

/// Recipient of a control request, bits 0..4 of bmRequestType.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Display)]
pub enum Recipient {
    #[strum(serialize = "device")]
    Device,
    #[strum(serialize = "interface")]
    Interface,
    #[strum(serialize = "endpoint")]
    Endpoint,
    #[strum(serialize = "other")]
    Other,
    #[strum(serialize = "reserved")]
    Reserved(u8),
}

/// USB device request, the setup packet of a control transfer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct UsbDeviceRequest {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl UsbDeviceRequest {
    /// Decode the little endian setup packet.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < USB_SETUP_PACKET_SIZE {
            bail!(UsbError::ShortSetupPacket(buf.len()));
        }
        Ok(UsbDeviceRequest {
            request_type: buf[0],
            request: buf[1],
            value: LittleEndian::read_u16(&buf[2..4]),
            index: LittleEndian::read_u16(&buf[4..6]),
            length: LittleEndian::read_u16(&buf[6..8]),
        })
    }

    pub fn kind(&self) -> RequestKind {
        match self.request_type & USB_TYPE_MASK {
            USB_TYPE_STANDARD => RequestKind::Standard,
            USB_TYPE_CLASS => RequestKind::Class,
            USB_TYPE_VENDOR => RequestKind::Vendor,
            _ => RequestKind::Reserved,
        }
    }

    pub fn recipient(&self) -> Recipient {
        match self.request_type & USB_RECIPIENT_MASK {
            USB_RECIPIENT_DEVICE => Recipient::Device,
            USB_RECIPIENT_INTERFACE => Recipient::Interface,
            USB_RECIPIENT_ENDPOINT => Recipient::Endpoint,
            USB_RECIPIENT_OTHER => Recipient::Other,
            n => Recipient::Reserved(n),
        }
    }

    /// Interface number for interface recipients.
    pub fn interface(&self) -> u8 {
        (self.index & 0xff) as u8
    }

    /// Control selector of class requests.
    pub fn control_selector(&self) -> u8 {
        (self.value >> 8) as u8
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_decode_setup_packet() {
        // GET_CUR VS_PROBE_CONTROL on interface 1, 26 bytes.
        let packet = [0xa1, 0x81, 0x00, 0x01, 0x01, 0x00, 0x1a, 0x00];
        let req = UsbDeviceRequest::from_bytes(&packet).unwrap();
        assert_eq!(req.request_type, USB_INTERFACE_CLASS_IN_REQUEST);
        assert_eq!(req.request, UVC_GET_CUR);
        assert_eq!(req.control_selector(), UVC_VS_PROBE_CONTROL);
        assert_eq!(req.interface(), 1);
        assert_eq!(req.length, 26);
        assert_eq!(req.kind(), RequestKind::Class);
        assert_eq!(req.recipient(), Recipient::Interface);

        assert!(UsbDeviceRequest::from_bytes(&packet[..7]).is_err());
    }

    #[test]
    fn test_request_type_fields() {
        let mut req = UsbDeviceRequest {
            request_type: USB_DIRECTION_DEVICE_TO_HOST | USB_TYPE_VENDOR | USB_RECIPIENT_DEVICE,
            ..Default::default()
        };
        assert_eq!(req.kind(), RequestKind::Vendor);
        assert_eq!(req.recipient(), Recipient::Device);

        req.request_type = USB_TYPE_RESERVED | 0x1f;
        assert_eq!(req.kind(), RequestKind::Reserved);
        assert_eq!(req.recipient(), Recipient::Reserved(0x1f));
        assert_eq!(req.kind().to_string(), "reserved");
    }
}
