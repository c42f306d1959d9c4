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

/// USB request type fields of bmRequestType.
pub const USB_DIRECTION_HOST_TO_DEVICE: u8 = 0 << 7;
pub const USB_DIRECTION_DEVICE_TO_HOST: u8 = 0x80;
pub const USB_TYPE_MASK: u8 = 3 << 5;
pub const USB_TYPE_STANDARD: u8 = 0x00 << 5;
pub const USB_TYPE_CLASS: u8 = 1 << 5;
pub const USB_TYPE_VENDOR: u8 = 2 << 5;
pub const USB_TYPE_RESERVED: u8 = 3 << 5;
pub const USB_RECIPIENT_MASK: u8 = 0x1f;
pub const USB_RECIPIENT_DEVICE: u8 = 0;
pub const USB_RECIPIENT_INTERFACE: u8 = 1;
pub const USB_RECIPIENT_ENDPOINT: u8 = 2;
pub const USB_RECIPIENT_OTHER: u8 = 3;

pub const USB_INTERFACE_CLASS_IN_REQUEST: u8 =
    USB_DIRECTION_DEVICE_TO_HOST | USB_TYPE_CLASS | USB_RECIPIENT_INTERFACE;
pub const USB_INTERFACE_CLASS_OUT_REQUEST: u8 =
    USB_DIRECTION_HOST_TO_DEVICE | USB_TYPE_CLASS | USB_RECIPIENT_INTERFACE;

/// Size of a USB setup packet.
pub const USB_SETUP_PACKET_SIZE: usize = 8;

/// UVC class-specific request codes.
pub const UVC_RC_UNDEFINED: u8 = 0x00;
pub const UVC_SET_CUR: u8 = 0x01;
pub const UVC_GET_CUR: u8 = 0x81;
pub const UVC_GET_MIN: u8 = 0x82;
pub const UVC_GET_MAX: u8 = 0x83;
pub const UVC_GET_RES: u8 = 0x84;
pub const UVC_GET_LEN: u8 = 0x85;
pub const UVC_GET_INFO: u8 = 0x86;
pub const UVC_GET_DEF: u8 = 0x87;

/// GET_INFO capabilities bits
/// Supports GET value requests
pub const UVC_CONTROL_CAP_GET: u8 = 1 << 0;
/// Supports SET_CUR requests
pub const UVC_CONTROL_CAP_SET: u8 = 1 << 1;

/// VideoStreaming interface control selectors.
pub const UVC_VS_CONTROL_UNDEFINED: u8 = 0x00;
pub const UVC_VS_PROBE_CONTROL: u8 = 0x01;
pub const UVC_VS_COMMIT_CONTROL: u8 = 0x02;

/// Processing unit control selectors.
pub const UVC_PU_CONTROL_UNDEFINED: u8 = 0x00;
pub const UVC_PU_BACKLIGHT_COMPENSATION_CONTROL: u8 = 0x01;
pub const UVC_PU_BRIGHTNESS_CONTROL: u8 = 0x02;
pub const UVC_PU_CONTRAST_CONTROL: u8 = 0x03;
pub const UVC_PU_GAIN_CONTROL: u8 = 0x04;
pub const UVC_PU_POWER_LINE_FREQUENCY_CONTROL: u8 = 0x05;
pub const UVC_PU_HUE_CONTROL: u8 = 0x06;
pub const UVC_PU_SATURATION_CONTROL: u8 = 0x07;
pub const UVC_PU_SHARPNESS_CONTROL: u8 = 0x08;
pub const UVC_PU_GAMMA_CONTROL: u8 = 0x09;
pub const UVC_PU_WHITE_BALANCE_TEMPERATURE_CONTROL: u8 = 0x0a;
pub const UVC_PU_WHITE_BALANCE_TEMPERATURE_AUTO_CONTROL: u8 = 0x0b;
pub const UVC_PU_WHITE_BALANCE_COMPONENT_CONTROL: u8 = 0x0c;
pub const UVC_PU_WHITE_BALANCE_COMPONENT_AUTO_CONTROL: u8 = 0x0d;
pub const UVC_PU_DIGITAL_MULTIPLIER_CONTROL: u8 = 0x0e;
pub const UVC_PU_DIGITAL_MULTIPLIER_LIMIT_CONTROL: u8 = 0x0f;
pub const UVC_PU_HUE_AUTO_CONTROL: u8 = 0x10;
pub const UVC_PU_ANALOG_VIDEO_STANDARD_CONTROL: u8 = 0x11;
pub const UVC_PU_ANALOG_LOCK_STATUS_CONTROL: u8 = 0x12;

/// bmFramingInfo: frame ID and end of frame bits are used.
pub const UVC_FRAMING_FID_EOF: u8 = 3;
/// bmHint: keep dwFrameInterval fixed.
pub const UVC_HINT_FRAME_INTERVAL: u16 = 1;
/// Payload format version advertised in probe/commit.
pub const UVC_PAYLOAD_VERSION: u8 = 1;

/// Frame interval in 100ns units.
pub const INTERVALS_PER_SEC: u32 = 10_000_000;
