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

//! Userspace ABI of the UVC gadget function driver, from `linux/usb/g_uvc.h`.
//! The V4L2 structures it builds on come from `v4l2_sys_mit`.

#![allow(non_camel_case_types)]

use v4l2_sys_mit::{v4l2_event, V4L2_EVENT_PRIVATE_START};
use vmm_sys_util::{ioctl_ioc_nr, ioctl_iow_nr};

const UVC: u32 = 85;

pub const UVC_EVENT_CONNECT: u32 = V4L2_EVENT_PRIVATE_START;
pub const UVC_EVENT_DISCONNECT: u32 = V4L2_EVENT_PRIVATE_START + 1;
pub const UVC_EVENT_STREAMON: u32 = V4L2_EVENT_PRIVATE_START + 2;
pub const UVC_EVENT_STREAMOFF: u32 = V4L2_EVENT_PRIVATE_START + 3;
pub const UVC_EVENT_SETUP: u32 = V4L2_EVENT_PRIVATE_START + 4;
pub const UVC_EVENT_DATA: u32 = V4L2_EVENT_PRIVATE_START + 5;
pub const UVC_EVENT_LAST: u32 = V4L2_EVENT_PRIVATE_START + 5;

/// Size of the data array carried by `uvc_request_data`.
pub const UVC_MAX_REQUEST_SIZE: usize = 60;

#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct uvc_request_data {
    pub length: i32,
    pub data: [u8; UVC_MAX_REQUEST_SIZE],
}

impl Default for uvc_request_data {
    fn default() -> Self {
        uvc_request_data {
            length: 0,
            data: [0; UVC_MAX_REQUEST_SIZE],
        }
    }
}

ioctl_iow_nr!(UVCIOC_SEND_RESPONSE, UVC, 1, uvc_request_data);

/// Raw payload of a V4L2 event. UVC events place a `usb_ctrlrequest` or a
/// `uvc_request_data` here.
pub fn event_data(event: &v4l2_event) -> &[u8; 64] {
    // SAFETY: every member of the union is plain data over the same storage.
    unsafe { &event.u.data }
}

#[cfg(test)]
mod test {
    use std::mem::size_of;

    use super::*;

    #[test]
    fn test_request_data_fits_event() {
        assert_eq!(size_of::<uvc_request_data>(), 64);
        let event = crate::v4l2::new_init::<v4l2_event>();
        assert!(size_of::<uvc_request_data>() <= event_data(&event).len());
        assert_eq!(UVC_EVENT_DATA, 0x0800_0005);
    }
}
