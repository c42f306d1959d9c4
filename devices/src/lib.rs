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

//! # Devices
//!
//! The UVC function seen by the USB host and the video pipeline behind it.
//!
//! - `usb`: control requests, probe and commit negotiation and the gadget
//!   event pump.
//! - `stream`: output buffer handling towards the gadget node.
//! - `video_source`: frame producers.

pub mod stream;
pub mod usb;
pub mod video_source;
