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

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UsbError {
    #[error("UtilError")]
    UtilError {
        #[from]
        source: util::error::UtilError,
    },
    #[error("The capability table of {0} is empty")]
    EmptyCapabilities(String),
    #[error("Streaming control too short: {0} bytes, at least {1} required")]
    ShortStreamingControl(usize, usize),
    #[error("Setup packet too short: {0} bytes")]
    ShortSetupPacket(usize),
    #[error("Max video frame size is undefined for format {0}")]
    UnsupportedFrameSize(String),
    #[error("Invalid width {0} or height {1}")]
    InvalidFrameSize(u32, u32),
    #[error("Video source does not support format {0}")]
    UnsupportedFormat(String),
    #[error("Buffer of {0} bytes is too small for a {1} bytes frame")]
    BufferTooSmall(usize, usize),
}
