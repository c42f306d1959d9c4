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

pub mod error;
pub mod g_uvc;
pub mod logger;
pub mod loop_context;
pub mod time;
pub mod v4l2;

pub use anyhow::Result;

pub use error::UtilError;

/// Package version and the commit it was built from, generated by `build.rs`.
pub const VERSION: &str = include_str!(concat!(env!("OUT_DIR"), "/VERSION"));

#[macro_export]
macro_rules! video_fourcc {
    ($a:expr, $b:expr, $c:expr, $d:expr) => {
        $a as u32 | (($b as u32) << 8) | (($c as u32) << 16) | (($d as u32) << 24)
    };
}

pub const PIXFMT_YUYV: u32 = video_fourcc!('Y', 'U', 'Y', 'V');
pub const PIXFMT_MJPG: u32 = video_fourcc!('M', 'J', 'P', 'G');
pub const PIXFMT_NV12: u32 = video_fourcc!('N', 'V', '1', '2');

/// Render a fourcc code as its four characters, e.g. "YUYV".
pub fn fourcc_to_string(fourcc: u32) -> String {
    fourcc
        .to_le_bytes()
        .iter()
        .map(|b| {
            if b.is_ascii_graphic() || *b == b' ' {
                *b as char
            } else {
                '.'
            }
        })
        .collect()
}
