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

//! The 34 byte video probe and commit control block.

use anyhow::{bail, Result};
use byteorder::{ByteOrder, LittleEndian};

use super::config::*;
use super::UsbError;
use gadget_manager::config::{UvcFormatConfig, UvcFrameConfig, UvcStreamingConfig};
use util::{fourcc_to_string, PIXFMT_MJPG, PIXFMT_YUYV};

/// Length of the UVC 1.1 streaming control block.
pub const UVC_STREAMING_CONTROL_SIZE: usize = 34;
/// Length of the UVC 1.0 streaming control block.
pub const UVC_STREAMING_CONTROL_SIZE_V1_0: usize = 26;

const OFFSET_HINT: usize = 0;
const OFFSET_FORMAT_INDEX: usize = 2;
const OFFSET_FRAME_INDEX: usize = 3;
const OFFSET_FRAME_INTERVAL: usize = 4;
const OFFSET_KEY_FRAME_RATE: usize = 8;
const OFFSET_P_FRAME_RATE: usize = 10;
const OFFSET_COMP_QUALITY: usize = 12;
const OFFSET_COMP_WINDOW_SIZE: usize = 14;
const OFFSET_DELAY: usize = 16;
const OFFSET_MAX_VIDEO_FRAME_SIZE: usize = 18;
const OFFSET_MAX_PAYLOAD_TRANSFER_SIZE: usize = 22;
const OFFSET_CLOCK_FREQUENCY: usize = 26;
const OFFSET_FRAMING_INFO: usize = 30;
const OFFSET_PREFERED_VERSION: usize = 31;
const OFFSET_MIN_VERSION: usize = 32;
const OFFSET_MAX_VERSION: usize = 33;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamingControl {
    pub hint: u16,
    pub format_index: u8,
    pub frame_index: u8,
    /// Frame interval in 100ns units.
    pub frame_interval: u32,
    pub key_frame_rate: u16,
    pub p_frame_rate: u16,
    pub comp_quality: u16,
    pub comp_window_size: u16,
    pub delay: u16,
    pub max_video_frame_size: u32,
    pub max_payload_transfer_size: u32,
    pub clock_frequency: u32,
    pub framing_info: u8,
    pub prefered_version: u8,
    pub min_version: u8,
    pub max_version: u8,
}

impl StreamingControl {
    /// Build the control block nearest to the request the capability table allows.
    ///
    /// Indices below 1 or beyond the table select the last entry. The interval
    /// is rounded up to the next declared one, saturating at the largest.
    pub fn resolve(
        streaming: &UvcStreamingConfig,
        format_index: i32,
        frame_index: i32,
        interval: u32,
    ) -> Result<Self> {
        let (format_index, format) = clamp_index(&streaming.formats, format_index)
            .ok_or_else(|| UsbError::EmptyCapabilities("streaming interface".to_string()))?;
        let (frame_index, frame) = clamp_index(&format.frames, frame_index).ok_or_else(|| {
            UsbError::EmptyCapabilities(format!("format {}", format_index))
        })?;
        let frame_interval = select_interval(frame, interval)
            .ok_or_else(|| UsbError::EmptyCapabilities(format!("frame {}", frame_index)))?;

        Ok(StreamingControl {
            hint: UVC_HINT_FRAME_INTERVAL,
            format_index,
            frame_index,
            frame_interval,
            max_video_frame_size: max_video_frame_size(format, frame).unwrap_or(0),
            max_payload_transfer_size: streaming.maxpacket,
            framing_info: UVC_FRAMING_FID_EOF,
            prefered_version: UVC_PAYLOAD_VERSION,
            min_version: UVC_PAYLOAD_VERSION,
            max_version: UVC_PAYLOAD_VERSION,
            ..Default::default()
        })
    }

    pub fn encode(&self) -> [u8; UVC_STREAMING_CONTROL_SIZE] {
        let mut buf = [0u8; UVC_STREAMING_CONTROL_SIZE];
        LittleEndian::write_u16(&mut buf[OFFSET_HINT..], self.hint);
        buf[OFFSET_FORMAT_INDEX] = self.format_index;
        buf[OFFSET_FRAME_INDEX] = self.frame_index;
        LittleEndian::write_u32(&mut buf[OFFSET_FRAME_INTERVAL..], self.frame_interval);
        LittleEndian::write_u16(&mut buf[OFFSET_KEY_FRAME_RATE..], self.key_frame_rate);
        LittleEndian::write_u16(&mut buf[OFFSET_P_FRAME_RATE..], self.p_frame_rate);
        LittleEndian::write_u16(&mut buf[OFFSET_COMP_QUALITY..], self.comp_quality);
        LittleEndian::write_u16(&mut buf[OFFSET_COMP_WINDOW_SIZE..], self.comp_window_size);
        LittleEndian::write_u16(&mut buf[OFFSET_DELAY..], self.delay);
        LittleEndian::write_u32(
            &mut buf[OFFSET_MAX_VIDEO_FRAME_SIZE..],
            self.max_video_frame_size,
        );
        LittleEndian::write_u32(
            &mut buf[OFFSET_MAX_PAYLOAD_TRANSFER_SIZE..],
            self.max_payload_transfer_size,
        );
        LittleEndian::write_u32(&mut buf[OFFSET_CLOCK_FREQUENCY..], self.clock_frequency);
        buf[OFFSET_FRAMING_INFO] = self.framing_info;
        buf[OFFSET_PREFERED_VERSION] = self.prefered_version;
        buf[OFFSET_MIN_VERSION] = self.min_version;
        buf[OFFSET_MAX_VERSION] = self.max_version;
        buf
    }

    /// Decode a control block sent by the host. UVC 1.0 hosts send 26 bytes,
    /// the missing 1.1 fields read as zero.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < UVC_STREAMING_CONTROL_SIZE_V1_0 {
            bail!(UsbError::ShortStreamingControl(
                buf.len(),
                UVC_STREAMING_CONTROL_SIZE_V1_0
            ));
        }
        let mut full = [0u8; UVC_STREAMING_CONTROL_SIZE];
        let len = buf.len().min(UVC_STREAMING_CONTROL_SIZE);
        full[..len].copy_from_slice(&buf[..len]);

        Ok(StreamingControl {
            hint: LittleEndian::read_u16(&full[OFFSET_HINT..]),
            format_index: full[OFFSET_FORMAT_INDEX],
            frame_index: full[OFFSET_FRAME_INDEX],
            frame_interval: LittleEndian::read_u32(&full[OFFSET_FRAME_INTERVAL..]),
            key_frame_rate: LittleEndian::read_u16(&full[OFFSET_KEY_FRAME_RATE..]),
            p_frame_rate: LittleEndian::read_u16(&full[OFFSET_P_FRAME_RATE..]),
            comp_quality: LittleEndian::read_u16(&full[OFFSET_COMP_QUALITY..]),
            comp_window_size: LittleEndian::read_u16(&full[OFFSET_COMP_WINDOW_SIZE..]),
            delay: LittleEndian::read_u16(&full[OFFSET_DELAY..]),
            max_video_frame_size: LittleEndian::read_u32(&full[OFFSET_MAX_VIDEO_FRAME_SIZE..]),
            max_payload_transfer_size: LittleEndian::read_u32(
                &full[OFFSET_MAX_PAYLOAD_TRANSFER_SIZE..],
            ),
            clock_frequency: LittleEndian::read_u32(&full[OFFSET_CLOCK_FREQUENCY..]),
            framing_info: full[OFFSET_FRAMING_INFO],
            prefered_version: full[OFFSET_PREFERED_VERSION],
            min_version: full[OFFSET_MIN_VERSION],
            max_version: full[OFFSET_MAX_VERSION],
        })
    }
}

/// Clamp a 1-based index into `items`, returning the index and the entry.
fn clamp_index<T>(items: &[T], index: i32) -> Option<(u8, &T)> {
    // Indices are carried in a single byte.
    let count = items.len().min(u8::MAX as usize);
    if count == 0 {
        return None;
    }
    let pos = if index <= 0 || index as usize > count {
        count
    } else {
        index as usize
    };
    Some((pos as u8, &items[pos - 1]))
}

/// Smallest declared interval not below `requested`, or the largest one.
fn select_interval(frame: &UvcFrameConfig, requested: u32) -> Option<u32> {
    frame
        .intervals
        .iter()
        .copied()
        .find(|&interval| requested <= interval)
        .or_else(|| frame.intervals.last().copied())
}

/// Worst case size of one frame, defined for YUYV and MJPEG only.
pub fn max_video_frame_size(format: &UvcFormatConfig, frame: &UvcFrameConfig) -> Result<u32> {
    match format.fcc {
        PIXFMT_YUYV | PIXFMT_MJPG => frame
            .width
            .checked_mul(frame.height)
            .and_then(|size| size.checked_mul(2))
            .ok_or_else(|| UsbError::InvalidFrameSize(frame.width, frame.height).into()),
        fcc => bail!(UsbError::UnsupportedFrameSize(fourcc_to_string(fcc))),
    }
}
