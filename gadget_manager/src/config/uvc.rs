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

//! UVC function configuration read from the ConfigFS gadget tree.
//!
//! A function directory looks like:
//!
//! ```text
//! usb_gadget/g1/UDC
//! usb_gadget/g1/functions/uvc.0/control/bInterfaceNumber
//! usb_gadget/g1/functions/uvc.0/streaming/bInterfaceNumber
//! usb_gadget/g1/functions/uvc.0/streaming_maxpacket
//! usb_gadget/g1/functions/uvc.0/streaming/uncompressed/u/{bFormatIndex,guidFormat}
//! usb_gadget/g1/functions/uvc.0/streaming/uncompressed/u/360p/{bFrameIndex,wWidth,...}
//! usb_gadget/g1/functions/uvc.0/streaming/header/h/u -> ../../uncompressed/u
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info, warn};
use once_cell::sync::Lazy;

use super::{file_name, read_attribute, read_attribute_num, sorted_dir_entries, ConfigCheck};
use crate::error::ConfigError;
use util::{video_fourcc, PIXFMT_MJPG, PIXFMT_NV12, PIXFMT_YUYV};

pub const CONFIGFS_ROOT: &str = "/sys/kernel/config";
pub const SYSFS_ROOT: &str = "/sys";

const UVC_FUNCTION_PREFIX: &str = "uvc.";
const GUID_LEN: usize = 16;

/// Tail shared by all FOURCC based media subtype GUIDs.
const GUID_TAIL: [u8; 12] = [
    0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xaa, 0x00, 0x38, 0x9b, 0x71,
];

const fn fourcc_guid(fourcc: [u8; 4]) -> [u8; GUID_LEN] {
    let mut guid = [0u8; GUID_LEN];
    let mut i = 0;
    while i < GUID_LEN {
        guid[i] = if i < 4 { fourcc[i] } else { GUID_TAIL[i - 4] };
        i += 1;
    }
    guid
}

/// Media subtype GUIDs whose V4L2 fourcc differs from the GUID's leading bytes.
const MEDIA_TYPE_GUID: [([u8; GUID_LEN], u32); 3] = [
    (fourcc_guid(*b"YUY2"), PIXFMT_YUYV),
    (fourcc_guid(*b"NV12"), PIXFMT_NV12),
    (fourcc_guid(*b"I420"), video_fourcc!('Y', 'U', '1', '2')),
];

static MEDIA_TYPE_GUID_HASHMAP: Lazy<HashMap<[u8; GUID_LEN], u32>> =
    Lazy::new(|| MEDIA_TYPE_GUID.iter().copied().collect());

/// Map an uncompressed format GUID to a V4L2 fourcc.
pub fn guid_to_fourcc(guid: &[u8; GUID_LEN]) -> u32 {
    match MEDIA_TYPE_GUID_HASHMAP.get(guid) {
        Some(fourcc) => *fourcc,
        None => u32::from_le_bytes([guid[0], guid[1], guid[2], guid[3]]),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UvcFrameConfig {
    pub index: u8,
    pub width: u32,
    pub height: u32,
    /// Frame intervals in 100ns units, ascending.
    pub intervals: Vec<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UvcFormatConfig {
    pub index: u8,
    pub fcc: u32,
    pub frames: Vec<UvcFrameConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UvcControlConfig {
    pub intf: u8,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UvcStreamingConfig {
    pub intf: u8,
    /// wMaxPacketSize of the streaming endpoint.
    pub maxpacket: u32,
    pub interval: u32,
    pub maxburst: u32,
    pub formats: Vec<UvcFormatConfig>,
}

/// The capability table and interface layout of one UVC function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UvcFunctionConfig {
    /// Gadget V4L2 node, such as /dev/video0.
    pub video: String,
    pub udc: String,
    /// Function instance name, such as uvc.0.
    pub function: String,
    pub control: UvcControlConfig,
    pub streaming: UvcStreamingConfig,
}

impl UvcFunctionConfig {
    /// Parse the function named by `wanted` from the live ConfigFS tree.
    ///
    /// `wanted` is a function name (`uvc.0`), a path relative to the gadget
    /// directory (`g1/functions/uvc.0`), or None for the first UVC function.
    pub fn from_configfs(wanted: Option<&str>) -> Result<Self> {
        Self::parse(Path::new(CONFIGFS_ROOT), Path::new(SYSFS_ROOT), wanted)
    }

    pub fn parse(configfs: &Path, sysfs: &Path, wanted: Option<&str>) -> Result<Self> {
        let gadgets = configfs.join("usb_gadget");
        let func_path = find_function(&gadgets, wanted)?;
        let function = file_name(&func_path);
        info!("Using UVC function {}", func_path.display());

        let gadget_path = func_path
            .parent()
            .and_then(|p| p.parent())
            .with_context(|| format!("Invalid function path {}", func_path.display()))?;
        let udc = read_attribute(&gadget_path.join("UDC")).unwrap_or_default();
        if udc.is_empty() {
            bail!(ConfigError::GadgetNotBound(
                gadget_path.display().to_string()
            ));
        }
        let video = find_video_node(sysfs, &udc, &function)?;

        let config = UvcFunctionConfig {
            video,
            udc,
            function,
            control: UvcControlConfig {
                intf: read_attribute_num(&func_path.join("control"), "bInterfaceNumber")?,
            },
            streaming: parse_streaming(&func_path)?,
        };
        config.check()?;
        debug!("UVC function config {:?}", config);
        Ok(config)
    }
}

impl ConfigCheck for UvcFunctionConfig {
    fn check(&self) -> Result<()> {
        let formats = &self.streaming.formats;
        if formats.is_empty() {
            bail!(ConfigError::EmptyList(self.function.clone(), "format"));
        }
        for format in formats {
            let fmt_name = format!("{} format {}", self.function, format.index);
            if format.frames.is_empty() {
                bail!(ConfigError::EmptyList(fmt_name, "frame"));
            }
            for frame in format.frames.iter() {
                let frame_name = format!("{} frame {}", fmt_name, frame.index);
                if frame.intervals.is_empty() {
                    bail!(ConfigError::EmptyList(frame_name, "frame interval"));
                }
                if frame.intervals.contains(&0) {
                    bail!(ConfigError::ZeroInterval(frame_name));
                }
            }
        }
        Ok(())
    }
}

fn find_function(gadgets: &Path, wanted: Option<&str>) -> Result<PathBuf> {
    let not_found = || {
        anyhow!(ConfigError::NoUvcFunction(
            wanted.unwrap_or("uvc.*").to_string(),
            gadgets.display().to_string()
        ))
    };

    if let Some(path) = wanted.filter(|s| s.contains('/')) {
        let func_path = gadgets.join(path.trim_matches('/'));
        if func_path.is_dir() {
            return Ok(func_path);
        }
        return Err(not_found());
    }

    for gadget in sorted_dir_entries(gadgets)? {
        let functions = gadget.join("functions");
        if !functions.is_dir() {
            continue;
        }
        for func in sorted_dir_entries(&functions)? {
            let name = file_name(&func);
            let matched = match wanted {
                Some(wanted) => name == wanted,
                None => name.starts_with(UVC_FUNCTION_PREFIX),
            };
            if matched {
                return Ok(func);
            }
        }
    }
    Err(not_found())
}

/// Locate /dev/videoN registered by `function` on `udc`.
fn find_video_node(sysfs: &Path, udc: &str, function: &str) -> Result<String> {
    let device = sysfs.join("class/udc").join(udc).join("device");
    let mut videos = Vec::new();
    for gadget in sorted_dir_entries(&device)? {
        if !file_name(&gadget).starts_with("gadget") {
            continue;
        }
        let v4l = gadget.join("video4linux");
        if v4l.is_dir() {
            videos.extend(sorted_dir_entries(&v4l)?);
        }
    }

    let mut fallback = None;
    for video in videos.iter() {
        match read_attribute(&video.join("function_name")) {
            Ok(name) if name == function => return Ok(format!("/dev/{}", file_name(video))),
            Ok(_) => {}
            Err(_) => {
                fallback.get_or_insert(video);
            }
        }
    }
    match fallback {
        Some(video) => Ok(format!("/dev/{}", file_name(video))),
        None => Err(anyhow!(ConfigError::NoVideoNode(
            function.to_string(),
            udc.to_string()
        ))),
    }
}

fn parse_streaming(func_path: &Path) -> Result<UvcStreamingConfig> {
    let streaming = func_path.join("streaming");
    let mut formats = Vec::new();
    let header = streaming.join("header/h");
    for entry in sorted_dir_entries(&header)? {
        let is_link = std::fs::symlink_metadata(&entry)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);
        if !is_link {
            continue;
        }
        let target = std::fs::canonicalize(&entry)
            .with_context(|| format!("Failed to resolve format link {}", entry.display()))?;
        formats.push(parse_format(&target)?);
    }
    formats.sort_by_key(|f| f.index);

    Ok(UvcStreamingConfig {
        intf: read_attribute_num(&streaming, "bInterfaceNumber")?,
        maxpacket: read_attribute_num(func_path, "streaming_maxpacket")?,
        interval: read_attribute_num(func_path, "streaming_interval").unwrap_or(1),
        maxburst: read_attribute_num(func_path, "streaming_maxburst").unwrap_or(0),
        formats,
    })
}

fn parse_format(path: &Path) -> Result<UvcFormatConfig> {
    let kind = path.parent().map(file_name).unwrap_or_default();
    let fcc = match kind.as_str() {
        "mjpeg" => PIXFMT_MJPG,
        "uncompressed" => {
            let guid_path = path.join("guidFormat");
            let guid = std::fs::read(&guid_path)
                .with_context(|| format!("Failed to read {}", guid_path.display()))?;
            let guid: [u8; GUID_LEN] = guid
                .get(..GUID_LEN)
                .and_then(|g| g.try_into().ok())
                .ok_or_else(|| {
                    anyhow!(ConfigError::InvalidGuid(
                        guid_path.display().to_string(),
                        guid.len()
                    ))
                })?;
            guid_to_fourcc(&guid)
        }
        _ => bail!(ConfigError::UnknownFormatType(path.display().to_string())),
    };

    let mut frames = Vec::new();
    for entry in sorted_dir_entries(path)? {
        if !entry.is_dir() || !entry.join("bFrameIndex").exists() {
            continue;
        }
        frames.push(parse_frame(&entry)?);
    }
    frames.sort_by_key(|f| f.index);

    let format = UvcFormatConfig {
        index: read_attribute_num(path, "bFormatIndex")?,
        fcc,
        frames,
    };
    if format.fcc == 0 {
        warn!("Format {} has no known fourcc", path.display());
    }
    Ok(format)
}

fn parse_frame(path: &Path) -> Result<UvcFrameConfig> {
    let intervals_path = path.join("dwFrameInterval");
    let mut intervals = read_attribute(&intervals_path)?
        .split_whitespace()
        .map(|v| {
            v.parse::<u32>().map_err(|_| {
                anyhow!(ConfigError::ConvertValueFailed(
                    v.to_string(),
                    intervals_path.display().to_string()
                ))
            })
        })
        .collect::<Result<Vec<u32>>>()?;
    intervals.sort_unstable();
    intervals.dedup();

    Ok(UvcFrameConfig {
        index: read_attribute_num(path, "bFrameIndex")?,
        width: read_attribute_num(path, "wWidth")?,
        height: read_attribute_num(path, "wHeight")?,
        intervals,
    })
}
