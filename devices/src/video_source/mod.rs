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

//! Frame producers feeding the gadget output buffers.

pub mod test_source;
pub mod v4l2;

use anyhow::Result;
use log::info;

use self::test_source::TestSource;
use self::v4l2::V4l2Source;
use util::fourcc_to_string;
use util::v4l2::V4L2_FIELD_NONE;
use v4l2_sys_mit::v4l2_format;

/// Field order of a video frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FieldOrder {
    #[default]
    Progressive,
}

impl FieldOrder {
    fn to_v4l2(self) -> u32 {
        match self {
            FieldOrder::Progressive => V4L2_FIELD_NONE,
        }
    }
}

/// Format negotiated with the host and applied to the pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PixelFormat {
    pub fourcc: u32,
    pub width: u32,
    pub height: u32,
    pub field: FieldOrder,
    /// Frame size hint for compressed formats.
    pub size_image: Option<u32>,
}

impl PixelFormat {
    /// Build the `VIDIOC_S_FMT` argument for a buffer type.
    pub fn to_v4l2(&self, type_: u32) -> v4l2_format {
        let mut fmt = util::v4l2::new_init::<v4l2_format>();
        fmt.type_ = type_;
        // SAFETY: pix is the member selected by single planar buffer types.
        let pix = unsafe { &mut fmt.fmt.pix };
        pix.width = self.width;
        pix.height = self.height;
        pix.pixelformat = self.fourcc;
        pix.field = self.field.to_v4l2();
        pix.sizeimage = self.size_image.unwrap_or(0);
        fmt
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}x{}",
            fourcc_to_string(self.fourcc),
            self.width,
            self.height
        )
    }
}

/// An output buffer handed to a source for filling.
pub struct VideoBuffer<'a> {
    pub index: u32,
    pub mem: &'a mut [u8],
    /// Bytes of valid frame data, set by the source.
    pub bytesused: u32,
}

impl<'a> VideoBuffer<'a> {
    pub fn new(index: u32, mem: &'a mut [u8]) -> Self {
        VideoBuffer {
            index,
            mem,
            bytesused: 0,
        }
    }
}

pub trait VideoSource {
    /// Configure the frame format. Fails when the source cannot produce it.
    fn set_format(&mut self, fmt: &PixelFormat) -> Result<()>;

    fn set_frame_rate(&mut self, fps: u32) -> Result<()>;

    /// Release buffers allocated for streaming.
    fn free_buffers(&mut self) -> Result<()> {
        Ok(())
    }

    fn stream_on(&mut self) -> Result<()>;

    fn stream_off(&mut self) -> Result<()>;

    /// Called once a filled buffer is queued to the gadget. Sources lending
    /// their own buffers during `fill_buffer` take them back here.
    fn queue_buffer(&mut self, _buf: &VideoBuffer) -> Result<()> {
        Ok(())
    }

    /// Write one frame into `buf` and set `bytesused`.
    fn fill_buffer(&mut self, buf: &mut VideoBuffer) -> Result<()>;
}

/// Create the capture backed source when `capture` is given, the test pattern otherwise.
pub fn create_video_source(capture: Option<&str>) -> Result<Box<dyn VideoSource>> {
    let source: Box<dyn VideoSource> = match capture {
        Some(path) => {
            info!("Streaming from capture device {}", path);
            Box::new(V4l2Source::new(path)?)
        }
        None => {
            info!("Streaming the test pattern");
            Box::new(TestSource::new())
        }
    };
    Ok(source)
}
