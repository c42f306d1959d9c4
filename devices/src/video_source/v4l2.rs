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

use std::os::raw::c_int;

use anyhow::{bail, Context, Result};
use log::{debug, error, info, warn};

use super::{PixelFormat, VideoBuffer, VideoSource};
use crate::usb::UsbError;
use util::v4l2::{new_init, V4l2Device, V4L2_BUF_TYPE_VIDEO_CAPTURE, V4L2_MEMORY_MMAP};
use v4l2_sys_mit::{
    v4l2_buffer, v4l2_streamparm, V4L2_CAP_STREAMING, V4L2_CAP_TIMEPERFRAME,
    V4L2_CAP_VIDEO_CAPTURE,
};

const CAPTURE_BUFFER_COUNT: u32 = 4;

/// Frames captured from a V4L2 device.
pub struct V4l2Source {
    dev: V4l2Device,
    fmt: PixelFormat,
    streaming: bool,
    /// Capture buffer lent out between `fill_buffer` and `queue_buffer`.
    held: Option<u32>,
    /// Newest captured frame, repeated while the device has nothing new.
    last_frame: Vec<u8>,
}

impl V4l2Source {
    pub fn new(path: &str) -> Result<Self> {
        let dev = V4l2Device::open(path)?;
        dev.check_cap(V4L2_CAP_VIDEO_CAPTURE, "video capture")?;
        dev.check_cap(V4L2_CAP_STREAMING, "streaming")?;
        Ok(V4l2Source {
            dev,
            fmt: PixelFormat::default(),
            streaming: false,
            held: None,
            last_frame: Vec::new(),
        })
    }

    fn capture_buffer(index: u32) -> v4l2_buffer {
        let mut buf = new_init::<v4l2_buffer>();
        buf.index = index;
        buf.type_ = V4L2_BUF_TYPE_VIDEO_CAPTURE;
        buf.memory = V4L2_MEMORY_MMAP;
        buf
    }

    /// `VIDIOC_S_PARM` argument asking for a time per frame of 1/fps.
    fn frame_rate_parm(fps: u32) -> v4l2_streamparm {
        let mut parm = new_init::<v4l2_streamparm>();
        parm.type_ = V4L2_BUF_TYPE_VIDEO_CAPTURE;
        parm.parm.capture.timeperframe.numerator = 1;
        parm.parm.capture.timeperframe.denominator = fps;
        parm
    }

    fn requeue(&self, index: u32) -> Result<()> {
        self.dev.queue_buffer(&mut Self::capture_buffer(index))
    }

    /// Dequeue every completed capture buffer, keeping the newest one.
    fn dequeue_newest(&self) -> Result<Option<v4l2_buffer>> {
        let mut newest: Option<v4l2_buffer> = None;
        loop {
            let mut buf = Self::capture_buffer(0);
            if !self.dev.dequeue_buffer(&mut buf)? {
                break;
            }
            if let Some(stale) = newest.replace(buf) {
                self.requeue(stale.index)?;
            }
        }
        Ok(newest)
    }
}

impl VideoSource for V4l2Source {
    fn set_format(&mut self, fmt: &PixelFormat) -> Result<()> {
        let mut v4l2_fmt = fmt.to_v4l2(V4L2_BUF_TYPE_VIDEO_CAPTURE);
        self.dev
            .set_format(&mut v4l2_fmt)
            .with_context(|| format!("Failed to set capture format {}", fmt))?;
        // SAFETY: pix is the member used by the capture buffer type.
        let pix = unsafe { v4l2_fmt.fmt.pix };
        if pix.pixelformat != fmt.fourcc || pix.width != fmt.width || pix.height != fmt.height {
            bail!(UsbError::UnsupportedFormat(fmt.to_string()));
        }
        self.fmt = *fmt;
        info!("{}: capture format {}", self.dev.path(), fmt);
        Ok(())
    }

    fn set_frame_rate(&mut self, fps: u32) -> Result<()> {
        if fps == 0 {
            bail!("Invalid frame rate 0 for {}", self.dev.path());
        }
        let mut parm = Self::frame_rate_parm(fps);
        self.dev.set_stream_parameter(&mut parm)?;
        // SAFETY: capture is the member used by the capture buffer type.
        let capture = unsafe { parm.parm.capture };
        if capture.capability & V4L2_CAP_TIMEPERFRAME == 0 {
            warn!("{} ignores the frame rate setting", self.dev.path());
        } else {
            debug!(
                "{}: frame interval {}/{}",
                self.dev.path(),
                capture.timeperframe.numerator,
                capture.timeperframe.denominator
            );
        }
        Ok(())
    }

    fn free_buffers(&mut self) -> Result<()> {
        self.held = None;
        self.dev.release_buffers()
    }

    fn stream_on(&mut self) -> Result<()> {
        let count = self
            .dev
            .request_buffers(V4L2_BUF_TYPE_VIDEO_CAPTURE, CAPTURE_BUFFER_COUNT)?;
        if count == 0 {
            bail!("No capture buffer granted by {}", self.dev.path());
        }
        for index in 0..count {
            self.requeue(index)?;
        }
        self.dev.stream_on(V4L2_BUF_TYPE_VIDEO_CAPTURE as c_int)?;
        self.streaming = true;
        self.last_frame.clear();
        Ok(())
    }

    fn stream_off(&mut self) -> Result<()> {
        if !self.streaming {
            return Ok(());
        }
        self.streaming = false;
        self.held = None;
        self.dev.stream_off(V4L2_BUF_TYPE_VIDEO_CAPTURE as c_int)
    }

    fn queue_buffer(&mut self, _buf: &VideoBuffer) -> Result<()> {
        match self.held.take() {
            Some(index) => self.requeue(index),
            None => Ok(()),
        }
    }

    fn fill_buffer(&mut self, buf: &mut VideoBuffer) -> Result<()> {
        if let Some(index) = self.held.take() {
            // The previous output never reached the gadget.
            self.requeue(index)?;
        }
        if let Some(captured) = self.dequeue_newest()? {
            let last_frame = &mut self.last_frame;
            self.dev.with_buffer(captured.index, |mem| {
                let len = (captured.bytesused as usize).min(mem.len());
                last_frame.clear();
                last_frame.extend_from_slice(&mem[..len]);
            })?;
            self.held = Some(captured.index);
        }

        if self.last_frame.is_empty() {
            debug!("{}: no frame captured yet", self.dev.path());
            buf.bytesused = 0;
            return Ok(());
        }
        let len = self.last_frame.len();
        if buf.mem.len() < len {
            bail!(UsbError::BufferTooSmall(buf.mem.len(), len));
        }
        buf.mem[..len].copy_from_slice(&self.last_frame);
        buf.bytesused = len as u32;
        Ok(())
    }
}

impl Drop for V4l2Source {
    fn drop(&mut self) {
        if let Err(e) = self.stream_off() {
            error!("Failed to stop capture on {}, {:?}", self.dev.path(), e);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_open_missing_capture() {
        assert!(V4l2Source::new("/nonexistent/video99").is_err());
    }

    #[test]
    fn test_capture_buffer() {
        let buf = V4l2Source::capture_buffer(3);
        assert_eq!(buf.index, 3);
        assert_eq!(buf.type_, V4L2_BUF_TYPE_VIDEO_CAPTURE);
        assert_eq!(buf.memory, V4L2_MEMORY_MMAP);
        assert_eq!(buf.bytesused, 0);
    }

    #[test]
    fn test_frame_rate_parm() {
        let parm = V4l2Source::frame_rate_parm(30);
        assert_eq!(parm.type_, V4L2_BUF_TYPE_VIDEO_CAPTURE);
        // SAFETY: capture was written by frame_rate_parm().
        let capture = unsafe { parm.parm.capture };
        assert_eq!(capture.timeperframe.numerator, 1);
        assert_eq!(capture.timeperframe.denominator, 30);
        assert_eq!(capture.capability, 0);
    }
}
