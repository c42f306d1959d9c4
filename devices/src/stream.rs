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

use std::fs::File;
use std::os::raw::c_int;
use std::os::unix::io::{AsRawFd, RawFd};
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use log::{debug, error, info};
use vmm_sys_util::epoll::EventSet;

use crate::video_source::{PixelFormat, VideoBuffer, VideoSource};
use util::loop_context::{
    gen_delete_notifiers, EventNotifier, NotifierCallback, NotifierOperation,
};
use util::v4l2::{new_init, V4l2Device, V4L2_BUF_TYPE_VIDEO_OUTPUT, V4L2_MEMORY_MMAP};
use v4l2_sys_mit::v4l2_buffer;

const OUTPUT_BUFFER_COUNT: u32 = 4;

/// Consumer of the format negotiated on the control interface.
pub trait PipelineSink {
    fn set_format(&mut self, fmt: &PixelFormat) -> Result<()>;

    fn set_frame_rate(&mut self, fps: u32) -> Result<()>;

    /// Start or stop streaming.
    fn enable(&mut self, enable: bool) -> Result<()>;
}

/// Pumps frames from a video source into the gadget output queue.
pub struct UvcStream {
    video: Arc<V4l2Device>,
    source: Box<dyn VideoSource>,
    /// Duplicate of the gadget fd, watched for EPOLLOUT while streaming.
    out_fd: File,
    format: Option<PixelFormat>,
    streaming: bool,
    watching: bool,
}

fn output_buffer(index: u32) -> v4l2_buffer {
    let mut buf = new_init::<v4l2_buffer>();
    buf.index = index;
    buf.type_ = V4L2_BUF_TYPE_VIDEO_OUTPUT;
    buf.memory = V4L2_MEMORY_MMAP;
    buf
}

impl UvcStream {
    pub fn new(video: Arc<V4l2Device>, source: Box<dyn VideoSource>) -> Result<Self> {
        let out_fd = video.try_clone_file()?;
        Ok(UvcStream {
            video,
            source,
            out_fd,
            format: None,
            streaming: false,
            watching: false,
        })
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn format(&self) -> Option<PixelFormat> {
        self.format
    }

    fn fill_and_queue(&mut self, index: u32) -> Result<()> {
        let video = &self.video;
        let source = &mut self.source;
        video.with_buffer(index, |mem| -> Result<()> {
            let mut buf = VideoBuffer::new(index, mem);
            source.fill_buffer(&mut buf)?;
            let mut v4l2_buf = output_buffer(index);
            v4l2_buf.bytesused = buf.bytesused;
            video.queue_buffer(&mut v4l2_buf)?;
            source.queue_buffer(&buf)
        })?
    }

    fn start(&mut self) -> Result<()> {
        let count = self
            .video
            .request_buffers(V4L2_BUF_TYPE_VIDEO_OUTPUT, OUTPUT_BUFFER_COUNT)?;
        if count == 0 {
            bail!("No output buffer granted by {}", self.video.path());
        }
        self.source.stream_on()?;
        for index in 0..count {
            self.fill_and_queue(index)
                .with_context(|| format!("Failed to prime output buffer {}", index))?;
        }
        self.video.stream_on(V4L2_BUF_TYPE_VIDEO_OUTPUT as c_int)?;
        self.streaming = true;
        info!("{}: streaming with {} buffers", self.video.path(), count);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if self.streaming {
            self.streaming = false;
            self.video.stream_off(V4L2_BUF_TYPE_VIDEO_OUTPUT as c_int)?;
            info!("{}: streaming stopped", self.video.path());
        }
        self.source.stream_off()?;
        self.video.release_buffers()?;
        self.source.free_buffers()
    }

    /// Refill and requeue every buffer the gadget has sent.
    fn process_buffers(&mut self) -> Result<()> {
        while self.streaming {
            let mut buf = output_buffer(0);
            if !self.video.dequeue_buffer(&mut buf)? {
                break;
            }
            self.fill_and_queue(buf.index)?;
        }
        Ok(())
    }

    /// Reconcile the EPOLLOUT watch with the streaming state.
    pub fn sync_notifiers(stream: &Arc<Mutex<UvcStream>>) -> Option<Vec<EventNotifier>> {
        let mut locked_stream = stream.lock().unwrap();
        let fd: RawFd = locked_stream.out_fd.as_raw_fd();
        if locked_stream.streaming && !locked_stream.watching {
            locked_stream.watching = true;
            let cloned_stream = stream.clone();
            let handler: Rc<NotifierCallback> = Rc::new(move |_, _| {
                let ret = cloned_stream.lock().unwrap().process_buffers();
                if let Err(e) = ret {
                    error!("Failed to process output buffers, {:?}", e);
                    return cloned_stream.lock().unwrap().unwatch();
                }
                Self::sync_notifiers(&cloned_stream)
            });
            debug!("Watch output buffers on fd {}", fd);
            return Some(vec![EventNotifier::new(
                NotifierOperation::AddExclusion,
                fd,
                EventSet::OUT,
                vec![handler],
            )]);
        }
        if !locked_stream.streaming && locked_stream.watching {
            return locked_stream.unwatch();
        }
        None
    }

    fn unwatch(&mut self) -> Option<Vec<EventNotifier>> {
        if !self.watching {
            return None;
        }
        self.watching = false;
        debug!("Stop watching output buffers on fd {}", self.out_fd.as_raw_fd());
        Some(gen_delete_notifiers(&[self.out_fd.as_raw_fd()]))
    }
}

impl PipelineSink for UvcStream {
    fn set_format(&mut self, fmt: &PixelFormat) -> Result<()> {
        self.source.set_format(fmt)?;
        let mut v4l2_fmt = fmt.to_v4l2(V4L2_BUF_TYPE_VIDEO_OUTPUT);
        self.video
            .set_format(&mut v4l2_fmt)
            .with_context(|| format!("Failed to set output format {}", fmt))?;
        self.format = Some(*fmt);
        info!("{}: output format {}", self.video.path(), fmt);
        Ok(())
    }

    fn set_frame_rate(&mut self, fps: u32) -> Result<()> {
        self.source.set_frame_rate(fps)
    }

    fn enable(&mut self, enable: bool) -> Result<()> {
        if !enable {
            return self.stop();
        }
        if self.streaming {
            return Ok(());
        }
        if let Err(e) = self.start() {
            if let Err(stop_err) = self.stop() {
                error!("Failed to clean up stream, {:?}", stop_err);
            }
            return Err(e);
        }
        Ok(())
    }
}

impl Drop for UvcStream {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("Failed to stop stream on {}, {:?}", self.video.path(), e);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::video_source::test_source::TestSource;
    use util::PIXFMT_MJPG;

    // A regular node accepts open() and dup() but fails every V4L2 ioctl.
    fn null_stream() -> UvcStream {
        let video = Arc::new(V4l2Device::open("/dev/null").unwrap());
        UvcStream::new(video, Box::new(TestSource::new())).unwrap()
    }

    #[test]
    fn test_source_rejects_format() {
        let mut stream = null_stream();
        let fmt = PixelFormat {
            fourcc: PIXFMT_MJPG,
            width: 640,
            height: 480,
            ..Default::default()
        };
        assert!(stream.set_format(&fmt).is_err());
        assert_eq!(stream.format(), None);
    }

    #[test]
    fn test_enable_failure_keeps_stopped() {
        let mut stream = null_stream();
        assert!(stream.enable(true).is_err());
        assert!(!stream.is_streaming());
        assert!(stream.enable(false).is_ok());
    }

    #[test]
    fn test_sync_notifiers() {
        let stream = Arc::new(Mutex::new(null_stream()));
        assert!(UvcStream::sync_notifiers(&stream).is_none());

        stream.lock().unwrap().streaming = true;
        assert_eq!(UvcStream::sync_notifiers(&stream).map(|n| n.len()), Some(1));
        assert!(stream.lock().unwrap().watching);
        assert!(UvcStream::sync_notifiers(&stream).is_none());

        // Flip the flag directly, the device cannot stream.
        stream.lock().unwrap().streaming = false;
        assert_eq!(UvcStream::sync_notifiers(&stream).map(|n| n.len()), Some(1));
        assert!(!stream.lock().unwrap().watching);
        assert!(UvcStream::sync_notifiers(&stream).is_none());
    }
}
