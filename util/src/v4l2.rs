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

use std::fs::{File, OpenOptions};
use std::os::unix::prelude::{AsRawFd, OpenOptionsExt, RawFd};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use log::{debug, error};
use v4l2_sys_mit::{
    v4l2_buffer, v4l2_capability, v4l2_event, v4l2_event_subscription, v4l2_format,
    v4l2_requestbuffers, v4l2_streamparm, V4L2_CAP_DEVICE_CAPS,
};
pub use v4l2_sys_mit::{
    v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_CAPTURE as V4L2_BUF_TYPE_VIDEO_CAPTURE,
    v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_OUTPUT as V4L2_BUF_TYPE_VIDEO_OUTPUT,
    v4l2_field_V4L2_FIELD_NONE as V4L2_FIELD_NONE, v4l2_memory_V4L2_MEMORY_MMAP as V4L2_MEMORY_MMAP,
};
use vmm_sys_util::ioctl::{ioctl_with_mut_ref, ioctl_with_ref};
use vmm_sys_util::{ioctl_ioc_nr, ioctl_ior_nr, ioctl_iow_nr, ioctl_iowr_nr};

use crate::g_uvc::{uvc_request_data, UVCIOC_SEND_RESPONSE};
use crate::UtilError;

const VIDEO: u32 = 86;

ioctl_ior_nr!(VIDIOC_QUERYCAP, VIDEO, 0, v4l2_capability);
ioctl_iowr_nr!(VIDIOC_S_FMT, VIDEO, 5, v4l2_format);
ioctl_iowr_nr!(VIDIOC_REQBUFS, VIDEO, 8, v4l2_requestbuffers);
ioctl_iowr_nr!(VIDIOC_QUERYBUF, VIDEO, 9, v4l2_buffer);
ioctl_iowr_nr!(VIDIOC_QBUF, VIDEO, 15, v4l2_buffer);
ioctl_iowr_nr!(VIDIOC_DQBUF, VIDEO, 17, v4l2_buffer);
ioctl_iow_nr!(VIDIOC_STREAMON, VIDEO, 18, std::os::raw::c_int);
ioctl_iow_nr!(VIDIOC_STREAMOFF, VIDEO, 19, std::os::raw::c_int);
ioctl_iowr_nr!(VIDIOC_S_PARM, VIDEO, 22, v4l2_streamparm);
ioctl_ior_nr!(VIDIOC_DQEVENT, VIDEO, 89, v4l2_event);
ioctl_iow_nr!(VIDIOC_SUBSCRIBE_EVENT, VIDEO, 90, v4l2_event_subscription);

/// One mmap'ed V4L2 buffer.
#[derive(Clone, Copy, Debug, Default)]
struct MmapBuffer {
    base: u64,
    len: u64,
}

#[derive(Default)]
struct BufferPool {
    type_: u32,
    bufs: Vec<MmapBuffer>,
}

/// A V4L2 video node, either a capture device or the UVC gadget output node.
pub struct V4l2Device {
    /// Device path, such as /dev/video0.
    path: String,
    /// Device fd.
    fd: File,
    /// Buffers mapped with `request_buffers`.
    pool: Mutex<BufferPool>,
}

impl Drop for V4l2Device {
    fn drop(&mut self) {
        debug!("Drop v4l2 device fd {}", self.as_raw_fd());
        if let Err(e) = self.release_buffers() {
            error!("Failed to release buffer for {}, {:?}", self.path, e);
        }
    }
}

impl V4l2Device {
    pub fn open(path: &str) -> Result<Self> {
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_CLOEXEC | libc::O_NONBLOCK)
            .open(path)
            .with_context(|| format!("Failed to open v4l2 device {}.", path))?;
        Ok(Self {
            path: path.to_string(),
            fd,
            pool: Mutex::new(BufferPool::default()),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn ioctl_error(&self, op: &'static str) -> anyhow::Error {
        anyhow!(UtilError::V4l2Ioctl(
            op,
            self.path.clone(),
            std::io::Error::last_os_error()
        ))
    }

    /// Duplicate the device fd, used to watch buffer completion separately
    /// from event readiness.
    pub fn try_clone_file(&self) -> Result<File> {
        self.fd
            .try_clone()
            .with_context(|| format!("Failed to dup fd of {}", self.path))
    }

    pub fn query_cap(&self) -> Result<v4l2_capability> {
        let mut cap = new_init::<v4l2_capability>();
        // SAFETY: self.fd is created in function open().
        let ret = unsafe { ioctl_with_mut_ref(self, VIDIOC_QUERYCAP(), &mut cap) };
        if ret < 0 {
            return Err(self.ioctl_error("query cap"));
        }
        Ok(cap)
    }

    /// Check the node supports streaming I/O and the given capability bit.
    pub fn check_cap(&self, cap_flag: u32, name: &'static str) -> Result<()> {
        let cap = self.query_cap()?;
        let caps = if cap.capabilities & V4L2_CAP_DEVICE_CAPS != 0 {
            cap.device_caps
        } else {
            cap.capabilities
        };
        if caps & cap_flag == 0 {
            return Err(anyhow!(UtilError::V4l2Capability(self.path.clone(), name)));
        }
        Ok(())
    }

    /// Set the format. The driver adjusts `fmt` to what it accepted.
    pub fn set_format(&self, fmt: &mut v4l2_format) -> Result<()> {
        // SAFETY: self.fd is created in function open().
        let ret = unsafe { ioctl_with_mut_ref(self, VIDIOC_S_FMT(), fmt) };
        if ret < 0 {
            return Err(self.ioctl_error("set format"));
        }
        Ok(())
    }

    /// Request and mmap `count` buffers of `type_`. Returns the number granted.
    pub fn request_buffers(&self, type_: u32, count: u32) -> Result<u32> {
        // Ensure that there are no residual buffers.
        self.release_buffers()?;
        let mut req = new_init::<v4l2_requestbuffers>();
        req.count = count;
        req.type_ = type_;
        req.memory = V4L2_MEMORY_MMAP;
        // SAFETY: self.fd is created in function open().
        let ret = unsafe { ioctl_with_mut_ref(self, VIDIOC_REQBUFS(), &mut req) };
        if ret < 0 {
            return Err(self.ioctl_error("request buffers"));
        }

        let mut pool = self.pool.lock().unwrap();
        pool.type_ = type_;
        for i in 0..req.count {
            let mut buf = new_init::<v4l2_buffer>();
            buf.index = i;
            buf.type_ = type_;
            buf.memory = V4L2_MEMORY_MMAP;
            // SAFETY: self.fd is created in function open().
            let ret = unsafe { ioctl_with_mut_ref(self, VIDIOC_QUERYBUF(), &mut buf) };
            if ret < 0 {
                return Err(self.ioctl_error("query buffer"));
            }

            // SAFETY:
            // 1. self.fd is created in function open().
            // 2. offset and length are reported by the driver for this buffer.
            let ret = unsafe {
                libc::mmap(
                    std::ptr::null_mut() as *mut libc::c_void,
                    buf.length as libc::size_t,
                    libc::PROT_WRITE | libc::PROT_READ,
                    libc::MAP_SHARED,
                    self.as_raw_fd(),
                    buf.m.offset as libc::off_t,
                )
            };
            if ret == libc::MAP_FAILED {
                return Err(self.ioctl_error("mmap buffer"));
            }
            pool.bufs.push(MmapBuffer {
                base: ret as u64,
                len: buf.length as u64,
            });
        }
        debug!("{}: mapped {} buffers", self.path, pool.bufs.len());
        Ok(req.count)
    }

    /// Unmap all buffers and give them back to the driver.
    pub fn release_buffers(&self) -> Result<()> {
        let mut pool = self.pool.lock().unwrap();
        if pool.bufs.is_empty() {
            return Ok(());
        }
        for buf in pool.bufs.drain(..) {
            // SAFETY: buf was mapped in request_buffers() with this length.
            let ret =
                unsafe { libc::munmap(buf.base as *mut libc::c_void, buf.len as libc::size_t) };
            if ret < 0 {
                return Err(self.ioctl_error("munmap buffer"));
            }
        }

        let mut req = new_init::<v4l2_requestbuffers>();
        req.type_ = pool.type_;
        req.memory = V4L2_MEMORY_MMAP;
        // SAFETY: self.fd is created in function open().
        let ret = unsafe { ioctl_with_mut_ref(self, VIDIOC_REQBUFS(), &mut req) };
        if ret < 0 {
            return Err(self.ioctl_error("free buffers"));
        }
        Ok(())
    }

    /// Run `f` over the mapped memory of buffer `index`.
    pub fn with_buffer<R>(&self, index: u32, f: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
        let pool = self.pool.lock().unwrap();
        let buf = pool
            .bufs
            .get(index as usize)
            .ok_or_else(|| anyhow!(UtilError::BufferOutOfBound(index, pool.bufs.len())))?;
        // SAFETY: the mapping stays alive while the pool lock is held.
        let mem =
            unsafe { std::slice::from_raw_parts_mut(buf.base as *mut u8, buf.len as usize) };
        Ok(f(mem))
    }

    pub fn stream_on(&self, vtype: std::os::raw::c_int) -> Result<()> {
        // SAFETY: self.fd is created in function open().
        let ret = unsafe { ioctl_with_ref(self, VIDIOC_STREAMON(), &vtype) };
        if ret < 0 {
            return Err(self.ioctl_error("stream on"));
        }
        Ok(())
    }

    pub fn stream_off(&self, vtype: std::os::raw::c_int) -> Result<()> {
        // SAFETY: self.fd is created in function open().
        let ret = unsafe { ioctl_with_ref(self, VIDIOC_STREAMOFF(), &vtype) };
        if ret < 0 {
            return Err(self.ioctl_error("stream off"));
        }
        Ok(())
    }

    pub fn queue_buffer(&self, buf: &mut v4l2_buffer) -> Result<()> {
        // SAFETY: self.fd is created in function open().
        let ret = unsafe { ioctl_with_mut_ref(self, VIDIOC_QBUF(), buf) };
        if ret < 0 {
            return Err(self.ioctl_error("queue buffer"));
        }
        Ok(())
    }

    /// Dequeue a completed buffer. Returns false when none is ready.
    pub fn dequeue_buffer(&self, buf: &mut v4l2_buffer) -> Result<bool> {
        // SAFETY: self.fd is created in function open().
        let ret = unsafe { ioctl_with_mut_ref(self, VIDIOC_DQBUF(), buf) };
        if ret < 0 {
            if nix::errno::errno() == libc::EAGAIN {
                return Ok(false);
            }
            return Err(self.ioctl_error("dequeue buffer"));
        }
        Ok(true)
    }

    pub fn set_stream_parameter(&self, parm: &mut v4l2_streamparm) -> Result<()> {
        // SAFETY: self.fd is created in function open().
        let ret = unsafe { ioctl_with_mut_ref(self, VIDIOC_S_PARM(), parm) };
        if ret < 0 {
            return Err(self.ioctl_error("set stream parameter"));
        }
        Ok(())
    }

    pub fn subscribe_event(&self, type_: u32) -> Result<()> {
        let mut sub = new_init::<v4l2_event_subscription>();
        sub.type_ = type_;
        // SAFETY: self.fd is created in function open().
        let ret = unsafe { ioctl_with_ref(self, VIDIOC_SUBSCRIBE_EVENT(), &sub) };
        if ret < 0 {
            return Err(self.ioctl_error("subscribe event"));
        }
        Ok(())
    }

    /// Dequeue one pending event. Returns None when the queue is empty.
    pub fn dequeue_event(&self) -> Result<Option<v4l2_event>> {
        let mut event = new_init::<v4l2_event>();
        // SAFETY: self.fd is created in function open().
        let ret = unsafe { ioctl_with_mut_ref(self, VIDIOC_DQEVENT(), &mut event) };
        if ret < 0 {
            let errno = nix::errno::errno();
            if errno == libc::ENOENT || errno == libc::EAGAIN {
                return Ok(None);
            }
            return Err(self.ioctl_error("dequeue event"));
        }
        Ok(Some(event))
    }

    pub fn send_response(&self, resp: &uvc_request_data) -> Result<()> {
        // SAFETY: self.fd is created in function open().
        let ret = unsafe { ioctl_with_ref(self, UVCIOC_SEND_RESPONSE(), resp) };
        if ret < 0 {
            return Err(self.ioctl_error("send response"));
        }
        Ok(())
    }
}

impl AsRawFd for V4l2Device {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

pub fn new_init<T>() -> T {
    let mut s = ::std::mem::MaybeUninit::<T>::uninit();
    // SAFETY: s can be guaranteed not be null.
    unsafe {
        ::std::ptr::write_bytes(s.as_mut_ptr(), 0, 1);
        s.assume_init()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_open_missing_device() {
        assert!(V4l2Device::open("/nonexistent/video99").is_err());
    }

    #[test]
    fn test_new_init_zeroed() {
        let mut fmt = new_init::<v4l2_format>();
        fmt.type_ = V4L2_BUF_TYPE_VIDEO_OUTPUT;
        // SAFETY: pix is plain data within the zeroed union.
        let pix = unsafe { &mut fmt.fmt.pix };
        assert_eq!(pix.width, 0);
        pix.field = V4L2_FIELD_NONE;
        assert_eq!(unsafe { fmt.fmt.raw_data[12] }, V4L2_FIELD_NONE as u8);
    }
}
