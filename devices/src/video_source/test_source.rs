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

use anyhow::{bail, Result};
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, trace};

use super::{PixelFormat, VideoBuffer, VideoSource};
use crate::usb::UsbError;
use util::{fourcc_to_string, PIXFMT_YUYV};

/// Two YUYV pixels, Y0 U Y1 V.
const WHITE: u32 = 0x80eb80eb;
const GRAY: u32 = 0x807f7f7f;
/// Side of a checkerboard square in pixels.
const SQUARE_SIZE: u32 = 32;

/// Moving YUYV checkerboard.
#[derive(Default)]
pub struct TestSource {
    width: u32,
    height: u32,
    frame_count: u32,
}

impl TestSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn frame_size(&self) -> usize {
        self.width as usize * 2 * self.height as usize
    }
}

impl VideoSource for TestSource {
    fn set_format(&mut self, fmt: &PixelFormat) -> Result<()> {
        if fmt.fourcc != PIXFMT_YUYV {
            bail!(UsbError::UnsupportedFormat(fourcc_to_string(fmt.fourcc)));
        }
        self.width = fmt.width;
        self.height = fmt.height;
        debug!("Test source format {}", fmt);
        Ok(())
    }

    fn set_frame_rate(&mut self, _fps: u32) -> Result<()> {
        Ok(())
    }

    fn stream_on(&mut self) -> Result<()> {
        Ok(())
    }

    fn stream_off(&mut self) -> Result<()> {
        Ok(())
    }

    fn fill_buffer(&mut self, buf: &mut VideoBuffer) -> Result<()> {
        let size = self.frame_size();
        if size == 0 {
            bail!(UsbError::InvalidFrameSize(self.width, self.height));
        }
        if buf.mem.len() < size {
            bail!(UsbError::BufferTooSmall(buf.mem.len(), size));
        }

        let bpl = self.width as usize * 2;
        let offset = self.frame_count % (SQUARE_SIZE * 2);
        for (row, line) in buf.mem[..size].chunks_exact_mut(bpl).enumerate() {
            let row = row as u32;
            for (pair, pixels) in line.chunks_exact_mut(4).enumerate() {
                let x = (pair as u32 * 2 + offset) % self.width;
                let color = if (row / SQUARE_SIZE + x / SQUARE_SIZE) % 2 == 0 {
                    WHITE
                } else {
                    GRAY
                };
                LittleEndian::write_u32(pixels, color);
            }
        }
        buf.bytesused = size as u32;

        trace!(
            "Test frame {} {}x{} offset {}",
            self.frame_count,
            self.width,
            self.height,
            offset
        );
        self.frame_count = self.frame_count.wrapping_add(1);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use util::PIXFMT_MJPG;

    fn yuyv(width: u32, height: u32) -> PixelFormat {
        PixelFormat {
            fourcc: PIXFMT_YUYV,
            width,
            height,
            ..Default::default()
        }
    }

    fn pixel_pair(mem: &[u8], bpl: usize, row: usize, pair: usize) -> u32 {
        LittleEndian::read_u32(&mem[row * bpl + pair * 4..])
    }

    #[test]
    fn test_yuyv_only() {
        let mut source = TestSource::new();
        let mut fmt = yuyv(640, 480);
        fmt.fourcc = PIXFMT_MJPG;
        let err = source.set_format(&fmt).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<UsbError>(),
            Some(UsbError::UnsupportedFormat(_))
        ));
        assert!(source.set_format(&yuyv(640, 480)).is_ok());
    }

    #[test]
    fn test_fill_pattern() {
        let mut source = TestSource::new();
        source.set_format(&yuyv(128, 64)).unwrap();
        let mut mem = vec![0u8; 128 * 2 * 64 + 16];
        let mut buf = VideoBuffer::new(0, &mut mem);
        source.fill_buffer(&mut buf).unwrap();
        assert_eq!(buf.bytesused, 128 * 2 * 64);

        let bpl = 256;
        // First square is white, its right and lower neighbours are gray.
        assert_eq!(pixel_pair(&mem, bpl, 0, 0), WHITE);
        assert_eq!(pixel_pair(&mem, bpl, 0, 15), WHITE);
        assert_eq!(pixel_pair(&mem, bpl, 0, 16), GRAY);
        assert_eq!(pixel_pair(&mem, bpl, 32, 0), GRAY);
        assert_eq!(pixel_pair(&mem, bpl, 32, 16), WHITE);
        // Bytes beyond the frame are untouched.
        assert!(mem[128 * 2 * 64..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_pattern_moves() {
        let mut source = TestSource::new();
        source.set_format(&yuyv(128, 2)).unwrap();
        let mut mem = vec![0u8; 128 * 2 * 2];
        for _ in 0..3 {
            source.fill_buffer(&mut VideoBuffer::new(0, &mut mem)).unwrap();
        }
        // The third frame is shifted by two pixels.
        assert_eq!(source.frame_count, 3);
        assert_eq!(pixel_pair(&mem, 256, 0, 15), GRAY);
        assert_eq!(pixel_pair(&mem, 256, 0, 14), WHITE);
    }

    #[test]
    fn test_buffer_too_small() {
        let mut source = TestSource::new();
        source.set_format(&yuyv(640, 480)).unwrap();
        let mut mem = vec![0u8; 1024];
        let mut buf = VideoBuffer::new(0, &mut mem);
        let err = source.fill_buffer(&mut buf).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<UsbError>(),
            Some(UsbError::BufferTooSmall(1024, 614400))
        ));
        assert_eq!(buf.bytesused, 0);
        assert_eq!(source.frame_count, 0);

        // No format set yet.
        let mut source = TestSource::new();
        assert!(source.fill_buffer(&mut VideoBuffer::new(0, &mut mem)).is_err());
    }
}
