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
use std::io::Write;
use std::num::Wrapping;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::Mutex;
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use log::{Level, LevelFilter, Log, Metadata, Record};
use nix::unistd::{getpid, gettid};

use crate::time::{get_format_time, gettime};

/// Environment variable selecting the log level.
pub const LOG_LEVEL_ENV: &str = "UVC_GADGET_LOG_LEVEL";

// Max size of the log file is 100MB.
const LOG_ROTATE_SIZE_MAX: usize = 100 * 1024 * 1024;
// Logs are retained for seven days.
const LOG_ROTATE_COUNT_MAX: u32 = 7;

fn format_now() -> String {
    let (sec, nsec) = gettime().unwrap_or_else(|e| {
        eprintln!("{:?}", e);
        (0, 0)
    });
    let t = get_format_time(sec as i64);

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:09}",
        t[0], t[1], t[2], t[3], t[4], t[5], nsec
    )
}

fn parse_level(level: Option<&str>) -> Level {
    match level.map(|l| l.to_lowercase()).as_deref() {
        Some("error") => Level::Error,
        Some("warn") => Level::Warn,
        Some("debug") => Level::Debug,
        Some("trace") => Level::Trace,
        _ => Level::Info,
    }
}

struct FileRotate {
    handler: Box<dyn Write + Send>,
    path: String,
    current_size: Wrapping<usize>,
    create_day: i32,
    size_max: usize,
}

impl FileRotate {
    fn rotated_name(&self, index: u32) -> String {
        if index == 0 {
            self.path.clone()
        } else {
            format!("{}{}", self.path, index)
        }
    }

    fn rotate_file(&mut self, size_inc: usize) -> Result<()> {
        if self.path.is_empty() {
            return Ok(());
        }

        self.current_size += Wrapping(size_inc);
        let today = get_format_time(gettime()?.0 as i64)[2];
        if self.current_size < Wrapping(self.size_max) && self.create_day == today {
            return Ok(());
        }

        let oldest = self.rotated_name(LOG_ROTATE_COUNT_MAX - 1);
        if Path::new(&oldest).exists() {
            std::fs::remove_file(&oldest)
                .with_context(|| format!("Failed to remove log file {}", oldest))?;
        }
        for index in (0..LOG_ROTATE_COUNT_MAX - 1).rev() {
            let from = self.rotated_name(index);
            let to = self.rotated_name(index + 1);
            if Path::new(&from).exists() {
                std::fs::rename(&from, &to).with_context(|| {
                    format!("Failed to rename log file from {} to {}", from, to)
                })?;
            }
        }

        self.handler = Box::new(open_log_file(&self.path)?);
        self.current_size = Wrapping(0);
        self.create_day = today;
        Ok(())
    }
}

/// Format like "%year-%mon-%dayT%hour:%min:%sec.%nsec: [pid][tid][file: line]:LEVEL: msg".
struct GadgetLogger {
    rotate: Mutex<FileRotate>,
    level: Level,
}

impl Log for GadgetLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let formatmsg = format!(
            "{:<5}: [{}][{}][{}: {}]:{}: {}\n",
            format_now(),
            getpid().as_raw(),
            gettid().as_raw(),
            record.file().unwrap_or(""),
            record.line().unwrap_or(0),
            record.level(),
            record.args()
        );

        let mut rotate = self.rotate.lock().unwrap();
        if let Err(e) = rotate.handler.write_all(formatmsg.as_bytes()) {
            eprintln!("Failed to log message {:?}", e);
            return;
        }
        if let Err(e) = rotate.rotate_file(formatmsg.len()) {
            eprintln!("Failed to rotate log files {:?}", e);
        }
    }

    fn flush(&self) {
        if let Err(e) = self.rotate.lock().unwrap().handler.flush() {
            eprintln!("Failed to flush log {:?}", e);
        }
    }
}

fn open_log_file(path: &str) -> Result<File> {
    std::fs::OpenOptions::new()
        .write(true)
        .append(true)
        .create(true)
        .mode(0o640)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path))
}

fn new_file_rotate(logfile: Box<dyn Write + Send>, path: String) -> Result<FileRotate> {
    let (current_size, create_day) = if path.is_empty() {
        (Wrapping(0), 0)
    } else {
        let metadata = File::open(&path)?.metadata()?;
        let sec = metadata.modified()?.duration_since(UNIX_EPOCH)?.as_secs();
        (
            Wrapping(metadata.len() as usize),
            get_format_time(sec as i64)[2],
        )
    };
    Ok(FileRotate {
        handler: logfile,
        path,
        current_size,
        create_day,
        size_max: LOG_ROTATE_SIZE_MAX,
    })
}

/// Install the process logger. An empty `path` logs to stderr.
pub fn init_log(path: String) -> Result<()> {
    let logfile: Box<dyn Write + Send> = if path.is_empty() {
        Box::new(std::io::stderr())
    } else {
        Box::new(open_log_file(&path)?)
    };
    let level = parse_level(std::env::var(LOG_LEVEL_ENV).ok().as_deref());
    let logger = GadgetLogger {
        rotate: Mutex::new(new_file_rotate(logfile, path.clone())?),
        level,
    };
    log::set_boxed_logger(Box::new(logger))
        .map(|()| log::set_max_level(LevelFilter::Trace))
        .with_context(|| format!("Failed to init logger: {}", path))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level(None), Level::Info);
        assert_eq!(parse_level(Some("DEBUG")), Level::Debug);
        assert_eq!(parse_level(Some("warn")), Level::Warn);
        assert_eq!(parse_level(Some("bogus")), Level::Info);
    }

    #[test]
    fn test_rotate_file() {
        let dir = std::env::temp_dir().join(format!("uvc-gadget-log-{}", getpid().as_raw()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("gadget.log").to_str().unwrap().to_string();

        let logfile = Box::new(open_log_file(&path).unwrap());
        let mut rotate = new_file_rotate(logfile, path.clone()).unwrap();
        rotate.size_max = 16;
        rotate.handler.write_all(b"0123456789abcdefg").unwrap();
        rotate.rotate_file(17).unwrap();

        assert!(Path::new(&format!("{}1", path)).exists());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
        assert_eq!(rotate.current_size, Wrapping(0));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
