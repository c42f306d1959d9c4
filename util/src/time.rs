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

pub const NANOSECONDS_PER_SECOND: u64 = 1_000_000_000;

/// Get the realtime clock as (seconds, nanoseconds).
pub fn gettime() -> Result<(u64, u32)> {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: ts is a valid timespec owned by this frame.
    let ret = unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts) };
    if ret != 0 {
        bail!(
            "clock_gettime failed: {:?}",
            std::io::Error::last_os_error()
        );
    }
    Ok((ts.tv_sec as u64, ts.tv_nsec as u32))
}

/// Split seconds since epoch into local [year, month, day, hour, minute, second].
pub fn get_format_time(sec: i64) -> [i32; 6] {
    let time = sec as libc::time_t;
    // SAFETY: zeroed tm is a valid value for the plain C struct.
    let mut tm: libc::tm = unsafe { std::mem::zeroed() };
    // SAFETY: both pointers refer to live locals.
    let ret = unsafe { libc::localtime_r(&time, &mut tm) };
    if ret.is_null() {
        return [1970, 1, 1, 0, 0, 0];
    }
    [
        tm.tm_year + 1900,
        tm.tm_mon + 1,
        tm.tm_mday,
        tm.tm_hour,
        tm.tm_min,
        tm.tm_sec,
    ]
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_get_format_time() {
        let (sec, nsec) = gettime().unwrap();
        assert!(u64::from(nsec) < NANOSECONDS_PER_SECOND);

        let now = get_format_time(sec as i64);
        assert!(now[0] >= 2024);
        assert!((1..=12).contains(&now[1]));
        assert!((1..=31).contains(&now[2]));
        assert!((0..=23).contains(&now[3]));
        assert!((0..=59).contains(&now[4]));
        assert!((0..=60).contains(&now[5]));
    }
}
