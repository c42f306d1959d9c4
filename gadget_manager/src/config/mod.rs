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

pub mod uvc;

pub use uvc::*;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};

use crate::error::ConfigError;

/// Check the value of a parsed configuration.
pub trait ConfigCheck {
    fn check(&self) -> Result<()>;
}

/// Read a textual ConfigFS/sysfs attribute, trailing newline stripped.
pub fn read_attribute(path: &Path) -> Result<String> {
    let value = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read attribute {}", path.display()))?;
    Ok(value.trim_end().to_string())
}

/// Read a numeric attribute `name` below `dir`.
pub fn read_attribute_num<T: FromStr>(dir: &Path, name: &str) -> Result<T> {
    let path = dir.join(name);
    let value = read_attribute(&path)?;
    value.trim().parse::<T>().map_err(|_| {
        anyhow!(ConfigError::ConvertValueFailed(
            value.clone(),
            path.display().to_string()
        ))
    })
}

/// List the entries of `dir` in name order.
pub fn sorted_dir_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(anyhow!(ConfigError::DirNotExist(dir.display().to_string())));
    }
    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<PathBuf>>>()?;
    entries.sort();
    Ok(entries)
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_attribute_num() {
        let dir = std::env::temp_dir().join(format!("uvc-gadget-attr-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("wWidth"), "640\n").unwrap();
        std::fs::write(dir.join("bogus"), "x12\n").unwrap();

        assert_eq!(read_attribute_num::<u32>(&dir, "wWidth").unwrap(), 640);
        assert!(read_attribute_num::<u32>(&dir, "bogus").is_err());
        assert!(read_attribute_num::<u32>(&dir, "missing").is_err());
        assert!(sorted_dir_entries(&dir.join("missing")).is_err());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
