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

use std::{env, fs, path::Path, process::Command};

/// Overrides the commit id, for builds from a source tarball.
const COMMIT_ID_ENV: &str = "UVC_GADGET_COMMIT_ID";

fn commit_id() -> String {
    println!("cargo:rerun-if-env-changed={}", COMMIT_ID_ENV);
    if let Some(id) = env::var(COMMIT_ID_ENV).ok().filter(|id| !id.trim().is_empty()) {
        return id.trim().to_string();
    }

    println!("cargo:rerun-if-changed=../.git/HEAD");
    println!("cargo:rerun-if-changed=../.git/refs");
    let output = Command::new("git")
        .args(["describe", "--always", "--dirty", "--abbrev=8"])
        .output();
    match output {
        Ok(o) if o.status.success() => match String::from_utf8(o.stdout) {
            Ok(id) => id.trim().to_string(),
            Err(e) => {
                println!("cargo:warning=Invalid git commit id: {}", e);
                String::from("unknown")
            }
        },
        Ok(o) => {
            println!("cargo:warning=git describe failed with status {}", o.status);
            String::from("unknown")
        }
        Err(e) => {
            println!("cargo:warning=git is not available: {}", e);
            String::from("unknown")
        }
    }
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    let version = format!(
        "{} commit-id {}",
        env!("CARGO_PKG_VERSION"),
        commit_id()
    );
    let out_dir = env::var("OUT_DIR").expect("cargo sets OUT_DIR for build scripts");
    fs::write(Path::new(&out_dir).join("VERSION"), version).expect("Failed to write VERSION");
}
