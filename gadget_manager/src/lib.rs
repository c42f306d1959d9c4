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

//! # Gadget Manager
//!
//! Configuration and process management for the UVC gadget daemon.
//!
//! ## Design
//!
//! This crate offers support for:
//! 1. The command line of the daemon.
//! 2. Reading the UVC function configuration from ConfigFS.
//! 3. Signal driven shutdown of the event loop.

pub mod cmdline;
pub mod config;
pub mod error;
pub mod signal_handler;

pub use error::ConfigError;
