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

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UtilError {
    // loop_context error
    #[error("Found bad syscall, error is {0} .")]
    BadSyscall(std::io::Error),
    #[error("Failed to execute epoll_wait syscall: {0} .")]
    EpollWait(std::io::Error),
    #[error("The fd {0} is not registered in epoll.")]
    NoRegisterFd(i32),
    #[error("Notifier Operation non allowed.")]
    BadNotifierOperation,
    // v4l2 error
    #[error("Failed to {0} on v4l2 device {1}, error {2}")]
    V4l2Ioctl(&'static str, String, std::io::Error),
    #[error("V4l2 device {0} has no {1} capability")]
    V4l2Capability(String, &'static str),
    #[error("Buffer index {0} out of bound {1}")]
    BufferOutOfBound(u32, usize),
}
