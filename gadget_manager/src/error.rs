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
pub enum ConfigError {
    #[error("UtilError")]
    UtilError {
        #[from]
        source: util::error::UtilError,
    },
    #[error("Unable to parse \'{0}\' for \'{1}\'")]
    ConvertValueFailed(String, String),
    #[error("Directory {0} does not exist")]
    DirNotExist(String),
    #[error("No UVC function \'{0}\' found in {1}")]
    NoUvcFunction(String, String),
    #[error("Gadget {0} is not bound to any UDC")]
    GadgetNotBound(String),
    #[error("No video node found for {0} on UDC {1}")]
    NoVideoNode(String, String),
    #[error("Unknown format type of {0}")]
    UnknownFormatType(String),
    #[error("Invalid guidFormat of {0}, length {1}")]
    InvalidGuid(String, usize),
    #[error("\'{0}\' declares no {1}")]
    EmptyList(String, &'static str),
    #[error("Frame interval must be non-zero in {0}")]
    ZeroInterval(String),
}
