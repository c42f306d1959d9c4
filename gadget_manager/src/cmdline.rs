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

use std::ffi::OsString;

use clap::{error::ErrorKind, Parser};

/// USB Video Class gadget daemon.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "uvc-gadget", version = util::VERSION)]
pub struct GadgetArgs {
    /// Stream from a V4L2 capture device instead of the test pattern.
    #[arg(short = 'c', value_name = "device")]
    pub capture: Option<String>,
    /// Write logs to this file instead of stderr.
    #[arg(short = 'D', value_name = "logfile")]
    pub log_file: Option<String>,
    /// UVC function to serve: 'uvc.0', 'g1/functions/uvc.0' or nothing for the first one.
    #[arg(value_name = "uvc device")]
    pub device: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum CmdlineAction {
    Run(GadgetArgs),
    /// Usage was printed, exit with the code.
    Exit(i32),
}

/// Parse the process arguments. Help goes to stdout with code 0, usage
/// errors go to stderr with code 1.
pub fn parse_cmdline<I, T>(args: I) -> CmdlineAction
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match GadgetArgs::try_parse_from(args) {
        Ok(args) => CmdlineAction::Run(args),
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            if let Err(print_err) = e.print() {
                eprintln!("Failed to print usage: {}", print_err);
            }
            CmdlineAction::Exit(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_args() {
        let action = parse_cmdline([
            "uvc-gadget",
            "-c",
            "/dev/video0",
            "-D",
            "/tmp/gadget.log",
            "uvc.0",
        ]);
        assert_eq!(
            action,
            CmdlineAction::Run(GadgetArgs {
                capture: Some("/dev/video0".to_string()),
                log_file: Some("/tmp/gadget.log".to_string()),
                device: Some("uvc.0".to_string()),
            })
        );

        match parse_cmdline(["uvc-gadget"]) {
            CmdlineAction::Run(args) => {
                assert!(args.device.is_none());
                assert!(args.capture.is_none());
            }
            CmdlineAction::Exit(code) => panic!("unexpected exit {}", code),
        }
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(parse_cmdline(["uvc-gadget", "-h"]), CmdlineAction::Exit(0));
        assert_eq!(parse_cmdline(["uvc-gadget", "-V"]), CmdlineAction::Exit(0));
        assert_eq!(parse_cmdline(["uvc-gadget", "-x"]), CmdlineAction::Exit(1));
        assert_eq!(
            parse_cmdline(["uvc-gadget", "uvc.0", "uvc.1"]),
            CmdlineAction::Exit(1)
        );
    }
}
