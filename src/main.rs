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

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use log::{error, info};

use devices::stream::{PipelineSink, UvcStream};
use devices::usb::gadget::UvcGadget;
use devices::video_source::create_video_source;
use gadget_manager::cmdline::{parse_cmdline, CmdlineAction, GadgetArgs};
use gadget_manager::config::UvcFunctionConfig;
use gadget_manager::signal_handler::{ShutdownToken, SignalHandler};
use util::logger;
use util::loop_context::{EventLoopContext, EventNotifierHelper};
use util::v4l2::V4l2Device;

pub trait ExitCode {
    /// Returns the value to use as the exit status.
    fn code(self) -> i32;
}

impl ExitCode for i32 {
    fn code(self) -> i32 {
        self
    }
}

impl ExitCode for () {
    fn code(self) -> i32 {
        0
    }
}

fn main() {
    let args = match parse_cmdline(std::env::args_os()) {
        CmdlineAction::Run(args) => args,
        CmdlineAction::Exit(code) => std::process::exit(code),
    };

    ::std::process::exit(match run(args) {
        Ok(ret) => ExitCode::code(ret),
        Err(ref e) => {
            eprintln!("{:?}", e);
            1
        }
    });
}

fn run(args: GadgetArgs) -> Result<i32> {
    logger::init_log(args.log_file.clone().unwrap_or_default())?;
    set_panic_hook();
    info!("uvc-gadget version {}", util::VERSION);
    match real_main(&args) {
        Ok(()) => {
            info!("MainLoop over, uvc-gadget exit");
            Ok(0)
        }
        Err(ref e) => {
            error!("{:?}", e);
            Ok(1)
        }
    }
}

fn real_main(args: &GadgetArgs) -> Result<()> {
    let config = Arc::new(
        UvcFunctionConfig::from_configfs(args.device.as_deref())
            .with_context(|| "Failed to identify function configuration")?,
    );
    info!(
        "UVC function {} bound to {}, video node {}",
        config.function, config.udc, config.video
    );

    // Block the termination signals before anything else can be spawned.
    let token = ShutdownToken::new();
    let signal_handler = Arc::new(Mutex::new(SignalHandler::new(token.clone())?));
    let mut main_loop = EventLoopContext::new()?;
    main_loop.set_manager(Arc::new(Mutex::new(token)));

    let source = create_video_source(args.capture.as_deref())
        .with_context(|| "Failed to create video source")?;
    let video = Arc::new(V4l2Device::open(&config.video)?);
    let stream = Arc::new(Mutex::new(UvcStream::new(video.clone(), source)?));
    let gadget = Arc::new(Mutex::new(
        UvcGadget::new(config.clone(), video, stream.clone())
            .with_context(|| "Failed to open UVC gadget")?,
    ));

    main_loop.update_events(EventNotifierHelper::internal_notifiers(signal_handler))?;
    main_loop.update_events(EventNotifierHelper::internal_notifiers(gadget))?;

    while main_loop
        .run()
        .with_context(|| "MainLoop exits unexpectedly: error occurs")?
    {}

    if let Err(e) = stream.lock().unwrap().enable(false) {
        error!("Failed to stop stream, {:?}", e);
    }
    Ok(())
}

fn set_panic_hook() {
    std::panic::set_hook(Box::new(|panic_msg| {
        let panic_file = panic_msg.location().map_or("", |loc| loc.file());
        let panic_line = panic_msg.location().map_or(0, |loc| loc.line());
        if let Some(msg) = panic_msg.payload().downcast_ref::<&str>() {
            error!("Panic at [{}: {}]: {}.", panic_file, panic_line, msg);
        } else {
            error!("Panic at [{}: {}].", panic_file, panic_line);
        }
    }));
}
