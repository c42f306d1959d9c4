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

use std::os::unix::io::{AsRawFd, RawFd};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use log::{error, info};
use nix::sys::signal::{SigSet, Signal};
use nix::sys::signalfd::{SfdFlags, SignalFd};
use vmm_sys_util::epoll::EventSet;

use util::loop_context::{
    EventLoopManager, EventNotifier, EventNotifierHelper, NotifierCallback, NotifierOperation,
};

/// Shared flag asking the event loop to stop.
#[derive(Clone, Debug, Default)]
pub struct ShutdownToken {
    exit: Arc<AtomicBool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.exit.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.exit.load(Ordering::Acquire)
    }
}

impl EventLoopManager for ShutdownToken {
    fn loop_should_exit(&self) -> bool {
        self.is_cancelled()
    }

    fn loop_cleanup(&self) -> Result<()> {
        info!("Event loop stopped");
        Ok(())
    }
}

/// SIGINT/SIGTERM read through a signalfd watched by the event loop.
pub struct SignalHandler {
    fd: SignalFd,
    token: ShutdownToken,
}

impl SignalHandler {
    /// Block the termination signals on the calling thread and open the signalfd.
    /// Must run before any other thread is spawned so they inherit the mask.
    pub fn new(token: ShutdownToken) -> Result<Self> {
        let mut mask = SigSet::empty();
        mask.add(Signal::SIGINT);
        mask.add(Signal::SIGTERM);
        mask.thread_block()
            .with_context(|| "Failed to block termination signals")?;
        let fd = SignalFd::with_flags(&mask, SfdFlags::SFD_NONBLOCK | SfdFlags::SFD_CLOEXEC)
            .with_context(|| "Failed to create signalfd")?;
        Ok(SignalHandler { fd, token })
    }

    fn handle_signal(&mut self) {
        loop {
            match self.fd.read_signal() {
                Ok(Some(siginfo)) => {
                    info!("Received signal {}, shutting down", siginfo.ssi_signo);
                    self.token.cancel();
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read signalfd: {:?}", e);
                    break;
                }
            }
        }
    }
}

impl EventNotifierHelper for SignalHandler {
    fn internal_notifiers(signal_handler: Arc<Mutex<Self>>) -> Vec<EventNotifier> {
        let fd: RawFd = signal_handler.lock().unwrap().fd.as_raw_fd();
        let handler: Rc<NotifierCallback> = Rc::new(move |_, _| {
            signal_handler.lock().unwrap().handle_signal();
            None
        });
        vec![EventNotifier::new(
            NotifierOperation::AddExclusion,
            fd,
            EventSet::IN,
            vec![handler],
        )]
    }
}

#[cfg(test)]
mod tests {
    use nix::sys::signal::raise;

    use super::*;

    #[test]
    fn test_shutdown_token() {
        let token = ShutdownToken::new();
        let cloned = token.clone();
        assert!(!token.loop_should_exit());
        cloned.cancel();
        assert!(token.loop_should_exit());
        assert!(token.loop_cleanup().is_ok());
    }

    #[test]
    fn test_signal_cancels_token() {
        let token = ShutdownToken::new();
        let mut handler = SignalHandler::new(token.clone()).unwrap();
        handler.handle_signal();
        assert!(!token.is_cancelled());

        // The signal is blocked on this thread, so it stays pending for the signalfd.
        raise(Signal::SIGTERM).unwrap();
        handler.handle_signal();
        assert!(token.is_cancelled());
    }
}
