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

use std::collections::BTreeMap;
use std::fmt;
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use log::{error, warn};
use vmm_sys_util::epoll::{ControlOperation, Epoll, EpollEvent, EventSet};

use crate::UtilError;

const READY_EVENT_MAX: usize = 256;

#[derive(Debug)]
pub enum NotifierOperation {
    /// Watch a file descriptor that is not registered yet.
    AddExclusion,
    /// Stop watching a file descriptor.
    Delete,
}

#[derive(Debug, PartialEq)]
enum EventStatus {
    /// Event is currently monitored in epoll.
    Alive,
    /// Event is removed, thus not monitored.
    Removed,
}

// The NotifierCallback must NOT update notifier status of itself, otherwise causes
// deadlock. Instead it should return notifiers and let caller to do so.
pub type NotifierCallback = dyn Fn(EventSet, RawFd) -> Option<Vec<EventNotifier>>;

/// Epoll Event Notifier Entry.
pub struct EventNotifier {
    /// Raw file descriptor
    raw_fd: RawFd,
    /// Notifier operation
    op: NotifierOperation,
    /// The types of events for which we use this fd
    event: EventSet,
    /// Handlers run in order when the fd becomes ready
    handlers: Vec<Rc<NotifierCallback>>,
    /// Event status
    status: Mutex<EventStatus>,
}

impl fmt::Debug for EventNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventNotifier")
            .field("raw_fd", &self.raw_fd)
            .field("op", &self.op)
            .field("event", &self.event)
            .field("status", &self.status)
            .finish()
    }
}

impl EventNotifier {
    pub fn new(
        op: NotifierOperation,
        raw_fd: RawFd,
        event: EventSet,
        handlers: Vec<Rc<NotifierCallback>>,
    ) -> Self {
        EventNotifier {
            raw_fd,
            op,
            event,
            handlers,
            status: Mutex::new(EventStatus::Alive),
        }
    }
}

/// `EventNotifier` Factory
///
/// An object owning file descriptors that the event loop should watch
/// implements this trait to hand its notifiers over to `EventLoopContext`.
pub trait EventNotifierHelper {
    fn internal_notifiers(_: Arc<Mutex<Self>>) -> Vec<EventNotifier>;
}

pub fn gen_delete_notifiers(fds: &[RawFd]) -> Vec<EventNotifier> {
    fds.iter()
        .map(|fd| EventNotifier::new(NotifierOperation::Delete, *fd, EventSet::IN, Vec::new()))
        .collect()
}

/// Decides when the event loop stops.
pub trait EventLoopManager: Send + Sync {
    fn loop_should_exit(&self) -> bool;
    fn loop_cleanup(&self) -> Result<()>;
}

/// Epoll Loop Context
#[allow(clippy::vec_box)]
pub struct EventLoopContext {
    /// Epoll file descriptor.
    epoll: Epoll,
    /// Control epoll loop running.
    manager: Option<Arc<Mutex<dyn EventLoopManager>>>,
    /// Fds registered to the `EventLoop`.
    events: BTreeMap<RawFd, Box<EventNotifier>>,
    /// Notifiers removed while their events may still be pending in this round.
    gc: Vec<Box<EventNotifier>>,
    /// Temp events vector, store wait returned events.
    ready_events: Vec<EpollEvent>,
}

impl EventLoopContext {
    pub fn new() -> Result<Self> {
        Ok(EventLoopContext {
            epoll: Epoll::new().map_err(UtilError::BadSyscall)?,
            manager: None,
            events: BTreeMap::new(),
            gc: Vec::new(),
            ready_events: vec![EpollEvent::default(); READY_EVENT_MAX],
        })
    }

    pub fn set_manager(&mut self, manager: Arc<Mutex<dyn EventLoopManager>>) {
        self.manager = Some(manager);
    }

    fn add_event(&mut self, event: EventNotifier) -> Result<()> {
        if self.events.contains_key(&event.raw_fd) {
            return Err(anyhow!(UtilError::BadNotifierOperation));
        }

        let event = Box::new(event);
        self.epoll.ctl(
            ControlOperation::Add,
            event.raw_fd,
            EpollEvent::new(event.event, &*event as *const _ as u64),
        )?;
        self.events.insert(event.raw_fd, event);
        Ok(())
    }

    fn rm_event(&mut self, event: &EventNotifier) -> Result<()> {
        let notifier = self
            .events
            .remove(&event.raw_fd)
            .ok_or_else(|| anyhow!(UtilError::NoRegisterFd(event.raw_fd)))?;
        if let Err(error) =
            self.epoll
                .ctl(ControlOperation::Delete, notifier.raw_fd, EpollEvent::default())
        {
            match error.raw_os_error() {
                // The fd was closed before its notifier was deleted.
                Some(libc::EBADF) | Some(libc::ENOENT) | Some(libc::EPERM) => {
                    warn!("epoll ctl failed: {}", error);
                }
                _ => {
                    self.events.insert(notifier.raw_fd, notifier);
                    return Err(anyhow!(UtilError::BadSyscall(error)));
                }
            }
        }
        *notifier.status.lock().unwrap() = EventStatus::Removed;
        self.gc.push(notifier);
        Ok(())
    }

    /// Apply notifiers to the set of watched fds.
    pub fn update_events(&mut self, notifiers: Vec<EventNotifier>) -> Result<()> {
        for en in notifiers {
            match en.op {
                NotifierOperation::AddExclusion => self.add_event(en)?,
                NotifierOperation::Delete => self.rm_event(&en)?,
            }
        }
        Ok(())
    }

    /// Wait for events and run their handlers.
    /// Returns `Ok(false)` once the manager asks the loop to exit.
    pub fn run(&mut self) -> Result<bool> {
        if let Some(manager) = &self.manager {
            let locked_manager = manager.lock().unwrap();
            if locked_manager.loop_should_exit() {
                locked_manager.loop_cleanup()?;
                return Ok(false);
            }
        }

        self.epoll_wait_manager(-1)
    }

    fn epoll_wait_manager(&mut self, time_out_ms: i32) -> Result<bool> {
        let ev_count = match self.epoll.wait(time_out_ms, &mut self.ready_events[..]) {
            Ok(ev_count) => ev_count,
            Err(e) if e.raw_os_error() == Some(libc::EINTR) => 0,
            Err(e) => return Err(anyhow!(UtilError::EpollWait(e))),
        };

        for i in 0..ev_count {
            // SAFETY: notifiers are boxed and only released in clear of gc below,
            // after all ready events have been handled.
            let event = unsafe {
                let event_ptr = self.ready_events[i].data() as *const EventNotifier;
                &*event_ptr as &EventNotifier
            };
            let event_set = self.ready_events[i].event_set();
            let mut notifiers = Vec::new();
            if *event.status.lock().unwrap() == EventStatus::Alive {
                for handler in event.handlers.iter() {
                    if let Some(mut notifier) = handler(event_set, event.raw_fd) {
                        notifiers.append(&mut notifier);
                    }
                }
            }
            if let Err(e) = self.update_events(notifiers) {
                error!("update event failed: {:?}", e);
            }
        }

        self.gc.clear();
        Ok(true)
    }
}
