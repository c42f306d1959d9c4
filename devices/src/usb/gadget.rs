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
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, error, info, warn};
use vmm_sys_util::epoll::EventSet;

use super::config::USB_SETUP_PACKET_SIZE;
use super::uvc::{ControlResponse, UvcDevice, UvcEvent};
use super::UsbDeviceRequest;
use crate::stream::{PipelineSink, UvcStream};
use gadget_manager::config::UvcFunctionConfig;
use util::loop_context::{EventNotifier, EventNotifierHelper, NotifierCallback, NotifierOperation};
use util::g_uvc::{
    event_data, uvc_request_data, UVC_EVENT_CONNECT, UVC_EVENT_DATA, UVC_EVENT_DISCONNECT,
    UVC_EVENT_SETUP, UVC_EVENT_STREAMOFF, UVC_EVENT_STREAMON, UVC_MAX_REQUEST_SIZE,
};
use util::v4l2::V4l2Device;
use v4l2_sys_mit::{v4l2_event, V4L2_CAP_VIDEO_OUTPUT};

const UVC_EVENTS: [u32; 6] = [
    UVC_EVENT_CONNECT,
    UVC_EVENT_DISCONNECT,
    UVC_EVENT_SETUP,
    UVC_EVENT_DATA,
    UVC_EVENT_STREAMON,
    UVC_EVENT_STREAMOFF,
];

/// Decode the UVC payload of a V4L2 event. Returns None for other event types.
pub fn uvc_event_from_v4l2(event: &v4l2_event) -> Result<Option<UvcEvent>> {
    let data = event_data(event);
    let uvc_event = match event.type_ {
        UVC_EVENT_CONNECT => UvcEvent::Connect,
        UVC_EVENT_DISCONNECT => UvcEvent::Disconnect,
        UVC_EVENT_STREAMON => UvcEvent::StreamOn,
        UVC_EVENT_STREAMOFF => UvcEvent::StreamOff,
        UVC_EVENT_SETUP => {
            UvcEvent::Setup(UsbDeviceRequest::from_bytes(&data[..USB_SETUP_PACKET_SIZE])?)
        }
        UVC_EVENT_DATA => {
            let length = LittleEndian::read_i32(&data[..4]);
            let len = (length.max(0) as usize).min(UVC_MAX_REQUEST_SIZE);
            UvcEvent::Data(data[4..4 + len].to_vec())
        }
        _ => return Ok(None),
    };
    Ok(Some(uvc_event))
}

/// Build the `UVCIOC_SEND_RESPONSE` argument. A negative length stalls ep0.
pub fn response_to_request_data(resp: &ControlResponse) -> uvc_request_data {
    let mut req = uvc_request_data::default();
    match resp {
        ControlResponse::Data(data) => {
            let len = data.len().min(UVC_MAX_REQUEST_SIZE);
            req.data[..len].copy_from_slice(&data[..len]);
            req.length = len as i32;
        }
        ControlResponse::Stall => req.length = -libc::EL2HLT,
    }
    req
}

/// The gadget video node and the negotiation state behind it.
pub struct UvcGadget {
    video: Arc<V4l2Device>,
    device: UvcDevice,
    stream: Arc<Mutex<UvcStream>>,
}

impl UvcGadget {
    pub fn new(
        config: Arc<UvcFunctionConfig>,
        video: Arc<V4l2Device>,
        stream: Arc<Mutex<UvcStream>>,
    ) -> Result<Self> {
        video.check_cap(V4L2_CAP_VIDEO_OUTPUT, "video output")?;
        let sink: Arc<Mutex<dyn PipelineSink>> = stream.clone();
        let device = UvcDevice::new(config, sink)?;
        for event in UVC_EVENTS {
            video
                .subscribe_event(event)
                .with_context(|| format!("Failed to subscribe event {:#x}", event))?;
        }
        info!("UVC gadget {} ready", video.path());
        Ok(UvcGadget {
            video,
            device,
            stream,
        })
    }

    fn handle_events(&mut self) -> Option<Vec<EventNotifier>> {
        loop {
            let event = match self.video.dequeue_event() {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to dequeue event, {:?}", e);
                    break;
                }
            };
            let uvc_event = match uvc_event_from_v4l2(&event) {
                Ok(Some(uvc_event)) => uvc_event,
                Ok(None) => {
                    debug!("Ignore event type {:#x}", event.type_);
                    continue;
                }
                Err(e) => {
                    warn!("Drop malformed event {:#x}, {:?}", event.type_, e);
                    continue;
                }
            };
            if let Some(resp) = self.device.process_event(uvc_event) {
                let req = response_to_request_data(&resp);
                if let Err(e) = self.video.send_response(&req) {
                    error!("Failed to send response, {:?}", e);
                }
            }
        }
        UvcStream::sync_notifiers(&self.stream)
    }
}

/// UVC events are signalled as exceptional conditions on the video node.
fn event_notifier(fd: RawFd, handler: Rc<NotifierCallback>) -> EventNotifier {
    EventNotifier::new(
        NotifierOperation::AddExclusion,
        fd,
        EventSet::PRIORITY,
        vec![handler],
    )
}

impl EventNotifierHelper for UvcGadget {
    fn internal_notifiers(gadget: Arc<Mutex<Self>>) -> Vec<EventNotifier> {
        let fd: RawFd = gadget.lock().unwrap().video.as_raw_fd();
        let handler: Rc<NotifierCallback> =
            Rc::new(move |_, _| gadget.lock().unwrap().handle_events());
        vec![event_notifier(fd, handler)]
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::usb::config::{UVC_GET_CUR, UVC_VS_PROBE_CONTROL};
    use crate::usb::streaming_control::test::test_streaming_config;
    use crate::video_source::test_source::TestSource;
    use gadget_manager::config::UvcControlConfig;
    use util::g_uvc::UVC_EVENT_LAST;
    use util::loop_context::EventLoopContext;
    use util::v4l2::new_init;
    use vmm_sys_util::eventfd::EventFd;

    fn event(type_: u32, payload: &[u8]) -> v4l2_event {
        let mut event = new_init::<v4l2_event>();
        event.type_ = type_;
        // SAFETY: data covers the whole union storage.
        unsafe { event.u.data[..payload.len()].copy_from_slice(payload) };
        event
    }

    #[test]
    fn test_event_notifier_watches_priority() {
        let handler: Rc<NotifierCallback> = Rc::new(|_, _| None);
        let efd = EventFd::new(libc::EFD_NONBLOCK).unwrap();
        let notifier = event_notifier(efd.as_raw_fd(), handler);
        let desc = format!("{:?}", notifier);
        assert!(desc.contains("AddExclusion"));
        assert!(desc.contains("PRIORITY"));
        assert!(!desc.contains("OUT"));

        let mut main_loop = EventLoopContext::new().unwrap();
        main_loop.update_events(vec![notifier]).unwrap();
    }

    #[test]
    fn test_setup_event() {
        let packet = [0xa1, UVC_GET_CUR, 0x00, UVC_VS_PROBE_CONTROL, 0x01, 0x00, 0x22, 0x00];
        let decoded = uvc_event_from_v4l2(&event(UVC_EVENT_SETUP, &packet)).unwrap();
        assert_eq!(
            decoded,
            Some(UvcEvent::Setup(UsbDeviceRequest {
                request_type: 0xa1,
                request: UVC_GET_CUR,
                value: 0x0100,
                index: 1,
                length: 34,
            }))
        );
    }

    #[test]
    fn test_data_event() {
        let mut payload = vec![26, 0, 0, 0];
        payload.extend((0..26).map(|i| i as u8));
        let decoded = uvc_event_from_v4l2(&event(UVC_EVENT_DATA, &payload)).unwrap();
        assert_eq!(decoded, Some(UvcEvent::Data(payload[4..].to_vec())));

        // Lengths are clamped to the request buffer.
        let decoded = uvc_event_from_v4l2(&event(UVC_EVENT_DATA, &[0xff, 0, 0, 0])).unwrap();
        assert_eq!(decoded, Some(UvcEvent::Data(vec![0; UVC_MAX_REQUEST_SIZE])));
        let decoded =
            uvc_event_from_v4l2(&event(UVC_EVENT_DATA, &(-1i32).to_le_bytes())).unwrap();
        assert_eq!(decoded, Some(UvcEvent::Data(Vec::new())));
    }

    #[test]
    fn test_other_events() {
        let decoded = uvc_event_from_v4l2(&event(UVC_EVENT_STREAMON, &[])).unwrap();
        assert_eq!(decoded, Some(UvcEvent::StreamOn));
        let decoded = uvc_event_from_v4l2(&event(UVC_EVENT_DISCONNECT, &[])).unwrap();
        assert_eq!(decoded, Some(UvcEvent::Disconnect));
        // V4L2_EVENT_CTRL
        assert_eq!(uvc_event_from_v4l2(&event(3, &[])).unwrap(), None);
        assert_eq!(
            uvc_event_from_v4l2(&event(UVC_EVENT_LAST + 1, &[])).unwrap(),
            None
        );
    }

    #[test]
    fn test_response_to_request_data() {
        let req = response_to_request_data(&ControlResponse::Data(vec![0x22, 0x00]));
        assert_eq!(req.length, 2);
        assert_eq!(&req.data[..3], &[0x22, 0x00, 0x00]);

        let req = response_to_request_data(&ControlResponse::Data(vec![1; 100]));
        assert_eq!(req.length, UVC_MAX_REQUEST_SIZE as i32);

        let req = response_to_request_data(&ControlResponse::Stall);
        assert_eq!(req.length, -libc::EL2HLT);
        assert!(req.data.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_gadget_requires_output_node() {
        let config = UvcFunctionConfig {
            video: "/dev/null".to_string(),
            udc: "fe980000.usb".to_string(),
            function: "uvc.0".to_string(),
            control: UvcControlConfig { intf: 0 },
            streaming: test_streaming_config(),
        };
        let video = Arc::new(V4l2Device::open(&config.video).unwrap());
        let stream = UvcStream::new(video.clone(), Box::new(TestSource::new())).unwrap();
        let gadget = UvcGadget::new(Arc::new(config), video, Arc::new(Mutex::new(stream)));
        assert!(gadget.is_err());
    }
}
