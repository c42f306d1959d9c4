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

//! UVC control request handling: probe and commit negotiation on the
//! streaming interface, stubs for everything else.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, error, info, warn};
use strum_macros::Display;

use super::config::*;
use super::streaming_control::{StreamingControl, UVC_STREAMING_CONTROL_SIZE};
use super::{Recipient, RequestKind, UsbDeviceRequest};
use crate::stream::PipelineSink;
use crate::video_source::{FieldOrder, PixelFormat};
use gadget_manager::config::{UvcFormatConfig, UvcFrameConfig, UvcFunctionConfig};
use util::g_uvc::UVC_MAX_REQUEST_SIZE;
use util::{fourcc_to_string, PIXFMT_MJPG};

/// Notification delivered by the gadget driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UvcEvent {
    Connect,
    Disconnect,
    StreamOn,
    StreamOff,
    Setup(UsbDeviceRequest),
    /// Data phase payload of the last OUT request.
    Data(Vec<u8>),
}

/// Reply to a setup event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlResponse {
    Data(Vec<u8>),
    Stall,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Display)]
pub enum UvcRequest {
    #[strum(serialize = "SET_CUR")]
    SetCur,
    #[strum(serialize = "GET_CUR")]
    GetCur,
    #[strum(serialize = "GET_MIN")]
    GetMin,
    #[strum(serialize = "GET_MAX")]
    GetMax,
    #[strum(serialize = "GET_RES")]
    GetRes,
    #[strum(serialize = "GET_LEN")]
    GetLen,
    #[strum(serialize = "GET_INFO")]
    GetInfo,
    #[strum(serialize = "GET_DEF")]
    GetDef,
    #[strum(serialize = "UNKNOWN")]
    Unknown(u8),
}

impl From<u8> for UvcRequest {
    fn from(code: u8) -> Self {
        match code {
            UVC_SET_CUR => UvcRequest::SetCur,
            UVC_GET_CUR => UvcRequest::GetCur,
            UVC_GET_MIN => UvcRequest::GetMin,
            UVC_GET_MAX => UvcRequest::GetMax,
            UVC_GET_RES => UvcRequest::GetRes,
            UVC_GET_LEN => UvcRequest::GetLen,
            UVC_GET_INFO => UvcRequest::GetInfo,
            UVC_GET_DEF => UvcRequest::GetDef,
            code => UvcRequest::Unknown(code),
        }
    }
}

/// Control selector of the streaming interface.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Display)]
pub enum VsControl {
    #[strum(serialize = "PROBE")]
    Probe,
    #[strum(serialize = "COMMIT")]
    Commit,
    #[strum(serialize = "UNKNOWN")]
    Other(u8),
}

impl From<u8> for VsControl {
    fn from(cs: u8) -> Self {
        match cs {
            UVC_VS_PROBE_CONTROL => VsControl::Probe,
            UVC_VS_COMMIT_CONTROL => VsControl::Commit,
            cs => VsControl::Other(cs),
        }
    }
}

/// Negotiated control a SET_CUR targets.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Display)]
pub enum StreamingSelector {
    #[strum(serialize = "PROBE")]
    Probe,
    #[strum(serialize = "COMMIT")]
    Commit,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ControlState {
    Idle,
    AwaitingData(StreamingSelector),
}

/// Fields of one control transaction.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct UvcRequestContext {
    pub kind: RequestKind,
    pub recipient: Recipient,
    pub request: UvcRequest,
    pub selector: u8,
    pub interface: u8,
    pub length: u16,
}

impl From<&UsbDeviceRequest> for UvcRequestContext {
    fn from(req: &UsbDeviceRequest) -> Self {
        UvcRequestContext {
            kind: req.kind(),
            recipient: req.recipient(),
            request: UvcRequest::from(req.request),
            selector: req.control_selector(),
            interface: req.interface(),
            length: req.length,
        }
    }
}

pub fn pu_control_name(cs: u8) -> &'static str {
    match cs {
        UVC_PU_CONTROL_UNDEFINED => "UNDEFINED",
        UVC_PU_BACKLIGHT_COMPENSATION_CONTROL => "BACKLIGHT_COMPENSATION",
        UVC_PU_BRIGHTNESS_CONTROL => "BRIGHTNESS",
        UVC_PU_CONTRAST_CONTROL => "CONTRAST",
        UVC_PU_GAIN_CONTROL => "GAIN",
        UVC_PU_POWER_LINE_FREQUENCY_CONTROL => "POWER_LINE_FREQUENCY",
        UVC_PU_HUE_CONTROL => "HUE",
        UVC_PU_SATURATION_CONTROL => "SATURATION",
        UVC_PU_SHARPNESS_CONTROL => "SHARPNESS",
        UVC_PU_GAMMA_CONTROL => "GAMMA",
        UVC_PU_WHITE_BALANCE_TEMPERATURE_CONTROL => "WHITE_BALANCE_TEMPERATURE",
        UVC_PU_WHITE_BALANCE_TEMPERATURE_AUTO_CONTROL => "WHITE_BALANCE_TEMPERATURE_AUTO",
        UVC_PU_WHITE_BALANCE_COMPONENT_CONTROL => "WHITE_BALANCE_COMPONENT",
        UVC_PU_WHITE_BALANCE_COMPONENT_AUTO_CONTROL => "WHITE_BALANCE_COMPONENT_AUTO",
        UVC_PU_DIGITAL_MULTIPLIER_CONTROL => "DIGITAL_MULTIPLIER",
        UVC_PU_DIGITAL_MULTIPLIER_LIMIT_CONTROL => "DIGITAL_MULTIPLIER_LIMIT",
        UVC_PU_HUE_AUTO_CONTROL => "HUE_AUTO",
        UVC_PU_ANALOG_VIDEO_STANDARD_CONTROL => "ANALOG_VIDEO_STANDARD",
        UVC_PU_ANALOG_LOCK_STATUS_CONTROL => "ANALOG_LOCK_STATUS",
        _ => "UNKNOWN",
    }
}

fn response_len(length: u16) -> usize {
    (length as usize).min(UVC_MAX_REQUEST_SIZE)
}

fn data_response(mut data: Vec<u8>, length: u16) -> ControlResponse {
    data.truncate(response_len(length));
    ControlResponse::Data(data)
}

/// Acknowledge a control nobody implements: both GET and SET supported.
fn stub_response(length: u16) -> ControlResponse {
    let mut data = vec![0; response_len(length)];
    if let Some(info) = data.first_mut() {
        *info = UVC_CONTROL_CAP_GET | UVC_CONTROL_CAP_SET;
    }
    ControlResponse::Data(data)
}

/// Negotiation state of one UVC function.
pub struct UvcDevice {
    config: Arc<UvcFunctionConfig>,
    probe: StreamingControl,
    commit: StreamingControl,
    state: ControlState,
    /// Fourcc, width and height of the last commit.
    committed_format: Option<(u32, u32, u32)>,
    sink: Arc<Mutex<dyn PipelineSink>>,
}

impl UvcDevice {
    pub fn new(config: Arc<UvcFunctionConfig>, sink: Arc<Mutex<dyn PipelineSink>>) -> Result<Self> {
        let probe = StreamingControl::resolve(&config.streaming, 1, 1, 0)?;
        Ok(UvcDevice {
            config,
            probe,
            commit: probe,
            state: ControlState::Idle,
            committed_format: None,
            sink,
        })
    }

    pub fn probe(&self) -> &StreamingControl {
        &self.probe
    }

    pub fn commit(&self) -> &StreamingControl {
        &self.commit
    }

    pub fn committed_format(&self) -> Option<(u32, u32, u32)> {
        self.committed_format
    }

    /// Selector whose data phase is expected next.
    pub fn pending_selector(&self) -> Option<StreamingSelector> {
        match self.state {
            ControlState::Idle => None,
            ControlState::AwaitingData(selector) => Some(selector),
        }
    }

    /// Handle one event. Setup events always produce a response.
    pub fn process_event(&mut self, event: UvcEvent) -> Option<ControlResponse> {
        match event {
            UvcEvent::Connect => {
                info!("UVC host connected");
                None
            }
            UvcEvent::Disconnect => {
                info!("UVC host disconnected");
                None
            }
            UvcEvent::StreamOn => {
                self.enable_stream(true);
                None
            }
            UvcEvent::StreamOff => {
                self.enable_stream(false);
                None
            }
            UvcEvent::Setup(req) => Some(self.handle_setup(&req)),
            UvcEvent::Data(payload) => {
                self.handle_data(&payload);
                None
            }
        }
    }

    fn enable_stream(&mut self, enable: bool) {
        info!("UVC stream {}", if enable { "on" } else { "off" });
        if let Err(e) = self.sink.lock().unwrap().enable(enable) {
            error!("Failed to switch stream {}, {:?}", enable, e);
        }
    }

    fn handle_setup(&mut self, req: &UsbDeviceRequest) -> ControlResponse {
        self.state = ControlState::Idle;
        let ctx = UvcRequestContext::from(req);
        debug!(
            "Setup request type {:#04x} request {:#04x} value {:#06x} index {:#06x} length {}",
            req.request_type, req.request, req.value, req.index, req.length
        );
        match ctx.kind {
            RequestKind::Class => self.handle_class_request(&ctx),
            kind => {
                debug!("Ignore {} request {:#04x}", kind, req.request);
                ControlResponse::Stall
            }
        }
    }

    fn handle_class_request(&mut self, ctx: &UvcRequestContext) -> ControlResponse {
        if ctx.recipient != Recipient::Interface {
            warn!("Class request {} to {} is not supported", ctx.request, ctx.recipient);
            return ControlResponse::Stall;
        }
        if ctx.interface == self.config.control.intf {
            debug!(
                "{} {} on the control interface",
                ctx.request,
                pu_control_name(ctx.selector)
            );
            stub_response(ctx.length)
        } else if ctx.interface == self.config.streaming.intf {
            self.handle_streaming_request(ctx)
        } else {
            warn!("Class request {} to unknown interface {}", ctx.request, ctx.interface);
            ControlResponse::Stall
        }
    }

    fn handle_streaming_request(&mut self, ctx: &UvcRequestContext) -> ControlResponse {
        let selector = match VsControl::from(ctx.selector) {
            VsControl::Probe => StreamingSelector::Probe,
            VsControl::Commit => StreamingSelector::Commit,
            VsControl::Other(cs) => {
                debug!("{} on unsupported streaming control {:#04x}", ctx.request, cs);
                return stub_response(ctx.length);
            }
        };
        debug!("{} {}", ctx.request, selector);
        self.streaming_selector_request(ctx, selector)
    }

    fn streaming_selector_request(
        &mut self,
        ctx: &UvcRequestContext,
        selector: StreamingSelector,
    ) -> ControlResponse {
        let data = match ctx.request {
            UvcRequest::SetCur => {
                self.state = ControlState::AwaitingData(selector);
                return ControlResponse::Data(vec![0; response_len(ctx.length)]);
            }
            UvcRequest::GetCur => match selector {
                StreamingSelector::Probe => self.probe.encode().to_vec(),
                StreamingSelector::Commit => self.commit.encode().to_vec(),
            },
            UvcRequest::GetMin | UvcRequest::GetDef => match self.resolve(1, 1, 0) {
                Some(ctrl) => ctrl.encode().to_vec(),
                None => return ControlResponse::Stall,
            },
            UvcRequest::GetMax => match self.resolve(-1, -1, u32::MAX) {
                Some(ctrl) => ctrl.encode().to_vec(),
                None => return ControlResponse::Stall,
            },
            UvcRequest::GetRes => vec![0; UVC_STREAMING_CONTROL_SIZE],
            UvcRequest::GetLen => {
                let mut len = vec![0; 2];
                LittleEndian::write_u16(&mut len, UVC_STREAMING_CONTROL_SIZE as u16);
                len
            }
            UvcRequest::GetInfo => vec![UVC_CONTROL_CAP_GET | UVC_CONTROL_CAP_SET],
            UvcRequest::Unknown(code) => {
                warn!("Unknown request {:#04x} on {}", code, selector);
                return ControlResponse::Stall;
            }
        };
        data_response(data, ctx.length)
    }

    fn resolve(
        &self,
        format_index: i32,
        frame_index: i32,
        interval: u32,
    ) -> Option<StreamingControl> {
        let streaming = &self.config.streaming;
        match StreamingControl::resolve(streaming, format_index, frame_index, interval) {
            Ok(ctrl) => Some(ctrl),
            Err(e) => {
                error!("Failed to resolve streaming control, {:?}", e);
                None
            }
        }
    }

    fn handle_data(&mut self, payload: &[u8]) {
        let selector = match std::mem::replace(&mut self.state, ControlState::Idle) {
            ControlState::AwaitingData(selector) => selector,
            ControlState::Idle => {
                warn!("Unexpected data phase of {} bytes", payload.len());
                return;
            }
        };
        let request = match StreamingControl::decode(payload) {
            Ok(ctrl) => ctrl,
            Err(e) => {
                warn!("Drop {} data, {:?}", selector, e);
                return;
            }
        };
        let resolved = match self.resolve(
            request.format_index as i32,
            request.frame_index as i32,
            request.frame_interval,
        ) {
            Some(ctrl) => ctrl,
            None => return,
        };
        debug!(
            "{} format {} frame {} interval {}",
            selector, resolved.format_index, resolved.frame_index, resolved.frame_interval
        );
        match selector {
            StreamingSelector::Probe => self.probe = resolved,
            StreamingSelector::Commit => {
                self.commit = resolved;
                self.apply_commit();
            }
        }
    }

    fn committed_descriptors<'a>(
        config: &'a UvcFunctionConfig,
        commit: &StreamingControl,
    ) -> Option<(&'a UvcFormatConfig, &'a UvcFrameConfig)> {
        let format = config
            .streaming
            .formats
            .get((commit.format_index as usize).checked_sub(1)?)?;
        let frame = format
            .frames
            .get((commit.frame_index as usize).checked_sub(1)?)?;
        Some((format, frame))
    }

    /// Push the committed format and frame rate to the sink.
    fn apply_commit(&mut self) {
        let config = self.config.clone();
        let (format, frame) = match Self::committed_descriptors(&config, &self.commit) {
            Some(descriptors) => descriptors,
            None => {
                error!(
                    "Commit format {} frame {} out of table",
                    self.commit.format_index, self.commit.frame_index
                );
                return;
            }
        };
        let pixfmt = PixelFormat {
            fourcc: format.fcc,
            width: frame.width,
            height: frame.height,
            field: FieldOrder::Progressive,
            size_image: (format.fcc == PIXFMT_MJPG).then_some(self.commit.max_video_frame_size),
        };
        self.committed_format = Some((format.fcc, frame.width, frame.height));
        info!(
            "Committed {} {}x{} interval {}",
            fourcc_to_string(format.fcc),
            frame.width,
            frame.height,
            self.commit.frame_interval
        );

        let mut locked_sink = self.sink.lock().unwrap();
        if let Err(e) = locked_sink.set_format(&pixfmt) {
            error!("Failed to set format {}, {:?}", pixfmt, e);
        }
        match INTERVALS_PER_SEC.checked_div(self.commit.frame_interval) {
            Some(fps) => {
                if let Err(e) = locked_sink.set_frame_rate(fps) {
                    error!("Failed to set frame rate {}, {:?}", fps, e);
                }
            }
            None => error!("Committed frame interval is zero"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::usb::streaming_control::test::test_streaming_config;
    use crate::usb::UsbError;
    use anyhow::bail;
    use gadget_manager::config::UvcControlConfig;
    use util::PIXFMT_YUYV;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum SinkCall {
        SetFormat(PixelFormat),
        SetFrameRate(u32),
        Enable(bool),
    }

    #[derive(Default)]
    struct MockSink {
        calls: Vec<SinkCall>,
        fail: bool,
    }

    impl MockSink {
        fn record(&mut self, call: SinkCall) -> Result<()> {
            self.calls.push(call);
            if self.fail {
                bail!("mock sink failure");
            }
            Ok(())
        }
    }

    impl PipelineSink for MockSink {
        fn set_format(&mut self, fmt: &PixelFormat) -> Result<()> {
            self.record(SinkCall::SetFormat(*fmt))
        }

        fn set_frame_rate(&mut self, fps: u32) -> Result<()> {
            self.record(SinkCall::SetFrameRate(fps))
        }

        fn enable(&mut self, enable: bool) -> Result<()> {
            self.record(SinkCall::Enable(enable))
        }
    }

    const CONTROL_INTF: u8 = 0;
    const STREAMING_INTF: u8 = 1;

    fn test_config() -> UvcFunctionConfig {
        UvcFunctionConfig {
            video: "/dev/video0".to_string(),
            udc: "fe980000.usb".to_string(),
            function: "uvc.0".to_string(),
            control: UvcControlConfig { intf: CONTROL_INTF },
            streaming: test_streaming_config(),
        }
    }

    fn test_device() -> (UvcDevice, Arc<Mutex<MockSink>>) {
        let sink = Arc::new(Mutex::new(MockSink::default()));
        let device = UvcDevice::new(Arc::new(test_config()), sink.clone()).unwrap();
        (device, sink)
    }

    fn setup(request_type: u8, request: u8, selector: u8, interface: u8, length: u16) -> UvcEvent {
        UvcEvent::Setup(UsbDeviceRequest {
            request_type,
            request,
            value: (selector as u16) << 8,
            index: interface as u16,
            length,
        })
    }

    fn class_in(request: u8, selector: u8, interface: u8, length: u16) -> UvcEvent {
        setup(USB_INTERFACE_CLASS_IN_REQUEST, request, selector, interface, length)
    }

    fn class_out(request: u8, selector: u8, interface: u8, length: u16) -> UvcEvent {
        setup(USB_INTERFACE_CLASS_OUT_REQUEST, request, selector, interface, length)
    }

    fn data_of(resp: Option<ControlResponse>) -> Vec<u8> {
        match resp {
            Some(ControlResponse::Data(data)) => data,
            other => panic!("Unexpected response {:?}", other),
        }
    }

    fn request_payload(format_index: u8, frame_index: u8, interval: u32) -> Vec<u8> {
        let ctrl = StreamingControl {
            hint: 1,
            format_index,
            frame_index,
            frame_interval: interval,
            ..Default::default()
        };
        ctrl.encode()[..26].to_vec()
    }

    fn negotiate(device: &mut UvcDevice, selector: u8, payload: Vec<u8>) {
        let resp = device.process_event(class_out(UVC_SET_CUR, selector, STREAMING_INTF, 26));
        assert_eq!(data_of(resp), vec![0; 26]);
        assert!(device.process_event(UvcEvent::Data(payload)).is_none());
    }

    #[test]
    fn test_get_cur_idempotent() {
        let (mut device, sink) = test_device();
        for selector in [UVC_VS_PROBE_CONTROL, UVC_VS_COMMIT_CONTROL] {
            let first = data_of(device.process_event(class_in(UVC_GET_CUR, selector, 1, 34)));
            let second = data_of(device.process_event(class_in(UVC_GET_CUR, selector, 1, 34)));
            assert_eq!(first, second);
            assert_eq!(first.len(), 34);
        }
        let ctrl = device.probe();
        assert_eq!((ctrl.format_index, ctrl.frame_index), (1, 1));
        assert_eq!(ctrl.frame_interval, 333333);
        assert_eq!(device.commit(), device.probe());
        assert!(sink.lock().unwrap().calls.is_empty());
    }

    #[test]
    fn test_get_min_max_def() {
        let (mut device, _) = test_device();
        let streaming = test_streaming_config();
        let min = data_of(device.process_event(class_in(UVC_GET_MIN, 1, 1, 34)));
        let def = data_of(device.process_event(class_in(UVC_GET_DEF, 1, 1, 34)));
        let max = data_of(device.process_event(class_in(UVC_GET_MAX, 2, 1, 34)));
        let expected_min = StreamingControl::resolve(&streaming, 1, 1, 0).unwrap();
        assert_eq!(min, expected_min.encode().to_vec());
        assert_eq!(def, min);
        let max = StreamingControl::decode(&max).unwrap();
        assert_eq!((max.format_index, max.frame_index), (2, 1));
        assert_eq!(max.frame_interval, 1000000);
    }

    #[test]
    fn test_probe_negotiation() {
        let (mut device, sink) = test_device();
        let resp = device.process_event(class_out(UVC_SET_CUR, UVC_VS_PROBE_CONTROL, 1, 26));
        assert_eq!(data_of(resp), vec![0; 26]);
        assert_eq!(device.pending_selector(), Some(StreamingSelector::Probe));

        device.process_event(UvcEvent::Data(request_payload(1, 2, 400000)));
        assert_eq!(device.pending_selector(), None);
        let probe = *device.probe();
        assert_eq!((probe.format_index, probe.frame_index), (1, 2));
        assert_eq!(probe.frame_interval, 500000);
        assert_eq!(probe.max_video_frame_size, 1280 * 720 * 2);

        let cur = data_of(device.process_event(class_in(UVC_GET_CUR, 1, 1, 34)));
        assert_eq!(cur, probe.encode().to_vec());
        // Probing alone never reaches the sink.
        assert!(sink.lock().unwrap().calls.is_empty());
        assert_eq!(device.committed_format(), None);
    }

    #[test]
    fn test_commit_propagation() {
        let (mut device, sink) = test_device();
        negotiate(&mut device, UVC_VS_COMMIT_CONTROL, request_payload(1, 1, 666666));
        assert_eq!(
            sink.lock().unwrap().calls,
            vec![
                SinkCall::SetFormat(PixelFormat {
                    fourcc: PIXFMT_YUYV,
                    width: 640,
                    height: 480,
                    field: FieldOrder::Progressive,
                    size_image: None,
                }),
                SinkCall::SetFrameRate(15),
            ]
        );
        assert_eq!(device.committed_format(), Some((PIXFMT_YUYV, 640, 480)));
        assert_eq!(device.commit().frame_interval, 666666);
    }

    #[test]
    fn test_commit_mjpeg() {
        let (mut device, sink) = test_device();
        negotiate(&mut device, UVC_VS_COMMIT_CONTROL, request_payload(2, 1, 0));
        assert_eq!(
            sink.lock().unwrap().calls,
            vec![
                SinkCall::SetFormat(PixelFormat {
                    fourcc: PIXFMT_MJPG,
                    width: 1920,
                    height: 1080,
                    field: FieldOrder::Progressive,
                    size_image: Some(1920 * 1080 * 2),
                }),
                SinkCall::SetFrameRate(30),
            ]
        );
    }

    #[test]
    fn test_data_without_setup_ignored() {
        let (mut device, sink) = test_device();
        let probe = *device.probe();
        assert!(device
            .process_event(UvcEvent::Data(request_payload(2, 1, 0)))
            .is_none());
        assert_eq!(*device.probe(), probe);

        // A new setup drops the pending selector.
        device.process_event(class_out(UVC_SET_CUR, UVC_VS_PROBE_CONTROL, 1, 26));
        device.process_event(class_in(UVC_GET_CUR, UVC_VS_PROBE_CONTROL, 1, 34));
        assert_eq!(device.pending_selector(), None);
        device.process_event(UvcEvent::Data(request_payload(2, 1, 0)));
        assert_eq!(*device.probe(), probe);
        assert!(sink.lock().unwrap().calls.is_empty());
    }

    #[test]
    fn test_short_payload_ignored() {
        let (mut device, sink) = test_device();
        let commit = *device.commit();
        negotiate(&mut device, UVC_VS_COMMIT_CONTROL, vec![0; 10]);
        assert_eq!(device.pending_selector(), None);
        assert_eq!(*device.commit(), commit);
        assert!(sink.lock().unwrap().calls.is_empty());
    }

    #[test]
    fn test_unknown_streaming_selector() {
        let (mut device, sink) = test_device();
        let probe = *device.probe();
        let commit = *device.commit();
        let info = data_of(device.process_event(class_in(UVC_GET_INFO, 0x05, 1, 1)));
        assert_eq!(info, vec![0x03]);
        let cur = data_of(device.process_event(class_out(
            UVC_SET_CUR,
            UVC_VS_CONTROL_UNDEFINED,
            1,
            4,
        )));
        assert_eq!(cur, vec![0x03, 0, 0, 0]);
        assert_eq!(device.pending_selector(), None);

        // The data phase that follows has no selector to land on.
        assert!(device
            .process_event(UvcEvent::Data(request_payload(1, 2, 400000)))
            .is_none());
        assert_eq!(*device.probe(), probe);
        assert_eq!(*device.commit(), commit);
        assert_eq!(device.committed_format(), None);
        assert!(sink.lock().unwrap().calls.is_empty());
    }

    #[test]
    fn test_control_interface_stub() {
        let (mut device, _) = test_device();
        let resp = device.process_event(class_in(
            UVC_GET_CUR,
            UVC_PU_BRIGHTNESS_CONTROL,
            CONTROL_INTF,
            2,
        ));
        assert_eq!(data_of(resp), vec![0x03, 0]);
        let resp = device.process_event(class_out(UVC_SET_CUR, UVC_PU_GAIN_CONTROL, 0, 0));
        assert_eq!(data_of(resp), Vec::<u8>::new());
        let resp = device.process_event(class_in(UVC_GET_INFO, 0x01, 0, 200));
        assert_eq!(data_of(resp).len(), UVC_MAX_REQUEST_SIZE);
        assert_eq!(device.pending_selector(), None);
    }

    #[test]
    fn test_fixed_responses() {
        let (mut device, _) = test_device();
        let len = data_of(device.process_event(class_in(UVC_GET_LEN, 1, 1, 2)));
        assert_eq!(len, vec![0x22, 0x00]);
        let res = data_of(device.process_event(class_in(UVC_GET_RES, 1, 1, 34)));
        assert_eq!(res, vec![0; 34]);
        let info = data_of(device.process_event(class_in(UVC_GET_INFO, 2, 1, 1)));
        assert_eq!(info, vec![0x03]);
        // Truncated to wLength, never longer than the block.
        let cur = data_of(device.process_event(class_in(UVC_GET_CUR, 1, 1, 26)));
        assert_eq!(cur.len(), 26);
        let cur = data_of(device.process_event(class_in(UVC_GET_CUR, 1, 1, 48)));
        assert_eq!(cur.len(), 34);
    }

    #[test]
    fn test_stalled_requests() {
        let (mut device, _) = test_device();
        // GET_DESCRIPTOR
        let standard = setup(USB_DIRECTION_DEVICE_TO_HOST, 0x06, 0x01, 0, 18);
        let vendor = setup(USB_DIRECTION_DEVICE_TO_HOST | USB_TYPE_VENDOR, 0x01, 0, 0, 4);
        let reserved = setup(USB_TYPE_RESERVED | USB_RECIPIENT_INTERFACE, 0x01, 1, 1, 4);
        let endpoint = setup(
            USB_DIRECTION_DEVICE_TO_HOST | USB_TYPE_CLASS | USB_RECIPIENT_ENDPOINT,
            UVC_GET_CUR,
            1,
            1,
            34,
        );
        let unknown_intf = class_in(UVC_GET_CUR, 1, 7, 34);
        let unknown_request = class_in(0x90, UVC_VS_PROBE_CONTROL, 1, 34);
        let undefined_request = class_in(UVC_RC_UNDEFINED, UVC_VS_COMMIT_CONTROL, 1, 34);
        for event in [
            standard,
            vendor,
            reserved,
            endpoint,
            unknown_intf,
            unknown_request,
            undefined_request,
        ] {
            assert_eq!(device.process_event(event), Some(ControlResponse::Stall));
        }
    }

    #[test]
    fn test_stream_on_off() {
        let (mut device, sink) = test_device();
        assert!(device.process_event(UvcEvent::Connect).is_none());
        assert!(device.process_event(UvcEvent::StreamOn).is_none());
        assert!(device.process_event(UvcEvent::StreamOff).is_none());
        assert!(device.process_event(UvcEvent::Disconnect).is_none());
        assert_eq!(
            sink.lock().unwrap().calls,
            vec![SinkCall::Enable(true), SinkCall::Enable(false)]
        );
    }

    #[test]
    fn test_sink_errors_not_fatal() {
        let (mut device, sink) = test_device();
        sink.lock().unwrap().fail = true;
        negotiate(&mut device, UVC_VS_COMMIT_CONTROL, request_payload(1, 2, 333333));
        assert!(device.process_event(UvcEvent::StreamOn).is_none());
        let calls = sink.lock().unwrap().calls.clone();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1], SinkCall::SetFrameRate(30));
        assert_eq!(device.committed_format(), Some((PIXFMT_YUYV, 1280, 720)));
    }

    #[test]
    fn test_request_names() {
        assert_eq!(UvcRequest::from(UVC_GET_CUR).to_string(), "GET_CUR");
        assert_eq!(UvcRequest::from(UVC_SET_CUR), UvcRequest::SetCur);
        assert_eq!(UvcRequest::from(0x42), UvcRequest::Unknown(0x42));
        assert_eq!(VsControl::from(UVC_VS_PROBE_CONTROL), VsControl::Probe);
        assert_eq!(VsControl::from(9).to_string(), "UNKNOWN");
        assert_eq!(pu_control_name(UVC_PU_BRIGHTNESS_CONTROL), "BRIGHTNESS");
        assert_eq!(pu_control_name(0x40), "UNKNOWN");
    }

    #[test]
    fn test_empty_capabilities() {
        let mut config = test_config();
        config.streaming.formats.clear();
        let sink = Arc::new(Mutex::new(MockSink::default()));
        let err = UvcDevice::new(Arc::new(config), sink).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<UsbError>(),
            Some(UsbError::EmptyCapabilities(_))
        ));
    }
}
