use event_buffer::EventBuffer;
use protocol::client_capture_event::Event;
use protocol::{ClientCaptureEvent, EncodedName, ThreadState, TracepointInfo};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::api_event_processor::ApiEventProcessor;
use crate::listener::{
    ApiStringEventInfo, ApiTrackValue, CallstackEvent, CallstackInfo, CaptureListener, Color,
    LinuxAddressInfo, ThreadStateSliceInfo, TimerInfo, TimerKind, TracepointEventInfo, TrackValue,
};

/// Consumes the events of one capture in order.
pub trait CaptureEventProcessor {
    fn process_event(&mut self, event: ClientCaptureEvent);
}

impl<P: CaptureEventProcessor + ?Sized> CaptureEventProcessor for Box<P> {
    fn process_event(&mut self, event: ClientCaptureEvent) {
        (**self).process_event(event)
    }
}

/// Pops events until `buffer` is closed and empty. Returns the number of
/// events processed.
pub fn drain_event_buffer(
    buffer: &EventBuffer<ClientCaptureEvent>,
    processor: &mut dyn CaptureEventProcessor,
) -> u64 {
    let mut processed = 0;
    for event in buffer.iter() {
        processor.process_event(event);
        processed += 1;
    }
    debug!(processed, "event buffer drained");
    processed
}

/// Resolves interned data and scope pairs, then hands typed records to a
/// [`CaptureListener`].
pub struct ListenerEventProcessor<L> {
    listener: L,
    file_path: Option<PathBuf>,
    frame_track_function_ids: HashSet<u64>,
    string_intern_pool: HashMap<u64, String>,
    callstack_ids: HashSet<u64>,
    tracepoint_intern_pool: HashMap<u64, TracepointInfo>,
    api_events: ApiEventProcessor,
    finished: bool,
}

impl<L: CaptureListener> ListenerEventProcessor<L> {
    pub fn new(
        listener: L,
        file_path: Option<PathBuf>,
        frame_track_function_ids: HashSet<u64>,
    ) -> Self {
        ListenerEventProcessor {
            listener,
            file_path,
            frame_track_function_ids,
            string_intern_pool: HashMap::new(),
            callstack_ids: HashSet::new(),
            tracepoint_intern_pool: HashMap::new(),
            api_events: ApiEventProcessor::new(),
            finished: false,
        }
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn into_listener(self) -> L {
        self.listener
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn interned_string(&self, key: u64) -> Option<&str> {
        self.string_intern_pool.get(&key).map(String::as_str)
    }

    fn track_value<E: EncodedName>(
        &mut self,
        event: &E,
        pid: u32,
        tid: u32,
        timestamp_ns: u64,
        color_rgba: u32,
        value: TrackValue,
    ) {
        self.listener.on_api_track_value(ApiTrackValue {
            pid,
            tid,
            timestamp_ns,
            name: event.decoded_name(),
            value,
            color: Color::from_rgba(color_rgba),
        });
    }
}

impl<L: CaptureListener> CaptureEventProcessor for ListenerEventProcessor<L> {
    fn process_event(&mut self, event: ClientCaptureEvent) {
        if self.finished {
            debug!("dropping event received after capture finished");
            return;
        }
        let Some(event) = event.event else {
            return;
        };

        match event {
            Event::CaptureStarted(started) => {
                self.listener.on_capture_started(
                    &started,
                    self.file_path.as_deref(),
                    &self.frame_track_function_ids,
                );
            }
            Event::CaptureFinished(finished) => {
                if self.api_events.open_scope_count() > 0 {
                    debug!(
                        open_scopes = self.api_events.open_scope_count(),
                        "capture finished with open scopes"
                    );
                }
                self.listener.on_capture_finished(&finished);
                self.finished = true;
            }
            Event::ApiScopeStart(start) => self.api_events.process_scope_start(start),
            Event::ApiScopeStop(stop) => {
                if let Some(timer) = self.api_events.process_scope_stop(&stop) {
                    self.listener.on_timer(timer);
                }
            }
            Event::ApiScopeStartAsync(start) => self.api_events.process_scope_start_async(start),
            Event::ApiScopeStopAsync(stop) => {
                if let Some(timer) = self.api_events.process_scope_stop_async(&stop) {
                    self.listener.on_timer(timer);
                }
            }
            Event::ApiStringEvent(string_event) => {
                self.listener.on_api_string_event(ApiStringEventInfo {
                    pid: string_event.pid,
                    tid: string_event.tid,
                    timestamp_ns: string_event.timestamp_ns,
                    id: string_event.id,
                    name: string_event.decoded_name(),
                    color: Color::from_rgba(string_event.color_rgba),
                });
            }
            Event::ApiTrackInt(e) => {
                self.track_value(&e, e.pid, e.tid, e.timestamp_ns, e.color_rgba, TrackValue::Int(e.data))
            }
            Event::ApiTrackInt64(e) => self.track_value(
                &e,
                e.pid,
                e.tid,
                e.timestamp_ns,
                e.color_rgba,
                TrackValue::Int64(e.data),
            ),
            Event::ApiTrackUint(e) => {
                self.track_value(&e, e.pid, e.tid, e.timestamp_ns, e.color_rgba, TrackValue::Uint(e.data))
            }
            Event::ApiTrackUint64(e) => self.track_value(
                &e,
                e.pid,
                e.tid,
                e.timestamp_ns,
                e.color_rgba,
                TrackValue::Uint64(e.data),
            ),
            Event::ApiTrackFloat(e) => self.track_value(
                &e,
                e.pid,
                e.tid,
                e.timestamp_ns,
                e.color_rgba,
                TrackValue::Float(e.data),
            ),
            Event::ApiTrackDouble(e) => self.track_value(
                &e,
                e.pid,
                e.tid,
                e.timestamp_ns,
                e.color_rgba,
                TrackValue::Double(e.data),
            ),
            Event::InternedString(interned) => {
                self.listener.on_key_and_string(interned.key, &interned.intern);
                if self
                    .string_intern_pool
                    .insert(interned.key, interned.intern)
                    .is_some()
                {
                    warn!(key = interned.key, "interned string key reused");
                }
            }
            Event::ModuleUpdateEvent(update) => match update.module {
                Some(module) => self.listener.on_module_update(update.timestamp_ns, module),
                None => warn!(pid = update.pid, "module update without module"),
            },
            Event::ModulesSnapshot(snapshot) => {
                self.listener
                    .on_modules_snapshot(snapshot.timestamp_ns, snapshot.modules);
            }
            Event::ThreadName(thread_name) => {
                self.listener
                    .on_thread_name(thread_name.pid, thread_name.tid, thread_name.name);
            }
            Event::ThreadStateSlice(slice) => {
                let state = ThreadState::try_from(slice.thread_state).unwrap_or_else(|_| {
                    warn!(state = slice.thread_state, "unknown thread state");
                    ThreadState::Running
                });
                self.listener.on_thread_state_slice(ThreadStateSliceInfo {
                    pid: slice.pid,
                    tid: slice.tid,
                    state,
                    begin_timestamp_ns: slice.end_timestamp_ns.saturating_sub(slice.duration_ns),
                    end_timestamp_ns: slice.end_timestamp_ns,
                });
            }
            Event::AddressInfo(address_info) => {
                let (Some(function_name), Some(module_path)) = (
                    self.interned_string(address_info.function_name_key),
                    self.interned_string(address_info.module_name_key),
                ) else {
                    warn!(
                        address = address_info.absolute_address,
                        "address info references unknown strings"
                    );
                    return;
                };
                let info = LinuxAddressInfo {
                    absolute_address: address_info.absolute_address,
                    offset_in_function: address_info.offset_in_function,
                    function_name: function_name.to_string(),
                    module_path: module_path.to_string(),
                };
                self.listener.on_address_info(info);
            }
            Event::InternedCallstack(interned) => {
                let Some(callstack) = interned.intern else {
                    warn!(key = interned.key, "interned callstack without frames");
                    return;
                };
                if !self.callstack_ids.insert(interned.key) {
                    warn!(key = interned.key, "interned callstack key reused");
                    return;
                }
                let callstack_type = callstack.callstack_type();
                self.listener.on_unique_callstack(
                    interned.key,
                    CallstackInfo {
                        frames: callstack.pcs,
                        callstack_type,
                    },
                );
            }
            Event::CallstackSample(sample) => {
                if !self.callstack_ids.contains(&sample.callstack_id) {
                    warn!(
                        callstack_id = sample.callstack_id,
                        "callstack sample references unknown callstack"
                    );
                    return;
                }
                self.listener.on_callstack_event(CallstackEvent {
                    pid: sample.pid,
                    tid: sample.tid,
                    timestamp_ns: sample.timestamp_ns,
                    callstack_id: sample.callstack_id,
                });
            }
            Event::InternedTracepointInfo(interned) => {
                let Some(info) = interned.intern else {
                    warn!(key = interned.key, "interned tracepoint without info");
                    return;
                };
                self.tracepoint_intern_pool.insert(interned.key, info.clone());
                self.listener.on_unique_tracepoint_info(interned.key, info);
            }
            Event::TracepointEvent(tracepoint) => {
                if !self
                    .tracepoint_intern_pool
                    .contains_key(&tracepoint.tracepoint_info_key)
                {
                    warn!(
                        key = tracepoint.tracepoint_info_key,
                        "tracepoint event references unknown tracepoint"
                    );
                    return;
                }
                self.listener.on_tracepoint_event(TracepointEventInfo {
                    pid: tracepoint.pid,
                    tid: tracepoint.tid,
                    timestamp_ns: tracepoint.timestamp_ns,
                    cpu: tracepoint.cpu,
                    tracepoint_info_key: tracepoint.tracepoint_info_key,
                });
            }
            Event::WarningEvent(warning) => self.listener.on_warning_event(warning),
            Event::ErrorsWithPerfEventOpenEvent(errors) => {
                self.listener.on_errors_with_perf_event_open(errors)
            }
            Event::LostPerfRecordsEvent(lost) => self.listener.on_lost_perf_records(lost),
            Event::FunctionCall(call) => {
                let is_frame_track = self.frame_track_function_ids.contains(&call.function_id);
                self.listener.on_timer(TimerInfo {
                    kind: TimerKind::Function,
                    pid: call.pid,
                    tid: call.tid,
                    start_ns: call.end_timestamp_ns.saturating_sub(call.duration_ns),
                    end_ns: call.end_timestamp_ns,
                    depth: u32::try_from(call.depth).unwrap_or(0),
                    name: String::new(),
                    color: None,
                    group_id: 0,
                    address_in_function: 0,
                    async_scope_id: None,
                    function_id: Some(call.function_id),
                    core: None,
                    is_frame_track,
                });
            }
            Event::SchedulingSlice(slice) => {
                self.listener.on_timer(TimerInfo {
                    kind: TimerKind::CoreActivity,
                    pid: slice.pid,
                    tid: slice.tid,
                    start_ns: slice.out_timestamp_ns.saturating_sub(slice.duration_ns),
                    end_ns: slice.out_timestamp_ns,
                    depth: u32::try_from(slice.core).unwrap_or(0),
                    name: String::new(),
                    color: None,
                    group_id: 0,
                    address_in_function: 0,
                    async_scope_id: None,
                    function_id: None,
                    core: Some(slice.core),
                    is_frame_track: false,
                });
            }
            Event::ThreadNamesSnapshot(snapshot) => {
                for thread_name in snapshot.thread_names {
                    self.listener
                        .on_thread_name(thread_name.pid, thread_name.tid, thread_name.name);
                }
            }
            Event::ClockResolutionEvent(resolution) => self.listener.on_clock_resolution(resolution),
        }
    }
}
