use protocol::{
    CallstackType, CaptureFinished, CaptureStarted, ClockResolutionEvent,
    ErrorsWithPerfEventOpenEvent, LostPerfRecordsEvent, ModuleInfo, ThreadState, TracepointInfo,
    WarningEvent,
};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub alpha: u8,
}

impl Color {
    /// Decodes an API color, `None` for the automatic color (zero).
    pub fn from_rgba(rgba: u32) -> Option<Color> {
        if rgba == 0 {
            return None;
        }
        Some(Color {
            red: (rgba >> 24) as u8,
            green: (rgba >> 16) as u8,
            blue: (rgba >> 8) as u8,
            alpha: rgba as u8,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Scope,
    AsyncScope,
    /// A call of an instrumented function.
    Function,
    /// A thread scheduled on a core.
    CoreActivity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimerInfo {
    pub kind: TimerKind,
    pub pid: u32,
    pub tid: u32,
    pub start_ns: u64,
    pub end_ns: u64,
    /// Nesting depth on the thread, zero for the outermost scope.
    pub depth: u32,
    pub name: String,
    pub color: Option<Color>,
    pub group_id: u64,
    pub address_in_function: u64,
    pub async_scope_id: Option<u64>,
    pub function_id: Option<u64>,
    pub core: Option<i32>,
    /// Set for calls of functions the capture tracks as frame boundaries.
    pub is_frame_track: bool,
}

impl TimerInfo {
    pub fn duration_ns(&self) -> u64 {
        self.end_ns.saturating_sub(self.start_ns)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackValue {
    Int(i32),
    Int64(i64),
    Uint(u32),
    Uint64(u64),
    Float(f32),
    Double(f64),
}

impl TrackValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            TrackValue::Int(v) => f64::from(v),
            TrackValue::Int64(v) => v as f64,
            TrackValue::Uint(v) => f64::from(v),
            TrackValue::Uint64(v) => v as f64,
            TrackValue::Float(v) => f64::from(v),
            TrackValue::Double(v) => v,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiTrackValue {
    pub pid: u32,
    pub tid: u32,
    pub timestamp_ns: u64,
    pub name: String,
    pub value: TrackValue,
    pub color: Option<Color>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiStringEventInfo {
    pub pid: u32,
    pub tid: u32,
    pub timestamp_ns: u64,
    pub id: u64,
    pub name: String,
    pub color: Option<Color>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadStateSliceInfo {
    pub pid: u32,
    pub tid: u32,
    pub state: ThreadState,
    pub begin_timestamp_ns: u64,
    pub end_timestamp_ns: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallstackInfo {
    pub frames: Vec<u64>,
    pub callstack_type: CallstackType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallstackEvent {
    pub pid: u32,
    pub tid: u32,
    pub timestamp_ns: u64,
    pub callstack_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinuxAddressInfo {
    pub absolute_address: u64,
    pub offset_in_function: u64,
    pub function_name: String,
    pub module_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TracepointEventInfo {
    pub pid: u32,
    pub tid: u32,
    pub timestamp_ns: u64,
    pub cpu: i32,
    pub tracepoint_info_key: u64,
}

/// Receives the decoded contents of a capture, live or loaded from a file.
///
/// `on_capture_started` is always the first call and `on_capture_finished`
/// the last one.
pub trait CaptureListener {
    fn on_capture_started(
        &mut self,
        capture_started: &CaptureStarted,
        file_path: Option<&Path>,
        frame_track_function_ids: &HashSet<u64>,
    );

    fn on_capture_finished(&mut self, capture_finished: &CaptureFinished);

    fn on_timer(&mut self, timer: TimerInfo);

    fn on_key_and_string(&mut self, _key: u64, _string: &str) {}

    fn on_thread_name(&mut self, _pid: u32, _tid: u32, _name: String) {}

    fn on_thread_state_slice(&mut self, _slice: ThreadStateSliceInfo) {}

    fn on_module_update(&mut self, _timestamp_ns: u64, _module: ModuleInfo) {}

    fn on_modules_snapshot(&mut self, _timestamp_ns: u64, _modules: Vec<ModuleInfo>) {}

    fn on_unique_callstack(&mut self, _callstack_id: u64, _callstack: CallstackInfo) {}

    fn on_callstack_event(&mut self, _event: CallstackEvent) {}

    fn on_address_info(&mut self, _address_info: LinuxAddressInfo) {}

    fn on_unique_tracepoint_info(&mut self, _key: u64, _info: TracepointInfo) {}

    fn on_tracepoint_event(&mut self, _event: TracepointEventInfo) {}

    fn on_api_track_value(&mut self, _value: ApiTrackValue) {}

    fn on_api_string_event(&mut self, _event: ApiStringEventInfo) {}

    fn on_warning_event(&mut self, _warning: WarningEvent) {}

    fn on_errors_with_perf_event_open(&mut self, _event: ErrorsWithPerfEventOpenEvent) {}

    fn on_lost_perf_records(&mut self, _event: LostPerfRecordsEvent) {}

    fn on_clock_resolution(&mut self, _event: ClockResolutionEvent) {}
}

impl<L: CaptureListener + ?Sized> CaptureListener for &mut L {
    fn on_capture_started(
        &mut self,
        capture_started: &CaptureStarted,
        file_path: Option<&Path>,
        frame_track_function_ids: &HashSet<u64>,
    ) {
        (**self).on_capture_started(capture_started, file_path, frame_track_function_ids)
    }

    fn on_capture_finished(&mut self, capture_finished: &CaptureFinished) {
        (**self).on_capture_finished(capture_finished)
    }

    fn on_timer(&mut self, timer: TimerInfo) {
        (**self).on_timer(timer)
    }

    fn on_key_and_string(&mut self, key: u64, string: &str) {
        (**self).on_key_and_string(key, string)
    }

    fn on_thread_name(&mut self, pid: u32, tid: u32, name: String) {
        (**self).on_thread_name(pid, tid, name)
    }

    fn on_thread_state_slice(&mut self, slice: ThreadStateSliceInfo) {
        (**self).on_thread_state_slice(slice)
    }

    fn on_module_update(&mut self, timestamp_ns: u64, module: ModuleInfo) {
        (**self).on_module_update(timestamp_ns, module)
    }

    fn on_modules_snapshot(&mut self, timestamp_ns: u64, modules: Vec<ModuleInfo>) {
        (**self).on_modules_snapshot(timestamp_ns, modules)
    }

    fn on_unique_callstack(&mut self, callstack_id: u64, callstack: CallstackInfo) {
        (**self).on_unique_callstack(callstack_id, callstack)
    }

    fn on_callstack_event(&mut self, event: CallstackEvent) {
        (**self).on_callstack_event(event)
    }

    fn on_address_info(&mut self, address_info: LinuxAddressInfo) {
        (**self).on_address_info(address_info)
    }

    fn on_unique_tracepoint_info(&mut self, key: u64, info: TracepointInfo) {
        (**self).on_unique_tracepoint_info(key, info)
    }

    fn on_tracepoint_event(&mut self, event: TracepointEventInfo) {
        (**self).on_tracepoint_event(event)
    }

    fn on_api_track_value(&mut self, value: ApiTrackValue) {
        (**self).on_api_track_value(value)
    }

    fn on_api_string_event(&mut self, event: ApiStringEventInfo) {
        (**self).on_api_string_event(event)
    }

    fn on_warning_event(&mut self, warning: WarningEvent) {
        (**self).on_warning_event(warning)
    }

    fn on_errors_with_perf_event_open(&mut self, event: ErrorsWithPerfEventOpenEvent) {
        (**self).on_errors_with_perf_event_open(event)
    }

    fn on_lost_perf_records(&mut self, event: LostPerfRecordsEvent) {
        (**self).on_lost_perf_records(event)
    }

    fn on_clock_resolution(&mut self, event: ClockResolutionEvent) {
        (**self).on_clock_resolution(event)
    }
}
