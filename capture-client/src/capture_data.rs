use protocol::{
    CaptureFinished, CaptureOptions, CaptureStarted, ClockResolutionEvent,
    ErrorsWithPerfEventOpenEvent, LostPerfRecordsEvent, ModuleInfo, TracepointInfo, WarningEvent,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::listener::{
    ApiStringEventInfo, ApiTrackValue, CallstackEvent, CallstackInfo, CaptureListener,
    LinuxAddressInfo, ThreadStateSliceInfo, TimerInfo, TracepointEventInfo,
};

/// Everything a capture produced, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct CaptureData {
    pub process_id: u32,
    pub process_name: String,
    pub executable_path: String,
    pub capture_start_timestamp_ns: u64,
    pub capture_start_unix_time_ns: u64,
    pub capture_options: Option<CaptureOptions>,
    pub file_path: Option<PathBuf>,
    pub frame_track_function_ids: HashSet<u64>,
    pub thread_names: HashMap<u32, String>,
    /// Loaded modules keyed by file path.
    pub modules: BTreeMap<String, ModuleInfo>,
    pub address_infos: HashMap<u64, LinuxAddressInfo>,
    pub unique_callstacks: HashMap<u64, CallstackInfo>,
    pub callstack_events: Vec<CallstackEvent>,
    pub tracepoint_infos: HashMap<u64, TracepointInfo>,
    pub tracepoint_events: Vec<TracepointEventInfo>,
    pub thread_state_slices: Vec<ThreadStateSliceInfo>,
    pub timers: Vec<TimerInfo>,
    pub api_track_values: Vec<ApiTrackValue>,
    pub api_string_events: Vec<ApiStringEventInfo>,
    pub strings: HashMap<u64, String>,
    pub warnings: Vec<WarningEvent>,
    pub perf_event_open_errors: Vec<ErrorsWithPerfEventOpenEvent>,
    pub lost_perf_records_duration_ns: u64,
    pub clock_resolution_ns: Option<u64>,
    pub capture_finished: Option<CaptureFinished>,
}

impl CaptureData {
    /// Calls of the functions marked as frame tracks, in arrival order.
    pub fn frame_track_timers(&self) -> impl Iterator<Item = &TimerInfo> {
        self.timers.iter().filter(|timer| timer.is_frame_track)
    }
}

/// A [`CaptureListener`] that accumulates a [`CaptureData`].
///
/// Calls made after `on_capture_finished` are ignored.
#[derive(Debug, Default)]
pub struct CaptureDataCollector {
    data: CaptureData,
    started: bool,
}

impl CaptureDataCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capture_data(&self) -> &CaptureData {
        &self.data
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_finished(&self) -> bool {
        self.data.capture_finished.is_some()
    }

    pub fn into_capture_data(self) -> CaptureData {
        self.data
    }

    fn frozen(&self) -> bool {
        self.is_finished()
    }
}

fn process_name(executable_path: &str) -> String {
    Path::new(executable_path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl CaptureListener for CaptureDataCollector {
    fn on_capture_started(
        &mut self,
        capture_started: &CaptureStarted,
        file_path: Option<&Path>,
        frame_track_function_ids: &HashSet<u64>,
    ) {
        if self.frozen() {
            return;
        }
        debug!(pid = capture_started.pid, "collecting capture");
        self.started = true;
        self.data.process_id = capture_started.pid;
        self.data.process_name = process_name(&capture_started.executable_path);
        self.data.executable_path = capture_started.executable_path.clone();
        self.data.capture_start_timestamp_ns = capture_started.capture_start_timestamp_ns;
        self.data.capture_start_unix_time_ns = capture_started.capture_start_unix_time_ns;
        self.data.capture_options = capture_started.capture_options.clone();
        self.data.file_path = file_path.map(Path::to_path_buf);
        self.data.frame_track_function_ids = frame_track_function_ids.clone();
    }

    fn on_capture_finished(&mut self, capture_finished: &CaptureFinished) {
        if self.frozen() {
            return;
        }
        self.data.capture_finished = Some(capture_finished.clone());
    }

    fn on_timer(&mut self, timer: TimerInfo) {
        if !self.frozen() {
            self.data.timers.push(timer);
        }
    }

    fn on_key_and_string(&mut self, key: u64, string: &str) {
        if !self.frozen() {
            self.data.strings.insert(key, string.to_string());
        }
    }

    fn on_thread_name(&mut self, _pid: u32, tid: u32, name: String) {
        if !self.frozen() {
            self.data.thread_names.insert(tid, name);
        }
    }

    fn on_thread_state_slice(&mut self, slice: ThreadStateSliceInfo) {
        if !self.frozen() {
            self.data.thread_state_slices.push(slice);
        }
    }

    fn on_module_update(&mut self, _timestamp_ns: u64, module: ModuleInfo) {
        if !self.frozen() {
            self.data.modules.insert(module.file_path.clone(), module);
        }
    }

    fn on_modules_snapshot(&mut self, _timestamp_ns: u64, modules: Vec<ModuleInfo>) {
        if self.frozen() {
            return;
        }
        self.data.modules = modules
            .into_iter()
            .map(|module| (module.file_path.clone(), module))
            .collect();
    }

    fn on_unique_callstack(&mut self, callstack_id: u64, callstack: CallstackInfo) {
        if !self.frozen() {
            self.data.unique_callstacks.insert(callstack_id, callstack);
        }
    }

    fn on_callstack_event(&mut self, event: CallstackEvent) {
        if !self.frozen() {
            self.data.callstack_events.push(event);
        }
    }

    fn on_address_info(&mut self, address_info: LinuxAddressInfo) {
        if !self.frozen() {
            self.data
                .address_infos
                .insert(address_info.absolute_address, address_info);
        }
    }

    fn on_unique_tracepoint_info(&mut self, key: u64, info: TracepointInfo) {
        if !self.frozen() {
            self.data.tracepoint_infos.insert(key, info);
        }
    }

    fn on_tracepoint_event(&mut self, event: TracepointEventInfo) {
        if !self.frozen() {
            self.data.tracepoint_events.push(event);
        }
    }

    fn on_api_track_value(&mut self, value: ApiTrackValue) {
        if !self.frozen() {
            self.data.api_track_values.push(value);
        }
    }

    fn on_api_string_event(&mut self, event: ApiStringEventInfo) {
        if !self.frozen() {
            self.data.api_string_events.push(event);
        }
    }

    fn on_warning_event(&mut self, warning: WarningEvent) {
        if !self.frozen() {
            self.data.warnings.push(warning);
        }
    }

    fn on_errors_with_perf_event_open(&mut self, event: ErrorsWithPerfEventOpenEvent) {
        if !self.frozen() {
            self.data.perf_event_open_errors.push(event);
        }
    }

    fn on_lost_perf_records(&mut self, event: LostPerfRecordsEvent) {
        if !self.frozen() {
            self.data.lost_perf_records_duration_ns += event.duration_ns;
        }
    }

    fn on_clock_resolution(&mut self, event: ClockResolutionEvent) {
        if !self.frozen() {
            self.data.clock_resolution_ns = Some(event.clock_resolution_ns);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    fn module(file_path: &str, address_start: u64) -> ModuleInfo {
        ModuleInfo {
            name: process_name(file_path),
            file_path: file_path.to_string(),
            address_start,
            address_end: address_start + 0x1000,
            ..Default::default()
        }
    }

    #[fixture]
    fn started() -> CaptureDataCollector {
        let mut collector = CaptureDataCollector::new();
        collector.on_capture_started(
            &CaptureStarted {
                pid: 42,
                executable_path: "/usr/bin/game".to_string(),
                capture_start_timestamp_ns: 1000,
                ..Default::default()
            },
            Some(Path::new("/tmp/game.orbit")),
            &HashSet::from([3, 4]),
        );
        collector
    }

    #[rstest]
    fn test_capture_started_fills_process_info(started: CaptureDataCollector) {
        let data = started.capture_data();
        assert!(started.is_started());
        assert_eq!(data.process_id, 42);
        assert_eq!(data.process_name, "game");
        assert_eq!(data.capture_start_timestamp_ns, 1000);
        assert_eq!(data.file_path.as_deref(), Some(Path::new("/tmp/game.orbit")));
        assert_eq!(data.frame_track_function_ids, HashSet::from([3, 4]));
    }

    #[rstest]
    fn test_snapshot_replaces_modules(mut started: CaptureDataCollector) {
        started.on_module_update(1, module("/lib/a.so", 0x1000));
        started.on_module_update(2, module("/lib/a.so", 0x5000));
        assert_eq!(started.capture_data().modules.len(), 1);
        assert_eq!(started.capture_data().modules["/lib/a.so"].address_start, 0x5000);

        started.on_modules_snapshot(3, vec![module("/lib/b.so", 0x9000), module("/lib/c.so", 0xa000)]);
        let paths: Vec<&str> = started.capture_data().modules.keys().map(String::as_str).collect();
        assert_eq!(paths, vec!["/lib/b.so", "/lib/c.so"]);
    }

    #[rstest]
    fn test_lost_records_accumulate(mut started: CaptureDataCollector) {
        started.on_lost_perf_records(LostPerfRecordsEvent {
            duration_ns: 10,
            end_timestamp_ns: 100,
        });
        started.on_lost_perf_records(LostPerfRecordsEvent {
            duration_ns: 5,
            end_timestamp_ns: 200,
        });
        assert_eq!(started.capture_data().lost_perf_records_duration_ns, 15);
    }

    #[rstest]
    fn test_collector_freezes_after_finish(mut started: CaptureDataCollector) {
        started.on_thread_name(42, 1, "main".to_string());
        started.on_capture_finished(&CaptureFinished::failed("producer lost"));
        started.on_thread_name(42, 2, "late".to_string());
        started.on_capture_finished(&CaptureFinished::successful());

        assert!(started.is_finished());
        let data = started.into_capture_data();
        assert_eq!(data.thread_names.len(), 1);
        assert_eq!(
            data.capture_finished.map(|finished| finished.error_message),
            Some("producer lost".to_string())
        );
    }
}
