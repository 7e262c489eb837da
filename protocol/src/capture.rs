//! Events as they are stored in a capture file and handed to listeners.

use crate::encoded_string::{encode_string, impl_encoded_name};

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CaptureOptions {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
    #[prost(double, tag = "2")]
    pub samples_per_second: f64,
    #[prost(bool, tag = "3")]
    pub enable_api: bool,
    #[prost(bool, tag = "4")]
    pub trace_thread_state: bool,
    #[prost(uint64, repeated, tag = "5")]
    pub instrumented_function_ids: Vec<u64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CaptureStarted {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
    #[prost(string, tag = "2")]
    pub executable_path: String,
    #[prost(string, tag = "3")]
    pub executable_build_id: String,
    #[prost(fixed64, tag = "4")]
    pub capture_start_timestamp_ns: u64,
    #[prost(fixed64, tag = "5")]
    pub capture_start_unix_time_ns: u64,
    #[prost(message, optional, tag = "6")]
    pub capture_options: Option<CaptureOptions>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum CaptureStatus {
    Successful = 0,
    Interrupted = 1,
    Failed = 2,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CaptureFinished {
    #[prost(enumeration = "CaptureStatus", tag = "1")]
    pub status: i32,
    #[prost(string, tag = "2")]
    pub error_message: String,
}

impl CaptureFinished {
    pub fn successful() -> Self {
        CaptureFinished {
            status: CaptureStatus::Successful as i32,
            error_message: String::new(),
        }
    }

    pub fn interrupted(error_message: impl Into<String>) -> Self {
        CaptureFinished {
            status: CaptureStatus::Interrupted as i32,
            error_message: error_message.into(),
        }
    }

    pub fn failed(error_message: impl Into<String>) -> Self {
        CaptureFinished {
            status: CaptureStatus::Failed as i32,
            error_message: error_message.into(),
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ApiScopeStart {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
    #[prost(uint32, tag = "2")]
    pub tid: u32,
    #[prost(fixed64, tag = "3")]
    pub timestamp_ns: u64,
    #[prost(fixed32, tag = "4")]
    pub color_rgba: u32,
    #[prost(uint64, tag = "5")]
    pub group_id: u64,
    #[prost(uint64, tag = "6")]
    pub address_in_function: u64,
    #[prost(fixed64, tag = "7")]
    pub encoded_name_1: u64,
    #[prost(fixed64, tag = "8")]
    pub encoded_name_2: u64,
    #[prost(fixed64, tag = "9")]
    pub encoded_name_3: u64,
    #[prost(fixed64, tag = "10")]
    pub encoded_name_4: u64,
    #[prost(fixed64, tag = "11")]
    pub encoded_name_5: u64,
    #[prost(fixed64, tag = "12")]
    pub encoded_name_6: u64,
    #[prost(fixed64, tag = "13")]
    pub encoded_name_7: u64,
    #[prost(fixed64, tag = "14")]
    pub encoded_name_8: u64,
    #[prost(fixed64, repeated, tag = "15")]
    pub encoded_name_additional: Vec<u64>,
}

impl ApiScopeStart {
    pub fn new(
        pid: u32,
        tid: u32,
        timestamp_ns: u64,
        name: &str,
        color_rgba: u32,
        group_id: u64,
        address_in_function: u64,
    ) -> Self {
        let mut event = ApiScopeStart {
            pid,
            tid,
            timestamp_ns,
            color_rgba,
            group_id,
            address_in_function,
            ..Default::default()
        };
        encode_string(name.as_bytes(), &mut event);
        event
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ApiScopeStop {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
    #[prost(uint32, tag = "2")]
    pub tid: u32,
    #[prost(fixed64, tag = "3")]
    pub timestamp_ns: u64,
}

impl ApiScopeStop {
    pub fn new(pid: u32, tid: u32, timestamp_ns: u64) -> Self {
        ApiScopeStop {
            pid,
            tid,
            timestamp_ns,
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ApiScopeStartAsync {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
    #[prost(uint32, tag = "2")]
    pub tid: u32,
    #[prost(fixed64, tag = "3")]
    pub timestamp_ns: u64,
    #[prost(fixed32, tag = "4")]
    pub color_rgba: u32,
    #[prost(uint64, tag = "5")]
    pub id: u64,
    #[prost(uint64, tag = "6")]
    pub address_in_function: u64,
    #[prost(fixed64, tag = "7")]
    pub encoded_name_1: u64,
    #[prost(fixed64, tag = "8")]
    pub encoded_name_2: u64,
    #[prost(fixed64, tag = "9")]
    pub encoded_name_3: u64,
    #[prost(fixed64, tag = "10")]
    pub encoded_name_4: u64,
    #[prost(fixed64, tag = "11")]
    pub encoded_name_5: u64,
    #[prost(fixed64, tag = "12")]
    pub encoded_name_6: u64,
    #[prost(fixed64, tag = "13")]
    pub encoded_name_7: u64,
    #[prost(fixed64, tag = "14")]
    pub encoded_name_8: u64,
    #[prost(fixed64, repeated, tag = "15")]
    pub encoded_name_additional: Vec<u64>,
}

impl ApiScopeStartAsync {
    pub fn new(
        pid: u32,
        tid: u32,
        timestamp_ns: u64,
        name: &str,
        id: u64,
        color_rgba: u32,
        address_in_function: u64,
    ) -> Self {
        let mut event = ApiScopeStartAsync {
            pid,
            tid,
            timestamp_ns,
            color_rgba,
            id,
            address_in_function,
            ..Default::default()
        };
        encode_string(name.as_bytes(), &mut event);
        event
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ApiScopeStopAsync {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
    #[prost(uint32, tag = "2")]
    pub tid: u32,
    #[prost(fixed64, tag = "3")]
    pub timestamp_ns: u64,
    #[prost(uint64, tag = "4")]
    pub id: u64,
}

impl ApiScopeStopAsync {
    pub fn new(pid: u32, tid: u32, timestamp_ns: u64, id: u64) -> Self {
        ApiScopeStopAsync {
            pid,
            tid,
            timestamp_ns,
            id,
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ApiStringEvent {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
    #[prost(uint32, tag = "2")]
    pub tid: u32,
    #[prost(fixed64, tag = "3")]
    pub timestamp_ns: u64,
    #[prost(fixed32, tag = "4")]
    pub color_rgba: u32,
    #[prost(uint64, tag = "5")]
    pub id: u64,
    #[prost(fixed64, tag = "7")]
    pub encoded_name_1: u64,
    #[prost(fixed64, tag = "8")]
    pub encoded_name_2: u64,
    #[prost(fixed64, tag = "9")]
    pub encoded_name_3: u64,
    #[prost(fixed64, tag = "10")]
    pub encoded_name_4: u64,
    #[prost(fixed64, tag = "11")]
    pub encoded_name_5: u64,
    #[prost(fixed64, tag = "12")]
    pub encoded_name_6: u64,
    #[prost(fixed64, tag = "13")]
    pub encoded_name_7: u64,
    #[prost(fixed64, tag = "14")]
    pub encoded_name_8: u64,
    #[prost(fixed64, repeated, tag = "15")]
    pub encoded_name_additional: Vec<u64>,
}

impl ApiStringEvent {
    pub fn new(pid: u32, tid: u32, timestamp_ns: u64, name: &str, id: u64, color_rgba: u32) -> Self {
        let mut event = ApiStringEvent {
            pid,
            tid,
            timestamp_ns,
            color_rgba,
            id,
            ..Default::default()
        };
        encode_string(name.as_bytes(), &mut event);
        event
    }
}

// Track value events share one layout and differ only in the type of `data`.
macro_rules! api_track_event {
    ($name:ident, $proto_ty:ident, $rust_ty:ty) => {
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct $name {
            #[prost(uint32, tag = "1")]
            pub pid: u32,
            #[prost(uint32, tag = "2")]
            pub tid: u32,
            #[prost(fixed64, tag = "3")]
            pub timestamp_ns: u64,
            #[prost(fixed32, tag = "4")]
            pub color_rgba: u32,
            #[prost($proto_ty, tag = "5")]
            pub data: $rust_ty,
            #[prost(fixed64, tag = "7")]
            pub encoded_name_1: u64,
            #[prost(fixed64, tag = "8")]
            pub encoded_name_2: u64,
            #[prost(fixed64, tag = "9")]
            pub encoded_name_3: u64,
            #[prost(fixed64, tag = "10")]
            pub encoded_name_4: u64,
            #[prost(fixed64, tag = "11")]
            pub encoded_name_5: u64,
            #[prost(fixed64, tag = "12")]
            pub encoded_name_6: u64,
            #[prost(fixed64, tag = "13")]
            pub encoded_name_7: u64,
            #[prost(fixed64, tag = "14")]
            pub encoded_name_8: u64,
            #[prost(fixed64, repeated, tag = "15")]
            pub encoded_name_additional: Vec<u64>,
        }

        impl $name {
            pub fn new(
                pid: u32,
                tid: u32,
                timestamp_ns: u64,
                name: &str,
                data: $rust_ty,
                color_rgba: u32,
            ) -> Self {
                let mut event = $name {
                    pid,
                    tid,
                    timestamp_ns,
                    color_rgba,
                    data,
                    ..Default::default()
                };
                encode_string(name.as_bytes(), &mut event);
                event
            }
        }
    };
}

api_track_event!(ApiTrackInt, int32, i32);
api_track_event!(ApiTrackInt64, int64, i64);
api_track_event!(ApiTrackUint, uint32, u32);
api_track_event!(ApiTrackUint64, uint64, u64);
api_track_event!(ApiTrackFloat, float, f32);
api_track_event!(ApiTrackDouble, double, f64);

impl_encoded_name!(
    ApiScopeStart,
    ApiScopeStartAsync,
    ApiStringEvent,
    ApiTrackInt,
    ApiTrackInt64,
    ApiTrackUint,
    ApiTrackUint64,
    ApiTrackFloat,
    ApiTrackDouble,
);

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InternedString {
    #[prost(uint64, tag = "1")]
    pub key: u64,
    #[prost(string, tag = "2")]
    pub intern: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ModuleInfo {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub file_path: String,
    #[prost(uint64, tag = "3")]
    pub file_size: u64,
    #[prost(uint64, tag = "4")]
    pub address_start: u64,
    #[prost(uint64, tag = "5")]
    pub address_end: u64,
    #[prost(string, tag = "6")]
    pub build_id: String,
    #[prost(uint64, tag = "7")]
    pub load_bias: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ModuleUpdateEvent {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
    #[prost(fixed64, tag = "2")]
    pub timestamp_ns: u64,
    #[prost(message, optional, tag = "3")]
    pub module: Option<ModuleInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ModulesSnapshot {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
    #[prost(fixed64, tag = "2")]
    pub timestamp_ns: u64,
    #[prost(message, repeated, tag = "3")]
    pub modules: Vec<ModuleInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ThreadName {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
    #[prost(uint32, tag = "2")]
    pub tid: u32,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(fixed64, tag = "4")]
    pub timestamp_ns: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ThreadState {
    Running = 0,
    Runnable = 1,
    InterruptibleSleep = 2,
    UninterruptibleSleep = 3,
    Stopped = 4,
    Traced = 5,
    Dead = 6,
    Zombie = 7,
    Parked = 8,
    Idle = 9,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ThreadStateSlice {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
    #[prost(uint32, tag = "2")]
    pub tid: u32,
    #[prost(enumeration = "ThreadState", tag = "3")]
    pub thread_state: i32,
    #[prost(uint64, tag = "4")]
    pub duration_ns: u64,
    #[prost(fixed64, tag = "5")]
    pub end_timestamp_ns: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AddressInfo {
    #[prost(uint64, tag = "1")]
    pub absolute_address: u64,
    #[prost(uint64, tag = "2")]
    pub function_name_key: u64,
    #[prost(uint64, tag = "3")]
    pub offset_in_function: u64,
    #[prost(uint64, tag = "4")]
    pub module_name_key: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum CallstackType {
    Complete = 0,
    DwarfUnwindingError = 1,
    FramePointerUnwindingError = 2,
    InUserSpaceInstrumentation = 3,
    CallstackPatchingFailed = 4,
    StackTopForDwarfUnwindingTooSmall = 5,
}

#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct Callstack {
    #[prost(uint64, repeated, tag = "1")]
    pub pcs: Vec<u64>,
    #[prost(enumeration = "CallstackType", tag = "2")]
    pub callstack_type: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InternedCallstack {
    #[prost(uint64, tag = "1")]
    pub key: u64,
    #[prost(message, optional, tag = "2")]
    pub intern: Option<Callstack>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CallstackSample {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
    #[prost(uint32, tag = "2")]
    pub tid: u32,
    #[prost(fixed64, tag = "3")]
    pub timestamp_ns: u64,
    #[prost(uint64, tag = "4")]
    pub callstack_id: u64,
}

#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct TracepointInfo {
    #[prost(string, tag = "1")]
    pub category: String,
    #[prost(string, tag = "2")]
    pub name: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InternedTracepointInfo {
    #[prost(uint64, tag = "1")]
    pub key: u64,
    #[prost(message, optional, tag = "2")]
    pub intern: Option<TracepointInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TracepointEvent {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
    #[prost(uint32, tag = "2")]
    pub tid: u32,
    #[prost(fixed64, tag = "3")]
    pub timestamp_ns: u64,
    #[prost(int32, tag = "4")]
    pub cpu: i32,
    #[prost(uint64, tag = "5")]
    pub tracepoint_info_key: u64,
}

/// One call of an instrumented function, reported when it returns.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FunctionCall {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
    #[prost(uint32, tag = "2")]
    pub tid: u32,
    #[prost(uint64, tag = "3")]
    pub function_id: u64,
    #[prost(uint64, tag = "4")]
    pub duration_ns: u64,
    #[prost(fixed64, tag = "5")]
    pub end_timestamp_ns: u64,
    #[prost(int32, tag = "6")]
    pub depth: i32,
    #[prost(uint64, tag = "7")]
    pub return_value: u64,
    #[prost(uint64, repeated, tag = "8")]
    pub registers: Vec<u64>,
}

/// A thread running on `core` until `out_timestamp_ns`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SchedulingSlice {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
    #[prost(uint32, tag = "2")]
    pub tid: u32,
    #[prost(int32, tag = "3")]
    pub core: i32,
    #[prost(uint64, tag = "4")]
    pub duration_ns: u64,
    #[prost(fixed64, tag = "5")]
    pub out_timestamp_ns: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ThreadNamesSnapshot {
    #[prost(fixed64, tag = "1")]
    pub timestamp_ns: u64,
    #[prost(message, repeated, tag = "2")]
    pub thread_names: Vec<ThreadName>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClockResolutionEvent {
    #[prost(fixed64, tag = "1")]
    pub timestamp_ns: u64,
    #[prost(uint64, tag = "2")]
    pub clock_resolution_ns: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WarningEvent {
    #[prost(fixed64, tag = "1")]
    pub timestamp_ns: u64,
    #[prost(string, tag = "2")]
    pub message: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ErrorsWithPerfEventOpenEvent {
    #[prost(fixed64, tag = "1")]
    pub timestamp_ns: u64,
    #[prost(string, repeated, tag = "2")]
    pub failed_to_open: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LostPerfRecordsEvent {
    #[prost(uint64, tag = "1")]
    pub duration_ns: u64,
    #[prost(fixed64, tag = "2")]
    pub end_timestamp_ns: u64,
}

/// One record of the capture section.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClientCaptureEvent {
    #[prost(
        oneof = "client_capture_event::Event",
        tags = "1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 33"
    )]
    pub event: Option<client_capture_event::Event>,
}

pub mod client_capture_event {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Event {
        #[prost(message, tag = "1")]
        CaptureStarted(super::CaptureStarted),
        #[prost(message, tag = "2")]
        CaptureFinished(super::CaptureFinished),
        #[prost(message, tag = "3")]
        ApiScopeStart(super::ApiScopeStart),
        #[prost(message, tag = "4")]
        ApiScopeStop(super::ApiScopeStop),
        #[prost(message, tag = "5")]
        ApiScopeStartAsync(super::ApiScopeStartAsync),
        #[prost(message, tag = "6")]
        ApiScopeStopAsync(super::ApiScopeStopAsync),
        #[prost(message, tag = "7")]
        ApiStringEvent(super::ApiStringEvent),
        #[prost(message, tag = "8")]
        ApiTrackInt(super::ApiTrackInt),
        #[prost(message, tag = "9")]
        ApiTrackInt64(super::ApiTrackInt64),
        #[prost(message, tag = "10")]
        ApiTrackUint(super::ApiTrackUint),
        #[prost(message, tag = "11")]
        ApiTrackUint64(super::ApiTrackUint64),
        #[prost(message, tag = "12")]
        ApiTrackFloat(super::ApiTrackFloat),
        #[prost(message, tag = "13")]
        ApiTrackDouble(super::ApiTrackDouble),
        #[prost(message, tag = "14")]
        InternedString(super::InternedString),
        #[prost(message, tag = "15")]
        ModuleUpdateEvent(super::ModuleUpdateEvent),
        #[prost(message, tag = "16")]
        ModulesSnapshot(super::ModulesSnapshot),
        #[prost(message, tag = "17")]
        ThreadName(super::ThreadName),
        #[prost(message, tag = "18")]
        ThreadStateSlice(super::ThreadStateSlice),
        #[prost(message, tag = "19")]
        AddressInfo(super::AddressInfo),
        #[prost(message, tag = "20")]
        InternedCallstack(super::InternedCallstack),
        #[prost(message, tag = "21")]
        CallstackSample(super::CallstackSample),
        #[prost(message, tag = "22")]
        InternedTracepointInfo(super::InternedTracepointInfo),
        #[prost(message, tag = "23")]
        TracepointEvent(super::TracepointEvent),
        #[prost(message, tag = "24")]
        WarningEvent(super::WarningEvent),
        #[prost(message, tag = "25")]
        ErrorsWithPerfEventOpenEvent(super::ErrorsWithPerfEventOpenEvent),
        #[prost(message, tag = "26")]
        LostPerfRecordsEvent(super::LostPerfRecordsEvent),
        #[prost(message, tag = "27")]
        FunctionCall(super::FunctionCall),
        #[prost(message, tag = "28")]
        SchedulingSlice(super::SchedulingSlice),
        #[prost(message, tag = "29")]
        ThreadNamesSnapshot(super::ThreadNamesSnapshot),
        #[prost(message, tag = "33")]
        ClockResolutionEvent(super::ClockResolutionEvent),
    }
}

macro_rules! impl_client_event_from {
    ($($variant:ident),+ $(,)?) => {$(
        impl From<$variant> for ClientCaptureEvent {
            fn from(event: $variant) -> Self {
                ClientCaptureEvent {
                    event: Some(client_capture_event::Event::$variant(event)),
                }
            }
        }
    )+};
}

impl_client_event_from!(
    CaptureStarted,
    CaptureFinished,
    ApiScopeStart,
    ApiScopeStop,
    ApiScopeStartAsync,
    ApiScopeStopAsync,
    ApiStringEvent,
    ApiTrackInt,
    ApiTrackInt64,
    ApiTrackUint,
    ApiTrackUint64,
    ApiTrackFloat,
    ApiTrackDouble,
    InternedString,
    ModuleUpdateEvent,
    ModulesSnapshot,
    ThreadName,
    ThreadStateSlice,
    AddressInfo,
    InternedCallstack,
    CallstackSample,
    InternedTracepointInfo,
    TracepointEvent,
    WarningEvent,
    ErrorsWithPerfEventOpenEvent,
    LostPerfRecordsEvent,
    FunctionCall,
    SchedulingSlice,
    ThreadNamesSnapshot,
    ClockResolutionEvent,
);

impl ClientCaptureEvent {
    pub fn is_capture_finished(&self) -> bool {
        matches!(
            self.event,
            Some(client_capture_event::Event::CaptureFinished(_))
        )
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FrameTracksInfo {
    #[prost(uint64, repeated, tag = "1")]
    pub frame_track_function_ids: Vec<u64>,
}

/// Payload of the USER_DATA section.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UserDefinedCaptureInfo {
    #[prost(message, optional, tag = "1")]
    pub frame_tracks_info: Option<FrameTracksInfo>,
}

impl UserDefinedCaptureInfo {
    pub fn with_frame_tracks(frame_track_function_ids: impl IntoIterator<Item = u64>) -> Self {
        UserDefinedCaptureInfo {
            frame_tracks_info: Some(FrameTracksInfo {
                frame_track_function_ids: frame_track_function_ids.into_iter().collect(),
            }),
        }
    }

    pub fn frame_track_function_ids(&self) -> &[u64] {
        self.frame_tracks_info
            .as_ref()
            .map(|info| info.frame_track_function_ids.as_slice())
            .unwrap_or_default()
    }
}
