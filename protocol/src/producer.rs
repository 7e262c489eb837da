//! Messages exchanged between instrumented processes and the producer-side
//! server.

use crate::capture::{
    ApiScopeStart, ApiScopeStartAsync, ApiScopeStop, ApiScopeStopAsync, ApiStringEvent,
    ApiTrackDouble, ApiTrackFloat, ApiTrackInt, ApiTrackInt64, ApiTrackUint, ApiTrackUint64,
    Callstack, CallstackSample, CaptureFinished, CaptureOptions, CaptureStarted,
    ClockResolutionEvent, ErrorsWithPerfEventOpenEvent, FunctionCall, InternedCallstack,
    InternedString, LostPerfRecordsEvent, ModuleUpdateEvent, ModulesSnapshot, SchedulingSlice,
    ThreadName, ThreadNamesSnapshot, ThreadStateSlice, TracepointInfo, WarningEvent,
};

/// Callstack sample with the frames inline instead of an interned id.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FullCallstackSample {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
    #[prost(uint32, tag = "2")]
    pub tid: u32,
    #[prost(fixed64, tag = "3")]
    pub timestamp_ns: u64,
    #[prost(message, optional, tag = "4")]
    pub callstack: Option<Callstack>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FullAddressInfo {
    #[prost(uint64, tag = "1")]
    pub absolute_address: u64,
    #[prost(string, tag = "2")]
    pub function_name: String,
    #[prost(uint64, tag = "3")]
    pub offset_in_function: u64,
    #[prost(string, tag = "4")]
    pub module_name: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FullTracepointEvent {
    #[prost(uint32, tag = "1")]
    pub pid: u32,
    #[prost(uint32, tag = "2")]
    pub tid: u32,
    #[prost(fixed64, tag = "3")]
    pub timestamp_ns: u64,
    #[prost(int32, tag = "4")]
    pub cpu: i32,
    #[prost(message, optional, tag = "5")]
    pub tracepoint_info: Option<TracepointInfo>,
}

/// An event as sent by a producer. Interned keys are local to the producer.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProducerCaptureEvent {
    #[prost(
        oneof = "producer_capture_event::Event",
        tags = "1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 20, 21, 24, 25, 26, 27, 28, 29, 30, 31, 32, 33"
    )]
    pub event: Option<producer_capture_event::Event>,
}

pub mod producer_capture_event {
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
        #[prost(message, tag = "20")]
        InternedCallstack(super::InternedCallstack),
        #[prost(message, tag = "21")]
        CallstackSample(super::CallstackSample),
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
        #[prost(message, tag = "30")]
        FullCallstackSample(super::FullCallstackSample),
        #[prost(message, tag = "31")]
        FullAddressInfo(super::FullAddressInfo),
        #[prost(message, tag = "32")]
        FullTracepointEvent(super::FullTracepointEvent),
    }
}

macro_rules! impl_producer_event_from {
    ($($variant:ident),+ $(,)?) => {$(
        impl From<$variant> for ProducerCaptureEvent {
            fn from(event: $variant) -> Self {
                ProducerCaptureEvent {
                    event: Some(producer_capture_event::Event::$variant(event)),
                }
            }
        }
    )+};
}

impl_producer_event_from!(
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
    InternedCallstack,
    CallstackSample,
    WarningEvent,
    ErrorsWithPerfEventOpenEvent,
    LostPerfRecordsEvent,
    FunctionCall,
    SchedulingSlice,
    ThreadNamesSnapshot,
    ClockResolutionEvent,
    FullCallstackSample,
    FullAddressInfo,
    FullTracepointEvent,
);

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BufferedCaptureEvents {
    #[prost(message, repeated, tag = "1")]
    pub capture_events: Vec<ProducerCaptureEvent>,
}

/// Sent by a producer once every event of the current capture was sent.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct AllEventsSent {}

/// Producer to server.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProducerMessage {
    #[prost(oneof = "producer_message::Message", tags = "1, 2")]
    pub message: Option<producer_message::Message>,
}

pub mod producer_message {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Message {
        #[prost(message, tag = "1")]
        BufferedCaptureEvents(super::BufferedCaptureEvents),
        #[prost(message, tag = "2")]
        AllEventsSent(super::AllEventsSent),
    }
}

impl ProducerMessage {
    pub fn events(capture_events: Vec<ProducerCaptureEvent>) -> Self {
        ProducerMessage {
            message: Some(producer_message::Message::BufferedCaptureEvents(
                BufferedCaptureEvents { capture_events },
            )),
        }
    }

    pub fn all_events_sent() -> Self {
        ProducerMessage {
            message: Some(producer_message::Message::AllEventsSent(AllEventsSent {})),
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StartCaptureCommand {
    #[prost(message, optional, tag = "1")]
    pub capture_options: Option<CaptureOptions>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct StopCaptureCommand {}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct CaptureFinishedCommand {}

/// Server to producer.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServerCommand {
    #[prost(oneof = "server_command::Command", tags = "1, 2, 3")]
    pub command: Option<server_command::Command>,
}

pub mod server_command {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Command {
        #[prost(message, tag = "1")]
        StartCapture(super::StartCaptureCommand),
        #[prost(message, tag = "2")]
        StopCapture(super::StopCaptureCommand),
        #[prost(message, tag = "3")]
        CaptureFinished(super::CaptureFinishedCommand),
    }
}

impl ServerCommand {
    pub fn start_capture(capture_options: CaptureOptions) -> Self {
        ServerCommand {
            command: Some(server_command::Command::StartCapture(StartCaptureCommand {
                capture_options: Some(capture_options),
            })),
        }
    }

    pub fn stop_capture() -> Self {
        ServerCommand {
            command: Some(server_command::Command::StopCapture(StopCaptureCommand {})),
        }
    }

    pub fn capture_finished() -> Self {
        ServerCommand {
            command: Some(server_command::Command::CaptureFinished(
                CaptureFinishedCommand {},
            )),
        }
    }
}
