use capture_file::CaptureFileError;
use thiserror::Error;

pub mod api_event_processor;
pub mod capture_data;
pub mod listener;
pub mod load;
pub mod processor;
pub mod save_to_file;

pub use api_event_processor::ApiEventProcessor;
pub use capture_data::{CaptureData, CaptureDataCollector};
pub use listener::{
    ApiStringEventInfo, ApiTrackValue, CallstackEvent, CallstackInfo, CaptureListener, Color,
    LinuxAddressInfo, ThreadStateSliceInfo, TimerInfo, TimerKind, TracepointEventInfo, TrackValue,
};
pub use load::{load_capture, LoadCaptureOutcome};
pub use processor::{drain_event_buffer, CaptureEventProcessor, ListenerEventProcessor};
pub use save_to_file::SaveToFileEventProcessor;

#[derive(Error, Debug)]
pub enum CaptureClientError {
    #[error("capture file error: {0}")]
    CaptureFile(#[from] CaptureFileError),
    #[error("malformed capture: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, CaptureClientError>;
