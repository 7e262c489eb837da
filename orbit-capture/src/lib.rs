pub mod config;
pub mod session;

pub use config::{CaptureSettings, Config, ServerSettings};
pub use session::{load_capture_data, CaptureSession, CaptureSummary};
