use event_buffer::EventBufferError;
use protocol::ProtocolError;
use thiserror::Error;

pub mod address;
pub mod client;
mod connection;
mod epoll_thread;
pub mod producer_event_processor;
pub mod server;
mod service_state;

pub use address::{ServerAddress, DEFAULT_PRODUCER_SIDE_ADDRESS};
pub use client::{CommandReceiver, EventSender, ProducerClient};
pub use producer_event_processor::ProducerEventProcessor;
pub use server::{ProducerSideServer, ServerConfig};
pub use service_state::CaptureStatus;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("System error: {0}")]
    Nix(#[from] nix::Error),
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Event buffer error: {0}")]
    EventBuffer(#[from] EventBufferError),
    #[error("A producer-side server is already listening on {0}")]
    AlreadyRunning(String),
    #[error("Invalid server address: {0}")]
    InvalidAddress(String),
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// Monotonic clock reading in nanoseconds, the time base of every capture
/// event.
pub fn get_timestamp_ns() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }
    ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64
}
