use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EventBufferError {
    #[error("capacity must be at least one")]
    ZeroCapacity,

    #[error("event buffer is closed")]
    Closed,

    #[error("event buffer is full")]
    Full,
}
