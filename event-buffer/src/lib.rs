//! # event-buffer - bounded blocking FIFO
//!
//! Hands capture events from the producer-side server to the event
//! processor. Every handle is a cheap clone of the same queue. Pushing into a
//! full buffer blocks until the consumer makes room, which is how slow
//! consumers apply backpressure all the way to the producers' sockets.
//!
//! ```rust
//! use event_buffer::EventBuffer;
//!
//! let buffer = EventBuffer::new(16)?;
//! let consumer = buffer.clone();
//!
//! buffer.push(1u64)?;
//! buffer.push(2u64)?;
//! buffer.close();
//!
//! let drained: Vec<u64> = consumer.iter().collect();
//! assert_eq!(drained, vec![1, 2]);
//! # Ok::<(), event_buffer::EventBufferError>(())
//! ```
//!
//! Closing the buffer wakes every blocked caller. Pushes after close fail
//! with [`EventBufferError::Closed`]; pops keep returning queued items until
//! the buffer is empty and then return `None`.

pub use buffer::{EventBuffer, Iter};
pub use error::EventBufferError;

pub mod buffer;
pub mod error;

pub type Result<T> = std::result::Result<T, EventBufferError>;
