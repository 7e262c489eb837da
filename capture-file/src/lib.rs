//! # capture-file - the Orbit capture file format
//!
//! ```text
//! offset 0           FileHeader (32 bytes)
//! capture section    varint length-delimited ClientCaptureEvent records,
//!                    zero padded to 8 bytes
//! sections           read-only additional sections, 8-byte aligned
//! section list       count:u64, count x { type:u64, offset:u64, size:u64 }
//! user data          at most one USER_DATA section, the only mutable one
//! ```
//!
//! All integers are little endian. [`CaptureFileOutputStream`] produces the
//! capture section while a capture is running; [`CaptureFile`] reads it back
//! and manages the additional sections afterwards.

use protocol::ProtocolError;
use thiserror::Error;

pub mod capture_file;
pub mod header;
pub mod input_stream;
pub mod output_stream;
pub mod section;
pub mod user_data;

pub use capture_file::CaptureFile;
pub use header::{FileHeader, FILE_SIGNATURE, FILE_VERSION, HEADER_SIZE};
pub use input_stream::ProtoSectionInputStream;
pub use output_stream::CaptureFileOutputStream;
pub use section::{
    SectionDescriptor, MAX_NUMBER_OF_SECTIONS, SECTION_DESCRIPTOR_SIZE, SECTION_TYPE_USER_DATA,
};
pub use user_data::write_user_data;

#[derive(Error, Debug)]
pub enum CaptureFileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Malformed(String),
    #[error("Incompatible version {found}, expected {expected}")]
    VersionMismatch { found: u32, expected: u32 },
    #[error("{0}")]
    InvariantViolation(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("Unexpected end of section")]
    EndOfSection,
    #[error("output stream is in a failed state: {0}")]
    StreamFailed(String),
}

impl From<ProtocolError> for CaptureFileError {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::Io(e) => CaptureFileError::Io(e),
            other => CaptureFileError::Malformed(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CaptureFileError>;

pub(crate) fn align_to_8(value: u64) -> u64 {
    (value + 7) & !7
}

/// Reads into `buf` at `offset` until it is full or the file ends. Returns
/// the number of bytes read.
pub(crate) fn read_at_most(file: &std::fs::File, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
    use std::os::unix::fs::FileExt;

    let mut filled = 0;
    while filled < buf.len() {
        match file.read_at(&mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

pub(crate) fn le_u32_at(bytes: &[u8], at: usize) -> u32 {
    let mut value = [0u8; 4];
    value.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(value)
}

pub(crate) fn le_u64_at(bytes: &[u8], at: usize) -> u64 {
    let mut value = [0u8; 8];
    value.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(value)
}
