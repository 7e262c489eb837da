use thiserror::Error;

pub mod capture;
pub mod codec;
pub mod encoded_string;
pub mod producer;

pub use capture::*;
pub use codec::{read_delimited, read_length_delimiter, write_delimited};
pub use encoded_string::{
    decode_string, decode_string_bytes, encode_string, EncodedName, ENCODED_NAME_CHUNKS,
};
pub use producer::*;

/// Version of the producer wire protocol and capture event schema.
pub const VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("decode error: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("encode error: {0}")]
    Encode(#[from] prost::EncodeError),
    #[error("message truncated")]
    Truncated,
    #[error("malformed length delimiter")]
    InvalidLength,
    #[error("frame of {len} bytes exceeds the limit of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
