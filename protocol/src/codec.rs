//! Varint length-delimited framing shared by capture files and the
//! producer socket.

use bytes::BytesMut;
use prost::Message;
use std::io::{self, Read, Write};

use crate::{ProtocolError, Result};

/// Longest varint accepted as a length prefix.
pub const MAX_LENGTH_DELIMITER_LEN: usize = 5;

/// Writes `message` preceded by its varint length. Returns the number of
/// bytes written.
pub fn write_delimited<W, M>(writer: &mut W, message: &M) -> Result<usize>
where
    W: Write + ?Sized,
    M: Message,
{
    let len = message.encoded_len();
    let mut buf = BytesMut::with_capacity(len + prost::length_delimiter_len(len));
    message.encode_length_delimited(&mut buf)?;
    writer.write_all(&buf)?;
    Ok(buf.len())
}

/// Reads a varint length prefix. `Ok(None)` means the reader was exhausted
/// before the first byte.
pub fn read_length_delimiter<R: Read + ?Sized>(reader: &mut R) -> Result<Option<usize>> {
    let mut bytes = [0u8; MAX_LENGTH_DELIMITER_LEN];
    for i in 0..MAX_LENGTH_DELIMITER_LEN {
        match reader.read_exact(&mut bytes[i..=i]) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return if i == 0 {
                    Ok(None)
                } else {
                    Err(ProtocolError::Truncated)
                };
            }
            Err(e) => return Err(e.into()),
        }
        if bytes[i] & 0x80 == 0 {
            let len = prost::decode_length_delimiter(&bytes[..=i])?;
            return Ok(Some(len));
        }
    }
    Err(ProtocolError::InvalidLength)
}

/// Reads one length-delimited message. `Ok(None)` is a clean end of stream.
pub fn read_delimited<M, R>(reader: &mut R, max_len: usize) -> Result<Option<M>>
where
    M: Message + Default,
    R: Read + ?Sized,
{
    let Some(len) = read_length_delimiter(reader)? else {
        return Ok(None);
    };
    if len > max_len {
        return Err(ProtocolError::FrameTooLarge { len, max: max_len });
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => ProtocolError::Truncated,
        _ => ProtocolError::Io(e),
    })?;
    Ok(Some(M::decode(buf.as_slice())?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ApiScopeStop, ClientCaptureEvent, ThreadName};
    use rstest::*;
    use std::io::Cursor;

    #[fixture]
    fn thread_name() -> ClientCaptureEvent {
        ThreadName {
            pid: 10,
            tid: 11,
            name: "render".to_string(),
            timestamp_ns: 99,
        }
        .into()
    }

    #[rstest]
    fn test_write_then_read_sequence(thread_name: ClientCaptureEvent) {
        let stop: ClientCaptureEvent = ApiScopeStop::new(1, 2, 3).into();
        let mut buf = Vec::new();
        let first = write_delimited(&mut buf, &thread_name).unwrap();
        write_delimited(&mut buf, &stop).unwrap();
        assert_eq!(first, thread_name.encoded_len() + 1);

        let mut cursor = Cursor::new(buf);
        let a: ClientCaptureEvent = read_delimited(&mut cursor, 1024).unwrap().unwrap();
        let b: ClientCaptureEvent = read_delimited(&mut cursor, 1024).unwrap().unwrap();
        assert_eq!(a, thread_name);
        assert_eq!(b, stop);
        assert!(read_delimited::<ClientCaptureEvent, _>(&mut cursor, 1024)
            .unwrap()
            .is_none());
    }

    #[rstest]
    fn test_truncated_payload(thread_name: ClientCaptureEvent) {
        let mut buf = Vec::new();
        write_delimited(&mut buf, &thread_name).unwrap();
        buf.truncate(buf.len() - 2);
        let result = read_delimited::<ClientCaptureEvent, _>(&mut Cursor::new(buf), 1024);
        assert!(matches!(result, Err(ProtocolError::Truncated)));
    }

    #[test]
    fn test_truncated_length_prefix() {
        let result = read_length_delimiter(&mut Cursor::new(vec![0x80u8]));
        assert!(matches!(result, Err(ProtocolError::Truncated)));
    }

    #[test]
    fn test_overlong_length_prefix() {
        let result = read_length_delimiter(&mut Cursor::new(vec![0xffu8; 6]));
        assert!(matches!(result, Err(ProtocolError::InvalidLength)));
    }

    #[rstest]
    fn test_frame_size_limit(thread_name: ClientCaptureEvent) {
        let mut buf = Vec::new();
        write_delimited(&mut buf, &thread_name).unwrap();
        let result = read_delimited::<ClientCaptureEvent, _>(&mut Cursor::new(buf), 4);
        assert!(matches!(
            result,
            Err(ProtocolError::FrameTooLarge { max: 4, .. })
        ));
    }

    #[test]
    fn test_zero_length_frame_is_empty_message() {
        let message: ClientCaptureEvent = read_delimited(&mut Cursor::new(vec![0u8]), 16)
            .unwrap()
            .unwrap();
        assert!(message.event.is_none());
    }
}
