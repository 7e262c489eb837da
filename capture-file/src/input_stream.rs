use prost::Message;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::os::unix::fs::FileExt;

use crate::{CaptureFileError, Result};

/// `Read` over the byte range `[position, end)` of a file, independent of the
/// file cursor so several readers can share one descriptor.
struct SectionReader {
    file: File,
    position: u64,
    end: u64,
}

impl Read for SectionReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.end.saturating_sub(self.position);
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let len = buf.len().min(remaining.min(usize::MAX as u64) as usize);
        let read = self.file.read_at(&mut buf[..len], self.position)?;
        self.position += read as u64;
        Ok(read)
    }
}

/// Sequential reader of length-delimited messages stored in one section.
pub struct ProtoSectionInputStream {
    reader: BufReader<SectionReader>,
    max_message_size: usize,
}

impl ProtoSectionInputStream {
    pub(crate) fn new(file: File, offset: u64, size: u64) -> Self {
        ProtoSectionInputStream {
            reader: BufReader::with_capacity(
                64 * 1024,
                SectionReader {
                    file,
                    position: offset,
                    end: offset + size,
                },
            ),
            max_message_size: size.min(usize::MAX as u64) as usize,
        }
    }

    /// Reads the next message. A zero length record (section padding) yields
    /// an empty message. Returns [`CaptureFileError::EndOfSection`] once the
    /// section is exhausted.
    pub fn read_message<M: Message + Default>(&mut self) -> Result<M> {
        match protocol::read_delimited(&mut self.reader, self.max_message_size)? {
            Some(message) => Ok(message),
            None => Err(CaptureFileError::EndOfSection),
        }
    }
}
