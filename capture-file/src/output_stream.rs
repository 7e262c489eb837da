use protocol::ClientCaptureEvent;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::header::{FileHeader, SECTION_LIST_OFFSET_POSITION};
use crate::section::encode_section_list;
use crate::{align_to_8, CaptureFileError, Result, HEADER_SIZE};

const WRITE_BUFFER_SIZE: usize = 1 << 20;

enum State {
    Open(BufWriter<File>),
    Failed(String),
    Closed,
}

/// Writes the capture section of a new capture file.
///
/// The header is written with a zero section list offset, so a file whose
/// writer never reached [`close`](Self::close) can still be opened and read up
/// to its last complete event.
pub struct CaptureFileOutputStream {
    path: PathBuf,
    state: State,
    position: u64,
    events_written: u64,
}

impl CaptureFileOutputStream {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
        writer.write_all(&FileHeader::default().to_bytes())?;
        debug!(path = %path.display(), "created capture file");

        Ok(CaptureFileOutputStream {
            path,
            state: State::Open(writer),
            position: HEADER_SIZE,
            events_written: 0,
        })
    }

    /// Appends one event to the capture section.
    ///
    /// # Panics
    /// Panics if the stream was already closed.
    pub fn write_event(&mut self, event: &ClientCaptureEvent) -> Result<()> {
        let writer = match &mut self.state {
            State::Open(writer) => writer,
            State::Failed(message) => return Err(CaptureFileError::StreamFailed(message.clone())),
            State::Closed => panic!(
                "write_event on closed capture file output stream {}",
                self.path.display()
            ),
        };

        match protocol::write_delimited(writer, event) {
            Ok(written) => {
                self.position += written as u64;
                self.events_written += 1;
                Ok(())
            }
            Err(e) => {
                let error = CaptureFileError::from(e);
                warn!(path = %self.path.display(), error = %error, "capture file write failed");
                self.state = State::Failed(error.to_string());
                Err(error)
            }
        }
    }

    /// Pads the capture section, writes an empty section list, patches the
    /// header and syncs the file.
    pub fn close(&mut self) -> Result<()> {
        let writer = match std::mem::replace(&mut self.state, State::Closed) {
            State::Open(writer) => writer,
            State::Failed(message) => {
                self.state = State::Failed(message.clone());
                return Err(CaptureFileError::StreamFailed(message));
            }
            State::Closed => return Ok(()),
        };

        if let Err(e) = self.finalize(writer) {
            self.state = State::Failed(e.to_string());
            return Err(e);
        }
        debug!(
            path = %self.path.display(),
            events = self.events_written,
            bytes = self.position,
            "closed capture file"
        );
        Ok(())
    }

    fn finalize(&mut self, mut writer: BufWriter<File>) -> Result<()> {
        let section_list_offset = align_to_8(self.position);
        let padding = (section_list_offset - self.position) as usize;
        writer.write_all(&[0u8; 8][..padding])?;
        writer.write_all(&encode_section_list(&[]))?;

        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.write_all_at(
            &section_list_offset.to_le_bytes(),
            SECTION_LIST_OFFSET_POSITION,
        )?;
        file.sync_all()?;
        self.position = section_list_offset;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, State::Open(_))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn events_written(&self) -> u64 {
        self.events_written
    }
}

impl Drop for CaptureFileOutputStream {
    fn drop(&mut self) {
        if let State::Open(writer) = &mut self.state {
            if let Err(e) = writer.flush() {
                warn!(path = %self.path.display(), error = ?e, "failed to flush unclosed capture file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CaptureFile;
    use protocol::{CaptureFinished, ThreadName};
    use rstest::*;
    use tempfile::TempDir;

    #[fixture]
    fn dir() -> TempDir {
        TempDir::new().unwrap()
    }

    #[rstest]
    fn test_new_file_has_in_flight_header(dir: TempDir) {
        let path = dir.path().join("in_flight.orbit");
        let stream = CaptureFileOutputStream::create(&path).unwrap();
        assert!(stream.is_open());
        drop(stream);

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len() as u64, HEADER_SIZE);
        assert_eq!(&bytes[0..4], b"ORBT");
        assert_eq!(&bytes[16..24], &[0u8; 8]);
    }

    #[rstest]
    fn test_close_writes_aligned_empty_section_list(dir: TempDir) {
        let path = dir.path().join("closed.orbit");
        let mut stream = CaptureFileOutputStream::create(&path).unwrap();
        stream
            .write_event(
                &ThreadName {
                    pid: 1,
                    tid: 1,
                    name: "odd".to_string(),
                    timestamp_ns: 5,
                }
                .into(),
            )
            .unwrap();
        stream
            .write_event(&CaptureFinished::successful().into())
            .unwrap();
        assert_eq!(stream.events_written(), 2);
        stream.close().unwrap();
        stream.close().unwrap();
        assert!(!stream.is_open());

        let capture_file = CaptureFile::open_for_read_write(&path).unwrap();
        let list_offset = capture_file.header().section_list_offset;
        assert_eq!(list_offset % 8, 0);
        assert_eq!(
            std::fs::metadata(&path).unwrap().len(),
            list_offset + 8
        );
    }

    #[rstest]
    #[should_panic(expected = "closed capture file output stream")]
    fn test_write_after_close_panics(dir: TempDir) {
        let path = dir.path().join("closed.orbit");
        let mut stream = CaptureFileOutputStream::create(&path).unwrap();
        stream.close().unwrap();
        let _ = stream.write_event(&CaptureFinished::successful().into());
    }

    #[rstest]
    fn test_create_in_missing_directory_fails(dir: TempDir) {
        let path = dir.path().join("missing").join("capture.orbit");
        assert!(matches!(
            CaptureFileOutputStream::create(&path),
            Err(CaptureFileError::Io(_))
        ));
    }
}
