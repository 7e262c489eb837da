use parking_lot::Mutex;
use prost::Message;
use protocol::UserDefinedCaptureInfo;
use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::header::{FileHeader, SECTION_LIST_OFFSET_POSITION};
use crate::section::{
    encode_section_list, read_section_list, section_list_size, validate_layout,
    SectionDescriptor, MAX_NUMBER_OF_SECTIONS, SECTION_TYPE_USER_DATA,
};
use crate::{align_to_8, CaptureFileError, ProtoSectionInputStream, Result};

const COPY_CHUNK_SIZE: usize = 1 << 20;

struct Inner {
    file: File,
    header: FileHeader,
    sections: Vec<SectionDescriptor>,
    file_len: u64,
}

impl Inner {
    fn capture_section_end(&self) -> u64 {
        if self.header.section_list_offset == 0 {
            return self.file_len;
        }
        self.sections
            .iter()
            .filter(|section| !section.is_user_data())
            .map(|section| section.offset)
            .filter(|&offset| offset >= self.header.capture_section_offset)
            .fold(self.header.section_list_offset, u64::min)
    }

    fn user_data_index(&self) -> Option<usize> {
        self.sections.iter().position(SectionDescriptor::is_user_data)
    }

    fn check_mutable(&self) -> Result<()> {
        if self.header.section_list_offset == 0 {
            return Err(CaptureFileError::InvariantViolation(
                "The capture section was never finalized, the file has no section list".to_string(),
            ));
        }
        validate_layout(&self.header, &self.sections, self.file_len)
            .map_err(CaptureFileError::InvariantViolation)
    }

    fn check_capacity(&self) -> Result<()> {
        if self.sections.len() as u64 >= MAX_NUMBER_OF_SECTIONS {
            return Err(CaptureFileError::InvariantViolation(format!(
                "The section list is full ({} sections)",
                MAX_NUMBER_OF_SECTIONS
            )));
        }
        Ok(())
    }

    fn set_len(&mut self, len: u64) -> Result<()> {
        self.file.set_len(len)?;
        self.file_len = len;
        Ok(())
    }

    /// Copies `size` bytes from `from` to `to`. Overlapping ranges are
    /// handled by copying back to front when moving towards the end.
    fn copy_range(&self, from: u64, to: u64, size: u64) -> Result<()> {
        let mut buf = vec![0u8; (size as usize).min(COPY_CHUNK_SIZE)];
        let mut remaining = size;
        let mut copied = 0u64;
        while remaining > 0 {
            let len = (remaining as usize).min(buf.len());
            let at = if to > from { remaining - len as u64 } else { copied };
            self.file.read_exact_at(&mut buf[..len], from + at)?;
            self.file.write_all_at(&buf[..len], to + at)?;
            remaining -= len as u64;
            copied += len as u64;
        }
        Ok(())
    }

    fn zero_range(&self, offset: u64, size: u64) -> Result<()> {
        let zeros = vec![0u8; (size as usize).min(COPY_CHUNK_SIZE)];
        let mut written = 0u64;
        while written < size {
            let len = ((size - written) as usize).min(zeros.len());
            self.file.write_all_at(&zeros[..len], offset + written)?;
            written += len as u64;
        }
        Ok(())
    }

    fn section(&self, index: usize) -> SectionDescriptor {
        match self.sections.get(index) {
            Some(section) => *section,
            None => panic!(
                "section index {} out of range ({} sections)",
                index,
                self.sections.len()
            ),
        }
    }
}

/// A finished capture file opened for reading and for managing its
/// additional sections.
///
/// Mutations follow the same order everywhere: new payload bytes first, then
/// the section list, then the header. Only the header patch switches the
/// file over to a relocated section list.
pub struct CaptureFile {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl CaptureFile {
    pub fn open_for_read_write(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::options().read(true).write(true).open(&path)?;
        let file_len = file.metadata()?.len();

        let header = FileHeader::read_from(&file)?;
        if header.capture_section_offset > file_len {
            return Err(CaptureFileError::Malformed(format!(
                "Capture section offset {} is beyond the end of the file",
                header.capture_section_offset
            )));
        }
        if header.section_list_offset > file_len {
            return Err(CaptureFileError::Malformed(format!(
                "Section list offset {} is beyond the end of the file",
                header.section_list_offset
            )));
        }

        let sections = if header.section_list_offset == 0 {
            debug!(path = %path.display(), "capture file has no section list");
            Vec::new()
        } else {
            let sections = read_section_list(&file, header.section_list_offset, file_len)?;
            validate_layout(&header, &sections, file_len).map_err(CaptureFileError::Malformed)?;
            sections
        };

        Ok(CaptureFile {
            path,
            inner: Mutex::new(Inner {
                file,
                header,
                sections,
                file_len,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> FileHeader {
        self.inner.lock().header
    }

    pub fn section_list(&self) -> Vec<SectionDescriptor> {
        self.inner.lock().sections.clone()
    }

    pub fn find_section_by_type(&self, section_type: u64) -> Option<usize> {
        self.inner
            .lock()
            .sections
            .iter()
            .position(|section| section.section_type == section_type)
    }

    pub fn find_all_sections_by_type(&self, section_type: u64) -> Vec<usize> {
        self.inner
            .lock()
            .sections
            .iter()
            .enumerate()
            .filter(|(_, section)| section.section_type == section_type)
            .map(|(index, _)| index)
            .collect()
    }

    pub fn create_capture_section_input_stream(&self) -> Result<ProtoSectionInputStream> {
        let inner = self.inner.lock();
        let offset = inner.header.capture_section_offset;
        let end = inner.capture_section_end();
        Ok(ProtoSectionInputStream::new(
            inner.file.try_clone()?,
            offset,
            end.saturating_sub(offset),
        ))
    }

    /// # Panics
    /// Panics if `index` is out of range.
    pub fn create_proto_section_input_stream(&self, index: usize) -> Result<ProtoSectionInputStream> {
        let inner = self.inner.lock();
        let section = inner.section(index);
        Ok(ProtoSectionInputStream::new(
            inner.file.try_clone()?,
            section.offset,
            section.size,
        ))
    }

    /// Fills `buf` from `offset` within section `index`.
    ///
    /// # Panics
    /// Panics if `index` is out of range or the read crosses the end of the
    /// section.
    pub fn read_from_section(&self, index: usize, offset: u64, buf: &mut [u8]) -> Result<()> {
        let inner = self.inner.lock();
        let section = inner.section(index);
        assert!(
            offset
                .checked_add(buf.len() as u64)
                .is_some_and(|end| end <= section.size),
            "read of {} bytes at offset {} exceeds section {} of size {}",
            buf.len(),
            offset,
            index,
            section.size
        );
        inner.file.read_exact_at(buf, section.offset + offset)?;
        Ok(())
    }

    /// Writes `buf` at `offset` within section `index`.
    ///
    /// # Panics
    /// Panics if `index` is out of range or the write crosses the end of the
    /// section.
    pub fn write_to_section(&self, index: usize, offset: u64, buf: &[u8]) -> Result<()> {
        let inner = self.inner.lock();
        let section = inner.section(index);
        assert!(
            offset
                .checked_add(buf.len() as u64)
                .is_some_and(|end| end <= section.size),
            "write of {} bytes at offset {} exceeds section {} of size {}",
            buf.len(),
            offset,
            index,
            section.size
        );
        inner.file.write_all_at(buf, section.offset + offset)?;
        Ok(())
    }

    /// Adds a zero-filled read-only section of `size` bytes and returns its
    /// index.
    ///
    /// The new section takes the place of the current section list, right
    /// after the last read-only section. The section list follows it and the
    /// user data section, if present, is moved behind the new list. Existing
    /// read-only sections keep their order; user data stays the last entry of
    /// the list.
    pub fn add_additional_section(&self, section_type: u64, size: u64) -> Result<usize> {
        if section_type == SECTION_TYPE_USER_DATA {
            return Err(CaptureFileError::InvalidArgument(
                "Cannot add a user data section as an additional (read only) section.".to_string(),
            ));
        }

        let mut inner = self.inner.lock();
        inner.check_mutable()?;
        inner.check_capacity()?;

        let old_list_offset = inner.header.section_list_offset;
        let new_section = SectionDescriptor {
            section_type,
            offset: old_list_offset,
            size,
        };

        let mut sections: Vec<SectionDescriptor> = inner
            .sections
            .iter()
            .filter(|section| !section.is_user_data())
            .copied()
            .collect();
        let index = sections.len();
        sections.push(new_section);

        let list_offset = align_to_8(new_section.end());
        let list_end = list_offset + section_list_size(inner.sections.len() + 1);
        let mut new_len = list_end;

        let user_data = inner.user_data_index().map(|i| inner.sections[i]);
        if let Some(old) = user_data {
            let relocated = SectionDescriptor {
                offset: align_to_8(list_end),
                ..old
            };
            new_len = relocated.end();
            sections.push(relocated);
        }

        if new_len > inner.file_len {
            inner.set_len(new_len)?;
        }
        if let Some(old) = user_data {
            let relocated = sections[sections.len() - 1];
            inner.copy_range(old.offset, relocated.offset, old.size)?;
        }
        inner
            .file
            .write_all_at(&encode_section_list(&sections), list_offset)?;
        inner
            .file
            .write_all_at(&list_offset.to_le_bytes(), SECTION_LIST_OFFSET_POSITION)?;

        // The new section starts out zero filled; it covers the old list.
        inner.zero_range(new_section.offset, list_offset - new_section.offset)?;
        if new_len < inner.file_len {
            inner.set_len(new_len)?;
        }

        inner.header.section_list_offset = list_offset;
        inner.sections = sections;
        debug!(
            path = %self.path.display(),
            section_type,
            size,
            index,
            "added capture file section"
        );
        Ok(index)
    }

    /// Creates the zero-filled user data section right after the section
    /// list and returns its index.
    pub fn add_user_data_section(&self, size: u64) -> Result<usize> {
        let mut inner = self.inner.lock();
        if inner.user_data_index().is_some() {
            return Err(CaptureFileError::InvalidArgument(
                "The capture file already contains a user data section".to_string(),
            ));
        }
        inner.check_mutable()?;
        inner.check_capacity()?;

        let list_offset = inner.header.section_list_offset;
        let list_end = list_offset + section_list_size(inner.sections.len() + 1);
        let user_data = SectionDescriptor {
            section_type: SECTION_TYPE_USER_DATA,
            offset: align_to_8(list_end.max(inner.file_len)),
            size,
        };

        let mut sections = inner.sections.clone();
        sections.push(user_data);

        inner.set_len(user_data.end())?;
        inner
            .file
            .write_all_at(&encode_section_list(&sections), list_offset)?;
        inner.sections = sections;
        debug!(path = %self.path.display(), size, "added user data section");
        Ok(inner.sections.len() - 1)
    }

    /// Resizes section `index` to `new_size` bytes. Only the last section in
    /// the file, the user data section, can be resized.
    pub fn extend_section(&self, index: usize, new_size: u64) -> Result<()> {
        let mut inner = self.inner.lock();
        let Some(&section) = inner.sections.get(index) else {
            return Err(CaptureFileError::InvalidArgument(format!(
                "Section index {} out of range ({} sections)",
                index,
                inner.sections.len()
            )));
        };

        let is_last = section.offset > inner.header.section_list_offset
            && inner.sections.iter().all(|other| other.offset <= section.offset);
        if !is_last {
            return Err(CaptureFileError::InvalidArgument(format!(
                "Section {} is not the last section in the file and cannot be resized",
                index
            )));
        }

        let mut sections = inner.sections.clone();
        sections[index].size = new_size;
        let list = encode_section_list(&sections);
        let list_offset = inner.header.section_list_offset;

        if new_size >= section.size {
            inner.set_len(section.offset + new_size)?;
            inner.file.write_all_at(&list, list_offset)?;
        } else {
            inner.file.write_all_at(&list, list_offset)?;
            inner.set_len(section.offset + new_size)?;
        }
        inner.sections = sections;
        Ok(())
    }

    /// Decodes the user data section, `None` if the file has none.
    pub fn read_user_data(&self) -> Result<Option<UserDefinedCaptureInfo>> {
        let Some(index) = self.find_section_by_type(SECTION_TYPE_USER_DATA) else {
            return Ok(None);
        };
        let mut stream = self.create_proto_section_input_stream(index)?;
        let info = stream.read_message::<UserDefinedCaptureInfo>()?;
        Ok(Some(info))
    }

    /// Serialises `info` into the user data section, creating or resizing
    /// it as needed. The section always holds exactly one payload.
    pub fn write_user_data(&self, info: &UserDefinedCaptureInfo) -> Result<()> {
        let payload = info.encode_length_delimited_to_vec();
        let size = payload.len() as u64;
        let index = match self.find_section_by_type(SECTION_TYPE_USER_DATA) {
            Some(index) => {
                self.extend_section(index, size)?;
                index
            }
            None => self.add_user_data_section(size)?,
        };
        self.write_to_section(index, 0, &payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CaptureFileOutputStream, HEADER_SIZE};
    use protocol::{
        ApiScopeStart, ApiScopeStop, CaptureFinished, CaptureStarted, ClientCaptureEvent,
        ThreadName,
    };
    use rstest::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const SECTION_TYPE_TEST: u64 = 0x7f;

    struct TestCapture {
        _dir: TempDir,
        path: PathBuf,
        events: Vec<ClientCaptureEvent>,
    }

    fn sample_events() -> Vec<ClientCaptureEvent> {
        vec![
            CaptureStarted {
                pid: 42,
                executable_path: "/usr/bin/game".to_string(),
                capture_start_timestamp_ns: 1,
                ..Default::default()
            }
            .into(),
            ThreadName {
                pid: 42,
                tid: 43,
                name: "main".to_string(),
                timestamp_ns: 2,
            }
            .into(),
            ApiScopeStart::new(42, 43, 3, "Some short string", 0, 0, 0).into(),
            ApiScopeStop::new(42, 43, 4).into(),
            CaptureFinished::successful().into(),
        ]
    }

    fn write_capture(events: &[ClientCaptureEvent], close: bool) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.orbit");
        let mut stream = CaptureFileOutputStream::create(&path).unwrap();
        for event in events {
            stream.write_event(event).unwrap();
        }
        if close {
            stream.close().unwrap();
            assert!(!stream.is_open());
        }
        (dir, path)
    }

    #[fixture]
    fn capture() -> TestCapture {
        let events = sample_events();
        let (dir, path) = write_capture(&events, true);
        TestCapture {
            _dir: dir,
            path,
            events,
        }
    }

    fn read_all(capture_file: &CaptureFile) -> (Vec<ClientCaptureEvent>, usize) {
        let mut stream = capture_file.create_capture_section_input_stream().unwrap();
        let mut events = Vec::new();
        let mut empty = 0;
        loop {
            match stream.read_message::<ClientCaptureEvent>() {
                Ok(event) if event.event.is_none() => empty += 1,
                Ok(event) => events.push(event),
                Err(CaptureFileError::EndOfSection) => break,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        (events, empty)
    }

    fn section_bytes(capture_file: &CaptureFile, index: usize) -> Vec<u8> {
        let size = capture_file.section_list()[index].size as usize;
        let mut buf = vec![0u8; size];
        capture_file.read_from_section(index, 0, &mut buf).unwrap();
        buf
    }

    #[rstest]
    fn test_capture_section_round_trip(capture: TestCapture) {
        let capture_file = CaptureFile::open_for_read_write(&capture.path).unwrap();
        assert_eq!(capture_file.header().capture_section_offset, HEADER_SIZE);
        assert_ne!(capture_file.header().section_list_offset, 0);
        assert_eq!(capture_file.header().section_list_offset % 8, 0);
        assert!(capture_file.section_list().is_empty());

        let (events, empty) = read_all(&capture_file);
        assert_eq!(events, capture.events);
        assert!(empty <= 7);
    }

    #[rstest]
    fn test_reading_past_end_reports_end_of_section(capture: TestCapture) {
        let capture_file = CaptureFile::open_for_read_write(&capture.path).unwrap();
        let mut stream = capture_file.create_capture_section_input_stream().unwrap();
        for _ in 0..capture.events.len() {
            stream.read_message::<ClientCaptureEvent>().unwrap();
        }
        let mut padding = 0;
        let error = loop {
            match stream.read_message::<ClientCaptureEvent>() {
                Ok(event) => {
                    assert!(event.event.is_none());
                    padding += 1;
                }
                Err(e) => break e,
            }
        };
        assert!(padding <= 7);
        assert_eq!(error.to_string(), "Unexpected end of section");
    }

    #[test]
    fn test_unclosed_capture_is_readable() {
        let events = sample_events();
        let (_dir, path) = write_capture(&events[..3], false);

        let capture_file = CaptureFile::open_for_read_write(&path).unwrap();
        assert_eq!(capture_file.header().section_list_offset, 0);
        let (read, empty) = read_all(&capture_file);
        assert_eq!(read, events[..3]);
        assert_eq!(empty, 0);
    }

    #[rstest]
    fn test_user_data_section_lifecycle(capture: TestCapture) {
        let capture_file = CaptureFile::open_for_read_write(&capture.path).unwrap();
        assert!(capture_file
            .find_section_by_type(SECTION_TYPE_USER_DATA)
            .is_none());

        let index = capture_file.add_user_data_section(9).unwrap();
        assert_eq!(index, 0);
        capture_file.write_to_section(index, 0, b"something").unwrap();
        assert_eq!(section_bytes(&capture_file, index), b"something");

        capture_file.extend_section(index, 18).unwrap();
        capture_file.write_to_section(index, 9, b" and more").unwrap();
        drop(capture_file);

        let reopened = CaptureFile::open_for_read_write(&capture.path).unwrap();
        let index = reopened
            .find_section_by_type(SECTION_TYPE_USER_DATA)
            .unwrap();
        assert_eq!(section_bytes(&reopened, index), b"something and more");
        assert_eq!(read_all(&reopened).0, capture.events);
    }

    #[rstest]
    fn test_second_user_data_section_rejected(capture: TestCapture) {
        let capture_file = CaptureFile::open_for_read_write(&capture.path).unwrap();
        capture_file.add_user_data_section(8).unwrap();
        assert!(matches!(
            capture_file.add_user_data_section(8),
            Err(CaptureFileError::InvalidArgument(_))
        ));
    }

    #[rstest]
    fn test_user_data_cannot_be_added_as_additional_section(capture: TestCapture) {
        let capture_file = CaptureFile::open_for_read_write(&capture.path).unwrap();
        let error = capture_file
            .add_additional_section(SECTION_TYPE_USER_DATA, 8)
            .unwrap_err();
        assert_eq!(
            error.to_string(),
            "Cannot add a user data section as an additional (read only) section."
        );
    }

    #[rstest]
    fn test_additional_section_relocates_user_data(capture: TestCapture) {
        let capture_file = CaptureFile::open_for_read_write(&capture.path).unwrap();
        let user_data = capture_file.add_user_data_section(9).unwrap();
        capture_file.write_to_section(user_data, 0, b"something").unwrap();

        let first = capture_file.add_additional_section(SECTION_TYPE_TEST, 3).unwrap();
        capture_file.write_to_section(first, 0, b"abc").unwrap();
        let second = capture_file.add_additional_section(SECTION_TYPE_TEST + 1, 16).unwrap();
        assert_eq!((first, second), (0, 1));

        let sections = capture_file.section_list();
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[2].section_type, SECTION_TYPE_USER_DATA);
        assert!(sections[2].offset > capture_file.header().section_list_offset);
        assert_eq!(section_bytes(&capture_file, 2), b"something");
        drop(capture_file);

        let reopened = CaptureFile::open_for_read_write(&capture.path).unwrap();
        assert_eq!(reopened.section_list(), sections);
        assert_eq!(section_bytes(&reopened, 0), b"abc");
        assert_eq!(section_bytes(&reopened, 1), vec![0u8; 16]);
        assert_eq!(section_bytes(&reopened, 2), b"something");
        assert_eq!(
            reopened.find_all_sections_by_type(SECTION_TYPE_TEST),
            vec![0]
        );
        assert_eq!(read_all(&reopened).0, capture.events);
    }

    #[rstest]
    fn test_additional_section_takes_the_old_list_place(capture: TestCapture) {
        let capture_file = CaptureFile::open_for_read_write(&capture.path).unwrap();
        capture_file
            .write_user_data(&UserDefinedCaptureInfo::with_frame_tracks(0..32))
            .unwrap();
        let old_list_offset = capture_file.header().section_list_offset;
        let user_data_size = capture_file.section_list()[0].size;

        let first = capture_file.add_additional_section(SECTION_TYPE_TEST, 24).unwrap();
        let second = capture_file.add_additional_section(SECTION_TYPE_TEST, 40).unwrap();

        let sections = capture_file.section_list();
        assert_eq!(sections[first].offset, old_list_offset);
        assert_eq!(sections[second].offset, sections[first].end());
        let list_offset = capture_file.header().section_list_offset;
        assert_eq!(list_offset, sections[second].end());

        let expected_len =
            align_to_8(list_offset + section_list_size(sections.len())) + user_data_size;
        assert_eq!(std::fs::metadata(&capture.path).unwrap().len(), expected_len);
        assert_eq!(section_bytes(&capture_file, first), vec![0u8; 24]);
        assert_eq!(
            capture_file.read_user_data().unwrap(),
            Some(UserDefinedCaptureInfo::with_frame_tracks(0..32))
        );
    }

    #[rstest]
    fn test_capture_section_bytes_survive_section_updates(capture: TestCapture) {
        let original = std::fs::read(&capture.path).unwrap();
        let list_offset = CaptureFile::open_for_read_write(&capture.path)
            .unwrap()
            .header()
            .section_list_offset as usize;
        let capture_section = &original[HEADER_SIZE as usize..list_offset];

        crate::write_user_data(&capture.path, &UserDefinedCaptureInfo::with_frame_tracks([1]))
            .unwrap();
        crate::write_user_data(
            &capture.path,
            &UserDefinedCaptureInfo::with_frame_tracks([1, 2, 3]),
        )
        .unwrap();
        let capture_file = CaptureFile::open_for_read_write(&capture.path).unwrap();
        capture_file.add_additional_section(SECTION_TYPE_TEST, 16).unwrap();
        drop(capture_file);

        let updated = std::fs::read(&capture.path).unwrap();
        assert_eq!(&updated[HEADER_SIZE as usize..list_offset], capture_section);

        let reopened = CaptureFile::open_for_read_write(&capture.path).unwrap();
        assert_eq!(
            reopened.read_user_data().unwrap(),
            Some(UserDefinedCaptureInfo::with_frame_tracks([1, 2, 3]))
        );
        assert_eq!(read_all(&reopened).0, capture.events);
    }

    #[rstest]
    #[case::finalized(true)]
    #[case::unfinished(false)]
    fn test_open_and_close_leave_file_unchanged(#[case] close: bool) {
        let (_dir, path) = write_capture(&sample_events(), close);
        let before = std::fs::read(&path).unwrap();

        for _ in 0..2 {
            let capture_file = CaptureFile::open_for_read_write(&path).unwrap();
            read_all(&capture_file);
            drop(capture_file);
            assert_eq!(std::fs::read(&path).unwrap(), before);
        }
    }

    #[rstest]
    fn test_read_only_sections_cannot_be_extended(capture: TestCapture) {
        let capture_file = CaptureFile::open_for_read_write(&capture.path).unwrap();
        let index = capture_file.add_additional_section(SECTION_TYPE_TEST, 8).unwrap();
        assert!(matches!(
            capture_file.extend_section(index, 16),
            Err(CaptureFileError::InvalidArgument(_))
        ));
    }

    #[rstest]
    fn test_section_list_full_leaves_file_untouched(capture: TestCapture) {
        let capture_file = CaptureFile::open_for_read_write(&capture.path).unwrap();
        for i in 0..MAX_NUMBER_OF_SECTIONS {
            capture_file
                .add_additional_section(SECTION_TYPE_TEST + i, 0)
                .unwrap();
        }
        let len_before = std::fs::metadata(&capture.path).unwrap().len();
        let header_before = capture_file.header();

        let error = capture_file
            .add_additional_section(SECTION_TYPE_TEST, 8)
            .unwrap_err();
        assert!(matches!(error, CaptureFileError::InvariantViolation(_)));
        assert_eq!(std::fs::metadata(&capture.path).unwrap().len(), len_before);
        assert_eq!(capture_file.header(), header_before);
        assert_eq!(
            capture_file.section_list().len() as u64,
            MAX_NUMBER_OF_SECTIONS
        );
    }

    #[rstest]
    fn test_write_user_data_rewrites_payload(capture: TestCapture) {
        let capture_file = CaptureFile::open_for_read_write(&capture.path).unwrap();
        let large = UserDefinedCaptureInfo::with_frame_tracks(0..64);
        let small = UserDefinedCaptureInfo::with_frame_tracks([7]);

        capture_file.write_user_data(&large).unwrap();
        assert_eq!(capture_file.read_user_data().unwrap(), Some(large));
        capture_file.write_user_data(&small).unwrap();
        assert_eq!(capture_file.read_user_data().unwrap(), Some(small.clone()));
        drop(capture_file);

        let reopened = CaptureFile::open_for_read_write(&capture.path).unwrap();
        assert_eq!(reopened.read_user_data().unwrap(), Some(small));
        assert_eq!(
            reopened.find_all_sections_by_type(SECTION_TYPE_USER_DATA).len(),
            1
        );
    }

    #[rstest]
    #[should_panic(expected = "exceeds section")]
    fn test_read_beyond_section_panics(capture: TestCapture) {
        let capture_file = CaptureFile::open_for_read_write(&capture.path).unwrap();
        let index = capture_file.add_user_data_section(4).unwrap();
        let mut buf = [0u8; 5];
        let _ = capture_file.read_from_section(index, 0, &mut buf);
    }

    #[rstest]
    #[should_panic(expected = "exceeds section")]
    fn test_write_beyond_section_panics(capture: TestCapture) {
        let capture_file = CaptureFile::open_for_read_write(&capture.path).unwrap();
        let index = capture_file.add_user_data_section(4).unwrap();
        let _ = capture_file.write_to_section(index, 2, b"abc");
    }

    #[test]
    fn test_open_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("garbage.orbit");
        std::fs::write(&path, b"not a capture file at all, not even close").unwrap();
        let error = CaptureFile::open_for_read_write(&path).err().unwrap();
        assert_eq!(error.to_string(), "Invalid file signature");
    }

    #[test]
    fn test_open_rejects_oversized_section_list() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("large_list.orbit");
        let header = FileHeader {
            section_list_offset: 40,
            ..Default::default()
        };
        let mut bytes = header.to_bytes().to_vec();
        bytes.extend_from_slice(b"12345678");
        bytes.extend_from_slice(&65536u64.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();

        let error = CaptureFile::open_for_read_write(&path).err().unwrap();
        assert_eq!(error.to_string(), "The section list is too large");
    }

    #[rstest]
    #[case::near_u64_max(u64::MAX & !7)]
    #[case::past_end_of_file(4096)]
    fn test_open_rejects_section_list_offset_out_of_file(#[case] section_list_offset: u64) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad_offset.orbit");
        let header = FileHeader {
            section_list_offset,
            ..Default::default()
        };
        let mut bytes = header.to_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 16]);
        std::fs::write(&path, bytes).unwrap();

        let error = CaptureFile::open_for_read_write(&path).err().unwrap();
        assert!(matches!(error, CaptureFileError::Malformed(_)), "{error}");
    }

    #[test]
    fn test_truncated_event_is_malformed() {
        let events = sample_events();
        let (_dir, path) = write_capture(&events, false);
        let len = std::fs::metadata(&path).unwrap().len();
        let file = File::options().write(true).open(&path).unwrap();
        file.set_len(len - 1).unwrap();

        let capture_file = CaptureFile::open_for_read_write(&path).unwrap();
        let mut stream = capture_file.create_capture_section_input_stream().unwrap();
        for event in &events[..events.len() - 1] {
            assert_eq!(&stream.read_message::<ClientCaptureEvent>().unwrap(), event);
        }
        assert!(matches!(
            stream.read_message::<ClientCaptureEvent>(),
            Err(CaptureFileError::Malformed(_))
        ));
    }
}
