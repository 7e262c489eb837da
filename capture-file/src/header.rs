use std::fs::File;

use crate::{le_u32_at, le_u64_at, read_at_most, CaptureFileError, Result};

pub const FILE_SIGNATURE: [u8; 4] = *b"ORBT";
pub const FILE_VERSION: u32 = 1;
pub const HEADER_SIZE: u64 = 32;

/// Byte offset of `section_list_offset` within the header.
pub(crate) const SECTION_LIST_OFFSET_POSITION: u64 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u32,
    pub capture_section_offset: u64,
    /// Zero until the capture section has been finalised.
    pub section_list_offset: u64,
}

impl Default for FileHeader {
    fn default() -> Self {
        FileHeader {
            version: FILE_VERSION,
            capture_section_offset: HEADER_SIZE,
            section_list_offset: 0,
        }
    }
}

impl FileHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE as usize] {
        let mut bytes = [0u8; HEADER_SIZE as usize];
        bytes[0..4].copy_from_slice(&FILE_SIGNATURE);
        bytes[4..8].copy_from_slice(&self.version.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.capture_section_offset.to_le_bytes());
        bytes[16..24].copy_from_slice(&self.section_list_offset.to_le_bytes());
        bytes
    }

    pub fn read_from(file: &File) -> Result<Self> {
        let mut bytes = [0u8; HEADER_SIZE as usize];
        let read = read_at_most(file, 0, &mut bytes)?;

        if read < FILE_SIGNATURE.len() {
            return Err(CaptureFileError::Malformed(
                "Failed to read the file signature".to_string(),
            ));
        }
        if bytes[0..4] != FILE_SIGNATURE {
            return Err(CaptureFileError::Malformed(
                "Invalid file signature".to_string(),
            ));
        }
        if read < 8 {
            return Err(CaptureFileError::Malformed(
                "Failed to read the file version".to_string(),
            ));
        }
        let version = le_u32_at(&bytes, 4);
        if version != FILE_VERSION {
            return Err(CaptureFileError::VersionMismatch {
                found: version,
                expected: FILE_VERSION,
            });
        }
        if read < HEADER_SIZE as usize {
            return Err(CaptureFileError::Malformed(
                "Failed to read the file header".to_string(),
            ));
        }

        let header = FileHeader {
            version,
            capture_section_offset: le_u64_at(&bytes, 8),
            section_list_offset: le_u64_at(&bytes, 16),
        };

        if header.capture_section_offset < HEADER_SIZE {
            return Err(CaptureFileError::Malformed(format!(
                "Capture section offset {} overlaps the file header",
                header.capture_section_offset
            )));
        }
        if header.section_list_offset != 0
            && (header.section_list_offset < header.capture_section_offset
                || header.section_list_offset % 8 != 0)
        {
            return Err(CaptureFileError::Malformed(format!(
                "Invalid section list offset {}",
                header.section_list_offset
            )));
        }
        Ok(header)
    }
}
