use std::fs::File;
use std::os::unix::fs::FileExt;

use crate::header::FileHeader;
use crate::{le_u64_at, CaptureFileError, Result, HEADER_SIZE};

pub const SECTION_TYPE_USER_DATA: u64 = 1;
pub const MAX_NUMBER_OF_SECTIONS: u64 = 1024;
pub const SECTION_DESCRIPTOR_SIZE: u64 = 24;

const SECTION_COUNT_SIZE: u64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionDescriptor {
    pub section_type: u64,
    pub offset: u64,
    pub size: u64,
}

impl SectionDescriptor {
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    pub fn is_user_data(&self) -> bool {
        self.section_type == SECTION_TYPE_USER_DATA
    }
}

/// Size in bytes of a section list with `count` entries.
pub fn section_list_size(count: usize) -> u64 {
    SECTION_COUNT_SIZE + SECTION_DESCRIPTOR_SIZE * count as u64
}

pub(crate) fn encode_section_list(sections: &[SectionDescriptor]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(section_list_size(sections.len()) as usize);
    bytes.extend_from_slice(&(sections.len() as u64).to_le_bytes());
    for section in sections {
        bytes.extend_from_slice(&section.section_type.to_le_bytes());
        bytes.extend_from_slice(&section.offset.to_le_bytes());
        bytes.extend_from_slice(&section.size.to_le_bytes());
    }
    bytes
}

pub(crate) fn read_section_list(
    file: &File,
    offset: u64,
    file_len: u64,
) -> Result<Vec<SectionDescriptor>> {
    let eof = || CaptureFileError::Malformed("Unexpected EOF while reading section list".to_string());

    match offset.checked_add(SECTION_COUNT_SIZE) {
        Some(end) if end <= file_len => {}
        _ => return Err(eof()),
    }
    let mut count_bytes = [0u8; SECTION_COUNT_SIZE as usize];
    file.read_exact_at(&mut count_bytes, offset)?;
    let count = u64::from_le_bytes(count_bytes);

    if count > MAX_NUMBER_OF_SECTIONS {
        return Err(CaptureFileError::Malformed(
            "The section list is too large".to_string(),
        ));
    }
    match offset.checked_add(section_list_size(count as usize)) {
        Some(end) if end <= file_len => {}
        _ => return Err(eof()),
    }

    let mut bytes = vec![0u8; (SECTION_DESCRIPTOR_SIZE * count) as usize];
    file.read_exact_at(&mut bytes, offset + SECTION_COUNT_SIZE)?;

    Ok(bytes
        .chunks_exact(SECTION_DESCRIPTOR_SIZE as usize)
        .map(|entry| SectionDescriptor {
            section_type: le_u64_at(entry, 0),
            offset: le_u64_at(entry, 8),
            size: le_u64_at(entry, 16),
        })
        .collect())
}

/// Checks the placement rules for `sections`: aligned, inside the file,
/// non-overlapping, read-only sections before the section list and a single
/// USER_DATA section after it.
pub(crate) fn validate_layout(
    header: &FileHeader,
    sections: &[SectionDescriptor],
    file_len: u64,
) -> std::result::Result<(), String> {
    let list_offset = header.section_list_offset;
    let list_end = list_offset + section_list_size(sections.len());
    let mut user_data_sections = 0;

    for (index, section) in sections.iter().enumerate() {
        if section.offset % 8 != 0 {
            return Err(format!(
                "Section {} at offset {} is not 8-byte aligned",
                index, section.offset
            ));
        }
        let end = section
            .offset
            .checked_add(section.size)
            .ok_or_else(|| format!("Section {} size overflows", index))?;
        if section.offset < HEADER_SIZE || end > file_len {
            return Err(format!(
                "Section {} [{}, {}) is out of bounds (file size {})",
                index, section.offset, end, file_len
            ));
        }
        if section.is_user_data() {
            user_data_sections += 1;
            if section.offset < list_end {
                return Err(format!(
                    "User data section {} must be located after the section list",
                    index
                ));
            }
        } else if end > list_offset {
            return Err(format!(
                "Section {} of type {} is located after the section list",
                index, section.section_type
            ));
        }
    }

    if user_data_sections > 1 {
        return Err(format!(
            "Found {} user data sections, at most one is allowed",
            user_data_sections
        ));
    }

    let mut by_offset: Vec<&SectionDescriptor> = sections.iter().collect();
    by_offset.sort_by_key(|section| section.offset);
    for pair in by_offset.windows(2) {
        if pair[0].end() > pair[1].offset {
            return Err(format!(
                "Sections at offsets {} and {} overlap",
                pair[0].offset, pair[1].offset
            ));
        }
    }
    Ok(())
}
