use protocol::UserDefinedCaptureInfo;
use std::path::Path;
use tracing::debug;

use crate::{CaptureFile, Result};

/// Stores `info` as the user data section of the capture file at `path`.
pub fn write_user_data(path: impl AsRef<Path>, info: &UserDefinedCaptureInfo) -> Result<()> {
    let capture_file = CaptureFile::open_for_read_write(path.as_ref())?;
    capture_file.write_user_data(info)?;
    debug!(
        path = %path.as_ref().display(),
        frame_tracks = info.frame_track_function_ids().len(),
        "wrote capture user data"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CaptureFileOutputStream, SECTION_TYPE_USER_DATA};
    use protocol::{CaptureFinished, ClientCaptureEvent};
    use tempfile::TempDir;

    #[test]
    fn test_write_user_data_twice_keeps_one_section() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("user_data.orbit");
        let mut stream = CaptureFileOutputStream::create(&path).unwrap();
        stream
            .write_event(&ClientCaptureEvent::from(CaptureFinished::successful()))
            .unwrap();
        stream.close().unwrap();

        write_user_data(&path, &UserDefinedCaptureInfo::with_frame_tracks([1, 2, 3])).unwrap();
        write_user_data(&path, &UserDefinedCaptureInfo::with_frame_tracks([17])).unwrap();

        let capture_file = CaptureFile::open_for_read_write(&path).unwrap();
        assert_eq!(
            capture_file.find_all_sections_by_type(SECTION_TYPE_USER_DATA),
            vec![0]
        );
        let info = capture_file.read_user_data().unwrap().unwrap();
        assert_eq!(info.frame_track_function_ids(), &[17]);
    }
}
