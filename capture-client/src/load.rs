use capture_file::{CaptureFile, CaptureFileError};
use protocol::ClientCaptureEvent;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

use crate::listener::CaptureListener;
use crate::processor::{CaptureEventProcessor, ListenerEventProcessor};
use crate::{CaptureClientError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadCaptureOutcome {
    Complete,
    Cancelled,
}

/// Replays a saved capture into `listener`.
///
/// `cancel` is checked before every event. Frame tracks come from the user
/// data section when the file has one.
pub fn load_capture<L: CaptureListener>(
    listener: L,
    capture_file: &CaptureFile,
    cancel: &AtomicBool,
) -> Result<LoadCaptureOutcome> {
    let frame_track_function_ids: HashSet<u64> = capture_file
        .read_user_data()?
        .map(|info| info.frame_track_function_ids().iter().copied().collect())
        .unwrap_or_default();

    let mut processor = ListenerEventProcessor::new(
        listener,
        Some(capture_file.path().to_path_buf()),
        frame_track_function_ids,
    );
    let mut stream = capture_file.create_capture_section_input_stream()?;
    let mut loaded: u64 = 0;

    loop {
        if cancel.load(Ordering::Relaxed) {
            info!(path = %capture_file.path().display(), loaded, "capture loading cancelled");
            return Ok(LoadCaptureOutcome::Cancelled);
        }

        let event = match stream.read_message::<ClientCaptureEvent>() {
            Ok(event) => event,
            Err(CaptureFileError::EndOfSection) => {
                return Err(CaptureClientError::Malformed(
                    "truncated capture section".to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        };
        if event.event.is_none() {
            continue;
        }

        let finished = event.is_capture_finished();
        processor.process_event(event);
        loaded += 1;
        if finished {
            debug!(path = %capture_file.path().display(), loaded, "capture loaded");
            return Ok(LoadCaptureOutcome::Complete);
        }
    }
}
