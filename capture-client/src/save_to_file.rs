use capture_file::{CaptureFileError, CaptureFileOutputStream};
use protocol::{ClientCaptureEvent, UserDefinedCaptureInfo};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use crate::processor::CaptureEventProcessor;

pub type ErrorHandler = Box<dyn FnMut(CaptureFileError) + Send>;

enum State {
    Writing(CaptureFileOutputStream),
    Finished,
    Failed,
}

/// Streams every event of a capture into a new capture file.
///
/// The first write failure is reported through the error handler and every
/// later event is dropped.
pub struct SaveToFileEventProcessor {
    path: PathBuf,
    frame_track_function_ids: Vec<u64>,
    state: State,
    error_handler: ErrorHandler,
}

impl SaveToFileEventProcessor {
    pub fn create(
        path: impl AsRef<Path>,
        frame_track_function_ids: &HashSet<u64>,
        error_handler: ErrorHandler,
    ) -> capture_file::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let stream = CaptureFileOutputStream::create(&path)?;
        let mut frame_track_function_ids: Vec<u64> =
            frame_track_function_ids.iter().copied().collect();
        frame_track_function_ids.sort_unstable();

        Ok(SaveToFileEventProcessor {
            path,
            frame_track_function_ids,
            state: State::Writing(stream),
            error_handler,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, State::Finished)
    }

    pub fn has_failed(&self) -> bool {
        matches!(self.state, State::Failed)
    }

    fn fail(&mut self, e: CaptureFileError) {
        error!(path = %self.path.display(), error = %e, "saving capture failed");
        self.state = State::Failed;
        (self.error_handler)(e);
    }

    fn finish(&mut self, mut stream: CaptureFileOutputStream) -> capture_file::Result<()> {
        stream.close()?;
        if !self.frame_track_function_ids.is_empty() {
            let info =
                UserDefinedCaptureInfo::with_frame_tracks(self.frame_track_function_ids.iter().copied());
            capture_file::write_user_data(&self.path, &info)?;
        }
        info!(
            path = %self.path.display(),
            events = stream.events_written(),
            "capture saved"
        );
        Ok(())
    }
}

impl CaptureEventProcessor for SaveToFileEventProcessor {
    fn process_event(&mut self, event: ClientCaptureEvent) {
        let stream = match &mut self.state {
            State::Writing(stream) => stream,
            State::Finished | State::Failed => {
                debug!("dropping event, capture file is no longer being written");
                return;
            }
        };

        if let Err(e) = stream.write_event(&event) {
            self.fail(e);
            return;
        }
        if !event.is_capture_finished() {
            return;
        }

        let State::Writing(stream) = std::mem::replace(&mut self.state, State::Finished) else {
            return;
        };
        if let Err(e) = self.finish(stream) {
            self.fail(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{load_capture, CaptureDataCollector, LoadCaptureOutcome};
    use capture_file::{CaptureFile, SECTION_TYPE_USER_DATA};
    use protocol::{CaptureFinished, CaptureStarted, ThreadName};
    use rstest::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[fixture]
    fn dir() -> TempDir {
        TempDir::new().unwrap()
    }

    fn no_errors() -> ErrorHandler {
        Box::new(|e| panic!("unexpected error: {e}"))
    }

    fn save(path: &Path, ids: &HashSet<u64>) {
        let mut processor = SaveToFileEventProcessor::create(path, ids, no_errors()).unwrap();
        processor.process_event(
            CaptureStarted {
                pid: 9,
                executable_path: "/bin/app".to_string(),
                ..Default::default()
            }
            .into(),
        );
        processor.process_event(
            ThreadName {
                pid: 9,
                tid: 10,
                name: "worker".to_string(),
                timestamp_ns: 1,
            }
            .into(),
        );
        processor.process_event(CaptureFinished::successful().into());
        assert!(processor.is_finished());
    }

    #[rstest]
    fn test_no_user_data_without_frame_tracks(dir: TempDir) {
        let path = dir.path().join("plain.orbit");
        save(&path, &HashSet::new());

        let capture_file = CaptureFile::open_for_read_write(&path).unwrap();
        assert!(capture_file.section_list().is_empty());
        assert!(capture_file.read_user_data().unwrap().is_none());
    }

    #[rstest]
    fn test_frame_tracks_are_saved_and_loaded(dir: TempDir) {
        let path = dir.path().join("frame_tracks.orbit");
        save(&path, &HashSet::from([17]));

        let capture_file = CaptureFile::open_for_read_write(&path).unwrap();
        assert!(capture_file
            .find_section_by_type(SECTION_TYPE_USER_DATA)
            .is_some());

        let mut collector = CaptureDataCollector::new();
        let outcome =
            load_capture(&mut collector, &capture_file, &AtomicBool::new(false)).unwrap();
        assert_eq!(outcome, LoadCaptureOutcome::Complete);
        let data = collector.capture_data();
        assert_eq!(data.frame_track_function_ids, HashSet::from([17]));
        assert_eq!(data.thread_names[&10], "worker");
    }

    #[rstest]
    fn test_events_after_finish_are_not_written(dir: TempDir) {
        let path = dir.path().join("after_finish.orbit");
        let mut processor =
            SaveToFileEventProcessor::create(&path, &HashSet::new(), no_errors()).unwrap();
        processor.process_event(CaptureStarted::default().into());
        processor.process_event(CaptureFinished::successful().into());
        processor.process_event(CaptureFinished::successful().into());
        assert!(processor.is_finished());

        let capture_file = CaptureFile::open_for_read_write(&path).unwrap();
        let mut stream = capture_file.create_capture_section_input_stream().unwrap();
        let mut events = Vec::new();
        loop {
            match stream.read_message::<ClientCaptureEvent>() {
                Ok(event) if event.event.is_some() => events.push(event),
                Ok(_) => {}
                Err(CaptureFileError::EndOfSection) => break,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(events.len(), 2);
        assert!(events[1].is_capture_finished());
    }

    #[rstest]
    fn test_write_failure_reported_once(dir: TempDir) {
        let path = dir.path().join("deleted.orbit");
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        let mut processor = SaveToFileEventProcessor::create(
            &path,
            &HashSet::from([1]),
            Box::new(move |e| sink.lock().unwrap().push(e.to_string())),
        )
        .unwrap();

        processor.process_event(CaptureStarted::default().into());
        std::fs::remove_file(&path).unwrap();
        processor.process_event(CaptureFinished::successful().into());
        processor.process_event(CaptureFinished::successful().into());

        assert!(processor.has_failed());
        assert_eq!(errors.lock().unwrap().len(), 1);
    }
}
