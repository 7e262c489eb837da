use capture_client::{
    drain_event_buffer, load_capture, CaptureData, CaptureDataCollector, LoadCaptureOutcome,
    SaveToFileEventProcessor,
};
use capture_file::{CaptureFile, CaptureFileError};
use event_buffer::EventBuffer;
use eyre::{Context, Result};
use parking_lot::Mutex;
use producer_side::{get_timestamp_ns, ProducerSideServer};
use protocol::{CaptureFinished, CaptureStarted, ClientCaptureEvent};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

use crate::config::CaptureSettings;

#[derive(Debug, Clone)]
pub struct CaptureSummary {
    pub output_path: PathBuf,
    pub events_processed: u64,
    /// False if the stop gave up on producers that never sent all their
    /// events.
    pub all_events_sent: bool,
}

/// One capture in flight: events flow from the producer-side server through
/// an event buffer into a capture file written on a dedicated thread.
pub struct CaptureSession {
    event_buffer: EventBuffer<ClientCaptureEvent>,
    output_path: PathBuf,
    save_error: Arc<Mutex<Option<String>>>,
    processing_thread: Option<JoinHandle<u64>>,
}

impl CaptureSession {
    pub fn start(
        server: &ProducerSideServer,
        settings: &CaptureSettings,
        output_path: impl AsRef<Path>,
    ) -> Result<Self> {
        let output_path = output_path.as_ref().to_path_buf();
        let event_buffer = EventBuffer::new(settings.event_buffer_capacity)?;

        let save_error = Arc::new(Mutex::new(None));
        let error_slot = save_error.clone();
        let mut processor = SaveToFileEventProcessor::create(
            &output_path,
            &settings.frame_track_function_ids(),
            Box::new(move |e: CaptureFileError| {
                error!(error = %e, "failed to write capture file");
                error_slot.lock().get_or_insert(e.to_string());
            }),
        )
        .wrap_err_with(|| format!("failed to create capture file {}", output_path.display()))?;

        let capture_options = settings.capture_options();
        event_buffer.push(ClientCaptureEvent::from(CaptureStarted {
            pid: capture_options.pid,
            executable_path: executable_path(capture_options.pid),
            executable_build_id: String::new(),
            capture_start_timestamp_ns: get_timestamp_ns(),
            capture_start_unix_time_ns: unix_time_ns(),
            capture_options: Some(capture_options.clone()),
        }))?;

        let consumer = event_buffer.clone();
        let processing_thread = thread::Builder::new()
            .name("capture-processing".to_string())
            .spawn(move || drain_event_buffer(&consumer, &mut processor))?;

        server.on_capture_start_requested(capture_options, event_buffer.clone());
        info!(output = %output_path.display(), "capture started");

        Ok(CaptureSession {
            event_buffer,
            output_path,
            save_error,
            processing_thread: Some(processing_thread),
        })
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Stops the producers, appends `CaptureFinished` and waits for the
    /// capture file to be completed. The capture is marked interrupted if
    /// the server gave up waiting on a producer.
    pub fn stop(mut self, server: &ProducerSideServer) -> Result<CaptureSummary> {
        let all_events_sent = server.on_capture_stop_requested();
        let capture_finished = if all_events_sent {
            CaptureFinished::successful()
        } else {
            warn!("finishing the capture without all producer events");
            CaptureFinished::interrupted("Not all producers sent their capture events in time")
        };
        self.event_buffer
            .push(ClientCaptureEvent::from(capture_finished))?;
        let events_processed = self.finish()?;

        if let Some(message) = self.save_error.lock().take() {
            eyre::bail!(
                "failed to write capture file {}: {message}",
                self.output_path.display()
            );
        }
        info!(
            output = %self.output_path.display(),
            events_processed,
            "capture saved"
        );
        Ok(CaptureSummary {
            output_path: self.output_path.clone(),
            events_processed,
            all_events_sent,
        })
    }

    fn finish(&mut self) -> Result<u64> {
        self.event_buffer.close();
        match self.processing_thread.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| eyre::eyre!("capture processing thread panicked")),
            None => Ok(0),
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if self.processing_thread.is_some() {
            debug!("capture session dropped without stop");
            if let Err(e) = self.finish() {
                warn!(error = %e, "error finishing capture session");
            }
        }
    }
}

/// Replays a saved capture into a [`CaptureData`]. `None` if `cancel` was
/// raised before the end of the file.
pub fn load_capture_data(path: impl AsRef<Path>, cancel: &AtomicBool) -> Result<Option<CaptureData>> {
    let path = path.as_ref();
    let capture_file = CaptureFile::open_for_read_write(path)
        .wrap_err_with(|| format!("failed to open capture file {}", path.display()))?;
    let mut collector = CaptureDataCollector::new();
    let outcome = load_capture(&mut collector, &capture_file, cancel)
        .wrap_err_with(|| format!("failed to load capture file {}", path.display()))?;
    Ok(match outcome {
        LoadCaptureOutcome::Complete => Some(collector.into_capture_data()),
        LoadCaptureOutcome::Cancelled => None,
    })
}

fn executable_path(pid: u32) -> String {
    if pid == 0 {
        return String::new();
    }
    match std::fs::read_link(format!("/proc/{pid}/exe")) {
        Ok(path) => path.to_string_lossy().into_owned(),
        Err(e) => {
            debug!(pid, error = %e, "failed to resolve executable path");
            String::new()
        }
    }
}

fn unix_time_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or_default()
}
