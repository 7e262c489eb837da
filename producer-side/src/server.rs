use arc_swap::ArcSwapOption;
use event_buffer::EventBuffer;
use nix::unistd::geteuid;
use protocol::{CaptureOptions, ClientCaptureEvent};
use std::fs::Permissions;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::address::ServerAddress;
use crate::epoll_thread::epoll_listener_thread;
use crate::producer_event_processor::ProducerEventProcessor;
use crate::service_state::{CaptureStatus, ServiceState};
use crate::{Result, ServerError};

/// Upper bound on waiting for producers when shutting down mid-capture.
const SHUTDOWN_MAX_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: ServerAddress,
    /// Batches buffered per producer before its socket stops being read.
    pub connection_queue_capacity: usize,
    /// Frames larger than this close the producer connection.
    pub max_frame_size: usize,
    /// `None` waits for producers as long as it takes.
    pub max_wait_for_all_events_sent: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            address: ServerAddress::default(),
            connection_queue_capacity: 64,
            max_frame_size: 64 * 1024 * 1024,
            max_wait_for_all_events_sent: None,
        }
    }
}

pub(crate) struct Shared {
    pub(crate) config: ServerConfig,
    pub(crate) service_state: ServiceState,
    pub(crate) processor: ArcSwapOption<ProducerEventProcessor>,
}

/// Accepts connections from instrumented processes and forwards their
/// events into the event buffer of the current capture.
pub struct ProducerSideServer {
    shared: Arc<Shared>,
    socket_path: PathBuf,
    accept_thread: Option<JoinHandle<Result<()>>>,
}

impl ProducerSideServer {
    pub fn build_and_start(config: ServerConfig) -> Result<Self> {
        let socket_path = config.address.socket_path().to_path_buf();
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        if UnixStream::connect(&socket_path).is_ok() {
            return Err(ServerError::AlreadyRunning(config.address.to_string()));
        }
        match std::fs::remove_file(&socket_path) {
            Ok(()) => debug!(socket_path = %socket_path.display(), "removed stale socket"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let listener = UnixListener::bind(&socket_path)?;
        let mode = if geteuid().is_root() { 0o777 } else { 0o700 };
        std::fs::set_permissions(&socket_path, Permissions::from_mode(mode))?;

        let shared = Arc::new(Shared {
            config,
            service_state: ServiceState::new(),
            processor: ArcSwapOption::empty(),
        });
        let thread_shared = shared.clone();
        let accept_thread = thread::Builder::new()
            .name("pss-accept".to_string())
            .spawn(move || epoll_listener_thread(listener, thread_shared))?;

        info!(address = %shared.config.address, mode = %format!("{mode:o}"), "producer-side server listening");
        Ok(ProducerSideServer {
            shared,
            socket_path,
            accept_thread: Some(accept_thread),
        })
    }

    pub fn address(&self) -> &ServerAddress {
        &self.shared.config.address
    }

    pub fn capture_status(&self) -> CaptureStatus {
        self.shared.service_state.capture_status()
    }

    /// Installs a processor writing into `event_buffer` and asks every
    /// connected producer to start capturing.
    pub fn on_capture_start_requested(
        &self,
        capture_options: CaptureOptions,
        event_buffer: EventBuffer<ClientCaptureEvent>,
    ) {
        info!("sending StartCaptureCommand to connected producers");
        self.shared
            .processor
            .store(Some(Arc::new(ProducerEventProcessor::new(event_buffer))));
        self.shared.service_state.start_capture(capture_options);
    }

    /// Asks producers to stop and blocks until each of them has sent all its
    /// events or disconnected. Returns false if the configured maximum wait
    /// expired first.
    pub fn on_capture_stop_requested(&self) -> bool {
        let all_events_sent = self.stop_producers(self.shared.config.max_wait_for_all_events_sent);
        self.shared.processor.store(None);
        all_events_sent
    }

    fn stop_producers(&self, max_wait: Option<Duration>) -> bool {
        info!("sending StopCaptureCommand to connected producers");
        let state = &self.shared.service_state;
        state.begin_stop();
        let all_events_sent = state.wait_for_all_events_sent(max_wait);
        if all_events_sent {
            info!("all producers finished sending their events");
        }
        state.finish_capture();
        all_events_sent
    }

    /// Stops accepting, disconnects every producer and removes the socket.
    /// A capture still running is stopped first, and whatever producers
    /// already sent is drained into its event buffer. Later calls do nothing.
    pub fn shutdown_and_wait(&mut self) -> Result<()> {
        let Some(accept_thread) = self.accept_thread.take() else {
            return Ok(());
        };
        if self.capture_status() != CaptureStatus::Finished {
            warn!("shutting down the producer-side server during a capture");
            let max_wait = match self.shared.config.max_wait_for_all_events_sent {
                Some(max_wait) => max_wait.min(SHUTDOWN_MAX_WAIT),
                None => SHUTDOWN_MAX_WAIT,
            };
            self.stop_producers(Some(max_wait));
        }
        self.shared.service_state.request_exit();

        // Connections are drained while the accept thread joins them, so the
        // processor stays installed until then.
        let result = match accept_thread.join() {
            Ok(result) => result,
            Err(_) => {
                warn!("producer-side listener thread panicked");
                Ok(())
            }
        };
        self.shared.processor.store(None);

        match std::fs::remove_file(&self.socket_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(error = ?e, "failed to remove producer-side socket"),
        }
        info!("producer-side server shut down");
        result
    }
}

impl Drop for ProducerSideServer {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown_and_wait() {
            warn!(error = %e, "error shutting down producer-side server");
        }
    }
}
