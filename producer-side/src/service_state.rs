use parking_lot::{Condvar, Mutex};
use protocol::CaptureOptions;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Capture status as seen by producers.
///
/// `Finished` doubles as the idle state: a server that never captured is
/// `Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureStatus {
    Finished,
    Started,
    Stopping,
}

/// What a connection's command thread observed while waiting.
pub(crate) enum StatusChange {
    Exit,
    Unchanged,
    Changed {
        status: CaptureStatus,
        capture_options: Option<CaptureOptions>,
    },
}

struct Inner {
    capture_status: CaptureStatus,
    capture_options: Option<CaptureOptions>,
    /// Producers that were sent a start command and have not yet sent
    /// `AllEventsSent` or disconnected.
    owing_all_events_sent: HashSet<u64>,
    exit_requested: bool,
}

pub(crate) struct ServiceState {
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl ServiceState {
    pub(crate) fn new() -> Self {
        ServiceState {
            inner: Mutex::new(Inner {
                capture_status: CaptureStatus::Finished,
                capture_options: None,
                owing_all_events_sent: HashSet::new(),
                exit_requested: false,
            }),
            changed: Condvar::new(),
        }
    }

    pub(crate) fn capture_status(&self) -> CaptureStatus {
        self.inner.lock().capture_status
    }

    pub(crate) fn start_capture(&self, capture_options: CaptureOptions) {
        let mut inner = self.inner.lock();
        if inner.capture_status != CaptureStatus::Finished {
            warn!(status = ?inner.capture_status, "capture started while another one is active");
        }
        inner.capture_status = CaptureStatus::Started;
        inner.capture_options = Some(capture_options);
        self.changed.notify_all();
    }

    pub(crate) fn begin_stop(&self) {
        let mut inner = self.inner.lock();
        inner.capture_status = CaptureStatus::Stopping;
        self.changed.notify_all();
    }

    /// Blocks until every started producer has sent `AllEventsSent` or
    /// disconnected. Returns false if `max_wait` expired first or exit was
    /// requested while producers were still sending.
    pub(crate) fn wait_for_all_events_sent(&self, max_wait: Option<Duration>) -> bool {
        let mut inner = self.inner.lock();
        let pending = |inner: &mut Inner| {
            !inner.exit_requested && !inner.owing_all_events_sent.is_empty()
        };
        match max_wait {
            Some(timeout) => {
                self.changed.wait_while_for(&mut inner, pending, timeout);
            }
            None => self.changed.wait_while(&mut inner, pending),
        }
        if !inner.owing_all_events_sent.is_empty() {
            warn!(
                remaining = inner.owing_all_events_sent.len(),
                "stopped waiting for producers that have not sent all their events"
            );
            return false;
        }
        true
    }

    pub(crate) fn finish_capture(&self) {
        let mut inner = self.inner.lock();
        inner.capture_status = CaptureStatus::Finished;
        inner.capture_options = None;
        inner.owing_all_events_sent.clear();
        self.changed.notify_all();
    }

    pub(crate) fn request_exit(&self) {
        let mut inner = self.inner.lock();
        inner.exit_requested = true;
        inner.capture_options = None;
        self.changed.notify_all();
    }

    pub(crate) fn is_exit_requested(&self) -> bool {
        self.inner.lock().exit_requested
    }

    /// Waits up to `timeout` for the status to differ from `previous`.
    /// Observing a transition to `Started` registers `producer_id` as owing
    /// `AllEventsSent`, unless `connection_closed` is already set. A change
    /// made before exit was requested is still reported once.
    pub(crate) fn wait_for_status_change(
        &self,
        producer_id: u64,
        previous: CaptureStatus,
        timeout: Duration,
        connection_closed: &AtomicBool,
    ) -> StatusChange {
        let mut inner = self.inner.lock();
        if !inner.exit_requested && inner.capture_status == previous {
            self.changed.wait_while_for(
                &mut inner,
                |inner| !inner.exit_requested && inner.capture_status == previous,
                timeout,
            );
        }
        if connection_closed.load(Ordering::Acquire) {
            return StatusChange::Exit;
        }
        if inner.capture_status == previous {
            if inner.exit_requested {
                return StatusChange::Exit;
            }
            return StatusChange::Unchanged;
        }

        match inner.capture_status {
            CaptureStatus::Started => {
                inner.owing_all_events_sent.insert(producer_id);
            }
            CaptureStatus::Finished => {
                inner.owing_all_events_sent.remove(&producer_id);
            }
            CaptureStatus::Stopping => {}
        }
        StatusChange::Changed {
            status: inner.capture_status,
            capture_options: inner.capture_options.clone(),
        }
    }

    pub(crate) fn owes_all_events_sent(&self, producer_id: u64) -> bool {
        self.inner.lock().owing_all_events_sent.contains(&producer_id)
    }

    pub(crate) fn on_all_events_sent(&self, producer_id: u64) {
        let mut inner = self.inner.lock();
        match inner.capture_status {
            CaptureStatus::Started => {
                warn!(producer_id, "producer sent AllEventsSent while still capturing")
            }
            CaptureStatus::Finished => {
                warn!(producer_id, "producer sent AllEventsSent after the capture finished");
                return;
            }
            CaptureStatus::Stopping => debug!(producer_id, "producer sent all its events"),
        }
        if inner.owing_all_events_sent.remove(&producer_id) {
            self.changed.notify_all();
        }
    }

    /// A disconnected producer counts as having sent all its events. The
    /// connection must already be marked closed. Returns whether the
    /// producer still owed them.
    pub(crate) fn on_producer_disconnected(&self, producer_id: u64) -> bool {
        let mut inner = self.inner.lock();
        let owed = inner.owing_all_events_sent.remove(&producer_id);
        self.changed.notify_all();
        owed
    }
}
