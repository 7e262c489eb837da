use crossbeam::channel::{self, Receiver, Sender};
use protocol::producer_message::Message;
use protocol::{CaptureOptions, ProducerCaptureEvent, ProducerMessage, ServerCommand};
use std::io::BufReader;
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

use crate::server::Shared;
use crate::service_state::{CaptureStatus, StatusChange};
use crate::Result;

/// How often a command thread re-checks whether its connection is gone.
const COMMAND_POLL_INTERVAL: Duration = Duration::from_millis(100);

enum ConnectionItem {
    Events(Vec<ProducerCaptureEvent>),
    AllEventsSent,
}

/// One connected producer, served by three threads:
///
/// * reader: socket frames into a bounded queue,
/// * drain: queue into the installed `ProducerEventProcessor`,
/// * commands: capture status changes into `ServerCommand` frames.
pub(crate) struct Connection {
    producer_id: u64,
    stream: UnixStream,
    threads: Vec<JoinHandle<()>>,
}

impl Connection {
    pub(crate) fn spawn(producer_id: u64, stream: UnixStream, shared: &Arc<Shared>) -> Result<Self> {
        let (sender, receiver) = channel::bounded(shared.config.connection_queue_capacity);
        let closed = Arc::new(AtomicBool::new(false));
        let mut threads = Vec::with_capacity(3);

        let reader_stream = stream.try_clone()?;
        let max_frame_size = shared.config.max_frame_size;
        threads.push(
            thread::Builder::new()
                .name(format!("pss-reader-{producer_id}"))
                .spawn(move || reader_thread(producer_id, reader_stream, sender, max_frame_size))?,
        );

        let drain_shared = shared.clone();
        let drain_closed = closed.clone();
        threads.push(
            thread::Builder::new()
                .name(format!("pss-drain-{producer_id}"))
                .spawn(move || drain_thread(producer_id, receiver, drain_shared, drain_closed))?,
        );

        let commands_stream = stream.try_clone()?;
        let commands_shared = shared.clone();
        threads.push(
            thread::Builder::new()
                .name(format!("pss-commands-{producer_id}"))
                .spawn(move || {
                    commands_thread(producer_id, commands_stream, commands_shared, closed)
                })?,
        );

        debug!(producer_id, "producer connected");
        Ok(Connection {
            producer_id,
            stream,
            threads,
        })
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.threads.iter().all(JoinHandle::is_finished)
    }

    /// Unblocks the reader and the commands thread.
    pub(crate) fn shutdown(&self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            if e.kind() != std::io::ErrorKind::NotConnected {
                warn!(producer_id = self.producer_id, error = ?e, "failed to shut down producer socket");
            }
        }
    }

    pub(crate) fn join(self) {
        for handle in self.threads {
            if handle.join().is_err() {
                warn!(producer_id = self.producer_id, "producer connection thread panicked");
            }
        }
        debug!(producer_id = self.producer_id, "producer connection closed");
    }
}

fn reader_thread(
    producer_id: u64,
    stream: UnixStream,
    sender: Sender<ConnectionItem>,
    max_frame_size: usize,
) {
    let mut reader = BufReader::new(stream);
    loop {
        let message = match protocol::read_delimited::<ProducerMessage, _>(&mut reader, max_frame_size) {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!(producer_id, "producer closed the connection");
                break;
            }
            Err(e) => {
                warn!(producer_id, error = %e, "failed to read from producer");
                break;
            }
        };

        let item = match message.message {
            Some(Message::BufferedCaptureEvents(events)) => {
                ConnectionItem::Events(events.capture_events)
            }
            Some(Message::AllEventsSent(_)) => ConnectionItem::AllEventsSent,
            None => {
                warn!(producer_id, "producer sent an empty message");
                continue;
            }
        };
        if sender.send(item).is_err() {
            break;
        }
    }

    let _ = reader.get_ref().shutdown(Shutdown::Both);
}

fn drain_thread(
    producer_id: u64,
    receiver: Receiver<ConnectionItem>,
    shared: Arc<Shared>,
    closed: Arc<AtomicBool>,
) {
    let mut processed: u64 = 0;
    for item in receiver.iter() {
        match item {
            ConnectionItem::Events(events) => match shared.processor.load_full() {
                Some(processor) => {
                    processed += events.len() as u64;
                    for event in events {
                        processor.process_event(producer_id, event);
                    }
                }
                None => debug!(
                    producer_id,
                    dropped = events.len(),
                    "dropping events received outside of a capture"
                ),
            },
            ConnectionItem::AllEventsSent => shared.service_state.on_all_events_sent(producer_id),
        }
    }

    closed.store(true, Ordering::Release);
    if shared.service_state.owes_all_events_sent(producer_id) {
        if let Some(processor) = shared.processor.load_full() {
            processor.notify_producer_lost(producer_id);
        }
    }
    shared.service_state.on_producer_disconnected(producer_id);
    debug!(producer_id, processed, "producer drained");
}

fn commands_thread(
    producer_id: u64,
    mut stream: UnixStream,
    shared: Arc<Shared>,
    closed: Arc<AtomicBool>,
) {
    let mut previous = CaptureStatus::Finished;
    loop {
        let (status, capture_options) = match shared.service_state.wait_for_status_change(
            producer_id,
            previous,
            COMMAND_POLL_INTERVAL,
            &closed,
        ) {
            StatusChange::Exit => return,
            StatusChange::Unchanged => continue,
            StatusChange::Changed {
                status,
                capture_options,
            } => (status, capture_options),
        };

        for command in commands_for_transition(previous, status, capture_options) {
            if let Err(e) = protocol::write_delimited(&mut stream, &command) {
                warn!(producer_id, error = %e, "failed to send command to producer");
                let _ = stream.shutdown(Shutdown::Both);
                return;
            }
            debug!(producer_id, ?command, "sent command to producer");
        }
        previous = status;
    }
}

/// Commands that move a producer from `previous` to `current`, including
/// any intermediate status the commands thread did not observe.
fn commands_for_transition(
    previous: CaptureStatus,
    current: CaptureStatus,
    capture_options: Option<CaptureOptions>,
) -> Vec<ServerCommand> {
    let start = || ServerCommand::start_capture(capture_options.clone().unwrap_or_default());
    match (previous, current) {
        (CaptureStatus::Finished, CaptureStatus::Started) => vec![start()],
        (CaptureStatus::Stopping, CaptureStatus::Started) => {
            vec![ServerCommand::capture_finished(), start()]
        }
        (CaptureStatus::Started, CaptureStatus::Stopping) => vec![ServerCommand::stop_capture()],
        (CaptureStatus::Finished, CaptureStatus::Stopping) => {
            vec![start(), ServerCommand::stop_capture()]
        }
        (CaptureStatus::Stopping, CaptureStatus::Finished) => {
            vec![ServerCommand::capture_finished()]
        }
        (CaptureStatus::Started, CaptureStatus::Finished) => {
            vec![ServerCommand::stop_capture(), ServerCommand::capture_finished()]
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    fn options() -> CaptureOptions {
        CaptureOptions {
            pid: 12,
            ..Default::default()
        }
    }

    #[rstest]
    #[case(CaptureStatus::Finished, CaptureStatus::Started, vec![ServerCommand::start_capture(options())])]
    #[case(CaptureStatus::Started, CaptureStatus::Stopping, vec![ServerCommand::stop_capture()])]
    #[case(CaptureStatus::Stopping, CaptureStatus::Finished, vec![ServerCommand::capture_finished()])]
    #[case(
        CaptureStatus::Finished,
        CaptureStatus::Stopping,
        vec![ServerCommand::start_capture(options()), ServerCommand::stop_capture()]
    )]
    #[case(
        CaptureStatus::Started,
        CaptureStatus::Finished,
        vec![ServerCommand::stop_capture(), ServerCommand::capture_finished()]
    )]
    #[case(
        CaptureStatus::Stopping,
        CaptureStatus::Started,
        vec![ServerCommand::capture_finished(), ServerCommand::start_capture(options())]
    )]
    #[case(CaptureStatus::Started, CaptureStatus::Started, vec![])]
    fn test_commands_for_transition(
        #[case] previous: CaptureStatus,
        #[case] current: CaptureStatus,
        #[case] expected: Vec<ServerCommand>,
    ) {
        assert_eq!(
            commands_for_transition(previous, current, Some(options())),
            expected
        );
    }
}
