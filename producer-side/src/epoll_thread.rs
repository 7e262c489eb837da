use nix::errno::Errno;
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};
use std::os::unix::net::UnixListener;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::server::Shared;
use crate::Result;

const LISTENER_TOKEN: u64 = 0;
const ACCEPT_TIMEOUT_MS: u16 = 100;

/// Accepts producers until exit is requested, then shuts down and joins
/// every connection it created.
pub(crate) fn epoll_listener_thread(listener: UnixListener, shared: Arc<Shared>) -> Result<()> {
    listener.set_nonblocking(true)?;
    let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)?;
    epoll.add(
        &listener,
        EpollEvent::new(EpollFlags::EPOLLIN, LISTENER_TOKEN),
    )?;

    let mut events = vec![EpollEvent::empty(); 10];
    let timeout = EpollTimeout::from(ACCEPT_TIMEOUT_MS);
    let mut connections: Vec<Connection> = Vec::new();
    let mut next_producer_id: u64 = 1;

    let result = loop {
        if shared.service_state.is_exit_requested() {
            debug!("producer-side listener thread shutting down");
            break Ok(());
        }
        let nfds = match epoll.wait(&mut events, timeout) {
            Ok(nfds) => nfds,
            Err(Errno::EINTR) => continue,
            Err(e) => break Err(e.into()),
        };

        for event in events.iter().take(nfds) {
            if event.data() != LISTENER_TOKEN {
                continue;
            }
            loop {
                match listener.accept() {
                    Ok((stream, _)) => {
                        let producer_id = next_producer_id;
                        next_producer_id += 1;
                        let spawned = stream
                            .set_nonblocking(false)
                            .map_err(Into::into)
                            .and_then(|()| Connection::spawn(producer_id, stream, &shared));
                        match spawned {
                            Ok(connection) => connections.push(connection),
                            Err(e) => {
                                warn!(producer_id, error = %e, "failed to set up producer connection")
                            }
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                    Err(e) => {
                        warn!(error = ?e, "error accepting connection");
                        break;
                    }
                }
            }
        }

        let (finished, open): (Vec<_>, Vec<_>) = connections
            .into_iter()
            .partition(Connection::is_finished);
        finished.into_iter().for_each(Connection::join);
        connections = open;
    };

    for connection in &connections {
        connection.shutdown();
    }
    for connection in connections {
        connection.join();
    }
    result
}
