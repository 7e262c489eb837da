use protocol::{ProducerCaptureEvent, ProducerMessage, ServerCommand};
use std::io::{BufReader, BufWriter, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::time::Duration;
use tracing::debug;

use crate::address::ServerAddress;
use crate::Result;

const MAX_COMMAND_SIZE: usize = 1024 * 1024;

/// Connection from an instrumented process to the producer-side server.
pub struct ProducerClient {
    address: ServerAddress,
    stream: UnixStream,
}

impl ProducerClient {
    pub fn connect(address: &ServerAddress) -> Result<Self> {
        let stream = UnixStream::connect(address.socket_path())?;
        debug!(address = %address, "connected to producer-side server");
        Ok(ProducerClient {
            address: address.clone(),
            stream,
        })
    }

    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// Splits the connection so commands can be awaited on one thread while
    /// events are sent from another.
    pub fn split(self) -> Result<(CommandReceiver, EventSender)> {
        let writer = self.stream.try_clone()?;
        Ok((
            CommandReceiver {
                reader: BufReader::new(self.stream),
            },
            EventSender {
                writer: BufWriter::new(writer),
            },
        ))
    }
}

pub struct CommandReceiver {
    reader: BufReader<UnixStream>,
}

impl CommandReceiver {
    /// Blocks for the next command. `None` once the server closed the
    /// connection.
    pub fn recv_command(&mut self) -> Result<Option<ServerCommand>> {
        let command = protocol::read_delimited(&mut self.reader, MAX_COMMAND_SIZE)?;
        if let Some(command) = &command {
            debug!(?command, "received command");
        }
        Ok(command)
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.reader.get_ref().set_read_timeout(timeout)?;
        Ok(())
    }
}

pub struct EventSender {
    writer: BufWriter<UnixStream>,
}

impl EventSender {
    /// Sends one batch. Blocks while the server is not reading.
    pub fn send_events(&mut self, capture_events: Vec<ProducerCaptureEvent>) -> Result<()> {
        self.send(&ProducerMessage::events(capture_events))
    }

    /// Tells the server that every event of the stopped capture was sent.
    pub fn send_all_events_sent(&mut self) -> Result<()> {
        self.send(&ProducerMessage::all_events_sent())?;
        debug!("sent AllEventsSent");
        Ok(())
    }

    /// Closes both directions of the connection.
    pub fn shutdown(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().shutdown(Shutdown::Both)?;
        Ok(())
    }

    fn send(&mut self, message: &ProducerMessage) -> Result<()> {
        protocol::write_delimited(&mut self.writer, message)?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::producer_message::Message;
    use protocol::{CaptureOptions, ThreadName};
    use std::thread;

    #[test]
    fn test_split_halves_share_the_connection() {
        let (client_side, server_side) = UnixStream::pair().unwrap();
        let client = ProducerClient {
            address: ServerAddress::default(),
            stream: client_side,
        };
        let (mut commands, mut sender) = client.split().unwrap();

        let server = thread::spawn(move || {
            let mut reader = BufReader::new(server_side.try_clone().unwrap());
            let mut writer = server_side;
            protocol::write_delimited(
                &mut writer,
                &ServerCommand::start_capture(CaptureOptions::default()),
            )
            .unwrap();
            let message: ProducerMessage = protocol::read_delimited(&mut reader, MAX_COMMAND_SIZE)
                .unwrap()
                .unwrap();
            let all_sent: ProducerMessage = protocol::read_delimited(&mut reader, MAX_COMMAND_SIZE)
                .unwrap()
                .unwrap();
            (message, all_sent)
        });

        assert_eq!(
            commands.recv_command().unwrap(),
            Some(ServerCommand::start_capture(CaptureOptions::default()))
        );
        sender
            .send_events(vec![ThreadName {
                pid: 1,
                tid: 2,
                name: "io".to_string(),
                timestamp_ns: 3,
            }
            .into()])
            .unwrap();
        sender.send_all_events_sent().unwrap();

        let (message, all_sent) = server.join().unwrap();
        assert!(matches!(
            message.message,
            Some(Message::BufferedCaptureEvents(events)) if events.capture_events.len() == 1
        ));
        assert_eq!(all_sent, ProducerMessage::all_events_sent());

        sender.shutdown().unwrap();
        assert_eq!(commands.recv_command().unwrap(), None);
    }
}
