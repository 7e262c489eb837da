use eyre::{Context, Result};
use orbit_capture::{load_capture_data, CaptureSession, CaptureSettings};
use producer_side::{
    CommandReceiver, ProducerClient, ProducerSideServer, ServerAddress, ServerConfig,
};
use protocol::server_command::Command;
use protocol::{
    ApiScopeStart, ApiScopeStop, FunctionCall, InternedString, ProducerCaptureEvent, ThreadName,
};
use rstest::{fixture, rstest};
use serial_test::serial;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command as Process, ExitStatus, Stdio};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const PID: u32 = 4321;
const TID: u32 = 4322;
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

struct TestSetup {
    temp_dir: TempDir,
    config_path: PathBuf,
    socket_path: PathBuf,
    output_path: PathBuf,
}

impl TestSetup {
    fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.toml");
        let socket_path = temp_dir.path().join("producers.sock");
        let output_path = temp_dir.path().join("capture.orbit");

        let config_content = format!(
            r#"
[server]
address = "unix:{}"
max_wait_for_all_events_sent_ms = 10000

[capture]
pid = {PID}
frame_track_function_ids = [3]
event_buffer_capacity = 4096
"#,
            socket_path.display()
        );
        fs::write(&config_path, config_content)?;

        Ok(TestSetup {
            temp_dir,
            config_path,
            socket_path,
            output_path,
        })
    }

    fn address(&self) -> Result<ServerAddress> {
        Ok(ServerAddress::from_socket_path(&self.socket_path)?)
    }
}

#[fixture]
fn setup() -> TestSetup {
    TestSetup::new().expect("failed to create test setup")
}

fn expect_command(commands: &mut CommandReceiver, expected: &str) -> Result<Command> {
    let command = commands
        .recv_command()?
        .and_then(|command| command.command)
        .ok_or_else(|| eyre::eyre!("connection closed while waiting for {expected}"))?;
    Ok(command)
}

fn frame_events() -> Vec<ProducerCaptureEvent> {
    vec![
        InternedString {
            key: 5,
            intern: "frame".to_string(),
        }
        .into(),
        ThreadName {
            pid: PID,
            tid: TID,
            name: "render".to_string(),
            timestamp_ns: 10,
        }
        .into(),
        ApiScopeStart::new(PID, TID, 100, "draw", 0, 0, 0).into(),
        ApiScopeStop::new(PID, TID, 250).into(),
        FunctionCall {
            pid: PID,
            tid: TID,
            function_id: 3,
            duration_ns: 400,
            end_timestamp_ns: 500,
            ..Default::default()
        }
        .into(),
    ]
}

struct ManagedProcess {
    child: Option<Child>,
}

impl ManagedProcess {
    fn new(name: &str, mut command: Process) -> Result<Self> {
        let child = command
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to spawn {}", name))?;
        Ok(ManagedProcess { child: Some(child) })
    }

    fn wait(&mut self, timeout: Duration) -> Result<ExitStatus> {
        let Some(mut child) = self.child.take() else {
            eyre::bail!("process already reaped");
        };
        let start = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if start.elapsed() > timeout {
                child.kill()?;
                child.wait()?;
                eyre::bail!("process did not exit within {:?}", timeout);
            }
            thread::sleep(Duration::from_millis(50));
        }
    }
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = nix::sys::signal::kill(
                nix::unistd::Pid::from_raw(child.id() as i32),
                nix::sys::signal::Signal::SIGTERM,
            );
            let _ = child.wait();
        }
    }
}

fn wait_for_socket(socket_path: &Path, timeout: Duration) -> Result<()> {
    let start = Instant::now();
    while !socket_path.exists() {
        if start.elapsed() > timeout {
            eyre::bail!("timeout waiting for socket at {:?}", socket_path);
        }
        thread::sleep(Duration::from_millis(50));
    }
    Ok(())
}

#[rstest]
#[serial]
fn test_in_process_capture(setup: TestSetup) -> Result<()> {
    let address = setup.address()?;
    let server = ProducerSideServer::build_and_start(ServerConfig {
        address: address.clone(),
        ..Default::default()
    })?;

    let events_sent = Arc::new(Barrier::new(2));
    let producer = {
        let events_sent = events_sent.clone();
        thread::spawn(move || -> Result<()> {
            let (mut commands, mut sender) = ProducerClient::connect(&address)?.split()?;
            commands.set_read_timeout(Some(COMMAND_TIMEOUT))?;

            let start = expect_command(&mut commands, "StartCapture");
            if let Ok(Command::StartCapture(_)) = start {
                sender.send_events(frame_events())?;
            }
            events_sent.wait();
            start?;

            let stop = expect_command(&mut commands, "StopCapture")?;
            eyre::ensure!(matches!(stop, Command::StopCapture(_)), "unexpected {stop:?}");
            sender.send_all_events_sent()?;

            let finished = expect_command(&mut commands, "CaptureFinished")?;
            eyre::ensure!(
                matches!(finished, Command::CaptureFinished(_)),
                "unexpected {finished:?}"
            );
            Ok(())
        })
    };

    let settings = CaptureSettings {
        pid: PID,
        frame_track_function_ids: vec![3],
        ..Default::default()
    };
    let session = CaptureSession::start(&server, &settings, &setup.output_path)?;
    events_sent.wait();
    let summary = session.stop(&server)?;
    producer
        .join()
        .map_err(|_| eyre::eyre!("producer thread panicked"))??;

    assert!(summary.all_events_sent);
    assert_eq!(summary.events_processed, 7);

    let data = load_capture_data(&setup.output_path, &AtomicBool::new(false))?
        .ok_or_else(|| eyre::eyre!("load was cancelled"))?;
    assert_eq!(data.process_id, PID);
    assert_eq!(data.thread_names.get(&TID).map(String::as_str), Some("render"));
    assert!(data.strings.values().any(|s| s == "frame"));
    assert_eq!(data.timers.len(), 2);
    assert_eq!(data.timers[0].name, "draw");
    assert_eq!(data.timers[0].duration_ns(), 150);
    let frames: Vec<u64> = data.frame_track_timers().map(|timer| timer.start_ns).collect();
    assert_eq!(frames, vec![100]);
    assert!(data.warnings.is_empty());
    assert!(data.frame_track_function_ids.contains(&3));
    Ok(())
}

#[rstest]
#[serial]
fn test_lost_producer_is_reported(setup: TestSetup) -> Result<()> {
    let address = setup.address()?;
    let server = ProducerSideServer::build_and_start(ServerConfig {
        address: address.clone(),
        ..Default::default()
    })?;

    let events_sent = Arc::new(Barrier::new(2));
    let producer = {
        let events_sent = events_sent.clone();
        thread::spawn(move || -> Result<()> {
            let (mut commands, mut sender) = ProducerClient::connect(&address)?.split()?;
            commands.set_read_timeout(Some(COMMAND_TIMEOUT))?;
            let start = expect_command(&mut commands, "StartCapture");
            if start.is_ok() {
                sender.send_events(frame_events())?;
            }
            events_sent.wait();
            start?;
            Ok(())
        })
    };

    let session = CaptureSession::start(&server, &CaptureSettings::default(), &setup.output_path)?;
    events_sent.wait();
    producer
        .join()
        .map_err(|_| eyre::eyre!("producer thread panicked"))??;
    let summary = session.stop(&server)?;
    assert!(summary.all_events_sent);

    let data = load_capture_data(&setup.output_path, &AtomicBool::new(false))?
        .ok_or_else(|| eyre::eyre!("load was cancelled"))?;
    assert_eq!(data.thread_names.get(&TID).map(String::as_str), Some("render"));
    assert_eq!(data.warnings.len(), 1);
    assert!(data.capture_finished.is_some());
    Ok(())
}

#[rstest]
#[serial]
fn test_binary_capture(setup: TestSetup) -> Result<()> {
    let mut command = Process::new(env!("CARGO_BIN_EXE_orbit-capture"));
    command
        .arg(&setup.config_path)
        .arg("-o")
        .arg(&setup.output_path)
        .arg("-d")
        .arg("3s");
    let mut orbit_capture = ManagedProcess::new("orbit-capture", command)?;

    wait_for_socket(&setup.socket_path, COMMAND_TIMEOUT)?;
    let (mut commands, mut sender) = ProducerClient::connect(&setup.address()?)?.split()?;
    commands.set_read_timeout(Some(COMMAND_TIMEOUT))?;

    let start = expect_command(&mut commands, "StartCapture")?;
    eyre::ensure!(matches!(start, Command::StartCapture(_)), "unexpected {start:?}");
    sender.send_events(frame_events())?;

    let stop = expect_command(&mut commands, "StopCapture")?;
    eyre::ensure!(matches!(stop, Command::StopCapture(_)), "unexpected {stop:?}");
    sender.send_all_events_sent()?;

    let status = orbit_capture.wait(COMMAND_TIMEOUT)?;
    assert!(status.success(), "orbit-capture exited with {status}");
    assert!(!setup.socket_path.exists(), "socket should be removed on exit");

    let data = load_capture_data(&setup.output_path, &AtomicBool::new(false))?
        .ok_or_else(|| eyre::eyre!("load was cancelled"))?;
    assert_eq!(data.process_id, PID);
    assert_eq!(data.thread_names.get(&TID).map(String::as_str), Some("render"));
    assert_eq!(data.timers.len(), 2);
    assert_eq!(data.frame_track_timers().count(), 1);
    assert!(data.frame_track_function_ids.contains(&3));
    assert!(setup.temp_dir.path().join("capture.orbit").exists());
    Ok(())
}
