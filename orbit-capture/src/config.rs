use eyre::WrapErr;
use producer_side::{ServerAddress, ServerConfig, DEFAULT_PRODUCER_SIDE_ADDRESS};
use protocol::CaptureOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub capture: CaptureSettings,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_connection_queue_capacity")]
    pub connection_queue_capacity: usize,
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
    /// Unset waits for every producer to report `AllEventsSent`.
    #[serde(default)]
    pub max_wait_for_all_events_sent_ms: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CaptureSettings {
    #[serde(default)]
    pub pid: u32,
    #[serde(default)]
    pub samples_per_second: f64,
    #[serde(default = "default_enable_api")]
    pub enable_api: bool,
    #[serde(default)]
    pub trace_thread_state: bool,
    #[serde(default)]
    pub instrumented_function_ids: Vec<u64>,
    #[serde(default)]
    pub frame_track_function_ids: Vec<u64>,
    #[serde(default = "default_event_buffer_capacity")]
    pub event_buffer_capacity: usize,
}

fn default_address() -> String {
    DEFAULT_PRODUCER_SIDE_ADDRESS.to_string()
}

fn default_connection_queue_capacity() -> usize {
    64
}

fn default_max_frame_size() -> usize {
    64 << 20
}

fn default_enable_api() -> bool {
    true
}

fn default_event_buffer_capacity() -> usize {
    1 << 20
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            address: default_address(),
            connection_queue_capacity: default_connection_queue_capacity(),
            max_frame_size: default_max_frame_size(),
            max_wait_for_all_events_sent_ms: None,
        }
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        CaptureSettings {
            pid: 0,
            samples_per_second: 0.0,
            enable_api: default_enable_api(),
            trace_thread_state: false,
            instrumented_function_ids: Vec::new(),
            frame_track_function_ids: Vec::new(),
            event_buffer_capacity: default_event_buffer_capacity(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl ServerSettings {
    pub fn server_config(&self) -> eyre::Result<ServerConfig> {
        let address = ServerAddress::parse(&self.address)
            .wrap_err_with(|| format!("invalid server address {}", self.address))?;
        eyre::ensure!(
            self.connection_queue_capacity > 0,
            "connection_queue_capacity must be positive"
        );
        Ok(ServerConfig {
            address,
            connection_queue_capacity: self.connection_queue_capacity,
            max_frame_size: self.max_frame_size,
            max_wait_for_all_events_sent: self
                .max_wait_for_all_events_sent_ms
                .map(Duration::from_millis),
        })
    }
}

impl CaptureSettings {
    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            pid: self.pid,
            samples_per_second: self.samples_per_second,
            enable_api: self.enable_api,
            trace_thread_state: self.trace_thread_state,
            instrumented_function_ids: self.instrumented_function_ids.clone(),
        }
    }

    pub fn frame_track_function_ids(&self) -> HashSet<u64> {
        self.frame_track_function_ids.iter().copied().collect()
    }
}
