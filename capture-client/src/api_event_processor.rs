use protocol::{ApiScopeStart, ApiScopeStartAsync, ApiScopeStop, ApiScopeStopAsync, EncodedName};
use std::collections::HashMap;
use tracing::debug;

use crate::listener::{Color, TimerInfo, TimerKind};

/// Pairs scope start and stop events into timers.
///
/// Synchronous scopes nest per thread and are closed in LIFO order.
/// Asynchronous scopes are matched by id and may start and stop on different
/// threads. A stop without a matching start is dropped: the capture can begin
/// between the two.
#[derive(Default)]
pub struct ApiEventProcessor {
    synchronous_scopes: HashMap<u32, Vec<ApiScopeStart>>,
    asynchronous_scopes: HashMap<u64, ApiScopeStartAsync>,
}

impl ApiEventProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process_scope_start(&mut self, start: ApiScopeStart) {
        self.synchronous_scopes
            .entry(start.tid)
            .or_default()
            .push(start);
    }

    pub fn process_scope_stop(&mut self, stop: &ApiScopeStop) -> Option<TimerInfo> {
        let Some(start) = self
            .synchronous_scopes
            .get_mut(&stop.tid)
            .and_then(Vec::pop)
        else {
            debug!(tid = stop.tid, "scope stop without matching start");
            return None;
        };
        let depth = self
            .synchronous_scopes
            .get(&stop.tid)
            .map_or(0, |stack| stack.len() as u32);

        Some(TimerInfo {
            kind: TimerKind::Scope,
            pid: start.pid,
            tid: start.tid,
            start_ns: start.timestamp_ns,
            end_ns: stop.timestamp_ns,
            depth,
            name: start.decoded_name(),
            color: Color::from_rgba(start.color_rgba),
            group_id: start.group_id,
            address_in_function: start.address_in_function,
            async_scope_id: None,
            function_id: None,
            core: None,
            is_frame_track: false,
        })
    }

    pub fn process_scope_start_async(&mut self, start: ApiScopeStartAsync) {
        if let Some(previous) = self.asynchronous_scopes.insert(start.id, start) {
            debug!(id = previous.id, "async scope restarted before it was stopped");
        }
    }

    pub fn process_scope_stop_async(&mut self, stop: &ApiScopeStopAsync) -> Option<TimerInfo> {
        let Some(start) = self.asynchronous_scopes.remove(&stop.id) else {
            debug!(id = stop.id, "async scope stop without matching start");
            return None;
        };

        Some(TimerInfo {
            kind: TimerKind::AsyncScope,
            pid: start.pid,
            tid: start.tid,
            start_ns: start.timestamp_ns,
            end_ns: stop.timestamp_ns,
            depth: 0,
            name: start.decoded_name(),
            color: Color::from_rgba(start.color_rgba),
            group_id: 0,
            address_in_function: start.address_in_function,
            async_scope_id: Some(start.id),
            function_id: None,
            core: None,
            is_frame_track: false,
        })
    }

    /// Scopes that were started but not yet stopped.
    pub fn open_scope_count(&self) -> usize {
        self.synchronous_scopes.values().map(Vec::len).sum::<usize>()
            + self.asynchronous_scopes.len()
    }
}
