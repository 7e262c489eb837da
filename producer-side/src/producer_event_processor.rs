use event_buffer::EventBuffer;
use parking_lot::Mutex;
use protocol::client_capture_event::Event as ClientEvent;
use protocol::producer_capture_event::Event as ProducerEvent;
use protocol::{
    AddressInfo, Callstack, CallstackSample, ClientCaptureEvent, FullAddressInfo,
    FullCallstackSample, FullTracepointEvent, InternedCallstack, InternedString,
    InternedTracepointInfo, ProducerCaptureEvent, TracepointEvent, TracepointInfo, WarningEvent,
};
use std::collections::HashMap;
use std::hash::Hash;
use tracing::{debug, warn};

use crate::get_timestamp_ns;

/// Assigns capture-wide ids to values. Id 0 is never handed out.
struct InternPool<T> {
    ids: HashMap<T, u64>,
    next_id: u64,
}

impl<T: Eq + Hash> InternPool<T> {
    fn new() -> Self {
        InternPool {
            ids: HashMap::new(),
            next_id: 1,
        }
    }

    /// Returns the id of `value` and whether it was assigned by this call.
    fn get_or_assign(&mut self, value: T) -> (u64, bool) {
        if let Some(&id) = self.ids.get(&value) {
            return (id, false);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.ids.insert(value, id);
        (id, true)
    }
}

struct InternState {
    strings: InternPool<String>,
    callstacks: InternPool<Callstack>,
    tracepoints: InternPool<TracepointInfo>,
    producer_string_keys: HashMap<(u64, u64), u64>,
    producer_callstack_keys: HashMap<(u64, u64), u64>,
}

/// Turns the events of every connected producer into one stream of client
/// events for the current capture.
///
/// Interned keys chosen by a producer are only unique within that producer,
/// so they are remapped to capture-wide keys. Events carrying full strings,
/// callstacks or tracepoint infos are interned here and expanded into an
/// interned record followed by the keyed event.
pub struct ProducerEventProcessor {
    buffer: EventBuffer<ClientCaptureEvent>,
    state: Mutex<InternState>,
}

impl ProducerEventProcessor {
    pub fn new(buffer: EventBuffer<ClientCaptureEvent>) -> Self {
        ProducerEventProcessor {
            buffer,
            state: Mutex::new(InternState {
                strings: InternPool::new(),
                callstacks: InternPool::new(),
                tracepoints: InternPool::new(),
                producer_string_keys: HashMap::new(),
                producer_callstack_keys: HashMap::new(),
            }),
        }
    }

    pub fn event_buffer(&self) -> &EventBuffer<ClientCaptureEvent> {
        &self.buffer
    }

    pub fn process_event(&self, producer_id: u64, event: ProducerCaptureEvent) {
        let Some(event) = event.event else {
            debug!(producer_id, "producer sent an empty event");
            return;
        };

        let mut state = self.state.lock();
        match event {
            ProducerEvent::CaptureStarted(_) | ProducerEvent::CaptureFinished(_) => {
                warn!(producer_id, "producers cannot start or finish the capture");
            }
            ProducerEvent::ApiScopeStart(e) => self.emit(ClientEvent::ApiScopeStart(e)),
            ProducerEvent::ApiScopeStop(e) => self.emit(ClientEvent::ApiScopeStop(e)),
            ProducerEvent::ApiScopeStartAsync(e) => self.emit(ClientEvent::ApiScopeStartAsync(e)),
            ProducerEvent::ApiScopeStopAsync(e) => self.emit(ClientEvent::ApiScopeStopAsync(e)),
            ProducerEvent::ApiStringEvent(e) => self.emit(ClientEvent::ApiStringEvent(e)),
            ProducerEvent::ApiTrackInt(e) => self.emit(ClientEvent::ApiTrackInt(e)),
            ProducerEvent::ApiTrackInt64(e) => self.emit(ClientEvent::ApiTrackInt64(e)),
            ProducerEvent::ApiTrackUint(e) => self.emit(ClientEvent::ApiTrackUint(e)),
            ProducerEvent::ApiTrackUint64(e) => self.emit(ClientEvent::ApiTrackUint64(e)),
            ProducerEvent::ApiTrackFloat(e) => self.emit(ClientEvent::ApiTrackFloat(e)),
            ProducerEvent::ApiTrackDouble(e) => self.emit(ClientEvent::ApiTrackDouble(e)),
            ProducerEvent::ModuleUpdateEvent(e) => self.emit(ClientEvent::ModuleUpdateEvent(e)),
            ProducerEvent::ModulesSnapshot(e) => self.emit(ClientEvent::ModulesSnapshot(e)),
            ProducerEvent::ThreadName(e) => self.emit(ClientEvent::ThreadName(e)),
            ProducerEvent::ThreadStateSlice(e) => self.emit(ClientEvent::ThreadStateSlice(e)),
            ProducerEvent::WarningEvent(e) => self.emit(ClientEvent::WarningEvent(e)),
            ProducerEvent::ErrorsWithPerfEventOpenEvent(e) => {
                self.emit(ClientEvent::ErrorsWithPerfEventOpenEvent(e))
            }
            ProducerEvent::LostPerfRecordsEvent(e) => {
                self.emit(ClientEvent::LostPerfRecordsEvent(e))
            }
            ProducerEvent::FunctionCall(e) => self.emit(ClientEvent::FunctionCall(e)),
            ProducerEvent::SchedulingSlice(e) => self.emit(ClientEvent::SchedulingSlice(e)),
            ProducerEvent::ThreadNamesSnapshot(e) => self.emit(ClientEvent::ThreadNamesSnapshot(e)),
            ProducerEvent::ClockResolutionEvent(e) => {
                self.emit(ClientEvent::ClockResolutionEvent(e))
            }
            ProducerEvent::InternedString(e) => self.process_interned_string(&mut state, producer_id, e),
            ProducerEvent::InternedCallstack(e) => {
                self.process_interned_callstack(&mut state, producer_id, e)
            }
            ProducerEvent::CallstackSample(e) => {
                self.process_callstack_sample(&state, producer_id, e)
            }
            ProducerEvent::FullCallstackSample(e) => self.process_full_callstack_sample(&mut state, e),
            ProducerEvent::FullAddressInfo(e) => self.process_full_address_info(&mut state, e),
            ProducerEvent::FullTracepointEvent(e) => {
                self.process_full_tracepoint_event(&mut state, e)
            }
        }
    }

    /// Injects a warning that `producer_id` went away before it had sent all
    /// of its events.
    pub fn notify_producer_lost(&self, producer_id: u64) {
        let _state = self.state.lock();
        warn!(producer_id, "producer disconnected during the capture");
        self.emit(ClientEvent::WarningEvent(WarningEvent {
            timestamp_ns: get_timestamp_ns(),
            message: format!(
                "Producer {producer_id} disconnected before sending all of its capture events"
            ),
        }));
    }

    fn emit(&self, event: ClientEvent) {
        if let Err(e) = self.buffer.push(ClientCaptureEvent { event: Some(event) }) {
            debug!(error = %e, "dropping event, capture is no longer accepting events");
        }
    }

    fn intern_string(&self, state: &mut InternState, value: String) -> u64 {
        let (key, assigned) = state.strings.get_or_assign(value.clone());
        if assigned {
            self.emit(ClientEvent::InternedString(InternedString { key, intern: value }));
        }
        key
    }

    fn intern_callstack(&self, state: &mut InternState, callstack: Callstack) -> u64 {
        let (key, assigned) = state.callstacks.get_or_assign(callstack.clone());
        if assigned {
            self.emit(ClientEvent::InternedCallstack(InternedCallstack {
                key,
                intern: Some(callstack),
            }));
        }
        key
    }

    fn process_interned_string(
        &self,
        state: &mut InternState,
        producer_id: u64,
        interned: InternedString,
    ) {
        if state
            .producer_string_keys
            .contains_key(&(producer_id, interned.key))
        {
            warn!(producer_id, key = interned.key, "producer reused an interned string key");
        }
        let key = self.intern_string(state, interned.intern);
        state
            .producer_string_keys
            .insert((producer_id, interned.key), key);
    }

    fn process_interned_callstack(
        &self,
        state: &mut InternState,
        producer_id: u64,
        interned: InternedCallstack,
    ) {
        let Some(callstack) = interned.intern else {
            warn!(producer_id, key = interned.key, "interned callstack without frames");
            return;
        };
        if state
            .producer_callstack_keys
            .contains_key(&(producer_id, interned.key))
        {
            warn!(producer_id, key = interned.key, "producer reused an interned callstack key");
        }
        let key = self.intern_callstack(state, callstack);
        state
            .producer_callstack_keys
            .insert((producer_id, interned.key), key);
    }

    fn process_callstack_sample(
        &self,
        state: &InternState,
        producer_id: u64,
        mut sample: CallstackSample,
    ) {
        let Some(&key) = state
            .producer_callstack_keys
            .get(&(producer_id, sample.callstack_id))
        else {
            warn!(
                producer_id,
                callstack_id = sample.callstack_id,
                "callstack sample with unknown callstack id"
            );
            return;
        };
        sample.callstack_id = key;
        self.emit(ClientEvent::CallstackSample(sample));
    }

    fn process_full_callstack_sample(&self, state: &mut InternState, sample: FullCallstackSample) {
        let callstack_id = self.intern_callstack(state, sample.callstack.unwrap_or_default());
        self.emit(ClientEvent::CallstackSample(CallstackSample {
            pid: sample.pid,
            tid: sample.tid,
            timestamp_ns: sample.timestamp_ns,
            callstack_id,
        }));
    }

    fn process_full_address_info(&self, state: &mut InternState, info: FullAddressInfo) {
        let function_name_key = self.intern_string(state, info.function_name);
        let module_name_key = self.intern_string(state, info.module_name);
        self.emit(ClientEvent::AddressInfo(AddressInfo {
            absolute_address: info.absolute_address,
            function_name_key,
            offset_in_function: info.offset_in_function,
            module_name_key,
        }));
    }

    fn process_full_tracepoint_event(&self, state: &mut InternState, event: FullTracepointEvent) {
        let info = event.tracepoint_info.unwrap_or_default();
        let (key, assigned) = state.tracepoints.get_or_assign(info.clone());
        if assigned {
            self.emit(ClientEvent::InternedTracepointInfo(InternedTracepointInfo {
                key,
                intern: Some(info),
            }));
        }
        self.emit(ClientEvent::TracepointEvent(TracepointEvent {
            pid: event.pid,
            tid: event.tid,
            timestamp_ns: event.timestamp_ns,
            cpu: event.cpu,
            tracepoint_info_key: key,
        }));
    }
}
