//! In-memory doubles for the port traits.
//!
//! Enabled with the `testing` feature; used by the other crates' tests.

use crate::endpoint::{FaultControls, ServiceEndpoint};
use crate::ports::{
    ContainerHandle, ContainerRuntime, ContainerSpec, LogLevel, Logger, ProxyGatewayPort,
    SharedContainer, StopOptions,
};
use crate::toxic::Toxic;
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Ordered record of lifecycle events shared between doubles.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        lock(&self.0).push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        lock(&self.0).clone()
    }

    /// Position of the first event equal to `event`.
    pub fn position(&self, event: &str) -> Option<usize> {
        lock(&self.0).iter().position(|e| e == event)
    }
}

/// Container started by [`FakeRuntime`].
#[derive(Debug)]
pub struct FakeContainer {
    name: String,
    ports: HashMap<u16, u16>,
    fail_stop: bool,
    stopped: AtomicBool,
    last_stop: Mutex<Option<StopOptions>>,
    events: EventLog,
}

impl FakeContainer {
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn last_stop_options(&self) -> Option<StopOptions> {
        *lock(&self.last_stop)
    }
}

#[async_trait]
impl ContainerHandle for FakeContainer {
    fn name(&self) -> &str {
        &self.name
    }

    fn host_port(&self, container_port: u16) -> Result<u16> {
        self.ports
            .get(&container_port)
            .copied()
            .ok_or_else(|| Error::PortNotExposed {
                name: self.name.clone(),
                port: container_port,
            })
    }

    async fn stop(&self, options: StopOptions) -> Result<()> {
        self.events.push(format!("stop:{}", self.name));
        *lock(&self.last_stop) = Some(options);
        if self.fail_stop {
            return Err(Error::ContainerStop {
                name: self.name.clone(),
                message: "simulated stop failure".into(),
            });
        }
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Runtime that "starts" containers by assigning sequential host ports.
#[derive(Debug)]
pub struct FakeRuntime {
    next_port: AtomicU16,
    fixed_ports: Mutex<HashMap<u16, u16>>,
    fail_start: Mutex<HashSet<String>>,
    fail_stop: Mutex<HashSet<String>>,
    started: Mutex<Vec<Arc<FakeContainer>>>,
    specs: Mutex<Vec<ContainerSpec>>,
    events: EventLog,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::with_events(EventLog::default())
    }

    pub fn with_events(events: EventLog) -> Self {
        Self {
            next_port: AtomicU16::new(40000),
            fixed_ports: Mutex::new(HashMap::new()),
            fail_start: Mutex::new(HashSet::new()),
            fail_stop: Mutex::new(HashSet::new()),
            started: Mutex::new(Vec::new()),
            specs: Mutex::new(Vec::new()),
            events,
        }
    }

    /// Publish `container_port` on `host_port` for every container that
    /// exposes it, instead of a sequential port.
    pub fn publish_port(&self, container_port: u16, host_port: u16) {
        lock(&self.fixed_ports).insert(container_port, host_port);
    }

    /// Make starting a container whose name contains `fragment` fail.
    pub fn fail_start_of(&self, fragment: impl Into<String>) {
        lock(&self.fail_start).insert(fragment.into());
    }

    /// Make stopping a container whose name contains `fragment` fail.
    pub fn fail_stop_of(&self, fragment: impl Into<String>) {
        lock(&self.fail_stop).insert(fragment.into());
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn started(&self) -> Vec<Arc<FakeContainer>> {
        lock(&self.started).clone()
    }

    pub fn specs(&self) -> Vec<ContainerSpec> {
        lock(&self.specs).clone()
    }

    pub fn container(&self, name_fragment: &str) -> Option<Arc<FakeContainer>> {
        lock(&self.started)
            .iter()
            .find(|c| c.name.contains(name_fragment))
            .cloned()
    }

    fn matches(set: &Mutex<HashSet<String>>, name: &str) -> bool {
        lock(set).iter().any(|fragment| name.contains(fragment.as_str()))
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn start(&self, spec: ContainerSpec) -> Result<SharedContainer> {
        self.events.push(format!("start:{}", spec.name));
        if Self::matches(&self.fail_start, &spec.name) {
            return Err(Error::ContainerStart {
                name: spec.name.clone(),
                message: "simulated start failure".into(),
            });
        }

        let fixed = lock(&self.fixed_ports).clone();
        let ports = spec
            .exposed_ports
            .iter()
            .map(|port| {
                let host = fixed
                    .get(port)
                    .copied()
                    .unwrap_or_else(|| self.next_port.fetch_add(1, Ordering::SeqCst));
                (*port, host)
            })
            .collect();

        let container = Arc::new(FakeContainer {
            name: spec.name.clone(),
            ports,
            fail_stop: Self::matches(&self.fail_stop, &spec.name),
            stopped: AtomicBool::new(false),
            last_stop: Mutex::new(None),
            events: self.events.clone(),
        });
        lock(&self.started).push(container.clone());
        lock(&self.specs).push(spec);
        Ok(container)
    }
}

/// Logger that keeps every entry in memory.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    entries: Mutex<Vec<(LogLevel, Value)>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(LogLevel, Value)> {
        lock(&self.entries).clone()
    }

    pub fn at(&self, level: LogLevel) -> Vec<Value> {
        lock(&self.entries)
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, v)| v.clone())
            .collect()
    }

    fn record(&self, level: LogLevel, payload: Value) {
        lock(&self.entries).push((level, payload));
    }
}

impl Logger for RecordingLogger {
    fn trace(&self, payload: Value) {
        self.record(LogLevel::Trace, payload);
    }
    fn debug(&self, payload: Value) {
        self.record(LogLevel::Debug, payload);
    }
    fn info(&self, payload: Value) {
        self.record(LogLevel::Info, payload);
    }
    fn warn(&self, payload: Value) {
        self.record(LogLevel::Warn, payload);
    }
    fn error(&self, payload: Value) {
        self.record(LogLevel::Error, payload);
    }
    fn fatal(&self, payload: Value) {
        self.record(LogLevel::Fatal, payload);
    }
}

/// Fault controls that only record what was asked of them.
#[derive(Debug, Default)]
pub struct RecordingControls {
    toxics: Mutex<Vec<Toxic>>,
    enabled: Mutex<Vec<bool>>,
}

impl RecordingControls {
    pub fn toxics(&self) -> Vec<Toxic> {
        lock(&self.toxics).clone()
    }

    pub fn enabled_calls(&self) -> Vec<bool> {
        lock(&self.enabled).clone()
    }
}

#[async_trait]
impl FaultControls for RecordingControls {
    async fn add_toxic(&self, toxic: Toxic) -> Result<()> {
        lock(&self.toxics).push(toxic);
        Ok(())
    }

    async fn remove_toxic(&self, name: &str) -> Result<()> {
        lock(&self.toxics).retain(|t| t.name != name);
        Ok(())
    }

    async fn set_enabled(&self, enabled: bool) -> Result<()> {
        lock(&self.enabled).push(enabled);
        Ok(())
    }
}

/// Gateway handing out sequential listen ports on a fixed host.
#[derive(Debug)]
pub struct StaticGateway {
    host: String,
    next_port: AtomicU16,
    mappings: Mutex<Vec<(String, String)>>,
    controls: Mutex<HashMap<String, Arc<RecordingControls>>>,
}

impl StaticGateway {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            next_port: AtomicU16::new(18666),
            mappings: Mutex::new(Vec::new()),
            controls: Mutex::new(HashMap::new()),
        }
    }

    /// `(logical_name, upstream)` pairs in creation order.
    pub fn mappings(&self) -> Vec<(String, String)> {
        lock(&self.mappings).clone()
    }

    pub fn controls(&self, logical_name: &str) -> Option<Arc<RecordingControls>> {
        lock(&self.controls).get(logical_name).cloned()
    }
}

#[async_trait]
impl ProxyGatewayPort for StaticGateway {
    async fn create_mapping(&self, logical_name: &str, upstream: &str) -> Result<ServiceEndpoint> {
        lock(&self.mappings).push((logical_name.to_string(), upstream.to_string()));
        let controls = Arc::new(RecordingControls::default());
        lock(&self.controls).insert(logical_name.to_string(), controls.clone());
        let port = self.next_port.fetch_add(1, Ordering::SeqCst);
        Ok(ServiceEndpoint::proxied(self.host.clone(), port, controls))
    }
}
