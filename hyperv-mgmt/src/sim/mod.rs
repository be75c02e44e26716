//! In-process simulated Hyper-V host.
//!
//! Implements the part of the virtualization namespace used by the resource
//! controllers: virtual systems and their settings, switches, disk images and
//! jobs. Faults can be injected per method, and every remote interaction is
//! counted so callers can assert exactly what was sent.

mod methods;
mod state;

pub use state::{DEFAULT_EXTERNAL_PORT, SIM_HOST_NAME, SimJob, SimObject, SimState};

use crate::handle::ObjectPath;
use crate::job::JobState;
use crate::query::Query;
use crate::session::{ServiceRole, VIRTUALIZATION_NAMESPACE};
use crate::transport::{Connection, ManagementTransport, RawInstance, TransportError};
use crate::value::{PropertyMap, Value};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Sequence of states a scripted job reports, one per poll.
#[derive(Debug, Clone, PartialEq)]
pub struct JobScript {
    states: Vec<JobState>,
    error_description: String,
}

impl JobScript {
    /// The last state repeats once reached.
    pub fn new(states: Vec<JobState>) -> Self {
        Self {
            states,
            error_description: String::new(),
        }
    }

    /// Reports `Completed` on poll number `polls`, `Running` before.
    pub fn completes_after(polls: usize) -> Self {
        let mut states = vec![JobState::Running; polls.saturating_sub(1)];
        states.push(JobState::Completed);
        Self::new(states)
    }

    /// Runs once, then ends in `state` with `description`.
    pub fn fails_with(state: JobState, description: &str) -> Self {
        Self {
            states: vec![JobState::Running, state],
            error_description: description.to_string(),
        }
    }

    fn succeeds(&self) -> bool {
        self.states.last().is_some_and(JobState::is_successful)
    }
}

/// Counters of remote interactions since creation or the last reset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimStats {
    pub connects: usize,
    pub closes: usize,
    pub queries: usize,
    pub gets: usize,
    pub job_polls: usize,
    pub invocations: Vec<String>,
}

impl SimStats {
    pub fn calls_to(&self, method: &str) -> usize {
        self.invocations.iter().filter(|m| *m == method).count()
    }

    /// Everything that would have crossed the wire.
    pub fn remote_operations(&self) -> usize {
        self.connects + self.queries + self.gets + self.invocations.len()
    }
}

#[derive(Debug, Default)]
struct Faults {
    connect: Option<TransportError>,
    query: Option<TransportError>,
    method_codes: HashMap<String, u32>,
    targeted_codes: Vec<(String, String, u32)>,
    job_scripts: HashMap<String, JobScript>,
}

impl Faults {
    fn return_code(&self, method: &str, params: &PropertyMap) -> Option<u32> {
        if let Some(code) = self.method_codes.get(method) {
            return Some(*code);
        }
        self.targeted_codes
            .iter()
            .find(|(m, needle, _)| m == method && params.values().any(|v| mentions(v, needle)))
            .map(|(_, _, code)| *code)
    }
}

fn mentions(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(s) => s.contains(needle),
        Value::Path(p) => p.as_str().contains(needle),
        Value::StringList(items) => items.iter().any(|s| s.contains(needle)),
        Value::PathList(paths) => paths.iter().any(|p| p.as_str().contains(needle)),
        Value::Object(obj) => obj.properties.values().any(|v| mentions(v, needle)),
        Value::ObjectList(objs) => objs.iter().any(|o| o.properties.values().any(|v| mentions(v, needle))),
        Value::UInt(n) => n.to_string() == needle,
        Value::Int(n) => n.to_string() == needle,
        Value::Null | Value::Bool(_) => false,
    }
}

#[derive(Debug)]
struct Inner {
    state: SimState,
    faults: Faults,
    stats: SimStats,
}

/// A simulated host; clones share the same state.
#[derive(Debug, Clone)]
pub struct SimulatedHost {
    inner: Arc<Mutex<Inner>>,
}

impl Default for SimulatedHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedHost {
    pub fn new() -> Self {
        Self::with_state(SimState::seeded())
    }

    pub fn with_state(state: SimState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state,
                faults: Faults::default(),
                stats: SimStats::default(),
            })),
        }
    }

    /// Load persisted state, or start from a freshly seeded host if the file does not exist.
    pub async fn load(path: &Path) -> io::Result<Self> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let state: SimState = serde_json::from_slice(&bytes).map_err(io::Error::other)?;
                debug!(path = %path.display(), objects = state.objects.len(), "Loaded simulated host state");
                Ok(Self::with_state(state))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(e),
        }
    }

    pub async fn save(&self, path: &Path) -> io::Result<()> {
        let bytes = serde_json::to_vec_pretty(&self.lock().state).map_err(io::Error::other)?;
        tokio::fs::write(path, bytes).await
    }

    pub fn snapshot(&self) -> SimState {
        self.lock().state.clone()
    }

    pub fn stats(&self) -> SimStats {
        self.lock().stats.clone()
    }

    pub fn reset_stats(&self) {
        self.lock().stats = SimStats::default();
    }

    pub fn fail_connect(&self, error: TransportError) {
        self.lock().faults.connect = Some(error);
    }

    pub fn fail_queries(&self, error: TransportError) {
        self.lock().faults.query = Some(error);
    }

    /// Every call to `method` returns `code`.
    pub fn fail_method(&self, method: &str, code: u32) {
        self.lock().faults.method_codes.insert(method.to_string(), code);
    }

    /// Calls to `method` whose parameters mention `needle` return `code`.
    ///
    /// Text matches by substring, integers only by their exact value.
    pub fn fail_method_when(&self, method: &str, needle: &str, code: u32) {
        self.lock()
            .faults
            .targeted_codes
            .push((method.to_string(), needle.to_string(), code));
    }

    /// Calls to `method` start a job that follows `script`.
    pub fn run_as_job(&self, method: &str, script: JobScript) {
        self.lock().faults.job_scripts.insert(method.to_string(), script);
    }

    pub fn clear_faults(&self) {
        self.lock().faults = Faults::default();
    }

    pub fn remove_service(&self, role: ServiceRole) {
        let mut inner = self.lock();
        let paths: Vec<ObjectPath> = inner
            .state
            .objects
            .iter()
            .filter(|(_, obj)| obj.class == role.class_name())
            .map(|(p, _)| p.clone())
            .collect();
        for path in paths {
            inner.state.remove(&path);
        }
    }

    pub fn add_external_port(&self, name: &str) -> ObjectPath {
        self.lock().state.add_external_port(name)
    }

    pub fn add_file(&self, name: &str, size: u64) -> ObjectPath {
        self.lock().state.add_file(name, size)
    }

    /// Current instances of `class` matching `query`, bypassing the counters.
    pub fn find(&self, query: &Query) -> Vec<RawInstance> {
        self.lock().state.query(query)
    }

    pub fn count(&self, class: &str) -> usize {
        self.lock().state.objects.values().filter(|obj| obj.class == class).count()
    }

    /// Overwrite one property of an object, e.g. to simulate drift.
    pub fn set_property(&self, path: &ObjectPath, key: &str, value: Value) -> bool {
        match self.lock().state.get_mut(path) {
            Some(obj) => {
                obj.properties.insert(key.to_string(), value);
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ManagementTransport for SimulatedHost {
    async fn connect(&self, host: &str, namespace: &str) -> Result<Box<dyn Connection>, TransportError> {
        {
            let mut inner = self.lock();
            if let Some(error) = inner.faults.connect.clone() {
                return Err(error);
            }
            if !namespace.eq_ignore_ascii_case(VIRTUALIZATION_NAMESPACE) {
                return Err(TransportError::InvalidNamespace(namespace.to_string()));
            }
            inner.stats.connects += 1;
        }
        debug!(host, namespace, "Simulated host accepted connection");
        Ok(Box::new(SimConnection {
            host: self.clone(),
            open: AtomicBool::new(true),
        }))
    }
}

struct SimConnection {
    host: SimulatedHost,
    open: AtomicBool,
}

impl SimConnection {
    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(TransportError::Failed("connection is closed".to_string()))
        }
    }
}

#[async_trait]
impl Connection for SimConnection {
    async fn query(&self, query: &Query) -> Result<Vec<RawInstance>, TransportError> {
        self.ensure_open()?;
        let mut inner = self.host.lock();
        inner.stats.queries += 1;
        if let Some(error) = inner.faults.query.clone() {
            return Err(error);
        }
        Ok(inner.state.query(query))
    }

    async fn get(&self, path: &ObjectPath) -> Result<Option<RawInstance>, TransportError> {
        self.ensure_open()?;
        let mut inner = self.host.lock();
        inner.stats.gets += 1;
        if inner.state.is_job(path) {
            inner.stats.job_polls += 1;
            return Ok(inner.state.poll_job(path));
        }
        Ok(inner.state.instance(path))
    }

    async fn invoke(&self, target: &ObjectPath, method: &str, params: PropertyMap) -> Result<PropertyMap, TransportError> {
        self.ensure_open()?;
        let mut guard = self.host.lock();
        let inner = &mut *guard;
        inner.stats.invocations.push(method.to_string());

        if let Some(code) = inner.faults.return_code(method, &params) {
            return Ok(return_value(PropertyMap::new(), code));
        }

        let Some(script) = inner.faults.job_scripts.get(method).cloned() else {
            return Ok(match methods::dispatch(&mut inner.state, target, method, &params)? {
                Ok(outputs) => return_value(outputs, 0),
                Err(code) => return_value(PropertyMap::new(), code),
            });
        };

        // A job that is scripted to fail leaves the host untouched.
        let outputs = if script.succeeds() {
            match methods::dispatch(&mut inner.state, target, method, &params)? {
                Ok(outputs) => outputs,
                Err(code) => return Ok(return_value(PropertyMap::new(), code)),
            }
        } else {
            PropertyMap::new()
        };
        let job = inner.state.add_job(script.states, &script.error_description);
        let mut outputs = return_value(outputs, 4096);
        outputs.insert("Job".to_string(), Value::Path(job));
        Ok(outputs)
    }

    async fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            self.host.lock().stats.closes += 1;
        }
    }
}

fn return_value(mut outputs: PropertyMap, code: u32) -> PropertyMap {
    outputs.insert("ReturnValue".to_string(), Value::from(code));
    outputs
}
