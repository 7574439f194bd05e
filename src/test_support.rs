//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::command::{CommandError, CommandOutput, CommandRunner};
use crate::gateway::{
    CloudGateway, GatewayFuture, Instance, InstanceHandle, InstanceId, InstanceSpec,
    InstanceStatus,
};
use crate::progress::ProgressReporter;
use crate::writer::{InventoryWriter, WriteError};

/// Builds an active instance with the given id and address.
#[must_use]
pub fn active_instance(id: &str, address: Ipv4Addr) -> Instance {
    Instance {
        id: InstanceId::from(id),
        name: String::from("cloud_shepard"),
        status: InstanceStatus::Active,
        address: Some(address),
    }
}

/// Builds a pending instance without an address.
#[must_use]
pub fn pending_instance(id: &str) -> Instance {
    Instance {
        id: InstanceId::from(id),
        name: String::from("cloud_shepard"),
        status: InstanceStatus::Pending,
        address: None,
    }
}

/// Builds `count` active instances addressed `10.0.0.1`, `10.0.0.2`, ...
#[must_use]
pub fn active_fleet(count: u8) -> Vec<Instance> {
    (1..=count)
        .map(|n| active_instance(&format!("i-{n}"), Ipv4Addr::new(10, 0, 0, n)))
        .collect()
}

/// Failure raised by [`ScriptedGateway`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScriptedGatewayError {
    /// A create call was scripted to fail.
    #[error("scripted create failure on call {0}")]
    Create(usize),
    /// A delete call was scripted to fail.
    #[error("scripted delete failure for {0}")]
    Delete(InstanceId),
    /// A list call was scripted to fail.
    #[error("scripted list failure: {0}")]
    List(String),
}

#[derive(Debug, Default)]
struct GatewayState {
    list_responses: VecDeque<Result<Vec<Instance>, ScriptedGatewayError>>,
    last_listing: Vec<Instance>,
    list_filters: Vec<String>,
    create_calls: usize,
    failing_creates: BTreeSet<usize>,
    created: Vec<(InstanceId, InstanceSpec)>,
    deleted: Vec<InstanceId>,
    failing_deletes: BTreeSet<InstanceId>,
    in_flight: usize,
    peak_in_flight: usize,
}

impl GatewayState {
    fn enter(&mut self) {
        self.in_flight += 1;
        self.peak_in_flight = self.peak_in_flight.max(self.in_flight);
    }
}

/// Scripted [`CloudGateway`] that replays queued list responses and records
/// every create and delete.
///
/// Once the list queue is drained, the last successful listing is repeated.
/// Created instances receive ids `new-1`, `new-2`, ... in call order.
/// Create and delete calls yield once before settling, so overlapping
/// requests show up in [`ScriptedGateway::peak_in_flight`].
#[derive(Clone, Debug, Default)]
pub struct ScriptedGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl ScriptedGateway {
    /// Creates a gateway whose listing is empty until scripted otherwise.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues a successful list response.
    pub fn push_listing(&self, instances: Vec<Instance>) {
        self.state().list_responses.push_back(Ok(instances));
    }

    /// Queues a failing list response.
    pub fn push_list_error(&self, message: &str) {
        self.state()
            .list_responses
            .push_back(Err(ScriptedGatewayError::List(message.to_owned())));
    }

    /// Makes the `call`-th create request (1-based) fail.
    pub fn fail_create_call(&self, call: usize) {
        self.state().failing_creates.insert(call);
    }

    /// Makes deleting `id` fail.
    pub fn fail_delete_of(&self, id: &str) {
        self.state().failing_deletes.insert(InstanceId::from(id));
    }

    /// Number of create requests received.
    #[must_use]
    pub fn create_calls(&self) -> usize {
        self.state().create_calls
    }

    /// Ids and specs of successfully created instances, in call order.
    #[must_use]
    pub fn created(&self) -> Vec<(InstanceId, InstanceSpec)> {
        self.state().created.clone()
    }

    /// Ids passed to successful delete requests.
    #[must_use]
    pub fn deleted(&self) -> Vec<InstanceId> {
        self.state().deleted.clone()
    }

    /// Number of list requests received.
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.state().list_filters.len()
    }

    /// Highest number of create or delete requests outstanding at once.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.state().peak_in_flight
    }

    async fn settle<T>(&self, result: T) -> T {
        tokio::task::yield_now().await;
        self.state().in_flight -= 1;
        result
    }

    /// Name filters passed to list requests, in call order.
    #[must_use]
    pub fn list_filters(&self) -> Vec<String> {
        self.state().list_filters.clone()
    }
}

impl CloudGateway for ScriptedGateway {
    type Error = ScriptedGatewayError;

    fn create<'a>(
        &'a self,
        spec: &'a InstanceSpec,
    ) -> GatewayFuture<'a, InstanceHandle, Self::Error> {
        Box::pin(async move {
            let result = {
                let mut state = self.state();
                state.enter();
                state.create_calls += 1;
                let call = state.create_calls;
                if state.failing_creates.contains(&call) {
                    Err(ScriptedGatewayError::Create(call))
                } else {
                    let id = InstanceId::new(format!("new-{call}"));
                    state.created.push((id.clone(), spec.clone()));
                    Ok(InstanceHandle {
                        id,
                        name: spec.name.clone(),
                    })
                }
            };
            self.settle(result).await
        })
    }

    fn delete<'a>(&'a self, id: &'a InstanceId) -> GatewayFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let result = {
                let mut state = self.state();
                state.enter();
                if state.failing_deletes.contains(id) {
                    Err(ScriptedGatewayError::Delete(id.clone()))
                } else {
                    state.deleted.push(id.clone());
                    Ok(())
                }
            };
            self.settle(result).await
        })
    }

    fn list<'a>(&'a self, name_filter: &'a str) -> GatewayFuture<'a, Vec<Instance>, Self::Error> {
        Box::pin(async move {
            let mut state = self.state();
            state.list_filters.push(name_filter.to_owned());
            match state.list_responses.pop_front() {
                Some(Ok(instances)) => {
                    state.last_listing.clone_from(&instances);
                    Ok(instances)
                }
                Some(Err(err)) => Err(err),
                None => Ok(state.last_listing.clone()),
            }
        })
    }
}

/// Progress reporter that records every update for assertions.
#[derive(Clone, Debug, Default)]
pub struct RecordingProgress {
    lines: Arc<Mutex<Vec<String>>>,
    finished: Arc<Mutex<usize>>,
}

impl RecordingProgress {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Status lines received so far.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of completion notices received.
    #[must_use]
    pub fn finished(&self) -> usize {
        *self.finished.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProgressReporter for RecordingProgress {
    fn update(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_owned());
    }

    fn finish(&self) {
        *self.finished.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }
}

/// Writer that keeps inventory writes in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryWriter {
    writes: Arc<Mutex<Vec<(Option<String>, String)>>>,
}

impl MemoryWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded `(path, content)` pairs.
    #[must_use]
    pub fn writes(&self) -> Vec<(Option<String>, String)> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl InventoryWriter for MemoryWriter {
    fn write(&self, path: Option<&camino::Utf8Path>, content: &str) -> Result<(), WriteError> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((path.map(|p| p.as_str().to_owned()), content.to_owned()));
        Ok(())
    }
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: std::rc::Rc<std::cell::RefCell<VecDeque<CommandOutput>>>,
    invocations: std::rc::Rc<std::cell::RefCell<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations.borrow().clone()
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.responses.borrow_mut().push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, CommandError> {
        self.invocations.borrow_mut().push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| CommandError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
