//! Core library for the Cloud Shepard fleet tool.
//!
//! The crate provisions and tears down pools of DigitalOcean droplets for an
//! ephemeral cluster, waits for the provider to converge on the requested
//! state, and maps the resulting addresses back onto the configured host
//! groups as a role-grouped inventory (plan → batch create → converge →
//! map → write).

pub mod command;
pub mod config;
pub mod digitalocean;
pub mod fingerprint;
pub mod fleet;
pub mod gateway;
pub mod inventory;
pub mod planner;
pub mod poller;
pub mod progress;
pub mod test_support;
pub mod writer;

pub use command::{CommandError, CommandOutput, CommandRunner, ProcessCommandRunner};
pub use config::{ConfigError, DropletTemplate, FleetFile, ShepardConfig};
pub use digitalocean::{DigitalOceanError, DigitalOceanGateway};
pub use fingerprint::{FingerprintError, KeyFingerprinter};
pub use fleet::{
    CreateOutcome, DestroyOutcome, FleetError, FleetOrchestrator, FleetSettings, InventoryOutcome,
};
pub use gateway::{
    CloudGateway, GatewayFuture, Instance, InstanceHandle, InstanceId, InstanceSpec,
    InstanceStatus,
};
pub use inventory::{InventoryMapping, MappingPolicy};
pub use planner::{HostGroup, ProvisioningPlan};
pub use poller::{ConvergenceError, ConvergencePoller, ConvergenceSnapshot, PollSettings};
pub use progress::{ProgressReporter, SilentProgress, TerminalProgress};
pub use writer::{FileInventoryWriter, InventoryWriter, WriteError};
