//! Errors raised by fleet orchestration.

use thiserror::Error;

use crate::config::ConfigError;
use crate::gateway::InstanceId;
use crate::poller::ConvergenceError;
use crate::writer::WriteError;

/// Errors produced by [`super::FleetOrchestrator`] operations, generic over
/// the gateway's error type.
#[derive(Debug, Error)]
pub enum FleetError<GatewayError>
where
    GatewayError: std::error::Error + 'static,
{
    /// Plan or template input is unusable; no provider call was made.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The selector already matches instances, so a create run would not be
    /// able to tell its own instances apart.
    #[error("{count} instances named '{selector}' already exist; destroy them first")]
    ExistingInstances {
        /// Selector that matched.
        selector: String,
        /// Number of instances found.
        count: usize,
    },
    /// A single gateway query failed.
    #[error("provider request failed: {0}")]
    Provider(#[source] GatewayError),
    /// A create batch failed part-way.
    #[error(
        "create failed after {} of {requested} requests succeeded; orphaned: [{}]",
        created.len(),
        join_ids(orphaned)
    )]
    PartialCreate {
        /// Instances the plan asked for.
        requested: usize,
        /// Ids of instances the provider accepted.
        created: Vec<InstanceId>,
        /// Ids still present because rollback was disabled or failed.
        orphaned: Vec<InstanceId>,
        /// First failure in the batch.
        #[source]
        source: GatewayError,
    },
    /// A delete batch failed part-way.
    #[error(
        "destroy failed after {} of {requested} deletes succeeded; remaining: [{}]",
        deleted.len(),
        join_ids(remaining)
    )]
    PartialDestroy {
        /// Instances targeted by the batch.
        requested: usize,
        /// Ids whose delete succeeded.
        deleted: Vec<InstanceId>,
        /// Ids that may still exist.
        remaining: Vec<InstanceId>,
        /// First failure in the batch.
        #[source]
        source: GatewayError,
    },
    /// The convergence wait failed or timed out.
    #[error(transparent)]
    Convergence(ConvergenceError<GatewayError>),
    /// Every create request succeeded but the fleet never became active.
    #[error("{source}; instances left running: [{}]", join_ids(orphaned))]
    NotConverged {
        /// Ids created by this run, none of which were cleaned up.
        orphaned: Vec<InstanceId>,
        /// Why the wait stopped.
        #[source]
        source: ConvergenceError<GatewayError>,
    },
    /// The run was interrupted. Provider-side requests already issued are
    /// left as they are.
    #[error("operation cancelled; instances left running: [{}]", join_ids(orphaned))]
    Cancelled {
        /// Ids created by this run that were not cleaned up.
        orphaned: Vec<InstanceId>,
    },
    /// The rendered inventory could not be written.
    #[error(transparent)]
    Write(#[from] WriteError),
}

fn join_ids(ids: &[InstanceId]) -> String {
    ids.iter()
        .map(InstanceId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
