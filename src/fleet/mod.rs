//! Fleet lifecycle orchestration.
//!
//! [`FleetOrchestrator`] sequences the planner output, batched create or
//! delete requests, the convergence wait, and the inventory mapper. Every
//! operation re-derives fleet state from the gateway's listing; nothing is
//! remembered between runs.
//!
//! Create and delete batches fan out through `buffer_unordered`, bounded by
//! [`FleetSettings::max_concurrency`]. Once a request fails, or the
//! cancellation token fires, no further requests are dispatched, but those
//! already in flight settle so their results are still recorded.

mod error;

use std::future::Future;
use std::num::NonZeroUsize;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};

use camino::Utf8Path;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ConfigError;
use crate::gateway::{CloudGateway, Instance, InstanceHandle, InstanceId, InstanceSpec};
use crate::inventory::{self, DEFAULT_INVENTORY_USER, InventoryMapping, MappingPolicy};
use crate::planner::{HostGroup, ProvisioningPlan};
use crate::poller::{
    ConvergenceError, ConvergencePoller, ConvergenceSnapshot, PollSettings, all_active,
    none_remaining,
};
use crate::progress::{ProgressReporter, progress_line};
use crate::writer::InventoryWriter;

pub use error::FleetError;

/// Default cap on concurrent create or delete requests.
pub const DEFAULT_MAX_CONCURRENCY: NonZeroUsize = match NonZeroUsize::new(10) {
    Some(value) => value,
    None => NonZeroUsize::MIN,
};

/// Engine settings shared by all orchestrator operations.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FleetSettings {
    /// Upper bound on outstanding gateway requests within a batch.
    pub max_concurrency: NonZeroUsize,
    /// Cadence and bounds of convergence waits.
    pub poll: PollSettings,
    /// Address distribution policy used by the inventory mapper.
    pub mapping_policy: MappingPolicy,
    /// SSH user written into inventory lines.
    pub inventory_user: String,
    /// Whether a failed create batch deletes the instances it created.
    pub rollback_on_failure: bool,
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            poll: PollSettings::default(),
            mapping_policy: MappingPolicy::default(),
            inventory_user: DEFAULT_INVENTORY_USER.to_owned(),
            rollback_on_failure: true,
        }
    }
}

/// Result of a successful create run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreateOutcome {
    /// Handles returned by the create batch, in completion order.
    pub created: Vec<InstanceHandle>,
    /// Snapshot on which the fleet converged.
    pub snapshot: ConvergenceSnapshot,
    /// Role to address mapping derived from the snapshot.
    pub mapping: InventoryMapping,
    /// Rendered inventory text.
    pub rendered: String,
}

/// Result of a successful destroy run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DestroyOutcome {
    /// Ids whose delete request succeeded.
    pub deleted: Vec<InstanceId>,
}

impl DestroyOutcome {
    /// Number of instances removed.
    #[must_use]
    pub fn count(&self) -> usize {
        self.deleted.len()
    }
}

/// Result of an inventory regeneration run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InventoryOutcome {
    /// Nothing matched the selector; no inventory was written.
    NoInstances,
    /// The listing was mapped and rendered.
    Mapped {
        /// Role to address mapping.
        mapping: InventoryMapping,
        /// Rendered inventory text.
        rendered: String,
    },
}

#[derive(Debug)]
struct BatchOutcome<T, E> {
    succeeded: Vec<T>,
    failure: Option<E>,
    cancelled: bool,
}

/// Drives create, destroy, list and inventory runs against a gateway.
#[derive(Debug)]
pub struct FleetOrchestrator<G, P, W> {
    gateway: G,
    progress: P,
    writer: W,
    settings: FleetSettings,
    cancel: CancellationToken,
}

impl<G, P, W> FleetOrchestrator<G, P, W>
where
    G: CloudGateway + Sync,
    P: ProgressReporter,
    W: InventoryWriter,
{
    /// Wires an orchestrator from its collaborators.
    #[must_use]
    pub fn new(gateway: G, progress: P, writer: W, settings: FleetSettings) -> Self {
        Self {
            gateway,
            progress,
            writer,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Ties batches and convergence waits to an external cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the underlying gateway.
    #[must_use]
    pub const fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Returns the engine settings.
    #[must_use]
    pub const fn settings(&self) -> &FleetSettings {
        &self.settings
    }

    /// Creates every instance in `plan`, waits until all of them are
    /// active, then maps and writes the inventory.
    ///
    /// `template` builds the create request for a member of a group. All
    /// requests are built before any provider call is made.
    ///
    /// # Errors
    ///
    /// - [`FleetError::Config`] for an empty plan or a template failure.
    /// - [`FleetError::ExistingInstances`] when `selector` already matches
    ///   instances.
    /// - [`FleetError::PartialCreate`] when a create request fails; the
    ///   convergence wait and mapper are never reached.
    /// - [`FleetError::NotConverged`] or [`FleetError::Cancelled`] from the
    ///   wait, both naming the instances this run left running, and
    ///   [`FleetError::Write`] from the writer.
    pub async fn create<T>(
        &self,
        plan: &ProvisioningPlan,
        selector: &str,
        template: T,
        output: Option<&Utf8Path>,
    ) -> Result<CreateOutcome, FleetError<G::Error>>
    where
        T: Fn(&HostGroup) -> Result<InstanceSpec, ConfigError>,
    {
        let specs = expand_specs(plan, template)?;
        let existing = self.list(selector).await?;
        if !existing.is_empty() {
            return Err(FleetError::ExistingInstances {
                selector: selector.to_owned(),
                count: existing.len(),
            });
        }

        let total = specs.len();
        info!(selector, total, "dispatching create batch");
        let batch = self
            .dispatch(specs.iter(), |spec| self.gateway.create(spec))
            .await;
        let created_ids = batch
            .succeeded
            .iter()
            .map(|handle| handle.id.clone())
            .collect::<Vec<_>>();

        if batch.cancelled {
            warn!(orphaned = created_ids.len(), "create batch cancelled");
            return Err(FleetError::Cancelled {
                orphaned: created_ids,
            });
        }
        if let Some(source) = batch.failure {
            let orphaned = if self.settings.rollback_on_failure {
                self.roll_back(&created_ids).await
            } else {
                created_ids.clone()
            };
            if !orphaned.is_empty() {
                warn!(count = orphaned.len(), ids = ?orphaned, "instances left behind");
            }
            return Err(FleetError::PartialCreate {
                requested: total,
                created: created_ids,
                orphaned,
                source,
            });
        }

        let label = format!("Creating {total} droplets");
        let snapshot = self
            .wait(selector, all_active(total), &label, total, |snapshot| {
                snapshot.active_count()
            })
            .await
            .map_err(|err| match err {
                ConvergenceError::Cancelled { .. } => FleetError::Cancelled {
                    orphaned: created_ids,
                },
                source => {
                    warn!(ids = ?created_ids, "created instances never converged");
                    FleetError::NotConverged {
                        orphaned: created_ids,
                        source,
                    }
                }
            })?;

        let mapping = inventory::map(plan, &snapshot, self.settings.mapping_policy);
        let rendered = mapping.render(&self.settings.inventory_user);
        self.writer.write(output, &rendered)?;

        Ok(CreateOutcome {
            created: batch.succeeded,
            snapshot,
            mapping,
            rendered,
        })
    }

    /// Deletes every instance matching `selector` and waits until the
    /// listing is empty. Returns at once when nothing matches.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Provider`] when the initial listing fails,
    /// [`FleetError::PartialDestroy`] when a delete fails, and
    /// [`FleetError::Convergence`] or [`FleetError::Cancelled`] from the
    /// wait.
    pub async fn destroy(&self, selector: &str) -> Result<DestroyOutcome, FleetError<G::Error>> {
        let targets = self
            .list(selector)
            .await?
            .into_iter()
            .map(|instance| instance.id)
            .collect::<Vec<_>>();
        if targets.is_empty() {
            info!(selector, "nothing to destroy");
            return Ok(DestroyOutcome::default());
        }

        let total = targets.len();
        info!(selector, total, "dispatching delete batch");
        let batch = self
            .dispatch(targets.iter(), |id| async move {
                self.gateway.delete(id).await.map(|()| id.clone())
            })
            .await;

        if batch.cancelled {
            return Err(FleetError::Cancelled {
                orphaned: Vec::new(),
            });
        }
        if let Some(source) = batch.failure {
            let remaining = targets
                .iter()
                .filter(|id| !batch.succeeded.contains(*id))
                .cloned()
                .collect();
            return Err(FleetError::PartialDestroy {
                requested: total,
                deleted: batch.succeeded,
                remaining,
                source,
            });
        }

        let label = format!("Destroying {total} droplets");
        self.wait(selector, none_remaining(), &label, total, |snapshot| {
            total.saturating_sub(snapshot.len())
        })
        .await
        .map_err(|err| match err {
            ConvergenceError::Cancelled { .. } => FleetError::Cancelled {
                orphaned: Vec::new(),
            },
            other => FleetError::Convergence(other),
        })?;

        Ok(DestroyOutcome {
            deleted: batch.succeeded,
        })
    }

    /// Lists the instances matching `selector`.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Provider`] when the gateway query fails.
    pub async fn list(&self, selector: &str) -> Result<Vec<Instance>, FleetError<G::Error>> {
        self.gateway
            .list(selector)
            .await
            .map_err(FleetError::Provider)
    }

    /// Maps the current listing onto `plan` without creating or deleting
    /// anything.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Provider`] when the listing fails and
    /// [`FleetError::Write`] when the writer fails.
    pub async fn inventory(
        &self,
        plan: &ProvisioningPlan,
        selector: &str,
        output: Option<&Utf8Path>,
    ) -> Result<InventoryOutcome, FleetError<G::Error>> {
        let instances = self.list(selector).await?;
        if instances.is_empty() {
            return Ok(InventoryOutcome::NoInstances);
        }

        let snapshot = ConvergenceSnapshot::from_listing(instances);
        let mapping = inventory::map(plan, &snapshot, self.settings.mapping_policy);
        let rendered = mapping.render(&self.settings.inventory_user);
        self.writer.write(output, &rendered)?;
        Ok(InventoryOutcome::Mapped { mapping, rendered })
    }

    async fn wait<C, D>(
        &self,
        selector: &str,
        is_converged: C,
        label: &str,
        total: usize,
        done: D,
    ) -> Result<ConvergenceSnapshot, ConvergenceError<G::Error>>
    where
        C: Fn(&ConvergenceSnapshot) -> bool,
        D: Fn(&ConvergenceSnapshot) -> usize,
    {
        let poller = ConvergencePoller::new(&self.gateway, self.settings.poll)
            .with_cancellation(self.cancel.clone());
        let result = poller
            .converge(selector, is_converged, |snapshot| {
                self.progress
                    .update(&progress_line(label, done(snapshot), total));
            })
            .await;
        if result.is_ok() {
            self.progress.finish();
        }
        result
    }

    async fn dispatch<I, F, Fut, T>(&self, items: I, op: F) -> BatchOutcome<T, G::Error>
    where
        I: IntoIterator,
        F: Fn(I::Item) -> Fut,
        Fut: Future<Output = Result<T, G::Error>>,
    {
        let aborted = AtomicBool::new(false);
        let stop = &aborted;
        let run = &op;
        let mut pending = pin!(
            stream::iter(items)
                .map(move |item| async move {
                    if stop.load(Ordering::Acquire) {
                        return None;
                    }
                    Some(run(item).await)
                })
                .buffer_unordered(self.settings.max_concurrency.get())
        );

        let mut outcome = BatchOutcome {
            succeeded: Vec::new(),
            failure: None,
            cancelled: false,
        };
        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled(), if !outcome.cancelled => {
                    outcome.cancelled = true;
                    aborted.store(true, Ordering::Release);
                    continue;
                }
                next = pending.next() => next,
            };
            match next {
                None => break,
                Some(None) => {}
                Some(Some(Ok(value))) => outcome.succeeded.push(value),
                Some(Some(Err(err))) => {
                    aborted.store(true, Ordering::Release);
                    if outcome.failure.is_none() {
                        outcome.failure = Some(err);
                    } else {
                        warn!(error = %err, "additional request failure in batch");
                    }
                }
            }
        }
        outcome
    }

    async fn roll_back(&self, created: &[InstanceId]) -> Vec<InstanceId> {
        if created.is_empty() {
            return Vec::new();
        }
        info!(count = created.len(), "rolling back partial create");
        let mut orphaned = stream::iter(created)
            .map(|id| async move { (id, self.gateway.delete(id).await) })
            .buffer_unordered(self.settings.max_concurrency.get())
            .filter_map(|(id, result)| async move {
                result.err().map(|err| {
                    warn!(id = %id, error = %err, "rollback delete failed");
                    id.clone()
                })
            })
            .collect::<Vec<_>>()
            .await;
        orphaned.sort();
        orphaned
    }
}

fn expand_specs<T>(plan: &ProvisioningPlan, template: T) -> Result<Vec<InstanceSpec>, ConfigError>
where
    T: Fn(&HostGroup) -> Result<InstanceSpec, ConfigError>,
{
    if plan.is_empty() {
        return Err(ConfigError::Invalid {
            field: String::from("hosts"),
            message: String::from("at least one host group is required"),
        });
    }
    let mut specs = Vec::with_capacity(plan.total_count());
    for group in plan.groups() {
        let spec = template(group)?;
        specs.extend(std::iter::repeat_n(spec, group.count()));
    }
    Ok(specs)
}
