//! Gateway abstraction over the cloud provider's instance API.
//!
//! The fleet engine only ever needs three capabilities from a provider:
//! create one instance, delete one instance by id, and list the instances
//! matching a name filter. Everything else (status semantics, address
//! selection, pagination) is resolved by the concrete gateway.

use std::fmt;
use std::future::Future;
use std::net::Ipv4Addr;
use std::pin::Pin;

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Opaque provider identifier for an instance.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Wraps a provider identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<String> for InstanceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for InstanceId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl AsRef<str> for InstanceId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status reported by the provider, reduced to what convergence
/// needs to distinguish. Serialises as its display text.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InstanceStatus {
    /// The instance exists but is still booting.
    Pending,
    /// The instance is up and serving.
    Active,
    /// Any other provider status, kept verbatim.
    Other(String),
}

impl InstanceStatus {
    /// Returns `true` for [`InstanceStatus::Active`].
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Active => f.write_str("active"),
            Self::Other(raw) => f.write_str(raw),
        }
    }
}

impl Serialize for InstanceStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Provider-observed instance. The engine only reads snapshots of these.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Instance {
    /// Provider identifier.
    pub id: InstanceId,
    /// Instance name as registered with the provider.
    pub name: String,
    /// Current lifecycle status.
    pub status: InstanceStatus,
    /// Public IPv4 address, once one has been assigned.
    pub address: Option<Ipv4Addr>,
}

/// Parameters required to create a single instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceSpec {
    /// Name shared by every instance of the fleet; it doubles as the list
    /// selector.
    pub name: String,
    /// Provider region slug (for example `lon1`).
    pub region: String,
    /// Size slug (for example `512mb`).
    pub size: String,
    /// Image slug (for example `ubuntu-15-10-x64`).
    pub image: String,
    /// SSH key fingerprints to authorise on the instance.
    pub ssh_keys: Vec<String>,
    /// Whether provider-side backups are enabled.
    pub backups: bool,
    /// Whether an IPv6 address is requested.
    pub ipv6: bool,
    /// Whether private networking is requested.
    pub private_networking: bool,
    /// Optional cloud-init user data.
    pub user_data: Option<String>,
    /// Provider tags attached to the instance.
    pub tags: Vec<String>,
}

impl InstanceSpec {
    /// Starts a builder for an [`InstanceSpec`].
    #[must_use]
    pub fn builder() -> InstanceSpecBuilder {
        InstanceSpecBuilder::new()
    }

    /// Validates the request, returning the first empty required field.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError::Validation`] when a required string is empty.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.name.is_empty() {
            return Err(SpecError::Validation("name".to_owned()));
        }
        if self.region.is_empty() {
            return Err(SpecError::Validation("region".to_owned()));
        }
        if self.size.is_empty() {
            return Err(SpecError::Validation("size".to_owned()));
        }
        if self.image.is_empty() {
            return Err(SpecError::Validation("image".to_owned()));
        }
        Ok(())
    }
}

/// Builder for [`InstanceSpec`] that trims and validates on construction.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InstanceSpecBuilder {
    name: String,
    region: String,
    size: String,
    image: String,
    ssh_keys: Vec<String>,
    backups: bool,
    ipv6: bool,
    private_networking: bool,
    user_data: Option<String>,
    tags: Vec<String>,
}

impl InstanceSpecBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the instance name.
    #[must_use]
    pub fn name(mut self, value: impl Into<String>) -> Self {
        self.name = value.into();
        self
    }

    /// Sets the region slug.
    #[must_use]
    pub fn region(mut self, value: impl Into<String>) -> Self {
        self.region = value.into();
        self
    }

    /// Sets the size slug.
    #[must_use]
    pub fn size(mut self, value: impl Into<String>) -> Self {
        self.size = value.into();
        self
    }

    /// Sets the image slug.
    #[must_use]
    pub fn image(mut self, value: impl Into<String>) -> Self {
        self.image = value.into();
        self
    }

    /// Sets the SSH key fingerprints.
    #[must_use]
    pub fn ssh_keys(mut self, value: Vec<String>) -> Self {
        self.ssh_keys = value;
        self
    }

    /// Enables or disables provider backups.
    #[must_use]
    pub const fn backups(mut self, value: bool) -> Self {
        self.backups = value;
        self
    }

    /// Enables or disables IPv6.
    #[must_use]
    pub const fn ipv6(mut self, value: bool) -> Self {
        self.ipv6 = value;
        self
    }

    /// Enables or disables private networking.
    #[must_use]
    pub const fn private_networking(mut self, value: bool) -> Self {
        self.private_networking = value;
        self
    }

    /// Sets optional cloud-init user data.
    #[must_use]
    pub fn user_data(mut self, value: Option<String>) -> Self {
        self.user_data = value;
        self
    }

    /// Sets provider tags.
    #[must_use]
    pub fn tags(mut self, value: Vec<String>) -> Self {
        self.tags = value;
        self
    }

    /// Builds and validates the [`InstanceSpec`], trimming string inputs.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError::Validation`] when a required field is empty.
    pub fn build(self) -> Result<InstanceSpec, SpecError> {
        let spec = InstanceSpec {
            name: self.name.trim().to_owned(),
            region: self.region.trim().to_owned(),
            size: self.size.trim().to_owned(),
            image: self.image.trim().to_owned(),
            ssh_keys: self.ssh_keys,
            backups: self.backups,
            ipv6: self.ipv6,
            private_networking: self.private_networking,
            user_data: self.user_data.filter(|data| !data.trim().is_empty()),
            tags: self.tags,
        };
        spec.validate()?;
        Ok(spec)
    }
}

/// Handle returned by a gateway once a create request was accepted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceHandle {
    /// Provider identifier of the new instance.
    pub id: InstanceId,
    /// Name the instance was created with.
    pub name: String,
}

/// Errors raised while assembling instance specs.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum SpecError {
    /// Raised when a spec is missing a required field.
    #[error("missing or empty field: {0}")]
    Validation(String),
}

/// Future returned by gateway operations.
pub type GatewayFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Minimal interface implemented by cloud providers.
///
/// Implementations must tolerate many outstanding requests at once: the
/// orchestrator fans create and delete batches out concurrently.
pub trait CloudGateway {
    /// Provider specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Requests a new instance and returns its handle.
    fn create<'a>(&'a self, spec: &'a InstanceSpec)
    -> GatewayFuture<'a, InstanceHandle, Self::Error>;

    /// Deletes the instance with the given id.
    fn delete<'a>(&'a self, id: &'a InstanceId) -> GatewayFuture<'a, (), Self::Error>;

    /// Lists the instances whose name matches `name_filter`.
    fn list<'a>(&'a self, name_filter: &'a str) -> GatewayFuture<'a, Vec<Instance>, Self::Error>;
}
