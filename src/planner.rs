//! Expands declarative host groups into a provisioning plan.
//!
//! Group order is preserved: the inventory mapper later slices the converged
//! address list positionally using this same order.

use serde::Deserialize;

use crate::config::ConfigError;

/// Host group entry as it appears in the fleet file.
///
/// Every field is optional at this level so the planner can report exactly
/// which one is missing or invalid.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct HostGroupConfig {
    /// Logical group name.
    #[serde(default)]
    pub name: Option<String>,
    /// Number of identical instances requested for the group.
    #[serde(default, alias = "number")]
    pub count: Option<i64>,
    /// Inventory roles the group's members appear under.
    #[serde(default, alias = "hostnames")]
    pub roles: Vec<String>,
    /// Size slug overriding the fleet default.
    #[serde(default)]
    pub size: Option<String>,
    /// Image slug overriding the fleet default.
    #[serde(default)]
    pub image: Option<String>,
    /// Region slug overriding the fleet default.
    #[serde(default)]
    pub region: Option<String>,
    /// Cloud-init user data overriding the fleet default.
    #[serde(default)]
    pub user_data: Option<String>,
}

/// Per-group overrides of the fleet's instance template.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InstanceOverrides {
    /// Size slug override.
    pub size: Option<String>,
    /// Image slug override.
    pub image: Option<String>,
    /// Region slug override.
    pub region: Option<String>,
    /// User data override.
    pub user_data: Option<String>,
}

/// A validated group of identically-configured instances.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HostGroup {
    name: String,
    count: usize,
    roles: Vec<String>,
    overrides: InstanceOverrides,
}

impl HostGroup {
    /// Creates a group with no template overrides.
    ///
    /// Roles are deduplicated, keeping the first occurrence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidCount`] when `count` is zero and
    /// [`ConfigError::MissingField`] when the name is blank.
    pub fn new<I, S>(name: impl Into<String>, count: usize, roles: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let trimmed = name.into().trim().to_owned();
        if trimmed.is_empty() {
            return Err(ConfigError::MissingField(String::from("host group name")));
        }
        if count == 0 {
            return Err(ConfigError::InvalidCount {
                group: trimmed,
                count: 0,
            });
        }
        Ok(Self {
            name: trimmed,
            count,
            roles: dedup_roles(roles),
            overrides: InstanceOverrides::default(),
        })
    }

    /// Attaches template overrides to the group.
    #[must_use]
    pub fn with_overrides(mut self, overrides: InstanceOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Group name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of instances requested.
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Roles in first-declared order, without duplicates.
    #[must_use]
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// Template overrides for this group.
    #[must_use]
    pub const fn overrides(&self) -> &InstanceOverrides {
        &self.overrides
    }
}

/// Ordered host groups plus their total instance count.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ProvisioningPlan {
    groups: Vec<HostGroup>,
    total_count: usize,
}

impl ProvisioningPlan {
    /// Builds a plan from already-validated groups.
    #[must_use]
    pub fn from_groups(groups: Vec<HostGroup>) -> Self {
        let total_count = groups.iter().map(HostGroup::count).sum();
        Self {
            groups,
            total_count,
        }
    }

    /// Groups in declaration order.
    #[must_use]
    pub fn groups(&self) -> &[HostGroup] {
        &self.groups
    }

    /// Sum of all group counts.
    #[must_use]
    pub const fn total_count(&self) -> usize {
        self.total_count
    }

    /// Returns `true` when the plan requests no instances.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.total_count == 0
    }
}

/// Validates raw host group entries and builds a [`ProvisioningPlan`].
///
/// Duplicate group names are allowed; each entry is tracked on its own.
///
/// # Errors
///
/// Returns [`ConfigError::MissingField`] when a group has no name or count,
/// and [`ConfigError::InvalidCount`] when a count is not positive.
pub fn plan(host_groups: &[HostGroupConfig]) -> Result<ProvisioningPlan, ConfigError> {
    host_groups
        .iter()
        .enumerate()
        .map(|(index, entry)| plan_group(index, entry))
        .collect::<Result<Vec<_>, _>>()
        .map(ProvisioningPlan::from_groups)
}

fn plan_group(index: usize, entry: &HostGroupConfig) -> Result<HostGroup, ConfigError> {
    let name = entry
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ConfigError::MissingField(format!("hosts[{index}].name")))?;
    let raw_count = entry
        .count
        .ok_or_else(|| ConfigError::MissingField(format!("hosts[{index}].count")))?;
    let count = usize::try_from(raw_count)
        .ok()
        .filter(|count| *count > 0)
        .ok_or_else(|| ConfigError::InvalidCount {
            group: name.to_owned(),
            count: raw_count,
        })?;

    let group = HostGroup::new(name, count, entry.roles.iter().map(|role| role.trim()))?;
    Ok(group.with_overrides(InstanceOverrides {
        size: entry.size.clone(),
        image: entry.image.clone(),
        region: entry.region.clone(),
        user_data: entry.user_data.clone(),
    }))
}

fn dedup_roles<I, S>(roles: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut unique: Vec<String> = Vec::new();
    for role in roles {
        let value: String = role.into();
        if !value.is_empty() && !unique.contains(&value) {
            unique.push(value);
        }
    }
    unique
}
