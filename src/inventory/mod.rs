//! Maps converged instance addresses back onto the configured roles.
//!
//! The default policy walks the plan's groups in order and hands each group
//! the next `count` addresses from the converged list. That list is in
//! whatever order the provider returned it, so the group-to-address pairing
//! is positional, not a record of which create request produced which
//! instance.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use thiserror::Error;

use crate::planner::ProvisioningPlan;
use crate::poller::ConvergenceSnapshot;

/// Default SSH user written next to each inventory address.
pub const DEFAULT_INVENTORY_USER: &str = "root";

/// How addresses are distributed over the plan's groups.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum MappingPolicy {
    /// Consecutive slices in group order; short snapshots leave the tail
    /// groups short or empty.
    #[default]
    OrderedSlice,
    /// Like [`MappingPolicy::OrderedSlice`] but wraps around to the start of
    /// the address list when it runs out, so every group gets `count`
    /// entries as long as any address exists.
    RoundRobin,
}

impl MappingPolicy {
    /// Canonical configuration spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrderedSlice => "ordered-slice",
            Self::RoundRobin => "round-robin",
        }
    }
}

impl fmt::Display for MappingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a mapping policy name is not recognised.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("unknown mapping policy '{0}' (expected ordered-slice or round-robin)")]
pub struct UnknownPolicy(pub String);

impl FromStr for MappingPolicy {
    type Err = UnknownPolicy;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "ordered-slice" | "slice" => Ok(Self::OrderedSlice),
            "round-robin" | "cyclic" => Ok(Self::RoundRobin),
            _ => Err(UnknownPolicy(value.to_owned())),
        }
    }
}

/// Role name to ordered, duplicate-free address list.
///
/// Roles keep the order in which they were first encountered while walking
/// the plan.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InventoryMapping {
    roles: Vec<(String, Vec<Ipv4Addr>)>,
}

impl InventoryMapping {
    /// Returns `true` when no role received an address.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Number of roles in the mapping.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Addresses recorded for `role`, if any.
    #[must_use]
    pub fn addresses(&self, role: &str) -> Option<&[Ipv4Addr]> {
        self.roles
            .iter()
            .find(|(name, _)| name == role)
            .map(|(_, addresses)| addresses.as_slice())
    }

    /// Iterates roles in first-encountered order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Ipv4Addr])> {
        self.roles
            .iter()
            .map(|(name, addresses)| (name.as_str(), addresses.as_slice()))
    }

    /// Renders the mapping as bracketed role blocks separated by blank lines.
    ///
    /// Each address line reads `<address> user=<user>`.
    #[must_use]
    pub fn render(&self, user: &str) -> String {
        self.roles
            .iter()
            .map(|(role, addresses)| {
                let mut block = format!("[{role}]");
                for address in addresses {
                    block.push('\n');
                    block.push_str(&format!("{address} user={user}"));
                }
                block
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn union_into(&mut self, role: &str, addresses: &[Ipv4Addr]) {
        let index = match self.roles.iter().position(|(name, _)| name == role) {
            Some(index) => index,
            None => {
                self.roles.push((role.to_owned(), Vec::new()));
                self.roles.len() - 1
            }
        };
        if let Some((_, existing)) = self.roles.get_mut(index) {
            for address in addresses {
                if !existing.contains(address) {
                    existing.push(*address);
                }
            }
        }
    }
}

/// Builds the inventory for `plan` from a converged snapshot.
///
/// Instances without an address are skipped. An empty snapshot yields an
/// empty mapping. Under [`MappingPolicy::OrderedSlice`] a snapshot shorter
/// than the plan silently leaves the last groups short.
#[must_use]
pub fn map(
    plan: &ProvisioningPlan,
    converged: &ConvergenceSnapshot,
    policy: MappingPolicy,
) -> InventoryMapping {
    let addresses = converged
        .instances()
        .iter()
        .filter_map(|instance| instance.address)
        .collect::<Vec<_>>();
    let mut mapping = InventoryMapping::default();
    if addresses.is_empty() {
        return mapping;
    }

    let mut cursor = 0_usize;
    for group in plan.groups() {
        let slice = take_addresses(&addresses, cursor, group.count(), policy);
        cursor = cursor.saturating_add(group.count());
        for role in group.roles() {
            mapping.union_into(role, &slice);
        }
    }
    mapping
}

fn take_addresses(
    addresses: &[Ipv4Addr],
    cursor: usize,
    count: usize,
    policy: MappingPolicy,
) -> Vec<Ipv4Addr> {
    match policy {
        MappingPolicy::OrderedSlice => addresses.iter().skip(cursor).take(count).copied().collect(),
        MappingPolicy::RoundRobin => addresses
            .iter()
            .cycle()
            .skip(cursor.checked_rem(addresses.len()).unwrap_or(0))
            .take(count)
            .copied()
            .collect(),
    }
}

#[cfg(test)]
mod tests;
