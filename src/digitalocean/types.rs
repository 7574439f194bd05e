//! Wire payloads for the DigitalOcean droplet endpoints.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::gateway::{Instance, InstanceId, InstanceSpec, InstanceStatus};

#[derive(Debug, Eq, PartialEq, Serialize)]
pub(super) struct CreateDropletRequest<'a> {
    pub(super) name: &'a str,
    pub(super) region: &'a str,
    pub(super) size: &'a str,
    pub(super) image: &'a str,
    pub(super) ssh_keys: &'a [String],
    pub(super) backups: bool,
    pub(super) ipv6: bool,
    pub(super) private_networking: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) user_data: Option<&'a str>,
    pub(super) tags: &'a [String],
}

impl<'a> From<&'a InstanceSpec> for CreateDropletRequest<'a> {
    fn from(spec: &'a InstanceSpec) -> Self {
        Self {
            name: &spec.name,
            region: &spec.region,
            size: &spec.size,
            image: &spec.image,
            ssh_keys: &spec.ssh_keys,
            backups: spec.backups,
            ipv6: spec.ipv6,
            private_networking: spec.private_networking,
            user_data: spec.user_data.as_deref(),
            tags: &spec.tags,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct DropletEnvelope {
    pub(super) droplet: Droplet,
}

#[derive(Debug, Deserialize)]
pub(super) struct DropletPage {
    #[serde(default)]
    pub(super) droplets: Vec<Droplet>,
    #[serde(default)]
    pub(super) links: Links,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct Links {
    #[serde(default)]
    pub(super) pages: Option<Pages>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct Pages {
    #[serde(default)]
    pub(super) next: Option<String>,
}

impl DropletPage {
    pub(super) fn next_page(&self) -> Option<&str> {
        self.links
            .pages
            .as_ref()
            .and_then(|pages| pages.next.as_deref())
            .filter(|next| !next.is_empty())
    }
}

#[derive(Clone, Debug, Deserialize)]
pub(super) struct Droplet {
    pub(super) id: u64,
    pub(super) name: String,
    pub(super) status: String,
    #[serde(default)]
    pub(super) networks: Networks,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub(super) struct Networks {
    #[serde(default)]
    pub(super) v4: Vec<NetworkV4>,
}

#[derive(Clone, Debug, Deserialize)]
pub(super) struct NetworkV4 {
    pub(super) ip_address: String,
    #[serde(default, rename = "type")]
    pub(super) kind: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct ApiErrorBody {
    pub(super) id: Option<String>,
    pub(super) message: Option<String>,
}

pub(super) fn map_status(raw: &str) -> InstanceStatus {
    match raw {
        "new" => InstanceStatus::Pending,
        "active" => InstanceStatus::Active,
        other => InstanceStatus::Other(other.to_owned()),
    }
}

/// Picks the first public v4 address, falling back to the first v4 entry.
pub(super) fn public_address(networks: &Networks) -> Option<Ipv4Addr> {
    networks
        .v4
        .iter()
        .find(|network| network.kind == "public")
        .or_else(|| networks.v4.first())
        .and_then(|network| network.ip_address.parse().ok())
}

impl From<Droplet> for Instance {
    fn from(droplet: Droplet) -> Self {
        let address = public_address(&droplet.networks);
        Self {
            id: InstanceId::new(droplet.id.to_string()),
            name: droplet.name,
            status: map_status(&droplet.status),
            address,
        }
    }
}
