//! Subcommands and flags of `cloud-shepard`.
//!
//! Every subcommand takes the fleet file and API key through [`FleetArgs`].
//! `build.rs` includes this file by path to render the man pages, so it must
//! not depend on anything from the library crate.

use clap::{Args, Parser};

/// Top-level CLI for the `cloud-shepard` binary.
#[derive(Debug, Parser)]
#[command(
    name = "cloud-shepard",
    about = "Provision DigitalOcean droplet fleets and emit role-grouped inventories",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Create the fleet, wait until every droplet is active, and print the
    /// inventory.
    #[command(name = "create")]
    Create(CreateCommand),
    /// Delete every droplet of the fleet and wait until none remain.
    #[command(name = "destroy")]
    Destroy(FleetArgs),
    /// Print the droplets currently matching the fleet name as JSON.
    #[command(name = "list")]
    List(FleetArgs),
    /// Regenerate the inventory for an already running fleet.
    #[command(name = "inventory")]
    Inventory(InventoryCommand),
}

/// Options shared by every subcommand.
#[derive(Args, Debug)]
pub(crate) struct FleetArgs {
    /// Fleet file describing the droplet template and host groups.
    #[arg(short = 'c', long = "config", value_name = "PATH", default_value = "cloud_shepard.json")]
    pub(crate) config: String,
    /// DigitalOcean API key; overrides the fleet file and `SHEPARD_API_KEY`.
    #[arg(short = 'p', long = "api-key", value_name = "TOKEN")]
    pub(crate) api_key: Option<String>,
}

/// Arguments for `cloud-shepard create`.
#[derive(Args, Debug)]
pub(crate) struct CreateCommand {
    #[command(flatten)]
    pub(crate) fleet: FleetArgs,
    /// Public SSH key authorised on every droplet.
    #[arg(short = 's', long = "ssh-key", value_name = "PATH")]
    pub(crate) ssh_key: Option<String>,
    /// Also write the inventory to this file.
    #[arg(short = 'w', long = "write-inventory-to", value_name = "PATH")]
    pub(crate) write_inventory_to: Option<String>,
    /// Address mapping policy (`ordered-slice` or `round-robin`).
    #[arg(long, value_name = "POLICY")]
    pub(crate) policy: Option<String>,
}

/// Arguments for `cloud-shepard inventory`.
#[derive(Args, Debug)]
pub(crate) struct InventoryCommand {
    #[command(flatten)]
    pub(crate) fleet: FleetArgs,
    /// Also write the inventory to this file.
    #[arg(short = 'w', long = "write-inventory-to", value_name = "PATH")]
    pub(crate) write_inventory_to: Option<String>,
    /// Address mapping policy (`ordered-slice` or `round-robin`).
    #[arg(long, value_name = "POLICY")]
    pub(crate) policy: Option<String>,
}
