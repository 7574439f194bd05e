//! Configuration loading.
//!
//! Two sources feed a run. The fleet file (JSON, `cloud_shepard.json` by
//! default) declares the droplet template and host groups. Engine settings
//! and credentials are layered through `ortho-config` from defaults,
//! `cloud-shepard.toml`, and `SHEPARD_*` environment variables.

use std::num::NonZeroUsize;
use std::time::Duration;

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::fleet::FleetSettings;
use crate::gateway::InstanceSpec;
use crate::inventory::MappingPolicy;
use crate::planner::{self, HostGroup, HostGroupConfig, ProvisioningPlan};
use crate::poller::PollSettings;

/// Fleet file read when no `--config` is given.
pub const DEFAULT_FLEET_FILE: &str = "cloud_shepard.json";

/// DigitalOcean API root.
pub const DEFAULT_API_BASE: &str = "https://api.digitalocean.com/v2";

/// Engine settings and credentials layered via `ortho-config`.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "SHEPARD",
    discovery(
        app_name = "cloud-shepard",
        env_var = "SHEPARD_CONFIG_PATH",
        config_file_name = "cloud-shepard.toml",
        dotfile_name = ".cloud-shepard.toml",
        project_file_name = "cloud-shepard.toml"
    )
)]
pub struct ShepardConfig {
    /// DigitalOcean API token.
    pub api_key: Option<String>,
    /// Public SSH key file authorised on created droplets.
    pub ssh_key: Option<String>,
    /// API root; overridable for testing against a stub server.
    #[ortho_config(default = DEFAULT_API_BASE.to_owned())]
    pub api_base: String,
    /// Upper bound on concurrent create or delete requests.
    #[ortho_config(default = 10)]
    pub max_concurrency: u32,
    /// Delay between convergence polls, in milliseconds.
    #[ortho_config(default = 1500)]
    pub poll_interval_ms: u32,
    /// Convergence deadline in seconds; zero waits without a deadline.
    #[ortho_config(default = 600)]
    pub converge_timeout_secs: u32,
    /// Address distribution policy (`ordered-slice` or `round-robin`).
    #[ortho_config(default = "ordered-slice".to_owned())]
    pub mapping_policy: String,
    /// SSH user written into inventory lines.
    #[ortho_config(default = "root".to_owned())]
    pub inventory_user: String,
    /// Whether a failed create batch deletes the droplets it did create.
    #[ortho_config(default = true)]
    pub rollback_on_failure: bool,
    /// Path to the `ssh-keygen` executable.
    #[ortho_config(default = "ssh-keygen".to_owned())]
    pub ssh_keygen_bin: String,
}

/// Metadata for a credential, used to build actionable error messages.
struct FieldMetadata {
    description: &'static str,
    flag: &'static str,
    env_var: &'static str,
    key: &'static str,
}

const API_KEY_FIELD: FieldMetadata = FieldMetadata {
    description: "DigitalOcean API key",
    flag: "--api-key",
    env_var: "SHEPARD_API_KEY",
    key: "api_key",
};

const SSH_KEY_FIELD: FieldMetadata = FieldMetadata {
    description: "ssh key",
    flag: "--ssh-key",
    env_var: "SHEPARD_SSH_KEY",
    key: "ssh_key",
};

impl ShepardConfig {
    /// Loads configuration without parsing CLI arguments. Values merge
    /// defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("cloud-shepard")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Validates the engine settings and converts them for the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for zero concurrency, a zero poll
    /// interval, or an unknown mapping policy, and
    /// [`ConfigError::MissingField`] for a blank inventory user.
    pub fn fleet_settings(&self) -> Result<FleetSettings, ConfigError> {
        let max_concurrency = usize::try_from(self.max_concurrency)
            .ok()
            .and_then(NonZeroUsize::new)
            .ok_or_else(|| ConfigError::Invalid {
                field: String::from("max_concurrency"),
                message: String::from("must be at least 1"),
            })?;
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: String::from("poll_interval_ms"),
                message: String::from("must be at least 1"),
            });
        }
        let timeout = (self.converge_timeout_secs > 0)
            .then(|| Duration::from_secs(u64::from(self.converge_timeout_secs)));
        let poll = PollSettings::new(Duration::from_millis(u64::from(self.poll_interval_ms)))
            .with_timeout(timeout);
        let mapping_policy = self.mapping_policy()?;
        let inventory_user = self.inventory_user.trim();
        if inventory_user.is_empty() {
            return Err(ConfigError::MissingField(String::from(
                "inventory user: set SHEPARD_INVENTORY_USER or add inventory_user to cloud-shepard.toml",
            )));
        }

        Ok(FleetSettings {
            max_concurrency,
            poll,
            mapping_policy,
            inventory_user: inventory_user.to_owned(),
            rollback_on_failure: self.rollback_on_failure,
        })
    }

    /// Parses the configured mapping policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the name is not recognised.
    pub fn mapping_policy(&self) -> Result<MappingPolicy, ConfigError> {
        self.mapping_policy
            .parse::<MappingPolicy>()
            .map_err(|err| ConfigError::Invalid {
                field: String::from("mapping_policy"),
                message: err.to_string(),
            })
    }

    /// Resolves the API key: CLI flag, then fleet file, then layered config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] naming every place the key can
    /// be supplied when none of them holds a value.
    pub fn resolve_api_key(
        &self,
        cli: Option<&str>,
        fleet: &FleetFile,
    ) -> Result<String, ConfigError> {
        resolve(
            [cli, fleet.api_key.as_deref(), self.api_key.as_deref()],
            &API_KEY_FIELD,
        )
    }

    /// Resolves the SSH public key path with the same precedence as the API
    /// key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when no source holds a value.
    pub fn resolve_ssh_key(
        &self,
        cli: Option<&str>,
        fleet: &FleetFile,
    ) -> Result<String, ConfigError> {
        resolve(
            [cli, fleet.ssh_key.as_deref(), self.ssh_key.as_deref()],
            &SSH_KEY_FIELD,
        )
    }
}

fn resolve(candidates: [Option<&str>; 3], metadata: &FieldMetadata) -> Result<String, ConfigError> {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| {
            ConfigError::MissingField(format!(
                "missing {}: pass {}, set {}, or add {} to the fleet file or cloud-shepard.toml",
                metadata.description, metadata.flag, metadata.env_var, metadata.key
            ))
        })
}

/// Parsed fleet file.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct FleetFile {
    /// API key embedded in the fleet file.
    #[serde(default, alias = "apiKey")]
    pub api_key: Option<String>,
    /// SSH public key path embedded in the fleet file.
    #[serde(default, alias = "sshKey")]
    pub ssh_key: Option<String>,
    /// Droplet template and host groups.
    #[serde(default)]
    pub droplets: DropletTemplate,
}

impl FleetFile {
    /// Parses a fleet file from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON and
    /// [`ConfigError::MissingField`] for a blank droplet name.
    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        let fleet: Self =
            serde_json::from_str(contents).map_err(|err| ConfigError::Parse(err.to_string()))?;
        fleet.droplets.validate()?;
        Ok(fleet)
    }

    /// Reads and parses the fleet file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read, otherwise
    /// the errors of [`FleetFile::from_json`].
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let parent = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        let file_name = path.file_name().ok_or_else(|| ConfigError::Io {
            path: path.to_string(),
            message: String::from("fleet file path is missing a file name"),
        })?;
        let contents = Dir::open_ambient_dir(parent, ambient_authority())
            .and_then(|dir| dir.read_to_string(file_name))
            .map_err(|err| ConfigError::Io {
                path: path.to_string(),
                message: err.to_string(),
            })?;
        Self::from_json(&contents)
    }

    /// Builds the provisioning plan from the declared host groups.
    ///
    /// # Errors
    ///
    /// Propagates planner validation errors.
    pub fn plan(&self) -> Result<ProvisioningPlan, ConfigError> {
        planner::plan(&self.droplets.hosts)
    }

    /// Name shared by all droplets of the fleet, used as the list selector.
    #[must_use]
    pub fn selector(&self) -> &str {
        self.droplets.name.trim()
    }
}

/// Droplet defaults applied to every host group.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct DropletTemplate {
    /// Name given to every droplet; doubles as the fleet selector.
    pub name: String,
    /// Image slug.
    pub image: String,
    /// Region slug.
    pub region: String,
    /// Size slug.
    pub size: String,
    /// Whether provider backups are enabled.
    pub backups: bool,
    /// Whether IPv6 is enabled.
    pub ipv6: bool,
    /// Whether private networking is enabled; `null` reads as disabled.
    pub private_networking: Option<bool>,
    /// Cloud-init user data.
    pub user_data: Option<String>,
    /// Provider tags.
    pub tags: Vec<String>,
    /// Host groups, in inventory order.
    pub hosts: Vec<HostGroupConfig>,
}

impl Default for DropletTemplate {
    fn default() -> Self {
        Self {
            name: String::from("cloud_shepard"),
            image: String::from("ubuntu-15-10-x64"),
            region: String::from("lon1"),
            size: String::from("512mb"),
            backups: false,
            ipv6: false,
            private_networking: None,
            user_data: None,
            tags: Vec::new(),
            hosts: Vec::new(),
        }
    }
}

impl DropletTemplate {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingField(String::from("droplets.name")));
        }
        Ok(())
    }

    /// Builds the create request for one member of `group`, applying the
    /// group's overrides over the template.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when an override or default
    /// leaves a required field empty.
    pub fn spec_for(
        &self,
        group: &HostGroup,
        ssh_keys: &[String],
    ) -> Result<InstanceSpec, ConfigError> {
        let overrides = group.overrides();
        InstanceSpec::builder()
            .name(&self.name)
            .region(overrides.region.as_deref().unwrap_or(&self.region))
            .size(overrides.size.as_deref().unwrap_or(&self.size))
            .image(overrides.image.as_deref().unwrap_or(&self.image))
            .ssh_keys(ssh_keys.to_vec())
            .backups(self.backups)
            .ipv6(self.ipv6)
            .private_networking(self.private_networking.unwrap_or(false))
            .user_data(overrides.user_data.clone().or_else(|| self.user_data.clone()))
            .tags(self.tags.clone())
            .build()
            .map_err(|err| {
                ConfigError::MissingField(format!("host group '{}': {err}", group.name()))
            })
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// A required field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// A host group requested a non-positive number of instances.
    #[error("host group '{group}' has invalid count {count}; counts must be positive")]
    InvalidCount {
        /// Offending group.
        group: String,
        /// Count as written in the configuration.
        count: i64,
    },
    /// A setting holds an unusable value.
    #[error("invalid {field}: {message}")]
    Invalid {
        /// Setting name.
        field: String,
        /// What is wrong with it.
        message: String,
    },
    /// A source could not be parsed or merged.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
    /// A configuration file could not be read.
    #[error("failed to read {path}: {message}")]
    Io {
        /// File path.
        path: String,
        /// Operating system error string.
        message: String,
    },
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
