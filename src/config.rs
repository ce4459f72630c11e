//! Profile configuration file loading.
//!
//! The config file is YAML with named profile sections. Each profile is a
//! bundle of API settings and optional credentials, immutable for the
//! duration of a run:
//!
//! ```yaml
//! profiles:
//!   default:
//!     api_host: https://api.cloudsmith.io/v1
//!     api_key: abc123
//!   staging:
//!     api_host: https://api.staging.example.com/v1
//!     login: me
//!     password: hunter2
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

/// A named configuration bundle selecting API host, proxy, user agent and
/// credentials. All fields optional; resolution fills the gaps from
/// environment and built-in defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Profile {
    pub api_host: Option<String>,
    pub api_proxy: Option<String>,
    pub api_user_agent: Option<String>,
    pub api_key: Option<String>,
    pub login: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    profiles: BTreeMap<String, Profile>,
}

/// Default location of the profile file, under the platform config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("cloudsmith").join("config.yaml"))
}

/// Load the named profile from the given config file, or from the default
/// location when no path is given.
///
/// A missing file at the default location is not an error (there is simply
/// no profile); an explicitly passed path that cannot be read is. A profile
/// name other than `default` must exist in the file once the file itself
/// does.
pub fn load_profile(path: Option<&Path>, name: &str) -> Result<Option<Profile>> {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => match default_config_path() {
            Some(p) => (p, false),
            None => return Ok(None),
        },
    };

    if !path.exists() {
        if explicit {
            anyhow::bail!("config file {:?} does not exist", path);
        }
        debug!(config_path = ?path, "No config file at default location");
        return Ok(None);
    }

    let content = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file {:?}", path))?;
    let parsed: ConfigFile = serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse config YAML {:?}", path))?;

    info!(config_path = ?path, profiles = parsed.profiles.len(), "Loaded config file");

    match parsed.profiles.get(name) {
        Some(profile) => {
            info!(profile = %name, "Selected profile");
            Ok(Some(profile.clone()))
        }
        None if name == "default" => Ok(None),
        None => anyhow::bail!("profile {:?} not found in {:?}", name, path),
    }
}
