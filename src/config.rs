use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Config {
    #[serde(rename = "database")]
    pub database_path: PathBuf,

    pub fact_check_address: FactCheckAddressConfig,

    #[serde(with = "serde_yaml::with::singleton_map")] // instead of YAML '!tag' syntax
    pub incoming_mail: IncomingMailConfig,
}

impl Config {
    pub fn try_from_arg(arg: &str) -> Result<Self, String> {
        let config_path = std::fs::canonicalize(Path::new(arg))
            .map_err(|e| format!("Unable to canonicalize path {:?}: {}", arg, e))?;
        let file = File::open(&config_path)
            .map_err(|e| format!("Error opening config file {:?}: {}", config_path, e))?;
        let mut config: Self = serde_yaml::from_reader(file)
            .map_err(|e| format!("Error parsing config file {:?}: {}", config_path, e))?;
        if let Some(base_path) = config_path.parent() {
            config.resolve_paths(base_path);
        }
        Ok(config)
    }

    pub fn resolve_paths(&mut self, base_path: &Path) {
        Self::resolve_path(&mut self.database_path, base_path);
        let IncomingMailConfig::Maildir { path } = &mut self.incoming_mail;
        Self::resolve_path(path, base_path);
    }

    fn resolve_path(path: &mut PathBuf, base_path: &Path) {
        if !path.is_absolute() {
            *path = base_path.join(&path);
        }
    }
}

/// Fact-check addresses look like `local_part+ID@domain`, so every edition gets its own address
/// while all of them land in the same mailbox.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct FactCheckAddressConfig {
    pub local_part: String,
    pub domain: String,
}

impl FactCheckAddressConfig {
    pub fn address_for(&self, edition_id: i64) -> String {
        format!("{}+{}@{}", self.local_part, edition_id, self.domain)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub enum IncomingMailConfig {
    /// Maildir path
    #[serde(rename = "maildir")]
    Maildir {
        path: PathBuf,
    },
}
