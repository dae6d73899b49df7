//! # Configuration Management Module
//!
//! Centralized configuration for the Confbbs server: type-safe sections with
//! serde, sensible defaults, validation on load, and TOML persistence.
//!
//! ## Configuration File Format
//!
//! ```toml
//! [bbs]
//! name = "My Conference BBS"
//! sysop = 1
//! max_sessions = 100
//! event_poll_ms = 2000
//!
//! [storage]
//! data_dir = "./data"
//!
//! [logging]
//! level = "info"
//!
//! # Conferences seeded into the store at startup (existing ones are kept)
//! [conferences.general]
//! id = 100
//! description = "General discussions"
//! permissions = ["read", "write", "reply"]
//! ```

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::bbs::perms::{self, PermissionMask};
use crate::bbs::types::{ConferenceId, UserId};
use crate::validation::validate_conference_name;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bbs: BbsConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    /// Conferences provisioned at startup, keyed by name.
    #[serde(default)]
    pub conferences: HashMap<String, ConferenceSeedConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BbsConfig {
    pub name: String,
    /// User id of the system operator; seeded conferences default to this
    /// admin unless they name their own.
    pub sysop: UserId,
    pub max_sessions: u32,
    /// Default mailbox-poll timeout handed to transports (milliseconds).
    #[serde(default = "default_event_poll_ms")]
    pub event_poll_ms: u64,
}

fn default_event_poll_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConferenceSeedConfig {
    pub id: ConferenceId,
    #[serde(default)]
    pub description: String,
    /// Default permission names: any of "read", "write", "reply", "admin".
    pub permissions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_conference: Option<ConferenceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin: Option<UserId>,
}

impl ConferenceSeedConfig {
    /// Parse the permission name list into a mask.
    pub fn permission_mask(&self) -> Result<PermissionMask> {
        let mut mask = 0;
        for name in &self.permissions {
            mask |= match name.as_str() {
                "read" => perms::READ,
                "write" => perms::WRITE,
                "reply" => perms::REPLY,
                "admin" => perms::ADMIN,
                other => return Err(anyhow!("unknown permission name '{}'", other)),
            };
        }
        Ok(mask)
    }
}

impl Config {
    /// Load configuration from a file and validate it.
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file.
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.bbs.max_sessions == 0 {
            return Err(anyhow!("bbs.max_sessions must be at least 1"));
        }
        if self.storage.data_dir.is_empty() {
            return Err(anyhow!("storage.data_dir must not be empty"));
        }
        for (name, seed) in &self.conferences {
            validate_conference_name(name)
                .map_err(|e| anyhow!("conference '{}': {}", name, e))?;
            seed.permission_mask()
                .map_err(|e| anyhow!("conference '{}': {}", name, e))?;
            // Conference ids must not collide with the mailbox id space of
            // plausible user ids; the sysop's mailbox is the common trap.
            if seed.id == self.bbs.sysop {
                return Err(anyhow!(
                    "conference '{}' id {} collides with the sysop mailbox",
                    name,
                    seed.id
                ));
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut conferences = HashMap::new();
        conferences.insert(
            "general".to_string(),
            ConferenceSeedConfig {
                id: 100,
                description: "General discussions".to_string(),
                permissions: vec!["read".into(), "write".into(), "reply".into()],
                reply_conference: None,
                admin: None,
            },
        );
        conferences.insert(
            "announce".to_string(),
            ConferenceSeedConfig {
                id: 101,
                description: "Announcements; discuss in general".to_string(),
                permissions: vec!["read".into(), "reply".into()],
                reply_conference: Some(100),
                admin: None,
            },
        );

        Config {
            bbs: BbsConfig {
                name: "Confbbs Station".to_string(),
                sysop: 1,
                max_sessions: 100,
                event_poll_ms: 2000,
            },
            storage: StorageConfig {
                data_dir: "./data".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("confbbs.log".to_string()),
            },
            conferences,
        }
    }
}
