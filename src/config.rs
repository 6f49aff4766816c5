//! Configuration manager for curata.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Account registration policy.
    #[serde(default)]
    pub registration: Registration,
    /// Avatar storage and thumbnailing.
    #[serde(default)]
    pub avatar: Avatar,
}

/// Registration policy configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Registration {
    /// Minimum user name length.
    pub user_name_min_length: usize,
    /// Maximum user name length.
    pub user_name_max_length: usize,
    /// Pattern a user name must fully match.
    pub user_name_regex: String,
    /// Minimum plaintext password length.
    pub password_min_length: usize,
    /// Pattern a plaintext password must fully match.
    pub password_regex: String,
    /// Whether an account needs a confirmed e-mail before it counts as
    /// registered.
    pub need_email_activation: bool,
    /// Whether an account needs staff confirmation before it counts as
    /// registered.
    pub need_staff_activation: bool,
}

impl Default for Registration {
    fn default() -> Self {
        Self {
            user_name_min_length: 2,
            user_name_max_length: 32,
            user_name_regex: r"[A-Za-z0-9_-]+".into(),
            password_min_length: 8,
            password_regex: r"[\x20-\x7e]+".into(),
            need_email_activation: false,
            need_staff_activation: false,
        }
    }
}

/// Avatar configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Avatar {
    /// Directory where custom avatar sources are stored.
    pub directory: String,
    /// Generated thumbnail width.
    pub thumbnail_width: u32,
    /// Generated thumbnail height.
    pub thumbnail_height: u32,
}

impl Default for Avatar {
    fn default() -> Self {
        Self {
            directory: "data/avatars".into(),
            thumbnail_width: 140,
            thumbnail_height: 140,
        }
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Arc<Self> {
        let file_path = if self.path.is_file() {
            &self.path
        } else {
            &Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        match File::open(file_path) {
            Ok(file) => {
                let mut config: Configuration =
                    match serde_yaml::from_reader(file) {
                        Ok(config) => config,
                        Err(err) => {
                            return Arc::new(self.error(err));
                        },
                    };

                // set app version.
                config.version = VERSION.to_owned();

                Arc::new(config)
            },
            Err(err) => Arc::new(self.error(err)),
        }
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "`config.yaml` file not found");
        Self {
            version: VERSION.to_owned(),
            ..Default::default()
        }
    }
}
