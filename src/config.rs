use crate::metrics::RateMode;
use crate::session::Mode;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub duration_secs: u64,
    pub sentence_set: String,
    pub sentence_file: Option<PathBuf>,
    pub shuffle: bool,
    pub seed: Option<u64>,
    pub mode: Mode,
    pub rate_mode: RateMode,
    pub export_dir: Option<PathBuf>,
    pub remote_dir: Option<PathBuf>,
    pub offline: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            duration_secs: 60,
            sentence_set: "default".to_string(),
            sentence_file: None,
            shuffle: true,
            seed: None,
            mode: Mode::Stationary,
            rate_mode: RateMode::HighResolution,
            export_dir: None,
            remote_dir: None,
            offline: false,
        }
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "typetrail") {
            pd.config_dir().join("config.json")
        } else {
            PathBuf::from("typetrail_config.json")
        };
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        if let Ok(bytes) = fs::read(&self.path) {
            match serde_json::from_slice::<Config>(&bytes) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "config_unreadable");
                }
            }
        }
        Config::default()
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg).map_err(std::io::Error::other)?;
        fs::write(&self.path, data)
    }
}
