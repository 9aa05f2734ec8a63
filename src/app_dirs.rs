use directories::{ProjectDirs, UserDirs};
use std::path::PathBuf;

const APP: &str = "typetrail";

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    /// `~/.local/state/typetrail`, or the platform local data dir.
    pub fn state_dir() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            Some(PathBuf::from(home).join(".local").join("state").join(APP))
        } else {
            ProjectDirs::from("", "", APP).map(|proj_dirs| proj_dirs.data_local_dir().to_path_buf())
        }
    }

    pub fn db_path() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("local.db"))
    }

    pub fn log_dir() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("logs"))
    }

    /// Directory-backed remote mirror used unless one is configured.
    pub fn remote_dir() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("remote"))
    }

    /// Downloads folder when there is one, else the working directory.
    pub fn export_dir() -> PathBuf {
        UserDirs::new()
            .and_then(|u| u.download_dir().map(|d| d.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
