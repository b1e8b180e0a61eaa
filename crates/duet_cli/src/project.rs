//! Project root and configuration resolution shared by the commands.

use std::path::{Path, PathBuf};

use duet_config::{load_config, load_config_file, ProjectConfig, CONFIG_FILE_NAME};
use tracing::debug;

use crate::GlobalArgs;

/// A project directory and its configuration.
pub struct Project {
    /// Directory that relative configuration paths are resolved against.
    pub root: PathBuf,
    /// The loaded configuration, or the defaults when no file exists.
    pub config: ProjectConfig,
}

impl Project {
    /// Resolves `path` against the project root.
    pub fn path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

/// Walks up from `start` looking for the nearest directory containing `duet.toml`.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(CONFIG_FILE_NAME).is_file() {
            return Some(current);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Resolves the project from global CLI args.
///
/// If `--config` is specified, uses that path (file: that file and its parent
/// directory; directory: its `duet.toml`). Otherwise walks up from the
/// current directory looking for `duet.toml`, falling back to the current
/// directory with default settings.
pub fn resolve_project(global: &GlobalArgs) -> Result<Project, Box<dyn std::error::Error>> {
    if let Some(ref config_path) = global.config {
        let p = PathBuf::from(config_path);
        if p.is_file() {
            let root = p
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            let config = load_config_file(&p)?;
            return Ok(Project { root, config });
        }
        let config = load_config(&p)?;
        return Ok(Project { root: p, config });
    }

    let cwd = std::env::current_dir()?;
    match find_project_root(&cwd) {
        Some(root) => {
            let config = load_config(&root)?;
            Ok(Project { root, config })
        }
        None => {
            debug!("No {} found, using defaults", CONFIG_FILE_NAME);
            Ok(Project {
                root: cwd,
                config: ProjectConfig::default(),
            })
        }
    }
}
