//! Template data store
//!
//! Emission templates are addressed by a relative name such as
//! `pysm_2/synch_t_new.fits`. A [`TemplateStore`] resolves a name to a file
//! on disk, looking in a local data directory first, then in the download
//! cache, and finally fetching the file from the remote data repository.

pub mod downloader;

use std::env;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use url::Url;

pub use downloader::{get_cache_dir, CACHE_DIR_ENV};
use downloader::{download_file, file_exists_and_not_empty};

/// Remote repository holding the published template maps
pub const DEFAULT_BASE_URL: &str = "https://portal.nersc.gov/project/cmb/pysm-data/";

/// Environment variable naming a local template directory
pub const DATA_DIR_ENV: &str = "SKYSIM_DATA_DIR";

#[derive(Error, Debug)]
pub enum DataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Invalid template name '{0}': must be a relative path without '..'")]
    InvalidName(String),

    #[error("Template '{name}' not found offline (searched {})", format_paths(.searched))]
    NotFound { name: String, searched: Vec<PathBuf> },

    #[error("Failed to download {url}: {reason}")]
    Download { url: String, reason: String },
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolves template names to local files
#[derive(Debug, Clone)]
pub struct TemplateStore {
    data_dir: Option<PathBuf>,
    cache_dir: PathBuf,
    base_url: Url,
    offline: bool,
}

impl TemplateStore {
    /// Store using `data_dir` (or `SKYSIM_DATA_DIR`) and the default cache
    pub fn new(data_dir: Option<PathBuf>, offline: bool) -> Result<Self, DataError> {
        let data_dir = data_dir.or_else(|| {
            env::var(DATA_DIR_ENV)
                .ok()
                .filter(|d| !d.is_empty())
                .map(PathBuf::from)
        });
        Ok(Self {
            data_dir,
            cache_dir: get_cache_dir(),
            base_url: Url::parse(DEFAULT_BASE_URL)?,
            offline,
        })
    }

    /// Offline store that only looks inside `dir`
    pub fn local_only<P: AsRef<Path>>(dir: P) -> Result<Self, DataError> {
        Ok(Self {
            data_dir: Some(dir.as_ref().to_path_buf()),
            cache_dir: dir.as_ref().to_path_buf(),
            base_url: Url::parse(DEFAULT_BASE_URL)?,
            offline: true,
        })
    }

    pub fn with_cache_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.cache_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Replace the remote repository; a trailing slash is added if missing
    pub fn with_base_url(mut self, base: &str) -> Result<Self, DataError> {
        let base = if base.ends_with('/') {
            base.to_string()
        } else {
            format!("{base}/")
        };
        self.base_url = Url::parse(&base)?;
        Ok(self)
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    /// Remote URL of a template
    pub fn url_for(&self, name: &str) -> Result<Url, DataError> {
        validate_name(name)?;
        Ok(self.base_url.join(name)?)
    }

    /// Local paths searched for a template, in priority order
    pub fn candidates(&self, name: &str) -> Result<Vec<PathBuf>, DataError> {
        validate_name(name)?;
        let mut paths = Vec::with_capacity(2);
        if let Some(dir) = &self.data_dir {
            paths.push(dir.join(name));
        }
        let cached = self.cache_dir.join(name);
        if !paths.contains(&cached) {
            paths.push(cached);
        }
        Ok(paths)
    }

    /// Path of a template on disk, downloading it into the cache if needed
    pub fn resolve(&self, name: &str) -> Result<PathBuf, DataError> {
        let candidates = self.candidates(name)?;
        if let Some(found) = candidates.iter().find(|p| file_exists_and_not_empty(p)) {
            log::debug!("Template {name} resolved to {}", found.display());
            return Ok(found.clone());
        }

        if self.offline {
            return Err(DataError::NotFound {
                name: name.to_string(),
                searched: candidates,
            });
        }

        let url = self.url_for(name)?;
        let target = self.cache_dir.join(name);
        log::info!("Template {name} not cached, downloading from {url}");
        download_file(&url, &target)?;
        Ok(target)
    }
}

fn validate_name(name: &str) -> Result<(), DataError> {
    let path = Path::new(name);
    let valid = !name.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if valid {
        Ok(())
    } else {
        Err(DataError::InvalidName(name.to_string()))
    }
}
