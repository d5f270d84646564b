//! Download and cache management for template files

use std::env;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use url::Url;

use super::DataError;

/// Environment variable overriding the cache directory
pub const CACHE_DIR_ENV: &str = "SKYSIM_CACHE_DIR";

/// Full-resolution templates are tens of megabytes
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Get the cache directory path
pub fn get_cache_dir() -> PathBuf {
    if let Ok(dir) = env::var(CACHE_DIR_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".cache").join("skysim")
}

/// Check if a file exists and is not empty
pub fn file_exists_and_not_empty<P: AsRef<Path>>(path: P) -> bool {
    match fs::metadata(path) {
        Ok(metadata) => metadata.is_file() && metadata.len() > 0,
        Err(_) => false,
    }
}

fn progress_bar(len: Option<u64>, name: &str) -> ProgressBar {
    let pb = match len {
        Some(len) => {
            let pb = ProgressBar::new(len);
            pb.set_style(
                ProgressStyle::with_template(
                    "{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏ "),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };
    pb.set_message(format!("Downloading {name}"));
    pb
}

/// Copy `reader` into `writer`, the open `.part` file at `temp_path`
///
/// On any read or write failure the partial file is removed.
fn stream_to_part<R: Read, W: Write>(
    reader: &mut R,
    mut writer: W,
    temp_path: &Path,
    pb: &ProgressBar,
    url: &Url,
) -> Result<(), DataError> {
    let mut copy = || -> Result<(), DataError> {
        let mut buffer = [0; 8192];
        loop {
            let bytes_read = reader.read(&mut buffer).map_err(|e| DataError::Download {
                url: url.to_string(),
                reason: format!("failed to read response: {e}"),
            })?;
            if bytes_read == 0 {
                break;
            }
            writer.write_all(&buffer[..bytes_read])?;
            pb.inc(bytes_read as u64);
        }
        writer.flush()?;
        Ok(())
    };

    let result = copy();
    drop(writer);
    if result.is_err() {
        pb.abandon();
        let _ = fs::remove_file(temp_path);
    }
    result
}

/// Download `url` to `path`
///
/// The body is streamed into a sibling `.part` file that is renamed into
/// place only after the transfer completes, so an interrupted download never
/// leaves a truncated template behind.
pub fn download_file(url: &Url, path: &Path) -> Result<(), DataError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(DOWNLOAD_TIMEOUT))
        .build()
        .into();

    let response = agent
        .get(url.as_str())
        .call()
        .map_err(|e| DataError::Download {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let content_length = response
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let pb = progress_bar(content_length, &name);
    let mut reader = response.into_body().into_reader();

    let temp_path = path.with_extension("part");
    let file = BufWriter::new(File::create(&temp_path)?);
    stream_to_part(&mut reader, file, &temp_path, &pb, url)?;
    pb.finish_and_clear();

    fs::rename(&temp_path, path)?;
    log::info!("Downloaded {url} to {}", path.display());
    Ok(())
}
