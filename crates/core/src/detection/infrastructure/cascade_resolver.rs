use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::shared::constants::{
    FACE_CASCADE_NAME, FACE_CASCADE_URL, SMILE_CASCADE_NAME, SMILE_CASCADE_URL,
};

#[derive(Error, Debug)]
pub enum CascadeResolveError {
    #[error("failed to create cascade cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write cascade to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine cache directory")]
    NoCacheDir,
}

/// Progress callback: `(bytes_downloaded, total_bytes)`.
/// `total_bytes` is 0 if the server didn't provide Content-Length.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send>;

/// Paths of the two cascades a detector needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CascadePaths {
    pub face: PathBuf,
    pub smile: PathBuf,
}

/// Resolves both stock OpenCV cascades, downloading whichever is missing.
pub fn resolve_default_cascades(
    cascade_dir: Option<&Path>,
    progress: Option<fn(&str, u64, u64)>,
) -> Result<CascadePaths, CascadeResolveError> {
    let cb = |name: &'static str| -> Option<ProgressFn> {
        progress.map(|f| Box::new(move |d, t| f(name, d, t)) as ProgressFn)
    };
    let face = resolve(FACE_CASCADE_NAME, FACE_CASCADE_URL, cascade_dir, cb(FACE_CASCADE_NAME))?;
    let smile = resolve(
        SMILE_CASCADE_NAME,
        SMILE_CASCADE_URL,
        cascade_dir,
        cb(SMILE_CASCADE_NAME),
    )?;
    Ok(CascadePaths { face, smile })
}

/// Resolve a cascade file by name.
///
/// Resolution order:
/// 1. Explicit cascade directory (user-supplied or packaged)
/// 2. User cache directory (platform-specific)
/// 3. Download from URL to cache
pub fn resolve(
    name: &str,
    url: &str,
    cascade_dir: Option<&Path>,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, CascadeResolveError> {
    resolve_with_cache(name, url, cascade_dir, &cascade_cache_dir()?, progress)
}

fn resolve_with_cache(
    name: &str,
    url: &str,
    cascade_dir: Option<&Path>,
    cache_dir: &Path,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, CascadeResolveError> {
    if let Some(dir) = cascade_dir {
        let local = dir.join(name);
        if local.exists() {
            return Ok(local);
        }
        log::debug!("{} not found in {}", name, dir.display());
    }

    let cached_path = cache_dir.join(name);
    if cached_path.exists() {
        return Ok(cached_path);
    }

    fs::create_dir_all(cache_dir).map_err(CascadeResolveError::CacheDir)?;
    log::info!("Downloading {name} from {url}");
    download(url, &cached_path, progress)?;
    Ok(cached_path)
}

/// Platform-specific cascade cache directory.
///
/// - macOS: `~/Library/Application Support/Smile Capture/cascades/`
/// - Linux: `$XDG_CACHE_HOME/Smile Capture/cascades/` or `~/.cache/Smile Capture/cascades/`
/// - Windows: `%LOCALAPPDATA%/Smile Capture/cascades/`
pub fn cascade_cache_dir() -> Result<PathBuf, CascadeResolveError> {
    #[cfg(target_os = "macos")]
    {
        dirs::data_dir()
            .map(|d| d.join("Smile Capture").join("cascades"))
            .ok_or(CascadeResolveError::NoCacheDir)
    }
    #[cfg(not(target_os = "macos"))]
    {
        dirs::cache_dir()
            .map(|d| d.join("Smile Capture").join("cascades"))
            .ok_or(CascadeResolveError::NoCacheDir)
    }
}

fn download(url: &str, dest: &Path, progress: Option<ProgressFn>) -> Result<(), CascadeResolveError> {
    let temp_path = dest.with_extension("part");

    let result = download_inner(url, dest, &temp_path, progress);

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }

    result
}

fn download_inner(
    url: &str,
    dest: &Path,
    temp_path: &Path,
    progress: Option<ProgressFn>,
) -> Result<(), CascadeResolveError> {
    let write_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| CascadeResolveError::Write { path, source }
    };

    let mut response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| CascadeResolveError::Download {
            url: url.to_string(),
            source: e,
        })?;

    let total = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;
    let mut file = fs::File::create(temp_path).map_err(write_err(temp_path))?;

    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = response.read(&mut buf).map_err(write_err(temp_path))?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).map_err(write_err(temp_path))?;
        downloaded += n as u64;
        if let Some(ref cb) = progress {
            cb(downloaded, total);
        }
    }

    file.flush().map_err(write_err(temp_path))?;
    drop(file);

    fs::rename(temp_path, dest).map_err(write_err(dest))?;
    Ok(())
}
