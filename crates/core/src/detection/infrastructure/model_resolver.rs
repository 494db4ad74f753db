use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("model {name} not found (configure its path or place it in {searched})")]
    Missing { name: String, searched: PathBuf },
    #[error("model {path} is too small ({size} bytes, expected at least {min}); the file is likely truncated")]
    TooSmall { path: PathBuf, size: u64, min: u64 },
    #[error("failed to inspect model {path}: {source}")]
    Inspect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model to {path}: {source}")]
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

/// Locate a model file, downloading it into the cache when possible.
///
/// Resolution order:
/// 1. Explicitly configured path (never falls through when given)
/// 2. User cache directory (platform-specific)
/// 3. Download from `url` to the cache, when a URL is known
///
/// The returned path has passed [`validate_asset`].
pub fn resolve(
    name: &str,
    url: Option<&str>,
    configured: Option<&Path>,
    min_bytes: u64,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    if let Some(path) = configured {
        validate_asset(path, min_bytes)?;
        return Ok(path.to_path_buf());
    }

    let cache_dir = model_cache_dir()?;
    let cached_path = cache_dir.join(name);
    if cached_path.exists() {
        validate_asset(&cached_path, min_bytes)?;
        return Ok(cached_path);
    }

    let Some(url) = url else {
        return Err(ModelResolveError::Missing {
            name: name.to_string(),
            searched: cache_dir,
        });
    };

    log::info!("Downloading {name} from {url}");
    fs::create_dir_all(&cache_dir).map_err(ModelResolveError::CacheDir)?;
    download(url, &cached_path, progress)?;
    validate_asset(&cached_path, min_bytes)?;
    Ok(cached_path)
}

/// Fails unless `path` is a file of at least `min_bytes`.
///
/// A landmark/encoder asset that is absent or truncated leaves no face
/// operation usable, so this is the one startup check that is fatal.
pub fn validate_asset(path: &Path, min_bytes: u64) -> Result<(), ModelResolveError> {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ModelResolveError::Missing {
                name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                searched: path.to_path_buf(),
            });
        }
        Err(source) => {
            return Err(ModelResolveError::Inspect {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if !metadata.is_file() || metadata.len() < min_bytes {
        return Err(ModelResolveError::TooSmall {
            path: path.to_path_buf(),
            size: metadata.len(),
            min: min_bytes,
        });
    }
    Ok(())
}

/// Platform-specific model cache directory.
///
/// - macOS: `~/Library/Application Support/FaceMatch/models/`
/// - Linux: `$XDG_CACHE_HOME/FaceMatch/models/` or `~/.cache/FaceMatch/models/`
/// - Windows: `%LOCALAPPDATA%/FaceMatch/models/`
pub fn model_cache_dir() -> Result<PathBuf, ModelResolveError> {
    #[cfg(target_os = "macos")]
    {
        dirs::data_dir()
            .map(|d| d.join("FaceMatch").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
    #[cfg(not(target_os = "macos"))]
    {
        dirs::cache_dir()
            .map(|d| d.join("FaceMatch").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
}

fn download(url: &str, dest: &Path, progress: Option<ProgressFn>) -> Result<(), ModelResolveError> {
    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| ModelResolveError::Download {
            url: url.to_string(),
            source: e,
        })?;
    let total = response.content_length().unwrap_or(0);
    save_stream(response, total, dest, progress)
}

/// Streams `reader` into `dest` through a sibling `.part` file, which is
/// removed on any error so a partial model never lingers.
fn save_stream(
    reader: impl Read,
    total: u64,
    dest: &Path,
    progress: Option<ProgressFn>,
) -> Result<(), ModelResolveError> {
    let temp_path = dest.with_extension("part");
    let result = save_stream_inner(reader, total, dest, &temp_path, progress);
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn save_stream_inner(
    mut reader: impl Read,
    total: u64,
    dest: &Path,
    temp_path: &Path,
    progress: Option<ProgressFn>,
) -> Result<(), ModelResolveError> {
    let write_err = |source| ModelResolveError::Write {
        path: temp_path.to_path_buf(),
        source,
    };
    let mut file = fs::File::create(temp_path).map_err(write_err)?;

    let mut downloaded: u64 = 0;
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = reader.read(&mut buf).map_err(write_err)?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).map_err(write_err)?;
        downloaded += n as u64;
        if let Some(ref cb) = progress {
            cb(downloaded, total);
        }
    }
    file.flush().map_err(write_err)?;
    drop(file);

    fs::rename(temp_path, dest).map_err(|e| ModelResolveError::Write {
        path: dest.to_path_buf(),
        source: e,
    })
}
