//! Source and patch retrieval with checksum verification.
//!
//! Every artifact a build consumes is fetched and verified before the build
//! plan is laid out, so a bad checksum stops the build before any process
//! runs.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::errors::{BuildError, BuildResult};
use crate::resolver::ResolvedConfig;
use crate::util::hash::{digests_match, sha256_bytes, sha256_file};

/// A verified artifact on local disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub url: String,
    pub sha256: String,
    pub path: PathBuf,
}

/// Everything a build plan needs from the outside world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchedSources {
    pub source: Artifact,
    /// Verified patches, in the same order as the resolved config
    pub patches: Vec<Artifact>,
}

/// Retrieves an artifact and proves it matches its checksum.
pub trait Fetcher {
    fn fetch(&self, url: &str, sha256: &str) -> BuildResult<PathBuf>;
}

/// Fetch the selected source and every active patch.
pub fn fetch_all(fetcher: &dyn Fetcher, config: &ResolvedConfig) -> BuildResult<FetchedSources> {
    let source = Artifact {
        url: config.source.url.clone(),
        sha256: config.source.sha256.clone(),
        path: fetcher.fetch(&config.source.url, &config.source.sha256)?,
    };

    let patches = config
        .patches
        .iter()
        .map(|p| {
            Ok(Artifact {
                url: p.url.clone(),
                sha256: p.sha256.clone(),
                path: fetcher.fetch(&p.url, &p.sha256)?,
            })
        })
        .collect::<BuildResult<Vec<_>>>()?;

    Ok(FetchedSources { source, patches })
}

/// Fetcher storing artifacts under `<cache>/<sha256>/<file name>`.
///
/// Supports `http(s)://` and `file://` URLs and plain paths, which are
/// resolved against the recipe directory.
#[derive(Debug, Clone)]
pub struct CacheFetcher {
    cache_dir: PathBuf,
    root: PathBuf,
    offline: bool,
}

impl CacheFetcher {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        CacheFetcher {
            cache_dir: cache_dir.into(),
            root: PathBuf::from("."),
            offline: false,
        }
    }

    /// Directory relative paths are resolved against.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Where an artifact lives once fetched.
    pub fn cache_path(&self, url: &str, sha256: &str) -> PathBuf {
        self.cache_dir
            .join(sha256.to_ascii_lowercase())
            .join(artifact_file_name(url))
    }

    /// The artifacts a build would use, without fetching anything.
    pub fn planned(&self, config: &ResolvedConfig) -> FetchedSources {
        let artifact = |url: &str, sha256: &str| Artifact {
            url: url.to_string(),
            sha256: sha256.to_string(),
            path: self.cache_path(url, sha256),
        };
        FetchedSources {
            source: artifact(&config.source.url, &config.source.sha256),
            patches: config
                .patches
                .iter()
                .map(|p| artifact(&p.url, &p.sha256))
                .collect(),
        }
    }

    fn read(&self, url: &str) -> BuildResult<Vec<u8>> {
        let fetch_err = |cause: String| BuildError::Fetch {
            url: url.to_string(),
            cause,
        };

        if url.starts_with("http://") || url.starts_with("https://") {
            if self.offline {
                return Err(fetch_err("offline mode and not in cache".to_string()));
            }
            tracing::info!("downloading {}", url);
            let response = reqwest::blocking::get(url).map_err(|e| fetch_err(e.to_string()))?;
            if !response.status().is_success() {
                return Err(fetch_err(format!("HTTP {}", response.status())));
            }
            let bytes = response.bytes().map_err(|e| fetch_err(e.to_string()))?;
            return Ok(bytes.to_vec());
        }

        let path = if url.starts_with("file://") {
            url::Url::parse(url)
                .ok()
                .and_then(|u| u.to_file_path().ok())
                .ok_or_else(|| fetch_err("invalid file URL".to_string()))?
        } else if Path::new(url).is_absolute() {
            PathBuf::from(url)
        } else {
            self.root.join(url)
        };

        std::fs::read(&path).map_err(|e| fetch_err(format!("{}: {}", path.display(), e)))
    }
}

/// File name for a cached artifact, taken from the last URL path segment.
fn artifact_file_name(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let name = without_query
        .rsplit(['/', '\\'])
        .find(|s| !s.is_empty())
        .unwrap_or("artifact");
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '+') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "artifact".to_string()
    } else {
        cleaned
    }
}

impl Fetcher for CacheFetcher {
    fn fetch(&self, url: &str, sha256: &str) -> BuildResult<PathBuf> {
        let expected = sha256.to_ascii_lowercase();
        let dest = self.cache_path(url, &expected);
        let dir = self.cache_dir.join(&expected);

        if dest.is_file() {
            match sha256_file(&dest) {
                Ok(actual) if digests_match(&expected, &actual) => {
                    tracing::debug!("using cached {}", dest.display());
                    return Ok(dest);
                }
                _ => {
                    tracing::warn!("discarding corrupt cache entry {}", dest.display());
                    let _ = std::fs::remove_file(&dest);
                }
            }
        }

        let bytes = self.read(url)?;
        let actual = sha256_bytes(&bytes);
        if !digests_match(&expected, &actual) {
            return Err(BuildError::ChecksumMismatch {
                artifact: url.to_string(),
                expected,
                actual,
            });
        }

        std::fs::create_dir_all(&dir)
            .map_err(|e| BuildError::io(format!("failed to create {}", dir.display()), e))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| BuildError::io("failed to create temporary file", e))?;
        std::io::Write::write_all(&mut tmp, &bytes)
            .map_err(|e| BuildError::io(format!("failed to write {}", dest.display()), e))?;
        tmp.persist(&dest)
            .map_err(|e| BuildError::io(format!("failed to store {}", dest.display()), e.error))?;

        tracing::debug!("cached {} as {}", url, dest.display());
        Ok(dest)
    }
}
