//! Byte sources for layer images.
//!
//! The render/export pipeline never does network or filesystem I/O itself;
//! it consumes a [`FetchSource`] so servers inject an HTTP client, CLI runs
//! can point at a local asset corpus, and tests inject in-memory fakes.

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::foundation::error::{SceneError, SceneResult};

static USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Resolves a canonical source URL to raw encoded bytes.
pub trait FetchSource: Sync {
    fn fetch(&self, url: &str) -> SceneResult<Vec<u8>>;
}

/// Blocking HTTP source for remote object storage.
pub struct HttpSource {
    client: reqwest::blocking::Client,
}

impl HttpSource {
    pub fn new() -> SceneResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("construct http client")?;
        Ok(Self { client })
    }
}

impl FetchSource for HttpSource {
    fn fetch(&self, url: &str) -> SceneResult<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("fetch '{url}'"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SceneError::layer(format!(
                "fetch '{url}' failed with status {status}"
            )));
        }

        let bytes = response
            .bytes()
            .with_context(|| format!("read body of '{url}'"))?;
        Ok(bytes.to_vec())
    }
}

/// Filesystem source rooted at a directory; source URLs are treated as
/// root-relative paths.
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl FetchSource for FileSource {
    fn fetch(&self, url: &str) -> SceneResult<Vec<u8>> {
        let rel = normalize_rel_path(url)?;
        let path = self.root.join(Path::new(&rel));
        std::fs::read(&path)
            .with_context(|| format!("read asset bytes from '{}'", path.display()))
            .map_err(SceneError::from)
    }
}

/// Normalize and validate a root-relative asset path.
///
/// The normalized result uses `/` separators, removes `.` segments, and
/// rejects absolute paths or parent traversals (`..`).
pub fn normalize_rel_path(source: &str) -> SceneResult<String> {
    let s = source.replace('\\', "/");
    if s.starts_with('/') {
        return Err(SceneError::validation("asset paths must be relative"));
    }
    if s.is_empty() {
        return Err(SceneError::validation("asset path must be non-empty"));
    }

    let mut out = Vec::<&str>::new();
    for part in s.split('/') {
        if part.is_empty() || part == "." {
            continue;
        }
        if part == ".." {
            return Err(SceneError::validation("asset paths must not contain '..'"));
        }
        out.push(part);
    }

    if out.is_empty() {
        return Err(SceneError::validation(
            "asset path must contain a file name",
        ));
    }

    Ok(out.join("/"))
}
