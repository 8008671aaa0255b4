//! Progress samplers.

use super::ProgressSample;
use crate::process;
use anyhow::Context as _;
use async_trait::async_trait;
use std::path::PathBuf;

/// Produces one progress sample per call.
///
/// Errors are reported to the reporter, which logs them and keeps sampling.
#[async_trait]
pub trait ProgressSampler: Send + Sync {
    /// Takes a sample.
    async fn sample(&self) -> anyhow::Result<ProgressSample>;
}

/// Adapts a closure into a sampler.
pub struct FnSampler<F>
where
    F: Fn() -> anyhow::Result<ProgressSample> + Send + Sync,
{
    func: F,
}

impl<F> FnSampler<F>
where
    F: Fn() -> anyhow::Result<ProgressSample> + Send + Sync,
{
    /// Wraps `func`.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> std::fmt::Debug for FnSampler<F>
where
    F: Fn() -> anyhow::Result<ProgressSample> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnSampler").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> ProgressSampler for FnSampler<F>
where
    F: Fn() -> anyhow::Result<ProgressSample> + Send + Sync,
{
    async fn sample(&self) -> anyhow::Result<ProgressSample> {
        (self.func)()
    }
}

/// Reports the size of a file being written against an expected total.
#[derive(Debug, Clone)]
pub struct FileProgress {
    name: String,
    path: PathBuf,
    total: Option<u64>,
}

impl FileProgress {
    /// Tracks `path`.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, total: Option<u64>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            total,
        }
    }
}

#[async_trait]
impl ProgressSampler for FileProgress {
    async fn sample(&self) -> anyhow::Result<ProgressSample> {
        let meta = tokio::fs::metadata(&self.path)
            .await
            .with_context(|| format!("stat {}", self.path.display()))?;
        Ok(ProgressSample::new(&self.name, meta.len(), self.total))
    }
}

/// Reports the disk usage of a directory being filled.
#[derive(Debug, Clone)]
pub struct DirectoryProgress {
    name: String,
    path: PathBuf,
    total: Option<u64>,
}

impl DirectoryProgress {
    /// Tracks `path`.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, total: Option<u64>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            total,
        }
    }
}

#[async_trait]
impl ProgressSampler for DirectoryProgress {
    async fn sample(&self) -> anyhow::Result<ProgressSample> {
        let done = process::total_size(&self.path).await?;
        Ok(ProgressSample::new(&self.name, done, self.total))
    }
}
