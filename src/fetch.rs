// src/fetch.rs

//! Parallel multi-mirror downloader
//!
//! All jobs progress concurrently on a single tokio runtime owned by the
//! fetcher; the engine drives it synchronously. Each job walks its mirror
//! list in order: a transport failure or an HTTP status >= 400 truncates the
//! destination file and advances to the next mirror; when the list is
//! exhausted the job has failed and its partial file is deleted.
//!
//! When stderr is a terminal, a multi-bar display redraws at ~2 Hz;
//! otherwise each job logs a begin and an end line.

use crate::error::{Error, Result};
use futures::future::join_all;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::fs;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Timeout for establishing a connection to a mirror
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Progress redraw rate (frames per second)
const DRAW_RATE_HZ: u8 = 2;

/// One download task: a mirror list, a destination, and a display name
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub urls: Vec<String>,
    pub dest: PathBuf,
    pub display_name: String,
}

impl DownloadJob {
    pub fn new(urls: Vec<String>, dest: PathBuf, display_name: impl Into<String>) -> Self {
        Self {
            urls,
            dest,
            display_name: display_name.into(),
        }
    }
}

/// Parallel downloader over a private event loop
pub struct Fetcher {
    client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
}

impl Fetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::DownloadFailed(format!("cannot build HTTP client: {e}")))?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self { client, runtime })
    }

    /// Run every job to completion. Fails with `DownloadFailed` if any job
    /// exhausts its mirror list; partial files of failed jobs are removed.
    pub fn download_all(&self, jobs: &[DownloadJob]) -> Result<()> {
        if jobs.is_empty() {
            return Ok(());
        }

        let progress = if std::io::stderr().is_terminal() {
            let mp = MultiProgress::with_draw_target(ProgressDrawTarget::stderr_with_hz(
                DRAW_RATE_HZ,
            ));
            Some(mp)
        } else {
            None
        };

        let results: Vec<Result<()>> = self.runtime.block_on(async {
            let tasks = jobs.iter().map(|job| self.run_job(job, progress.as_ref()));
            join_all(tasks).await
        });

        let mut failures = Vec::new();
        for (job, result) in jobs.iter().zip(results) {
            if let Err(e) = result {
                // Leave no partial file behind
                let _ = fs::remove_file(&job.dest);
                warn!("download of {} failed: {e}", job.display_name);
                failures.push(job.display_name.clone());
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::DownloadFailed(failures.join(", ")))
        }
    }

    /// Aggregate announced size of all jobs via HEAD requests, in bytes.
    ///
    /// Each job asks its mirrors in order until one answers. If any job's
    /// size stays unknown the aggregate is reported as -1 and the caller is
    /// expected to skip its free-space pre-check.
    pub fn total_download_size(&self, jobs: &[DownloadJob]) -> i64 {
        self.runtime.block_on(async {
            let tasks = jobs.iter().map(|job| self.head_job(job));
            let sizes = join_all(tasks).await;

            let mut total: i64 = 0;
            for size in sizes {
                match size {
                    Some(bytes) => total += bytes as i64,
                    None => return -1,
                }
            }
            total
        })
    }

    async fn head_job(&self, job: &DownloadJob) -> Option<u64> {
        for url in &job.urls {
            match self.client.head(url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    if let Some(len) = resp.content_length() {
                        return Some(len);
                    }
                }
                Ok(resp) => {
                    debug!("HEAD {url} returned {}", resp.status());
                }
                Err(e) => {
                    debug!("HEAD {url} failed: {e}");
                }
            }
        }
        None
    }

    async fn run_job(&self, job: &DownloadJob, progress: Option<&MultiProgress>) -> Result<()> {
        if job.urls.is_empty() {
            return Err(Error::DownloadFailed(format!(
                "{}: no mirrors configured",
                job.display_name
            )));
        }

        if let Some(parent) = job.dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let bar = progress.map(|mp| {
            let bar = mp.add(ProgressBar::new(0));
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{msg:25} {bytes:>10} [{bar:20}] {percent:>3}% {bytes_per_sec:>12}")
                    .expect("Invalid progress bar template")
                    .progress_chars("=> "),
            );
            bar.set_message(job.display_name.clone());
            bar
        });

        let mut last_error = String::new();
        for (i, url) in job.urls.iter().enumerate() {
            if progress.is_none() {
                info!("downloading {} from {url}", job.display_name);
            }

            match self.try_mirror(url, job, bar.as_ref()).await {
                Ok(bytes) => {
                    if let Some(bar) = &bar {
                        bar.finish_with_message(format!("{} [done]", job.display_name));
                    } else {
                        info!("finished {} ({bytes} bytes)", job.display_name);
                    }
                    return Ok(());
                }
                Err(e) => {
                    last_error = e.to_string();
                    if i + 1 < job.urls.len() {
                        debug!(
                            "mirror {url} failed for {} ({last_error}), trying next",
                            job.display_name
                        );
                    }
                }
            }
        }

        if let Some(bar) = &bar {
            bar.abandon_with_message(format!("{} [failed]", job.display_name));
        }
        Err(Error::DownloadFailed(format!(
            "{}: all mirrors exhausted ({last_error})",
            job.display_name
        )))
    }

    /// Fetch one URL into the job's destination. The file is truncated on
    /// entry so a retry on the next mirror starts clean.
    async fn try_mirror(
        &self,
        url: &str,
        job: &DownloadJob,
        bar: Option<&ProgressBar>,
    ) -> Result<u64> {
        let mut file = tokio::fs::File::create(&job.dest).await?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::DownloadFailed(format!("{url}: {e}")))?;

        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(Error::DownloadFailed(format!("{url}: HTTP {status}")));
        }

        if let Some(bar) = bar {
            if let Some(len) = response.content_length() {
                bar.set_length(len);
            }
            bar.set_position(0);
        }

        let mut downloaded: u64 = 0;
        let mut response = response;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::DownloadFailed(format!("{url}: {e}")))?
        {
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            if let Some(bar) = bar {
                bar.set_position(downloaded);
            }
        }

        file.flush().await?;
        Ok(downloaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_job_list_is_ok() {
        let fetcher = Fetcher::new().unwrap();
        fetcher.download_all(&[]).unwrap();
    }

    #[test]
    fn test_job_without_mirrors_fails() {
        let fetcher = Fetcher::new().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let job = DownloadJob::new(vec![], dir.path().join("out"), "nothing");

        let err = fetcher.download_all(&[job]).unwrap_err();
        assert!(matches!(err, Error::DownloadFailed(_)));
    }

    #[test]
    fn test_unreachable_mirror_leaves_no_partial_file() {
        let fetcher = Fetcher::new().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out");
        // Reserved TEST-NET-1 address; connection will fail fast
        let job = DownloadJob::new(
            vec!["http://192.0.2.1:1/file".to_string()],
            dest.clone(),
            "unreachable",
        );

        let err = fetcher.download_all(&[job]).unwrap_err();
        assert!(matches!(err, Error::DownloadFailed(_)));
        assert!(!dest.exists());
    }

    #[test]
    fn test_total_size_unknown_is_negative_one() {
        let fetcher = Fetcher::new().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let job = DownloadJob::new(
            vec!["http://192.0.2.1:1/file".to_string()],
            dir.path().join("out"),
            "unreachable",
        );
        assert_eq!(fetcher.total_download_size(&[job]), -1);
    }
}
