//! Streamed HTTP downloads into staging files.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::time::Duration;

use relmirror_sync::{ApiError, Downloader};

use crate::error::GithubError;

const PROGRESS_STEP: u64 = 10 * 1024 * 1024;
const CHUNK: usize = 64 * 1024;

/// Plain GET downloader; release asset and archive URLs need no credentials.
#[derive(Clone)]
pub struct HttpDownloader {
    agent: ureq::Agent,
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

impl HttpDownloader {
    /// `idle` bounds each socket read or write, not the whole transfer, so a
    /// slow but steady download of a large asset is never cut off.
    pub fn new(idle: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .user_agent(concat!("relmirror/", env!("CARGO_PKG_VERSION")))
            .timeout_connect(Duration::from_secs(30))
            .timeout_read(idle)
            .timeout_write(idle)
            .redirects(8)
            .build();
        Self { agent }
    }

    fn fetch(&self, url: &str, dest: &Path) -> Result<u64, GithubError> {
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| GithubError::from_ureq("GET", url, e))?;
        let total = response
            .header("Content-Length")
            .and_then(|v| v.parse::<u64>().ok());

        let io = |source| GithubError::Io {
            path: dest.to_path_buf(),
            source,
        };
        let mut out = BufWriter::new(File::create(dest).map_err(io)?);
        let mut reader = response.into_reader();
        copy_with_progress(&mut reader, &mut out, url, total).map_err(io)
    }
}

/// Copy `reader` into `out`, logging every [`PROGRESS_STEP`] bytes when the
/// total length is known.
fn copy_with_progress(
    reader: &mut dyn Read,
    out: &mut dyn Write,
    url: &str,
    total: Option<u64>,
) -> std::io::Result<u64> {
    let mut buf = vec![0u8; CHUNK];
    let mut written = 0u64;
    let mut next_report = PROGRESS_STEP;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
        written += n as u64;
        if let Some(total) = total.filter(|t| *t > 0) {
            if written >= next_report {
                let pct = written as f64 * 100.0 / total as f64;
                tracing::info!(url, written, total, "download {pct:.1}%");
                next_report += PROGRESS_STEP;
            }
        }
    }
    out.flush()?;
    Ok(written)
}

impl Downloader for HttpDownloader {
    fn download(&self, url: &str, dest: &Path) -> Result<u64, ApiError> {
        tracing::debug!(url, dest = %dest.display(), "download started");
        match self.fetch(url, dest) {
            Ok(bytes) => {
                tracing::debug!(url, bytes, "download finished");
                Ok(bytes)
            }
            Err(err) => {
                if dest.exists() {
                    if let Err(rm) = std::fs::remove_file(dest) {
                        tracing::warn!(path = %dest.display(), error = %rm, "could not remove partial download");
                    }
                }
                Err(err.into())
            }
        }
    }
}
