use std::{fs::File, io::Write, path::{Path, PathBuf}, thread, time::Duration};

use anyhow::{bail, Context, Result};
use log::warn;
use reqwest::blocking::Client;
use tempfile::NamedTempFile;

/// Per-request timeout for the one remote input (the density WFS layer).
const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Number of attempts before a fetch is considered failed.
const FETCH_ATTEMPTS: u32 = 3;

/// Write-then-rename wrapper for atomic downloads.
struct PendingWrite {
    target: PathBuf,
    tmp: Option<(NamedTempFile, bool)>, // (file, need_fsync_dir)
}

impl PendingWrite {
    /// Open a file for a pending write.
    fn open(target: &Path, force: bool) -> Result<Self> {
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }
        if !force && target.exists() {
            bail!("Refusing to overwrite existing file: {} (use --force)", target.display());
        }
        let need_fsync_dir = target.parent().is_some();
        let tmp = NamedTempFile::new_in(target.parent().unwrap_or(Path::new(".")))
            .context("create temp file")?;

        Ok(Self { target: target.to_path_buf(), tmp: Some((tmp, need_fsync_dir)) })
    }

    /// Finalize the pending write (fsync, atomic rename).
    fn finalize(mut self) -> Result<()> {
        let (tmp, need_fsync_dir) = self.tmp.take().context("already finalized")?;
        tmp.as_file().sync_all().ok(); // best-effort fsync file
        tmp.persist(&self.target)
            .with_context(|| format!("rename to {}", self.target.display()))?;
        if need_fsync_dir {
            if let Some(dir) = self.target.parent() {
                let _ = File::open(dir).and_then(|f| f.sync_all());
            }
        }
        Ok(())
    }
}

impl Write for PendingWrite {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.tmp.as_mut().expect("finalized").0.write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.tmp.as_mut().expect("finalized").0.flush()
    }
}

/// Fetch `url` into `out_path` with a scoped client (explicit timeout) and a
/// bounded retry loop. Each attempt writes to a fresh temp file, so a partial
/// response never lands at the target path.
pub fn fetch_to_file(url: &str, out_path: &Path, force: bool) -> Result<()> {
    let client = Client::builder()
        .timeout(FETCH_TIMEOUT)
        .user_agent(concat!("wahlweg/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("build HTTP client")?;

    let mut last_err = None;
    for attempt in 1..=FETCH_ATTEMPTS {
        match fetch_once(&client, url, out_path, force) {
            Ok(()) => return Ok(()),
            Err(err) => {
                warn!("fetch attempt {attempt}/{FETCH_ATTEMPTS} failed: {err:#}");
                last_err = Some(err);
                if attempt < FETCH_ATTEMPTS {
                    thread::sleep(Duration::from_secs(2u64.pow(attempt)));
                }
            }
        }
    }

    Err(last_err.expect("at least one attempt ran"))
        .with_context(|| format!("GET {url} failed after {FETCH_ATTEMPTS} attempts"))
}

fn fetch_once(client: &Client, url: &str, out_path: &Path, force: bool) -> Result<()> {
    let mut sink = PendingWrite::open(out_path, force)?;

    let mut resp = client
        .get(url)
        .send()
        .with_context(|| format!("GET {url}"))?
        .error_for_status()
        .with_context(|| format!("GET {url} returned error status"))?;

    std::io::copy(&mut resp, &mut sink)
        .with_context(|| format!("write {}", out_path.display()))?;

    sink.finalize()
}
