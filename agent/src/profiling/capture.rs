//! Profile artifacts on disk
//!
//! CPU profiles: `agent-cpu-<tag>-<n>.prof`, where `n` is the first free suffix.
//! Heap snapshots: `agent-mem-<tag>-<timestamp>-<G.GGG>GB.mprof`, where the size
//! is the allocated heap at capture time.

use super::backend::HeapSnapshotter;
use anyhow::{Context, Result};
use jujud_shared::utils::time::profile_timestamp_now;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

pub fn cpu_profile_path(dir: &Path, tag: &str, suffix: u32) -> PathBuf {
    dir.join(format!("agent-cpu-{}-{}.prof", tag, suffix))
}

pub fn heap_profile_path(dir: &Path, tag: &str, timestamp: &str, allocated_bytes: u64) -> PathBuf {
    dir.join(format!(
        "agent-mem-{}-{}-{:.3}GB.mprof",
        tag,
        timestamp,
        allocated_bytes as f64 / GIB
    ))
}

/// Create the CPU profile file at the first suffix in `0..attempts` that is not
/// already taken. Existing files are never reused or truncated.
pub fn create_cpu_profile(dir: &Path, tag: &str, attempts: u32) -> Result<(PathBuf, File)> {
    for suffix in 0..attempts {
        let path = cpu_profile_path(dir, tag, suffix);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!(
                    "not using {} for cpu logging file already exists",
                    path.display()
                );
            }
            Err(e) => {
                return Err(e).with_context(|| format!("creating {}", path.display()));
            }
        }
    }
    anyhow::bail!(
        "all {} cpu profile files for {} already exist in {}",
        attempts,
        tag,
        dir.display()
    )
}

/// Write one heap snapshot for `tag` into `dir`, returning its path
pub fn capture_heap_profile(dir: &Path, tag: &str, heap: &dyn HeapSnapshotter) -> Result<PathBuf> {
    let path = heap_profile_path(dir, tag, &profile_timestamp_now(), heap.allocated_bytes());
    let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    debug!("logging memory profile to {}", path.display());

    let mut writer = BufWriter::new(file);
    heap.write_snapshot(tag, &mut writer)?;
    writer.flush()?;
    Ok(path)
}
