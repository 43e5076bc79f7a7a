//! Profiling backends
//!
//! CPU profiles are sampled with `pprof` and written as pprof protobuf when
//! recording stops. Heap snapshots are allocator statistics read from an
//! instrumented global allocator (`stats_alloc`) and written as JSON.

use anyhow::{Context, Result};
use pprof::protos::Message;
use serde::Serialize;
use stats_alloc::{Stats, StatsAlloc};
use std::alloc::System;
use std::fs::File;
use std::io::Write;

/// Records CPU samples into a file
pub trait CpuRecorder: Send {
    /// Begin recording; the profile lands in `file` when recording stops.
    fn start(&mut self, file: File) -> Result<()>;

    /// Stop recording, write the profile and close the file.
    ///
    /// A no-op when not recording.
    fn stop(&mut self) -> Result<()>;
}

/// Reads the process heap state
pub trait HeapSnapshotter: Send + Sync {
    /// Bytes currently allocated by the process
    fn allocated_bytes(&self) -> u64;

    /// Write one snapshot for `tag`
    fn write_snapshot(&self, tag: &str, w: &mut dyn Write) -> Result<()>;
}

/// CPU recorder backed by the `pprof` sampling profiler.
///
/// The sampler is process-global; only one recorder may be running at a time.
pub struct PprofRecorder {
    frequency_hz: i32,
    running: Option<(pprof::ProfilerGuard<'static>, File)>,
}

impl PprofRecorder {
    pub fn new(frequency_hz: i32) -> Self {
        Self {
            frequency_hz,
            running: None,
        }
    }
}

impl CpuRecorder for PprofRecorder {
    fn start(&mut self, file: File) -> Result<()> {
        if self.running.is_some() {
            anyhow::bail!("cpu profiling already enabled");
        }
        let guard = pprof::ProfilerGuardBuilder::default()
            .frequency(self.frequency_hz)
            .blocklist(&["libc", "libgcc", "pthread", "vdso"])
            .build()
            .context("building CPU profiler")?;
        self.running = Some((guard, file));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let Some((guard, mut file)) = self.running.take() else {
            return Ok(());
        };

        let report = guard.report().build().context("building CPU report")?;
        drop(guard);

        let profile = report.pprof().context("generating pprof profile")?;
        let mut buf = Vec::with_capacity(profile.encoded_len());
        profile
            .encode(&mut buf)
            .context("encoding pprof protobuf")?;

        file.write_all(&buf).context("writing CPU profile")?;
        file.sync_all().context("syncing CPU profile")?;
        Ok(())
    }
}

/// One heap snapshot as written to disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeapSnapshot {
    pub tag: String,
    pub taken_at: String,
    pub allocations: usize,
    pub deallocations: usize,
    pub reallocations: usize,
    pub bytes_allocated: usize,
    pub bytes_deallocated: usize,
    pub bytes_reallocated: isize,
    pub live_bytes: u64,
}

impl HeapSnapshot {
    pub fn from_stats(tag: &str, stats: &Stats) -> Self {
        Self {
            tag: tag.to_string(),
            taken_at: chrono::Local::now().to_rfc3339(),
            allocations: stats.allocations,
            deallocations: stats.deallocations,
            reallocations: stats.reallocations,
            bytes_allocated: stats.bytes_allocated,
            bytes_deallocated: stats.bytes_deallocated,
            bytes_reallocated: stats.bytes_reallocated,
            live_bytes: live_bytes(stats),
        }
    }
}

/// Bytes still held: allocated minus freed, adjusted by realloc growth
fn live_bytes(stats: &Stats) -> u64 {
    let live = stats.bytes_allocated as i128 - stats.bytes_deallocated as i128
        + stats.bytes_reallocated as i128;
    live.max(0) as u64
}

/// Heap snapshots from the instrumented global allocator
pub struct AllocStatsSnapshotter {
    alloc: &'static StatsAlloc<System>,
}

impl AllocStatsSnapshotter {
    pub fn new(alloc: &'static StatsAlloc<System>) -> Self {
        Self { alloc }
    }
}

impl HeapSnapshotter for AllocStatsSnapshotter {
    fn allocated_bytes(&self) -> u64 {
        live_bytes(&self.alloc.stats())
    }

    fn write_snapshot(&self, tag: &str, w: &mut dyn Write) -> Result<()> {
        let snapshot = HeapSnapshot::from_stats(tag, &self.alloc.stats());
        serde_json::to_writer_pretty(&mut *w, &snapshot)
            .context("Failed to serialize heap snapshot to JSON")?;
        w.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stats_alloc::INSTRUMENTED_SYSTEM;

    #[test]
    fn test_live_bytes() {
        let stats = Stats {
            allocations: 10,
            deallocations: 4,
            reallocations: 2,
            bytes_allocated: 4096,
            bytes_deallocated: 1024,
            bytes_reallocated: -512,
        };
        assert_eq!(live_bytes(&stats), 2560);

        let stats = Stats {
            bytes_allocated: 10,
            bytes_deallocated: 100,
            ..stats
        };
        assert_eq!(live_bytes(&stats), 0);
    }

    #[test]
    fn test_alloc_stats_snapshot_is_json() {
        let snapshotter = AllocStatsSnapshotter::new(&INSTRUMENTED_SYSTEM);
        let mut buf = Vec::new();
        snapshotter.write_snapshot("machine-0", &mut buf).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["tag"], "machine-0");
        assert!(value["live_bytes"].is_u64());
        assert!(value["taken_at"].is_string());
    }

    #[test]
    fn test_pprof_recorder_writes_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent-cpu-test-0.prof");
        let file = File::create(&path).unwrap();

        let mut recorder = PprofRecorder::new(100);
        recorder.start(file).unwrap();
        let mut x = 0u64;
        for i in 0..2_000_000u64 {
            x = x.wrapping_mul(31).wrapping_add(i);
        }
        std::hint::black_box(x);
        recorder.stop().unwrap();

        assert!(std::fs::metadata(&path).unwrap().len() > 0);
        // Second stop is a no-op
        recorder.stop().unwrap();
    }
}
