//! Agent profiling
//!
//! When enabled for an agent tag, the process records a CPU profile for as long
//! as the session lasts and takes a heap snapshot every interval. A termination
//! signal (SIGINT, SIGUSR1, SIGTERM) during a session stops the CPU profile,
//! takes one last heap snapshot and exits the process with status 1.
//!
//! ```text
//!   Disabled --enable--> Active --stop--> Disabled
//!                          |
//!                          +--signal--> cpu stop -> heap snapshot -> exit(1)
//! ```
//!
//! Only one session can be active per process. Enabling while a session is
//! active logs a warning and returns an inactive session.
//!
//! Once a termination dump has started it runs to completion: stopping the
//! session waits for it, and CPU flushes from both paths are serialized on the
//! recorder lock.

pub mod backend;
pub mod capture;
pub mod signals;

pub use backend::{AllocStatsSnapshotter, CpuRecorder, HeapSnapshotter, PprofRecorder};
pub use signals::TermSignal;

use crate::config::ProfilingConfig;
use stats_alloc::StatsAlloc;
use std::alloc::System;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Exit status after a signal-triggered dump
pub const EXIT_ON_SIGNAL: i32 = 1;

type ExitFn = dyn Fn(i32) + Send + Sync;

enum SignalSource {
    Os,
    Channel(UnboundedReceiver<TermSignal>),
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Shared {
    config: ProfilingConfig,
    cpu: Mutex<Box<dyn CpuRecorder>>,
    heap: Box<dyn HeapSnapshotter>,
    exit: Box<ExitFn>,
    /// Tag of the active session, `None` while disabled
    active_tag: Mutex<Option<String>>,
    terminating: AtomicBool,
    /// Set once a termination dump has finished
    dumped: watch::Sender<bool>,
    signals: Mutex<Option<SignalSource>>,
}

impl Shared {
    fn stop_cpu(&self) {
        if let Err(e) = lock(&self.cpu).stop() {
            warn!("error writing CPU profile: {:#}", e);
        }
    }

    fn capture_heap(&self, tag: &str) {
        if let Err(e) = capture::capture_heap_profile(&self.config.output_dir, tag, self.heap.as_ref()) {
            warn!("error capturing memory profile: {:#}", e);
        }
    }

    fn terminate(&self, sig: TermSignal) {
        info!("got signal: {}, dumping profiles", sig);
        let tag = lock(&self.active_tag).clone();
        // Idle recorder is a no-op; a concurrent stop finishes its flush first.
        self.stop_cpu();
        if let Some(tag) = tag {
            self.capture_heap(&tag);
        }
        (self.exit)(EXIT_ON_SIGNAL);
        self.dumped.send_replace(true);
    }

    async fn wait_dumped(&self) {
        let mut rx = self.dumped.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }
}

pub struct ProfilerBuilder {
    config: ProfilingConfig,
    cpu: Box<dyn CpuRecorder>,
    heap: Box<dyn HeapSnapshotter>,
    exit: Box<ExitFn>,
    signals: SignalSource,
}

impl ProfilerBuilder {
    /// Replace process exit on termination
    pub fn exit_with(mut self, exit: impl Fn(i32) + Send + Sync + 'static) -> Self {
        self.exit = Box::new(exit);
        self
    }

    /// Take termination signals from `rx` instead of the OS
    pub fn signals(mut self, rx: UnboundedReceiver<TermSignal>) -> Self {
        self.signals = SignalSource::Channel(rx);
        self
    }

    pub fn build(self) -> Profiler {
        Profiler {
            shared: Arc::new(Shared {
                config: self.config,
                cpu: Mutex::new(self.cpu),
                heap: self.heap,
                exit: self.exit,
                active_tag: Mutex::new(None),
                terminating: AtomicBool::new(false),
                dumped: watch::Sender::new(false),
                signals: Mutex::new(Some(self.signals)),
            }),
        }
    }
}

/// Process-wide profiling controller
#[derive(Clone)]
pub struct Profiler {
    shared: Arc<Shared>,
}

impl Profiler {
    pub fn builder(
        config: ProfilingConfig,
        cpu: impl CpuRecorder + 'static,
        heap: impl HeapSnapshotter + 'static,
    ) -> ProfilerBuilder {
        ProfilerBuilder {
            config,
            cpu: Box::new(cpu),
            heap: Box::new(heap),
            exit: Box::new(|code| std::process::exit(code)),
            signals: SignalSource::Os,
        }
    }

    /// Profiler using pprof for CPU and `alloc` for heap statistics
    pub fn new(config: ProfilingConfig, alloc: &'static StatsAlloc<System>) -> Self {
        let frequency = config.cpu_frequency_hz;
        Self::builder(config, PprofRecorder::new(frequency), AllocStatsSnapshotter::new(alloc)).build()
    }

    /// Start CPU and heap profiling for `tag`.
    ///
    /// Never fails: if no CPU profile file can be created, profiling is skipped
    /// and the returned session is inactive. Must be called within a tokio
    /// runtime.
    pub fn enable(&self, tag: &str) -> ProfilingSession {
        let config = &self.shared.config;
        let cpu_path = {
            let mut active = lock(&self.shared.active_tag);
            if let Some(current) = active.as_ref() {
                warn!(
                    "profiling already enabled for {}, not enabling for {}",
                    current, tag
                );
                return ProfilingSession::disabled();
            }

            let (cpu_path, file) =
                match capture::create_cpu_profile(&config.output_dir, tag, config.cpu_file_attempts) {
                    Ok(created) => created,
                    Err(e) => {
                        warn!("error creating cpu profiling file: {:#}", e);
                        return ProfilingSession::disabled();
                    }
                };

            match lock(&self.shared.cpu).start(file) {
                Ok(()) => debug!("logging CPU profile to {}", cpu_path.display()),
                Err(e) => warn!("error starting CPU profiling: {:#}", e),
            }
            *active = Some(tag.to_string());
            cpu_path
        };

        self.listen_for_termination();

        let cancel = CancellationToken::new();
        let heap_task = tokio::spawn(profile_memory(
            self.shared.clone(),
            tag.to_string(),
            cancel.clone(),
        ));

        ProfilingSession {
            active: Some(ActiveSession {
                shared: self.shared.clone(),
                cpu_path,
                cancel,
                heap_task,
            }),
        }
    }

    /// Install the termination watcher on first use; it lives for the process.
    fn listen_for_termination(&self) {
        let Some(source) = lock(&self.shared.signals).take() else {
            return;
        };
        let rx = match source {
            SignalSource::Channel(rx) => rx,
            SignalSource::Os => {
                let (tx, rx) = mpsc::unbounded_channel();
                if let Err(e) = signals::forward_os_signals(tx) {
                    warn!("profiles will not be dumped on termination: {:#}", e);
                    return;
                }
                rx
            }
        };
        tokio::spawn(watch_termination(self.shared.clone(), rx));
    }
}

async fn profile_memory(shared: Arc<Shared>, tag: String, cancel: CancellationToken) {
    let interval = shared.config.heap_interval;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {
                let shared = shared.clone();
                let tag = tag.clone();
                if let Err(e) = tokio::task::spawn_blocking(move || shared.capture_heap(&tag)).await {
                    warn!("memory profile capture failed: {}", e);
                }
            }
        }
    }
}

async fn watch_termination(shared: Arc<Shared>, mut rx: UnboundedReceiver<TermSignal>) {
    while let Some(sig) = rx.recv().await {
        if shared.terminating.swap(true, Ordering::SeqCst) {
            debug!("already dumping profiles, ignoring {}", sig);
            continue;
        }
        let shared = shared.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || shared.terminate(sig)).await {
            warn!("profile dump on {} failed: {}", sig, e);
        }
    }
}

struct ActiveSession {
    shared: Arc<Shared>,
    cpu_path: PathBuf,
    cancel: CancellationToken,
    heap_task: JoinHandle<()>,
}

/// Handle returned by [`Profiler::enable`]
pub struct ProfilingSession {
    active: Option<ActiveSession>,
}

impl ProfilingSession {
    /// A session that was never started; stopping it does nothing
    pub fn disabled() -> Self {
        Self { active: None }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn cpu_profile_path(&self) -> Option<&Path> {
        self.active.as_ref().map(|s| s.cpu_path.as_path())
    }

    /// Resolve once a signal-triggered dump for this session has finished.
    ///
    /// Outside tests the dump ends the process, so this only returns when the
    /// exit hook does. Never resolves for an inactive session.
    pub async fn terminated(&self) {
        match &self.active {
            Some(session) => session.shared.wait_dumped().await,
            None => std::future::pending().await,
        }
    }

    /// End the session: stop the heap task and wait for it, then stop CPU
    /// recording and close the CPU profile.
    ///
    /// If a termination dump is under way, wait for it to finish instead of
    /// returning early.
    pub async fn stop(self) {
        let Some(session) = self.active else {
            return;
        };

        session.cancel.cancel();
        if let Err(e) = session.heap_task.await {
            warn!("memory profiling task failed: {}", e);
        }

        debug!("flushing CPU profile");
        let shared = session.shared.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || shared.stop_cpu()).await {
            warn!("stopping CPU profile failed: {}", e);
        }
        *lock(&session.shared.active_tag) = None;

        if session.shared.terminating.load(Ordering::SeqCst) {
            debug!("termination dump in progress, waiting for it");
            session.shared.wait_dumped().await;
        }
    }
}
