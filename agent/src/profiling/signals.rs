//! Termination signals that trigger a final profile dump

use anyhow::{Context, Result};
use std::fmt;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermSignal {
    Interrupt,
    User1,
    Terminate,
}

impl TermSignal {
    pub const ALL: [TermSignal; 3] = [TermSignal::Interrupt, TermSignal::User1, TermSignal::Terminate];

    fn kind(self) -> SignalKind {
        match self {
            TermSignal::Interrupt => SignalKind::interrupt(),
            TermSignal::User1 => SignalKind::user_defined1(),
            TermSignal::Terminate => SignalKind::terminate(),
        }
    }
}

impl fmt::Display for TermSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TermSignal::Interrupt => "interrupt",
            TermSignal::User1 => "user defined signal 1",
            TermSignal::Terminate => "terminated",
        })
    }
}

/// Forward SIGINT, SIGUSR1 and SIGTERM into `tx` until the receiver goes away.
///
/// Must be called from within a tokio runtime. Once installed, the process no
/// longer terminates on these signals by itself.
pub fn forward_os_signals(tx: UnboundedSender<TermSignal>) -> Result<()> {
    for sig in TermSignal::ALL {
        let mut stream = signal(sig.kind()).with_context(|| format!("installing {} handler", sig))?;
        let tx = tx.clone();
        tokio::spawn(async move {
            while stream.recv().await.is_some() {
                if tx.send(sig).is_err() {
                    break;
                }
            }
        });
    }
    Ok(())
}
