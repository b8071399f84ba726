//! Termination signal plumbing.
//!
//! The CLI installs a handler that records the first SIGINT or SIGTERM in a
//! watch channel. The executor checks it between commands and selects on it
//! while a child is running, forwarding the same signal to the child.

use tokio::sync::watch;

#[derive(Debug)]
pub struct Shutdown {
    rx: watch::Receiver<Option<i32>>,
    // kept so `disabled()` channels never observe a closed sender
    _tx: Option<watch::Sender<Option<i32>>>,
}

impl Shutdown {
    /// A shutdown handle that never fires. Used by dry runs and tests.
    pub fn disabled() -> Self {
        let (tx, rx) = watch::channel(None);
        Self { rx, _tx: Some(tx) }
    }

    /// A shutdown handle with a manual trigger.
    pub fn manual() -> (Self, watch::Sender<Option<i32>>) {
        let (tx, rx) = watch::channel(None);
        (Self { rx, _tx: None }, tx)
    }

    /// Install process signal handlers and return the handle observing them.
    pub fn install() -> Self {
        let (tx, rx) = watch::channel(None);
        tokio::spawn(async move {
            let signal = wait_for_signal().await;
            tracing::warn!("received signal {signal}, stopping after the current command");
            let _ = tx.send(Some(signal));
        });
        Self { rx, _tx: None }
    }

    /// The signal received so far, if any.
    pub fn pending(&self) -> Option<i32> {
        *self.rx.borrow()
    }

    /// Wait until a signal arrives. Never completes if the trigger side is
    /// gone without firing.
    pub async fn recv(&mut self) -> i32 {
        loop {
            if let Some(signal) = *self.rx.borrow() {
                return signal;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> i32 {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint =
        signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm =
        signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = sigint.recv() => libc::SIGINT,
        _ = sigterm.recv() => libc::SIGTERM,
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> i32 {
    let _ = tokio::signal::ctrl_c().await;
    2
}
