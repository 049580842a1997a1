use tokio::sync::watch;

/// Fires when dropped, telling the paired [`Cancellation`] that nobody awaits the result
/// anymore.
///
/// Held by the caller side of a command while the command itself runs on its own task.
#[derive(Debug)]
pub struct CancelGuard {
    tx: watch::Sender<()>,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        // No receiver left means the command already finished.
        let _ = self.tx.send(());
    }
}

/// Read side of a [`CancelGuard`], checked by a command between its steps.
#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: Option<watch::Receiver<()>>,
}

impl Cancellation {
    /// A cancellation that never fires.
    pub fn none() -> Cancellation {
        Cancellation { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        match &self.rx {
            Some(rx) => rx.has_changed().unwrap_or(true),
            None => false,
        }
    }
}

/// Creates a new pair of [`CancelGuard`] and [`Cancellation`].
pub fn cancellation_pair() -> (CancelGuard, Cancellation) {
    let (tx, rx) = watch::channel(());
    (CancelGuard { tx }, Cancellation { rx: Some(rx) })
}
