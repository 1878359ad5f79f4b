//! Single-writer registry mapping a cell identity to its subscribers.
//!
//! Mirrors the original's two-channel design (one for registrations, one for
//! change events) feeding a single worker task that owns the map — no lock
//! is needed beyond what's required to hand work to the worker, since only
//! the worker ever mutates `events`. One dispatcher is spawned per `Engine`
//! (§5(e)) rather than shared process-wide: a process-global instance would
//! lazily bind its worker to whichever runtime touched it first, outliving
//! that runtime unpredictably and requiring every cell mutation — even in a
//! plain `#[test]` with no runtime at all — to implicitly spawn one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, Sender};
use tokio::sync::watch;

/// Opaque handle standing in for Go's pointer-identity map key (§9 design
/// note 2): Rust gives no stable address across moves, so every cell mints
/// one of these at construction time instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId(u64);

impl CellId {
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for CellId {
    fn default() -> Self {
        Self::new()
    }
}

/// A zero-argument change callback. Must not block: it runs inline on the
/// dispatcher's single worker task.
pub type Callback = Box<dyn Fn() + Send + Sync + 'static>;

struct Registration {
    cell: CellId,
    callback: Callback,
}

enum Message {
    Register(Registration),
    Changed(CellId),
}

/// Handle used by cells to enqueue registrations and change notifications.
#[derive(Clone)]
pub struct Dispatcher {
    tx: Sender<Message>,
}

impl Dispatcher {
    /// Spawns this dispatcher's worker task, tied to `shutdown`: the worker
    /// exits as soon as the owning `Engine` signals shutdown, rather than
    /// running until its channel is dropped (which a process-global instance
    /// could never guarantee happens at all).
    pub(crate) fn spawn(mut shutdown: watch::Receiver<bool>) -> Self {
        let (tx, mut rx) = mpsc::channel::<Message>(256);
        tokio::spawn(async move {
            let mut events: HashMap<CellId, Vec<Callback>> = HashMap::new();
            loop {
                tokio::select! {
                    _ = shutdown.changed() => return,
                    msg = rx.recv() => {
                        let Some(msg) = msg else { return };
                        match msg {
                            Message::Register(reg) => {
                                events.entry(reg.cell).or_default().push(reg.callback);
                            }
                            Message::Changed(cell) => {
                                if let Some(callbacks) = events.get(&cell) {
                                    for cb in callbacks {
                                        cb();
                                    }
                                }
                            }
                        }
                    }
                }
            }
        });
        Self { tx }
    }

    /// Enqueue `callback` to run whenever `cell` changes. Registration order
    /// is preserved: callbacks for one cell fire in registration order.
    ///
    /// Registration is rare (once per field, at start-of-day), so unlike
    /// `notify` this awaits channel capacity rather than dropping on
    /// back-pressure.
    pub fn register(&self, cell: CellId, callback: Callback) {
        let tx = self.tx.clone();
        let reg = Message::Register(Registration { cell, callback });
        tokio::spawn(async move {
            let _ = tx.send(reg).await;
        });
    }

    /// Enqueue a change notification for `cell`. A no-op `Store` (parsed
    /// value equal to current) never calls this.
    pub fn notify(&self, cell: CellId) {
        let _ = self.tx.try_send(Message::Changed(cell));
    }
}
