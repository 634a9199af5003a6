use std::sync::Arc;

use tokio::sync::watch;

use crate::view::GameView;

/// The single mutable cell holding the reconciled [`GameView`].
///
/// All components read and write through this store; the view is swapped
/// atomically, so readers always observe a complete snapshot and no two
/// components can diverge. The store carries no business logic.
#[derive(Debug, Clone)]
pub struct GameStore {
    tx: Arc<watch::Sender<GameView>>,
}

impl Default for GameStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GameStore {
    pub fn new() -> Self {
        Self::with_initial(GameView::default())
    }

    pub fn with_initial(view: GameView) -> Self {
        let (tx, _rx) = watch::channel(view);
        Self { tx: Arc::new(tx) }
    }

    /// The latest reconciled view, never partial.
    pub fn current(&self) -> GameView {
        self.tx.borrow().clone()
    }

    /// Atomic swap; the only way the view changes wholesale.
    pub fn replace(&self, view: GameView) {
        self.tx.send_replace(view);
    }

    /// Atomic read-modify-write used for check-then-set sequences such as
    /// the one-action-in-flight guard; the closure runs under the cell's
    /// internal lock and subscribers are notified afterwards.
    pub fn update<R>(&self, f: impl FnOnce(&mut GameView) -> R) -> R {
        let mut out = None;
        self.tx.send_modify(|view| out = Some(f(view)));
        out.expect("send_modify always runs the closure")
    }

    /// Change-notified receiver; `borrow()` yields the current view.
    pub fn subscribe(&self) -> watch::Receiver<GameView> {
        self.tx.subscribe()
    }
}
