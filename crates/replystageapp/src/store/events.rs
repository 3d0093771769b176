use tokio::sync::watch;
use uuid::Uuid;

/// The latest change published by the store.
///
/// Observers never see a backlog: each publish replaces the previous notice, so a
/// slow reader only learns the newest `generation` and the files it touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeNotice {
    pub generation: u64,
    pub changed: Vec<Uuid>,
}

#[derive(Debug)]
pub(crate) struct StoreEvents {
    tx: watch::Sender<ChangeNotice>,
}

impl StoreEvents {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(ChangeNotice::default());
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ChangeNotice> {
        self.tx.subscribe()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.tx.borrow().generation
    }

    pub(crate) fn publish(&self, changed: Vec<Uuid>) {
        self.tx.send_modify(|notice| {
            notice.generation += 1;
            notice.changed = changed;
        });
    }
}
