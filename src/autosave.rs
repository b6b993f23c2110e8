//! Debounced write-back of local edits.
//!
//! Each entity gets its own debounce window; a burst of edits to one widget produces a single
//! update carrying the latest state. The store lock is never held across the network call.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::persistence::{EntityKey, Persistence};
use crate::scheduler::KeyedScheduler;
use crate::store::{DashboardStore, SyncOutcome};

pub struct Autosaver<P: ?Sized> {
    store: Arc<Mutex<DashboardStore>>,
    persistence: Arc<P>,
    scheduler: KeyedScheduler<EntityKey>,
}

impl<P> Autosaver<P>
where
    P: Persistence + ?Sized + 'static,
{
    pub fn new(store: Arc<Mutex<DashboardStore>>, persistence: Arc<P>, debounce: Duration) -> Self {
        Self {
            store,
            persistence,
            scheduler: KeyedScheduler::new(debounce),
        }
    }

    pub fn store(&self) -> &Arc<Mutex<DashboardStore>> {
        &self.store
    }

    /// Queue an update for `key`. The record is captured when the window closes, so the
    /// latest local state is what gets sent. Resolves to `None` if a later edit superseded it.
    pub fn schedule_update(&self, key: EntityKey) -> JoinHandle<Option<SyncOutcome>> {
        let store = Arc::clone(&self.store);
        let persistence = Arc::clone(&self.persistence);
        self.scheduler.schedule(key.clone(), move |_| async move {
            let record = {
                let store = store.lock().await;
                match store.record_for(&key) {
                    Ok(record) => record,
                    Err(_) => {
                        debug!(entity = %key, "entity removed before autosave");
                        return SyncOutcome::Superseded;
                    }
                }
            };
            let response = persistence.update(record).await;
            store.lock().await.reconcile(&key, response)
        })
    }

    /// Queue a delete. Any pending update for the same entity is dropped.
    pub fn schedule_delete(&self, key: EntityKey) -> JoinHandle<Option<SyncOutcome>> {
        let store = Arc::clone(&self.store);
        let persistence = Arc::clone(&self.persistence);
        self.scheduler.schedule(key.clone(), move |_| async move {
            let response = persistence.delete(&key).await;
            store.lock().await.reconcile_delete(key, response)
        })
    }

    pub fn cancel(&self, key: &EntityKey) -> bool {
        self.scheduler.cancel(key)
    }

    pub fn pending(&self) -> usize {
        self.scheduler.pending_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Widget, WidgetPatch};
    use crate::persistence::MemoryPersistence;
    use crate::store::SyncOp;

    async fn saved_store(persistence: &MemoryPersistence) -> (Arc<Mutex<DashboardStore>>, String) {
        let mut store = DashboardStore::new("d1", "Sales");
        let page = store.add_page("Overview");
        let tmp = store.add_widget(&page, Widget::new(""), None).unwrap();
        let outcome = store
            .sync(persistence, SyncOp::Create(EntityKey::widget(tmp)))
            .await;
        assert_eq!(outcome, SyncOutcome::Applied);
        let id = store.widget_ids()[0].clone();
        (Arc::new(Mutex::new(store)), id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_edits_collapse_into_one_update() {
        let persistence = Arc::new(MemoryPersistence::new());
        let (store, id) = saved_store(&persistence).await;
        let saver = Autosaver::new(
            Arc::clone(&store),
            Arc::clone(&persistence),
            Duration::from_millis(800),
        );

        let mut handles = Vec::new();
        for title in ["a", "ab", "abc"] {
            store
                .lock()
                .await
                .update_widget(
                    &id,
                    WidgetPatch {
                        title: Some(title.into()),
                        ..Default::default()
                    },
                )
                .unwrap();
            handles.push(saver.schedule_update(EntityKey::widget(id.clone())));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let mut outcomes = Vec::new();
        for h in handles {
            outcomes.push(h.await.unwrap());
        }
        assert_eq!(outcomes, vec![None, None, Some(SyncOutcome::Applied)]);

        let saved = persistence.get(&EntityKey::widget(id)).unwrap();
        match saved {
            crate::persistence::Record::Widget(w) => assert_eq!(w.widget.title, "abc"),
            other => panic!("unexpected record {:?}", other),
        }
    }
}
