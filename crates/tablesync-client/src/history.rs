//! Undo/redo history.
//!
//! A [`History`] is a timeline of actions plus a cursor: everything before
//! the cursor is done (can be undone), everything after it was undone (can
//! be redone). Registering a new action drops the redoable tail.
//!
//! The cursor moves as soon as `register`/`undo`/`redo` is called, while the
//! action bodies run on one worker task in call order. Callers that never
//! await the returned [`Completion`] still get strictly serialized effects.

use std::future::{Future, IntoFuture};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};

use tablesync_core::error::{Result, TableSyncError};

/// Something that can be done and undone.
#[async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> &str;
    async fn apply(&self) -> Result<()>;
    async fn revert(&self) -> Result<()>;
}

type ActionFn = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

fn erase<F, Fut>(f: F) -> ActionFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move || -> BoxFuture<'static, Result<()>> { Box::pin(f()) })
}

/// Action built from a pair of closures.
pub struct BidirectionalAction {
    name: String,
    apply: ActionFn,
    revert: ActionFn,
}

impl BidirectionalAction {
    pub fn new<D, DFut, U, UFut>(name: impl Into<String>, apply: D, revert: U) -> Self
    where
        D: Fn() -> DFut + Send + Sync + 'static,
        DFut: Future<Output = Result<()>> + Send + 'static,
        U: Fn() -> UFut + Send + Sync + 'static,
        UFut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            apply: erase(apply),
            revert: erase(revert),
        }
    }
}

#[async_trait]
impl Action for BidirectionalAction {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self) -> Result<()> {
        (self.apply)().await
    }

    async fn revert(&self) -> Result<()> {
        (self.revert)().await
    }
}

type UndoableFn = Arc<dyn Fn() -> BoxFuture<'static, Result<ActionFn>> + Send + Sync>;

/// Action whose undo is produced by running it. Each run replaces the
/// stored undo, so an undo after a redo targets what the redo created.
struct UndoableAction {
    name: String,
    apply: UndoableFn,
    undo: Mutex<Option<ActionFn>>,
}

impl UndoableAction {
    fn undo_slot(&self) -> MutexGuard<'_, Option<ActionFn>> {
        self.undo.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Action for UndoableAction {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self) -> Result<()> {
        let undo = (self.apply)().await?;
        *self.undo_slot() = Some(undo);
        Ok(())
    }

    async fn revert(&self) -> Result<()> {
        let undo = self.undo_slot().clone();
        match undo {
            Some(undo) => undo().await,
            None => Ok(()),
        }
    }
}

/// Snapshot of a history: action names and the cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryState {
    pub timeline: Vec<String>,
    /// Actions before this index are done; the rest can be redone.
    pub present_index: usize,
}

#[derive(Default)]
struct Timeline {
    actions: Vec<Arc<dyn Action>>,
    present: usize,
}

type Job = BoxFuture<'static, ()>;

/// Result of a history operation.
///
/// Await it (`history.undo().await`) to wait for the action body; the
/// output names the action, or is `None` when there was nothing to do.
#[must_use = "await the completion to observe the action's result"]
pub struct Completion {
    action: Option<String>,
    done: Option<oneshot::Receiver<Result<()>>>,
}

impl Completion {
    fn nothing() -> Self {
        Self {
            action: None,
            done: None,
        }
    }

    /// Name of the action this completion belongs to.
    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }
}

impl IntoFuture for Completion {
    type Output = Result<Option<String>>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move {
            if let Some(done) = self.done {
                done.await
                    .map_err(|_| TableSyncError::Internal("history worker stopped".into()))??;
            }
            Ok(self.action)
        })
    }
}

pub struct History {
    timeline: Arc<Mutex<Timeline>>,
    jobs: mpsc::UnboundedSender<Job>,
}

impl History {
    /// Create a history and spawn its worker. Must be called inside a tokio
    /// runtime; the worker stops when the history is dropped.
    pub fn new() -> Self {
        let (jobs, mut rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job.await;
            }
        });
        Self {
            timeline: Arc::new(Mutex::new(Timeline::default())),
            jobs,
        }
    }

    fn timeline(&self) -> MutexGuard<'_, Timeline> {
        lock(&self.timeline)
    }

    fn enqueue<F>(&self, name: String, work: F) -> Completion
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let _ = tx.send(work.await);
        });
        if self.jobs.send(job).is_err() {
            tracing::warn!(action = %name, "history worker is gone");
        }
        Completion {
            action: Some(name),
            done: Some(rx),
        }
    }

    /// Append `action` after the cursor (dropping the redoable tail) and run it.
    pub fn register(&self, action: impl Action + 'static) -> Completion {
        let action: Arc<dyn Action> = Arc::new(action);
        {
            let mut t = self.timeline();
            let present = t.present;
            t.actions.truncate(present);
            t.actions.push(Arc::clone(&action));
            t.present += 1;
        }
        let name = action.name().to_string();
        self.enqueue(name, async move { action.apply().await })
    }

    /// Run `apply` and record it once it succeeded. `apply` returns the
    /// function that undoes what it just did.
    pub fn register_undoable<D, DFut, U, UFut>(&self, name: impl Into<String>, apply: D) -> Completion
    where
        D: Fn() -> DFut + Send + Sync + 'static,
        DFut: Future<Output = Result<U>> + Send + 'static,
        U: Fn() -> UFut + Send + Sync + 'static,
        UFut: Future<Output = Result<()>> + Send + 'static,
    {
        let apply: UndoableFn = Arc::new(move || -> BoxFuture<'static, Result<ActionFn>> {
            let fut = apply();
            Box::pin(async move { fut.await.map(erase) })
        });
        let action = Arc::new(UndoableAction {
            name: name.into(),
            apply,
            undo: Mutex::new(None),
        });

        let timeline = Arc::clone(&self.timeline);
        let name = action.name.clone();
        self.enqueue(name, async move {
            action.apply().await?;
            let mut t = lock(&timeline);
            let present = t.present;
            t.actions.truncate(present);
            t.actions.push(action);
            t.present += 1;
            Ok(())
        })
    }

    /// Undo the action before the cursor. No-op at the start of the timeline.
    pub fn undo(&self) -> Completion {
        let action = {
            let mut t = self.timeline();
            if t.present == 0 {
                return Completion::nothing();
            }
            t.present -= 1;
            Arc::clone(&t.actions[t.present])
        };
        let name = action.name().to_string();
        self.enqueue(name, async move { action.revert().await })
    }

    /// Redo the action at the cursor. No-op at the end of the timeline.
    pub fn redo(&self) -> Completion {
        let action = {
            let mut t = self.timeline();
            let Some(action) = t.actions.get(t.present).cloned() else {
                return Completion::nothing();
            };
            t.present += 1;
            action
        };
        let name = action.name().to_string();
        self.enqueue(name, async move { action.apply().await })
    }

    pub fn state(&self) -> HistoryState {
        let t = self.timeline();
        HistoryState {
            timeline: t.actions.iter().map(|a| a.name().to_string()).collect(),
            present_index: t.present,
        }
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

fn lock(timeline: &Mutex<Timeline>) -> MutexGuard<'_, Timeline> {
    timeline.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Histories keyed by scope (one per board, one for templates, ...),
/// created on first use.
pub struct HistoryRegistry<K> {
    histories: DashMap<K, Arc<History>>,
}

impl<K: Eq + Hash + Clone> HistoryRegistry<K> {
    pub fn new() -> Self {
        Self {
            histories: DashMap::new(),
        }
    }

    pub fn history_of(&self, key: &K) -> Arc<History> {
        if let Some(h) = self.histories.get(key) {
            return Arc::clone(h.value());
        }
        Arc::clone(
            self.histories
                .entry(key.clone())
                .or_insert_with(|| Arc::new(History::new()))
                .value(),
        )
    }

    pub fn forget(&self, key: &K) {
        self.histories.remove(key);
    }

    pub fn len(&self) -> usize {
        self.histories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }
}

impl<K: Eq + Hash + Clone> Default for HistoryRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::atomic::{AtomicI64, Ordering};
    use std::time::Duration;

    use super::*;

    fn set_counter(
        counter: &Arc<AtomicI64>,
        to: i64,
    ) -> impl Fn() -> BoxFuture<'static, Result<()>> + Send + Sync + 'static {
        let counter = Arc::clone(counter);
        move || -> BoxFuture<'static, Result<()>> {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.store(to, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    fn set_action(name: &str, counter: &Arc<AtomicI64>, from: i64, to: i64) -> BidirectionalAction {
        BidirectionalAction::new(name, set_counter(counter, to), set_counter(counter, from))
    }

    #[tokio::test]
    async fn undo_and_redo_on_empty_history_do_nothing() {
        let h = History::new();
        assert_eq!(h.undo().await.unwrap(), None);
        assert_eq!(h.redo().await.unwrap(), None);
        assert_eq!(h.state(), HistoryState::default());
    }

    #[tokio::test]
    async fn register_truncates_redo_tail() {
        let counter = Arc::new(AtomicI64::new(0));
        let h = History::new();

        h.register(set_action("to 1", &counter, 0, 1)).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(h.redo().await.unwrap(), None);

        assert_eq!(h.undo().await.unwrap().as_deref(), Some("to 1"));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(h.undo().await.unwrap(), None);

        h.register(set_action("to 2", &counter, 0, 2)).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(
            h.state(),
            HistoryState {
                timeline: vec!["to 2".into()],
                present_index: 1,
            }
        );
    }

    #[tokio::test]
    async fn undo_and_redo_many_times() {
        let counter = Arc::new(AtomicI64::new(0));
        let h = History::new();
        for i in 0..5 {
            h.register(set_action(&format!("to {}", i + 1), &counter, i, i + 1))
                .await
                .unwrap();
        }

        for _ in 0..3 {
            h.undo().await.unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(h.state().present_index, 2);

        for _ in 0..10 {
            h.redo().await.unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert_eq!(h.state().present_index, 5);
    }

    #[tokio::test]
    async fn unawaited_calls_still_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let h = History::new();

        let slow_log = Arc::clone(&log);
        let undo_log = Arc::clone(&log);
        let pending = h.register(BidirectionalAction::new(
            "slow",
            move || {
                let log = Arc::clone(&slow_log);
                async move {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    log.lock().unwrap().push("do");
                    Ok(())
                }
            },
            move || {
                let log = Arc::clone(&undo_log);
                async move {
                    log.lock().unwrap().push("undo");
                    Ok(())
                }
            },
        ));
        drop(pending);

        let undone = h.undo();
        assert_eq!(h.state().present_index, 0);
        undone.await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["do", "undo"]);
    }

    #[tokio::test]
    async fn undoable_keeps_the_latest_undo() {
        let created = Arc::new(Mutex::new(Vec::<u32>::new()));
        let next_id = Arc::new(AtomicI64::new(0));
        let h = History::new();

        let store = Arc::clone(&created);
        h.register_undoable("create", move || {
            let store = Arc::clone(&store);
            let id = next_id.fetch_add(1, Ordering::SeqCst) as u32;
            async move {
                store.lock().unwrap().push(id);
                let undo_store = Arc::clone(&store);
                Ok(move || {
                    let store = Arc::clone(&undo_store);
                    async move {
                        store.lock().unwrap().retain(|x| *x != id);
                        Ok(())
                    }
                })
            }
        })
        .await
        .unwrap();
        assert_eq!(*created.lock().unwrap(), vec![0]);

        h.undo().await.unwrap();
        h.redo().await.unwrap();
        assert_eq!(*created.lock().unwrap(), vec![1]);

        h.undo().await.unwrap();
        assert!(created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_undoable_is_not_recorded() {
        let h = History::new();
        let err = h
            .register_undoable("boom", || async {
                Err::<fn() -> std::future::Ready<Result<()>>, _>(TableSyncError::NotFound(
                    "board".into(),
                ))
            })
            .await
            .unwrap_err();
        assert_eq!(err.client_code().as_str(), "NOT_FOUND");
        assert_eq!(h.state(), HistoryState::default());
    }

    #[tokio::test]
    async fn registry_creates_histories_lazily() {
        let reg: HistoryRegistry<String> = HistoryRegistry::new();
        assert!(reg.is_empty());

        let a = reg.history_of(&"board-1".to_string());
        let again = reg.history_of(&"board-1".to_string());
        assert!(Arc::ptr_eq(&a, &again));

        reg.history_of(&"templates".to_string());
        assert_eq!(reg.len(), 2);
        reg.forget(&"board-1".to_string());
        assert_eq!(reg.len(), 1);
    }
}
