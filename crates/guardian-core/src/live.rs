//! Live views: recompute a [`LoadState`] whenever the store reports a change.
//!
//! A view owns the task that listens to the change feed. Dropping the view
//! aborts the task, which also drops its subscription, so a torn-down
//! consumer never leaves a handler firing against disposed state.
//!
//! Every notification triggers a full recomputation rather than an
//! incremental patch. Duplicate notifications therefore converge on the same
//! state, and watchers are only woken when the state actually changes.

use std::{collections::BTreeSet, future::Future};

use tokio::{
  sync::{broadcast, broadcast::error::RecvError, watch},
  task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{load::LoadState, store::Change};

pub struct LiveView<T> {
  state: watch::Receiver<LoadState<T>>,
  task:  JoinHandle<()>,
}

impl<T> LiveView<T>
where
  T: Clone + PartialEq + Send + Sync + 'static,
{
  /// Start a view that computes its initial state immediately and again on
  /// every change to one of `tables` (all tables when `tables` is empty).
  ///
  /// `changes` should be subscribed before any write the view must observe;
  /// notifications arriving during a recomputation are queued, not lost.
  pub fn spawn<F, Fut>(
    mut changes: broadcast::Receiver<Change>,
    tables: BTreeSet<String>,
    recompute: F,
  ) -> Self
  where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = LoadState<T>> + Send + 'static,
  {
    let (tx, state) = watch::channel(LoadState::Loading);

    let task = tokio::spawn(async move {
      tx.send_replace(recompute().await);

      loop {
        match changes.recv().await {
          Ok(change) if tables.is_empty() || tables.contains(&change.table) => {
            debug!(table = %change.table, kind = ?change.kind, "change received; recomputing");
          }
          Ok(_) => continue,
          Err(RecvError::Lagged(skipped)) => {
            warn!(skipped, "change feed lagged; recomputing");
          }
          Err(RecvError::Closed) => {
            debug!("change feed closed; live view stopping");
            break;
          }
        }

        let next = recompute().await;
        tx.send_if_modified(|current| {
          if *current == next {
            return false;
          }
          *current = next;
          true
        });
      }
    });

    Self { state, task }
  }

  /// A snapshot of the current state.
  pub fn current(&self) -> LoadState<T> { self.state.borrow().clone() }

  /// A receiver that can be handed to other tasks. It keeps seeing the last
  /// state after the view is dropped, but receives no further updates.
  pub fn subscribe(&self) -> watch::Receiver<LoadState<T>> { self.state.clone() }

  /// Wait until the state changes. Returns `false` once the view's task has
  /// ended.
  pub async fn changed(&mut self) -> bool { self.state.changed().await.is_ok() }
}

impl<T> Drop for LiveView<T> {
  fn drop(&mut self) { self.task.abort(); }
}
