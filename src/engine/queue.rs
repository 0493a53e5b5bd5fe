use super::{Action, EngineError, Outcome, Result, progress};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Named FIFO list of actions.
///
/// Readers always see either the state before or after a `replace`; the
/// whole swap happens under one write lock.
#[derive(Debug)]
pub struct ActionQueue {
    name: String,
    actions: RwLock<Vec<Arc<Action>>>,
    high_water: Mutex<f64>,
}

impl ActionQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: RwLock::new(Vec::new()),
            high_water: Mutex::new(0.0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append an action.
    ///
    /// A second episode download for a destination already queued is refused.
    pub fn push(&self, action: Action) -> Result<Arc<Action>> {
        let mut actions = self.actions.write();
        if action.is_episode_download()
            && actions
                .iter()
                .any(|a| a.is_episode_download() && a.destination() == action.destination())
        {
            return Err(EngineError::DuplicateDestination(
                action.destination().to_path_buf(),
            ));
        }
        let action = Arc::new(action);
        actions.push(Arc::clone(&action));
        Ok(action)
    }

    /// Append several actions, skipping refused duplicates
    pub fn extend(&self, new: impl IntoIterator<Item = Action>) -> usize {
        let mut added = 0;
        for action in new {
            match self.push(action) {
                Ok(_) => added += 1,
                Err(e) => warn!("{}: {}", self.name, e),
            }
        }
        added
    }

    /// Atomically swap the actions in `remove` for `add`.
    ///
    /// New actions take the position of the first removed one. Episode
    /// downloads whose destination is already queued are dropped. Returns
    /// the actions that were inserted.
    pub fn replace(&self, remove: &[Uuid], add: Vec<Action>) -> Vec<Arc<Action>> {
        let mut actions = self.actions.write();

        let position = actions
            .iter()
            .position(|a| remove.contains(&a.id()))
            .unwrap_or(actions.len());
        let before = actions.len();
        actions.retain(|a| !remove.contains(&a.id()));
        let removed = before - actions.len();
        let position = position.min(actions.len());

        let mut taken: HashSet<PathBuf> = actions
            .iter()
            .filter(|a| a.is_episode_download())
            .map(|a| a.destination().to_path_buf())
            .collect();

        let mut inserted = Vec::with_capacity(add.len());
        for action in add {
            if action.is_episode_download() && !taken.insert(action.destination().to_path_buf()) {
                debug!(
                    "{}: dropping duplicate download for {}",
                    self.name,
                    action.destination().display()
                );
                continue;
            }
            inserted.push(Arc::new(action));
        }

        actions.splice(position..position, inserted.iter().cloned());
        debug!(
            "{}: replaced {} action(s) with {}",
            self.name,
            removed,
            inserted.len()
        );
        inserted
    }

    pub fn remove(&self, ids: &[Uuid]) -> usize {
        let mut actions = self.actions.write();
        let before = actions.len();
        actions.retain(|a| !ids.contains(&a.id()));
        before - actions.len()
    }

    /// First action that has not started, in insertion order
    pub fn next_pending(&self) -> Option<Arc<Action>> {
        self.actions
            .read()
            .iter()
            .find(|a| a.outcome() == Outcome::NotStarted)
            .cloned()
    }

    pub fn missing(&self) -> Vec<Arc<Action>> {
        self.actions
            .read()
            .iter()
            .filter(|a| a.is_missing())
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> Vec<Arc<Action>> {
        self.actions.read().clone()
    }

    pub fn len(&self) -> usize {
        self.actions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.read().is_empty()
    }

    /// `(work_done, total_work)` over the current actions
    pub fn work(&self) -> (f64, f64) {
        progress::work_totals(&self.actions.read())
    }

    /// Size-weighted completion, never lower than any value reported before
    pub fn percent(&self) -> f64 {
        let (done, total) = self.work();
        let current = progress::percent_of(done, total);
        let mut high_water = self.high_water.lock();
        if current > *high_water {
            *high_water = current;
        }
        *high_water
    }

    /// Progress figures for display
    pub fn progress(&self) -> progress::QueueProgress {
        let actions = self.actions.read();
        let (work_done, total_work) = progress::work_totals(&actions);
        let mut counts = [0usize; 3];
        for action in actions.iter() {
            match action.outcome() {
                Outcome::Done => counts[1] += 1,
                Outcome::Failed(_) => counts[2] += 1,
                _ => counts[0] += 1,
            }
        }
        drop(actions);

        progress::QueueProgress {
            name: self.name.clone(),
            work_done,
            total_work,
            percent: self.percent(),
            pending: counts[0],
            done: counts[1],
            failed: counts[2],
        }
    }
}
