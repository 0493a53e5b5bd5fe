use super::Action;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Progress of one queue
#[derive(Debug, Clone, Serialize)]
pub struct QueueProgress {
    pub name: String,
    pub work_done: f64,
    pub total_work: f64,
    pub percent: f64,
    pub pending: usize,
    pub done: usize,
    pub failed: usize,
}

impl QueueProgress {
    pub fn is_empty(&self) -> bool {
        self.total_work <= 0.0
    }
}

/// The copy/move currently running, for the disk-space display
#[derive(Debug, Clone, Serialize)]
pub struct ActiveAction {
    pub name: String,
    pub destination: PathBuf,
    pub percent: f64,
}

/// Point-in-time view of an engine run
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub queues: Vec<QueueProgress>,
    pub overall: f64,
    pub active: Option<ActiveAction>,
    pub paused: bool,
}

/// Sum of `size * percent / 100` and of sizes
pub fn work_totals(actions: &[Arc<Action>]) -> (f64, f64) {
    actions.iter().fold((0.0, 0.0), |(done, total), action| {
        let size = action.size_of_work() as f64;
        (done + size * action.percent() / 100.0, total + size)
    })
}

/// `100 * done / total`, or 0 when there is no work
pub fn percent_of(done: f64, total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    (100.0 * done / total).clamp(0.0, 100.0)
}

/// Combined percentage over the non-empty queues
pub fn group_percent(queues: &[QueueProgress]) -> f64 {
    let (done, total) = queues
        .iter()
        .filter(|q| !q.is_empty())
        .fold((0.0, 0.0), |(d, t), q| (d + q.work_done, t + q.total_work));
    percent_of(done, total)
}
