use crate::library::{CandidateMatch, ProcessedEpisode};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// File operation performed by a copy/move/rename action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOperation {
    Copy,
    /// Move, possibly across volumes
    Move,
    /// Rename within the same folder tree
    Rename,
}

impl std::fmt::Display for FileOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Copy => write!(f, "copy"),
            Self::Move => write!(f, "move"),
            Self::Rename => write!(f, "rename"),
        }
    }
}

impl std::str::FromStr for FileOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "copy" | "cp" => Ok(Self::Copy),
            "move" | "mv" => Ok(Self::Move),
            "rename" | "ren" => Ok(Self::Rename),
            _ => Err(format!("Unknown file operation: {s}")),
        }
    }
}

/// What an action does, with everything needed to execute it
#[derive(Debug, Clone)]
pub enum ActionKind {
    CopyMoveRename {
        source: PathBuf,
        operation: FileOperation,
    },
    /// Fetch a remote artwork file to the destination
    DownloadArtifact { url: String },
    /// Hand a search result to the download client
    DownloadEpisode { candidate: CandidateMatch },
    /// Write rendered sidecar contents to the destination
    WriteMetadata { contents: String },
    /// Placeholder for an episode nobody has found yet
    Missing { episode: ProcessedEpisode },
}

impl ActionKind {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::CopyMoveRename { .. } => "copy/move/rename",
            Self::DownloadArtifact { .. } => "download",
            Self::DownloadEpisode { .. } => "download episode",
            Self::WriteMetadata { .. } => "write metadata",
            Self::Missing { .. } => "missing",
        }
    }
}

/// Execution status of an action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    NotStarted,
    InProgress,
    Done,
    Failed(String),
}

impl Outcome {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }

    const fn rank(&self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::InProgress => 1,
            Self::Done | Self::Failed(_) => 2,
        }
    }
}

#[derive(Debug)]
struct ActionState {
    percent: f64,
    outcome: Outcome,
}

/// One remediation step.
///
/// Intent (kind, destination, weight) is fixed at construction. Progress
/// only moves up and the outcome only moves forward; late or out-of-order
/// updates are ignored rather than applied.
#[derive(Debug)]
pub struct Action {
    id: Uuid,
    name: String,
    destination: PathBuf,
    size_of_work: u64,
    kind: ActionKind,
    state: Mutex<ActionState>,
}

impl Action {
    pub fn new(name: impl Into<String>, destination: impl Into<PathBuf>, kind: ActionKind) -> Self {
        let size_of_work = match kind {
            ActionKind::Missing { .. } => 0,
            ActionKind::CopyMoveRename { ref source, .. } => {
                std::fs::metadata(source).map_or(1, |m| m.len().max(1))
            }
            ActionKind::WriteMetadata { ref contents } => contents.len().max(1) as u64,
            _ => 1_000_000,
        };

        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            destination: destination.into(),
            size_of_work,
            kind,
            state: Mutex::new(ActionState {
                percent: 0.0,
                outcome: Outcome::NotStarted,
            }),
        }
    }

    pub fn copy_move(
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        operation: FileOperation,
    ) -> Self {
        let source = source.into();
        let destination = destination.into();
        let name = format!(
            "{} {} to {}",
            operation,
            source.display(),
            destination.display()
        );
        Self::new(name, destination, ActionKind::CopyMoveRename { source, operation })
    }

    pub fn download_artifact(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        let destination = destination.into();
        let name = format!("Download {}", destination.display());
        Self::new(name, destination, ActionKind::DownloadArtifact { url: url.into() })
    }

    pub fn write_metadata(destination: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let destination = destination.into();
        let name = format!("Write {}", destination.display());
        Self::new(
            name,
            destination,
            ActionKind::WriteMetadata {
                contents: contents.into(),
            },
        )
    }

    pub fn missing(episode: ProcessedEpisode, destination: impl Into<PathBuf>) -> Self {
        let name = format!("Missing {episode}");
        Self::new(name, destination, ActionKind::Missing { episode })
    }

    pub fn download_episode(candidate: CandidateMatch, destination: impl Into<PathBuf>) -> Self {
        let name = format!("Download {} for {}", candidate.item.title, candidate.episode);
        let size = candidate.item.size;
        let action = Self::new(name, destination, ActionKind::DownloadEpisode { candidate });
        match size {
            Some(size) => action.with_size_of_work(size.max(1)),
            None => action,
        }
    }

    #[must_use]
    pub const fn with_size_of_work(mut self, size: u64) -> Self {
        self.size_of_work = size;
        self
    }

    pub const fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub const fn size_of_work(&self) -> u64 {
        self.size_of_work
    }

    pub const fn kind(&self) -> &ActionKind {
        &self.kind
    }

    pub const fn is_missing(&self) -> bool {
        matches!(self.kind, ActionKind::Missing { .. })
    }

    pub const fn is_episode_download(&self) -> bool {
        matches!(self.kind, ActionKind::DownloadEpisode { .. })
    }

    pub const fn is_copy_move(&self) -> bool {
        matches!(self.kind, ActionKind::CopyMoveRename { .. })
    }

    pub fn percent(&self) -> f64 {
        self.state.lock().percent
    }

    pub fn outcome(&self) -> Outcome {
        self.state.lock().outcome.clone()
    }

    /// Raise the completion percentage; lower values are ignored
    pub fn report_progress(&self, percent: f64) {
        let mut state = self.state.lock();
        if state.outcome.is_terminal() {
            return;
        }
        let percent = percent.clamp(0.0, 100.0);
        if percent > state.percent {
            state.percent = percent;
        }
    }

    /// Move to `outcome` if it is a forward transition; returns whether it applied
    pub fn transition(&self, outcome: Outcome) -> bool {
        let mut state = self.state.lock();
        if outcome.rank() <= state.outcome.rank() {
            return false;
        }
        if outcome.is_terminal() {
            // a failed action still counts its work as spent
            state.percent = 100.0;
        }
        state.outcome = outcome;
        true
    }

    pub fn start(&self) -> bool {
        self.transition(Outcome::InProgress)
    }

    pub fn complete(&self) -> bool {
        self.transition(Outcome::Done)
    }

    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.transition(Outcome::Failed(reason.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_never_regresses() {
        let action = Action::write_metadata("/tmp/x.nfo", "<tvshow/>");
        action.report_progress(40.0);
        action.report_progress(25.0);
        assert_eq!(action.percent(), 40.0);
        action.report_progress(250.0);
        assert_eq!(action.percent(), 100.0);
    }

    #[test]
    fn test_outcome_moves_forward_only() {
        let action = Action::download_artifact("http://x/a.jpg", "/tmp/a.jpg");
        assert!(action.start());
        assert!(!action.start());
        assert!(action.fail("boom"));
        assert!(!action.complete());
        assert_eq!(action.outcome(), Outcome::Failed("boom".to_string()));
    }

    #[test]
    fn test_operation_parse() {
        assert_eq!("mv".parse::<FileOperation>().unwrap(), FileOperation::Move);
        assert!("teleport".parse::<FileOperation>().is_err());
    }
}
