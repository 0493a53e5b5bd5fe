use super::{
    Action, ActionKind, ActionQueue, DiskSpace, EngineError, FileOperation, Outcome, PathLocks,
    PauseGate, Result, disk, locks,
    progress::{self, ActiveAction, ProgressSnapshot},
};
use crate::config::EngineConfig;
use crate::library::{CandidateMatch, PreviouslySeenEpisodes, sanitize_file_name};
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Told about every action that finishes successfully
pub trait CompletionListener: Send + Sync {
    fn on_complete(&self, action: &Action);
}

/// Totals for one `run`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub done: usize,
    pub failed: usize,
    /// Stopped early on request; not a failure
    pub cancelled: bool,
}

impl RunReport {
    fn merge(mut self, other: Self) -> Self {
        self.done += other.done;
        self.failed += other.failed;
        self.cancelled |= other.cancelled;
        self
    }
}

/// Executes queues of actions.
///
/// Distinct queues run concurrently up to `workers`; each queue is drained
/// in order. Actions that share a destination never overlap, whichever
/// queue they come from.
///
/// A cancellation stays in effect for later runs until
/// [`ActionEngine::reset_cancellation`] is called.
pub struct ActionEngine {
    config: EngineConfig,
    http: reqwest::Client,
    pause: PauseGate,
    cancel: Mutex<CancellationToken>,
    locks: PathLocks,
    queues: RwLock<Vec<Arc<ActionQueue>>>,
    seen: Option<Arc<PreviouslySeenEpisodes>>,
    listener: Option<Arc<dyn CompletionListener>>,
    high_water: Mutex<f64>,
}

impl ActionEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("tvrecon/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(300))
            .build()?;

        Ok(Self {
            config,
            http,
            pause: PauseGate::new(),
            cancel: Mutex::new(CancellationToken::new()),
            locks: PathLocks::new(),
            queues: RwLock::new(Vec::new()),
            seen: None,
            listener: None,
            high_water: Mutex::new(0.0),
        })
    }

    #[must_use]
    pub fn with_seen(mut self, seen: Arc<PreviouslySeenEpisodes>) -> Self {
        self.seen = Some(seen);
        self
    }

    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn CompletionListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    #[must_use]
    pub fn with_cancellation(self, token: CancellationToken) -> Self {
        *self.cancel.lock() = token;
        self
    }

    pub fn pause(&self) {
        self.pause.pause();
    }

    pub fn resume(&self) {
        self.pause.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    /// Stop dequeuing new work; in-flight actions finish
    pub fn cancel(&self) {
        info!("Cancellation requested");
        self.cancel.lock().cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.lock().clone()
    }

    /// Make the engine usable again after a cancelled run
    pub fn reset_cancellation(&self) {
        let mut cancel = self.cancel.lock();
        if cancel.is_cancelled() {
            debug!("Cancellation cleared");
            *cancel = CancellationToken::new();
        }
    }

    /// Run every queue to completion or cancellation
    pub async fn run(&self, queues: Vec<Arc<ActionQueue>>) -> RunReport {
        self.queues.write().clone_from(&queues);
        *self.high_water.lock() = 0.0;

        let cancel = self.cancellation_token();
        let total: usize = queues.iter().map(|q| q.len()).sum();
        info!(
            "Running {} action(s) across {} queue(s) with {} worker(s)",
            total,
            queues.len(),
            self.config.workers
        );

        let report = futures::stream::iter(queues.into_iter().map(|q| self.run_queue(q, &cancel)))
            .buffer_unordered(self.config.workers.max(1))
            .fold(RunReport::default(), |acc, r| async move { acc.merge(r) })
            .await;

        self.locks.prune();
        info!(
            "Run finished: {} done, {} failed{}",
            report.done,
            report.failed,
            if report.cancelled { ", cancelled" } else { "" }
        );
        report
    }

    async fn run_queue(&self, queue: Arc<ActionQueue>, cancel: &CancellationToken) -> RunReport {
        let mut report = RunReport::default();
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                () = self.pause.wait_until_resumed() => {}
            }

            let Some(action) = queue.next_pending() else {
                break;
            };

            self.execute(&action).await;
            match action.outcome() {
                Outcome::Done => report.done += 1,
                Outcome::Failed(_) => report.failed += 1,
                _ => {}
            }
        }
        debug!("Queue {} stopped", queue.name());
        report
    }

    /// Execute one action, recording its outcome on the action itself
    pub async fn execute(&self, action: &Action) {
        if !action.start() {
            return;
        }

        if action.is_missing() {
            action.fail(EngineError::StillMissing.to_string());
            return;
        }

        let result = {
            let _guard = self.locks.lock(action.destination()).await;
            debug!("Executing {}", action.name());
            match action.kind() {
                ActionKind::CopyMoveRename { source, operation } => {
                    self.copy_move(action, source, *operation).await
                }
                ActionKind::DownloadArtifact { url } => self.download_artifact(action, url).await,
                ActionKind::DownloadEpisode { candidate } => {
                    self.save_episode_download(action, candidate).await
                }
                ActionKind::WriteMetadata { contents } => {
                    self.write_metadata(action.destination(), contents).await
                }
                ActionKind::Missing { .. } => Err(EngineError::StillMissing),
            }
        };

        let result = self
            .pause
            .publish(|| match result {
                Ok(()) => {
                    action.complete();
                    Ok(())
                }
                Err(e) => {
                    action.fail(e.to_string());
                    Err(e)
                }
            })
            .await;

        match result {
            Ok(()) => {
                if let ActionKind::DownloadEpisode { candidate } = action.kind()
                    && let Some(ref seen) = self.seen
                {
                    seen.record(candidate.episode.id());
                }
                if let Some(ref listener) = self.listener {
                    listener.on_complete(action);
                }
            }
            Err(e) => warn!("{} failed: {}", action.name(), e),
        }
    }

    async fn copy_move(
        &self,
        action: &Action,
        source: &Path,
        operation: FileOperation,
    ) -> Result<()> {
        let destination = action.destination();
        if locks::normalize(source) == locks::normalize(destination) {
            debug!("{} is already in place", destination.display());
            return Ok(());
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        match operation {
            FileOperation::Copy => self.copy_with_progress(action, source, destination).await,
            FileOperation::Move | FileOperation::Rename => {
                match tokio::fs::rename(source, destination).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
                        debug!("Cross-device move of {}, copying", source.display());
                        self.copy_with_progress(action, source, destination).await?;
                        tokio::fs::remove_file(source).await?;
                        Ok(())
                    }
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    async fn copy_with_progress(
        &self,
        action: &Action,
        source: &Path,
        destination: &Path,
    ) -> Result<()> {
        let result = self.copy_chunks(action, source, destination).await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(destination).await;
        }
        result
    }

    async fn copy_chunks(&self, action: &Action, source: &Path, destination: &Path) -> Result<()> {
        let mut reader = tokio::fs::File::open(source).await?;
        let total = reader.metadata().await?.len();
        let mut writer = tokio::fs::File::create(destination).await?;
        let mut buffer = vec![0u8; self.config.copy_buffer_bytes.max(4096)];
        let mut copied: u64 = 0;

        loop {
            let n = reader.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            writer.write_all(&buffer[..n]).await?;
            copied += n as u64;

            if total > 0 {
                let percent = copied as f64 * 100.0 / total as f64;
                self.pause.publish(|| action.report_progress(percent)).await;
            }
        }

        writer.flush().await?;
        Ok(())
    }

    /// Fetch an artwork file, replacing the destination only once complete
    async fn download_artifact(&self, action: &Action, url: &str) -> Result<()> {
        let destination = action.destination();
        let staging = partial_path(destination);
        self.download(action, url, &staging).await?;
        commit(&staging, destination).await
    }

    /// Stream `url` into `path`; returns the response content type.
    ///
    /// A failed transfer removes whatever was written to `path`.
    async fn download(&self, action: &Action, url: &str, path: &Path) -> Result<Option<String>> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let result = self.stream_to(action, url, path).await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(path).await;
        }
        result
    }

    async fn stream_to(&self, action: &Action, url: &str, path: &Path) -> Result<Option<String>> {
        let mut response = self.http.get(url).send().await?.error_for_status()?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let total = response.content_length();

        let mut file = tokio::fs::File::create(path).await?;
        let mut received: u64 = 0;

        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            received += chunk.len() as u64;

            if let Some(total) = total.filter(|t| *t > 0) {
                let percent = received as f64 * 100.0 / total as f64;
                self.pause.publish(|| action.report_progress(percent)).await;
            }
        }

        file.flush().await?;
        Ok(content_type)
    }

    /// Save a search result into the download folder for the download client
    async fn save_episode_download(
        &self,
        action: &Action,
        candidate: &CandidateMatch,
    ) -> Result<()> {
        let Some(ref dir) = self.config.download_dir else {
            return Err(EngineError::Config(
                "no download folder configured".to_string(),
            ));
        };
        tokio::fs::create_dir_all(dir).await?;

        let stem = sanitize_file_name(&candidate.item.title);
        let url = candidate.item.url.as_str();

        // releases with the same title share these files whatever their target
        let staging = dir.join(format!("{stem}.part"));
        let _guard = self.locks.lock(&staging).await;

        if url.starts_with("magnet:") {
            let path = dir.join(format!("{stem}.magnet"));
            tokio::fs::write(&path, url).await?;
            info!("Saved magnet link to {}", path.display());
            return Ok(());
        }

        let content_type = self.download(action, url, &staging).await?;
        let extension = match content_type.as_deref() {
            Some(ct) if ct.contains("nzb") => "nzb",
            _ => "torrent",
        };
        let path = dir.join(format!("{stem}.{extension}"));
        commit(&staging, &path).await?;
        info!("Saved {} to {}", candidate.episode, path.display());
        Ok(())
    }

    async fn write_metadata(&self, destination: &Path, contents: &str) -> Result<()> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let staging = partial_path(destination);
        if let Err(e) = tokio::fs::write(&staging, contents).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e.into());
        }
        commit(&staging, destination).await
    }

    /// Copy/move that has started reporting progress, if any
    pub fn active_action(&self) -> Option<Arc<Action>> {
        self.queues
            .read()
            .iter()
            .flat_map(|q| q.snapshot())
            .find(|a| a.is_copy_move() && a.outcome() == Outcome::InProgress && a.percent() > 0.0)
    }

    /// Pull-based progress view for presentation layers
    pub fn current_progress(&self) -> ProgressSnapshot {
        let queues: Vec<_> = self.queues.read().iter().map(|q| q.progress()).collect();

        let overall = {
            let current = progress::group_percent(&queues);
            let mut high_water = self.high_water.lock();
            if current > *high_water {
                *high_water = current;
            }
            *high_water
        };

        let active = self.active_action().map(|a| ActiveAction {
            name: a.name().to_string(),
            destination: a.destination().to_path_buf(),
            percent: a.percent(),
        });

        ProgressSnapshot {
            queues,
            overall,
            active,
            paused: self.is_paused(),
        }
    }

    /// Free space on the volume of the active copy/move destination
    pub async fn disk_space(&self) -> DiskSpace {
        match self.active_action() {
            Some(action) => disk::probe(action.destination()).await,
            None => DiskSpace::Unknown,
        }
    }
}

/// Sibling file a transfer is written to before it replaces `destination`
fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

/// Move a finished transfer onto its final name
async fn commit(staging: &Path, destination: &Path) -> Result<()> {
    if let Err(e) = tokio::fs::rename(staging, destination).await {
        let _ = tokio::fs::remove_file(staging).await;
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn engine(dir: &TempDir) -> ActionEngine {
        ActionEngine::new(EngineConfig {
            workers: 2,
            copy_buffer_bytes: 4096,
            download_dir: Some(dir.path().join("downloads")),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_copy_creates_parent_and_completes() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.mkv");
        std::fs::write(&source, vec![7u8; 20_000]).unwrap();
        let destination = dir.path().join("Show/Season 1/out.mkv");

        let queue = Arc::new(ActionQueue::new("files"));
        let action = queue
            .push(Action::copy_move(&source, &destination, FileOperation::Copy))
            .unwrap();

        let report = engine(&dir).run(vec![queue]).await;

        assert_eq!(report.done, 1);
        assert_eq!(action.outcome(), Outcome::Done);
        assert_eq!(action.percent(), 100.0);
        assert_eq!(std::fs::read(&destination).unwrap().len(), 20_000);
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_same_path_move_is_immediately_done() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mkv");
        std::fs::write(&path, b"x").unwrap();

        let action = Action::copy_move(&path, dir.path().join("./a.mkv"), FileOperation::Move);
        engine(&dir).execute(&action).await;

        assert_eq!(action.outcome(), Outcome::Done);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_cancel_stops_before_next_action() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(ActionQueue::new("meta"));
        let first = queue
            .push(Action::write_metadata(dir.path().join("a.nfo"), "a"))
            .unwrap();

        let engine = engine(&dir);
        engine.cancel();
        let report = engine.run(vec![queue]).await;

        assert!(report.cancelled);
        assert_eq!(report.failed, 0);
        assert_eq!(first.outcome(), Outcome::NotStarted);
    }

    #[tokio::test]
    async fn test_cancelled_engine_runs_again_after_reset() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir);
        engine.cancel();

        let queue = Arc::new(ActionQueue::new("meta"));
        queue
            .push(Action::write_metadata(dir.path().join("a.nfo"), "a"))
            .unwrap();
        assert!(engine.run(vec![Arc::clone(&queue)]).await.cancelled);
        // still cancelled until cleared
        assert!(engine.run(vec![Arc::clone(&queue)]).await.cancelled);

        engine.reset_cancellation();
        let report = engine.run(vec![queue]).await;
        assert!(!report.cancelled);
        assert_eq!(report.done, 1);
        assert!(dir.path().join("a.nfo").exists());
    }

    /// Serves the headers and the first few body bytes, then hangs up
    async fn truncating_server() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut request = [0u8; 1024];
                let _ = socket.read(&mut request).await;
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 200 OK\r\nContent-Type: image/jpeg\r\n\
                          Content-Length: 100000\r\n\r\n\xff\xd8\xff\xe0jpeg",
                    )
                    .await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{address}/folder.jpg")
    }

    #[tokio::test]
    async fn test_interrupted_download_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("Show/folder.jpg");
        let action = Action::download_artifact(truncating_server().await, &destination);

        engine(&dir).execute(&action).await;

        assert!(matches!(action.outcome(), Outcome::Failed(_)));
        assert!(!destination.exists());
        assert!(!partial_path(&destination).exists());
        assert!(!crate::identifier::is_current(
            &destination,
            chrono::Utc::now() - chrono::Duration::hours(1)
        ));
    }

    #[tokio::test]
    async fn test_metadata_replaces_destination_whole() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("Show/tvshow.nfo");
        std::fs::create_dir_all(destination.parent().unwrap()).unwrap();
        std::fs::write(&destination, "<old/>").unwrap();

        let action = Action::write_metadata(&destination, "<tvshow/>");
        engine(&dir).execute(&action).await;

        assert_eq!(action.outcome(), Outcome::Done);
        assert_eq!(std::fs::read_to_string(&destination).unwrap(), "<tvshow/>");
        assert!(!partial_path(&destination).exists());
    }

    #[tokio::test]
    async fn test_same_destination_waits_across_queues() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("Show/tvshow.nfo");
        let first = Arc::new(ActionQueue::new("metadata"));
        let second = Arc::new(ActionQueue::new("more metadata"));
        let a = first
            .push(Action::write_metadata(&destination, "<a/>"))
            .unwrap();
        let b = second
            .push(Action::write_metadata(&destination, "<b/>"))
            .unwrap();

        let engine = Arc::new(engine(&dir));
        let held = engine.locks.lock(&destination).await;
        let runner = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.run(vec![first, second]).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(a.outcome(), Outcome::InProgress);
        assert_eq!(b.outcome(), Outcome::InProgress);
        assert!(!destination.exists());

        drop(held);
        let report = runner.await.unwrap();
        assert_eq!(report.done, 2);
        let contents = std::fs::read_to_string(&destination).unwrap();
        assert!(contents == "<a/>" || contents == "<b/>");
    }

    #[tokio::test]
    async fn test_same_release_title_shares_staging_lock() {
        let mut server = mockito::Server::new_async().await;
        let torrent = server
            .mock("GET", "/dl/1.torrent")
            .with_header("content-type", "application/x-bittorrent")
            .with_body("d8:announce0:e")
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let episode = crate::identifier::fixtures::episode(dir.path(), chrono::Utc::now());
        let candidate = CandidateMatch {
            item: crate::library::FeedItem {
                title: "Breaking.Bad.S01E01.720p".to_string(),
                url: format!("{}/dl/1.torrent", server.url()),
                published: None,
                size: None,
            },
            episode,
        };
        let action = Arc::new(Action::download_episode(
            candidate,
            dir.path().join("Season 1/a.mkv"),
        ));

        let engine = Arc::new(engine(&dir));
        let staging = dir.path().join("downloads/Breaking.Bad.S01E01.720p.part");
        let held = engine.locks.lock(&staging).await;
        let task = {
            let engine = Arc::clone(&engine);
            let action = Arc::clone(&action);
            tokio::spawn(async move { engine.execute(&action).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(action.outcome(), Outcome::InProgress);

        drop(held);
        task.await.unwrap();
        assert_eq!(action.outcome(), Outcome::Done);
        assert!(
            dir.path()
                .join("downloads/Breaking.Bad.S01E01.720p.torrent")
                .exists()
        );
        torrent.assert_async().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pause_freezes_running_copy() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.mkv");
        std::fs::write(&source, vec![3u8; 32 * 1024 * 1024]).unwrap();
        let queue = Arc::new(ActionQueue::new("files"));
        let action = queue
            .push(Action::copy_move(
                &source,
                dir.path().join("out.mkv"),
                FileOperation::Copy,
            ))
            .unwrap();

        let engine = Arc::new(engine(&dir));
        let runner = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.run(vec![queue]).await })
        };

        while action.percent() == 0.0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        engine.pause();
        assert_eq!(action.outcome(), Outcome::InProgress);

        let percent = action.percent();
        let overall = engine.current_progress().overall;
        assert!(percent < 100.0);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(action.percent(), percent);
        assert_eq!(engine.current_progress().overall, overall);

        engine.resume();
        let report = runner.await.unwrap();
        assert_eq!(report.done, 1);
        assert_eq!(action.percent(), 100.0);
    }
}
