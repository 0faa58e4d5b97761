use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

use crate::types::ScreenshotEvent;

pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("watch directory does not exist: {0}")]
    MissingDirectory(PathBuf),
    #[error("failed to watch {path}: {source}")]
    Notify {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// How long a new file may take to become readable.
#[derive(Debug, Clone, Copy)]
pub struct StabilizePolicy {
    pub max_attempts: u32,
    /// Pause after an attempt that found the file missing, empty or unreadable.
    pub unready_delay: Duration,
    /// Pause between seeing a non-empty file and reading it.
    pub settle_delay: Duration,
}

impl Default for StabilizePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            unready_delay: Duration::from_millis(500),
            settle_delay: Duration::from_millis(1000),
        }
    }
}

/// Polls `path` until it is non-empty and readable. `false` once the attempts run out.
pub async fn wait_until_ready(path: &Path, policy: &StabilizePolicy) -> bool {
    for attempt in 1..=policy.max_attempts {
        let non_empty = tokio::fs::metadata(path)
            .await
            .map(|meta| meta.is_file() && meta.len() > 0)
            .unwrap_or(false);

        if non_empty {
            tokio::time::sleep(policy.settle_delay).await;
            if is_readable(path).await {
                return true;
            }
        }

        log::debug!(
            "[watcher] {} not ready (attempt {}/{})",
            path.display(),
            attempt,
            policy.max_attempts
        );
        tokio::time::sleep(policy.unready_delay).await;
    }
    false
}

async fn is_readable(path: &Path) -> bool {
    match tokio::fs::File::open(path).await {
        Ok(mut file) => {
            let mut byte = [0u8; 1];
            file.read(&mut byte).await.is_ok()
        }
        Err(_) => false,
    }
}

pub type ScreenshotCallback = Arc<dyn Fn(ScreenshotEvent) + Send + Sync>;

/// Turns creation events into at most one callback per file.
pub struct ScreenshotHandler {
    callback: ScreenshotCallback,
    extensions: Vec<String>,
    policy: StabilizePolicy,
    processing: Mutex<HashSet<PathBuf>>,
}

impl ScreenshotHandler {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(ScreenshotEvent) + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
            extensions: SUPPORTED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            policy: StabilizePolicy::default(),
            processing: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_policy(mut self, policy: StabilizePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.extensions.iter().any(|e| *e == ext)
            })
            .unwrap_or(false)
    }

    pub async fn on_created(&self, path: PathBuf) {
        if !self.is_supported(&path) {
            return;
        }
        let Some(_claim) = Claim::take(&self.processing, &path) else {
            log::debug!("[watcher] Already processing {}", path.display());
            return;
        };

        if wait_until_ready(&path, &self.policy).await {
            log::info!("New screenshot detected: {}", path.display());
            (self.callback)(ScreenshotEvent::new(path));
        } else {
            log::warn!(
                "File not ready after {} attempts: {}",
                self.policy.max_attempts,
                path.display()
            );
        }
    }
}

/// In-progress marker, released on drop.
struct Claim<'a> {
    set: &'a Mutex<HashSet<PathBuf>>,
    path: PathBuf,
}

impl<'a> Claim<'a> {
    fn take(set: &'a Mutex<HashSet<PathBuf>>, path: &Path) -> Option<Self> {
        let inserted = set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_path_buf());
        if inserted {
            Some(Self {
                set,
                path: path.to_path_buf(),
            })
        } else {
            None
        }
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.path);
    }
}

/// Non-recursive watch of one directory.
///
/// The OS callback only forwards events into a channel. A dispatcher task
/// runs the stabilization poll per file, so slow writers never stall event
/// delivery. Must be started from within a Tokio runtime.
pub struct FileWatcher {
    watcher: Option<RecommendedWatcher>,
    dispatcher: Option<JoinHandle<()>>,
}

impl FileWatcher {
    pub fn start(watch_dir: impl Into<PathBuf>, handler: ScreenshotHandler) -> Result<Self, WatchError> {
        let watch_dir = watch_dir.into();
        if !watch_dir.is_dir() {
            log::error!("Watch directory does not exist: {}", watch_dir.display());
            return Err(WatchError::MissingDirectory(watch_dir));
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let notify_error = |source| WatchError::Notify {
            path: watch_dir.clone(),
            source,
        };

        let mut watcher = RecommendedWatcher::new(
            move |result| {
                if events_tx.send(result).is_err() {
                    log::error!("Watcher event dropped, dispatcher is gone");
                }
            },
            Config::default(),
        )
        .map_err(notify_error)?;
        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .map_err(notify_error)?;

        let dispatcher = tokio::spawn(dispatch(events_rx, Arc::new(handler)));
        log::info!("Started watching directory: {}", watch_dir.display());

        Ok(Self {
            watcher: Some(watcher),
            dispatcher: Some(dispatcher),
        })
    }

    /// Detaches the OS watch and waits for the dispatcher to wind down.
    pub async fn stop(mut self) {
        // Dropping the watcher drops the sender, which ends the dispatcher loop.
        drop(self.watcher.take());
        if let Some(dispatcher) = self.dispatcher.take() {
            if let Err(e) = dispatcher.await {
                log::error!("Watcher dispatcher ended abnormally: {}", e);
            }
        }
        log::info!("Stopped watching directory");
    }
}

async fn dispatch(
    mut events_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    handler: Arc<ScreenshotHandler>,
) {
    let mut pending = JoinSet::new();

    loop {
        tokio::select! {
            received = events_rx.recv() => {
                let Some(result) = received else { break };
                match result {
                    Ok(event) if matches!(event.kind, EventKind::Create(_)) => {
                        for path in event.paths {
                            if path.is_dir() || !handler.is_supported(&path) {
                                continue;
                            }
                            let handler = handler.clone();
                            pending.spawn(async move { handler.on_created(path).await });
                        }
                    }
                    Ok(_) => {}
                    Err(e) => log::error!("Watch error: {}", e),
                }
            }
            Some(_) = pending.join_next(), if !pending.is_empty() => {}
        }
    }

    pending.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy() -> StabilizePolicy {
        StabilizePolicy {
            max_attempts: 10,
            unready_delay: Duration::from_millis(10),
            settle_delay: Duration::from_millis(20),
        }
    }

    fn counting_handler() -> (ScreenshotHandler, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let handler = ScreenshotHandler::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .with_policy(fast_policy());
        (handler, count)
    }

    #[test]
    fn extension_filter_is_case_insensitive() {
        let (handler, _) = counting_handler();
        for name in ["a.png", "b.JPG", "c.jpeg", "d.Jpeg"] {
            assert!(handler.is_supported(Path::new(name)), "{name}");
        }
        for name in ["a.gif", "b.txt", "png", "c.png.tmp"] {
            assert!(!handler.is_supported(Path::new(name)), "{name}");
        }
    }

    #[test]
    fn custom_extensions_accept_leading_dots() {
        let (handler, _) = counting_handler();
        let handler = handler.with_extensions([".WebP"]);
        assert!(handler.is_supported(Path::new("x.webp")));
        assert!(!handler.is_supported(Path::new("x.png")));
    }

    #[tokio::test]
    async fn each_supported_extension_fires_once() {
        let dir = tempfile::tempdir().unwrap();
        let (handler, count) = counting_handler();

        for name in ["a.png", "b.jpg", "c.jpeg"] {
            let path = dir.path().join(name);
            fs::write(&path, b"image").unwrap();
            handler.on_created(path).await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn unsupported_files_never_fire() {
        let dir = tempfile::tempdir().unwrap();
        let (handler, count) = counting_handler();
        let path = dir.path().join("notes.txt");
        fs::write(&path, b"text").unwrap();

        handler.on_created(path).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn duplicate_events_fire_once() {
        let dir = tempfile::tempdir().unwrap();
        let (handler, count) = counting_handler();
        let path = dir.path().join("shot.png");
        fs::write(&path, b"image").unwrap();

        tokio::join!(
            handler.on_created(path.clone()),
            handler.on_created(path.clone()),
            handler.on_created(path.clone()),
        );
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(handler.processing.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_file_is_dropped_after_budget() {
        let dir = tempfile::tempdir().unwrap();
        let (handler, count) = counting_handler();
        let path = dir.path().join("empty.png");
        fs::write(&path, b"").unwrap();

        handler.on_created(path).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(handler.processing.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_filled_late_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.png");
        fs::write(&path, b"").unwrap();

        let writer = {
            let path = path.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                tokio::fs::write(&path, b"done").await.unwrap();
            })
        };

        assert!(wait_until_ready(&path, &fast_policy()).await);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn missing_directory_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (handler, _) = counting_handler();
        let result = FileWatcher::start(dir.path().join("nope"), handler);
        assert!(matches!(result, Err(WatchError::MissingDirectory(_))));
    }

    #[tokio::test]
    async fn watcher_reports_new_screenshots_only() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler = ScreenshotHandler::new(move |event: ScreenshotEvent| {
            let _ = tx.send(event.path);
        })
        .with_policy(fast_policy());

        let watcher = FileWatcher::start(dir.path(), handler).unwrap();
        // Give the OS watch a moment to attach.
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(dir.path().join("notes.txt"), b"text").unwrap();
        fs::write(dir.path().join("shot.png"), b"image").unwrap();

        let path = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no screenshot reported")
            .unwrap();
        assert_eq!(path.file_name().unwrap(), "shot.png");

        watcher.stop().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn subdirectories_are_not_watched() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler = ScreenshotHandler::new(move |event: ScreenshotEvent| {
            let _ = tx.send(event.path);
        })
        .with_policy(fast_policy());

        let watcher = FileWatcher::start(dir.path(), handler).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(sub.join("shot.png"), b"image").unwrap();
        fs::create_dir(dir.path().join("x.png")).unwrap();

        let reported = tokio::time::timeout(Duration::from_millis(1500), rx.recv()).await;
        assert!(reported.is_err(), "unexpected report: {:?}", reported);

        watcher.stop().await;
    }

    #[test]
    fn claim_survives_a_poisoned_set() {
        let set = Arc::new(Mutex::new(HashSet::new()));
        let poisoner = set.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison");
        })
        .join();
        assert!(set.is_poisoned());

        let path = Path::new("/shots/a.png");
        let claim = Claim::take(&set, path).expect("first claim");
        assert!(Claim::take(&set, path).is_none());
        drop(claim);
        assert!(Claim::take(&set, path).is_some());
    }
}
