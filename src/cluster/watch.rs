//! Refresh triggers for the cluster metadata cache.
//!
//! `run_config_watch` reacts to file-change notifications from the `notify`
//! crate (100ms debounce) and refreshes the cache. `run_periodic_refresh`
//! polls the file's modification time on a timer. Both are best-effort and
//! run beside the read path: if the watcher cannot be set up, the task logs
//! and exits while reads keep serving the last snapshot.
//!
//! The parent directory is watched rather than the file itself so that
//! editors replacing the file via rename, or a file created after startup,
//! are still picked up.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

use crate::cluster::metadata::ClusterMetadataCache;
use crate::error::KubegateError;

const DEBOUNCE: Duration = Duration::from_millis(100);

/// Watch the cache's backing file and refresh the cache on each change.
///
/// Returns immediately if the cache has no backing file or the watcher cannot
/// be created. Otherwise runs until `cancel` fires.
pub async fn run_config_watch(cache: Arc<ClusterMetadataCache>, cancel: CancellationToken) {
    let Some(config_path) = cache.config_path().map(Path::to_path_buf) else {
        tracing::debug!("no cluster config file, file watch disabled");
        return;
    };

    let (_watcher, mut rx) = match watch_file(&config_path) {
        Ok(pair) => pair,
        Err(e) => {
            tracing::error!(error = %e, "cluster config watch unavailable");
            return;
        }
    };

    tracing::info!(path = %config_path.display(), "watching cluster config");

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(Ok(event)) => {
                        if !touches(&event, &config_path) {
                            continue;
                        }
                        // Debounce: wait for a burst of events to settle
                        tokio::time::sleep(DEBOUNCE).await;
                        while rx.try_recv().is_ok() {}

                        cache.refresh().await;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "cluster config watcher error");
                    }
                    None => {
                        tracing::debug!("cluster config watcher channel closed");
                        return;
                    }
                }
            }
            _ = cancel.cancelled() => {
                tracing::debug!("cluster config watch cancelled");
                return;
            }
        }
    }
}

/// Check the backing file's modification time every `interval` and reload
/// when it changed. Runs until `cancel` fires.
pub async fn run_periodic_refresh(
    cache: Arc<ClusterMetadataCache>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick fires immediately; startup already loaded the file
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if cache.reload_if_changed().await {
                    tracing::debug!("cluster config changed on disk, reloaded");
                }
            }
            _ = cancel.cancelled() => {
                tracing::debug!("periodic cluster refresh cancelled");
                return;
            }
        }
    }
}

type EventRx = UnboundedReceiver<notify::Result<notify::Event>>;

/// Start a watcher on the directory containing `path`. The watcher must be
/// kept alive for events to keep arriving.
fn watch_file(path: &Path) -> crate::Result<(RecommendedWatcher, EventRx)> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<notify::Result<notify::Event>>();

    let mut watcher = notify::recommended_watcher(move |event| {
        // Send errors only happen once the watch task is gone
        let _ = tx.send(event);
    })
    .map_err(|e| KubegateError::Watch(path.display().to_string(), e.to_string()))?;

    let dir = watch_dir(path);
    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .map_err(|e| KubegateError::Watch(dir.display().to_string(), e.to_string()))?;

    Ok((watcher, rx))
}

fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// True if `event` concerns the file named like `path`.
fn touches(event: &notify::Event, path: &Path) -> bool {
    let Some(name) = path.file_name() else {
        return false;
    };
    event.paths.iter().any(|p| p.file_name() == Some(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::kubectl::tests::ScriptedRunner;
    use crate::cluster::kubectl::KubectlQueries;

    fn cache_for(path: Option<PathBuf>) -> Arc<ClusterMetadataCache> {
        let queries = KubectlQueries::new(
            "kubectl",
            Arc::new(ScriptedRunner::default()),
            Duration::from_secs(1),
        );
        Arc::new(ClusterMetadataCache::new(path, queries))
    }

    #[test]
    fn test_watch_dir() {
        assert_eq!(watch_dir(Path::new("/etc/kubegate/cluster.json")), PathBuf::from("/etc/kubegate"));
        assert_eq!(watch_dir(Path::new("cluster.json")), PathBuf::from("."));
    }

    #[test]
    fn test_touches_matches_file_name() {
        let event = notify::Event::new(notify::EventKind::Any)
            .add_path(PathBuf::from("/tmp/x/cluster.json"));
        assert!(touches(&event, Path::new("/tmp/x/cluster.json")));
        assert!(!touches(&event, Path::new("/tmp/x/other.json")));
    }

    #[tokio::test]
    async fn test_watch_without_path_returns() {
        let cache = cache_for(None);
        // Must return on its own without cancellation
        tokio::time::timeout(
            Duration::from_secs(1),
            run_config_watch(cache, CancellationToken::new()),
        )
        .await
        .expect("watch without a backing file returns immediately");
    }

    #[tokio::test]
    async fn test_watch_unavailable_dir_returns() {
        let cache = cache_for(Some(PathBuf::from("/nonexistent/dir/cluster.json")));
        tokio::time::timeout(
            Duration::from_secs(1),
            run_config_watch(cache, CancellationToken::new()),
        )
        .await
        .expect("watch on a missing directory gives up");
    }

    #[tokio::test]
    async fn test_watch_stops_on_cancel() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = cache_for(Some(dir.path().join("cluster.json")));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_config_watch(cache, cancel.clone()));
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("watch task ends after cancel")
            .expect("watch task did not panic");
    }

    #[tokio::test]
    async fn test_watch_reloads_on_change() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cluster.json");
        std::fs::write(&path, r#"{"contexts": ["before"]}"#).expect("write");

        let cache = cache_for(Some(path.clone()));
        cache.reload().await;
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_config_watch(cache.clone(), cancel.clone()));

        // Give the watcher time to register before touching the file
        tokio::time::sleep(Duration::from_millis(200)).await;
        std::fs::write(&path, r#"{"contexts": ["after"]}"#).expect("rewrite");

        let mut reloaded = false;
        for _ in 0..50 {
            if cache.current_config().await.contexts == vec!["after"] {
                reloaded = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        cancel.cancel();
        let _ = task.await;
        assert!(reloaded, "cache should pick up the rewritten file");
    }

    #[tokio::test]
    async fn test_periodic_refresh_stops_on_cancel() {
        let cache = cache_for(None);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_periodic_refresh(
            cache,
            Duration::from_millis(10),
            cancel.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("periodic task ends after cancel")
            .expect("periodic task did not panic");
    }
}
