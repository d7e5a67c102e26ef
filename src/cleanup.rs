//! Scheduled removal of orphaned staged uploads.
//!
//! Requests remove their own staged files; this only catches what a crashed
//! or killed process left behind.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{error, info};

/// Staged files older than this are considered orphaned.
const STAGED_FILE_MAX_AGE: Duration = Duration::from_secs(60 * 60);

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Remove staged files older than `max_age`. Returns how many were removed.
pub async fn remove_stale_files(dir: &Path, max_age: Duration) -> std::io::Result<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let now = SystemTime::now();
    let mut removed = 0;

    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age < max_age {
            continue;
        }
        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => error!(path = %entry.path().display(), error = %e, "Failed to remove stale upload"),
        }
    }

    Ok(removed)
}

/// Run all cleanup tasks once.
pub async fn run_cleanup(temp_dir: &Path) {
    match remove_stale_files(temp_dir, STAGED_FILE_MAX_AGE).await {
        Ok(count) if count > 0 => info!("Cleaned up {} stale staged uploads", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up staged uploads: {}", e),
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(temp_dir: PathBuf) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        // The first tick completes immediately; startup already ran a pass
        interval.tick().await;

        loop {
            interval.tick().await;
            run_cleanup(&temp_dir).await;
        }
    })
}
