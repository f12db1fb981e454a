//! Background deletion of old archive files.
//!
//! Invoked by the drain loop when a file closes. The sweep walks the
//! archive root on a detached worker thread, deleting regular files whose
//! modification time is older than the cutoff and pruning directories that
//! end up empty. At most one sweep runs at a time: the held join handle is
//! checked before spawning another, and reaped non-blockingly by `poll`.
//!
//! Deletion problems are logged as warnings and never affect the capture.

use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, SystemTime};

/// Owns the at-most-one in-flight sweep worker.
pub struct RetentionSweeper {
    worker: Option<thread::JoinHandle<()>>,
}

impl RetentionSweeper {
    pub fn new() -> Self {
        Self { worker: None }
    }

    /// Whether a sweep is currently running.
    pub fn in_flight(&self) -> bool {
        self.worker
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Start a sweep of `root` for files older than `max_age_hours`,
    /// unless one is already running.
    pub fn request(&mut self, root: &Path, max_age_hours: u32) {
        if max_age_hours == 0 {
            return;
        }
        if self.in_flight() {
            log::warn!("not deleting files: the previous sweep has not finished");
            return;
        }
        self.poll();

        log::info!(
            "deleting files older than {} hours in {}",
            max_age_hours,
            root.display()
        );
        let root = root.to_path_buf();
        let cutoff = SystemTime::now() - Duration::from_secs(u64::from(max_age_hours) * 3600);

        match thread::Builder::new()
            .name("retention-sweep".into())
            .spawn(move || sweep_dir(&root, cutoff, false))
        {
            Ok(handle) => self.worker = Some(handle),
            Err(e) => log::warn!("failed to spawn retention sweep: {e}"),
        }
    }

    /// Reap a finished worker without blocking.
    pub fn poll(&mut self) {
        if let Some(handle) = self.worker.take() {
            if handle.is_finished() {
                let _ = handle.join();
                log::debug!("retention sweep finished");
            } else {
                self.worker = Some(handle);
            }
        }
    }

    /// Wait for any in-flight sweep to complete (shutdown path).
    pub fn join(&mut self) {
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl Default for RetentionSweeper {
    fn default() -> Self {
        Self::new()
    }
}

/// Recursively delete entries under `dir` older than `cutoff`.
///
/// The root itself is never removed; emptied subdirectories are, provided
/// they are old enough themselves.
fn sweep_dir(dir: &Path, cutoff: SystemTime, delete_self: bool) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("failed to open directory {}: {e}", dir.display());
            return;
        }
    };

    for entry in entries {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        match entry.file_type() {
            Ok(kind) if kind.is_dir() => sweep_dir(&path, cutoff, true),
            Ok(kind) if kind.is_file() => delete_if_old(&path, cutoff, false),
            Ok(_) => log::debug!("skipping non-regular entry: {}", path.display()),
            Err(e) => log::warn!("failed to stat {}: {e}", path.display()),
        }
    }

    if delete_self {
        delete_if_old(dir, cutoff, true);
    }
}

fn delete_if_old(path: &Path, cutoff: SystemTime, is_dir: bool) {
    let mtime = match fs::metadata(path).and_then(|meta| meta.modified()) {
        Ok(mtime) => mtime,
        Err(e) => {
            log::warn!("failed to stat {}: {e}", path.display());
            return;
        }
    };
    if mtime >= cutoff {
        return;
    }

    let result = if is_dir {
        // Fails (correctly) when the directory still has fresh content.
        fs::remove_dir(path)
    } else {
        fs::remove_file(path)
    };

    match result {
        Ok(()) => log::debug!("deleted: {}", path.display()),
        Err(_) if is_dir => {}
        Err(e) => log::warn!("failed to delete {}: {e}", path.display()),
    }
}
