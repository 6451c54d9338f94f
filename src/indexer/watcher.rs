// File watcher for incremental updates

use std::path::{Path, PathBuf};

use anyhow::Result;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use regex::Regex;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::paths::normalize_path;
use super::queue::{IndexJob, JobSender};
use crate::config::Config;

/// Turns file system events under one root into index jobs
pub struct FileWatcher {
    jobs: JobSender,
    watch_path: PathBuf,
    config: Config,
    include: Option<Regex>,
}

impl FileWatcher {
    /// The root is canonicalized so it prefixes the absolute paths notify reports
    pub fn new(jobs: JobSender, watch_path: PathBuf, config: Config) -> Result<Self> {
        let include = config.include_regex()?;
        let watch_path = std::fs::canonicalize(&watch_path)
            .unwrap_or_else(|_| PathBuf::from(normalize_path(&watch_path)));

        Ok(Self {
            jobs,
            watch_path,
            config,
            include,
        })
    }

    /// Watch until the event stream ends
    pub async fn watch(&self) -> Result<()> {
        info!("Starting file watcher for: {}", self.watch_path.display());

        let (tx, mut rx) = mpsc::unbounded_channel();

        // notify calls back on its own thread
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if tx.send(event).is_err() {
                        debug!("Watcher channel closed");
                    }
                }
                Err(e) => error!("File watch error: {}", e),
            },
            NotifyConfig::default(),
        )?;

        watcher.watch(&self.watch_path, RecursiveMode::Recursive)?;

        info!("File watcher started. Monitoring for changes...");

        while let Some(event) = rx.recv().await {
            for job in self.jobs_for_event(&event) {
                self.jobs.submit(job)?;
            }
        }

        Ok(())
    }

    /// Single-file jobs for one event; never a full walk
    pub fn jobs_for_event(&self, event: &Event) -> Vec<IndexJob> {
        match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => event
                .paths
                .iter()
                .filter(|path| self.is_watched(path))
                .map(|path| {
                    if path.is_file() {
                        IndexJob::File {
                            path: path.clone(),
                            force: false,
                        }
                    } else {
                        IndexJob::Remove { path: path.clone() }
                    }
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    fn is_watched(&self, path: &Path) -> bool {
        if !self.config.has_source_extension(path) {
            return false;
        }

        let relative = path.strip_prefix(&self.watch_path).unwrap_or(path);
        if relative
            .components()
            .any(|c| self.config.is_excluded_dir(&c.as_os_str().to_string_lossy()))
        {
            return false;
        }

        match &self.include {
            Some(include) => include.is_match(&normalize_path(path)),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};
    use std::fs;
    use tempfile::tempdir;

    fn watcher_with(root: &Path, config: Config) -> FileWatcher {
        let (tx, _rx) = mpsc::unbounded_channel();
        FileWatcher::new(JobSender::from_channel(tx), root.to_path_buf(), config).unwrap()
    }

    fn watcher_for(root: &Path) -> FileWatcher {
        watcher_with(root, Config::default())
    }

    #[test]
    fn test_modified_source_file_becomes_file_job() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.py");
        fs::write(&file, "a = 1\n").unwrap();

        let watcher = watcher_for(dir.path());
        let event = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(file.clone());

        assert_eq!(
            watcher.jobs_for_event(&event),
            vec![IndexJob::File {
                path: file,
                force: false
            }]
        );
    }

    #[test]
    fn test_removed_file_becomes_remove_job() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("gone.py");

        let watcher = watcher_for(dir.path());
        let event = Event::new(EventKind::Remove(RemoveKind::File)).add_path(file.clone());

        assert_eq!(
            watcher.jobs_for_event(&event),
            vec![IndexJob::Remove { path: file }]
        );
    }

    #[test]
    fn test_ignored_paths() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join("__pycache__");
        fs::create_dir_all(&cache).unwrap();
        fs::write(cache.join("a.py"), "").unwrap();
        fs::write(dir.path().join("notes.md"), "").unwrap();

        let watcher = watcher_for(dir.path());
        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(cache.join("a.py"))
            .add_path(dir.path().join("notes.md"));
        assert!(watcher.jobs_for_event(&event).is_empty());

        let access = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(dir.path().join("a.py"));
        assert!(watcher.jobs_for_event(&access).is_empty());
    }

    #[test]
    fn test_include_pattern_filters_events() {
        let dir = tempdir().unwrap();
        let app = dir.path().join("app");
        fs::create_dir_all(&app).unwrap();
        fs::write(app.join("views.py"), "").unwrap();
        fs::write(dir.path().join("other.py"), "").unwrap();

        let mut config = Config::default();
        config.index.include = Some(r"[/\\]app[/\\]".to_string());
        let watcher = watcher_with(dir.path(), config);

        let outside = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(dir.path().join("other.py"));
        assert!(watcher.jobs_for_event(&outside).is_empty());

        let inside =
            Event::new(EventKind::Modify(ModifyKind::Any)).add_path(app.join("views.py"));
        assert_eq!(watcher.jobs_for_event(&inside).len(), 1);
    }

    #[test]
    fn test_invalid_include_pattern_is_rejected() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.index.include = Some("(unclosed".to_string());

        let (tx, _rx) = mpsc::unbounded_channel();
        let result = FileWatcher::new(JobSender::from_channel(tx), dir.path().to_path_buf(), config);
        assert!(result.is_err());
    }

    #[test]
    fn test_root_is_canonicalized_before_exclude_check() {
        let dir = tempdir().unwrap();
        let project = dir.path().join("venv").join("project");
        fs::create_dir_all(project.join("sub")).unwrap();
        let file = project.join("a.py");
        fs::write(&file, "a = 1\n").unwrap();

        // Same directory, spelled so a plain prefix strip would fail
        let watcher = watcher_for(&project.join("sub").join(".."));
        let event = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(fs::canonicalize(&file).unwrap());

        assert_eq!(
            watcher.jobs_for_event(&event),
            vec![IndexJob::File {
                path: fs::canonicalize(&file).unwrap(),
                force: false
            }]
        );
    }
}
