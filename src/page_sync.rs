use std::collections::BTreeSet;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use spdlog::{error, info, warn};

use crate::error::{ChronicleError, Result};
use crate::post::Post;
use crate::post_store::{PostStore, StoreEntry};
use crate::view::post_renderer::{PostRenderer, AUDIO_FILE};

pub const PAGE_FILE: &str = "index.html";

#[derive(Debug)]
pub struct SyncFailure {
    pub target: String,
    pub error: ChronicleError,
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub total: usize,
    pub failures: Vec<SyncFailure>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn into_result(self) -> Result<SyncReport> {
        if self.is_clean() {
            Ok(self)
        } else {
            Err(ChronicleError::SyncIncomplete(self.failures.len()))
        }
    }

    fn fail(&mut self, target: &str, error: ChronicleError) {
        error!("Sync failed for {}: {}", target, error);
        self.failures.push(SyncFailure {
            target: target.to_string(),
            error,
        });
    }
}

impl Display for SyncReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "created={}, updated={}, unchanged={}, deleted={}, total={}, failures={}",
               self.created,
               self.updated,
               self.unchanged,
               self.deleted,
               self.total,
               self.failures.len()
        )
    }
}

enum PageWrite {
    Created,
    Updated,
    Unchanged,
}

/// Directories on disk that no post claims anymore.
pub fn find_orphans(existing: &BTreeSet<String>, valid: &BTreeSet<String>) -> BTreeSet<String> {
    existing.difference(valid).cloned().collect()
}

/// Brings `pages_dir` in line with the store: one `<id>/index.html` per post and
/// nothing else. Always a full pass; per post failures are collected in the
/// report instead of stopping the pass.
pub struct PageSynchronizer {
    pages_dir: PathBuf,
    renderer: PostRenderer,
}

impl PageSynchronizer {
    pub fn new(pages_dir: impl Into<PathBuf>, renderer: PostRenderer) -> Self {
        PageSynchronizer {
            pages_dir: pages_dir.into(),
            renderer,
        }
    }

    pub fn pages_dir(&self) -> &Path {
        &self.pages_dir
    }

    pub fn zone(&self) -> &Tz {
        self.renderer.zone()
    }

    pub fn post_dir(&self, post: &Post) -> PathBuf {
        self.pages_dir.join(post.id.as_str())
    }

    pub fn run(&self, store: &dyn PostStore) -> Result<SyncReport> {
        let entries = store.load()?;
        self.sync_entries(&entries)
    }

    pub fn sync_entries(&self, entries: &[StoreEntry]) -> Result<SyncReport> {
        fs::create_dir_all(&self.pages_dir).map_err(|e| ChronicleError::sync_io(&self.pages_dir, e))?;

        let mut report = SyncReport {
            total: entries.len(),
            ..Default::default()
        };

        // Every id in the store is claimed, even when its page fails below,
        // so a transient failure never deletes a page that should exist.
        let valid: BTreeSet<String> = entries.iter().filter_map(|e| e.id()).map(|id| id.0.clone()).collect();
        let mut seen: BTreeSet<&str> = BTreeSet::new();

        for (index, entry) in entries.iter().enumerate() {
            let target = match entry.id() {
                Some(id) => id.as_str().to_string(),
                None => format!("record #{}", index),
            };
            if let Some(id) = entry.id() {
                if !seen.insert(id.as_str()) {
                    report.fail(&target, ChronicleError::render(&target, "duplicate id in post store"));
                    continue;
                }
            }

            let post = match entry {
                StoreEntry::Valid(post) => post,
                StoreEntry::Malformed { reason, .. } => {
                    report.fail(&target, ChronicleError::render(&target, reason.as_str()));
                    continue;
                }
            };

            match self.write_page(post) {
                Ok(PageWrite::Created) => report.created += 1,
                Ok(PageWrite::Updated) => report.updated += 1,
                Ok(PageWrite::Unchanged) => report.unchanged += 1,
                Err(e) => report.fail(&target, e),
            }
        }

        match self.existing_dirs() {
            Ok(existing) => {
                for orphan in find_orphans(&existing, &valid) {
                    let orphan_dir = self.pages_dir.join(&orphan);
                    match fs::remove_dir_all(&orphan_dir) {
                        Ok(()) => {
                            info!("Deleted orphaned page directory {}", orphan_dir.display());
                            report.deleted += 1;
                        }
                        Err(e) => report.fail(&orphan, ChronicleError::sync_io(orphan_dir, e)),
                    }
                }
            }
            Err(e) => report.fail(&self.pages_dir.to_string_lossy(), e),
        }

        info!("Page sync complete: {}", report);
        Ok(report)
    }

    fn write_page(&self, post: &Post) -> Result<PageWrite> {
        let html = self.renderer.render(post)?;

        let post_dir = self.post_dir(post);
        fs::create_dir_all(&post_dir).map_err(|e| ChronicleError::sync_io(&post_dir, e))?;

        if post.has_audio && !post_dir.join(AUDIO_FILE).is_file() {
            warn!("Post {} is flagged with audio but {} is missing", post.id, AUDIO_FILE);
        }

        let page_file = post_dir.join(PAGE_FILE);
        let outcome = match fs::read(&page_file) {
            Ok(current) if current == html.as_bytes() => return Ok(PageWrite::Unchanged),
            Ok(_) => PageWrite::Updated,
            Err(e) if e.kind() == ErrorKind::NotFound => PageWrite::Created,
            Err(e) => return Err(ChronicleError::sync_io(&page_file, e)),
        };

        fs::write(&page_file, html).map_err(|e| ChronicleError::sync_io(&page_file, e))?;
        Ok(outcome)
    }

    /// Unreadable entries are skipped, they only cost that one orphan check.
    fn existing_dirs(&self) -> Result<BTreeSet<String>> {
        let mut dirs = BTreeSet::new();
        let entries = fs::read_dir(&self.pages_dir).map_err(|e| ChronicleError::sync_io(&self.pages_dir, e))?;
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry in {}: {}", self.pages_dir.display(), e);
                    continue;
                }
            };
            match entry.file_type() {
                Ok(file_type) if file_type.is_dir() => {}
                Ok(_) => continue,
                Err(e) => {
                    warn!("Skipping {}: {}", entry.path().display(), e);
                    continue;
                }
            }
            match entry.file_name().into_string() {
                Ok(name) => {
                    dirs.insert(name);
                }
                Err(name) => warn!("Skipping page directory with a non UTF-8 name: {:?}", name),
            }
        }
        Ok(dirs)
    }
}
