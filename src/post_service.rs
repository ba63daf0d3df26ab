use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde_json::Value;
use spdlog::{info, warn};

use crate::error::{ChronicleError, Result};
use crate::page_sync::{PageSynchronizer, SyncReport};
use crate::post::{is_plain_file_name, ImageRef, Post, PostDraft, PostId, PostPatch};
use crate::post_store::{valid_posts, PostStore, StoreEntry};
use crate::text_utils::today_in;
use crate::view::post_renderer::AUDIO_FILE;

/// Every way of changing the post store. A mutation reloads the store, saves
/// the full list and runs a complete page sync before it returns.
pub struct PostService<S: PostStore> {
    store: S,
    synchronizer: PageSynchronizer,
}

impl<S: PostStore> PostService<S> {
    pub fn new(store: S, synchronizer: PageSynchronizer) -> Self {
        PostService {
            store,
            synchronizer,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Posts that decode, newest first.
    pub fn list(&self) -> Result<Vec<Post>> {
        Ok(valid_posts(self.store.load()?))
    }

    /// Every store record, malformed ones included.
    pub fn entries(&self) -> Result<Vec<StoreEntry>> {
        self.store.load()
    }

    pub fn get(&self, id: &str) -> Result<Post> {
        match self.store.load()?.into_iter().find(|e| e.has_id(id)) {
            Some(StoreEntry::Valid(post)) => Ok(post),
            Some(StoreEntry::Malformed { reason, .. }) => Err(ChronicleError::render(id, reason)),
            None => Err(ChronicleError::NotFound(id.to_string())),
        }
    }

    pub fn sync(&self) -> Result<SyncReport> {
        self.synchronizer.run(&self.store)
    }

    pub fn create(&self, draft: PostDraft) -> Result<Post> {
        self.create_at(draft, None, Utc::now())
    }

    pub fn create_with_id(&self, id: PostId, draft: PostDraft) -> Result<Post> {
        self.create_at(draft, Some(id), Utc::now())
    }

    /// Without an explicit id the post is keyed by its creation time in
    /// milliseconds, moved forward until it is unique.
    pub fn create_at(&self, draft: PostDraft, id: Option<PostId>, now: DateTime<Utc>) -> Result<Post> {
        let mut entries = self.store.load()?;
        let timestamp = now.timestamp_millis();

        let id = match id {
            Some(id) => {
                if !id.is_path_safe() {
                    return Err(ChronicleError::InvalidId(id.0));
                }
                if entries.iter().any(|e| e.has_id(id.as_str())) {
                    return Err(ChronicleError::DuplicateId(id.0));
                }
                id
            }
            None => {
                let mut millis = timestamp;
                while entries.iter().any(|e| e.has_id(&millis.to_string())) {
                    millis += 1;
                }
                PostId::from_millis(millis)
            }
        };

        let today = today_in(self.synchronizer.zone(), now);
        let post = draft.into_post(id, today, timestamp);
        post.validate()?;

        entries.insert(0, StoreEntry::Valid(post.clone()));
        self.commit(&entries)?;
        info!("Created post {}", post.id);

        Ok(post)
    }

    /// Merges `patch` over the stored record. A malformed record can be
    /// repaired this way as long as the merged result decodes.
    pub fn update(&self, id: &str, patch: PostPatch) -> Result<Post> {
        let mut entries = self.store.load()?;
        let index = match entries.iter().position(|e| e.has_id(id)) {
            Some(index) => index,
            None => return Err(ChronicleError::NotFound(id.to_string())),
        };

        let updated = patch.apply(entries[index].to_value()?)?;
        updated.validate()?;
        entries[index] = StoreEntry::Valid(updated.clone());

        self.commit(&entries)?;
        info!("Updated post {}", id);

        Ok(updated)
    }

    /// Removes the record with `id`, malformed or not.
    pub fn delete(&self, id: &str) -> Result<StoreEntry> {
        let mut entries = self.store.load()?;
        let index = match entries.iter().position(|e| e.has_id(id)) {
            Some(index) => index,
            None => return Err(ChronicleError::NotFound(id.to_string())),
        };

        let removed = entries.remove(index);
        self.commit(&entries)?;
        info!("Deleted post {}", id);

        Ok(removed)
    }

    /// Keeps the `keep` most recent posts. Returns how many were dropped.
    pub fn retain_latest(&self, keep: usize) -> Result<usize> {
        let mut entries = self.store.load()?;
        if entries.len() <= keep {
            return Ok(0);
        }

        let dropped = entries.len() - keep;
        entries.truncate(keep);
        self.commit(&entries)?;
        info!("Dropped {} old posts, keeping {}", dropped, keep);

        Ok(dropped)
    }

    /// Copies an externally generated narration next to the post page and
    /// only then flags the post. A missing source leaves the post untouched.
    pub fn attach_audio(&self, id: &str, audio_file: &Path) -> Result<Post> {
        let post = self.get(id)?;
        if !audio_file.is_file() {
            return Err(ChronicleError::InvalidInput(format!("audio file {} does not exist", audio_file.display())));
        }

        let post_dir = self.synchronizer.post_dir(&post);
        fs::create_dir_all(&post_dir).map_err(|e| ChronicleError::sync_io(&post_dir, e))?;
        let target = post_dir.join(AUDIO_FILE);
        fs::copy(audio_file, &target).map_err(|e| ChronicleError::sync_io(&target, e))?;

        self.update(id, PostPatch::default().set("hasAudio", Value::Bool(true)))
    }

    /// Copies illustrations next to the post page. The first one becomes the
    /// featured image. Files that cannot be copied are skipped with a warning.
    pub fn attach_images(&self, id: &str, image_files: &[&Path]) -> Result<Post> {
        let post = self.get(id)?;
        let post_dir = self.synchronizer.post_dir(&post);
        fs::create_dir_all(&post_dir).map_err(|e| ChronicleError::sync_io(&post_dir, e))?;

        let mut images = post.images.clone().unwrap_or_default();
        for image_file in image_files {
            let file_name = match image_file.file_name().and_then(|n| n.to_str()) {
                Some(name) if is_plain_file_name(name) => name.to_string(),
                _ => {
                    warn!("Skipping image with an unusable file name: {}", image_file.display());
                    continue;
                }
            };

            if let Err(e) = fs::copy(image_file, post_dir.join(&file_name)) {
                warn!("Skipping image {}: {}", image_file.display(), e);
                continue;
            }

            let name = Path::new(&file_name)
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| file_name.clone());
            images.retain(|img| img.filename != file_name);
            images.push(ImageRef {
                filename: file_name,
                name,
                prompt: None,
            });
        }

        if images.is_empty() {
            return Err(ChronicleError::InvalidInput(format!("no image could be attached to {}", id)));
        }

        let featured_image = Value::String(images[0].filename.clone());
        let images = serde_json::to_value(&images).map_err(|e| ChronicleError::InvalidInput(e.to_string()))?;
        self.update(id, PostPatch::default().set("images", images).set("featuredImage", featured_image))
    }

    fn commit(&self, entries: &[StoreEntry]) -> Result<()> {
        self.store.save(entries)?;
        let report = self.synchronizer.sync_entries(entries)?;
        if !report.is_clean() {
            warn!("Store saved but {} page(s) could not be synced", report.failures.len());
        }
        Ok(())
    }
}
