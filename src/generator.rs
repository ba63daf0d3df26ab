use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use spdlog::{debug, info, warn};

use crate::error::{ChronicleError, Result};
use crate::post::{PostDraft, PostId};
use crate::text_utils::slugify;

const CANNED_ENTRIES: &[&str] = &[
    "Today I faced the Laundry Golem of the basement. It devoured one sock, as is its custom, and returned the rest warm and folded. I have accepted the tithe.",
    "The Kettle Elemental screamed at dawn, as kettles do. I poured its fury into a mug and called it breakfast.",
    "My Scrying Mirror (laptop) demanded a reboot for updates during an important council. I stalled the elders with tales of the olden days until it returned.",
    "I braved the Supermarket Labyrinth without a list. I came back with three lemons, a houseplant and no bread. The quest continues tomorrow.",
    "The Password Sphinx asked for a riddle I set three months ago. I failed. It sent a recovery scroll to an inbox I no longer remember.",
    "I assembled a flat packed wardrobe using the sacred diagrams. Two screws remain. The wardrobe stands. I do not ask questions of things that work.",
    "The Smoke Sentinel in the hallway chirped once at 3 AM and then fell silent. I waited an hour for the second chirp. It never came. It knows.",
    "I tamed the Robot Vacuum and sent it to clean the great hall. It found a cable, consumed it and now sulks beneath the couch.",
    "The Bus of Destiny arrived four minutes early and departed without me. I shook my staff at it. The staff was an umbrella.",
    "Today the Group Chat awakened with forty unread messages. I read none of them and replied with a single thumbs up. Peace was restored.",
    "I attempted to bake bread by ancient recipe. The loaf could be used to defend a castle gate. I have named it Reginald.",
    "The Parking Meter Oracle accepted only coins from a forgotten age. I paid in good faith with a bus token and a button. We shall see.",
];

/// Picks one of the built in entries for an unattended daily post.
pub fn canned_entry<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    CANNED_ENTRIES.choose(rng).copied().unwrap_or(CANNED_ENTRIES[0])
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsContext {
    #[serde(default)]
    news_items: Vec<NewsItem>,
}

#[derive(Deserialize)]
struct NewsItem {
    title: String,
}

/// A post produced by an external writer: the text itself, an optional slug
/// and the news headlines it was inspired by, each in their own file.
#[derive(Debug)]
pub struct GeneratedPost {
    pub slug: Option<PostId>,
    pub draft: PostDraft,
    consumed: Vec<PathBuf>,
}

impl GeneratedPost {
    pub fn read(text_file: &Path, slug_file: Option<&Path>, news_file: Option<&Path>) -> Result<GeneratedPost> {
        let content = match fs::read_to_string(text_file) {
            Ok(content) => content.trim().to_string(),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ChronicleError::InvalidInput(format!("generated post {} not found", text_file.display())));
            }
            Err(e) => return Err(e.into()),
        };
        if content.is_empty() {
            return Err(ChronicleError::InvalidInput(format!("generated post {} is empty", text_file.display())));
        }
        let mut consumed = vec![text_file.to_path_buf()];

        let slug = match read_optional(slug_file)? {
            Some((path, text)) => {
                consumed.push(path);
                let slug = slugify(text.trim());
                if slug.is_empty() {
                    warn!("Slug [{}] has no usable characters, using a timestamp id", text.trim());
                    None
                } else {
                    Some(PostId(slug))
                }
            }
            None => {
                info!("No slug file found, using a timestamp id");
                None
            }
        };

        let news_references = match read_optional(news_file)? {
            Some((path, text)) => {
                let context: NewsContext = serde_json::from_str(&text)
                    .map_err(|e| ChronicleError::InvalidInput(format!("news context {}: {}", path.display(), e)))?;
                consumed.push(path);
                debug!("Loaded {} news reference(s)", context.news_items.len());
                Some(context.news_items.into_iter().map(|item| item.title).collect())
            }
            None => None,
        };

        Ok(GeneratedPost {
            slug,
            draft: PostDraft {
                news_references,
                ..PostDraft::from_content(&content)
            },
            consumed,
        })
    }

    /// Removes the files the post was read from. Missing files are fine.
    pub fn cleanup(&self) -> Result<()> {
        for path in self.consumed.iter() {
            match fs::remove_file(path) {
                Ok(()) => debug!("Removed {}", path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

fn read_optional(path: Option<&Path>) -> Result<Option<(PathBuf, String)>> {
    let Some(path) = path else {
        return Ok(None);
    };

    match fs::read_to_string(path) {
        Ok(text) => Ok(Some((path.to_path_buf(), text))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn test_canned_entry() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let entry = canned_entry(&mut rng);
            assert!(CANNED_ENTRIES.contains(&entry));
        }
    }

    #[test]
    fn test_read_full_generated_post() {
        let dir = tempfile::tempdir().unwrap();
        let text_file = dir.path().join("generated-post.txt");
        let slug_file = dir.path().join("generated-slug.txt");
        let news_file = dir.path().join("temp-news-context.json");
        fs::write(&text_file, "\n  The toaster rebelled.\n\nI won.  \n").unwrap();
        fs::write(&slug_file, "The Toaster Rebellion!\n").unwrap();
        fs::write(&news_file, r#"{"newsItems":[{"title":"Toasters recalled","category":"tech"},{"title":"Bread prices up"}]}"#).unwrap();

        let post = GeneratedPost::read(&text_file, Some(&slug_file), Some(&news_file)).unwrap();
        assert_eq!(post.slug, Some(PostId("the-toaster-rebellion".to_string())));
        assert_eq!(post.draft.content, "The toaster rebelled.\n\nI won.");
        assert_eq!(post.draft.news_references, Some(vec!["Toasters recalled".to_string(), "Bread prices up".to_string()]));
        assert!(!post.draft.has_audio);

        post.cleanup().unwrap();
        assert!(!text_file.exists());
        assert!(!slug_file.exists());
        assert!(!news_file.exists());
    }

    #[test]
    fn test_read_text_only() {
        let dir = tempfile::tempdir().unwrap();
        let text_file = dir.path().join("generated-post.txt");
        fs::write(&text_file, "Just text").unwrap();

        let missing = dir.path().join("missing.txt");
        let post = GeneratedPost::read(&text_file, Some(&missing), None).unwrap();
        assert!(post.slug.is_none());
        assert!(post.draft.news_references.is_none());
    }

    #[test]
    fn test_unusable_slug_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let text_file = dir.path().join("generated-post.txt");
        let slug_file = dir.path().join("generated-slug.txt");
        fs::write(&text_file, "text").unwrap();
        fs::write(&slug_file, " !!! ").unwrap();

        let post = GeneratedPost::read(&text_file, Some(&slug_file), None).unwrap();
        assert!(post.slug.is_none());
    }

    #[test]
    fn test_missing_or_empty_text_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let text_file = dir.path().join("generated-post.txt");
        assert!(matches!(GeneratedPost::read(&text_file, None, None), Err(ChronicleError::InvalidInput(_))));

        fs::write(&text_file, "  \n ").unwrap();
        assert!(matches!(GeneratedPost::read(&text_file, None, None), Err(ChronicleError::InvalidInput(_))));
    }

    #[test]
    fn test_bad_news_context() {
        let dir = tempfile::tempdir().unwrap();
        let text_file = dir.path().join("generated-post.txt");
        let news_file = dir.path().join("news.json");
        fs::write(&text_file, "text").unwrap();
        fs::write(&news_file, "{ not json").unwrap();

        let result = GeneratedPost::read(&text_file, None, Some(&news_file));
        assert!(matches!(result, Err(ChronicleError::InvalidInput(_))));
        assert!(text_file.exists());
    }
}
