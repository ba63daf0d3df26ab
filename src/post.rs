use std::fmt;
use std::fmt::{Display, Formatter};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ChronicleError, Result};

/// Identifier of a post. It doubles as the directory name of the rendered page,
/// so only ids passing [`PostId::is_path_safe`] can be synced.
#[derive(Debug, Clone, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub String);

impl PostId {
    pub fn parse(id: &str) -> Result<PostId> {
        let id = PostId(id.to_string());
        if id.is_path_safe() {
            Ok(id)
        } else {
            Err(ChronicleError::InvalidId(id.0))
        }
    }

    pub fn from_millis(millis: i64) -> PostId {
        PostId(millis.to_string())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_path_safe(&self) -> bool {
        let id = self.0.as_str();
        if id.is_empty() || id.starts_with('.') || id.contains("..") {
            return false;
        }
        id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    }
}

impl Display for PostId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub filename: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

/// One entry of the post store.
///
/// Keys the model does not know about are kept in `extra` so a load/save cycle
/// never drops data written by other tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    pub date: NaiveDate,
    pub timestamp: i64,
    pub content: String,
    #[serde(default)]
    pub has_audio: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<ImageRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub featured_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub news_references: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Post {
    pub fn image_list(&self) -> &[ImageRef] {
        self.images.as_deref().unwrap_or(&[])
    }

    pub fn has_images(&self) -> bool {
        !self.image_list().is_empty()
    }

    /// Checks what the renderer cannot work around: the id and every asset
    /// file name end up in paths and URLs.
    pub fn validate(&self) -> Result<()> {
        if !self.id.is_path_safe() {
            return Err(ChronicleError::render(self.id.as_str(), "id is not path safe"));
        }
        for image in self.image_list() {
            if !is_plain_file_name(&image.filename) {
                return Err(ChronicleError::render(
                    self.id.as_str(),
                    format!("invalid image file name [{}]", image.filename),
                ));
            }
        }
        if let Some(ref featured) = self.featured_image {
            if !is_plain_file_name(featured) {
                return Err(ChronicleError::render(
                    self.id.as_str(),
                    format!("invalid featured image [{}]", featured),
                ));
            }
        }
        Ok(())
    }
}

impl Display for Post {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "id={}, date={}, audio={}, images={}\ncontent:\n{}",
               self.id,
               self.date,
               self.has_audio,
               self.image_list().len(),
               self.content
        )
    }
}

pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.chars().any(|c| c == '/' || c == '\\' || c == '"' || c.is_control())
}

/// Gives every legacy record an id before typed deserialization.
/// Records written before ids existed are keyed by their timestamp.
pub(crate) fn normalize_legacy_ids(records: &mut [Value]) {
    for record in records.iter_mut() {
        let Some(fields) = record.as_object_mut() else {
            continue;
        };

        let id = match fields.get("id") {
            Some(Value::String(s)) if !s.is_empty() => continue,
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => match fields.get("timestamp") {
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            },
        };

        if let Some(id) = id {
            fields.insert("id".to_string(), Value::String(id));
        }
    }
}

/// Fields accepted when creating a post. Id and timestamp are always assigned
/// by the store mutators; any other key is kept on the post as is.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDraft {
    #[serde(default)]
    pub date: Option<NaiveDate>,
    pub content: String,
    #[serde(default)]
    pub has_audio: bool,
    #[serde(default)]
    pub images: Option<Vec<ImageRef>>,
    #[serde(default)]
    pub featured_image: Option<String>,
    #[serde(default)]
    pub news_references: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PostDraft {
    pub fn from_content(content: &str) -> PostDraft {
        PostDraft {
            content: content.to_string(),
            ..Default::default()
        }
    }

    pub(crate) fn into_post(self, id: PostId, date: NaiveDate, timestamp: i64) -> Post {
        let mut extra = self.extra;
        for key in IMMUTABLE_KEYS {
            extra.remove(key);
        }

        Post {
            id,
            date: self.date.unwrap_or(date),
            timestamp,
            content: self.content,
            has_audio: self.has_audio,
            images: self.images,
            featured_image: self.featured_image,
            news_references: self.news_references,
            extra,
        }
    }
}

const IMMUTABLE_KEYS: [&str; 2] = ["id", "timestamp"];

/// Partial update merged key by key over the stored record: a present key
/// replaces the stored value, `null` removes it and keys unknown to [`Post`]
/// are kept. `id` and `timestamp` never change.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct PostPatch(Map<String, Value>);

impl PostPatch {
    pub fn set(mut self, key: &str, value: Value) -> Self {
        self.0.insert(key.to_string(), value);
        self
    }

    /// Merges into a raw store record and decodes the result.
    pub fn apply(&self, record: Value) -> Result<Post> {
        let mut fields = match record {
            Value::Object(fields) => fields,
            _ => return Err(ChronicleError::InvalidInput("stored record is not an object".to_string())),
        };

        for (key, value) in self.0.iter() {
            if IMMUTABLE_KEYS.contains(&key.as_str()) {
                continue;
            }
            if value.is_null() {
                fields.remove(key);
            } else {
                fields.insert(key.clone(), value.clone());
            }
        }

        serde_json::from_value(Value::Object(fields))
            .map_err(|e| ChronicleError::InvalidInput(format!("updated post is invalid: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use crate::test_data::{sample_post, STORE_DATA};

    use super::*;

    #[test]
    fn test_path_safe_ids() {
        assert!(PostId("1714070000000".to_string()).is_path_safe());
        assert!(PostId("the-dryer-beast_returns".to_string()).is_path_safe());
        assert!(PostId("v1.2".to_string()).is_path_safe());

        assert!(!PostId("".to_string()).is_path_safe());
        assert!(!PostId("..".to_string()).is_path_safe());
        assert!(!PostId(".hidden".to_string()).is_path_safe());
        assert!(!PostId("a/b".to_string()).is_path_safe());
        assert!(!PostId("a b".to_string()).is_path_safe());
        assert!(!PostId("a..b".to_string()).is_path_safe());

        assert!(matches!(PostId::parse("../etc"), Err(ChronicleError::InvalidId(_))));
    }

    #[test]
    fn test_parse_store_data() {
        let posts: Vec<Post> = serde_json::from_str(STORE_DATA).unwrap();
        assert_eq!(posts.len(), 2);

        let latest = &posts[0];
        assert_eq!(latest.id.as_str(), "the-printer-demon");
        assert_eq!(latest.date, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert!(latest.has_audio);
        assert_eq!(latest.image_list().len(), 2);
        assert_eq!(latest.featured_image.as_deref(), Some("printer-1.png"));
        assert_eq!(latest.image_list()[0].prompt.as_deref(), Some("a printer demon"));

        let older = &posts[1];
        assert!(!older.has_audio);
        assert!(older.images.is_none());
        assert_eq!(older.news_references.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let json = r#"{"id":"a","date":"2024-03-01","timestamp":1,"content":"x","mood":"grumpy"}"#;
        let post: Post = serde_json::from_str(json).unwrap();
        assert_eq!(post.extra.get("mood"), Some(&Value::String("grumpy".to_string())));

        let written = serde_json::to_string(&post).unwrap();
        assert!(written.contains(r#""mood":"grumpy""#));
        assert!(written.contains(r#""hasAudio":false"#));
        assert!(!written.contains("featuredImage"));
    }

    #[test]
    fn test_normalize_legacy_ids() {
        let mut records: Vec<Value> = serde_json::from_str(r#"[
            {"date":"2024-01-01","timestamp":1704100000000,"content":"no id"},
            {"id":1704200000000,"date":"2024-01-02","timestamp":5,"content":"numeric id"},
            {"id":"kept","date":"2024-01-03","timestamp":7,"content":"string id"}
        ]"#).unwrap();
        normalize_legacy_ids(&mut records);

        let posts: Vec<Post> = serde_json::from_value(Value::Array(records)).unwrap();
        assert_eq!(posts[0].id.as_str(), "1704100000000");
        assert_eq!(posts[1].id.as_str(), "1704200000000");
        assert_eq!(posts[2].id.as_str(), "kept");
    }

    #[test]
    fn test_validate_rejects_bad_assets() {
        let mut post = sample_post("ok", "text");
        assert!(post.validate().is_ok());

        post.images = Some(vec![ImageRef {
            filename: "../../secret.png".to_string(),
            name: "nope".to_string(),
            prompt: None,
        }]);
        assert!(matches!(post.validate(), Err(ChronicleError::Render { .. })));

        post.images = None;
        post.featured_image = Some("a\"b.png".to_string());
        assert!(post.validate().is_err());
    }

    #[test]
    fn test_patch_keeps_absent_fields() {
        let post = sample_post("42", "old content");
        let patch: PostPatch = serde_json::from_str(r#"{"content":"new content","id":"99","timestamp":5}"#).unwrap();
        let post = patch.apply(serde_json::to_value(&post).unwrap()).unwrap();

        assert_eq!(post.id.as_str(), "42");
        assert_eq!(post.timestamp, 1704470400000);
        assert_eq!(post.content, "new content");
        assert_eq!(post.date, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert!(!post.has_audio);
    }

    #[test]
    fn test_patch_null_clears_and_unknown_keys_stay() {
        let mut post = sample_post("42", "text");
        post.images = Some(crate::test_data::sample_images(1));
        post.featured_image = Some("image-1.png".to_string());

        let patch: PostPatch = serde_json::from_str(r#"{"featuredImage":null,"images":null,"mood":"smug"}"#).unwrap();
        let post = patch.apply(serde_json::to_value(&post).unwrap()).unwrap();
        assert!(post.featured_image.is_none());
        assert!(post.images.is_none());
        assert_eq!(post.extra.get("mood"), Some(&Value::String("smug".to_string())));
    }

    #[test]
    fn test_patch_repairs_raw_record() {
        let raw: Value = serde_json::from_str(r#"{"id":"bad","date":"someday","timestamp":1,"content":"x"}"#).unwrap();
        let patch = PostPatch::default().set("date", Value::String("2024-02-02".to_string()));
        let post = patch.apply(raw.clone()).unwrap();
        assert_eq!(post.date, NaiveDate::from_ymd_opt(2024, 2, 2).unwrap());

        let patch = PostPatch::default().set("content", Value::Null);
        assert!(matches!(patch.apply(raw), Err(ChronicleError::InvalidInput(_))));
    }

    #[test]
    fn test_draft_keeps_unknown_keys() {
        let draft: PostDraft = serde_json::from_str(r#"{"content":"x","mood":"grumpy","id":"7","timestamp":3}"#).unwrap();
        let post = draft.into_post(PostId("1".to_string()), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 10);
        assert_eq!(post.extra.get("mood"), Some(&Value::String("grumpy".to_string())));
        assert!(!post.extra.contains_key("id"));
        assert!(!post.extra.contains_key("timestamp"));

        let written = serde_json::to_string(&post).unwrap();
        assert_eq!(written.matches("\"id\"").count(), 1);
    }
}
