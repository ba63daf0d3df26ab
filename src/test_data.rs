#![cfg(test)]

use chrono::NaiveDate;
use serde_json::Map;

use crate::post::{ImageRef, Post, PostId};
use crate::post_store::StoreEntry;

pub const STORE_DATA: &str = r##"[
  {
    "id": "the-printer-demon",
    "date": "2024-01-05",
    "timestamp": 1704470400000,
    "content": "My nemesis, the Printer Demon, refused to cooperate today.\n\nIt spoke only in the ancient tongue of PC LOAD LETTER.\n\nI turned it off and on again. Victory.",
    "hasAudio": true,
    "images": [
      { "filename": "printer-1.png", "name": "printer-demon", "prompt": "a printer demon" },
      { "filename": "printer-2.png", "name": "victory" }
    ],
    "featuredImage": "printer-1.png",
    "newsReferences": []
  },
  {
    "id": "1704300000000",
    "date": "2024-01-03",
    "timestamp": 1704300000000,
    "content": "The WiFi spirits abandoned me during a crucial scrying session.",
    "newsReferences": ["Router firmware recalled"]
  }
]"##;

pub const MIXED_STORE_DATA: &str = r##"[
  {
    "id": "good",
    "date": "2024-01-05",
    "timestamp": 1704470400000,
    "content": "The cauldron behaved today."
  },
  {
    "id": "bad",
    "date": "someday",
    "timestamp": 1704300000000,
    "content": "Written by a confused familiar.",
    "mood": "cursed"
  },
  {
    "id": "older",
    "date": "2024-01-02",
    "timestamp": 1704200000000,
    "content": "Nothing happened."
  }
]"##;

pub const HOMEPAGE_TEMPLATE: &str = r##"<html>
<body>
    <section id="chronicle">
        <h2>Latest Chronicle</h2>
        <div id="latest-post-container" class="chronicle-container">
            <p class="loading">Consulting the crystal ball...</p>
        </div>
    </section>
    <footer>Copyright 1337</footer>
</body>
</html>"##;

pub fn sample_post(id: &str, content: &str) -> Post {
    Post {
        id: PostId(id.to_string()),
        date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
        timestamp: 1704470400000,
        content: content.to_string(),
        has_audio: false,
        images: None,
        featured_image: None,
        news_references: None,
        extra: Map::new(),
    }
}

pub fn sample_images(count: usize) -> Vec<ImageRef> {
    (1..=count)
        .map(|n| ImageRef {
            filename: format!("image-{}.png", n),
            name: format!("illustration-{}", n),
            prompt: None,
        })
        .collect()
}

pub fn entries(posts: &[Post]) -> Vec<StoreEntry> {
    posts.iter().cloned().map(StoreEntry::from).collect()
}
