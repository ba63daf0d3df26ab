use chrono_tz::Tz;
use ramhorns::Template;

use crate::error::{ChronicleError, Result};
use crate::post::{ImageRef, Post};
use crate::text_utils::{format_date_label, format_timestamp, split_paragraphs};

pub const AUDIO_FILE: &str = "audio.mp3";
pub const DEFAULT_BACK_LINK: &str = "../../index.html";

pub const POST_TEMPLATE: &str = include_str!("../../res/template/post.tpl");

#[derive(ramhorns::Content)]
struct BlockView<'a> {
    is_image: bool,
    paragraph: String,
    image_file: &'a str,
    image_name: &'a str,
}

#[derive(ramhorns::Content)]
struct PostPage<'a> {
    date_label: String,
    has_created_at: bool,
    created_at: String,
    has_audio: bool,
    audio_file: &'a str,
    blocks: Vec<BlockView<'a>>,
    has_back_link: bool,
    back_link: &'a str,
}

#[derive(Debug, PartialEq)]
pub enum Block<'a> {
    Paragraph(&'a str),
    Image(&'a ImageRef),
}

/// Spreads `images` evenly over `paragraphs`.
///
/// After paragraph `i` of `P` come the images numbered `floor(N*i/P)+1` up to
/// `floor(N*(i+1)/P)`, so every image appears once and in order. Without
/// paragraphs the images are all that is left.
pub fn interleave<'a>(paragraphs: &[&'a str], images: &'a [ImageRef]) -> Vec<Block<'a>> {
    let p = paragraphs.len();
    let n = images.len();
    if p == 0 {
        return images.iter().map(Block::Image).collect();
    }

    let mut blocks = Vec::with_capacity(p + n);
    for (i, paragraph) in paragraphs.iter().enumerate() {
        blocks.push(Block::Paragraph(paragraph));

        let prev_cut = n * i / p;
        let cut = n * (i + 1) / p;
        if cut > prev_cut {
            blocks.extend(images[prev_cut..cut].iter().map(Block::Image));
        }
    }
    blocks
}

pub fn render_paragraph(paragraph: &str) -> String {
    markdown::to_html(paragraph).trim().to_string()
}

pub struct PostRenderer {
    template: Template<'static>,
    zone: Tz,
    back_link: Option<String>,
}

impl PostRenderer {
    pub fn new(template_src: impl Into<String>, zone: Tz) -> Result<PostRenderer> {
        let template = match Template::new(template_src.into()) {
            Ok(x) => x,
            Err(e) => {
                return Err(ChronicleError::Template(format!("post view template: {}", e)));
            }
        };

        Ok(PostRenderer {
            template,
            zone,
            back_link: Some(DEFAULT_BACK_LINK.to_string()),
        })
    }

    pub fn builtin(zone: Tz) -> Result<PostRenderer> {
        Self::new(POST_TEMPLATE, zone)
    }

    /// `None` (or an empty link) drops the navigation back to the index page.
    pub fn with_back_link(mut self, back_link: Option<String>) -> Self {
        self.back_link = back_link.filter(|link| !link.is_empty());
        self
    }

    pub fn zone(&self) -> &Tz {
        &self.zone
    }

    pub fn render(&self, post: &Post) -> Result<String> {
        post.validate()?;

        let paragraphs = split_paragraphs(&post.content);
        let blocks = interleave(&paragraphs, post.image_list())
            .into_iter()
            .map(|block| match block {
                Block::Paragraph(text) => BlockView {
                    is_image: false,
                    paragraph: render_paragraph(text),
                    image_file: "",
                    image_name: "",
                },
                Block::Image(image) => BlockView {
                    is_image: true,
                    paragraph: String::new(),
                    image_file: image.filename.as_str(),
                    image_name: image.name.as_str(),
                },
            })
            .collect();

        let created_at = format_timestamp(post.timestamp, &self.zone);
        let rendered_page = self.template.render(&PostPage {
            date_label: format_date_label(&post.date),
            has_created_at: created_at.is_some(),
            created_at: created_at.unwrap_or_default(),
            has_audio: post.has_audio,
            audio_file: AUDIO_FILE,
            blocks,
            has_back_link: self.back_link.is_some(),
            back_link: self.back_link.as_deref().unwrap_or(""),
        });

        Ok(rendered_page)
    }
}
