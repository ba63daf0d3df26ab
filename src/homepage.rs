use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use lazy_static::lazy_static;
use ramhorns::Template;
use regex::{Captures, Regex};
use spdlog::info;

use crate::error::{ChronicleError, Result};
use crate::post::Post;
use crate::text_utils::{format_date_label, split_paragraphs};
use crate::view::post_renderer::render_paragraph;

pub const DEFAULT_PAGES_URL: &str = "./blog";

const LATEST_POST_TEMPLATE: &str = include_str!("../res/template/latest_post.tpl");

lazy_static! {
    static ref PLACEHOLDER_REGEX: Regex = Regex::new(
        r#"(<div id="latest-post-container"[^>]*>)([\s\S]*?)(</div>\s*</section>)"#
    ).unwrap();
}

#[derive(ramhorns::Content)]
struct ParagraphView {
    html: String,
}

#[derive(ramhorns::Content)]
struct LatestPostView {
    date_label: String,
    has_featured_image: bool,
    featured_image_src: String,
    paragraphs: Vec<ParagraphView>,
    has_link: bool,
    post_link: String,
    read_more_label: String,
}

#[derive(Debug, PartialEq)]
pub enum PrerenderOutcome {
    Skipped,
    Written(PathBuf),
}

pub fn read_more_label(post: &Post) -> String {
    let mut label = "Read Full Chronicle".to_string();
    if post.has_audio {
        label.push_str(" with Voice Narration");
    }
    if post.has_images() {
        label.push_str(" & Illustrations");
    }
    label
}

/// Replaces the inner content of the `latest-post-container` div.
/// Returns `None` when the template has no such container.
pub fn inject(template_html: &str, fragment: &str, post: &Post, now: DateTime<Utc>) -> Option<String> {
    if !PLACEHOLDER_REGEX.is_match(template_html) {
        return None;
    }

    let provenance = format!("<!-- Pre-rendered on {} - Post: {} -->",
                             now.to_rfc3339_opts(SecondsFormat::Millis, true),
                             post.date);
    let replaced = PLACEHOLDER_REGEX.replace(template_html, |caps: &Captures| {
        format!("{}\n                    {}{}\n                {}", &caps[1], provenance, fragment, &caps[3])
    });
    Some(replaced.into_owned())
}

/// Inlines the newest post into the landing page so it shows without a fetch.
pub struct Prerenderer {
    template_path: PathBuf,
    output_path: PathBuf,
    pages_url: String,
    fragment: Template<'static>,
}

impl Prerenderer {
    pub fn new(template_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Result<Prerenderer> {
        let fragment = Template::new(LATEST_POST_TEMPLATE)
            .map_err(|e| ChronicleError::Template(format!("latest post template: {}", e)))?;

        Ok(Prerenderer {
            template_path: template_path.into(),
            output_path: output_path.into(),
            pages_url: DEFAULT_PAGES_URL.to_string(),
            fragment,
        })
    }

    pub fn with_pages_url(mut self, pages_url: &str) -> Self {
        self.pages_url = pages_url.trim_end_matches('/').to_string();
        self
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn render_fragment(&self, post: &Post) -> Result<String> {
        post.validate()?;

        let id_resolvable = !post.id.as_str().is_empty();
        let post_url = format!("{}/{}", self.pages_url, post.id);
        let featured_image_src = match post.featured_image {
            Some(ref image) if id_resolvable => Some(format!("{}/{}", post_url, image)),
            _ => None,
        };

        let paragraphs = split_paragraphs(&post.content)
            .into_iter()
            .map(|p| ParagraphView { html: render_paragraph(p) })
            .collect();

        Ok(self.fragment.render(&LatestPostView {
            date_label: format_date_label(&post.date),
            has_featured_image: featured_image_src.is_some(),
            featured_image_src: featured_image_src.unwrap_or_default(),
            paragraphs,
            has_link: id_resolvable,
            post_link: format!("{}/", post_url),
            read_more_label: read_more_label(post),
        }))
    }

    pub fn run(&self, posts: &[Post], now: DateTime<Utc>) -> Result<PrerenderOutcome> {
        let Some(latest) = posts.first() else {
            info!("No posts found, skipping pre-render");
            return Ok(PrerenderOutcome::Skipped);
        };

        let fragment = self.render_fragment(latest)?;
        let template_html = fs::read_to_string(&self.template_path)?;
        let html = match inject(&template_html, &fragment, latest, now) {
            Some(html) => html,
            None => return Err(ChronicleError::PlaceholderMissing(self.template_path.clone())),
        };

        fs::write(&self.output_path, html)?;
        info!("Pre-rendered post {} ({}) into {}", latest.id, latest.date, self.output_path.display());

        Ok(PrerenderOutcome::Written(self.output_path.clone()))
    }
}
