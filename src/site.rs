use std::fs;
use std::io::ErrorKind;

use spdlog::info;

use crate::config::Config;
use crate::error::{ChronicleError, Result};
use crate::homepage::Prerenderer;
use crate::page_sync::PageSynchronizer;
use crate::post_service::PostService;
use crate::post_store::JsonFileStore;
use crate::view::post_renderer::PostRenderer;

pub const POST_TEMPLATE_FILE: &str = "post.tpl";

/// Uses `post.tpl` from the configured template dir when present, the
/// embedded template otherwise.
pub fn open_renderer(config: &Config) -> Result<PostRenderer> {
    let zone = config.site.time_zone.0;
    let renderer = match config.paths.template_dir {
        Some(ref template_dir) => {
            let template_path = template_dir.join(POST_TEMPLATE_FILE);
            match fs::read_to_string(&template_path) {
                Ok(src) => {
                    info!("Using post template {}", template_path.display());
                    PostRenderer::new(src, zone)?
                }
                Err(e) if e.kind() == ErrorKind::NotFound => PostRenderer::builtin(zone)?,
                Err(e) => return Err(ChronicleError::Config(format!("Error reading {}: {}", template_path.display(), e))),
            }
        }
        None => PostRenderer::builtin(zone)?,
    };

    Ok(renderer.with_back_link(config.site.back_link.clone()))
}

pub fn open_service(config: &Config) -> Result<PostService<JsonFileStore>> {
    let renderer = open_renderer(config)?;
    let synchronizer = PageSynchronizer::new(&config.paths.pages_dir, renderer);
    let store = JsonFileStore::new(&config.paths.store_file);
    Ok(PostService::new(store, synchronizer))
}

pub fn open_prerenderer(config: &Config) -> Result<Prerenderer> {
    let prerenderer = Prerenderer::new(&config.paths.homepage_template, &config.paths.homepage_output)?;
    Ok(match config.site.pages_url {
        Some(ref pages_url) => prerenderer.with_pages_url(pages_url),
        None => prerenderer,
    })
}
