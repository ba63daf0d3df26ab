use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use spdlog::{info, warn};

use chronicle::config::{open_config, Config};
use chronicle::generator::{canned_entry, GeneratedPost};
use chronicle::homepage::PrerenderOutcome;
use chronicle::logger::configure_logger;
use chronicle::post::PostDraft;
use chronicle::post_service::PostService;
use chronicle::post_store::{JsonFileStore, StoreEntry};
use chronicle::site::{open_prerenderer, open_service};

use crate::bootstrap::bootstrap_cmd;

mod bootstrap;
mod decompress;

#[derive(Parser, Debug)]
#[command(version, about = "Maintenance commands for a chronicle site", long_about = None)]
struct Cli {
    /// Config path
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Renders every post page and removes pages of deleted posts
    Sync,
    /// Inlines the latest post into the homepage
    Prerender,
    /// Publishes one of the built in entries
    Generate(GenerateArgs),
    /// Publishes a post written by an external generator
    Publish(PublishArgs),
    /// Attaches a narration file to a post
    AttachAudio {
        id: String,
        file: PathBuf,
    },
    /// Attaches illustrations to a post, the first one becomes the featured image
    AttachImages {
        id: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Deletes a post and its page directory
    Delete {
        id: String,
    },
    /// Lists the posts in the store
    List,
    /// Bootstrap a new site
    Bootstrap(BootstrapArgs),
}

#[derive(Parser, Debug)]
struct GenerateArgs {
    /// Number of posts to keep. Defaults to site.max_posts
    #[arg(short, long)]
    keep: Option<usize>,
}

#[derive(Parser, Debug)]
struct PublishArgs {
    /// Generated post text
    #[arg(short, long, default_value = "generated-post.txt")]
    text: PathBuf,

    /// Generated slug, used as the post id
    #[arg(short, long, default_value = "generated-slug.txt")]
    slug: PathBuf,

    /// News context the post was written from
    #[arg(short, long, default_value = "temp-news-context.json")]
    news: PathBuf,

    /// Narration to attach after publishing
    #[arg(short, long)]
    audio: Option<PathBuf>,

    /// Keep the input files after publishing
    #[arg(long)]
    keep_files: bool,
}

#[derive(Parser, Debug)]
struct BootstrapArgs {
    /// Directory where the new site will be generated
    #[arg(short, long)]
    out_dir: String,
}

fn prerender(config: &Config, service: &PostService<JsonFileStore>) -> Result<()> {
    let posts = service.list()?;
    match open_prerenderer(config)?.run(&posts, Utc::now())? {
        PrerenderOutcome::Written(path) => println!("Homepage written to {}", path.display()),
        PrerenderOutcome::Skipped => println!("No posts, homepage left untouched"),
    }
    Ok(())
}

fn generate_cmd(config: &Config, service: &PostService<JsonFileStore>, args: GenerateArgs) -> Result<()> {
    let content = canned_entry(&mut rand::thread_rng());
    let post = service.create(PostDraft::from_content(content))?;
    println!("Generated {}: {}", post.id, post.content);

    if let Some(keep) = args.keep.or(config.site.max_posts) {
        let dropped = service.retain_latest(keep)?;
        if dropped > 0 {
            println!("Dropped {} old post(s)", dropped);
        }
    }

    prerender(config, service)
}

fn publish_cmd(config: &Config, service: &PostService<JsonFileStore>, args: PublishArgs) -> Result<()> {
    let generated = GeneratedPost::read(&args.text, Some(&args.slug), Some(&args.news))?;
    let post = match generated.slug {
        Some(ref slug) => service.create_with_id(slug.clone(), generated.draft.clone())?,
        None => service.create(generated.draft.clone())?,
    };
    println!("Published {}", post.id);

    if let Some(ref audio) = args.audio {
        match service.attach_audio(post.id.as_str(), audio) {
            Ok(_) => println!("Narration attached"),
            Err(e) => warn!("Continuing without narration: {}", e),
        }
    }

    if !args.keep_files {
        generated.cleanup()?;
    }

    prerender(config, service)
}

fn run(command: Command, config_path: Option<PathBuf>) -> Result<()> {
    let config = open_config(config_path).context("Please run chronicle-tool --help")?;
    if let Err(err) = configure_logger(config.log.as_ref()) {
        warn!("Error creating logger sinks. Using console instead. Desc={}", err);
    }
    let service = open_service(&config)?;

    match command {
        Command::Sync => {
            let report = service.sync()?;
            println!("{}", report);
            report.into_result()?;
        }
        Command::Prerender => prerender(&config, &service)?,
        Command::Generate(args) => generate_cmd(&config, &service, args)?,
        Command::Publish(args) => publish_cmd(&config, &service, args)?,
        Command::AttachAudio { id, file } => {
            let post = service.attach_audio(&id, &file)?;
            println!("Attached narration to {}", post.id);
        }
        Command::AttachImages { id, files } => {
            let files: Vec<_> = files.iter().map(|f| f.as_path()).collect();
            let post = service.attach_images(&id, &files)?;
            println!("{} now has {} image(s)", post.id, post.image_list().len());
        }
        Command::Delete { id } => {
            service.delete(&id)?;
            println!("Deleted {}", id);
        }
        Command::List => {
            for entry in service.entries()? {
                match entry {
                    StoreEntry::Valid(post) => {
                        let preview: String = post.content.chars().take(60).collect();
                        println!("{}\t{}\t{}", post.id, post.date, preview);
                    }
                    StoreEntry::Malformed { reason, .. } => println!("!\t{}", reason),
                }
            }
        }
        Command::Bootstrap(args) => bootstrap_cmd(args)?,
    }

    info!("Done");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Bootstrap(args) => bootstrap_cmd(args),
        command => run(command, cli.config_path.map(PathBuf::from)),
    }
}
