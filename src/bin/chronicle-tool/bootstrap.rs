use std::fs;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use regex::Regex;

use chronicle::config::CFG_FILE_NAME;
use chronicle::site::POST_TEMPLATE_FILE;
use chronicle::view::post_renderer::POST_TEMPLATE;

use crate::decompress::decompress_files;
use crate::BootstrapArgs;

fn get_sample_cfg() -> &'static str {
    include_str!("../../../res/chronicle.toml")
}

fn write_chronicle_cfg(out_dir: &Path) -> Result<()> {
    let file = File::create(out_dir.join(CFG_FILE_NAME))?;
    let mut writer = BufWriter::new(file);

    let sample_cfg = replace_paths(out_dir, get_sample_cfg());
    writer.write_all(sample_cfg.as_bytes())?;
    writer.flush()?;

    Ok(())
}

fn write_post_template(out_dir: &Path) -> Result<()> {
    let template_dir = out_dir.join("template");
    fs::create_dir_all(&template_dir)?;
    fs::write(template_dir.join(POST_TEMPLATE_FILE), POST_TEMPLATE)?;
    Ok(())
}

/// Points every `site/...` path of the sample config into `prefix`.
fn replace_paths(prefix: &Path, config_data: &str) -> String {
    let prefix = prefix.to_string_lossy();
    let prefix = prefix.trim_end_matches('/');

    let site_regex = Regex::new(r#""site/([\w.-]+)""#).unwrap();
    site_regex
        .replace_all(config_data, |captures: &regex::Captures| format!("\"{}/{}\"", prefix, &captures[1]))
        .to_string()
}

pub fn bootstrap_cmd(args: BootstrapArgs) -> Result<()> {
    let out_path = fs::canonicalize(&args.out_dir)
        .with_context(|| format!("Error converting path to absolute: {}", args.out_dir))?;

    if !out_path.is_dir() {
        bail!("Output path must be a directory: {}", out_path.display());
    }

    decompress_files(&out_path).context("Error bootstrapping")?;
    write_post_template(&out_path).context("Error writing the post template")?;
    write_chronicle_cfg(&out_path).context("Error writing Chronicle configuration")?;

    println!("New site ready in {}", out_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use chronicle::config::parse_config;

    use super::*;

    #[test]
    fn test_sample_cfg() {
        let res = replace_paths(Path::new("/abs/path/"), get_sample_cfg());
        assert!(res.contains(r##"store_file = "/abs/path/blog-posts.json""##));
        assert!(res.contains(r##"pages_dir = "/abs/path/blog""##));
        assert!(res.contains(r##"homepage_template = "/abs/path/index.html.backup""##));
        assert!(res.contains(r##"template_dir = "/abs/path/template""##));
        assert!(!res.contains("\"site/"));

        let cfg = parse_config(&res, Path::new("/opt")).unwrap();
        assert_eq!(cfg.server.port, 5001);
    }

    #[test]
    fn test_bootstrap() {
        let out_dir = tempfile::tempdir().unwrap();
        bootstrap_cmd(BootstrapArgs {
            out_dir: out_dir.path().to_string_lossy().to_string(),
        }).unwrap();

        let root = fs::canonicalize(out_dir.path()).unwrap();
        assert!(root.join(CFG_FILE_NAME).is_file());
        assert!(root.join("template").join(POST_TEMPLATE_FILE).is_file());
        let cfg = chronicle::config::read_config(&root.join(CFG_FILE_NAME)).unwrap();
        assert_eq!(cfg.paths.store_file, root.join("blog-posts.json"));
    }
}
