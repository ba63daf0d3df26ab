use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::{env, fs, io};

use serde::Deserialize;

use crate::util::time_zone::ZoneName;

pub const CFG_FILE_NAME: &str = "chronicle.toml";

#[derive(Deserialize)]
pub struct Paths {
    pub store_file: PathBuf,
    pub pages_dir: PathBuf,
    pub homepage_template: PathBuf,
    pub homepage_output: PathBuf,
    pub admin_page: Option<PathBuf>,
    pub template_dir: Option<PathBuf>,
}

#[derive(Deserialize)]
pub struct Site {
    #[serde(default)]
    pub time_zone: ZoneName,
    pub back_link: Option<String>,
    pub pages_url: Option<String>,
    pub max_posts: Option<usize>,
}

#[derive(Deserialize)]
pub struct Server {
    pub address: String,
    pub port: u16,
}

#[derive(Deserialize)]
pub struct Log {
    pub level: LogLevel,
    pub log_to_console: bool,
    pub location: Option<PathBuf>,
}

#[derive(Deserialize, Copy, Clone, Debug, PartialEq)]
pub enum LogLevel {
    Critical = 0,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Deserialize)]
pub struct Config {
    pub paths: Paths,
    pub site: Site,
    pub server: Server,
    pub log: Option<Log>,
}

fn parse_path(path: PathBuf, exe_dir: &str) -> PathBuf {
    if path.starts_with("${exe_dir}") {
        let str_path = path.to_string_lossy();
        PathBuf::from(str_path.replace("${exe_dir}", exe_dir))
    } else {
        path
    }
}

fn exe_dir() -> io::Result<PathBuf> {
    let cur_exe = env::current_exe()?;
    match cur_exe.parent() {
        Some(dir) => Ok(dir.to_path_buf()),
        None => Err(io::Error::new(ErrorKind::NotFound, "Could not find the executable directory")),
    }
}

pub fn parse_config(cfg_content: &str, exe_dir: &Path) -> io::Result<Config> {
    let mut cfg: Config = match toml::from_str::<Config>(cfg_content) {
        Ok(cfg) => cfg,
        Err(e) => return Err(io::Error::new(
            ErrorKind::InvalidData, format!("Error parsing configuration file: {}", e))),
    };

    let exe_dir = exe_dir.to_string_lossy();
    cfg.paths = Paths {
        store_file: parse_path(cfg.paths.store_file, &exe_dir),
        pages_dir: parse_path(cfg.paths.pages_dir, &exe_dir),
        homepage_template: parse_path(cfg.paths.homepage_template, &exe_dir),
        homepage_output: parse_path(cfg.paths.homepage_output, &exe_dir),
        admin_page: cfg.paths.admin_page.map(|p| parse_path(p, &exe_dir)),
        template_dir: cfg.paths.template_dir.map(|p| parse_path(p, &exe_dir)),
    };

    Ok(cfg)
}

pub fn read_config(cfg_path: &Path) -> io::Result<Config> {
    let cfg_content = match fs::read_to_string(cfg_path) {
        Ok(content) => content,
        Err(e) => return Err(io::Error::new(e.kind(), format!("Error opening configuration file {}: {}", cfg_path.display(), e))),
    };

    parse_config(&cfg_content, &exe_dir()?)
}

/// Executable directory first, then the current directory, then the user config dir.
pub fn find_config_path() -> Option<PathBuf> {
    let mut candidates = vec![];
    if let Ok(exe_dir) = exe_dir() {
        candidates.push(exe_dir.join(CFG_FILE_NAME));
    }
    if let Ok(cur_dir) = env::current_dir() {
        candidates.push(cur_dir.join(CFG_FILE_NAME));
    }
    if let Some(cfg_dir) = dirs::config_dir() {
        candidates.push(cfg_dir.join("chronicle").join(CFG_FILE_NAME));
    }

    candidates.into_iter().find(|path| path.exists())
}

/// Reads the configuration and fills in defaults that depend on the machine.
pub fn open_config(cfg_path: Option<PathBuf>) -> io::Result<Config> {
    let config_path = match cfg_path.or_else(find_config_path) {
        Some(path) => path,
        None => return Err(io::Error::new(ErrorKind::NotFound, format!("Could not find {}", CFG_FILE_NAME))),
    };

    println!("Reading config from {}", config_path.display());
    let mut config = read_config(&config_path)?;

    if let Some(ref mut log) = config.log {
        if log.location.is_none() {
            let cache_dir = dirs::cache_dir().unwrap_or_else(env::temp_dir);
            log.location = Some(cache_dir.join("Chronicle").join("log").join("chronicle.log"));
        }
    }

    Ok(config)
}
