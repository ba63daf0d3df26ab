pub mod config;
pub mod error;
pub mod generator;
pub mod homepage;
pub mod logger;
pub mod page_sync;
pub mod post;
pub mod post_service;
pub mod post_store;
pub mod server;
pub mod site;
pub mod text_utils;
pub mod util;
pub mod view;
mod test_data;

pub use error::{ChronicleError, Result};
