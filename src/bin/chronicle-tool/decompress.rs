use std::io;
use std::path::Path;

use flate2::read::GzDecoder;
use tar::Archive;

pub fn decompress_files(output: &Path) -> io::Result<()> {
    let tar_gz = include_bytes!(concat!(env!("OUT_DIR"), "/site.tar.gz"));
    let tar = GzDecoder::new(tar_gz.as_ref());
    let mut archive = Archive::new(tar);
    archive.unpack(output)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uncompress() {
        let out_dir = tempfile::tempdir().unwrap();
        decompress_files(out_dir.path()).unwrap();
        assert!(out_dir.path().join("index.html.backup").is_file());
        assert!(out_dir.path().join("admin.html").is_file());
        assert!(out_dir.path().join("blog-posts.json").is_file());
    }
}
