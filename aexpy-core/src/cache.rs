//! File cache of stage products.
//!
//! Layout: `<dir>/<stage>/<key>.json` (or `.json.gz`) with the captured log
//! at `<dir>/<stage>/<key>.log`. Writes overwrite; the last writer wins.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::io;

#[derive(Clone, Debug)]
pub struct FileCache {
    dir: PathBuf,
    gzip: bool,
}

/// Key safe to use as a file name.
pub fn cache_key(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>, gzip: bool) -> Self {
        Self { dir: dir.into(), gzip }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn product_path(&self, stage: &str, key: &str, gzip: bool) -> PathBuf {
        let suffix = if gzip { ".json.gz" } else { ".json" };
        self.dir.join(stage).join(format!("{}{}", cache_key(key), suffix))
    }

    pub fn log_path(&self, stage: &str, key: &str) -> PathBuf {
        self.dir.join(stage).join(format!("{}.log", cache_key(key)))
    }

    /// Path of a stored product, if one exists in either encoding.
    pub fn find(&self, stage: &str, key: &str) -> Option<PathBuf> {
        [self.gzip, !self.gzip]
            .into_iter()
            .map(|gzip| self.product_path(stage, key, gzip))
            .find(|p| p.is_file())
    }

    /// Store a product and its log. A stale copy in the other encoding is
    /// removed so reads never see it.
    pub fn write<T: Serialize>(&self, stage: &str, key: &str, product: &T, log: &str) -> Result<PathBuf> {
        let path = self.product_path(stage, key, self.gzip);
        io::write_product(&path, product, self.gzip)?;
        let stale = self.product_path(stage, key, !self.gzip);
        if stale.is_file() {
            fs::remove_file(&stale)?;
        }
        fs::write(self.log_path(stage, key), log)?;
        tracing::debug!(stage, key, path = %path.display(), "Cached product");
        Ok(path)
    }

    pub fn read<T: DeserializeOwned>(&self, stage: &str, key: &str) -> Result<Option<T>> {
        match self.find(stage, key) {
            Some(path) => {
                tracing::debug!(stage, key, path = %path.display(), "Cache hit");
                Ok(Some(io::read_product(&path)?))
            }
            None => Ok(None),
        }
    }

    pub fn read_log(&self, stage: &str, key: &str) -> Option<String> {
        fs::read_to_string(self.log_path(stage, key)).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApiDifference, Distribution, Release};
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path(), true);
        let dist = Distribution::new(Release::new("demo", "1.0"));
        let path = cache.write("preprocess", "demo@1.0", &dist, "log line\n").unwrap();
        assert!(path.ends_with("preprocess/demo@1.0.json.gz"));

        let back: Option<Distribution> = cache.read("preprocess", "demo@1.0").unwrap();
        assert_eq!(back, Some(dist));
        assert_eq!(cache.read_log("preprocess", "demo@1.0").as_deref(), Some("log line\n"));
        assert!(cache.read::<Distribution>("preprocess", "demo@2.0").unwrap().is_none());
    }

    #[test]
    fn test_last_writer_wins_across_encodings() {
        let dir = TempDir::new().unwrap();
        let plain = FileCache::new(dir.path(), false);
        let packed = FileCache::new(dir.path(), true);
        let mut diff = ApiDifference::default();
        plain.write("diff", "demo@1.0:2.0", &diff, "").unwrap();
        diff.info.producer = "second".into();
        packed.write("diff", "demo@1.0:2.0", &diff, "").unwrap();

        let read: ApiDifference = plain.read("diff", "demo@1.0:2.0").unwrap().unwrap();
        assert_eq!(read.info.producer, "second");
        assert!(plain.find("diff", "demo@1.0:2.0").unwrap().to_string_lossy().ends_with(".gz"));
    }

    #[test]
    fn test_cache_key_is_file_safe() {
        assert_eq!(cache_key("demo@1.0:2.0"), "demo@1.0_2.0");
        assert_eq!(cache_key("a/b"), "a_b");
    }
}
