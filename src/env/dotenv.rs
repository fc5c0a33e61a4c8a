//! Minimal dotenv reader.
//!
//! Supports `KEY=VALUE` lines, `#` comments, an optional `export ` prefix and
//! single- or double-quoted values. There is no variable expansion and no
//! command substitution.

use super::EnvMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Parse dotenv content.
///
/// Lines without `=` and lines with an empty key are skipped. When a key
/// repeats, the last occurrence wins.
pub fn parse_dotenv(content: &str) -> EnvMap {
    let mut vars = EnvMap::new();

    for raw_line in content.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line = line
            .strip_prefix("export ")
            .map(str::trim_start)
            .unwrap_or(line);

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };

        let key = key.trim();
        if key.is_empty() {
            continue;
        }

        vars.insert(key.to_string(), unquote(value.trim()).to_string());
    }

    vars
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Read and parse a dotenv file.
///
/// A missing file yields an empty mapping. Any other read failure is
/// returned as a message; callers treat it as a soft failure.
pub async fn load_dotenv(path: &Path) -> Result<EnvMap, String> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(parse_dotenv(&String::from_utf8_lossy(&bytes))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(EnvMap::new()),
        Err(e) => Err(format!(
            "failed to read dotenv file '{}': {}",
            path.display(),
            e
        )),
    }
}

/// Parsed dotenv files keyed by path, reused until the file's mtime changes.
///
/// Missing files and read failures are never cached.
#[derive(Debug, Default)]
pub struct DotenvCache {
    entries: Mutex<HashMap<PathBuf, (SystemTime, EnvMap)>>,
}

impl DotenvCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// [`load_dotenv`], served from the cache while the file is unchanged.
    pub async fn load(&self, path: &Path) -> Result<EnvMap, String> {
        let mtime = tokio::fs::metadata(path)
            .await
            .and_then(|m| m.modified())
            .ok();
        let Some(mtime) = mtime else {
            self.entries.lock().remove(path);
            return load_dotenv(path).await;
        };

        let cached = self
            .entries
            .lock()
            .get(path)
            .filter(|(cached_at, _)| *cached_at == mtime)
            .map(|(_, vars)| vars.clone());
        if let Some(vars) = cached {
            tracing::trace!(path = %path.display(), "dotenv cache hit");
            return Ok(vars);
        }

        let vars = load_dotenv(path).await?;
        self.entries
            .lock()
            .insert(path.to_path_buf(), (mtime, vars.clone()));
        Ok(vars)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_pairs() {
        let vars = parse_dotenv("A=1\nB=two\n");
        assert_eq!(vars.get("A").map(String::as_str), Some("1"));
        assert_eq!(vars.get("B").map(String::as_str), Some("two"));
    }

    #[test]
    fn test_comments_and_blank_lines_ignored() {
        let vars = parse_dotenv("# header\n\n   # indented comment\nKEY=value\n");
        assert_eq!(vars.len(), 1);
        assert_eq!(vars["KEY"], "value");
    }

    #[test]
    fn test_export_prefix_and_quotes() {
        let content = r#"
export TOKEN="abc def"
SINGLE='x=y'
MISMATCHED="open'
"#;
        let vars = parse_dotenv(content);
        assert_eq!(vars["TOKEN"], "abc def");
        assert_eq!(vars["SINGLE"], "x=y");
        assert_eq!(vars["MISMATCHED"], "\"open'");
    }

    #[test]
    fn test_value_keeps_everything_after_first_equals() {
        let vars = parse_dotenv("URL=https://host/?a=b&c=d");
        assert_eq!(vars["URL"], "https://host/?a=b&c=d");
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let vars = parse_dotenv("NOEQUALS\n=novalue\n  KEY  =  spaced  \n");
        assert_eq!(vars.len(), 1);
        assert_eq!(vars["KEY"], "spaced");
    }

    #[test]
    fn test_no_expansion() {
        let vars = parse_dotenv("A=$HOME/$(whoami)");
        assert_eq!(vars["A"], "$HOME/$(whoami)");
    }

    #[test]
    fn test_last_duplicate_wins() {
        let vars = parse_dotenv("A=1\nA=2\n");
        assert_eq!(vars["A"], "2");
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let vars = load_dotenv(&temp_dir.path().join("absent.env")).await.unwrap();
        assert!(vars.is_empty());
    }

    #[tokio::test]
    async fn test_directory_is_soft_error() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let err = load_dotenv(temp_dir.path()).await.unwrap_err();
        assert!(err.contains("failed to read dotenv file"));
    }

    #[tokio::test]
    async fn test_cache_reuses_until_mtime_changes() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join(".env");
        std::fs::write(&path, "A=1\n").unwrap();

        let cache = DotenvCache::new();
        assert_eq!(cache.load(&path).await.unwrap()["A"], "1");
        assert_eq!(cache.len(), 1);

        // Same mtime: the stale parse is served.
        let mtime = std::fs::metadata(&path).unwrap().modified().unwrap();
        std::fs::write(&path, "A=2\n").unwrap();
        let file = std::fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(mtime).unwrap();
        assert_eq!(cache.load(&path).await.unwrap()["A"], "1");

        file.set_modified(mtime + std::time::Duration::from_secs(5))
            .unwrap();
        assert_eq!(cache.load(&path).await.unwrap()["A"], "2");
    }

    #[tokio::test]
    async fn test_cache_skips_missing_and_unreadable() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let cache = DotenvCache::new();

        assert!(cache.load(&temp_dir.path().join("absent.env")).await.unwrap().is_empty());
        assert!(cache.load(temp_dir.path()).await.is_err());
        assert!(cache.is_empty());
    }
}
