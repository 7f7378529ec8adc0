//! Plain-text `key=value` parameter files written next to saved weights.

use log::debug;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::Result;

/// `<base>.<extension>`, keeping any extension `base` already has
pub fn sidecar_path(base: &Path, extension: &str) -> PathBuf {
    let mut path: OsString = base.as_os_str().to_owned();
    path.push(".");
    path.push(extension);
    PathBuf::from(path)
}

/// Ordered set of `key=value` entries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamFile {
    entries: BTreeMap<String, String>,
}

impl ParamFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<V: fmt::Display>(&mut self, key: &str, value: V) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Parsed value of `key`; `None` when missing or unparseable
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                debug!("ignoring unparseable value '{}' for '{}'", raw, key);
                None
            }
        }
    }

    /// Overwrite `target` with the value of `key` if it is present and parses
    pub fn apply<T: FromStr>(&self, key: &str, target: &mut T) -> bool {
        match self.get_parsed(key) {
            Some(value) => {
                *target = value;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse `key=value` lines. Blank lines, `#` comments and lines without `=` are skipped.
    pub fn parse(text: &str) -> Self {
        let mut params = ParamFile::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.split_once('=') {
                Some((key, value)) => {
                    params.entries.insert(key.trim().to_string(), value.trim().to_string());
                }
                None => debug!("skipping malformed parameter line '{}'", line),
            }
        }
        params
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_string())?;
        Ok(())
    }
}

impl fmt::Display for ParamFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.entries {
            writeln!(f, "{}={}", key, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sidecar_path_appends() {
        let path = sidecar_path(Path::new("/tmp/model.bin"), "params");
        assert_eq!(path, PathBuf::from("/tmp/model.bin.params"));
    }

    #[test]
    fn test_parse_skips_noise() {
        let params = ParamFile::parse("# comment\ngamma = 0.9\n\nbroken line\nalgorithm=ppo\n");
        assert_eq!(params.len(), 2);
        assert_eq!(params.get("algorithm"), Some("ppo"));
        assert_eq!(params.get_parsed::<f32>("gamma"), Some(0.9));
    }

    #[test]
    fn test_apply_keeps_value_on_bad_input() {
        let params = ParamFile::parse("epochs=four\nlambda=0.8");
        let mut epochs = 4usize;
        let mut lambda = 0.95f32;
        assert!(!params.apply("epochs", &mut epochs));
        assert!(params.apply("lambda", &mut lambda));
        assert!(!params.apply("missing", &mut lambda));
        assert_eq!(epochs, 4);
        assert_eq!(lambda, 0.8);
    }

    #[test]
    fn test_write_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trainer.dist_params");

        let mut params = ParamFile::new();
        params.set("learning_rate", 0.0003f32);
        params.set("experience_sharing", true);
        params.set("num_workers", 4);
        params.write(&path).unwrap();

        let restored = ParamFile::read(&path).unwrap();
        assert_eq!(restored, params);
        assert_eq!(restored.get_parsed::<bool>("experience_sharing"), Some(true));
        assert!(ParamFile::read(&dir.path().join("missing")).is_err());
    }
}
