//! Standard `[section]\nkey=value` INI files (spec §6), read and rewritten
//! in full on every write since FILLY scripts touch a handful of entries at
//! a time, never stream through large files.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

#[derive(Debug, Default)]
pub struct IniFile {
    path: PathBuf,
    sections: Vec<(String, Vec<(String, String)>)>,
}

impl IniFile {
    /// Loads `path` if it exists; an absent file starts out empty and is
    /// created on the first `save` (spec §6 "creating files as needed").
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let sections = match fs::read_to_string(&path) {
            Ok(text) => parse(&text),
            Err(_) => Vec::new(),
        };
        Self { path, sections }
    }

    fn section_mut(&mut self, name: &str) -> &mut Vec<(String, String)> {
        if let Some(idx) = self.sections.iter().position(|(n, _)| n == name) {
            &mut self.sections[idx].1
        } else {
            self.sections.push((name.to_string(), Vec::new()));
            let last = self.sections.len() - 1;
            &mut self.sections[last].1
        }
    }

    fn entry(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|(n, _)| n == section)?
            .1
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_str(&self, section: &str, key: &str, default: &str) -> String {
        self.entry(section, key).unwrap_or(default).to_string()
    }

    pub fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        match self.entry(section, key) {
            Some(v) => v.trim().parse().unwrap_or_else(|_| {
                warn!("ini entry [{section}]{key}={v:?} is not an integer");
                default
            }),
            None => default,
        }
    }

    pub fn set_str(&mut self, section: &str, key: &str, value: &str) {
        let entries = self.section_mut(section);
        if let Some(existing) = entries.iter_mut().find(|(k, _)| k == key) {
            existing.1 = value.to_string();
        } else {
            entries.push((key.to_string(), value.to_string()));
        }
    }

    pub fn set_int(&mut self, section: &str, key: &str, value: i64) {
        self.set_str(section, key, &value.to_string());
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let mut out = String::new();
        for (section, entries) in &self.sections {
            out.push('[');
            out.push_str(section);
            out.push_str("]\n");
            for (key, value) in entries {
                out.push_str(key);
                out.push('=');
                out.push_str(value);
                out.push('\n');
            }
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        debug!("writing ini file {}", self.path.display());
        fs::write(&self.path, out)?;
        Ok(())
    }
}

fn parse(text: &str) -> Vec<(String, Vec<(String, String)>)> {
    let mut sections: Vec<(String, Vec<(String, String)>)> = Vec::new();
    let mut current = "".to_string();
    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            current = name.to_string();
            if !sections.iter().any(|(n, _)| n == &current) {
                sections.push((current.clone(), Vec::new()));
            }
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let entries = if let Some(idx) = sections.iter().position(|(n, _)| n == &current) {
            &mut sections[idx].1
        } else {
            sections.push((current.clone(), Vec::new()));
            let last = sections.len() - 1;
            &mut sections[last].1
        };
        entries.push((key.trim().to_string(), value.trim().to_string()));
    }
    sections
}

pub fn path_exists(path: &Path) -> bool {
    path.exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("save.ini");
        let mut ini = IniFile::open(&path);
        ini.set_int("player", "score", 42);
        ini.set_str("player", "name", "Ada");
        ini.save().unwrap();

        let reloaded = IniFile::open(&path);
        assert_eq!(reloaded.get_int("player", "score", -1), 42);
        assert_eq!(reloaded.get_str("player", "name", ""), "Ada");
    }

    #[test]
    fn missing_entries_return_the_caller_supplied_default() {
        let ini = IniFile::open("/does/not/exist.ini");
        assert_eq!(ini.get_int("a", "b", 7), 7);
        assert_eq!(ini.get_str("a", "b", "x"), "x");
    }

    #[test]
    fn overwriting_a_key_replaces_it_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("save.ini");
        let mut ini = IniFile::open(&path);
        ini.set_int("s", "k", 1);
        ini.set_int("s", "k", 2);
        assert_eq!(ini.get_int("s", "k", -1), 2);
    }
}
