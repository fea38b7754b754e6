//! Case-insensitive asset resolution within a single configured base
//! directory (spec §6). Grounded on the engine's `Paths` hive-search design,
//! narrowed from a multi-hive search to the single `--assets` root the
//! runtime is configured with.

use std::path::{Component, Path, PathBuf};

use filly_core::traits::AssetLoader;
use log::debug;

/// Resolves `path` against `base` by walking directory entries and matching
/// each component case-insensitively, since FILLY scripts reference assets
/// with whatever casing the author typed and the host filesystem may be
/// case-sensitive.
pub struct FsAssetLoader {
    base: PathBuf,
}

impl FsAssetLoader {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let relative = Path::new(path);
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            return None;
        }
        let mut current = self.base.clone();
        for component in relative.components() {
            let Component::Normal(name) = component else {
                continue;
            };
            let name = name.to_string_lossy();
            let entries = std::fs::read_dir(&current).ok()?;
            let mut found = None;
            for entry in entries.flatten() {
                if entry.file_name().to_string_lossy().eq_ignore_ascii_case(&name) {
                    found = Some(entry.path());
                    break;
                }
            }
            current = found?;
        }
        Some(current)
    }
}

impl AssetLoader for FsAssetLoader {
    fn read(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        let resolved = self
            .resolve(path)
            .ok_or_else(|| anyhow::anyhow!("asset not found: {path}"))?;
        debug!("reading asset {path} -> {}", resolved.display());
        Ok(std::fs::read(resolved)?)
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.exists()).unwrap_or(false)
    }

    /// Lists every file under the base directory whose path (relative to
    /// `base`, forward-slash separated) matches `glob`. Only `*` (any run of
    /// characters, never crossing a `/`) is supported; the asset vocabulary
    /// this serves (sample/patch/picture names) never needs more.
    fn list(&self, glob: &str) -> anyhow::Result<Vec<String>> {
        let mut out = Vec::new();
        walk(&self.base, &self.base, glob, &mut out)?;
        out.sort();
        Ok(out)
    }
}

fn walk(base: &Path, dir: &Path, glob: &str, out: &mut Vec<String>) -> anyhow::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk(base, &path, glob, out)?;
            continue;
        }
        let relative = path.strip_prefix(base).unwrap_or(&path);
        let relative = relative.to_string_lossy().replace('\\', "/");
        if glob_match(glob, &relative) {
            out.push(relative);
        }
    }
    Ok(())
}

fn glob_match(pattern: &str, candidate: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern.eq_ignore_ascii_case(candidate),
        Some((prefix, suffix)) => {
            candidate.len() >= prefix.len() + suffix.len()
                && candidate[..prefix.len()].eq_ignore_ascii_case(prefix)
                && candidate[candidate.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("Samples")).unwrap();
        fs::write(dir.path().join("Samples/Kick.wav"), b"riff").unwrap();
        fs::write(dir.path().join("title.pic"), b"pic").unwrap();
        dir
    }

    #[test]
    fn case_insensitive_read_resolves_mixed_casing() {
        let dir = fixture();
        let loader = FsAssetLoader::new(dir.path());
        assert!(loader.exists("samples/kick.wav"));
        assert_eq!(loader.read("SAMPLES/KICK.WAV").unwrap(), b"riff");
    }

    #[test]
    fn missing_asset_is_an_error() {
        let dir = fixture();
        let loader = FsAssetLoader::new(dir.path());
        assert!(loader.read("nope.wav").is_err());
    }

    #[test]
    fn parent_dir_escape_is_rejected() {
        let dir = fixture();
        let loader = FsAssetLoader::new(dir.path());
        assert!(!loader.exists("../outside.txt"));
    }

    #[test]
    fn list_matches_glob_suffix() {
        let dir = fixture();
        let loader = FsAssetLoader::new(dir.path());
        let matches = loader.list("*.wav").unwrap();
        assert_eq!(matches, vec!["Samples/Kick.wav".to_string()]);
    }
}
