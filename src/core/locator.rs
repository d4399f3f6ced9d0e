use regex::Regex;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    ExactPath,
    FileName,
    FileNameIgnoreCase,
    Stem,
    TimestampStem,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedFile {
    pub path: PathBuf,
    pub match_kind: MatchKind,
}

/// 在 public 目錄與備援目錄（例如舊站爬下來的 scrap 資料夾）中找回原始檔案
#[derive(Debug)]
pub struct LocalFileLocator {
    public_dir: PathBuf,
    files: Vec<PathBuf>,
    by_name: HashMap<String, Vec<usize>>,
    by_name_lower: HashMap<String, Vec<usize>>,
    by_stem_lower: HashMap<String, Vec<usize>>,
    by_bare_stem_lower: HashMap<String, Vec<usize>>,
}

fn timestamp_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // 上傳 API 產生的檔名：`1712345678901-olive-oil.jpg`
    RE.get_or_init(|| Regex::new(r"^\d{10,}[-_]").expect("valid regex"))
}

fn stem_of(name: &str) -> &str {
    match name.rfind('.') {
        Some(0) | None => name,
        Some(pos) => &name[..pos],
    }
}

fn bare_stem_of(name: &str) -> String {
    let stem = stem_of(name).to_lowercase();
    timestamp_prefix().replace(&stem, "").into_owned()
}

impl LocalFileLocator {
    pub fn new(public_dir: impl Into<PathBuf>, fallback_dirs: &[PathBuf]) -> Self {
        let public_dir = public_dir.into();
        let mut files: Vec<PathBuf> = Vec::new();

        for root in fallback_dirs {
            if !root.is_dir() {
                tracing::warn!("⚠️ Fallback directory not found: {}", root.display());
                continue;
            }
            for entry in WalkDir::new(root).follow_links(true) {
                match entry {
                    Ok(entry) if entry.file_type().is_file() => {
                        files.push(entry.into_path());
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("⚠️ Skipping unreadable path: {}", e),
                }
            }
        }

        files.sort();
        files.dedup();

        let mut locator = Self {
            public_dir,
            files: Vec::new(),
            by_name: HashMap::new(),
            by_name_lower: HashMap::new(),
            by_stem_lower: HashMap::new(),
            by_bare_stem_lower: HashMap::new(),
        };

        for (idx, path) in files.iter().enumerate() {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            locator.by_name.entry(name.to_string()).or_default().push(idx);
            locator
                .by_name_lower
                .entry(name.to_lowercase())
                .or_default()
                .push(idx);
            locator
                .by_stem_lower
                .entry(stem_of(name).to_lowercase())
                .or_default()
                .push(idx);
            locator
                .by_bare_stem_lower
                .entry(bare_stem_of(name))
                .or_default()
                .push(idx);
        }
        locator.files = files;

        tracing::debug!(
            "Indexed {} fallback files under {} directories",
            locator.files.len(),
            fallback_dirs.len()
        );
        locator
    }

    pub fn indexed_files(&self) -> usize {
        self.files.len()
    }

    pub fn locate(&self, rel_path: &str) -> Option<LocatedFile> {
        let relative = Path::new(rel_path);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            tracing::warn!("⚠️ Refusing to resolve '{}' outside the public directory", rel_path);
            return None;
        }

        let direct = self.public_dir.join(relative);
        if direct.is_file() {
            return Some(LocatedFile {
                path: direct,
                match_kind: MatchKind::ExactPath,
            });
        }

        let name = Path::new(rel_path).file_name()?.to_str()?;
        let lower = name.to_lowercase();

        let lookups: [(&HashMap<String, Vec<usize>>, String, MatchKind); 4] = [
            (&self.by_name, name.to_string(), MatchKind::FileName),
            (&self.by_name_lower, lower.clone(), MatchKind::FileNameIgnoreCase),
            (&self.by_stem_lower, stem_of(&lower).to_string(), MatchKind::Stem),
            (&self.by_bare_stem_lower, bare_stem_of(&lower), MatchKind::TimestampStem),
        ];

        for (index, key, kind) in lookups {
            if key.is_empty() {
                continue;
            }
            if let Some(hits) = index.get(&key) {
                if hits.len() > 1 && kind != MatchKind::FileName {
                    tracing::warn!(
                        "⚠️ {} candidates for '{}' ({:?}); using {}",
                        hits.len(),
                        rel_path,
                        kind,
                        self.files[hits[0]].display()
                    );
                }
                return Some(LocatedFile {
                    path: self.files[hits[0]].clone(),
                    match_kind: kind,
                });
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"img").unwrap();
    }

    fn fixture() -> (TempDir, LocalFileLocator) {
        let dir = TempDir::new().unwrap();
        let public = dir.path().join("public");
        let scrap = dir.path().join("scrap");
        touch(&public, "uploads/exact.jpg");
        touch(&scrap, "Raw-Honey.JPG");
        touch(&scrap, "dates.jpeg");
        touch(&scrap, "nested/1712345678901-olive-oil.png");
        touch(&scrap, "almonds.webp");

        let locator = LocalFileLocator::new(&public, &[scrap, dir.path().join("missing")]);
        (dir, locator)
    }

    #[test]
    fn test_exact_path_under_public_dir() {
        let (_dir, locator) = fixture();
        let found = locator.locate("uploads/exact.jpg").unwrap();
        assert_eq!(found.match_kind, MatchKind::ExactPath);
    }

    #[test]
    fn test_file_name_matches() {
        let (_dir, locator) = fixture();

        let found = locator.locate("uploads/almonds.webp").unwrap();
        assert_eq!(found.match_kind, MatchKind::FileName);

        let found = locator.locate("uploads/raw-honey.jpg").unwrap();
        assert_eq!(found.match_kind, MatchKind::FileNameIgnoreCase);
        assert!(found.path.ends_with("Raw-Honey.JPG"));
    }

    #[test]
    fn test_stem_match_ignores_extension() {
        let (_dir, locator) = fixture();
        let found = locator.locate("uploads/dates.jpg").unwrap();
        assert_eq!(found.match_kind, MatchKind::Stem);
        assert!(found.path.ends_with("dates.jpeg"));
    }

    #[test]
    fn test_timestamp_prefix_is_ignored_both_ways() {
        let (_dir, locator) = fixture();

        let found = locator.locate("uploads/olive-oil.jpg").unwrap();
        assert_eq!(found.match_kind, MatchKind::TimestampStem);
        assert!(found.path.ends_with("1712345678901-olive-oil.png"));

        let found = locator.locate("uploads/1699999999999-almonds.webp").unwrap();
        assert_eq!(found.match_kind, MatchKind::TimestampStem);
        assert!(found.path.ends_with("almonds.webp"));
    }

    #[test]
    fn test_unknown_file_is_none() {
        let (_dir, locator) = fixture();
        assert!(locator.locate("uploads/quinoa.jpg").is_none());
        assert_eq!(locator.indexed_files(), 4);
    }

    #[test]
    fn test_paths_outside_public_dir_are_refused() {
        let (dir, locator) = fixture();
        touch(dir.path(), "secret.jpg");
        let outside = dir.path().join("secret.jpg");

        assert!(locator.locate("../secret.jpg").is_none());
        assert!(locator.locate("uploads/../../secret.jpg").is_none());
        assert!(locator.locate(outside.to_str().unwrap()).is_none());
        // 即使檔名在備援索引中也不接受
        assert!(locator.locate("../almonds.webp").is_none());
    }
}
