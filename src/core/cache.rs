//! Incremental build cache
//!
//! Remembers, per source file, the content hash and modification time seen at
//! the last extraction and the pages generated from it. Lives as JSON next to
//! the pages it describes.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::parser::calculate_hash;
use crate::error::{DocwrightError, Result};

pub const CACHE_FILE_NAME: &str = ".docwright-cache.json";
pub const CACHE_VERSION: &str = "1.0";

/// What the cache knows about one source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileCacheEntry {
    pub content_hash: String,
    pub last_modified: DateTime<Utc>,
    pub construct_count: usize,
    pub language: String,
    pub generated_files: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheData {
    version: String,
    last_updated: DateTime<Utc>,
    files: BTreeMap<String, FileCacheEntry>,
}

impl Default for CacheData {
    fn default() -> Self {
        Self {
            version: CACHE_VERSION.to_string(),
            last_updated: Utc::now(),
            files: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub files: usize,
    pub outputs: usize,
}

/// Problems found by [`DocumentationCache::verify_integrity`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    /// Pages the cache lists that are gone from disk
    pub missing_outputs: Vec<PathBuf>,
    /// Pages on disk the cache does not list
    pub untracked_pages: Vec<PathBuf>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.missing_outputs.is_empty() && self.untracked_pages.is_empty()
    }
}

pub struct DocumentationCache {
    path: PathBuf,
    data: CacheData,
    /// Generated page -> source file that produced it
    output_to_source: HashMap<String, String>,
}

impl DocumentationCache {
    /// Load the cache stored in `extract_dir`
    ///
    /// A missing or unreadable cache file yields an empty cache.
    pub fn load(extract_dir: &Path) -> Self {
        let path = extract_dir.join(CACHE_FILE_NAME);
        let data = if path.is_file() {
            match read_cache(&path) {
                Ok(data) => {
                    debug!("Loaded cache with {} entries from {}", data.files.len(), path.display());
                    data
                }
                Err(e) => {
                    warn!("Ignoring unreadable cache {}: {}", path.display(), e);
                    CacheData::default()
                }
            }
        } else {
            CacheData::default()
        };

        let mut cache = Self {
            path,
            data,
            output_to_source: HashMap::new(),
        };
        cache.rebuild_reverse_map();
        cache
    }

    pub fn save(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.data.last_updated = Utc::now();
        let content = serde_json::to_string_pretty(&self.data)?;
        std::fs::write(&self.path, content)?;
        debug!("Saved cache to {}", self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry(&self, source: &Path) -> Option<&FileCacheEntry> {
        self.data.files.get(&key(source))
    }

    /// Whether `source` has to be extracted again
    ///
    /// Deleted files never need extraction. Any failure while checking counts
    /// as a change.
    pub fn needs_extraction(&self, source: &Path) -> bool {
        if !source.exists() {
            return false;
        }

        let Some(entry) = self.entry(source) else {
            debug!("{} is not cached", source.display());
            return true;
        };

        match self.is_fresh(source, entry) {
            Ok(fresh) => !fresh,
            Err(e) => {
                debug!("Could not check {}: {}", source.display(), e);
                true
            }
        }
    }

    fn is_fresh(&self, source: &Path, entry: &FileCacheEntry) -> Result<bool> {
        if modified_time(source)? != entry.last_modified {
            debug!("{} has a new modification time", source.display());
            return Ok(false);
        }

        if file_hash(source)? != entry.content_hash {
            debug!("{} content changed", source.display());
            return Ok(false);
        }

        if let Some(missing) = entry.generated_files.iter().find(|f| !Path::new(f).exists()) {
            debug!("Generated page {} is missing", missing);
            return Ok(false);
        }

        Ok(true)
    }

    /// Record a fresh extraction of `source`
    pub fn update_file(
        &mut self,
        source: &Path,
        outputs: &[PathBuf],
        construct_count: usize,
        language: &str,
    ) -> Result<()> {
        let source_key = key(source);
        let entry = FileCacheEntry {
            content_hash: file_hash(source)?,
            last_modified: modified_time(source)?,
            construct_count,
            language: language.to_string(),
            generated_files: outputs.iter().map(|p| key(p)).collect(),
        };

        for output in &entry.generated_files {
            self.output_to_source.insert(output.clone(), source_key.clone());
        }
        self.data.files.insert(source_key, entry);
        Ok(())
    }

    pub fn remove_file(&mut self, source: &Path) {
        if let Some(entry) = self.data.files.remove(&key(source)) {
            for output in &entry.generated_files {
                self.output_to_source.remove(output);
            }
            debug!("Removed cache entry for {}", source.display());
        }
        // Pages shared with other sources stay mapped to them
        self.rebuild_reverse_map();
    }

    pub fn source_for_output(&self, output: &Path) -> Option<&str> {
        self.output_to_source.get(&key(output)).map(String::as_str)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            files: self.data.files.len(),
            outputs: self.output_to_source.len(),
        }
    }

    pub fn clear(&mut self) {
        self.data.files.clear();
        self.output_to_source.clear();
    }

    /// Cached sources that no longer exist on disk
    pub fn deleted_sources(&self) -> Vec<String> {
        self.data
            .files
            .keys()
            .filter(|source| !Path::new(source).exists())
            .cloned()
            .collect()
    }

    /// Pages whose every source was deleted, plus pages in `extract_dir` the
    /// cache does not list
    pub fn find_orphaned_files(&self, extract_dir: &Path) -> Vec<PathBuf> {
        let mut live = BTreeSet::new();
        let mut dead = BTreeSet::new();
        for (source, entry) in &self.data.files {
            let target = if Path::new(source).exists() { &mut live } else { &mut dead };
            target.extend(entry.generated_files.iter().cloned());
        }

        let mut orphans: BTreeSet<PathBuf> = dead
            .difference(&live)
            .map(PathBuf::from)
            .filter(|path| path.exists())
            .collect();
        orphans.extend(self.untracked_pages(extract_dir));

        orphans.into_iter().collect()
    }

    /// Delete orphaned pages and forget deleted sources
    ///
    /// With `dry_run` nothing is touched; the return value is the number of
    /// pages that would be or were removed.
    pub fn prune_orphaned_files(&mut self, extract_dir: &Path, dry_run: bool) -> Result<usize> {
        let orphans = self.find_orphaned_files(extract_dir);

        if dry_run {
            for orphan in &orphans {
                info!("Would remove orphaned page {}", orphan.display());
            }
            return Ok(orphans.len());
        }

        let mut removed = 0;
        for orphan in &orphans {
            match std::fs::remove_file(orphan) {
                Ok(()) => {
                    info!("Removed orphaned page {}", orphan.display());
                    removed += 1;
                }
                Err(e) => warn!("Failed to remove orphaned page {}: {}", orphan.display(), e),
            }
        }

        for source in self.deleted_sources() {
            self.remove_file(Path::new(&source));
        }
        self.save()?;

        if removed > 0 {
            info!("Pruned {} orphaned pages", removed);
        }
        Ok(removed)
    }

    /// Compare the cache with what is actually in `extract_dir`
    pub fn verify_integrity(&self, extract_dir: &Path) -> IntegrityReport {
        let missing_outputs = self
            .data
            .files
            .values()
            .flat_map(|entry| entry.generated_files.iter())
            .filter(|output| !Path::new(output).exists())
            .map(PathBuf::from)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        IntegrityReport {
            missing_outputs,
            untracked_pages: self.untracked_pages(extract_dir),
        }
    }

    /// `.md` files directly in `extract_dir` no cached source generated
    fn untracked_pages(&self, extract_dir: &Path) -> Vec<PathBuf> {
        let tracked: BTreeSet<String> = self
            .data
            .files
            .values()
            .flat_map(|entry| entry.generated_files.iter())
            .filter_map(|output| Path::new(output).file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect();

        WalkDir::new(extract_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "md"))
            .filter(|path| {
                path.file_name()
                    .map(|name| !tracked.contains(name.to_string_lossy().as_ref()))
                    .unwrap_or(false)
            })
            .collect()
    }

    fn rebuild_reverse_map(&mut self) {
        self.output_to_source.clear();
        for (source, entry) in &self.data.files {
            for output in &entry.generated_files {
                self.output_to_source.insert(output.clone(), source.clone());
            }
        }
    }
}

fn key(path: &Path) -> String {
    path.display().to_string()
}

fn read_cache(path: &Path) -> Result<CacheData> {
    let content = std::fs::read_to_string(path)?;
    let data: CacheData = serde_json::from_str(&content)?;
    if data.version != CACHE_VERSION {
        return Err(DocwrightError::Cache(format!(
            "unsupported cache version {} (expected {})",
            data.version, CACHE_VERSION
        )));
    }
    Ok(data)
}

fn modified_time(path: &Path) -> Result<DateTime<Utc>> {
    Ok(DateTime::<Utc>::from(std::fs::metadata(path)?.modified()?))
}

fn file_hash(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(calculate_hash(&String::from_utf8_lossy(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use predicates::prelude::*;

    #[test]
    fn test_new_file_needs_extraction_until_recorded() {
        let temp = assert_fs::TempDir::new().unwrap();
        let source = temp.child("a.cpp");
        source.write_str("int a();").unwrap();
        let page = temp.child("out/a.md");
        page.write_str("# a").unwrap();

        let mut cache = DocumentationCache::load(temp.child("out").path());
        assert!(cache.needs_extraction(source.path()));

        cache
            .update_file(source.path(), &[page.path().to_path_buf()], 1, "cpp")
            .unwrap();
        assert!(!cache.needs_extraction(source.path()));
        assert_eq!(cache.stats(), CacheStats { files: 1, outputs: 1 });
        assert_eq!(cache.source_for_output(page.path()), Some(key(source.path()).as_str()));

        page.assert(predicate::path::exists());
        std::fs::remove_file(page.path()).unwrap();
        assert!(cache.needs_extraction(source.path()));
    }

    #[test]
    fn test_content_change_needs_extraction() {
        let temp = assert_fs::TempDir::new().unwrap();
        let source = temp.child("a.cpp");
        source.write_str("int a();").unwrap();

        let mut cache = DocumentationCache::load(temp.path());
        cache.update_file(source.path(), &[], 1, "cpp").unwrap();
        assert!(!cache.needs_extraction(source.path()));

        source.write_str("int a(int x);").unwrap();
        assert!(cache.needs_extraction(source.path()));
    }

    #[test]
    fn test_deleted_source_needs_nothing() {
        let temp = assert_fs::TempDir::new().unwrap();
        let cache = DocumentationCache::load(temp.path());
        assert!(!cache.needs_extraction(&temp.path().join("gone.cpp")));
    }

    #[test]
    fn test_save_and_reload() {
        let temp = assert_fs::TempDir::new().unwrap();
        let source = temp.child("a.cpp");
        source.write_str("int a();").unwrap();
        let out = temp.child("out");

        let mut cache = DocumentationCache::load(out.path());
        cache
            .update_file(source.path(), &[out.path().join("a.md")], 2, "cpp")
            .unwrap();
        cache.save().unwrap();
        out.child(CACHE_FILE_NAME).assert(predicate::str::contains("\"construct_count\": 2"));

        let reloaded = DocumentationCache::load(out.path());
        let entry = reloaded.entry(source.path()).unwrap();
        assert_eq!(entry.language, "cpp");
        assert_eq!(entry.content_hash, calculate_hash("int a();"));
        assert_eq!(reloaded.stats().outputs, 1);
        // The recorded page was never written
        assert!(reloaded.needs_extraction(source.path()));
    }

    #[test]
    fn test_corrupt_cache_loads_empty() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child(CACHE_FILE_NAME).write_str("{ not json").unwrap();

        let cache = DocumentationCache::load(temp.path());
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn test_orphans_and_prune() {
        let temp = assert_fs::TempDir::new().unwrap();
        let out = temp.child("out");
        let kept_source = temp.child("kept.cpp");
        kept_source.write_str("int k();").unwrap();
        let doomed_source = temp.child("doomed.cpp");
        doomed_source.write_str("int d();").unwrap();

        let kept_page = out.child("k.md");
        let doomed_page = out.child("d.md");
        let shared_page = out.child("shared.md");
        let stray_page = out.child("stray.md");
        for page in [&kept_page, &doomed_page, &shared_page, &stray_page] {
            page.write_str("# page").unwrap();
        }

        let mut cache = DocumentationCache::load(out.path());
        cache
            .update_file(
                kept_source.path(),
                &[kept_page.path().to_path_buf(), shared_page.path().to_path_buf()],
                2,
                "cpp",
            )
            .unwrap();
        cache
            .update_file(
                doomed_source.path(),
                &[doomed_page.path().to_path_buf(), shared_page.path().to_path_buf()],
                2,
                "cpp",
            )
            .unwrap();

        std::fs::remove_file(doomed_source.path()).unwrap();

        let orphans = cache.find_orphaned_files(out.path());
        assert_eq!(orphans, vec![doomed_page.path().to_path_buf(), stray_page.path().to_path_buf()]);

        assert_eq!(cache.prune_orphaned_files(out.path(), true).unwrap(), 2);
        doomed_page.assert(predicate::path::exists());

        assert_eq!(cache.prune_orphaned_files(out.path(), false).unwrap(), 2);
        doomed_page.assert(predicate::path::missing());
        stray_page.assert(predicate::path::missing());
        shared_page.assert(predicate::path::exists());
        kept_page.assert(predicate::path::exists());

        assert!(cache.entry(doomed_source.path()).is_none());
        assert_eq!(cache.source_for_output(shared_page.path()), Some(key(kept_source.path()).as_str()));
        assert!(cache.verify_integrity(out.path()).is_clean());
    }

    #[test]
    fn test_verify_integrity_reports_problems() {
        let temp = assert_fs::TempDir::new().unwrap();
        let source = temp.child("a.cpp");
        source.write_str("int a();").unwrap();
        let out = temp.child("out");
        out.child("extra.md").write_str("# extra").unwrap();

        let mut cache = DocumentationCache::load(out.path());
        cache
            .update_file(source.path(), &[out.path().join("a.md")], 1, "cpp")
            .unwrap();

        let report = cache.verify_integrity(out.path());
        assert_eq!(report.missing_outputs, vec![out.path().join("a.md")]);
        assert_eq!(report.untracked_pages, vec![out.path().join("extra.md")]);
        assert!(!report.is_clean());

        cache.clear();
        assert_eq!(cache.stats(), CacheStats::default());
    }
}
