// src/core/engine.rs
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use super::{
    construct_filename, merge_duplicate_constructs, CodeParser, Construct, DocumentationCache,
    Grammar, MarkdownEmitter,
};

/// Counters reported at the end of an extraction run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub files_discovered: usize,
    pub files_extracted: usize,
    pub files_unchanged: usize,
    pub files_failed: usize,
    pub constructs: usize,
    pub conflicts: usize,
    pub pages_written: usize,
    pub pages_pruned: usize,
}

/// A file that went through the parser during this run
struct ExtractedFile {
    path: PathBuf,
    language: String,
    construct_count: usize,
}

/// Main orchestration engine for docwright
pub struct Engine {
    config: Config,
    parser: CodeParser,
    emitter: MarkdownEmitter,
}

impl Engine {
    pub fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load_or_default(config_path)?;
        debug!("Loaded configuration: {:?}", config);
        Self::with_config(config)
    }

    pub fn with_config(config: Config) -> Result<Self> {
        let parser = CodeParser::new(&config);
        if parser.registry().is_empty() {
            warn!("No usable languages configured, nothing will be extracted");
        }
        let emitter = MarkdownEmitter::new(&config.output)?;

        Ok(Self {
            config,
            parser,
            emitter,
        })
    }

    /// Extract documentation pages for changed sources
    ///
    /// `source` may be a file or a directory; without it every configured
    /// source directory is processed. Unchanged files are skipped unless
    /// `force` is set. With `comments`, pages are written per comment block
    /// instead of per construct.
    pub fn extract(
        &self,
        source: Option<PathBuf>,
        extract_dir: Option<PathBuf>,
        comments: bool,
        force: bool,
    ) -> Result<ExtractSummary> {
        let extract_dir = extract_dir.unwrap_or_else(|| self.config.project.extract_dir.clone());
        std::fs::create_dir_all(&extract_dir)
            .with_context(|| format!("Failed to create {}", extract_dir.display()))?;

        info!("🔍 Extracting documentation into {}", extract_dir.display());

        let mut summary = ExtractSummary::default();
        let mut cache = DocumentationCache::load(&extract_dir);
        summary.pages_pruned = self.repair_cache(&mut cache, &extract_dir)?;

        let files = self.discover_sources(source)?;
        summary.files_discovered = files.len();

        let mut pending = Vec::new();
        for file in files {
            if !force && !cache.needs_extraction(&file) {
                debug!("{} is unchanged, skipping", file.display());
                summary.files_unchanged += 1;
            } else {
                pending.push(file);
            }
        }

        if comments {
            self.extract_comment_pages(&pending, &extract_dir, &mut cache, &mut summary)?;
        } else {
            self.extract_construct_pages(&pending, &extract_dir, &mut cache, &mut summary)?;
        }

        cache.save().context("Failed to save cache")?;

        let stats = cache.stats();
        info!("📊 Extraction complete:");
        info!("  - {} files discovered, {} unchanged", summary.files_discovered, summary.files_unchanged);
        info!("  - {} files extracted, {} failed", summary.files_extracted, summary.files_failed);
        info!("  - {} constructs, {} merge conflicts", summary.constructs, summary.conflicts);
        info!("  - {} pages written, {} pruned", summary.pages_written, summary.pages_pruned);
        debug!("Cache tracks {} files and {} pages", stats.files, stats.outputs);

        Ok(summary)
    }

    fn extract_construct_pages(
        &self,
        files: &[PathBuf],
        extract_dir: &Path,
        cache: &mut DocumentationCache,
        summary: &mut ExtractSummary,
    ) -> Result<()> {
        let mut extracted = Vec::new();
        let mut constructs = Vec::new();
        let mut file_conflicts = 0;

        for file in files {
            match self.parser.parse_file(file) {
                Ok(parsed) => {
                    debug!("{}: {} constructs", file.display(), parsed.constructs.len());
                    extracted.push(ExtractedFile {
                        path: parsed.path,
                        language: parsed.language,
                        construct_count: parsed.constructs.len(),
                    });
                    file_conflicts += parsed.conflicts.len();
                    constructs.extend(parsed.constructs);
                }
                Err(e) => {
                    warn!("Skipping {}: {}", file.display(), e);
                    summary.files_failed += 1;
                }
            }
        }

        // Declarations and definitions in different files collapse here
        let conflicts = merge_duplicate_constructs(&mut constructs);
        summary.conflicts = file_conflicts + conflicts.len();
        summary.constructs = constructs.len();

        let written = self.emitter.write_constructs(&constructs, extract_dir)?;
        summary.pages_written = written.len();
        let outputs = pages_by_source(&constructs, &written, extract_dir);

        for file in extracted {
            let key = file.path.display().to_string();
            let pages = outputs.get(&key).map(Vec::as_slice).unwrap_or_default();
            match cache.update_file(&file.path, pages, file.construct_count, &file.language) {
                Ok(()) => summary.files_extracted += 1,
                Err(e) => warn!("Failed to record {} in cache: {}", file.path.display(), e),
            }
        }

        Ok(())
    }

    fn extract_comment_pages(
        &self,
        files: &[PathBuf],
        extract_dir: &Path,
        cache: &mut DocumentationCache,
        summary: &mut ExtractSummary,
    ) -> Result<()> {
        for file in files {
            let blocks = match self.parser.parse_comments(file) {
                Ok(blocks) => blocks,
                Err(e) => {
                    warn!("Skipping {}: {}", file.display(), e);
                    summary.files_failed += 1;
                    continue;
                }
            };

            let pages = self.emitter.write_comment_blocks(&blocks, extract_dir)?;
            summary.pages_written += pages.len();

            let language = self
                .parser
                .registry()
                .resolve(file)
                .map(|info| info.name.clone())
                .unwrap_or_default();
            match cache.update_file(file, &pages, blocks.len(), &language) {
                Ok(()) => summary.files_extracted += 1,
                Err(e) => warn!("Failed to record {} in cache: {}", file.display(), e),
            }
        }

        Ok(())
    }

    /// Prune orphans when the cache and the extract directory disagree
    fn repair_cache(&self, cache: &mut DocumentationCache, extract_dir: &Path) -> Result<usize> {
        let report = cache.verify_integrity(extract_dir);
        if !report.is_clean() {
            warn!(
                "Cache out of sync with {}: {} missing pages, {} untracked pages",
                extract_dir.display(),
                report.missing_outputs.len(),
                report.untracked_pages.len()
            );
        }

        if report.untracked_pages.is_empty() && cache.deleted_sources().is_empty() {
            return Ok(0);
        }

        cache
            .prune_orphaned_files(extract_dir, false)
            .context("Failed to prune orphaned pages")
    }

    fn discover_sources(&self, source: Option<PathBuf>) -> Result<Vec<PathBuf>> {
        let roots = match source {
            Some(path) => vec![path],
            None => self.config.project.source_dirs.clone(),
        };

        let mut files = Vec::new();
        let mut seen = HashSet::new();
        for root in roots {
            if !root.exists() {
                warn!("Source path {} does not exist, skipping", root.display());
                continue;
            }

            match self.parser.discover(&root) {
                Ok(found) => files.extend(found.into_iter().filter(|f| seen.insert(f.clone()))),
                Err(e) => warn!("Failed to scan {}: {}", root.display(), e),
            }
        }

        Ok(files)
    }

    /// Extract, then copy every page into the output directory
    pub fn generate(
        &self,
        source: Option<PathBuf>,
        extract_dir: Option<PathBuf>,
        output: Option<PathBuf>,
        force: bool,
    ) -> Result<usize> {
        let extract_dir = extract_dir.unwrap_or_else(|| self.config.project.extract_dir.clone());
        let output_dir = output.unwrap_or_else(|| self.config.project.output_dir.clone());

        self.extract(source, Some(extract_dir.clone()), false, force)?;

        std::fs::create_dir_all(&output_dir)
            .with_context(|| format!("Failed to create {}", output_dir.display()))?;

        let mut copied = 0;
        for page in markdown_pages(&extract_dir) {
            let Some(name) = page.file_name() else { continue };
            let target = output_dir.join(name);
            match std::fs::copy(&page, &target) {
                Ok(_) => copied += 1,
                Err(e) => warn!("Failed to copy {} to {}: {}", page.display(), target.display(), e),
            }
        }

        info!("📝 Copied {} pages to {}", copied, output_dir.display());
        Ok(copied)
    }

    /// Remove pages whose sources are gone, or list them with `dry_run`
    pub fn prune(&self, extract_dir: Option<PathBuf>, dry_run: bool) -> Result<usize> {
        let extract_dir = extract_dir.unwrap_or_else(|| self.config.project.extract_dir.clone());
        let mut cache = DocumentationCache::load(&extract_dir);

        let count = cache.prune_orphaned_files(&extract_dir, dry_run)?;
        if dry_run {
            info!("{} orphaned pages would be removed", count);
        } else if count == 0 {
            info!("No orphaned pages found");
        }
        Ok(count)
    }

    /// Print the built-in grammars and the configured languages
    pub fn list_parsers(&self) {
        println!("Built-in grammars:");
        for grammar in Grammar::ALL {
            println!("  {:<6} ({})", grammar.id(), grammar.source());
        }

        println!();
        println!("Configured languages:");
        for language in self.parser.registry().languages() {
            let extensions: Vec<String> =
                language.extensions.iter().map(|ext| format!(".{}", ext)).collect();
            println!(
                "  {:<10} grammar={:<4} style={:<8} {}",
                language.name,
                language.grammar.id(),
                language.comment_style.as_config(),
                extensions.join(" ")
            );
        }
    }

    /// Write the default configuration to `path`, refusing to overwrite
    pub fn init_config(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("{} already exists", path.display());
        }

        Config::default()
            .save(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("✅ Wrote default configuration to {}", path.display());
        Ok(())
    }
}

/// Pages written for each source file, keyed by the file's display path
///
/// A merged construct's page belongs to every file it was seen in.
fn pages_by_source(
    constructs: &[Construct],
    written: &[PathBuf],
    extract_dir: &Path,
) -> BTreeMap<String, Vec<PathBuf>> {
    let written: HashSet<&PathBuf> = written.iter().collect();
    let mut outputs: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();

    for construct in constructs {
        let page = extract_dir.join(construct_filename(construct));
        if !written.contains(&page) {
            continue;
        }

        for source in construct_sources(construct) {
            let pages = outputs.entry(source).or_default();
            if !pages.contains(&page) {
                pages.push(page.clone());
            }
        }
    }

    outputs
}

fn construct_sources(construct: &Construct) -> Vec<String> {
    if construct.source_locations.is_empty() {
        return vec![construct.source_file.clone()];
    }

    let mut sources: Vec<String> = Vec::new();
    for location in &construct.source_locations {
        let file = location
            .rsplit_once(':')
            .map(|(file, _)| file)
            .unwrap_or(location.as_str())
            .to_string();
        if !sources.contains(&file) {
            sources.push(file);
        }
    }
    sources
}

fn markdown_pages(dir: &Path) -> Vec<PathBuf> {
    let mut pages: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "md"))
        .collect();
    pages.sort();
    pages
}
