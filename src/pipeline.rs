//! Command flows: read input, derive keys, normalize, write output.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::{info, warn};

use crate::bibtex::{parse_ris, BibEntry, Bibliography, RisFieldMap};
use crate::citekey::{self, CitekeyRequest, ExistingKeys};
use crate::config::{compress_user, Settings};
use crate::organizer::{export_library, ArticleInfo, ExportSort, FileMode, Library, LibraryEntry, Organizer};
use crate::registry::MetadataRegistry;
use crate::search::{Search, SearchQuery};
use crate::sync::{self, SyncAction};

/// Serialization used for printed or written entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Bibtex,
    Ris,
}

impl OutputFormat {
    pub fn render(self, entry: &BibEntry) -> String {
        match self {
            OutputFormat::Bibtex => entry.to_string(),
            OutputFormat::Ris => entry.to_ris(),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Bibtex => "bib",
            OutputFormat::Ris => "ris",
        }
    }
}

/// Where finished entries go.
#[derive(Debug, Clone, Default)]
pub struct Destination {
    pub format: OutputFormat,
    /// Write each entry to `<root>/<year>/<author>/<key>.<ext>`.
    pub library: bool,
    /// Bibliography whose keys are avoided.
    pub bib: Option<PathBuf>,
    /// Add entries to `bib` instead of printing them.
    pub append: bool,
}

/// Outcome of a batch over several inputs.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: Vec<(String, anyhow::Error)>,
}

impl BatchReport {
    pub fn record<T>(&mut self, item: &str, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => {
                self.succeeded += 1;
                Some(value)
            }
            Err(err) => {
                log::error!("{}: {:#}", item, err);
                self.failed.push((item.to_string(), err));
                None
            }
        }
    }

    /// Error when any input failed.
    pub fn finish(self) -> Result<()> {
        if self.failed.is_empty() {
            return Ok(());
        }
        let total = self.succeeded + self.failed.len();
        bail!("{} of {} inputs failed", self.failed.len(), total)
    }
}

/// Settings plus the organizer built from them.
pub struct Pipeline {
    settings: Settings,
    organizer: Organizer,
}

impl Pipeline {
    pub fn new(settings: Settings) -> Result<Self> {
        let organizer = Organizer::from_settings(&settings).context("Failed to load journal abbreviations")?;
        Ok(Self { settings, organizer })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn organizer(&self) -> &Organizer {
        &self.organizer
    }

    /// Keys to avoid for a destination: the target bibliography and, when
    /// writing into the library, every key already filed there.
    pub fn existing_keys(&self, destination: &Destination) -> Result<ExistingKeys> {
        let mut keys = ExistingKeys::new();
        if let Some(bib) = &destination.bib {
            let bibliography = Bibliography::load(bib)
                .with_context(|| format!("Failed to read bibliography {}", bib.display()))?;
            keys.merge(bibliography.keys());
        }
        if destination.library {
            let library = Library::scan(self.organizer.root())
                .with_context(|| format!("Failed to scan library {}", self.organizer.root().display()))?;
            keys.merge(library.keys());
        }
        Ok(keys)
    }

    /// Give an entry a fresh citekey and record it as taken.
    pub fn assign_key(entry: &mut BibEntry, existing: &mut ExistingKeys) -> Result<()> {
        let surname = entry
            .first_author_surname()
            .map(str::to_string)
            .with_context(|| format!("Entry {:?} has no author to build a citekey from", entry.key))?;
        let year = entry
            .year()
            .map(str::to_string)
            .with_context(|| format!("Entry {:?} has no year to build a citekey from", entry.key))?;
        let request = CitekeyRequest::new(&surname, &year).with_doi(entry.doi());
        let key = citekey::generate(&request, existing)?;
        if !entry.key.is_empty() && entry.key != key {
            info!("{} -> {}", entry.key, key);
        }
        existing.insert(key.clone(), entry.doi());
        entry.key = key;
        Ok(())
    }

    /// Normalize every entry of a BibTeX file and give each a new key.
    pub fn format_bibtex(&self, text: &str, existing: &mut ExistingKeys) -> Result<Vec<BibEntry>> {
        let bibliography = Bibliography::parse(text)?;
        self.keyed(bibliography.into_entries(), existing)
    }

    /// Convert a RIS file into keyed entries.
    pub fn convert_ris(&self, text: &str, existing: &mut ExistingKeys) -> Result<Vec<BibEntry>> {
        let entries = parse_ris(text, &RisFieldMap::default())?;
        self.keyed(entries, existing)
    }

    /// Keys are committed to `existing` only when the whole set succeeds.
    fn keyed(&self, mut entries: Vec<BibEntry>, existing: &mut ExistingKeys) -> Result<Vec<BibEntry>> {
        let mut staged = existing.clone();
        for entry in &mut entries {
            Self::assign_key(entry, &mut staged)?;
        }
        *existing = staged;
        Ok(entries)
    }

    /// Build a keyed entry from registry metadata.
    pub fn fetch_entry(
        &self,
        registry: &dyn MetadataRegistry,
        doi: &str,
        existing: &mut ExistingKeys,
    ) -> Result<BibEntry> {
        let metadata = registry
            .fetch(doi)
            .with_context(|| format!("{} lookup failed for {}", registry.name(), doi))?;
        let mut entry = metadata.to_entry()?;
        Self::assign_key(&mut entry, existing)?;
        Ok(entry)
    }

    /// Process one input file with `convert`, then write the result.
    pub fn process_file<F>(
        &self,
        path: &Path,
        destination: &Destination,
        existing: &mut ExistingKeys,
        cleanup: bool,
        convert: F,
    ) -> Result<Vec<BibEntry>>
    where
        F: Fn(&Self, &str, &mut ExistingKeys) -> Result<Vec<BibEntry>>,
    {
        let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let entries = convert(self, &text, existing).with_context(|| format!("In {}", path.display()))?;
        self.write_entries(&entries, destination)?;
        if cleanup {
            fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
            info!("Removed {}", path.display());
        }
        Ok(entries)
    }

    /// Print entries, or write them to the library and/or the target bibliography.
    pub fn write_entries(&self, entries: &[BibEntry], destination: &Destination) -> Result<()> {
        if destination.library {
            for entry in entries {
                let path = self
                    .organizer
                    .bibtex_path(entry)?
                    .with_extension(destination.format.extension());
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create {}", parent.display()))?;
                }
                fs::write(&path, destination.format.render(entry))
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!("  --> {}", compress_user(&path).display());
            }
        }
        if destination.append {
            let Some(bib) = &destination.bib else {
                bail!("--append needs a target bibliography (--bib)");
            };
            let mut bibliography = Bibliography::load(bib)
                .with_context(|| format!("Failed to read bibliography {}", bib.display()))?;
            for entry in entries {
                bibliography.upsert(entry.clone());
            }
            bibliography
                .save(bib)
                .with_context(|| format!("Failed to write bibliography {}", bib.display()))?;
        }
        if !destination.library && !destination.append {
            for entry in entries {
                println!("{}", destination.format.render(entry));
            }
        }
        Ok(())
    }

    /// File an article into the library tree.
    pub fn file_article(&self, source: &Path, article: &ArticleInfo, mode: FileMode) -> Result<PathBuf> {
        let target = self
            .organizer
            .file_article(source, article, mode)
            .with_context(|| format!("Failed to file {}", source.display()))?;
        Ok(target)
    }

    /// Metadata for filing, looked up by DOI.
    pub fn article_from_doi(&self, registry: &dyn MetadataRegistry, doi: &str) -> Result<ArticleInfo> {
        let metadata = registry
            .fetch(doi)
            .with_context(|| format!("{} lookup failed for {}", registry.name(), doi))?;
        let entry = metadata.to_entry()?;
        Ok(ArticleInfo::from_entry(&entry)?)
    }

    /// Scan the library tree, warning about files that could not be read.
    pub fn library(&self) -> Result<Library> {
        let library = Library::scan(self.organizer.root())
            .with_context(|| format!("Failed to scan library {}", self.organizer.root().display()))?;
        if !library.failures.is_empty() {
            warn!("{} library files could not be read", library.failures.len());
        }
        Ok(library)
    }

    /// Merge the library into one sorted bibliography.
    pub fn export(&self, sort: ExportSort) -> Result<(String, Library)> {
        let library = self.library()?;
        Ok((export_library(&library, sort), library))
    }

    /// Library entries matching the query.
    pub fn search(&self, query: &SearchQuery, reverse: bool) -> Result<(Vec<LibraryEntry>, usize)> {
        let search = Search::new(query)?;
        let library = self.library()?;
        let found = search.run(&library, reverse).into_iter().cloned().collect();
        Ok((found, library.entries.len()))
    }

    /// Plan copying the library to `directory`, or from it with `pull`.
    /// A relative `directory` is taken relative to the library root.
    pub fn plan_sync(&self, directory: &Path, pull: bool, clobber: bool) -> Result<Vec<SyncAction>> {
        let root = self.organizer.root();
        let other = root.join(directory);
        let (from, to) = if pull { (other.as_path(), root) } else { (root, other.as_path()) };
        info!("Syncing {} to {}", from.display(), to.display());
        Ok(sync::plan_sync(from, to, clobber)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn pipeline(root: &Path) -> Pipeline {
        let settings = Settings {
            library_root: root.to_string_lossy().to_string(),
            ..Settings::default()
        };
        Pipeline::new(settings).unwrap()
    }

    #[test]
    fn test_format_assigns_distinct_keys() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(dir.path());
        let mut existing: ExistingKeys = ["Rignot2008"].into_iter().collect();
        let entries = pipeline
            .format_bibtex(
                "@article{a, author = {Rignot, E.}, year = 2008}\n@article{b, author = {Eric Rignot}, year = 2008}",
                &mut existing,
            )
            .unwrap();
        let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, ["Rignot2008a", "Rignot2008b"]);
        assert!(existing.contains("Rignot2008b"));
    }

    #[test]
    fn test_failed_file_does_not_consume_keys() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(dir.path());
        let mut existing = ExistingKeys::new();
        let result = pipeline.format_bibtex(
            "@article{a, author = {Rignot, E.}, year = 2008}\n@article{b, title = {No author}, year = 2008}",
            &mut existing,
        );
        assert!(result.is_err());
        assert!(existing.is_empty());
    }

    #[test]
    fn test_write_to_library_and_bib() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("papers");
        let pipeline = pipeline(&root);
        let bib = dir.path().join("refs.bib");
        let destination = Destination {
            library: true,
            bib: Some(bib.clone()),
            append: true,
            ..Destination::default()
        };
        let mut existing = pipeline.existing_keys(&destination).unwrap();
        let entries = pipeline
            .convert_ris("TY  - JOUR\nAU  - Rignot, E.\nPY  - 2008\nER  -\n", &mut existing)
            .unwrap();
        pipeline.write_entries(&entries, &destination).unwrap();

        assert!(root.join("2008/Rignot/Rignot2008.bib").is_file());
        let written = Bibliography::load(&bib).unwrap();
        assert!(written.get("Rignot2008").is_some());

        // A second run sees the filed key
        let existing = pipeline.existing_keys(&destination).unwrap();
        assert!(existing.contains("Rignot2008"));
    }

    #[test]
    fn test_batch_report() {
        let mut report = BatchReport::default();
        assert_eq!(report.record("a", Ok(1)), Some(1));
        assert_eq!(report.record::<i32>("b", Err(anyhow::anyhow!("boom"))), None);
        let err = report.finish().unwrap_err();
        assert_eq!(err.to_string(), "1 of 2 inputs failed");
    }

    #[test]
    fn test_search_filed_entries() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(dir.path());
        let destination = Destination { library: true, ..Destination::default() };
        let mut existing = ExistingKeys::new();
        let entries = pipeline
            .format_bibtex(
                "@article{a, author = {Rignot, E.}, journal = {Nature Geoscience}, year = 2008}\n\
                 @article{b, author = {Cuffey, K. M.}, year = 2010}",
                &mut existing,
            )
            .unwrap();
        pipeline.write_entries(&entries, &destination).unwrap();

        let query = SearchQuery { journals: vec!["nature".into()], ..SearchQuery::default() };
        let (found, queried) = pipeline.search(&query, false).unwrap();
        assert_eq!(queried, 2);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].entry.key, "Rignot2008");
    }

    #[test]
    fn test_plan_sync_relative_to_library_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("library");
        fs::create_dir_all(root.join("2008/Rignot")).unwrap();
        fs::write(root.join("2008/Rignot/Rignot-2008.bib"), "@article{}").unwrap();
        let pipeline = pipeline(&root);

        let push = pipeline.plan_sync(Path::new("../backup"), false, false).unwrap();
        assert_eq!(push.len(), 1);
        assert_eq!(push[0].target, root.join("../backup").join("2008/Rignot/Rignot-2008.bib"));

        assert!(pipeline.plan_sync(Path::new("../backup"), true, false).is_err());
    }
}
