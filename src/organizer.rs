use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::bibtex::{collapse_whitespace, BibEntry, Bibliography};
use crate::citekey::ExistingKeys;
use crate::config::{compress_user, placeholders, Settings, TEMPLATE_PLACEHOLDERS};
use crate::error::{RefError, Result};
use crate::transliteration;

/// Journal name to abbreviation table.
#[derive(Debug, Clone, Default)]
pub struct Abbreviations {
    names: HashMap<String, String>,
}

fn journal_lookup_key(journal: &str) -> String {
    collapse_whitespace(journal).to_lowercase()
}

impl Abbreviations {
    /// Parse `Full Journal Name = Abbrev.` lines; `#` starts a comment line.
    pub fn parse(text: &str) -> Self {
        let mut names = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.split_once('=') {
                Some((name, abbreviation)) if !abbreviation.trim().is_empty() => {
                    names.insert(journal_lookup_key(name), abbreviation.trim().to_string());
                }
                _ => debug!("Skipping abbreviation line {:?}", line),
            }
        }
        Self { names }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| RefError::fs(path, e))?;
        let abbreviations = Self::parse(&text);
        debug!("Loaded {} journal abbreviations from {}", abbreviations.len(), path.display());
        Ok(abbreviations)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn lookup(&self, journal: &str) -> Option<&str> {
        self.names.get(&journal_lookup_key(journal)).map(String::as_str)
    }

    /// Abbreviation for a journal, or the journal name itself when unknown.
    pub fn abbreviate(&self, journal: &str) -> String {
        match self.lookup(journal) {
            Some(abbreviation) => abbreviation.to_string(),
            None => {
                info!("Abbreviation for {} not found", journal);
                journal.to_string()
            }
        }
    }
}

/// What to file and under which metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleInfo {
    /// First-author surname, in Unicode or LaTeX form.
    pub author: String,
    pub year: String,
    pub journal: String,
    pub volume: String,
    pub number: String,
    pub supplement: bool,
}

impl ArticleInfo {
    pub fn from_entry(entry: &BibEntry) -> Result<Self> {
        let author = entry
            .first_author_surname()
            .ok_or_else(|| RefError::InvalidInput(format!("entry {} has no author", entry.key)))?;
        let year = entry
            .year()
            .ok_or_else(|| RefError::InvalidInput(format!("entry {} has no year", entry.key)))?;
        let journal = entry
            .text("journal")
            .or_else(|| entry.text("booktitle"))
            .or_else(|| entry.text("publisher"))
            .unwrap_or_default();
        Ok(Self {
            author: author.to_string(),
            year: year.to_string(),
            journal: transliteration::to_unicode(&journal),
            volume: entry.text("volume").unwrap_or_default(),
            number: entry.text("number").unwrap_or_default(),
            supplement: false,
        })
    }
}

/// Whether the source file stays in place after filing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Copy,
    Move,
}

/// Directory name for an author: combining accents, underscores for
/// spaces, no hyphens or apostrophes.
pub fn author_directory(surname: &str) -> String {
    transliteration::to_combining(surname.trim())
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| !matches!(c, '-' | '\'' | '/'))
        .collect()
}

fn check_year(year: &str) -> Result<()> {
    if year.len() == 4 && year.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(RefError::InvalidInput(format!("year must be four digits, got {year:?}")))
    }
}

/// Computes locations inside the managed article tree.
#[derive(Debug, Clone)]
pub struct Organizer {
    root: PathBuf,
    template: String,
    abbreviations: Abbreviations,
}

impl Organizer {
    pub fn new(root: impl Into<PathBuf>, template: impl Into<String>, abbreviations: Abbreviations) -> Self {
        Self {
            root: root.into(),
            template: template.into(),
            abbreviations,
        }
    }

    /// Organizer for the configured library, loading the abbreviation file if one is set.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let abbreviations = match settings.abbreviations_path() {
            Some(path) => Abbreviations::load(&path)?,
            None => Abbreviations::default(),
        };
        Ok(Self::new(settings.library_root(), settings.filename_template.clone(), abbreviations))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<year>/<author dir>[/Supplemental]`
    pub fn article_directory(&self, article: &ArticleInfo) -> Result<PathBuf> {
        check_year(&article.year)?;
        let author = author_directory(&article.author);
        if author.is_empty() {
            return Err(RefError::InvalidInput("author is empty".to_string()));
        }
        let mut directory = self.root.join(&article.year).join(author);
        if article.supplement {
            directory.push("Supplemental");
        }
        Ok(directory)
    }

    /// Fill the filename template for an article.
    pub fn file_name(&self, article: &ArticleInfo, extension: &str) -> Result<String> {
        let underscored = |text: &str| collapse_whitespace(text).replace([' ', '/'], "_");
        let abbreviation = if article.journal.is_empty() {
            String::new()
        } else {
            self.abbreviations.abbreviate(&article.journal)
        };
        let extension = match extension.trim_start_matches('.') {
            "" => ".pdf".to_string(),
            ext => format!(".{ext}"),
        };

        let mut name = self.template.clone();
        for placeholder in placeholders(&self.template) {
            let value = match placeholder {
                "author" => author_directory(&article.author),
                "journal" => underscored(&article.journal),
                "abbreviation" => underscored(&abbreviation),
                "volume" => article.volume.trim().to_string(),
                "number" => article.number.trim().to_string(),
                "year" => article.year.clone(),
                "ext" => extension.clone(),
                other => {
                    return Err(RefError::Config(format!(
                        "unknown placeholder {{{}}} in filename_template (expected one of {})",
                        other,
                        TEMPLATE_PLACEHOLDERS.join(", ")
                    )))
                }
            };
            name = name.replace(&format!("{{{placeholder}}}"), &value);
        }
        Ok(name)
    }

    /// Full target path before uniqueness is applied.
    pub fn article_path(&self, article: &ArticleInfo, extension: &str) -> Result<PathBuf> {
        Ok(self.article_directory(article)?.join(self.file_name(article, extension)?))
    }

    /// Copy or move an article into the tree, returning where it landed.
    pub fn file_article(&self, source: &Path, article: &ArticleInfo, mode: FileMode) -> Result<PathBuf> {
        if !source.is_file() {
            return Err(RefError::fs(
                source,
                io::Error::new(io::ErrorKind::NotFound, "article file not found"),
            ));
        }
        let extension = source.extension().and_then(|e| e.to_str()).unwrap_or("pdf");
        let target = self.article_path(article, extension)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| RefError::fs(parent, e))?;
        }

        let mut input = File::open(source).map_err(|e| RefError::fs(source, e))?;
        let target = copy_to_unique(&mut input, &target)?;
        if mode == FileMode::Move {
            fs::remove_file(source).map_err(|e| RefError::fs(source, e))?;
        }
        info!("{} -> {}", source.display(), compress_user(&target).display());
        Ok(target)
    }

    /// `<root>/<year>/<author dir>/<citekey>.bib`
    pub fn bibtex_path(&self, entry: &BibEntry) -> Result<PathBuf> {
        let article = ArticleInfo::from_entry(entry)?;
        Ok(self.article_directory(&article)?.join(format!("{}.bib", entry.key)))
    }
}

/// Create a file that did not exist before, adding `-1`, `-2`, ... to the
/// stem until the name is free.
pub fn create_unique(path: &Path) -> Result<(File, PathBuf)> {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file").to_string();
    let extension = path.extension().and_then(|e| e.to_str()).map(|e| format!(".{e}"));
    let mut candidate = path.to_path_buf();
    let mut counter = 1;
    loop {
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(file) => return Ok((file, candidate)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!("{} exists", candidate.display());
                candidate = path.with_file_name(format!(
                    "{}-{}{}",
                    stem,
                    counter,
                    extension.as_deref().unwrap_or("")
                ));
                counter += 1;
            }
            Err(e) => return Err(RefError::fs(&candidate, e)),
        }
    }
}

/// Copy `input` into a new file at `path` (or its `-N` variant). A failed
/// copy removes the partial file.
pub fn copy_to_unique(input: &mut impl Read, path: &Path) -> Result<PathBuf> {
    let (mut output, target) = create_unique(path)?;
    if let Err(e) = io::copy(input, &mut output) {
        drop(output);
        if let Err(remove) = fs::remove_file(&target) {
            warn!("Could not remove partial copy {}: {}", target.display(), remove);
        }
        return Err(RefError::fs(&target, e));
    }
    Ok(target)
}

/// One entry found in the library tree.
#[derive(Debug, Clone)]
pub struct LibraryEntry {
    pub path: PathBuf,
    pub year_dir: String,
    pub entry: BibEntry,
}

/// Contents of all per-article `.bib` files under the library root.
#[derive(Debug, Default)]
pub struct Library {
    pub entries: Vec<LibraryEntry>,
    /// Files that could not be read or parsed.
    pub failures: Vec<(PathBuf, RefError)>,
}

impl Library {
    /// Scan `<root>/<year>/<author>/*.bib`.
    pub fn scan(root: &Path) -> Result<Self> {
        let mut library = Self::default();
        if !root.is_dir() {
            warn!("Library root {} does not exist", root.display());
            return Ok(library);
        }

        let mut files: Vec<PathBuf> = WalkDir::new(root)
            .min_depth(3)
            .max_depth(3)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry.file_type().is_file()
                    && entry.path().extension().is_some_and(|ext| ext == "bib")
            })
            .map(|entry| entry.into_path())
            .collect();
        files.sort();

        for path in files {
            let year_dir = path
                .parent()
                .and_then(Path::parent)
                .and_then(Path::file_name)
                .and_then(|name| name.to_str())
                .unwrap_or_default()
                .to_string();
            if year_dir.is_empty() || !year_dir.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .map_err(|e| RefError::fs(&path, e))
                .and_then(|text| Bibliography::parse(&text));
            match parsed {
                Ok(bibliography) => {
                    for entry in bibliography.into_entries() {
                        library.entries.push(LibraryEntry {
                            path: path.clone(),
                            year_dir: year_dir.clone(),
                            entry,
                        });
                    }
                }
                Err(err) => {
                    warn!("Skipping {}: {}", path.display(), err);
                    library.failures.push((path, err));
                }
            }
        }
        info!("Found {} entries under {}", library.entries.len(), root.display());
        Ok(library)
    }

    pub fn keys(&self) -> ExistingKeys {
        let mut keys = ExistingKeys::new();
        for item in &self.entries {
            keys.insert(item.entry.key.clone(), item.entry.doi());
        }
        keys
    }
}

/// Ordering for an exported library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportSort {
    #[default]
    Key,
    Year,
    Type,
}

/// Merge every library entry into one BibTeX document.
pub fn export_library(library: &Library, sort: ExportSort) -> String {
    let mut entries: Vec<&LibraryEntry> = library.entries.iter().collect();
    entries.sort_by(|a, b| {
        let primary = match sort {
            ExportSort::Key => std::cmp::Ordering::Equal,
            ExportSort::Year => a.year_dir.cmp(&b.year_dir),
            ExportSort::Type => a.entry.entry_type.cmp(&b.entry.entry_type),
        };
        primary.then_with(|| a.entry.key.to_lowercase().cmp(&b.entry.key.to_lowercase()))
    });
    render_entries(&entries)
}

/// `%% Number of Entries: N` followed by the entries in the given order.
pub fn render_entries(entries: &[&LibraryEntry]) -> String {
    let mut out = format!("%% Number of Entries: {}\n", entries.len());
    for item in entries {
        out.push('\n');
        out.push_str(&item.entry.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ABBREVIATIONS: &str = "# Web of Science style\nNATURE GEOSCIENCE = Nat. Geosci.\nJournal of Glaciology = J. Glaciol.\nbroken line\n";

    fn organizer(root: &Path) -> Organizer {
        Organizer::new(
            root,
            "{author}_{abbreviation}-{volume}_{year}{ext}",
            Abbreviations::parse(ABBREVIATIONS),
        )
    }

    fn rignot() -> ArticleInfo {
        ArticleInfo {
            author: "Rignot".into(),
            year: "2008".into(),
            journal: "Nature  Geoscience".into(),
            volume: "1".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_abbreviation_lookup() {
        let abbreviations = Abbreviations::parse(ABBREVIATIONS);
        assert_eq!(abbreviations.len(), 2);
        assert_eq!(abbreviations.lookup("Nature Geoscience"), Some("Nat. Geosci."));
        assert_eq!(abbreviations.abbreviate("The Cryosphere"), "The Cryosphere");
    }

    #[test]
    fn test_author_directory() {
        assert_eq!(author_directory("van den Broeke"), "van_den_Broeke");
        assert_eq!(author_directory("O'Neel"), "ONeel");
        assert_eq!(author_directory("Müller-Stoffels"), "Mu\u{0308}llerStoffels");
        assert_eq!(author_directory("K{\\\"a}{\\\"a}b"), "Ka\u{0308}a\u{0308}b");
    }

    #[test]
    fn test_article_path() {
        let organizer = organizer(Path::new("/papers"));
        assert_eq!(
            organizer.article_path(&rignot(), "pdf").unwrap(),
            PathBuf::from("/papers/2008/Rignot/Rignot_Nat._Geosci.-1_2008.pdf")
        );
        let supplement = ArticleInfo { supplement: true, ..rignot() };
        assert_eq!(
            organizer.article_path(&supplement, ".pdf").unwrap(),
            PathBuf::from("/papers/2008/Rignot/Supplemental/Rignot_Nat._Geosci.-1_2008.pdf")
        );
        let bad_year = ArticleInfo { year: "08".into(), ..rignot() };
        assert!(matches!(organizer.article_path(&bad_year, "pdf"), Err(RefError::InvalidInput(_))));
    }

    #[test]
    fn test_file_article_adds_counter() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("papers");
        let organizer = organizer(&root);
        let source = dir.path().join("download.pdf");

        fs::write(&source, b"%PDF-1.4 first").unwrap();
        let first = organizer.file_article(&source, &rignot(), FileMode::Copy).unwrap();
        assert_eq!(first, root.join("2008/Rignot/Rignot_Nat._Geosci.-1_2008.pdf"));
        assert!(source.exists());

        let second = organizer.file_article(&source, &rignot(), FileMode::Move).unwrap();
        assert_eq!(second, root.join("2008/Rignot/Rignot_Nat._Geosci.-1_2008-1.pdf"));
        assert!(!source.exists());
        assert_eq!(fs::read(&second).unwrap(), b"%PDF-1.4 first");
    }

    struct FailingReader {
        sent: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.sent {
                return Err(io::Error::new(io::ErrorKind::Other, "device went away"));
            }
            self.sent = true;
            buf[..4].copy_from_slice(b"%PDF");
            Ok(4)
        }
    }

    #[test]
    fn test_failed_copy_leaves_no_partial_file() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("Rignot_Nat._Geosci.-1_2008.pdf");
        let err = copy_to_unique(&mut FailingReader { sent: false }, &target).unwrap_err();
        assert!(matches!(err, RefError::FileSystem { ref path, .. } if path == &target));
        assert!(!target.exists());

        let copied = copy_to_unique(&mut &b"%PDF-1.4"[..], &target).unwrap();
        assert_eq!(copied, target);
        assert_eq!(fs::read(&target).unwrap(), b"%PDF-1.4");
    }

    #[test]
    fn test_missing_source_is_file_system_error() {
        let dir = TempDir::new().unwrap();
        let organizer = organizer(dir.path());
        let err = organizer
            .file_article(&dir.path().join("absent.pdf"), &rignot(), FileMode::Copy)
            .unwrap_err();
        assert!(matches!(err, RefError::FileSystem { .. }));
    }

    #[test]
    fn test_scan_and_export() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("2012/Box")).unwrap();
        fs::create_dir_all(root.join("2008/Rignot")).unwrap();
        fs::create_dir_all(root.join("notes/Misc")).unwrap();
        fs::write(
            root.join("2012/Box/Box2012.bib"),
            "@article{Box2012,\nauthor = {Box, J. E.},\nyear = {2012},\n}\n",
        )
        .unwrap();
        fs::write(
            root.join("2008/Rignot/Rignot2008.bib"),
            "@book{Rignot2008,\nauthor = {Rignot, E.},\nyear = {2008},\ndoi = {10.1038/ngeo102},\n}\n",
        )
        .unwrap();
        fs::write(root.join("2008/Rignot/broken.bib"), "@article{Broken2008,\nyear = {2008},\n").unwrap();
        fs::write(root.join("notes/Misc/x.bib"), "@misc{Ignored2000, year = {2000}}").unwrap();

        let library = Library::scan(root).unwrap();
        assert_eq!(library.entries.len(), 2);
        assert_eq!(library.failures.len(), 1);
        assert!(library.keys().contains("Rignot2008"));

        let by_key = export_library(&library, ExportSort::Key);
        assert!(by_key.starts_with("%% Number of Entries: 2\n\n@article{Box2012,"));
        let by_year = export_library(&library, ExportSort::Year);
        assert!(by_year.starts_with("%% Number of Entries: 2\n\n@book{Rignot2008,"));
    }
}
