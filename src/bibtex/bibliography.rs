use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;

use log::{debug, info};
use tempfile::NamedTempFile;

use crate::bibtex::entry::BibEntry;
use crate::bibtex::parser::{parse_blocks, Block};
use crate::citekey::ExistingKeys;
use crate::error::{RefError, Result};

/// Bibliography collection
#[derive(Default, Clone)]
pub struct Bibliography {
    entries: Vec<BibEntry>,
    directives: Vec<String>,
}

impl fmt::Debug for Bibliography {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bibliography")
            .field("entries_count", &self.entries.len())
            .field("directives_count", &self.directives.len())
            .field("entries", &self.entries)
            .finish()
    }
}

impl Bibliography {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the text of a BibTeX file.
    pub fn parse(text: &str) -> Result<Self> {
        let mut bibliography = Self::new();
        for block in parse_blocks(text)? {
            match block {
                Block::Entry(entry) => bibliography.push(entry),
                Block::Directive(directive) => bibliography.directives.push(directive),
            }
        }
        Ok(bibliography)
    }

    /// Load a BibTeX file. A file that does not exist yet is an empty bibliography.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("Bibliography {} does not exist yet", path.display());
            return Ok(Self::new());
        }
        let text = fs::read_to_string(path).map_err(|e| RefError::fs(path, e))?;
        let bibliography = Self::parse(&text)?;
        info!("Loaded {} entries from {}", bibliography.len(), path.display());
        Ok(bibliography)
    }

    /// Write the whole file through a temporary file in the same directory.
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(|e| RefError::fs(parent, e))?;
        let mut file = NamedTempFile::new_in(parent).map_err(|e| RefError::fs(parent, e))?;
        file.write_all(self.to_string().as_bytes())
            .map_err(|e| RefError::fs(file.path(), e))?;
        file.persist(path).map_err(|e| RefError::fs(path, e.error))?;
        info!("Wrote {} entries to {}", self.len(), path.display());
        Ok(())
    }

    pub fn push(&mut self, entry: BibEntry) {
        self.entries.push(entry);
    }

    /// Replace the entry with the same key, or append.
    pub fn upsert(&mut self, entry: BibEntry) {
        match self.entries.iter_mut().find(|existing| existing.key == entry.key) {
            Some(existing) => {
                debug!("Replacing entry {}", entry.key);
                *existing = entry;
            }
            None => self.entries.push(entry),
        }
    }

    pub fn get(&self, key: &str) -> Option<&BibEntry> {
        self.entries.iter().find(|entry| entry.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BibEntry> {
        self.entries.iter()
    }

    pub fn into_entries(self) -> Vec<BibEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn directives(&self) -> &[String] {
        &self.directives
    }

    /// Citekeys in use, with the DOI of each entry.
    pub fn keys(&self) -> ExistingKeys {
        let mut keys = ExistingKeys::new();
        for entry in &self.entries {
            keys.insert(entry.key.clone(), entry.doi());
        }
        keys
    }
}

impl fmt::Display for Bibliography {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for directive in &self.directives {
            writeln!(f, "{directive}\n")?;
        }
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}
