use log::debug;
use regex::{Regex, RegexBuilder};

use crate::bibtex::{normalize_doi, BibEntry};
use crate::error::{RefError, Result};
use crate::organizer::{Library, LibraryEntry};
use crate::transliteration;

/// Search terms. Each list is an alternation of case-insensitive regular
/// expressions; an empty list places no constraint.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub authors: Vec<String>,
    /// Only match `authors` against the first author
    pub first_author_only: bool,
    /// Patterns for the whole year directory name
    pub years: Vec<String>,
    pub journals: Vec<String>,
    /// Matched against the title and the keywords
    pub keywords: Vec<String>,
    pub dois: Vec<String>,
}

/// A compiled query.
#[derive(Debug)]
pub struct Search {
    author: Option<Regex>,
    first_author_only: bool,
    year: Option<Regex>,
    journal: Option<Regex>,
    keyword: Option<Regex>,
    dois: Vec<String>,
}

fn alternation(patterns: &[String], prefix: &str, suffix: &str) -> Result<Option<Regex>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let pattern = format!("{prefix}(?:{}){suffix}", patterns.join("|"));
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map(Some)
        .map_err(|e| RefError::InvalidInput(format!("Invalid search pattern {pattern:?}: {e}")))
}

/// True when the pattern matches the text in Unicode or in plain ASCII form.
fn matches_text(regex: &Regex, text: &str) -> bool {
    let unicode = transliteration::to_unicode(text);
    regex.is_match(&unicode) || regex.is_match(&transliteration::to_plain(&unicode))
}

fn doi_key(doi: &str) -> String {
    normalize_doi(doi).unwrap_or_else(|| doi.trim().to_string()).to_lowercase()
}

impl Search {
    pub fn new(query: &SearchQuery) -> Result<Self> {
        let author_prefix = if query.first_author_only { "^" } else { "" };
        Ok(Self {
            author: alternation(&query.authors, author_prefix, "")?,
            first_author_only: query.first_author_only,
            year: alternation(&query.years, "^", "$")?,
            journal: alternation(&query.journals, "", "")?,
            keyword: alternation(&query.keywords, "", "")?,
            dois: query.dois.iter().map(|doi| doi_key(doi)).collect(),
        })
    }

    fn author_matches(&self, entry: &BibEntry) -> bool {
        let Some(regex) = &self.author else {
            return true;
        };
        if self.first_author_only {
            entry.authors().first().is_some_and(|name| matches_text(regex, name))
        } else {
            entry.authors().iter().any(|name| matches_text(regex, name))
        }
    }

    fn journal_matches(&self, entry: &BibEntry) -> bool {
        match &self.journal {
            Some(regex) => entry.text("journal").is_some_and(|journal| matches_text(regex, &journal)),
            None => true,
        }
    }

    fn keyword_matches(&self, entry: &BibEntry) -> bool {
        let Some(regex) = &self.keyword else {
            return true;
        };
        ["title", "keywords"]
            .iter()
            .filter_map(|field| entry.text(field))
            .any(|text| matches_text(regex, &text))
    }

    fn doi_matches(&self, entry: &BibEntry) -> bool {
        if self.dois.is_empty() {
            return true;
        }
        entry
            .doi()
            .map(doi_key)
            .is_some_and(|doi| self.dois.contains(&doi))
    }

    pub fn matches(&self, item: &LibraryEntry) -> bool {
        let year = self.year.as_ref().map_or(true, |regex| regex.is_match(&item.year_dir));
        year && self.author_matches(&item.entry)
            && self.journal_matches(&item.entry)
            && self.keyword_matches(&item.entry)
            && self.doi_matches(&item.entry)
    }

    /// Matching entries in library order, or reversed.
    pub fn run<'a>(&self, library: &'a Library, reverse: bool) -> Vec<&'a LibraryEntry> {
        let mut found: Vec<&LibraryEntry> = library.entries.iter().filter(|item| self.matches(item)).collect();
        if reverse {
            found.reverse();
        }
        debug!("Search matched {} of {} entries", found.len(), library.entries.len());
        found
    }
}
