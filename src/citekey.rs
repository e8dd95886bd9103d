use std::collections::HashMap;

use log::debug;

use crate::error::{RefError, Result};
use crate::transliteration;

/// Citekeys already taken in a target bibliography, with the DOI of each entry.
#[derive(Debug, Clone, Default)]
pub struct ExistingKeys {
    keys: HashMap<String, Option<String>>,
}

impl ExistingKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, doi: Option<&str>) {
        self.keys.insert(key.into(), doi.map(|d| d.to_lowercase()));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Add every key of another set, keeping DOIs already recorded here.
    pub fn merge(&mut self, other: ExistingKeys) {
        for (key, doi) in other.keys {
            let slot = self.keys.entry(key).or_insert(None);
            if slot.is_none() {
                *slot = doi;
            }
        }
    }

    fn doi_of(&self, key: &str) -> Option<&str> {
        self.keys.get(key).and_then(|doi| doi.as_deref())
    }
}

impl<K: Into<String>> FromIterator<K> for ExistingKeys {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut keys = ExistingKeys::new();
        for key in iter {
            keys.insert(key, None);
        }
        keys
    }
}

/// Inputs for one citekey.
#[derive(Debug, Clone)]
pub struct CitekeyRequest<'a> {
    pub surname: &'a str,
    pub year: &'a str,
    pub doi: Option<&'a str>,
}

impl<'a> CitekeyRequest<'a> {
    pub fn new(surname: &'a str, year: &'a str) -> Self {
        Self { surname, year, doi: None }
    }

    pub fn with_doi(mut self, doi: Option<&'a str>) -> Self {
        self.doi = doi;
        self
    }
}

/// Python-style title case: first letter of every alphabetic run upper, rest lower.
pub(crate) fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_word = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

/// True when the text has cased letters and all of them are uppercase.
pub(crate) fn is_all_uppercase(text: &str) -> bool {
    let mut cased = text.chars().filter(|c| c.is_alphabetic()).peekable();
    cased.peek().is_some() && cased.all(|c| !c.is_lowercase())
}

/// Reduce a surname to the characters allowed in a citekey.
pub fn scrub_surname(surname: &str) -> String {
    let surname = if is_all_uppercase(surname) {
        title_case(surname)
    } else {
        surname.to_string()
    };
    transliteration::to_plain(&surname)
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

fn validate_year(year: &str) -> Result<&str> {
    let year = year.trim();
    if year.len() == 4 && year.chars().all(|c| c.is_ascii_digit()) {
        Ok(year)
    } else {
        Err(RefError::InvalidInput(format!("year must be four digits, got {year:?}")))
    }
}

/// Base key without disambiguator: scrubbed surname followed by the year.
pub fn base_key(surname: &str, year: &str) -> Result<String> {
    let scrubbed = scrub_surname(surname);
    if scrubbed.is_empty() {
        return Err(RefError::InvalidInput(format!(
            "surname {surname:?} is empty after scrubbing"
        )));
    }
    let year = validate_year(year)?;
    Ok(format!("{scrubbed}{year}"))
}

/// Generate a citekey that is unused in `existing`.
///
/// A key already assigned to the same DOI is returned as is, wherever it
/// sits in the suffix sequence. Otherwise suffixes `a` through `z` are tried
/// in order after the base key.
pub fn generate(request: &CitekeyRequest<'_>, existing: &ExistingKeys) -> Result<String> {
    let base = base_key(request.surname, request.year)?;
    let candidates: Vec<String> = std::iter::once(base.clone())
        .chain(('a'..='z').map(|suffix| format!("{base}{suffix}")))
        .collect();

    if let Some(doi) = request.doi.map(str::to_lowercase) {
        if let Some(candidate) = candidates.iter().find(|c| existing.doi_of(c) == Some(doi.as_str())) {
            debug!("Citekey {} already belongs to DOI {}", candidate, doi);
            return Ok(candidate.clone());
        }
    }

    match candidates.into_iter().find(|c| !existing.contains(c)) {
        Some(candidate) => {
            debug!("Citekey {} is free", candidate);
            Ok(candidate)
        }
        None => Err(RefError::KeyExhaustion(base)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unused_key_is_surname_plus_year() {
        let existing: ExistingKeys = ["Smith2010", "Rignot2007"].into_iter().collect();
        let key = generate(&CitekeyRequest::new("Rignot", "2008"), &existing).unwrap();
        assert_eq!(key, "Rignot2008");
    }

    #[test]
    fn test_collisions_take_successive_suffixes() {
        let mut existing: ExistingKeys = ["Rignot2008"].into_iter().collect();
        let request = CitekeyRequest::new("Rignot", "2008");
        assert_eq!(generate(&request, &existing).unwrap(), "Rignot2008a");

        existing.insert("Rignot2008a", None);
        assert_eq!(generate(&request, &existing).unwrap(), "Rignot2008b");
    }

    #[test]
    fn test_suffix_gap_is_filled_first() {
        let existing: ExistingKeys = ["Rignot2008", "Rignot2008b"].into_iter().collect();
        let key = generate(&CitekeyRequest::new("Rignot", "2008"), &existing).unwrap();
        assert_eq!(key, "Rignot2008a");
    }

    #[test]
    fn test_exhausted_suffixes_fail() {
        let mut existing: ExistingKeys = ["Rignot2008"].into_iter().collect();
        for suffix in 'a'..='z' {
            existing.insert(format!("Rignot2008{suffix}"), None);
        }
        let err = generate(&CitekeyRequest::new("Rignot", "2008"), &existing).unwrap_err();
        assert!(matches!(err, RefError::KeyExhaustion(ref base) if base == "Rignot2008"));
    }

    #[test]
    fn test_same_doi_reuses_key() {
        let mut existing = ExistingKeys::new();
        existing.insert("Rignot2008", Some("10.1038/ngeo102"));
        existing.insert("Rignot2008a", Some("10.1029/2008GL033365"));

        let request = CitekeyRequest::new("Rignot", "2008").with_doi(Some("10.1029/2008gl033365"));
        assert_eq!(generate(&request, &existing).unwrap(), "Rignot2008a");

        let other = CitekeyRequest::new("Rignot", "2008").with_doi(Some("10.5194/tc-1-1-2008"));
        assert_eq!(generate(&other, &existing).unwrap(), "Rignot2008b");
    }

    #[test]
    fn test_same_doi_found_past_a_free_suffix() {
        let mut existing = ExistingKeys::new();
        existing.insert("Rignot2008", Some("10.1038/ngeo102"));
        existing.insert("Rignot2008b", Some("10.1029/2008GL033365"));

        let request = CitekeyRequest::new("Rignot", "2008").with_doi(Some("10.1029/2008GL033365"));
        assert_eq!(generate(&request, &existing).unwrap(), "Rignot2008b");

        let fresh = CitekeyRequest::new("Rignot", "2008").with_doi(Some("10.5194/tc-1-1-2008"));
        assert_eq!(generate(&fresh, &existing).unwrap(), "Rignot2008a");
    }

    #[test]
    fn test_same_doi_reuses_key_when_all_suffixes_taken() {
        let mut existing: ExistingKeys = ["Box2012"].into_iter().collect();
        for suffix in 'a'..='z' {
            existing.insert(format!("Box2012{suffix}"), None);
        }
        existing.insert("Box2012z", Some("10.5194/tc-6-821-2012"));
        let request = CitekeyRequest::new("Box", "2012").with_doi(Some("10.5194/tc-6-821-2012"));
        assert_eq!(generate(&request, &existing).unwrap(), "Box2012z");
    }

    #[test]
    fn test_surname_is_scrubbed() {
        let existing = ExistingKeys::new();
        let key = generate(&CitekeyRequest::new("M\u{00FC}ller-Stoffels", "2014"), &existing).unwrap();
        assert_eq!(key, "MullerStoffels2014");
        assert_eq!(base_key("van den Broeke", "2009").unwrap(), "vandenBroeke2009");
        assert_eq!(base_key("O'Neel", "2005").unwrap(), "ONeel2005");
        assert_eq!(base_key("RIGNOT", "2008").unwrap(), "Rignot2008");
        assert_eq!(base_key("{\\O}stby", "2017").unwrap(), "Ostby2017");
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(base_key("--", "2008"), Err(RefError::InvalidInput(_))));
        assert!(matches!(base_key("Rignot", "08"), Err(RefError::InvalidInput(_))));
        assert!(matches!(base_key("Rignot", "2008a"), Err(RefError::InvalidInput(_))));
    }

    #[test]
    fn test_merge_keeps_known_dois() {
        let mut keys = ExistingKeys::new();
        keys.insert("Box2012", Some("10.5194/tc-6-821-2012"));
        let mut other = ExistingKeys::new();
        other.insert("Box2012", None);
        other.insert("Box2013", None);
        keys.merge(other);
        assert_eq!(keys.len(), 2);
        let request = CitekeyRequest::new("Box", "2012").with_doi(Some("10.5194/tc-6-821-2012"));
        assert_eq!(generate(&request, &keys).unwrap(), "Box2012");
    }

    #[test]
    fn test_generation_is_deterministic() {
        let existing: ExistingKeys = ["Joughin2012", "Joughin2012a"].into_iter().collect();
        let request = CitekeyRequest::new("Joughin", "2012");
        let first = generate(&request, &existing).unwrap();
        let second = generate(&request, &existing).unwrap();
        assert_eq!(first, second);
    }
}
