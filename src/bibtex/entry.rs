use std::collections::BTreeMap;
use std::fmt;

use crate::bibtex::names::{family_name, format_person, split_names};
use crate::bibtex::{
    collapse_whitespace, escape_ampersands, month_abbreviation, month_number, normalize_doi,
    normalize_pages, strip_outer_braces,
};
use crate::error::{RefError, Result};
use crate::transliteration;

/// Field order used when writing entries. Fields not listed follow alphabetically.
pub const CANONICAL_FIELD_ORDER: &[&str] = &[
    "author", "title", "journal", "year", "month", "volume", "number", "pages", "doi", "issn",
    "isbn", "url", "booktitle", "chapter", "edition", "series", "editor", "publisher", "address",
    "institution", "organization", "school", "howpublished", "note", "annote", "abstract", "type",
    "crossref", "keywords",
];

/// Fields whose text goes through the LaTeX transliteration path.
const LATEX_FIELDS: &[&str] = &["author", "editor", "title", "journal", "booktitle", "publisher"];

/// Value of one bibliography field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            FieldValue::List(_) => None,
        }
    }

    pub fn as_list(&self) -> &[String] {
        match self {
            FieldValue::Text(text) => std::slice::from_ref(text),
            FieldValue::List(items) => items,
        }
    }
}

/// Separator used to join a multi-valued field, or `None` for single values.
pub fn list_separator(field: &str) -> Option<&'static str> {
    match field {
        "author" | "editor" => Some(" and "),
        "keywords" => Some(", "),
        _ => None,
    }
}

/// Normalize one raw field value into its canonical form.
///
/// Errors are plain messages; callers attach the location.
pub(crate) fn normalize_value(field: &str, raw: &str) -> std::result::Result<FieldValue, String> {
    let mut value = collapse_whitespace(raw);
    if LATEX_FIELDS.contains(&field) {
        value = transliteration::to_latex(&value);
    }
    value = escape_ampersands(&value);

    let value = match field {
        "author" | "editor" => {
            let names: Vec<String> = split_names(&value)
                .iter()
                .map(|name| format_person(name))
                .filter(|name| !name.is_empty())
                .collect();
            return Ok(FieldValue::List(names));
        }
        "keywords" => {
            let keywords: Vec<String> = value
                .split([',', ';'])
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect();
            return Ok(FieldValue::List(keywords));
        }
        "title" => strip_outer_braces(&value).to_string(),
        "year" => {
            if value.len() != 4 || !value.chars().all(|c| c.is_ascii_digit()) {
                return Err(format!("year must be four digits, got {value:?}"));
            }
            value
        }
        "month" => month_abbreviation(&value).map(str::to_string).unwrap_or(value),
        "doi" => normalize_doi(&value).ok_or_else(|| format!("invalid DOI {value:?}"))?,
        "pages" => normalize_pages(&value),
        _ => value,
    };
    Ok(FieldValue::Text(value))
}

/// Canonical bibliography entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibEntry {
    pub entry_type: String,
    pub key: String,
    pub fields: BTreeMap<String, FieldValue>,
}

/// Builder for BibEntry to allow for cleaner creation
pub struct BibEntryBuilder {
    entry_type: String,
    key: String,
    fields: Vec<(String, String)>,
}

impl BibEntryBuilder {
    /// Create a new BibEntryBuilder with the required key and entry type
    pub fn new(key: impl Into<String>, entry_type: impl Into<String>) -> Self {
        Self {
            entry_type: entry_type.into(),
            key: key.into(),
            fields: Vec::new(),
        }
    }

    /// Add a raw field; it is normalized on `build`
    pub fn field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((field.into(), value.into()));
        self
    }

    /// Add multiple fields from an iterator of (field, value) pairs
    pub fn fields<I, K, V>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (field, value) in fields {
            self.fields.push((field.into(), value.into()));
        }
        self
    }

    /// Build the BibEntry, normalizing every field
    pub fn build(self) -> Result<BibEntry> {
        let mut entry = BibEntry::new(self.key, self.entry_type);
        for (field, value) in self.fields {
            entry
                .set_raw(&field, &value)
                .map_err(|message| RefError::InvalidInput(format!("{field}: {message}")))?;
        }
        Ok(entry)
    }
}

impl BibEntry {
    pub fn new(key: impl Into<String>, entry_type: impl Into<String>) -> Self {
        Self {
            entry_type: entry_type.into().to_lowercase(),
            key: key.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Create a new BibEntry using the builder pattern
    pub fn builder(key: impl Into<String>, entry_type: impl Into<String>) -> BibEntryBuilder {
        BibEntryBuilder::new(key, entry_type)
    }

    /// Normalize and store a raw value. List fields are extended rather than replaced.
    pub fn set_raw(&mut self, field: &str, raw: &str) -> std::result::Result<(), String> {
        let field = field.to_lowercase();
        let value = normalize_value(&field, raw)?;
        match value {
            FieldValue::List(items) => {
                if items.is_empty() {
                    return Ok(());
                }
                match self.fields.get_mut(&field) {
                    Some(FieldValue::List(existing)) => existing.extend(items),
                    _ => {
                        self.fields.insert(field, FieldValue::List(items));
                    }
                }
            }
            FieldValue::Text(text) => {
                if text.is_empty() {
                    return Ok(());
                }
                if let Some(previous) = self.text(&field) {
                    if previous != text {
                        log::warn!(
                            "Entry {}: field {} given twice, keeping {:?} over {:?}",
                            self.key, field, text, previous
                        );
                    }
                }
                self.fields.insert(field, FieldValue::Text(text));
            }
        }
        Ok(())
    }

    /// Store an already-normalized value.
    pub fn set(&mut self, field: &str, value: FieldValue) {
        self.fields.insert(field.to_lowercase(), value);
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn remove(&mut self, field: &str) -> Option<FieldValue> {
        self.fields.remove(field)
    }

    /// Field as a single string, joining list values with their separator.
    pub fn text(&self, field: &str) -> Option<String> {
        self.fields.get(field).map(|value| match value {
            FieldValue::Text(text) => text.clone(),
            FieldValue::List(items) => items.join(list_separator(field).unwrap_or(", ")),
        })
    }

    pub fn authors(&self) -> &[String] {
        self.fields.get("author").map(FieldValue::as_list).unwrap_or(&[])
    }

    /// Surname of the first author, still in LaTeX form.
    pub fn first_author_surname(&self) -> Option<&str> {
        self.authors().first().map(|name| family_name(name)).filter(|s| !s.is_empty())
    }

    pub fn year(&self) -> Option<&str> {
        self.fields.get("year").and_then(FieldValue::as_text)
    }

    pub fn doi(&self) -> Option<&str> {
        self.fields.get("doi").and_then(FieldValue::as_text)
    }

    /// Field names in canonical output order.
    pub fn ordered_fields(&self) -> Vec<&str> {
        let mut names: Vec<&str> = CANONICAL_FIELD_ORDER
            .iter()
            .copied()
            .filter(|name| self.fields.contains_key(*name))
            .collect();
        names.extend(
            self.fields
                .keys()
                .map(String::as_str)
                .filter(|name| !CANONICAL_FIELD_ORDER.contains(name)),
        );
        names
    }

    /// Render the entry as RIS, converting LaTeX escapes back to Unicode.
    pub fn to_ris(&self) -> String {
        let mut lines: Vec<(String, String)> = Vec::new();
        let ris_type = match self.entry_type.as_str() {
            "article" => "JOUR",
            "book" => "BOOK",
            "inbook" | "incollection" => "CHAP",
            "inproceedings" | "conference" => "CPAPER",
            "proceedings" => "CONF",
            "techreport" => "RPRT",
            "phdthesis" | "mastersthesis" => "THES",
            _ => "GEN",
        };
        lines.push(("TY".into(), ris_type.into()));
        if !self.key.is_empty() {
            lines.push(("ID".into(), self.key.clone()));
        }

        for field in self.ordered_fields() {
            let Some(value) = self.fields.get(field) else { continue };
            let text = || transliteration::to_unicode(&self.text(field).unwrap_or_default());
            match field {
                "author" | "editor" | "keywords" => {
                    let tag = match field {
                        "author" => "AU",
                        "editor" => "ED",
                        _ => "KW",
                    };
                    for item in value.as_list() {
                        lines.push((tag.into(), transliteration::to_unicode(item)));
                    }
                }
                "title" => lines.push(("TI".into(), text())),
                "journal" => lines.push(("JO".into(), text())),
                "booktitle" => lines.push(("T2".into(), text())),
                "year" => lines.push(("PY".into(), text())),
                "month" => {
                    if let (Some(year), Some(month)) =
                        (self.year(), value.as_text().and_then(month_number))
                    {
                        lines.push(("DA".into(), format!("{year}/{month:02}")));
                    }
                }
                "volume" => lines.push(("VL".into(), text())),
                "number" => lines.push(("IS".into(), text())),
                "pages" => {
                    let pages = text();
                    match pages.split_once("--") {
                        Some((start, end)) => {
                            lines.push(("SP".into(), start.to_string()));
                            lines.push(("EP".into(), end.to_string()));
                        }
                        None => lines.push(("SP".into(), pages)),
                    }
                }
                "doi" => lines.push(("DO".into(), text())),
                "issn" | "isbn" => lines.push(("SN".into(), text())),
                "url" => lines.push(("UR".into(), text())),
                "publisher" => lines.push(("PB".into(), text())),
                "address" => lines.push(("CY".into(), text())),
                "abstract" => lines.push(("AB".into(), text())),
                "note" => lines.push(("N1".into(), text())),
                other => lines.push(("N1".into(), format!("{}: {}", other, text()))),
            }
        }
        lines.push(("ER".into(), String::new()));

        let mut out = String::new();
        for (tag, value) in lines {
            out.push_str(format!("{tag}  - {value}").trim_end());
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for BibEntry {
    /// Canonical BibTeX: one field per line, braces around every value
    /// except month macros, double braces around titles.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "@{}{{{},", self.entry_type, self.key)?;
        for field in self.ordered_fields() {
            let Some(value) = self.text(field) else { continue };
            if value.is_empty() {
                continue;
            }
            match field {
                "month" if month_number(&value).is_some() => writeln!(f, "{field} = {value},")?,
                "title" => writeln!(f, "{field} = {{{{{value}}}}},")?,
                _ => writeln!(f, "{field} = {{{value}}},")?,
            }
        }
        writeln!(f, "}}")
    }
}
