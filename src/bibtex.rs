use once_cell::sync::Lazy;
use regex::Regex;

pub mod bibliography;
pub mod entry;
pub mod names;
pub mod parser;
pub mod ris;

pub use bibliography::Bibliography;
pub use entry::{BibEntry, BibEntryBuilder, FieldValue, CANONICAL_FIELD_ORDER};
pub use parser::parse_entry;
pub use ris::{parse_ris, parse_ris_entry, RisFieldMap, RisTarget};

// Commonly used regex patterns compiled once
static DOI_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^10\.\d{4,9}/\S+$").expect("Invalid DOI regex pattern")
});
static DOI_PREFIX_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:doi:\s*|https?://(?:dx\.)?doi\.org/)").expect("Invalid DOI prefix regex pattern")
});
static DOI_SEARCH_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(10\.\d{4,9}/[^\s,;]+)").expect("Invalid DOI search regex pattern")
});
static PAGE_RANGE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\w+)\s*(?:-{1,3}|\x{2013}|\x{2014})\s*(\w+)$").expect("Invalid page range regex pattern")
});

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Collapse runs of whitespace (including newlines) into single spaces and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip `doi:` / resolver prefixes and validate the `10.xxxx/...` form.
pub fn normalize_doi(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let doi = DOI_PREFIX_REGEX.replace(trimmed, "");
    if DOI_REGEX.is_match(&doi) {
        Some(doi.into_owned())
    } else {
        None
    }
}

/// Find a DOI anywhere inside free text such as an RIS note.
pub fn find_doi(text: &str) -> Option<String> {
    DOI_SEARCH_REGEX
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end_matches('.').to_string())
}

/// Write page ranges with a BibTeX en-dash: `102-106` becomes `102--106`.
pub fn normalize_pages(raw: &str) -> String {
    let pages = collapse_whitespace(raw);
    match PAGE_RANGE_REGEX.captures(&pages) {
        Some(caps) => format!("{}--{}", &caps[1], &caps[2]),
        None => pages,
    }
}

/// Three-letter BibTeX month macro for a month name, abbreviation or number.
pub fn month_abbreviation(raw: &str) -> Option<&'static str> {
    let value = raw.trim().trim_end_matches('.').to_lowercase();
    if let Ok(number) = value.parse::<usize>() {
        return (1..=12).contains(&number).then(|| MONTHS[number - 1]);
    }
    if value.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .zip([
            "january", "february", "march", "april", "may", "june", "july", "august",
            "september", "october", "november", "december",
        ])
        .find(|(abbr, full)| value == **abbr || value == *full)
        .map(|(abbr, _)| *abbr)
}

/// Month number (1-12) for a BibTeX month macro.
pub fn month_number(abbreviation: &str) -> Option<usize> {
    MONTHS.iter().position(|m| *m == abbreviation).map(|i| i + 1)
}

/// Escape ampersands that stand alone as words (`Smith & Jones`).
///
/// Ampersands glued to other text, as in URLs, are left alone.
pub fn escape_ampersands(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous: Option<char> = None;
    for c in text.chars() {
        if c == '&' && previous.map_or(true, char::is_whitespace) {
            out.push_str("\\&");
        } else {
            out.push(c);
        }
        previous = Some(c);
    }
    out
}

/// True when the whole value is wrapped in one matching pair of braces.
pub fn is_fully_braced(text: &str) -> bool {
    if !(text.starts_with('{') && text.ends_with('}')) {
        return false;
    }
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i == text.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

/// Remove one layer of braces wrapping the whole value.
pub fn strip_outer_braces(text: &str) -> &str {
    if is_fully_braced(text) {
        &text[1..text.len() - 1]
    } else {
        text
    }
}
