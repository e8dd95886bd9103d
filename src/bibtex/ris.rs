//! RIS (`TAG  - value`) records.

use std::collections::HashMap;

use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::bibtex::entry::BibEntry;
use crate::bibtex::{find_doi, month_abbreviation, normalize_doi};
use crate::error::{LineRange, RefError, Result};

static RIS_LINE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z][A-Za-z0-9]{1,3})\s+-(?:\s+(.*?))?\s*$").expect("Invalid RIS line regex pattern")
});
static DATE_PART_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d+").expect("Invalid date regex pattern")
});

/// What a RIS tag contributes to the entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RisTarget {
    EntryType,
    Key,
    /// Stored under the named field; multi-valued fields accumulate.
    Field(String),
    /// `YYYY/MM/DD/other` publication date.
    Date,
    StartPage,
    EndPage,
    /// Must hold a valid DOI.
    Doi,
    /// Contributes a DOI only when one is found in the value.
    DoiIfPresent,
    /// A DOI when one is found, otherwise a note.
    NoteOrDoi,
    End,
}

/// Mapping from RIS tags to entry fields.
#[derive(Debug, Clone)]
pub struct RisFieldMap {
    tags: HashMap<String, RisTarget>,
}

impl RisFieldMap {
    /// Map with no tags; unknown tags are kept under their lowercased name.
    pub fn empty() -> Self {
        Self { tags: HashMap::new() }
    }

    pub fn insert(&mut self, tag: &str, target: RisTarget) {
        self.tags.insert(tag.to_uppercase(), target);
    }

    pub fn get(&self, tag: &str) -> Option<&RisTarget> {
        self.tags.get(tag)
    }
}

impl Default for RisFieldMap {
    fn default() -> Self {
        let mut map = Self::empty();
        let field = |name: &str| RisTarget::Field(name.to_string());
        map.insert("TY", RisTarget::EntryType);
        map.insert("ID", RisTarget::Key);
        map.insert("ER", RisTarget::End);
        for tag in ["AU", "A1", "A2"] {
            map.insert(tag, field("author"));
        }
        map.insert("ED", field("editor"));
        map.insert("TI", field("title"));
        map.insert("T1", field("title"));
        for tag in ["JO", "JF", "T2"] {
            map.insert(tag, field("journal"));
        }
        for tag in ["PY", "Y1", "DA"] {
            map.insert(tag, RisTarget::Date);
        }
        map.insert("SP", RisTarget::StartPage);
        map.insert("EP", RisTarget::EndPage);
        map.insert("LP", RisTarget::EndPage);
        map.insert("VL", field("volume"));
        map.insert("IS", field("number"));
        map.insert("PB", field("publisher"));
        map.insert("SN", field("issn"));
        map.insert("UR", field("url"));
        map.insert("DO", RisTarget::Doi);
        map.insert("DOI", RisTarget::Doi);
        map.insert("L3", RisTarget::DoiIfPresent);
        map.insert("M3", RisTarget::DoiIfPresent);
        map.insert("N1", RisTarget::NoteOrDoi);
        map.insert("KW", field("keywords"));
        map.insert("AB", field("abstract"));
        map.insert("N2", field("abstract"));
        map.insert("CY", field("address"));
        map
    }
}

fn entry_type_for(ris_type: &str) -> &'static str {
    match ris_type.trim().to_uppercase().as_str() {
        "JOUR" | "EJOU" => "article",
        "BOOK" => "book",
        "CHAP" => "inbook",
        "CONF" | "CPAPER" => "inproceedings",
        "RPRT" => "techreport",
        "THES" => "phdthesis",
        "DATA" => "misc",
        other => {
            warn!("Unknown RIS type {}, using misc", other);
            "misc"
        }
    }
}

/// One TY ... ER block with the line of every tag.
struct RisRecord {
    start_line: usize,
    tags: Vec<(String, String, usize)>,
}

fn split_records(text: &str) -> Result<Vec<RisRecord>> {
    let text = text.trim_start_matches('\u{FEFF}');
    let mut records = Vec::new();
    let mut current: Option<RisRecord> = None;
    let mut last_line = 0;

    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;
        last_line = line_no;
        let Some(caps) = RIS_LINE_REGEX.captures(line) else {
            if line.trim().is_empty() {
                continue;
            }
            match current.as_mut().and_then(|record| record.tags.last_mut()) {
                Some((_, value, _)) => {
                    // Continuation of a wrapped value
                    if !value.is_empty() {
                        value.push(' ');
                    }
                    value.push_str(line.trim());
                }
                None => debug!("Ignoring text outside RIS record at line {}", line_no),
            }
            continue;
        };
        let tag = caps[1].to_uppercase();
        let value = caps.get(2).map_or("", |m| m.as_str()).to_string();

        match tag.as_str() {
            "TY" => {
                if let Some(open) = current.take() {
                    return Err(RefError::parse(
                        LineRange::new(open.start_line, line_no - 1),
                        "RIS record has no ER line",
                    ));
                }
                current = Some(RisRecord {
                    start_line: line_no,
                    tags: vec![(tag, value, line_no)],
                });
            }
            "ER" => match current.take() {
                Some(record) => records.push(record),
                None => return Err(RefError::parse(LineRange::single(line_no), "ER line without TY")),
            },
            _ => match current.as_mut() {
                Some(record) => record.tags.push((tag, value, line_no)),
                None => {
                    return Err(RefError::parse(
                        LineRange::single(line_no),
                        format!("{tag} line outside a record: missing TY"),
                    ))
                }
            },
        }
    }

    if let Some(open) = current {
        return Err(RefError::parse(
            LineRange::new(open.start_line, last_line),
            "RIS record has no ER line",
        ));
    }
    Ok(records)
}

fn record_to_entry(record: RisRecord, map: &RisFieldMap) -> Result<BibEntry> {
    let mut entry = BibEntry::new("", "misc");
    let mut start_page: Option<(String, usize)> = None;
    let mut end_page: Option<(String, usize)> = None;
    let mut notes: Vec<String> = Vec::new();

    for (tag, value, line) in record.tags {
        if value.is_empty() {
            continue;
        }
        let lines = LineRange::single(line);
        let set = |entry: &mut BibEntry, field: &str, value: &str| {
            entry
                .set_raw(field, value)
                .map_err(|message| RefError::parse(lines, format!("{tag} {field}: {message}")))
        };

        match map.get(&tag) {
            Some(RisTarget::EntryType) => entry.entry_type = entry_type_for(&value).to_string(),
            Some(RisTarget::Key) => entry.key = value,
            Some(RisTarget::Field(field)) => set(&mut entry, field.as_str(), value.as_str())?,
            Some(RisTarget::Date) => {
                let parts: Vec<&str> = DATE_PART_REGEX.find_iter(&value).map(|m| m.as_str()).collect();
                let Some(year) = parts.first().filter(|year| year.len() == 4) else {
                    return Err(RefError::parse(lines, format!("{tag} date {value:?} has no four-digit year")));
                };
                if entry.year().is_none() {
                    set(&mut entry, "year", *year)?;
                }
                if let Some(month) = parts.get(1).and_then(|m| month_abbreviation(m)) {
                    if entry.get("month").is_none() {
                        set(&mut entry, "month", month)?;
                    }
                }
            }
            Some(RisTarget::StartPage) => start_page = Some((value, line)),
            Some(RisTarget::EndPage) => end_page = Some((value, line)),
            Some(RisTarget::Doi) => set(&mut entry, "doi", value.as_str())?,
            Some(RisTarget::DoiIfPresent) => {
                if let Some(doi) = find_doi(&value).filter(|_| entry.doi().is_none()) {
                    set(&mut entry, "doi", doi.as_str())?;
                }
            }
            Some(RisTarget::NoteOrDoi) => match find_doi(&value).and_then(|d| normalize_doi(&d)) {
                Some(doi) if entry.doi().is_none() => set(&mut entry, "doi", doi.as_str())?,
                Some(_) => {}
                None => notes.push(value),
            },
            Some(RisTarget::End) => {}
            None => {
                debug!("Keeping unmapped RIS tag {}", tag);
                set(&mut entry, tag.to_lowercase().as_str(), value.as_str())?;
            }
        }
    }

    let pages = match (start_page, end_page) {
        (Some((start, line)), Some((end, _))) => Some((format!("{start}--{end}"), line)),
        (Some(page), None) | (None, Some(page)) => Some(page),
        (None, None) => None,
    };
    if let Some((pages, line)) = pages {
        entry
            .set_raw("pages", &pages)
            .map_err(|message| RefError::parse(LineRange::single(line), message))?;
    }
    if !notes.is_empty() {
        entry
            .set_raw("note", &notes.join("; "))
            .map_err(|message| RefError::parse(LineRange::single(record.start_line), message))?;
    }
    Ok(entry)
}

/// Parse a single RIS record into an entry. The key is left empty unless
/// the record carries an `ID` tag.
pub fn parse_ris_entry(text: &str, map: &RisFieldMap) -> Result<BibEntry> {
    let mut records = split_records(text)?;
    if records.is_empty() {
        return Err(RefError::parse(LineRange::single(1), "no RIS record found: missing TY"));
    }
    if records.len() > 1 {
        warn!("Found {} RIS records, using the first", records.len());
    }
    record_to_entry(records.remove(0), map)
}

/// Parse every record of a RIS file.
pub fn parse_ris(text: &str, map: &RisFieldMap) -> Result<Vec<BibEntry>> {
    split_records(text)?
        .into_iter()
        .map(|record| record_to_entry(record, map))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NGEO_RIS: &str = "\u{FEFF}TY  - JOUR
AU  - Rignot, Eric
AU  - Bamber, Jonathan L.
AU  - van den Broeke, Michiel R.
TI  - Recent Antarctic ice mass loss from radar interferometry
  and regional climate modelling
JO  - Nature Geoscience
PY  - 2008/01/13/online
VL  - 1
IS  - 2
SP  - 106
EP  - 110
SN  - 1752-0908
UR  - https://doi.org/10.1038/ngeo102
L3  - 10.1038/ngeo102
M3  - Article
N1  - Supplementary information available
Y2  - 2008/02/01
ER  -
";

    #[test]
    fn test_minimal_record() {
        let entry = parse_ris_entry(
            "TY  - JOUR\nAU  - Rignot, E.\nPY  - 2008\nJO  - Nature Geoscience\nER  -\n",
            &RisFieldMap::default(),
        )
        .unwrap();
        assert_eq!(entry.entry_type, "article");
        assert_eq!(entry.authors(), ["Rignot, E."]);
        assert_eq!(entry.year(), Some("2008"));
        assert_eq!(entry.text("journal").unwrap(), "Nature Geoscience");
    }

    #[test]
    fn test_full_record() {
        let entry = parse_ris_entry(NGEO_RIS, &RisFieldMap::default()).unwrap();
        assert_eq!(entry.authors().len(), 3);
        assert_eq!(entry.authors()[2], "van den Broeke, Michiel R.");
        assert_eq!(
            entry.text("title").unwrap(),
            "Recent Antarctic ice mass loss from radar interferometry and regional climate modelling"
        );
        assert_eq!(entry.text("month").unwrap(), "jan");
        assert_eq!(entry.text("pages").unwrap(), "106--110");
        assert_eq!(entry.doi(), Some("10.1038/ngeo102"));
        assert_eq!(entry.text("note").unwrap(), "Supplementary information available");
        // Unmapped tags are kept under their own name
        assert_eq!(entry.text("y2").unwrap(), "2008/02/01");
    }

    #[test]
    fn test_missing_er_is_parse_error() {
        let err = parse_ris_entry("TY  - JOUR\nAU  - Rignot, E.\n", &RisFieldMap::default()).unwrap_err();
        assert!(matches!(err, RefError::Parse { lines, .. } if lines == LineRange::new(1, 2)));
    }

    #[test]
    fn test_missing_ty_is_parse_error() {
        let err = parse_ris_entry("AU  - Rignot, E.\nER  -\n", &RisFieldMap::default()).unwrap_err();
        assert!(matches!(err, RefError::Parse { lines, .. } if lines == LineRange::single(1)));
    }

    #[test]
    fn test_invalid_doi_reports_line() {
        let err = parse_ris_entry("TY  - JOUR\nPY  - 2008\nDO  - pending\nER  -\n", &RisFieldMap::default())
            .unwrap_err();
        assert!(matches!(err, RefError::Parse { lines, .. } if lines == LineRange::single(3)));
    }

    #[test]
    fn test_unknown_type_and_multiple_records() {
        let entries = parse_ris(
            "TY  - ELEC\nTI  - Data portal\nER  -\n\nTY  - THES\nAU  - Box, J.E.\nDA  - 2001\nER  -\n",
            &RisFieldMap::default(),
        )
        .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].entry_type, "misc");
        assert_eq!(entries[1].entry_type, "phdthesis");
        assert_eq!(entries[1].authors(), ["Box, J. E."]);
    }

    #[test]
    fn test_custom_mapping() {
        let mut map = RisFieldMap::default();
        map.insert("JA", RisTarget::Field("journal".into()));
        let entry = parse_ris_entry("TY  - JOUR\nJA  - J. Glaciol.\nER  -\n", &map).unwrap();
        assert_eq!(entry.text("journal").unwrap(), "J. Glaciol.");
    }
}
