use std::collections::HashMap;

use log::debug;

use crate::bibtex::entry::BibEntry;
use crate::error::{LineRange, RefError, Result};

/// Top-level item of a BibTeX file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Entry(BibEntry),
    /// `@string`, `@preamble` or `@comment`, kept as written.
    Directive(String),
}

const DIRECTIVES: &[&str] = &["string", "preamble", "comment"];

/// Month macros every BibTeX style predefines.
const MONTH_MACROS: [(&str, &str); 12] = [
    ("jan", "January"),
    ("feb", "February"),
    ("mar", "March"),
    ("apr", "April"),
    ("may", "May"),
    ("jun", "June"),
    ("jul", "July"),
    ("aug", "August"),
    ("sep", "September"),
    ("oct", "October"),
    ("nov", "November"),
    ("dec", "December"),
];

fn is_field_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':' | '.' | '+')
}

fn is_token_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | ':' | '.' | '+' | '/')
}

/// Character cursor that tracks the current 1-based line and the
/// `@string` macros defined so far.
struct Cursor {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    macros: HashMap<String, String>,
}

impl Cursor {
    fn new(text: &str) -> Self {
        let macros = MONTH_MACROS
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        Self {
            chars: text.chars().collect(),
            pos: 0,
            line: 1,
            macros,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek().filter(|c| pred(*c)) {
            out.push(c);
            self.bump();
        }
        out
    }

    fn slice(&self, start: usize) -> String {
        self.chars[start..self.pos].iter().collect()
    }
}

/// Parse a single BibTeX entry.
///
/// Text before the entry is ignored; anything after it is not examined.
pub fn parse_entry(text: &str) -> Result<BibEntry> {
    let mut cursor = Cursor::new(text);
    loop {
        match next_block(&mut cursor)? {
            Some(Block::Entry(entry)) => return Ok(entry),
            Some(Block::Directive(_)) => continue,
            None => return Err(RefError::parse(LineRange::single(cursor.line), "no entry found")),
        }
    }
}

/// Parse every entry and directive of a BibTeX file, in order.
pub fn parse_blocks(text: &str) -> Result<Vec<Block>> {
    let mut cursor = Cursor::new(text);
    let mut blocks = Vec::new();
    while let Some(block) = next_block(&mut cursor)? {
        blocks.push(block);
    }
    Ok(blocks)
}

fn next_block(cursor: &mut Cursor) -> Result<Option<Block>> {
    // Text between entries is a comment in BibTeX
    while cursor.peek().is_some_and(|c| c != '@') {
        cursor.bump();
    }
    let start = cursor.pos;
    let start_line = cursor.line;
    if cursor.bump().is_none() {
        return Ok(None);
    }

    cursor.skip_whitespace();
    let entry_type = cursor.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
    if entry_type.is_empty() {
        return Err(RefError::parse(LineRange::single(start_line), "missing entry type after '@'"));
    }
    cursor.skip_whitespace();
    let close = match cursor.bump() {
        Some('{') => '}',
        Some('(') => ')',
        _ => {
            return Err(RefError::parse(
                LineRange::new(start_line, cursor.line),
                format!("expected '{{' after @{entry_type}"),
            ))
        }
    };

    if entry_type.eq_ignore_ascii_case("string") {
        parse_string_macro(cursor, close, start_line)?;
        return Ok(Some(Block::Directive(cursor.slice(start))));
    }
    if DIRECTIVES.contains(&entry_type.to_lowercase().as_str()) {
        let open = if close == '}' { '{' } else { '(' };
        let mut depth = 1usize;
        while depth > 0 {
            match cursor.bump() {
                Some(c) if c == open => depth += 1,
                Some(c) if c == close => depth -= 1,
                Some(_) => {}
                None => {
                    return Err(RefError::parse(
                        LineRange::new(start_line, cursor.line),
                        format!("unterminated @{entry_type}"),
                    ))
                }
            }
        }
        debug!("Keeping @{} directive at line {}", entry_type, start_line);
        return Ok(Some(Block::Directive(cursor.slice(start))));
    }

    parse_entry_body(cursor, entry_type, close, start_line).map(|entry| Some(Block::Entry(entry)))
}

/// Read `name = value` of an `@string` and define the macro.
fn parse_string_macro(cursor: &mut Cursor, close: char, start_line: usize) -> Result<()> {
    cursor.skip_whitespace();
    let name = cursor.take_while(is_field_char);
    cursor.skip_whitespace();
    if name.is_empty() || cursor.bump() != Some('=') {
        return Err(RefError::parse(
            LineRange::new(start_line, cursor.line),
            "expected 'name = value' in @string",
        ));
    }
    let value = parse_value(cursor, &name, start_line)?;
    cursor.skip_whitespace();
    if cursor.bump() != Some(close) {
        return Err(RefError::parse(
            LineRange::new(start_line, cursor.line),
            format!("unterminated @string {name}: missing closing '{close}'"),
        ));
    }
    debug!("Defined @string {} at line {}", name, start_line);
    cursor.macros.insert(name.to_lowercase(), value);
    Ok(())
}

fn parse_entry_body(
    cursor: &mut Cursor,
    entry_type: String,
    close: char,
    start_line: usize,
) -> Result<BibEntry> {
    cursor.skip_whitespace();
    let key = cursor.take_while(|c| c != ',' && c != close && !c.is_whitespace());
    cursor.skip_whitespace();
    let has_fields = cursor.peek() == Some(',');
    if key.is_empty() || key.contains('=') || !(has_fields || cursor.peek() == Some(close)) {
        return Err(RefError::parse(
            LineRange::new(start_line, cursor.line),
            format!("missing citekey in @{entry_type} entry"),
        ));
    }
    cursor.bump();

    let unterminated = |line: usize| {
        RefError::parse(
            LineRange::new(start_line, line),
            format!("unterminated entry {key}: missing closing '{close}'"),
        )
    };

    let mut raw_fields: Vec<(String, String, LineRange)> = Vec::new();
    if has_fields {
        loop {
            while cursor.peek().is_some_and(|c| c.is_whitespace() || c == ',') {
                cursor.bump();
            }
            match cursor.peek() {
                None | Some('@') => return Err(unterminated(cursor.line)),
                Some(c) if c == close => {
                    cursor.bump();
                    break;
                }
                Some(_) => {}
            }

            let field_line = cursor.line;
            let name = cursor.take_while(is_field_char);
            if name.is_empty() {
                let found = cursor.peek().unwrap_or(' ');
                return Err(RefError::parse(
                    LineRange::single(field_line),
                    format!("unexpected character {found:?} in entry {key}"),
                ));
            }
            cursor.skip_whitespace();
            if cursor.bump() != Some('=') {
                return Err(RefError::parse(
                    LineRange::new(field_line, cursor.line),
                    format!("expected '=' after field {name} in entry {key}"),
                ));
            }
            let value = parse_value(cursor, &name, field_line)?;
            raw_fields.push((name.to_lowercase(), value, LineRange::new(field_line, cursor.line)));

            cursor.skip_whitespace();
            match cursor.peek() {
                Some(',') => {
                    cursor.bump();
                }
                Some(c) if c == close => {}
                None | Some('@') => return Err(unterminated(cursor.line)),
                Some(other) => {
                    return Err(RefError::parse(
                        LineRange::new(field_line, cursor.line),
                        format!("expected ',' after field {name} in entry {key}, found {other:?}"),
                    ))
                }
            }
        }
    }

    let mut entry = BibEntry::new(key.clone(), entry_type);
    for (name, value, lines) in raw_fields {
        entry
            .set_raw(&name, &value)
            .map_err(|message| RefError::parse(lines, format!("entry {key}, field {name}: {message}")))?;
    }
    Ok(entry)
}

/// Read a field value: braced, quoted or bare parts joined by `#`.
///
/// Bare numbers are taken literally; other bare tokens must name a macro.
fn parse_value(cursor: &mut Cursor, field: &str, field_line: usize) -> Result<String> {
    let mut value = String::new();
    loop {
        cursor.skip_whitespace();
        match cursor.peek() {
            Some('{') => {
                cursor.bump();
                value.push_str(&read_delimited(cursor, '}', field, field_line)?);
            }
            Some('"') => {
                cursor.bump();
                value.push_str(&read_delimited(cursor, '"', field, field_line)?);
            }
            Some(c) if is_token_char(c) => {
                let token = cursor.take_while(is_token_char);
                if token.chars().all(|c| c.is_ascii_digit()) {
                    value.push_str(&token);
                } else if let Some(expansion) = cursor.macros.get(&token.to_lowercase()) {
                    value.push_str(expansion);
                } else {
                    return Err(RefError::parse(
                        LineRange::new(field_line, cursor.line),
                        format!("undefined macro {token} in field {field}"),
                    ));
                }
            }
            _ => {
                return Err(RefError::parse(
                    LineRange::new(field_line, cursor.line),
                    format!("missing value for field {field}"),
                ))
            }
        }
        cursor.skip_whitespace();
        if cursor.peek() == Some('#') {
            cursor.bump();
        } else {
            return Ok(value);
        }
    }
}

/// Read up to the terminator at brace depth zero, consuming it. Braces must
/// balance inside the value.
fn read_delimited(cursor: &mut Cursor, terminator: char, field: &str, field_line: usize) -> Result<String> {
    let mut out = String::new();
    let mut depth = 0usize;
    loop {
        let Some(c) = cursor.bump() else {
            return Err(RefError::parse(
                LineRange::new(field_line, cursor.line),
                format!("unterminated value for field {field}"),
            ));
        };
        match c {
            '\\' => {
                out.push(c);
                if let Some(escaped) = cursor.bump() {
                    out.push(escaped);
                }
            }
            c if c == terminator && depth == 0 => return Ok(out),
            '{' => {
                depth += 1;
                out.push(c);
            }
            '}' if depth == 0 => {
                return Err(RefError::parse(
                    LineRange::new(field_line, cursor.line),
                    format!("unbalanced '}}' in field {field}"),
                ));
            }
            '}' => {
                depth -= 1;
                out.push(c);
            }
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bibtex::FieldValue;

    #[test]
    fn test_parse_entry_fields() {
        let entry = parse_entry(
            "@Article{Rignot2008,\n  author = \"Rignot, E. and Bamber, J. L.\",\n  title={Recent {Antarctic} ice mass loss},\n  year = 2008,\n  month = jan,\n  journal = {Nature } # \"Geoscience\",\n}\n",
        )
        .unwrap();
        assert_eq!(entry.entry_type, "article");
        assert_eq!(entry.key, "Rignot2008");
        assert_eq!(entry.authors(), ["Rignot, E.", "Bamber, J. L."]);
        assert_eq!(entry.text("title").unwrap(), "Recent {Antarctic} ice mass loss");
        assert_eq!(entry.year(), Some("2008"));
        assert_eq!(entry.text("month").unwrap(), "jan");
        assert_eq!(entry.text("journal").unwrap(), "Nature Geoscience");
    }

    #[test]
    fn test_parenthesized_entry() {
        let entry = parse_entry("@misc(Box2012, note = {a (b) c})").unwrap();
        assert_eq!(entry.text("note").unwrap(), "a (b) c");
    }

    #[test]
    fn test_missing_closing_brace() {
        let err = parse_entry("@article{Rignot2008,\n  title = {Ice},\n  year = {2008},\n").unwrap_err();
        match err {
            RefError::Parse { lines, message } => {
                assert_eq!(lines, LineRange::new(1, 4));
                assert!(message.contains("unterminated entry Rignot2008"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_unterminated_value_reports_field_lines() {
        let err = parse_entry("@article{k,\n  year = {2008},\n  title = {Ice\n  loss,\n").unwrap_err();
        assert!(matches!(err, RefError::Parse { lines, .. } if lines.start == 3));
    }

    #[test]
    fn test_missing_type_or_key() {
        assert!(matches!(parse_entry("@{k, year = 2008}"), Err(RefError::Parse { .. })));
        assert!(matches!(parse_entry("@article{, year = 2008}"), Err(RefError::Parse { .. })));
        assert!(matches!(
            parse_entry("@article{year = 2008, title = {x}}"),
            Err(RefError::Parse { .. })
        ));
    }

    #[test]
    fn test_invalid_field_values_carry_line() {
        let err = parse_entry("@article{k,\n  title = {x},\n  doi = {none},\n}").unwrap_err();
        assert!(matches!(err, RefError::Parse { lines, .. } if lines == LineRange::single(3)));
        let err = parse_entry("@article{k,\n  year = {08},\n}").unwrap_err();
        assert!(matches!(err, RefError::Parse { lines, .. } if lines == LineRange::single(2)));
    }

    #[test]
    fn test_blocks_keep_directives() {
        let blocks = parse_blocks(
            "% a comment\n@string{ngeo = {Nature Geoscience}}\n@comment{jabref-meta: x;}\n@book{Cuffey2010, title = {The Physics of Glaciers}}\n",
        )
        .unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0], Block::Directive("@string{ngeo = {Nature Geoscience}}".to_string()));
        assert!(matches!(&blocks[2], Block::Entry(e) if e.key == "Cuffey2010"));
    }

    #[test]
    fn test_string_macros_expand() {
        let blocks = parse_blocks(
            "@String(ngeo = \"Nature \" # {Geoscience})\n@article{Rignot2008, journal = NGEO, month = feb, note = ngeo # { Letters}}\n",
        )
        .unwrap();
        assert_eq!(blocks[0], Block::Directive("@String(ngeo = \"Nature \" # {Geoscience})".to_string()));
        let Block::Entry(entry) = &blocks[1] else { panic!("expected an entry") };
        assert_eq!(entry.text("journal").unwrap(), "Nature Geoscience");
        assert_eq!(entry.text("month").unwrap(), "feb");
        assert_eq!(entry.text("note").unwrap(), "Nature Geoscience Letters");
    }

    #[test]
    fn test_undefined_macro_is_parse_error() {
        let err = parse_entry("@article{k,\n  year = 2008,\n  journal = ngeo,\n}").unwrap_err();
        match err {
            RefError::Parse { lines, message } => {
                assert_eq!(lines, LineRange::single(3));
                assert!(message.contains("undefined macro ngeo"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_unbalanced_brace_in_quoted_value() {
        let err = parse_entry("@misc{k,\n  note = \"a } b\",\n}").unwrap_err();
        assert!(matches!(err, RefError::Parse { lines, .. } if lines == LineRange::single(2)));
        let entry = parse_entry("@misc{k, note = \"a {b} c\"}").unwrap();
        assert_eq!(entry.text("note").unwrap(), "a {b} c");
    }

    #[test]
    fn test_keywords_split() {
        let entry = parse_entry("@misc{k, keywords = {ice; glaciers, calving}}").unwrap();
        assert_eq!(
            entry.get("keywords"),
            Some(&FieldValue::List(vec!["ice".into(), "glaciers".into(), "calving".into()]))
        );
    }
}
