//! Person-name handling for author and editor lists.

use crate::bibtex::{collapse_whitespace, is_fully_braced};
use crate::citekey::{is_all_uppercase, title_case};

/// Lowercase particles that start a compound surname (`van den Broeke`).
const SURNAME_PARTICLES: &[&str] = &[
    "van", "von", "de", "der", "den", "la", "le", "los", "du", "da", "del", "di",
];

/// Split a BibTeX name list on `and` at brace depth zero.
pub fn split_names(value: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut depth: i32 = 0;
    for word in value.split_whitespace() {
        if depth == 0 && word.eq_ignore_ascii_case("and") {
            if !current.is_empty() {
                names.push(current.join(" "));
                current.clear();
            }
            continue;
        }
        for c in word.chars() {
            match c {
                '{' => depth += 1,
                '}' => depth -= 1,
                _ => {}
            }
        }
        current.push(word);
    }
    if !current.is_empty() {
        names.push(current.join(" "));
    }
    names
}

/// Put a space after initials that were run together: `E.J.` becomes `E. J.`
fn split_initials(given: &str) -> String {
    let mut out = String::with_capacity(given.len() + 4);
    let mut chars = given.chars().peekable();
    while let Some(c) = chars.next() {
        out.push(c);
        if c == '.' && chars.peek().is_some_and(|next| next.is_uppercase()) {
            out.push(' ');
        }
    }
    out
}

/// Format one person as `Family, Given`.
///
/// Names without a comma are flipped at the last word, or at the first
/// surname particle after the given names. A name wrapped in braces is a
/// corporate author and kept verbatim.
pub fn format_person(raw: &str) -> String {
    let name = collapse_whitespace(raw);
    if name.is_empty() || is_fully_braced(&name) {
        return name;
    }
    let name = if is_all_uppercase(&name) { title_case(&name) } else { name };

    let (family, given) = match name.split_once(',') {
        Some((family, given)) => (family.trim().to_string(), given.trim().to_string()),
        None => {
            let words: Vec<&str> = name.split(' ').collect();
            if words.len() == 1 {
                return name;
            }
            let split_at = words
                .iter()
                .enumerate()
                .skip(1)
                .find(|(_, w)| SURNAME_PARTICLES.contains(*w))
                .map(|(i, _)| i)
                .unwrap_or(words.len() - 1);
            (words[split_at..].join(" "), words[..split_at].join(" "))
        }
    };

    if given.is_empty() {
        family
    } else {
        format!("{}, {}", family, split_initials(&given))
    }
}

/// Surname of a formatted `Family, Given` name.
pub fn family_name(formatted: &str) -> &str {
    let name = formatted.trim();
    if is_fully_braced(name) {
        return &name[1..name.len() - 1];
    }
    name.split(',').next().unwrap_or(name).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_names() {
        assert_eq!(
            split_names("Rignot, E. and Box, J. E.\n   AND Burgess, E."),
            vec!["Rignot, E.", "Box, J. E.", "Burgess, E."]
        );
        assert_eq!(
            split_names("{Barnes and Noble} and Smith, A."),
            vec!["{Barnes and Noble}", "Smith, A."]
        );
    }

    #[test]
    fn test_format_person() {
        assert_eq!(format_person("Rignot, E."), "Rignot, E.");
        assert_eq!(format_person("Eric Rignot"), "Rignot, Eric");
        assert_eq!(format_person("Michiel R. van den Broeke"), "van den Broeke, Michiel R.");
        assert_eq!(format_person("Box, J.E."), "Box, J. E.");
        assert_eq!(format_person("RIGNOT, E."), "Rignot, E.");
        assert_eq!(format_person("{IPCC}"), "{IPCC}");
        assert_eq!(format_person("Plato"), "Plato");
    }

    #[test]
    fn test_family_name() {
        assert_eq!(family_name("van den Broeke, M. R."), "van den Broeke");
        assert_eq!(family_name("{IPCC}"), "IPCC");
        assert_eq!(family_name("Plato"), "Plato");
    }
}
