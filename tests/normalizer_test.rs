use reftool::bibtex::{parse_entry, parse_ris_entry, BibEntry, Bibliography, FieldValue, RisFieldMap};
use reftool::citekey::ExistingKeys;
use reftool::error::LineRange;
use reftool::pipeline::Pipeline;
use reftool::transliteration::{to_latex, to_plain};
use reftool::{RefError, Settings};

const CANONICAL: &str = "@article{Rignot2008,
author = {Rignot, E. and Bamber, J. L. and van den Broeke, M. R. and Davis, C. and Li, Y. and van de Berg, W. J. and van Meijgaard, E.},
title = {{Recent {Antarctic} ice mass loss from radar interferometry and regional climate modelling}},
journal = {Nature Geoscience},
year = {2008},
month = jan,
volume = {1},
number = {2},
pages = {106--110},
doi = {10.1038/ngeo102},
issn = {1752-0894},
url = {https://doi.org/10.1038/ngeo102},
keywords = {ice sheets, mass balance},
}
";

#[test]
fn test_canonical_entry_round_trips_byte_identical() {
    let entry = parse_entry(CANONICAL).unwrap();
    assert_eq!(entry.to_string(), CANONICAL);
    assert_eq!(entry.authors().len(), 7);
}

#[test]
fn test_messy_entry_is_normalized() {
    let messy = "  @ARTICLE{ Kaab2005 ,\n\tdoi = \"doi:10.1016/j.rse.2005.03.006\",\n  Title = \"Combination   of SRTM3 and repeat ASTER data\n for deriving alpine glacier flow velocities\",\n  author = {K\u{00E4}\u{00E4}b, A.},\n  pages = {463-466}, year = {2005},\n  journal = {Remote Sensing of Environment}}\n";
    let entry = parse_entry(messy).unwrap();
    let expected = "@article{Kaab2005,
author = {K{\\\"a}{\\\"a}b, A.},
title = {{Combination of SRTM3 and repeat ASTER data for deriving alpine glacier flow velocities}},
journal = {Remote Sensing of Environment},
year = {2005},
pages = {463--466},
doi = {10.1016/j.rse.2005.03.006},
}
";
    assert_eq!(entry.to_string(), expected);
    // Normalized output is stable
    assert_eq!(parse_entry(expected).unwrap().to_string(), expected);
}

#[test]
fn test_unknown_fields_survive() {
    let entry = parse_entry(
        "@dataset{Mouginot2017,\n  x-archive = {NSIDC-0709},\n  author = {Mouginot, J.},\n  year = {2017},\n  file = {:Mouginot2017.pdf:PDF},\n}",
    )
    .unwrap();
    assert_eq!(entry.entry_type, "dataset");
    let output = entry.to_string();
    assert_eq!(
        output,
        "@dataset{Mouginot2017,\nauthor = {Mouginot, J.},\nyear = {2017},\nfile = {:Mouginot2017.pdf:PDF},\nx-archive = {NSIDC-0709},\n}\n"
    );
}

#[test]
fn test_missing_closing_brace_is_parse_error() {
    let err = parse_entry("@article{Box2012,\n  author = {Box, J. E.},\n  year = {2012},\n\n").unwrap_err();
    match err {
        RefError::Parse { lines, .. } => assert_eq!(lines, LineRange::new(1, 5)),
        other => panic!("expected a parse error, got {other:?}"),
    }
}

#[test]
fn test_minimal_ris_to_bibtex() {
    let mut entry = parse_ris_entry(
        "TY  - JOUR\nAU  - Rignot, E.\nPY  - 2008\nJO  - Nature Geoscience\nER  -\n",
        &RisFieldMap::default(),
    )
    .unwrap();
    entry.key = "Rignot2008".to_string();
    let bibtex = entry.to_string();
    assert!(bibtex.contains("author = {Rignot, E.},"));
    assert!(bibtex.contains("year = {2008},"));
    assert!(bibtex.contains("journal = {Nature Geoscience},"));
}

#[test]
fn test_ris_authors_keep_citation_order() {
    let entry = parse_ris_entry(
        "TY  - JOUR\nAU  - Box, Jason E.\nA1  - Fettweis, X.\nAU  - Stroeve, J. C.\nPY  - 2012\nER  -\n",
        &RisFieldMap::default(),
    )
    .unwrap();
    assert_eq!(
        entry.get("author"),
        Some(&FieldValue::List(vec![
            "Box, Jason E.".to_string(),
            "Fettweis, X.".to_string(),
            "Stroeve, J. C.".to_string(),
        ]))
    );
}

#[test]
fn test_ris_output_restores_unicode() {
    let entry = BibEntry::builder("Kaab2005", "article")
        .field("author", "K\u{00E4}\u{00E4}b, A.")
        .field("year", "2005")
        .build()
        .unwrap();
    let ris = entry.to_ris();
    assert!(ris.contains("AU  - K\u{00E4}\u{00E4}b, A.\n"));
    assert!(ris.contains("PY  - 2005\n"));
}

#[test]
fn test_bibliography_keeps_directives_and_order() {
    let text = "@preamble{\"\\newcommand{\\noopsort}[1]{}\"}\n\n@misc{B2000,\nyear = {2000},\n}\n\n@misc{A2001,\nyear = {2001},\n}\n";
    let bibliography = Bibliography::parse(text).unwrap();
    let keys: Vec<&str> = bibliography.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, ["B2000", "A2001"]);
    assert_eq!(bibliography.to_string(), text);
}

#[test]
fn test_transliteration_is_idempotent() {
    let names = ["M\u{00FC}ller", "\u{00C5}str\u{00F6}m", "Garc\u{00ED}a", "K\u{00E4}\u{00E4}b", "\u{0141}ukasz"];
    for name in names {
        let latex = to_latex(name);
        assert_eq!(to_latex(&latex), latex);
        let plain = to_plain(name);
        assert_eq!(to_plain(&plain), plain);
        assert!(plain.is_ascii(), "{plain} is not ASCII");
    }
}

#[test]
fn test_string_macros_are_expanded_when_formatting() {
    let pipeline = Pipeline::new(Settings::default()).unwrap();
    let mut existing = ExistingKeys::new();
    let entries = pipeline
        .format_bibtex(
            "@string{ngeo = {Nature Geoscience}}\n@article{x, author = {Rignot, E.}, year = 2008, journal = ngeo}",
            &mut existing,
        )
        .unwrap();
    assert_eq!(
        entries[0].to_string(),
        "@article{Rignot2008,\nauthor = {Rignot, E.},\njournal = {Nature Geoscience},\nyear = {2008},\n}\n"
    );
}

#[test]
fn test_undefined_macro_fails_the_file() {
    let pipeline = Pipeline::new(Settings::default()).unwrap();
    let mut existing = ExistingKeys::new();
    let err = pipeline
        .format_bibtex("@article{x,\nauthor = {Rignot, E.},\nyear = 2008,\njournal = ngeo,\n}", &mut existing)
        .unwrap_err();
    match err.downcast_ref::<RefError>() {
        Some(RefError::Parse { lines, message }) => {
            assert_eq!(*lines, LineRange::single(4));
            assert!(message.contains("undefined macro ngeo"));
        }
        other => panic!("expected a parse error, got {other:?}"),
    }
    assert!(existing.is_empty());
}

#[test]
fn test_quoted_value_with_stray_brace_is_rejected() {
    let err = parse_entry("@misc{k,\n  note = \"a } b\",\n}").unwrap_err();
    assert!(matches!(err, RefError::Parse { lines, .. } if lines == LineRange::single(2)));
}

#[test]
fn test_normalized_output_reparses_to_itself() {
    let inputs = [
        "@misc{k, note = \"a {b} c\", title = \"{DEM} of \" # {Greenland}, month = 6}",
        "@string{jog = \"Journal of Glaciology\"}\n@article{k, journal = jog, pages = {1 - 9}}",
    ];
    for input in inputs {
        let once = Bibliography::parse(input).unwrap().into_entries().remove(0).to_string();
        assert_eq!(parse_entry(&once).unwrap().to_string(), once);
    }
}
