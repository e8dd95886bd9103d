use std::time::Duration;

use backoff::{retry, ExponentialBackoff};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde_json::Value;

use crate::bibtex::{normalize_doi, BibEntry, BibEntryBuilder};
use crate::config::RegistrySettings;
use crate::error::{RefError, Result};

static MARKUP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"</?[A-Za-z][^>]*>").expect("Invalid markup regex pattern")
});

const USER_AGENT: &str = concat!("reftool/", env!("CARGO_PKG_VERSION"));

/// Bibliographic record returned by a citation registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkMetadata {
    pub doi: String,
    /// CSL type such as `journal-article` or `dataset`.
    pub work_type: String,
    pub title: Option<String>,
    /// `Family, Given` names; organizations are wrapped in braces.
    pub authors: Vec<String>,
    pub editors: Vec<String>,
    pub container_title: Option<String>,
    pub short_container_title: Option<String>,
    pub year: Option<String>,
    pub month: Option<u32>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub page: Option<String>,
    pub publisher: Option<String>,
    pub issn: Option<String>,
    pub isbn: Option<String>,
    pub url: Option<String>,
}

/// A source of metadata keyed by DOI.
pub trait MetadataRegistry {
    fn name(&self) -> &str;

    /// Fetch the record for a DOI. Fails with `NotFound` when the registry
    /// has no such DOI and `Network` when it cannot be reached.
    fn fetch(&self, doi: &str) -> Result<WorkMetadata>;
}

/// Registries selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryKind {
    Crossref,
    DataCite,
}

/// Build the client for a registry from the user's settings.
pub fn registry_for(kind: RegistryKind, settings: &RegistrySettings) -> Result<Box<dyn MetadataRegistry>> {
    Ok(match kind {
        RegistryKind::Crossref => Box::new(Crossref::new(settings)?),
        RegistryKind::DataCite => Box::new(DataCite::new(settings)?),
    })
}

/// Blocking JSON client shared by the registry implementations.
struct JsonClient {
    client: Client,
    max_retry: Duration,
}

impl JsonClient {
    fn new(settings: &RegistrySettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            max_retry: Duration::from_secs(settings.max_retry_secs),
        })
    }

    /// GET a JSON document, retrying connection failures and server errors.
    fn get_json(&self, url: &str, doi: &str) -> Result<Value> {
        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(5),
            max_elapsed_time: Some(self.max_retry),
            ..Default::default()
        };

        let operation = || {
            debug!("GET {}", url);
            let response = self
                .client
                .get(url)
                .header(reqwest::header::ACCEPT, "application/json")
                .send()
                .map_err(|e| backoff::Error::transient(RefError::from(e)))?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Err(backoff::Error::permanent(RefError::NotFound(doi.to_string())));
            }
            if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                warn!("{} returned status {}, retrying", url, status);
                return Err(backoff::Error::transient(RefError::Network(format!(
                    "{url} returned status {status}"
                ))));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(RefError::Network(format!(
                    "{url} returned status {status}"
                ))));
            }
            let body = response
                .text()
                .map_err(|e| backoff::Error::permanent(RefError::from(e)))?;
            serde_json::from_str::<Value>(&body).map_err(|e| backoff::Error::permanent(RefError::from(e)))
        };

        retry(backoff, operation).map_err(|err| match err {
            backoff::Error::Permanent(e) => e,
            backoff::Error::Transient { err, .. } => err,
        })
    }
}

fn base_url(env_var: &str, configured: &str) -> String {
    std::env::var(env_var)
        .unwrap_or_else(|_| configured.to_string())
        .trim_end_matches('/')
        .to_string()
}

/// Registry payload that is valid JSON but not the expected shape.
fn malformed(message: String) -> RefError {
    RefError::Json(<serde_json::Error as serde::de::Error>::custom(message))
}

/// `{base}/{segments...}/{doi}` with each path segment percent-encoded.
/// The slashes inside a DOI stay path separators.
fn lookup_url(base: &str, segments: &[&str], doi: &str) -> Result<Url> {
    let mut url = Url::parse(base)
        .map_err(|e| RefError::Config(format!("invalid registry URL {base:?}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| RefError::Config(format!("registry URL {base:?} cannot take a path")))?
        .pop_if_empty()
        .extend(segments.iter().copied().chain(doi.split('/')));
    Ok(url)
}

fn checked_doi(doi: &str) -> Result<String> {
    normalize_doi(doi).ok_or_else(|| RefError::InvalidInput(format!("invalid DOI {doi:?}")))
}

/// Crossref REST API (`/works/{doi}`).
pub struct Crossref {
    http: JsonClient,
    base_url: String,
}

impl Crossref {
    pub fn new(settings: &RegistrySettings) -> Result<Self> {
        Ok(Self {
            http: JsonClient::new(settings)?,
            base_url: base_url("CROSSREF_BASE_URL", &settings.crossref_url),
        })
    }
}

impl MetadataRegistry for Crossref {
    fn name(&self) -> &str {
        "Crossref"
    }

    fn fetch(&self, doi: &str) -> Result<WorkMetadata> {
        let doi = checked_doi(doi)?;
        info!("Querying Crossref for DOI {}", doi);
        let url = lookup_url(&self.base_url, &["works"], &doi)?;
        let response = self.http.get_json(url.as_str(), &doi)?;
        let message = response
            .get("message")
            .ok_or_else(|| malformed(format!("Crossref response for {doi} has no message")))?;
        parse_csl_json(&doi, message)
    }
}

/// DataCite content negotiation endpoint returning CSL JSON.
pub struct DataCite {
    http: JsonClient,
    base_url: String,
}

impl DataCite {
    pub fn new(settings: &RegistrySettings) -> Result<Self> {
        Ok(Self {
            http: JsonClient::new(settings)?,
            base_url: base_url("DATACITE_BASE_URL", &settings.datacite_url),
        })
    }
}

impl MetadataRegistry for DataCite {
    fn name(&self) -> &str {
        "DataCite"
    }

    fn fetch(&self, doi: &str) -> Result<WorkMetadata> {
        let doi = checked_doi(doi)?;
        info!("Querying DataCite for DOI {}", doi);
        let url = lookup_url(
            &self.base_url,
            &["dois", "application", "vnd.citationstyles.csl+json"],
            &doi,
        )?;
        let response = self.http.get_json(url.as_str(), &doi)?;
        parse_csl_json(&doi, &response)
    }
}

/// A CSL string that may also arrive as a one-element array.
fn csl_text(record: &Value, field: &str) -> Option<String> {
    let value = match record.get(field)? {
        Value::Array(items) => items.first()?,
        other => other,
    };
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let text = MARKUP_REGEX.replace_all(&text, "");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

fn csl_names(record: &Value, field: &str) -> Vec<String> {
    let Some(people) = record.get(field).and_then(Value::as_array) else {
        return Vec::new();
    };
    people
        .iter()
        .filter_map(|person| {
            if let Some(literal) = person.get("literal").and_then(Value::as_str) {
                return Some(format!("{{{}}}", literal.trim()));
            }
            // DataCite sends organizations as a bare `name`
            let family = person.get("family").and_then(Value::as_str);
            let given = person.get("given").and_then(Value::as_str);
            match (family, given) {
                (Some(family), Some(given)) => Some(format!("{}, {}", family.trim(), given.trim())),
                (Some(family), None) => Some(family.trim().to_string()),
                (None, _) => person
                    .get("name")
                    .and_then(Value::as_str)
                    .map(|name| format!("{{{}}}", name.trim())),
            }
        })
        .collect()
}

/// Year and month from the first available of the print, online and issued dates.
fn csl_date(record: &Value) -> (Option<String>, Option<u32>) {
    for field in ["published-print", "published-online", "issued"] {
        let Some(parts) = record
            .get(field)
            .and_then(|date| date.get("date-parts"))
            .and_then(|parts| parts.get(0))
            .and_then(Value::as_array)
        else {
            continue;
        };
        let number = |value: &Value| {
            value
                .as_u64()
                .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        };
        if let Some(year) = parts.first().and_then(number) {
            let month = parts.get(1).and_then(number).map(|m| m as u32);
            return (Some(format!("{year:04}")), month);
        }
    }
    (None, None)
}

/// ISSN of the print edition when the record distinguishes them.
fn csl_issn(record: &Value) -> Option<String> {
    if let Some(types) = record.get("issn-type").and_then(Value::as_array) {
        for wanted in ["print", "electronic"] {
            let found = types.iter().find(|t| t.get("type").and_then(Value::as_str) == Some(wanted));
            if let Some(value) = found.and_then(|t| t.get("value")).and_then(Value::as_str) {
                return Some(value.to_string());
            }
        }
    }
    csl_text(record, "ISSN")
}

/// Read a CSL JSON record as served by Crossref and DataCite.
pub fn parse_csl_json(doi: &str, record: &Value) -> Result<WorkMetadata> {
    if !record.is_object() {
        return Err(malformed(format!("registry record for {doi} is not an object")));
    }
    let (year, month) = csl_date(record);
    Ok(WorkMetadata {
        doi: csl_text(record, "DOI").unwrap_or_else(|| doi.to_string()),
        work_type: csl_text(record, "type").unwrap_or_default(),
        title: csl_text(record, "title"),
        authors: csl_names(record, "author"),
        editors: csl_names(record, "editor"),
        container_title: csl_text(record, "container-title"),
        short_container_title: csl_text(record, "short-container-title"),
        year,
        month,
        volume: csl_text(record, "volume"),
        issue: csl_text(record, "issue"),
        page: csl_text(record, "page"),
        publisher: csl_text(record, "publisher"),
        issn: csl_issn(record),
        isbn: csl_text(record, "ISBN"),
        url: csl_text(record, "URL"),
    })
}

fn entry_type_for(work_type: &str) -> &'static str {
    match work_type {
        "journal-article" | "article" | "article-journal" => "article",
        "book-chapter" | "chapter" => "inbook",
        "book" | "monograph" | "edited-book" => "book",
        "proceedings-article" | "paper-conference" => "inproceedings",
        "report" => "techreport",
        "thesis" | "dissertation" => "phdthesis",
        _ => "misc",
    }
}

impl WorkMetadata {
    /// Surname of the first author.
    pub fn first_author_surname(&self) -> Option<&str> {
        self.authors.first().map(|name| crate::bibtex::names::family_name(name))
    }

    /// Build an entry without a key; the caller assigns one.
    pub fn to_entry(&self) -> Result<BibEntry> {
        let year = self
            .year
            .as_deref()
            .ok_or_else(|| RefError::InvalidInput(format!("registry record for {} has no year", self.doi)))?;

        let mut builder = BibEntryBuilder::new("", entry_type_for(&self.work_type));
        if !self.authors.is_empty() {
            builder = builder.field("author", self.authors.join(" and "));
        }
        if !self.editors.is_empty() {
            builder = builder.field("editor", self.editors.join(" and "));
        }
        let container = if entry_type_for(&self.work_type) == "article" { "journal" } else { "booktitle" };
        let optional = [
            ("title", self.title.as_deref()),
            (container, self.container_title.as_deref()),
            ("volume", self.volume.as_deref()),
            ("number", self.issue.as_deref()),
            ("pages", self.page.as_deref()),
            ("publisher", self.publisher.as_deref()),
            ("issn", self.issn.as_deref()),
            ("isbn", self.isbn.as_deref()),
            ("url", self.url.as_deref()),
        ];
        builder = builder
            .field("year", year)
            .field("doi", self.doi.as_str())
            .fields(optional.into_iter().filter_map(|(field, value)| value.map(|v| (field, v))));
        if let Some(month) = self.month.filter(|m| (1..=12).contains(m)) {
            builder = builder.field("month", month.to_string());
        }
        builder.build()
    }
}
