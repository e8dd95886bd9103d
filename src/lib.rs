pub mod bibtex;
pub mod citekey;
pub mod config;
pub mod error;
pub mod organizer;
pub mod pipeline;
pub mod registry;
pub mod search;
pub mod sync;
pub mod transliteration;

pub use bibtex::{BibEntry, Bibliography};
pub use citekey::{CitekeyRequest, ExistingKeys};
pub use config::Settings;
pub use error::{RefError, Result};
