//! Best-effort metadata enrichment from Open Library.
//!
//! Nothing here returns an error: a failed lookup only means "no cover found".

use crate::models::BookMetadata;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

const SEARCH_URL: &str = "https://openlibrary.org/search.json";
const COVER_URL: &str = "https://covers.openlibrary.org/b/id";
const SEARCH_FIELDS: &str = "title,author_name,cover_i,isbn,publisher,first_publish_year";
/// Open Library answers with a tiny placeholder image when a cover is missing.
const MIN_COVER_BYTES: usize = 1000;
const UNKNOWN_VALUES: [&str; 2] = ["Unknown", "Sconosciuto"];

/// Fields a lookup could find; all optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichedMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub publish_year: Option<i64>,
    pub publisher: Option<String>,
    pub isbn: Option<String>,
    pub cover_id: Option<u64>,
    pub cover_image: Option<Vec<u8>>,
}

pub trait MetadataLookup: Send + Sync {
    /// Full record for the best match, if any.
    fn enrich(&self, title: &str, author: &str) -> Option<EnrichedMetadata>;

    /// Cover-only search, used when `enrich` found no image.
    fn fetch_cover(&self, title: &str, author: &str) -> Option<Vec<u8>>;
}

/// Lookup that never finds anything; used when enrichment is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLookup;

impl MetadataLookup for NoLookup {
    fn enrich(&self, _title: &str, _author: &str) -> Option<EnrichedMetadata> {
        None
    }

    fn fetch_cover(&self, _title: &str, _author: &str) -> Option<Vec<u8>> {
        None
    }
}

/// Return `metadata` with a cover filled in from `lookup` when it has none.
///
/// Title, author and language are always kept from the book itself.
pub fn enrich_book(metadata: &BookMetadata, lookup: &dyn MetadataLookup) -> BookMetadata {
    if metadata.cover_image.is_some() {
        debug!("Cover already present in EPUB; skipping online lookup");
        return metadata.clone();
    }

    info!(title = %metadata.title, "No cover in EPUB; searching online");
    let enriched = lookup.enrich(&metadata.title, &metadata.author);
    if let Some(record) = &enriched {
        info!(
            title = ?record.title,
            author = ?record.author,
            year = ?record.publish_year,
            publisher = ?record.publisher,
            isbn = ?record.isbn,
            cover_id = ?record.cover_id,
            "Matched catalogue record"
        );
    }
    let found = enriched
        .and_then(|record| record.cover_image)
        .or_else(|| {
            debug!("Enrichment returned no cover; trying direct cover search");
            lookup.fetch_cover(&metadata.title, &metadata.author)
        });

    match found {
        Some(cover) => {
            info!(bytes = cover.len(), "Cover found online");
            metadata.with_cover(cover)
        }
        None => {
            debug!("No cover found online");
            metadata.clone()
        }
    }
}

/// Open Library search + covers API over blocking HTTP with a bounded timeout.
pub struct OpenLibrary {
    client: Option<reqwest::blocking::Client>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    docs: Vec<SearchDoc>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchDoc {
    title: Option<String>,
    #[serde(default)]
    author_name: Vec<String>,
    cover_i: Option<u64>,
    #[serde(default)]
    isbn: Vec<String>,
    #[serde(default)]
    publisher: Vec<String>,
    first_publish_year: Option<i64>,
}

impl OpenLibrary {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ebup-audiobook/", env!("CARGO_PKG_VERSION")))
            .build();
        match client {
            Ok(client) => Self {
                client: Some(client),
            },
            Err(err) => {
                warn!("HTTP client unavailable; metadata lookup disabled: {err}");
                Self { client: None }
            }
        }
    }

    fn search(&self, title: &str, author: &str, fields: &str) -> Option<SearchDoc> {
        let client = self.client.as_ref()?;
        let params = search_params(title, author, fields)?;
        debug!(title, "Searching Open Library");
        let response = client
            .get(SEARCH_URL)
            .query(&params)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json::<SearchResponse>());
        match response {
            Ok(body) => {
                let first = body.docs.into_iter().next();
                if first.is_none() {
                    debug!(title, "No Open Library results");
                }
                first
            }
            Err(err) => {
                debug!("Open Library search failed: {err}");
                None
            }
        }
    }

    fn download_cover(&self, cover_id: u64) -> Option<Vec<u8>> {
        let client = self.client.as_ref()?;
        let url = cover_url(cover_id);
        info!(url = %url, "Downloading cover from Open Library");
        let bytes = client
            .get(&url)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.bytes());
        match bytes {
            Ok(bytes) if bytes.len() < MIN_COVER_BYTES => {
                debug!(bytes = bytes.len(), "Cover too small; likely a placeholder");
                None
            }
            Ok(bytes) => Some(bytes.to_vec()),
            Err(err) => {
                debug!("Cover download failed: {err}");
                None
            }
        }
    }
}

impl MetadataLookup for OpenLibrary {
    fn enrich(&self, title: &str, author: &str) -> Option<EnrichedMetadata> {
        let doc = self.search(title, author, SEARCH_FIELDS)?;
        let cover_image = doc.cover_i.and_then(|id| self.download_cover(id));
        Some(EnrichedMetadata {
            cover_image,
            ..enriched_from(doc)
        })
    }

    fn fetch_cover(&self, title: &str, author: &str) -> Option<Vec<u8>> {
        let cover_id = self.search(title, author, "cover_i")?.cover_i?;
        self.download_cover(cover_id)
    }
}

fn enriched_from(doc: SearchDoc) -> EnrichedMetadata {
    EnrichedMetadata {
        title: doc.title,
        author: doc.author_name.into_iter().next(),
        publish_year: doc.first_publish_year,
        publisher: doc.publisher.into_iter().next(),
        isbn: doc.isbn.into_iter().next(),
        cover_id: doc.cover_i,
        cover_image: None,
    }
}

fn is_known(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && !UNKNOWN_VALUES.contains(&value)
}

/// Query parameters for a search, or `None` when the title is unusable.
fn search_params(title: &str, author: &str, fields: &str) -> Option<Vec<(&'static str, String)>> {
    if !is_known(title) {
        return None;
    }
    let mut params = vec![
        ("title", title.trim().to_string()),
        ("limit", "1".to_string()),
        ("fields", fields.to_string()),
    ];
    if is_known(author) {
        params.push(("author", author.trim().to_string()));
    }
    Some(params)
}

fn cover_url(cover_id: u64) -> String {
    format!("{COVER_URL}/{cover_id}-L.jpg")
}
