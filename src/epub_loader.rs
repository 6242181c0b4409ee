//! EPUB parsing: package metadata, cover art and spine-ordered chapters.

use crate::error::{ConvertError, ConvertResult};
use crate::models::{BookMetadata, Chapter};
use crate::normalizer::extract_chapter;
use epub::doc::EpubDoc;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const UNKNOWN: &str = "Unknown";
const DEFAULT_LANGUAGE: &str = "it";
/// Images at or below this size are treated as placeholders, not covers.
pub const MIN_COVER_BYTES: usize = 1000;

/// Read `path` and return its metadata plus chapters in spine order.
///
/// Spine entries whose text is empty after cleanup are dropped; the surviving
/// chapters are numbered `0..N` with no gaps. A book with no chapter left is a
/// [`ConvertError::ParseFailure`].
pub fn parse_epub(path: &Path) -> ConvertResult<(BookMetadata, Vec<Chapter>)> {
    info!(path = %path.display(), "Loading EPUB content");
    let fail = |reason: String| ConvertError::ParseFailure {
        path: path.to_path_buf(),
        reason,
    };

    let mut doc = EpubDoc::new(path).map_err(|err| fail(format!("cannot open EPUB: {err}")))?;
    debug!(
        resources = doc.resources.len(),
        spine = doc.spine.len(),
        "Opened package document"
    );

    let metadata = BookMetadata {
        title: metadata_field(&doc, "title").unwrap_or_else(|| UNKNOWN.to_string()),
        author: metadata_field(&doc, "creator").unwrap_or_else(|| UNKNOWN.to_string()),
        language: metadata_field(&doc, "language").unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        cover_image: find_cover(&mut doc),
    };

    let spine: Vec<String> = doc.spine.iter().map(|item| item.idref.clone()).collect();
    let mut chapters = Vec::new();
    for idref in &spine {
        let Some(mime) = doc.get_resource_mime(idref) else {
            warn!(idref = %idref, "Spine references unknown manifest item; skipping");
            continue;
        };
        if !mime.contains("html") {
            debug!(idref = %idref, media_type = %mime, "Skipping non-document spine item");
            continue;
        }
        let Some((markup, _)) = doc.get_resource_str(idref) else {
            warn!(idref = %idref, "Manifest target missing from archive; skipping");
            continue;
        };
        let extracted = extract_chapter(&markup);
        if extracted.text.is_empty() {
            debug!(idref = %idref, "Skipped empty spine item");
            continue;
        }
        let index = chapters.len();
        let title = extracted
            .title
            .unwrap_or_else(|| format!("Chapter {}", index + 1));
        debug!(chapter = index, title = %title, chars = extracted.text.len(), "Parsed chapter");
        chapters.push(Chapter {
            index,
            title,
            text: extracted.text,
        });
    }

    if chapters.is_empty() {
        return Err(fail("no chapters with readable text".into()));
    }

    info!(
        chapters = chapters.len(),
        title = %metadata.title,
        author = %metadata.author,
        has_cover = metadata.cover_image.is_some(),
        "Finished loading EPUB content"
    );
    Ok((metadata, chapters))
}

/// First non-blank Dublin Core value, whitespace collapsed.
fn metadata_field<R: Read + Seek>(doc: &EpubDoc<R>, name: &str) -> Option<String> {
    let item = doc.mdata(name)?;
    let value = item.value.split_whitespace().collect::<Vec<_>>().join(" ");
    (!value.is_empty()).then_some(value)
}

/// Cover declared by the package first, then any image whose id or path
/// mentions "cover". Placeholders are skipped.
fn find_cover<R: Read + Seek>(doc: &mut EpubDoc<R>) -> Option<Vec<u8>> {
    let declared = doc.get_cover_id();
    if let Some((bytes, _)) = doc.get_cover() {
        if bytes.len() > MIN_COVER_BYTES {
            debug!(id = ?declared, bytes = bytes.len(), "Found declared cover image");
            return Some(bytes);
        }
        debug!(id = ?declared, bytes = bytes.len(), "Ignoring placeholder cover");
    }

    let mut named: Vec<String> = doc
        .resources
        .iter()
        .filter(|(id, item)| {
            item.mime.starts_with("image/")
                && Some(id.as_str()) != declared.as_deref()
                && (id.to_ascii_lowercase().contains("cover")
                    || item.path.to_string_lossy().to_ascii_lowercase().contains("cover"))
        })
        .map(|(id, _)| id.clone())
        .collect();
    named.sort();

    for id in named {
        match doc.get_resource(&id) {
            Some((bytes, _)) if bytes.len() > MIN_COVER_BYTES => {
                debug!(id = %id, bytes = bytes.len(), "Found cover by name");
                return Some(bytes);
            }
            Some((bytes, _)) => {
                debug!(id = %id, bytes = bytes.len(), "Ignoring placeholder cover");
            }
            None => debug!(id = %id, "Cover entry missing from archive"),
        }
    }
    debug!("No cover found in EPUB");
    None
}

/// Convenience for callers that only need the output path next to the book.
pub fn default_output_path(input: &Path) -> PathBuf {
    input.with_extension("m4b")
}
