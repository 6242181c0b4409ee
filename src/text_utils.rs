//! Text splitting helpers for request-size-limited engines.

/// Lightweight sentence splitter: a sentence ends at `.`, `!`, `?` or `…`
/// followed by whitespace. The separating whitespace is dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        current.push(ch);
        let terminal = matches!(ch, '.' | '!' | '?' | '…');
        if terminal && chars.peek().is_some_and(|next| next.is_whitespace()) {
            while chars.peek().is_some_and(|next| next.is_whitespace()) {
                chars.next();
            }
            if current.chars().any(|c| !c.is_whitespace()) {
                sentences.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
        }
    }

    if current.chars().any(|c| !c.is_whitespace()) {
        sentences.push(current);
    }

    sentences
}

/// Group sentences into chunks of at most `max_chars` characters, joined by a
/// single space. A lone sentence longer than the limit becomes its own chunk.
///
/// Text already within the limit is returned unchanged as one chunk.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for sentence in split_sentences(text) {
        let len = sentence.chars().count();
        if !current.is_empty() && current_len + len + 1 > max_chars {
            chunks.push(current.trim().to_string());
            current = sentence;
            current_len = len;
        } else if current.is_empty() {
            current = sentence;
            current_len = len;
        } else {
            current.push(' ');
            current.push_str(&sentence);
            current_len += len + 1;
        }
    }

    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }

    if chunks.is_empty() {
        vec![text.to_string()]
    } else {
        chunks
    }
}
