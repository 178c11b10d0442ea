//! Message splitting.

/// Default maximum chunk size in bytes
pub const MAX_MESSAGE_SIZE: usize = 2048;

/// Bytes of message text kept when a message is logged
const PREVIEW_LEN: usize = 64;

/// Split `text` into ordered chunks of at most `limit` bytes.
///
/// Joining the chunks gives back `text` exactly. Cuts always land on a char
/// boundary, so a chunk can be shorter than `limit` even when more text
/// follows. A single char wider than `limit` becomes a chunk of its own.
/// Text that already fits is returned as one chunk, including the empty
/// string.
pub fn split_message(text: &str, limit: usize) -> Vec<&str> {
    if text.len() <= limit {
        return vec![text];
    }

    let mut chunks = Vec::with_capacity(text.len().div_ceil(limit.max(1)));
    let mut rest = text;

    while !rest.is_empty() {
        let mut end = floor_char_boundary(rest, limit);
        if end == 0 {
            end = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }

        let (chunk, tail) = rest.split_at(end);
        chunks.push(chunk);
        rest = tail;
    }

    chunks
}

/// Short prefix of `text` for log lines
pub(crate) fn preview(text: &str) -> &str {
    &text[..floor_char_boundary(text, PREVIEW_LEN)]
}

/// Largest char boundary of `s` that is `<= index`
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    (0..=index)
        .rev()
        .find(|&i| s.is_char_boundary(i))
        .unwrap_or(0)
}
