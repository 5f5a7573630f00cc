
/// Encode a path list into a single NUL-separated UTF-8 buffer.
///
/// Two passes over `paths`: the first computes the exact output length so the
/// buffer is allocated once, the second writes it. A path containing an
/// internal `\0` is lossified to an empty segment — NUL is illegal in
/// filesystem paths, so this is the only sane encoding choice.
pub fn encode<T: AsRef<str>>(paths: &[T]) -> Vec<u8> {
    let mut len = 0usize;
    for p in paths {
        let p = p.as_ref();
        if p.is_empty() || p.contains('\0') {
            len += 1;
        } else {
            len += p.len() + 1;
        }
    }

    let mut out = Vec::with_capacity(len);
    for p in paths {
        let p = p.as_ref();
        if !p.is_empty() && !p.contains('\0') {
            out.extend_from_slice(p.as_bytes());
        }
        out.push(0);
    }
    out
}

/// Decode a NUL-separated UTF-8 buffer into an owned path list.
///
/// Accepts both trailing-NUL and no-trailing-NUL forms. Empty input yields
/// an empty list; an empty run between two NULs (or at buffer start/end)
/// yields an empty string segment.
pub fn decode(bytes: &[u8]) -> Vec<String> {
    iterate(bytes).map(|s| s.to_string()).collect()
}

/// Lazily iterate the path segments of a NUL-separated buffer, borrowing
/// from it where the segment is valid UTF-8 without owning a copy.
///
/// Non-UTF-8 segments are replaced with the empty string rather than
/// panicking — the wire contract promises UTF-8, but a reader must not
/// crash on a malformed buffer it did not produce itself.
pub fn iterate(bytes: &[u8]) -> Iter<'_> {
    Iter { bytes, pos: 0, done: bytes.is_empty() }
}

/// Cursor over a NUL-separated buffer; each `next()` scans forward from the
/// last cursor position to the next `\0` (or the buffer end) and decodes
/// only that segment, so segments after the first are never touched until
/// asked for.
pub struct Iter<'a> {
    bytes: &'a [u8],
    pos: usize,
    done: bool,
}

impl<'a> Iterator for Iter<'a> {
    type Item = std::borrow::Cow<'a, str>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let start = self.pos;
        if start >= self.bytes.len() {
            // Trailing NUL consumed exactly at the buffer end — no final
            // unterminated segment to yield.
            self.done = true;
            return None;
        }
        match self.bytes[start..].iter().position(|&b| b == 0) {
            Some(offset) => {
                self.pos = start + offset + 1;
                Some(decode_segment(&self.bytes[start..start + offset]))
            }
            None => {
                self.done = true;
                Some(decode_segment(&self.bytes[start..]))
            }
        }
    }
}

fn decode_segment(raw: &[u8]) -> std::borrow::Cow<'_, str> {
    match std::str::from_utf8(raw) {
        Ok(s) => std::borrow::Cow::Borrowed(s),
        Err(_) => std::borrow::Cow::Owned(String::new()),
    }
}
