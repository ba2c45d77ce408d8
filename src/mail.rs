//! Mail header handling for the common-header chunk.

extern crate alloc;
use alloc::vec::Vec;

/// Fields copied into the common-header chunk, in output order.
pub const COMMON_FIELDS: [&str; 10] = [
    "Date",
    "Subject",
    "From",
    "Sender",
    "Reply-To",
    "To",
    "Cc",
    "Bcc",
    "In-Reply-To",
    "Message-ID",
];

/// Length of the header block, including the blank line that ends it.
///
/// A message without a blank line is all header.
pub fn header_end(message: &[u8]) -> usize {
    let mut start = 0;
    while start < message.len() {
        let end = match message[start..].iter().position(|&b| b == b'\n') {
            Some(offset) => start + offset,
            None => return message.len(),
        };
        let line = &message[start..end];
        if line.is_empty() || line == b"\r" {
            return end + 1;
        }
        start = end + 1;
    }
    message.len()
}

fn lines(header: &[u8]) -> impl Iterator<Item = &[u8]> {
    header.split(|&b| b == b'\n').map(|line| line.strip_suffix(b"\r").unwrap_or(line))
}

fn is_continuation(line: &[u8]) -> bool {
    matches!(line.first(), Some(b' ') | Some(b'\t'))
}

fn field_value<'a>(line: &'a [u8], name: &str) -> Option<&'a [u8]> {
    let colon = line.iter().position(|&b| b == b':')?;
    if line[..colon].eq_ignore_ascii_case(name.as_bytes()) {
        Some(&line[colon + 1..])
    } else {
        None
    }
}

/// Collapse every whitespace run to one space and trim both ends.
fn clean(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    for word in raw.split(|b| b.is_ascii_whitespace()).filter(|w| !w.is_empty()) {
        if !out.is_empty() {
            out.push(b' ');
        }
        out.extend_from_slice(word);
    }
    out
}

/// First occurrence of `name` (case-insensitive), unfolded onto one line.
///
/// Returns `None` if the field is missing or empty.
pub fn header_fetch_cleaned(header: &[u8], name: &str) -> Option<Vec<u8>> {
    let mut raw: Option<Vec<u8>> = None;

    for line in lines(header) {
        if line.is_empty() {
            break;
        }
        match raw.as_mut() {
            Some(value) if is_continuation(line) => {
                value.push(b' ');
                value.extend_from_slice(line);
            }
            Some(_) => break,
            None => {
                if let Some(value) = field_value(line, name) {
                    raw = Some(value.to_vec());
                }
            }
        }
    }

    let value = clean(&raw?);
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// `Name: value\n` for every present common field, in `COMMON_FIELDS` order.
pub fn common_headers(header: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for name in COMMON_FIELDS {
        if let Some(value) = header_fetch_cleaned(header, name) {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(&value);
            out.push(b'\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESSAGE: &[u8] = b"Received: from mx.example.com\r\n\
        Subject: quarterly\r\n  numbers\r\n\
        From: Alice <alice@example.com>\r\n\
        to: bob@example.com\r\n\
        X-Empty:   \r\n\
        \r\n\
        Body line one\r\nSubject: not a header\r\n";

    #[test]
    fn header_end_includes_blank_line() {
        let end = header_end(MESSAGE);
        assert!(MESSAGE[..end].ends_with(b"\r\n\r\n"));
        assert!(MESSAGE[end..].starts_with(b"Body line one"));
        assert_eq!(header_end(b"A: b\n\nbody"), 6);
    }

    #[test]
    fn header_end_without_blank_line() {
        assert_eq!(header_end(b"A: b\nC: d"), 9);
        assert_eq!(header_end(b""), 0);
        assert_eq!(header_end(b"\nbody"), 1);
    }

    #[test]
    fn fetch_unfolds_and_collapses() {
        let header = &MESSAGE[..header_end(MESSAGE)];
        assert_eq!(header_fetch_cleaned(header, "Subject").unwrap(), b"quarterly numbers");
        assert_eq!(header_fetch_cleaned(header, "To").unwrap(), b"bob@example.com");
        assert_eq!(header_fetch_cleaned(header, "Cc"), None);
        assert_eq!(header_fetch_cleaned(header, "X-Empty"), None);
    }

    #[test]
    fn fetch_does_not_match_prefixes() {
        let header = b"In-Reply-To: <a@b>\nReply-To: c@d\n\n";
        assert_eq!(header_fetch_cleaned(header, "Reply-To").unwrap(), b"c@d");
        assert_eq!(header_fetch_cleaned(header, "To"), None);
    }

    #[test]
    fn common_headers_fixed_order() {
        let header = &MESSAGE[..header_end(MESSAGE)];
        assert_eq!(
            common_headers(header),
            b"Subject: quarterly numbers\nFrom: Alice <alice@example.com>\nTo: bob@example.com\n".to_vec()
        );
    }
}
