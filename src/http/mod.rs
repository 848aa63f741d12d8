//! Minimal HTTP sniffing over raw TCP payloads.
//!
//! This is not an HTTP parser. It answers exactly two questions the capture
//! engine needs: does a request carry `Expect: 100-continue` (so its body
//! will arrive as a separate segment under a different ack), and does an
//! accumulated payload look like a complete HTTP message (so the message can
//! be dispatched before its expiry deadline).

const EXPECT_CONTINUE: &[u8] = b"Expect: 100-continue";

/// HTTP method tokens that can open a request line.
const METHODS: [&[u8]; 9] = [
    b"GET", b"POST", b"PUT", b"DELETE", b"HEAD", b"OPTIONS", b"PATCH",
    b"CONNECT", b"TRACE",
];

/// True when `data` is the header half of an `Expect: 100-continue` POST.
///
/// The match is positional: the 20 bytes before the final CRLF must be the
/// literal header value, i.e. `Expect: 100-continue` must be the last header
/// line. Requests with trailing whitespace or a body in the same segment do
/// not match.
pub fn has_expect_continue(data: &[u8]) -> bool {
    data.len() >= 24
        && data.starts_with(b"POST")
        && &data[data.len() - 24..data.len() - 4] == EXPECT_CONTINUE
}

/// Remove the `Expect: 100-continue\r\n` line in place, keeping the CRLF that
/// terminates the header block. Caller must have checked
/// [`has_expect_continue`] first.
pub fn strip_expect_continue(data: &mut Vec<u8>) {
    let len = data.len();
    data.drain(len - 24..len - 2);
}

/// How the body of an HTTP message is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    /// `Content-Length: n` was declared.
    ContentLength(usize),
    /// `Transfer-Encoding: chunked` was declared.
    Chunked,
    /// No body framing headers; the message ends with its header block.
    None,
}

/// True when `payload` is a syntactically complete HTTP message: a known
/// request line or status line, a terminated header block, and a body
/// satisfied per its declared framing.
///
/// Payloads that do not start like HTTP are never complete; the caller falls
/// back to expiry-based dispatch for those.
pub fn is_complete(payload: &[u8]) -> bool {
    if !starts_like_http(payload) {
        return false;
    }
    let Some(header_end) = find_header_end(payload) else {
        return false;
    };
    let headers = &payload[..header_end];
    let body = &payload[header_end + 4..];
    match body_framing(headers) {
        BodyFraming::ContentLength(n) => body.len() >= n,
        BodyFraming::Chunked => body.ends_with(b"0\r\n\r\n"),
        BodyFraming::None => true,
    }
}

/// True when the payload opens with an HTTP request line or status line.
pub fn starts_like_http(payload: &[u8]) -> bool {
    if payload.starts_with(b"HTTP/") {
        return true;
    }
    METHODS
        .iter()
        .any(|m| payload.starts_with(m) && payload.get(m.len()) == Some(&b' '))
}

/// Classify the body framing declared in a header block.
pub fn body_framing(headers: &[u8]) -> BodyFraming {
    if let Some(value) = header_value(headers, b"content-length") {
        let text = std::str::from_utf8(value).unwrap_or("");
        if let Ok(n) = text.trim().parse::<usize>() {
            return BodyFraming::ContentLength(n);
        }
    }
    if let Some(value) = header_value(headers, b"transfer-encoding") {
        if eq_ignore_case_contains(value, b"chunked") {
            return BodyFraming::Chunked;
        }
    }
    BodyFraming::None
}

/// Offset of the `\r\n\r\n` that terminates the header block.
fn find_header_end(payload: &[u8]) -> Option<usize> {
    payload.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Value of the first header with the given lowercase name, trimmed of
/// leading spaces.
fn header_value<'a>(headers: &'a [u8], name: &[u8]) -> Option<&'a [u8]> {
    for line in headers.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let Some(colon) = line.iter().position(|&b| b == b':') else {
            continue;
        };
        let (key, rest) = line.split_at(colon);
        if key.len() == name.len()
            && key
                .iter()
                .zip(name)
                .all(|(a, b)| a.to_ascii_lowercase() == *b)
        {
            let mut value = &rest[1..];
            while value.first() == Some(&b' ') {
                value = &value[1..];
            }
            return Some(value);
        }
    }
    None
}

fn eq_ignore_case_contains(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() || haystack.len() < needle.len() {
        return false;
    }
    haystack
        .windows(needle.len())
        .any(|w| w.iter().zip(needle).all(|(a, b)| a.to_ascii_lowercase() == *b))
}
