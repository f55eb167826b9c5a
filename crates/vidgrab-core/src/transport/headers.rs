//! Parse raw HTTP response header lines collected by curl.

/// Status and the headers the transport cares about, for the final response
/// of a (possibly redirected) request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ResponseHead {
    pub status: Option<u32>,
    pub content_length: Option<u64>,
    pub accept_ranges: bool,
}

impl ResponseHead {
    /// Feed one header line. A status line starts a new response (redirects),
    /// discarding what earlier hops declared.
    pub fn push_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        if let Some(code) = parse_status_line(line) {
            *self = ResponseHead {
                status: Some(code),
                ..ResponseHead::default()
            };
            return;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                if let Ok(n) = value.parse::<u64>() {
                    self.content_length = Some(n);
                }
            }
            if name.eq_ignore_ascii_case("accept-ranges") {
                self.accept_ranges = value.eq_ignore_ascii_case("bytes");
            }
        }
    }
}

/// `HTTP/1.1 206 Partial Content` -> `Some(206)`.
pub(crate) fn parse_status_line(line: &str) -> Option<u32> {
    let rest = line.strip_prefix("HTTP/")?;
    rest.split_whitespace().nth(1)?.parse().ok()
}

/// Parse a full block of header lines.
pub(crate) fn parse_headers<S: AsRef<str>>(lines: &[S]) -> ResponseHead {
    let mut head = ResponseHead::default();
    for line in lines {
        head.push_line(line.as_ref());
    }
    head
}
