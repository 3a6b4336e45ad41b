//! Newline-delimited JSON decoder for the model server's streaming body.
//!
//! The server writes one JSON object per line:
//!
//! ```text
//! {"model":"llama3.2","response":"Hel","done":false}
//! {"model":"llama3.2","response":"lo","done":false}
//! {"model":"llama3.2","response":"","done":true}
//! ```
//!
//! Lines are split on raw bytes before being decoded, so a read boundary that
//! falls inside a line (or inside a multi-byte character) is harmless.

/// A complete line was not valid UTF-8. The stream is corrupt.
#[derive(Debug, thiserror::Error)]
#[error("stream line is not valid UTF-8: {source}")]
pub struct DecodeError {
    #[from]
    source: std::str::Utf8Error,
}

/// Incremental NDJSON decoder.
///
/// Feed it byte buffers with [`NdjsonDecoder::push`]; it returns the text
/// increments completed by that buffer, in order.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    carry: Vec<u8>,
    /// Prefix of `carry` already known to hold no newline.
    scanned: usize,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, DecodeError> {
        self.carry.extend_from_slice(chunk);
        let mut out = Vec::new();
        let mut line_start = 0;

        while let Some(rel) = self.carry[self.scanned..].iter().position(|&b| b == b'\n') {
            let end = self.scanned + rel;
            let mut line = &self.carry[line_start..end];
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }
            line_start = end + 1;
            self.scanned = line_start;

            let text = std::str::from_utf8(line)?;
            if text.trim().is_empty() {
                continue;
            }

            if let Some(increment) = parse_line(text) {
                out.push(increment);
            }
        }

        // One shift per push, however many lines it completed.
        self.carry.drain(..line_start);
        self.scanned = self.carry.len();
        Ok(out)
    }

    /// End of body. Whatever is still buffered was never newline-terminated
    /// and is dropped.
    pub fn finish(self) {
        if !self.carry.is_empty() {
            tracing::debug!(
                bytes = self.carry.len(),
                "discarding unterminated trailing line"
            );
        }
    }
}

fn parse_line(line: &str) -> Option<String> {
    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "skipping malformed stream line");
            return None;
        }
    };

    let Some(obj) = value.as_object() else {
        tracing::debug!("skipping stream line that is not a JSON object");
        return None;
    };

    if let Some(err) = obj.get("error").and_then(|e| e.as_str()) {
        tracing::warn!(error = %err, "model server reported an error mid-stream");
    }

    obj.get("response")
        .and_then(|r| r.as_str())
        .filter(|r| !r.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(chunks: &[&[u8]]) -> Vec<String> {
        let mut dec = NdjsonDecoder::new();
        let mut out = Vec::new();
        for c in chunks {
            out.extend(dec.push(c).expect("valid utf-8"));
        }
        dec.finish();
        out
    }

    #[test]
    fn line_split_across_two_reads() {
        let out = decode_all(&[b"{\"response\":\"Hel\"}\n{\"resp", b"onse\":\"lo\"}\n"]);
        assert_eq!(out, vec!["Hel", "lo"]);
        assert_eq!(out.concat(), "Hello");
    }

    #[test]
    fn chunking_does_not_change_output() {
        let body = "{\"response\":\"The \"}\n{\"response\":\"quick \"}\n{\"response\":\"fox\"}\n";
        let expected = vec!["The ", "quick ", "fox"];

        for size in 1..=body.len() {
            let chunks: Vec<&[u8]> = body.as_bytes().chunks(size).collect();
            assert_eq!(decode_all(&chunks), expected, "chunk size {size}");
        }
    }

    #[test]
    fn multibyte_char_split_across_reads() {
        let body = "{\"response\":\"caf\u{e9} \u{1f600}\"}\n".as_bytes();
        // Split inside the four-byte emoji.
        let split = body.len() - 5;
        let out = decode_all(&[&body[..split], &body[split..]]);
        assert_eq!(out, vec!["caf\u{e9} \u{1f600}"]);
    }

    #[test]
    fn empty_buffer_yields_nothing() {
        let mut dec = NdjsonDecoder::new();
        assert!(dec.push(b"").expect("empty").is_empty());
    }

    #[test]
    fn several_lines_in_one_buffer_keep_order() {
        let out = decode_all(&[b"{\"response\":\"a\"}\n{\"response\":\"b\"}\n{\"response\":\"c\"}\n"]);
        assert_eq!(out, vec!["a", "b", "c"]);
    }

    #[test]
    fn malformed_and_fieldless_lines_are_skipped() {
        let out = decode_all(&[
            b"not json at all\n",
            b"{\"done\":false}\n",
            b"{\"response\":\"\"}\n",
            b"{\"response\":\"kept\"}\n",
            b"{\"response\":\n",
            b"{\"response\":\"after\"}\n",
        ]);
        assert_eq!(out, vec!["kept", "after"]);
    }

    #[test]
    fn blank_and_crlf_lines() {
        let out = decode_all(&[b"\n   \n{\"response\":\"x\"}\r\n\r\n"]);
        assert_eq!(out, vec!["x"]);
    }

    #[test]
    fn unterminated_tail_is_dropped() {
        let out = decode_all(&[b"{\"response\":\"one\"}\n{\"response\":\"two\"}"]);
        assert_eq!(out, vec!["one"]);
    }

    #[test]
    fn error_line_yields_no_increment() {
        let out = decode_all(&[b"{\"error\":\"model crashed\"}\n{\"response\":\"z\"}\n"]);
        assert_eq!(out, vec!["z"]);
    }

    #[test]
    fn non_object_lines_are_skipped() {
        let out = decode_all(&[
            b"[\"hi\", null]\n",
            b"\"bare string\"\n",
            b"42\n",
            b"{\"response\":7}\n",
            b"{\"response\":\"ok\"}\n",
        ]);
        assert_eq!(out, vec!["ok"]);
    }

    #[test]
    fn long_line_in_small_reads_is_scanned_once() {
        let text = "x".repeat(10_000);
        let body = format!("{{\"response\":\"{text}\"}}\n{{\"resp");
        let mut dec = NdjsonDecoder::new();
        let mut out = Vec::new();
        for b in body.as_bytes().chunks(7) {
            out.extend(dec.push(b).expect("valid utf-8"));
            // Nothing unscanned is left behind between reads.
            assert_eq!(dec.scanned, dec.carry.len());
        }
        assert_eq!(out, vec![text]);
        assert_eq!(dec.carry, b"{\"resp");
    }

    #[test]
    fn invalid_utf8_is_fatal() {
        let mut dec = NdjsonDecoder::new();
        let err = dec.push(b"{\"response\":\"\xff\xfe\"}\n").unwrap_err();
        assert!(err.to_string().contains("UTF-8"));
    }
}
