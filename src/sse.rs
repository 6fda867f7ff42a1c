//! Server-Sent Events (SSE) processing for streaming chat completions.
//!
//! The completion endpoint answers with newline-delimited lines.  Lines of the form
//! `data: <json>` carry a [`ChatCompletionChunk`]; `data: [DONE]` marks the end of the
//! completion.  Every other line (comments such as `: PROCESSING`, `event:` lines, blank
//! separators) is ignored.  This module turns the raw byte stream into a stream of [`SseLine`]s
//! and pulls content tokens out of their payloads.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::observability::{STREAM_BYTES, STREAM_ERRORS, STREAM_MALFORMED_FRAGMENTS};
use crate::types::ChatCompletionChunk;
use crate::{Error, Result};

/// Prefix that marks a data line.
const DATA_PREFIX: &str = "data: ";

/// Payload of the termination line.
const DONE_SENTINEL: &str = "[DONE]";

/// A decoded data line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    /// A JSON fragment, trimmed.
    Data(String),

    /// The `[DONE]` sentinel.
    Done,
}

/// Process a stream of bytes into a stream of data lines.
///
/// Bytes are buffered across chunks, so a line (or a multi-byte character) split between two
/// network reads is decoded once it is complete.  A final line with no trailing newline is still
/// delivered when the byte stream ends.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use futures::{StreamExt, stream};
/// use confab::sse::{SseLine, process_sse};
///
/// # tokio_test::block_on(async {
/// let body = stream::iter(vec![
///     Ok::<_, std::io::Error>(Bytes::from_static(b"data: {\"choi")),
///     Ok(Bytes::from_static(b"ces\":[]}\n\ndata: [DONE]\n")),
/// ]);
/// let lines: Vec<_> = process_sse(body).map(|line| line.unwrap()).collect().await;
/// assert_eq!(
///     lines,
///     vec![SseLine::Data("{\"choices\":[]}".to_string()), SseLine::Done]
/// );
/// # });
/// ```
pub fn process_sse<S, E>(byte_stream: S) -> impl Stream<Item = Result<SseLine>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    // Convert transport errors to our error type
    let stream = byte_stream.map(|result| {
        result.map_err(|e| {
            STREAM_ERRORS.click();
            Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e)))
        })
    });

    let buffer: Vec<u8> = Vec::new();

    stream::unfold(
        (stream, buffer, false),
        move |(mut stream, mut buffer, mut finished)| async move {
            loop {
                // First check if we have a complete line in the buffer
                while let Some(line) = extract_line(&mut buffer) {
                    if let Some(parsed) = parse_line(&line) {
                        return Some((Ok(parsed), (stream, buffer, finished)));
                    }
                }

                if finished {
                    return None;
                }

                // Read more data
                match stream.next().await {
                    Some(Ok(bytes)) => {
                        STREAM_BYTES.count(bytes.len() as u64);
                        buffer.extend_from_slice(&bytes);
                    }
                    Some(Err(e)) => {
                        return Some((Err(e), (stream, buffer, finished)));
                    }
                    None => {
                        // End of stream: whatever is left is the last line
                        finished = true;
                        if !buffer.is_empty() {
                            buffer.push(b'\n');
                        }
                    }
                }
            }
        },
    )
}

/// Remove and decode the first complete line of `buffer`.
fn extract_line(buffer: &mut Vec<u8>) -> Option<String> {
    let newline = buffer.iter().position(|b| *b == b'\n')?;
    let line: Vec<u8> = buffer.drain(..=newline).collect();
    Some(String::from_utf8_lossy(&line[..newline]).into_owned())
}

/// Classify one line, returning `None` for lines that carry no data.
fn parse_line(line: &str) -> Option<SseLine> {
    let payload = line.trim().strip_prefix(DATA_PREFIX)?.trim();
    if payload == DONE_SENTINEL {
        Some(SseLine::Done)
    } else {
        Some(SseLine::Data(payload.to_string()))
    }
}

/// Extract the content token from one data payload.
///
/// Returns `None` when the fragment has no token or is not valid JSON; malformed fragments are
/// logged and skipped, never fatal to the stream.
pub fn extract_token(payload: &str) -> Option<String> {
    match serde_json::from_str::<ChatCompletionChunk>(payload) {
        Ok(chunk) => chunk.token().map(str::to_string),
        Err(err) => {
            STREAM_MALFORMED_FRAGMENTS.click();
            log::debug!("skipping malformed stream fragment: {err}");
            None
        }
    }
}

/// Turn a stream of data lines into a stream of non-empty content tokens.
///
/// `[DONE]` is ignored rather than treated as end of stream: reading continues until the body
/// is exhausted.
pub fn tokens<S>(lines: S) -> impl Stream<Item = Result<String>>
where
    S: Stream<Item = Result<SseLine>>,
{
    lines.filter_map(|line| async move {
        match line {
            Ok(SseLine::Data(payload)) => extract_token(&payload)
                .filter(|token| !token.is_empty())
                .map(Ok),
            Ok(SseLine::Done) => None,
            Err(err) => Some(Err(err)),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::io;

    fn chunks(
        parts: Vec<&'static [u8]>,
    ) -> impl Stream<Item = std::result::Result<Bytes, io::Error>> + Unpin {
        stream::iter(parts.into_iter().map(|p| Ok(Bytes::from_static(p))))
    }

    async fn collect_lines(parts: Vec<&'static [u8]>) -> Vec<SseLine> {
        process_sse(chunks(parts))
            .map(|line| line.unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn parse_data_and_done() {
        let lines = collect_lines(vec![b"data: {\"a\":1}\n\ndata: [DONE]\n\n"]).await;
        assert_eq!(
            lines,
            vec![SseLine::Data("{\"a\":1}".to_string()), SseLine::Done]
        );
    }

    #[tokio::test]
    async fn ignores_comments_and_event_lines() {
        let lines = collect_lines(vec![
            b": OPENROUTER PROCESSING\n\nevent: message\ndata: {}\n\n",
        ])
        .await;
        assert_eq!(lines, vec![SseLine::Data("{}".to_string())]);
    }

    #[tokio::test]
    async fn handle_split_line() {
        let lines = collect_lines(vec![b"data: {\"choi", b"ces\":[]}\n"]).await;
        assert_eq!(lines, vec![SseLine::Data("{\"choices\":[]}".to_string())]);
    }

    #[tokio::test]
    async fn handle_split_utf8() {
        // "é" is 0xC3 0xA9; split it across two reads.
        let lines = collect_lines(vec![b"data: caf\xC3", b"\xA9\n"]).await;
        assert_eq!(lines, vec![SseLine::Data("café".to_string())]);
    }

    #[tokio::test]
    async fn trailing_line_without_newline() {
        let lines = collect_lines(vec![b"data: [DONE]"]).await;
        assert_eq!(lines, vec![SseLine::Done]);
    }

    #[tokio::test]
    async fn crlf_line_endings() {
        let lines = collect_lines(vec![b"data: {}\r\n\r\n"]).await;
        assert_eq!(lines, vec![SseLine::Data("{}".to_string())]);
    }

    #[tokio::test]
    async fn transport_error_is_forwarded() {
        let parts: Vec<std::result::Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"data: {}\n")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ];
        let mut sse = Box::pin(process_sse(stream::iter(parts)));
        assert!(matches!(sse.next().await, Some(Ok(SseLine::Data(_)))));
        let err = sse.next().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("reset"));
    }

    #[tokio::test]
    async fn tokens_skip_malformed_and_done() {
        let body: &'static [u8] = b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\
data: not json\n\
data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n\
data: [DONE]\n\
data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n";
        let tokens: Vec<String> = tokens(process_sse(chunks(vec![body])))
            .map(|t| t.unwrap())
            .collect()
            .await;
        assert_eq!(tokens, vec!["Hel".to_string(), "lo".to_string()]);
    }

    #[test]
    fn extract_token_from_payload() {
        assert_eq!(
            extract_token(r#"{"choices":[{"delta":{"content":"!"}}]}"#),
            Some("!".to_string())
        );
        assert_eq!(extract_token(r#"{"choices":[{"delta":{}}]}"#), None);
        assert_eq!(extract_token("{not json"), None);
    }
}
