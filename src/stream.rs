//! Streaming response decoder.
//!
//! Consumes a chunked `/run_sse` response body as it arrives, extracts
//! `data: <json>` event frames, and emits text fragments to the terminal
//! the moment they decode. Malformed frames are skipped, never fatal: a
//! stream that interleaves keep-alive lines, truncated JSON, and valid
//! events still yields every decodable fragment.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{Error, Result};
use crate::types::Event;

/// SSE data-line marker. The space is part of the contract: `data:x`
/// without it is not a frame this server emits.
const DATA_PREFIX: &str = "data: ";

/// Classification of one line of an event stream.
///
/// Only `Event` frames contribute output; every other class is ignored
/// without aborting the stream.
#[derive(Debug)]
pub enum Frame {
    /// Blank line, or a data line with an empty payload (keep-alive).
    Empty,
    /// A line without the `data: ` prefix (comments, other SSE fields).
    NotData,
    /// A data line whose payload failed to parse as an event.
    Malformed,
    /// A decoded event.
    Event(Event),
}

/// Classify a single line, without performing any I/O.
#[must_use]
pub fn classify(line: &str) -> Frame {
    let line = line.trim();
    if line.is_empty() {
        return Frame::Empty;
    }
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Frame::NotData;
    };
    if payload.is_empty() {
        return Frame::Empty;
    }
    match serde_json::from_str::<Event>(payload) {
        Ok(event) => Frame::Event(event),
        Err(_) => Frame::Malformed,
    }
}

/// Decode an in-progress event stream.
///
/// Each text fragment found in a decoded frame's `content.parts` is
/// appended to the accumulator and written (and flushed) to `out`
/// immediately, so partial output is visible without buffering delay.
/// Returns the concatenation of every fragment written, in order.
///
/// Transport errors from the underlying stream propagate; whatever was
/// already written to `out` stands.
pub async fn decode_event_stream<S, W>(stream: S, out: &mut W) -> Result<String>
where
    S: Stream<Item = reqwest::Result<Bytes>>,
    W: AsyncWrite + Unpin,
{
    let mut accumulated = String::new();
    let mut buf = Vec::<u8>::new();

    futures::pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(Error::Http)?;
        buf.extend_from_slice(&chunk);

        // Lines are framed on `\n`; a line may span several chunks, so
        // bytes stay buffered until the terminator arrives.
        while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = buf.drain(..=pos).collect();
            emit_frame(&line, &mut accumulated, out).await?;
        }
    }

    // A final line may arrive without a terminator.
    if !buf.is_empty() {
        emit_frame(&buf, &mut accumulated, out).await?;
    }

    Ok(accumulated)
}

async fn emit_frame<W>(line: &[u8], accumulated: &mut String, out: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let line = String::from_utf8_lossy(line);
    match classify(&line) {
        Frame::Event(event) => {
            if let Some(content) = event.content {
                for part in content.parts {
                    if let Some(text) = part.text
                        && !text.is_empty()
                    {
                        accumulated.push_str(&text);
                        out.write_all(text.as_bytes()).await?;
                        out.flush().await?;
                    }
                }
            }
        }
        Frame::Empty | Frame::NotData => {}
        Frame::Malformed => trace!(line = %line.trim(), "skipping malformed frame"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// Writer that records each `write_all` as a separate fragment, so
    /// tests can check write boundaries as well as the aggregate.
    #[derive(Default)]
    struct RecordingWriter {
        writes: Vec<String>,
        flushes: usize,
    }

    impl AsyncWrite for RecordingWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            let this = self.get_mut();
            this.writes.push(String::from_utf8_lossy(buf).into_owned());
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            self.get_mut().flushes += 1;
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn chunks(parts: &[&str]) -> impl Stream<Item = reqwest::Result<Bytes>> {
        let owned: Vec<reqwest::Result<Bytes>> = parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p.as_bytes())))
            .collect();
        futures::stream::iter(owned)
    }

    async fn decode(parts: &[&str]) -> (String, Vec<String>) {
        let mut out = RecordingWriter::default();
        let result = decode_event_stream(chunks(parts), &mut out).await.unwrap();
        (result, out.writes)
    }

    #[test]
    fn classify_covers_all_frame_classes() {
        assert!(matches!(classify(""), Frame::Empty));
        assert!(matches!(classify("   \r"), Frame::Empty));
        assert!(matches!(classify(": keep-alive"), Frame::NotData));
        assert!(matches!(classify("event: message"), Frame::NotData));
        // The prefix is the literal `data: `; a bare or spaceless marker
        // is not a frame.
        assert!(matches!(classify("data:"), Frame::NotData));
        assert!(matches!(classify("data: "), Frame::NotData));
        assert!(matches!(
            classify(r#"data:{"content":{"parts":[{"text":"hi"}]}}"#),
            Frame::NotData
        ));
        assert!(matches!(classify("data: {not json"), Frame::Malformed));
        assert!(matches!(classify("data: 42"), Frame::Malformed));
        assert!(matches!(
            classify(r#"data: {"content":{"parts":[{"text":"hi"}]}}"#),
            Frame::Event(_)
        ));
    }

    #[tokio::test]
    async fn two_frames_emit_in_order_and_concatenate() {
        let (result, writes) = decode(&[
            "data: {\"author\":\"agent\",\"content\":{\"parts\":[{\"text\":\"Hel\"}]}}\n\n",
            "data: {\"author\":\"agent\",\"content\":{\"parts\":[{\"text\":\"lo\"}]}}\n\n",
        ])
        .await;
        assert_eq!(result, "Hello");
        assert_eq!(writes, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn malformed_frame_is_skipped_without_aborting() {
        let (result, writes) = decode(&[
            "data: {not json\n\n",
            "data: {\"content\":{\"parts\":[{\"text\":\"ok\"}]}}\n\n",
        ])
        .await;
        assert_eq!(result, "ok");
        assert_eq!(writes, vec!["ok"]);
    }

    #[tokio::test]
    async fn frame_split_across_chunks_decodes_once_complete() {
        let (result, writes) = decode(&[
            "data: {\"content\":{\"parts\"",
            ":[{\"text\":\"split\"}]}}\n\n",
        ])
        .await;
        assert_eq!(result, "split");
        assert_eq!(writes, vec!["split"]);
    }

    #[tokio::test]
    async fn non_data_lines_and_blank_keepalives_contribute_nothing() {
        let (result, writes) = decode(&[
            ": ping\n\nevent: message\ndata: \n\n",
            "data: {\"content\":{\"parts\":[{\"text\":\"x\"}]}}\n",
        ])
        .await;
        assert_eq!(result, "x");
        assert_eq!(writes, vec!["x"]);
    }

    #[tokio::test]
    async fn frame_without_content_parts_contributes_nothing() {
        let (result, writes) = decode(&[
            "data: {\"author\":\"agent\"}\n",
            "data: {\"content\":{\"parts\":[{\"function_call\":{\"name\":\"f\"}}]}}\n",
            "data: {\"content\":{\"parts\":[{\"text\":\"done\"}]}}\n",
        ])
        .await;
        assert_eq!(result, "done");
        assert_eq!(writes, vec!["done"]);
    }

    #[tokio::test]
    async fn trailing_unterminated_line_is_processed_at_end_of_stream() {
        let (result, writes) =
            decode(&["data: {\"content\":{\"parts\":[{\"text\":\"tail\"}]}}"]).await;
        assert_eq!(result, "tail");
        assert_eq!(writes, vec!["tail"]);
    }

    #[tokio::test]
    async fn multiple_text_parts_in_one_frame_emit_separately() {
        let (result, writes) = decode(&[
            "data: {\"content\":{\"parts\":[{\"text\":\"a\"},{\"text\":\"\"},{\"text\":\"b\"}]}}\n",
        ])
        .await;
        assert_eq!(result, "ab");
        assert_eq!(writes, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn empty_stream_returns_empty_accumulator() {
        let (result, writes) = decode(&[]).await;
        assert_eq!(result, "");
        assert!(writes.is_empty());
    }

    #[tokio::test]
    async fn output_writes_are_flushed_per_fragment() {
        let mut out = RecordingWriter::default();
        let result = decode_event_stream(
            chunks(&[
                "data: {\"content\":{\"parts\":[{\"text\":\"a\"}]}}\n",
                "data: {\"content\":{\"parts\":[{\"text\":\"b\"}]}}\n",
            ]),
            &mut out,
        )
        .await
        .unwrap();
        assert_eq!(result, "ab");
        assert_eq!(out.flushes, 2);
    }
}
