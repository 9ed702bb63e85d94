//! Multipart stream framing over the grabber's latest-frame slot.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, stream};
use iris_grabber::FrameGrabber;

pub(crate) const BOUNDARY: &str = "frame";

/// Nap between empty polls of the latest-frame slot.
pub(crate) const STREAM_RETRY_DELAY: Duration = Duration::from_millis(50);

pub(crate) fn content_type_for(metadata: &HashMap<String, String>) -> String {
    match metadata.get("format").map(String::as_str) {
        Some("jpeg") | None => "image/jpeg".to_string(),
        Some(other) => format!("image/{other}"),
    }
}

/// One multipart part: boundary, part headers, payload, trailing CRLF.
pub(crate) fn multipart_chunk(content_type: &str, payload: &[u8]) -> Bytes {
    let header = format!(
        "--{BOUNDARY}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\n\r\n",
        payload.len()
    );
    let mut chunk = Vec::with_capacity(header.len() + payload.len() + 2);
    chunk.extend_from_slice(header.as_bytes());
    chunk.extend_from_slice(payload);
    chunk.extend_from_slice(b"\r\n");
    Bytes::from(chunk)
}

/// Unbounded multipart body over the grabber's published frames.
///
/// Emits a part whenever a payload is present; sleeps briefly when the
/// slot is empty. Ends when the grabber is disabled; client disconnect is
/// handled by the transport dropping the stream.
pub(crate) fn multipart_stream(
    grabber: Arc<FrameGrabber>,
) -> impl Stream<Item = Result<Bytes, Infallible>> {
    stream::unfold(grabber, |grabber| async move {
        loop {
            if !grabber.enabled() {
                return None;
            }
            match grabber.latest() {
                Some((payload, metadata)) => {
                    let chunk = multipart_chunk(&content_type_for(&metadata), &payload);
                    return Some((Ok(chunk), grabber));
                }
                None => tokio::time::sleep(STREAM_RETRY_DELAY).await,
            }
        }
    })
}
