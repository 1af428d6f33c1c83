//! Bridge between the blocking archive builder and a streamed HTTP body.
//!
//! The builder runs on the blocking pool and writes into a [`ChannelWriter`],
//! which forwards chunks over a bounded channel to the response body. The
//! handler waits for the first frame before committing to a `200`: if the
//! archive failed before anything left the buffer, the caller still gets a
//! proper error response.

use std::io::{self, BufWriter, Write};

use axum::body::Body;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use downlog_core::{ArchiveBuilder, FetchError, MatchedEntry};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Span, error, info, warn};

use crate::error::ApiError;

/// Size of the buffer in front of the channel; also the typical chunk size.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Chunks allowed in flight before the writer blocks.
const CHANNEL_DEPTH: usize = 8;

/// One item of the body stream.
pub type Frame = Result<Bytes, FetchError>;

/// `io::Write` sink that forwards each write as a body chunk.
///
/// Writes block while the channel is full, so a slow client slows the
/// archive down instead of growing memory. A closed channel (client gone)
/// turns into `BrokenPipe`.
#[derive(Debug)]
pub struct ChannelWriter {
    tx: mpsc::Sender<Frame>,
    sent: u64,
}

impl ChannelWriter {
    /// Create a writer feeding `tx`.
    pub fn new(tx: mpsc::Sender<Frame>) -> Self {
        Self { tx, sent: 0 }
    }

    /// Bytes handed to the channel so far.
    pub fn bytes_sent(&self) -> u64 {
        self.sent
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.tx
            .blocking_send(Ok(Bytes::copy_from_slice(buf)))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "response body closed"))?;
        self.sent += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Build the archive on the blocking pool and stream it as the response.
///
/// Returns an error instead of a response if the archive failed before its
/// first chunk was sent.
pub async fn stream_archive(
    builder: ArchiveBuilder,
    entries: Vec<MatchedEntry>,
    filename: &str,
) -> Result<Response, ApiError> {
    let (tx, mut rx) = mpsc::channel::<Frame>(CHANNEL_DEPTH);
    let span = Span::current();
    tokio::task::spawn_blocking(move || {
        let _entered = span.enter();
        write_archive(&builder, &entries, tx);
    });

    let first = match rx.recv().await {
        Some(Ok(chunk)) => chunk,
        Some(Err(err)) => return Err(err.into()),
        None => {
            return Err(FetchError::Internal("archive task ended without output".to_string()).into());
        }
    };

    let body = futures::stream::once(async move { Ok::<_, FetchError>(first) })
        .chain(ReceiverStream::new(rx));
    Ok(zip_response(Body::from_stream(body), filename))
}

/// Run the builder against the channel and report its outcome.
///
/// A failure before any byte was sent discards the buffered partial archive
/// and sends the error as the only frame. A later failure has already
/// committed the response, so the finalized, incomplete archive is flushed
/// and the failure is only logged.
pub fn write_archive(builder: &ArchiveBuilder, entries: &[MatchedEntry], tx: mpsc::Sender<Frame>) {
    let mut out = BufWriter::with_capacity(CHUNK_SIZE, ChannelWriter::new(tx.clone()));

    match builder.build(entries, &mut out) {
        Ok(summary) => match out.flush() {
            Ok(()) => info!(
                members = summary.members,
                bytes = summary.bytes,
                sent = out.get_ref().bytes_sent(),
                "archive streamed"
            ),
            Err(e) => warn!(error = %e, "client disconnected before archive was delivered"),
        },
        Err(err) if out.get_ref().bytes_sent() == 0 => {
            let _discarded = out.into_parts();
            warn!(error = %err, "archive failed before streaming began");
            let _ = tx.blocking_send(Err(err));
        }
        Err(err) => {
            error!(
                error = %err,
                sent = out.get_ref().bytes_sent(),
                "archive failed mid-stream, client receives a truncated archive"
            );
            let _ = out.flush();
        }
    }
}

fn zip_response(body: Body, filename: &str) -> Response {
    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        header_safe_filename(filename)
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/zip")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response()
}

/// Replace anything that could break out of a quoted header parameter.
fn header_safe_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            if c.is_ascii_graphic() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
