use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::future;
use futures_util::stream::{BoxStream, Stream, StreamExt, TryStreamExt};
use spin::mutex::spin::SpinMutex as Mutex;

use crate::constants;
use crate::error::BoxError;
use crate::options::TokenizerOptions;

use buffer::StreamBuffer;
use content_disposition::ContentDisposition;
pub use part::Part;
use state::{MultipartState, StreamingStage};

mod buffer;
mod content_disposition;
mod helpers;
mod part;
mod state;

/// Tokenizes a `multipart/form-data` stream into [`Part`]s.
///
/// Only one [`Part`] may be alive at a time: drop it before calling
/// [`next_part`](Multipart::next_part) again. Data the previous part left
/// unread is skipped.
///
/// # Examples
///
/// ```
/// use reqparser::Multipart;
/// use bytes::Bytes;
/// use std::convert::Infallible;
/// use futures_util::stream::once;
///
/// # async fn run() {
/// let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"my_text_field\"\r\n\r\nabcd\r\n--X-BOUNDARY--\r\n";
/// let stream = once(async move { Result::<Bytes, Infallible>::Ok(Bytes::from(data)) });
/// let mut multipart = Multipart::new(stream, "X-BOUNDARY");
///
/// while let Some(part) = multipart.next_part().await.unwrap() {
///     println!("Part: {:?}", part.text().await)
/// }
/// # }
/// # tokio::runtime::Runtime::new().unwrap().block_on(run());
/// ```
pub struct Multipart {
    state: Arc<Mutex<MultipartState>>,
    options: TokenizerOptions,
}

impl Multipart {
    /// Constructs a `Multipart` over a stream of byte chunks and the boundary.
    pub fn new<S, O, E, B>(stream: S, boundary: B) -> Multipart
    where
        S: Stream<Item = Result<O, E>> + Send + 'static,
        O: Into<Bytes> + 'static,
        E: Into<BoxError> + 'static,
        B: Into<String>,
    {
        Multipart::with_options(stream, boundary, TokenizerOptions::default())
    }

    /// Constructs a `Multipart` with explicit tokenizer options.
    pub fn with_options<S, O, E, B>(stream: S, boundary: B, options: TokenizerOptions) -> Multipart
    where
        S: Stream<Item = Result<O, E>> + Send + 'static,
        O: Into<Bytes> + 'static,
        E: Into<BoxError> + 'static,
        B: Into<String>,
    {
        let stream = stream
            .map_ok(|b| -> Bytes { b.into() })
            .map_err(|err| crate::Error::StreamReadFailed(err.into()))
            .boxed();

        Multipart::from_stream(stream, boundary, options)
    }

    pub(crate) fn from_stream<B: Into<String>>(
        stream: BoxStream<'static, crate::Result<Bytes>>,
        boundary: B,
        options: TokenizerOptions,
    ) -> Multipart {
        let state = MultipartState {
            buffer: StreamBuffer::new(stream),
            boundary: boundary.into(),
            stage: StreamingStage::FindingFirstBoundary,
            next_part_idx: 0,
            curr_part_name: None,
        };

        Multipart {
            state: Arc::new(Mutex::new(state)),
            options,
        }
    }

    /// Yields the next [`Part`] if available.
    pub async fn next_part(&mut self) -> crate::Result<Option<Part>> {
        future::poll_fn(|cx| self.poll_next_part(cx)).await
    }

    pub fn poll_next_part(&mut self, cx: &mut Context<'_>) -> Poll<crate::Result<Option<Part>>> {
        // Every live `Part` holds a clone of the state.
        if Arc::strong_count(&self.state) != 1 {
            return Poll::Ready(Err(crate::Error::LockFailure));
        }

        let mut guard = self.state.lock();
        let state: &mut MultipartState = &mut guard;

        if state.stage == StreamingStage::Eof {
            return Poll::Ready(Ok(None));
        }

        if let Err(err) = state.buffer.poll_stream(cx) {
            return Poll::Ready(Err(err));
        }

        if state.stage == StreamingStage::ReadingPartData {
            loop {
                match state
                    .buffer
                    .read_part_data(&state.boundary, state.curr_part_name.as_deref())
                {
                    Ok(Some((true, _))) => {
                        state.stage = StreamingStage::ReadingBoundary;
                        break;
                    }
                    Ok(Some((false, _))) => continue,
                    Ok(None) => return Poll::Pending,
                    Err(err) => return Poll::Ready(Err(err)),
                }
            }
        }

        if state.stage == StreamingStage::FindingFirstBoundary {
            let boundary_deriv = format!("{}{}", constants::BOUNDARY_EXT, state.boundary);
            match state.buffer.read_to(boundary_deriv.as_bytes()) {
                Some(_) => state.stage = StreamingStage::ReadingBoundary,
                None => return pending_or_incomplete(state.buffer.eof),
            }
        }

        if state.stage == StreamingStage::ReadingBoundary {
            let boundary_deriv = format!("{}{}", constants::BOUNDARY_EXT, state.boundary);
            let boundary_bytes = match state.buffer.read_exact(boundary_deriv.len()) {
                Some(bytes) => bytes,
                None => return pending_or_incomplete(state.buffer.eof),
            };

            if &boundary_bytes[..] != boundary_deriv.as_bytes() {
                return Poll::Ready(Err(crate::Error::IncompleteStream));
            }

            state.stage = StreamingStage::DeterminingBoundaryType;
        }

        if state.stage == StreamingStage::DeterminingBoundaryType {
            let ext_len = constants::BOUNDARY_EXT.len();
            let next_bytes = match state.buffer.peek_exact(ext_len) {
                Some(bytes) => bytes,
                None => return pending_or_incomplete(state.buffer.eof),
            };

            if next_bytes == constants::BOUNDARY_EXT.as_bytes() {
                state.stage = StreamingStage::Eof;
                return Poll::Ready(Ok(None));
            }

            state.stage = StreamingStage::ReadingTransportPadding;
        }

        if state.stage == StreamingStage::ReadingTransportPadding {
            if !state.buffer.advance_past_transport_padding() {
                return pending_or_incomplete(state.buffer.eof);
            }

            let crlf_bytes = match state.buffer.read_exact(constants::CRLF.len()) {
                Some(bytes) => bytes,
                None => return pending_or_incomplete(state.buffer.eof),
            };

            if &crlf_bytes[..] != constants::CRLF.as_bytes() {
                return Poll::Ready(Err(crate::Error::IncompleteStream));
            }

            state.stage = StreamingStage::ReadingPartHeaders;
        }

        if state.stage == StreamingStage::ReadingPartHeaders {
            let header_bytes = match state.buffer.read_until(constants::CRLF_CRLF.as_bytes()) {
                Some(bytes) => bytes,
                None => return pending_or_incomplete(state.buffer.eof),
            };

            let mut headers = vec![httparse::EMPTY_HEADER; self.options.max_headers];

            let headers = match httparse::parse_headers(&header_bytes, &mut headers) {
                Ok(httparse::Status::Complete((_, raw_headers))) => {
                    match helpers::convert_raw_headers_to_header_map(raw_headers) {
                        Ok(headers) => headers,
                        Err(err) => return Poll::Ready(Err(err)),
                    }
                }
                Ok(httparse::Status::Partial) => return Poll::Ready(Err(crate::Error::IncompleteHeaders)),
                Err(err) => return Poll::Ready(Err(crate::Error::ReadHeaderFailed(err))),
            };

            state.stage = StreamingStage::ReadingPartData;

            let part_idx = state.next_part_idx;
            state.next_part_idx += 1;

            let content_disposition = ContentDisposition::parse(&headers);
            state.curr_part_name = content_disposition.field_name.clone();

            drop(guard);

            let part = Part::new(Arc::clone(&self.state), headers, part_idx, content_disposition);
            return Poll::Ready(Ok(Some(part)));
        }

        Poll::Pending
    }
}

fn pending_or_incomplete<T>(eof: bool) -> Poll<crate::Result<T>> {
    if eof {
        Poll::Ready(Err(crate::Error::IncompleteStream))
    } else {
        Poll::Pending
    }
}
