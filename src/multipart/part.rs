use std::borrow::Cow;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use encoding_rs::{Encoding, UTF_8};
use futures_util::stream::{Stream, TryStreamExt};
use http::header::{self, HeaderMap};
use spin::mutex::spin::SpinMutex as Mutex;

use crate::constants;
use crate::multipart::content_disposition::ContentDisposition;
use crate::multipart::state::{MultipartState, StreamingStage};

/// A single part of a `multipart/form-data` stream.
///
/// A part with a `filename` in its `Content-Disposition` is a file upload,
/// anything else is a text field. The data is read through the [`Stream`]
/// implementation or the helper methods. Drop the part before asking the
/// [`Multipart`](crate::Multipart) for the next one.
pub struct Part {
    state: Arc<Mutex<MultipartState>>,
    done: bool,
    headers: HeaderMap,
    meta: PartMeta,
}

struct PartMeta {
    name: Option<String>,
    file_name: Option<String>,
    content_type: Option<mime::Mime>,
    idx: usize,
}

impl Part {
    pub(crate) fn new(
        state: Arc<Mutex<MultipartState>>,
        headers: HeaderMap,
        idx: usize,
        content_disposition: ContentDisposition,
    ) -> Self {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<mime::Mime>().ok());

        Part {
            state,
            done: false,
            headers,
            meta: PartMeta {
                name: content_disposition.field_name,
                file_name: content_disposition.file_name,
                content_type,
                idx,
            },
        }
    }

    /// The `name` parameter of the `Content-Disposition` header.
    pub fn name(&self) -> Option<&str> {
        self.meta.name.as_deref()
    }

    /// The `filename` parameter of the `Content-Disposition` header.
    pub fn file_name(&self) -> Option<&str> {
        self.meta.file_name.as_deref()
    }

    pub fn is_file(&self) -> bool {
        self.meta.file_name.is_some()
    }

    pub fn content_type(&self) -> Option<&mime::Mime> {
        self.meta.content_type.as_ref()
    }

    /// The raw `Content-Type` header, defaulting to
    /// `application/octet-stream`.
    pub fn mimetype(&self) -> &str {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|val| val.to_str().ok())
            .unwrap_or(constants::DEFAULT_FILE_MIMETYPE)
    }

    /// The `Content-Transfer-Encoding` header, defaulting to `7bit`.
    pub fn transfer_encoding(&self) -> &str {
        self.headers
            .get("content-transfer-encoding")
            .and_then(|val| val.to_str().ok())
            .unwrap_or(constants::DEFAULT_TRANSFER_ENCODING)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Position of the part in the stream, starting at zero.
    pub fn index(&self) -> usize {
        self.meta.idx
    }

    pub async fn bytes(mut self) -> crate::Result<Bytes> {
        let mut buf = BytesMut::new();

        while let Some(bytes) = self.chunk().await? {
            buf.extend_from_slice(&bytes);
        }

        Ok(buf.freeze())
    }

    pub async fn chunk(&mut self) -> crate::Result<Option<Bytes>> {
        self.try_next().await
    }

    pub async fn text(self) -> crate::Result<String> {
        self.text_with_charset(constants::DEFAULT_CHARSET).await
    }

    /// Decodes the data with the part's `charset`, or `default_encoding` when
    /// it has none. Unknown labels fall back to UTF-8.
    pub async fn text_with_charset(self, default_encoding: &str) -> crate::Result<String> {
        let encoding_name = self
            .content_type()
            .and_then(|mime| mime.get_param(mime::CHARSET))
            .map(|charset| charset.as_str().to_owned())
            .unwrap_or_else(|| default_encoding.to_owned());

        let encoding = Encoding::for_label(encoding_name.as_bytes()).unwrap_or(UTF_8);

        let bytes = self.bytes().await?;

        let (text, _, _) = encoding.decode(&bytes);

        match text {
            Cow::Owned(s) => Ok(s),
            Cow::Borrowed(s) => Ok(String::from(s)),
        }
    }
}

impl Stream for Part {
    type Item = crate::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.done {
            return Poll::Ready(None);
        }

        let mut guard = this.state.lock();
        let state: &mut MultipartState = &mut guard;

        if let Err(err) = state.buffer.poll_stream(cx) {
            this.done = true;
            return Poll::Ready(Some(Err(err)));
        }

        match state.buffer.read_part_data(&state.boundary, state.curr_part_name.as_deref()) {
            Ok(Some((true, bytes))) => {
                state.stage = StreamingStage::ReadingBoundary;
                this.done = true;

                if bytes.is_empty() {
                    Poll::Ready(None)
                } else {
                    Poll::Ready(Some(Ok(bytes)))
                }
            }
            Ok(Some((false, bytes))) => Poll::Ready(Some(Ok(bytes))),
            Ok(None) => Poll::Pending,
            Err(err) => {
                this.done = true;
                Poll::Ready(Some(Err(err)))
            }
        }
    }
}
