use std::fmt::{self, Debug, Formatter};

use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};

use crate::error::BoxError;

/// The transport stream of a request, or the lack of one.
///
/// A synthetic request built without a stream ([`Body::empty`]) is different
/// from a stream that yields zero bytes: the former finishes capture right
/// away without touching storage.
pub struct Body {
    stream: Option<BoxStream<'static, Result<Bytes, BoxError>>>,
}

impl Body {
    /// A body without any transport stream.
    pub fn empty() -> Body {
        Body { stream: None }
    }

    /// Wraps a stream of byte chunks.
    pub fn wrap_stream<S, O, E>(stream: S) -> Body
    where
        S: futures_util::Stream<Item = Result<O, E>> + Send + 'static,
        O: Into<Bytes> + 'static,
        E: Into<BoxError> + 'static,
    {
        let stream = stream
            .map_ok(|b| -> Bytes { b.into() })
            .map_err(|err| -> BoxError { err.into() });
        Body {
            stream: Some(stream.boxed()),
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    pub(crate) fn into_stream(self) -> Option<BoxStream<'static, Result<Bytes, BoxError>>> {
        self.stream
    }
}

impl Default for Body {
    fn default() -> Self {
        Body::empty()
    }
}

impl Debug for Body {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body").field("streaming", &self.is_streaming()).finish()
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::wrap_stream(stream::once(async move { Ok::<_, BoxError>(bytes) }))
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::from(Bytes::from(bytes))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::from(Bytes::from(text))
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Body::from(Bytes::from_static(text.as_bytes()))
    }
}
