use std::fmt::{self, Debug, Display, Formatter};
use std::path::PathBuf;

use derive_more::Display;

use crate::context::RequestContext;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A set of errors that can occur while capturing a request body, decoding it
/// and tokenizing multipart streams.
#[derive(Display)]
#[non_exhaustive]
pub enum Error {
    /// The storage root could not be created.
    #[display(fmt = "failed to create storage directory {}: {}", "path.display()", source)]
    CreateStorageDir { path: PathBuf, source: std::io::Error },

    /// A file could not be opened for writing.
    #[display(fmt = "failed to create file {}: {}", "path.display()", source)]
    CreateFile { path: PathBuf, source: std::io::Error },

    /// Writing, flushing or syncing a file failed.
    #[display(fmt = "failed to write file {}: {}", "path.display()", source)]
    WriteFile { path: PathBuf, source: std::io::Error },

    /// A persisted file could not be read back.
    #[display(fmt = "failed to read file {}: {}", "path.display()", source)]
    ReadFile { path: PathBuf, source: std::io::Error },

    /// Stream read failed.
    #[display(fmt = "stream read failed: {}", _0)]
    StreamReadFailed(BoxError),

    /// The capture task ended without reporting a result.
    #[display(fmt = "raw body capture ended without a result")]
    CaptureAborted,

    /// The field data is found incomplete.
    #[display(
        fmt = "field '{}' received with incomplete data",
        "field_name.as_deref().unwrap_or(\"<unknown>\")"
    )]
    IncompleteFieldData { field_name: Option<String> },

    /// Couldn't read the part headers completely.
    #[display(fmt = "failed to read part complete headers")]
    IncompleteHeaders,

    /// Failed to read headers.
    #[display(fmt = "failed to read headers: {}", _0)]
    ReadHeaderFailed(httparse::Error),

    /// Failed to decode the part's raw header name to
    /// [`HeaderName`](http::header::HeaderName) type.
    #[display(fmt = "failed to decode part's raw header name: {:?} {}", name, cause)]
    DecodeHeaderName { name: String, cause: BoxError },

    /// Failed to decode the part's raw header value to
    /// [`HeaderValue`](http::header::HeaderValue) type.
    #[display(fmt = "failed to decode part's raw header value: {}", cause)]
    DecodeHeaderValue { value: Vec<u8>, cause: BoxError },

    /// Multipart stream is incomplete.
    #[display(fmt = "incomplete multipart stream")]
    IncompleteStream,

    /// A previous part is still alive while the next one was requested.
    #[display(fmt = "failed to lock multipart state: a previous part is still in use")]
    LockFailure,

    /// The `Content-Type` header is not `multipart/form-data`.
    #[display(fmt = "Content-Type is not multipart/form-data")]
    NoMultipart,

    /// Failed to convert the `Content-Type` to [`mime::Mime`] type.
    #[display(fmt = "Failed to convert Content-Type to `mime::Mime` type: {}", _0)]
    DecodeContentType(mime::FromStrError),

    /// No boundary found in `Content-Type` header.
    #[display(fmt = "multipart boundary not found in Content-Type")]
    NoBoundary,

    /// Failed to decode the raw body as `JSON` in
    /// [`RequestContext::json`](crate::RequestContext::json).
    #[cfg(feature = "json")]
    #[display(fmt = "failed to decode body as JSON: {}", _0)]
    DecodeJson(serde_json::Error),
}

impl Error {
    /// Whether the storage backend failed, as opposed to the source stream.
    /// The backend drains the source before reporting these.
    pub(crate) fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            Error::CreateStorageDir { .. } | Error::CreateFile { .. } | Error::WriteFile { .. }
        )
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl std::error::Error for Error {}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string().eq(&other.to_string())
    }
}

impl Eq for Error {}

/// Returned by [`ReqParser::parse`](crate::ReqParser::parse) when capturing or
/// decoding the body failed.
///
/// The context is kept so the caller can still inspect the parsed URL and hand
/// it to [`ReqParser::clean`](crate::ReqParser::clean).
pub struct ParseError {
    error: Error,
    context: RequestContext,
}

impl ParseError {
    pub(crate) fn new(error: Error, context: RequestContext) -> ParseError {
        ParseError { error, context }
    }

    /// The underlying error.
    pub fn error(&self) -> &Error {
        &self.error
    }

    /// The request context as far as it was populated.
    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub fn into_parts(self) -> (Error, RequestContext) {
        (self.error, self.context)
    }
}

impl Debug for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseError")
            .field("error", &self.error)
            .field("id", &self.context.id())
            .finish()
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "request {}: {}", self.context.id(), self.error)
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
