//! Request body capture and decoding for tokio.rs in Rust.
//!
//! A [`ReqParser`] reads the body of an [`http::Request`] exactly once into
//! memory or into a file, derives the absolute URL of the request and, for
//! url-encoded and `multipart/form-data` bodies, decodes form fields and
//! uploaded files. Files written to disk stay there until
//! [`ReqParser::clean`] removes them.
//!
//! # Examples
//!
//! ```
//! use reqparser::{Body, Options, ReqParser, Storage};
//!
//! # async fn run() {
//! let data = "--X\r\nContent-Disposition: form-data; name=\"doc\"; filename=\"r.txt\"\r\n\r\nhello\r\n--X--\r\n";
//! let request = http::Request::post("/upload")
//!     .header("content-type", "multipart/form-data; boundary=X")
//!     .body(Body::from(data))
//!     .unwrap();
//!
//! let dir = std::env::temp_dir().join("reqparser-doc");
//! let parser = ReqParser::new(Options::new().storage(Storage::Disk(dir)));
//! let ctx = parser.parse(request).await.unwrap();
//!
//! let doc = ctx.form_files().unwrap().get("doc").unwrap().as_single().unwrap();
//! assert_eq!(doc.filename(), "r.txt");
//! assert_eq!(&doc.read().await.unwrap()[..], b"hello");
//!
//! parser.clean(&ctx).await.unwrap();
//! # }
//! # tokio::runtime::Runtime::new().unwrap().block_on(run());
//! ```
//!
//! ## Optional features
//!
//! * `json`: adds [`RequestContext::json`] to deserialize the raw body.

pub use bytes;

pub use body::Body;
pub use context::RequestContext;
pub use error::{Error, ParseError};
pub use files::{FileDescriptor, FileEntry, Files};
pub use multipart::{Multipart, Part};
pub use options::{Duplicates, Options, QueryOptions, TokenizerOptions};
pub use parser::ReqParser;
pub use qs::{Fields, Value};
pub use storage::{Storage, Stored};
pub use url::{parse_url, ConnectionInfo, ParsedUrl};

mod body;
mod completion;
mod constants;
mod content_type;
mod context;
mod error;
mod files;
mod form;
mod multipart;
mod options;
mod parser;
pub mod qs;
mod raw_body;
mod storage;
mod url;
mod urlencoded;

/// A Result type often returned from methods that can have `reqparser` errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Parses the `Content-Type` header to extract the boundary value.
pub fn parse_boundary<T: AsRef<str>>(content_type: T) -> crate::Result<String> {
    let m = content_type
        .as_ref()
        .parse::<mime::Mime>()
        .map_err(Error::DecodeContentType)?;

    if !(m.type_() == mime::MULTIPART_FORM_DATA.type_() && m.subtype() == mime::MULTIPART_FORM_DATA.subtype()) {
        return Err(Error::NoMultipart);
    }

    m.get_param(mime::BOUNDARY)
        .map(|name| name.as_str().to_owned())
        .ok_or(Error::NoBoundary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_boundary() {
        let content_type = "multipart/form-data; boundary=ABCDEFG";
        assert_eq!(parse_boundary(content_type), Ok("ABCDEFG".to_owned()));

        let content_type = "multipart/form-data; boundary=------ABCDEFG";
        assert_eq!(parse_boundary(content_type), Ok("------ABCDEFG".to_owned()));

        let content_type = "boundary=------ABCDEFG";
        assert!(matches!(parse_boundary(content_type), Err(Error::DecodeContentType(_))));

        let content_type = "text/plain";
        assert_eq!(parse_boundary(content_type), Err(Error::NoMultipart));

        let content_type = "text/plain; boundary=------ABCDEFG";
        assert_eq!(parse_boundary(content_type), Err(Error::NoMultipart));

        let content_type = "multipart/form-data";
        assert_eq!(parse_boundary(content_type), Err(Error::NoBoundary));
    }
}
