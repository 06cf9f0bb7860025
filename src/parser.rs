use futures_util::future;
use http::Request;
use tokio::task::JoinHandle;

use crate::body::Body;
use crate::content_type::ContentKind;
use crate::context::RequestContext;
use crate::error::ParseError;
use crate::form::decode_multipart;
use crate::options::Options;
use crate::raw_body::PendingCapture;
use crate::storage::{self, Unclaimed};
use crate::url::{parse_url, ConnectionInfo};
use crate::urlencoded::decode_urlencoded;

/// Captures request bodies and decodes them into a [`RequestContext`].
///
/// The parser holds no per-request state: clone it freely and share it across
/// tasks.
///
/// # Examples
///
/// ```
/// use reqparser::{Body, ReqParser};
///
/// # async fn run() {
/// let request = http::Request::post("/submit?page=2")
///     .header("content-type", "application/x-www-form-urlencoded")
///     .body(Body::from("foo=bar&tag=a&tag=b"))
///     .unwrap();
///
/// let parser = ReqParser::default();
/// let ctx = parser.parse(request).await.unwrap();
///
/// assert_eq!(ctx.parsed_url().query().get("page").and_then(|v| v.as_str()), Some("2"));
/// assert_eq!(ctx.form_fields().unwrap().get("foo").and_then(|v| v.as_str()), Some("bar"));
///
/// parser.clean(&ctx).await.unwrap();
/// # }
/// # tokio::runtime::Runtime::new().unwrap().block_on(run());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ReqParser {
    options: Options,
}

impl ReqParser {
    /// Creates a parser that captures and decodes with `options`.
    pub fn new(options: Options) -> ReqParser {
        ReqParser { options }
    }

    /// The options this parser was built with.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Captures the body of `request` and decodes it by its declared content
    /// type.
    ///
    /// The body is read exactly once, into the configured storage. Form fields
    /// and files are only set for url-encoded and multipart bodies. On failure
    /// the returned [`ParseError`] still carries the context as far as it was
    /// populated, so it can be handed to [`clean`](ReqParser::clean).
    ///
    /// Dropping the returned future before it completes removes whatever was
    /// already written to disk for the request.
    ///
    /// # Panics
    ///
    /// The body is captured on a spawned task: this must be polled within a
    /// tokio runtime.
    pub async fn parse(&self, request: Request<Body>) -> Result<RequestContext, ParseError> {
        let (parts, body) = request.into_parts();
        let id = storage::unique_token();

        // Nothing else may touch the body before the capture owns it.
        let capture = PendingCapture::start(body, &self.options.storage, &id);

        let encrypted = parts
            .extensions
            .get::<ConnectionInfo>()
            .map(|info| info.encrypted)
            .unwrap_or(false);

        let parsed_url = parse_url(&parts.uri, &parts.headers, encrypted, &self.options.query);
        let mut ctx = RequestContext::new(id, parsed_url);

        let raw_body = match capture.settled().await {
            Ok(raw_body) => raw_body,
            Err(err) => {
                // Backend failures still read the source to its end.
                ctx.ended = err.is_storage_failure();
                return Err(ParseError::new(err, ctx));
            }
        };
        ctx.ended = true;

        // Until the context is handed out, a cancelled parse must not leave
        // the raw body file behind.
        let raw_body = Unclaimed::new(raw_body);
        let stored = raw_body.stored();

        let decoded = match ContentKind::detect(&parts.headers) {
            Some(ContentKind::UrlEncoded) => decode_urlencoded(stored, &self.options.query)
                .await
                .map(|fields| (Some(fields), None)),
            Some(ContentKind::Multipart { boundary }) => {
                let (fields, files) = decode_multipart(stored, &boundary, &self.options).await;
                Ok((Some(fields), Some(files)))
            }
            None => Ok((None, None)),
        };

        ctx.raw_body = raw_body.claim();

        match decoded {
            Ok((form_fields, form_files)) => {
                ctx.form_fields = form_fields;
                ctx.form_files = form_files;
            }
            Err(err) => return Err(ParseError::new(err, ctx)),
        }

        log::debug!("parsed request {} for {}", ctx.id(), ctx.parsed_url());
        Ok(ctx)
    }

    /// Removes the disk artifacts of `ctx`: the raw body file and every upload
    /// not flagged for manual cleanup.
    ///
    /// Returns right away; the removals run concurrently on a spawned task and
    /// their failures are only logged. Calling it again is harmless.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn clean(&self, ctx: &RequestContext) -> JoinHandle<()> {
        let artifacts = ctx.artifacts();
        let id = ctx.id().to_owned();

        tokio::spawn(async move {
            if artifacts.is_empty() {
                return;
            }

            log::debug!("cleaning {} artifact(s) of request {}", artifacts.len(), id);
            future::join_all(artifacts.iter().map(|stored| stored.remove())).await;
        })
    }
}
