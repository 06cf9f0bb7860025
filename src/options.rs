use crate::constants;
use crate::storage::Storage;

/// Process-wide configuration of a [`ReqParser`](crate::ReqParser).
///
/// # Examples
///
/// ```
/// use reqparser::{Options, QueryOptions, Storage};
///
/// let options = Options::new()
///     .storage("/tmp/uploads".parse::<Storage>().unwrap())
///     .query(QueryOptions::new().max_params(100));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub(crate) storage: Storage,
    pub(crate) tokenizer: TokenizerOptions,
    pub(crate) query: QueryOptions,
}

impl Options {
    /// Creates options with memory storage and default codec settings.
    pub fn new() -> Options {
        Options::default()
    }

    /// Sets where captured bytes are kept.
    pub fn storage(mut self, storage: Storage) -> Options {
        self.storage = storage;
        self
    }

    /// Sets the options forwarded to the multipart tokenizer.
    pub fn tokenizer(mut self, tokenizer: TokenizerOptions) -> Options {
        self.tokenizer = tokenizer;
        self
    }

    /// Sets the options of the query-string codec.
    pub fn query(mut self, query: QueryOptions) -> Options {
        self.query = query;
        self
    }
}

/// Options forwarded to the multipart tokenizer.
#[derive(Debug, Clone)]
pub struct TokenizerOptions {
    pub(crate) max_headers: usize,
    pub(crate) default_charset: String,
}

impl TokenizerOptions {
    /// Creates tokenizer options with the default header limit and `utf-8`
    /// as fallback charset.
    pub fn new() -> TokenizerOptions {
        TokenizerOptions::default()
    }

    /// Sets the maximum number of headers accepted per part.
    pub fn max_headers(mut self, max_headers: usize) -> TokenizerOptions {
        self.max_headers = max_headers;
        self
    }

    /// Sets the charset used to decode field values whose part carries no
    /// `charset` parameter.
    pub fn default_charset<C: Into<String>>(mut self, charset: C) -> TokenizerOptions {
        self.default_charset = charset.into();
        self
    }
}

impl Default for TokenizerOptions {
    fn default() -> Self {
        TokenizerOptions {
            max_headers: constants::DEFAULT_MAX_HEADERS,
            default_charset: constants::DEFAULT_CHARSET.to_owned(),
        }
    }
}

/// How a bare key that occurs more than once is folded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Duplicates {
    /// Collect every occurrence into a sequence.
    #[default]
    Combine,
    /// Keep the first occurrence.
    First,
    /// Keep the last occurrence.
    Last,
}

/// Options of the query-string codec used for URL queries, url-encoded bodies
/// and multipart text fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    pub(crate) max_params: usize,
    pub(crate) duplicates: Duplicates,
}

impl QueryOptions {
    /// Creates codec options with the default parameter cap, combining
    /// repeated keys into sequences.
    pub fn new() -> QueryOptions {
        QueryOptions::default()
    }

    /// Sets how many `key=value` pairs are decoded; the rest is dropped.
    pub fn max_params(mut self, max_params: usize) -> QueryOptions {
        self.max_params = max_params;
        self
    }

    /// Sets how repeated bare keys are folded.
    pub fn duplicates(mut self, duplicates: Duplicates) -> QueryOptions {
        self.duplicates = duplicates;
        self
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions {
            max_params: constants::DEFAULT_MAX_PARAMS,
            duplicates: Duplicates::default(),
        }
    }
}
