use std::fmt::{self, Display, Formatter};

use http::header::{self, HeaderMap};
use http::Uri;

use crate::constants;
use crate::options::QueryOptions;
use crate::qs::{self, Fields};

/// Facts about the connection a request arrived on.
///
/// Put it in the request's [`Extensions`](http::Extensions); a request without
/// it is treated as unencrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionInfo {
    pub encrypted: bool,
}

/// The absolute URL a request was made for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    scheme: String,
    host: String,
    pathname: String,
    search: Option<String>,
    query: Fields,
}

impl ParsedUrl {
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Host and optional port, as sent in the `Host` header.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The host without its port.
    pub fn hostname(&self) -> &str {
        split_host(&self.host).0
    }

    pub fn port(&self) -> Option<u16> {
        split_host(&self.host).1
    }

    pub fn pathname(&self) -> &str {
        &self.pathname
    }

    /// The raw query string, without the leading `?`.
    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    pub fn query(&self) -> &Fields {
        &self.query
    }
}

impl Display for ParsedUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.host, self.pathname)?;
        if let Some(search) = &self.search {
            write!(f, "?{}", search)?;
        }
        Ok(())
    }
}

/// Derives the absolute URL from the request target and headers.
///
/// The scheme comes from `X-Forwarded-Proto` when present, else from the
/// connection. The host comes from the `Host` header, else `localhost`.
pub fn parse_url(target: &Uri, headers: &HeaderMap, encrypted: bool, options: &QueryOptions) -> ParsedUrl {
    let forwarded_proto = headers
        .get(constants::X_FORWARDED_PROTO)
        .and_then(|val| val.to_str().ok())
        .map(str::trim)
        .filter(|val| !val.is_empty());

    let scheme = match forwarded_proto {
        Some(proto) => proto.to_owned(),
        None if encrypted => "https".to_owned(),
        None => "http".to_owned(),
    };

    let host = headers
        .get(header::HOST)
        .and_then(|val| val.to_str().ok())
        .filter(|val| !val.is_empty())
        .unwrap_or(constants::DEFAULT_HOST)
        .to_owned();

    let search = target.query().map(str::to_owned);
    let query = search
        .as_deref()
        .map(|search| qs::decode(search, options))
        .unwrap_or_default();

    ParsedUrl {
        scheme,
        host,
        pathname: target.path().to_owned(),
        search,
        query,
    }
}

fn split_host(host: &str) -> (&str, Option<u16>) {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => {
                let port = host[end + 1..].strip_prefix(':').and_then(|port| port.parse().ok());
                (&host[..=end], port)
            }
            None => (host, None),
        };
    }

    match host.rsplit_once(':') {
        Some((name, port)) => match port.parse() {
            Ok(port) => (name, Some(port)),
            Err(_) => (host, None),
        },
        None => (host, None),
    }
}
