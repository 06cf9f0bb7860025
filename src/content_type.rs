use http::header::{self, HeaderMap};

/// What the declared `Content-Type` says about the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ContentKind {
    UrlEncoded,
    Multipart { boundary: String },
}

impl ContentKind {
    /// Classifies the body by its declared content type only. Multipart
    /// bodies go through [`parse_boundary`](crate::parse_boundary): only
    /// `multipart/form-data` with a boundary parameter is a form.
    pub(crate) fn detect(headers: &HeaderMap) -> Option<ContentKind> {
        let content_type = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;

        let m = match content_type.parse::<mime::Mime>() {
            Ok(m) => m,
            Err(err) => {
                log::debug!("ignoring unparseable content type {:?}: {}", content_type, err);
                return None;
            }
        };

        if m.type_() == mime::APPLICATION && m.subtype() == mime::WWW_FORM_URLENCODED {
            return Some(ContentKind::UrlEncoded);
        }

        if m.type_() == mime::MULTIPART {
            return match crate::parse_boundary(content_type) {
                Ok(boundary) => Some(ContentKind::Multipart { boundary }),
                Err(err) => {
                    log::debug!("not decoding multipart content type {:?}: {}", content_type, err);
                    None
                }
            };
        }

        None
    }
}
