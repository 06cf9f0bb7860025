pub(crate) const DEFAULT_MAX_HEADERS: usize = 32;
pub(crate) const DEFAULT_CHARSET: &str = "utf-8";
pub(crate) const DEFAULT_MAX_PARAMS: usize = 10_000;

pub(crate) const BOUNDARY_EXT: &str = "--";
pub(crate) const CRLF: &str = "\r\n";
pub(crate) const CRLF_CRLF: &str = "\r\n\r\n";

/// Suffix folding repeated names into an ordered sequence.
pub(crate) const ARRAY_MARKER: &str = "[]";

pub(crate) const DEFAULT_HOST: &str = "localhost";
pub(crate) const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

pub(crate) const DEFAULT_TRANSFER_ENCODING: &str = "7bit";
pub(crate) const DEFAULT_FILE_MIMETYPE: &str = "application/octet-stream";

pub(crate) const MEMORY_STORAGE: &str = "memory";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ContentDispositionAttr {
    Name,
    FileName,
}

impl ContentDispositionAttr {
    /// Extracts the attribute's value from a `Content-Disposition` header
    /// value, honoring quoted strings that contain `;`.
    pub(crate) fn extract_from<'h>(&self, header: &'h str) -> Option<&'h str> {
        let wanted = match self {
            ContentDispositionAttr::Name => "name",
            ContentDispositionAttr::FileName => "filename",
        };

        let mut rest = header;
        loop {
            let (param, remaining) = split_param(rest);

            if let Some((key, value)) = param.split_once('=') {
                if key.trim().eq_ignore_ascii_case(wanted) {
                    let value = value.trim();
                    return Some(
                        value
                            .strip_prefix('"')
                            .and_then(|v| v.strip_suffix('"'))
                            .unwrap_or(value),
                    );
                }
            }

            rest = remaining?;
        }
    }
}

fn split_param(input: &str) -> (&str, Option<&str>) {
    let mut quoted = false;
    for (idx, ch) in input.char_indices() {
        match ch {
            '"' => quoted = !quoted,
            ';' if !quoted => return (&input[..idx], Some(&input[idx + 1..])),
            _ => {}
        }
    }
    (input, None)
}
