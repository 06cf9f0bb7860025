use std::path::Path;

use bytes::Bytes;
#[cfg(feature = "json")]
use serde::de::DeserializeOwned;

use crate::files::Files;
use crate::qs::Fields;
use crate::storage::Stored;
use crate::url::ParsedUrl;

/// Everything extracted from one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub(crate) id: String,
    pub(crate) raw_body: Option<Stored>,
    pub(crate) parsed_url: ParsedUrl,
    pub(crate) form_fields: Option<Fields>,
    pub(crate) form_files: Option<Files>,
    pub(crate) ended: bool,
}

impl RequestContext {
    pub(crate) fn new(id: String, parsed_url: ParsedUrl) -> RequestContext {
        RequestContext {
            id,
            raw_body: None,
            parsed_url,
            form_fields: None,
            form_files: None,
            ended: false,
        }
    }

    /// Unique token of the request.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The raw body, for memory storage. `None` when no byte was received.
    pub fn raw_body(&self) -> Option<&Bytes> {
        self.raw_body.as_ref().and_then(Stored::as_bytes)
    }

    /// The file holding the raw body, for disk storage.
    pub fn raw_body_path(&self) -> Option<&Path> {
        self.raw_body.as_ref().and_then(Stored::path)
    }

    pub fn stored_body(&self) -> Option<&Stored> {
        self.raw_body.as_ref()
    }

    /// Reads the raw body from whichever storage holds it.
    pub async fn read_raw_body(&self) -> crate::Result<Option<Bytes>> {
        match &self.raw_body {
            Some(stored) => stored.read().await.map(Some),
            None => Ok(None),
        }
    }

    pub fn parsed_url(&self) -> &ParsedUrl {
        &self.parsed_url
    }

    /// Decoded form fields; `None` unless the body was a url-encoded or
    /// multipart form.
    pub fn form_fields(&self) -> Option<&Fields> {
        self.form_fields.as_ref()
    }

    /// Uploaded files; `None` unless the body was a multipart form.
    pub fn form_files(&self) -> Option<&Files> {
        self.form_files.as_ref()
    }

    /// Mutable access, e.g. to claim files with
    /// [`FileDescriptor::set_manual_cleanup`](crate::FileDescriptor::set_manual_cleanup).
    pub fn form_files_mut(&mut self) -> Option<&mut Files> {
        self.form_files.as_mut()
    }

    /// Whether the transport stream has been read to its end.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Deserializes the raw body as JSON.
    #[cfg(feature = "json")]
    pub async fn json<T: DeserializeOwned>(&self) -> crate::Result<T> {
        let bytes = self.read_raw_body().await?.unwrap_or_default();
        serde_json::from_slice(&bytes).map_err(crate::Error::DecodeJson)
    }

    /// Disk artifacts that cleaning up removes: the raw body file and every
    /// upload not claimed for manual cleanup.
    pub(crate) fn artifacts(&self) -> Vec<Stored> {
        let files = self
            .form_files
            .iter()
            .flat_map(Files::descriptors)
            .filter(|file| !file.manual_cleanup())
            .map(|file| file.stored().clone());

        self.raw_body
            .iter()
            .cloned()
            .chain(files)
            .filter(|stored| stored.path().is_some())
            .collect()
    }
}
