use std::path::PathBuf;

use bytes::Bytes;
use futures_util::future;
use futures_util::stream::{self, StreamExt};

use crate::files::{FileDescriptor, Files};
use crate::multipart::{Multipart, Part};
use crate::options::Options;
use crate::qs::{self, Fields};
use crate::storage::{self, Capture, Stored, Unclaimed};

/// A file part whose bytes have been handed to the storage backend.
struct PendingUpload {
    field_name: String,
    filename: String,
    encoding: String,
    mimetype: String,
    capture: Capture,
}

/// An upload whose write has settled, held until every sibling upload has
/// settled too.
struct SettledUpload {
    field_name: String,
    filename: String,
    encoding: String,
    mimetype: String,
    stored: Unclaimed,
    written: bool,
}

impl PendingUpload {
    async fn finish(self) -> SettledUpload {
        let path: Option<PathBuf> = self.capture.path().map(Into::into);

        let (stored, written) = match self.capture.finish().await {
            Ok(Some(stored)) => (Some(stored), true),
            Ok(None) => (None, true),
            Err(err) => {
                log::warn!("upload {:?} of field {:?} was not written: {}", self.filename, self.field_name, err);
                (path.map(Stored::Disk), false)
            }
        };

        SettledUpload {
            field_name: self.field_name,
            filename: self.filename,
            encoding: self.encoding,
            mimetype: self.mimetype,
            stored: Unclaimed::new(stored),
            written,
        }
    }
}

impl SettledUpload {
    fn into_descriptor(self) -> (String, FileDescriptor) {
        let file = FileDescriptor {
            filename: self.filename,
            encoding: self.encoding,
            mimetype: self.mimetype,
            stored: self.stored.claim().unwrap_or_else(|| Stored::Memory(Bytes::new())),
            written: self.written,
            manual_cleanup: false,
        };

        (self.field_name, file)
    }
}

/// Re-streams the captured body through the tokenizer and assembles fields
/// and files.
///
/// Text fields are re-encoded as `key=value` pairs and decoded by the same
/// codec as url-encoded bodies. Tokenizer and per-file failures are logged
/// and yield whatever was assembled so far.
pub(crate) async fn decode_multipart(raw_body: Option<&Stored>, boundary: &str, options: &Options) -> (Fields, Files) {
    let raw_body = match raw_body {
        Some(raw_body) => raw_body,
        None => return (Fields::new(), Files::new()),
    };

    let source = match raw_body.stream().await {
        Ok(source) => source,
        Err(err) => {
            log::warn!("failed to re-stream the raw body for multipart decoding: {}", err);
            stream::empty().boxed()
        }
    };

    let mut multipart = Multipart::from_stream(source, boundary, options.tokenizer.clone());
    let mut pairs = Vec::new();
    let mut uploads = Vec::new();

    loop {
        let part = match multipart.next_part().await {
            Ok(Some(part)) => part,
            Ok(None) => break,
            Err(err) => {
                log::warn!("multipart decoding stopped early: {}", err);
                break;
            }
        };

        let field_name = match part.name() {
            Some(name) => name.to_owned(),
            None => {
                log::debug!("skipping multipart part {} without a name", part.index());
                continue;
            }
        };

        if part.is_file() {
            if let Some(upload) = store_file(part, field_name, options).await {
                uploads.push(upload);
            }
        } else {
            match part.text_with_charset(&options.tokenizer.default_charset).await {
                Ok(value) => pairs.push(qs::encode_pair(&field_name, &value)),
                Err(err) => log::warn!("failed to read multipart field {:?}: {}", field_name, err),
            }
        }
    }

    // Nothing below awaits: once every upload settled, they all land in
    // `files` together.
    let settled = future::join_all(uploads.into_iter().map(PendingUpload::finish)).await;

    let mut files = Files::new();
    for upload in settled {
        let (field_name, file) = upload.into_descriptor();
        files.fold(&field_name, file);
    }

    (qs::decode(&pairs.join("&"), &options.query), files)
}

async fn store_file(part: Part, field_name: String, options: &Options) -> Option<PendingUpload> {
    let filename = part.file_name().unwrap_or_default().to_owned();
    let encoding = part.transfer_encoding().to_owned();
    let mimetype = part.mimetype().to_owned();

    match options.storage.begin(part, &storage::unique_token()).await {
        Ok(capture) => Some(PendingUpload {
            field_name,
            filename,
            encoding,
            mimetype,
            capture,
        }),
        Err(err) => {
            log::warn!("failed to store upload {:?} of field {:?}: {}", filename, field_name, err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::FileEntry;
    use crate::qs::Value;
    use crate::storage::Storage;

    const BODY: &str = "--X\r\nContent-Disposition: form-data; name=\"arr[]\"\r\n\r\nx\r\n--X\r\nContent-Disposition: form-data; name=\"arr[]\"\r\n\r\ny\r\n--X\r\nContent-Disposition: form-data; name=\"doc\"; filename=\"r.txt\"\r\nContent-Type: text/plain\r\n\r\nhello\r\n--X--\r\n";

    #[tokio::test]
    async fn test_decode_memory() {
        let stored = Stored::Memory(Bytes::from_static(BODY.as_bytes()));
        let (fields, files) = decode_multipart(Some(&stored), "X", &Options::new()).await;

        assert_eq!(fields.get("arr"), Some(&Value::Sequence(vec!["x".to_owned(), "y".to_owned()])));

        let doc = files.get("doc").and_then(FileEntry::as_single).unwrap();
        assert_eq!(doc.filename(), "r.txt");
        assert_eq!(doc.mimetype(), "text/plain");
        assert_eq!(doc.encoding(), "7bit");
        assert!(doc.is_written());
        assert_eq!(doc.bytes(), Some(&Bytes::from_static(b"hello")));
    }

    #[tokio::test]
    async fn test_decode_disk() {
        let dir = tempfile::tempdir().unwrap();
        let body = dir.path().join("body");
        std::fs::write(&body, BODY).unwrap();

        let options = Options::new().storage(Storage::Disk(dir.path().join("uploads")));
        let (fields, files) = decode_multipart(Some(&Stored::Disk(body)), "X", &options).await;

        assert_eq!(fields.get("arr").and_then(Value::as_sequence).map(|s| s.len()), Some(2));

        let doc = files.get("doc").and_then(FileEntry::as_single).unwrap();
        assert!(doc.is_written());
        assert!(doc.path().unwrap().starts_with(dir.path().join("uploads")));
        assert_eq!(doc.read().await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn test_decode_truncated_keeps_completed_parts() {
        let truncated = &BODY[..BODY.find("hello").unwrap()];
        let stored = Stored::Memory(Bytes::from(truncated.to_owned()));
        let (fields, files) = decode_multipart(Some(&stored), "X", &Options::new()).await;

        assert_eq!(fields.get("arr").and_then(Value::as_sequence).map(|s| s.len()), Some(2));
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn test_decode_unreadable_body() {
        let stored = Stored::Disk(PathBuf::from("/definitely/not/here"));
        let (fields, files) = decode_multipart(Some(&stored), "X", &Options::new()).await;

        assert!(fields.is_empty());
        assert!(files.is_empty());
    }
}
