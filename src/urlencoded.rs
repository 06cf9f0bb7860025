use crate::options::QueryOptions;
use crate::qs::{self, Fields};
use crate::storage::Stored;

/// Decodes a captured `application/x-www-form-urlencoded` body.
///
/// No captured body decodes to no fields. A persisted body that can't be read
/// back is an error.
pub(crate) async fn decode_urlencoded(raw_body: Option<&Stored>, options: &QueryOptions) -> crate::Result<Fields> {
    let raw_body = match raw_body {
        Some(raw_body) => raw_body,
        None => return Ok(Fields::new()),
    };

    let bytes = raw_body.read().await?;
    Ok(qs::decode(&String::from_utf8_lossy(&bytes), options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qs::Value;
    use bytes::Bytes;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_decode_memory_body() {
        let stored = Stored::Memory(Bytes::from_static(b"foo=bar&tag=a&tag=b"));
        let fields = decode_urlencoded(Some(&stored), &QueryOptions::default()).await.unwrap();

        assert_eq!(fields.get("foo"), Some(&Value::from("bar")));
        assert_eq!(
            fields.get("tag"),
            Some(&Value::Sequence(vec!["a".to_owned(), "b".to_owned()]))
        );
    }

    #[tokio::test]
    async fn test_decode_disk_body() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("body");
        std::fs::write(&path, "a[b]=c&list[]=1").unwrap();

        let fields = decode_urlencoded(Some(&Stored::Disk(path)), &QueryOptions::default())
            .await
            .unwrap();
        let a = fields.get("a").and_then(Value::as_nested).unwrap();
        assert_eq!(a.get("b"), Some(&Value::from("c")));
        assert_eq!(fields.get("list"), Some(&Value::Sequence(vec!["1".to_owned()])));
    }

    #[tokio::test]
    async fn test_decode_without_body() {
        let fields = decode_urlencoded(None, &QueryOptions::default()).await.unwrap();
        assert!(fields.is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_body_is_an_error() {
        let stored = Stored::Disk(PathBuf::from("/definitely/not/here"));
        let err = decode_urlencoded(Some(&stored), &QueryOptions::default()).await.unwrap_err();
        assert!(matches!(err, crate::Error::ReadFile { .. }));
    }
}
