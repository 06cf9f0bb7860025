use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use http::Request;
use reqparser::{Body, ConnectionInfo, Error, FileEntry, Options, ReqParser, Storage, Value};

const MULTIPART: &str = "--X\r\nContent-Disposition: form-data; name=\"arr[]\"\r\n\r\nx\r\n--X\r\nContent-Disposition: form-data; name=\"arr[]\"\r\n\r\ny\r\n--X\r\nContent-Disposition: form-data; name=\"doc\"; filename=\"r.txt\"\r\nContent-Type: text/plain\r\n\r\nhello\r\n--X\r\nContent-Disposition: form-data; name=\"pics[]\"; filename=\"a.png\"\r\nContent-Type: image/png\r\n\r\nAAAA\r\n--X\r\nContent-Disposition: form-data; name=\"pics[]\"; filename=\"b.png\"\r\nContent-Type: image/png\r\n\r\nBBBB\r\n--X--\r\n";

fn chunked(data: &'static str, size: usize) -> Body {
    let chunks: Vec<Result<Bytes, std::io::Error>> = data
        .as_bytes()
        .chunks(size)
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect();
    Body::wrap_stream(stream::iter(chunks))
}

fn multipart_request(body: Body) -> Request<Body> {
    Request::post("/upload")
        .header("content-type", "multipart/form-data; boundary=X")
        .body(body)
        .unwrap()
}

fn disk_parser(root: &std::path::Path) -> ReqParser {
    ReqParser::new(Options::new().storage(Storage::Disk(root.to_owned())))
}

#[tokio::test]
async fn test_get_without_body() {
    let request = Request::get("/foo?bar=baz").body(Body::empty()).unwrap();
    let ctx = ReqParser::default().parse(request).await.unwrap();

    let url = ctx.parsed_url();
    assert_eq!(url.scheme(), "http");
    assert_eq!(url.host(), "localhost");
    assert_eq!(url.pathname(), "/foo");
    assert_eq!(url.query().get("bar"), Some(&Value::from("baz")));

    assert_eq!(ctx.raw_body(), None);
    assert_eq!(ctx.raw_body_path(), None);
    assert!(ctx.form_fields().is_none());
    assert!(ctx.form_files().is_none());
}

#[tokio::test]
async fn test_forwarded_proto_wins_over_connection() {
    let mut request = Request::get("/")
        .header("X-Forwarded-Proto", "https")
        .header("host", "example.com:8443")
        .body(Body::empty())
        .unwrap();
    request.extensions_mut().insert(ConnectionInfo { encrypted: false });

    let ctx = ReqParser::default().parse(request).await.unwrap();
    assert_eq!(ctx.parsed_url().scheme(), "https");
    assert_eq!(ctx.parsed_url().hostname(), "example.com");
    assert_eq!(ctx.parsed_url().port(), Some(8443));
}

#[tokio::test]
async fn test_memory_raw_body_regardless_of_chunking() {
    let data = "some raw payload that is not a form at all";

    for size in [1, 3, 7, data.len()] {
        let request = Request::post("/").body(chunked(data, size)).unwrap();
        let ctx = ReqParser::default().parse(request).await.unwrap();

        assert!(ctx.is_ended());
        assert_eq!(ctx.raw_body(), Some(&Bytes::from_static(data.as_bytes())));
        assert_eq!(ctx.raw_body_path(), None);
    }
}

#[tokio::test]
async fn test_memory_empty_stream_has_no_raw_body() {
    let request = Request::post("/").body(chunked("", 1)).unwrap();
    let ctx = ReqParser::default().parse(request).await.unwrap();

    assert!(ctx.is_ended());
    assert_eq!(ctx.raw_body(), None);
}

#[tokio::test]
async fn test_disk_raw_body() {
    let dir = tempfile::tempdir().unwrap();
    let parser = disk_parser(dir.path());
    let data = "bytes that end up in a file";

    let request = Request::post("/").body(chunked(data, 5)).unwrap();
    let ctx = parser.parse(request).await.unwrap();

    let path = ctx.raw_body_path().unwrap().to_owned();
    assert!(path.starts_with(dir.path()));
    assert_eq!(std::fs::read(&path).unwrap(), data.as_bytes());
    assert_eq!(ctx.raw_body(), None);
    assert_eq!(ctx.read_raw_body().await.unwrap(), Some(Bytes::from_static(data.as_bytes())));

    parser.clean(&ctx).await.unwrap();
    assert!(!path.exists());
}

#[tokio::test]
async fn test_urlencoded_body() {
    let request = Request::post("/form")
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(chunked("foo=bar&tag=a&tag=b", 4))
        .unwrap();

    let ctx = ReqParser::default().parse(request).await.unwrap();
    let fields = ctx.form_fields().unwrap();

    assert_eq!(fields.get("foo"), Some(&Value::from("bar")));
    assert_eq!(
        fields.get("tag"),
        Some(&Value::Sequence(vec!["a".to_owned(), "b".to_owned()]))
    );
    assert!(ctx.form_files().is_none());
}

#[tokio::test]
async fn test_multipart_memory() {
    let ctx = ReqParser::default()
        .parse(multipart_request(chunked(MULTIPART, 3)))
        .await
        .unwrap();

    let fields = ctx.form_fields().unwrap();
    assert_eq!(
        fields.get("arr"),
        Some(&Value::Sequence(vec!["x".to_owned(), "y".to_owned()]))
    );

    let files = ctx.form_files().unwrap();
    let doc = files.get("doc").and_then(FileEntry::as_single).unwrap();
    assert_eq!(doc.filename(), "r.txt");
    assert_eq!(doc.mimetype(), "text/plain");
    assert_eq!(doc.read().await.unwrap(), Bytes::from_static(b"hello"));

    let pics = files.get("pics").and_then(FileEntry::as_multiple).unwrap();
    assert_eq!(pics.len(), 2);
    assert_eq!(pics[0].filename(), "a.png");
    assert_eq!(pics[1].bytes(), Some(&Bytes::from_static(b"BBBB")));
}

#[tokio::test]
async fn test_multipart_disk() {
    let dir = tempfile::tempdir().unwrap();
    let parser = disk_parser(dir.path());

    let ctx = parser.parse(multipart_request(chunked(MULTIPART, 11))).await.unwrap();

    let files = ctx.form_files().unwrap();
    let doc = files.get("doc").and_then(FileEntry::as_single).unwrap();
    assert!(doc.is_written());
    assert_eq!(std::fs::read(doc.path().unwrap()).unwrap(), b"hello");
    assert_eq!(files.descriptors().count(), 3);

    let mut paths: Vec<_> = files.descriptors().map(|f| f.path().unwrap().to_owned()).collect();
    paths.push(ctx.raw_body_path().unwrap().to_owned());

    parser.clean(&ctx).await.unwrap();
    for path in &paths {
        assert!(!path.exists(), "{} should be gone", path.display());
    }
}

#[tokio::test]
async fn test_unwritable_storage_root() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let root = file.path().join("uploads");
    let parser = disk_parser(&root);

    let request = Request::post("/").body(chunked("doomed", 2)).unwrap();
    let err = parser.parse(request).await.unwrap_err();

    assert!(matches!(err.error(), Error::CreateStorageDir { .. }));
    assert_eq!(err.context().raw_body_path(), None);
    assert!(err.context().is_ended());
    assert!(!root.exists());

    let (_, ctx) = err.into_parts();
    parser.clean(&ctx).await.unwrap();
}

#[tokio::test]
async fn test_transport_error_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let parser = disk_parser(dir.path());

    let body = Body::wrap_stream(stream::iter(vec![
        Ok(Bytes::from_static(b"partial")),
        Err(std::io::Error::new(std::io::ErrorKind::ConnectionAborted, "aborted")),
    ]));
    let err = parser.parse(Request::post("/").body(body).unwrap()).await.unwrap_err();

    assert!(matches!(err.error(), Error::StreamReadFailed(_)));
    assert!(!err.context().is_ended());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_cancelled_parse_leaves_no_files() {
    let dir = tempfile::tempdir().unwrap();
    let parser = disk_parser(dir.path());

    let body = Body::wrap_stream(stream::iter(vec!["abc", "def"]).then(|chunk| async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok::<_, std::io::Error>(Bytes::from_static(chunk.as_bytes()))
    }));

    let parsed = tokio::time::timeout(Duration::from_millis(20), parser.parse(Request::post("/").body(body).unwrap())).await;
    assert!(parsed.is_err());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_cancelled_multipart_decode_leaves_no_files() {
    let dir = tempfile::tempdir().unwrap();
    let parser = disk_parser(dir.path());

    // The whole body arrives, then decoding is cut short at varying points.
    for millis in [0, 1, 2, 5, 10] {
        let request = multipart_request(chunked(MULTIPART, 7));
        let parsed = tokio::time::timeout(Duration::from_millis(millis), parser.parse(request)).await;

        if let Ok(Ok(ctx)) = parsed {
            parser.clean(&ctx).await.unwrap();
        }
    }

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_manual_cleanup_survives_clean() {
    let dir = tempfile::tempdir().unwrap();
    let parser = disk_parser(dir.path());

    let mut ctx = parser.parse(multipart_request(chunked(MULTIPART, 64))).await.unwrap();

    let doc = ctx.form_files_mut().unwrap().get_mut("doc").unwrap();
    doc.descriptors_mut()[0].set_manual_cleanup(true);

    let files = ctx.form_files().unwrap();
    let kept = files.get("doc").and_then(FileEntry::as_single).unwrap().path().unwrap().to_owned();
    let removed: Vec<_> = files
        .get("pics")
        .unwrap()
        .descriptors()
        .iter()
        .map(|f| f.path().unwrap().to_owned())
        .collect();
    let raw = ctx.raw_body_path().unwrap().to_owned();

    parser.clean(&ctx).await.unwrap();

    assert!(kept.exists());
    assert!(!raw.exists());
    assert!(removed.iter().all(|path| !path.exists()));

    std::fs::remove_file(kept).unwrap();
}

#[tokio::test]
async fn test_clean_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let parser = disk_parser(dir.path());

    let ctx = parser.parse(multipart_request(chunked(MULTIPART, 5))).await.unwrap();

    parser.clean(&ctx).await.unwrap();
    let after_first: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();

    parser.clean(&ctx).await.unwrap();
    let after_second: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();

    assert!(after_first.is_empty());
    assert!(after_second.is_empty());
}

#[tokio::test]
async fn test_multipart_without_boundary_is_not_a_form() {
    let request = Request::post("/")
        .header("content-type", "multipart/form-data")
        .body(Body::from(MULTIPART))
        .unwrap();

    let ctx = ReqParser::default().parse(request).await.unwrap();
    assert!(ctx.form_fields().is_none());
    assert!(ctx.form_files().is_none());
    assert_eq!(ctx.raw_body().map(|b| b.len()), Some(MULTIPART.len()));
}

#[cfg(feature = "json")]
#[tokio::test]
async fn test_json_body() {
    #[derive(serde::Deserialize, Debug, PartialEq)]
    struct Payload {
        name: String,
        count: u32,
    }

    let request = Request::post("/")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"name":"widget","count":3}"#))
        .unwrap();

    let ctx = ReqParser::default().parse(request).await.unwrap();
    assert!(ctx.form_fields().is_none());
    assert_eq!(
        ctx.json::<Payload>().await.unwrap(),
        Payload {
            name: "widget".to_owned(),
            count: 3
        }
    );
}
