use futures_util::stream::TryStreamExt;
use tokio::sync::oneshot;

use crate::body::Body;
use crate::completion::{Completion, Settle};
use crate::storage::{Storage, Stored, Unclaimed};
use crate::Error;

/// A raw body capture that has been started and not yet waited on.
///
/// The capture runs on its own task. Whoever drops out first, the waiting
/// side or the capture, makes sure a captured file nobody received is
/// removed.
pub(crate) struct PendingCapture {
    rx: oneshot::Receiver<crate::Result<Option<Stored>>>,
}

impl PendingCapture {
    /// Starts draining the transport stream into `storage`.
    ///
    /// This must be the first reader of the body. Without a transport stream
    /// the capture is settled right away with nothing stored.
    pub(crate) fn start(body: Body, storage: &Storage, token: &str) -> PendingCapture {
        let (mut completion, rx) = Completion::new("raw body capture");

        let stream = match body.into_stream() {
            Some(stream) => stream.map_err(Error::StreamReadFailed),
            None => {
                completion.settle(Ok(None));
                return PendingCapture { rx };
            }
        };

        let storage = storage.clone();
        let token = token.to_owned();

        tokio::spawn(async move {
            log::debug!("capturing raw body of request {}", token);
            let result = storage.capture(stream, &token).await;

            if let Err(err) = &result {
                log::debug!("raw body capture of request {} failed: {}", token, err);
            }

            if let Settle::Orphaned(Ok(Some(stored))) = completion.settle(result) {
                log::debug!("request {} went away during capture", token);
                stored.remove().await;
            }
        });

        PendingCapture { rx }
    }

    /// Waits for the single outcome of the capture.
    pub(crate) async fn settled(mut self) -> crate::Result<Option<Stored>> {
        (&mut self.rx).await.unwrap_or(Err(Error::CaptureAborted))
    }
}

impl Drop for PendingCapture {
    fn drop(&mut self) {
        // A result sent just before the waiting side went away is still in
        // the channel; after `close` the capture task sees the drop instead.
        self.rx.close();
        if let Ok(Ok(stored)) = self.rx.try_recv() {
            drop(Unclaimed::new(stored));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures_util::stream::{self, StreamExt};
    use std::time::Duration;

    #[tokio::test]
    async fn test_no_transport_stream() {
        let capture = PendingCapture::start(Body::empty(), &Storage::Memory, "id");
        assert_eq!(capture.settled().await, Ok(None));
    }

    #[tokio::test]
    async fn test_memory_capture_across_chunks() {
        let body = Body::wrap_stream(stream::iter(
            vec!["fo", "ob", "ar"]
                .into_iter()
                .map(|part| Ok::<_, std::io::Error>(Bytes::from_static(part.as_bytes()))),
        ));

        let capture = PendingCapture::start(body, &Storage::Memory, "id");
        assert_eq!(
            capture.settled().await,
            Ok(Some(Stored::Memory(Bytes::from_static(b"foobar"))))
        );
    }

    #[tokio::test]
    async fn test_dropped_wait_removes_captured_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::Disk(dir.path().to_owned());
        let body = Body::wrap_stream(stream::iter(vec!["abc", "def"]).then(|chunk| async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok::<_, std::io::Error>(Bytes::from_static(chunk.as_bytes()))
        }));

        let capture = PendingCapture::start(body, &storage, "id");
        drop(capture);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!dir.path().join("id").exists());
    }

    #[tokio::test]
    async fn test_dropped_after_delivery_removes_captured_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::Disk(dir.path().to_owned());

        let capture = PendingCapture::start(Body::from("abc"), &storage, "id");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(dir.path().join("id").exists());

        drop(capture);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!dir.path().join("id").exists());
    }

    #[tokio::test]
    async fn test_transport_error_settles_with_error() {
        let body = Body::wrap_stream(stream::iter(vec![
            Ok(Bytes::from_static(b"foo")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ]));

        let capture = PendingCapture::start(body, &Storage::Memory, "id");
        let err = capture.settled().await.unwrap_err();
        assert!(matches!(err, Error::StreamReadFailed(_)));
    }
}
