use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use crate::constants;
use crate::Error;

/// Where captured bytes are kept: the raw body and every uploaded file of a
/// request use the same backend.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Storage {
    /// Keep everything in memory.
    #[default]
    Memory,
    /// Persist everything as files below the given root directory.
    Disk(PathBuf),
}

impl Storage {
    /// The storage root, for disk storage.
    pub fn root(&self) -> Option<&Path> {
        match self {
            Storage::Memory => None,
            Storage::Disk(root) => Some(root),
        }
    }

    /// Drains `stream` and resolves once the captured bytes are durable.
    ///
    /// Memory storage yields `None` for a stream without any bytes.
    pub(crate) async fn capture<S>(&self, stream: S, token: &str) -> crate::Result<Option<Stored>>
    where
        S: Stream<Item = crate::Result<Bytes>> + Unpin,
    {
        self.begin(stream, token).await?.finish().await
    }

    /// Drains `stream` into the backend without waiting for durability.
    ///
    /// When the backend fails, the rest of the stream is still read and
    /// discarded before returning the error.
    pub(crate) async fn begin<S>(&self, mut stream: S, token: &str) -> crate::Result<Capture>
    where
        S: Stream<Item = crate::Result<Bytes>> + Unpin,
    {
        match self {
            Storage::Memory => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(Capture::Memory(buf.freeze()))
            }
            Storage::Disk(root) => {
                if let Err(source) = fs::create_dir_all(root).await {
                    drain(&mut stream).await;
                    return Err(Error::CreateStorageDir {
                        path: root.clone(),
                        source,
                    });
                }

                // From here on, dropping this future removes the partial file.
                let mut pending = PendingFile::new(root.join(token));

                match File::create(&pending.path).await {
                    Ok(file) => pending.file = Some(file),
                    Err(source) => {
                        let path = pending.disarm();
                        drain(&mut stream).await;
                        return Err(Error::CreateFile { path, source });
                    }
                }

                while let Some(chunk) = stream.next().await {
                    let bytes = match chunk {
                        Ok(bytes) => bytes,
                        Err(err) => {
                            pending.discard().await;
                            return Err(err);
                        }
                    };

                    if let Err(source) = pending.write_all(&bytes).await {
                        drain(&mut stream).await;
                        let path = pending.discard().await;
                        return Err(Error::WriteFile { path, source });
                    }
                }

                log::debug!("captured stream into {}", pending.path.display());
                Ok(Capture::Disk(pending))
            }
        }
    }
}

impl FromStr for Storage {
    type Err = Infallible;

    /// `"memory"` (or an empty string) selects memory storage, anything else
    /// is taken as the root directory for disk storage.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case(constants::MEMORY_STORAGE) {
            Ok(Storage::Memory)
        } else {
            Ok(Storage::Disk(PathBuf::from(s)))
        }
    }
}

/// A stream that has been fully read into the backend but whose bytes may
/// still be buffered on their way to disk.
#[derive(Debug)]
pub(crate) enum Capture {
    Memory(Bytes),
    Disk(PendingFile),
}

impl Capture {
    pub(crate) fn path(&self) -> Option<&Path> {
        match self {
            Capture::Memory(_) => None,
            Capture::Disk(pending) => Some(&pending.path),
        }
    }

    /// Resolves when the write is durable, not merely when the source ended.
    ///
    /// A failed flush removes the partial file.
    pub(crate) async fn finish(self) -> crate::Result<Option<Stored>> {
        match self {
            Capture::Memory(bytes) if bytes.is_empty() => Ok(None),
            Capture::Memory(bytes) => Ok(Some(Stored::Memory(bytes))),
            Capture::Disk(mut pending) => match pending.sync().await {
                Ok(()) => Ok(Some(Stored::Disk(pending.release()))),
                Err(source) => {
                    let path = pending.discard().await;
                    Err(Error::WriteFile { path, source })
                }
            },
        }
    }
}

/// A file being written. Dropped before [`release`](PendingFile::release) or
/// [`discard`](PendingFile::discard), it removes itself in the background.
#[derive(Debug)]
pub(crate) struct PendingFile {
    path: PathBuf,
    file: Option<File>,
    armed: bool,
}

impl PendingFile {
    fn new(path: PathBuf) -> PendingFile {
        PendingFile {
            path,
            file: None,
            armed: true,
        }
    }

    async fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.write_all(bytes).await,
            None => Ok(()),
        }
    }

    async fn sync(&mut self) -> std::io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush().await?;
            file.sync_all().await?;
        }
        Ok(())
    }

    fn disarm(&mut self) -> PathBuf {
        self.armed = false;
        self.file = None;
        std::mem::take(&mut self.path)
    }

    fn release(mut self) -> PathBuf {
        self.disarm()
    }

    async fn discard(&mut self) -> PathBuf {
        let path = self.disarm();
        remove_file(&path).await;
        path
    }
}

impl Drop for PendingFile {
    fn drop(&mut self) {
        if self.armed {
            log::debug!("abandoned partial file {}", self.path.display());
            self.file = None;
            remove_detached(std::mem::take(&mut self.path));
        }
    }
}

/// Holds captured bytes that no caller has claimed yet. Dropped without
/// [`claim`](Unclaimed::claim), a disk artifact is removed in the background.
pub(crate) struct Unclaimed(Option<Stored>);

impl Unclaimed {
    pub(crate) fn new(stored: Option<Stored>) -> Unclaimed {
        Unclaimed(stored)
    }

    pub(crate) fn stored(&self) -> Option<&Stored> {
        self.0.as_ref()
    }

    pub(crate) fn claim(mut self) -> Option<Stored> {
        self.0.take()
    }
}

impl Drop for Unclaimed {
    fn drop(&mut self) {
        if let Some(Stored::Disk(path)) = self.0.take() {
            log::debug!("removing unclaimed {}", path.display());
            remove_detached(path);
        }
    }
}

/// A reference to captured bytes: the buffer itself, or the file holding
/// them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stored {
    Memory(Bytes),
    Disk(PathBuf),
}

impl Stored {
    /// The buffered bytes, if they were kept in memory.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Stored::Memory(bytes) => Some(bytes),
            Stored::Disk(_) => None,
        }
    }

    /// The file holding the bytes, if they were written to disk.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Stored::Memory(_) => None,
            Stored::Disk(path) => Some(path),
        }
    }

    /// Reads the whole content, from memory or from disk.
    pub async fn read(&self) -> crate::Result<Bytes> {
        match self {
            Stored::Memory(bytes) => Ok(bytes.clone()),
            Stored::Disk(path) => fs::read(path)
                .await
                .map(Bytes::from)
                .map_err(|source| Error::ReadFile {
                    path: path.clone(),
                    source,
                }),
        }
    }

    /// Replays the content as a stream of chunks.
    pub async fn stream(&self) -> crate::Result<BoxStream<'static, crate::Result<Bytes>>> {
        match self {
            Stored::Memory(bytes) => {
                let bytes = bytes.clone();
                Ok(stream::once(async move { Ok(bytes) }).boxed())
            }
            Stored::Disk(path) => {
                let file = File::open(path).await.map_err(|source| Error::ReadFile {
                    path: path.clone(),
                    source,
                })?;

                let path = path.clone();
                Ok(ReaderStream::new(file)
                    .map_err(move |source| Error::ReadFile {
                        path: path.clone(),
                        source,
                    })
                    .boxed())
            }
        }
    }

    /// Best-effort removal of the backing file; memory content needs none.
    pub(crate) async fn remove(&self) {
        if let Stored::Disk(path) = self {
            remove_file(path).await;
        }
    }
}

pub(crate) fn unique_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Reads and discards the rest of a source the backend couldn't take, until
/// its end or its first error.
async fn drain<S>(stream: &mut S)
where
    S: Stream<Item = crate::Result<Bytes>> + Unpin,
{
    while let Some(Ok(_)) = stream.next().await {}
}

/// Removes `path` without waiting: on the current runtime when there is one,
/// synchronously otherwise. Used from `Drop`, where nothing can be awaited.
pub(crate) fn remove_detached(path: PathBuf) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move { remove_file(&path).await });
        }
        Err(_) => match std::fs::remove_file(&path) {
            Ok(()) => log::debug!("removed {}", path.display()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => log::warn!("failed to remove {}: {}", path.display(), err),
        },
    }
}

async fn remove_file(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => log::debug!("removed {}", path.display()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("{} already removed", path.display())
        }
        Err(err) => log::warn!("failed to remove {}: {}", path.display(), err),
    }
}
