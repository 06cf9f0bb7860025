use std::collections::btree_map::{self, BTreeMap};
use std::path::Path;

use bytes::Bytes;

use crate::constants::ARRAY_MARKER;
use crate::storage::Stored;

/// One uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub(crate) filename: String,
    pub(crate) encoding: String,
    pub(crate) mimetype: String,
    pub(crate) stored: Stored,
    pub(crate) written: bool,
    pub(crate) manual_cleanup: bool,
}

impl FileDescriptor {
    /// The `filename` sent by the client.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// The part's `Content-Transfer-Encoding`.
    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    /// The part's `Content-Type`.
    pub fn mimetype(&self) -> &str {
        &self.mimetype
    }

    pub fn stored(&self) -> &Stored {
        &self.stored
    }

    /// The content, for memory storage.
    pub fn bytes(&self) -> Option<&Bytes> {
        self.stored.as_bytes()
    }

    /// The file holding the content, for disk storage.
    pub fn path(&self) -> Option<&Path> {
        self.stored.path()
    }

    /// Whether the content is durably stored.
    pub fn is_written(&self) -> bool {
        self.written
    }

    pub fn manual_cleanup(&self) -> bool {
        self.manual_cleanup
    }

    /// Claims the backing file: [`ReqParser::clean`](crate::ReqParser::clean)
    /// leaves it alone from now on.
    pub fn set_manual_cleanup(&mut self, manual_cleanup: bool) {
        self.manual_cleanup = manual_cleanup;
    }

    /// Reads the whole content back.
    pub async fn read(&self) -> crate::Result<Bytes> {
        self.stored.read().await
    }
}

/// The descriptor(s) uploaded under one name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEntry {
    Single(FileDescriptor),
    Multiple(Vec<FileDescriptor>),
}

impl FileEntry {
    /// The descriptor of a name that was uploaded without an array suffix.
    pub fn as_single(&self) -> Option<&FileDescriptor> {
        match self {
            FileEntry::Single(file) => Some(file),
            FileEntry::Multiple(_) => None,
        }
    }

    /// The descriptors of a `name[]` upload, in arrival order.
    pub fn as_multiple(&self) -> Option<&[FileDescriptor]> {
        match self {
            FileEntry::Single(_) => None,
            FileEntry::Multiple(files) => Some(files),
        }
    }

    /// Every descriptor of the entry, scalar or not.
    pub fn descriptors(&self) -> &[FileDescriptor] {
        match self {
            FileEntry::Single(file) => std::slice::from_ref(file),
            FileEntry::Multiple(files) => files,
        }
    }

    pub fn descriptors_mut(&mut self) -> &mut [FileDescriptor] {
        match self {
            FileEntry::Single(file) => std::slice::from_mut(file),
            FileEntry::Multiple(files) => files,
        }
    }
}

/// Uploaded files by field name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Files {
    map: BTreeMap<String, FileEntry>,
}

impl Files {
    pub fn new() -> Files {
        Files::default()
    }

    pub fn get(&self, name: &str) -> Option<&FileEntry> {
        self.map.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut FileEntry> {
        self.map.get_mut(name)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, FileEntry> {
        self.map.iter()
    }

    /// Every descriptor of every entry.
    pub fn descriptors(&self) -> impl Iterator<Item = &FileDescriptor> {
        self.map.values().flat_map(FileEntry::descriptors)
    }

    /// Folds a descriptor in under `field_name`.
    ///
    /// A name ending in `[]` appends to a sequence under the stripped name. Any
    /// other name holds a single descriptor, replaced if the name recurs.
    pub(crate) fn fold(&mut self, field_name: &str, file: FileDescriptor) {
        match field_name.strip_suffix(ARRAY_MARKER) {
            Some(name) => {
                let folded = match self.map.remove(name) {
                    Some(FileEntry::Multiple(mut files)) => {
                        files.push(file);
                        FileEntry::Multiple(files)
                    }
                    Some(FileEntry::Single(first)) => FileEntry::Multiple(vec![first, file]),
                    None => FileEntry::Multiple(vec![file]),
                };
                self.map.insert(name.to_owned(), folded);
            }
            None => {
                self.map.insert(field_name.to_owned(), FileEntry::Single(file));
            }
        }
    }
}

impl<'a> IntoIterator for &'a Files {
    type Item = (&'a String, &'a FileEntry);
    type IntoIter = btree_map::Iter<'a, String, FileEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.map.iter()
    }
}
