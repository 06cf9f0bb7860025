use std::task::{Context, Poll};

use bytes::{Buf, Bytes, BytesMut};
use futures_util::stream::{BoxStream, StreamExt};

use crate::constants;

pub(crate) struct StreamBuffer {
    pub(crate) eof: bool,
    pub(crate) buf: BytesMut,
    pub(crate) stream: BoxStream<'static, crate::Result<Bytes>>,
}

impl StreamBuffer {
    pub(crate) fn new(stream: BoxStream<'static, crate::Result<Bytes>>) -> Self {
        StreamBuffer {
            eof: false,
            buf: BytesMut::new(),
            stream,
        }
    }

    /// Pulls every chunk that is ready. Returns once the source is pending
    /// (the waker is then registered) or exhausted.
    pub(crate) fn poll_stream(&mut self, cx: &mut Context<'_>) -> crate::Result<()> {
        if self.eof {
            return Ok(());
        }

        loop {
            match self.stream.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(data))) => self.buf.extend_from_slice(&data),
                Poll::Ready(Some(Err(err))) => return Err(err),
                Poll::Ready(None) => {
                    self.eof = true;
                    return Ok(());
                }
                Poll::Pending => return Ok(()),
            }
        }
    }

    pub(crate) fn read_exact(&mut self, size: usize) -> Option<Bytes> {
        if size <= self.buf.len() {
            Some(self.buf.split_to(size).freeze())
        } else {
            None
        }
    }

    pub(crate) fn peek_exact(&self, size: usize) -> Option<&[u8]> {
        self.buf.get(..size)
    }

    /// Reads up to, but excluding, `pattern`.
    pub(crate) fn read_to(&mut self, pattern: &[u8]) -> Option<Bytes> {
        memchr::memmem::find(&self.buf, pattern).map(|idx| self.buf.split_to(idx).freeze())
    }

    /// Reads up to and including `pattern`.
    pub(crate) fn read_until(&mut self, pattern: &[u8]) -> Option<Bytes> {
        memchr::memmem::find(&self.buf, pattern).map(|idx| self.buf.split_to(idx + pattern.len()).freeze())
    }

    /// Skips spaces and tabs after a boundary; `false` means more input is
    /// needed to find the end of the padding.
    pub(crate) fn advance_past_transport_padding(&mut self) -> bool {
        match self.buf.iter().position(|b| *b != b' ' && *b != b'\t') {
            Some(pos) => {
                self.buf.advance(pos);
                true
            }
            None => {
                self.buf.clear();
                false
            }
        }
    }

    /// Reads data of the current part.
    ///
    /// Yields `(true, bytes)` with the last data of the part once the next
    /// boundary is found, `(false, bytes)` for data that certainly belongs to
    /// the part, and `None` when more input is needed. A trailing `\r` that may
    /// start the boundary delimiter is held back.
    pub(crate) fn read_part_data(
        &mut self,
        boundary: &str,
        part_name: Option<&str>,
    ) -> crate::Result<Option<(bool, Bytes)>> {
        if self.buf.is_empty() {
            return if self.eof {
                Err(crate::Error::IncompleteFieldData {
                    field_name: part_name.map(str::to_owned),
                })
            } else {
                Ok(None)
            };
        }

        let boundary_deriv = format!("{}{}{}", constants::CRLF, constants::BOUNDARY_EXT, boundary);

        if let Some(idx) = memchr::memmem::find(&self.buf, boundary_deriv.as_bytes()) {
            let bytes = self.buf.split_to(idx).freeze();

            // discard \r\n.
            self.buf.advance(constants::CRLF.len());

            return Ok(Some((true, bytes)));
        }

        if self.eof {
            return Err(crate::Error::IncompleteFieldData {
                field_name: part_name.map(str::to_owned),
            });
        }

        let rem_boundary_part_idx = self.buf.len().saturating_sub(boundary_deriv.len() - 1);

        match memchr::memrchr(b'\r', &self.buf[rem_boundary_part_idx..]) {
            Some(rel_idx) => {
                let idx = rem_boundary_part_idx + rel_idx;

                if boundary_deriv.as_bytes().starts_with(&self.buf[idx..]) {
                    let bytes = self.buf.split_to(idx).freeze();
                    if bytes.is_empty() {
                        Ok(None)
                    } else {
                        Ok(Some((false, bytes)))
                    }
                } else {
                    Ok(Some((false, self.read_full_buf())))
                }
            }
            None => Ok(Some((false, self.read_full_buf()))),
        }
    }

    pub(crate) fn read_full_buf(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}
