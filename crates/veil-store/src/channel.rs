//! Streaming channels returned by [`crate::ObjectStorage::reader`] and
//! [`crate::ObjectStorage::writer`].

use std::io::{self, Cursor, Read};

use crate::error::{StoreError, StoreResult};
use crate::model::Object;

/// A readable stream over one object's payload.
pub trait ReadChannel: Read + Send {
    /// Reposition the stream to an absolute byte offset.
    fn seek(&mut self, position: u64) -> StoreResult<()>;

    /// Total payload size in bytes.
    fn size(&self) -> u64;
}

/// A writable stream that becomes an object when closed.
///
/// Dropping a channel without calling [`WriteChannel::close`] abandons the
/// upload; nothing is stored.
pub trait WriteChannel: io::Write + Send {
    /// Finish the upload and return the stored object.
    fn close(self: Box<Self>) -> StoreResult<Object>;
}

/// A read channel over a fully materialised payload.
pub struct BufferedReadChannel {
    cursor: Cursor<Vec<u8>>,
}

impl BufferedReadChannel {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            cursor: Cursor::new(payload),
        }
    }
}

impl Read for BufferedReadChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl ReadChannel for BufferedReadChannel {
    fn seek(&mut self, position: u64) -> StoreResult<()> {
        if position > self.size() {
            return Err(StoreError::InvalidArgument(format!(
                "seek position {position} beyond payload size {}",
                self.size()
            )));
        }
        self.cursor.set_position(position);
        Ok(())
    }

    fn size(&self) -> u64 {
        self.cursor.get_ref().len() as u64
    }
}
