//! Blob-backed outgoing messages.

use std::rc::Rc;

use crate::channel::WeakChannel;

/// A reference to blob content that has to be loaded before it can be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    id: Rc<str>,
    size: usize,
}

impl Blob {
    pub fn new(id: impl Into<Rc<str>>, size: usize) -> Self {
        Self {
            id: id.into(),
            size,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The size the blob claims to have. Counts towards the buffered amount until it is sent.
    pub const fn size(&self) -> usize {
        self.size
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlobLoadError {
    #[error("blob not found")]
    NotFound,
    #[error("blob not readable")]
    NotReadable,
    #[error("load aborted")]
    Aborted,
    #[error("{0}")]
    Other(String),
}

/// Resolves blobs to bytes.
///
/// At most one load is in flight per channel. The loader reports the result through the
/// [`BlobCompletion`] it was handed, possibly from inside [`BlobLoader::start`].
pub trait BlobLoader {
    fn start(&self, blob: &Blob, completion: BlobCompletion);

    /// Cancels the load in flight. Its completion may still be called and is ignored.
    fn cancel(&self);
}

/// One-shot token for the result of a blob load.
#[derive(Debug)]
pub struct BlobCompletion {
    channel: WeakChannel,
    generation: u64,
}

impl BlobCompletion {
    pub(crate) const fn new(channel: WeakChannel, generation: u64) -> Self {
        Self {
            channel,
            generation,
        }
    }

    /// Hands the loaded bytes, or the reason the load failed, back to the channel.
    ///
    /// Does nothing if the channel is gone or the load was cancelled in the meantime.
    pub fn finish(self, result: Result<Vec<u8>, BlobLoadError>) {
        if let Some(channel) = self.channel.upgrade() {
            channel.did_finish_blob_load(self.generation, result);
        }
    }
}
