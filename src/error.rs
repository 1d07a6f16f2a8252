use alloc::string::String;

use thiserror::Error;

use crate::provider::BlockId;
use crate::provider::ProviderError;

/// Signals that a block-local mutation did not fit in the remaining bytes.
///
/// This never escapes the public API: the mutation protocol reacts to it by
/// discarding the attempted node copy and splitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Error)]
#[error("block capacity exceeded")]
pub struct CapacityExceeded;

/// Errors surfaced by tree operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A single entry does not fit into an otherwise empty node.
    #[error("entry of stream {stream} does not fit in an empty node")]
    EntryTooLarge { stream: usize },

    /// Stored data contradicts the tree layout. The tree should be considered corrupt.
    #[error("invariant violated in block {block} during {op}: {detail}")]
    Invariant {
        block: BlockId,
        op: &'static str,
        detail: String,
    },

    /// The block provider failed; wraps the provider's own error.
    #[error("block provider failed to {op} block {block}")]
    BlockProvider {
        op: &'static str,
        block: BlockId,
        #[source]
        source: ProviderError,
    },

    /// The tree configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A value cannot be represented by the stream's codec.
    #[error("value {value} does not fit in {bits} bits")]
    ValueOutOfRange { value: u64, bits: u8 },

    /// A value of the wrong shape was given to a stream.
    #[error("stream {stream} expects {expected}")]
    StreamKind {
        stream: usize,
        expected: &'static str,
    },
}

/// Result alias used across the crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;

impl Error {
    pub(crate) fn invariant(block: BlockId, op: &'static str, detail: impl Into<String>) -> Self {
        Error::Invariant {
            block,
            op,
            detail: detail.into(),
        }
    }

    pub(crate) fn provider(op: &'static str, block: BlockId) -> impl FnOnce(ProviderError) -> Self {
        move |source| Error::BlockProvider { op, block, source }
    }
}
