use crate::chunk::ChunkId;
use crate::error::StreamError;

/// Format-specific identifier and size rules.
///
/// Writers consult the validator before any header byte goes out, so an
/// illegal identifier or an oversized chunk fails cleanly instead of
/// leaving a half-written stream. Readers use it to tell reserved group
/// identifiers apart from ordinary chunk identifiers and to flag sizes
/// the format forbids.
pub trait ChunkValidator {
    /// Whether `id` is reserved for the format's own structure and may
    /// not name an ordinary chunk.
    fn is_reserved(&self, _id: &ChunkId) -> bool {
        false
    }

    /// Validates a chunk identifier, returning its canonical text for
    /// diagnostics.
    fn chunk_id_to_canonical(&self, id: &ChunkId) -> Result<String, StreamError>;

    /// Validates a group identifier. Defaults to the chunk rule.
    fn group_id_to_canonical(&self, id: &ChunkId) -> Result<String, StreamError> {
        self.chunk_id_to_canonical(id)
    }

    fn is_valid_chunk_size(&self, _size: u64) -> bool {
        true
    }

    fn is_valid_group_size(&self, _size: u64) -> bool {
        true
    }
}
