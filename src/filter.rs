use crate::chunk::ChunkInfo;
use crate::event::StreamEvent;

/// Decides which chunks a [`ChunkReader`](crate::ChunkReader) surfaces.
///
/// Consulted at every `StartElement`, `StartGroup` and `Data` event.
/// Rejecting a chunk makes the reader consume its full extent without
/// surfacing its payload; rejecting a group skips its entire subtree.
/// Either way the stream position afterwards is the same as if every
/// byte had been visited.
pub trait StreamFilter {
    fn accept(&mut self, chunk: &ChunkInfo, event: StreamEvent, depth: usize) -> bool;
}

/// Filter used when the caller does not install one.
#[derive(Debug, Default)]
pub struct AcceptAll;

impl StreamFilter for AcceptAll {
    fn accept(&mut self, _chunk: &ChunkInfo, _event: StreamEvent, _depth: usize) -> bool {
        true
    }
}
