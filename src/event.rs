use std::fmt;

/// Event reported by [`ChunkReader::advance`](crate::ChunkReader::advance).
///
/// A well-formed traversal starts with `StartDocument`, visits every
/// chunk as `StartElement`/`Data`/`EndElement` (groups as `StartGroup`
/// .. `EndGroup`) and finishes with `EndDocument`, which then repeats
/// forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    StartDocument,
    StartElement,
    EndElement,
    Data,
    StartGroup,
    EndGroup,
    EndDocument,
}

impl fmt::Display for StreamEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StreamEvent::StartDocument => "start-document",
            StreamEvent::StartElement => "start-element",
            StreamEvent::EndElement => "end-element",
            StreamEvent::Data => "data",
            StreamEvent::StartGroup => "start-group",
            StreamEvent::EndGroup => "end-group",
            StreamEvent::EndDocument => "end-document",
        })
    }
}
