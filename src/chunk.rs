//! Chunk headers, identifiers and attributes shared by readers and writers.

use std::fmt;

/// Structural role of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    /// Contains other chunks, never raw payload.
    Group,
    /// Carries payload bytes, never children.
    Leaf,
    /// No chunk is described; the slot is free.
    Undefined,
}

/// Identifier of a chunk, in whichever shape the format frames it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChunkId {
    /// Four-character tag, as used by RIFF and PNG.
    Tag([u8; 4]),
    /// Single marker byte, as used by JPEG segments.
    Marker(u8),
    /// Free-form name for text-based framings.
    Name(String),
}

impl ChunkId {
    #[inline]
    pub fn as_tag(&self) -> Option<&[u8; 4]> {
        match self {
            ChunkId::Tag(tag) => Some(tag),
            _ => None,
        }
    }

    #[inline]
    pub fn as_marker(&self) -> Option<u8> {
        match self {
            ChunkId::Marker(marker) => Some(*marker),
            _ => None,
        }
    }

    #[inline]
    pub fn as_name(&self) -> Option<&str> {
        match self {
            ChunkId::Name(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkId::Tag(tag) => {
                for &b in tag {
                    if (0x20..=0x7e).contains(&b) {
                        write!(f, "{}", b as char)?;
                    } else {
                        write!(f, "\\x{:02x}", b)?;
                    }
                }
                Ok(())
            }
            ChunkId::Marker(marker) => write!(f, "{:#04x}", marker),
            ChunkId::Name(name) => f.write_str(name),
        }
    }
}

/// Named value attached to a chunk header.
///
/// Equality ignores the prefix: two attributes naming the same thing in
/// the same namespace are the same attribute regardless of how the
/// prefix was spelled.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub namespace_uri: Option<String>,
    pub prefix: Option<String>,
    pub local_name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(local_name: impl Into<String>, value: impl Into<String>) -> Self {
        Attribute {
            namespace_uri: None,
            prefix: None,
            local_name: local_name.into(),
            value: value.into(),
        }
    }

    pub fn with_namespace(
        namespace_uri: impl Into<String>,
        prefix: impl Into<String>,
        local_name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Attribute {
            namespace_uri: Some(namespace_uri.into()),
            prefix: Some(prefix.into()),
            local_name: local_name.into(),
            value: value.into(),
        }
    }
}

impl PartialEq for Attribute {
    fn eq(&self, other: &Self) -> bool {
        self.namespace_uri == other.namespace_uri
            && self.local_name == other.local_name
            && self.value == other.value
    }
}

impl Eq for Attribute {}

/// Per-chunk working state owned by the active format.
///
/// Travels inside [`ChunkInfo`] so running computations survive the
/// engine's lookahead-to-current promotion.
#[derive(Clone)]
pub enum Scratch {
    None,
    Crc32(crc32fast::Hasher),
}

impl fmt::Debug for Scratch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scratch::None => f.write_str("None"),
            Scratch::Crc32(_) => f.write_str("Crc32(..)"),
        }
    }
}

impl Default for Scratch {
    fn default() -> Self {
        Scratch::None
    }
}

/// Everything known about one chunk: identity, structural kind, payload
/// extent and any attributes the format decoded from its header.
///
/// `size` counts declared payload bytes only. `extra_size` counts
/// trailing structure after the payload (a RIFF pad byte, a PNG CRC)
/// that belongs to the chunk's extent but never to its data.
#[derive(Debug, Clone, Default)]
pub struct ChunkInfo {
    pub kind: ChunkKind,
    pub id: Option<ChunkId>,
    /// Payload start (readers) or header start (writers).
    pub offset: Option<u64>,
    pub size: u64,
    pub extra_size: u64,
    pub attributes: Vec<Attribute>,
    pub scratch: Scratch,
}

impl Default for ChunkKind {
    fn default() -> Self {
        ChunkKind::Undefined
    }
}

impl ChunkInfo {
    pub fn new() -> Self {
        ChunkInfo::default()
    }

    /// Returns the slot to the undefined state, keeping allocations.
    pub fn reset(&mut self) {
        self.kind = ChunkKind::Undefined;
        self.id = None;
        self.offset = None;
        self.size = 0;
        self.extra_size = 0;
        self.attributes.clear();
        self.scratch = Scratch::None;
    }

    #[inline]
    pub fn is_group(&self) -> bool {
        self.kind == ChunkKind::Group
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.kind == ChunkKind::Leaf
    }

    pub(crate) fn id_label(&self) -> String {
        match &self.id {
            Some(id) => id.to_string(),
            None => "?".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_equality_ignores_prefix() {
        let a = Attribute::with_namespace("urn:x", "p1", "title", "hello");
        let b = Attribute::with_namespace("urn:x", "p2", "title", "hello");
        assert_eq!(a, b);

        let c = Attribute::with_namespace("urn:y", "p1", "title", "hello");
        assert_ne!(a, c);
    }

    #[test]
    fn reset_clears_everything() {
        let mut chunk = ChunkInfo::new();
        chunk.kind = ChunkKind::Leaf;
        chunk.id = Some(ChunkId::Tag(*b"fmt "));
        chunk.offset = Some(20);
        chunk.size = 16;
        chunk.extra_size = 1;
        chunk.attributes.push(Attribute::new("codec", "pcm"));

        chunk.reset();
        assert_eq!(chunk.kind, ChunkKind::Undefined);
        assert!(chunk.id.is_none());
        assert!(chunk.offset.is_none());
        assert_eq!(chunk.size, 0);
        assert_eq!(chunk.extra_size, 0);
        assert!(chunk.attributes.is_empty());
    }

    #[test]
    fn chunk_id_display() {
        assert_eq!(ChunkId::Tag(*b"LIST").to_string(), "LIST");
        assert_eq!(ChunkId::Tag([0x41, 0x42, 0x01, 0x43]).to_string(), "AB\\x01C");
        assert_eq!(ChunkId::Marker(0xd8).to_string(), "0xd8");
        assert_eq!(ChunkId::Name("BEGIN".into()).to_string(), "BEGIN");
    }
}
