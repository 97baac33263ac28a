/// Byte-level nature of a stream, as sniffed from its signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    LittleEndian,
    BigEndian,
    /// Binary, but endianness could not be determined.
    UnknownEndian,
    /// Text-based framing.
    Character,
}

/// Document-level facts established when the stream signature is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInfo {
    public_id: Option<String>,
    short_type_name: String,
    stream_kind: StreamKind,
    size: u64,
}

impl DocumentInfo {
    pub fn new(
        public_id: Option<String>,
        short_type_name: impl Into<String>,
        stream_kind: StreamKind,
        size: u64,
    ) -> Self {
        DocumentInfo {
            public_id,
            short_type_name: short_type_name.into(),
            stream_kind,
            size,
        }
    }

    /// Format-specific sub-type, such as a RIFF form tag.
    #[inline]
    pub fn public_id(&self) -> Option<&str> {
        self.public_id.as_deref()
    }

    /// MIME-style name of the container format.
    #[inline]
    pub fn short_type_name(&self) -> &str {
        &self.short_type_name
    }

    #[inline]
    pub fn stream_kind(&self) -> StreamKind {
        self.stream_kind
    }

    /// Total document size in bytes, header included.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }
}
