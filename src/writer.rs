//! Event-symmetric production of chunk streams.
//!
//! [`ChunkWriter`] mirrors the reader's event vocabulary: start the
//! document, open elements and groups, push payload, close them in
//! order. Sizes are never asked for up front; headers go out with a
//! provisional size field and are patched once the chunk closes.

use std::io::{Seek, Write};

use crate::chunk::{Attribute, ChunkId, ChunkInfo, ChunkKind};
use crate::error::{ErrorKind, Location, StreamError};
use crate::io::{DataWriter, Endian};
use crate::validator::ChunkValidator;

/// Byte-level encoding hooks a container format supplies to the engine.
pub trait FormatWriter<S: Write + Seek> {
    /// Identifier and size rules applied before any header byte is
    /// written.
    fn validator(&self) -> &dyn ChunkValidator;

    /// Maximum group nesting depth. Zero means the format has no
    /// groups at all.
    fn max_nesting(&self) -> usize {
        0
    }

    /// Byte order applied to multi-byte payload values.
    fn byte_order(&self) -> Endian {
        Endian::Big
    }

    fn write_document_header(
        &mut self,
        io: &mut DataWriter<S>,
        public_id: &str,
    ) -> Result<(), StreamError>;

    /// Emits a provisional header for `chunk`, recording its header
    /// start in `chunk.offset`. The size field may be a placeholder.
    fn write_chunk_header(
        &mut self,
        io: &mut DataWriter<S>,
        chunk: &mut ChunkInfo,
    ) -> Result<(), StreamError>;

    /// Patches the header of a closing chunk with its final size and
    /// emits any padding, returning with the stream at the chunk's
    /// end.
    fn write_fixup_chunk_header(
        &mut self,
        io: &mut DataWriter<S>,
        chunk: &mut ChunkInfo,
    ) -> Result<(), StreamError>;

    /// Trailing per-chunk structure, such as a checksum.
    fn write_chunk_footer(
        &mut self,
        _io: &mut DataWriter<S>,
        _chunk: &mut ChunkInfo,
    ) -> Result<(), StreamError> {
        Ok(())
    }

    /// Payload write primitive. Formats with running computations
    /// (checksums) observe the bytes here.
    fn write_data(
        &mut self,
        io: &mut DataWriter<S>,
        _chunk: &mut ChunkInfo,
        buf: &[u8],
    ) -> Result<(), StreamError> {
        io.write(buf)
    }

    /// Header and framing bytes of `chunk` that are not covered by its
    /// size and extra size. Folded into the enclosing extent.
    fn chunk_overhead(&self, _chunk: &ChunkInfo) -> u64 {
        0
    }

    /// Receives the extent of a top-level chunk once it closes.
    fn fold_into_document(&mut self, _extent: u64) {}

    /// Final document-level patching once everything is closed.
    fn write_document_footer(&mut self, _io: &mut DataWriter<S>) -> Result<(), StreamError> {
        Ok(())
    }
}

/// Streaming writer over any [`FormatWriter`].
pub struct ChunkWriter<S: Write + Seek, F: FormatWriter<S>> {
    io: DataWriter<S>,
    format: F,
    endian: Endian,
    current: ChunkInfo,
    groups: Vec<ChunkInfo>,
}

impl<S: Write + Seek, F: FormatWriter<S>> ChunkWriter<S, F> {
    pub fn new(sink: S, format: F) -> Result<Self, StreamError> {
        let io = DataWriter::new(sink)?;
        let endian = format.byte_order();
        Ok(ChunkWriter {
            io,
            format,
            endian,
            current: ChunkInfo::new(),
            groups: Vec::new(),
        })
    }

    /// Current group nesting depth.
    #[inline]
    pub fn depth(&self) -> usize {
        self.groups.len()
    }

    #[inline]
    pub fn position(&self) -> u64 {
        self.io.position()
    }

    /// Consumes the writer, returning the underlying sink.
    pub fn into_inner(self) -> S {
        self.io.into_inner()
    }

    pub fn write_start_document(&mut self, public_id: &str) -> Result<(), StreamError> {
        tracing::debug!(public_id, "start document");
        self.format.write_document_header(&mut self.io, public_id)
    }

    /// Opens a leaf chunk. Fails before any byte is written if a leaf
    /// is already open or the identifier is illegal for the format.
    pub fn write_start_element(
        &mut self,
        id: ChunkId,
        attributes: &[Attribute],
    ) -> Result<(), StreamError> {
        if self.current.kind != ChunkKind::Undefined {
            return Err(StreamError::with_detail(
                ErrorKind::InvalidNesting,
                format!(
                    "chunk '{}' opened while '{}' is still open",
                    id,
                    self.current.id_label()
                ),
            )
            .at(self.location()));
        }
        self.format.validator().chunk_id_to_canonical(&id)?;
        tracing::debug!(id = %id, offset = self.io.position(), "start chunk");
        self.current.reset();
        self.current.kind = ChunkKind::Leaf;
        self.current.id = Some(id);
        self.current.attributes = attributes.to_vec();
        self.format.write_chunk_header(&mut self.io, &mut self.current)
    }

    /// Opens a group chunk. Fails before any byte is written if a leaf
    /// is open, the nesting limit is reached or the identifier is
    /// illegal.
    pub fn write_start_group(
        &mut self,
        id: ChunkId,
        attributes: &[Attribute],
    ) -> Result<(), StreamError> {
        if self.current.kind != ChunkKind::Undefined {
            return Err(StreamError::with_detail(
                ErrorKind::InvalidNesting,
                format!(
                    "group '{}' opened while chunk '{}' is still open",
                    id,
                    self.current.id_label()
                ),
            )
            .at(self.location()));
        }
        if self.groups.len() >= self.format.max_nesting() {
            return Err(StreamError::with_detail(
                ErrorKind::InvalidNesting,
                format!("group '{}' exceeds nesting limit", id),
            )
            .at(self.location()));
        }
        self.format.validator().group_id_to_canonical(&id)?;
        tracing::debug!(id = %id, offset = self.io.position(), depth = self.groups.len(), "start group");

        let mut group = ChunkInfo::new();
        group.kind = ChunkKind::Group;
        group.id = Some(id);
        group.attributes = attributes.to_vec();
        self.format.write_chunk_header(&mut self.io, &mut group)?;
        self.groups.push(group);
        Ok(())
    }

    /// Closes the open leaf chunk, patching its header and folding its
    /// extent into the enclosing group or the document.
    pub fn write_end_element(&mut self) -> Result<(), StreamError> {
        if self.current.kind != ChunkKind::Leaf {
            return Err(StreamError::with_detail(
                ErrorKind::InvalidNesting,
                "no chunk is open",
            )
            .at(self.location()));
        }
        if !self.format.validator().is_valid_chunk_size(self.current.size) {
            return Err(StreamError::with_detail(
                ErrorKind::InvalidBlockSize,
                format!(
                    "size {} is illegal for chunk '{}'",
                    self.current.size,
                    self.current.id_label()
                ),
            )
            .at(self.location()));
        }
        self.format
            .write_fixup_chunk_header(&mut self.io, &mut self.current)?;
        self.format
            .write_chunk_footer(&mut self.io, &mut self.current)?;
        tracing::debug!(id = %self.current.id_label(), size = self.current.size, "end chunk");

        let extent = self.current.size
            + self.current.extra_size
            + self.format.chunk_overhead(&self.current);
        self.fold(extent);
        self.current.reset();
        Ok(())
    }

    /// Closes the innermost open group.
    pub fn write_end_group(&mut self) -> Result<(), StreamError> {
        if self.current.kind == ChunkKind::Leaf {
            return Err(StreamError::with_detail(
                ErrorKind::InvalidNesting,
                format!("chunk '{}' is still open", self.current.id_label()),
            )
            .at(self.location()));
        }
        let mut group = match self.groups.pop() {
            Some(group) => group,
            None => {
                return Err(StreamError::with_detail(
                    ErrorKind::InvalidNesting,
                    "no group is open",
                )
                .at(self.location()))
            }
        };
        if !self.format.validator().is_valid_group_size(group.size) {
            self.groups.push(group);
            let group = self.groups.last().map(|g| g.id_label()).unwrap_or_default();
            return Err(StreamError::with_detail(
                ErrorKind::InvalidBlockSize,
                format!("accumulated size is illegal for group '{}'", group),
            )
            .at(self.location()));
        }
        self.format
            .write_fixup_chunk_header(&mut self.io, &mut group)?;
        self.format.write_chunk_footer(&mut self.io, &mut group)?;
        tracing::debug!(id = %group.id_label(), size = group.size, "end group");

        let extent = group.size + group.extra_size + self.format.chunk_overhead(&group);
        self.fold(extent);
        Ok(())
    }

    /// Closes the document. Fails without touching the stream if any
    /// chunk or group is still open, naming the offender.
    pub fn write_end_document(&mut self) -> Result<(), StreamError> {
        if self.current.kind != ChunkKind::Undefined {
            return Err(StreamError::with_detail(
                ErrorKind::BlockNeverClosed,
                format!("chunk '{}' was never closed", self.current.id_label()),
            )
            .at(self.location()));
        }
        if let Some(group) = self.groups.last() {
            return Err(StreamError::with_detail(
                ErrorKind::BlockNeverClosed,
                format!("group '{}' was never closed", group.id_label()),
            )
            .at(self.location()));
        }
        self.format.write_document_footer(&mut self.io)?;
        self.io.flush()
    }

    /// Appends raw payload bytes to the open leaf chunk.
    pub fn write_bytes(&mut self, buf: &[u8]) -> Result<(), StreamError> {
        self.payload(buf)
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), StreamError> {
        self.payload(&[value])
    }

    pub fn write_u16(&mut self, value: u16) -> Result<(), StreamError> {
        match self.endian {
            Endian::Little => self.payload(&value.to_le_bytes()),
            Endian::Big => self.payload(&value.to_be_bytes()),
        }
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), StreamError> {
        match self.endian {
            Endian::Little => self.payload(&value.to_le_bytes()),
            Endian::Big => self.payload(&value.to_be_bytes()),
        }
    }

    pub fn write_u64(&mut self, value: u64) -> Result<(), StreamError> {
        match self.endian {
            Endian::Little => self.payload(&value.to_le_bytes()),
            Endian::Big => self.payload(&value.to_be_bytes()),
        }
    }

    pub fn write_f32(&mut self, value: f32) -> Result<(), StreamError> {
        self.write_u32(value.to_bits())
    }

    pub fn write_f64(&mut self, value: f64) -> Result<(), StreamError> {
        self.write_u64(value.to_bits())
    }

    /// Writes text as raw octets, one byte per character. Characters
    /// above U+00FF have no single-octet form and are rejected.
    pub fn write_chars(&mut self, text: &str) -> Result<(), StreamError> {
        let mut buf = Vec::with_capacity(text.len());
        for c in text.chars() {
            let code = c as u32;
            if code > 0xff {
                return Err(StreamError::with_detail(
                    ErrorKind::InvalidAttributeValue,
                    format!("character U+{:04X} has no single-octet form", code),
                ));
            }
            buf.push(code as u8);
        }
        self.payload(&buf)
    }

    fn payload(&mut self, buf: &[u8]) -> Result<(), StreamError> {
        if self.current.kind != ChunkKind::Leaf {
            return Err(StreamError::with_detail(
                ErrorKind::InvalidWriteState,
                "payload written outside an open chunk",
            )
            .at(self.location()));
        }
        self.format
            .write_data(&mut self.io, &mut self.current, buf)?;
        self.current.size += buf.len() as u64;
        Ok(())
    }

    fn fold(&mut self, extent: u64) {
        match self.groups.last_mut() {
            Some(group) => group.size += extent,
            None => self.format.fold_into_document(extent),
        }
    }

    fn location(&self) -> Location {
        Location::at(self.io.position())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::riff::RiffWriter;

    fn writer() -> ChunkWriter<Cursor<Vec<u8>>, RiffWriter> {
        ChunkWriter::new(Cursor::new(Vec::new()), RiffWriter::new(Endian::Little)).unwrap()
    }

    #[test]
    fn payload_outside_chunk_is_rejected() {
        let mut w = writer();
        w.write_start_document("WAVE").unwrap();
        let err = w.write_u16(1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidWriteState);
    }

    #[test]
    fn nested_leaf_is_rejected_before_any_byte() {
        let mut w = writer();
        w.write_start_document("WAVE").unwrap();
        w.write_start_element(ChunkId::Tag(*b"fmt "), &[]).unwrap();
        let pos = w.position();
        let err = w.write_start_element(ChunkId::Tag(*b"data"), &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidNesting);
        assert_eq!(w.position(), pos);
    }

    #[test]
    fn end_document_names_unclosed_chunk() {
        let mut w = writer();
        w.write_start_document("WAVE").unwrap();
        w.write_start_element(ChunkId::Tag(*b"data"), &[]).unwrap();
        let err = w.write_end_document().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BlockNeverClosed);
        assert!(err.detail().unwrap().contains("data"));
    }

    #[test]
    fn end_group_without_group_is_rejected() {
        let mut w = writer();
        w.write_start_document("WAVE").unwrap();
        let err = w.write_end_group().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidNesting);
    }

    #[test]
    fn multibyte_payload_follows_document_byte_order() {
        let mut w = writer();
        w.write_start_document("WAVE").unwrap();
        w.write_start_element(ChunkId::Tag(*b"fmt "), &[]).unwrap();
        w.write_u16(0x0102).unwrap();
        w.write_u32(0x03040506).unwrap();
        w.write_end_element().unwrap();
        w.write_end_document().unwrap();

        let buf = w.into_inner().into_inner();
        // Header is RIFF(4) size(4) form(4) id(4) size(4).
        assert_eq!(&buf[20..26], &[0x02, 0x01, 0x06, 0x05, 0x04, 0x03]);
    }

    #[test]
    fn chars_above_latin1_are_rejected() {
        let mut w = writer();
        w.write_start_document("WAVE").unwrap();
        w.write_start_element(ChunkId::Tag(*b"INAM"), &[]).unwrap();
        w.write_chars("caf\u{e9}").unwrap();
        let err = w.write_chars("\u{0100}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAttributeValue);
    }
}
