//! RIFF and RIFX container support.
//!
//! Chunks are framed as a four-character tag followed by a 32-bit
//! payload size; `RIFF`, `RIFX` and `LIST` are reserved for structure.
//! Group headers carry a sub-identifier fourcc inside their declared
//! size, and odd-sized leaf chunks are followed by one pad byte that
//! belongs to the chunk's extent but not to its payload.

use std::io::{Read, Seek, Write};

use crate::chunk::{ChunkId, ChunkInfo, ChunkKind};
use crate::document::{DocumentInfo, StreamKind};
use crate::error::{ErrorHandler, ErrorKind, Location, StreamError};
use crate::io::{DataReader, DataWriter, Endian};
use crate::reader::FormatReader;
use crate::validator::ChunkValidator;
use crate::writer::FormatWriter;

pub const MIME_TYPE: &str = "application/x-riff";

const RIFF: [u8; 4] = *b"RIFF";
const RIFX: [u8; 4] = *b"RIFX";
const LIST: [u8; 4] = *b"LIST";

const MAX_NESTING: usize = 64;
/// RIFF(4) + size(4) + form(4), in front of every document body.
const DOCUMENT_HEADER_SIZE: u64 = 12;
/// Tag and size field in front of every chunk or group.
const CHUNK_HEADER_SIZE: u64 = 8;

/// Identifier and size rules shared by the RIFF reader and writer.
#[derive(Debug, Default)]
pub struct RiffValidator;

impl ChunkValidator for RiffValidator {
    fn is_reserved(&self, id: &ChunkId) -> bool {
        matches!(id.as_tag(), Some(&RIFF) | Some(&RIFX) | Some(&LIST))
    }

    fn chunk_id_to_canonical(&self, id: &ChunkId) -> Result<String, StreamError> {
        let tag = id.as_tag().ok_or_else(|| {
            StreamError::with_detail(
                ErrorKind::InvalidBlockId,
                format!("'{}' is not a four-character tag", id),
            )
        })?;
        if tag.iter().any(|b| !(0x20..=0x7e).contains(b)) {
            return Err(StreamError::with_detail(
                ErrorKind::InvalidBlockId,
                format!("tag '{}' contains non-printable characters", id),
            ));
        }
        Ok(tag.iter().map(|&b| b as char).collect())
    }

    fn group_id_to_canonical(&self, id: &ChunkId) -> Result<String, StreamError> {
        let canonical = self.chunk_id_to_canonical(id)?;
        if self.is_reserved(id) {
            return Err(StreamError::with_detail(
                ErrorKind::InvalidBlockId,
                format!("'{}' is reserved", canonical),
            ));
        }
        Ok(canonical)
    }

    fn is_valid_chunk_size(&self, size: u64) -> bool {
        size <= u32::MAX as u64
    }

    fn is_valid_group_size(&self, size: u64) -> bool {
        size <= u32::MAX as u64
    }
}

/// Format hook for reading RIFF and RIFX streams.
#[derive(Debug)]
pub struct RiffReader {
    endian: Endian,
    validator: RiffValidator,
}

impl RiffReader {
    pub fn new() -> Self {
        RiffReader {
            endian: Endian::Little,
            validator: RiffValidator,
        }
    }

    fn read_size<S: Read + Seek>(&self, io: &mut DataReader<S>) -> Result<u64, StreamError> {
        let size = match self.endian {
            Endian::Little => io.read_u32_le()?,
            Endian::Big => io.read_u32_be()?,
        };
        Ok(size as u64)
    }
}

impl Default for RiffReader {
    fn default() -> Self {
        RiffReader::new()
    }
}

impl<S: Read + Seek> FormatReader<S> for RiffReader {
    fn max_nesting(&self) -> usize {
        MAX_NESTING
    }

    fn read_document_header(
        &mut self,
        io: &mut DataReader<S>,
        _handler: &mut dyn ErrorHandler,
    ) -> Result<Option<DocumentInfo>, StreamError> {
        let mut tag = [0u8; 4];
        if io.read_exact(&mut tag).is_err() {
            return Ok(None);
        }
        let kind = match &tag {
            &RIFF => {
                self.endian = Endian::Little;
                StreamKind::LittleEndian
            }
            &RIFX => {
                self.endian = Endian::Big;
                StreamKind::BigEndian
            }
            _ => return Ok(None),
        };
        let size = match self.read_size(io) {
            Ok(size) => size,
            Err(_) => return Ok(None),
        };
        if io.read_exact(&mut tag).is_err() {
            return Ok(None);
        }
        let form = match self.validator.chunk_id_to_canonical(&ChunkId::Tag(tag)) {
            Ok(form) => form,
            Err(_) => return Ok(None),
        };
        // The size field covers the document body after the form tag.
        Ok(Some(DocumentInfo::new(
            Some(form),
            MIME_TYPE,
            kind,
            size + DOCUMENT_HEADER_SIZE,
        )))
    }

    fn read_chunk_header(
        &mut self,
        io: &mut DataReader<S>,
        chunk: &mut ChunkInfo,
        handler: &mut dyn ErrorHandler,
    ) -> Result<(), StreamError> {
        let mut tag = [0u8; 4];
        io.read_exact(&mut tag)?;
        let size = self.read_size(io)?;

        if self.validator.is_reserved(&ChunkId::Tag(tag)) {
            chunk.kind = ChunkKind::Group;
            if size & 1 == 1 {
                handler.error(
                    StreamError::with_detail(
                        ErrorKind::InvalidBlockSize,
                        format!("group '{}' has odd size {}", ChunkId::Tag(tag), size),
                    )
                    .at(Location::at(io.position())),
                )?;
                chunk.extra_size = 1;
            }
            // The sub-identifier is part of the declared size.
            io.read_exact(&mut tag)?;
            chunk.size = size.saturating_sub(4);
        } else {
            chunk.kind = ChunkKind::Leaf;
            chunk.size = size;
            if size & 1 == 1 {
                chunk.extra_size = 1;
            }
        }
        if let Err(err) = self.validator.chunk_id_to_canonical(&ChunkId::Tag(tag)) {
            handler.warning(err.at(Location::at(io.position())))?;
        }
        chunk.offset = Some(io.position());
        chunk.id = Some(ChunkId::Tag(tag));
        Ok(())
    }
}

/// Format hook for writing RIFF and RIFX streams.
#[derive(Debug)]
pub struct RiffWriter {
    endian: Endian,
    validator: RiffValidator,
    document_offset: u64,
    document_size: u64,
}

impl RiffWriter {
    pub fn new(endian: Endian) -> Self {
        RiffWriter {
            endian,
            validator: RiffValidator,
            document_offset: 0,
            document_size: 0,
        }
    }

    fn write_size<S: Write + Seek>(
        &self,
        io: &mut DataWriter<S>,
        size: u32,
    ) -> Result<(), StreamError> {
        match self.endian {
            Endian::Little => io.write_u32_le(size),
            Endian::Big => io.write_u32_be(size),
        }
    }
}

impl<S: Write + Seek> FormatWriter<S> for RiffWriter {
    fn validator(&self) -> &dyn ChunkValidator {
        &self.validator
    }

    fn max_nesting(&self) -> usize {
        MAX_NESTING
    }

    fn byte_order(&self) -> Endian {
        self.endian
    }

    fn write_document_header(
        &mut self,
        io: &mut DataWriter<S>,
        public_id: &str,
    ) -> Result<(), StreamError> {
        let form: [u8; 4] = public_id.as_bytes().try_into().map_err(|_| {
            StreamError::with_detail(
                ErrorKind::InvalidBlockId,
                format!("form type '{}' is not four characters", public_id),
            )
        })?;
        self.validator.group_id_to_canonical(&ChunkId::Tag(form))?;
        self.document_offset = io.position();
        self.document_size = 0;
        match self.endian {
            Endian::Little => io.write(&RIFF)?,
            Endian::Big => io.write(&RIFX)?,
        }
        self.write_size(io, 0)?;
        io.write(&form)
    }

    fn write_chunk_header(
        &mut self,
        io: &mut DataWriter<S>,
        chunk: &mut ChunkInfo,
    ) -> Result<(), StreamError> {
        let tag = match chunk.id.as_ref().and_then(|id| id.as_tag()) {
            Some(tag) => *tag,
            None => return Err(StreamError::new(ErrorKind::InvalidBlockId)),
        };
        chunk.offset = Some(io.position());
        if chunk.kind == ChunkKind::Group {
            io.write(&LIST)?;
            self.write_size(io, 0)?;
            io.write(&tag)
        } else {
            io.write(&tag)?;
            self.write_size(io, 0)
        }
    }

    fn write_fixup_chunk_header(
        &mut self,
        io: &mut DataWriter<S>,
        chunk: &mut ChunkInfo,
    ) -> Result<(), StreamError> {
        if chunk.kind == ChunkKind::Leaf {
            if chunk.size & 1 == 1 {
                io.write_u8(0)?;
                chunk.extra_size = 1;
            }
        } else {
            if chunk.size & 1 == 1 {
                return Err(StreamError::with_detail(
                    ErrorKind::InvalidBlockSize,
                    format!("group '{}' has odd size {}", chunk.id_label(), chunk.size),
                )
                .at(Location::at(io.position())));
            }
            // Count the sub-identifier back into the size field.
            chunk.size += 4;
        }
        let offset = chunk
            .offset
            .ok_or_else(|| StreamError::new(ErrorKind::InvalidWriteState))?;
        let end = io.position();
        io.seek(offset + 4)?;
        self.write_size(io, chunk.size as u32)?;
        io.seek(end)
    }

    fn chunk_overhead(&self, _chunk: &ChunkInfo) -> u64 {
        CHUNK_HEADER_SIZE
    }

    fn fold_into_document(&mut self, extent: u64) {
        self.document_size += extent;
    }

    fn write_document_footer(&mut self, io: &mut DataWriter<S>) -> Result<(), StreamError> {
        if !self.validator.is_valid_group_size(self.document_size) {
            return Err(StreamError::with_detail(
                ErrorKind::InvalidBlockSize,
                format!("document size {} overflows the size field", self.document_size),
            ));
        }
        let end = io.position();
        io.seek(self.document_offset + 4)?;
        self.write_size(io, self.document_size as u32)?;
        io.seek(end)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::event::StreamEvent;
    use crate::reader::ChunkReader;
    use crate::writer::ChunkWriter;

    #[test]
    fn reserved_tags_are_groups() {
        let validator = RiffValidator;
        assert!(validator.is_reserved(&ChunkId::Tag(*b"RIFF")));
        assert!(validator.is_reserved(&ChunkId::Tag(*b"LIST")));
        assert!(!validator.is_reserved(&ChunkId::Tag(*b"fmt ")));
        assert!(validator.group_id_to_canonical(&ChunkId::Tag(*b"LIST")).is_err());
        assert!(validator.chunk_id_to_canonical(&ChunkId::Marker(0x10)).is_err());
    }

    #[test]
    fn odd_leaf_is_padded_and_folded() {
        let mut w =
            ChunkWriter::new(Cursor::new(Vec::new()), RiffWriter::new(Endian::Little)).unwrap();
        w.write_start_document("WAVE").unwrap();
        w.write_start_group(ChunkId::Tag(*b"INFO"), &[]).unwrap();
        w.write_start_element(ChunkId::Tag(*b"INAM"), &[]).unwrap();
        w.write_bytes(b"abc").unwrap();
        w.write_end_element().unwrap();
        w.write_end_group().unwrap();
        w.write_end_document().unwrap();

        let buf = w.into_inner().into_inner();
        // Group size: sub-id(4) + chunk header(8) + payload(3) + pad(1).
        assert_eq!(&buf[16..20], &16u32.to_le_bytes());
        // Chunk size excludes the pad byte.
        assert_eq!(&buf[28..32], &3u32.to_le_bytes());
        assert_eq!(buf[35], 0);
        assert_eq!(buf.len(), 36);
        // Document size: group extent(16 + 8).
        assert_eq!(&buf[4..8], &24u32.to_le_bytes());
    }

    #[test]
    fn reads_padded_chunk_without_desync() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"RIFF");
        buf.extend_from_slice(&22u32.to_le_bytes());
        buf.extend_from_slice(b"WAVE");
        buf.extend_from_slice(b"INAM");
        buf.extend_from_slice(&3u32.to_le_bytes());
        buf.extend_from_slice(b"abc\0");
        buf.extend_from_slice(b"ICOP");
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(b"x\0");

        let mut reader = ChunkReader::new(Cursor::new(buf), RiffReader::new()).unwrap();
        assert_eq!(reader.advance().unwrap(), StreamEvent::StartDocument);
        assert_eq!(reader.advance().unwrap(), StreamEvent::StartElement);
        assert_eq!(reader.id().unwrap(), &ChunkId::Tag(*b"INAM"));
        assert_eq!(reader.advance().unwrap(), StreamEvent::Data);
        assert_eq!(reader.data_size().unwrap(), 3);
        assert_eq!(reader.advance().unwrap(), StreamEvent::EndElement);
        // The pad byte was consumed, landing exactly on the next tag.
        assert_eq!(reader.advance().unwrap(), StreamEvent::StartElement);
        assert_eq!(reader.id().unwrap(), &ChunkId::Tag(*b"ICOP"));
        assert_eq!(reader.advance().unwrap(), StreamEvent::Data);
        assert_eq!(reader.advance().unwrap(), StreamEvent::EndElement);
        assert_eq!(reader.advance().unwrap(), StreamEvent::EndDocument);
    }

    #[test]
    fn rifx_sniffs_big_endian() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"RIFX");
        buf.extend_from_slice(&12u32.to_be_bytes());
        buf.extend_from_slice(b"AIFF");
        buf.extend_from_slice(b"COMM");
        buf.extend_from_slice(&4u32.to_be_bytes());
        buf.extend_from_slice(&[0, 0, 0, 1]);

        let mut reader = ChunkReader::new(Cursor::new(buf), RiffReader::new()).unwrap();
        let info = reader.document_info().unwrap();
        assert_eq!(info.stream_kind(), StreamKind::BigEndian);
        assert_eq!(info.public_id(), Some("AIFF"));
        assert_eq!(reader.advance().unwrap(), StreamEvent::StartDocument);
        assert_eq!(reader.advance().unwrap(), StreamEvent::StartElement);
        assert_eq!(reader.advance().unwrap(), StreamEvent::Data);
        assert_eq!(reader.data_size().unwrap(), 4);
    }
}
