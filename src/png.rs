//! PNG container support.
//!
//! A PNG stream is the eight-byte signature followed by a flat run of
//! chunks: big-endian payload length, four-letter type, payload, then a
//! CRC-32 over type and payload. The CRC travels as `extra_size`, so it
//! counts toward each chunk's extent but never surfaces as payload.

use std::io::{Read, Seek, Write};

use crate::chunk::{ChunkId, ChunkInfo, ChunkKind, Scratch};
use crate::document::{DocumentInfo, StreamKind};
use crate::error::{ErrorHandler, ErrorKind, Location, StreamError};
use crate::io::{DataReader, DataWriter};
use crate::reader::FormatReader;
use crate::validator::ChunkValidator;
use crate::writer::FormatWriter;

pub const MIME_TYPE: &str = "image/png";

pub const MAGIC: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

/// Length(4) + type(4), in front of every chunk.
const CHUNK_HEADER_SIZE: u64 = 8;
const CRC_SIZE: u64 = 4;

/// Identifier and size rules for PNG chunks.
#[derive(Debug, Default)]
pub struct PngValidator;

impl ChunkValidator for PngValidator {
    fn chunk_id_to_canonical(&self, id: &ChunkId) -> Result<String, StreamError> {
        let tag = id.as_tag().ok_or_else(|| {
            StreamError::with_detail(
                ErrorKind::InvalidBlockId,
                format!("'{}' is not a four-letter type", id),
            )
        })?;
        if tag.iter().any(|b| !b.is_ascii_alphabetic()) {
            return Err(StreamError::with_detail(
                ErrorKind::InvalidBlockId,
                format!("type '{}' contains non-alphabetic characters", id),
            ));
        }
        Ok(tag.iter().map(|&b| b as char).collect())
    }

    fn is_valid_chunk_size(&self, size: u64) -> bool {
        size <= i32::MAX as u64
    }
}

/// Format hook for reading PNG streams.
///
/// Every chunk's CRC is verified while its header is decoded: the
/// reader runs ahead over the payload, recomputes the digest, compares
/// it against the stored value and seeks back to the payload start. A
/// mismatch is reported at error severity and traversal carries on.
#[derive(Debug, Default)]
pub struct PngReader {
    validator: PngValidator,
}

impl PngReader {
    pub fn new() -> Self {
        PngReader::default()
    }
}

impl<S: Read + Seek> FormatReader<S> for PngReader {
    fn read_document_header(
        &mut self,
        io: &mut DataReader<S>,
        _handler: &mut dyn ErrorHandler,
    ) -> Result<Option<DocumentInfo>, StreamError> {
        let mut magic = [0u8; 8];
        if io.read_exact(&mut magic).is_err() {
            return Ok(None);
        }
        if magic != MAGIC {
            return Ok(None);
        }
        Ok(Some(DocumentInfo::new(
            None,
            MIME_TYPE,
            StreamKind::BigEndian,
            io.len(),
        )))
    }

    fn read_chunk_header(
        &mut self,
        io: &mut DataReader<S>,
        chunk: &mut ChunkInfo,
        handler: &mut dyn ErrorHandler,
    ) -> Result<(), StreamError> {
        let size = io.read_u32_be()? as u64;
        let mut tag = [0u8; 4];
        io.read_exact(&mut tag)?;
        let id = ChunkId::Tag(tag);

        if !self.validator.is_valid_chunk_size(size) {
            handler.warning(
                StreamError::with_detail(
                    ErrorKind::InvalidBlockSize,
                    format!("chunk '{}' declares size {}", id, size),
                )
                .at(Location::at(io.position())),
            )?;
        }
        if let Err(err) = self.validator.chunk_id_to_canonical(&id) {
            handler.warning(err.at(Location::at(io.position())))?;
        }

        chunk.kind = ChunkKind::Leaf;
        chunk.size = size;
        chunk.extra_size = CRC_SIZE;
        chunk.offset = Some(io.position());

        let payload_start = io.position();
        io.seek(payload_start + size)?;
        let stored = io.read_u32_be()?;
        // Recompute over type and payload.
        io.seek(payload_start - 4)?;
        let mut hasher = crc32fast::Hasher::new();
        let mut remaining = size + 4;
        let mut buf = [0u8; 4096];
        while remaining > 0 {
            let count = remaining.min(buf.len() as u64) as usize;
            io.read_exact(&mut buf[..count])?;
            hasher.update(&buf[..count]);
            remaining -= count as u64;
        }
        if hasher.finalize() != stored {
            handler.error(
                StreamError::with_detail(
                    ErrorKind::CorruptStream,
                    format!("crc mismatch in chunk '{}'", id),
                )
                .at(Location::at(payload_start)),
            )?;
        }
        io.seek(payload_start)?;

        chunk.id = Some(id);
        Ok(())
    }
}

/// Format hook for writing PNG streams.
///
/// The CRC is accumulated incrementally: the type goes into a
/// [`Scratch::Crc32`] hasher when the header is written, every payload
/// write feeds it, and the footer emits the digest.
#[derive(Debug, Default)]
pub struct PngWriter {
    validator: PngValidator,
}

impl PngWriter {
    pub fn new() -> Self {
        PngWriter::default()
    }
}

impl<S: Write + Seek> FormatWriter<S> for PngWriter {
    fn validator(&self) -> &dyn ChunkValidator {
        &self.validator
    }

    fn write_document_header(
        &mut self,
        io: &mut DataWriter<S>,
        _public_id: &str,
    ) -> Result<(), StreamError> {
        io.write(&MAGIC)
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
        io.write_u32_be(0)?;
        io.write(&tag)?;
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&tag);
        chunk.scratch = Scratch::Crc32(hasher);
        Ok(())
    }

    fn write_data(
        &mut self,
        io: &mut DataWriter<S>,
        chunk: &mut ChunkInfo,
        buf: &[u8],
    ) -> Result<(), StreamError> {
        if let Scratch::Crc32(hasher) = &mut chunk.scratch {
            hasher.update(buf);
        }
        io.write(buf)
    }

    fn write_fixup_chunk_header(
        &mut self,
        io: &mut DataWriter<S>,
        chunk: &mut ChunkInfo,
    ) -> Result<(), StreamError> {
        let offset = chunk
            .offset
            .ok_or_else(|| StreamError::new(ErrorKind::InvalidWriteState))?;
        let end = io.position();
        io.seek(offset)?;
        io.write_u32_be(chunk.size as u32)?;
        io.seek(end)
    }

    fn write_chunk_footer(
        &mut self,
        io: &mut DataWriter<S>,
        chunk: &mut ChunkInfo,
    ) -> Result<(), StreamError> {
        let digest = match std::mem::take(&mut chunk.scratch) {
            Scratch::Crc32(hasher) => hasher.finalize(),
            Scratch::None => return Err(StreamError::new(ErrorKind::InvalidWriteState)),
        };
        io.write_u32_be(digest)?;
        chunk.extra_size = CRC_SIZE;
        Ok(())
    }

    fn chunk_overhead(&self, _chunk: &ChunkInfo) -> u64 {
        CHUNK_HEADER_SIZE
    }
}
