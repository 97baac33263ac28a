//! JPEG (JFIF/EXIF) marker-segment support.
//!
//! Segments are framed by a 0xFF run followed by a marker byte. Most
//! markers carry a big-endian length that includes its own two bytes;
//! a handful are bare sentinels with no payload at all. Entropy-coded
//! scan data after SOS has no declared size and is surfaced as a
//! pseudo chunk found by scanning forward to the EOI sentinel.

use std::io::{Read, Seek, Write};

use crate::chunk::{ChunkId, ChunkInfo, ChunkKind};
use crate::document::{DocumentInfo, StreamKind};
use crate::error::{ErrorHandler, ErrorKind, Location, StreamError};
use crate::io::{DataReader, DataWriter};
use crate::reader::FormatReader;
use crate::validator::ChunkValidator;
use crate::writer::FormatWriter;

pub const MIME_TYPE: &str = "image/jpeg";

/// Marker identifiers, without their 0xFF prefix.
pub mod markers {
    /// Temporary private use.
    pub const TEM: u8 = 0x01;
    pub const SOF0: u8 = 0xc0;
    pub const DHT: u8 = 0xc4;
    pub const RST0: u8 = 0xd0;
    pub const RST7: u8 = 0xd7;
    /// Start of image.
    pub const SOI: u8 = 0xd8;
    /// End of image.
    pub const EOI: u8 = 0xd9;
    /// Start of scan; entropy-coded data follows the segment.
    pub const SOS: u8 = 0xda;
    pub const DQT: u8 = 0xdb;
    pub const DRI: u8 = 0xdd;
    pub const APP0: u8 = 0xe0;
    pub const APP15: u8 = 0xef;
    pub const COM: u8 = 0xfe;
    /// Pseudo identifier for entropy-coded scan data between SOS and
    /// the next marker. Never appears on the wire as a marker.
    pub const SCAN_DATA: u8 = 0xff;
}

/// Largest payload a length-carrying segment can declare: 65535 minus
/// the length field itself.
pub const MAX_SEGMENT_SIZE: u64 = 65533;

/// Whether `marker` is a bare sentinel without a length field.
fn is_length_less(marker: u8) -> bool {
    matches!(marker, markers::TEM | markers::SOI | markers::EOI)
        || (markers::RST0..=markers::RST7).contains(&marker)
}

/// Identifier and size rules for JPEG segments.
#[derive(Debug, Default)]
pub struct JpegValidator;

impl ChunkValidator for JpegValidator {
    fn chunk_id_to_canonical(&self, id: &ChunkId) -> Result<String, StreamError> {
        match id.as_marker() {
            Some(marker) => Ok(format!("{:#04x}", marker)),
            None => Err(StreamError::with_detail(
                ErrorKind::InvalidBlockId,
                format!("'{}' is not a marker byte", id),
            )),
        }
    }

    fn is_valid_chunk_size(&self, size: u64) -> bool {
        size <= MAX_SEGMENT_SIZE
    }
}

/// Format hook for reading JPEG streams.
#[derive(Debug, Default)]
pub struct JpegReader {
    pending_scan: Option<ChunkInfo>,
    end_of_document: bool,
}

impl JpegReader {
    pub fn new() -> Self {
        JpegReader::default()
    }

    /// Measures the entropy-coded scan run starting at the current
    /// position, stopping in front of the EOI sentinel.
    fn measure_scan<S: Read + Seek>(
        &mut self,
        io: &mut DataReader<S>,
    ) -> Result<ChunkInfo, StreamError> {
        let start = io.position();
        let mut size = 0u64;
        loop {
            let byte = io.read_u8_raw()?.ok_or_else(|| {
                StreamError::with_detail(
                    ErrorKind::UnexpectedEndOfStream,
                    "scan data is not terminated",
                )
                .at(Location::at(io.position()))
            })?;
            size += 1;
            if byte != 0xff {
                continue;
            }
            let next = io.read_u8_raw()?.ok_or_else(|| {
                StreamError::with_detail(
                    ErrorKind::UnexpectedEndOfStream,
                    "scan data is not terminated",
                )
                .at(Location::at(io.position()))
            })?;
            size += 1;
            if next == markers::EOI {
                // The sentinel is not scan data.
                size -= 2;
                break;
            }
        }
        let mut scan = ChunkInfo::new();
        scan.kind = ChunkKind::Leaf;
        scan.id = Some(ChunkId::Marker(markers::SCAN_DATA));
        scan.size = size;
        scan.offset = Some(start);
        Ok(scan)
    }
}

impl<S: Read + Seek> FormatReader<S> for JpegReader {
    fn read_document_header(
        &mut self,
        io: &mut DataReader<S>,
        _handler: &mut dyn ErrorHandler,
    ) -> Result<Option<DocumentInfo>, StreamError> {
        let len = io.len();
        let start = io.position();
        let signature = match io.read_u16_be() {
            Ok(signature) => signature,
            Err(_) => return Ok(None),
        };
        if signature != 0xffd8 {
            return Ok(None);
        }
        let document = DocumentInfo::new(None, MIME_TYPE, StreamKind::BigEndian, len);

        // A clean stream ends with the EOI sentinel.
        if len >= start + 4 {
            io.seek(len - 2)?;
            if io.read_u16_be()? == 0xffd9 {
                io.seek(start)?;
                return Ok(Some(document));
            }
        }
        // Trailing garbage can bury the sentinel. Accept the stream
        // anyway when the second segment is an application marker.
        io.seek(start + 2)?;
        let mut accepted = false;
        if let (Ok(prefix), Ok(marker)) = (io.read_u8(), io.read_u8()) {
            accepted =
                prefix == 0xff && (markers::APP0..=markers::APP15).contains(&marker);
        }
        io.seek(start)?;
        if accepted {
            Ok(Some(document))
        } else {
            Ok(None)
        }
    }

    fn read_chunk_header(
        &mut self,
        io: &mut DataReader<S>,
        chunk: &mut ChunkInfo,
        handler: &mut dyn ErrorHandler,
    ) -> Result<(), StreamError> {
        if let Some(scan) = self.pending_scan.take() {
            *chunk = scan;
            return Ok(());
        }

        // A marker is a 0xFF run followed by one non-fill byte.
        let mut saw_fill = false;
        let marker = loop {
            match io.read_u8_raw()? {
                Some(0xff) => saw_fill = true,
                Some(byte) => break byte,
                None => {
                    return Err(StreamError::with_detail(
                        ErrorKind::UnexpectedEndOfStream,
                        "stream ends inside a marker",
                    )
                    .at(Location::at(io.position())))
                }
            }
        };
        if !saw_fill || marker == 0 {
            handler.error(
                StreamError::with_detail(
                    ErrorKind::InvalidHeader,
                    format!("byte {:#04x} is not a marker", marker),
                )
                .at(Location::at(io.position())),
            )?;
        }

        chunk.kind = ChunkKind::Leaf;
        chunk.id = Some(ChunkId::Marker(marker));
        if is_length_less(marker) {
            chunk.size = 0;
            chunk.offset = Some(io.position());
            return Ok(());
        }

        // The length field counts itself.
        let declared = io.read_u16_be()? as u64;
        chunk.size = declared.saturating_sub(2);
        chunk.offset = Some(io.position());

        if marker == markers::SOS {
            // Measure the entropy run behind the segment, then put the
            // stream back at the segment payload.
            let payload_start = io.position();
            io.skip(chunk.size)?;
            let scan = self.measure_scan(io)?;
            io.seek(payload_start)?;
            self.pending_scan = Some(scan);
        }
        Ok(())
    }

    fn is_document_end(
        &mut self,
        io: &mut DataReader<S>,
        document: &DocumentInfo,
        current: &ChunkInfo,
    ) -> Result<bool, StreamError> {
        if current.id == Some(ChunkId::Marker(markers::EOI)) {
            self.end_of_document = true;
            return Ok(true);
        }
        Ok(io.position() >= document.size())
    }

    fn verify_document_end(
        &mut self,
        io: &mut DataReader<S>,
        document: &DocumentInfo,
        _open_groups: usize,
        handler: &mut dyn ErrorHandler,
    ) -> Result<(), StreamError> {
        // When EOI ended the document early, anything after it is
        // undeclared trailing data.
        let end = if self.end_of_document {
            io.position()
        } else {
            document.size()
        };
        if end < document.size() || io.position() < end {
            handler.warning(
                StreamError::new(ErrorKind::ExtraData).at(Location::at(io.position())),
            )?;
        }
        Ok(())
    }
}

/// Format hook for writing JPEG streams.
#[derive(Debug, Default)]
pub struct JpegWriter {
    validator: JpegValidator,
}

impl JpegWriter {
    pub fn new() -> Self {
        JpegWriter::default()
    }
}

fn marker_of(chunk: &ChunkInfo) -> Result<u8, StreamError> {
    chunk
        .id
        .as_ref()
        .and_then(|id| id.as_marker())
        .ok_or_else(|| StreamError::new(ErrorKind::InvalidBlockId))
}

impl<S: Write + Seek> FormatWriter<S> for JpegWriter {
    fn validator(&self) -> &dyn ChunkValidator {
        &self.validator
    }

    /// The SOI sentinel doubles as the signature; callers emit it as
    /// their first segment.
    fn write_document_header(
        &mut self,
        _io: &mut DataWriter<S>,
        _public_id: &str,
    ) -> Result<(), StreamError> {
        Ok(())
    }

    fn write_chunk_header(
        &mut self,
        io: &mut DataWriter<S>,
        chunk: &mut ChunkInfo,
    ) -> Result<(), StreamError> {
        let marker = marker_of(chunk)?;
        chunk.offset = Some(io.position());
        if marker == markers::SCAN_DATA {
            return Ok(());
        }
        io.write_u8(0xff)?;
        io.write_u8(marker)?;
        if !is_length_less(marker) {
            io.write_u16_be(0)?;
        }
        Ok(())
    }

    fn write_fixup_chunk_header(
        &mut self,
        io: &mut DataWriter<S>,
        chunk: &mut ChunkInfo,
    ) -> Result<(), StreamError> {
        let marker = marker_of(chunk)?;
        if marker == markers::SCAN_DATA || is_length_less(marker) {
            return Ok(());
        }
        let offset = chunk
            .offset
            .ok_or_else(|| StreamError::new(ErrorKind::InvalidWriteState))?;
        let end = io.position();
        io.seek(offset + 2)?;
        io.write_u16_be((chunk.size + 2) as u16)?;
        io.seek(end)
    }

    fn chunk_overhead(&self, chunk: &ChunkInfo) -> u64 {
        match marker_of(chunk) {
            Ok(markers::SCAN_DATA) => 0,
            Ok(marker) if is_length_less(marker) => 2,
            _ => 4,
        }
    }
}
