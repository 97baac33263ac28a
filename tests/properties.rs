//! End-to-end structural guarantees, exercised through the public API.

use std::cell::RefCell;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::rc::Rc;

use chunkstream::jpeg::{markers, JpegReader, JpegWriter};
use chunkstream::png::{PngReader, PngWriter};
use chunkstream::riff::{RiffReader, RiffWriter};
use chunkstream::{
    ChunkId, ChunkInfo, ChunkReader, ChunkWriter, Endian, ErrorHandler, ErrorKind, Severity,
    StreamError, StreamEvent, StreamFilter,
};

#[derive(Default)]
struct CollectingHandler {
    reports: Rc<RefCell<Vec<(Severity, ErrorKind)>>>,
}

impl ErrorHandler for CollectingHandler {
    fn warning(&mut self, error: StreamError) -> Result<(), StreamError> {
        self.reports
            .borrow_mut()
            .push((Severity::Warning, error.kind()));
        Ok(())
    }

    fn error(&mut self, error: StreamError) -> Result<(), StreamError> {
        self.reports
            .borrow_mut()
            .push((Severity::Error, error.kind()));
        Ok(())
    }
}

/// Counts bytes handed out by the wrapped stream.
struct CountingSource<S> {
    inner: S,
    bytes_read: Rc<RefCell<u64>>,
}

impl<S: Read> Read for CountingSource<S> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let count = self.inner.read(buf)?;
        *self.bytes_read.borrow_mut() += count as u64;
        Ok(count)
    }
}

impl<S: Seek> Seek for CountingSource<S> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}

fn riff_writer() -> ChunkWriter<Cursor<Vec<u8>>, RiffWriter> {
    ChunkWriter::new(Cursor::new(Vec::new()), RiffWriter::new(Endian::Little)).unwrap()
}

#[test]
fn riff_round_trip_matches_reference_bytes() {
    let mut w = riff_writer();
    w.write_start_document("AVI ").unwrap();
    w.write_start_group(ChunkId::Tag(*b"INFO"), &[]).unwrap();
    w.write_end_group().unwrap();
    w.write_end_document().unwrap();

    let buf = w.into_inner().into_inner();
    let mut expected = Vec::new();
    expected.extend_from_slice(b"RIFF");
    expected.extend_from_slice(&12u32.to_le_bytes());
    expected.extend_from_slice(b"AVI ");
    expected.extend_from_slice(b"LIST");
    expected.extend_from_slice(&4u32.to_le_bytes());
    expected.extend_from_slice(b"INFO");
    assert_eq!(buf, expected);

    let mut reader = ChunkReader::new(Cursor::new(buf), RiffReader::new()).unwrap();
    assert_eq!(reader.document_info().unwrap().public_id(), Some("AVI "));
    assert_eq!(reader.advance().unwrap(), StreamEvent::StartDocument);
    assert_eq!(reader.advance().unwrap(), StreamEvent::StartGroup);
    assert_eq!(reader.id().unwrap(), &ChunkId::Tag(*b"INFO"));
    assert_eq!(reader.advance().unwrap(), StreamEvent::EndGroup);
    assert_eq!(reader.id().unwrap(), &ChunkId::Tag(*b"INFO"));
    assert_eq!(reader.advance().unwrap(), StreamEvent::EndDocument);
}

/// Wraps `body` in `levels` nested LIST groups, innermost first.
fn nest_lists(levels: usize, mut body: Vec<u8>) -> Vec<u8> {
    for _ in 0..levels {
        let mut outer = Vec::with_capacity(body.len() + 12);
        outer.extend_from_slice(b"LIST");
        outer.extend_from_slice(&((body.len() + 4) as u32).to_le_bytes());
        outer.extend_from_slice(b"nest");
        outer.extend_from_slice(&body);
        body = outer;
    }
    body
}

fn riff_document(body: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(body.len() + 12);
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
    buf.extend_from_slice(b"test");
    buf.extend_from_slice(body);
    buf
}

#[test]
fn group_events_stay_balanced() {
    let mut leaf = Vec::new();
    leaf.extend_from_slice(b"data");
    leaf.extend_from_slice(&2u32.to_le_bytes());
    leaf.extend_from_slice(&[0xaa, 0xbb]);
    let buf = riff_document(&nest_lists(3, leaf));

    let mut reader = ChunkReader::new(Cursor::new(buf), RiffReader::new()).unwrap();
    let mut open = Vec::new();
    let mut max_depth = 0;
    loop {
        match reader.advance().unwrap() {
            StreamEvent::StartGroup => {
                open.push(reader.id().unwrap().clone());
                max_depth = max_depth.max(reader.depth());
            }
            StreamEvent::EndGroup => {
                let started = open.pop().expect("end-group without start-group");
                assert_eq!(&started, reader.id().unwrap());
            }
            StreamEvent::EndDocument => break,
            _ => {}
        }
    }
    assert!(open.is_empty());
    assert_eq!(max_depth, 3);
}

#[test]
fn skipping_and_reading_land_on_the_same_position() {
    // Odd-sized leaves force pad handling on every path.
    let mut body = Vec::new();
    body.extend_from_slice(b"odd ");
    body.extend_from_slice(&3u32.to_le_bytes());
    body.extend_from_slice(b"ab\xff\0");
    let mut inner = nest_lists(2, body);
    inner.extend_from_slice(b"tail");
    inner.extend_from_slice(&5u32.to_le_bytes());
    inner.extend_from_slice(b"12345\0");
    let buf = riff_document(&inner);

    struct RejectAll;
    impl StreamFilter for RejectAll {
        fn accept(&mut self, _: &ChunkInfo, _: StreamEvent, _: usize) -> bool {
            false
        }
    }

    let mut consumed = ChunkReader::new(Cursor::new(buf.clone()), RiffReader::new()).unwrap();
    let mut scratch = [0u8; 64];
    loop {
        match consumed.advance().unwrap() {
            StreamEvent::Data => while consumed.read_data(&mut scratch).unwrap() > 0 {},
            StreamEvent::EndDocument => break,
            _ => {}
        }
    }

    let mut untouched = ChunkReader::new(Cursor::new(buf.clone()), RiffReader::new()).unwrap();
    loop {
        if untouched.advance().unwrap() == StreamEvent::EndDocument {
            break;
        }
    }

    let mut skipped = ChunkReader::new(Cursor::new(buf), RiffReader::new()).unwrap();
    skipped.set_filter(Box::new(RejectAll));
    loop {
        if skipped.advance().unwrap() == StreamEvent::EndDocument {
            break;
        }
    }

    assert_eq!(consumed.location().offset(), untouched.location().offset());
    assert_eq!(consumed.location().offset(), skipped.location().offset());
}

#[test]
fn document_info_reads_header_exactly_once() {
    let mut w = riff_writer();
    w.write_start_document("WAVE").unwrap();
    w.write_start_element(ChunkId::Tag(*b"data"), &[]).unwrap();
    w.write_bytes(&[1, 2]).unwrap();
    w.write_end_element().unwrap();
    w.write_end_document().unwrap();
    let buf = w.into_inner().into_inner();

    let bytes_read = Rc::new(RefCell::new(0u64));
    let source = CountingSource {
        inner: Cursor::new(buf),
        bytes_read: bytes_read.clone(),
    };
    let mut reader = ChunkReader::new(source, RiffReader::new()).unwrap();

    let before = reader.document_info().unwrap().clone();
    let after_info = *bytes_read.borrow();
    // RIFF tag, size field and form type.
    assert_eq!(after_info, 12);

    reader.advance().unwrap();
    let after = reader.document_info().unwrap().clone();
    assert_eq!(before, after);
    // Only the first chunk header was read on top of the signature.
    assert_eq!(*bytes_read.borrow(), 20);
}

#[test]
fn writer_enforces_nesting_depth_before_any_byte() {
    let mut w = riff_writer();
    w.write_start_document("deep").unwrap();
    for _ in 0..64 {
        w.write_start_group(ChunkId::Tag(*b"nest"), &[]).unwrap();
    }
    let pos = w.position();
    let err = w.write_start_group(ChunkId::Tag(*b"nest"), &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidNesting);
    assert_eq!(w.position(), pos);

    for _ in 0..64 {
        w.write_end_group().unwrap();
    }
    w.write_end_document().unwrap();

    // The document stays readable at full depth.
    let mut reader =
        ChunkReader::new(Cursor::new(w.into_inner().into_inner()), RiffReader::new()).unwrap();
    let mut max_depth = 0;
    loop {
        if reader.advance().unwrap() == StreamEvent::EndDocument {
            break;
        }
        max_depth = max_depth.max(reader.depth());
    }
    assert_eq!(max_depth, 64);
}

#[test]
fn reader_rejects_runaway_nesting() {
    let buf = riff_document(&nest_lists(65, Vec::new()));
    let mut reader = ChunkReader::new(Cursor::new(buf), RiffReader::new()).unwrap();
    let err = loop {
        match reader.advance() {
            Ok(_) => continue,
            Err(err) => break err,
        }
    };
    assert_eq!(err.kind(), ErrorKind::InvalidNesting);
}

fn png_sample() -> Vec<u8> {
    let mut w = ChunkWriter::new(Cursor::new(Vec::new()), PngWriter::new()).unwrap();
    w.write_start_document("").unwrap();
    w.write_start_element(ChunkId::Tag(*b"IHDR"), &[]).unwrap();
    w.write_bytes(&[0, 0, 0, 1, 0, 0, 0, 1, 8, 0, 0, 0, 0]).unwrap();
    w.write_end_element().unwrap();
    w.write_start_element(ChunkId::Tag(*b"IDAT"), &[]).unwrap();
    w.write_bytes(&[0x78, 0x9c, 0x62, 0x00, 0x01]).unwrap();
    w.write_end_element().unwrap();
    w.write_start_element(ChunkId::Tag(*b"IEND"), &[]).unwrap();
    w.write_end_element().unwrap();
    w.write_end_document().unwrap();
    w.into_inner().into_inner()
}

#[test]
fn png_crc_mismatch_is_reported_once_and_traversal_continues() {
    let mut buf = png_sample();
    // Flip one bit inside the IDAT payload.
    let idat_payload = 8 + (8 + 13 + 4) + 8;
    assert_eq!(&buf[idat_payload - 4..idat_payload], b"IDAT");
    buf[idat_payload] ^= 0x01;

    let reports = Rc::new(RefCell::new(Vec::new()));
    let mut reader = ChunkReader::new(Cursor::new(buf), PngReader::new()).unwrap();
    reader.set_error_handler(Box::new(CollectingHandler {
        reports: reports.clone(),
    }));

    let mut seen = Vec::new();
    loop {
        match reader.advance().unwrap() {
            StreamEvent::StartElement => seen.push(reader.id().unwrap().clone()),
            StreamEvent::EndDocument => break,
            _ => {}
        }
    }

    let corrupt = reports
        .borrow()
        .iter()
        .filter(|r| **r == (Severity::Error, ErrorKind::CorruptStream))
        .count();
    assert_eq!(corrupt, 1);
    // The damaged chunk and everything after it still surfaced.
    assert_eq!(
        seen,
        vec![
            ChunkId::Tag(*b"IHDR"),
            ChunkId::Tag(*b"IDAT"),
            ChunkId::Tag(*b"IEND"),
        ]
    );
}

#[test]
fn png_payloads_survive_a_round_trip() {
    let buf = png_sample();
    let mut reader = ChunkReader::new(Cursor::new(buf), PngReader::new()).unwrap();
    let mut payloads = Vec::new();
    loop {
        match reader.advance().unwrap() {
            StreamEvent::Data => {
                let mut data = vec![0u8; reader.data_size().unwrap() as usize];
                let mut filled = 0;
                while filled < data.len() {
                    filled += reader.read_data(&mut data[filled..]).unwrap();
                }
                payloads.push(data);
            }
            StreamEvent::EndDocument => break,
            _ => {}
        }
    }
    assert_eq!(payloads.len(), 3);
    assert_eq!(payloads[1], vec![0x78, 0x9c, 0x62, 0x00, 0x01]);
    assert!(payloads[2].is_empty());
}

#[test]
fn jpeg_round_trip_preserves_scan_data() {
    let mut w = ChunkWriter::new(Cursor::new(Vec::new()), JpegWriter::new()).unwrap();
    w.write_start_document("").unwrap();
    w.write_start_element(ChunkId::Marker(markers::SOI), &[]).unwrap();
    w.write_end_element().unwrap();
    w.write_start_element(ChunkId::Marker(markers::SOS), &[]).unwrap();
    w.write_bytes(&[0x01]).unwrap();
    w.write_end_element().unwrap();
    w.write_start_element(ChunkId::Marker(markers::SCAN_DATA), &[]).unwrap();
    w.write_bytes(&[0x10, 0x20, 0xff, 0x00, 0x30]).unwrap();
    w.write_end_element().unwrap();
    w.write_start_element(ChunkId::Marker(markers::EOI), &[]).unwrap();
    w.write_end_element().unwrap();
    w.write_end_document().unwrap();

    let mut reader =
        ChunkReader::new(w.into_inner(), JpegReader::new()).unwrap();
    let mut scan = Vec::new();
    loop {
        match reader.advance().unwrap() {
            StreamEvent::Data => {
                if reader.id().unwrap() == &ChunkId::Marker(markers::SCAN_DATA) {
                    let mut data = vec![0u8; reader.data_size().unwrap() as usize];
                    let mut filled = 0;
                    while filled < data.len() {
                        filled += reader.read_data(&mut data[filled..]).unwrap();
                    }
                    scan = data;
                }
            }
            StreamEvent::EndDocument => break,
            _ => {}
        }
    }
    // Stuffed 0xFF00 inside the scan is data, not a marker.
    assert_eq!(scan, vec![0x10, 0x20, 0xff, 0x00, 0x30]);
}

#[test]
fn empty_document_ends_cleanly_and_repeats() {
    let mut w = riff_writer();
    w.write_start_document("WAVE").unwrap();
    w.write_end_document().unwrap();

    let mut reader = ChunkReader::new(w.into_inner(), RiffReader::new()).unwrap();
    assert_eq!(reader.advance().unwrap(), StreamEvent::StartDocument);
    assert_eq!(reader.advance().unwrap(), StreamEvent::EndDocument);
    assert_eq!(reader.advance().unwrap(), StreamEvent::EndDocument);
    assert!(!reader.has_more());
    assert_eq!(
        reader.id().unwrap_err().kind(),
        ErrorKind::InvalidState
    );
}
