//! Position-tracked, endian-aware primitives over seekable streams.
//!
//! [`DataReader`] and [`DataWriter`] are the only things in the crate
//! that touch the underlying stream. Both keep their own position
//! cursor so formats and the engine can reason about offsets without
//! issuing seeks, and both translate i/o failures into
//! [`StreamError`]s carrying the offset where they happened.

use std::io::{self, Read, Seek, SeekFrom, Write};

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{ErrorKind, Location, StreamError};

/// Byte order of multi-byte values in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// Reads fixed-width values from a seekable source.
#[derive(Debug)]
pub struct DataReader<S> {
    inner: S,
    position: u64,
    size: u64,
}

impl<S: Read + Seek> DataReader<S> {
    pub fn new(mut inner: S) -> Result<Self, StreamError> {
        let size = inner
            .seek(SeekFrom::End(0))
            .map_err(|e| StreamError::caused_by(ErrorKind::Io, e, Location::unknown()))?;
        inner
            .seek(SeekFrom::Start(0))
            .map_err(|e| StreamError::caused_by(ErrorKind::Io, e, Location::unknown()))?;
        Ok(DataReader {
            inner,
            position: 0,
            size,
        })
    }

    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Total size of the underlying stream in bytes.
    #[inline]
    pub fn len(&self) -> u64 {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn stream_error(&self, e: io::Error) -> StreamError {
        let kind = if e.kind() == io::ErrorKind::UnexpectedEof {
            ErrorKind::UnexpectedEndOfStream
        } else {
            ErrorKind::Io
        };
        StreamError::caused_by(kind, e, Location::at(self.position))
    }

    /// Fills `buf` completely or fails. On failure the stream is put
    /// back at the recorded position so partial reads never skew the
    /// cursor.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), StreamError> {
        match self.inner.read_exact(buf) {
            Ok(()) => {
                self.position += buf.len() as u64;
                Ok(())
            }
            Err(e) => {
                let _ = self.inner.seek(SeekFrom::Start(self.position));
                Err(self.stream_error(e))
            }
        }
    }

    /// Reads one byte, reporting end-of-stream as `None` instead of an
    /// error. Marker scanners use this to probe for sentinels.
    pub fn read_u8_raw(&mut self) -> Result<Option<u8>, StreamError> {
        let mut buf = [0u8; 1];
        loop {
            match self.inner.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    self.position += 1;
                    return Ok(Some(buf[0]));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.stream_error(e)),
            }
        }
    }

    pub fn read_u8(&mut self) -> Result<u8, StreamError> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16, StreamError> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(LittleEndian::read_u16(&buf))
    }

    pub fn read_u16_be(&mut self) -> Result<u16, StreamError> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(BigEndian::read_u16(&buf))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, StreamError> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(LittleEndian::read_u32(&buf))
    }

    pub fn read_u32_be(&mut self) -> Result<u32, StreamError> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(BigEndian::read_u32(&buf))
    }

    pub fn read_u64_le(&mut self) -> Result<u64, StreamError> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(LittleEndian::read_u64(&buf))
    }

    pub fn read_u64_be(&mut self) -> Result<u64, StreamError> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(BigEndian::read_u64(&buf))
    }

    /// Advances past `count` bytes without surfacing them. Skipping
    /// beyond the end of the stream is an error, not a silent seek.
    pub fn skip(&mut self, count: u64) -> Result<(), StreamError> {
        if count == 0 {
            return Ok(());
        }
        let target = self.position + count;
        if target > self.size {
            return Err(StreamError::with_detail(
                ErrorKind::UnexpectedEndOfStream,
                format!("cannot skip {} bytes", count),
            )
            .at(Location::at(self.position)));
        }
        self.seek(target)
    }

    pub fn seek(&mut self, position: u64) -> Result<(), StreamError> {
        self.inner
            .seek(SeekFrom::Start(position))
            .map_err(|e| self.stream_error(e))?;
        self.position = position;
        Ok(())
    }
}

/// Writes fixed-width values to a seekable sink.
#[derive(Debug)]
pub struct DataWriter<S> {
    inner: S,
    position: u64,
    size: u64,
}

impl<S: Write + Seek> DataWriter<S> {
    pub fn new(mut inner: S) -> Result<Self, StreamError> {
        let position = inner
            .stream_position()
            .map_err(|e| StreamError::caused_by(ErrorKind::Io, e, Location::unknown()))?;
        Ok(DataWriter {
            inner,
            position,
            size: position,
        })
    }

    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// High-water mark of bytes written so far.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn stream_error(&self, e: io::Error) -> StreamError {
        StreamError::caused_by(ErrorKind::Io, e, Location::at(self.position))
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<(), StreamError> {
        self.inner.write_all(buf).map_err(|e| self.stream_error(e))?;
        self.position += buf.len() as u64;
        if self.position > self.size {
            self.size = self.position;
        }
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), StreamError> {
        self.write(&[value])
    }

    pub fn write_u16_le(&mut self, value: u16) -> Result<(), StreamError> {
        let mut buf = [0u8; 2];
        LittleEndian::write_u16(&mut buf, value);
        self.write(&buf)
    }

    pub fn write_u16_be(&mut self, value: u16) -> Result<(), StreamError> {
        let mut buf = [0u8; 2];
        BigEndian::write_u16(&mut buf, value);
        self.write(&buf)
    }

    pub fn write_u32_le(&mut self, value: u32) -> Result<(), StreamError> {
        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, value);
        self.write(&buf)
    }

    pub fn write_u32_be(&mut self, value: u32) -> Result<(), StreamError> {
        let mut buf = [0u8; 4];
        BigEndian::write_u32(&mut buf, value);
        self.write(&buf)
    }

    pub fn write_u64_le(&mut self, value: u64) -> Result<(), StreamError> {
        let mut buf = [0u8; 8];
        LittleEndian::write_u64(&mut buf, value);
        self.write(&buf)
    }

    pub fn write_u64_be(&mut self, value: u64) -> Result<(), StreamError> {
        let mut buf = [0u8; 8];
        BigEndian::write_u64(&mut buf, value);
        self.write(&buf)
    }

    pub fn seek(&mut self, position: u64) -> Result<(), StreamError> {
        self.inner
            .seek(SeekFrom::Start(position))
            .map_err(|e| self.stream_error(e))?;
        self.position = position;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), StreamError> {
        self.inner.flush().map_err(|e| self.stream_error(e))
    }
}
