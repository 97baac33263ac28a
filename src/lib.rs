//! Streaming access to chunk-oriented container formats.
//!
//! Many binary containers share one skeleton: a signature, then a run
//! of chunks, each carrying an identifier, a size and a payload, with
//! some formats nesting chunks into groups. This crate factors that
//! skeleton into a pair of engines. [`ChunkReader`] pulls a document
//! apart as a stream of events over a single forward pass;
//! [`ChunkWriter`] assembles one symmetrically, patching size fields
//! in place so callers never declare sizes up front. The byte-level
//! dialect lives behind the [`FormatReader`] and [`FormatWriter`]
//! traits, with RIFF, PNG and JPEG provided in-tree.
//!
//! ```
//! use std::io::Cursor;
//!
//! use chunkstream::riff::{RiffReader, RiffWriter};
//! use chunkstream::{ChunkId, ChunkReader, ChunkWriter, Endian, StreamEvent};
//!
//! # fn main() -> Result<(), chunkstream::StreamError> {
//! let mut writer = ChunkWriter::new(Cursor::new(Vec::new()), RiffWriter::new(Endian::Little))?;
//! writer.write_start_document("WAVE")?;
//! writer.write_start_element(ChunkId::Tag(*b"data"), &[])?;
//! writer.write_bytes(&[1, 2, 3, 4])?;
//! writer.write_end_element()?;
//! writer.write_end_document()?;
//!
//! let mut reader = ChunkReader::new(writer.into_inner(), RiffReader::new())?;
//! while reader.advance()? != StreamEvent::EndDocument {
//!     if reader.event_type() == StreamEvent::Data {
//!         assert_eq!(reader.data_size()?, 4);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod chunk;
mod document;
mod error;
mod event;
mod filter;
mod io;
pub mod jpeg;
pub mod png;
mod reader;
pub mod riff;
mod validator;
mod writer;

pub use crate::chunk::{Attribute, ChunkId, ChunkInfo, ChunkKind, Scratch};
pub use crate::document::{DocumentInfo, StreamKind};
pub use crate::error::{DefaultHandler, ErrorHandler, ErrorKind, Location, Severity, StreamError};
pub use crate::event::StreamEvent;
pub use crate::filter::{AcceptAll, StreamFilter};
pub use crate::io::{DataReader, DataWriter, Endian};
pub use crate::reader::{ChunkReader, FormatReader};
pub use crate::validator::ChunkValidator;
pub use crate::writer::{ChunkWriter, FormatWriter};
