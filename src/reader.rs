//! Pull-based traversal over a chunk stream.
//!
//! [`ChunkReader`] owns the event loop: callers repeatedly call
//! [`advance`](ChunkReader::advance) and inspect the cursor between
//! events. Everything byte-level is delegated to a [`FormatReader`]
//! implementation, which decodes signatures and chunk headers but never
//! drives state itself.

use std::io::{Read, Seek};

use crate::chunk::{Attribute, ChunkId, ChunkInfo};
use crate::document::DocumentInfo;
use crate::error::{DefaultHandler, ErrorHandler, ErrorKind, Location, StreamError};
use crate::event::StreamEvent;
use crate::filter::{AcceptAll, StreamFilter};
use crate::io::DataReader;

/// Byte-level decoding hooks a container format supplies to the engine.
///
/// Mandatory: recognizing the document signature and decoding one chunk
/// header. Everything else has a default suiting declared-size formats;
/// sentinel-driven formats override the end predicates and the data
/// primitives.
pub trait FormatReader<S: Read + Seek> {
    /// Maximum group nesting depth. Zero means the format has no
    /// groups at all.
    fn max_nesting(&self) -> usize {
        0
    }

    /// Reads and validates the document signature. `Ok(None)` means
    /// the stream is not in this format; hard i/o failures still
    /// surface as errors.
    fn read_document_header(
        &mut self,
        io: &mut DataReader<S>,
        handler: &mut dyn ErrorHandler,
    ) -> Result<Option<DocumentInfo>, StreamError>;

    /// Decodes the chunk header at the current position into `chunk`,
    /// leaving the stream at the payload start.
    fn read_chunk_header(
        &mut self,
        io: &mut DataReader<S>,
        chunk: &mut ChunkInfo,
        handler: &mut dyn ErrorHandler,
    ) -> Result<(), StreamError>;

    /// Whether the enclosing `group` has no content left before the
    /// current position.
    fn is_group_end(
        &mut self,
        io: &mut DataReader<S>,
        _current: &ChunkInfo,
        group: &ChunkInfo,
    ) -> Result<bool, StreamError> {
        let end = group.offset.unwrap_or(0) + group.size;
        Ok(io.position() >= end)
    }

    /// Whether the document has no content left before the current
    /// position. `current` is the most recently completed chunk, for
    /// formats whose end is a sentinel chunk rather than a size.
    fn is_document_end(
        &mut self,
        io: &mut DataReader<S>,
        document: &DocumentInfo,
        _current: &ChunkInfo,
    ) -> Result<bool, StreamError> {
        Ok(io.position() >= document.size())
    }

    fn skip_data(&mut self, io: &mut DataReader<S>, count: u64) -> Result<(), StreamError> {
        io.skip(count)
    }

    fn read_data(&mut self, io: &mut DataReader<S>, buf: &mut [u8]) -> Result<(), StreamError> {
        io.read_exact(buf)
    }

    /// Consistency checks once the document end has been reached.
    fn verify_document_end(
        &mut self,
        io: &mut DataReader<S>,
        document: &DocumentInfo,
        open_groups: usize,
        handler: &mut dyn ErrorHandler,
    ) -> Result<(), StreamError> {
        if open_groups > 0 {
            handler.warning(
                StreamError::with_detail(
                    ErrorKind::InvalidNesting,
                    format!("{} group(s) never closed", open_groups),
                )
                .at(Location::at(io.position())),
            )?;
        }
        if io.position() < document.size() {
            handler.warning(
                StreamError::new(ErrorKind::ExtraData).at(Location::at(io.position())),
            )?;
        }
        Ok(())
    }

    /// Fresh chunk slot, for formats that seed per-chunk scratch state.
    fn new_chunk(&self) -> ChunkInfo {
        ChunkInfo::new()
    }
}

/// Streaming reader over any [`FormatReader`].
///
/// Single forward pass, one chunk header of lookahead, constant memory
/// apart from the group stack.
pub struct ChunkReader<S: Read + Seek, F: FormatReader<S>> {
    io: DataReader<S>,
    format: F,
    filter: Box<dyn StreamFilter>,
    handler: Box<dyn ErrorHandler>,
    state: StreamEvent,
    next_state: StreamEvent,
    current: ChunkInfo,
    lookahead: ChunkInfo,
    data_left: u64,
    extra_left: u64,
    stack: Vec<ChunkInfo>,
    document: Option<DocumentInfo>,
}

impl<S: Read + Seek, F: FormatReader<S>> ChunkReader<S, F> {
    pub fn new(source: S, format: F) -> Result<Self, StreamError> {
        let io = DataReader::new(source)?;
        let current = format.new_chunk();
        let lookahead = format.new_chunk();
        Ok(ChunkReader {
            io,
            format,
            filter: Box::new(AcceptAll),
            handler: Box::new(DefaultHandler),
            state: StreamEvent::StartDocument,
            next_state: StreamEvent::StartDocument,
            current,
            lookahead,
            data_left: 0,
            extra_left: 0,
            stack: Vec::new(),
            document: None,
        })
    }

    /// Installs a chunk filter. Takes effect from the next event.
    pub fn set_filter(&mut self, filter: Box<dyn StreamFilter>) {
        self.filter = filter;
    }

    /// Replaces the error handler, mid-parse if desired.
    pub fn set_error_handler(&mut self, handler: Box<dyn ErrorHandler>) {
        self.handler = handler;
    }

    /// The event the cursor currently rests on.
    #[inline]
    pub fn event_type(&self) -> StreamEvent {
        self.state
    }

    #[inline]
    pub fn has_more(&self) -> bool {
        self.state != StreamEvent::EndDocument
    }

    /// Current group nesting depth.
    #[inline]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn location(&self) -> Location {
        Location::at(self.io.position())
    }

    /// Consumes the reader, returning the underlying stream.
    pub fn into_inner(self) -> S {
        self.io.into_inner()
    }

    /// Document-level facts. Reads the signature on first use; calling
    /// before or after [`advance`](Self::advance) yields the same
    /// answer without touching the header bytes again.
    pub fn document_info(&mut self) -> Result<&DocumentInfo, StreamError> {
        if self.document.is_none() {
            self.read_document_header()?;
        }
        self.document
            .as_ref()
            .ok_or_else(|| StreamError::new(ErrorKind::InvalidState))
    }

    /// Moves to the next event and returns it. Once `EndDocument` has
    /// been reached it is returned forever.
    pub fn advance(&mut self) -> Result<StreamEvent, StreamError> {
        self.state = self.next_state;
        tracing::trace!(state = %self.state, offset = self.io.position(), "advance");
        match self.state {
            StreamEvent::StartDocument => {
                if self.document.is_none() {
                    self.read_document_header()?;
                }
                let at_end = {
                    let document = self
                        .document
                        .as_ref()
                        .ok_or_else(|| StreamError::new(ErrorKind::InvalidState))?;
                    self.format
                        .is_document_end(&mut self.io, document, &self.current)?
                };
                if at_end {
                    // A document with no chunks at all.
                    self.verify_document_end()?;
                    self.next_state = StreamEvent::EndDocument;
                } else {
                    self.read_lookahead()?;
                    self.next_state = if self.lookahead.is_group() {
                        StreamEvent::StartGroup
                    } else {
                        StreamEvent::StartElement
                    };
                }
            }
            StreamEvent::StartElement => self.enter_element()?,
            StreamEvent::StartGroup => self.enter_group()?,
            StreamEvent::Data => {
                self.data_left = self.current.size;
                self.extra_left = self.current.extra_size;
                if !self
                    .filter
                    .accept(&self.current, StreamEvent::Data, self.stack.len())
                {
                    let count = self.data_left + self.extra_left;
                    self.format.skip_data(&mut self.io, count)?;
                    self.data_left = 0;
                    self.extra_left = 0;
                }
                self.next_state = StreamEvent::EndElement;
            }
            StreamEvent::EndElement => {
                let count = self.data_left + self.extra_left;
                self.format.skip_data(&mut self.io, count)?;
                self.data_left = 0;
                self.extra_left = 0;
                // Tentative; resolved on the next advance.
                self.next_state = StreamEvent::EndGroup;
            }
            StreamEvent::EndGroup => return self.resolve_after_close(),
            StreamEvent::EndDocument => {}
        }
        Ok(self.state)
    }

    /// Declared payload size of the current chunk. Only valid while the
    /// cursor rests on `Data`.
    pub fn data_size(&self) -> Result<u64, StreamError> {
        if self.state != StreamEvent::Data {
            return Err(self.state_error("data size"));
        }
        Ok(self.current.size)
    }

    /// Copies up to `buf.len()` payload bytes of the current chunk,
    /// returning how many were copied. Zero means the payload is
    /// exhausted; the remainder is skipped automatically at
    /// `EndElement`.
    pub fn read_data(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        if self.state != StreamEvent::Data {
            return Err(self.state_error("data"));
        }
        let count = (buf.len() as u64).min(self.data_left) as usize;
        if count == 0 {
            return Ok(0);
        }
        self.format.read_data(&mut self.io, &mut buf[..count])?;
        self.data_left -= count as u64;
        Ok(count)
    }

    /// Identifier of the chunk the cursor rests on or just closed.
    pub fn id(&self) -> Result<&ChunkId, StreamError> {
        match self.state {
            StreamEvent::StartElement
            | StreamEvent::StartGroup
            | StreamEvent::Data
            | StreamEvent::EndElement
            | StreamEvent::EndGroup => self
                .current
                .id
                .as_ref()
                .ok_or_else(|| StreamError::new(ErrorKind::InvalidState)),
            _ => Err(self.state_error("id")),
        }
    }

    pub fn attribute_count(&self) -> Result<usize, StreamError> {
        self.require_chunk_state("attribute count")?;
        Ok(self.current.attributes.len())
    }

    pub fn attribute(&self, index: usize) -> Result<Option<&Attribute>, StreamError> {
        self.require_chunk_state("attribute")?;
        Ok(self.current.attributes.get(index))
    }

    /// Value of the attribute matching `local_name`, and the namespace
    /// when one is given.
    pub fn attribute_value(
        &self,
        namespace_uri: Option<&str>,
        local_name: &str,
    ) -> Result<Option<&str>, StreamError> {
        self.require_chunk_state("attribute value")?;
        let found = self.current.attributes.iter().find(|attr| {
            attr.local_name == local_name
                && (namespace_uri.is_none() || attr.namespace_uri.as_deref() == namespace_uri)
        });
        Ok(found.map(|attr| attr.value.as_str()))
    }

    fn require_chunk_state(&self, what: &str) -> Result<(), StreamError> {
        match self.state {
            StreamEvent::StartElement | StreamEvent::StartGroup | StreamEvent::Data => Ok(()),
            _ => Err(self.state_error(what)),
        }
    }

    fn state_error(&self, what: &str) -> StreamError {
        StreamError::with_detail(
            ErrorKind::InvalidState,
            format!("{} is not available in state '{}'", what, self.state),
        )
    }

    fn read_document_header(&mut self) -> Result<(), StreamError> {
        let document = self
            .format
            .read_document_header(&mut self.io, self.handler.as_mut())?;
        match document {
            Some(document) => {
                tracing::debug!(
                    format = document.short_type_name(),
                    size = document.size(),
                    "document header"
                );
                self.document = Some(document);
                Ok(())
            }
            None => {
                let err = StreamError::new(ErrorKind::InvalidStreamSignature)
                    .at(Location::at(self.io.position()));
                Err(self.handler.fatal(err))
            }
        }
    }

    fn read_lookahead(&mut self) -> Result<(), StreamError> {
        self.lookahead.reset();
        self.format
            .read_chunk_header(&mut self.io, &mut self.lookahead, self.handler.as_mut())?;
        tracing::trace!(
            id = %self.lookahead.id_label(),
            size = self.lookahead.size,
            "chunk header"
        );
        Ok(())
    }

    fn promote_lookahead(&mut self) {
        self.current = std::mem::replace(&mut self.lookahead, self.format.new_chunk());
    }

    fn enter_element(&mut self) -> Result<(), StreamError> {
        self.promote_lookahead();
        if self
            .filter
            .accept(&self.current, StreamEvent::StartElement, self.stack.len())
        {
            self.next_state = StreamEvent::Data;
        } else {
            let count = self.current.size + self.current.extra_size;
            self.format.skip_data(&mut self.io, count)?;
            self.data_left = 0;
            self.extra_left = 0;
            self.next_state = StreamEvent::EndElement;
        }
        Ok(())
    }

    fn enter_group(&mut self) -> Result<(), StreamError> {
        self.promote_lookahead();
        if self.stack.len() >= self.format.max_nesting() {
            let err = StreamError::with_detail(
                ErrorKind::InvalidNesting,
                format!("group '{}' exceeds nesting limit", self.current.id_label()),
            )
            .at(Location::at(self.io.position()));
            return Err(self.handler.fatal(err));
        }
        self.stack.push(self.current.clone());
        if self
            .filter
            .accept(&self.current, StreamEvent::StartGroup, self.stack.len())
        {
            // An empty group has nothing to look ahead at.
            let empty = match self.stack.last() {
                Some(group) => self.format.is_group_end(&mut self.io, &self.current, group)?,
                None => false,
            };
            if empty {
                self.next_state = StreamEvent::EndGroup;
            } else {
                self.read_lookahead()?;
                self.next_state = if self.lookahead.is_group() {
                    StreamEvent::StartGroup
                } else {
                    StreamEvent::StartElement
                };
            }
        } else {
            let count = self.current.size + self.current.extra_size;
            self.format.skip_data(&mut self.io, count)?;
            self.next_state = StreamEvent::EndGroup;
        }
        Ok(())
    }

    /// Decides what actually follows a closed chunk: another group
    /// close, the document end, or the next chunk header.
    fn resolve_after_close(&mut self) -> Result<StreamEvent, StreamError> {
        if self.format.max_nesting() > 0 {
            if let Some(group) = self.stack.last() {
                if self.format.is_group_end(&mut self.io, &self.current, group)? {
                    // Unwrap is fine, the stack was just peeked.
                    self.current = self.stack.pop().unwrap();
                    self.state = StreamEvent::EndGroup;
                    self.next_state = StreamEvent::EndGroup;
                    return Ok(self.state);
                }
            }
        }

        let at_end = {
            let document = self
                .document
                .as_ref()
                .ok_or_else(|| StreamError::new(ErrorKind::InvalidState))?;
            self.format
                .is_document_end(&mut self.io, document, &self.current)?
        };
        if at_end {
            self.state = StreamEvent::EndDocument;
            self.next_state = StreamEvent::EndDocument;
            self.verify_document_end()?;
            return Ok(self.state);
        }

        self.read_lookahead()?;
        if self.lookahead.is_group() {
            self.state = StreamEvent::StartGroup;
            self.next_state = StreamEvent::StartGroup;
            self.enter_group()?;
        } else {
            self.state = StreamEvent::StartElement;
            self.next_state = StreamEvent::StartElement;
            self.enter_element()?;
        }
        Ok(self.state)
    }

    fn verify_document_end(&mut self) -> Result<(), StreamError> {
        let open_groups = self.stack.len();
        let document = self
            .document
            .as_ref()
            .ok_or_else(|| StreamError::new(ErrorKind::InvalidState))?;
        self.format.verify_document_end(
            &mut self.io,
            document,
            open_groups,
            self.handler.as_mut(),
        )
    }
}
