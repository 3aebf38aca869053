//! The decoding state machine.
//!
//! [`Decoder`] is driven by a caller that knows the expected shapes: it enters a structure, asks
//! for element indices until there are none left, decodes each element, and leaves. Which key the
//! next index comes from is decided here.
//!
//! While an object is scanned in wire order, each key is resolved against the name table of the
//! nearest frame that is not itself flattened, then:
//!
//! - it belongs to the open frame: it is handed out directly;
//! - it belongs to a flattened element of the open frame: that element is handed out and the
//!   caller enters it in place, positioned at the same key;
//! - it belongs somewhere else below the inline root: its position is recorded and scanning goes
//!   on.
//!
//! When the inline root's closing bracket is reached the frames drain: every element that has not
//! been seen yet is looked up among the recorded positions in index order, flattened elements
//! that have anything below them are entered, and the rest are skipped, read as implicit `null`s,
//! or reported missing.

use std::sync::Arc;

use tracing::*;

use crate::codec::CodecState;
use crate::config::Config;
use crate::deferred::Slot;
use crate::descriptor::{DescriptorKind, EnumTable, SchemaDescriptor, MAX_INLINE_DEPTH};
use crate::error::{DecodeError, DecodeErrorKind, DecodeResult};
use crate::pool::Session;
use crate::reader::{Reader, ReaderOptions};
use crate::shape::{SchemaSet, ShapeId, ShapeKind};
use crate::span::Span;

/// The concrete subtype chosen for a polymorphic value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subtype {
    pub tag: String,
    pub shape: ShapeId,
    /// The subtype is not an object and its value sits under a `value` element.
    pub wrapped: bool,
}

/// A discriminator entry located ahead of decoding the object it belongs to.
#[derive(Debug)]
struct FoundDiscriminator {
    /// From the start of the key to the end of the value.
    span: Span,
    tag: Option<String>,
    tag_position: u32,
}

pub struct Decoder<'a> {
    state: &'a CodecState,
    reader: Reader<'a>,
    session: Session,
    /// Offset of the flattened element the caller is about to enter.
    pending_inline: Option<u32>,
    structures_entered: usize,
}

impl<'a> Decoder<'a> {
    pub(crate) fn new(state: &'a CodecState, input: &'a [u8]) -> DecodeResult<Self> {
        let reader = Reader::new(
            input,
            ReaderOptions {
                allow_comments: state.config.allow_comments,
                allow_trailing_comma: state.config.allow_trailing_comma,
            },
        )?;
        Ok(Decoder {
            state,
            reader,
            session: state.pool.acquire(),
            pending_inline: None,
            structures_entered: 0,
        })
    }

    pub fn schema(&self) -> &'a SchemaSet {
        &self.state.schema
    }

    pub fn config(&self) -> &'a Config {
        &self.state.config
    }

    /// Number of structures entered so far, flattened ones included.
    pub fn structures_entered(&self) -> usize {
        self.structures_entered
    }

    pub fn position(&self) -> u32 {
        self.reader.position()
    }

    /// Descriptor of the innermost open structure.
    pub fn current_descriptor(&self) -> Option<&Arc<SchemaDescriptor>> {
        self.session.stack.top().map(|f| &f.descriptor)
    }

    pub fn begin_structure(&mut self, shape: ShapeId) -> DecodeResult<()> {
        let result = self.begin_structure_impl(shape);
        result.map_err(|e| self.locate(e))
    }

    /// Enters a polymorphic value and reports which subtype it holds.
    ///
    /// Elements are then requested as for an object of the concrete subtype, or of a single
    /// `value` element when [`Subtype::wrapped`] is set.
    pub fn begin_polymorphic(&mut self, shape: ShapeId) -> DecodeResult<Subtype> {
        let result = self.begin_polymorphic_impl(shape);
        result.map_err(|e| self.locate(e))
    }

    /// Index of the next element to decode, `None` once the structure is exhausted.
    ///
    /// Lists yield consecutive indices. Maps yield even indices for keys and odd ones for values.
    pub fn next_element_index(&mut self) -> DecodeResult<Option<u32>> {
        let result = self.next_element_index_impl();
        result.map_err(|e| self.locate(e))
    }

    pub fn end_structure(&mut self) -> DecodeResult<()> {
        let result = self.end_structure_impl();
        result.map_err(|e| self.locate(e))
    }

    /// Shape of the element most recently handed out by [`next_element_index`].
    ///
    /// [`next_element_index`]: Self::next_element_index
    pub fn current_element_shape(&self) -> DecodeResult<ShapeId> {
        let frame = self.frame()?;
        let index = u32::try_from(frame.element_index)
            .map_err(|_| DecodeError::invalid_state("no element has been read yet"))?;
        match frame.descriptor.kind() {
            DescriptorKind::Object => frame
                .descriptor
                .element(index)
                .map(|m| m.shape)
                .ok_or_else(|| DecodeError::invalid_state("element index out of range")),
            _ => match &self.state.schema.shape(frame.descriptor.shape())?.kind {
                ShapeKind::List { item, .. } => Ok(*item),
                ShapeKind::Map { key, .. } if index & 1 == 0 => Ok(*key),
                ShapeKind::Map { value, .. } => Ok(*value),
                _ => Err(DecodeError::invalid_state("structure has no elements")),
            },
        }
    }

    pub fn decode_bool(&mut self) -> DecodeResult<bool> {
        let result = self.expect_value().and_then(|key| {
            if key {
                self.reader.read_quoted(|r| r.read_bool())
            } else {
                self.reader.read_bool()
            }
        });
        result.map_err(|e| self.locate(e))
    }

    pub fn decode_i64(&mut self) -> DecodeResult<i64> {
        let result = self.expect_value().and_then(|key| {
            if key {
                self.reader.read_quoted(|r| r.read_i64())
            } else {
                self.reader.read_i64()
            }
        });
        result.map_err(|e| self.locate(e))
    }

    pub fn decode_u64(&mut self) -> DecodeResult<u64> {
        let result = self.expect_value().and_then(|key| {
            if key {
                self.reader.read_quoted(|r| r.read_u64())
            } else {
                self.reader.read_u64()
            }
        });
        result.map_err(|e| self.locate(e))
    }

    pub fn decode_f64(&mut self) -> DecodeResult<f64> {
        let result = self.expect_value().and_then(|key| {
            if key {
                self.reader.read_quoted(|r| r.read_f64())
            } else {
                self.reader.read_f64()
            }
        });
        result.map_err(|e| self.locate(e))
    }

    pub fn decode_string(&mut self) -> DecodeResult<String> {
        let result = self
            .expect_value()
            .and_then(|_| self.reader.read_string().map(|s| s.into_owned()));
        result.map_err(|e| self.locate(e))
    }

    /// Reads an enum literal of `shape` and returns the variant index.
    pub fn decode_enum(&mut self, shape: ShapeId) -> DecodeResult<u32> {
        let result = self.decode_enum_impl(shape);
        result.map_err(|e| self.locate(e))
    }

    /// `false` when the next value is `null`, either literally or because it is absent and
    /// implicitly null.
    pub fn decode_not_null_mark(&mut self) -> DecodeResult<bool> {
        if self.pending_inline.is_some() {
            return Ok(true);
        }
        if self.session.stack.top().is_some_and(|f| f.decoding_null) {
            return Ok(false);
        }
        let position = self.reader.position();
        let result = self.reader.try_null();
        self.reader.set_position(position);
        result.map(|null| !null).map_err(|e| self.locate(e))
    }

    pub fn decode_null(&mut self) -> DecodeResult<()> {
        if let Some(frame) = self.session.stack.top_mut() {
            if frame.decoding_null {
                frame.decoding_null = false;
                return Ok(());
            }
        }
        let result = self.reader.read_null();
        result.map_err(|e| self.locate(e))
    }

    /// Skips the element most recently handed out.
    pub fn skip_element(&mut self) -> DecodeResult<()> {
        if self.pending_inline.is_some() {
            let shape = self.current_element_shape()?;
            self.begin_structure(shape)?;
            while self.next_element_index()?.is_some() {
                self.skip_element()?;
            }
            return self.end_structure();
        }
        if let Some(frame) = self.session.stack.top_mut() {
            if frame.decoding_null {
                frame.decoding_null = false;
                return Ok(());
            }
        }
        let result = self.reader.skip_value();
        result.map_err(|e| self.locate(e))
    }

    /// Decodes a map key that holds an encoded value of its own, using a second session.
    pub fn decode_structured_key<R>(
        &mut self,
        decode: impl FnOnce(&mut Decoder<'_>) -> DecodeResult<R>,
    ) -> DecodeResult<R> {
        let key = self.reader.skip_whitespace().and_then(|_| {
            let position = self.reader.position();
            self.reader.read_string().map(|key| (position, key))
        });
        let (position, key) = key.map_err(|e| self.locate(e))?;

        let result = Decoder::new(self.state, key.as_bytes()).and_then(|mut nested| {
            let value = decode(&mut nested)?;
            nested.finish()?;
            Ok(value)
        });
        result.map_err(|mut e| {
            e.span = Some(Span::point(position));
            e.path = None;
            self.locate(e)
        })
    }

    /// Checks that every structure was left and only whitespace remains.
    pub fn finish(&mut self) -> DecodeResult<()> {
        if !self.session.stack.is_empty() {
            let err = DecodeError::invalid_state("decoding finished inside a structure");
            return Err(self.locate(err));
        }
        let result = self.reader.expect_end();
        result.map_err(|e| self.locate(e))
    }

    /// Logical path of the value being decoded, e.g. `$.items[2].name`.
    ///
    /// Frames entered through flattening do not add a segment of their own: the key read by the
    /// flattened frame stands in for the element of its parent.
    pub fn current_path(&self) -> String {
        let mut out = String::from("$");
        let frames = self.session.stack.frames();
        for (i, frame) in frames.iter().enumerate() {
            if frames.get(i + 1).is_some_and(|next| next.inlined) {
                continue;
            }
            match frame.descriptor.kind() {
                DescriptorKind::List => {
                    if frame.element_index >= 0 {
                        out.push_str(&format!("[{}]", frame.element_index));
                    }
                }
                _ => {
                    if let Some(key_start) = frame.key_start {
                        let mut reader = self.reader.clone();
                        reader.set_position(key_start);
                        if let Ok(key) = reader.read_key() {
                            push_key_segment(&mut out, &key);
                        }
                    }
                }
            }
        }
        out
    }

    fn locate(&self, mut err: DecodeError) -> DecodeError {
        if err.span.is_none() {
            err.span = Some(Span::point(self.reader.position()));
        }
        err.with_path_if_missing(|| self.current_path())
    }

    fn frame(&self) -> DecodeResult<&crate::stack::Frame> {
        self.session
            .stack
            .top()
            .ok_or_else(|| DecodeError::invalid_state("no structure has been entered"))
    }

    fn frame_mut(&mut self) -> DecodeResult<&mut crate::stack::Frame> {
        self.session
            .stack
            .top_mut()
            .ok_or_else(|| DecodeError::invalid_state("no structure has been entered"))
    }

    fn descriptor(&mut self, shape: ShapeId) -> DecodeResult<Arc<SchemaDescriptor>> {
        if let Some(found) = self.session.descriptors.get(&shape) {
            return Ok(found.clone());
        }
        let built = self.state.cache.get_or_build(
            &self.state.schema,
            shape,
            &self.state.descriptor_config,
        )?;
        self.session.descriptors.insert(shape, built.clone());
        Ok(built)
    }

    /// Whether the top frame is an inline root or was entered through flattening.
    fn in_root_scope(&self) -> bool {
        let stack = &self.session.stack;
        stack.top().is_some_and(|f| {
            f.inlined
                || self
                    .session
                    .store
                    .top()
                    .is_some_and(|r| r.frame_index + 1 == stack.depth())
        })
    }

    /// Whether scanning of the current inline root has reached its closing bracket.
    fn root_drained(&self) -> bool {
        self.in_root_scope()
            && self
                .session
                .store
                .top()
                .is_some_and(|r| r.end_position.is_some())
    }

    /// Checks that a real value is next and reports whether it sits in a map key position.
    fn expect_value(&mut self) -> DecodeResult<bool> {
        match self.session.stack.top() {
            Some(f) if f.decoding_null => Err(DecodeError::invalid_state(
                "the element is absent and decodes as null",
            )),
            Some(f) => Ok(f.descriptor.kind() == DescriptorKind::Map
                && f.element_index >= 0
                && f.element_index & 1 == 0),
            None => Ok(false),
        }
    }

    /// Consumes the comma after an object entry. Anything but a comma or the closing brace is an
    /// error.
    fn skip_separator(&mut self) -> DecodeResult<()> {
        if !self.reader.try_skip_comma(b'}')? && !self.reader.next_is(b'}')? {
            return Err(self.reader.fail("expected `,` or `}`"));
        }
        Ok(())
    }

    fn begin_structure_impl(&mut self, shape: ShapeId) -> DecodeResult<()> {
        let descriptor = self.descriptor(shape)?;
        match descriptor.kind() {
            DescriptorKind::Object | DescriptorKind::List | DescriptorKind::Map => {}
            DescriptorKind::Polymorphic => {
                return Err(DecodeError::invalid_state(format!(
                    "`{}` is polymorphic and must be entered with `begin_polymorphic`",
                    descriptor.name()
                )))
            }
            DescriptorKind::Scalar(_) | DescriptorKind::Enum => {
                return Err(DecodeError::invalid_state(format!(
                    "`{}` is not a structure",
                    descriptor.name()
                )))
            }
        }

        if let Some(offset) = self.pending_inline.take() {
            self.session.stack.enter(descriptor, true, offset)?;
        } else {
            self.reader.skip_whitespace()?;
            let opening = descriptor.kind().opening_token();
            let has_inline = descriptor.has_inline_elements();
            self.session.stack.enter(descriptor.clone(), false, 0)?;
            if has_inline {
                let frame_index = self.session.stack.depth() - 1;
                self.session.store.enter(descriptor, frame_index, None)?;
            }
            if let Some(token) = opening {
                self.reader.expect_token(token)?;
            }
        }
        self.structures_entered += 1;
        Ok(())
    }

    fn begin_polymorphic_impl(&mut self, shape: ShapeId) -> DecodeResult<Subtype> {
        let state = self.state;
        let base = self.descriptor(shape)?;
        let Some(discriminator) = base.class_discriminator() else {
            return Err(DecodeError::invalid_state(format!(
                "`{}` is not polymorphic",
                base.name()
            )));
        };
        if self.pending_inline.is_some() {
            return Err(DecodeError::invalid_state(
                "polymorphic values can not be flattened",
            ));
        }

        self.reader.skip_whitespace()?;
        let object_start = self.reader.position();
        self.reader.expect_token(b'{')?;
        let found = self.find_discriminator(discriminator)?;
        self.reader.set_position(object_start);

        let tagged = found
            .as_ref()
            .and_then(|f| Some((f.tag.as_deref()?, f.tag_position)));
        let (tag, concrete) = match tagged {
            Some((tag, tag_position)) => {
                let concrete = state
                    .resolver
                    .resolve(&state.schema, shape, tag)
                    .map_err(|kind| DecodeError::at(kind, Span::point(tag_position)))?;
                (tag.to_string(), concrete)
            }
            None => {
                let concrete = state
                    .resolver
                    .default_subtype(&state.schema, shape)
                    .ok_or_else(|| {
                        DecodeError::at(
                            DecodeErrorKind::MissingDiscriminator {
                                base: base.name().to_string(),
                                discriminator: discriminator.to_string(),
                            },
                            Span::point(object_start),
                        )
                    })?;
                let tag = match state.resolver.tag_of(&state.schema, shape, concrete) {
                    Some(tag) => tag,
                    None => state.schema.shape(concrete)?.name.clone(),
                };
                (tag, concrete)
            }
        };

        let (descriptor, wrapped) = if state.schema.shape(concrete)?.is_object() {
            (self.descriptor(concrete)?, false)
        } else {
            let wrapper = base.value_wrapper_for(concrete).cloned().ok_or_else(|| {
                DecodeError::invalid_state(format!("no value wrapper for `{tag}`"))
            })?;
            (wrapper, true)
        };

        // A subtype that declares the discriminator as an element reads it like any other key.
        let materialized = descriptor
            .lookup_declared(discriminator)
            .is_some_and(|info| info.inline_site().is_none());
        let skip = match &found {
            Some(found) if !materialized => Some(found.span),
            _ => None,
        };

        let has_inline = descriptor.has_inline_elements();
        self.session.stack.enter(descriptor.clone(), false, 0)?;
        self.frame_mut()?.discriminator = skip;
        if has_inline {
            let frame_index = self.session.stack.depth() - 1;
            self.session.store.enter(descriptor, frame_index, skip)?;
        }
        self.reader.expect_token(b'{')?;
        self.structures_entered += 1;

        Ok(Subtype {
            tag,
            shape: concrete,
            wrapped,
        })
    }

    /// Looks for the discriminator among the keys of the object the reader is in, stopping at
    /// its first occurrence.
    fn find_discriminator(&mut self, name: &str) -> DecodeResult<Option<FoundDiscriminator>> {
        if self.reader.next_is(b'}')? {
            return Ok(None);
        }
        loop {
            self.reader.skip_whitespace()?;
            let key_start = self.reader.position();
            let key = self.reader.read_key()?;
            self.reader.expect_colon()?;
            if key == name {
                self.reader.skip_whitespace()?;
                let tag_position = self.reader.position();
                // A `null` tag counts as no tag at all.
                let tag = if self.reader.try_null()? {
                    None
                } else {
                    Some(self.reader.read_string()?.into_owned())
                };
                return Ok(Some(FoundDiscriminator {
                    span: Span::new(key_start, self.reader.position()),
                    tag,
                    tag_position,
                }));
            }
            self.reader.skip_value()?;
            if self.reader.try_skip_comma(b'}')? {
                if self.reader.next_is(b'}')? {
                    return Ok(None);
                }
                continue;
            }
            if self.reader.next_is(b'}')? {
                return Ok(None);
            }
            return Err(self.reader.fail_unexpected("`,` or `}`"));
        }
    }

    fn next_element_index_impl(&mut self) -> DecodeResult<Option<u32>> {
        let frame = self.frame_mut()?;
        frame.decoding_null = false;
        let kind = frame.descriptor.kind();
        let inlined = frame.inlined;
        let next = frame.element_index + 1;
        self.pending_inline = None;

        if self.root_drained() {
            return match kind {
                DescriptorKind::Map => {
                    self.frame_mut()?.element_index = next;
                    self.drained_map_index(next as u32)
                }
                _ => self.drained_property_index(),
            };
        }

        match kind {
            DescriptorKind::List => self.list_index(),
            DescriptorKind::Map if inlined => self.inlined_map_index(),
            DescriptorKind::Map => self.map_index(),
            _ => self.property_index(),
        }
    }

    fn list_index(&mut self) -> DecodeResult<Option<u32>> {
        let prev = self.frame()?.element_index;
        if prev >= 0 && !self.reader.try_skip_comma(b']')? {
            return Ok(None);
        }
        if self.reader.next_is(b']')? {
            return Ok(None);
        }
        self.frame_mut()?.element_index = prev + 1;
        Ok(Some((prev + 1) as u32))
    }

    fn map_index(&mut self) -> DecodeResult<Option<u32>> {
        let prev = self.frame()?.element_index;
        let index = prev + 1;
        if index & 1 == 1 {
            self.reader.expect_colon()?;
            self.frame_mut()?.element_index = index;
            return Ok(Some(index as u32));
        }

        self.frame_mut()?.key_start = None;
        if prev >= 0 && !self.reader.try_skip_comma(b'}')? {
            return Ok(None);
        }
        if self.reader.next_is(b'}')? {
            return Ok(None);
        }
        let key_start = self.reader.position();
        let frame = self.frame_mut()?;
        frame.element_index = index;
        frame.key_start = Some(key_start);
        Ok(Some(index as u32))
    }

    /// Scans keys in wire order for an object frame.
    fn property_index(&mut self) -> DecodeResult<Option<u32>> {
        let position_before_key = self.reader.position();
        let frame = self.frame_mut()?;
        let prev = frame.element_index;
        frame.element_index = -1;
        let descriptor = frame.descriptor.clone();
        let inlined = frame.inlined;
        let offset = frame.inline_offset;
        let own_discriminator = frame.discriminator;

        if prev >= 0 {
            self.skip_separator()?;
        }

        let in_root = self.in_root_scope();
        let root = match self.session.store.top() {
            Some(r) if in_root => Some((r.descriptor.clone(), r.discriminator)),
            _ => None,
        };
        // Flattening never changes which descriptor owns the name table.
        let lookup = match (&root, inlined) {
            (Some((root_descriptor, _)), true) => root_descriptor.clone(),
            _ => descriptor.clone(),
        };
        let discriminator = own_discriminator.or(root.as_ref().and_then(|r| r.1));

        loop {
            if self.reader.next_is(b'}')? {
                if in_root {
                    self.frame_mut()?.key_start = None;
                    let end = self.reader.position();
                    if let Some(root) = self.session.store.top_mut() {
                        root.end_position = Some(end);
                    }
                    return self.drained_property_index();
                }
                return self.missing_property_index();
            }

            let key_start = self.reader.position();
            if let Some(span) = discriminator.filter(|d| d.lo == key_start) {
                self.reader.set_position(span.hi);
                self.skip_separator()?;
                continue;
            }

            let key = self.reader.read_key()?;
            let key_span = Span::new(key_start, self.reader.position());
            self.reader.expect_colon()?;
            self.frame_mut()?.key_start = Some(key_start);

            let info = lookup.lookup(&key);
            let Some(absolute) = info.index() else {
                if !descriptor.ignore_unknown_keys() {
                    return Err(DecodeError::at(
                        DecodeErrorKind::UnknownKey {
                            key: key.into_owned(),
                            shape: lookup.shape(),
                        },
                        key_span,
                    ));
                }
                self.reader.skip_value()?;
                self.skip_separator()?;
                continue;
            };

            if self.frame()?.owns(absolute) {
                let index = absolute - offset;
                let fresh = self.session.stack.mark_present(index)
                    && (!in_root || self.session.store.consume(absolute));
                if !fresh {
                    return Err(duplicate_key(&key, key_span));
                }
                if self.state.config.coerce_input_values
                    && self.try_skip_or_coerce(&descriptor, index)?
                {
                    continue;
                }
                self.frame_mut()?.element_index = index as i32;
                return Ok(Some(index));
            }

            self.session.store.mark_parent_if_inline(info);

            let owned_site = match info.inline_site() {
                Some(site) if self.frame()?.owns(site) => Some(site),
                _ => None,
            };
            if let Some(site) = owned_site {
                // A direct flattened child: enter it right here, at this key.
                let index = site - offset;
                if !self.session.stack.mark_present(index) {
                    return Err(duplicate_key(&key, key_span));
                }
                self.pending_inline = Some(lookup.child_offset(site));
                self.reader.set_position(key_start);
                self.frame_mut()?.element_index = index as i32;
                return Ok(Some(index));
            }

            if inlined && self.session.stack.all_present() {
                // Nothing left for this flattened frame; let the parent read the key.
                self.reader.set_position(position_before_key);
                return Ok(None);
            }

            if Some(info) == lookup.inline_map_element() {
                self.session.store.add_map_key(key_start)?;
            } else if !self
                .session
                .store
                .defer(absolute, self.reader.position(), key_start)
            {
                return Err(duplicate_key(&key, key_span));
            }
            trace!(key = %key, absolute, "deferred");
            self.reader.skip_value()?;
            self.skip_separator()?;
        }
    }

    /// Resolves the elements of a plain object that were not present on the wire.
    fn missing_property_index(&mut self) -> DecodeResult<Option<u32>> {
        let explicit_nulls = self.state.config.explicit_nulls;
        let descriptor = self.frame()?.descriptor.clone();
        loop {
            let Some(index) = self.session.stack.take_next_missing_index() else {
                self.frame_mut()?.key_start = None;
                return Ok(None);
            };
            let Some(meta) = descriptor.element(index) else {
                continue;
            };
            if meta.optional {
                continue;
            }
            if meta.nullable && !explicit_nulls {
                let frame = self.frame_mut()?;
                frame.key_start = None;
                frame.element_index = index as i32;
                frame.decoding_null = true;
                return Ok(Some(index));
            }
            return Err(DecodeError::new(DecodeErrorKind::MissingField {
                field: meta.name.clone(),
            }));
        }
    }

    /// Resolves the remaining elements of a frame below a drained inline root.
    fn drained_property_index(&mut self) -> DecodeResult<Option<u32>> {
        let explicit_nulls = self.state.config.explicit_nulls;
        let coerce = self.state.config.coerce_input_values;
        let frame = self.frame()?;
        let descriptor = frame.descriptor.clone();
        let offset = frame.inline_offset;
        let root_descriptor = self
            .session
            .store
            .top()
            .map(|r| r.descriptor.clone())
            .ok_or_else(|| DecodeError::invalid_state("no inline root"))?;

        loop {
            let Some(index) = self.session.stack.take_next_missing_index() else {
                self.frame_mut()?.key_start = None;
                return Ok(None);
            };
            let absolute = offset + index;
            let Some(meta) = descriptor.element(index) else {
                continue;
            };
            self.frame_mut()?.element_index = index as i32;

            match self.session.store.slot(absolute) {
                Slot::Inline => {
                    self.pending_inline = Some(root_descriptor.child_offset(absolute));
                    return Ok(Some(index));
                }
                Slot::At { value, key } => {
                    trace!(absolute, value, "replaying deferred element");
                    self.reader.set_position(value);
                    self.frame_mut()?.key_start = Some(key);
                    if coerce && self.try_skip_or_coerce(&descriptor, index)? {
                        continue;
                    }
                    return Ok(Some(index));
                }
                Slot::Empty | Slot::Consumed => {
                    self.frame_mut()?.key_start = None;
                    let child = root_descriptor.child_offset(absolute);
                    if child != 0 && self.any_element_in_subtree(&root_descriptor, absolute) {
                        self.pending_inline = Some(child);
                        return Ok(Some(index));
                    }

                    let implicit_null = !meta.optional && meta.nullable && !explicit_nulls;
                    if child != 0 && !implicit_null && !meta.optional {
                        // Required and flattened: entered even though nothing of it is present.
                        self.pending_inline = Some(child);
                        return Ok(Some(index));
                    }
                    if implicit_null {
                        self.frame_mut()?.decoding_null = true;
                        return Ok(Some(index));
                    }
                    if meta.optional {
                        continue;
                    }
                    return Err(DecodeError::new(DecodeErrorKind::MissingField {
                        field: meta.name.clone(),
                    }));
                }
            }
        }
    }

    /// Whether anything below the flattened element `site` was recorded. Flattened elements on
    /// the way to the first hit are marked, so that draining enters them too.
    fn any_element_in_subtree(&mut self, root: &SchemaDescriptor, site: u32) -> bool {
        let Session { scan, store, .. } = &mut self.session;
        scan.clear();
        let start = root.child_offset(site);
        let count = root.element(site).map_or(0, |m| m.child_count);
        scan.push((site, start, start + count));

        while let Some(top) = scan.last_mut() {
            if top.1 >= top.2 {
                scan.pop();
                continue;
            }
            let child = top.1;
            top.1 += 1;

            if store.slot(child) != Slot::Empty {
                for &(nested, _, _) in &scan[1..] {
                    store.mark_inline(nested);
                }
                return true;
            }

            let next = root.child_offset(child);
            if next != 0 && scan.len() <= MAX_INLINE_DEPTH as usize {
                let count = root.element(child).map_or(0, |m| m.child_count);
                scan.push((child, next, next + count));
            }
        }
        false
    }

    /// Scans keys in wire order for a flattened map, deferring the keys of everything else.
    fn inlined_map_index(&mut self) -> DecodeResult<Option<u32>> {
        let prev = self.frame()?.element_index;
        let index = prev + 1;
        self.frame_mut()?.element_index = index;
        if index & 1 == 1 {
            self.reader.expect_colon()?;
            return Ok(Some(index as u32));
        }

        let (root_descriptor, discriminator) = self
            .session
            .store
            .top()
            .map(|r| (r.descriptor.clone(), r.discriminator))
            .ok_or_else(|| DecodeError::invalid_state("no inline root"))?;
        let map_info = root_descriptor.inline_map_element();
        let coerce = self.state.config.coerce_input_values;

        let mut expect_comma = prev >= 0;
        loop {
            if expect_comma
                && !self.reader.try_skip_comma(b'}')?
                && !self.reader.next_is(b'}')?
            {
                return Err(self.reader.fail("expected `,` or `}`"));
            }
            if self.reader.next_is(b'}')? {
                break;
            }
            expect_comma = true;

            let key_start = self.reader.position();
            if let Some(span) = discriminator.filter(|d| d.lo == key_start) {
                self.reader.set_position(span.hi);
                continue;
            }

            let key = self.reader.read_key()?;
            let key_span = Span::new(key_start, self.reader.position());
            self.reader.expect_colon()?;

            let info = root_descriptor.lookup(&key);
            if Some(info) == map_info {
                self.frame_mut()?.key_start = Some(key_start);
                if coerce && self.try_skip_map_value(false)? {
                    continue;
                }
                self.reader.set_position(key_start);
                return Ok(Some(index as u32));
            }

            let Some(absolute) = info.index() else {
                return Err(DecodeError::at(
                    DecodeErrorKind::UnknownKey {
                        key: key.into_owned(),
                        shape: root_descriptor.shape(),
                    },
                    key_span,
                ));
            };
            self.session.store.mark_parent_if_inline(info);
            if !self
                .session
                .store
                .defer(absolute, self.reader.position(), key_start)
            {
                return Err(duplicate_key(&key, key_span));
            }
            self.reader.skip_value()?;
        }

        let end = self.reader.position();
        if let Some(root) = self.session.store.top_mut() {
            root.end_position = Some(end);
        }
        self.drained_map_index(index as u32)
    }

    /// Replays the recorded keys of a flattened map in wire order.
    fn drained_map_index(&mut self, index: u32) -> DecodeResult<Option<u32>> {
        if index & 1 == 1 {
            self.reader.expect_colon()?;
            return Ok(Some(index));
        }
        let coerce = self.state.config.coerce_input_values;
        loop {
            let Some(key_start) = self.session.store.next_map_key() else {
                self.frame_mut()?.key_start = None;
                return Ok(None);
            };
            self.reader.set_position(key_start);
            self.frame_mut()?.key_start = Some(key_start);
            if coerce && self.try_skip_map_value(true)? {
                continue;
            }
            return Ok(Some(index));
        }
    }

    /// With coercion enabled, an optional element whose value is `null` for a non-nullable
    /// target, or an unknown enum literal, is treated as absent. A required nullable enum with an
    /// unknown literal becomes `null` when nulls are not explicit.
    fn try_skip_or_coerce(
        &mut self,
        descriptor: &SchemaDescriptor,
        index: u32,
    ) -> DecodeResult<bool> {
        let Some(meta) = descriptor.element(index) else {
            return Ok(false);
        };
        if meta.optional {
            return self.try_skip_optional(meta.nullable, meta.enum_table.as_deref(), true);
        }
        if !self.state.config.explicit_nulls && meta.nullable {
            if let Some(table) = &meta.enum_table {
                self.try_nullify_invalid_enum(table)?;
            }
        }
        Ok(false)
    }

    fn try_skip_optional(
        &mut self,
        nullable: bool,
        enum_table: Option<&EnumTable>,
        skip_comma: bool,
    ) -> DecodeResult<bool> {
        let position = self.reader.position();
        let skipped = if self.reader.try_null()? {
            !nullable
        } else if let Some(table) = enum_table {
            self.reader.next_is(b'"')? && table.find(&self.reader.read_string()?).is_none()
        } else {
            false
        };

        if skipped {
            if skip_comma {
                self.skip_separator()?;
            }
            return Ok(true);
        }
        self.reader.set_position(position);
        Ok(false)
    }

    fn try_nullify_invalid_enum(&mut self, table: &EnumTable) -> DecodeResult<()> {
        if !self.reader.next_is(b'"')? {
            return Ok(());
        }
        let position = self.reader.position();
        let literal = self.reader.read_string()?;
        if table.find(&literal).is_none() {
            self.frame_mut()?.decoding_null = true;
        } else {
            self.reader.set_position(position);
        }
        Ok(())
    }

    /// Skips an entry of a flattened enum-valued map whose value can not be decoded.
    fn try_skip_map_value(&mut self, skip_key: bool) -> DecodeResult<bool> {
        let shape = self.frame()?.descriptor.shape();
        let ShapeKind::Map {
            value,
            value_nullable,
            ..
        } = self.state.schema.shape(shape)?.kind
        else {
            return Ok(false);
        };
        let value_descriptor = self.descriptor(value)?;
        let Some(table) = value_descriptor.enum_table() else {
            return Ok(false);
        };

        let position = self.reader.position();
        if skip_key {
            self.reader.read_key()?;
            self.reader.expect_colon()?;
        }
        if self.try_skip_optional(value_nullable, Some(table.as_ref()), false)? {
            return Ok(true);
        }
        self.reader.set_position(position);
        Ok(false)
    }

    fn decode_enum_impl(&mut self, shape: ShapeId) -> DecodeResult<u32> {
        self.expect_value()?;
        let descriptor = self.descriptor(shape)?;
        let table = descriptor.enum_table().ok_or_else(|| {
            DecodeError::invalid_state(format!("`{}` is not an enum", descriptor.name()))
        })?;
        self.reader.skip_whitespace()?;
        let start = self.reader.position();
        let literal = self.reader.read_string()?;
        table.find(&literal).ok_or_else(|| {
            DecodeError::at(
                DecodeErrorKind::UnknownEnumVariant {
                    shape: descriptor.name().to_string(),
                    variant: literal.into_owned(),
                },
                Span::new(start, self.reader.position()),
            )
        })
    }

    fn end_structure_impl(&mut self) -> DecodeResult<()> {
        let frame = self.frame()?;
        let inlined = frame.inlined;
        let descriptor = frame.descriptor.clone();
        let closing = descriptor.kind().closing_token();

        if !inlined {
            let depth = self.session.stack.depth();
            let is_root = self
                .session
                .store
                .top()
                .is_some_and(|r| r.frame_index + 1 == depth);
            if is_root {
                if let Some(end) = self.session.store.top().and_then(|r| r.end_position) {
                    self.reader.set_position(end);
                }
                self.session.store.leave(&descriptor)?;
            }
            if let Some(token) = closing {
                self.reader.expect_token(token)?;
            }
        }

        self.pending_inline = None;
        self.session.stack.leave(&descriptor)?;
        Ok(())
    }
}

impl Drop for Decoder<'_> {
    fn drop(&mut self) {
        self.state.pool.release(std::mem::take(&mut self.session));
    }
}

fn duplicate_key(key: &str, span: Span) -> DecodeError {
    DecodeError::at(
        DecodeErrorKind::DuplicateKey {
            key: key.to_string(),
        },
        span,
    )
}

fn push_key_segment(out: &mut String, key: &str) {
    if key.is_empty() {
        return;
    }
    let bracketed = key.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '?')
        || key.chars().any(|c| {
            matches!(c, '.' | '\'' | '@' | '*' | '[' | ']' | '"' | '\\')
                || c.is_whitespace()
                || c.is_control()
        });
    if !bracketed {
        out.push('.');
        out.push_str(key);
        return;
    }
    out.push_str("['");
    for c in key.chars() {
        if c == '\'' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push_str("']");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_segments() {
        let mut out = String::from("$");
        push_key_segment(&mut out, "plain");
        push_key_segment(&mut out, "42");
        push_key_segment(&mut out, "a.b");
        push_key_segment(&mut out, "it's");
        push_key_segment(&mut out, "");
        assert_eq!(out, r"$.plain['42']['a.b']['it\'s']");
    }
}
