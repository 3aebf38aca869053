//! The decode frame stack.
//!
//! One frame exists per structure that was actually entered. Frames are plain structs in a
//! growable arena; their presence bits live in one shared word vector so entering and leaving a
//! frame never allocates once the arena has warmed up.

use std::sync::Arc;

use crate::descriptor::SchemaDescriptor;
use crate::error::{DecodeError, DecodeErrorKind, DecodeResult};
use crate::span::Span;

const WORD_BITS: usize = u64::BITS as usize;

#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub descriptor: Arc<SchemaDescriptor>,
    /// Last element handed to the caller, -1 before the first one.
    pub element_index: i32,
    /// Where the key of the current element starts.
    pub key_start: Option<u32>,
    /// Entered through a flattened element: there are no brackets of its own.
    pub inlined: bool,
    /// Absolute index of this frame's first element within its inline root.
    pub inline_offset: u32,
    /// The current element is absent and must be decoded as `null`.
    pub decoding_null: bool,
    /// Key start to value end of a discriminator that scanning must step over.
    pub discriminator: Option<Span>,
    bits_start: usize,
    bits_words: usize,
}

impl Frame {
    pub fn element_count(&self) -> u32 {
        self.descriptor.element_count()
    }

    /// Whether `absolute` is one of this frame's own elements.
    pub fn owns(&self, absolute: u32) -> bool {
        absolute >= self.inline_offset && absolute < self.inline_offset + self.element_count()
    }
}

#[derive(Debug)]
pub(crate) struct DecodeStack {
    frames: Vec<Frame>,
    bits: Vec<u64>,
    max_depth: usize,
}

impl DecodeStack {
    pub fn new(max_depth: usize) -> Self {
        DecodeStack {
            frames: Vec::with_capacity(8),
            bits: Vec::with_capacity(8),
            max_depth,
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn enter(
        &mut self,
        descriptor: Arc<SchemaDescriptor>,
        inlined: bool,
        inline_offset: u32,
    ) -> DecodeResult<()> {
        if self.frames.len() >= self.max_depth {
            return Err(DecodeError::new(DecodeErrorKind::MaxDepthExceeded {
                max: self.max_depth,
            }));
        }
        let bits_words = (descriptor.element_count() as usize).div_ceil(WORD_BITS);
        let bits_start = self.bits.len();
        self.bits.resize(bits_start + bits_words, 0);
        self.frames.push(Frame {
            descriptor,
            element_index: -1,
            key_start: None,
            inlined,
            inline_offset,
            decoding_null: false,
            discriminator: None,
            bits_start,
            bits_words,
        });
        Ok(())
    }

    /// Pops the top frame, which must have been entered for `descriptor`.
    pub fn leave(&mut self, descriptor: &Arc<SchemaDescriptor>) -> DecodeResult<Frame> {
        let Some(top) = self.frames.last() else {
            return Err(DecodeError::invalid_state("no structure to leave"));
        };
        if !Arc::ptr_eq(&top.descriptor, descriptor) {
            return Err(DecodeError::invalid_state(format!(
                "leaving `{}` while `{}` is open",
                descriptor.name(),
                top.descriptor.name()
            )));
        }
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| DecodeError::invalid_state("no structure to leave"))?;
        self.bits.truncate(frame.bits_start);
        Ok(frame)
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.bits.clear();
    }

    pub fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    fn top_bits(&mut self) -> &mut [u64] {
        match self.frames.last() {
            Some(f) => &mut self.bits[f.bits_start..f.bits_start + f.bits_words],
            None => &mut [],
        }
    }

    /// Sets the presence bit of a direct element, returning `false` if it was already set.
    pub fn mark_present(&mut self, index: u32) -> bool {
        let (word, bit) = (index as usize / WORD_BITS, index as usize % WORD_BITS);
        let Some(w) = self.top_bits().get_mut(word) else {
            return false;
        };
        let mask = 1u64 << bit;
        let fresh = *w & mask == 0;
        *w |= mask;
        fresh
    }

    /// Lowest direct element of the top frame whose bit is unset.
    pub fn next_missing_index(&self) -> Option<u32> {
        let f = self.frames.last()?;
        let count = f.element_count() as usize;
        for (w, word) in self.bits[f.bits_start..f.bits_start + f.bits_words]
            .iter()
            .enumerate()
        {
            if *word != u64::MAX {
                let index = w * WORD_BITS + (!*word).trailing_zeros() as usize;
                return (index < count).then_some(index as u32);
            }
        }
        None
    }

    /// Like [`next_missing_index`](Self::next_missing_index), and marks the element present.
    pub fn take_next_missing_index(&mut self) -> Option<u32> {
        let index = self.next_missing_index()?;
        self.mark_present(index);
        Some(index)
    }

    pub fn all_present(&self) -> bool {
        self.next_missing_index().is_none()
    }
}
