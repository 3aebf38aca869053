//! The deferred position store ("inline root stack").
//!
//! Every frame that owns flattened descendants opens an inline root here. While its subtree is
//! decoded, keys that belong to elements whose frame is not open yet are recorded by absolute
//! index, and the keys of a flattened map are recorded in wire order. Both are replayed once the
//! root's closing bracket has been seen.

use std::sync::Arc;

use crate::descriptor::SchemaDescriptor;
use crate::element_info::ElementInfo;
use crate::error::{DecodeError, DecodeErrorKind, DecodeResult};
use crate::span::Span;

/// What is known about one absolute element of an inline root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum Slot {
    #[default]
    Empty,
    /// A flattened element with at least one key present somewhere below it.
    Inline,
    /// A deferred key: where its value starts and where the key starts.
    At { value: u32, key: u32 },
    /// Already consumed straight from the wire.
    Consumed,
}

#[derive(Debug)]
pub(crate) struct InlineRoot {
    pub descriptor: Arc<SchemaDescriptor>,
    /// Index of the root's frame in the decode stack.
    pub frame_index: usize,
    /// Position of the root's closing bracket once scanning has reached it.
    pub end_position: Option<u32>,
    pub discriminator: Option<Span>,
    slots_start: usize,
    map_keys_start: usize,
    map_keys_read: usize,
}

#[derive(Debug)]
pub(crate) struct DeferredStore {
    roots: Vec<InlineRoot>,
    slots: Vec<Slot>,
    map_keys: Vec<u32>,
    max_slots: usize,
}

impl DeferredStore {
    pub fn new(max_slots: usize) -> Self {
        DeferredStore {
            roots: Vec::new(),
            slots: Vec::new(),
            map_keys: Vec::new(),
            max_slots,
        }
    }

    pub fn enter(
        &mut self,
        descriptor: Arc<SchemaDescriptor>,
        frame_index: usize,
        discriminator: Option<Span>,
    ) -> DecodeResult<()> {
        let slots_start = self.slots.len();
        let needed = slots_start + descriptor.total_element_count() as usize;
        if needed + self.map_keys.len() > self.max_slots {
            return Err(DecodeError::new(
                DecodeErrorKind::MaxBufferedElementsExceeded {
                    limit: self.max_slots,
                },
            ));
        }
        self.slots.resize(needed, Slot::Empty);
        self.roots.push(InlineRoot {
            descriptor,
            frame_index,
            end_position: None,
            discriminator,
            slots_start,
            map_keys_start: self.map_keys.len(),
            map_keys_read: self.map_keys.len(),
        });
        Ok(())
    }

    /// Pops the innermost inline root, which must have been opened for `descriptor`.
    pub fn leave(&mut self, descriptor: &Arc<SchemaDescriptor>) -> DecodeResult<InlineRoot> {
        match self.roots.last() {
            Some(top) if Arc::ptr_eq(&top.descriptor, descriptor) => {}
            Some(top) => {
                return Err(DecodeError::invalid_state(format!(
                    "closing inline root `{}` while `{}` is open",
                    descriptor.name(),
                    top.descriptor.name()
                )))
            }
            None => return Err(DecodeError::invalid_state("no inline root to close")),
        }
        let root = self
            .roots
            .pop()
            .ok_or_else(|| DecodeError::invalid_state("no inline root to close"))?;
        self.slots.truncate(root.slots_start);
        self.map_keys.truncate(root.map_keys_start);
        Ok(root)
    }

    pub fn clear(&mut self) {
        self.roots.clear();
        self.slots.clear();
        self.map_keys.clear();
    }

    pub fn top(&self) -> Option<&InlineRoot> {
        self.roots.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut InlineRoot> {
        self.roots.last_mut()
    }

    fn slot_mut(&mut self, absolute: u32) -> Option<&mut Slot> {
        let start = self.roots.last()?.slots_start;
        self.slots.get_mut(start + absolute as usize)
    }

    pub fn slot(&self, absolute: u32) -> Slot {
        self.roots
            .last()
            .and_then(|r| self.slots.get(r.slots_start + absolute as usize))
            .copied()
            .unwrap_or_default()
    }

    pub fn mark_inline(&mut self, absolute: u32) {
        if let Some(slot) = self.slot_mut(absolute) {
            if *slot == Slot::Empty {
                *slot = Slot::Inline;
            }
        }
    }

    /// Records that the flattened ancestor of `info` has something to decode.
    pub fn mark_parent_if_inline(&mut self, info: ElementInfo) {
        if let Some(site) = info.inline_site() {
            self.mark_inline(site);
        }
    }

    /// Remembers where the value of `absolute` is. Returns `false` if the element was already
    /// seen.
    pub fn defer(&mut self, absolute: u32, value: u32, key: u32) -> bool {
        match self.slot_mut(absolute) {
            Some(slot @ (Slot::Empty | Slot::Inline)) => {
                *slot = Slot::At { value, key };
                true
            }
            Some(_) => false,
            None => true,
        }
    }

    /// Records a direct read of `absolute`. Returns `false` if a deferred occurrence exists.
    pub fn consume(&mut self, absolute: u32) -> bool {
        match self.slot_mut(absolute) {
            Some(slot @ Slot::Empty) => {
                *slot = Slot::Consumed;
                true
            }
            Some(Slot::At { .. } | Slot::Consumed) => false,
            _ => true,
        }
    }

    /// Records the key position of a flattened map entry. Map keys share the slot budget.
    pub fn add_map_key(&mut self, key: u32) -> DecodeResult<()> {
        if self.roots.is_empty() {
            return Ok(());
        }
        if self.slots.len() + self.map_keys.len() >= self.max_slots {
            return Err(DecodeError::new(
                DecodeErrorKind::MaxBufferedElementsExceeded {
                    limit: self.max_slots,
                },
            ));
        }
        self.map_keys.push(key);
        Ok(())
    }

    /// Next recorded map key in wire order.
    pub fn next_map_key(&mut self) -> Option<u32> {
        let root = self.roots.last_mut()?;
        let key = self.map_keys.get(root.map_keys_read).copied()?;
        root.map_keys_read += 1;
        Some(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DescriptorConfig;
    use crate::shape::{Element, ScalarKind, SchemaBuilder, ShapeKind};

    fn descriptor() -> Arc<SchemaDescriptor> {
        let mut b = SchemaBuilder::new();
        let int = b.scalar(ScalarKind::Int);
        let inner = b
            .add(
                "Inner",
                ShapeKind::Object {
                    elements: vec![Element::new("c", int), Element::new("d", int)],
                },
            )
            .unwrap();
        let outer = b
            .add(
                "Outer",
                ShapeKind::Object {
                    elements: vec![Element::new("a", int), Element::new("b", inner).flatten()],
                },
            )
            .unwrap();
        let schema = b.build().unwrap();
        Arc::new(
            SchemaDescriptor::build(&schema, outer, &DescriptorConfig::default(), &mut |_| {
                unreachable!()
            })
            .unwrap(),
        )
    }

    #[test]
    fn duplicate_detection_through_slots() {
        let mut store = DeferredStore::new(100);
        store.enter(descriptor(), 0, None).unwrap();

        assert!(store.defer(2, 10, 5));
        assert!(!store.defer(2, 20, 15));
        assert!(!store.consume(2));

        assert!(store.consume(0));
        assert!(!store.defer(0, 30, 25));
        assert_eq!(store.slot(2), Slot::At { value: 10, key: 5 });
    }

    #[test]
    fn inline_marks_parent_site() {
        let mut store = DeferredStore::new(100);
        store.enter(descriptor(), 0, None).unwrap();
        store.mark_parent_if_inline(ElementInfo::new(3, Some(1)));
        assert_eq!(store.slot(1), Slot::Inline);
        store.mark_parent_if_inline(ElementInfo::new(0, None));
        assert_eq!(store.slot(0), Slot::Empty);
    }

    #[test]
    fn nested_roots_are_isolated() {
        let mut store = DeferredStore::new(100);
        store.enter(descriptor(), 0, None).unwrap();
        store.defer(3, 1, 1);
        store.add_map_key(7).unwrap();

        let inner = descriptor();
        store.enter(inner.clone(), 4, None).unwrap();
        assert_eq!(store.slot(3), Slot::Empty);
        assert_eq!(store.next_map_key(), None);
        store.add_map_key(9).unwrap();
        store.add_map_key(11).unwrap();
        assert_eq!(store.next_map_key(), Some(9));
        assert_eq!(store.next_map_key(), Some(11));
        assert_eq!(store.next_map_key(), None);
        store.leave(&inner).unwrap();

        assert_eq!(store.slot(3), Slot::At { value: 1, key: 1 });
        assert_eq!(store.next_map_key(), Some(7));
    }

    #[test]
    fn leaving_checks_the_descriptor() {
        let mut store = DeferredStore::new(100);
        let (outer, inner) = (descriptor(), descriptor());
        store.enter(outer.clone(), 0, None).unwrap();
        store.enter(inner.clone(), 1, None).unwrap();

        let err = store.leave(&outer).unwrap_err();
        assert!(matches!(err.kind, DecodeErrorKind::InvalidState { .. }));
        assert_eq!(store.top().map(|r| r.frame_index), Some(1));

        store.leave(&inner).unwrap();
        store.leave(&outer).unwrap();
        assert!(store.leave(&outer).is_err());
    }

    #[test]
    fn map_keys_count_against_the_bound() {
        // Four slots for `Outer` and `Inner`, one left for a map key.
        let mut store = DeferredStore::new(5);
        store.enter(descriptor(), 0, None).unwrap();
        store.add_map_key(1).unwrap();
        let err = store.add_map_key(2).unwrap_err();
        assert_eq!(
            err.kind,
            DecodeErrorKind::MaxBufferedElementsExceeded { limit: 5 }
        );
    }

    #[test]
    fn capacity_is_bounded() {
        let mut store = DeferredStore::new(6);
        store.enter(descriptor(), 0, None).unwrap();
        let err = store.enter(descriptor(), 1, None).unwrap_err();
        assert_eq!(
            err.kind,
            DecodeErrorKind::MaxBufferedElementsExceeded { limit: 6 }
        );
    }
}
