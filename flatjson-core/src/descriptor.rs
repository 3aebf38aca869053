//! Precomputed per-shape metadata used by the decoder.
//!
//! A [`SchemaDescriptor`] flattens the element tree of an object shape into one absolute index
//! space. The shape's own elements come first, followed by the children of each flattened
//! element (recursively, depth-first), so every flattened subtree occupies a contiguous range:
//!
//! ```text
//! Outer { a, #[flatten] b: Inner { c, #[flatten] e: Deep { f } }, g }
//!
//!   0: a   1: b   2: g   | 3: c   4: e | 5: f
//!   inline offsets: b -> 3, e -> 5
//! ```
//!
//! The name table maps every reachable wire spelling to the absolute index and to the flattened
//! ancestor ("inline site") that introduced it.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::*;

use crate::config::DescriptorConfig;
use crate::element_info::ElementInfo;
use crate::error::SchemaError;
use crate::shape::{ScalarKind, SchemaSet, ShapeId, ShapeKind};

/// Deepest allowed chain of flattened elements.
pub const MAX_INLINE_DEPTH: u32 = 63;

/// Absolute indices are stored as `u16` in the inline offset table.
pub const MAX_TOTAL_ELEMENTS: usize = u16::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    Scalar(ScalarKind),
    Enum,
    Object,
    List,
    Map,
    Polymorphic,
}

impl DescriptorKind {
    pub fn opening_token(self) -> Option<u8> {
        match self {
            DescriptorKind::Object | DescriptorKind::Map | DescriptorKind::Polymorphic => Some(b'{'),
            DescriptorKind::List => Some(b'['),
            DescriptorKind::Scalar(_) | DescriptorKind::Enum => None,
        }
    }

    pub fn closing_token(self) -> Option<u8> {
        self.opening_token().map(|t| if t == b'{' { b'}' } else { b']' })
    }
}

/// Variant spellings of an enum shape.
#[derive(Debug)]
pub struct EnumTable {
    variants: Vec<String>,
    lookup: FxHashMap<String, u32>,
    case_insensitive: bool,
}

impl EnumTable {
    fn new(variants: &[String], case_insensitive: bool) -> Self {
        let lookup = variants
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let key = if case_insensitive {
                    v.to_ascii_lowercase()
                } else {
                    v.clone()
                };
                (key, i as u32)
            })
            .collect();
        EnumTable {
            variants: variants.to_vec(),
            lookup,
            case_insensitive,
        }
    }

    pub fn find(&self, name: &str) -> Option<u32> {
        if self.case_insensitive {
            self.lookup.get(&name.to_ascii_lowercase()).copied()
        } else {
            self.lookup.get(name).copied()
        }
    }

    pub fn variant(&self, index: u32) -> Option<&str> {
        self.variants.get(index as usize).map(String::as_str)
    }

    pub fn variants(&self) -> &[String] {
        &self.variants
    }
}

/// Everything the decoder needs to know about one absolute element.
#[derive(Debug, Clone)]
pub struct ElementMeta {
    /// Primary wire spelling, after the naming strategy is applied.
    pub name: String,
    pub shape: ShapeId,
    pub optional: bool,
    pub nullable: bool,
    pub flatten: bool,
    /// Number of direct children when this is a flattened object.
    pub child_count: u32,
    /// The flattened ancestor this element is reached through.
    pub inline_site: Option<u32>,
    pub enum_table: Option<Arc<EnumTable>>,
    /// Placeholder slot standing for the entries of a flattened map.
    pub map_entries: bool,
}

#[derive(Debug)]
pub struct SchemaDescriptor {
    shape: ShapeId,
    name: String,
    kind: DescriptorKind,
    element_count: u32,
    total_element_count: u32,
    names: FxHashMap<Box<str>, ElementInfo>,
    /// Indexed by absolute element index; empty when nothing is flattened.
    inline_offsets: Vec<u16>,
    elements: Vec<ElementMeta>,
    inline_map_element: Option<ElementInfo>,
    class_discriminator: Option<String>,
    ignore_unknown_keys: bool,
    enum_table: Option<Arc<EnumTable>>,
    /// Wrappers for polymorphic subtypes that are not objects, keyed by subtype.
    value_wrappers: FxHashMap<ShapeId, Arc<SchemaDescriptor>>,
}

impl SchemaDescriptor {
    /// Builds the descriptor of `shape`.
    ///
    /// `resolve` is consulted for the descriptors of polymorphic subtypes; it is expected to go
    /// through a [`DescriptorCache`](crate::DescriptorCache).
    pub fn build(
        schema: &SchemaSet,
        shape: ShapeId,
        config: &DescriptorConfig,
        resolve: &mut dyn FnMut(ShapeId) -> Result<Arc<SchemaDescriptor>, SchemaError>,
    ) -> Result<SchemaDescriptor, SchemaError> {
        let s = schema.shape(shape)?;
        debug!(shape = %s.name, "building descriptor");

        let mut desc = SchemaDescriptor {
            shape,
            name: s.name.clone(),
            kind: DescriptorKind::Object,
            element_count: 0,
            total_element_count: 0,
            names: FxHashMap::default(),
            inline_offsets: Vec::new(),
            elements: Vec::new(),
            inline_map_element: None,
            class_discriminator: None,
            ignore_unknown_keys: config.ignore_unknown_keys,
            enum_table: None,
            value_wrappers: FxHashMap::default(),
        };

        match &s.kind {
            ShapeKind::Scalar(kind) => desc.kind = DescriptorKind::Scalar(*kind),
            ShapeKind::List { .. } => desc.kind = DescriptorKind::List,
            ShapeKind::Map { .. } => desc.kind = DescriptorKind::Map,
            ShapeKind::Enum { variants } => {
                desc.kind = DescriptorKind::Enum;
                desc.enum_table = Some(Arc::new(EnumTable::new(
                    variants,
                    config.decode_enums_case_insensitive,
                )));
            }
            ShapeKind::Object { .. } => {
                let mut layout = Layout::default();
                let mut path = vec![shape];
                let total = layout.scan(schema, config, shape, None, 0, 0, &mut path)?;
                if total as usize > MAX_TOTAL_ELEMENTS {
                    return Err(SchemaError::TooManyElements {
                        shape: s.name.clone(),
                        count: total as usize,
                        max: MAX_TOTAL_ELEMENTS,
                    });
                }
                desc.element_count = s.elements().len() as u32;
                desc.total_element_count = total;
                desc.names = layout.names;
                desc.inline_map_element = layout.inline_map;
                if layout.has_inline {
                    desc.inline_offsets = layout.offsets;
                }
                desc.elements = layout.elements;
            }
            ShapeKind::Polymorphic {
                discriminator,
                subtypes,
                ..
            } => {
                desc.kind = DescriptorKind::Polymorphic;
                let discriminator = discriminator
                    .clone()
                    .unwrap_or_else(|| config.class_discriminator.clone());
                for (_, subtype) in subtypes {
                    let sub_shape = schema.shape(*subtype)?;
                    if sub_shape.is_object() {
                        let sub = resolve(*subtype)?;
                        if sub.lookup(&discriminator).inline_site().is_some() {
                            return Err(SchemaError::DiscriminatorConflict {
                                shape: sub.name.clone(),
                                discriminator,
                            });
                        }
                    } else if !desc.value_wrappers.contains_key(subtype) {
                        let wrapper = Self::value_wrapper(schema, *subtype, config)?;
                        desc.value_wrappers.insert(*subtype, Arc::new(wrapper));
                    }
                }
                desc.class_discriminator = Some(discriminator);
            }
        }

        trace!(descriptor = ?desc, "built descriptor");
        Ok(desc)
    }

    /// An object with a single `value` element, used to carry a non-object subtype next to the
    /// discriminator: `{"type": "...", "value": ...}`.
    fn value_wrapper(
        schema: &SchemaSet,
        subtype: ShapeId,
        config: &DescriptorConfig,
    ) -> Result<SchemaDescriptor, SchemaError> {
        let s = schema.shape(subtype)?;
        let enum_table = match &s.kind {
            ShapeKind::Enum { variants } => Some(Arc::new(EnumTable::new(
                variants,
                config.decode_enums_case_insensitive,
            ))),
            _ => None,
        };
        let mut names = FxHashMap::default();
        names.insert(Box::from(VALUE_WRAPPER_ELEMENT), ElementInfo::new(0, None));
        Ok(SchemaDescriptor {
            shape: subtype,
            name: s.name.clone(),
            kind: DescriptorKind::Object,
            element_count: 1,
            total_element_count: 1,
            names,
            inline_offsets: Vec::new(),
            elements: vec![ElementMeta {
                name: VALUE_WRAPPER_ELEMENT.to_string(),
                shape: subtype,
                optional: false,
                nullable: false,
                flatten: false,
                child_count: 0,
                inline_site: None,
                enum_table,
                map_entries: false,
            }],
            inline_map_element: None,
            class_discriminator: None,
            ignore_unknown_keys: config.ignore_unknown_keys,
            enum_table: None,
            value_wrappers: FxHashMap::default(),
        })
    }

    pub fn shape(&self) -> ShapeId {
        self.shape
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DescriptorKind {
        self.kind
    }

    pub fn element_count(&self) -> u32 {
        self.element_count
    }

    pub fn total_element_count(&self) -> u32 {
        self.total_element_count
    }

    pub fn has_inline_elements(&self) -> bool {
        !self.inline_offsets.is_empty()
    }

    /// Resolves a wire key. Keys that match nothing belong to the flattened map, if there is one.
    pub fn lookup(&self, key: &str) -> ElementInfo {
        match self.names.get(key) {
            Some(info) => *info,
            None => self.inline_map_element.unwrap_or(ElementInfo::UNKNOWN),
        }
    }

    /// Like [`lookup`](Self::lookup), without the flattened map fallback.
    pub fn lookup_declared(&self, key: &str) -> Option<ElementInfo> {
        self.names.get(key).copied()
    }

    /// All recognized spellings, in no particular order.
    pub fn known_names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(|k| &**k)
    }

    /// Absolute index where the children of a flattened element begin, 0 when the element is not
    /// flattened.
    pub fn child_offset(&self, absolute: u32) -> u32 {
        self.inline_offsets
            .get(absolute as usize)
            .map_or(0, |&o| u32::from(o))
    }

    pub fn element(&self, absolute: u32) -> Option<&ElementMeta> {
        self.elements.get(absolute as usize)
    }

    pub fn elements(&self) -> &[ElementMeta] {
        &self.elements
    }

    /// Direct elements, i.e. the ones declared on the shape itself.
    pub fn direct_elements(&self) -> &[ElementMeta] {
        &self.elements[..self.element_count as usize]
    }

    pub fn inline_map_element(&self) -> Option<ElementInfo> {
        self.inline_map_element
    }

    pub fn class_discriminator(&self) -> Option<&str> {
        self.class_discriminator.as_deref()
    }

    pub fn ignore_unknown_keys(&self) -> bool {
        self.ignore_unknown_keys
    }

    pub fn enum_table(&self) -> Option<&Arc<EnumTable>> {
        self.enum_table.as_ref()
    }

    pub fn value_wrapper_for(&self, subtype: ShapeId) -> Option<&Arc<SchemaDescriptor>> {
        self.value_wrappers.get(&subtype)
    }
}

pub const VALUE_WRAPPER_ELEMENT: &str = "value";

#[derive(Default)]
struct Layout {
    names: FxHashMap<Box<str>, ElementInfo>,
    elements: Vec<ElementMeta>,
    offsets: Vec<u16>,
    inline_map: Option<ElementInfo>,
    has_inline: bool,
}

impl Layout {
    /// Lays out the elements of `shape` starting at absolute index `start` and returns the first
    /// index past its subtree.
    #[allow(clippy::too_many_arguments)]
    fn scan(
        &mut self,
        schema: &SchemaSet,
        config: &DescriptorConfig,
        shape: ShapeId,
        site: Option<u32>,
        start: u32,
        level: u32,
        path: &mut Vec<ShapeId>,
    ) -> Result<u32, SchemaError> {
        if level > MAX_INLINE_DEPTH {
            return Err(SchemaError::InlineDepthExceeded {
                max: MAX_INLINE_DEPTH,
            });
        }

        let s = schema.shape(shape)?;
        let elements = s.elements();
        debug_assert_eq!(self.elements.len() as u32, start);

        for el in elements {
            let enum_table = match &schema.shape(el.shape)?.kind {
                ShapeKind::Enum { variants } => Some(Arc::new(EnumTable::new(
                    variants,
                    config.decode_enums_case_insensitive,
                ))),
                _ => None,
            };
            let name = match config.naming_strategy {
                Some(strategy) => strategy.apply(&el.name),
                None => el.name.clone(),
            };
            self.elements.push(ElementMeta {
                name,
                shape: el.shape,
                optional: el.optional,
                nullable: el.nullable,
                flatten: el.flatten,
                child_count: 0,
                inline_site: site,
                enum_table,
                map_entries: false,
            });
            self.offsets.push(0);
        }

        let mut offset = start + elements.len() as u32;

        for (i, el) in elements.iter().enumerate() {
            let abs = start + i as u32;
            if !el.flatten {
                let info = ElementInfo::new(abs, site);
                if config.use_alternative_names {
                    for alias in &el.alternate_names {
                        self.register(&s.name, alias, info)?;
                    }
                }
                let primary = self.elements[abs as usize].name.clone();
                self.register(&s.name, &primary, info)?;
                continue;
            }

            self.has_inline = true;
            let child = schema.shape(el.shape)?;
            match &child.kind {
                ShapeKind::Map { .. } => {
                    if self.inline_map.is_some() {
                        return Err(SchemaError::MultipleInlineMaps {
                            shape: s.name.clone(),
                        });
                    }
                    // The map's entries get one placeholder slot, reached through the map element.
                    self.inline_map = Some(ElementInfo::new(offset, Some(abs)));
                    self.elements.push(ElementMeta {
                        name: el.name.clone(),
                        shape: el.shape,
                        optional: true,
                        nullable: false,
                        flatten: false,
                        child_count: 0,
                        inline_site: Some(abs),
                        enum_table: None,
                        map_entries: true,
                    });
                    self.offsets.push(0);
                    self.offsets[abs as usize] = Self::checked_offset(&s.name, offset)?;
                    offset += 1;
                }
                ShapeKind::Object { elements: children } => {
                    if path.contains(&el.shape) {
                        return Err(SchemaError::CyclicFlatten {
                            shape: child.name.clone(),
                        });
                    }
                    self.offsets[abs as usize] = Self::checked_offset(&s.name, offset)?;
                    self.elements[abs as usize].child_count = children.len() as u32;
                    path.push(el.shape);
                    offset =
                        self.scan(schema, config, el.shape, Some(abs), offset, level + 1, path)?;
                    path.pop();
                }
                ShapeKind::Polymorphic { .. } => {
                    return Err(SchemaError::PolymorphicFlatten {
                        shape: s.name.clone(),
                        element: el.name.clone(),
                    });
                }
                _ => {
                    return Err(SchemaError::NotFlattenable {
                        shape: s.name.clone(),
                        element: el.name.clone(),
                    });
                }
            }
        }

        Ok(offset)
    }

    fn checked_offset(shape: &str, offset: u32) -> Result<u16, SchemaError> {
        u16::try_from(offset).map_err(|_| SchemaError::TooManyElements {
            shape: shape.to_string(),
            count: offset as usize,
            max: MAX_TOTAL_ELEMENTS,
        })
    }

    fn register(&mut self, shape: &str, name: &str, info: ElementInfo) -> Result<(), SchemaError> {
        if self.names.insert(Box::from(name), info).is_some() {
            return Err(SchemaError::DuplicateName {
                shape: shape.to_string(),
                name: name.to_string(),
            });
        }
        Ok(())
    }
}
