//! Shape descriptions: the static schema a document is decoded against.
//!
//! A [`SchemaSet`] is an immutable arena of [`Shape`]s addressed by [`ShapeId`]. Shapes refer to
//! each other by id, so recursive schemas (a tree node holding a list of tree nodes) are
//! expressed by declaring a shape before defining it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use index_vec::IndexVec;
use indexmap::IndexMap;
use tracing::*;

use crate::error::SchemaError;

index_vec::define_index_type! {
    pub struct ShapeId = u32;
}

/// Process-unique identity of a [`SchemaSet`], part of every descriptor cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaSetId(u64);

impl SchemaSetId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SchemaSetId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    Int,
    UInt,
    Float,
    String,
}

impl ScalarKind {
    pub const ALL: [ScalarKind; 5] = [
        ScalarKind::Bool,
        ScalarKind::Int,
        ScalarKind::UInt,
        ScalarKind::Float,
        ScalarKind::String,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::Int => "int",
            ScalarKind::UInt => "uint",
            ScalarKind::Float => "float",
            ScalarKind::String => "string",
        }
    }
}

/// A property of an object shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub alternate_names: Vec<String>,
    pub shape: ShapeId,
    /// May be absent from the input.
    pub optional: bool,
    /// Accepts `null`.
    pub nullable: bool,
    /// Keys of the nested value are exposed in the enclosing object.
    pub flatten: bool,
}

impl Element {
    pub fn new(name: impl Into<String>, shape: ShapeId) -> Self {
        Element {
            name: name.into(),
            alternate_names: Vec::new(),
            shape,
            optional: false,
            nullable: false,
            flatten: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn flatten(mut self) -> Self {
        self.flatten = true;
        self
    }

    pub fn alias(mut self, name: impl Into<String>) -> Self {
        self.alternate_names.push(name.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeKind {
    Scalar(ScalarKind),
    Enum {
        variants: Vec<String>,
    },
    Object {
        elements: Vec<Element>,
    },
    List {
        item: ShapeId,
        item_nullable: bool,
    },
    Map {
        key: ShapeId,
        value: ShapeId,
        value_nullable: bool,
    },
    /// A closed set of subtypes told apart by a discriminator property.
    Polymorphic {
        /// Overrides the configured class discriminator.
        discriminator: Option<String>,
        subtypes: Vec<(String, ShapeId)>,
        default_subtype: Option<ShapeId>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape {
    pub name: String,
    pub kind: ShapeKind,
}

impl Shape {
    pub fn elements(&self) -> &[Element] {
        match &self.kind {
            ShapeKind::Object { elements } => elements,
            _ => &[],
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self.kind, ShapeKind::Object { .. })
    }

    pub fn is_map(&self) -> bool {
        matches!(self.kind, ShapeKind::Map { .. })
    }

    /// Whether values of this shape are written as a JSON object or array.
    pub fn is_structured(&self) -> bool {
        matches!(
            self.kind,
            ShapeKind::Object { .. }
                | ShapeKind::List { .. }
                | ShapeKind::Map { .. }
                | ShapeKind::Polymorphic { .. }
        )
    }

    fn referenced_ids(&self) -> Vec<ShapeId> {
        match &self.kind {
            ShapeKind::Scalar(_) | ShapeKind::Enum { .. } => vec![],
            ShapeKind::Object { elements } => elements.iter().map(|e| e.shape).collect(),
            ShapeKind::List { item, .. } => vec![*item],
            ShapeKind::Map { key, value, .. } => vec![*key, *value],
            ShapeKind::Polymorphic {
                subtypes,
                default_subtype,
                ..
            } => subtypes
                .iter()
                .map(|(_, id)| *id)
                .chain(default_subtype.iter().copied())
                .collect(),
        }
    }
}

/// An immutable collection of shapes.
#[derive(Debug)]
pub struct SchemaSet {
    id: SchemaSetId,
    shapes: IndexVec<ShapeId, Shape>,
    names: IndexMap<String, ShapeId>,
}

impl SchemaSet {
    pub fn id(&self) -> SchemaSetId {
        self.id
    }

    pub fn shape(&self, id: ShapeId) -> Result<&Shape, SchemaError> {
        self.shapes
            .get(id)
            .ok_or(SchemaError::UnknownShapeId { id: id.index() })
    }

    pub fn shape_id(&self, name: &str) -> Option<ShapeId> {
        self.names.get(name).copied()
    }

    pub fn shapes(&self) -> impl Iterator<Item = (ShapeId, &Shape)> {
        self.shapes.iter_enumerated()
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

/// Incrementally assembles a [`SchemaSet`].
///
/// Scalar shapes are interned on first use. List and map shapes are anonymous and named after
/// their structure, e.g. `[int]` or `{string: Point}`.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    shapes: IndexVec<ShapeId, Option<Shape>>,
    pending_names: IndexVec<ShapeId, String>,
    names: IndexMap<String, ShapeId>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves an id for `name`, returning the existing one if it is already known.
    pub fn declare(&mut self, name: &str) -> ShapeId {
        if let Some(id) = self.names.get(name) {
            return *id;
        }
        let id = self.shapes.push(None);
        self.pending_names.push(name.to_string());
        self.names.insert(name.to_string(), id);
        id
    }

    pub fn define(&mut self, id: ShapeId, kind: ShapeKind) -> Result<(), SchemaError> {
        let name = self
            .pending_names
            .get(id)
            .ok_or(SchemaError::UnknownShapeId { id: id.index() })?
            .clone();
        let slot = &mut self.shapes[id];
        if slot.is_some() {
            return Err(SchemaError::ShapeRedefined { name });
        }
        *slot = Some(Shape { name, kind });
        Ok(())
    }

    pub fn add(&mut self, name: &str, kind: ShapeKind) -> Result<ShapeId, SchemaError> {
        let id = self.declare(name);
        self.define(id, kind)?;
        Ok(id)
    }

    pub fn scalar(&mut self, kind: ScalarKind) -> ShapeId {
        self.intern(kind.name(), || ShapeKind::Scalar(kind))
    }

    pub fn list(&mut self, item: ShapeId, item_nullable: bool) -> ShapeId {
        let name = format!(
            "[{}{}]",
            self.name_of(item),
            if item_nullable { "?" } else { "" }
        );
        self.intern(&name, || ShapeKind::List {
            item,
            item_nullable,
        })
    }

    pub fn map(&mut self, key: ShapeId, value: ShapeId, value_nullable: bool) -> ShapeId {
        let name = format!(
            "{{{}: {}{}}}",
            self.name_of(key),
            self.name_of(value),
            if value_nullable { "?" } else { "" }
        );
        self.intern(&name, || ShapeKind::Map {
            key,
            value,
            value_nullable,
        })
    }

    fn name_of(&self, id: ShapeId) -> &str {
        self.pending_names.get(id).map_or("?", String::as_str)
    }

    fn intern(&mut self, name: &str, kind: impl FnOnce() -> ShapeKind) -> ShapeId {
        let id = self.declare(name);
        if self.shapes[id].is_none() {
            self.shapes[id] = Some(Shape {
                name: name.to_string(),
                kind: kind(),
            });
        }
        id
    }

    pub fn build(self) -> Result<SchemaSet, SchemaError> {
        let count = self.shapes.len();
        let mut shapes = IndexVec::with_capacity(count);
        for (id, shape) in self.shapes.into_iter_enumerated() {
            let shape = shape.ok_or_else(|| SchemaError::UndefinedShape {
                name: self.pending_names[id].clone(),
            })?;
            shapes.push(shape);
        }

        for shape in shapes.iter() {
            if let Some(bad) = shape
                .referenced_ids()
                .into_iter()
                .find(|id| id.index() >= count)
            {
                return Err(SchemaError::UnknownShapeId { id: bad.index() });
            }
        }

        let set = SchemaSet {
            id: SchemaSetId::next(),
            shapes,
            names: self.names,
        };
        debug!(id = ?set.id, shapes = set.len(), "built schema set");
        Ok(set)
    }

    pub fn build_shared(self) -> Result<Arc<SchemaSet>, SchemaError> {
        self.build().map(Arc::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recursive_shapes_through_declaration() {
        let mut b = SchemaBuilder::new();
        let node = b.declare("Node");
        let children = b.list(node, false);
        let int = b.scalar(ScalarKind::Int);
        b.define(
            node,
            ShapeKind::Object {
                elements: vec![
                    Element::new("value", int),
                    Element::new("children", children).optional(),
                ],
            },
        )
        .unwrap();
        let set = b.build().unwrap();

        assert_eq!(set.shape_id("Node"), Some(node));
        assert_eq!(set.shape(children).unwrap().name, "[Node]");
        assert_eq!(set.shape(node).unwrap().elements().len(), 2);
    }

    #[test]
    fn undefined_declaration_is_rejected() {
        let mut b = SchemaBuilder::new();
        b.declare("Ghost");
        assert_eq!(
            b.build().unwrap_err(),
            SchemaError::UndefinedShape {
                name: "Ghost".into()
            }
        );
    }

    #[test]
    fn redefinition_is_rejected() {
        let mut b = SchemaBuilder::new();
        b.add("E", ShapeKind::Enum { variants: vec![] }).unwrap();
        assert!(matches!(
            b.add("E", ShapeKind::Enum { variants: vec![] }),
            Err(SchemaError::ShapeRedefined { .. })
        ));
    }

    #[test]
    fn scalars_are_interned() {
        let mut b = SchemaBuilder::new();
        let a = b.scalar(ScalarKind::String);
        let c = b.scalar(ScalarKind::String);
        assert_eq!(a, c);
        let set_a = b.build().unwrap();
        let set_b = SchemaBuilder::new().build().unwrap();
        assert_ne!(set_a.id(), set_b.id());
    }
}
