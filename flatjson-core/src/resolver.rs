//! Polymorphic subtype resolution.

use std::fmt;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::*;

use crate::error::DecodeErrorKind;
use crate::shape::{SchemaSet, SchemaSetId, ShapeId, ShapeKind};

pub trait SubtypeResolver: Send + Sync + fmt::Debug {
    /// Maps a discriminator value to the concrete subtype of `base`.
    fn resolve(&self, schema: &SchemaSet, base: ShapeId, tag: &str)
        -> Result<ShapeId, DecodeErrorKind>;

    /// Subtype used when the discriminator is absent.
    fn default_subtype(&self, schema: &SchemaSet, base: ShapeId) -> Option<ShapeId>;

    /// Discriminator value that identifies `subtype`.
    fn tag_of(&self, schema: &SchemaSet, base: ShapeId, subtype: ShapeId) -> Option<String>;
}

type TagTable = FxHashMap<Box<str>, ShapeId>;

/// Resolves subtypes from the polymorphic shape's own table, memoizing per base shape.
#[derive(Debug, Default)]
pub struct SchemaResolver {
    tables: RwLock<FxHashMap<(SchemaSetId, ShapeId), TagTable>>,
}

impl SchemaResolver {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_table<R>(
        &self,
        schema: &SchemaSet,
        base: ShapeId,
        f: impl FnOnce(&TagTable) -> R,
    ) -> R {
        let key = (schema.id(), base);
        if let Some(table) = self.tables.read().get(&key) {
            return f(table);
        }

        let table: TagTable = match schema.shape(base).map(|s| &s.kind) {
            Ok(ShapeKind::Polymorphic { subtypes, .. }) => subtypes
                .iter()
                .map(|(tag, id)| (Box::from(tag.as_str()), *id))
                .collect(),
            _ => TagTable::default(),
        };
        trace!(base = base.index(), subtypes = table.len(), "memoized subtype table");
        let mut tables = self.tables.write();
        f(tables.entry(key).or_insert(table))
    }
}

impl SubtypeResolver for SchemaResolver {
    fn resolve(
        &self,
        schema: &SchemaSet,
        base: ShapeId,
        tag: &str,
    ) -> Result<ShapeId, DecodeErrorKind> {
        self.with_table(schema, base, |table| table.get(tag).copied())
            .ok_or_else(|| DecodeErrorKind::UnknownSubtype {
                base: schema
                    .shape(base)
                    .map_or_else(|_| String::new(), |s| s.name.clone()),
                tag: tag.to_string(),
            })
    }

    fn default_subtype(&self, schema: &SchemaSet, base: ShapeId) -> Option<ShapeId> {
        match &schema.shape(base).ok()?.kind {
            ShapeKind::Polymorphic {
                default_subtype, ..
            } => *default_subtype,
            _ => None,
        }
    }

    fn tag_of(&self, schema: &SchemaSet, base: ShapeId, subtype: ShapeId) -> Option<String> {
        match &schema.shape(base).ok()?.kind {
            ShapeKind::Polymorphic { subtypes, .. } => subtypes
                .iter()
                .find(|(_, id)| *id == subtype)
                .map(|(tag, _)| tag.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{Element, ScalarKind, SchemaBuilder};

    #[test]
    fn resolves_and_reports_unknown_tags() {
        let mut b = SchemaBuilder::new();
        let string = b.scalar(ScalarKind::String);
        let cat = b
            .add(
                "Cat",
                ShapeKind::Object {
                    elements: vec![Element::new("name", string)],
                },
            )
            .unwrap();
        let animal = b
            .add(
                "Animal",
                ShapeKind::Polymorphic {
                    discriminator: None,
                    subtypes: vec![("cat".into(), cat)],
                    default_subtype: None,
                },
            )
            .unwrap();
        let schema = b.build().unwrap();
        let resolver = SchemaResolver::new();

        assert_eq!(resolver.resolve(&schema, animal, "cat"), Ok(cat));
        assert_eq!(resolver.resolve(&schema, animal, "cat"), Ok(cat));
        assert_eq!(
            resolver.resolve(&schema, animal, "dog"),
            Err(DecodeErrorKind::UnknownSubtype {
                base: "Animal".into(),
                tag: "dog".into()
            })
        );
        assert_eq!(resolver.default_subtype(&schema, animal), None);
        assert_eq!(resolver.tag_of(&schema, animal, cat).as_deref(), Some("cat"));
    }
}
