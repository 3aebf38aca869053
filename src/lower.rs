//! Turns a parsed schema file into a [`SchemaSet`].

use std::sync::Arc;

use flatjson_core::{Element, ScalarKind, SchemaBuilder, SchemaError, SchemaSet, ShapeId, ShapeKind};
use tracing::*;

use crate::ast::{Item, SchemaFile, TypeKind, TypeRef};
use crate::spanned::Spanned;

pub fn scalar_kind(name: &str) -> Option<ScalarKind> {
    ScalarKind::ALL.into_iter().find(|k| k.name() == name)
}

/// Resolves a type expression to a shape and whether it accepts `null`.
fn resolve(b: &mut SchemaBuilder, ty: &Spanned<TypeRef>) -> (ShapeId, bool) {
    let id = match &ty.val.kind {
        TypeKind::Named(name) => match scalar_kind(name) {
            Some(kind) => b.scalar(kind),
            None => b.declare(name),
        },
        TypeKind::List(item) => {
            let (item, item_nullable) = resolve(b, item);
            b.list(item, item_nullable)
        }
        TypeKind::Map(key, value) => {
            let (key, _) = resolve(b, key);
            let (value, value_nullable) = resolve(b, value);
            b.map(key, value, value_nullable)
        }
    };
    (id, ty.val.nullable)
}

pub fn lower(file: &SchemaFile) -> Result<Arc<SchemaSet>, SchemaError> {
    let mut b = SchemaBuilder::new();

    // Declare first so that items may refer to items defined further down.
    let ids: Vec<ShapeId> = file.names().map(|name| b.declare(&name.val)).collect();

    for (item, id) in file.items.iter().zip(ids) {
        let kind = match &item.val {
            Item::Struct(s) => ShapeKind::Object {
                elements: s
                    .fields
                    .iter()
                    .map(|field| {
                        let field = &field.val;
                        let (shape, nullable) = resolve(&mut b, &field.ty);
                        let mut element = Element::new(field.name.val.clone(), shape);
                        element.optional = field.optional;
                        element.nullable = nullable;
                        element.flatten = field.flatten().is_some();
                        element.alternate_names = field.aliases().map(ToString::to_string).collect();
                        element
                    })
                    .collect(),
            },
            Item::Enum(e) => ShapeKind::Enum {
                variants: e.variants.iter().map(|v| v.val.clone()).collect(),
            },
            Item::Sealed(s) => ShapeKind::Polymorphic {
                discriminator: s.discriminator.as_ref().map(|d| d.val.clone()),
                subtypes: s
                    .subtypes
                    .iter()
                    .map(|(tag, ty)| (tag.val.clone(), resolve(&mut b, ty).0))
                    .collect(),
                default_subtype: s.default.as_ref().map(|d| b.declare(&d.val)),
            },
        };
        b.define(id, kind)?;
    }

    let schema = b.build_shared()?;
    debug!(shapes = schema.len(), "lowered schema file");
    Ok(schema)
}

#[cfg(test)]
mod tests {
    use chumsky::Parser;

    use super::*;
    use crate::parser::parser;

    fn lower_src(src: &str) -> Result<Arc<SchemaSet>, SchemaError> {
        let file = parser().parse(src).into_output().unwrap();
        lower(&file)
    }

    #[test]
    fn forward_references_and_anonymous_shapes() {
        let schema = lower_src(
            r#"
            struct Page { items: [Item], #[flatten] meta: Meta, tags: {string: int?} }
            struct Item { id: uint }
            struct Meta { #[alias("n")] name?: string? }
            "#,
        )
        .unwrap();

        let page = schema.shape_id("Page").unwrap();
        let elements = schema.shape(page).unwrap().elements();
        assert_eq!(schema.shape(elements[0].shape).unwrap().name, "[Item]");
        assert!(elements[1].flatten);
        assert_eq!(schema.shape(elements[2].shape).unwrap().name, "{string: int?}");

        let meta = schema.shape_id("Meta").unwrap();
        let name = &schema.shape(meta).unwrap().elements()[0];
        assert!(name.optional && name.nullable);
        assert_eq!(name.alternate_names, ["n"]);
    }

    #[test]
    fn sealed_shapes() {
        let schema = lower_src(
            r#"
            struct Cat { name: string }
            sealed Animal discriminator "kind" default Cat { cat: Cat, count: int }
            "#,
        )
        .unwrap();
        let animal = schema.shape_id("Animal").unwrap();
        let ShapeKind::Polymorphic {
            discriminator,
            subtypes,
            default_subtype,
        } = &schema.shape(animal).unwrap().kind
        else {
            panic!("expected a polymorphic shape");
        };
        assert_eq!(discriminator.as_deref(), Some("kind"));
        assert_eq!(subtypes.len(), 2);
        assert_eq!(*default_subtype, schema.shape_id("Cat"));
    }

    #[test]
    fn undefined_references_fail() {
        assert_eq!(
            lower_src("struct A { b: B }").unwrap_err(),
            SchemaError::UndefinedShape { name: "B".into() }
        );
    }
}
