#![allow(dead_code)]

use std::sync::Arc;

use flatjson_core::{
    Codec, Config, Element, IndexMap, ScalarKind, SchemaBuilder, SchemaSet, ShapeId, ShapeKind,
    Value,
};

pub fn object(fields: &[(&str, Value)]) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect::<IndexMap<_, _>>(),
    )
}

pub fn string(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn codec(schema: Arc<SchemaSet>, config: Config) -> Codec {
    Codec::builder(schema).config(config).build()
}

/// `Outer { a: int, @flatten b: Inner }`, `Inner { c: int, d?: int? }`.
pub struct OuterInner {
    pub schema: Arc<SchemaSet>,
    pub outer: ShapeId,
    pub inner: ShapeId,
}

pub fn outer_inner() -> OuterInner {
    let mut b = SchemaBuilder::new();
    let int = b.scalar(ScalarKind::Int);
    let inner = b
        .add(
            "Inner",
            ShapeKind::Object {
                elements: vec![
                    Element::new("c", int),
                    Element::new("d", int).optional().nullable(),
                ],
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
    OuterInner {
        schema: b.build_shared().unwrap(),
        outer,
        inner,
    }
}

/// `Top { x: int, @flatten m: Mid }`, `Mid { y: int, @flatten i: Leaf }`,
/// `Leaf { z: int, w?: string }`.
pub fn double_flatten() -> (Arc<SchemaSet>, ShapeId) {
    let mut b = SchemaBuilder::new();
    let int = b.scalar(ScalarKind::Int);
    let string = b.scalar(ScalarKind::String);
    let leaf = b
        .add(
            "Leaf",
            ShapeKind::Object {
                elements: vec![Element::new("z", int), Element::new("w", string).optional()],
            },
        )
        .unwrap();
    let mid = b
        .add(
            "Mid",
            ShapeKind::Object {
                elements: vec![Element::new("y", int), Element::new("i", leaf).flatten()],
            },
        )
        .unwrap();
    let top = b
        .add(
            "Top",
            ShapeKind::Object {
                elements: vec![Element::new("x", int), Element::new("m", mid).flatten()],
            },
        )
        .unwrap();
    (b.build_shared().unwrap(), top)
}
