mod common;

use common::*;
use flatjson_core::{
    Codec, DecodeErrorKind, Element, ScalarKind, SchemaBuilder, ShapeKind, Value,
};
use proptest::prelude::*;

fn render(pairs: &[(String, String)]) -> String {
    let body: Vec<String> = pairs
        .iter()
        .map(|(key, value)| format!("\"{key}\":{value}"))
        .collect();
    format!("{{{}}}", body.join(","))
}

/// Wire pairs and the value `Top` decodes them to.
fn double_flatten_case(x: i64, y: i64, z: i64, w: Option<String>) -> (Vec<(String, String)>, Value) {
    let mut pairs = vec![
        ("x".to_string(), x.to_string()),
        ("y".to_string(), y.to_string()),
        ("z".to_string(), z.to_string()),
    ];
    let mut leaf = vec![("z", Value::Int(z))];
    if let Some(w) = w {
        pairs.push(("w".to_string(), format!("\"{w}\"")));
        leaf.push(("w", string(&w)));
    }
    let expected = object(&[
        ("x", Value::Int(x)),
        (
            "m",
            object(&[("y", Value::Int(y)), ("i", object(&leaf))]),
        ),
    ]);
    (pairs, expected)
}

fn shuffled_double_flatten() -> impl Strategy<Value = (Vec<(String, String)>, Value)> {
    (
        any::<i64>(),
        any::<i64>(),
        any::<i64>(),
        proptest::option::of("[a-z]{0,6}"),
    )
        .prop_flat_map(|(x, y, z, w)| {
            let (pairs, expected) = double_flatten_case(x, y, z, w);
            (Just(pairs).prop_shuffle(), Just(expected))
        })
}

proptest! {
    #[test]
    fn key_order_never_changes_the_result((pairs, expected) in shuffled_double_flatten()) {
        let (schema, top) = double_flatten();
        let codec = Codec::new(schema);
        let input = render(&pairs);

        let value = codec.decode_value(top, &input).unwrap();
        prop_assert_eq!(&value, &expected, "input: {}", input);

        let encoded = codec.encode_value(top, &value).unwrap();
        prop_assert_eq!(codec.decode_value(top, &encoded).unwrap(), value);
    }

    #[test]
    fn repeated_keys_are_always_reported(
        (pairs, _) in shuffled_double_flatten(),
        pick in any::<prop::sample::Index>(),
        seed in any::<prop::sample::Index>(),
    ) {
        let (schema, top) = double_flatten();
        let codec = Codec::new(schema);

        let repeated = pairs[pick.index(pairs.len())].clone();
        let mut pairs = pairs;
        pairs.insert(seed.index(pairs.len() + 1), repeated.clone());
        let input = render(&pairs);

        let err = codec.decode_value(top, &input).unwrap_err();
        prop_assert_eq!(
            err.kind,
            DecodeErrorKind::DuplicateKey { key: repeated.0 },
            "input: {}",
            input
        );
    }

    #[test]
    fn flattened_map_keeps_wire_order(
        entries in proptest::collection::btree_map("k[a-z]{0,3}", any::<i32>(), 0..6),
        id in any::<i64>(),
        at in any::<prop::sample::Index>(),
    ) {
        let mut b = SchemaBuilder::new();
        let int = b.scalar(ScalarKind::Int);
        let string_shape = b.scalar(ScalarKind::String);
        let extra = b.map(string_shape, int, false);
        let record = b
            .add(
                "Record",
                ShapeKind::Object {
                    elements: vec![
                        Element::new("id", int),
                        Element::new("extra", extra).flatten(),
                    ],
                },
            )
            .unwrap();
        let codec = Codec::new(b.build_shared().unwrap());

        let mut pairs: Vec<(String, String)> = entries
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect();
        pairs.insert(at.index(pairs.len() + 1), ("id".to_string(), id.to_string()));
        let input = render(&pairs);

        let expected = object(&[
            ("id", Value::Int(id)),
            (
                "extra",
                Value::Map(
                    entries
                        .iter()
                        .map(|(k, v)| (string(k), Value::Int(i64::from(*v))))
                        .collect(),
                ),
            ),
        ]);
        let value = codec.decode_value(record, &input).unwrap();
        prop_assert_eq!(&value, &expected, "input: {}", input);

        let encoded = codec.encode_value(record, &value).unwrap();
        prop_assert_eq!(codec.decode_value(record, &encoded).unwrap(), value);
    }
}
