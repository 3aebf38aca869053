mod common;

use std::sync::Arc;

use common::*;
use flatjson_core::{
    Codec, Config, DecodeErrorKind, Element, ScalarKind, SchemaBuilder, SchemaSet, ShapeId,
    ShapeKind, Value,
};

struct Zoo {
    schema: Arc<SchemaSet>,
    animal: ShapeId,
    pet: ShapeId,
    animals: ShapeId,
}

/// `Animal` is one of `cat: Cat`, `dog: Dog` (declares its own `type`), `bird: Bird` (flattens
/// `Meta`) or `count: int`. `Pet` is keyed by `kind` and falls back to `Cat`.
fn zoo() -> Zoo {
    let mut b = SchemaBuilder::new();
    let int = b.scalar(ScalarKind::Int);
    let string = b.scalar(ScalarKind::String);
    let cat = b
        .add(
            "Cat",
            ShapeKind::Object {
                elements: vec![
                    Element::new("name", string),
                    Element::new("lives", int).optional(),
                ],
            },
        )
        .unwrap();
    let dog = b
        .add(
            "Dog",
            ShapeKind::Object {
                elements: vec![Element::new("type", string), Element::new("name", string)],
            },
        )
        .unwrap();
    let meta = b
        .add(
            "Meta",
            ShapeKind::Object {
                elements: vec![Element::new("id", int)],
            },
        )
        .unwrap();
    let bird = b
        .add(
            "Bird",
            ShapeKind::Object {
                elements: vec![
                    Element::new("meta", meta).flatten(),
                    Element::new("wings", int),
                ],
            },
        )
        .unwrap();
    let animal = b
        .add(
            "Animal",
            ShapeKind::Polymorphic {
                discriminator: None,
                subtypes: vec![
                    ("cat".into(), cat),
                    ("dog".into(), dog),
                    ("bird".into(), bird),
                    ("count".into(), int),
                ],
                default_subtype: None,
            },
        )
        .unwrap();
    let pet = b
        .add(
            "Pet",
            ShapeKind::Polymorphic {
                discriminator: Some("kind".into()),
                subtypes: vec![("cat".into(), cat)],
                default_subtype: Some(cat),
            },
        )
        .unwrap();
    let animals = b.list(animal, false);
    Zoo {
        schema: b.build_shared().unwrap(),
        animal,
        pet,
        animals,
    }
}

fn variant(tag: &str, value: Value) -> Value {
    Value::Variant {
        tag: tag.into(),
        value: Box::new(value),
    }
}

#[test]
fn discriminator_may_appear_anywhere() {
    let zoo = zoo();
    let codec = Codec::new(zoo.schema.clone());
    let expected = variant(
        "cat",
        object(&[("name", string("Tom")), ("lives", Value::Int(9))]),
    );

    for input in [
        r#"{"type":"cat","name":"Tom","lives":9}"#,
        r#"{"name":"Tom","type":"cat","lives":9}"#,
        r#"{"name":"Tom","lives":9,"type":"cat"}"#,
    ] {
        assert_eq!(codec.decode_value(zoo.animal, input).unwrap(), expected, "{input}");
    }
    assert_eq!(
        codec.encode_value(zoo.animal, &expected).unwrap(),
        r#"{"type":"cat","name":"Tom","lives":9}"#
    );
}

#[test]
fn missing_and_unknown_discriminators() {
    let zoo = zoo();
    let codec = Codec::new(zoo.schema.clone());

    let err = codec
        .decode_value(zoo.animal, r#"{"name":"Tom"}"#)
        .unwrap_err();
    assert_eq!(
        err.kind,
        DecodeErrorKind::MissingDiscriminator {
            base: "Animal".into(),
            discriminator: "type".into()
        }
    );
    assert_eq!(err.position(), Some(0));

    let err = codec
        .decode_value(zoo.animal, r#"{"type":"fish"}"#)
        .unwrap_err();
    assert_eq!(
        err.kind,
        DecodeErrorKind::UnknownSubtype {
            base: "Animal".into(),
            tag: "fish".into()
        }
    );
    assert_eq!(err.position(), Some(8));
}

#[test]
fn default_subtype_and_custom_discriminator() {
    let zoo = zoo();
    let codec = Codec::new(zoo.schema.clone());

    let value = codec.decode_value(zoo.pet, r#"{"name":"Tom"}"#).unwrap();
    assert_eq!(value, variant("cat", object(&[("name", string("Tom"))])));

    let value = codec
        .decode_value(zoo.pet, r#"{"name":"Tom","kind":"cat"}"#)
        .unwrap();
    assert_eq!(
        codec.encode_value(zoo.pet, &value).unwrap(),
        r#"{"kind":"cat","name":"Tom"}"#
    );
}

#[test]
fn null_discriminator_counts_as_absent() {
    let zoo = zoo();
    let codec = Codec::new(zoo.schema.clone());

    let tom = variant("cat", object(&[("name", string("Tom"))]));
    for input in [r#"{"kind":null,"name":"Tom"}"#, r#"{"name":"Tom","kind":null}"#] {
        assert_eq!(codec.decode_value(zoo.pet, input).unwrap(), tom, "{input}");
    }

    let err = codec
        .decode_value(zoo.animal, r#"{"type":null,"name":"Tom"}"#)
        .unwrap_err();
    assert!(matches!(err.kind, DecodeErrorKind::MissingDiscriminator { .. }));
}

#[test]
fn broken_separator_while_looking_for_the_discriminator() {
    let zoo = zoo();
    let codec = Codec::new(zoo.schema.clone());
    let err = codec
        .decode_value(zoo.animal, r#"{"name":"Tom" "type":"cat"}"#)
        .unwrap_err();
    assert!(matches!(err.kind, DecodeErrorKind::Syntax { .. }), "{err}");
    assert_eq!(err.position(), Some(14));
}

#[test]
fn non_object_subtypes_are_wrapped() {
    let zoo = zoo();
    let codec = Codec::new(zoo.schema.clone());
    let input = r#"{"type":"count","value":3}"#;

    let value = codec.decode_value(zoo.animal, input).unwrap();
    assert_eq!(value, variant("count", Value::Int(3)));
    assert_eq!(codec.encode_value(zoo.animal, &value).unwrap(), input);

    let value = codec
        .decode_value(zoo.animal, r#"{"value":3,"type":"count"}"#)
        .unwrap();
    assert_eq!(value, variant("count", Value::Int(3)));
}

#[test]
fn declared_discriminator_is_read_as_an_element() {
    let zoo = zoo();
    let codec = Codec::new(zoo.schema.clone());

    let value = codec
        .decode_value(zoo.animal, r#"{"name":"Rex","type":"dog"}"#)
        .unwrap();
    let expected = variant(
        "dog",
        object(&[("type", string("dog")), ("name", string("Rex"))]),
    );
    assert_eq!(value, expected);
    assert_eq!(
        codec.encode_value(zoo.animal, &expected).unwrap(),
        r#"{"type":"dog","name":"Rex"}"#
    );
}

#[test]
fn subtype_with_flattened_child() {
    let zoo = zoo();
    let codec = Codec::new(zoo.schema.clone());
    let expected = variant(
        "bird",
        object(&[
            ("meta", object(&[("id", Value::Int(1))])),
            ("wings", Value::Int(2)),
        ]),
    );

    for input in [
        r#"{"id":1,"type":"bird","wings":2}"#,
        r#"{"wings":2,"id":1,"type":"bird"}"#,
        r#"{"type":"bird","wings":2,"id":1}"#,
    ] {
        assert_eq!(codec.decode_value(zoo.animal, input).unwrap(), expected, "{input}");
    }
    assert_eq!(
        codec.encode_value(zoo.animal, &expected).unwrap(),
        r#"{"type":"bird","id":1,"wings":2}"#
    );
}

#[test]
fn polymorphic_list_items() {
    let zoo = zoo();
    let codec = Codec::new(zoo.schema.clone());
    let value = codec
        .decode_value(
            zoo.animals,
            r#"[{"type":"count","value":1}, {"name":"a","type":"cat"}]"#,
        )
        .unwrap();
    assert_eq!(
        value,
        Value::List(vec![
            variant("count", Value::Int(1)),
            variant("cat", object(&[("name", string("a"))])),
        ])
    );
}

#[test]
fn discriminator_conflicting_with_a_flattened_element() {
    let mut b = SchemaBuilder::new();
    let string = b.scalar(ScalarKind::String);
    let tagged = b
        .add(
            "Tagged",
            ShapeKind::Object {
                elements: vec![Element::new("type", string)],
            },
        )
        .unwrap();
    let holder = b
        .add(
            "Holder",
            ShapeKind::Object {
                elements: vec![Element::new("tagged", tagged).flatten()],
            },
        )
        .unwrap();
    b.add(
        "Base",
        ShapeKind::Polymorphic {
            discriminator: None,
            subtypes: vec![("holder".into(), holder)],
            default_subtype: None,
        },
    )
    .unwrap();
    let codec = common::codec(b.build_shared().unwrap(), Config::default());
    assert!(codec.validate().is_err());
}
