//! A schema-shaped dynamic value.
//!
//! [`Value`] is what the codec produces when no Rust type is at hand: the CLI decodes into it and
//! the encoder writes it back out. Objects are keyed by the declared element name, never by the
//! wire spelling, so a value decoded with aliases or a naming strategy looks the same as one
//! decoded without.

use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::decoder::Decoder;
use crate::error::{DecodeError, DecodeResult};
use crate::shape::{ScalarKind, ShapeId, ShapeKind};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Enum(String),
    List(Vec<Value>),
    /// Entries in wire order. Keys are values of the map's key shape.
    Map(Vec<(Value, Value)>),
    /// Elements in declaration order; absent optional elements are left out.
    Object(IndexMap<String, Value>),
    /// A polymorphic value and the tag of its subtype.
    Variant { tag: String, value: Box<Value> },
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Enum(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int(i) => Some(i),
            Value::UInt(u) => i64::try_from(u).ok(),
            _ => None,
        }
    }

    /// Element `name` of an object, or of the object inside a variant.
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Object(fields) => fields.get(name),
            Value::Variant { value, .. } => value.get(name),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "a boolean",
            Value::Int(_) | Value::UInt(_) => "an integer",
            Value::Float(_) => "a float",
            Value::String(_) => "a string",
            Value::Enum(_) => "an enum entry",
            Value::List(_) => "a list",
            Value::Map(_) => "a map",
            Value::Object(_) => "an object",
            Value::Variant { .. } => "a polymorphic value",
        }
    }
}

/// Serializes into plain JSON. Variants become `{"<tag>": <value>}`.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::UInt(u) => serializer.serialize_u64(*u),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) | Value::Enum(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Value::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (name, value) in fields {
                    map.serialize_entry(name, value)?;
                }
                map.end()
            }
            Value::Variant { tag, value } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(tag, value)?;
                map.end()
            }
        }
    }
}

/// Decodes one value of `shape`, recursing through the schema.
pub fn decode_value(d: &mut Decoder<'_>, shape: ShapeId, nullable: bool) -> DecodeResult<Value> {
    if nullable && !d.decode_not_null_mark()? {
        d.decode_null()?;
        return Ok(Value::Null);
    }

    let schema = d.schema();
    let value = match &schema.shape(shape)?.kind {
        ShapeKind::Scalar(ScalarKind::Bool) => Value::Bool(d.decode_bool()?),
        ShapeKind::Scalar(ScalarKind::Int) => Value::Int(d.decode_i64()?),
        ShapeKind::Scalar(ScalarKind::UInt) => Value::UInt(d.decode_u64()?),
        ShapeKind::Scalar(ScalarKind::Float) => Value::Float(d.decode_f64()?),
        ShapeKind::Scalar(ScalarKind::String) => Value::String(d.decode_string()?),
        ShapeKind::Enum { variants } => {
            let index = d.decode_enum(shape)?;
            let variant = variants
                .get(index as usize)
                .ok_or_else(|| DecodeError::invalid_state("enum index out of range"))?;
            Value::Enum(variant.clone())
        }
        ShapeKind::Object { .. } => {
            d.begin_structure(shape)?;
            let fields = decode_elements(d, shape)?;
            d.end_structure()?;
            Value::Object(fields)
        }
        ShapeKind::List {
            item,
            item_nullable,
        } => {
            let mut items = Vec::new();
            d.begin_structure(shape)?;
            while d.next_element_index()?.is_some() {
                items.push(decode_value(d, *item, *item_nullable)?);
            }
            d.end_structure()?;
            Value::List(items)
        }
        ShapeKind::Map {
            key,
            value,
            value_nullable,
        } => {
            let structured_keys =
                d.config().structured_map_keys && schema.shape(*key)?.is_structured();
            let mut entries = Vec::new();
            d.begin_structure(shape)?;
            while d.next_element_index()?.is_some() {
                let k = if structured_keys {
                    d.decode_structured_key(|nested| decode_value(nested, *key, false))?
                } else {
                    decode_value(d, *key, false)?
                };
                if d.next_element_index()?.is_none() {
                    break;
                }
                entries.push((k, decode_value(d, *value, *value_nullable)?));
            }
            d.end_structure()?;
            Value::Map(entries)
        }
        ShapeKind::Polymorphic { .. } => {
            let subtype = d.begin_polymorphic(shape)?;
            let value = if subtype.wrapped {
                let mut inner = Value::Null;
                while d.next_element_index()?.is_some() {
                    inner = decode_value(d, subtype.shape, false)?;
                }
                inner
            } else {
                Value::Object(decode_elements(d, subtype.shape)?)
            };
            d.end_structure()?;
            Value::Variant {
                tag: subtype.tag,
                value: Box::new(value),
            }
        }
    };
    Ok(value)
}

/// Decodes the elements of an object that has already been entered.
fn decode_elements(d: &mut Decoder<'_>, shape: ShapeId) -> DecodeResult<IndexMap<String, Value>> {
    let elements = d.schema().shape(shape)?.elements();
    let mut slots: Vec<Option<Value>> = vec![None; elements.len()];
    while let Some(index) = d.next_element_index()? {
        let Some(element) = elements.get(index as usize) else {
            return Err(DecodeError::invalid_state("element index out of range"));
        };
        slots[index as usize] = Some(decode_value(d, element.shape, element.nullable)?);
    }
    Ok(elements
        .iter()
        .zip(slots)
        .filter_map(|(element, value)| Some((element.name.clone(), value?)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_to_plain_json() {
        let mut fields = IndexMap::new();
        fields.insert("id".to_string(), Value::Int(7));
        fields.insert("tags".to_string(), Value::List(vec![Value::Enum("A".into())]));
        let value = Value::Variant {
            tag: "item".into(),
            value: Box::new(Value::Object(fields)),
        };
        assert_eq!(
            serde_json::to_string(&value).unwrap(),
            r#"{"item":{"id":7,"tags":["A"]}}"#
        );
        assert_eq!(value.get("id"), Some(&Value::Int(7)));
    }
}
