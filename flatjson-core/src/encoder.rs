//! Writes [`Value`]s in their flattened wire form.
//!
//! Flattened objects and maps are written straight into the enclosing object, polymorphic values
//! lead with their discriminator, and names go through the same naming strategy the decoder
//! expects.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::codec::CodecState;
use crate::descriptor::{SchemaDescriptor, VALUE_WRAPPER_ELEMENT};
use crate::error::EncodeError;
use crate::shape::{ScalarKind, ShapeId, ShapeKind};
use crate::value::Value;
use crate::writer::Writer;

pub(crate) struct Encoder<'a> {
    state: &'a CodecState,
    writer: Writer,
}

impl<'a> Encoder<'a> {
    pub fn new(state: &'a CodecState) -> Self {
        Encoder {
            state,
            writer: Writer::new(),
        }
    }

    pub fn finish(self) -> String {
        self.writer.finish()
    }

    fn descriptor(&self, shape: ShapeId) -> Result<Arc<SchemaDescriptor>, EncodeError> {
        Ok(self.state.cache.get_or_build(
            &self.state.schema,
            shape,
            &self.state.descriptor_config,
        )?)
    }

    fn mismatch(&self, shape: ShapeId, value: &Value) -> Result<(), EncodeError> {
        let s = self.state.schema.shape(shape)?;
        let expected = match &s.kind {
            ShapeKind::Scalar(kind) => kind.name(),
            ShapeKind::Enum { .. } => "an enum entry",
            ShapeKind::Object { .. } => "an object",
            ShapeKind::List { .. } => "a list",
            ShapeKind::Map { .. } => "a map",
            ShapeKind::Polymorphic { .. } => "a polymorphic value",
        };
        Err(EncodeError::Mismatch {
            shape: s.name.clone(),
            expected,
            found: value.kind_name(),
        })
    }

    pub fn encode(&mut self, shape: ShapeId, value: &Value, nullable: bool) -> Result<(), EncodeError> {
        let state = self.state;
        let s = state.schema.shape(shape)?;
        match (&s.kind, value) {
            (_, Value::Null) if nullable => self.writer.null(),
            (ShapeKind::Scalar(ScalarKind::Bool), Value::Bool(b)) => self.writer.bool(*b),
            (ShapeKind::Scalar(ScalarKind::Int), Value::Int(i)) => self.writer.i64(*i),
            (ShapeKind::Scalar(ScalarKind::UInt), Value::UInt(u)) => self.writer.u64(*u),
            (ShapeKind::Scalar(ScalarKind::UInt), Value::Int(i)) if *i >= 0 => {
                self.writer.i64(*i)
            }
            (ShapeKind::Scalar(ScalarKind::Float), Value::Float(f)) => self.writer.f64(*f)?,
            (ShapeKind::Scalar(ScalarKind::Float), Value::Int(i)) => self.writer.i64(*i),
            (ShapeKind::Scalar(ScalarKind::String), Value::String(v)) => self.writer.string(v),
            (ShapeKind::Enum { variants }, Value::Enum(v) | Value::String(v)) => {
                if !variants.contains(v) {
                    return Err(EncodeError::UnknownEnumVariant {
                        shape: s.name.clone(),
                        variant: v.clone(),
                    });
                }
                self.writer.string(v);
            }
            (ShapeKind::Object { .. }, Value::Object(fields)) => {
                self.writer.begin_object();
                self.fields(shape, fields, None)?;
                self.writer.end_object();
            }
            (
                ShapeKind::List {
                    item,
                    item_nullable,
                },
                Value::List(items),
            ) => {
                self.writer.begin_array();
                for v in items {
                    self.encode(*item, v, *item_nullable)?;
                }
                self.writer.end_array();
            }
            (ShapeKind::Map { .. }, Value::Map(entries)) => {
                self.writer.begin_object();
                self.entries(shape, entries)?;
                self.writer.end_object();
            }
            (ShapeKind::Polymorphic { subtypes, .. }, Value::Variant { tag, value }) => {
                let Some((_, concrete)) = subtypes.iter().find(|(t, _)| t == tag) else {
                    return Err(EncodeError::UnknownSubtype {
                        shape: s.name.clone(),
                        tag: tag.clone(),
                    });
                };
                let descriptor = self.descriptor(shape)?;
                let discriminator = descriptor
                    .class_discriminator()
                    .unwrap_or(crate::config::DEFAULT_CLASS_DISCRIMINATOR);

                self.writer.begin_object();
                self.writer.key(discriminator);
                self.writer.string(tag);
                match (state.schema.shape(*concrete)?.is_object(), &**value) {
                    (true, Value::Object(fields)) => {
                        self.fields(*concrete, fields, Some(discriminator))?
                    }
                    (true, other) => return self.mismatch(*concrete, other),
                    (false, other) => {
                        self.writer.key(VALUE_WRAPPER_ELEMENT);
                        self.encode(*concrete, other, false)?;
                    }
                }
                self.writer.end_object();
            }
            (_, other) => return self.mismatch(shape, other),
        }
        Ok(())
    }

    /// Writes the elements of an object into the object currently open, descending into
    /// flattened elements.
    fn fields(
        &mut self,
        shape: ShapeId,
        fields: &IndexMap<String, Value>,
        discriminator: Option<&str>,
    ) -> Result<(), EncodeError> {
        let state = self.state;
        let s = state.schema.shape(shape)?;
        let descriptor = self.descriptor(shape)?;
        let explicit_nulls = state.config.explicit_nulls;

        for (element, meta) in s.elements().iter().zip(descriptor.direct_elements()) {
            let value = fields.get(&element.name);
            let missing = || EncodeError::MissingField {
                shape: s.name.clone(),
                element: element.name.clone(),
            };

            if element.flatten {
                match value {
                    None | Some(Value::Null) if element.optional => {}
                    // Left out, it decodes as an implicit null.
                    None | Some(Value::Null) if element.nullable && !explicit_nulls => {}
                    Some(Value::Null) if element.nullable => {
                        return Err(EncodeError::FlattenedNull {
                            shape: s.name.clone(),
                            element: element.name.clone(),
                        })
                    }
                    None | Some(Value::Null) => return Err(missing()),
                    Some(Value::Object(inner)) => self.fields(element.shape, inner, discriminator)?,
                    Some(Value::Map(entries)) => self.entries(element.shape, entries)?,
                    Some(other) => return self.mismatch(element.shape, other),
                }
                continue;
            }

            // The discriminator has been written already.
            if discriminator == Some(meta.name.as_str()) {
                continue;
            }

            match value {
                None if element.optional => {}
                None | Some(Value::Null) if element.nullable && !explicit_nulls => {}
                None if element.nullable => {
                    self.writer.key(&meta.name);
                    self.writer.null();
                }
                None => return Err(missing()),
                Some(v) => {
                    self.writer.key(&meta.name);
                    self.encode(element.shape, v, element.nullable)?;
                }
            }
        }
        Ok(())
    }

    /// Writes map entries into the object currently open.
    fn entries(&mut self, shape: ShapeId, entries: &[(Value, Value)]) -> Result<(), EncodeError> {
        let state = self.state;
        let ShapeKind::Map {
            key,
            value,
            value_nullable,
        } = state.schema.shape(shape)?.kind
        else {
            return Ok(());
        };
        for (k, v) in entries {
            let name = self.key_string(key, k)?;
            self.writer.key(&name);
            self.encode(value, v, value_nullable)?;
        }
        Ok(())
    }

    fn key_string(&self, shape: ShapeId, key: &Value) -> Result<String, EncodeError> {
        match key {
            Value::String(s) | Value::Enum(s) => Ok(s.clone()),
            Value::Int(i) => Ok(i.to_string()),
            Value::UInt(u) => Ok(u.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Float(f) if f.is_finite() => Ok(f.to_string()),
            Value::Float(f) => Err(EncodeError::NonFiniteFloat { value: *f }),
            structured if self.state.config.structured_map_keys => {
                let mut nested = Encoder::new(self.state);
                nested.encode(shape, structured, false)?;
                Ok(nested.finish())
            }
            other => {
                self.mismatch(shape, other)?;
                Ok(String::new())
            }
        }
    }
}
