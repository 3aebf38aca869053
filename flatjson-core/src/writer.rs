//! Compact JSON output with automatic separators.

use crate::error::EncodeError;

#[derive(Debug, Default)]
pub struct Writer {
    out: String,
    /// One entry per open structure: whether nothing has been written into it yet.
    first: Vec<bool>,
    after_key: bool,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(self) -> String {
        self.out
    }

    fn before_value(&mut self) {
        if self.after_key {
            self.after_key = false;
            return;
        }
        if let Some(first) = self.first.last_mut() {
            if *first {
                *first = false;
            } else {
                self.out.push(',');
            }
        }
    }

    pub fn begin_object(&mut self) {
        self.before_value();
        self.out.push('{');
        self.first.push(true);
    }

    pub fn end_object(&mut self) {
        self.first.pop();
        self.out.push('}');
    }

    pub fn begin_array(&mut self) {
        self.before_value();
        self.out.push('[');
        self.first.push(true);
    }

    pub fn end_array(&mut self) {
        self.first.pop();
        self.out.push(']');
    }

    pub fn key(&mut self, name: &str) {
        self.string(name);
        self.out.push(':');
        self.after_key = true;
    }

    pub fn null(&mut self) {
        self.before_value();
        self.out.push_str("null");
    }

    pub fn bool(&mut self, value: bool) {
        self.before_value();
        self.out.push_str(if value { "true" } else { "false" });
    }

    pub fn i64(&mut self, value: i64) {
        self.before_value();
        self.out.push_str(&value.to_string());
    }

    pub fn u64(&mut self, value: u64) {
        self.before_value();
        self.out.push_str(&value.to_string());
    }

    pub fn f64(&mut self, value: f64) -> Result<(), EncodeError> {
        let number =
            serde_json::Number::from_f64(value).ok_or(EncodeError::NonFiniteFloat { value })?;
        self.before_value();
        self.out.push_str(&number.to_string());
        Ok(())
    }

    pub fn string(&mut self, value: &str) {
        self.before_value();
        self.out
            .push_str(&serde_json::Value::from(value).to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separators_and_escapes() {
        let mut w = Writer::new();
        w.begin_object();
        w.key("a\"b");
        w.begin_array();
        w.i64(-1);
        w.null();
        w.f64(1.5).unwrap();
        w.end_array();
        w.key("c");
        w.bool(true);
        w.end_object();
        assert_eq!(w.finish(), r#"{"a\"b":[-1,null,1.5],"c":true}"#);
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        let mut w = Writer::new();
        assert!(matches!(
            w.f64(f64::NAN),
            Err(EncodeError::NonFiniteFloat { .. })
        ));
    }
}
