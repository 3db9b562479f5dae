use crate::statics;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, de};

/// One row as emitted by the matching pipeline: an insertion-ordered field map.
pub type Row = IndexMap<String, RowValue>;

/// Keeps I64, U64 and F64 apart so numeric fields survive a load/commit cycle unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum RowNumber {
    I64(i64),
    U64(u64),
    F64(f64),
}

impl RowNumber {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RowNumber::I64(v) => Some(*v),
            RowNumber::U64(v) => i64::try_from(*v).ok(),
            RowNumber::F64(_) => None,
        }
    }
}

impl<'de> Deserialize<'de> for RowNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct NumberVisitor;

        impl<'de> de::Visitor<'de> for NumberVisitor {
            type Value = RowNumber;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a JSON number")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(RowNumber::I64(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(RowNumber::U64(v))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
                Ok(RowNumber::F64(v))
            }
        }

        deserializer.deserialize_any(NumberVisitor)
    }
}

/// A field value inside a row (JSON data model, JSON5 on input).
#[derive(Debug, Clone, PartialEq)]
pub enum RowValue {
    Null,
    Bool(bool),
    Number(RowNumber),
    String(String),
    Array(Vec<RowValue>),
    Object(Row),
}

impl From<bool> for RowValue {
    fn from(v: bool) -> Self {
        RowValue::Bool(v)
    }
}

impl From<&str> for RowValue {
    fn from(v: &str) -> Self {
        RowValue::String(v.to_owned())
    }
}

impl From<String> for RowValue {
    fn from(v: String) -> Self {
        RowValue::String(v)
    }
}

impl From<i64> for RowValue {
    fn from(v: i64) -> Self {
        RowValue::Number(RowNumber::I64(v))
    }
}

impl RowValue {
    pub fn as_object(&self) -> Option<&Row> {
        match self {
            RowValue::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[RowValue]> {
        match self {
            RowValue::Array(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RowValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RowValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&RowValue> {
        self.as_object().and_then(|m| m.get(key))
    }

    /// Null or an empty string.
    pub fn is_blank(&self) -> bool {
        match self {
            RowValue::Null => true,
            RowValue::String(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            RowValue::Null => "null",
            RowValue::Bool(_) => "bool",
            RowValue::Number(_) => "number",
            RowValue::String(_) => "string",
            RowValue::Array(_) => "array",
            RowValue::Object(_) => "object",
        }
    }

    pub fn parse_json5(text: &str) -> anyhow::Result<RowValue> {
        Ok(json5::from_str::<RowValue>(text)?)
    }

    pub fn to_json_compact(&self) -> String {
        let mut out = String::new();
        self.write_json(&mut out, 0, None);
        out
    }

    pub fn to_json_pretty(&self) -> String {
        self.to_json_pretty_with_newline(statics::NL_LF)
    }

    /// Pretty output with 4-space indentation, quoted keys and a trailing newline.
    pub fn to_json_pretty_with_newline(&self, newline: &str) -> String {
        let mut out = String::new();
        self.write_json(&mut out, 0, Some(newline));
        out.push_str(newline);
        out
    }

    fn write_json(&self, out: &mut String, indent: usize, newline: Option<&str>) {
        match self {
            RowValue::Null => out.push_str("null"),
            RowValue::Bool(v) => out.push_str(if *v { "true" } else { "false" }),
            RowValue::Number(n) => n.write_json(out),
            RowValue::String(s) => write_escaped_string(out, s),
            RowValue::Array(values) => {
                out.push('[');
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    match newline {
                        Some(nl) => {
                            out.push_str(nl);
                            out.push_str(&" ".repeat(indent + 4));
                        }
                        None if i > 0 => out.push(' '),
                        None => {}
                    }
                    v.write_json(out, indent + 4, newline);
                }
                if let Some(nl) = newline
                    && !values.is_empty()
                {
                    out.push_str(nl);
                    out.push_str(&" ".repeat(indent));
                }
                out.push(']');
            }
            RowValue::Object(map) => {
                out.push('{');
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    match newline {
                        Some(nl) => {
                            out.push_str(nl);
                            out.push_str(&" ".repeat(indent + 4));
                        }
                        None if i > 0 => out.push(' '),
                        None => {}
                    }
                    write_escaped_string(out, k);
                    out.push_str(": ");
                    v.write_json(out, indent + 4, newline);
                }
                if let Some(nl) = newline
                    && !map.is_empty()
                {
                    out.push_str(nl);
                    out.push_str(&" ".repeat(indent));
                }
                out.push('}');
            }
        }
    }
}

impl RowNumber {
    fn write_json(&self, out: &mut String) {
        match self {
            RowNumber::I64(v) => out.push_str(&v.to_string()),
            RowNumber::U64(v) => out.push_str(&v.to_string()),
            RowNumber::F64(v) => {
                if v.is_nan() {
                    out.push_str("NaN");
                } else if v.is_infinite() {
                    if v.is_sign_negative() {
                        out.push_str("-Infinity");
                    } else {
                        out.push_str("Infinity");
                    }
                } else {
                    let mut buf = ryu::Buffer::new();
                    out.push_str(buf.format(*v));
                }
            }
        }
    }
}

fn write_escaped_string(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                use std::fmt::Write as _;
                write!(out, "\\u{:04x}", c as u32).ok();
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

impl<'de> Deserialize<'de> for RowValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ValueVisitor;

        impl<'de> de::Visitor<'de> for ValueVisitor {
            type Value = RowValue;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a JSON value")
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(RowValue::Null)
            }

            fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(RowValue::Null)
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
                Ok(RowValue::Bool(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(RowValue::Number(RowNumber::I64(v)))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(RowValue::Number(RowNumber::U64(v)))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
                Ok(RowValue::Number(RowNumber::F64(v)))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(RowValue::String(v.to_owned()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
                Ok(RowValue::String(v))
            }

            fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut values = Vec::new();
                while let Some(value) = seq.next_element::<RowValue>()? {
                    values.push(value);
                }
                Ok(RowValue::Array(values))
            }

            fn visit_map<A: de::MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut values = IndexMap::new();
                while let Some((key, value)) = map.next_entry::<String, RowValue>()? {
                    values.insert(key, value);
                }
                Ok(RowValue::Object(values))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::{RowNumber, RowValue};
    use crate::statics;
    use indexmap::IndexMap;

    #[test]
    fn parse_json5_accepts_plain_json_and_trailing_commas() {
        let v = RowValue::parse_json5(r#"{ "original": "Omega 10049", handle: null, n: 3, }"#)
            .unwrap();
        assert_eq!(v.get("original").and_then(|v| v.as_str()), Some("Omega 10049"));
        assert_eq!(v.get("handle"), Some(&RowValue::Null));
        assert_eq!(v.get("n"), Some(&RowValue::Number(RowNumber::I64(3))));
    }

    #[test]
    fn parse_json5_keeps_float_distinct_from_integer() {
        let v = RowValue::parse_json5("[1, 1.0]").unwrap();
        let arr = v.as_array().unwrap();
        assert!(matches!(arr[0], RowValue::Number(RowNumber::I64(1))));
        assert!(matches!(arr[1], RowValue::Number(RowNumber::F64(_))));
    }

    #[test]
    fn pretty_output_uses_four_space_indent_and_crlf_when_asked() {
        let mut map = IndexMap::new();
        map.insert("a".to_string(), RowValue::Bool(true));
        map.insert("b".to_string(), RowValue::Array(vec![]));
        let v = RowValue::Object(map);

        assert_eq!(v.to_json_pretty(), "{\n    \"a\": true,\n    \"b\": []\n}\n");
        assert_eq!(
            v.to_json_pretty_with_newline(statics::NL_CRLF),
            "{\r\n    \"a\": true,\r\n    \"b\": []\r\n}\r\n"
        );
    }

    #[test]
    fn compact_output_escapes_control_characters() {
        let v = RowValue::String("a\"b\n\u{1}".to_string());
        assert_eq!(v.to_json_compact(), "\"a\\\"b\\n\\u0001\"");
    }

    #[test]
    fn compact_output_separates_items_with_spaces() {
        let v = RowValue::parse_json5("{ ids: ['x', 'y'], f: 0.5 }").unwrap();
        assert_eq!(v.to_json_compact(), "{\"ids\": [\"x\", \"y\"], \"f\": 0.5}");
    }

    #[test]
    fn is_blank_covers_null_and_empty_string_only() {
        assert!(RowValue::Null.is_blank());
        assert!(RowValue::from("").is_blank());
        assert!(!RowValue::from(" ").is_blank());
        assert!(!RowValue::Bool(false).is_blank());
    }
}
