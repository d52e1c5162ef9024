//! Canonical serialization for block hashing
//!
//! Produces a deterministic byte encoding of any `Serialize` value:
//! compact JSON text with mapping keys sorted by code point, sequences in
//! their original order, and ASCII-only string escaping. Two values that are
//! structurally equal always encode to the same bytes, regardless of the
//! order their keys were inserted in.
//!
//! Only strings, numbers, booleans, null, mappings and sequences are
//! accepted. Raw byte blobs, non-finite floats, integers wider than 64 bits
//! and non-string mapping keys fail with [`Error::UnsupportedValueKind`]; the
//! caller must convert them (hex, RFC 3339, ...) before appending.

use crate::{Error, Result};
use serde::ser::{self, Impossible, Serialize};
use std::collections::BTreeMap;

/// Serialize a value to canonical bytes
pub fn to_canonical_bytes<T>(value: &T) -> Result<Vec<u8>>
where
    T: ?Sized + Serialize,
{
    let mut ser = CanonicalSerializer::new();
    value.serialize(&mut ser)?;
    Ok(ser.finalize())
}

/// Serialize a value to its canonical text form
pub fn to_canonical_string<T>(value: &T) -> Result<String>
where
    T: ?Sized + Serialize,
{
    let bytes = to_canonical_bytes(value)?;
    String::from_utf8(bytes).map_err(|e| Error::UnsupportedValueKind(e.to_string()))
}

/// Canonical serializer
#[derive(Debug, Default)]
pub struct CanonicalSerializer {
    buffer: Vec<u8>,
}

impl CanonicalSerializer {
    /// Create new serializer
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Finalize and return bytes
    pub fn finalize(self) -> Vec<u8> {
        self.buffer
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    fn write_integer(&mut self, n: impl std::fmt::Display) {
        self.write_bytes(n.to_string().as_bytes());
    }

    /// Opens `{"variant":` for enum variants carrying data
    fn open_variant(&mut self, variant: &str) {
        self.buffer.push(b'{');
        write_escaped(&mut self.buffer, variant);
        self.buffer.push(b':');
    }

    fn write_object(&mut self, entries: BTreeMap<String, Vec<u8>>) {
        self.buffer.push(b'{');
        for (i, (key, value)) in entries.into_iter().enumerate() {
            if i > 0 {
                self.buffer.push(b',');
            }
            write_escaped(&mut self.buffer, &key);
            self.buffer.push(b':');
            self.buffer.extend_from_slice(&value);
        }
        self.buffer.push(b'}');
    }
}

/// Shortest round-trip text for a finite float
fn float_text<F>(v: F, finite: bool) -> Result<String>
where
    F: Serialize + std::fmt::Display,
{
    if !finite {
        return Err(Error::UnsupportedValueKind(format!(
            "non-finite float {}",
            v
        )));
    }
    Ok(serde_json::to_string(&v)?)
}

/// JSON string literal with every non-printable-ASCII char escaped
fn write_escaped(out: &mut Vec<u8>, s: &str) {
    out.push(b'"');
    for ch in s.chars() {
        match ch {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            '\t' => out.extend_from_slice(b"\\t"),
            '\u{08}' => out.extend_from_slice(b"\\b"),
            '\u{0c}' => out.extend_from_slice(b"\\f"),
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c as u8),
            c => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units).iter() {
                    out.extend_from_slice(format!("\\u{:04x}", unit).as_bytes());
                }
            }
        }
    }
    out.push(b'"');
}

impl<'a> ser::Serializer for &'a mut CanonicalSerializer {
    type Ok = ();
    type Error = Error;

    type SerializeSeq = SeqWriter<'a>;
    type SerializeTuple = SeqWriter<'a>;
    type SerializeTupleStruct = SeqWriter<'a>;
    type SerializeTupleVariant = SeqWriter<'a>;
    type SerializeMap = MapWriter<'a>;
    type SerializeStruct = MapWriter<'a>;
    type SerializeStructVariant = MapWriter<'a>;

    fn serialize_bool(self, v: bool) -> Result<()> {
        let text: &[u8] = if v { b"true" } else { b"false" };
        self.write_bytes(text);
        Ok(())
    }

    fn serialize_i8(self, v: i8) -> Result<()> {
        self.write_integer(v);
        Ok(())
    }

    fn serialize_i16(self, v: i16) -> Result<()> {
        self.write_integer(v);
        Ok(())
    }

    fn serialize_i32(self, v: i32) -> Result<()> {
        self.write_integer(v);
        Ok(())
    }

    fn serialize_i64(self, v: i64) -> Result<()> {
        self.write_integer(v);
        Ok(())
    }

    fn serialize_i128(self, v: i128) -> Result<()> {
        if v < i64::MIN as i128 || v > u64::MAX as i128 {
            return Err(Error::UnsupportedValueKind(format!(
                "integer {} exceeds 64 bits",
                v
            )));
        }
        self.write_integer(v);
        Ok(())
    }

    fn serialize_u8(self, v: u8) -> Result<()> {
        self.write_integer(v);
        Ok(())
    }

    fn serialize_u16(self, v: u16) -> Result<()> {
        self.write_integer(v);
        Ok(())
    }

    fn serialize_u32(self, v: u32) -> Result<()> {
        self.write_integer(v);
        Ok(())
    }

    fn serialize_u64(self, v: u64) -> Result<()> {
        self.write_integer(v);
        Ok(())
    }

    fn serialize_u128(self, v: u128) -> Result<()> {
        if v > u64::MAX as u128 {
            return Err(Error::UnsupportedValueKind(format!(
                "integer {} exceeds 64 bits",
                v
            )));
        }
        self.write_integer(v);
        Ok(())
    }

    fn serialize_f32(self, v: f32) -> Result<()> {
        let text = float_text(v, v.is_finite())?;
        self.write_bytes(text.as_bytes());
        Ok(())
    }

    fn serialize_f64(self, v: f64) -> Result<()> {
        let text = float_text(v, v.is_finite())?;
        self.write_bytes(text.as_bytes());
        Ok(())
    }

    fn serialize_char(self, v: char) -> Result<()> {
        let mut buf = [0u8; 4];
        self.serialize_str(v.encode_utf8(&mut buf))
    }

    fn serialize_str(self, v: &str) -> Result<()> {
        write_escaped(&mut self.buffer, v);
        Ok(())
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<()> {
        Err(Error::UnsupportedValueKind(format!(
            "binary blob of {} bytes; encode it as a string first",
            v.len()
        )))
    }

    fn serialize_none(self) -> Result<()> {
        self.serialize_unit()
    }

    fn serialize_some<T>(self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<()> {
        self.write_bytes(b"null");
        Ok(())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<()> {
        self.serialize_unit()
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<()> {
        self.serialize_str(variant)
    }

    fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.open_variant(variant);
        value.serialize(&mut *self)?;
        self.buffer.push(b'}');
        Ok(())
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq> {
        self.buffer.push(b'[');
        Ok(SeqWriter {
            ser: self,
            first: true,
            close_variant: false,
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<Self::SerializeTuple> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        self.open_variant(variant);
        self.buffer.push(b'[');
        Ok(SeqWriter {
            ser: self,
            first: true,
            close_variant: true,
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap> {
        Ok(MapWriter {
            ser: self,
            entries: BTreeMap::new(),
            pending_key: None,
            close_variant: false,
        })
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<Self::SerializeStruct> {
        self.serialize_map(Some(len))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        self.open_variant(variant);
        Ok(MapWriter {
            ser: self,
            entries: BTreeMap::new(),
            pending_key: None,
            close_variant: true,
        })
    }
}

/// Writer for sequences and tuples (order preserved)
#[derive(Debug)]
pub struct SeqWriter<'a> {
    ser: &'a mut CanonicalSerializer,
    first: bool,
    close_variant: bool,
}

impl SeqWriter<'_> {
    fn element<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        if !self.first {
            self.ser.buffer.push(b',');
        }
        self.first = false;
        value.serialize(&mut *self.ser)
    }

    fn close(self) -> Result<()> {
        self.ser.buffer.push(b']');
        if self.close_variant {
            self.ser.buffer.push(b'}');
        }
        Ok(())
    }
}

impl ser::SerializeSeq for SeqWriter<'_> {
    type Ok = ();
    type Error = Error;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.element(value)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

impl ser::SerializeTuple for SeqWriter<'_> {
    type Ok = ();
    type Error = Error;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.element(value)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

impl ser::SerializeTupleStruct for SeqWriter<'_> {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.element(value)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

impl ser::SerializeTupleVariant for SeqWriter<'_> {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.element(value)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

/// Writer for maps and structs
///
/// Entries are buffered and emitted in sorted key order on `end`.
#[derive(Debug)]
pub struct MapWriter<'a> {
    ser: &'a mut CanonicalSerializer,
    entries: BTreeMap<String, Vec<u8>>,
    pending_key: Option<String>,
    close_variant: bool,
}

impl MapWriter<'_> {
    fn entry<T>(&mut self, key: String, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        let encoded = to_canonical_bytes(value)?;
        self.entries.insert(key, encoded);
        Ok(())
    }

    fn close(self) -> Result<()> {
        self.ser.write_object(self.entries);
        if self.close_variant {
            self.ser.buffer.push(b'}');
        }
        Ok(())
    }
}

impl ser::SerializeMap for MapWriter<'_> {
    type Ok = ();
    type Error = Error;

    fn serialize_key<T>(&mut self, key: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.pending_key = Some(key.serialize(MapKeySerializer)?);
        Ok(())
    }

    fn serialize_value<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        let key = self
            .pending_key
            .take()
            .ok_or_else(|| Error::UnsupportedValueKind("map value without a key".to_string()))?;
        self.entry(key, value)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

impl ser::SerializeStruct for MapWriter<'_> {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.entry(key.to_string(), value)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

impl ser::SerializeStructVariant for MapWriter<'_> {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.entry(key.to_string(), value)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

/// Accepts only string-like map keys
struct MapKeySerializer;

fn non_string_key(kind: &str) -> Error {
    Error::UnsupportedValueKind(format!("map key must be a string, got {}", kind))
}

impl ser::Serializer for MapKeySerializer {
    type Ok = String;
    type Error = Error;

    type SerializeSeq = Impossible<String, Error>;
    type SerializeTuple = Impossible<String, Error>;
    type SerializeTupleStruct = Impossible<String, Error>;
    type SerializeTupleVariant = Impossible<String, Error>;
    type SerializeMap = Impossible<String, Error>;
    type SerializeStruct = Impossible<String, Error>;
    type SerializeStructVariant = Impossible<String, Error>;

    fn serialize_str(self, v: &str) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_char(self, v: char) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<String> {
        Ok(variant.to_string())
    }

    fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> Result<String>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_bool(self, _v: bool) -> Result<String> {
        Err(non_string_key("bool"))
    }

    fn serialize_i8(self, _v: i8) -> Result<String> {
        Err(non_string_key("integer"))
    }

    fn serialize_i16(self, _v: i16) -> Result<String> {
        Err(non_string_key("integer"))
    }

    fn serialize_i32(self, _v: i32) -> Result<String> {
        Err(non_string_key("integer"))
    }

    fn serialize_i64(self, _v: i64) -> Result<String> {
        Err(non_string_key("integer"))
    }

    fn serialize_u8(self, _v: u8) -> Result<String> {
        Err(non_string_key("integer"))
    }

    fn serialize_u16(self, _v: u16) -> Result<String> {
        Err(non_string_key("integer"))
    }

    fn serialize_u32(self, _v: u32) -> Result<String> {
        Err(non_string_key("integer"))
    }

    fn serialize_u64(self, _v: u64) -> Result<String> {
        Err(non_string_key("integer"))
    }

    fn serialize_f32(self, _v: f32) -> Result<String> {
        Err(non_string_key("float"))
    }

    fn serialize_f64(self, _v: f64) -> Result<String> {
        Err(non_string_key("float"))
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<String> {
        Err(non_string_key("bytes"))
    }

    fn serialize_none(self) -> Result<String> {
        Err(non_string_key("null"))
    }

    fn serialize_some<T>(self, _value: &T) -> Result<String>
    where
        T: ?Sized + Serialize,
    {
        Err(non_string_key("option"))
    }

    fn serialize_unit(self) -> Result<String> {
        Err(non_string_key("null"))
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<String> {
        Err(non_string_key("unit struct"))
    }

    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<String>
    where
        T: ?Sized + Serialize,
    {
        Err(non_string_key("enum variant"))
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq> {
        Err(non_string_key("sequence"))
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple> {
        Err(non_string_key("tuple"))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        Err(non_string_key("tuple struct"))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Err(non_string_key("enum variant"))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap> {
        Err(non_string_key("map"))
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeStruct> {
        Err(non_string_key("struct"))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(non_string_key("enum variant"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_sorts_nested_keys_and_keeps_sequence_order() {
        let value = json!({
            "b": [3, 1, 2],
            "a": {"d": null, "c": true},
        });
        assert_eq!(
            to_canonical_string(&value).unwrap(),
            r#"{"a":{"c":true,"d":null},"b":[3,1,2]}"#
        );
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        #[derive(Serialize)]
        struct Forward {
            user_id: &'static str,
            activity: &'static str,
        }

        let mut first = HashMap::new();
        first.insert("user_id", "u1");
        first.insert("activity", "a1");

        let mut second = HashMap::new();
        second.insert("activity", "a1");
        second.insert("user_id", "u1");

        let as_struct = Forward {
            user_id: "u1",
            activity: "a1",
        };

        let a = to_canonical_bytes(&first).unwrap();
        let b = to_canonical_bytes(&second).unwrap();
        let c = to_canonical_bytes(&as_struct).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a, br#"{"activity":"a1","user_id":"u1"}"#.to_vec());
    }

    #[test]
    fn test_numbers() {
        let value = json!({"points": 250, "score": 8.7, "neg": -3, "whole": 1.0});
        assert_eq!(
            to_canonical_string(&value).unwrap(),
            r#"{"neg":-3,"points":250,"score":8.7,"whole":1.0}"#
        );
    }

    #[test]
    fn test_strings_are_ascii_escaped() {
        let value = json!({"name": "Caf\u{e9} \"best\"\n", "emoji": "\u{1F600}"});
        assert_eq!(
            to_canonical_string(&value).unwrap(),
            r#"{"emoji":"\ud83d\ude00","name":"Caf\u00e9 \"best\"\n"}"#
        );
    }

    #[test]
    fn test_control_characters() {
        assert_eq!(
            to_canonical_string("a\u{1}b\u{7f}").unwrap(),
            r#""a\u0001b\u007f""#
        );
    }

    #[test]
    fn test_semantic_difference_changes_bytes() {
        let a = to_canonical_bytes(&json!({"points": 1})).unwrap();
        let b = to_canonical_bytes(&json!({"points": "1"})).unwrap();
        let c = to_canonical_bytes(&json!({"points": [1]})).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn test_enums_are_externally_tagged() {
        #[derive(Serialize)]
        enum Risk {
            Low,
            Scored { score: u32, label: &'static str },
            Pair(u8, u8),
        }

        assert_eq!(to_canonical_string(&Risk::Low).unwrap(), r#""Low""#);
        assert_eq!(
            to_canonical_string(&Risk::Scored { score: 3, label: "x" }).unwrap(),
            r#"{"Scored":{"label":"x","score":3}}"#
        );
        assert_eq!(
            to_canonical_string(&Risk::Pair(1, 2)).unwrap(),
            r#"{"Pair":[1,2]}"#
        );
    }

    #[test]
    fn test_option_and_unit() {
        let value: (Option<u8>, Option<u8>, ()) = (Some(4), None, ());
        assert_eq!(to_canonical_string(&value).unwrap(), "[4,null,null]");
    }

    #[test]
    fn test_rejects_binary_blob() {
        let err = to_canonical_bytes(serde_bytes::Bytes::new(b"\x00\x01")).unwrap_err();
        assert!(matches!(err, Error::UnsupportedValueKind(_)));
    }

    #[test]
    fn test_rejects_non_finite_float() {
        let err = to_canonical_bytes(&f64::NAN).unwrap_err();
        assert!(matches!(err, Error::UnsupportedValueKind(_)));

        let err = to_canonical_bytes(&vec![1.0f32, f32::INFINITY]).unwrap_err();
        assert!(matches!(err, Error::UnsupportedValueKind(_)));
    }

    #[test]
    fn test_rejects_non_string_keys() {
        let mut map = HashMap::new();
        map.insert(7u32, "seven");
        let err = to_canonical_bytes(&map).unwrap_err();
        assert!(matches!(err, Error::UnsupportedValueKind(_)));
    }

    #[test]
    fn test_rejects_wide_integers() {
        assert!(to_canonical_bytes(&(u64::MAX as u128)).is_ok());
        let err = to_canonical_bytes(&(u64::MAX as u128 + 1)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedValueKind(_)));
    }
}
