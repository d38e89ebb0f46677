// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

use std::fmt;
use std::ops;

use crate::{Arena, Error};

/// Options attached to a [`Value::Regex`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegexOptions(u32);

impl RegexOptions {
    pub const NONE: RegexOptions = RegexOptions(0);
    pub const CASE_INSENSITIVE: RegexOptions = RegexOptions(0x1);
    pub const SHELL_PATTERN: RegexOptions = RegexOptions(0x2);
    pub const ALL: RegexOptions = RegexOptions(0x3);

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Recover options from their wire representation.
    /// Unknown bits are an error, not silently dropped.
    pub fn from_bits(bits: u32) -> Result<RegexOptions, Error> {
        if bits & !Self::ALL.0 != 0 {
            return Err(Error::invalid(format!("unknown regex options: {bits:#x}")));
        }
        Ok(RegexOptions(bits))
    }

    pub const fn contains(self, other: RegexOptions) -> bool {
        self.0 & other.0 == other.0
    }
}

impl ops::BitOr for RegexOptions {
    type Output = RegexOptions;

    fn bitor(self, rhs: RegexOptions) -> RegexOptions {
        RegexOptions(self.0 | rhs.0)
    }
}

/// ValueKind discriminates the variants of a [`Value`], for error messages
/// and for the typed-xattr mapping of the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Boolean,
    Int32,
    UInt32,
    Int64,
    UInt64,
    String,
    Binary,
    Regex,
    Sequence,
    Map,
}

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Boolean => "boolean",
            ValueKind::Int32 => "int32",
            ValueKind::UInt32 => "uint32",
            ValueKind::Int64 => "int64",
            ValueKind::UInt64 => "uint64",
            ValueKind::String => "string",
            ValueKind::Binary => "binary",
            ValueKind::Regex => "regex",
            ValueKind::Sequence => "sequence",
            ValueKind::Map => "map",
        }
    }

    /// The inverse of [`ValueKind::name`], used by the `xattrs_map`
    /// configuration key.
    pub fn from_name(name: &str) -> Option<ValueKind> {
        Some(match name {
            "boolean" => ValueKind::Boolean,
            "int32" => ValueKind::Int32,
            "uint32" => ValueKind::UInt32,
            "int64" => ValueKind::Int64,
            "uint64" => ValueKind::UInt64,
            "string" => ValueKind::String,
            "binary" => ValueKind::Binary,
            "regex" => ValueKind::Regex,
            "sequence" => ValueKind::Sequence,
            "map" => ValueKind::Map,
            _ => return None,
        })
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value is the universal payload of the document model: extended attributes,
/// filter operands and configuration entries are all Values.
///
/// A Value only ever borrows from a single arena. [`Value::clone_into`]
/// deep-copies into another arena; the copy lives exactly as long as its
/// destination [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    Boolean(bool),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    String(&'a str),
    Binary(&'a [u8]),
    Regex {
        pattern: &'a str,
        options: RegexOptions,
    },
    /// An ordered list of values, conventionally of a single kind.
    Sequence(&'a [Value<'a>]),
    Map(Map<'a>),
}

/// A single `key: value` entry of a [`Map`].
///
/// The value is optional: a pair with no value records that an attribute
/// exists (or could not be fetched) without carrying a payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pair<'a> {
    pub key: &'a str,
    pub value: Option<Value<'a>>,
}

/// An insertion-ordered string-keyed map of [`Value`]s.
///
/// Maps are small (a handful of xattrs); lookup is a linear scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Map<'a>(&'a [Pair<'a>]);

impl<'a> Value<'a> {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Int32(_) => ValueKind::Int32,
            Value::UInt32(_) => ValueKind::UInt32,
            Value::Int64(_) => ValueKind::Int64,
            Value::UInt64(_) => ValueKind::UInt64,
            Value::String(_) => ValueKind::String,
            Value::Binary(_) => ValueKind::Binary,
            Value::Regex { .. } => ValueKind::Regex,
            Value::Sequence(_) => ValueKind::Sequence,
            Value::Map(_) => ValueKind::Map,
        }
    }

    pub fn as_str(&self) -> Option<&'a str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&'a [u8]> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&'a [Value<'a>]> {
        match self {
            Value::Sequence(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<Map<'a>> {
        match self {
            Value::Map(m) => Some(*m),
            _ => None,
        }
    }

    /// Deep-copy this value into `alloc`.
    pub fn clone_into<'b>(&self, alloc: &'b Arena) -> Value<'b> {
        match *self {
            Value::Boolean(b) => Value::Boolean(b),
            Value::Int32(i) => Value::Int32(i),
            Value::UInt32(u) => Value::UInt32(u),
            Value::Int64(i) => Value::Int64(i),
            Value::UInt64(u) => Value::UInt64(u),
            Value::String(s) => Value::String(alloc.alloc_str(s)),
            Value::Binary(b) => Value::Binary(alloc.alloc_slice_copy(b)),
            Value::Regex { pattern, options } => Value::Regex {
                pattern: alloc.alloc_str(pattern),
                options,
            },
            Value::Sequence(values) => Value::Sequence(
                alloc.alloc_slice_fill_iter(values.iter().map(|v| v.clone_into(alloc))),
            ),
            Value::Map(map) => Value::Map(map.clone_into(alloc)),
        }
    }

    /// Check per-variant well-formedness, recursively.
    pub fn validate(&self) -> Result<(), Error> {
        match self {
            Value::Boolean(_)
            | Value::Int32(_)
            | Value::UInt32(_)
            | Value::Int64(_)
            | Value::UInt64(_)
            | Value::String(_)
            | Value::Binary(_) => Ok(()),
            Value::Regex { options, .. } => RegexOptions::from_bits(options.bits()).map(|_| ()),
            Value::Sequence(values) => values.iter().try_for_each(Value::validate),
            Value::Map(map) => map.validate(),
        }
    }

    /// Render this value as a `serde_json::Value` for debugging and logging.
    /// Binary payloads are rendered as hex strings.
    pub fn debug_json(&self) -> serde_json::Value {
        use serde_json::json;

        match *self {
            Value::Boolean(b) => json!(b),
            Value::Int32(i) => json!(i),
            Value::UInt32(u) => json!(u),
            Value::Int64(i) => json!(i),
            Value::UInt64(u) => json!(u),
            Value::String(s) => json!(s),
            Value::Binary(b) => {
                json!(b.iter().map(|b| format!("{b:02x}")).collect::<String>())
            }
            Value::Regex { pattern, options } => {
                json!({"regex": pattern, "options": options.bits()})
            }
            Value::Sequence(values) => {
                json!(values.iter().map(Value::debug_json).collect::<Vec<_>>())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.iter()
                    .map(|pair| {
                        let value = match &pair.value {
                            Some(value) => value.debug_json(),
                            None => serde_json::Value::Null,
                        };
                        (pair.key.to_owned(), value)
                    })
                    .collect(),
            ),
        }
    }
}

impl<'a> Map<'a> {
    pub const EMPTY: Map<'static> = Map(&[]);

    pub const fn new(pairs: &'a [Pair<'a>]) -> Map<'a> {
        Map(pairs)
    }

    /// Build a map in `alloc` from borrowed entries, deep-copying every key
    /// and value.
    pub fn build<'b>(alloc: &'b Arena, entries: &[(&str, Option<Value<'_>>)]) -> Map<'b> {
        Map(alloc.alloc_slice_fill_iter(entries.iter().map(|(key, value)| Pair {
            key: alloc.alloc_str(key),
            value: value.as_ref().map(|v| v.clone_into(alloc)),
        })))
    }

    pub fn pairs(&self) -> &'a [Pair<'a>] {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'a, Pair<'a>> {
        self.0.iter()
    }

    pub fn get(&self, key: &str) -> Option<&'a Pair<'a>> {
        self.0.iter().find(|pair| pair.key == key)
    }

    /// Look up the value stored under `key`. Returns None both when the key
    /// is absent and when it is present without a value.
    pub fn value(&self, key: &str) -> Option<&'a Value<'a>> {
        self.get(key).and_then(|pair| pair.value.as_ref())
    }

    pub fn clone_into<'b>(&self, alloc: &'b Arena) -> Map<'b> {
        Map(alloc.alloc_slice_fill_iter(self.0.iter().map(|pair| Pair {
            key: alloc.alloc_str(pair.key),
            value: pair.value.as_ref().map(|v| v.clone_into(alloc)),
        })))
    }

    pub fn validate(&self) -> Result<(), Error> {
        for (index, pair) in self.0.iter().enumerate() {
            if self.0[..index].iter().any(|prior| prior.key == pair.key) {
                return Err(Error::invalid(format!("duplicate map key '{}'", pair.key)));
            }
            if let Some(value) = &pair.value {
                value.validate()?;
            }
        }
        Ok(())
    }
}

impl<'a> Default for Map<'a> {
    fn default() -> Map<'a> {
        Map(&[])
    }
}

impl<'a> IntoIterator for &Map<'a> {
    type Item = &'a Pair<'a>;
    type IntoIter = std::slice::Iter<'a, Pair<'a>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn fixture<'a>(alloc: &'a Arena) -> Value<'a> {
        let lov = Value::Binary(b"\x0b\xd1\x0b\xd0");
        let names = Value::Sequence(alloc.alloc_slice_copy(&[
            Value::String("user.foo"),
            Value::String("trusted.lov"),
        ]));
        Value::Map(Map::build(
            alloc,
            &[
                ("nlink", Some(Value::UInt32(2))),
                ("trusted.lov", Some(lov)),
                ("names", Some(names)),
                ("absent", None),
            ],
        ))
    }

    #[test]
    fn clone_is_structurally_equal() {
        let alloc = Arena::new();
        let value = fixture(&alloc);

        let other = Arena::new();
        let clone = value.clone_into(&other);
        assert_eq!(clone, value.clone_into(&other));
        assert_eq!(clone.debug_json(), value.debug_json());

        // A clone of a clone is the same value again.
        let third = Arena::new();
        assert_eq!(clone.clone_into(&third).debug_json(), value.debug_json());
    }

    #[test]
    fn map_lookup_is_insertion_ordered() {
        let alloc = Arena::new();
        let Value::Map(map) = fixture(&alloc) else {
            unreachable!()
        };

        let keys = map.iter().map(|pair| pair.key).collect::<Vec<_>>();
        assert_eq!(keys, &["nlink", "trusted.lov", "names", "absent"]);

        assert_eq!(map.value("nlink"), Some(&Value::UInt32(2)));
        assert_eq!(map.value("absent"), None);
        assert!(map.get("absent").is_some());
        assert!(map.get("missing").is_none());
    }

    #[test]
    fn validate_rejects_duplicate_keys() {
        let alloc = Arena::new();
        let map = Map::build(
            &alloc,
            &[("a", Some(Value::Int32(1))), ("a", Some(Value::Int32(2)))],
        );
        assert!(matches!(map.validate(), Err(Error::Invalid(_))));
    }

    #[test]
    fn validate_rejects_unknown_regex_options() {
        assert!(RegexOptions::from_bits(0x4).is_err());
        assert_eq!(
            RegexOptions::from_bits(0x3),
            Ok(RegexOptions::CASE_INSENSITIVE | RegexOptions::SHELL_PATTERN),
        );
    }

    // A tree of value shapes quickcheck can generate; realized into an
    // arena before every check.
    #[derive(Debug, Clone)]
    enum Shape {
        Boolean(bool),
        Int32(i32),
        UInt64(u64),
        Text(String),
        Bytes(Vec<u8>),
        Seq(Vec<Shape>),
        Dict(Vec<(String, Option<Shape>)>),
    }

    impl quickcheck::Arbitrary for Shape {
        fn arbitrary(g: &mut quickcheck::Gen) -> Shape {
            // Shrink the size at each level so trees stay shallow.
            let depth = g.size();
            let choices = if depth <= 1 { 5 } else { 7 };
            match u8::arbitrary(g) % choices {
                0 => Shape::Boolean(bool::arbitrary(g)),
                1 => Shape::Int32(i32::arbitrary(g)),
                2 => Shape::UInt64(u64::arbitrary(g)),
                3 => Shape::Text(String::arbitrary(g)),
                4 => Shape::Bytes(Vec::arbitrary(g)),
                5 => {
                    let mut shallow = quickcheck::Gen::new(depth / 2);
                    Shape::Seq(Vec::arbitrary(&mut shallow))
                }
                _ => {
                    let mut shallow = quickcheck::Gen::new(depth / 2);
                    Shape::Dict(
                        Vec::<(String, Option<Shape>)>::arbitrary(&mut shallow)
                            .into_iter()
                            .enumerate()
                            // Unique keys, as maps require.
                            .map(|(i, (key, value))| (format!("{i}.{key}"), value))
                            .collect(),
                    )
                }
            }
        }
    }

    fn realize<'a>(shape: &Shape, alloc: &'a Arena) -> Value<'a> {
        match shape {
            Shape::Boolean(b) => Value::Boolean(*b),
            Shape::Int32(i) => Value::Int32(*i),
            Shape::UInt64(u) => Value::UInt64(*u),
            Shape::Text(s) => Value::String(alloc.alloc_str(s)),
            Shape::Bytes(b) => Value::Binary(alloc.alloc_slice_copy(b)),
            Shape::Seq(shapes) => Value::Sequence(
                alloc.alloc_slice_fill_iter(shapes.iter().map(|s| realize(s, alloc))),
            ),
            Shape::Dict(entries) => {
                let entries: Vec<(&str, Option<Value<'a>>)> = entries
                    .iter()
                    .map(|(key, value)| {
                        (key.as_str(), value.as_ref().map(|v| realize(v, alloc)))
                    })
                    .collect();
                Value::Map(Map::build(alloc, &entries))
            }
        }
    }

    #[quickcheck_macros::quickcheck]
    fn clone_round_trips_any_value(shape: Shape) -> bool {
        let alloc = Arena::new();
        let value = realize(&shape, &alloc);

        let first = Arena::new();
        let clone = value.clone_into(&first);
        let second = Arena::new();
        let clone_of_clone = clone.clone_into(&second);

        clone == value.clone_into(&second)
            && clone_of_clone == value.clone_into(&first)
            && value.validate().is_ok() == clone.validate().is_ok()
    }

    #[test]
    fn debug_json_renders_nested_values() {
        let alloc = Arena::new();
        // serde_json objects render with sorted keys.
        insta::assert_json_snapshot!(fixture(&alloc).debug_json(), @r###"
        {
          "absent": null,
          "names": [
            "user.foo",
            "trusted.lov"
          ],
          "nlink": 2,
          "trusted.lov": "0bd10bd0"
        }
        "###);
    }
}
