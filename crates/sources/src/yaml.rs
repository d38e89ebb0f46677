// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

//! The YAML wire format for fsevents.
//!
//! A stream is a sequence of documents, each tagged with the event kind:
//! `!upsert`, `!link`, `!unlink`, `!delete`, `!ns_xattr` or `!inode_xattr`.
//! Scalars may carry the type tags `!int32`, `!uint32`, `!int64`, `!uint64`,
//! `!binary` (base64 payload) and `!regex` (a mapping of `regex` and
//! `options`); untagged scalars resolve to strings, booleans and 64-bit
//! integers. Unknown tags fail the parse; unknown mapping keys are skipped.
//!
//! The emitter produces the same grammar, so emit ∘ parse is the identity
//! on the wire.

use std::collections::VecDeque;

use serde::Deserialize;
use serde_yaml::value::{Tag, TaggedValue};
use serde_yaml::{Mapping, Value as Yaml};

use fsentry::statx::{self, FileType, S_IFMT};
use fsentry::{
    Arena, Error as ModelError, Fsevent, FseventKind, Id, Map, OwnedFsevent, RegexOptions, Statx,
    StatxTimestamp, Value,
};
use iters::Stream;

use crate::{Error, Source};

/// A [`Source`] of fsevents parsed from a YAML stream.
pub struct YamlSource {
    name: String,
    documents: VecDeque<Yaml>,
}

impl YamlSource {
    pub fn from_str(name: &str, input: &str) -> Result<YamlSource, Error> {
        let mut documents = VecDeque::new();
        for document in serde_yaml::Deserializer::from_str(input) {
            let value = Yaml::deserialize(document)?;
            // An empty stream parses as a lone null document.
            if !matches!(value, Yaml::Null) {
                documents.push_back(value);
            }
        }
        Ok(YamlSource {
            name: name.to_owned(),
            documents,
        })
    }

    pub fn from_reader(name: &str, mut reader: impl std::io::Read) -> Result<YamlSource, Error> {
        let mut input = String::new();
        reader.read_to_string(&mut input)?;
        YamlSource::from_str(name, &input)
    }
}

impl Stream for YamlSource {
    type Item = OwnedFsevent;

    fn next(&mut self) -> Result<Option<OwnedFsevent>, iters::Error> {
        match self.documents.pop_front() {
            None => Ok(None),
            Some(document) => Ok(Some(parse_event(&document).map_err(iters::Error::from)?)),
        }
    }
}

impl Source for YamlSource {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Parse a whole stream at once.
pub fn parse_events(input: &str) -> Result<Vec<OwnedFsevent>, Error> {
    let mut source = YamlSource::from_str("yaml", input)?;
    let mut events = Vec::new();
    loop {
        match source.documents.pop_front() {
            None => return Ok(events),
            Some(document) => events.push(parse_event(&document)?),
        }
    }
}

/// Serialize a stream of events, one document per event.
pub fn emit_events(events: &[OwnedFsevent]) -> Result<String, Error> {
    let mut out = String::new();
    for event in events {
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(&event_to_yaml(event.get())?)?);
    }
    Ok(out)
}

fn invalid(message: impl Into<String>) -> ModelError {
    ModelError::Invalid(message.into())
}

/// The local name of a tag, shorn of `!` prefixes and the core-schema
/// namespace.
fn tag_name(tag: &Tag) -> String {
    let name = tag.to_string();
    let name = name.trim_start_matches('!');
    name.strip_prefix("tag:yaml.org,2002:")
        .unwrap_or(name)
        .to_owned()
}

/*------------------------------------------------------------------------*
 |                               parsing                                  |
 *------------------------------------------------------------------------*/

fn parse_event(document: &Yaml) -> Result<OwnedFsevent, Error> {
    let Yaml::Tagged(tagged) = document else {
        return Err(Error::invalid("fsevent document without a kind tag"));
    };
    let Yaml::Mapping(fields) = &tagged.value else {
        return Err(Error::invalid("fsevent document is not a mapping"));
    };

    let event = match tag_name(&tagged.tag).as_str() {
        "upsert" => OwnedFsevent::build(|alloc| parse_upsert(alloc, fields)),
        "link" => OwnedFsevent::build(|alloc| parse_link(alloc, fields, LinkKind::Link)),
        "unlink" => OwnedFsevent::build(|alloc| parse_link(alloc, fields, LinkKind::Unlink)),
        "delete" => OwnedFsevent::build(|alloc| parse_delete(alloc, fields)),
        "ns_xattr" => OwnedFsevent::build(|alloc| parse_ns_xattr(alloc, fields)),
        "inode_xattr" => OwnedFsevent::build(|alloc| parse_inode_xattr(alloc, fields)),
        unknown => {
            return Err(Error::invalid(format!("unknown fsevent tag '!{unknown}'")));
        }
    };
    event.map_err(Error::from)
}

fn field_str<'y>(key: &str, value: &'y Yaml) -> Result<&'y str, ModelError> {
    value
        .as_str()
        .ok_or_else(|| invalid(format!("'{key}' is not a string")))
}

fn parse_id(value: &Yaml) -> Result<Id, ModelError> {
    let Yaml::Tagged(tagged) = value else {
        return Err(invalid("an id must be a binary scalar"));
    };
    if tag_name(&tagged.tag) != "binary" {
        return Err(invalid(format!(
            "an id must be a binary scalar, not '{}'",
            tagged.tag,
        )));
    }
    let encoded = field_str("id", &tagged.value)?;
    let bytes = base64::decode(encoded.trim())
        .map_err(|error| invalid(format!("bad base64 id: {error}")))?;
    Id::from_bytes(&bytes)
}

fn parse_u64(key: &str, value: &Yaml) -> Result<u64, ModelError> {
    let number = match value {
        Yaml::Number(number) => number.as_u64(),
        Yaml::Tagged(tagged) => tagged.value.as_u64(),
        _ => None,
    };
    number.ok_or_else(|| invalid(format!("'{key}' is not an unsigned integer")))
}

fn parse_i64(key: &str, value: &Yaml) -> Result<i64, ModelError> {
    let number = match value {
        Yaml::Number(number) => number.as_i64(),
        Yaml::Tagged(tagged) => tagged.value.as_i64(),
        _ => None,
    };
    number.ok_or_else(|| invalid(format!("'{key}' is not an integer")))
}

fn parse_u32(key: &str, value: &Yaml) -> Result<u32, ModelError> {
    u32::try_from(parse_u64(key, value)?)
        .map_err(|_| ModelError::OutOfRange(key.to_owned()))
}

/// Convert a YAML node into a document value. `Ok(None)` is a YAML null:
/// an attribute recorded without a payload.
fn yaml_to_value<'a>(alloc: &'a Arena, value: &Yaml) -> Result<Option<Value<'a>>, ModelError> {
    Ok(Some(match value {
        Yaml::Null => return Ok(None),
        Yaml::Bool(b) => Value::Boolean(*b),
        Yaml::Number(number) => {
            if let Some(u) = number.as_u64() {
                Value::UInt64(u)
            } else if let Some(i) = number.as_i64() {
                Value::Int64(i)
            } else {
                return Err(invalid(format!("unrepresentable number {number}")));
            }
        }
        Yaml::String(string) => Value::String(alloc.alloc_str(string)),
        Yaml::Sequence(elements) => {
            let mut values = Vec::with_capacity(elements.len());
            for element in elements {
                match yaml_to_value(alloc, element)? {
                    Some(value) => values.push(value),
                    None => return Err(invalid("null inside a sequence")),
                }
            }
            Value::Sequence(alloc.alloc_slice_fill_iter(values.into_iter()))
        }
        Yaml::Mapping(mapping) => Value::Map(yaml_to_map(alloc, mapping)?),
        Yaml::Tagged(tagged) => match tag_name(&tagged.tag).as_str() {
            "uint32" => Value::UInt32(parse_u32("uint32", value)?),
            "uint64" => Value::UInt64(parse_u64("uint64", value)?),
            "int32" => Value::Int32(
                i32::try_from(parse_i64("int32", value)?)
                    .map_err(|_| ModelError::OutOfRange("int32".to_owned()))?,
            ),
            "int64" => Value::Int64(parse_i64("int64", value)?),
            "binary" => {
                let encoded = field_str("binary", &tagged.value)?;
                let bytes = base64::decode(encoded.trim())
                    .map_err(|error| invalid(format!("bad base64 value: {error}")))?;
                Value::Binary(alloc.alloc_slice_copy(&bytes))
            }
            "regex" => parse_regex(alloc, &tagged.value)?,
            "str" => Value::String(alloc.alloc_str(field_str("str", &tagged.value)?)),
            unknown => return Err(invalid(format!("unknown value tag '!{unknown}'"))),
        },
    }))
}

fn parse_regex<'a>(alloc: &'a Arena, value: &Yaml) -> Result<Value<'a>, ModelError> {
    let Yaml::Mapping(fields) = value else {
        return Err(invalid("a regex value must be a mapping"));
    };
    let mut pattern = None;
    let mut options = RegexOptions::NONE;
    for (key, value) in fields {
        match key.as_str() {
            Some("regex") => pattern = Some(field_str("regex", value)?),
            Some("options") => options = RegexOptions::from_bits(parse_u32("options", value)?)?,
            _ => tracing::warn!(?key, "skipping unknown regex key"),
        }
    }
    let pattern = pattern.ok_or_else(|| invalid("regex mapping without a pattern"))?;
    Ok(Value::Regex {
        pattern: alloc.alloc_str(pattern),
        options,
    })
}

fn yaml_to_map<'a>(alloc: &'a Arena, mapping: &Mapping) -> Result<Map<'a>, ModelError> {
    let mut pairs: Vec<(&str, Option<Value<'a>>)> = Vec::with_capacity(mapping.len());
    for (key, value) in mapping {
        let Some(key) = key.as_str() else {
            return Err(invalid("map keys must be strings"));
        };
        pairs.push((key, yaml_to_value(alloc, value)?));
    }
    Ok(Map::build(alloc, &pairs))
}

fn parse_timestamp(
    key: &str,
    value: &Yaml,
    mask: &mut u32,
    sec_bit: u32,
    nsec_bit: u32,
) -> Result<StatxTimestamp, ModelError> {
    let Yaml::Mapping(fields) = value else {
        return Err(invalid(format!("'{key}' is not a mapping")));
    };
    let mut timestamp = StatxTimestamp::default();
    for (sub, value) in fields {
        match sub.as_str() {
            Some("sec") => {
                timestamp.sec = parse_i64("sec", value)?;
                *mask |= sec_bit;
            }
            Some("nsec") => {
                timestamp.nsec = parse_u32("nsec", value)?;
                *mask |= nsec_bit;
            }
            _ => return Err(invalid(format!("unexpected key in '{key}'"))),
        }
    }
    Ok(timestamp)
}

fn parse_device(
    key: &str,
    value: &Yaml,
    mask: &mut u32,
    major_bit: u32,
    minor_bit: u32,
) -> Result<(u32, u32), ModelError> {
    let Yaml::Mapping(fields) = value else {
        return Err(invalid(format!("'{key}' is not a mapping")));
    };
    let (mut major, mut minor) = (0, 0);
    for (sub, value) in fields {
        match sub.as_str() {
            Some("major") => {
                major = parse_u32("major", value)?;
                *mask |= major_bit;
            }
            Some("minor") => {
                minor = parse_u32("minor", value)?;
                *mask |= minor_bit;
            }
            _ => return Err(invalid(format!("unexpected key in '{key}'"))),
        }
    }
    Ok((major, minor))
}

const ATTRIBUTE_NAMES: &[(&str, u64)] = &[
    ("compressed", statx::ATTR_COMPRESSED),
    ("immutable", statx::ATTR_IMMUTABLE),
    ("append", statx::ATTR_APPEND),
    ("nodump", statx::ATTR_NODUMP),
    ("encrypted", statx::ATTR_ENCRYPTED),
    ("automount", statx::ATTR_AUTOMOUNT),
    ("mount-root", statx::ATTR_MOUNT_ROOT),
    ("verity", statx::ATTR_VERITY),
    ("dax", statx::ATTR_DAX),
];

fn parse_attributes(value: &Yaml, statxbuf: &mut Statx) -> Result<(), ModelError> {
    let Yaml::Mapping(fields) = value else {
        return Err(invalid("'attributes' is not a mapping"));
    };
    for (name, value) in fields {
        let bit = name
            .as_str()
            .and_then(|name| ATTRIBUTE_NAMES.iter().find(|(known, _)| *known == name))
            .map(|(_, bit)| *bit);
        let Some(bit) = bit else {
            tracing::warn!(?name, "skipping unknown statx attribute");
            continue;
        };
        let Yaml::Bool(set) = value else {
            return Err(invalid("statx attributes must be booleans"));
        };
        statxbuf.attributes_mask |= bit;
        if *set {
            statxbuf.attributes |= bit;
        }
    }
    statxbuf.mask |= statx::ATTRIBUTES;
    Ok(())
}

fn parse_mode(value: &Yaml) -> Result<u16, ModelError> {
    let permissions = match value {
        // "0644": octal, as permissions are written.
        Yaml::String(text) => u16::from_str_radix(text.trim_start_matches("0o"), 8)
            .map_err(|_| invalid(format!("'{text}' is not an octal mode")))?,
        other => u16::try_from(parse_u64("mode", other)?)
            .map_err(|_| ModelError::OutOfRange("mode".to_owned()))?,
    };
    Ok(permissions & !S_IFMT)
}

fn yaml_to_statx(value: &Yaml) -> Result<Statx, ModelError> {
    let Yaml::Mapping(fields) = value else {
        return Err(invalid("'statx' is not a mapping"));
    };
    let mut statxbuf = Statx::default();

    for (key, value) in fields {
        match key.as_str() {
            Some("type") => {
                let name = field_str("type", value)?;
                let filetype = FileType::from_name(name)
                    .ok_or_else(|| invalid(format!("unknown file type '{name}'")))?;
                statxbuf.mode |= filetype.to_mode();
                statxbuf.mask |= statx::TYPE;
            }
            Some("mode") => {
                statxbuf.mode |= parse_mode(value)?;
                statxbuf.mask |= statx::MODE;
            }
            Some("nlink") => {
                statxbuf.nlink = parse_u32("nlink", value)?;
                statxbuf.mask |= statx::NLINK;
            }
            Some("uid") => {
                statxbuf.uid = parse_u32("uid", value)?;
                statxbuf.mask |= statx::UID;
            }
            Some("gid") => {
                statxbuf.gid = parse_u32("gid", value)?;
                statxbuf.mask |= statx::GID;
            }
            Some("atime") => {
                statxbuf.atime = parse_timestamp(
                    "atime",
                    value,
                    &mut statxbuf.mask,
                    statx::ATIME_SEC,
                    statx::ATIME_NSEC,
                )?;
            }
            Some("mtime") => {
                statxbuf.mtime = parse_timestamp(
                    "mtime",
                    value,
                    &mut statxbuf.mask,
                    statx::MTIME_SEC,
                    statx::MTIME_NSEC,
                )?;
            }
            Some("ctime") => {
                statxbuf.ctime = parse_timestamp(
                    "ctime",
                    value,
                    &mut statxbuf.mask,
                    statx::CTIME_SEC,
                    statx::CTIME_NSEC,
                )?;
            }
            Some("btime") => {
                statxbuf.btime = parse_timestamp(
                    "btime",
                    value,
                    &mut statxbuf.mask,
                    statx::BTIME_SEC,
                    statx::BTIME_NSEC,
                )?;
            }
            Some("ino") => {
                statxbuf.ino = parse_u64("ino", value)?;
                statxbuf.mask |= statx::INO;
            }
            Some("size") => {
                statxbuf.size = parse_u64("size", value)?;
                statxbuf.mask |= statx::SIZE;
            }
            Some("blocks") => {
                statxbuf.blocks = parse_u64("blocks", value)?;
                statxbuf.mask |= statx::BLOCKS;
            }
            Some("blksize") => {
                statxbuf.blksize = parse_u32("blksize", value)?;
                statxbuf.mask |= statx::BLKSIZE;
            }
            Some("attributes") => parse_attributes(value, &mut statxbuf)?,
            Some("rdev") => {
                let (major, minor) = parse_device(
                    "rdev",
                    value,
                    &mut statxbuf.mask,
                    statx::RDEV_MAJOR,
                    statx::RDEV_MINOR,
                )?;
                statxbuf.rdev_major = major;
                statxbuf.rdev_minor = minor;
            }
            Some("dev") => {
                let (major, minor) = parse_device(
                    "dev",
                    value,
                    &mut statxbuf.mask,
                    statx::DEV_MAJOR,
                    statx::DEV_MINOR,
                )?;
                statxbuf.dev_major = major;
                statxbuf.dev_minor = minor;
            }
            _ => tracing::warn!(?key, "skipping unknown statx key"),
        }
    }
    Ok(statxbuf)
}

fn parse_upsert<'a>(alloc: &'a Arena, fields: &Mapping) -> Result<Fsevent<'a>, ModelError> {
    let mut id = None;
    let mut xattrs = Map::EMPTY;
    let mut statxbuf = None;
    let mut symlink = None;

    for (key, value) in fields {
        match key.as_str() {
            Some("id") => id = Some(parse_id(value)?),
            Some("xattrs") => match value {
                Yaml::Mapping(mapping) => xattrs = yaml_to_map(alloc, mapping)?,
                _ => return Err(invalid("'xattrs' is not a mapping")),
            },
            Some("statx") => statxbuf = Some(yaml_to_statx(value)?),
            Some("symlink") => symlink = Some(field_str("symlink", value)?),
            _ => tracing::warn!(?key, "skipping unknown upsert key"),
        }
    }

    let id = id.ok_or_else(|| invalid("upsert without an id"))?;
    Fsevent::upsert(alloc, &id, &xattrs, statxbuf.as_ref(), symlink)
}

enum LinkKind {
    Link,
    Unlink,
}

fn parse_link<'a>(
    alloc: &'a Arena,
    fields: &Mapping,
    kind: LinkKind,
) -> Result<Fsevent<'a>, ModelError> {
    let mut id = None;
    let mut xattrs = Map::EMPTY;
    let mut parent = None;
    let mut name = None;

    for (key, value) in fields {
        match key.as_str() {
            Some("id") => id = Some(parse_id(value)?),
            Some("xattrs") => match value {
                Yaml::Mapping(mapping) => xattrs = yaml_to_map(alloc, mapping)?,
                _ => return Err(invalid("'xattrs' is not a mapping")),
            },
            Some("parent") => parent = Some(parse_id(value)?),
            Some("name") => name = Some(field_str("name", value)?),
            _ => tracing::warn!(?key, "skipping unknown link key"),
        }
    }

    let id = id.ok_or_else(|| invalid("link without an id"))?;
    let parent = parent.ok_or_else(|| invalid("link without a parent"))?;
    let name = name.ok_or_else(|| invalid("link without a name"))?;
    Ok(match kind {
        LinkKind::Link => Fsevent::link(alloc, &id, &xattrs, &parent, name),
        LinkKind::Unlink => Fsevent::unlink(alloc, &id, &parent, name),
    })
}

fn parse_delete<'a>(_alloc: &'a Arena, fields: &Mapping) -> Result<Fsevent<'a>, ModelError> {
    let mut id = None;
    for (key, value) in fields {
        match key.as_str() {
            Some("id") => id = Some(parse_id(value)?),
            _ => tracing::warn!(?key, "skipping unknown delete key"),
        }
    }
    let id = id.ok_or_else(|| invalid("delete without an id"))?;
    Ok(Fsevent::delete(&id))
}

fn parse_ns_xattr<'a>(alloc: &'a Arena, fields: &Mapping) -> Result<Fsevent<'a>, ModelError> {
    let mut id = None;
    let mut xattrs = Map::EMPTY;
    let mut parent = None;
    let mut name = None;

    for (key, value) in fields {
        match key.as_str() {
            Some("id") => id = Some(parse_id(value)?),
            Some("xattrs") => match value {
                Yaml::Mapping(mapping) => xattrs = yaml_to_map(alloc, mapping)?,
                _ => return Err(invalid("'xattrs' is not a mapping")),
            },
            Some("parent") => parent = Some(parse_id(value)?),
            Some("name") => name = Some(field_str("name", value)?),
            _ => tracing::warn!(?key, "skipping unknown ns_xattr key"),
        }
    }

    let id = id.ok_or_else(|| invalid("ns_xattr without an id"))?;
    match (parent, name) {
        (Some(parent), Some(name)) => Ok(Fsevent::ns_xattr(alloc, &id, &xattrs, &parent, name)),
        (None, None) => Ok(Fsevent::xattr(alloc, &id, &xattrs)),
        _ => Err(invalid("ns_xattr with only one of parent and name")),
    }
}

fn parse_inode_xattr<'a>(alloc: &'a Arena, fields: &Mapping) -> Result<Fsevent<'a>, ModelError> {
    let mut id = None;
    let mut xattrs = Map::EMPTY;

    for (key, value) in fields {
        match key.as_str() {
            Some("id") => id = Some(parse_id(value)?),
            Some("xattrs") => match value {
                Yaml::Mapping(mapping) => xattrs = yaml_to_map(alloc, mapping)?,
                _ => return Err(invalid("'xattrs' is not a mapping")),
            },
            _ => tracing::warn!(?key, "skipping unknown inode_xattr key"),
        }
    }

    let id = id.ok_or_else(|| invalid("inode_xattr without an id"))?;
    Ok(Fsevent::xattr(alloc, &id, &xattrs))
}

/*------------------------------------------------------------------------*
 |                               emission                                 |
 *------------------------------------------------------------------------*/

fn tagged(tag: &str, value: Yaml) -> Yaml {
    Yaml::Tagged(Box::new(TaggedValue {
        tag: Tag::new(tag),
        value,
    }))
}

fn id_to_yaml(id: &Id) -> Yaml {
    tagged("binary", Yaml::String(base64::encode(id.as_bytes())))
}

fn value_to_yaml(value: &Value<'_>) -> Yaml {
    match *value {
        Value::Boolean(b) => Yaml::Bool(b),
        Value::Int32(i) => tagged("int32", Yaml::Number(i.into())),
        Value::UInt32(u) => tagged("uint32", Yaml::Number(u.into())),
        Value::Int64(i) => tagged("int64", Yaml::Number(i.into())),
        Value::UInt64(u) => tagged("uint64", Yaml::Number(u.into())),
        Value::String(s) => Yaml::String(s.to_owned()),
        Value::Binary(bytes) => tagged("binary", Yaml::String(base64::encode(bytes))),
        Value::Regex { pattern, options } => {
            let mut mapping = Mapping::new();
            mapping.insert(Yaml::from("regex"), Yaml::from(pattern));
            mapping.insert(Yaml::from("options"), Yaml::Number(options.bits().into()));
            tagged("regex", Yaml::Mapping(mapping))
        }
        Value::Sequence(values) => {
            Yaml::Sequence(values.iter().map(value_to_yaml).collect())
        }
        Value::Map(map) => Yaml::Mapping(map_to_yaml(&map)),
    }
}

fn map_to_yaml(map: &Map<'_>) -> Mapping {
    let mut mapping = Mapping::new();
    for pair in map.iter() {
        let value = match &pair.value {
            Some(value) => value_to_yaml(value),
            None => Yaml::Null,
        };
        mapping.insert(Yaml::from(pair.key), value);
    }
    mapping
}

fn timestamp_to_yaml(
    timestamp: &StatxTimestamp,
    mask: u32,
    sec_bit: u32,
    nsec_bit: u32,
) -> Yaml {
    let mut mapping = Mapping::new();
    if mask & sec_bit != 0 {
        mapping.insert(Yaml::from("sec"), tagged("int64", Yaml::Number(timestamp.sec.into())));
    }
    if mask & nsec_bit != 0 {
        mapping.insert(
            Yaml::from("nsec"),
            tagged("uint32", Yaml::Number(timestamp.nsec.into())),
        );
    }
    Yaml::Mapping(mapping)
}

fn device_to_yaml(major: u32, minor: u32, mask: u32, major_bit: u32, minor_bit: u32) -> Yaml {
    let mut mapping = Mapping::new();
    if mask & major_bit != 0 {
        mapping.insert(Yaml::from("major"), tagged("uint32", Yaml::Number(major.into())));
    }
    if mask & minor_bit != 0 {
        mapping.insert(Yaml::from("minor"), tagged("uint32", Yaml::Number(minor.into())));
    }
    Yaml::Mapping(mapping)
}

fn statx_to_yaml(statxbuf: &Statx) -> Result<Yaml, Error> {
    let mask = statxbuf.mask;
    let mut mapping = Mapping::new();

    if mask & statx::TYPE != 0 {
        let filetype = statxbuf.file_type().ok_or_else(|| {
            Error::invalid(format!("mode {:#o} holds no file type", statxbuf.mode))
        })?;
        mapping.insert(Yaml::from("type"), Yaml::from(filetype.name()));
    }
    if mask & statx::MODE != 0 {
        mapping.insert(
            Yaml::from("mode"),
            Yaml::from(format!("0{:o}", statxbuf.mode & !S_IFMT)),
        );
    }
    if mask & statx::NLINK != 0 {
        mapping.insert(Yaml::from("nlink"), tagged("uint32", Yaml::Number(statxbuf.nlink.into())));
    }
    if mask & statx::UID != 0 {
        mapping.insert(Yaml::from("uid"), tagged("uint32", Yaml::Number(statxbuf.uid.into())));
    }
    if mask & statx::GID != 0 {
        mapping.insert(Yaml::from("gid"), tagged("uint32", Yaml::Number(statxbuf.gid.into())));
    }
    if mask & statx::ATIME != 0 {
        mapping.insert(
            Yaml::from("atime"),
            timestamp_to_yaml(&statxbuf.atime, mask, statx::ATIME_SEC, statx::ATIME_NSEC),
        );
    }
    if mask & statx::MTIME != 0 {
        mapping.insert(
            Yaml::from("mtime"),
            timestamp_to_yaml(&statxbuf.mtime, mask, statx::MTIME_SEC, statx::MTIME_NSEC),
        );
    }
    if mask & statx::CTIME != 0 {
        mapping.insert(
            Yaml::from("ctime"),
            timestamp_to_yaml(&statxbuf.ctime, mask, statx::CTIME_SEC, statx::CTIME_NSEC),
        );
    }
    if mask & statx::INO != 0 {
        mapping.insert(Yaml::from("ino"), tagged("uint64", Yaml::Number(statxbuf.ino.into())));
    }
    if mask & statx::SIZE != 0 {
        mapping.insert(Yaml::from("size"), tagged("uint64", Yaml::Number(statxbuf.size.into())));
    }
    if mask & statx::BLOCKS != 0 {
        mapping.insert(
            Yaml::from("blocks"),
            tagged("uint64", Yaml::Number(statxbuf.blocks.into())),
        );
    }
    if mask & statx::BTIME != 0 {
        mapping.insert(
            Yaml::from("btime"),
            timestamp_to_yaml(&statxbuf.btime, mask, statx::BTIME_SEC, statx::BTIME_NSEC),
        );
    }
    if mask & statx::BLKSIZE != 0 {
        mapping.insert(
            Yaml::from("blksize"),
            tagged("uint32", Yaml::Number(statxbuf.blksize.into())),
        );
    }
    if mask & statx::ATTRIBUTES != 0 {
        let mut attributes = Mapping::new();
        for (name, bit) in ATTRIBUTE_NAMES {
            if statxbuf.attributes_mask & bit != 0 {
                attributes.insert(
                    Yaml::from(*name),
                    Yaml::Bool(statxbuf.attributes & bit != 0),
                );
            }
        }
        mapping.insert(Yaml::from("attributes"), Yaml::Mapping(attributes));
    }
    if mask & statx::RDEV != 0 {
        mapping.insert(
            Yaml::from("rdev"),
            device_to_yaml(
                statxbuf.rdev_major,
                statxbuf.rdev_minor,
                mask,
                statx::RDEV_MAJOR,
                statx::RDEV_MINOR,
            ),
        );
    }
    if mask & statx::DEV != 0 {
        mapping.insert(
            Yaml::from("dev"),
            device_to_yaml(
                statxbuf.dev_major,
                statxbuf.dev_minor,
                mask,
                statx::DEV_MAJOR,
                statx::DEV_MINOR,
            ),
        );
    }

    Ok(Yaml::Mapping(mapping))
}

/// Render one event as a tagged YAML document value.
pub fn event_to_yaml(event: &Fsevent<'_>) -> Result<Yaml, Error> {
    let mut fields = Mapping::new();
    fields.insert(Yaml::from("id"), id_to_yaml(&event.id));

    let tag = match &event.kind {
        FseventKind::Upsert { statx: statxbuf, symlink } => {
            fields.insert(Yaml::from("xattrs"), Yaml::Mapping(map_to_yaml(&event.xattrs)));
            if let Some(statxbuf) = statxbuf {
                fields.insert(Yaml::from("statx"), statx_to_yaml(statxbuf)?);
            }
            if let Some(symlink) = symlink {
                fields.insert(Yaml::from("symlink"), Yaml::from(*symlink));
            }
            "upsert"
        }
        FseventKind::Link { parent_id, name } => {
            fields.insert(Yaml::from("xattrs"), Yaml::Mapping(map_to_yaml(&event.xattrs)));
            fields.insert(Yaml::from("parent"), id_to_yaml(parent_id));
            fields.insert(Yaml::from("name"), Yaml::from(*name));
            "link"
        }
        FseventKind::Unlink { parent_id, name } => {
            fields.insert(Yaml::from("parent"), id_to_yaml(parent_id));
            fields.insert(Yaml::from("name"), Yaml::from(*name));
            "unlink"
        }
        FseventKind::Delete => "delete",
        FseventKind::Xattr { link } => {
            fields.insert(Yaml::from("xattrs"), Yaml::Mapping(map_to_yaml(&event.xattrs)));
            match link {
                Some((parent_id, name)) => {
                    fields.insert(Yaml::from("parent"), id_to_yaml(parent_id));
                    fields.insert(Yaml::from("name"), Yaml::from(*name));
                    "ns_xattr"
                }
                None => "inode_xattr",
            }
        }
    };

    Ok(tagged(tag, Yaml::Mapping(fields)))
}

#[cfg(test)]
mod test {
    use super::*;
    use fsentry::statx::TYPE;
    use pretty_assertions::assert_eq;

    fn id(name: &str) -> Id {
        Id::from_bytes(name.as_bytes()).unwrap()
    }

    fn round_trip(event: &OwnedFsevent) -> OwnedFsevent {
        let emitted = emit_events(std::slice::from_ref(event)).unwrap();
        let mut parsed = parse_events(&emitted).unwrap();
        assert_eq!(parsed.len(), 1, "one document expected in: {emitted}");
        parsed.pop().unwrap()
    }

    #[test]
    fn upsert_round_trip() {
        let event = OwnedFsevent::build(|alloc| {
            let statxbuf = Statx {
                mask: TYPE
                    | statx::MODE
                    | statx::SIZE
                    | statx::MTIME_SEC
                    | statx::ATTRIBUTES
                    | statx::RDEV_MAJOR,
                mode: FileType::Regular.to_mode() | 0o644,
                size: 10,
                mtime: StatxTimestamp { sec: 42, nsec: 0 },
                attributes_mask: statx::ATTR_IMMUTABLE | statx::ATTR_ENCRYPTED,
                attributes: statx::ATTR_IMMUTABLE,
                rdev_major: 8,
                ..Default::default()
            };
            let xattrs = Map::build(
                alloc,
                &[
                    ("user.tag", Some(Value::String("blue"))),
                    ("user.count", Some(Value::UInt32(3))),
                    ("user.blob", Some(Value::Binary(b"\x00\x01\x02"))),
                    (
                        "user.pattern",
                        Some(Value::Regex {
                            pattern: "*.c",
                            options: RegexOptions::SHELL_PATTERN,
                        }),
                    ),
                    ("user.absent", None),
                ],
            );
            Fsevent::upsert(alloc, &id("inode-1"), &xattrs, Some(&statxbuf), None)
        })
        .unwrap();

        assert_eq!(round_trip(&event), event);
    }

    #[test]
    fn symlink_upsert_round_trip() {
        let event = OwnedFsevent::build(|alloc| {
            let statxbuf = Statx {
                mask: TYPE,
                mode: FileType::Symlink.to_mode(),
                ..Default::default()
            };
            Fsevent::upsert(alloc, &id("l"), &Map::EMPTY, Some(&statxbuf), Some("target"))
        })
        .unwrap();

        assert_eq!(round_trip(&event), event);
    }

    #[test]
    fn link_unlink_delete_round_trip() {
        let link = OwnedFsevent::build(|alloc| {
            let xattrs = Map::build(alloc, &[("path", Some(Value::String("/a/b")))]);
            Ok(Fsevent::link(alloc, &id("b"), &xattrs, &id("a"), "b"))
        })
        .unwrap();
        let unlink =
            OwnedFsevent::build(|alloc| Ok(Fsevent::unlink(alloc, &id("b"), &id("a"), "b")))
                .unwrap();
        let delete = OwnedFsevent::build(|_alloc| Ok(Fsevent::delete(&id("b")))).unwrap();

        for event in [link, unlink, delete] {
            assert_eq!(round_trip(&event), event);
        }
    }

    #[test]
    fn xattr_round_trips_both_scopes() {
        let ns = OwnedFsevent::build(|alloc| {
            let xattrs = Map::build(alloc, &[("path", Some(Value::String("/a/b")))]);
            Ok(Fsevent::ns_xattr(alloc, &id("b"), &xattrs, &id("a"), "b"))
        })
        .unwrap();
        let inode = OwnedFsevent::build(|alloc| {
            let xattrs = Map::build(alloc, &[("user.tag", Some(Value::String("blue")))]);
            Ok(Fsevent::xattr(alloc, &id("b"), &xattrs))
        })
        .unwrap();

        assert_eq!(round_trip(&ns), ns);
        assert_eq!(round_trip(&inode), inode);
    }

    #[test]
    fn emitted_documents_are_tagged() {
        let event = OwnedFsevent::build(|_alloc| Ok(Fsevent::delete(&id("x")))).unwrap();
        let emitted = emit_events(&[event]).unwrap();
        assert!(emitted.starts_with("---\n"), "{emitted}");
        assert!(emitted.contains("!delete"), "{emitted}");
        assert!(emitted.contains("!binary"), "{emitted}");
    }

    #[test]
    fn unknown_document_tags_fail() {
        let error = parse_events("--- !frobnicate\nid: !binary eA==\n").unwrap_err();
        assert!(matches!(error, Error::Invalid(_)), "{error:?}");
    }

    #[test]
    fn unknown_value_tags_fail() {
        let input = "--- !inode_xattr\nid: !binary eA==\nxattrs:\n  k: !weird 3\n";
        assert!(parse_events(input).is_err());
    }

    #[test]
    fn missing_required_keys_fail() {
        // No id.
        assert!(parse_events("--- !delete\n{}\n").is_err());
        // A link without a name.
        let input = "--- !link\nid: !binary eA==\nparent: !binary eQ==\n";
        assert!(parse_events(input).is_err());
    }

    #[test]
    fn unknown_keys_are_skipped() {
        let input = "--- !delete\nid: !binary eA==\nfrobnicator: 3\n";
        let events = parse_events(input).unwrap();
        assert_eq!(events[0].get().id, id("x"));
    }

    #[test]
    fn scalar_tags_parse() {
        let input = concat!(
            "--- !inode_xattr\n",
            "id: !binary eA==\n",
            "xattrs:\n",
            "  a: !int32 -1\n",
            "  b: !uint64 18446744073709551615\n",
            "  c: plain\n",
            "  d: true\n",
            "  e: 12\n",
            "  f: !regex {regex: \"^a$\", options: !uint32 1}\n",
        );
        let events = parse_events(input).unwrap();
        let event = events[0].get();
        assert_eq!(event.xattrs.value("a"), Some(&Value::Int32(-1)));
        assert_eq!(event.xattrs.value("b"), Some(&Value::UInt64(u64::MAX)));
        assert_eq!(event.xattrs.value("c"), Some(&Value::String("plain")));
        assert_eq!(event.xattrs.value("d"), Some(&Value::Boolean(true)));
        assert_eq!(event.xattrs.value("e"), Some(&Value::UInt64(12)));
        assert_eq!(
            event.xattrs.value("f"),
            Some(&Value::Regex {
                pattern: "^a$",
                options: RegexOptions::CASE_INSENSITIVE,
            }),
        );
    }

    #[test]
    fn emitted_statx_uses_the_field_grammar() {
        let event = OwnedFsevent::build(|alloc| {
            let statxbuf = Statx {
                mask: TYPE | statx::MODE | statx::SIZE | statx::MTIME_SEC,
                mode: FileType::Directory.to_mode() | 0o750,
                size: 4096,
                mtime: StatxTimestamp { sec: 7, nsec: 0 },
                ..Default::default()
            };
            Fsevent::upsert(alloc, &id("d"), &Map::EMPTY, Some(&statxbuf), None)
        })
        .unwrap();

        let emitted = emit_events(std::slice::from_ref(&event)).unwrap();
        assert!(emitted.contains("!upsert"), "{emitted}");
        assert!(emitted.contains("type: directory"), "{emitted}");
        // Permissions are written in octal, without the type half.
        assert!(emitted.contains("mode: '0750'") || emitted.contains("mode: \"0750\""),
                "{emitted}");
        assert!(emitted.contains("sec: !int64 7"), "{emitted}");
        assert_eq!(round_trip(&event), event);
    }
}
