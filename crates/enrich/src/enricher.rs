// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

use std::collections::HashMap;
use std::fs::File;

use fsentry::statx;
use fsentry::{
    Fsevent, FseventKind, Id, Map, OwnedFsevent, OwnedValue, Statx, Value, ValueKind, ENRICH_XATTR,
};
use iters::{Sstack, Stream};

use crate::posix::{self, XATTR_VALUE_MAX};
use crate::Error;

/// A filesystem-specific enrichment hook (e.g. Lustre layout and HSM
/// state), registered under the hint key that names it.
pub trait EnrichExtension {
    fn name(&self) -> &'static str;

    /// Produce concrete xattr pairs for `id`, resolved through `mount`.
    fn enrich(
        &self,
        mount: &File,
        id: &Id,
        path: Option<&str>,
    ) -> Result<Vec<(String, Option<OwnedValue>)>, Error>;
}

/// Resolves enrichment hints into concrete payloads.
///
/// Each consumed event is re-emitted with its `rbh-fsevents` xattr
/// replaced by the data the hints asked for. I/O failures while resolving
/// a hint demote the hinted field to "unknown" (the value is absent) and
/// enrichment continues; only malformed hints are errors.
pub struct Enricher<S> {
    events: S,
    /// The branch root of the filesystem the events describe.
    mount: File,
    extensions: HashMap<&'static str, Box<dyn EnrichExtension>>,
    /// Xattr name to decoded type, from the `xattrs_map` configuration.
    xattr_types: HashMap<String, ValueKind>,
    scratch: Sstack,
}

/// Everything the hints of one event resolved to.
#[derive(Default)]
struct Resolved {
    statx: Option<Statx>,
    symlink: Option<String>,
    xattrs: Vec<(String, Option<OwnedValue>)>,
}

impl<S> Enricher<S> {
    pub fn new(events: S, mount: File) -> Enricher<S> {
        Enricher {
            events,
            mount,
            extensions: HashMap::new(),
            xattr_types: HashMap::new(),
            scratch: Sstack::new(XATTR_VALUE_MAX),
        }
    }

    pub fn with_extension(mut self, extension: Box<dyn EnrichExtension>) -> Self {
        self.extensions.insert(extension.name(), extension);
        self
    }

    /// Decode the configured xattrs to typed values instead of raw bytes.
    pub fn with_xattr_types(mut self, types: HashMap<String, ValueKind>) -> Self {
        self.xattr_types = types;
        self
    }

    /// Pull the xattr type mapping from the loaded configuration.
    pub fn with_configured_xattr_types(self) -> Self {
        match rbh_config::global() {
            Some(config) => {
                let types = config.xattrs_map();
                self.with_xattr_types(types)
            }
            None => self,
        }
    }
}

/// Parse the payload of a `statx` hint: either a raw mask or a sequence of
/// field names, where timestamps and device numbers may select sub-fields
/// through a single-entry mapping (`{atime: [sec, nsec]}`).
fn parse_statx_hint(value: &Value<'_>) -> Result<u32, Error> {
    match value {
        Value::UInt32(mask) => Ok(*mask),
        Value::Sequence(fields) => {
            let mut mask = 0;
            for field in fields.iter() {
                mask |= parse_statx_field(field)?;
            }
            Ok(mask)
        }
        other => Err(Error::invalid(format!(
            "statx hint is a {}, not a mask or field list",
            other.kind(),
        ))),
    }
}

fn parse_statx_field(value: &Value<'_>) -> Result<u32, Error> {
    match value {
        Value::String(name) => statx::field_mask(name)
            .ok_or_else(|| Error::Unsupported(format!("statx field '{name}'"))),
        Value::Map(map) => {
            let [pair] = map.pairs() else {
                return Err(Error::invalid("statx field mapping with several keys"));
            };
            let Some(Value::Sequence(subfields)) = &pair.value else {
                return Err(Error::invalid("statx sub-fields are not a sequence"));
            };
            let mut mask = 0;
            for sub in subfields.iter() {
                let Value::String(sub) = sub else {
                    return Err(Error::invalid("statx sub-field is not a string"));
                };
                mask |= statx::timestamp_mask(pair.key, sub)
                    .or_else(|| statx::device_mask(pair.key, sub))
                    .ok_or_else(|| {
                        Error::invalid(format!("unknown statx sub-field '{}.{sub}'", pair.key))
                    })?;
            }
            Ok(mask)
        }
        other => Err(Error::Unsupported(format!(
            "statx field of type {}",
            other.kind(),
        ))),
    }
}

impl<S: Stream<Item = OwnedFsevent>> Enricher<S> {
    fn resolve_statx(&self, event: &Fsevent<'_>, mask: u32) -> Option<Statx> {
        let path = event.path().ok();
        let fetch = |force_sync: bool| {
            posix::open_by_id(
                &self.mount,
                &event.id,
                path,
                libc::O_RDONLY | libc::O_CLOEXEC | libc::O_NOFOLLOW | libc::O_PATH,
            )
            .and_then(|file| posix::statx_fd(&file, mask, force_sync))
        };

        // Prefer synchronized attributes; fall back to whatever the kernel
        // has in cache when the filesystem cannot synchronize.
        match fetch(true).or_else(|_| fetch(false)) {
            Ok(fetched) => Some(fetched),
            Err(error) => {
                tracing::debug!(id = ?event.id, %error,
                                "statx enrichment failed, leaving fields unknown");
                None
            }
        }
    }

    fn resolve_xattrs(
        &mut self,
        event: &Fsevent<'_>,
        names: &Value<'_>,
        out: &mut Vec<(String, Option<OwnedValue>)>,
    ) -> Result<(), Error> {
        let Value::Sequence(names) = names else {
            return Err(Error::invalid("xattrs hint is not a sequence"));
        };

        let path = event.path().ok();
        let file = posix::open_by_id(
            &self.mount,
            &event.id,
            path,
            libc::O_RDONLY | libc::O_CLOEXEC | libc::O_NOFOLLOW,
        );
        // Symlinks cannot be opened for reading; retry with a path-only
        // descriptor so the failure is per-xattr instead of per-event.
        let file = file.or_else(|_| {
            posix::open_by_id(
                &self.mount,
                &event.id,
                path,
                libc::O_RDONLY | libc::O_CLOEXEC | libc::O_NOFOLLOW | libc::O_PATH,
            )
        });

        for name in names.iter() {
            let Value::String(name) = name else {
                return Err(Error::invalid("xattr name is not a string"));
            };
            let value = match &file {
                Err(_) => None,
                Ok(file) => {
                    self.scratch.pop_all();
                    let buffer = self
                        .scratch
                        .alloc(XATTR_VALUE_MAX)
                        .map_err(|_| Error::invalid("xattr scratch exhausted"))?;
                    match posix::get_xattr(file, name, buffer) {
                        Ok(length) => {
                            Some(decode_xattr(&self.xattr_types, name, &buffer[..length]))
                        }
                        Err(error) => {
                            tracing::debug!(name, %error, "xattr enrichment failed");
                            None
                        }
                    }
                }
            };
            out.push(((*name).to_owned(), value));
        }
        Ok(())
    }

    fn resolve_symlink(&self, event: &Fsevent<'_>) -> Option<String> {
        let path = event.path().ok();
        let opened = posix::open_by_id(
            &self.mount,
            &event.id,
            path,
            libc::O_RDONLY | libc::O_CLOEXEC | libc::O_NOFOLLOW | libc::O_PATH,
        );
        match opened.and_then(|file| posix::read_link(&file)) {
            Ok(target) => Some(target),
            Err(error) => {
                tracing::debug!(id = ?event.id, %error, "symlink enrichment failed");
                None
            }
        }
    }

    fn enrich(&mut self, event: &OwnedFsevent) -> Result<OwnedFsevent, Error> {
        let source = event.get();
        let mut resolved = Resolved::default();

        for pair in source.xattrs.iter() {
            if pair.key != ENRICH_XATTR {
                continue;
            }
            let Some(Value::Map(hints)) = &pair.value else {
                return Err(Error::invalid("enrichment hints are not a map"));
            };

            for hint in hints.iter() {
                match (hint.key, &hint.value) {
                    ("statx", Some(value)) => {
                        if !matches!(source.kind, FseventKind::Upsert { .. }) {
                            return Err(Error::invalid("statx hint outside an upsert"));
                        }
                        let mask = parse_statx_hint(value)?;
                        if let Some(fetched) = self.resolve_statx(source, mask) {
                            let seed = match &source.kind {
                                FseventKind::Upsert { statx: seed, .. } => *seed,
                                _ => None,
                            };
                            let mut merged = seed.unwrap_or_default();
                            merged.merge(&fetched);
                            match &mut resolved.statx {
                                Some(statx) => statx.merge(&merged),
                                None => resolved.statx = Some(merged),
                            }
                        }
                    }
                    ("xattrs", Some(value)) => {
                        if !matches!(
                            source.kind,
                            FseventKind::Xattr { .. } | FseventKind::Link { .. },
                        ) {
                            return Err(Error::invalid(
                                "xattrs hint outside an xattr or link event",
                            ));
                        }
                        self.resolve_xattrs(source, value, &mut resolved.xattrs)?;
                    }
                    ("symlink", Some(Value::String("symlink"))) => {
                        if !matches!(source.kind, FseventKind::Upsert { .. }) {
                            return Err(Error::invalid("symlink hint outside an upsert"));
                        }
                        resolved.symlink = self.resolve_symlink(source);
                    }
                    ("symlink", _) => {
                        return Err(Error::invalid("malformed symlink hint"));
                    }
                    (name, _) => match self.extensions.get(name) {
                        Some(extension) => {
                            match extension.enrich(&self.mount, &source.id, source.path().ok()) {
                                Ok(pairs) => resolved.xattrs.extend(pairs),
                                Err(error) => {
                                    tracing::debug!(name, %error, "extension enrichment failed");
                                }
                            }
                        }
                        None => {
                            return Err(Error::Unsupported(format!("enrichment hint '{name}'")));
                        }
                    },
                }
            }
        }

        rebuild(source, &resolved).map_err(Error::from)
    }
}

fn decode_xattr(
    types: &HashMap<String, ValueKind>,
    name: &str,
    bytes: &[u8],
) -> OwnedValue {
    let decoded = types.get(name).and_then(|kind| decode_typed(*kind, bytes));
    match decoded {
        Some(value) => value,
        None => {
            // Unwrap because the builder is infallible.
            OwnedValue::build(|alloc| Ok(Value::Binary(alloc.alloc_slice_copy(bytes)))).unwrap()
        }
    }
}

/// Decode a raw xattr payload per the configured type; `None` falls back
/// to the raw bytes.
fn decode_typed(kind: ValueKind, bytes: &[u8]) -> Option<OwnedValue> {
    let text = || {
        std::str::from_utf8(bytes)
            .ok()
            .map(|s| s.trim_end_matches('\0'))
    };

    let build = |value: Value<'_>| OwnedValue::from_value(&value);
    Some(match kind {
        ValueKind::Boolean => match text()? {
            "true" => build(Value::Boolean(true)),
            "false" => build(Value::Boolean(false)),
            _ => return None,
        },
        ValueKind::Int32 => build(Value::Int32(text()?.parse().ok()?)),
        ValueKind::Int64 => build(Value::Int64(text()?.parse().ok()?)),
        ValueKind::UInt32 => build(Value::UInt32(text()?.parse().ok()?)),
        ValueKind::UInt64 => build(Value::UInt64(text()?.parse().ok()?)),
        ValueKind::String => {
            let text = text()?;
            OwnedValue::build(|alloc| Ok(Value::String(alloc.alloc_str(text)))).unwrap()
        }
        _ => return None,
    })
}

/// Re-assemble the event: hint pairs dropped, resolved payloads attached.
fn rebuild(source: &Fsevent<'_>, resolved: &Resolved) -> Result<OwnedFsevent, fsentry::Error> {
    OwnedFsevent::build(|alloc| {
        let mut pairs: Vec<(&str, Option<Value<'_>>)> = Vec::new();
        for pair in source.xattrs.iter() {
            if pair.key != ENRICH_XATTR {
                pairs.push((pair.key, pair.value));
            }
        }
        for (name, value) in &resolved.xattrs {
            pairs.push((name.as_str(), value.as_ref().map(|owned| *owned.get())));
        }
        let xattrs = Map::build(alloc, &pairs);

        match &source.kind {
            FseventKind::Upsert { statx, symlink } => {
                let statx = match (&resolved.statx, statx) {
                    (Some(fetched), _) => Some(*fetched),
                    (None, existing) => *existing,
                };
                let symlink = resolved.symlink.as_deref().or(*symlink);
                Fsevent::upsert(alloc, &source.id, &xattrs, statx.as_ref(), symlink)
            }
            FseventKind::Link { parent_id, name } => {
                Ok(Fsevent::link(alloc, &source.id, &xattrs, parent_id, name))
            }
            FseventKind::Unlink { parent_id, name } => {
                Ok(Fsevent::unlink(alloc, &source.id, parent_id, name))
            }
            FseventKind::Delete => Ok(Fsevent::delete(&source.id)),
            FseventKind::Xattr { link } => match link {
                Some((parent_id, name)) => {
                    Ok(Fsevent::ns_xattr(alloc, &source.id, &xattrs, parent_id, name))
                }
                None => Ok(Fsevent::xattr(alloc, &source.id, &xattrs)),
            },
        }
    })
}

impl<S: Stream<Item = OwnedFsevent>> Stream for Enricher<S> {
    type Item = OwnedFsevent;

    fn next(&mut self) -> Result<Option<OwnedFsevent>, iters::Error> {
        match self.events.next()? {
            None => Ok(None),
            Some(event) => Ok(Some(self.enrich(&event).map_err(iters::Error::from)?)),
        }
    }
}
