// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

//! A first-party in-memory backend.
//!
//! It holds the namespace as plain link and inode tables and evaluates
//! filters entry by entry. Useful as a reference for the event-application
//! semantics, and as the sink of tests and small pipelines.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use fsentry::{
    entry, Fsentry, FseventKind, Id, Map, OwnedFsentry, OwnedFsevent, OwnedValue, Statx, Value,
};
use iters::Stream;

use crate::{
    capabilities, generic_option, info, overlay, Backend, BackendId, BackendPlugin, Error,
    FilterOptions, FilterOutput, FilterRows, Projection, ValuesSpec,
};

pub const MEMORY_BACKEND_ID: BackendId = 2;

#[derive(Default)]
struct Inode {
    statx: Option<Statx>,
    symlink: Option<String>,
    /// Always a map value when present.
    xattrs: Option<OwnedValue>,
}

struct NsEntry {
    id: Id,
    parent_id: Id,
    name: String,
    xattrs: Option<OwnedValue>,
}

#[derive(Default)]
struct Store {
    inodes: HashMap<Id, Inode>,
    /// Namespace entries; one inode may appear under several of them.
    links: Vec<NsEntry>,
    gc: bool,
}

/// Merge `patch` over `base`: patched keys replace existing ones, other
/// keys are preserved in order.
fn merge_xattrs(base: Option<&OwnedValue>, patch: &Map<'_>) -> OwnedValue {
    // Unwrap because the builder is infallible.
    OwnedValue::build(|alloc| {
        let mut pairs: Vec<(&str, Option<Value<'_>>)> = Vec::new();
        if let Some(base) = base {
            if let Some(map) = base.get().as_map() {
                for pair in map.iter() {
                    if patch.get(pair.key).is_none() {
                        pairs.push((pair.key, pair.value));
                    }
                }
            }
        }
        for pair in patch.iter() {
            pairs.push((pair.key, pair.value));
        }
        Ok(Value::Map(Map::build(alloc, &pairs)))
    })
    .unwrap()
}

fn xattrs_map(xattrs: Option<&OwnedValue>) -> Map<'_> {
    xattrs
        .and_then(|owned| owned.get().as_map())
        .unwrap_or(Map::EMPTY)
}

impl Store {
    fn find_link_mut(&mut self, id: &Id, parent_id: &Id, name: &str) -> Option<&mut NsEntry> {
        self.links
            .iter_mut()
            .find(|link| link.id == *id && link.parent_id == *parent_id && link.name == name)
    }

    fn apply(&mut self, event: &OwnedFsevent) -> Result<(), Error> {
        let event = event.get();
        if event.is_partial() {
            return Err(Error::invalid(
                "a partial event cannot be applied to a backend",
            ));
        }

        match &event.kind {
            FseventKind::Upsert { statx, symlink } => {
                let inode = self.inodes.entry(event.id.clone()).or_default();
                if let Some(new) = statx {
                    match &mut inode.statx {
                        Some(current) => current.merge(new),
                        None => inode.statx = Some(*new),
                    }
                }
                if let Some(symlink) = symlink {
                    inode.symlink = Some((*symlink).to_owned());
                }
                if !event.xattrs.is_empty() {
                    inode.xattrs = Some(merge_xattrs(inode.xattrs.as_ref(), &event.xattrs));
                }
            }
            FseventKind::Link { parent_id, name } => {
                self.inodes.entry(event.id.clone()).or_default();
                match self.find_link_mut(&event.id, parent_id, name) {
                    Some(link) => {
                        link.xattrs = Some(merge_xattrs(link.xattrs.as_ref(), &event.xattrs));
                    }
                    None => self.links.push(NsEntry {
                        id: event.id.clone(),
                        parent_id: parent_id.clone(),
                        name: (*name).to_owned(),
                        xattrs: (!event.xattrs.is_empty())
                            .then(|| merge_xattrs(None, &event.xattrs)),
                    }),
                }
            }
            FseventKind::Unlink { parent_id, name } => {
                self.links.retain(|link| {
                    link.id != event.id || link.parent_id != *parent_id || link.name != *name
                });
            }
            FseventKind::Delete => {
                self.inodes.remove(&event.id);
                self.links.retain(|link| link.id != event.id);
            }
            FseventKind::Xattr { link: None } => {
                let inode = self.inodes.entry(event.id.clone()).or_default();
                inode.xattrs = Some(merge_xattrs(inode.xattrs.as_ref(), &event.xattrs));
            }
            FseventKind::Xattr {
                link: Some((parent_id, name)),
            } => {
                self.inodes.entry(event.id.clone()).or_default();
                match self.find_link_mut(&event.id, parent_id, name) {
                    Some(link) => {
                        link.xattrs = Some(merge_xattrs(link.xattrs.as_ref(), &event.xattrs));
                    }
                    None => self.links.push(NsEntry {
                        id: event.id.clone(),
                        parent_id: parent_id.clone(),
                        name: (*name).to_owned(),
                        xattrs: Some(merge_xattrs(None, &event.xattrs)),
                    }),
                }
            }
        }
        Ok(())
    }

    /// The ids reachable from `root` through namespace entries, `root`
    /// included.
    fn descendants(&self, root: &Id) -> HashSet<Id> {
        let mut set = HashSet::from([root.clone()]);
        loop {
            let before = set.len();
            for link in &self.links {
                if set.contains(&link.parent_id) {
                    set.insert(link.id.clone());
                }
            }
            if set.len() == before {
                return set;
            }
        }
    }

    fn build_entry(&self, link: &NsEntry) -> Result<OwnedFsentry, Error> {
        let inode = self.inodes.get(&link.id);
        OwnedFsentry::build(|alloc| {
            let mut builder = Fsentry::builder(alloc)
                .id(&link.id)
                .parent_id(&link.parent_id)
                .name(&link.name)
                .ns_xattrs(&xattrs_map(link.xattrs.as_ref()));
            if let Some(inode) = inode {
                builder = builder.inode_xattrs(&xattrs_map(inode.xattrs.as_ref()));
                if let Some(statx) = &inode.statx {
                    builder = builder.statx(statx);
                }
                if let Some(symlink) = &inode.symlink {
                    builder = builder.symlink(symlink);
                }
            }
            builder.build()
        })
        .map_err(Error::from)
    }
}

fn project(entry: &OwnedFsentry, projection: &Projection) -> OwnedFsentry {
    let source = entry.get();
    let mask = source.mask & projection.fsentry_mask;
    // Unwrap because re-assembling a valid entry cannot fail.
    OwnedFsentry::build(|alloc| {
        let mut builder = Fsentry::builder(alloc);
        if mask & entry::mask::ID != 0 {
            builder = builder.id(&source.id);
        }
        if mask & entry::mask::PARENT_ID != 0 {
            builder = builder.parent_id(&source.parent_id);
        }
        if mask & entry::mask::NAME != 0 {
            if let Some(name) = source.name {
                builder = builder.name(name);
            }
        }
        if mask & entry::mask::STATX != 0 {
            if let Some(statx) = &source.statx {
                let mut projected = *statx;
                projected.mask &= projection.statx_mask;
                builder = builder.statx(&projected);
            }
        }
        if mask & entry::mask::NAMESPACE_XATTRS != 0 {
            builder = builder.ns_xattrs(&source.ns_xattrs);
        }
        if mask & entry::mask::INODE_XATTRS != 0 {
            builder = builder.inode_xattrs(&source.inode_xattrs);
        }
        if mask & entry::mask::SYMLINK != 0 {
            if let Some(symlink) = source.symlink {
                builder = builder.symlink(symlink);
            }
        }
        builder.build()
    })
    .unwrap()
}

/// An orderable rendition of an extracted field value.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
enum SortKey {
    Missing,
    Integer(i128),
    Text(String),
    Bytes(Vec<u8>),
}

fn sort_key(entry: &OwnedFsentry, field: &str) -> SortKey {
    let Ok(field) = filter::FilterField::parse(field) else {
        return SortKey::Missing;
    };
    match filter::extract(&field, entry.get()) {
        None => SortKey::Missing,
        Some(Value::Int32(i)) => SortKey::Integer(i.into()),
        Some(Value::UInt32(u)) => SortKey::Integer(u.into()),
        Some(Value::Int64(i)) => SortKey::Integer(i.into()),
        Some(Value::UInt64(u)) => SortKey::Integer(u.into()),
        Some(Value::Boolean(b)) => SortKey::Integer(b.into()),
        Some(Value::String(s)) => SortKey::Text(s.to_owned()),
        Some(Value::Binary(b)) => SortKey::Bytes(b.to_vec()),
        Some(_) => SortKey::Missing,
    }
}

fn aggregate(entries: &[OwnedFsentry], spec: &ValuesSpec) -> Result<Vec<OwnedValue>, Error> {
    use crate::AccumulatorOp;

    // Group entries by the rendered values of the group_by fields.
    let mut groups: HashMap<Vec<SortKey>, Vec<&OwnedFsentry>> = HashMap::new();
    for entry in entries {
        let key = spec
            .group_by
            .iter()
            .map(|field| sort_key(entry, field))
            .collect();
        groups.entry(key).or_default().push(entry);
    }

    let mut rows = Vec::with_capacity(groups.len());
    for (key, members) in groups {
        let row = OwnedValue::build(|alloc| {
            let mut pairs: Vec<(&str, Option<Value<'_>>)> = Vec::new();

            for (field, value) in spec.group_by.iter().zip(&key) {
                let rendered = match value {
                    SortKey::Missing => None,
                    SortKey::Integer(i) => Some(Value::Int64(*i as i64)),
                    SortKey::Text(s) => Some(Value::String(alloc.alloc_str(s))),
                    SortKey::Bytes(b) => Some(Value::Binary(alloc.alloc_slice_copy(b))),
                };
                pairs.push((field.as_str(), rendered));
            }

            for accumulator in &spec.accumulators {
                let samples: Vec<i128> = members
                    .iter()
                    .filter_map(|entry| match sort_key(entry, &accumulator.field) {
                        SortKey::Integer(i) => Some(i),
                        _ => None,
                    })
                    .collect();
                let value = match accumulator.op {
                    AccumulatorOp::Count => Some(members.len() as i128),
                    AccumulatorOp::Sum => Some(samples.iter().sum()),
                    AccumulatorOp::Min => samples.iter().min().copied(),
                    AccumulatorOp::Max => samples.iter().max().copied(),
                    AccumulatorOp::Avg => (!samples.is_empty())
                        .then(|| samples.iter().sum::<i128>() / samples.len() as i128),
                };
                pairs.push((
                    accumulator.field.as_str(),
                    value.map(|v| Value::Int64(v as i64)),
                ));
            }

            Ok(Value::Map(Map::build(alloc, &pairs)))
        })?;
        rows.push(row);
    }
    Ok(rows)
}

/// The in-memory backend; branches share the store.
pub struct MemoryBackend {
    fsname: String,
    store: Arc<Mutex<Store>>,
    /// The subtree this handle is scoped to; `None` for the whole mirror.
    root: Option<Id>,
}

impl MemoryBackend {
    pub fn new(fsname: &str) -> MemoryBackend {
        MemoryBackend {
            fsname: fsname.to_owned(),
            store: Arc::new(Mutex::new(Store::default())),
            root: None,
        }
    }

    /// Drop inodes no namespace entry references anymore.
    fn collect_garbage(store: &mut Store) {
        let referenced: HashSet<Id> = store.links.iter().map(|link| link.id.clone()).collect();
        store.inodes.retain(|id, _| referenced.contains(id));
    }
}

impl Backend for MemoryBackend {
    fn id(&self) -> BackendId {
        MEMORY_BACKEND_ID
    }

    fn name(&self) -> &str {
        "memory"
    }

    fn capabilities(&self) -> u32 {
        capabilities::FILTER | capabilities::UPDATE | capabilities::BRANCH
    }

    fn backend_get_option(&self, option: u32, data: &mut [u8]) -> Result<usize, Error> {
        match option {
            generic_option::GC => {
                if data.is_empty() {
                    return Err(Error::Overflow { required: 1 });
                }
                data[0] = self.store.lock().unwrap().gc.into();
                Ok(1)
            }
            _ => Err(Error::UnknownOption(option)),
        }
    }

    fn backend_set_option(&mut self, option: u32, data: &[u8]) -> Result<(), Error> {
        match option {
            generic_option::GC => {
                let [enable] = data else {
                    return Err(Error::invalid("the gc option takes a single byte"));
                };
                let mut store = self.store.lock().unwrap();
                store.gc = *enable != 0;
                if store.gc {
                    Self::collect_garbage(&mut store);
                }
                Ok(())
            }
            _ => Err(Error::UnknownOption(option)),
        }
    }

    fn update(&mut self, events: &mut dyn Stream<Item = OwnedFsevent>) -> Result<usize, Error> {
        let mut store = self.store.lock().unwrap();
        let mut applied = 0;
        while let Some(event) = events.next()? {
            store.apply(&event)?;
            applied += 1;
        }
        if store.gc {
            Self::collect_garbage(&mut store);
        }
        tracing::debug!(fsname = self.fsname, applied, "applied fsevents");
        Ok(applied)
    }

    fn branch(&self, id: Option<&Id>, path: Option<&str>) -> Result<Box<dyn Backend>, Error> {
        let root = match (id, path) {
            (Some(id), None) => id.clone(),
            (None, Some(path)) => {
                let entry = overlay::fsentry_from_path(self, path, &Projection::ID_ONLY)?;
                entry.get().id.clone()
            }
            _ => {
                return Err(Error::invalid(
                    "branch takes exactly one of an id and a path",
                ))
            }
        };
        Ok(Box::new(MemoryBackend {
            fsname: self.fsname.clone(),
            store: Arc::clone(&self.store),
            root: Some(root),
        }))
    }

    fn filter(
        &self,
        filter_: Option<&filter::Filter<'_>>,
        options: &FilterOptions,
        output: &FilterOutput,
    ) -> Result<FilterRows, Error> {
        let store = self.store.lock().unwrap();
        let scope = self.root.as_ref().map(|root| store.descendants(root));

        let mut matched = Vec::new();
        for link in &store.links {
            if let Some(scope) = &scope {
                if !scope.contains(&link.id) {
                    continue;
                }
            }
            let entry = store.build_entry(link)?;
            if filter::matches(filter_, entry.get())? {
                matched.push(entry);
            }
        }
        drop(store);

        for spec in options.sort.iter().rev() {
            matched.sort_by(|a, b| {
                let ordering = sort_key(a, &spec.field).cmp(&sort_key(b, &spec.field));
                if spec.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }

        let skip = usize::try_from(options.skip).unwrap_or(usize::MAX);
        let mut matched: Vec<OwnedFsentry> = matched.into_iter().skip(skip).collect();
        if let Some(limit) = options.limit {
            matched.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }

        match output {
            FilterOutput::Projection(projection) => Ok(FilterRows::Entries(Box::new(
                iters::array(matched.iter().map(|e| project(e, projection)).collect()),
            ))),
            FilterOutput::Values(spec) => Ok(FilterRows::Values(Box::new(iters::array(
                aggregate(&matched, spec)?,
            )))),
        }
    }

    fn root(&self, projection: &Projection) -> Result<OwnedFsentry, Error> {
        let store = self.store.lock().unwrap();
        let link = match &self.root {
            None => store
                .links
                .iter()
                .find(|link| link.parent_id.is_root_parent() && link.name.is_empty()),
            Some(root) => store.links.iter().find(|link| link.id == *root),
        };
        match link {
            Some(link) => Ok(project(&store.build_entry(link)?, projection)),
            None => Err(Error::NotFound),
        }
    }

    fn get_info(&self, request: u32) -> Result<OwnedValue, Error> {
        if request & info::BACKEND_SOURCE == 0 {
            return Err(Error::Unsupported("get_info"));
        }
        OwnedValue::build(|alloc| {
            let source = Value::Map(Map::build(
                alloc,
                &[
                    ("type", Some(Value::String("plugin"))),
                    ("plugin", Some(Value::String("memory"))),
                ],
            ));
            let sequence = alloc.alloc_slice_fill_iter([source].into_iter());
            Ok(Value::Map(Map::build(
                alloc,
                &[("backend_source", Some(Value::Sequence(sequence)))],
            )))
        })
        .map_err(Error::from)
    }
}

/// The plugin behind `rbh:memory:<fsname>` URIs.
pub struct MemoryPlugin;

impl BackendPlugin for MemoryPlugin {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn version(&self) -> (u8, u8, u16) {
        (1, 0, 0)
    }

    fn capabilities(&self) -> u32 {
        capabilities::FILTER | capabilities::UPDATE | capabilities::BRANCH
    }

    fn new_backend(&self, fsname: &str) -> Result<Box<dyn Backend>, Error> {
        Ok(Box::new(MemoryBackend::new(fsname)))
    }
}

/// Make the memory plugin available to [`crate::from_uri`].
pub fn register() {
    crate::register_plugin(Arc::new(MemoryPlugin));
}
