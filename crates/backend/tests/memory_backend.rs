// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

use backend::memory::MemoryBackend;
use backend::{
    filter_one, fsentry_from_path, Backend, Error, FilterOptions, FilterOutput, Projection,
    SortSpec,
};
use filter::{ComparisonOp, Filter, FilterField, FsentryField, OwnedFilter};
use fsentry::statx;
use fsentry::{entry, FileType, Fsevent, Id, Map, OwnedFsevent, Statx, StatxTimestamp, Value};
use iters::Stream;
use pretty_assertions::assert_eq;

fn id(name: &str) -> Id {
    Id::from_bytes(name.as_bytes()).unwrap()
}

fn upsert(target: &Id, statx: Option<&Statx>, symlink: Option<&str>) -> OwnedFsevent {
    OwnedFsevent::build(|alloc| Fsevent::upsert(alloc, target, &Map::EMPTY, statx, symlink))
        .unwrap()
}

fn link(target: &Id, parent: &Id, name: &str) -> OwnedFsevent {
    OwnedFsevent::build(|alloc| Ok(Fsevent::link(alloc, target, &Map::EMPTY, parent, name)))
        .unwrap()
}

fn dir_statx(size: u64) -> Statx {
    Statx {
        mask: statx::TYPE | statx::MODE | statx::SIZE,
        mode: FileType::Directory.to_mode() | 0o755,
        size,
        ..Default::default()
    }
}

fn file_statx(size: u64) -> Statx {
    Statx {
        mask: statx::TYPE | statx::MODE | statx::SIZE,
        mode: FileType::Regular.to_mode() | 0o644,
        size,
        ..Default::default()
    }
}

// Mirror a small tree:
//   /
//   ├── a/
//   │   └── b   (file, 10 bytes)
//   └── c       (file, 3 bytes)
fn seeded_backend() -> MemoryBackend {
    let mut backend = MemoryBackend::new("test");
    let events = vec![
        link(&id("root"), &Id::root_parent(), ""),
        upsert(&id("root"), Some(&dir_statx(0)), None),
        link(&id("a"), &id("root"), "a"),
        upsert(&id("a"), Some(&dir_statx(0)), None),
        link(&id("b"), &id("a"), "b"),
        upsert(&id("b"), Some(&file_statx(10)), None),
        link(&id("c"), &id("root"), "c"),
        upsert(&id("c"), Some(&file_statx(3)), None),
    ];
    let count = events.len();
    assert_eq!(
        backend.update(&mut iters::array(events)).unwrap(),
        count,
    );
    backend
}

fn name_filter(name: &str) -> OwnedFilter {
    OwnedFilter::build(|alloc| {
        Filter::compare(
            alloc,
            ComparisonOp::Equal,
            FilterField::fsentry(FsentryField::Name),
            Value::String(name),
        )
    })
    .unwrap()
}

#[test]
fn upsert_merges_statx_fields() {
    let mut backend = MemoryBackend::new("test");
    let target = id("x");

    let first = Statx {
        mask: statx::SIZE,
        size: 3,
        ..Default::default()
    };
    let second = Statx {
        mask: statx::SIZE | statx::MTIME_SEC,
        size: 10,
        mtime: StatxTimestamp { sec: 42, nsec: 0 },
        ..Default::default()
    };

    let events = vec![
        link(&target, &Id::root_parent(), ""),
        upsert(&target, Some(&first), None),
        upsert(&target, Some(&second), None),
    ];
    backend.update(&mut iters::array(events)).unwrap();

    let entry = backend.root(&Projection::ALL).unwrap();
    let stored = entry.get().statx.unwrap();
    assert_eq!(stored.mask, statx::SIZE | statx::MTIME_SEC);
    assert_eq!(stored.size, 10);
    assert_eq!(stored.mtime.sec, 42);
}

#[test]
fn fsentry_from_path_descends_the_namespace() {
    let backend = seeded_backend();

    let entry = fsentry_from_path(&backend, "/a/b", &Projection::ALL).unwrap();
    assert_eq!(entry.get().name, Some("b"));
    assert_eq!(entry.get().id, id("b"));

    // Redundant slashes are ignored.
    let entry = fsentry_from_path(&backend, "//a///b/", &Projection::ALL).unwrap();
    assert_eq!(entry.get().id, id("b"));

    // "/" resolves to the root entry.
    let entry = fsentry_from_path(&backend, "/", &Projection::ALL).unwrap();
    assert_eq!(entry.get().id, id("root"));

    assert!(matches!(
        fsentry_from_path(&backend, "/a/nope", &Projection::ALL),
        Err(Error::NotFound),
    ));
    assert!(matches!(
        fsentry_from_path(&backend, "/nope/b", &Projection::ALL),
        Err(Error::NotFound),
    ));
}

#[test]
fn branches_scope_queries_to_a_subtree() {
    let backend = seeded_backend();
    let branch = backend.branch(None, Some("/a")).unwrap();

    // "c" is outside the branch.
    assert!(matches!(
        filter_one(branch.as_ref(), Some(name_filter("c").get()), &Projection::ALL),
        Err(Error::NotFound),
    ));
    // "b" is inside.
    let entry =
        filter_one(branch.as_ref(), Some(name_filter("b").get()), &Projection::ALL).unwrap();
    assert_eq!(entry.get().id, id("b"));

    // The branch's root is the branched-to entry.
    assert_eq!(branch.root(&Projection::ALL).unwrap().get().id, id("a"));

    // Updates through the parent remain visible to the branch.
    let mut parent = backend;
    parent
        .update(&mut iters::array(vec![
            link(&id("d"), &id("a"), "d"),
            upsert(&id("d"), Some(&file_statx(1)), None),
        ]))
        .unwrap();
    let entry =
        filter_one(branch.as_ref(), Some(name_filter("d").get()), &Projection::ALL).unwrap();
    assert_eq!(entry.get().id, id("d"));

    // Destroying the parent does not invalidate a live branch.
    drop(parent);
    assert!(filter_one(branch.as_ref(), Some(name_filter("b").get()), &Projection::ALL).is_ok());
}

#[test]
fn unlink_removes_one_namespace_entry_among_many() {
    let mut backend = seeded_backend();

    // Hardlink "b" under the root as "b2": two namespace entries, one inode.
    backend
        .update(&mut iters::array(vec![link(&id("b"), &id("root"), "b2")]))
        .unwrap();
    assert!(fsentry_from_path(&backend, "/b2", &Projection::ALL).is_ok());
    assert!(fsentry_from_path(&backend, "/a/b", &Projection::ALL).is_ok());

    let unlink = OwnedFsevent::build(|alloc| {
        Ok(Fsevent::unlink(alloc, &id("b"), &id("a"), "b"))
    })
    .unwrap();
    backend.update(&mut iters::array(vec![unlink])).unwrap();

    assert!(matches!(
        fsentry_from_path(&backend, "/a/b", &Projection::ALL),
        Err(Error::NotFound),
    ));
    // The other link (and the inode) survive.
    let entry = fsentry_from_path(&backend, "/b2", &Projection::ALL).unwrap();
    assert_eq!(entry.get().statx.unwrap().size, 10);
}

#[test]
fn delete_removes_the_inode_and_all_links() {
    let mut backend = seeded_backend();
    let delete = OwnedFsevent::build(|alloc| {
        let _ = alloc;
        Ok(Fsevent::delete(&id("c")))
    })
    .unwrap();
    backend.update(&mut iters::array(vec![delete])).unwrap();

    assert!(matches!(
        fsentry_from_path(&backend, "/c", &Projection::ALL),
        Err(Error::NotFound),
    ));
}

#[test]
fn xattr_events_patch_inode_and_namespace_scopes() {
    let mut backend = seeded_backend();

    let inode_scoped = OwnedFsevent::build(|alloc| {
        let xattrs = Map::build(alloc, &[("user.tag", Some(Value::String("blue")))]);
        Ok(Fsevent::xattr(alloc, &id("b"), &xattrs))
    })
    .unwrap();
    let ns_scoped = OwnedFsevent::build(|alloc| {
        let xattrs = Map::build(alloc, &[("path", Some(Value::String("/a/b")))]);
        Ok(Fsevent::ns_xattr(alloc, &id("b"), &xattrs, &id("a"), "b"))
    })
    .unwrap();
    backend
        .update(&mut iters::array(vec![inode_scoped, ns_scoped]))
        .unwrap();

    let entry = fsentry_from_path(&backend, "/a/b", &Projection::ALL).unwrap();
    assert_eq!(
        entry.get().find_inode_xattr("user.tag"),
        Some(&Value::String("blue")),
    );
    assert_eq!(entry.get().path(), Some("/a/b"));
}

#[test]
fn partial_events_never_reach_the_store() {
    let mut backend = seeded_backend();
    let partial = OwnedFsevent::build(|alloc| {
        let hints = Map::build(alloc, &[("symlink", Some(Value::String("symlink")))]);
        let xattrs = Map::build(alloc, &[(fsentry::ENRICH_XATTR, Some(Value::Map(hints)))]);
        Fsevent::upsert(alloc, &id("b"), &xattrs, None, None)
    })
    .unwrap();

    assert!(matches!(
        backend.update(&mut iters::array(vec![partial])),
        Err(Error::Invalid(_)),
    ));
}

#[test]
fn filters_project_sort_and_paginate() {
    let backend = seeded_backend();

    // Only files, sorted by size descending.
    let files = OwnedFilter::build(|alloc| {
        Filter::compare(
            alloc,
            ComparisonOp::Equal,
            FilterField::statx(statx::TYPE),
            Value::String("file"),
        )
    })
    .unwrap();
    let options = FilterOptions {
        sort: vec![SortSpec {
            field: "statx.size".to_owned(),
            ascending: false,
        }],
        ..Default::default()
    };
    let projection = Projection {
        fsentry_mask: entry::mask::NAME | entry::mask::STATX,
        statx_mask: statx::SIZE,
    };
    let rows = backend
        .filter(
            Some(files.get()),
            &options,
            &FilterOutput::Projection(projection),
        )
        .unwrap();
    let entries = rows.entries().unwrap().collect().unwrap();

    let names: Vec<_> = entries.iter().map(|e| e.get().name.unwrap().to_owned()).collect();
    assert_eq!(names, ["b", "c"]);
    // The projection dropped the id and narrowed statx to the size.
    assert_eq!(entries[0].get().mask & entry::mask::ID, 0);
    assert_eq!(entries[0].get().statx.unwrap().mask, statx::SIZE);

    // skip/limit paginate the same query.
    let options = FilterOptions {
        skip: 1,
        limit: Some(1),
        sort: vec![SortSpec {
            field: "name".to_owned(),
            ascending: true,
        }],
    };
    let rows = backend
        .filter(Some(files.get()), &options, &FilterOutput::default())
        .unwrap();
    let entries = rows.entries().unwrap().collect().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].get().name, Some("c"));
}

#[test]
fn aggregation_counts_and_sums() {
    use backend::{Accumulator, AccumulatorOp, ValuesSpec};

    let backend = seeded_backend();
    let spec = ValuesSpec {
        group_by: vec!["statx.type".to_owned()],
        accumulators: vec![
            Accumulator {
                op: AccumulatorOp::Count,
                field: "statx.size".to_owned(),
            },
        ],
    };
    let rows = backend
        .filter(None, &FilterOptions::default(), &FilterOutput::Values(spec))
        .unwrap();
    let rows = rows.values().unwrap().collect().unwrap();

    // Two groups: directories (root, a) and files (b, c).
    assert_eq!(rows.len(), 2);
    for row in rows {
        let map = row.get().as_map().unwrap();
        let count = map.value("statx.size");
        assert_eq!(count, Some(&Value::Int64(2)));
    }
}

#[test]
fn symlinks_round_trip_through_events() {
    let mut backend = MemoryBackend::new("test");
    let sx = Statx {
        mask: statx::TYPE,
        mode: FileType::Symlink.to_mode(),
        ..Default::default()
    };
    backend
        .update(&mut iters::array(vec![
            link(&id("l"), &Id::root_parent(), ""),
            upsert(&id("l"), Some(&sx), Some("target")),
        ]))
        .unwrap();

    let entry = backend.root(&Projection::ALL).unwrap();
    assert_eq!(entry.get().symlink, Some("target"));
    assert_eq!(
        entry.get().statx.unwrap().file_type(),
        Some(FileType::Symlink),
    );
}

#[test]
fn from_uri_instantiates_and_branches() {
    backend::memory::register();
    // Registration is idempotent.
    backend::memory::register();

    let mut backend = backend::from_uri("rbh:memory:test").unwrap();
    assert_eq!(backend.name(), "memory");

    let events = vec![
        link(&id("r"), &Id::root_parent(), ""),
        link(&id("a"), &id("r"), "a"),
        link(&id("b"), &id("a"), "b"),
    ];
    backend.update(&mut iters::array(events)).unwrap();

    // A fresh instance from a URI owns a fresh store, so branch fragments
    // are exercised against this handle directly.
    let branch = backend.branch(None, Some("/a")).unwrap();
    assert_eq!(branch.root(&Projection::ALL).unwrap().get().id, id("a"));

    assert!(backend::from_uri("rbh:nope:test").is_err());
}

#[test]
fn gc_option_round_trips_and_prunes_orphans() {
    use backend::{generic_option, get_option, set_option};

    let mut backend = seeded_backend();

    let mut value = [0u8; 1];
    assert_eq!(
        get_option(&backend, generic_option::GC, &mut value).unwrap(),
        1,
    );
    assert_eq!(value[0], 0);

    // A too-small buffer reports the required size.
    assert!(matches!(
        get_option(&backend, generic_option::GC, &mut []),
        Err(Error::Overflow { required: 1 }),
    ));

    // Orphan the "b" inode, then enable garbage collection.
    let unlink = OwnedFsevent::build(|alloc| {
        Ok(Fsevent::unlink(alloc, &id("b"), &id("a"), "b"))
    })
    .unwrap();
    backend.update(&mut iters::array(vec![unlink])).unwrap();
    set_option(&mut backend, generic_option::GC, &[1]).unwrap();

    assert_eq!(
        get_option(&backend, generic_option::GC, &mut value).unwrap(),
        1,
    );
    assert_eq!(value[0], 1);

    // The deprecated generic option stays unsupported.
    assert!(matches!(
        get_option(&backend, generic_option::DEPRECATED, &mut value),
        Err(Error::Unsupported(_)),
    ));
}

#[test]
fn get_info_reports_the_source_chain() {
    let backend = seeded_backend();
    let info = backend.get_info(backend::info::BACKEND_SOURCE).unwrap();
    let map = info.get().as_map().unwrap();
    let sources = map.value("backend_source").unwrap().as_sequence().unwrap();
    let source = sources[0].as_map().unwrap();
    assert_eq!(source.value("plugin"), Some(&Value::String("memory")));
}
