// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

use std::fs::File;
use std::io::Write;
use std::os::unix::fs::symlink;

use enrich::{no_partial, Enricher};
use fsentry::statx;
use fsentry::{
    Arena, Fsevent, FseventKind, Id, Map, OwnedFsevent, OwnedValue, Value, ENRICH_XATTR,
};
use iters::Stream;

fn id(name: &str) -> Id {
    Id::from_bytes(name.as_bytes()).unwrap()
}

/// A partial upsert carrying `hints` and a `path` xattr so the enricher
/// can resolve the entry inside the test mount.
fn partial_upsert(target: &Id, path: &str, hints: &[(&str, Value<'_>)]) -> OwnedFsevent {
    OwnedFsevent::build(|alloc| {
        let hints: Vec<(&str, Option<Value<'_>>)> =
            hints.iter().map(|(k, v)| (*k, Some(*v))).collect();
        let hint_map = Map::build(alloc, &hints);
        let xattrs = Map::build(
            alloc,
            &[
                ("path", Some(Value::String(path))),
                (ENRICH_XATTR, Some(Value::Map(hint_map))),
            ],
        );
        Fsevent::upsert(alloc, target, &xattrs, None, None)
    })
    .unwrap()
}

fn enrich_one(mount: File, event: OwnedFsevent) -> OwnedFsevent {
    let mut enricher = Enricher::new(iters::array(vec![event]), mount);
    let enriched = enricher.next().unwrap().expect("one event expected");
    assert!(enricher.next().unwrap().is_none());
    enriched
}

#[test]
fn symlink_hint_resolves_the_target() {
    let dir = tempfile::tempdir().unwrap();
    symlink("target", dir.path().join("l")).unwrap();
    let mount = File::open(dir.path()).unwrap();

    let event = partial_upsert(&id("l"), "/l", &[("symlink", Value::String("symlink"))]);
    let enriched = enrich_one(mount, event);

    let event = enriched.get();
    assert!(!event.is_partial());
    let FseventKind::Upsert { symlink, .. } = &event.kind else {
        panic!("expected an upsert");
    };
    assert_eq!(*symlink, Some("target"));
}

#[test]
fn statx_hint_fetches_and_merges() {
    let dir = tempfile::tempdir().unwrap();
    let mut file = File::create(dir.path().join("data")).unwrap();
    file.write_all(b"0123456789").unwrap();
    let mount = File::open(dir.path()).unwrap();

    let mask = statx::SIZE | statx::TYPE | statx::MTIME;
    let event = partial_upsert(&id("data"), "/data", &[("statx", Value::UInt32(mask))]);
    let enriched = enrich_one(mount, event);

    let FseventKind::Upsert { statx: statxbuf, .. } = &enriched.get().kind else {
        panic!("expected an upsert");
    };
    let statxbuf = statxbuf.expect("statx should have been fetched");
    assert_eq!(statxbuf.size, 10);
    assert!(statxbuf.mask & statx::SIZE != 0);
    assert_eq!(statxbuf.file_type(), Some(fsentry::FileType::Regular));
    assert!(!enriched.get().is_partial());
}

#[test]
fn statx_hint_accepts_field_names() {
    let dir = tempfile::tempdir().unwrap();
    File::create(dir.path().join("f")).unwrap();
    let mount = File::open(dir.path()).unwrap();

    let alloc = Arena::new();
    let fields = Value::Sequence(alloc.alloc_slice_fill_iter(
        [
            Value::String("size"),
            Value::Map(Map::build(
                &alloc,
                &[(
                    "mtime",
                    Some(Value::Sequence(&[Value::String("sec")])),
                )],
            )),
        ]
        .into_iter(),
    ));

    let event = partial_upsert(&id("f"), "/f", &[("statx", fields)]);
    let enriched = enrich_one(mount, event);
    let FseventKind::Upsert { statx: statxbuf, .. } = &enriched.get().kind else {
        panic!("expected an upsert");
    };
    assert!(statxbuf.unwrap().mask & statx::SIZE != 0);
}

#[test]
fn failed_resolutions_demote_to_unknown() {
    let dir = tempfile::tempdir().unwrap();
    let mount = File::open(dir.path()).unwrap();

    // The path does not exist; the hint is consumed but nothing resolves.
    let event = partial_upsert(&id("gone"), "/gone", &[("symlink", Value::String("symlink"))]);
    let enriched = enrich_one(mount, event);

    let event = enriched.get();
    assert!(!event.is_partial());
    let FseventKind::Upsert { symlink, statx } = &event.kind else {
        panic!("expected an upsert");
    };
    assert_eq!(*symlink, None);
    assert_eq!(*statx, None);
}

#[test]
fn xattr_fetch_failures_leave_the_name_without_a_value() {
    let dir = tempfile::tempdir().unwrap();
    File::create(dir.path().join("f")).unwrap();
    let mount = File::open(dir.path()).unwrap();

    let event = OwnedFsevent::build(|alloc| {
        let names = Value::Sequence(&[Value::String("user.unset")]);
        let hints = Map::build(alloc, &[("xattrs", Some(names))]);
        let xattrs = Map::build(
            alloc,
            &[
                ("path", Some(Value::String("/f"))),
                (ENRICH_XATTR, Some(Value::Map(hints))),
            ],
        );
        Ok(Fsevent::xattr(alloc, &id("f"), &xattrs))
    })
    .unwrap();

    let enriched = enrich_one(mount, event);
    let event = enriched.get();
    assert!(!event.is_partial());

    let pair = event.xattrs.get("user.unset").expect("name recorded");
    assert_eq!(pair.value, None);
    // Non-hint xattrs are preserved.
    assert_eq!(event.xattrs.value("path"), Some(&Value::String("/f")));
}

#[test]
fn unknown_hints_are_errors() {
    let dir = tempfile::tempdir().unwrap();
    let mount = File::open(dir.path()).unwrap();

    let event = partial_upsert(&id("x"), "/x", &[("frobnicate", Value::Map(Map::EMPTY))]);
    let mut enricher = Enricher::new(iters::array(vec![event]), mount);
    assert!(matches!(enricher.next(), Err(iters::Error::Invalid(_))));
}

#[test]
fn extensions_contribute_xattrs() {
    struct FakeLustre;
    impl enrich::EnrichExtension for FakeLustre {
        fn name(&self) -> &'static str {
            "lustre"
        }
        fn enrich(
            &self,
            _mount: &File,
            _id: &Id,
            _path: Option<&str>,
        ) -> Result<Vec<(String, Option<OwnedValue>)>, enrich::Error> {
            Ok(vec![(
                "hsm_state".to_owned(),
                Some(OwnedValue::from_value(&Value::UInt32(1))),
            )])
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let mount = File::open(dir.path()).unwrap();

    let event = OwnedFsevent::build(|alloc| {
        let hints = Map::build(alloc, &[("lustre", Some(Value::Map(Map::EMPTY)))]);
        let xattrs = Map::build(alloc, &[(ENRICH_XATTR, Some(Value::Map(hints)))]);
        Ok(Fsevent::xattr(alloc, &id("x"), &xattrs))
    })
    .unwrap();

    let mut enricher =
        Enricher::new(iters::array(vec![event]), mount).with_extension(Box::new(FakeLustre));
    let enriched = enricher.next().unwrap().unwrap();
    assert_eq!(
        enriched.get().xattrs.value("hsm_state"),
        Some(&Value::UInt32(1)),
    );
    assert!(!enriched.get().is_partial());
}

#[test]
fn enriched_streams_satisfy_the_guard() {
    let dir = tempfile::tempdir().unwrap();
    symlink("t", dir.path().join("l")).unwrap();
    let mount = File::open(dir.path()).unwrap();

    let event = partial_upsert(&id("l"), "/l", &[("symlink", Value::String("symlink"))]);
    let enricher = Enricher::new(iters::array(vec![event]), mount);
    let mut guarded = no_partial(enricher);

    assert!(guarded.next().unwrap().is_some());
    assert!(guarded.next().unwrap().is_none());
}
