// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

use fsentry::{OwnedFsevent, ENRICH_XATTR};
use iters::Stream;

/// Rejects any event still carrying enrichment hints.
///
/// Sits between the enricher and a backend so that a partial event can
/// never reach storage.
pub struct NoPartial<S> {
    events: S,
}

pub fn no_partial<S>(events: S) -> NoPartial<S> {
    NoPartial { events }
}

impl<S: Stream<Item = OwnedFsevent>> Stream for NoPartial<S> {
    type Item = OwnedFsevent;

    fn next(&mut self) -> Result<Option<OwnedFsevent>, iters::Error> {
        match self.events.next()? {
            None => Ok(None),
            Some(event) if event.get().is_partial() => Err(iters::Error::Invalid(format!(
                "partial event ({ENRICH_XATTR} xattr present) for {:?}",
                event.get().id,
            ))),
            Some(event) => Ok(Some(event)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use fsentry::{Fsevent, Id, Map, Value};

    #[test]
    fn complete_events_pass_partial_ones_do_not() {
        let id = Id::from_bytes(b"x").unwrap();
        let complete = OwnedFsevent::build(|_alloc| Ok(Fsevent::delete(&id))).unwrap();
        let partial = OwnedFsevent::build(|alloc| {
            let hints = Map::build(alloc, &[("statx", Some(Value::UInt32(1)))]);
            let xattrs = Map::build(alloc, &[(ENRICH_XATTR, Some(Value::Map(hints)))]);
            Ok(Fsevent::xattr(alloc, &id, &xattrs))
        })
        .unwrap();

        let mut guarded = no_partial(iters::array(vec![complete, partial]));
        assert!(guarded.next().unwrap().is_some());
        assert!(matches!(guarded.next(), Err(iters::Error::Invalid(_))));
    }
}
