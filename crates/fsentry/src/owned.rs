// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Owners coupling an arena-backed view with its backing [`Arena`].
//!
//! A `Value<'a>` (or `Fsentry<'a>`, `Fsevent<'a>`) borrows from the arena it
//! was built in. The wrappers below own that arena, so the pair can be moved,
//! stored and dropped as one unit; dropping the wrapper releases every
//! allocation of the object at once.

use std::fmt;
use std::sync::Arc;

use crate::{Arena, Error, Fsentry, Fsevent, Value};

macro_rules! owned {
    ($(#[$doc:meta])* $owned:ident, $view:ident) => {
        $(#[$doc])*
        pub struct $owned {
            // Declared before the arena so the view drops first.
            view: $view<'static>,
            _zz_alloc: Arc<Arena>,
        }

        impl $owned {
            /// Build a view inside a fresh arena and take ownership of both.
            ///
            /// The `for<'b>` bound guarantees the closure's result borrows
            /// only from the provided arena (or `'static` data), which is
            /// what makes the lifetime erasure below sound.
            pub fn build<F>(build: F) -> Result<$owned, Error>
            where
                F: for<'b> FnOnce(&'b Arena) -> Result<$view<'b>, Error>,
            {
                let alloc = Arc::new(Arena::new());
                let view = build(&alloc)?;
                // Safety: `view` is backed by `alloc`, which is an owned
                // reference to the arena and is stored alongside `view`.
                let view =
                    unsafe { std::mem::transmute::<$view<'_>, $view<'static>>(view) };
                Ok($owned {
                    view,
                    _zz_alloc: alloc,
                })
            }

            pub fn get<'s>(&'s self) -> &'s $view<'s> {
                &self.view
            }
        }

        impl Clone for $owned {
            fn clone(&self) -> $owned {
                // The clone shares the arena; both owners keep it alive.
                $owned {
                    view: self.view.clone(),
                    _zz_alloc: Arc::clone(&self._zz_alloc),
                }
            }
        }

        // Disallow destructuring, which could separate the lifetimes of
        // `view` and the arena.
        impl Drop for $owned {
            fn drop(&mut self) {}
        }

        // Sound because the view and its backing arena are sent together.
        unsafe impl Send for $owned {}

        impl fmt::Debug for $owned {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.view.fmt(f)
            }
        }

        impl PartialEq for $owned {
            fn eq(&self, other: &$owned) -> bool {
                self.get() == other.get()
            }
        }
    };
}

owned!(
    /// An owned, arena-backed [`Value`].
    OwnedValue,
    Value
);
owned!(
    /// An owned, arena-backed [`Fsentry`].
    OwnedFsentry,
    Fsentry
);
owned!(
    /// An owned, arena-backed [`Fsevent`].
    OwnedFsevent,
    Fsevent
);

impl OwnedValue {
    pub fn from_value(value: &Value<'_>) -> OwnedValue {
        // Unwrap because the builder is infallible.
        OwnedValue::build(|alloc| Ok(value.clone_into(alloc))).unwrap()
    }
}

impl OwnedFsentry {
    pub fn from_entry(entry: &Fsentry<'_>) -> OwnedFsentry {
        // Unwrap because the builder is infallible.
        OwnedFsentry::build(|alloc| Ok(entry.clone_into(alloc))).unwrap()
    }
}

impl OwnedFsevent {
    pub fn from_event(event: &Fsevent<'_>) -> OwnedFsevent {
        // Unwrap because the builder is infallible.
        OwnedFsevent::build(|alloc| Ok(event.clone_into(alloc))).unwrap()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Id, Map};

    #[test]
    fn owned_value_outlives_its_builder_scope() {
        let owned = {
            let alloc = Arena::new();
            let map = Map::build(&alloc, &[("key", Some(Value::String("value")))]);
            OwnedValue::from_value(&Value::Map(map))
        };
        assert_eq!(
            owned.get().as_map().unwrap().value("key"),
            Some(&Value::String("value")),
        );
    }

    #[test]
    fn build_propagates_errors() {
        let result = OwnedFsevent::build(|alloc| {
            let statx = crate::Statx {
                mask: crate::statx::TYPE,
                mode: crate::FileType::Regular.to_mode(),
                ..Default::default()
            };
            Fsevent::upsert(
                alloc,
                &Id::root_parent(),
                &Map::EMPTY,
                Some(&statx),
                Some("target"),
            )
        });
        assert!(result.is_err());
    }

    #[test]
    fn clones_share_the_arena() {
        let owned = OwnedValue::from_value(&Value::String("shared"));
        let clone = owned.clone();
        drop(owned);
        assert_eq!(clone.get().as_str(), Some("shared"));
    }
}
