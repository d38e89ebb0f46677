// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

use std::sync::Arc;

use fsentry::{Arena, Value, ValueKind};

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Equal,
    LowerThan,
    LowerOrEqual,
    GreaterThan,
    GreaterOrEqual,
    In,
    Regex,
    Exists,
    BitsAnySet,
    BitsAllSet,
    BitsAnyClear,
    BitsAllClear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayOp {
    /// At least one element of a sequence-valued field satisfies every
    /// sub-comparison.
    ElemMatch,
}

impl ComparisonOp {
    /// Does `value` have a shape this operator can work with?
    pub fn accepts(self, value: &Value<'_>) -> bool {
        match self {
            ComparisonOp::In => value.kind() == ValueKind::Sequence,
            ComparisonOp::Regex => value.kind() == ValueKind::Regex,
            ComparisonOp::Exists => value.kind() == ValueKind::Boolean,
            ComparisonOp::BitsAnySet
            | ComparisonOp::BitsAllSet
            | ComparisonOp::BitsAnyClear
            | ComparisonOp::BitsAllClear => matches!(
                value.kind(),
                ValueKind::Int32 | ValueKind::UInt32 | ValueKind::Int64 | ValueKind::UInt64,
            ),
            _ => true,
        }
    }
}

/// The part of an fsentry a comparison applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsentryField {
    Id,
    ParentId,
    Name,
    Statx,
    Symlink,
    NamespaceXattrs,
    InodeXattrs,
}

/// A field selector: an fsentry property, further narrowed to a statx field
/// (by presence mask) or to one extended attribute (by dotted key).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterField<'a> {
    pub fsentry: FsentryField,
    /// Meaningful when `fsentry` is [`FsentryField::Statx`].
    pub statx: Option<u32>,
    /// Meaningful when `fsentry` selects one of the xattr maps.
    pub xattr: Option<&'a str>,
}

impl<'a> FilterField<'a> {
    pub const fn fsentry(fsentry: FsentryField) -> FilterField<'a> {
        FilterField {
            fsentry,
            statx: None,
            xattr: None,
        }
    }

    pub const fn statx(mask: u32) -> FilterField<'a> {
        FilterField {
            fsentry: FsentryField::Statx,
            statx: Some(mask),
            xattr: None,
        }
    }

    pub const fn ns_xattr(key: &'a str) -> FilterField<'a> {
        FilterField {
            fsentry: FsentryField::NamespaceXattrs,
            statx: None,
            xattr: Some(key),
        }
    }

    pub const fn inode_xattr(key: &'a str) -> FilterField<'a> {
        FilterField {
            fsentry: FsentryField::InodeXattrs,
            statx: None,
            xattr: Some(key),
        }
    }

    pub fn clone_into<'b>(&self, alloc: &'b Arena) -> FilterField<'b> {
        FilterField {
            fsentry: self.fsentry,
            statx: self.statx,
            xattr: self.xattr.map(|x| &*alloc.alloc_str(x)),
        }
    }

    fn validate(&self) -> Result<(), Error> {
        match self.fsentry {
            FsentryField::Statx if self.statx == Some(0) => {
                Err(Error::invalid("statx field selector with an empty mask"))
            }
            _ => Ok(()),
        }
    }
}

/// A single predicate over one field of an fsentry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison<'a> {
    pub op: ComparisonOp,
    pub field: FilterField<'a>,
    pub value: Value<'a>,
}

impl<'a> Comparison<'a> {
    pub fn clone_into<'b>(&self, alloc: &'b Arena) -> Comparison<'b> {
        Comparison {
            op: self.op,
            field: self.field.clone_into(alloc),
            value: self.value.clone_into(alloc),
        }
    }

    fn validate(&self) -> Result<(), Error> {
        self.field.validate()?;
        if !self.op.accepts(&self.value) {
            return Err(Error::invalid(format!(
                "operator {:?} does not apply to a {} value",
                self.op,
                self.value.kind(),
            )));
        }
        self.value.validate()?;
        Ok(())
    }
}

/// A predicate tree over the fields of an fsentry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Filter<'a> {
    Comparison(Comparison<'a>),
    Logical {
        op: LogicalOp,
        filters: &'a [Filter<'a>],
    },
    Array {
        op: ArrayOp,
        field: FilterField<'a>,
        filters: &'a [Comparison<'a>],
    },
    /// Materialize the fsentry matched by `fsentry_to_get` and use it to
    /// parameterize `filter` (e.g. "entries whose parent is the entry at
    /// this path").
    Get {
        filter: &'a Filter<'a>,
        fsentry_to_get: &'a Filter<'a>,
    },
}

impl<'a> Filter<'a> {
    /// Build a comparison filter, checking the operator matches the value's
    /// shape and cloning both into `alloc`.
    pub fn compare<'b>(
        alloc: &'b Arena,
        op: ComparisonOp,
        field: FilterField<'_>,
        value: Value<'_>,
    ) -> Result<Filter<'b>, Error> {
        let comparison = Comparison { op, field, value };
        comparison.validate()?;
        Ok(Filter::Comparison(comparison.clone_into(alloc)))
    }

    /// A comparison that tests whether `field` is populated.
    pub fn exists<'b>(alloc: &'b Arena, field: FilterField<'_>) -> Result<Filter<'b>, Error> {
        Filter::compare(alloc, ComparisonOp::Exists, field, Value::Boolean(true))
    }

    fn logical<'b>(
        alloc: &'b Arena,
        op: LogicalOp,
        filters: &[&Filter<'_>],
    ) -> Result<Filter<'b>, Error> {
        if filters.is_empty() {
            return Err(Error::invalid(format!("{op:?} of no filters")));
        }
        Ok(Filter::Logical {
            op,
            filters: alloc.alloc_slice_fill_iter(filters.iter().map(|f| (*f).clone_into(alloc))),
        })
    }

    pub fn and<'b>(alloc: &'b Arena, filters: &[&Filter<'_>]) -> Result<Filter<'b>, Error> {
        Filter::logical(alloc, LogicalOp::And, filters)
    }

    pub fn or<'b>(alloc: &'b Arena, filters: &[&Filter<'_>]) -> Result<Filter<'b>, Error> {
        Filter::logical(alloc, LogicalOp::Or, filters)
    }

    pub fn not<'b>(alloc: &'b Arena, filter: &Filter<'_>) -> Result<Filter<'b>, Error> {
        Filter::logical(alloc, LogicalOp::Not, &[filter])
    }

    pub fn array_elemmatch<'b>(
        alloc: &'b Arena,
        field: FilterField<'_>,
        comparisons: &[Comparison<'_>],
    ) -> Result<Filter<'b>, Error> {
        let filter = Filter::Array {
            op: ArrayOp::ElemMatch,
            field: field.clone_into(alloc),
            filters: alloc
                .alloc_slice_fill_iter(comparisons.iter().map(|c| c.clone_into(alloc))),
        };
        filter.validate()?;
        Ok(filter)
    }

    pub fn get<'b>(
        alloc: &'b Arena,
        filter: &Filter<'_>,
        fsentry_to_get: &Filter<'_>,
    ) -> Filter<'b> {
        Filter::Get {
            filter: alloc.alloc(filter.clone_into(alloc)),
            fsentry_to_get: alloc.alloc(fsentry_to_get.clone_into(alloc)),
        }
    }

    /// Deep-copy this filter into `alloc`.
    pub fn clone_into<'b>(&self, alloc: &'b Arena) -> Filter<'b> {
        match *self {
            Filter::Comparison(comparison) => Filter::Comparison(comparison.clone_into(alloc)),
            Filter::Logical { op, filters } => Filter::Logical {
                op,
                filters: alloc.alloc_slice_fill_iter(filters.iter().map(|f| f.clone_into(alloc))),
            },
            Filter::Array {
                op,
                field,
                filters,
            } => Filter::Array {
                op,
                field: field.clone_into(alloc),
                filters: alloc.alloc_slice_fill_iter(filters.iter().map(|c| c.clone_into(alloc))),
            },
            Filter::Get {
                filter,
                fsentry_to_get,
            } => Filter::Get {
                filter: alloc.alloc(filter.clone_into(alloc)),
                fsentry_to_get: alloc.alloc(fsentry_to_get.clone_into(alloc)),
            },
        }
    }

    /// Walk the tree and check every structural invariant.
    pub fn validate(&self) -> Result<(), Error> {
        match self {
            Filter::Comparison(comparison) => comparison.validate(),
            Filter::Logical { op, filters } => {
                if filters.is_empty() {
                    return Err(Error::invalid(format!("{op:?} of no filters")));
                }
                if *op == LogicalOp::Not && filters.len() != 1 {
                    return Err(Error::invalid(format!(
                        "Not applies to exactly one filter, got {}",
                        filters.len(),
                    )));
                }
                filters.iter().try_for_each(Filter::validate)
            }
            Filter::Array { field, filters, .. } => {
                if filters.is_empty() {
                    return Err(Error::invalid("ElemMatch of no comparisons"));
                }
                field.validate()?;
                filters.iter().try_for_each(Comparison::validate)
            }
            Filter::Get {
                filter,
                fsentry_to_get,
            } => {
                filter.validate()?;
                fsentry_to_get.validate()
            }
        }
    }
}

/// An owned, arena-backed [`Filter`].
pub struct OwnedFilter {
    // Declared before the arena so the view drops first.
    filter: Filter<'static>,
    _zz_alloc: Arc<Arena>,
}

impl OwnedFilter {
    /// Build a filter inside a fresh arena and take ownership of both; see
    /// `fsentry::OwnedValue` for the lifetime argument.
    pub fn build<F>(build: F) -> Result<OwnedFilter, Error>
    where
        F: for<'b> FnOnce(&'b Arena) -> Result<Filter<'b>, Error>,
    {
        let alloc = Arc::new(Arena::new());
        let filter = build(&alloc)?;
        // Safety: `filter` is backed by `alloc`, which is stored alongside.
        let filter = unsafe { std::mem::transmute::<Filter<'_>, Filter<'static>>(filter) };
        Ok(OwnedFilter {
            filter,
            _zz_alloc: alloc,
        })
    }

    pub fn from_filter(filter: &Filter<'_>) -> OwnedFilter {
        // Unwrap because the builder is infallible.
        OwnedFilter::build(|alloc| Ok(filter.clone_into(alloc))).unwrap()
    }

    pub fn get<'s>(&'s self) -> &'s Filter<'s> {
        &self.filter
    }
}

impl Clone for OwnedFilter {
    fn clone(&self) -> OwnedFilter {
        OwnedFilter {
            filter: self.filter,
            _zz_alloc: Arc::clone(&self._zz_alloc),
        }
    }
}

impl Drop for OwnedFilter {
    // Disallow destructuring, which could separate the filter from its arena.
    fn drop(&mut self) {}
}

// Sound because the filter and its backing arena are sent together.
unsafe impl Send for OwnedFilter {}

impl std::fmt::Debug for OwnedFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.filter.fmt(f)
    }
}
