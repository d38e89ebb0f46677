// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

use fsentry::entry;

/// Which fields of the returned fsentries a query wants populated.
///
/// Backends may return more (the extra information came for free) or fewer
/// (the backend does not have it) fields; callers check the masks of the
/// returned entries before using a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Projection {
    pub fsentry_mask: u32,
    /// Narrows the statx fields; ignored unless the statx bit is set in
    /// `fsentry_mask`.
    pub statx_mask: u32,
}

impl Projection {
    pub const ALL: Projection = Projection {
        fsentry_mask: entry::mask::ALL,
        statx_mask: fsentry::statx::ALL,
    };

    pub const ID_ONLY: Projection = Projection {
        fsentry_mask: entry::mask::ID,
        statx_mask: 0,
    };
}

impl Default for Projection {
    fn default() -> Projection {
        Projection::ALL
    }
}

/// One sort criterion; entries compare by the value of `field` (a path in
/// the filter field language).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub ascending: bool,
}

/// Pagination and ordering options of a query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOptions {
    pub skip: u64,
    pub limit: Option<u64>,
    pub sort: Vec<SortSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorOp {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

/// One aggregation output column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accumulator {
    pub op: AccumulatorOp,
    /// The aggregated field (ignored by `Count`).
    pub field: String,
}

/// An aggregation request: group matching entries by the values of
/// `group_by` and reduce each group with `accumulators`.
///
/// Rows have no observable order unless the query carried a sort option.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValuesSpec {
    pub group_by: Vec<String>,
    pub accumulators: Vec<Accumulator>,
}

/// The output shape of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutput {
    Projection(Projection),
    Values(ValuesSpec),
}

impl Default for FilterOutput {
    fn default() -> FilterOutput {
        FilterOutput::Projection(Projection::ALL)
    }
}
