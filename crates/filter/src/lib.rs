// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Filters abstract predicates over the properties of an fsentry.
//!
//! A comparison filter is a single predicate ("this entry's name matches
//! `*.c`"), made of a field, an operator and a value. Logical filters
//! combine other filters, array filters match elements of sequence-valued
//! fields, and get filters parameterize a query with the result of another.
//!
//! The absence of a filter (`None`) is itself a valid filter that matches
//! everything; its negation matches nothing.

mod ast;
pub use ast::{
    ArrayOp, Comparison, ComparisonOp, Filter, FilterField, FsentryField, LogicalOp, OwnedFilter,
};

mod field;

mod shell;
pub use shell::{shell2pcre, shell_regex2filter};

mod numeric;
pub use numeric::{
    numeric2filter, parse_numeric, parse_size, size2filter, NumericPredicate, SIZE_UNITS,
};

mod matcher;
pub use matcher::{compare_values, extract, matches};

/// Error raised when building, validating or evaluating filters.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Invalid(String),

    #[error("unexpected field string: '{0}'")]
    UnknownField(String),

    #[error("{0} is not supported")]
    Unsupported(String),
}

impl Error {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Error::Invalid(message.into())
    }
}

impl From<fsentry::Error> for Error {
    fn from(error: fsentry::Error) -> Self {
        Error::Invalid(error.to_string())
    }
}
