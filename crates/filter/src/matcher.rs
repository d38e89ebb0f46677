// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Generic filter evaluation against a single fsentry.
//!
//! Backends with a native query language translate filters instead of using
//! this; backends without one (and the path-resolution overlay) evaluate
//! entries one by one through [`matches`].

use fsentry::statx;
use fsentry::{entry, Fsentry, RegexOptions, Value};

use crate::{
    shell2pcre, ArrayOp, Comparison, ComparisonOp, Error, Filter, FilterField, FsentryField,
    LogicalOp,
};

/// Evaluate `filter` against `entry`. A missing filter matches everything.
pub fn matches(filter: Option<&Filter<'_>>, entry: &Fsentry<'_>) -> Result<bool, Error> {
    match filter {
        None => Ok(true),
        Some(filter) => eval(filter, entry),
    }
}

fn eval(filter: &Filter<'_>, entry: &Fsentry<'_>) -> Result<bool, Error> {
    match filter {
        Filter::Comparison(comparison) => eval_comparison(comparison, entry),
        Filter::Logical { op, filters } => match op {
            LogicalOp::And => {
                for filter in filters.iter() {
                    if !eval(filter, entry)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            LogicalOp::Or => {
                for filter in filters.iter() {
                    if eval(filter, entry)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            LogicalOp::Not => Ok(!eval(&filters[0], entry)?),
        },
        Filter::Array {
            op: ArrayOp::ElemMatch,
            field,
            filters,
        } => eval_elemmatch(field, filters, entry),
        Filter::Get { .. } => Err(Error::Unsupported(
            "evaluating a get filter outside a backend".to_owned(),
        )),
    }
}

fn eval_comparison(comparison: &Comparison<'_>, entry: &Fsentry<'_>) -> Result<bool, Error> {
    if comparison.op == ComparisonOp::Exists {
        let Value::Boolean(expected) = comparison.value else {
            return Err(Error::invalid("exists comparison with a non-boolean"));
        };
        return Ok(field_is_populated(&comparison.field, entry) == expected);
    }

    match extract(&comparison.field, entry) {
        None => Ok(false),
        Some(field_value) => compare_values(comparison.op, &field_value, &comparison.value),
    }
}

fn eval_elemmatch(
    field: &FilterField<'_>,
    comparisons: &[Comparison<'_>],
    entry: &Fsentry<'_>,
) -> Result<bool, Error> {
    let Some(Value::Sequence(elements)) = extract(field, entry) else {
        return Ok(false);
    };

    'elements: for element in elements {
        for comparison in comparisons {
            if !compare_values(comparison.op, element, &comparison.value)? {
                continue 'elements;
            }
        }
        return Ok(true);
    }
    Ok(false)
}

fn field_is_populated(field: &FilterField<'_>, entry: &Fsentry<'_>) -> bool {
    match field.fsentry {
        FsentryField::Id => entry.mask & entry::mask::ID != 0,
        FsentryField::ParentId => entry.mask & entry::mask::PARENT_ID != 0,
        FsentryField::Name => entry.mask & entry::mask::NAME != 0,
        FsentryField::Symlink => entry.mask & entry::mask::SYMLINK != 0,
        FsentryField::Statx => match (entry.statx.as_ref(), field.statx) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(statx), Some(mask)) => statx.mask & mask != 0,
        },
        FsentryField::NamespaceXattrs => match field.xattr {
            None => entry.mask & entry::mask::NAMESPACE_XATTRS != 0,
            Some(key) => entry.ns_xattrs.value(key).is_some(),
        },
        FsentryField::InodeXattrs => match field.xattr {
            None => entry.mask & entry::mask::INODE_XATTRS != 0,
            Some(key) => entry.find_inode_xattr(key).is_some(),
        },
    }
}

/// Extract the value a field selects, if the entry carries it. The value
/// borrows from the entry (Id bytes live in the entry itself, everything
/// else in its arena).
pub fn extract<'e>(field: &FilterField<'_>, entry: &'e Fsentry<'e>) -> Option<Value<'e>> {
    match field.fsentry {
        FsentryField::Id => {
            (entry.mask & entry::mask::ID != 0).then(|| Value::Binary(entry.id.as_bytes()))
        }
        FsentryField::ParentId => (entry.mask & entry::mask::PARENT_ID != 0)
            .then(|| Value::Binary(entry.parent_id.as_bytes())),
        FsentryField::Name => entry.name.map(Value::String),
        FsentryField::Symlink => entry.symlink.map(Value::String),
        FsentryField::Statx => {
            let statx = entry.statx.as_ref()?;
            statx_value(statx, field.statx?)
        }
        FsentryField::NamespaceXattrs => entry.ns_xattrs.value(field.xattr?).copied(),
        FsentryField::InodeXattrs => entry.find_inode_xattr(field.xattr?).copied(),
    }
}

/// The value of a single statx field designated by a one-field mask.
fn statx_value<'a>(statx: &fsentry::Statx, mask: u32) -> Option<Value<'a>> {
    if statx.mask & mask == 0 {
        return None;
    }
    Some(match mask {
        statx::TYPE => Value::String(statx.file_type()?.name()),
        statx::MODE => Value::UInt32(u32::from(statx.mode & !statx::S_IFMT)),
        statx::NLINK => Value::UInt32(statx.nlink),
        statx::UID => Value::UInt32(statx.uid),
        statx::GID => Value::UInt32(statx.gid),
        statx::INO => Value::UInt64(statx.ino),
        statx::SIZE => Value::UInt64(statx.size),
        statx::BLOCKS => Value::UInt64(statx.blocks),
        statx::BLKSIZE => Value::UInt32(statx.blksize),
        statx::ATTRIBUTES => Value::UInt64(statx.attributes),
        statx::MNT_ID => Value::UInt64(statx.mnt_id),
        statx::ATIME_SEC | statx::ATIME => Value::Int64(statx.atime.sec),
        statx::BTIME_SEC | statx::BTIME => Value::Int64(statx.btime.sec),
        statx::CTIME_SEC | statx::CTIME => Value::Int64(statx.ctime.sec),
        statx::MTIME_SEC | statx::MTIME => Value::Int64(statx.mtime.sec),
        statx::ATIME_NSEC => Value::UInt32(statx.atime.nsec),
        statx::BTIME_NSEC => Value::UInt32(statx.btime.nsec),
        statx::CTIME_NSEC => Value::UInt32(statx.ctime.nsec),
        statx::MTIME_NSEC => Value::UInt32(statx.mtime.nsec),
        statx::RDEV_MAJOR => Value::UInt32(statx.rdev_major),
        statx::RDEV_MINOR => Value::UInt32(statx.rdev_minor),
        statx::DEV_MAJOR => Value::UInt32(statx.dev_major),
        statx::DEV_MINOR => Value::UInt32(statx.dev_minor),
        _ => return None,
    })
}

fn as_i128(value: &Value<'_>) -> Option<i128> {
    Some(match *value {
        Value::Int32(i) => i128::from(i),
        Value::UInt32(u) => i128::from(u),
        Value::Int64(i) => i128::from(i),
        Value::UInt64(u) => i128::from(u),
        _ => return None,
    })
}

/// Compare a field value against a filter operand.
///
/// Integers compare across widths and signedness; otherwise mismatched
/// kinds never match.
pub fn compare_values(
    op: ComparisonOp,
    field_value: &Value<'_>,
    filter_value: &Value<'_>,
) -> Result<bool, Error> {
    match op {
        ComparisonOp::Equal => Ok(equals(field_value, filter_value)),
        ComparisonOp::LowerThan
        | ComparisonOp::LowerOrEqual
        | ComparisonOp::GreaterThan
        | ComparisonOp::GreaterOrEqual => {
            let ordering = match (as_i128(field_value), as_i128(filter_value)) {
                (Some(lhs), Some(rhs)) => lhs.cmp(&rhs),
                _ => match (field_value, filter_value) {
                    (Value::String(lhs), Value::String(rhs)) => lhs.cmp(rhs),
                    (Value::Binary(lhs), Value::Binary(rhs)) => lhs.cmp(rhs),
                    _ => return Ok(false),
                },
            };
            Ok(match op {
                ComparisonOp::LowerThan => ordering.is_lt(),
                ComparisonOp::LowerOrEqual => ordering.is_le(),
                ComparisonOp::GreaterThan => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
        ComparisonOp::In => {
            let Value::Sequence(candidates) = filter_value else {
                return Err(Error::invalid("in comparison with a non-sequence"));
            };
            Ok(candidates.iter().any(|c| equals(field_value, c)))
        }
        ComparisonOp::Regex => {
            let Value::Regex { pattern, options } = filter_value else {
                return Err(Error::invalid("regex comparison with a non-regex"));
            };
            let Value::String(haystack) = field_value else {
                return Ok(false);
            };
            Ok(compile_regex(pattern, *options)?.is_match(haystack))
        }
        ComparisonOp::Exists => Err(Error::invalid("exists comparison on a value")),
        ComparisonOp::BitsAnySet
        | ComparisonOp::BitsAllSet
        | ComparisonOp::BitsAnyClear
        | ComparisonOp::BitsAllClear => {
            let (Some(field), Some(bits)) = (as_i128(field_value), as_i128(filter_value)) else {
                return Ok(false);
            };
            let (field, bits) = (field as u64, bits as u64);
            Ok(match op {
                ComparisonOp::BitsAnySet => field & bits != 0,
                ComparisonOp::BitsAllSet => field & bits == bits,
                ComparisonOp::BitsAnyClear => field & bits != bits,
                _ => field & bits == 0,
            })
        }
    }
}

fn equals(lhs: &Value<'_>, rhs: &Value<'_>) -> bool {
    match (as_i128(lhs), as_i128(rhs)) {
        (Some(lhs), Some(rhs)) => lhs == rhs,
        _ => lhs == rhs,
    }
}

/// Compile a filter regex with the `regex` crate.
///
/// The `(?!\n)$` anchor produced by [`shell2pcre`] is a PCRE lookahead; this
/// engine's `$` already refuses a trailing newline, so the lookahead is
/// dropped before compiling.
fn compile_regex(pattern: &str, options: RegexOptions) -> Result<regex::Regex, Error> {
    let pattern = if options.contains(RegexOptions::SHELL_PATTERN) {
        shell2pcre(pattern)
    } else {
        pattern.to_owned()
    };
    let pattern = match pattern.strip_suffix("(?!\n)$") {
        Some(stripped) => format!("{stripped}$"),
        None => pattern,
    };

    regex::RegexBuilder::new(&pattern)
        .case_insensitive(options.contains(RegexOptions::CASE_INSENSITIVE))
        .build()
        .map_err(|error| Error::invalid(format!("bad regex '{pattern}': {error}")))
}
