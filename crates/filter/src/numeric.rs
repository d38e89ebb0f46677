// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

use fsentry::Value;

use crate::{ComparisonOp, Error, Filter, FilterField, OwnedFilter};

/// The size suffixes of the predicate language, with their byte multipliers.
pub const SIZE_UNITS: &[(char, u64)] = &[
    ('c', 1),
    ('w', 2),
    ('b', 512),
    ('k', 1 << 10),
    ('M', 1 << 20),
    ('G', 1 << 30),
    ('T', 1 << 40),
];

/// A parsed numeric predicate: `+N` means "strictly greater than N",
/// `-N` "strictly lower than N", a bare `N` means "equal to N".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericPredicate {
    pub op: ComparisonOp,
    pub value: u64,
    /// The byte multiplier of the unit suffix, 1 when there was none.
    pub unit: u64,
}

fn split_sign(string: &str) -> (ComparisonOp, &str) {
    match string.as_bytes().first() {
        Some(b'+') => (ComparisonOp::GreaterThan, &string[1..]),
        Some(b'-') => (ComparisonOp::LowerThan, &string[1..]),
        _ => (ComparisonOp::Equal, string),
    }
}

/// Parse `[+|-]N`.
pub fn parse_numeric(string: &str) -> Result<NumericPredicate, Error> {
    let (op, digits) = split_sign(string);
    let value = digits
        .parse::<u64>()
        .map_err(|_| Error::invalid(format!("'{string}' is not a number")))?;
    Ok(NumericPredicate { op, value, unit: 1 })
}

/// Parse `[+|-]N[unit]` where `unit` is one of [`SIZE_UNITS`].
pub fn parse_size(string: &str) -> Result<NumericPredicate, Error> {
    let (op, rest) = split_sign(string);

    let (digits, unit) = match rest.char_indices().last() {
        Some((index, suffix)) if !suffix.is_ascii_digit() => {
            let unit = SIZE_UNITS
                .iter()
                .find(|(c, _)| *c == suffix)
                .map(|(_, multiplier)| *multiplier)
                .ok_or_else(|| {
                    Error::invalid(format!("'{suffix}' is not a size unit in '{string}'"))
                })?;
            (&rest[..index], unit)
        }
        _ => (rest, 1),
    };

    let value = digits
        .parse::<u64>()
        .map_err(|_| Error::invalid(format!("'{string}' is not a size")))?;
    Ok(NumericPredicate { op, value, unit })
}

impl NumericPredicate {
    /// The predicate's threshold in base units.
    pub fn bytes(&self) -> u64 {
        self.value.saturating_mul(self.unit)
    }
}

/// Build a plain numeric comparison from a `[+|-]N` string.
pub fn numeric2filter(field: FilterField<'_>, string: &str) -> Result<OwnedFilter, Error> {
    let predicate = parse_numeric(string)?;
    OwnedFilter::build(|alloc| {
        Filter::compare(alloc, predicate.op, field, Value::UInt64(predicate.value))
    })
}

/// Build a size comparison from a `[+|-]N[unit]` string, with the rounding
/// semantics of `find(1)`: sizes count in whole units.
///
/// - `+N` matches sizes strictly above `N` units;
/// - `-N` matches sizes of at most `N - 1` units;
/// - a bare `N` matches sizes in the `N`-th unit, i.e. above `N - 1` units
///   and at most `N`.
pub fn size2filter(field: FilterField<'_>, string: &str) -> Result<OwnedFilter, Error> {
    let predicate = parse_size(string)?;
    let unit = predicate.unit;
    let count = predicate.value;

    OwnedFilter::build(|alloc| match predicate.op {
        ComparisonOp::GreaterThan => Filter::compare(
            alloc,
            ComparisonOp::GreaterThan,
            field,
            Value::UInt64(count.saturating_mul(unit)),
        ),
        ComparisonOp::LowerThan => Filter::compare(
            alloc,
            ComparisonOp::LowerOrEqual,
            field,
            Value::UInt64(count.saturating_sub(1).saturating_mul(unit)),
        ),
        _ => {
            let above = Filter::compare(
                alloc,
                ComparisonOp::GreaterThan,
                field,
                Value::UInt64(count.saturating_sub(1).saturating_mul(unit)),
            )?;
            let at_most = Filter::compare(
                alloc,
                ComparisonOp::LowerOrEqual,
                field,
                Value::UInt64(count.saturating_mul(unit)),
            )?;
            Filter::and(alloc, &[&above, &at_most])
        }
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn signs_select_the_operator() {
        assert_eq!(
            parse_numeric("+3").unwrap(),
            NumericPredicate {
                op: ComparisonOp::GreaterThan,
                value: 3,
                unit: 1,
            },
        );
        assert_eq!(parse_numeric("-2").unwrap().op, ComparisonOp::LowerThan);
        assert_eq!(parse_numeric("7").unwrap().op, ComparisonOp::Equal);
    }

    #[test]
    fn size_units_multiply() {
        assert_eq!(parse_size("10k").unwrap().bytes(), 10 << 10);
        assert_eq!(parse_size("+1G").unwrap().bytes(), 1 << 30);
        assert_eq!(parse_size("-3w").unwrap().bytes(), 6);
        assert_eq!(parse_size("512").unwrap().bytes(), 512);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_numeric("").is_err());
        assert!(parse_numeric("+").is_err());
        assert!(parse_numeric("12x").is_err());
        assert!(parse_size("10q").is_err());
        assert!(parse_size("k").is_err());
    }

    fn matches_size(filter: &OwnedFilter, size: u64) -> bool {
        use fsentry::{statx, Arena, Fsentry, Statx};

        let alloc = Arena::new();
        let entry = Fsentry::builder(&alloc)
            .statx(&Statx {
                mask: statx::SIZE,
                size,
                ..Default::default()
            })
            .build()
            .unwrap();
        crate::matches(Some(filter.get()), &entry).unwrap()
    }

    #[test]
    fn size_filters_count_in_whole_units() {
        let field = FilterField::statx(fsentry::statx::SIZE);

        // "2k": anything in the second kibibyte.
        let exact = size2filter(field, "2k").unwrap();
        assert!(!matches_size(&exact, 1024));
        assert!(matches_size(&exact, 1025));
        assert!(matches_size(&exact, 2048));
        assert!(!matches_size(&exact, 2049));

        // "+2k": strictly above two kibibytes.
        let above = size2filter(field, "+2k").unwrap();
        assert!(!matches_size(&above, 2048));
        assert!(matches_size(&above, 2049));

        // "-2k": at most one whole kibibyte.
        let below = size2filter(field, "-2k").unwrap();
        assert!(matches_size(&below, 1024));
        assert!(!matches_size(&below, 1025));
    }

    #[test]
    fn numeric_filters_compare_plainly() {
        let field = FilterField::statx(fsentry::statx::SIZE);
        let filter = numeric2filter(field, "+512").unwrap();
        assert!(filter.get().validate().is_ok());
        assert!(matches_size(&filter, 513));
        assert!(!matches_size(&filter, 512));
    }
}
