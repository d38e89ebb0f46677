// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

use fsentry::{RegexOptions, Value};

use crate::{ComparisonOp, Error, Filter, FilterField, OwnedFilter};

/// Build a regex comparison from a shell glob: the pattern is translated
/// through [`shell2pcre`] and stored already anchored, so backends can
/// hand it to their regex engine as-is.
pub fn shell_regex2filter(
    field: FilterField<'_>,
    pattern: &str,
    options: RegexOptions,
) -> Result<OwnedFilter, Error> {
    let translated = shell2pcre(pattern);
    // The pattern is no longer a shell glob once translated.
    let options = RegexOptions::from_bits(
        options.bits() & !RegexOptions::SHELL_PATTERN.bits(),
    )?;
    OwnedFilter::build(|alloc| {
        Filter::compare(
            alloc,
            ComparisonOp::Regex,
            field,
            Value::Regex {
                pattern: &translated,
                options,
            },
        )
    })
}

/// Translate a shell glob into an anchored PCRE pattern.
///
/// The rewrite is a single left-to-right pass with a one-character escape
/// state:
///
/// - `\c` keeps `c` literally; the backslash itself is dropped unless `c` is
///   a regex metacharacter.
/// - unescaped `*` becomes `.*`, unescaped `?` becomes `.`;
/// - `.`, `|`, `+`, `(`, `)`, `{` and `}` are backslash-escaped when not
///   already escaped;
/// - character classes `[...]` pass through, and reset the escape state;
/// - the output is anchored `^...(?!\n)$` so a trailing newline cannot
///   sneak past the `$`.
///
/// The translation is total: every input produces a pattern.
pub fn shell2pcre(shell: &str) -> String {
    let mut pcre = String::with_capacity(shell.len() + 8);
    let mut escaped = false;

    pcre.push('^');
    for c in shell.chars() {
        match c {
            '\\' => {
                if escaped {
                    // A literal backslash stays escaped.
                    pcre.push_str("\\\\");
                    escaped = false;
                } else {
                    escaped = true;
                }
                continue;
            }
            '*' if !escaped => pcre.push_str(".*"),
            '?' if !escaped => pcre.push('.'),
            // Escaped or not, these come out backslash-escaped.
            '*' | '?' | '.' | '|' | '+' | '(' | ')' | '{' | '}' => {
                pcre.push('\\');
                pcre.push(c);
            }
            '[' | ']' => {
                if escaped {
                    pcre.push('\\');
                }
                pcre.push(c);
            }
            _ => {
                // The escape was meaningless; drop it.
                pcre.push(c);
            }
        }
        escaped = false;
    }
    pcre.push_str("(?!\n)$");

    pcre
}

#[cfg(test)]
mod test {
    use super::shell2pcre;

    #[test]
    fn wildcards() {
        assert_eq!(shell2pcre("*"), "^.*(?!\n)$");
        assert_eq!(shell2pcre("a?b"), "^a.b(?!\n)$");
        assert_eq!(shell2pcre("*.c"), "^.*\\.c(?!\n)$");
    }

    #[test]
    fn metacharacters_are_escaped() {
        assert_eq!(shell2pcre("a.b"), "^a\\.b(?!\n)$");
        assert_eq!(shell2pcre("a+b"), "^a\\+b(?!\n)$");
        assert_eq!(shell2pcre("(a|b)"), "^\\(a\\|b\\)(?!\n)$");
        assert_eq!(shell2pcre("{a}"), "^\\{a\\}(?!\n)$");
    }

    #[test]
    fn escapes_are_honored() {
        assert_eq!(shell2pcre("\\*"), "^\\*(?!\n)$");
        assert_eq!(shell2pcre("\\?"), "^\\?(?!\n)$");
        // Escaping a plain character drops the meaningless backslash.
        assert_eq!(shell2pcre("\\a"), "^a(?!\n)$");
        // A literal backslash survives as an escaped backslash.
        assert_eq!(shell2pcre("\\\\a"), "^\\\\a(?!\n)$");
    }

    #[test]
    fn character_classes_pass_through() {
        assert_eq!(shell2pcre("[abc]"), "^[abc](?!\n)$");
        assert_eq!(shell2pcre("[a-z]*"), "^[a-z].*(?!\n)$");
    }

    #[test]
    fn translation_is_total() {
        for input in ["", "plain", "\\", "a\\", "[", "]", "[!a]"] {
            let pattern = shell2pcre(input);
            assert!(pattern.starts_with('^') && pattern.ends_with("(?!\n)$"));
        }
    }

    #[test]
    fn shell_regex_filters_translate_and_anchor() {
        use crate::{Filter, FilterField, FsentryField};
        use fsentry::{Arena, Fsentry, RegexOptions, Value};

        let field = FilterField::fsentry(FsentryField::Name);
        let filter = super::shell_regex2filter(field, "*.c", RegexOptions::SHELL_PATTERN).unwrap();

        let Filter::Comparison(comparison) = filter.get() else {
            panic!("expected a comparison");
        };
        assert_eq!(
            comparison.value,
            Value::Regex {
                pattern: "^.*\\.c(?!\n)$",
                options: RegexOptions::NONE,
            },
        );

        let alloc = Arena::new();
        let entry = Fsentry::builder(&alloc).name("main.c").build().unwrap();
        assert!(crate::matches(Some(filter.get()), &entry).unwrap());
        let entry = Fsentry::builder(&alloc).name("main.c.bak").build().unwrap();
        assert!(!crate::matches(Some(filter.get()), &entry).unwrap());
    }
}
