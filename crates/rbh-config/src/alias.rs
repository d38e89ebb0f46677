// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

use iters::Stack;

use crate::{Config, Error};

const HISTORY_SIZE: usize = 1 << 10;

/// Expand every `--alias <names>` occurrence in `args` using the `alias`
/// section of the configuration.
///
/// `<names>` is a comma-separated list of alias names. Each alias expands to
/// its configured string split on ASCII whitespace; no shell quoting is
/// interpreted, so a quoted value expands to several arguments. Expansions
/// may reference further aliases; a cycle is detected by alias name and
/// reported as [`Error::AliasLoop`].
pub fn apply_aliases(config: &Config, args: &[String]) -> Result<Vec<String>, Error> {
    let aliases = match config.find("alias") {
        None => None,
        Some(serde_yaml::Value::Mapping(aliases)) => Some(aliases),
        Some(_) => {
            return Err(Error::Invalid(
                "the 'alias' configuration section is not a mapping".to_owned(),
            ))
        }
    };

    let mut history = Stack::new(HISTORY_SIZE);
    let mut expanded = Vec::with_capacity(args.len());
    let mut input = args.iter();

    while let Some(arg) = input.next() {
        if arg != "--alias" {
            expanded.push(arg.clone());
            continue;
        }
        let names = input
            .next()
            .ok_or_else(|| Error::Invalid("'--alias' without an alias name".to_owned()))?;
        let aliases =
            aliases.ok_or_else(|| Error::UnknownAlias(names.clone()))?;
        for name in names.split(',') {
            expand(aliases, name, &mut history, &mut expanded)?;
        }
    }

    Ok(expanded)
}

fn lookup<'c>(
    aliases: &'c serde_yaml::Mapping,
    name: &str,
) -> Result<&'c str, Error> {
    match aliases.get(name) {
        Some(serde_yaml::Value::String(value)) => Ok(value),
        Some(_) => Err(Error::Invalid(format!("alias '{name}' is not a string"))),
        None => Err(Error::UnknownAlias(name.to_owned())),
    }
}

fn in_history(history: &Stack, name: &str) -> bool {
    // The history holds NUL-terminated names, most recent first.
    history
        .peek()
        .split(|byte| *byte == 0)
        .any(|prior| prior == name.as_bytes())
}

fn expand(
    aliases: &serde_yaml::Mapping,
    name: &str,
    history: &mut Stack,
    out: &mut Vec<String>,
) -> Result<(), Error> {
    if in_history(history, name) {
        return Err(Error::AliasLoop(name.to_owned()));
    }
    let value = lookup(aliases, name)?;

    let too_deep = |_| Error::Invalid(format!("alias expansion of '{name}' is too deep"));
    history.push(name.as_bytes()).map_err(too_deep)?;
    history.push(&[0]).map_err(too_deep)?;

    let mut tokens = value.split_ascii_whitespace();
    while let Some(token) = tokens.next() {
        if token != "--alias" {
            out.push(token.to_owned());
            continue;
        }
        let nested = tokens
            .next()
            .ok_or_else(|| Error::Invalid(format!("'--alias' without a name in '{name}'")))?;
        for nested_name in nested.split(',') {
            expand(aliases, nested_name, history, out)?;
        }
    }

    // Unwrap because we popped exactly what was pushed above.
    history.pop(name.len() + 1).unwrap();
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn plain_arguments_pass_through() {
        let config = Config::from_str("alias:\n  a: \"-size +1G\"\n").unwrap();
        let out = apply_aliases(&config, &args(&["rbh-find", "rbh:mongo:test"])).unwrap();
        assert_eq!(out, args(&["rbh-find", "rbh:mongo:test"]));
    }

    #[test]
    fn aliases_expand_and_split_on_whitespace() {
        let config = Config::from_str("alias:\n  big: \"-size +1G -type file\"\n").unwrap();
        let out = apply_aliases(&config, &args(&["rbh-find", "--alias", "big"])).unwrap();
        assert_eq!(out, args(&["rbh-find", "-size", "+1G", "-type", "file"]));
    }

    #[test]
    fn comma_separated_names_expand_in_order() {
        let config =
            Config::from_str("alias:\n  a: \"-size +1G\"\n  b: \"-type file\"\n").unwrap();
        let out = apply_aliases(&config, &args(&["x", "--alias", "a,b"])).unwrap();
        assert_eq!(out, args(&["x", "-size", "+1G", "-type", "file"]));
    }

    #[test]
    fn aliases_nest() {
        let config =
            Config::from_str("alias:\n  outer: \"--alias inner -print\"\n  inner: \"-type file\"\n")
                .unwrap();
        let out = apply_aliases(&config, &args(&["x", "--alias", "outer"])).unwrap();
        assert_eq!(out, args(&["x", "-type", "file", "-print"]));
    }

    #[test]
    fn cycles_are_detected_by_name() {
        let config =
            Config::from_str("alias:\n  a: \"--alias b\"\n  b: \"--alias a\"\n").unwrap();
        let error = apply_aliases(&config, &args(&["x", "--alias", "a"])).unwrap_err();
        assert!(matches!(error, Error::AliasLoop(name) if name == "a"));
    }

    #[test]
    fn the_same_alias_may_be_used_twice_sequentially() {
        let config = Config::from_str("alias:\n  a: \"-print\"\n").unwrap();
        let out = apply_aliases(&config, &args(&["x", "--alias", "a,a"])).unwrap();
        assert_eq!(out, args(&["x", "-print", "-print"]));
    }

    #[test]
    fn unknown_aliases_are_reported() {
        let config = Config::from_str("alias:\n  a: \"-print\"\n").unwrap();
        let error = apply_aliases(&config, &args(&["x", "--alias", "nope"])).unwrap_err();
        assert!(matches!(error, Error::UnknownAlias(name) if name == "nope"));
    }
}
