// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

//! RobinHood URIs: `rbh:<backend>:<fsname>[#<fragment>]`.
//!
//! The fragment scopes the backend to part of the namespace: a
//! percent-encoded path, or an entry ID between square brackets. A
//! bracketed fragment holding two colons is a Lustre FID
//! (`[0x<seq>:0x<oid>:0x<ver>]`); any other bracketed fragment is the
//! percent-encoded raw bytes of an ID.

use std::fmt;
use std::str::FromStr;

use fsentry::{Id, LuFid};
use percent_encoding::{percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::Error;

pub const SCHEME: &str = "rbh";

/// Bytes percent-encoded inside a component (backend name, fsname).
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'.')
    .remove(b'-')
    .remove(b'_')
    .remove(b'~');

/// Bytes percent-encoded inside a path fragment; slashes stay readable.
const PATH: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'.')
    .remove(b'-')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

/// A URI split into its generic components, before any percent-decoding.
///
/// The split follows the generic syntax
/// `scheme:[//authority]path[?query][#fragment]` where the authority is
/// `[userinfo@]host[:port]`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawUri<'a> {
    pub scheme: &'a str,
    pub userinfo: Option<&'a str>,
    pub host: Option<&'a str>,
    pub port: Option<&'a str>,
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub fragment: Option<&'a str>,
}

impl<'a> RawUri<'a> {
    pub fn parse(string: &'a str) -> Result<RawUri<'a>, Error> {
        let mut raw = RawUri::default();

        let scheme_end = string
            .char_indices()
            .take_while(|(index, c)| {
                if *index == 0 {
                    c.is_ascii_alphabetic()
                } else {
                    c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')
                }
            })
            .count();
        if scheme_end == 0 || string[scheme_end..].chars().next() != Some(':') {
            return Err(Error::invalid(format!("'{string}' is not a URI")));
        }
        raw.scheme = &string[..scheme_end];
        let mut rest = &string[scheme_end + 1..];

        if let Some(pound) = rest.rfind('#') {
            raw.fragment = Some(&rest[pound + 1..]);
            rest = &rest[..pound];
        }
        if let Some(qmark) = rest.rfind('?') {
            raw.query = Some(&rest[qmark + 1..]);
            rest = &rest[..qmark];
        }

        let Some(authority) = rest.strip_prefix("//") else {
            raw.path = rest;
            return Ok(raw);
        };

        // The path is either empty or starts at the first '/'.
        let (mut authority, path) = match authority.find('/') {
            Some(slash) => (&authority[..slash], &authority[slash..]),
            None => (authority, ""),
        };
        raw.path = path;

        if let Some(at) = authority.find('@') {
            raw.userinfo = Some(&authority[..at]);
            authority = &authority[at + 1..];
        }
        match authority.rfind(':') {
            Some(colon) => {
                raw.host = Some(&authority[..colon]);
                raw.port = Some(&authority[colon + 1..]);
            }
            None => raw.host = Some(authority),
        }

        Ok(raw)
    }
}

/// Is `string` syntactically a URI at all?
pub fn is_uri(string: &str) -> bool {
    RawUri::parse(string).is_ok()
}

/// Strictly decode a percent-encoded string into bytes: every `%` must be
/// followed by two hexadecimal digits.
fn percent_decode(encoded: &str) -> Result<Vec<u8>, Error> {
    let mut decoded = Vec::with_capacity(encoded.len());
    let mut bytes = encoded.bytes();

    while let Some(byte) = bytes.next() {
        if byte != b'%' {
            decoded.push(byte);
            continue;
        }
        let (major, minor) = (bytes.next(), bytes.next());
        let digits = major
            .zip(minor)
            .and_then(|(hi, lo)| Some(((hi as char).to_digit(16)?, (lo as char).to_digit(16)?)));
        match digits {
            Some((hi, lo)) => decoded.push((hi << 4 | lo) as u8),
            None => {
                return Err(Error::invalid(format!(
                    "ill-formed percent encoding in '{encoded}'",
                )))
            }
        }
    }
    Ok(decoded)
}

fn percent_decode_utf8(encoded: &str) -> Result<String, Error> {
    String::from_utf8(percent_decode(encoded)?)
        .map_err(|_| Error::invalid(format!("'{encoded}' does not decode to text")))
}

/// What part of the namespace a URI selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UriSelector {
    /// The whole backend.
    Bare,
    /// The subtree at this path.
    Path(String),
    /// The subtree at this entry.
    Id(Id),
}

/// A parsed RobinHood URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri {
    pub backend: String,
    pub fsname: String,
    pub selector: UriSelector,
}

impl Uri {
    fn parse_fragment(fragment: &str) -> Result<UriSelector, Error> {
        let Some(inner) = fragment
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
        else {
            return Ok(UriSelector::Path(percent_decode_utf8(fragment)?));
        };

        // Two colons in the (still encoded) bracket make it a FID.
        if inner.matches(':').count() == 2 {
            let decoded = percent_decode_utf8(inner)?;
            let fid = LuFid::from_str(&decoded).map_err(|error| Error::invalid(format!(
                "bad fid fragment '{inner}': {error}",
            )))?;
            return Ok(UriSelector::Id(Id::from_lu_fid(&fid)));
        }
        Ok(UriSelector::Id(Id::from_bytes(&percent_decode(inner)?)?))
    }
}

impl FromStr for Uri {
    type Err = Error;

    fn from_str(string: &str) -> Result<Uri, Error> {
        let raw = RawUri::parse(string)?;
        if raw.scheme != SCHEME {
            return Err(Error::invalid(format!(
                "unexpected scheme '{}' in '{string}'",
                raw.scheme,
            )));
        }

        let Some((backend, fsname)) = raw.path.split_once(':') else {
            return Err(Error::invalid(format!("missing ':' in '{}'", raw.path)));
        };
        if fsname.is_empty() {
            return Err(Error::invalid(format!("empty fsname in '{string}'")));
        }

        let selector = match raw.fragment {
            None => UriSelector::Bare,
            Some(fragment) => Uri::parse_fragment(fragment)?,
        };

        Ok(Uri {
            backend: percent_decode_utf8(backend)?,
            fsname: percent_decode_utf8(fsname)?,
            selector,
        })
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{SCHEME}:{}:{}",
            percent_encode(self.backend.as_bytes(), COMPONENT),
            percent_encode(self.fsname.as_bytes(), COMPONENT),
        )?;
        match &self.selector {
            UriSelector::Bare => Ok(()),
            UriSelector::Path(path) => {
                write!(f, "#{}", percent_encode(path.as_bytes(), PATH))
            }
            UriSelector::Id(id) => {
                write!(f, "#[{}]", percent_encode(id.as_bytes(), NON_ALPHANUMERIC))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bare_uri() {
        let uri: Uri = "rbh:mongo:test".parse().unwrap();
        assert_eq!(uri.backend, "mongo");
        assert_eq!(uri.fsname, "test");
        assert_eq!(uri.selector, UriSelector::Bare);
    }

    #[test]
    fn path_fragment() {
        let uri: Uri = "rbh:mongo:test#/a/b".parse().unwrap();
        assert_eq!(uri.selector, UriSelector::Path("/a/b".to_owned()));

        let uri: Uri = "rbh:mongo:test#dir%20with%20spaces".parse().unwrap();
        assert_eq!(
            uri.selector,
            UriSelector::Path("dir with spaces".to_owned()),
        );
    }

    #[test]
    fn fid_fragment() {
        let uri: Uri = "rbh:lustre:lfs#[0x200000401:0x1:0x0]".parse().unwrap();
        let UriSelector::Id(id) = &uri.selector else {
            panic!("expected an id selector");
        };
        assert_eq!(id.len(), 16);
        assert_eq!(id.as_lu_fid(), Some(LuFid::new(0x200000401, 0x1, 0x0)));
    }

    #[test]
    fn raw_id_fragment() {
        let uri: Uri = "rbh:mongo:test#[%00%01abc]".parse().unwrap();
        assert_eq!(
            uri.selector,
            UriSelector::Id(Id::from_bytes(b"\x00\x01abc").unwrap()),
        );
    }

    #[test]
    fn rejected_uris() {
        for bad in [
            "mongo:test",             // not an rbh scheme
            "rbh:mongotest",          // missing the backend/fsname colon
            "rbh:mongo:",             // empty fsname
            "0rbh:mongo:test",        // scheme must start with a letter
            "rbh:mongo:test#%zz",     // ill-formed percent encoding
            "rbh:lustre:lfs#[0xg:0x1:0x0]", // bad fid digits
        ] {
            assert!(bad.parse::<Uri>().is_err(), "'{bad}' should not parse");
        }
    }

    #[test]
    fn raw_uris_split_authorities() {
        let raw = RawUri::parse("http://user:pw@host:8080/path?q=1#frag").unwrap();
        assert_eq!(raw.scheme, "http");
        assert_eq!(raw.userinfo, Some("user:pw"));
        assert_eq!(raw.host, Some("host"));
        assert_eq!(raw.port, Some("8080"));
        assert_eq!(raw.path, "/path");
        assert_eq!(raw.query, Some("q=1"));
        assert_eq!(raw.fragment, Some("frag"));
    }

    #[test]
    fn unparse_then_parse_is_identity() {
        for uri in [
            "rbh:mongo:test",
            "rbh:mongo:test#/a/b",
            "rbh:mongo:test#[%00%01abc]",
            "rbh:lustre:lfs#[0x200000401:0x1:0x0]",
            "rbh:mongo:fs%20name#dir%20a/b",
        ] {
            let parsed: Uri = uri.parse().unwrap();
            let reparsed: Uri = parsed.to_string().parse().unwrap();
            assert_eq!(parsed, reparsed, "'{uri}' did not round-trip");
        }
    }

    #[test]
    fn is_uri_checks_syntax_only() {
        assert!(is_uri("rbh:mongo:test"));
        assert!(is_uri("https://example.com"));
        assert!(!is_uri("/plain/path"));
        assert!(!is_uri(""));
    }
}
