//! Companion resource URI resolution.
//!
//! glTF buffers and images reference their files relative to the container.
//! [`resolve_relative`] turns such a reference into a URI the asset reader
//! can open:
//!
//! - URL parents (`https://`, `file://`, ...) are resolved with standard URL
//!   joining, which also normalizes `.` and `..` segments.
//! - Path parents are joined on `/`, the reference is percent-decoded and the
//!   result is normalized segment by segment.

use std::borrow::Cow;

use crate::errors::{Error, Result};

/// Returns `true` for URIs that carry their payload inline.
#[inline]
#[must_use]
pub fn is_data_uri(uri: &str) -> bool {
    uri.starts_with("data:")
}

/// Parses `s` as an absolute URL, rejecting Windows drive letters.
fn parse_url(s: &str) -> Option<url::Url> {
    let url = url::Url::parse(s).ok()?;
    (url.scheme().len() > 1).then_some(url)
}

/// Resolves `reference` against the location of the asset at `parent`.
pub fn resolve_relative(parent: &str, reference: &str) -> Result<String> {
    if reference.is_empty() {
        return Err(Error::UnresolvedResource {
            uri: reference.to_owned(),
            reason: "empty reference".to_owned(),
        });
    }
    if is_data_uri(reference) || parse_url(reference).is_some() {
        return Ok(reference.to_owned());
    }

    if let Some(base) = parse_url(parent) {
        return base
            .join(reference)
            .map(String::from)
            .map_err(|e| Error::UnresolvedResource {
                uri: reference.to_owned(),
                reason: e.to_string(),
            });
    }

    let decoded: Cow<'_, str> =
        urlencoding::decode(reference).map_err(|e| Error::UnresolvedResource {
            uri: reference.to_owned(),
            reason: format!("invalid percent-encoding: {e}"),
        })?;

    let joined = if decoded.starts_with('/') {
        decoded.into_owned()
    } else {
        match parent.rfind('/') {
            Some(slash) => format!("{}{}", &parent[..=slash], decoded),
            None => decoded.into_owned(),
        }
    };
    Ok(normalize_path(&joined))
}

/// Collapses `.` and `..` segments and repeated separators.
///
/// Leading `..` segments of a relative path are kept; `..` above the root
/// of an absolute path is dropped.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if absolute => {}
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }

    let body = segments.join("/");
    if absolute { format!("/{body}") } else { body }
}
