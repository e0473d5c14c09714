//! Listing engine: marker pagination and delimiter grouping.
//!
//! Blob listings paginate on a name (plus snapshot) marker over the flat,
//! sorted scan; the delimiter split into virtual directories happens
//! afterwards on the page.
//! Container listings use a numeric offset marker instead.

use std::collections::HashSet;

use chrono::DateTime;

use crate::error::{ErrorCode, StorageError, StorageResult};

/// Default page size for blob listings.
pub const DEFAULT_BLOB_PAGE_SIZE: usize = 5000;
/// Default page size for container listings.
pub const DEFAULT_CONTAINER_PAGE_SIZE: usize = 2000;

/// Delimiter used when the client sends `delimiter=` with no value.
pub const DEFAULT_DELIMITER: &str = "/";

/// One page of a listing scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Resume point for the next request; `None` on the last page.
    pub next_marker: Option<String>,
}

/// Parses `maxresults`, falling back to (and clamping at) `default`.
pub fn resolve_max_results(raw: Option<&str>, default: usize) -> StorageResult<usize> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().parse::<usize>() {
        Ok(0) | Err(_) => Err(StorageError::with_message(
            ErrorCode::InvalidQueryParameterValue,
            format!(
                "Value for one of the query parameters specified in the request URI is invalid. \
                 QueryParameterName: maxresults, QueryParameterValue: {}",
                raw
            ),
        )),
        Ok(n) => Ok(n.min(default)),
    }
}

/// Parses a container-listing marker: a numeric offset, `0` when absent.
pub fn parse_offset_marker(raw: Option<&str>) -> StorageResult<usize> {
    match raw.map(str::trim) {
        None | Some("") => Ok(0),
        Some(value) => value.parse::<usize>().map_err(|_| {
            StorageError::with_message(
                ErrorCode::InvalidQueryParameterValue,
                format!(
                    "Value for one of the query parameters specified in the request URI is invalid. \
                     QueryParameterName: marker, QueryParameterValue: {}",
                    value
                ),
            )
        }),
    }
}

/// Resolves the `delimiter` query parameter.
///
/// Absent means a flat listing; present but empty means `/`.
pub fn effective_delimiter(raw: Option<&str>) -> Option<String> {
    raw.map(|d| {
        if d.is_empty() {
            DEFAULT_DELIMITER.to_string()
        } else {
            d.to_string()
        }
    })
}

/// Joins a blob name and snapshot id the way a resume marker carries them.
const SNAPSHOT_MARKER_SEPARATOR: &str = "?snapshot=";

/// Builds the resume marker for a listing entry.
///
/// Base blobs resume on their plain name. Snapshots append their id so a
/// page that ends inside one blob's snapshots resumes at the exact entry.
pub fn encode_blob_marker(name: &str, snapshot: &str) -> String {
    if snapshot.is_empty() {
        name.to_string()
    } else {
        format!("{}{}{}", name, SNAPSHOT_MARKER_SEPARATOR, snapshot)
    }
}

/// Splits a resume marker into `(name, snapshot)`.
///
/// Only a trailing, well-formed snapshot id is split off; anything else is
/// a plain blob name.
pub fn decode_blob_marker(marker: &str) -> (&str, &str) {
    match marker.rsplit_once(SNAPSHOT_MARKER_SEPARATOR) {
        Some((name, snapshot)) if DateTime::parse_from_rfc3339(snapshot).is_ok() => {
            (name, snapshot)
        }
        _ => (marker, ""),
    }
}

/// Pages through `items`, which must already be sorted by `(name, snapshot)`.
///
/// The page starts at the first item whose key is at or after `marker`.
/// When items remain past `max_results`, `next_marker` names the first one
/// left out (see [`encode_blob_marker`]).
pub fn paginate_by_key<T, F>(
    items: Vec<T>,
    key: F,
    marker: Option<&str>,
    max_results: usize,
) -> Page<T>
where
    F: Fn(&T) -> (&str, &str),
{
    let start = decode_blob_marker(marker.unwrap_or(""));
    let mut remaining = items.into_iter().skip_while(|item| key(item) < start);

    let items: Vec<T> = remaining.by_ref().take(max_results).collect();
    let next_marker = remaining.next().map(|item| {
        let (name, snapshot) = key(&item);
        encode_blob_marker(name, snapshot)
    });

    Page { items, next_marker }
}

/// Pages through `items` starting at a numeric offset.
pub fn paginate_by_offset<T>(items: Vec<T>, offset: usize, max_results: usize) -> Page<T> {
    let total = items.len();
    let items: Vec<T> = items.into_iter().skip(offset).take(max_results).collect();
    let end = offset.saturating_add(items.len());

    Page {
        items,
        next_marker: (end < total).then(|| end.to_string()),
    }
}

/// Splits a page into real items and virtual-directory prefixes.
///
/// For each item, the part of its name after `prefix` is cut at the first
/// `delimiter`. Items with no delimiter there stay as items; the others
/// collapse into `prefix + segment + delimiter`, each emitted once in
/// first-seen order.
pub fn group_by_delimiter<T, F>(
    items: Vec<T>,
    name: F,
    prefix: &str,
    delimiter: &str,
) -> (Vec<T>, Vec<String>)
where
    F: Fn(&T) -> &str,
{
    let mut seen = HashSet::new();
    let mut prefixes = Vec::new();
    let mut kept = Vec::with_capacity(items.len());

    for item in items {
        let full = name(&item);
        let rest = full.strip_prefix(prefix).unwrap_or(full);
        match rest.find(delimiter) {
            Some(idx) if !delimiter.is_empty() => {
                let virtual_prefix = format!("{}{}{}", prefix, &rest[..idx], delimiter);
                if seen.insert(virtual_prefix.clone()) {
                    prefixes.push(virtual_prefix);
                }
            }
            _ => kept.push(item),
        }
    }

    (kept, prefixes)
}
