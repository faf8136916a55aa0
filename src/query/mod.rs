//! Query parameter parsing.
//!
//! Turns raw `key=value` query parameters into the typed structures the
//! engine consumes: a sparse-fieldset map ([`FieldSelection`]), an
//! include-path tree ([`IncludeTree`]), sort keys ([`SortKey`]), and a
//! pagination window ([`PageWindow`]).
//!
//! Parsing is deliberately type-agnostic: unknown relationship names in
//! `include` are not resolved here — relationship existence is
//! type-specific, so the renderer raises lazily once the root instance's
//! type is known. Sort keys are likewise validated against a type in
//! `get_collection`.
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use jsonapi_engine::query::QueryParams;
//!
//! let mut raw = HashMap::new();
//! raw.insert("fields[posts]".to_string(), "title,author".to_string());
//! raw.insert("include".to_string(), "author,comments.author".to_string());
//! raw.insert("sort".to_string(), "-created,title".to_string());
//!
//! let params = QueryParams::parse(&raw).unwrap();
//! assert!(params.include.contains("comments"));
//! assert_eq!(params.sort.len(), 2);
//! assert!(!params.sort[0].ascending);
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::ApiError;

/// Sparse-fieldset map: type name to the set of field names permitted in
/// that type's output. No entry for a type means "no restriction".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelection {
    by_type: HashMap<String, BTreeSet<String>>,
}

impl FieldSelection {
    /// A selection with no restrictions.
    #[must_use]
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// The requested field set for a type, or `None` when unrestricted.
    #[must_use]
    pub fn for_type(&self, type_name: &str) -> Option<&BTreeSet<String>> {
        self.by_type.get(type_name)
    }

    /// Whether a field survives the selection for its type.
    #[must_use]
    pub fn allows(&self, type_name: &str, field: &str) -> bool {
        self.for_type(type_name).map_or(true, |set| set.contains(field))
    }

    fn parse(raw: &HashMap<String, String>) -> Self {
        let mut by_type = HashMap::new();
        for (key, value) in raw {
            if let Some(type_name) = key
                .strip_prefix("fields[")
                .and_then(|rest| rest.strip_suffix(']'))
            {
                let fields: BTreeSet<String> = value
                    .split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(ToString::to_string)
                    .collect();
                by_type.insert(type_name.to_string(), fields);
            }
        }
        Self { by_type }
    }
}

/// Include-path tree, keyed by relationship name.
///
/// A node present with an empty child set means "include this
/// relationship's targets but nothing beyond"; absence means "do not
/// include". Built fresh per request from dot-separated `include` paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncludeTree {
    children: BTreeMap<String, IncludeTree>,
}

impl IncludeTree {
    /// An empty tree: include nothing.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Parses a comma-separated list of dot-separated paths.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let mut tree = Self::none();
        for path in raw.split(',') {
            let path = path.trim();
            if !path.is_empty() {
                tree.insert_path(path);
            }
        }
        tree
    }

    fn insert_path(&mut self, path: &str) {
        // Split on the first dot; the remainder recurses into the child.
        let (local, remote) = match path.split_once('.') {
            Some((local, remote)) => (local, Some(remote)),
            None => (path, None),
        };
        let child = self.children.entry(local.to_string()).or_default();
        if let Some(remote) = remote {
            child.insert_path(remote);
        }
    }

    /// Whether any include was requested at this level.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Whether the relationship is included at this level.
    #[must_use]
    pub fn contains(&self, relationship: &str) -> bool {
        self.children.contains_key(relationship)
    }

    /// The subtree below a relationship, if included.
    #[must_use]
    pub fn child(&self, relationship: &str) -> Option<&IncludeTree> {
        self.children.get(relationship)
    }

    /// Iterates the relationship names requested at this level.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(String::as_str)
    }
}

/// One sort criterion. A leading `-` in the raw parameter flips
/// `ascending`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// The attribute to sort by.
    pub field: String,
    /// Sort direction.
    pub ascending: bool,
}

fn parse_sort(raw: &str) -> Vec<SortKey> {
    raw.split(',')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            segment.strip_prefix('-').map_or_else(
                || SortKey {
                    field: segment.to_string(),
                    ascending: true,
                },
                |field| SortKey {
                    field: field.to_string(),
                    ascending: false,
                },
            )
        })
        .collect()
}

/// Pagination window with an inclusive end position.
///
/// The positions count VIEW-passing collection members. `end = None`
/// means "no cap".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    /// First position included.
    pub start: i64,
    /// Last position included, or `None` for unbounded.
    pub end: Option<i64>,
}

impl PageWindow {
    /// The unbounded window `(0, None)`.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            start: 0,
            end: None,
        }
    }

    /// Whether a zero-based position falls inside the window.
    #[must_use]
    pub fn contains(&self, position: i64) -> bool {
        position >= self.start && self.end.map_or(true, |end| position <= end)
    }

    fn parse(raw: &HashMap<String, String>) -> Result<Self, ApiError> {
        let args: BTreeMap<&str, &str> = raw
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix("page[")
                    .and_then(|rest| rest.strip_suffix(']'))
                    .map(|name| (name, value.as_str()))
            })
            .collect();

        let int = |name: &str| -> Result<i64, ApiError> {
            args[name].parse().map_err(|_| ApiError::BadRequest {
                detail: "Page query parameters must be integers".to_string(),
            })
        };

        let keys: BTreeSet<&str> = args.keys().copied().collect();
        if keys.is_empty() {
            return Ok(Self::unbounded());
        }
        if keys == BTreeSet::from(["number", "size"]) {
            let number = int("number")?;
            let size = int("size")?;
            let start = number * size;
            return Ok(Self {
                start,
                end: Some(start + size - 1),
            });
        }
        if keys == BTreeSet::from(["limit", "offset"]) {
            let offset = int("offset")?;
            let limit = int("limit")?;
            return Ok(Self {
                start: offset,
                end: Some(offset + limit - 1),
            });
        }
        Err(ApiError::BadRequest {
            detail: "Page parameters must be exactly number/size or offset/limit".to_string(),
        })
    }
}

/// All parsed query parameters for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParams {
    /// Sparse fieldsets (`fields[<type>]`).
    pub fields: FieldSelection,
    /// Include tree (`include`).
    pub include: IncludeTree,
    /// Sort keys (`sort`).
    pub sort: Vec<SortKey>,
    /// Pagination window (`page[...]`).
    pub page: PageWindow,
}

impl QueryParams {
    /// Parameters of a request with no query string.
    #[must_use]
    pub fn none() -> Self {
        Self {
            fields: FieldSelection::unrestricted(),
            include: IncludeTree::none(),
            sort: Vec::new(),
            page: PageWindow::unbounded(),
        }
    }

    /// Parses raw query parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::BadRequest`] for malformed pagination
    /// parameters. Field and include names are not validated here.
    pub fn parse(raw: &HashMap<String, String>) -> Result<Self, ApiError> {
        Ok(Self {
            fields: FieldSelection::parse(raw),
            include: raw
                .get("include")
                .map_or_else(IncludeTree::none, |v| IncludeTree::parse(v)),
            sort: raw.get("sort").map_or_else(Vec::new, |v| parse_sort(v)),
            page: PageWindow::parse(raw)?,
        })
    }
}
