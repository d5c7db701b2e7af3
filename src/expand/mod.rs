//! Nested-document construction from dotted field paths.
//!
//! Each flat column lands in the output document by walking its path
//! segment by segment. Every node is locked as a mapping, an array, or a
//! scalar the first time it is created and remembers the full field name
//! that created it, so a later structural collision can name both paths.

use bson::{Bson, Document};

use crate::errors::{ImportError, Result};

enum Node {
    Doc { created_by: String, entries: Vec<(String, Node)> },
    Arr { created_by: String, items: Vec<Node> },
    Val { created_by: String, value: Bson },
}

/// Builds one nested document from positional `(field, value)` pairs.
///
/// Created fresh per input row; the same walk, run once with placeholder
/// values, validates a field list up front.
pub struct DocumentBuilder {
    use_array_index_fields: bool,
    entries: Vec<(String, Node)>,
}

impl DocumentBuilder {
    #[must_use]
    pub fn new(use_array_index_fields: bool) -> Self {
        Self { use_array_index_fields, entries: Vec::new() }
    }

    /// Places `value` at the dotted path `parts`, reporting collisions
    /// against `field` (the full column name).
    ///
    /// # Errors
    /// `ArrayIndex` for non-sequential or re-used indexes,
    /// `IncompatibleFields` for mapping/array/scalar collisions, and
    /// `IdenticalFields` for an exact duplicate path.
    pub fn insert(&mut self, field: &str, parts: &[String], value: Bson) -> Result<()> {
        // The top level is always a mapping, so an integer first segment
        // is a plain key even in array-index mode.
        set_in_doc(None, &mut self.entries, field, parts, value, self.use_array_index_fields)
    }

    /// Consumes the builder, yielding the document with fields in
    /// first-appearance order.
    #[must_use]
    pub fn finish(self) -> Document {
        let mut doc = Document::new();
        for (key, node) in self.entries {
            doc.insert(key, node.into_bson());
        }
        doc
    }
}

impl Node {
    fn created_by(&self) -> &str {
        match self {
            Self::Doc { created_by, .. }
            | Self::Arr { created_by, .. }
            | Self::Val { created_by, .. } => created_by,
        }
    }

    fn into_bson(self) -> Bson {
        match self {
            Self::Doc { entries, .. } => {
                let mut doc = Document::new();
                for (key, node) in entries {
                    doc.insert(key, node.into_bson());
                }
                Bson::Document(doc)
            }
            Self::Arr { items, .. } => Bson::Array(items.into_iter().map(Node::into_bson).collect()),
            Self::Val { value, .. } => value,
        }
    }
}

/// A canonical non-negative integer: digits only, no sign, and no leading
/// zero unless the segment is exactly `0`.
fn array_index(segment: &str) -> Option<usize> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if segment.len() > 1 && segment.starts_with('0') {
        return None;
    }
    segment.parse().ok()
}

fn incompatible(first: &str, second: &str) -> ImportError {
    ImportError::IncompatibleFields { first: first.to_string(), second: second.to_string() }
}

fn set_in_doc(
    created_by: Option<&str>,
    entries: &mut Vec<(String, Node)>,
    field: &str,
    segs: &[String],
    value: Bson,
    use_idx: bool,
) -> Result<()> {
    let seg = &segs[0];
    if use_idx && array_index(seg).is_some()
        && let Some(owner) = created_by
    {
        return Err(incompatible(owner, field));
    }
    match entries.iter().position(|(key, _)| key == seg) {
        Some(i) => {
            let child = &mut entries[i].1;
            if segs.len() == 1 {
                return match child {
                    Node::Val { created_by, .. } => Err(ImportError::IdenticalFields {
                        first: created_by.clone(),
                        second: field.to_string(),
                    }),
                    other => Err(incompatible(other.created_by(), field)),
                };
            }
            set_in_child(child, field, &segs[1..], value, use_idx)
        }
        None => {
            let child = new_node(field, &segs[1..], value, use_idx)?;
            entries.push((seg.clone(), child));
            Ok(())
        }
    }
}

fn set_in_arr(
    created_by: &str,
    items: &mut Vec<Node>,
    field: &str,
    segs: &[String],
    value: Bson,
    use_idx: bool,
) -> Result<()> {
    let seg = &segs[0];
    let Some(idx) = array_index(seg) else {
        return Err(incompatible(created_by, field));
    };
    if idx > items.len() {
        return Err(ImportError::ArrayIndex { field: field.to_string() });
    }
    if idx == items.len() {
        let child = new_node(field, &segs[1..], value, use_idx)?;
        items.push(child);
        return Ok(());
    }
    if segs.len() == 1 {
        return match &items[idx] {
            Node::Val { .. } => Err(ImportError::ArrayIndex { field: field.to_string() }),
            other => Err(incompatible(other.created_by(), field)),
        };
    }
    set_in_child(&mut items[idx], field, &segs[1..], value, use_idx)
}

fn set_in_child(
    child: &mut Node,
    field: &str,
    segs: &[String],
    value: Bson,
    use_idx: bool,
) -> Result<()> {
    match child {
        Node::Doc { created_by, entries } => {
            let owner = created_by.clone();
            set_in_doc(Some(&owner), entries, field, segs, value, use_idx)
        }
        Node::Arr { created_by, items } => {
            let owner = created_by.clone();
            set_in_arr(&owner, items, field, segs, value, use_idx)
        }
        Node::Val { created_by, .. } => Err(incompatible(created_by, field)),
    }
}

fn new_node(field: &str, rest: &[String], value: Bson, use_idx: bool) -> Result<Node> {
    let Some(seg) = rest.first() else {
        return Ok(Node::Val { created_by: field.to_string(), value });
    };
    if use_idx && let Some(idx) = array_index(seg) {
        if idx != 0 {
            return Err(ImportError::ArrayIndex { field: field.to_string() });
        }
        let item = new_node(field, &rest[1..], value, use_idx)?;
        return Ok(Node::Arr { created_by: field.to_string(), items: vec![item] });
    }
    let child = new_node(field, &rest[1..], value, use_idx)?;
    Ok(Node::Doc { created_by: field.to_string(), entries: vec![(seg.clone(), child)] })
}
