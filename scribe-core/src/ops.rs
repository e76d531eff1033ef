//! Pure mutations producing a new revision of a document
//!
//! Every operation takes the current tree by reference and returns a fresh
//! tree. On error nothing is produced and the caller keeps the old revision.

use std::ops::Range;

use crate::doc::{DocumentTree, Path};
use crate::error::{EngineError, Result};
use crate::schema::Schema;
use crate::selection::{Point, Selection};

/// Insert `text` at `cursor`, returning the new tree and the cursor moved
/// past the inserted text
///
/// The inserted run carries the marks active at the cursor.
pub fn insert_text(
    tree: &DocumentTree,
    cursor: &Point,
    text: &str,
    schema: &Schema,
) -> Result<(DocumentTree, Point)> {
    if tree.is_empty() {
        return Ok((tree.clone(), cursor.clone()));
    }

    let target = tree.resolve(cursor)?;
    for block in tree.ancestors(&cursor.path) {
        schema.require_editable(&block.kind)?;
    }
    if text.is_empty() {
        return Ok((tree.clone(), cursor.clone()));
    }

    let updated = target.insert(cursor.offset, text, target.marks_at(cursor.offset));
    let mut next = tree.clone();
    *text_slot(&mut next, &cursor.path)? = updated;

    let moved = Point::new(cursor.path.clone(), cursor.offset + text.chars().count());
    Ok((next, moved))
}

/// Toggle `mark` over the selected characters
///
/// The mark is removed only if every selected leaf already carries it;
/// otherwise it is added to all of them.
pub fn toggle_mark(
    tree: &DocumentTree,
    selection: &Selection,
    mark: &str,
    schema: &Schema,
) -> Result<DocumentTree> {
    schema.require_mark(mark)?;
    if tree.is_empty() || selection.is_collapsed() {
        return Ok(tree.clone());
    }

    let spans = selected_spans(tree, selection)?;
    let mut all_marked = true;
    for (path, range) in &spans {
        for block in tree.ancestors(path) {
            schema.require_editable(&block.kind)?;
        }
        let text = tree.text_at(path)?;
        if !text
            .leaves_in(range.clone())
            .iter()
            .all(|leaf| leaf.marks.contains(mark))
        {
            all_marked = false;
        }
    }

    let mut next = tree.clone();
    for (path, range) in spans {
        let slot = text_slot(&mut next, &path)?;
        *slot = slot.update_marks(range, |marks| {
            if all_marked {
                marks.remove(mark);
            } else {
                marks.insert(mark.to_string());
            }
        });
    }
    Ok(next)
}

/// Switch the kind of every top-level block touched by the selection
///
/// When all of them already have `kind` they are reset to the schema's
/// default block kind instead.
pub fn set_block_type(
    tree: &DocumentTree,
    selection: &Selection,
    kind: &str,
    schema: &Schema,
) -> Result<DocumentTree> {
    schema.require_block(kind)?;
    let indices = tree.blocks_in(selection)?;
    if indices.is_empty() {
        return Ok(tree.clone());
    }

    let all_match = indices.iter().all(|&idx| tree.nodes[idx].kind == kind);
    let target = if all_match {
        schema.default_block.as_str()
    } else {
        kind
    };
    let target_spec = schema.require_editable(target)?;

    let mut next = tree.clone();
    for idx in indices {
        let block = &mut next.nodes[idx];
        let current = schema.require_editable(&block.kind)?;
        if current.content != target_spec.content {
            return Err(EngineError::schema(format!(
                "cannot turn `{}` into `{}`: content models differ",
                block.kind, target
            )));
        }
        block.kind = target.to_string();
    }
    Ok(next)
}

/// Non-empty char ranges of each text node covered by the selection
fn selected_spans(tree: &DocumentTree, selection: &Selection) -> Result<Vec<(Path, Range<usize>)>> {
    let (start, end) = selection.range();
    tree.resolve(start)?;
    tree.resolve(end)?;

    let mut spans = Vec::new();
    for path in tree.text_paths() {
        if path < start.path || path > end.path {
            continue;
        }
        let len = tree.text_at(&path)?.len();
        let from = if path == start.path { start.offset } else { 0 };
        let to = if path == end.path { end.offset } else { len };
        if from < to {
            spans.push((path, from..to));
        }
    }
    Ok(spans)
}

fn text_slot<'a>(tree: &'a mut DocumentTree, path: &[usize]) -> Result<&'a mut crate::doc::Text> {
    tree.text_at_mut(path)
        .ok_or_else(|| EngineError::invalid_path(path, "not a text node"))
}
