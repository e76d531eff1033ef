//! Cursor and range selection model

use crate::doc::{DocumentTree, Path};

/// A position inside a text node: path from the root plus a char offset
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Point {
    pub path: Path,
    pub offset: usize,
}

impl Point {
    pub fn new(path: impl Into<Path>, offset: usize) -> Self {
        Self {
            path: path.into(),
            offset,
        }
    }
}

/// Represents a (possibly collapsed) range in the document
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    pub anchor: Point,
    pub focus: Point,
}

impl Selection {
    pub fn new(anchor: Point, focus: Point) -> Self {
        Self { anchor, focus }
    }

    /// Create a collapsed selection (a cursor)
    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point.clone(),
            focus: point,
        }
    }

    /// Select everything from the first to the last character of `tree`
    ///
    /// An empty document yields a collapsed selection at the root.
    pub fn all(tree: &DocumentTree) -> Self {
        match (tree.start_point(), tree.end_point()) {
            (Some(start), Some(end)) => Self::new(start, end),
            _ => Self::collapsed(Point::new(Vec::new(), 0)),
        }
    }

    /// Collapsed selection at the end of `tree`
    pub fn end_of(tree: &DocumentTree) -> Self {
        Self::collapsed(tree.end_point().unwrap_or_else(|| Point::new(Vec::new(), 0)))
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    /// Get the selection range as (start, end) in document order
    pub fn range(&self) -> (&Point, &Point) {
        if self.anchor <= self.focus {
            (&self.anchor, &self.focus)
        } else {
            (&self.focus, &self.anchor)
        }
    }

    pub fn start(&self) -> &Point {
        self.range().0
    }

    pub fn end(&self) -> &Point {
        self.range().1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_forward_selection() {
        let sel = Selection::new(Point::new(vec![0, 0], 1), Point::new(vec![2, 0], 3));
        let (start, end) = sel.range();
        assert_eq!(start, &Point::new(vec![0, 0], 1));
        assert_eq!(end, &Point::new(vec![2, 0], 3));
    }

    #[test]
    fn test_range_backward_selection() {
        let sel = Selection::new(Point::new(vec![1, 0], 4), Point::new(vec![1, 0], 2));
        assert_eq!(sel.start().offset, 2);
        assert_eq!(sel.end().offset, 4);
        assert!(!sel.is_collapsed());
    }

    #[test]
    fn test_nested_paths_order_in_document_order() {
        let outer = Point::new(vec![0, 1, 0], 5);
        let later = Point::new(vec![1, 0], 0);
        assert!(outer < later);
    }

    #[test]
    fn test_collapsed() {
        let sel = Selection::collapsed(Point::new(vec![0, 0], 3));
        assert!(sel.is_collapsed());
        assert_eq!(sel.start(), sel.end());
    }

    #[test]
    fn test_all_of_empty_document() {
        let sel = Selection::all(&DocumentTree::default());
        assert!(sel.is_collapsed());
        assert!(sel.anchor.path.is_empty());
    }
}
