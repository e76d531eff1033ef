//! Document model: blocks, text nodes and marked leaves

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use crate::error::{EngineError, Result};
use crate::html;
use crate::schema::{ContentModel, Schema};
use crate::selection::{Point, Selection};

/// Child indices from the document root
pub type Path = Vec<usize>;

/// Set of mark kinds active over a run of text
pub type Marks = BTreeSet<String>;

/// The smallest text unit: a string plus its active marks
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Leaf {
    pub text: String,
    pub marks: Marks,
}

impl Leaf {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            marks: Marks::new(),
        }
    }

    pub fn marked<I, S>(text: impl Into<String>, marks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            text: text.into(),
            marks: marks.into_iter().map(Into::into).collect(),
        }
    }

    /// Length in chars
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    fn slice(&self, range: Range<usize>) -> Leaf {
        Leaf {
            text: char_slice(&self.text, range).to_string(),
            marks: self.marks.clone(),
        }
    }
}

/// An ordered run of leaves
///
/// Leaves are kept normalized: no empty leaves, and no two neighbours with
/// the same mark set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Text {
    leaves: Vec<Leaf>,
}

impl Text {
    pub fn new(leaves: impl IntoIterator<Item = Leaf>) -> Self {
        let mut merged: Vec<Leaf> = Vec::new();
        for leaf in leaves {
            if leaf.is_empty() {
                continue;
            }
            match merged.last_mut() {
                Some(last) if last.marks == leaf.marks => last.text.push_str(&leaf.text),
                _ => merged.push(leaf),
            }
        }
        Self { leaves: merged }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self::new([Leaf::plain(text)])
    }

    pub fn leaves(&self) -> &[Leaf] {
        &self.leaves
    }

    pub fn into_leaves(self) -> Vec<Leaf> {
        self.leaves
    }

    /// Length in chars
    pub fn len(&self) -> usize {
        self.leaves.iter().map(Leaf::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn text(&self) -> String {
        self.leaves.iter().map(|leaf| leaf.text.as_str()).collect()
    }

    /// Marks a character typed at `offset` would pick up
    ///
    /// That is the marks of the character before the offset, or of the
    /// first character at offset 0.
    pub fn marks_at(&self, offset: usize) -> Marks {
        if offset == 0 {
            return self
                .leaves
                .first()
                .map(|leaf| leaf.marks.clone())
                .unwrap_or_default();
        }

        let mut pos = 0;
        for leaf in &self.leaves {
            let end = pos + leaf.len();
            if offset > pos && offset <= end {
                return leaf.marks.clone();
            }
            pos = end;
        }
        Marks::new()
    }

    /// Leaves sharing at least one character with `range`
    pub fn leaves_in(&self, range: Range<usize>) -> Vec<&Leaf> {
        let mut pos = 0;
        let mut found = Vec::new();
        for leaf in &self.leaves {
            let end = pos + leaf.len();
            if pos.max(range.start) < end.min(range.end) {
                found.push(leaf);
            }
            pos = end;
        }
        found
    }

    /// Insert `text` with `marks` at char `offset`
    pub fn insert(&self, offset: usize, text: &str, marks: Marks) -> Text {
        let inserted = Leaf {
            text: text.to_string(),
            marks,
        };
        let mut pieces = Vec::with_capacity(self.leaves.len() + 2);
        let mut pending = Some(inserted);
        let mut pos = 0;

        for leaf in &self.leaves {
            let len = leaf.len();
            match pending.take() {
                Some(new_leaf) if offset <= pos + len => {
                    let at = offset - pos;
                    pieces.push(leaf.slice(0..at));
                    pieces.push(new_leaf);
                    pieces.push(leaf.slice(at..len));
                }
                other => {
                    pending = other;
                    pieces.push(leaf.clone());
                }
            }
            pos += len;
        }
        pieces.extend(pending);

        Text::new(pieces)
    }

    /// Apply `update` to the marks of the chars in `range`, splitting leaves
    /// at the range boundaries
    pub fn update_marks(&self, range: Range<usize>, update: impl Fn(&mut Marks)) -> Text {
        let mut pieces = Vec::with_capacity(self.leaves.len() + 2);
        let mut pos = 0;

        for leaf in &self.leaves {
            let len = leaf.len();
            let start = range.start.max(pos);
            let end = range.end.min(pos + len);
            if start >= end {
                pieces.push(leaf.clone());
            } else {
                pieces.push(leaf.slice(0..start - pos));
                let mut middle = leaf.slice(start - pos..end - pos);
                update(&mut middle.marks);
                pieces.push(middle);
                pieces.push(leaf.slice(end - pos..len));
            }
            pos += len;
        }

        Text::new(pieces)
    }
}

/// A child of a block
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Block(Block),
    Text(Text),
}

/// A structural node: paragraph, quote, code block, ...
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub kind: String,
    /// Opaque metadata, e.g. a class name
    pub data: BTreeMap<String, String>,
    pub nodes: Vec<Node>,
}

impl Block {
    pub fn new(kind: impl Into<String>, nodes: Vec<Node>) -> Self {
        Self {
            kind: kind.into(),
            data: BTreeMap::new(),
            nodes,
        }
    }

    /// A text-bearing block holding `text`
    pub fn with_text(kind: impl Into<String>, text: Text) -> Self {
        Self::new(kind, vec![Node::Text(text)])
    }

    /// A container block holding `blocks`
    pub fn with_blocks(kind: impl Into<String>, blocks: Vec<Block>) -> Self {
        Self::new(kind, blocks.into_iter().map(Node::Block).collect())
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Concatenated text of the subtree
    pub fn text(&self) -> String {
        self.nodes
            .iter()
            .map(|node| match node {
                Node::Block(block) => block.text(),
                Node::Text(text) => text.text(),
            })
            .collect()
    }
}

/// Borrowed view of any node in the tree
#[derive(Clone, Copy, Debug)]
pub enum NodeRef<'a> {
    Document(&'a DocumentTree),
    Block(&'a Block),
    Text(&'a Text),
}

/// One immutable revision of a rich-text document
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocumentTree {
    pub nodes: Vec<Block>,
}

impl DocumentTree {
    /// Build a tree from a nested node description
    pub fn build(raw: &RawNode, schema: &Schema) -> Result<Self> {
        let RawNode::Document { nodes } = raw else {
            return Err(EngineError::schema("root node must be a document"));
        };

        let blocks = nodes
            .iter()
            .map(|node| match node_from_raw(node)? {
                Node::Block(block) => Ok(block),
                Node::Text(_) => Err(EngineError::schema(
                    "text node cannot be a direct child of the document",
                )),
            })
            .collect::<Result<Vec<_>>>()?;

        Self::from_blocks(blocks, schema)
    }

    /// Validate and normalize already-typed blocks against `schema`
    pub fn from_blocks(blocks: Vec<Block>, schema: &Schema) -> Result<Self> {
        let nodes = blocks
            .into_iter()
            .map(|block| normalize_block(block, schema))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { nodes })
    }

    /// Describe the tree as nested raw nodes
    pub fn to_raw(&self) -> RawNode {
        RawNode::Document {
            nodes: self.to_raw_nodes(),
        }
    }

    pub fn to_raw_nodes(&self) -> Vec<RawNode> {
        self.nodes.iter().map(block_to_raw).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Concatenated text of the whole document
    pub fn text(&self) -> String {
        self.nodes.iter().map(Block::text).collect()
    }

    pub fn node_at(&self, path: &[usize]) -> Option<NodeRef<'_>> {
        let Some((first, rest)) = path.split_first() else {
            return Some(NodeRef::Document(self));
        };

        let mut node = NodeRef::Block(self.nodes.get(*first)?);
        for idx in rest {
            node = match node {
                NodeRef::Block(block) => match block.nodes.get(*idx)? {
                    Node::Block(child) => NodeRef::Block(child),
                    Node::Text(text) => NodeRef::Text(text),
                },
                _ => return None,
            };
        }
        Some(node)
    }

    pub fn block_at(&self, path: &[usize]) -> Option<&Block> {
        match self.node_at(path)? {
            NodeRef::Block(block) => Some(block),
            _ => None,
        }
    }

    pub fn text_at(&self, path: &[usize]) -> Result<&Text> {
        match self.node_at(path) {
            Some(NodeRef::Text(text)) => Ok(text),
            Some(_) => Err(EngineError::invalid_path(path, "not a text node")),
            None => Err(EngineError::invalid_path(path, "no such node")),
        }
    }

    /// Resolve a point to its text node, checking the offset is in range
    pub fn resolve(&self, point: &Point) -> Result<&Text> {
        let text = self.text_at(&point.path)?;
        if point.offset > text.len() {
            return Err(EngineError::invalid_path(
                &point.path,
                format!("offset {} past end of text ({})", point.offset, text.len()),
            ));
        }
        Ok(text)
    }

    /// Blocks on the way from the root to `path`, outermost first
    pub fn ancestors(&self, path: &[usize]) -> Vec<&Block> {
        (1..=path.len())
            .filter_map(|depth| self.block_at(&path[..depth]))
            .collect()
    }

    /// Paths of every text node in document order
    pub fn text_paths(&self) -> Vec<Path> {
        fn walk(block: &Block, path: &mut Path, out: &mut Vec<Path>) {
            for (idx, node) in block.nodes.iter().enumerate() {
                path.push(idx);
                match node {
                    Node::Block(child) => walk(child, path, out),
                    Node::Text(_) => out.push(path.clone()),
                }
                path.pop();
            }
        }

        let mut out = Vec::new();
        let mut path = Vec::new();
        for (idx, block) in self.nodes.iter().enumerate() {
            path.push(idx);
            walk(block, &mut path, &mut out);
            path.pop();
        }
        out
    }

    pub fn start_point(&self) -> Option<Point> {
        self.text_paths().into_iter().next().map(|path| Point::new(path, 0))
    }

    pub fn end_point(&self) -> Option<Point> {
        let path = self.text_paths().pop()?;
        let len = self.text_at(&path).map(Text::len).ok()?;
        Some(Point::new(path, len))
    }

    /// Indices of the top-level blocks the selection touches
    pub fn blocks_in(&self, selection: &Selection) -> Result<Vec<usize>> {
        if self.nodes.is_empty() {
            return Ok(Vec::new());
        }

        let (start, end) = selection.range();
        self.resolve(start)?;
        self.resolve(end)?;
        Ok((start.path[0]..=end.path[0]).collect())
    }

    pub(crate) fn text_at_mut(&mut self, path: &[usize]) -> Option<&mut Text> {
        let (first, rest) = path.split_first()?;
        let (last, middle) = rest.split_last()?;

        let mut block = self.nodes.get_mut(*first)?;
        for idx in middle {
            block = match block.nodes.get_mut(*idx)? {
                Node::Block(child) => child,
                Node::Text(_) => return None,
            };
        }
        match block.nodes.get_mut(*last)? {
            Node::Text(text) => Some(text),
            Node::Block(_) => None,
        }
    }
}

/// Lowercase metadata keys; every key must be writable as an attribute name
fn normalize_data(
    kind: &str,
    data: BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>> {
    let mut normalized = BTreeMap::new();
    for (key, value) in data {
        let lowered = key.to_ascii_lowercase();
        if !html::is_attribute_name(&lowered) {
            return Err(EngineError::schema(format!(
                "block `{}` has metadata key {:?}, which is not an attribute name",
                kind, key
            )));
        }
        if normalized.insert(lowered, value).is_some() {
            return Err(EngineError::schema(format!(
                "block `{}` has metadata key {:?} more than once, ignoring case",
                kind, key
            )));
        }
    }
    Ok(normalized)
}

fn normalize_block(block: Block, schema: &Schema) -> Result<Block> {
    let spec = schema.require_block(&block.kind)?;
    let Block { kind, data, nodes } = block;
    let data = normalize_data(&kind, data)?;

    let nodes = match spec.content {
        ContentModel::Text => {
            let mut leaves = Vec::new();
            for node in nodes {
                match node {
                    Node::Text(text) => {
                        for leaf in text.into_leaves() {
                            for mark in &leaf.marks {
                                schema.require_mark(mark)?;
                            }
                            leaves.push(leaf);
                        }
                    }
                    Node::Block(child) => {
                        return Err(EngineError::schema(format!(
                            "block `{}` holds text and cannot contain block `{}`",
                            kind, child.kind
                        )));
                    }
                }
            }
            vec![Node::Text(Text::new(leaves))]
        }
        ContentModel::Blocks => nodes
            .into_iter()
            .map(|node| match node {
                Node::Block(child) => normalize_block(child, schema).map(Node::Block),
                Node::Text(_) => Err(EngineError::schema(format!(
                    "container block `{}` cannot contain text directly",
                    kind
                ))),
            })
            .collect::<Result<Vec<_>>>()?,
    };

    Ok(Block { kind, data, nodes })
}

/// Nested node description, in the `object`-tagged JSON shape
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "object", rename_all = "lowercase")]
pub enum RawNode {
    Document {
        #[serde(default)]
        nodes: Vec<RawNode>,
    },
    Block {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        data: BTreeMap<String, String>,
        #[serde(default)]
        nodes: Vec<RawNode>,
    },
    Text {
        #[serde(default)]
        leaves: Vec<RawLeaf>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLeaf {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub marks: Vec<RawMark>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMark {
    #[serde(rename = "type")]
    pub kind: String,
}

fn node_from_raw(raw: &RawNode) -> Result<Node> {
    match raw {
        RawNode::Document { .. } => Err(EngineError::schema("a document cannot be nested")),
        RawNode::Block { kind, data, nodes } => Ok(Node::Block(Block {
            kind: kind.clone(),
            data: data.clone(),
            nodes: nodes.iter().map(node_from_raw).collect::<Result<Vec<_>>>()?,
        })),
        RawNode::Text { leaves } => Ok(Node::Text(Text::new(leaves.iter().map(|leaf| {
            Leaf::marked(leaf.text.clone(), leaf.marks.iter().map(|m| m.kind.clone()))
        })))),
    }
}

fn block_to_raw(block: &Block) -> RawNode {
    RawNode::Block {
        kind: block.kind.clone(),
        data: block.data.clone(),
        nodes: block
            .nodes
            .iter()
            .map(|node| match node {
                Node::Block(child) => block_to_raw(child),
                Node::Text(text) => RawNode::Text {
                    leaves: text
                        .leaves()
                        .iter()
                        .map(|leaf| RawLeaf {
                            text: leaf.text.clone(),
                            marks: leaf
                                .marks
                                .iter()
                                .map(|kind| RawMark { kind: kind.clone() })
                                .collect(),
                        })
                        .collect(),
                },
            })
            .collect(),
    }
}

/// Slice of `s` by char positions
fn char_slice(s: &str, range: Range<usize>) -> &str {
    let byte_at = |chars: usize| {
        s.char_indices()
            .nth(chars)
            .map(|(idx, _)| idx)
            .unwrap_or(s.len())
    };
    &s[byte_at(range.start)..byte_at(range.end)]
}
