//! Rule-based conversion between HTML markup and document trees
//!
//! A [`Codec`] holds an ordered list of [`Rule`]s. In both directions the
//! rules are tried in order and the first one that does not skip wins.
//! Elements no rule accepts are dropped and their children are lifted into
//! the parent; tree nodes no rule accepts produce no output.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::doc::{Block, DocumentTree, Leaf, Marks, Node, Text};
use crate::error::{EngineError, Result};
use crate::html::{self, Element, HtmlNode};
use crate::schema::{ContentModel, Schema};

/// Intermediate result of deserializing markup, before schema assembly
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Block {
        kind: String,
        data: BTreeMap<String, String>,
        children: Vec<Fragment>,
    },
    Mark {
        kind: String,
        children: Vec<Fragment>,
    },
    Text(String),
}

impl Fragment {
    fn is_blank(&self) -> bool {
        match self {
            Fragment::Text(text) => text.trim().is_empty(),
            Fragment::Mark { children, .. } => children.iter().all(Fragment::is_blank),
            Fragment::Block { .. } => false,
        }
    }
}

/// A tree object handed to [`Rule::serialize`]
#[derive(Debug, Clone, Copy)]
pub enum Object<'a> {
    Block(&'a Block),
    Mark(&'a str),
}

/// Recursion hook passed to [`Rule::deserialize`]
pub type Next<'a> = &'a dyn Fn(&[HtmlNode]) -> Vec<Fragment>;

/// A paired deserialize/serialize step; `None` means skip
pub trait Rule: Send + Sync {
    fn deserialize(&self, element: &Element, next: Next<'_>) -> Option<Fragment>;

    fn serialize(&self, object: Object<'_>, children: &[HtmlNode]) -> Option<HtmlNode>;
}

/// One row of a tag table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagMapping {
    pub tag: String,
    pub kind: String,
    /// Wrapper element directly inside `tag`, e.g. `code` in `pre > code`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner: Option<String>,
}

impl TagMapping {
    pub fn new(tag: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            kind: kind.into(),
            inner: None,
        }
    }

    pub fn wrapping(mut self, inner: impl Into<String>) -> Self {
        self.inner = Some(inner.into());
        self
    }
}

/// Maps container elements to block kinds; attributes become block data
#[derive(Debug, Clone)]
pub struct BlockRule {
    tags: Vec<TagMapping>,
}

impl BlockRule {
    pub fn new(tags: Vec<TagMapping>) -> Self {
        Self { tags }
    }
}

impl Rule for BlockRule {
    fn deserialize(&self, element: &Element, next: Next<'_>) -> Option<Fragment> {
        let mapping = self.tags.iter().find(|m| m.tag == element.tag)?;
        let mut data = attribute_data(&element.attrs, "");
        let wrapper = mapping
            .inner
            .as_deref()
            .and_then(|inner| unwrap_inner(element, inner));
        let children = match wrapper {
            Some(wrapper) => {
                data.extend(attribute_data(&wrapper.attrs, INNER_PREFIX));
                &wrapper.children
            }
            None => &element.children,
        };
        Some(Fragment::Block {
            kind: mapping.kind.clone(),
            data,
            children: next(children),
        })
    }

    fn serialize(&self, object: Object<'_>, children: &[HtmlNode]) -> Option<HtmlNode> {
        let Object::Block(block) = object else {
            return None;
        };
        let mapping = self.tags.iter().find(|m| m.kind == block.kind)?;
        let Some(inner) = &mapping.inner else {
            return Some(HtmlNode::Element(
                Element::new(mapping.tag.clone(), children.to_vec()).with_attrs(block.data.clone()),
            ));
        };

        let (inner_attrs, outer_attrs): (BTreeMap<_, _>, BTreeMap<_, _>) = block
            .data
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .partition(|(key, _)| key.starts_with(INNER_PREFIX));
        let inner_attrs = inner_attrs
            .into_iter()
            .map(|(key, value)| (key[INNER_PREFIX.len()..].to_string(), value))
            .collect();

        let wrapper = Element::new(inner.clone(), children.to_vec()).with_attrs(inner_attrs);
        Some(HtmlNode::Element(
            Element::new(mapping.tag.clone(), vec![HtmlNode::Element(wrapper)])
                .with_attrs(outer_attrs),
        ))
    }
}

/// Block data prefix for attributes of the `inner` wrapper element
pub const INNER_PREFIX: &str = "inner:";

/// Copy attributes into block data under `prefix`, dropping names that
/// could not be written back out
fn attribute_data(attrs: &BTreeMap<String, String>, prefix: &str) -> BTreeMap<String, String> {
    attrs
        .iter()
        .filter(|(name, _)| {
            let keep = html::is_attribute_name(name);
            if !keep {
                debug!("dropping attribute {:?}", name);
            }
            keep
        })
        .map(|(name, value)| (format!("{prefix}{name}"), value.clone()))
        .collect()
}

/// The single `inner` element wrapped by `element`, if that is its only
/// non-blank content
fn unwrap_inner<'a>(element: &'a Element, inner: &str) -> Option<&'a Element> {
    let mut significant = element.children.iter().filter(|node| match node {
        HtmlNode::Text(text) => !text.trim().is_empty(),
        HtmlNode::Element(_) => true,
    });
    match (significant.next(), significant.next()) {
        (Some(HtmlNode::Element(wrapper)), None) if wrapper.tag == inner => Some(wrapper),
        _ => None,
    }
}

/// Maps inline elements to mark kinds
#[derive(Debug, Clone)]
pub struct MarkRule {
    tags: Vec<TagMapping>,
}

impl MarkRule {
    pub fn new(tags: Vec<TagMapping>) -> Self {
        Self { tags }
    }
}

impl Rule for MarkRule {
    fn deserialize(&self, element: &Element, next: Next<'_>) -> Option<Fragment> {
        let mapping = self.tags.iter().find(|m| m.tag == element.tag)?;
        Some(Fragment::Mark {
            kind: mapping.kind.clone(),
            children: next(&element.children),
        })
    }

    fn serialize(&self, object: Object<'_>, children: &[HtmlNode]) -> Option<HtmlNode> {
        let Object::Mark(kind) = object else {
            return None;
        };
        let mapping = self.tags.iter().find(|m| m.kind == kind)?;
        Some(HtmlNode::element(mapping.tag.clone(), children.to_vec()))
    }
}

/// Ordered rule list bound to a schema
pub struct Codec {
    rules: Vec<Box<dyn Rule>>,
    schema: Arc<Schema>,
}

impl Codec {
    /// A codec with no rules
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            rules: Vec::new(),
            schema,
        }
    }

    /// A codec with the block table rule followed by the mark table rule
    pub fn with_tables(schema: Arc<Schema>, blocks: Vec<TagMapping>, marks: Vec<TagMapping>) -> Self {
        Self::new(schema)
            .with_rule(BlockRule::new(blocks))
            .with_rule(MarkRule::new(marks))
    }

    /// Append a rule after the existing ones
    pub fn with_rule(mut self, rule: impl Rule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Parse markup into a tree
    pub fn deserialize(&self, markup: &str) -> Result<DocumentTree> {
        let nodes = html::parse_fragment(markup);
        let fragments = self.deserialize_nodes(&nodes);
        assemble(fragments, &self.schema)
    }

    /// Render a tree as markup
    pub fn serialize(&self, tree: &DocumentTree) -> String {
        html::write_fragment(&self.serialize_nodes(tree))
    }

    pub fn deserialize_nodes(&self, nodes: &[HtmlNode]) -> Vec<Fragment> {
        let next = |children: &[HtmlNode]| self.deserialize_nodes(children);
        let mut fragments = Vec::new();
        for node in nodes {
            match node {
                HtmlNode::Text(text) => fragments.push(Fragment::Text(text.clone())),
                HtmlNode::Element(element) => {
                    match self.rules.iter().find_map(|rule| rule.deserialize(element, &next)) {
                        Some(fragment) => fragments.push(fragment),
                        None => {
                            debug!("no rule for <{}>, lifting its children", element.tag);
                            fragments.extend(self.deserialize_nodes(&element.children));
                        }
                    }
                }
            }
        }
        fragments
    }

    pub fn serialize_nodes(&self, tree: &DocumentTree) -> Vec<HtmlNode> {
        tree.nodes
            .iter()
            .filter_map(|block| self.serialize_block(block))
            .collect()
    }

    fn serialize_object(&self, object: Object<'_>, children: &[HtmlNode]) -> Option<HtmlNode> {
        self.rules
            .iter()
            .find_map(|rule| rule.serialize(object, children))
    }

    fn serialize_block(&self, block: &Block) -> Option<HtmlNode> {
        let mut children = Vec::new();
        for node in &block.nodes {
            match node {
                Node::Block(child) => children.extend(self.serialize_block(child)),
                Node::Text(text) => {
                    children.extend(self.serialize_leaves(text.leaves(), &self.schema.marks))
                }
            }
        }

        let rendered = self.serialize_object(Object::Block(block), &children);
        if rendered.is_none() {
            debug!("no rule for block `{}`, dropping it", block.kind);
        }
        rendered
    }

    /// Wrap leaves in mark elements, earlier marks outermost, sharing a
    /// wrapper across neighbouring leaves that carry the same mark
    fn serialize_leaves(&self, leaves: &[Leaf], order: &[String]) -> Vec<HtmlNode> {
        let Some((mark, rest)) = order.split_first() else {
            return leaves
                .iter()
                .map(|leaf| HtmlNode::Text(leaf.text.clone()))
                .collect();
        };

        let mut out = Vec::new();
        let mut start = 0;
        while start < leaves.len() {
            let marked = leaves[start].marks.contains(mark);
            let mut end = start + 1;
            while end < leaves.len() && leaves[end].marks.contains(mark) == marked {
                end += 1;
            }

            let inner = self.serialize_leaves(&leaves[start..end], rest);
            if marked {
                match self.serialize_object(Object::Mark(mark), &inner) {
                    Some(node) => out.push(node),
                    None => out.extend(inner),
                }
            } else {
                out.extend(inner);
            }
            start = end;
        }
        out
    }
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec")
            .field("rules", &self.rules.len())
            .field("schema", &self.schema)
            .finish()
    }
}

/// Turn deserialized fragments into a validated tree
///
/// Inline content outside a text-bearing block is wrapped in the default
/// block kind; whitespace-only inline content between blocks is dropped.
pub fn assemble(fragments: Vec<Fragment>, schema: &Schema) -> Result<DocumentTree> {
    let blocks = collect_blocks(fragments, schema)?;
    DocumentTree::from_blocks(blocks, schema)
}

fn collect_blocks(fragments: Vec<Fragment>, schema: &Schema) -> Result<Vec<Block>> {
    let mut blocks = Vec::new();
    let mut inline = Vec::new();

    for fragment in fragments {
        match fragment {
            Fragment::Block {
                kind,
                data,
                children,
            } => {
                flush_inline(&mut inline, &mut blocks, schema)?;
                blocks.push(build_block(kind, data, children, schema)?);
            }
            other => inline.push(other),
        }
    }
    flush_inline(&mut inline, &mut blocks, schema)?;
    Ok(blocks)
}

fn flush_inline(inline: &mut Vec<Fragment>, blocks: &mut Vec<Block>, schema: &Schema) -> Result<()> {
    let run = std::mem::take(inline);
    if run.iter().all(Fragment::is_blank) {
        return Ok(());
    }

    let mut leaves = Vec::new();
    collect_leaves(run, &Marks::new(), &mut leaves, &schema.default_block)?;
    blocks.push(Block::with_text(schema.default_block.clone(), Text::new(leaves)));
    Ok(())
}

fn build_block(
    kind: String,
    data: BTreeMap<String, String>,
    children: Vec<Fragment>,
    schema: &Schema,
) -> Result<Block> {
    let spec = schema.require_block(&kind)?;
    let nodes = match spec.content {
        ContentModel::Text => {
            let mut leaves = Vec::new();
            collect_leaves(children, &Marks::new(), &mut leaves, &kind)?;
            vec![Node::Text(Text::new(leaves))]
        }
        ContentModel::Blocks => collect_blocks(children, schema)?
            .into_iter()
            .map(Node::Block)
            .collect(),
    };
    Ok(Block { kind, data, nodes })
}

fn collect_leaves(
    fragments: Vec<Fragment>,
    marks: &Marks,
    out: &mut Vec<Leaf>,
    parent: &str,
) -> Result<()> {
    for fragment in fragments {
        match fragment {
            Fragment::Text(text) => out.push(Leaf {
                text,
                marks: marks.clone(),
            }),
            Fragment::Mark { kind, children } => {
                let mut inner = marks.clone();
                inner.insert(kind);
                collect_leaves(children, &inner, out, parent)?;
            }
            Fragment::Block { kind, .. } => {
                return Err(EngineError::schema(format!(
                    "block `{}` cannot appear inside text block `{}`",
                    kind, parent
                )));
            }
        }
    }
    Ok(())
}
