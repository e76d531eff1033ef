//! Tree JSON: the `{"document": {"nodes": [...]}}` value shape

use serde::{Deserialize, Serialize};

use crate::doc::{DocumentTree, RawNode};
use crate::error::Result;
use crate::schema::Schema;

#[derive(Debug, Serialize, Deserialize)]
struct Value {
    document: RawDocument,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawDocument {
    #[serde(default)]
    nodes: Vec<RawNode>,
}

/// Serialize a tree as JSON
pub fn to_string(tree: &DocumentTree) -> Result<String> {
    let value = Value {
        document: RawDocument {
            nodes: tree.to_raw_nodes(),
        },
    };
    Ok(serde_json::to_string(&value)?)
}

/// Parse a tree from JSON, validating it against `schema`
pub fn from_str(input: &str, schema: &Schema) -> Result<DocumentTree> {
    let value: Value = serde_json::from_str(input)?;
    DocumentTree::build(
        &RawNode::Document {
            nodes: value.document.nodes,
        },
        schema,
    )
}
