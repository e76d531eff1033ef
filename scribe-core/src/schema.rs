//! Block and mark kinds known to an editor instance

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// What a block kind may contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentModel {
    /// Exactly one text node of leaves
    Text,
    /// Nested blocks only
    Blocks,
}

/// A configured block kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSpec {
    pub name: String,
    pub content: ContentModel,
    /// Locked blocks reject every mutation that touches them
    #[serde(default)]
    pub locked: bool,
}

impl BlockSpec {
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: ContentModel::Text,
            locked: false,
        }
    }

    pub fn container(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: ContentModel::Blocks,
            locked: false,
        }
    }

    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Schema {
    pub default_block: String,
    pub blocks: Vec<BlockSpec>,
    pub marks: Vec<String>,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            default_block: "paragraph".to_string(),
            blocks: vec![
                BlockSpec::text("paragraph"),
                BlockSpec::container("quote"),
                BlockSpec::text("code"),
            ],
            marks: ["bold", "italic", "underline", "strikethrough", "code"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

impl Schema {
    pub fn block(&self, name: &str) -> Option<&BlockSpec> {
        self.blocks.iter().find(|spec| spec.name == name)
    }

    pub fn has_mark(&self, name: &str) -> bool {
        self.marks.iter().any(|mark| mark == name)
    }

    /// Look up a block kind, failing on kinds the schema does not know
    pub fn require_block(&self, name: &str) -> Result<&BlockSpec> {
        self.block(name)
            .ok_or_else(|| EngineError::schema(format!("unknown block kind `{}`", name)))
    }

    /// Look up a block kind that a mutation is about to touch
    pub fn require_editable(&self, name: &str) -> Result<&BlockSpec> {
        let spec = self.require_block(name)?;
        if spec.locked {
            return Err(EngineError::schema(format!("block kind `{}` is locked", name)));
        }
        Ok(spec)
    }

    pub fn require_mark(&self, name: &str) -> Result<()> {
        if self.has_mark(name) {
            Ok(())
        } else {
            Err(EngineError::schema(format!("unknown mark kind `{}`", name)))
        }
    }

    /// Check the schema itself is usable
    pub fn validate(&self) -> Result<()> {
        for (idx, spec) in self.blocks.iter().enumerate() {
            if self.blocks[..idx].iter().any(|other| other.name == spec.name) {
                return Err(EngineError::schema(format!(
                    "block kind `{}` declared twice",
                    spec.name
                )));
            }
        }
        for (idx, mark) in self.marks.iter().enumerate() {
            if self.marks[..idx].contains(mark) {
                return Err(EngineError::schema(format!("mark kind `{}` declared twice", mark)));
            }
        }

        let default = self.require_block(&self.default_block)?;
        if default.content != ContentModel::Text {
            return Err(EngineError::schema(format!(
                "default block kind `{}` must hold text",
                self.default_block
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schema_is_valid() {
        let schema = Schema::default();
        assert!(schema.validate().is_ok());
        assert_eq!(schema.default_block, "paragraph");
        assert_eq!(schema.block("quote").map(|s| s.content), Some(ContentModel::Blocks));
        assert!(schema.has_mark("bold"));
        assert!(!schema.has_mark("blink"));
    }

    #[test]
    fn test_unknown_kinds_are_schema_errors() {
        let schema = Schema::default();
        assert!(schema.require_block("heading").unwrap_err().is_schema());
        assert!(schema.require_mark("blink").unwrap_err().is_schema());
    }

    #[test]
    fn test_locked_block_not_editable() {
        let mut schema = Schema::default();
        schema.blocks.push(BlockSpec::text("title").locked());
        assert!(schema.require_block("title").is_ok());
        assert!(schema.require_editable("title").unwrap_err().is_schema());
    }

    #[test]
    fn test_container_default_block_rejected() {
        let schema = Schema {
            default_block: "quote".to_string(),
            ..Default::default()
        };
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_duplicate_kinds_rejected() {
        let mut schema = Schema::default();
        schema.marks.push("bold".to_string());
        assert!(schema.validate().is_err());
    }
}
