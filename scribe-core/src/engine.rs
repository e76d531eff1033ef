//! Engine facade: schema, command pipeline and codec built from one config

use std::sync::Arc;

use log::debug;

use crate::codec::Codec;
use crate::command::{CommandPipeline, Dispatch, KeyEvent};
use crate::config::{Config, StorageFormat};
use crate::doc::{Block, DocumentTree, Text};
use crate::error::Result;
use crate::json;
use crate::schema::Schema;
use crate::selection::Selection;

#[derive(Debug)]
pub struct Engine {
    schema: Arc<Schema>,
    pipeline: CommandPipeline,
    codec: Codec,
    config: Config,
}

impl Engine {
    /// Validate `config` and build the pipeline and codec from it
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        config.validate()?;

        let schema = Arc::new(config.schema.clone());
        let pipeline = CommandPipeline::from_hotkeys(&config.hotkeys, Arc::clone(&schema));
        let codec = Codec::with_tables(
            Arc::clone(&schema),
            config.codec.blocks.clone(),
            config.codec.marks.clone(),
        );

        Ok(Self {
            schema,
            pipeline,
            codec,
            config: config.clone(),
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pipeline(&self) -> &CommandPipeline {
        &self.pipeline
    }

    /// Handlers pushed here run after the configured hotkeys
    pub fn pipeline_mut(&mut self) -> &mut CommandPipeline {
        &mut self.pipeline
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// The default document, or one restored from a stored blob
    ///
    /// Blobs starting with `{` are tree JSON, anything else is HTML.
    pub fn initial_tree(&self, blob: Option<&str>) -> Result<Arc<DocumentTree>> {
        let tree = match blob {
            None => {
                let paragraph = Block::with_text(
                    self.schema.default_block.clone(),
                    Text::plain(self.config.session.initial_text.clone()),
                );
                DocumentTree::from_blocks(vec![paragraph], &self.schema)?
            }
            Some(blob) if blob.trim_start().starts_with('{') => {
                debug!("restoring tree JSON ({} bytes)", blob.len());
                json::from_str(blob, &self.schema)?
            }
            Some(blob) => {
                debug!("restoring HTML ({} bytes)", blob.len());
                self.codec.deserialize(blob)?
            }
        };
        Ok(Arc::new(tree))
    }

    pub fn dispatch(
        &self,
        event: &KeyEvent,
        tree: &Arc<DocumentTree>,
        selection: &Selection,
    ) -> Result<Dispatch> {
        self.pipeline.dispatch(event, tree, selection)
    }

    /// Render as HTML
    pub fn serialize(&self, tree: &DocumentTree) -> String {
        self.codec.serialize(tree)
    }

    /// Parse HTML
    pub fn deserialize(&self, markup: &str) -> Result<DocumentTree> {
        self.codec.deserialize(markup)
    }

    /// Render in the configured storage format
    pub fn persist(&self, tree: &DocumentTree) -> Result<String> {
        match self.config.session.format {
            StorageFormat::Html => Ok(self.serialize(tree)),
            StorageFormat::Json => json::to_string(tree),
        }
    }
}
