//! Configuration management for scribe

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::codec::TagMapping;
use crate::command::{find_shadowed, Hotkey, HotkeyAction};
use crate::schema::Schema;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub schema: Schema,
    pub hotkeys: Vec<Hotkey>,
    pub codec: CodecConfig,
    pub session: SessionConfig,
}

/// Tag tables for the built-in codec rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    pub blocks: Vec<TagMapping>,
    pub marks: Vec<TagMapping>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Key the document blob is stored under
    pub storage_key: String,
    pub format: StorageFormat,
    /// Text of the paragraph a fresh document starts with
    pub initial_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageFormat {
    Html,
    Json,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema: Schema::default(),
            hotkeys: default_hotkeys(),
            codec: CodecConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            blocks: vec![
                TagMapping::new("p", "paragraph"),
                TagMapping::new("blockquote", "quote"),
                TagMapping::new("pre", "code").wrapping("code"),
            ],
            marks: vec![
                TagMapping::new("strong", "bold"),
                TagMapping::new("b", "bold"),
                TagMapping::new("em", "italic"),
                TagMapping::new("i", "italic"),
                TagMapping::new("u", "underline"),
                TagMapping::new("s", "strikethrough"),
                TagMapping::new("del", "strikethrough"),
                TagMapping::new("strike", "strikethrough"),
                TagMapping::new("code", "code"),
            ],
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            storage_key: "content".to_string(),
            format: StorageFormat::Html,
            initial_text: "A line of text in a paragraph.".to_string(),
        }
    }
}

/// The stock bindings: mark toggles, a code block toggle and `&` → "and"
pub fn default_hotkeys() -> Vec<Hotkey> {
    vec![
        Hotkey::mark("b", "bold"),
        Hotkey::mark("i", "italic"),
        Hotkey::mark("u", "underline"),
        Hotkey::mark("~", "strikethrough"),
        Hotkey::block("`", "code"),
        Hotkey::insert("&", "and"),
    ]
}

impl Config {
    /// Get the platform-specific config file path
    pub fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "scribe")
            .map(|proj_dirs| proj_dirs.config_dir().join("scribe.toml"))
    }

    /// Load configuration from file, falling back to defaults if missing
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                log::debug!("no config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load and validate from a specific path
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        // Check config file permissions (Unix only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = std::fs::metadata(path)
                .with_context(|| format!("Failed to stat config file: {}", path.display()))?;
            if metadata.permissions().mode() & 0o002 != 0 {
                anyhow::bail!(
                    "Config file {} is world-writable (insecure permissions)",
                    path.display()
                );
            }
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Check that every name the config refers to exists in its schema
    ///
    /// Block hotkeys must target a kind with the default block's content
    /// model, and every schema kind needs a codec tag when documents are
    /// stored as HTML.
    pub fn validate(&self) -> Result<()> {
        self.schema.validate()?;

        for hotkey in &self.hotkeys {
            match &hotkey.action {
                HotkeyAction::Mark(mark) => {
                    self.schema
                        .require_mark(mark)
                        .with_context(|| format!("hotkey {hotkey}"))?;
                }
                HotkeyAction::Block(kind) => {
                    let target = self
                        .schema
                        .require_block(kind)
                        .with_context(|| format!("hotkey {hotkey}"))?;
                    let default = self.schema.require_block(&self.schema.default_block)?;
                    if target.content != default.content {
                        anyhow::bail!(
                            "hotkey {hotkey} targets `{kind}`, which cannot toggle with the \
                             default block `{}`: content models differ",
                            default.name
                        );
                    }
                }
                HotkeyAction::Insert(_) => {}
            }
        }

        if let Some(shadowed) = find_shadowed(&self.hotkeys).first() {
            anyhow::bail!(
                "hotkey #{} ({}) is unreachable, #{} has the same key",
                shadowed.index,
                shadowed.binding,
                shadowed.shadowed_by
            );
        }

        for mapping in &self.codec.blocks {
            self.schema
                .require_block(&mapping.kind)
                .with_context(|| format!("codec tag <{}>", mapping.tag))?;
        }
        for mapping in &self.codec.marks {
            self.schema
                .require_mark(&mapping.kind)
                .with_context(|| format!("codec tag <{}>", mapping.tag))?;
        }

        let unmapped_blocks = self
            .schema
            .blocks
            .iter()
            .map(|spec| spec.name.as_str())
            .filter(|name| !self.codec.blocks.iter().any(|m| m.kind == *name));
        let unmapped_marks = self
            .schema
            .marks
            .iter()
            .map(String::as_str)
            .filter(|name| !self.codec.marks.iter().any(|m| m.kind == *name));
        let unmapped: Vec<&str> = unmapped_blocks.chain(unmapped_marks).collect();
        if !unmapped.is_empty() {
            let names = unmapped.join(", ");
            if self.session.format == StorageFormat::Html {
                anyhow::bail!("no codec tag for {names}; HTML storage would drop them");
            }
            log::warn!("no codec tag for {names}; HTML output will drop them");
        }

        if self.session.storage_key.is_empty() {
            anyhow::bail!("session.storage_key must not be empty");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.schema.default_block, "paragraph");
        assert_eq!(config.hotkeys.len(), 6);
        assert_eq!(config.session.storage_key, "content");
        assert_eq!(config.session.format, StorageFormat::Html);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_valid_toml() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        let toml_content = "[session]\n\
storage_key = \"draft\"\n\
format = \"json\"\n\
\n\
[[hotkeys]]\n\
key = \"b\"\n\
modifier = true\n\
action = { mark = \"bold\" }\n\
\n\
[[hotkeys]]\n\
key = \"&\"\n\
action = { insert = \"and\" }\n";

        file.write_all(toml_content.as_bytes())?;

        let config = Config::load_from(file.path())?;
        assert_eq!(config.session.storage_key, "draft");
        assert_eq!(config.session.format, StorageFormat::Json);
        assert_eq!(config.session.initial_text, "A line of text in a paragraph.");
        assert_eq!(
            config.hotkeys,
            vec![Hotkey::mark("b", "bold"), Hotkey::insert("&", "and")]
        );
        // Untouched sections keep their defaults
        assert_eq!(config.codec, CodecConfig::default());
        assert_eq!(config.schema, Schema::default());

        Ok(())
    }

    #[test]
    fn test_load_custom_schema_and_tables() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        let toml_content = "hotkeys = []\n\
\n\
[schema]\n\
default_block = \"paragraph\"\n\
marks = [\"bold\"]\n\
\n\
[[schema.blocks]]\n\
name = \"paragraph\"\n\
content = \"text\"\n\
\n\
[[schema.blocks]]\n\
name = \"note\"\n\
content = \"text\"\n\
locked = true\n\
\n\
[codec]\n\
blocks = [{ tag = \"p\", kind = \"paragraph\" }, { tag = \"aside\", kind = \"note\" }]\n\
marks = [{ tag = \"b\", kind = \"bold\" }]\n";

        file.write_all(toml_content.as_bytes())?;

        let config = Config::load_from(file.path())?;
        assert!(config.schema.block("note").is_some_and(|b| b.locked));
        assert_eq!(config.codec.blocks[1], TagMapping::new("aside", "note"));
        Ok(())
    }

    #[test]
    fn test_load_invalid_toml_returns_error() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"invalid toml [[[syntax").unwrap();

        let result = Config::load_from(file.path());
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_world_writable_config_rejected() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let file = NamedTempFile::new()?;
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o666))?;

        let err = Config::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("world-writable"));
        Ok(())
    }

    #[test]
    fn test_unknown_hotkey_mark_rejected() {
        let config = Config {
            hotkeys: vec![Hotkey::mark("h", "highlight")],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shadowed_hotkey_rejected() {
        let config = Config {
            hotkeys: vec![Hotkey::mark("b", "bold"), Hotkey::mark("B", "italic")],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unreachable"));
    }

    #[test]
    fn test_block_hotkey_across_content_models_rejected() {
        let config = Config {
            hotkeys: vec![Hotkey::block("q", "quote")],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("content models differ"));
    }

    #[test]
    fn test_unmapped_kind_rejected_for_html_storage() {
        let mut config = Config::default();
        config.codec.marks.retain(|m| m.kind != "underline");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("underline"));

        // Tree JSON keeps every kind, so this is only a warning
        config.session.format = StorageFormat::Json;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_codec_kind_rejected() {
        let mut config = Config::default();
        config.codec.marks.push(TagMapping::new("mark", "highlight"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_path_returns_some() {
        let path = Config::config_path();
        assert!(path.is_some());
        if let Some(p) = path {
            assert!(p.to_string_lossy().ends_with("scribe.toml"));
        }
    }

    #[test]
    fn test_config_serialization_round_trip() -> Result<()> {
        let config = Config::default();
        let toml_str = toml::to_string(&config)?;
        let parsed: Config = toml::from_str(&toml_str)?;
        assert_eq!(parsed, config);
        Ok(())
    }
}
