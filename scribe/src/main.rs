//! Scribe - Rich-text engine command line

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use scribe_core::{json, Config, DocumentTree, Engine, KeyEvent, Selection};
use scribe_session::{EditorSession, KeyOutcome, MemoryStore};
use std::path::{Path, PathBuf};

/// Convert documents and replay editing keys against them
#[derive(Parser, Debug)]
#[command(name = "scribe")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file to use instead of the platform default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read a document and print it in another format
    Convert {
        /// HTML, tree JSON (.json) or Markdown (.md, .markdown)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(long, value_enum, default_value_t = OutputFormat::Html)]
        to: OutputFormat,
    },
    /// Feed key events to a document and print the resulting HTML
    Replay {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Comma-separated keys, e.g. "ctrl+b,&"; write `comma` and `space`
        /// for those two keys
        #[arg(long)]
        keys: String,

        /// Where the selection starts
        #[arg(long, value_enum, default_value_t = SelectMode::All)]
        select: SelectMode,
    },
    /// Validate a config file
    CheckConfig {
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Html,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SelectMode {
    /// The whole document
    All,
    /// A cursor at the end
    End,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();

    match args.command {
        Command::CheckConfig { path } => check_config(path.or(args.config).as_deref()),
        Command::Convert { file, to } => {
            let engine = Engine::new(&load_config(args.config.as_deref())?)?;
            let tree = load_document(&engine, &file)?;
            let output = match to {
                OutputFormat::Html => engine.serialize(&tree),
                OutputFormat::Json => json::to_string(&tree)?,
            };
            println!("{output}");
            Ok(())
        }
        Command::Replay { file, keys, select } => {
            let engine = Engine::new(&load_config(args.config.as_deref())?)?;
            let output = replay(engine, &file, &keys, select)?;
            println!("{output}");
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load().context("Failed to load configuration"),
    }
}

fn check_config(path: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;
    let source = match path {
        Some(path) => path.display().to_string(),
        None => Config::config_path()
            .filter(|p| p.exists())
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "built-in defaults".to_string()),
    };
    println!(
        "{source}: ok ({} block kinds, {} marks, {} hotkeys)",
        config.schema.blocks.len(),
        config.schema.marks.len(),
        config.hotkeys.len()
    );
    Ok(())
}

/// Read a document, picking the parser from the file extension
fn load_document(engine: &Engine, path: &Path) -> Result<DocumentTree> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read document: {}", path.display()))?;

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    let tree = match extension.as_deref() {
        Some("json") => json::from_str(&content, engine.schema())?,
        Some("md") | Some("markdown") => parse_markdown(engine, &content)?,
        _ => engine.deserialize(&content)?,
    };
    log::debug!("loaded {} blocks from {}", tree.nodes.len(), path.display());
    Ok(tree)
}

#[cfg(feature = "markdown")]
fn parse_markdown(engine: &Engine, content: &str) -> Result<DocumentTree> {
    Ok(scribe_core::markdown::parse(content, engine.schema())?)
}

#[cfg(not(feature = "markdown"))]
fn parse_markdown(_engine: &Engine, _content: &str) -> Result<DocumentTree> {
    anyhow::bail!("Markdown input needs the `markdown` feature")
}

fn replay(engine: Engine, file: &Path, keys: &str, select: SelectMode) -> Result<String> {
    let tree = load_document(&engine, file)?;
    let key = engine.config().session.storage_key.clone();
    let blob = engine.persist(&tree)?;

    let mut session = EditorSession::open(engine, MemoryStore::new().with_entry(key, blob))?;
    let selection = match select {
        SelectMode::All => Selection::all(session.tree()),
        SelectMode::End => Selection::end_of(session.tree()),
    };
    session.select(selection)?;

    for spec in keys.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let event = parse_key(spec);
        let outcome = session
            .handle_key(&event)
            .with_context(|| format!("Key {event} failed"))?;
        if outcome == KeyOutcome::Ignored {
            log::warn!("key {event} had no effect");
        }
    }

    Ok(session.to_html())
}

/// Parse one `--keys` entry, expanding the names of keys the list syntax
/// cannot hold
fn parse_key(spec: &str) -> KeyEvent {
    let mut event = KeyEvent::parse(spec);
    match event.key.as_str() {
        "comma" => event.key = ",".to_string(),
        "space" => event.key = " ".to_string(),
        _ => {}
    }
    event
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn engine() -> Engine {
        Engine::new(&Config::default()).unwrap()
    }

    fn write_temp(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from(["scribe", "replay", "doc.html", "--keys", "ctrl+b,&"]);
        match args.command {
            Command::Replay { keys, select, .. } => {
                assert_eq!(keys, "ctrl+b,&");
                assert_eq!(select, SelectMode::All);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_replay_bold_all() -> Result<()> {
        let file = write_temp(".html", "<p>Hello</p>");
        let html = replay(engine(), file.path(), "ctrl+b", SelectMode::All)?;
        assert_eq!(html, "<p><strong>Hello</strong></p>");
        Ok(())
    }

    #[test]
    fn test_replay_typing_at_end() -> Result<()> {
        let file = write_temp(".html", "<p>salt</p>");
        let html = replay(engine(), file.path(), "&, p", SelectMode::End)?;
        assert_eq!(html, "<p>saltandp</p>");
        Ok(())
    }

    #[test]
    fn test_parse_key_names() {
        assert_eq!(parse_key("comma"), KeyEvent::plain(","));
        assert_eq!(parse_key("space"), KeyEvent::plain(" "));
        assert_eq!(parse_key("ctrl+comma"), KeyEvent::ctrl(","));
        assert_eq!(parse_key("&"), KeyEvent::plain("&"));
    }

    #[test]
    fn test_replay_types_comma_and_space() -> Result<()> {
        let file = write_temp(".html", "<p>a</p>");
        let html = replay(engine(), file.path(), "comma, space, b", SelectMode::End)?;
        assert_eq!(html, "<p>a, b</p>");
        Ok(())
    }

    #[test]
    fn test_load_document_by_extension() -> Result<()> {
        let engine = engine();
        let html = write_temp(".html", "<p>x</p>");
        let tree = load_document(&engine, html.path())?;

        let as_json = write_temp(".json", &json::to_string(&tree)?);
        assert_eq!(load_document(&engine, as_json.path())?, tree);

        #[cfg(feature = "markdown")]
        {
            let md = write_temp(".md", "x\n");
            assert_eq!(load_document(&engine, md.path())?, tree);
        }
        Ok(())
    }
}
