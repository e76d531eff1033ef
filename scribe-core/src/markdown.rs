//! Markdown import
//!
//! Markdown is mapped onto the same fragments the HTML codec produces, so
//! the resulting tree goes through the same schema assembly.

use pulldown_cmark::{Event, Options, Parser, Tag};

use crate::codec::{assemble, Fragment};
use crate::doc::DocumentTree;
use crate::error::Result;
use crate::schema::Schema;

const QUOTE: &str = "quote";
const CODE: &str = "code";
const BOLD: &str = "bold";
const ITALIC: &str = "italic";
const STRIKETHROUGH: &str = "strikethrough";

enum Frame {
    Root,
    Block(String),
    CodeBlock,
    Mark(&'static str),
    Item,
    /// Structure we do not model; children are lifted into the parent
    Transparent,
}

struct Open {
    frame: Frame,
    children: Vec<Fragment>,
}

impl Open {
    fn new(frame: Frame) -> Self {
        Self {
            frame,
            children: Vec::new(),
        }
    }

    fn push_text(&mut self, text: String) {
        if let Some(Fragment::Text(last)) = self.children.last_mut() {
            last.push_str(&text);
        } else {
            self.children.push(Fragment::Text(text));
        }
    }
}

/// Parse Markdown into a tree
pub fn parse(source: &str, schema: &Schema) -> Result<DocumentTree> {
    let mut stack = vec![Open::new(Frame::Root)];

    for event in Parser::new_ext(source, Options::ENABLE_STRIKETHROUGH) {
        match event {
            Event::Start(tag) => stack.push(Open::new(frame_for(&tag, schema))),
            Event::End(_) => {
                if stack.len() > 1 {
                    close_top(&mut stack, schema);
                }
            }
            Event::Text(text) => top(&mut stack).push_text(text.into_string()),
            Event::Code(code) => top(&mut stack).children.push(Fragment::Mark {
                kind: CODE.to_string(),
                children: vec![Fragment::Text(code.into_string())],
            }),
            Event::SoftBreak => top(&mut stack).push_text(" ".to_string()),
            Event::HardBreak => top(&mut stack).push_text("\n".to_string()),
            _ => {}
        }
    }

    while stack.len() > 1 {
        close_top(&mut stack, schema);
    }
    let fragments = stack.pop().map(|root| root.children).unwrap_or_default();
    assemble(fragments, schema)
}

fn frame_for(tag: &Tag<'_>, schema: &Schema) -> Frame {
    match tag {
        Tag::Paragraph | Tag::Heading { .. } => Frame::Block(schema.default_block.clone()),
        Tag::BlockQuote(_) => Frame::Block(QUOTE.to_string()),
        Tag::CodeBlock(_) => Frame::CodeBlock,
        Tag::Strong => Frame::Mark(BOLD),
        Tag::Emphasis => Frame::Mark(ITALIC),
        Tag::Strikethrough => Frame::Mark(STRIKETHROUGH),
        Tag::Item => Frame::Item,
        _ => Frame::Transparent,
    }
}

fn top(stack: &mut [Open]) -> &mut Open {
    let last = stack.len() - 1;
    &mut stack[last]
}

fn close_top(stack: &mut Vec<Open>, schema: &Schema) {
    let Some(open) = stack.pop() else {
        return;
    };
    let Some(parent) = stack.last_mut() else {
        return;
    };

    let Open {
        frame,
        mut children,
    } = open;
    match frame {
        Frame::Block(kind) => parent.children.push(block(kind, children)),
        Frame::CodeBlock => {
            if let Some(Fragment::Text(last)) = children.last_mut() {
                if last.ends_with('\n') {
                    last.pop();
                }
            }
            parent.children.push(block(CODE.to_string(), children));
        }
        Frame::Mark(kind) => parent.children.push(Fragment::Mark {
            kind: kind.to_string(),
            children,
        }),
        Frame::Item => {
            if children.iter().any(|c| matches!(c, Fragment::Block { .. })) {
                parent.children.extend(children);
            } else {
                parent
                    .children
                    .push(block(schema.default_block.clone(), children));
            }
        }
        Frame::Root | Frame::Transparent => parent.children.extend(children),
    }
}

fn block(kind: String, children: Vec<Fragment>) -> Fragment {
    Fragment::Block {
        kind,
        data: Default::default(),
        children,
    }
}
