//! Markdown rendering of a document and its blocks.
//!
//! Output is deterministic for a given document and block list; change
//! detection relies on that.

use crate::contract::{Block, Document};

/// Where a rendered document came from, shown in its header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceInfo {
    Container(String),
    Standalone(String),
}

impl SourceInfo {
    fn label(&self) -> String {
        match self {
            SourceInfo::Container(name) => format!("数据库: {name}"),
            SourceInfo::Standalone(title) => format!("独立页面: {title}"),
        }
    }
}

pub fn render_document(
    document: &Document,
    title: &str,
    source: &SourceInfo,
    blocks: &[Block],
) -> String {
    let mut out = format!("# {title}\n\n");
    out.push_str(&format!("**来源**: {}\n\n", source.label()));
    if let Some(created) = document.created_time.as_deref().filter(|s| !s.is_empty()) {
        out.push_str(&format!("**创建时间**: {created}\n\n"));
    }
    if let Some(edited) = document
        .last_edited_time
        .as_deref()
        .filter(|s| !s.is_empty())
    {
        out.push_str(&format!("**最后编辑**: {edited}\n\n"));
    }
    out.push_str("---\n\n");
    for block in blocks {
        out.push_str(&render_block(block));
    }
    out
}

pub fn render_block(block: &Block) -> String {
    match block {
        Block::Paragraph(text) => format!("{text}\n\n"),
        Block::Heading1(text) => format!("# {text}\n\n"),
        Block::Heading2(text) => format!("## {text}\n\n"),
        Block::Heading3(text) => format!("### {text}\n\n"),
        Block::BulletedListItem(text) => format!("- {text}\n"),
        Block::NumberedListItem(text) => format!("1. {text}\n"),
        Block::Code { language, text } => format!("```{language}\n{text}\n```\n\n"),
        Block::Quote(text) => format!("> {text}\n\n"),
        Block::Callout { emoji, text } => {
            let icon = emoji
                .as_deref()
                .map(|e| format!("{e} "))
                .unwrap_or_default();
            format!("**{icon}提示**: {text}\n\n")
        }
        Block::Unsupported(_) => String::new(),
    }
}
