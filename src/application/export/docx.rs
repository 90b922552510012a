//! Word document export built from the Markdown rendering.

use std::io::Cursor;

use comrak::{
    Arena, parse_document,
    nodes::{AstNode, ListType, NodeValue},
};
use docx_rs::{BreakType, Docx, Paragraph, Run, RunFonts, Style, StyleType};

use super::{ExportError, html::markdown_options, markdown::render_markdown};
use crate::domain::summary::SpecSummary;

const MONOSPACE_FONT: &str = "Courier New";

#[derive(Debug, Clone, Copy, Default)]
struct InlineStyle {
    bold: bool,
    italic: bool,
    code: bool,
}

pub fn render_docx(summary: &SpecSummary) -> Result<Vec<u8>, ExportError> {
    let markdown = render_markdown(summary);
    let options = markdown_options();
    let arena = Arena::new();
    let root = parse_document(&arena, &markdown, &options);

    let mut paragraphs = Vec::new();
    for block in root.children() {
        collect_block(block, 0, &mut paragraphs);
    }

    let docx = paragraphs
        .into_iter()
        .fold(with_heading_styles(Docx::new()), Docx::add_paragraph);

    let mut buffer = Cursor::new(Vec::new());
    docx.build()
        .pack(&mut buffer)
        .map_err(|err| ExportError::Docx {
            message: err.to_string(),
        })?;
    Ok(buffer.into_inner())
}

fn with_heading_styles(docx: Docx) -> Docx {
    [("Heading1", "Heading 1", 36), ("Heading2", "Heading 2", 30), ("Heading3", "Heading 3", 26)]
        .into_iter()
        .fold(docx, |docx, (id, name, size)| {
            docx.add_style(
                Style::new(id, StyleType::Paragraph)
                    .name(name)
                    .size(size)
                    .bold(),
            )
        })
}

fn collect_block<'a>(node: &'a AstNode<'a>, depth: usize, out: &mut Vec<Paragraph>) {
    let value = node.data.borrow().value.clone();
    match value {
        NodeValue::Heading(heading) => {
            let style = format!("Heading{}", heading.level.clamp(1, 3));
            out.push(inline_paragraph(node, Paragraph::new().style(&style)));
        }
        NodeValue::Paragraph => {
            out.push(inline_paragraph(node, Paragraph::new()));
        }
        NodeValue::List(list) => {
            let mut number = list.start;
            for item in node.children() {
                let marker = match list.list_type {
                    ListType::Bullet => "\u{2022} ".to_string(),
                    ListType::Ordered => {
                        let marker = format!("{number}. ");
                        number += 1;
                        marker
                    }
                };
                collect_list_item(item, depth, &marker, out);
            }
        }
        NodeValue::CodeBlock(block) => {
            for line in block.literal.trim_end_matches('\n').lines() {
                out.push(Paragraph::new().add_run(styled_run(
                    line,
                    InlineStyle {
                        code: true,
                        ..InlineStyle::default()
                    },
                )));
            }
        }
        NodeValue::ThematicBreak => out.push(Paragraph::new()),
        NodeValue::Table(_) => {
            for row in node.children() {
                let cells: Vec<String> = row.children().map(plain_text).collect();
                out.push(Paragraph::new().add_run(Run::new().add_text(cells.join(" | "))));
            }
        }
        NodeValue::HtmlBlock(_) => {}
        _ => {
            for child in node.children() {
                collect_block(child, depth, out);
            }
        }
    }
}

fn collect_list_item<'a>(
    item: &'a AstNode<'a>,
    depth: usize,
    marker: &str,
    out: &mut Vec<Paragraph>,
) {
    let indent = "    ".repeat(depth);
    let mut first = true;
    for child in item.children() {
        let is_paragraph = matches!(child.data.borrow().value, NodeValue::Paragraph);
        if is_paragraph {
            let prefix = if first {
                format!("{indent}{marker}")
            } else {
                format!("{indent}  ")
            };
            first = false;
            let paragraph = Paragraph::new().add_run(Run::new().add_text(prefix));
            out.push(inline_paragraph(child, paragraph));
        } else {
            collect_block(child, depth + 1, out);
        }
    }
}

fn inline_paragraph<'a>(node: &'a AstNode<'a>, paragraph: Paragraph) -> Paragraph {
    let mut runs = Vec::new();
    for child in node.children() {
        collect_inline(child, InlineStyle::default(), &mut runs);
    }
    runs.into_iter().fold(paragraph, Paragraph::add_run)
}

fn collect_inline<'a>(node: &'a AstNode<'a>, style: InlineStyle, runs: &mut Vec<Run>) {
    let value = node.data.borrow().value.clone();
    match value {
        NodeValue::Text(text) => runs.push(styled_run(&text.to_string(), style)),
        NodeValue::Code(code) => runs.push(styled_run(
            &code.literal,
            InlineStyle {
                code: true,
                ..style
            },
        )),
        NodeValue::SoftBreak => runs.push(styled_run(" ", style)),
        NodeValue::LineBreak => runs.push(Run::new().add_break(BreakType::TextWrapping)),
        NodeValue::Strong => {
            for child in node.children() {
                collect_inline(child, InlineStyle { bold: true, ..style }, runs);
            }
        }
        NodeValue::Emph => {
            for child in node.children() {
                collect_inline(
                    child,
                    InlineStyle {
                        italic: true,
                        ..style
                    },
                    runs,
                );
            }
        }
        NodeValue::HtmlInline(_) => {}
        _ => {
            for child in node.children() {
                collect_inline(child, style, runs);
            }
        }
    }
}

fn styled_run(text: &str, style: InlineStyle) -> Run {
    let mut run = Run::new().add_text(text);
    if style.bold {
        run = run.bold();
    }
    if style.italic {
        run = run.italic();
    }
    if style.code {
        run = run.fonts(
            RunFonts::new()
                .ascii(MONOSPACE_FONT)
                .hi_ansi(MONOSPACE_FONT),
        );
    }
    run
}

fn plain_text<'a>(node: &'a AstNode<'a>) -> String {
    let mut text = String::new();
    for descendant in node.descendants() {
        match &descendant.data.borrow().value {
            NodeValue::Text(value) => text.push_str(value),
            NodeValue::Code(code) => text.push_str(&code.literal),
            NodeValue::SoftBreak | NodeValue::LineBreak => text.push(' '),
            _ => {}
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::export::fixtures;

    #[test]
    fn produces_zip_packaged_document() {
        let bytes = render_docx(&fixtures::summary()).expect("docx");
        assert!(bytes.len() > 100);
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn plain_text_flattens_inline_markup() {
        let options = markdown_options();
        let arena = Arena::new();
        let root = parse_document(&arena, "Use **`GET`** _now_", &options);
        assert_eq!(plain_text(root), "Use GET now");
    }
}
