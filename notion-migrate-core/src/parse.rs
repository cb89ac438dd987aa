//! Default [`MarkdownParser`]: CommonMark (plus tables, strikethrough and task
//! lists) to [`BlockNode`]s via `pulldown-cmark`.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};

use crate::blocks::{Annotations, BlockKind, BlockNode, RichText, TextRun};
use crate::contract::MarkdownParser;
use crate::error::ParseError;

#[derive(Debug, Default, Clone, Copy)]
pub struct CommonMarkParser;

impl MarkdownParser for CommonMarkParser {
    fn parse(&self, markdown: &str) -> Result<Vec<BlockNode>, ParseError> {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);

        let mut builder = TreeBuilder::default();
        for event in Parser::new_ext(markdown, options) {
            builder.event(event)?;
        }
        builder.finish()
    }
}

/// An open container block collecting children.
#[derive(Debug)]
enum Frame {
    Quote,
    List { ordered: bool },
    Item { ordered: bool, checked: Option<bool> },
    Table,
    Row,
}

#[derive(Debug)]
struct Open {
    frame: Frame,
    text: RichText,
    children: Vec<BlockNode>,
    cells: Vec<RichText>,
}

#[derive(Debug, Default)]
struct TreeBuilder {
    roots: Vec<BlockNode>,
    stack: Vec<Open>,
    /// Inline text being collected for the current leaf (paragraph, heading, cell…).
    inline: Option<RichText>,
    in_paragraph: bool,
    style: Annotations,
    link: Option<String>,
    image: Option<(String, RichText)>,
    code: Option<(String, String)>,
}

impl TreeBuilder {
    fn event(&mut self, event: Event<'_>) -> Result<(), ParseError> {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag)?,
            Event::Text(text) => self.text(&text),
            Event::Code(code) => {
                let saved = self.style.code;
                self.style.code = true;
                self.text(&code);
                self.style.code = saved;
            }
            Event::SoftBreak => self.text(" "),
            Event::HardBreak => self.text("\n"),
            Event::Html(html) | Event::InlineHtml(html) => self.text(&html),
            Event::Rule => self.push_block(BlockNode::new(BlockKind::Divider)),
            Event::TaskListMarker(checked) => {
                if let Some(open) = self.stack.last_mut() {
                    if let Frame::Item { checked: slot, .. } = &mut open.frame {
                        *slot = Some(checked);
                    }
                }
            }
            Event::FootnoteReference(label) => self.text(&format!("[{label}]")),
            _ => {}
        }
        Ok(())
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => {
                self.in_paragraph = true;
                self.inline = Some(Vec::new());
            }
            Tag::Heading { .. } => self.inline = Some(Vec::new()),
            Tag::TableCell => self.inline = Some(Vec::new()),
            Tag::BlockQuote(_) => self.open(Frame::Quote),
            Tag::List(start) => self.open(Frame::List {
                ordered: start.is_some(),
            }),
            Tag::Item => {
                let ordered = matches!(
                    self.stack.last().map(|o| &o.frame),
                    Some(Frame::List { ordered: true })
                );
                self.open(Frame::Item {
                    ordered,
                    checked: None,
                });
            }
            Tag::Table(_) => self.open(Frame::Table),
            Tag::TableHead | Tag::TableRow => self.open(Frame::Row),
            Tag::HtmlBlock => self.inline = Some(Vec::new()),
            Tag::CodeBlock(kind) => {
                let language = match kind {
                    CodeBlockKind::Fenced(info) => {
                        info.split_whitespace().next().unwrap_or("").to_string()
                    }
                    CodeBlockKind::Indented => String::new(),
                };
                self.code = Some((language, String::new()));
            }
            Tag::Emphasis => self.style.italic = true,
            Tag::Strong => self.style.bold = true,
            Tag::Strikethrough => self.style.strikethrough = true,
            Tag::Link { dest_url, .. } => self.link = Some(dest_url.to_string()),
            Tag::Image { dest_url, .. } => self.image = Some((dest_url.to_string(), Vec::new())),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) -> Result<(), ParseError> {
        match tag {
            TagEnd::Paragraph => {
                self.in_paragraph = false;
                let text = self.inline.take().unwrap_or_default();
                self.close_paragraph(text);
            }
            TagEnd::Heading(level) => {
                let text = self.inline.take().unwrap_or_default();
                self.push_block(BlockNode::new(BlockKind::Heading {
                    level: heading_level(level),
                    text,
                }));
            }
            TagEnd::TableCell => {
                let text = self.inline.take().unwrap_or_default();
                match self.stack.last_mut() {
                    Some(Open {
                        frame: Frame::Row,
                        cells,
                        ..
                    }) => cells.push(text),
                    _ => return Err(ParseError("table cell outside of a row".into())),
                }
            }
            TagEnd::TableHead | TagEnd::TableRow => self.close_row()?,
            TagEnd::HtmlBlock => {
                let text = self.inline.take().unwrap_or_default();
                if !text.is_empty() {
                    self.push_block(BlockNode::new(BlockKind::Paragraph { text }));
                }
            }
            TagEnd::Table => {
                let open = self.close(|f| matches!(f, Frame::Table))?;
                let width = open
                    .children
                    .iter()
                    .map(|row| match &row.kind {
                        BlockKind::TableRow { cells } => cells.len(),
                        _ => 0,
                    })
                    .max()
                    .unwrap_or(0);
                self.push_block(BlockNode::with_children(
                    BlockKind::Table {
                        width,
                        has_column_header: true,
                    },
                    open.children,
                ));
            }
            TagEnd::BlockQuote(_) => {
                let open = self.close(|f| matches!(f, Frame::Quote))?;
                self.push_block(BlockNode::with_children(
                    BlockKind::Quote { text: open.text },
                    open.children,
                ));
            }
            TagEnd::List(_) => {
                let open = self.close(|f| matches!(f, Frame::List { .. }))?;
                for item in open.children {
                    self.push_block(item);
                }
            }
            TagEnd::Item => {
                let open = self.close(|f| matches!(f, Frame::Item { .. }))?;
                let mut text = open.text;
                if let Some(loose) = self.inline.take() {
                    text.extend(loose);
                }
                let kind = match open.frame {
                    Frame::Item {
                        checked: Some(checked),
                        ..
                    } => BlockKind::ToDo { text, checked },
                    Frame::Item { ordered: true, .. } => BlockKind::NumberedListItem { text },
                    _ => BlockKind::BulletedListItem { text },
                };
                self.push_block(BlockNode::with_children(kind, open.children));
            }
            TagEnd::CodeBlock => {
                if let Some((language, mut body)) = self.code.take() {
                    if body.ends_with('\n') {
                        body.pop();
                    }
                    self.push_block(BlockNode::new(BlockKind::Code {
                        text: vec![TextRun::plain(body)],
                        language,
                    }));
                }
            }
            TagEnd::Emphasis => self.style.italic = false,
            TagEnd::Strong => self.style.bold = false,
            TagEnd::Strikethrough => self.style.strikethrough = false,
            TagEnd::Link => self.link = None,
            TagEnd::Image => {
                // Images are lifted out of their paragraph as blocks of their own:
                // the text before the image closes as one paragraph and the text
                // after it opens another.
                if let Some((url, caption)) = self.image.take() {
                    if self.in_paragraph {
                        let before = self.inline.replace(Vec::new()).unwrap_or_default();
                        self.close_paragraph(before);
                    }
                    self.push_block(BlockNode::new(BlockKind::Image { url, caption }));
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        if let Some((_, body)) = &mut self.code {
            body.push_str(text);
            return;
        }
        let run = TextRun {
            content: text.to_string(),
            link: self.link.clone(),
            annotations: self.style.clone(),
        };
        if let Some((_, caption)) = &mut self.image {
            caption.push(run);
            return;
        }
        // Tight list items carry their text without a paragraph.
        let target = self.inline.get_or_insert_with(Vec::new);
        match target.last_mut() {
            Some(last) if last.link == run.link && last.annotations == run.annotations => {
                last.content.push_str(&run.content)
            }
            _ => target.push(run),
        }
    }

    /// The first paragraph of a list item or quote becomes its own text.
    fn close_paragraph(&mut self, mut text: RichText) {
        trim_edges(&mut text);
        if let Some(open) = self.stack.last_mut() {
            if matches!(open.frame, Frame::Item { .. } | Frame::Quote)
                && open.text.is_empty()
                && open.children.is_empty()
            {
                open.text = text;
                return;
            }
        }
        if !text.is_empty() {
            self.push_block(BlockNode::new(BlockKind::Paragraph { text }));
        }
    }

    fn open(&mut self, frame: Frame) {
        // Text collected for a tight list item belongs to it, not to the new child.
        if let Some(inline) = self.inline.take() {
            if let Some(open) = self.stack.last_mut() {
                open.text.extend(inline);
            }
        }
        self.stack.push(Open {
            frame,
            text: Vec::new(),
            children: Vec::new(),
            cells: Vec::new(),
        });
    }

    fn close(&mut self, expected: impl Fn(&Frame) -> bool) -> Result<Open, ParseError> {
        match self.stack.pop() {
            Some(open) if expected(&open.frame) => Ok(open),
            Some(open) => Err(ParseError(format!("unbalanced block: {:?}", open.frame))),
            None => Err(ParseError("unbalanced block: empty stack".into())),
        }
    }

    fn close_row(&mut self) -> Result<(), ParseError> {
        let open = self.close(|f| matches!(f, Frame::Row))?;
        self.push_block(BlockNode::new(BlockKind::TableRow { cells: open.cells }));
        Ok(())
    }

    fn push_block(&mut self, block: BlockNode) {
        match self.stack.last_mut() {
            Some(open) => open.children.push(block),
            None => self.roots.push(block),
        }
    }

    fn finish(mut self) -> Result<Vec<BlockNode>, ParseError> {
        if let Some(open) = self.stack.pop() {
            return Err(ParseError(format!("unclosed block: {:?}", open.frame)));
        }
        if let Some(text) = self.inline.take() {
            if !text.is_empty() {
                self.roots.push(BlockNode::new(BlockKind::Paragraph { text }));
            }
        }
        Ok(self.roots)
    }
}

/// Drop whitespace left at the edges of a paragraph split around an image.
/// Inline code keeps its spaces.
fn trim_edges(text: &mut RichText) {
    if let Some(first) = text.first_mut().filter(|run| !run.annotations.code) {
        first.content = first.content.trim_start().to_string();
    }
    if let Some(last) = text.last_mut().filter(|run| !run.annotations.code) {
        last.content = last.content.trim_end().to_string();
    }
    text.retain(|run| !run.content.is_empty());
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}
