//! Reads the HTML produced by [`crate::markup::render`] back into styled
//! blocks the desktop view can draw. Only the tags the renderer emits are
//! understood; anything else is dropped.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Style {
    pub strong: bool,
    pub emphasis: bool,
    pub code: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inline {
    pub text: String,
    pub style: Style,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Line,
    Heading,
    ListItem,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    pub inlines: Vec<Inline>,
}

impl Block {
    fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            inlines: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn plain_text(&self) -> String {
        self.inlines.iter().map(|i| i.text.as_str()).collect()
    }
}

struct Builder {
    blocks: Vec<Block>,
    current: Block,
    style: Style,
    after_block: bool,
}

impl Builder {
    fn push_current(&mut self, next: BlockKind) {
        let done = std::mem::replace(&mut self.current, Block::new(next));
        self.blocks.push(done);
    }

    fn text(&mut self, raw: &str) {
        if raw.is_empty() {
            return;
        }
        self.after_block = false;
        let text = html_escape::decode_html_entities(raw).into_owned();
        match self.current.inlines.last_mut() {
            Some(last) if last.style == self.style => last.text.push_str(&text),
            _ => self.current.inlines.push(Inline {
                text,
                style: self.style,
            }),
        }
    }

    fn open_block(&mut self, kind: BlockKind) {
        if self.current.inlines.is_empty() {
            self.current = Block::new(kind);
        } else {
            self.push_current(kind);
        }
        self.after_block = false;
    }

    fn tag(&mut self, name: &str) {
        match name {
            "br" => {
                // A break right after a heading or list only ends that block.
                if self.after_block && self.current.inlines.is_empty() {
                    self.after_block = false;
                } else {
                    self.push_current(BlockKind::Line);
                }
            }
            "h3" => self.open_block(BlockKind::Heading),
            "li" => self.open_block(BlockKind::ListItem),
            "/h3" | "/li" => {
                self.push_current(BlockKind::Line);
                self.after_block = true;
            }
            "strong" => self.style.strong = true,
            "/strong" => self.style.strong = false,
            "em" => self.style.emphasis = true,
            "/em" => self.style.emphasis = false,
            "code" => self.style.code = true,
            "/code" => self.style.code = false,
            _ => {}
        }
    }

    fn finish(mut self) -> Vec<Block> {
        if !self.current.inlines.is_empty() {
            self.push_current(BlockKind::Line);
        }
        self.blocks
    }
}

/// Split rendered markup into blocks.
pub fn parse(markup: &str) -> Vec<Block> {
    let mut builder = Builder {
        blocks: Vec::new(),
        current: Block::new(BlockKind::Line),
        style: Style::default(),
        after_block: false,
    };

    let mut rest = markup;
    while let Some(open) = rest.find('<') {
        builder.text(&rest[..open]);
        let Some(close) = rest[open..].find('>') else {
            builder.text(&rest[open..]);
            return builder.finish();
        };
        let tag = &rest[open + 1..open + close];
        let name = tag.split_whitespace().next().unwrap_or_default();
        builder.tag(name);
        rest = &rest[open + close + 1..];
    }
    builder.text(rest);
    builder.finish()
}
