//! Minimal HTML handling for H5P rich-text fields.
//!
//! H5P editors store fragments such as `<p>Wear <strong>goggles</strong>.</p>`
//! rather than whole documents. We never need a DOM: a flat token stream that
//! reproduces the input byte-for-byte is enough to keep every tag intact while
//! the text between tags is replaced.

use regex::Regex;
use std::sync::LazyLock;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--[\s\S]*?-->|</?[a-zA-Z][^<>]*>|<![^<>]*>").expect("valid tag regex")
});

static TAG_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<\s*(/?)\s*([a-zA-Z][a-zA-Z0-9-]*)").expect("valid tag name regex")
});

static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").expect("valid entity regex")
});

/// Elements that start a translation block when they appear at the top level
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "li", "ol", "ul", "h1", "h2", "h3", "h4", "h5", "h6", "div", "blockquote",
    "table", "tr", "td", "th", "dl", "dt", "dd", "pre", "figure", "figcaption", "section",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Tag(String),
    Text(String),
}

impl Token {
    pub fn as_str(&self) -> &str {
        match self {
            Token::Tag(s) | Token::Text(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    /// A top-level block element and everything nested in it
    Element(String),
    /// Text and inline markup between block elements
    Inline,
    /// Whitespace between blocks, kept verbatim
    Separator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    pub html: String,
}

impl Block {
    pub fn is_separator(&self) -> bool {
        self.kind == BlockKind::Separator
    }
}

/// A parsed start or end tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInfo {
    pub name: String,
    pub closing: bool,
    pub self_closing: bool,
}

pub fn tag_info(tag: &str) -> Option<TagInfo> {
    let caps = TAG_NAME_RE.captures(tag)?;
    Some(TagInfo {
        name: caps[2].to_lowercase(),
        closing: !caps[1].is_empty(),
        self_closing: tag.trim_end_matches('>').trim_end().ends_with('/'),
    })
}

/// True when the value carries at least one start or end tag
pub fn looks_like_html(value: &str) -> bool {
    TAG_RE
        .find_iter(value)
        .any(|m| tag_info(m.as_str()).is_some())
}

/// Split an HTML fragment into tags and the text between them
pub fn tokenize(html: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut last = 0;

    for m in TAG_RE.find_iter(html) {
        if m.start() > last {
            tokens.push(Token::Text(html[last..m.start()].to_string()));
        }
        tokens.push(Token::Tag(m.as_str().to_string()));
        last = m.end();
    }
    if last < html.len() {
        tokens.push(Token::Text(html[last..].to_string()));
    }

    tokens
}

/// Group a fragment into top-level blocks.
///
/// Nested block elements stay inside their outermost block so that no text
/// is ever sent to the model twice.
pub fn split_blocks(html: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut inline = String::new();
    let mut current: Option<(String, String, usize)> = None;

    for token in tokenize(html) {
        if let Some((name, buffer, depth)) = current.as_mut() {
            buffer.push_str(token.as_str());
            if let Token::Tag(tag) = &token {
                if let Some(info) = tag_info(tag) {
                    if info.name == *name && !info.self_closing {
                        if info.closing {
                            *depth -= 1;
                        } else {
                            *depth += 1;
                        }
                    }
                }
            }
            if *depth == 0 {
                if let Some((name, buffer, _)) = current.take() {
                    blocks.push(Block { kind: BlockKind::Element(name), html: buffer });
                }
            }
            continue;
        }

        let starts_block = match &token {
            Token::Tag(tag) => tag_info(tag).filter(|info| {
                !info.closing && !info.self_closing && BLOCK_ELEMENTS.contains(&info.name.as_str())
            }),
            Token::Text(_) => None,
        };

        match starts_block {
            Some(info) => {
                flush_inline(&mut inline, &mut blocks);
                current = Some((info.name, token.as_str().to_string(), 1));
            }
            None => inline.push_str(token.as_str()),
        }
    }

    // An unclosed block runs to the end of the fragment
    if let Some((name, buffer, _)) = current.take() {
        blocks.push(Block { kind: BlockKind::Element(name), html: buffer });
    }
    flush_inline(&mut inline, &mut blocks);

    blocks
}

fn flush_inline(inline: &mut String, blocks: &mut Vec<Block>) {
    if inline.is_empty() {
        return;
    }
    let kind = if inline.trim().is_empty() {
        BlockKind::Separator
    } else {
        BlockKind::Inline
    };
    blocks.push(Block { kind, html: std::mem::take(inline) });
}

/// Text a reader would see: tags removed, entities decoded, whitespace collapsed
pub fn visible_text(html: &str) -> String {
    let mut text = String::new();
    for token in tokenize(html) {
        match token {
            Token::Text(t) => text.push_str(&t),
            // Tags separate words even when the source has no whitespace
            Token::Tag(_) => text.push(' '),
        }
    }
    let decoded = decode_entities(&text);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Tag names in document order, closing tags prefixed with `/`
pub fn tag_signature(html: &str) -> Vec<String> {
    tokenize(html)
        .iter()
        .filter_map(|token| match token {
            Token::Tag(tag) => tag_info(tag),
            Token::Text(_) => None,
        })
        .map(|info| {
            if info.closing {
                format!("/{}", info.name)
            } else {
                info.name
            }
        })
        .collect()
}

/// Decode the named entities H5P editors emit plus numeric references
pub fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &regex::Captures| {
            let entity = &caps[1];
            let decoded = match entity {
                "nbsp" => Some('\u{a0}'),
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "shy" => Some('\u{ad}'),
                "ndash" => Some('–'),
                "mdash" => Some('—'),
                "hellip" => Some('…'),
                _ if entity.starts_with("#x") || entity.starts_with("#X") => {
                    u32::from_str_radix(&entity[2..], 16).ok().and_then(char::from_u32)
                }
                _ if entity.starts_with('#') => {
                    entity[1..].parse::<u32>().ok().and_then(char::from_u32)
                }
                _ => None,
            };
            decoded.map_or_else(|| caps[0].to_string(), |c| c.to_string())
        })
        .into_owned()
}
