use regex::Regex;
use std::sync::LazyLock;

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)(https?://|ftp://|www\.|mailto:)\S*$").expect("valid url regex")
});

static LIBRARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^H5P(Editor)?\.[A-Za-z0-9]+( \d+\.\d+)?$").expect("valid library regex")
});

static COLOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#([0-9a-fA-F]{3}|[0-9a-fA-F]{6}|[0-9a-fA-F]{8})$").expect("valid color regex"));

static DOTTED_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w\.\w").expect("valid dotted token regex"));

/// Split text into sentences, keeping the closing punctuation
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        current.push(ch);

        let ends_sentence = match ch {
            // CJK full stops are not followed by a space
            '。' | '！' | '？' => true,
            '.' | '!' | '?' | '…' => chars.peek().is_none_or(|next| next.is_whitespace()),
            _ => false,
        };

        if ends_sentence {
            let sentence = current.trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            current.clear();
        }
    }

    if !current.trim().is_empty() {
        sentences.push(current.trim().to_string());
    }

    sentences
}

/// Pack text into pieces of at most `max_chars` characters.
///
/// Sentences are kept whole where possible; an overlong sentence is split at
/// word boundaries and an overlong word becomes a piece of its own.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if char_len(trimmed) <= max_chars {
        return vec![trimmed.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in split_sentences(trimmed) {
        if char_len(&sentence) > max_chars {
            flush(&mut current, &mut chunks);
            chunks.extend(split_by_words(&sentence, max_chars));
            continue;
        }

        if current.is_empty() {
            current = sentence;
        } else if char_len(&current) + 1 + char_len(&sentence) <= max_chars {
            current.push(' ');
            current.push_str(&sentence);
        } else {
            flush(&mut current, &mut chunks);
            current = sentence;
        }
    }
    flush(&mut current, &mut chunks);

    chunks
}

/// Split a sentence at word boundaries when no punctuation is available
fn split_by_words(text: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if !current.is_empty() && char_len(&current) + 1 + char_len(word) > max_chars {
            flush(&mut current, &mut pieces);
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    flush(&mut current, &mut pieces);

    pieces
}

fn flush(current: &mut String, chunks: &mut Vec<String>) {
    if !current.is_empty() {
        chunks.push(std::mem::take(current));
    }
}

pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Length in Latin-letter equivalents.
///
/// Han, kana and Hangul characters each carry roughly a word of meaning, so
/// they count three times when comparing a source with its translation.
pub fn weighted_len(text: &str) -> usize {
    text.chars().map(|c| if is_dense_script(c) { 3 } else { 1 }).sum()
}

fn is_dense_script(c: char) -> bool {
    matches!(c,
        '\u{1100}'..='\u{11FF}'
        | '\u{3040}'..='\u{30FF}'
        | '\u{3130}'..='\u{318F}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{4E00}'..='\u{9FFF}'
        | '\u{AC00}'..='\u{D7AF}'
        | '\u{F900}'..='\u{FAFF}'
    )
}

/// Split into (leading whitespace, core, trailing whitespace)
pub fn split_outer_whitespace(text: &str) -> (&str, &str, &str) {
    let core_start = text.len() - text.trim_start().len();
    let core_end = text.trim_end().len();
    if core_start >= core_end {
        return (text, "", "");
    }
    (&text[..core_start], &text[core_start..core_end], &text[core_end..])
}

/// Whether a string is natural-language text worth sending to the model
pub fn should_translate(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() || !trimmed.chars().any(char::is_alphabetic) {
        return false;
    }
    if URL_RE.is_match(trimmed) || LIBRARY_RE.is_match(trimmed) || COLOR_RE.is_match(trimmed) {
        return false;
    }

    // File names, paths and identifiers: a single token glued with _ / or .
    let single_token = !trimmed.contains(char::is_whitespace);
    if single_token
        && (trimmed.contains('_') || trimmed.contains('/') || DOTTED_TOKEN_RE.is_match(trimmed))
    {
        return false;
    }

    true
}
