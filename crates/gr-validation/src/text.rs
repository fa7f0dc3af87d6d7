//! Sentence segmentation
//!
//! Statements are the unit the hallucination detector counts and the
//! text a citation quotes. Boundaries are `.`, `!`, `?`, `;` and their
//! full-width forms; a `.` between two digits is a decimal point.

/// One sentence of a block, with byte offsets into the block text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence<'a> {
    /// Position among the block's sentences
    pub index: usize,
    /// Byte offset of the first non-blank char
    pub start: usize,
    /// Byte offset one past the terminator
    pub end: usize,
    /// Trimmed sentence text, terminator included
    pub text: &'a str,
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | ';' | '。' | '！' | '？' | '；')
}

/// Split `text` into non-empty sentences
#[must_use]
pub fn split_sentences(text: &str) -> Vec<Sentence<'_>> {
    let mut sentences = Vec::new();
    let mut segment_start = 0;
    let mut chars = text.char_indices().peekable();
    let mut prev: Option<char> = None;

    while let Some((pos, c)) = chars.next() {
        let next = chars.peek().map(|&(_, n)| n);
        let decimal_point = c == '.'
            && prev.is_some_and(|p| p.is_ascii_digit())
            && next.is_some_and(|n| n.is_ascii_digit());

        if is_terminator(c) && !decimal_point {
            let end = pos + c.len_utf8();
            push_sentence(text, segment_start, end, &mut sentences);
            segment_start = end;
        }
        prev = Some(c);
    }
    push_sentence(text, segment_start, text.len(), &mut sentences);
    sentences
}

fn push_sentence<'a>(text: &'a str, start: usize, end: usize, out: &mut Vec<Sentence<'a>>) {
    let raw = &text[start..end];
    let trimmed = raw.trim_start();
    let start = start + (raw.len() - trimmed.len());
    let trimmed = trimmed.trim_end();
    if trimmed.is_empty() || trimmed.chars().all(is_terminator) {
        return;
    }
    out.push(Sentence {
        index: out.len(),
        start,
        end: start + trimmed.len(),
        text: trimmed,
    });
}
