//! Minimal SQL lexer shared by the sanitizer and the validator.
//!
//! Splits text into words, numbers, quoted runs, comments, punctuation and
//! whitespace without interpreting any of it. Every byte of the input belongs
//! to exactly one token, so joining the token texts reproduces the input.

/// Kind of a lexed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Word,
    Number,
    /// A quoted run, tagged with its opening character (`'`, `"`, `` ` `` or `[`).
    Quoted(char),
    Comment,
    Punct,
    Whitespace,
}

/// A token borrowing its text from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    /// Byte offset of the token in the input.
    pub start: usize,
}

impl<'a> Token<'a> {
    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }

    /// Case-insensitive keyword comparison for word tokens.
    pub fn is_word(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }

    pub fn is_punct(&self, ch: char) -> bool {
        self.kind == TokenKind::Punct && self.text.starts_with(ch)
    }

    /// True for tokens that carry no SQL meaning.
    pub fn is_trivia(&self) -> bool {
        matches!(self.kind, TokenKind::Whitespace | TokenKind::Comment)
    }
}

/// A construct left open at the end of the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Unterminated {
    Quote(char),
    BlockComment,
}

/// Result of lexing a piece of text.
#[derive(Debug, Clone)]
pub(crate) struct Lexed<'a> {
    pub tokens: Vec<Token<'a>>,
    pub unterminated: Option<Unterminated>,
}

impl<'a> Lexed<'a> {
    /// Tokens that are neither whitespace nor comments.
    pub fn significant(&self) -> impl Iterator<Item = &Token<'a>> + '_ {
        self.tokens.iter().filter(|t| !t.is_trivia())
    }

    /// Returns tokens paired with the parenthesis depth they appear at.
    ///
    /// The depth of a `(` is the depth outside it; its matching `)` has the same depth.
    /// Depth saturates at zero for stray closing parentheses.
    pub fn with_depth(&self) -> Vec<(usize, Token<'a>)> {
        let mut depth = 0usize;
        self.tokens
            .iter()
            .map(|token| {
                if token.is_punct('(') {
                    depth += 1;
                    (depth - 1, *token)
                } else if token.is_punct(')') {
                    depth = depth.saturating_sub(1);
                    (depth, *token)
                } else {
                    (depth, *token)
                }
            })
            .collect()
    }
}

fn closing_quote(open: char) -> Option<char> {
    match open {
        '\'' | '"' | '`' => Some(open),
        '[' => Some(']'),
        _ => None,
    }
}

fn is_word_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_word_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Lexes `input` into tokens.
pub(crate) fn tokenize(input: &str) -> Lexed<'_> {
    let mut tokens = Vec::new();
    let mut unterminated = None;
    let mut chars = input.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        let next = chars.peek().map(|(_, n)| *n);

        let kind = if c.is_whitespace() {
            while chars.next_if(|(_, n)| n.is_whitespace()).is_some() {}
            TokenKind::Whitespace
        } else if c == '-' && next == Some('-') {
            while chars.next_if(|(_, n)| *n != '\n').is_some() {}
            TokenKind::Comment
        } else if c == '/' && next == Some('*') {
            chars.next();
            let mut closed = false;
            let mut prev = '\0';
            for (_, n) in chars.by_ref() {
                if prev == '*' && n == '/' {
                    closed = true;
                    break;
                }
                prev = n;
            }
            if !closed {
                unterminated = Some(Unterminated::BlockComment);
            }
            TokenKind::Comment
        } else if let Some(close) = closing_quote(c) {
            let mut closed = false;
            while let Some((_, n)) = chars.next() {
                if n == close {
                    // A doubled quote is an escaped quote character.
                    if close != ']' && chars.next_if(|(_, m)| *m == close).is_some() {
                        continue;
                    }
                    closed = true;
                    break;
                }
            }
            if !closed {
                unterminated = Some(Unterminated::Quote(c));
            }
            TokenKind::Quoted(c)
        } else if c.is_ascii_digit() || (c == '.' && next.is_some_and(|n| n.is_ascii_digit())) {
            while chars
                .next_if(|(_, n)| n.is_ascii_alphanumeric() || *n == '.')
                .is_some()
            {}
            TokenKind::Number
        } else if is_word_start(c) {
            while chars.next_if(|(_, n)| is_word_continue(*n)).is_some() {}
            TokenKind::Word
        } else {
            TokenKind::Punct
        };

        let end = chars.peek().map(|(i, _)| *i).unwrap_or(input.len());
        tokens.push(Token {
            kind,
            text: &input[start..end],
            start,
        });
    }

    Lexed {
        tokens,
        unterminated,
    }
}
