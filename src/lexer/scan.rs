//! Character-level scanning: identifiers, literals, comments, punctuation,
//! and the preprocessor directives (`#if`/`#else`/`#endif`, `#line`,
//! `#file`, `#asm`, `#pragma`) that are resolved during this same pass
//! (spec §4.1).

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::token::{is_keyword, Position, Token, TokenKind};

use super::constexpr::eval_const_expr;

const MAX_IDENT_LEN: usize = 15;

/// Longest-match punctuation tokens, tried before falling back to a single
/// character (spec §4.2 grammar: `|| && == != <= >= << >> ->`).
const MULTI_CHAR_PUNCT: &[&str] = &["||", "&&", "==", "!=", "<=", ">=", "<<", ">>", "->"];

struct CondFrame {
    /// True if this branch's tokens should be emitted, given all enclosing
    /// conditions.
    active: bool,
    /// Whether the `#if` (or a prior `#else`) in this frame already took a
    /// true branch, so a second `#else` would be meaningless — unused for
    /// anything but documentation since the grammar has no `#elif`.
    took_true_branch: bool,
}

/// Output of the character-level scan: the flat (post-conditional-
/// compilation) token stream, plus side signals collected along the way.
pub struct ScanOutput {
    pub tokens: Vec<Token>,
    pub bootstrap: bool,
    /// `#pragma message` text, in order, to forward to the diagnostic
    /// stream.
    pub pragma_messages: Vec<String>,
}

pub struct Scanner<'a> {
    chars: Vec<char>,
    pos: usize,
    file: &'a str,
    /// Physical line number, 1-based.
    phys_line: u32,
    /// `logical = physical + line_offset`, updated by `#line`.
    line_offset: i64,
    cond_stack: Vec<CondFrame>,
    tokens: Vec<Token>,
    bootstrap: bool,
    pragma_messages: Vec<String>,
    /// Constants folded so far, so later `#if`/`const`/array-dimension
    /// expressions can reference earlier declarations (spec §4.1).
    consts: IndexMap<String, i64>,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

impl<'a> Scanner<'a> {
    pub fn new(source: &str, file: &'a str) -> Self {
        Scanner {
            chars: source.chars().collect(),
            pos: 0,
            file,
            phys_line: 1,
            line_offset: 0,
            cond_stack: Vec::new(),
            tokens: Vec::new(),
            bootstrap: false,
            pragma_messages: Vec::new(),
            consts: IndexMap::new(),
        }
    }

    fn logical_line(&self) -> u32 {
        (self.phys_line as i64 + self.line_offset).max(1) as u32
    }

    fn pos_here(&self) -> Position {
        Position::new(self.file.to_string(), self.logical_line())
    }

    fn err(&self, msg: impl Into<String>) -> Error {
        Error::lexical(self.pos_here(), msg)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.phys_line += 1;
        }
        Some(c)
    }

    fn active(&self) -> bool {
        self.cond_stack.iter().all(|f| f.active)
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn skip_block_comment(&mut self) -> Result<()> {
        loop {
            match self.bump() {
                None => return Err(self.err("unterminated block comment")),
                Some('*') if self.peek() == Some('/') => {
                    self.bump();
                    return Ok(());
                }
                _ => {}
            }
        }
    }

    fn skip_to_eol(&mut self) -> String {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            s.push(c);
            self.bump();
        }
        s
    }

    fn skip_inline_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c == ' ' || c == '\t' || c == '\r') {
            self.bump();
        }
    }

    fn scan_ident_text(&mut self) -> Result<String> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if is_ident_continue(c)) {
            self.bump();
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if text.len() > MAX_IDENT_LEN {
            return Err(self.err(format!(
                "identifier `{}' exceeds maximum length of {} characters",
                text, MAX_IDENT_LEN
            )));
        }
        Ok(text)
    }

    /// Scan the full lexical input into a flat token stream, with
    /// conditional compilation already applied.
    pub fn scan(mut self) -> Result<ScanOutput> {
        loop {
            match self.peek() {
                None => break,
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    self.skip_line_comment();
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    self.bump();
                    self.bump();
                    self.skip_block_comment()?;
                }
                Some('#') => {
                    self.scan_directive()?;
                }
                Some(c) if is_ident_start(c) => {
                    let pos = self.pos_here();
                    let text = self.scan_ident_text()?;
                    if self.active() {
                        let kind = if is_keyword(&text) {
                            TokenKind::Keyword
                        } else {
                            TokenKind::Identifier
                        };
                        if kind == TokenKind::Keyword && (text == "const" || text == "var") {
                            self.tokens
                                .push(Token::new(kind, text.clone(), pos.file.clone(), pos.line));
                            self.fold_decl(&text, &pos)?;
                        } else if kind == TokenKind::Keyword && text == "struct" {
                            self.tokens
                                .push(Token::new(kind, text, pos.file.clone(), pos.line));
                            self.fold_struct_body(&pos)?;
                        } else {
                            self.tokens
                                .push(Token::new(kind, text, pos.file.clone(), pos.line));
                        }
                    }
                }
                Some(c) if c.is_ascii_digit() => {
                    let pos = self.pos_here();
                    let (_, hex_text) = self.scan_number()?;
                    if self.active() {
                        self.tokens
                            .push(Token::new(TokenKind::Literal, hex_text, pos.file.clone(), pos.line));
                    }
                }
                Some('\'') => {
                    let pos = self.pos_here();
                    let value = self.scan_char_literal()?;
                    if self.active() {
                        self.tokens.push(Token::new(
                            TokenKind::Literal,
                            format!("0x{:04X}", value as u16),
                            pos.file.clone(),
                            pos.line,
                        ));
                    }
                }
                Some('"') => {
                    let pos = self.pos_here();
                    let text = self.scan_string_literal(false)?;
                    if self.active() {
                        self.tokens
                            .push(Token::new(TokenKind::Literal, text, pos.file.clone(), pos.line));
                    }
                }
                Some(_) => {
                    let pos = self.pos_here();
                    let text = self.scan_punct()?;
                    if self.active() {
                        self.tokens
                            .push(Token::new(TokenKind::Punctuation, text, pos.file.clone(), pos.line));
                    }
                }
            }
        }

        if !self.cond_stack.is_empty() {
            return Err(self.err("unterminated #if"));
        }

        Ok(ScanOutput {
            tokens: self.tokens,
            bootstrap: self.bootstrap,
            pragma_messages: self.pragma_messages,
        })
    }

    fn scan_punct(&mut self) -> Result<String> {
        for candidate in MULTI_CHAR_PUNCT {
            let bytes: Vec<char> = candidate.chars().collect();
            if bytes
                .iter()
                .enumerate()
                .all(|(i, &c)| self.peek_at(i) == Some(c))
            {
                for _ in 0..bytes.len() {
                    self.bump();
                }
                return Ok(candidate.to_string());
            }
        }
        match self.bump() {
            Some(c) => Ok(c.to_string()),
            None => Err(self.err("unexpected end of input")),
        }
    }

    fn scan_number(&mut self) -> Result<(i64, String)> {
        let start = self.pos;
        let mut radix = 10;
        if self.peek() == Some('0') {
            match self.peek_at(1) {
                Some('x') | Some('X') => {
                    radix = 16;
                    self.bump();
                    self.bump();
                }
                Some('b') | Some('B') => {
                    radix = 2;
                    self.bump();
                    self.bump();
                }
                Some('o') | Some('O') => {
                    radix = 8;
                    self.bump();
                    self.bump();
                }
                _ => {}
            }
        }
        let digits_start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.bump();
        }
        let raw: String = self.chars[digits_start..self.pos].iter().collect();
        let cleaned: String = raw.chars().filter(|&c| c != '_').collect();
        if cleaned.is_empty() {
            return Err(self.err("malformed numeric literal"));
        }
        let value = i64::from_str_radix(&cleaned, radix).map_err(|_| {
            let full: String = self.chars[start..self.pos].iter().collect();
            self.err(format!("invalid digit for base {} in literal `{}'", radix, full))
        })?;
        if !(0..=0xFFFF).contains(&value) {
            let full: String = self.chars[start..self.pos].iter().collect();
            return Err(self.err(format!("integer literal `{}' out of 16-bit range", full)));
        }
        Ok((value, format!("0x{:04X}", (value as u64) & 0xFFFF)))
    }

    fn scan_escape(&mut self) -> Result<u8> {
        match self.bump() {
            Some('0') => Ok(0),
            Some('a') => Ok(0x07),
            Some('b') => Ok(0x08),
            Some('f') => Ok(0x0C),
            Some('n') => Ok(b'\n'),
            Some('r') => Ok(b'\r'),
            Some('t') => Ok(b'\t'),
            Some('v') => Ok(0x0B),
            Some('\\') => Ok(b'\\'),
            Some('\'') => Ok(b'\''),
            Some('"') => Ok(b'"'),
            Some('x') => {
                let hi = self.bump().ok_or_else(|| self.err("bad \\x escape"))?;
                let lo = self.bump().ok_or_else(|| self.err("bad \\x escape"))?;
                let s: String = [hi, lo].iter().collect();
                u8::from_str_radix(&s, 16).map_err(|_| self.err("bad \\x escape"))
            }
            Some(c) => Err(self.err(format!("unknown escape sequence `\\{}'", c))),
            None => Err(self.err("unterminated escape sequence")),
        }
    }

    fn scan_char_literal(&mut self) -> Result<i64> {
        self.bump(); // opening quote
        let value = match self.peek() {
            Some('\\') => {
                self.bump();
                self.scan_escape()? as i64
            }
            Some(c) => {
                self.bump();
                c as i64
            }
            None => return Err(self.err("unterminated character literal")),
        };
        match self.bump() {
            Some('\'') => Ok(value),
            _ => Err(self.err("unterminated character literal")),
        }
    }

    /// Scan a string literal. If `raw`, escapes are not processed and a
    /// backslash is a fatal error (used for `#asm("…")`, spec §4.1).
    fn scan_string_literal(&mut self, raw: bool) -> Result<String> {
        self.bump(); // opening quote
        let mut out = String::from("\"");
        loop {
            match self.peek() {
                None => return Err(self.err("unterminated string literal")),
                Some('\n') => return Err(self.err("newline in string literal")),
                Some('"') => {
                    self.bump();
                    out.push('"');
                    break;
                }
                Some('\\') => {
                    if raw {
                        return Err(self.err("escape sequences are not allowed in #asm text"));
                    }
                    out.push('\\');
                    self.bump();
                    match self.peek() {
                        Some(c) => {
                            out.push(c);
                            self.bump();
                        }
                        None => return Err(self.err("unterminated string literal")),
                    }
                }
                Some(c) => {
                    out.push(c);
                    self.bump();
                }
            }
        }
        Ok(out)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    /// Copy raw source text up to (not including) the top-level occurrence
    /// of `stop`, tracking `(`/`[` nesting so a `stop` of `;` or `]` doesn't
    /// terminate early inside a parenthesized or indexed sub-expression.
    fn scan_balanced_expr_text(&mut self, stop: char) -> Result<String> {
        let mut depth = 0i32;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(self.err("unterminated expression in declaration")),
                Some(c) if c == stop && depth == 0 => return Ok(out),
                Some(c) => {
                    if c == '(' || c == '[' {
                        depth += 1;
                    } else if c == ')' || c == ']' {
                        if depth == 0 {
                            return Err(self.err("mismatched bracket in constant expression"));
                        }
                        depth -= 1;
                    }
                    out.push(c);
                    self.bump();
                }
            }
        }
    }

    /// Consume a `Type` head (`@`-prefixed pointer markers then a base-type
    /// keyword or struct name), pushing its tokens directly.
    fn fold_type_head(&mut self) -> Result<()> {
        loop {
            self.skip_ws();
            if self.peek() == Some('@') {
                let pos = self.pos_here();
                self.bump();
                self.tokens
                    .push(Token::new(TokenKind::Punctuation, "@", pos.file, pos.line));
            } else {
                break;
            }
        }
        self.skip_ws();
        let pos = self.pos_here();
        if !matches!(self.peek(), Some(c) if is_ident_start(c)) {
            return Err(self.err("expected a type in declaration"));
        }
        let text = self.scan_ident_text()?;
        let kind = if is_keyword(&text) {
            TokenKind::Keyword
        } else {
            TokenKind::Identifier
        };
        self.tokens.push(Token::new(kind, text, pos.file, pos.line));
        Ok(())
    }

    /// Fold an optional `[expr]` array dimension immediately at the current
    /// position, if present: `[]` folds to a literal `0` (spec §4.1
    /// "infer"), otherwise the bracketed expression is evaluated and
    /// replaced by its folded literal.
    fn fold_optional_array_dim(&mut self) -> Result<()> {
        if self.peek() != Some('[') {
            return Ok(());
        }
        let br_pos = self.pos_here();
        self.bump();
        self.tokens
            .push(Token::new(TokenKind::Punctuation, "[", br_pos.file.clone(), br_pos.line));
        self.skip_ws();
        if self.peek() == Some(']') {
            self.tokens.push(Token::new(
                TokenKind::Literal,
                "0x0000",
                br_pos.file.clone(),
                br_pos.line,
            ));
        } else {
            let text = self.scan_balanced_expr_text(']')?;
            let value = eval_const_expr(&text, &br_pos, &self.consts)?;
            self.tokens.push(Token::new(
                TokenKind::Literal,
                format!("0x{:04X}", (value as u64) & 0xFFFF),
                br_pos.file.clone(),
                br_pos.line,
            ));
        }
        self.skip_ws();
        if self.bump() != Some(']') {
            return Err(self.err("expected `]' to close array dimension"));
        }
        self.tokens
            .push(Token::new(TokenKind::Punctuation, "]", br_pos.file, br_pos.line));
        self.skip_ws();
        Ok(())
    }

    /// Fold a `const`/`var` declaration header: `Type name [expr]? (=
    /// expr)? ;`, replacing the array-dimension and (for `const`)
    /// initializer expressions with single folded literals (spec §4.1
    /// "Declaration folding").
    fn fold_decl(&mut self, kw: &str, _kw_pos: &Position) -> Result<()> {
        self.fold_type_head()?;
        self.skip_ws();
        let name_pos = self.pos_here();
        if !matches!(self.peek(), Some(c) if is_ident_start(c)) {
            return Err(self.err("expected a name in declaration"));
        }
        let name = self.scan_ident_text()?;
        self.tokens.push(Token::new(
            TokenKind::Identifier,
            name.clone(),
            name_pos.file.clone(),
            name_pos.line,
        ));
        self.skip_ws();
        self.fold_optional_array_dim()?;

        if kw == "const" {
            let eq_pos = self.pos_here();
            if self.bump() != Some('=') {
                return Err(self.err("const declaration requires an initializer"));
            }
            self.tokens
                .push(Token::new(TokenKind::Punctuation, "=", eq_pos.file.clone(), eq_pos.line));
            self.skip_ws();
            if self.peek() == Some('"') {
                // A string-literal initializer is not a numeric constant
                // expression: carry it through verbatim rather than feeding
                // it to the arithmetic evaluator.
                let text = self.scan_string_literal(false)?;
                self.tokens
                    .push(Token::new(TokenKind::Literal, text, eq_pos.file.clone(), eq_pos.line));
            } else {
                let text = self.scan_balanced_expr_text(';')?;
                let value = eval_const_expr(&text, &eq_pos, &self.consts)?;
                self.tokens.push(Token::new(
                    TokenKind::Literal,
                    format!("0x{:04X}", (value as u64) & 0xFFFF),
                    eq_pos.file.clone(),
                    eq_pos.line,
                ));
                self.consts.insert(name, value);
            }
            self.skip_ws();
            if self.bump() != Some(';') {
                return Err(self.err("expected `;' after const declaration"));
            }
            self.tokens
                .push(Token::new(TokenKind::Punctuation, ";", eq_pos.file, eq_pos.line));
        } else {
            // `var` has no constant-folded initializer: `= expr` (if
            // present) is left as ordinary tokens for the parser, since the
            // initializer need not be a compile-time constant. Only the
            // presence of `;` or `=` is checked here (spec §4.1: "A `var`
            // declaration that is not followed by `;` (when no initializer
            // follows) is a fatal error").
            match self.peek() {
                Some(';') => {
                    let semi_pos = self.pos_here();
                    self.bump();
                    self.tokens.push(Token::new(
                        TokenKind::Punctuation,
                        ";",
                        semi_pos.file,
                        semi_pos.line,
                    ));
                }
                Some('=') => {
                    let eq_pos = self.pos_here();
                    self.bump();
                    self.tokens.push(Token::new(
                        TokenKind::Punctuation,
                        "=",
                        eq_pos.file,
                        eq_pos.line,
                    ));
                }
                _ => {
                    return Err(self.err("var declaration must be followed by `;' or an initializer"))
                }
            }
        }
        Ok(())
    }

    /// Fold a `struct Name { field... }` body: each field is `Type name
    /// [expr]? ;`, with array bounds folded the same way as `var` (spec
    /// §4.1 "Struct member array bounds are folded the same way").
    fn fold_struct_body(&mut self, _struct_kw_pos: &Position) -> Result<()> {
        self.skip_ws();
        let name_pos = self.pos_here();
        if !matches!(self.peek(), Some(c) if is_ident_start(c)) {
            return Err(self.err("expected a name after `struct'"));
        }
        let name = self.scan_ident_text()?;
        self.tokens
            .push(Token::new(TokenKind::Identifier, name, name_pos.file, name_pos.line));

        self.skip_ws();
        let brace_pos = self.pos_here();
        if self.bump() != Some('{') {
            return Err(self.err("expected `{' after struct name"));
        }
        self.tokens.push(Token::new(
            TokenKind::Punctuation,
            "{",
            brace_pos.file,
            brace_pos.line,
        ));

        loop {
            self.skip_ws();
            match self.peek() {
                None => return Err(self.err("unterminated struct body")),
                Some('}') => {
                    let p = self.pos_here();
                    self.bump();
                    self.tokens
                        .push(Token::new(TokenKind::Punctuation, "}", p.file, p.line));
                    return Ok(());
                }
                _ => {
                    self.fold_type_head()?;
                    self.skip_ws();
                    let fname_pos = self.pos_here();
                    if !matches!(self.peek(), Some(c) if is_ident_start(c)) {
                        return Err(self.err("expected a field name in struct body"));
                    }
                    let fname = self.scan_ident_text()?;
                    self.tokens.push(Token::new(
                        TokenKind::Identifier,
                        fname,
                        fname_pos.file,
                        fname_pos.line,
                    ));
                    self.skip_ws();
                    self.fold_optional_array_dim()?;
                    let semi_pos = self.pos_here();
                    if self.bump() != Some(';') {
                        return Err(self.err("expected `;' after struct field"));
                    }
                    self.tokens.push(Token::new(
                        TokenKind::Punctuation,
                        ";",
                        semi_pos.file,
                        semi_pos.line,
                    ));
                }
            }
        }
    }

    fn scan_directive(&mut self) -> Result<()> {
        self.bump(); // '#'
        self.skip_inline_ws();
        let pos = self.pos_here();
        if !matches!(self.peek(), Some(c) if is_ident_start(c)) {
            return Err(self.err("expected directive name after `#'"));
        }
        let name = self.scan_ident_text()?;
        self.skip_inline_ws();
        match name.as_str() {
            "if" => {
                let text = self.skip_to_eol();
                let parent_active = self.active();
                let value = if parent_active {
                    eval_const_expr(&text, &pos, &self.consts)?
                } else {
                    0
                };
                self.cond_stack.push(CondFrame {
                    active: parent_active && value != 0,
                    took_true_branch: value != 0,
                });
            }
            "else" => {
                let frame = self
                    .cond_stack
                    .last_mut()
                    .ok_or_else(|| self.err("unmatched #else"))?;
                let parent_active = self
                    .cond_stack
                    .len()
                    .checked_sub(1)
                    .map(|_| true)
                    .unwrap_or(true);
                let _ = parent_active;
                frame.active = !frame.took_true_branch;
                frame.took_true_branch = true;
            }
            "endif" => {
                if self.cond_stack.pop().is_none() {
                    return Err(self.err("unmatched #endif"));
                }
            }
            "line" => {
                let text = self.skip_to_eol();
                let n: i64 = text.trim().parse().map_err(|_| {
                    self.err(format!("malformed #line directive `{}'", text.trim()))
                })?;
                // The *next* physical line should report as logical line n.
                self.line_offset = n - (self.phys_line as i64 + 1);
            }
            "file" => {
                // `#file` is an r-value token expanding to the current
                // logical file name as a string literal (spec §4.1).
                if self.active() {
                    self.tokens.push(Token::new(
                        TokenKind::Literal,
                        format!("\"{}\"", self.file),
                        pos.file.clone(),
                        pos.line,
                    ));
                }
            }
            "asm" => {
                self.skip_inline_ws();
                if self.bump() != Some('(') {
                    return Err(self.err("expected `(' after #asm"));
                }
                self.skip_inline_ws();
                if self.peek() != Some('"') {
                    return Err(self.err("expected string literal in #asm(...)"));
                }
                let text = self.scan_string_literal(true)?;
                self.skip_inline_ws();
                if self.bump() != Some(')') {
                    return Err(self.err("expected `)' after #asm(\"...\")"));
                }
                if self.active() {
                    self.tokens.push(Token::new(
                        TokenKind::Keyword,
                        "#asm",
                        pos.file.clone(),
                        pos.line,
                    ));
                    self.tokens.push(Token::new(
                        TokenKind::Literal,
                        text,
                        pos.file.clone(),
                        pos.line,
                    ));
                }
            }
            "pragma" => {
                self.skip_inline_ws();
                let word = self.scan_ident_text()?;
                match word.as_str() {
                    "message" => {
                        self.skip_inline_ws();
                        let text = self.skip_to_eol();
                        if self.active() {
                            self.pragma_messages.push(text);
                        }
                    }
                    "bootstrap" => {
                        if self.active() {
                            self.bootstrap = true;
                        }
                    }
                    other => return Err(self.err(format!("unknown pragma `{}'", other))),
                }
            }
            other => return Err(self.err(format!("unknown directive `#{}'", other))),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(src: &str) -> Vec<Token> {
        Scanner::new(src, "t.yapl").scan().unwrap().tokens
    }

    #[test]
    fn identifier_boundary() {
        let ok = "a".repeat(15);
        assert_eq!(scan(&ok).len(), 1);
        let bad = "a".repeat(16);
        assert!(Scanner::new(&bad, "t.yapl").scan().is_err());
    }

    #[test]
    fn integer_literal_boundaries() {
        let toks = scan("0xFFFF");
        assert_eq!(toks[0].text, "0xFFFF");
        assert!(Scanner::new("0x10000", "t.yapl").scan().is_err());
        let toks = scan("0b1111111111111111");
        assert_eq!(toks[0].text, "0xFFFF");
    }

    #[test]
    fn conditional_compilation_skips_false_branch() {
        let toks = scan("#if 0\nx\n#else\ny\n#endif");
        assert_eq!(toks.len(), 1);
        assert_eq!(toks[0].text, "y");
    }

    #[test]
    fn nested_conditionals() {
        let toks = scan("#if 1\n#if 0\na\n#else\nb\n#endif\n#endif");
        assert_eq!(toks.len(), 1);
        assert_eq!(toks[0].text, "b");
    }

    #[test]
    fn unmatched_endif_is_fatal() {
        assert!(Scanner::new("#endif", "t.yapl").scan().is_err());
    }

    #[test]
    fn unterminated_if_is_fatal() {
        assert!(Scanner::new("#if 1\nx", "t.yapl").scan().is_err());
    }

    #[test]
    fn asm_directive_emits_key_and_raw_literal() {
        let toks = scan(r#"#asm("MOV R1, R2")"#);
        assert_eq!(toks[0].kind, TokenKind::Keyword);
        assert_eq!(toks[0].text, "#asm");
        assert_eq!(toks[1].text, "\"MOV R1, R2\"");
    }

    #[test]
    fn asm_directive_rejects_escapes() {
        assert!(Scanner::new(r#"#asm("a\nb")"#, "t.yapl").scan().is_err());
    }

    #[test]
    fn unterminated_block_comment_is_fatal() {
        assert!(Scanner::new("/* never closes", "t.yapl").scan().is_err());
    }

    #[test]
    fn unterminated_string_is_fatal() {
        assert!(Scanner::new("\"abc", "t.yapl").scan().is_err());
    }

    #[test]
    fn unknown_pragma_is_fatal() {
        assert!(Scanner::new("#pragma nonsense", "t.yapl").scan().is_err());
    }

    #[test]
    fn const_initializer_is_folded_to_one_literal() {
        let toks = scan("const int16 Size = 2 + 3 * 4;");
        let texts: Vec<&str> = toks.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["const", "int16", "Size", "=", "0x000E", ";"]);
    }

    #[test]
    fn const_array_dim_is_folded() {
        let toks = scan("const uint8 Table[2 * 5] = 0;");
        let texts: Vec<&str> = toks.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["const", "uint8", "Table", "[", "0x000A", "]", "=", "0x0000", ";"]
        );
    }

    #[test]
    fn var_array_with_empty_brackets_infers_zero() {
        let toks = scan("var int16 Data[];");
        let texts: Vec<&str> = toks.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["var", "int16", "Data", "[", "0x0000", "]", ";"]);
    }

    #[test]
    fn var_without_semicolon_is_fatal() {
        assert!(Scanner::new("var int16 X", "t.yapl").scan().is_err());
    }

    #[test]
    fn const_reference_in_later_array_dim() {
        let toks = scan("const int16 N = 3; var uint8 Buf[N * 2];");
        let dim = toks
            .iter()
            .position(|t| t.text == "Buf")
            .and_then(|i| toks.get(i + 2))
            .unwrap();
        assert_eq!(dim.text, "0x0006");
    }

    #[test]
    fn struct_fields_fold_array_dims() {
        let toks = scan("struct Point { int16 coords[1 + 1]; }");
        let texts: Vec<&str> = toks.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "struct", "Point", "{", "int16", "coords", "[", "0x0002", "]", ";", "}"
            ]
        );
    }
}
