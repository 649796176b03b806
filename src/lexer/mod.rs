//! The lexer stage: source text and a logical file name in, a line-oriented
//! token stream out (spec §4.1, §6 "Token stream format").

pub mod constexpr;
pub mod scan;

use crate::error::Result;
use crate::token::{Token, TokenKind};

use scan::Scanner;

/// Everything the lexer stage produces: the wire-format text stream plus
/// out-of-band diagnostics (`#pragma message` text) for the diagnostic
/// stream.
pub struct LexResult {
    pub text: String,
    pub diagnostics: Vec<String>,
}

/// Run the lexer over `source`, reporting positions under `file`.
pub fn run(source: &str, file: &str) -> Result<LexResult> {
    log::debug!("scanning {} ({} byte(s))", file, source.len());
    let scanned = Scanner::new(source, file).scan()?;
    let mut tokens = scanned.tokens;
    log::debug!("{} token(s) scanned from {}", tokens.len(), file);
    let eof_line = tokens.last().map(|t| t.line).unwrap_or(1);
    tokens.push(Token::eof(file, eof_line));

    let mut out = String::new();
    out.push_str(&format!("#file {}\n", file));
    if scanned.bootstrap {
        out.push_str("#bootstrap\n");
    }

    let mut current_line: Option<u32> = None;
    for (serial, tok) in tokens.iter().enumerate() {
        if current_line != Some(tok.line) {
            out.push_str(&format!("#line {}\n", tok.line));
            current_line = Some(tok.line);
        }
        out.push_str(&format!("{}, {}, {}\n", serial, tok.kind.category(), tok.text));
    }

    Ok(LexResult {
        text: out,
        diagnostics: scanned.pragma_messages,
    })
}

/// Parse one `#file <name>`/`#line <N>`-interleaved wire line back into a
/// `Token`, tracking the current logical file/line across calls. Used by
/// the parser's token reader (spec §4.2).
pub struct TokenStreamReader<'a> {
    lines: std::str::Lines<'a>,
    file: String,
    line: u32,
}

impl<'a> TokenStreamReader<'a> {
    pub fn new(text: &'a str) -> Self {
        TokenStreamReader {
            lines: text.lines(),
            file: String::new(),
            line: 1,
        }
    }

    /// Read the next token, or `None` once the stream (and its `EOF`
    /// record) has been fully consumed.
    pub fn next_token(&mut self) -> Result<Option<Token>> {
        loop {
            let line = match self.lines.next() {
                Some(l) => l,
                None => return Ok(None),
            };
            if let Some(rest) = line.strip_prefix("#file ") {
                self.file = rest.trim().to_string();
                continue;
            }
            if let Some(rest) = line.strip_prefix("#line ") {
                self.line = rest.trim().parse().unwrap_or(self.line);
                continue;
            }
            if line == "#bootstrap" {
                continue;
            }
            // `<serial>, <CATEGORY>, <value>` — value may itself contain
            // commas (string literals), so split only on the first two.
            let mut parts = line.splitn(3, ", ");
            let _serial = parts.next();
            let category = parts.next().ok_or_else(|| {
                crate::error::Error::syntactic(
                    crate::token::Position::new(self.file.clone(), self.line),
                    "malformed token stream record",
                )
            })?;
            let value = parts.next().unwrap_or("").to_string();
            let kind = TokenKind::from_category(category).ok_or_else(|| {
                crate::error::Error::syntactic(
                    crate::token::Position::new(self.file.clone(), self.line),
                    format!("unknown token category `{}'", category),
                )
            })?;
            if kind == TokenKind::Eof {
                return Ok(Some(Token::eof(self.file.clone(), self.line)));
            }
            return Ok(Some(Token::new(kind, value, self.file.clone(), self.line)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_token_stream_reader() {
        let lexed = run("const int16 N = 1 + 2;", "t.yapl").unwrap();
        let mut reader = TokenStreamReader::new(&lexed.text);
        let mut texts = Vec::new();
        while let Some(tok) = reader.next_token().unwrap() {
            if tok.is_eof() {
                break;
            }
            texts.push(tok.text);
        }
        assert_eq!(texts, vec!["const", "int16", "N", "=", "0x0003", ";"]);
    }

    #[test]
    fn output_starts_with_file_header() {
        let lexed = run("var byte X;", "main.yapl").unwrap();
        assert!(lexed.text.starts_with("#file main.yapl\n"));
    }

    #[test]
    fn pragma_message_is_collected_as_diagnostic() {
        let lexed = run("#pragma message hello world\nvar byte X;", "t.yapl").unwrap();
        assert_eq!(lexed.diagnostics, vec!["hello world".to_string()]);
    }

    #[test]
    fn bootstrap_pragma_emits_meta_line() {
        let lexed = run("#pragma bootstrap\nvar byte X;", "t.yapl").unwrap();
        assert!(lexed.text.contains("#bootstrap\n"));
    }
}
