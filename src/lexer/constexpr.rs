//! The constant-expression evaluator used both for `#if` conditions and for
//! declaration folding (array dimensions, `const` initializers — spec §4.1).
//!
//! Operates over plain text rather than the main token stream: `#if` runs
//! mid-scan, before a full token list exists, and folded sub-expressions are
//! carved out of the source as raw text by the declaration-folding pass in
//! [`super::scan`].

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::token::Position;
use crate::types::BaseType;

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Int(i64),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
}

/// Resolve one escape sequence starting just past the backslash. Returns the
/// escaped byte value and how many characters of `rest` it consumed.
fn char_escape(rest: &[char], pos: &Position) -> Result<(i64, usize)> {
    match rest.first() {
        Some('0') => Ok((0, 1)),
        Some('a') => Ok((0x07, 1)),
        Some('b') => Ok((0x08, 1)),
        Some('f') => Ok((0x0C, 1)),
        Some('n') => Ok((b'\n' as i64, 1)),
        Some('r') => Ok((b'\r' as i64, 1)),
        Some('t') => Ok((b'\t' as i64, 1)),
        Some('v') => Ok((0x0B, 1)),
        Some('\\') => Ok((b'\\' as i64, 1)),
        Some('\'') => Ok((b'\'' as i64, 1)),
        Some('"') => Ok((b'"' as i64, 1)),
        Some('x') => {
            let hi = rest.get(1).ok_or_else(|| Error::lexical(pos.clone(), "bad \\x escape"))?;
            let lo = rest.get(2).ok_or_else(|| Error::lexical(pos.clone(), "bad \\x escape"))?;
            let s: String = [*hi, *lo].iter().collect();
            let v = u8::from_str_radix(&s, 16).map_err(|_| Error::lexical(pos.clone(), "bad \\x escape"))?;
            Ok((v as i64, 3))
        }
        Some(c) => Err(Error::lexical(pos.clone(), format!("unknown escape sequence `\\{}'", c))),
        None => Err(Error::lexical(pos.clone(), "unterminated escape sequence")),
    }
}

fn tokenize(text: &str, pos: &Position) -> Result<Vec<Tok>> {
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    let mut out = Vec::new();
    const OPS: &[&str] = &[
        "||", "&&", "==", "!=", "<=", ">=", "<<", ">>", "+", "-", "*", "/", "%", "&", "|", "^",
        "~", "!", "<", ">",
    ];
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '(' {
            out.push(Tok::LParen);
            i += 1;
            continue;
        }
        if c == ')' {
            out.push(Tok::RParen);
            i += 1;
            continue;
        }
        if c == '\'' {
            i += 1;
            let value = match chars.get(i) {
                Some('\\') => {
                    i += 1;
                    let (v, consumed) = char_escape(&chars[i..], pos)?;
                    i += consumed;
                    v
                }
                Some(&ch) => {
                    i += 1;
                    ch as i64
                }
                None => return Err(Error::lexical(pos.clone(), "unterminated character literal")),
            };
            if chars.get(i) != Some(&'\'') {
                return Err(Error::lexical(pos.clone(), "unterminated character literal"));
            }
            i += 1;
            out.push(Tok::Int(value));
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            let mut radix = 10;
            if c == '0' && matches!(chars.get(i + 1), Some('x') | Some('X')) {
                radix = 16;
                i += 2;
            } else if c == '0' && matches!(chars.get(i + 1), Some('b') | Some('B')) {
                radix = 2;
                i += 2;
            }
            let digit_start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let raw: String = chars[digit_start..i].iter().filter(|&&c| c != '_').collect();
            let value = i64::from_str_radix(&raw, radix).map_err(|_| {
                let full: String = chars[start..i].iter().collect();
                Error::lexical(pos.clone(), format!("invalid constant `{}'", full))
            })?;
            out.push(Tok::Int(value));
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            out.push(Tok::Ident(chars[start..i].iter().collect()));
            continue;
        }
        let mut matched = false;
        for op in OPS {
            let n = op.len();
            if chars[i..].iter().take(n).collect::<String>() == **op {
                out.push(Tok::Op(op));
                i += n;
                matched = true;
                break;
            }
        }
        if !matched {
            return Err(Error::lexical(
                pos.clone(),
                format!("unexpected character `{}' in constant expression", c),
            ));
        }
    }
    Ok(out)
}

struct Parser<'a> {
    toks: Vec<Tok>,
    i: usize,
    pos: &'a Position,
    consts: &'a IndexMap<String, i64>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.i)
    }

    fn bump(&mut self) -> Option<Tok> {
        let t = self.toks.get(self.i).cloned();
        self.i += 1;
        t
    }

    fn err(&self, msg: impl Into<String>) -> Error {
        Error::lexical(self.pos.clone(), msg)
    }

    fn expect_op(&mut self, op: &str) -> Result<()> {
        match self.bump() {
            Some(Tok::Op(o)) if o == op => Ok(()),
            other => Err(self.err(format!("expected `{}', found {:?}", op, other))),
        }
    }

    // Precedence climbing, weakest to strongest.
    fn parse_or(&mut self) -> Result<i64> {
        let mut v = self.parse_and()?;
        while matches!(self.peek(), Some(Tok::Op("||"))) {
            self.bump();
            let rhs = self.parse_and()?;
            v = ((v != 0) || (rhs != 0)) as i64;
        }
        Ok(v)
    }

    fn parse_and(&mut self) -> Result<i64> {
        let mut v = self.parse_rel()?;
        while matches!(self.peek(), Some(Tok::Op("&&"))) {
            self.bump();
            let rhs = self.parse_rel()?;
            v = ((v != 0) && (rhs != 0)) as i64;
        }
        Ok(v)
    }

    /// `==/!=/<=/>=/</>`, all one tier (spec §4.1).
    fn parse_rel(&mut self) -> Result<i64> {
        let mut v = self.parse_addlevel()?;
        loop {
            match self.peek() {
                Some(Tok::Op("==")) => {
                    self.bump();
                    v = (v == self.parse_addlevel()?) as i64;
                }
                Some(Tok::Op("!=")) => {
                    self.bump();
                    v = (v != self.parse_addlevel()?) as i64;
                }
                Some(Tok::Op("<=")) => {
                    self.bump();
                    v = (v <= self.parse_addlevel()?) as i64;
                }
                Some(Tok::Op(">=")) => {
                    self.bump();
                    v = (v >= self.parse_addlevel()?) as i64;
                }
                Some(Tok::Op("<")) => {
                    self.bump();
                    v = (v < self.parse_addlevel()?) as i64;
                }
                Some(Tok::Op(">")) => {
                    self.bump();
                    v = (v > self.parse_addlevel()?) as i64;
                }
                _ => break,
            }
        }
        Ok(v)
    }

    /// `+/-/|/^`, all one tier (spec §4.1).
    fn parse_addlevel(&mut self) -> Result<i64> {
        let mut v = self.parse_mullevel()?;
        loop {
            match self.peek() {
                Some(Tok::Op("+")) => {
                    self.bump();
                    v += self.parse_mullevel()?;
                }
                Some(Tok::Op("-")) => {
                    self.bump();
                    v -= self.parse_mullevel()?;
                }
                Some(Tok::Op("|")) => {
                    self.bump();
                    v |= self.parse_mullevel()?;
                }
                Some(Tok::Op("^")) => {
                    self.bump();
                    v ^= self.parse_mullevel()?;
                }
                _ => break,
            }
        }
        Ok(v)
    }

    /// `*///%/&/<</>>`, all one tier (spec §4.1).
    fn parse_mullevel(&mut self) -> Result<i64> {
        let mut v = self.parse_unary()?;
        loop {
            match self.peek() {
                Some(Tok::Op("&")) => {
                    self.bump();
                    v &= self.parse_unary()?;
                }
                Some(Tok::Op("<<")) => {
                    self.bump();
                    let rhs = self.parse_unary()?;
                    if !(0..16).contains(&rhs) {
                        return Err(self.err("shift amount out of range"));
                    }
                    v <<= rhs;
                }
                Some(Tok::Op(">>")) => {
                    self.bump();
                    let rhs = self.parse_unary()?;
                    if !(0..16).contains(&rhs) {
                        return Err(self.err("shift amount out of range"));
                    }
                    v >>= rhs;
                }
                Some(Tok::Op("*")) => {
                    self.bump();
                    v *= self.parse_unary()?;
                }
                Some(Tok::Op("/")) => {
                    self.bump();
                    let rhs = self.parse_unary()?;
                    if rhs == 0 {
                        return Err(self.err("division by zero in constant expression"));
                    }
                    v /= rhs;
                }
                Some(Tok::Op("%")) => {
                    self.bump();
                    let rhs = self.parse_unary()?;
                    if rhs == 0 {
                        return Err(self.err("division by zero in constant expression"));
                    }
                    v %= rhs;
                }
                _ => break,
            }
        }
        Ok(v)
    }

    fn parse_unary(&mut self) -> Result<i64> {
        match self.peek() {
            Some(Tok::Op("-")) => {
                self.bump();
                Ok(-self.parse_unary()?)
            }
            Some(Tok::Op("~")) => {
                self.bump();
                Ok(!self.parse_unary()?)
            }
            Some(Tok::Op("!")) => {
                self.bump();
                Ok((self.parse_unary()? == 0) as i64)
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<i64> {
        match self.bump() {
            Some(Tok::Int(v)) => Ok(v),
            Some(Tok::Ident(name)) if name == "sizeof" => {
                match self.peek() {
                    Some(Tok::LParen) => {}
                    _ => return Err(self.err("expected `(' after `sizeof'")),
                }
                self.bump();
                let ty = self.bump_cast_type()?;
                self.expect_op_rparen()?;
                Ok(ty.size() as i64)
            }
            Some(Tok::Ident(name)) => self
                .consts
                .get(&name)
                .copied()
                .ok_or_else(|| self.err(format!("undefined constant `{}' in constant expression", name))),
            Some(Tok::LParen) => {
                if let Some(ty) = self.peek_cast_type() {
                    self.bump();
                    self.expect_op_rparen()?;
                    let operand = self.parse_unary()?;
                    return Ok(truncate_to(ty, operand));
                }
                let v = self.parse_or()?;
                self.expect_op_rparen()?;
                Ok(v)
            }
            other => Err(self.err(format!("unexpected token {:?} in constant expression", other))),
        }
    }

    /// If the upcoming `Ident RParen` pair names one of the cast-eligible
    /// base types, return it without consuming any tokens.
    fn peek_cast_type(&self) -> Option<BaseType> {
        let name = match self.toks.get(self.i) {
            Some(Tok::Ident(name)) => name,
            _ => return None,
        };
        if !matches!(self.toks.get(self.i + 1), Some(Tok::RParen)) {
            return None;
        }
        cast_base_type(name)
    }

    fn bump_cast_type(&mut self) -> Result<BaseType> {
        match self.bump() {
            Some(Tok::Ident(name)) => cast_base_type(&name).ok_or_else(|| self.err(format!("unknown type `{}' in constant expression", name))),
            other => Err(self.err(format!("expected a type name, found {:?}", other))),
        }
    }

    fn expect_op_rparen(&mut self) -> Result<()> {
        match self.bump() {
            Some(Tok::RParen) => Ok(()),
            other => Err(self.err(format!("expected `)', found {:?}", other))),
        }
    }
}

/// The base types a constant expression may cast to (spec §4.1): `byte` is
/// the `uint8` alias, matching `BaseType::from_name`.
fn cast_base_type(name: &str) -> Option<BaseType> {
    match BaseType::from_name(name)? {
        ty @ (BaseType::Uint8 | BaseType::Int16 | BaseType::Uint16) => Some(ty),
        _ => None,
    }
}

/// Truncate/wrap `v` to `ty`'s width, sign-extending `int16`.
fn truncate_to(ty: BaseType, v: i64) -> i64 {
    match ty {
        BaseType::Uint8 => v & 0xFF,
        BaseType::Int16 => (v as i16) as i64,
        BaseType::Uint16 => v & 0xFFFF,
        _ => v,
    }
}

/// Evaluate a constant-expression text fragment, resolving identifiers
/// against `consts` (previously folded `const` declarations).
pub fn eval_const_expr(text: &str, pos: &Position, consts: &IndexMap<String, i64>) -> Result<i64> {
    let toks = tokenize(text, pos)?;
    if toks.is_empty() {
        return Err(Error::lexical(pos.clone(), "empty constant expression"));
    }
    let mut p = Parser {
        toks,
        i: 0,
        pos,
        consts,
    };
    let v = p.parse_or()?;
    if p.i != p.toks.len() {
        return Err(Error::lexical(pos.clone(), "trailing tokens in constant expression"));
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(s: &str) -> i64 {
        let pos = Position::new("t.yapl", 1);
        eval_const_expr(s, &pos, &IndexMap::new()).unwrap()
    }

    #[test]
    fn arithmetic_precedence() {
        assert_eq!(eval("2 + 3 * 4"), 14);
        assert_eq!(eval("(2 + 3) * 4"), 20);
    }

    #[test]
    fn bitwise_and_shift() {
        assert_eq!(eval("1 << 4"), 16);
        assert_eq!(eval("0xFF & 0x0F"), 0x0F);
    }

    #[test]
    fn division_by_zero_is_fatal() {
        let pos = Position::new("t.yapl", 1);
        assert!(eval_const_expr("1 / 0", &pos, &IndexMap::new()).is_err());
    }

    #[test]
    fn out_of_range_shift_is_fatal() {
        let pos = Position::new("t.yapl", 1);
        assert!(eval_const_expr("1 << 20", &pos, &IndexMap::new()).is_err());
    }

    #[test]
    fn logical_short_circuit_values_are_booleans() {
        assert_eq!(eval("1 && 0"), 0);
        assert_eq!(eval("0 || 5"), 1);
    }

    #[test]
    fn references_prior_constants() {
        let mut consts = IndexMap::new();
        consts.insert("N".to_string(), 10);
        let pos = Position::new("t.yapl", 1);
        assert_eq!(eval_const_expr("N * 2", &pos, &consts).unwrap(), 20);
    }

    #[test]
    fn char_literals_and_escapes() {
        assert_eq!(eval("'A'"), 'A' as i64);
        assert_eq!(eval("'\\n'"), b'\n' as i64);
        assert_eq!(eval("'\\x41'"), 0x41);
    }

    #[test]
    fn sizeof_type_primary() {
        assert_eq!(eval("sizeof(byte)"), 1);
        assert_eq!(eval("sizeof(uint8)"), 1);
        assert_eq!(eval("sizeof(int16)"), 2);
        assert_eq!(eval("sizeof(uint16)"), 2);
    }

    #[test]
    fn cast_truncates_and_wraps_to_target_width() {
        assert_eq!(eval("(byte)0x1FF"), 0xFF);
        assert_eq!(eval("(uint16)0x10001"), 1);
        assert_eq!(eval("(int16)0xFFFF"), -1);
    }
}
