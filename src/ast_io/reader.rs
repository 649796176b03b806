//! Reader for the serialized AST format (spec §4.2, §4.3) — consumed by the
//! semantic analyzer. The grammar is keyword-driven and positional, so this
//! is a flat recursive-descent reader over a whitespace/quote-aware word
//! stream rather than a line scanner.

use indexmap::IndexMap;

use crate::ast::{BinOp, Decl, Expr, FieldDecl, Literal, NodeIdGen, Program, Stmt, UnOp};
use crate::error::{Error, Result};
use crate::symtab::{FunctionSymbol, Local, Param, Storage, Symbol, SymbolKind, SymbolTable};
use crate::token::Position;
use crate::types::{Field, StructDef, StructTable};

use super::{decode_type, AstBundle};

fn tokenize(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_whitespace() {
            i += 1;
            continue;
        }
        if chars[i] == '"' {
            let start = i;
            i += 1;
            while i < chars.len() && chars[i] != '"' {
                if chars[i] == '\\' && i + 1 < chars.len() {
                    i += 2;
                } else {
                    i += 1;
                }
            }
            i += 1; // closing quote
            out.push(chars[start..i.min(chars.len())].iter().collect());
            continue;
        }
        let start = i;
        while i < chars.len() && !chars[i].is_whitespace() {
            i += 1;
        }
        out.push(chars[start..i].iter().collect());
    }
    out
}

fn unescape_quoted(word: &str) -> String {
    let inner = word.strip_prefix('"').and_then(|s| s.strip_suffix('"')).unwrap_or(word);
    let mut out = String::new();
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn parse_hex_or_int(word: &str) -> Option<i64> {
    if let Some(hex) = word.strip_prefix("0x").or_else(|| word.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).ok();
    }
    word.parse().ok()
}

struct Reader {
    toks: Vec<String>,
    i: usize,
    file: String,
    node_ids: NodeIdGen,
    symbols: SymbolTable,
}

impl Reader {
    fn peek(&self) -> Option<&str> {
        self.toks.get(self.i).map(|s| s.as_str())
    }

    fn bump(&mut self) -> Result<String> {
        let t = self
            .toks
            .get(self.i)
            .cloned()
            .ok_or_else(|| Error::syntactic(Position::new(self.file.clone(), 0), "unexpected end of serialized AST"))?;
        self.i += 1;
        Ok(t)
    }

    fn expect(&mut self, word: &str) -> Result<()> {
        let got = self.bump()?;
        if got != word {
            return Err(Error::syntactic(
                Position::new(self.file.clone(), 0),
                format!("expected `{}', found `{}'", word, got),
            ));
        }
        Ok(())
    }

    fn bump_u16(&mut self) -> Result<u16> {
        let w = self.bump()?;
        w.parse().map_err(|_| Error::syntactic(Position::new(self.file.clone(), 0), format!("expected an integer, found `{}'", w)))
    }

    fn bump_u32(&mut self) -> Result<u32> {
        let w = self.bump()?;
        w.parse().map_err(|_| Error::syntactic(Position::new(self.file.clone(), 0), format!("expected an integer, found `{}'", w)))
    }

    fn bump_i32(&mut self) -> Result<i32> {
        let w = self.bump()?;
        w.parse().map_err(|_| Error::syntactic(Position::new(self.file.clone(), 0), format!("expected an integer, found `{}'", w)))
    }

    fn bump_opt_u16(&mut self) -> Result<Option<u16>> {
        let w = self.bump()?;
        if w == "-" {
            Ok(None)
        } else {
            w.parse().map(Some).map_err(|_| Error::syntactic(Position::new(self.file.clone(), 0), format!("expected an integer or `-', found `{}'", w)))
        }
    }

    fn bump_type(&mut self) -> Result<crate::types::Type> {
        let w = self.bump()?;
        decode_type(&w).ok_or_else(|| Error::syntactic(Position::new(self.file.clone(), 0), format!("malformed type `{}'", w)))
    }

    fn pos(&self, line: u32) -> Position {
        Position::new(self.file.clone(), line)
    }

    fn read_expr(&mut self) -> Result<Expr> {
        let op = self.bump()?;
        let id = self.node_ids.next();
        match op.as_str() {
            "LIT" => {
                let v = parse_hex_or_int(&self.bump()?).unwrap_or(0);
                let line = self.bump_u32()?;
                Ok(Expr::Literal {
                    id,
                    value: Literal::Int(v),
                    pos: self.pos(line),
                })
            }
            "STR" => {
                let s = unescape_quoted(&self.bump()?);
                let line = self.bump_u32()?;
                Ok(Expr::Literal {
                    id,
                    value: Literal::Str(s),
                    pos: self.pos(line),
                })
            }
            "ID" => {
                let name = self.bump()?;
                let line = self.bump_u32()?;
                Ok(Expr::Ident { id, name, pos: self.pos(line) })
            }
            "BINARY" => {
                let opname = self.bump()?;
                let line = self.bump_u32()?;
                let lhs = Box::new(self.read_expr()?);
                let rhs = Box::new(self.read_expr()?);
                Ok(Expr::Binary {
                    id,
                    op: binop_from_name(&opname).ok_or_else(|| Error::syntactic(self.pos(line), format!("unknown binary op `{}'", opname)))?,
                    lhs,
                    rhs,
                    pos: self.pos(line),
                })
            }
            "UNARY" => {
                let opname = self.bump()?;
                let line = self.bump_u32()?;
                let operand = Box::new(self.read_expr()?);
                Ok(Expr::Unary {
                    id,
                    op: unop_from_name(&opname).ok_or_else(|| Error::syntactic(self.pos(line), format!("unknown unary op `{}'", opname)))?,
                    operand,
                    pos: self.pos(line),
                })
            }
            "ASSIGN" => {
                let line = self.bump_u32()?;
                let lhs = Box::new(self.read_expr()?);
                let rhs = Box::new(self.read_expr()?);
                Ok(Expr::Assign { id, lhs, rhs, pos: self.pos(line) })
            }
            "CAST" => {
                let ty = self.bump_type()?;
                let line = self.bump_u32()?;
                let operand = Box::new(self.read_expr()?);
                Ok(Expr::Cast { id, ty, operand, pos: self.pos(line) })
            }
            "CALL" => {
                let name = self.bump()?;
                self.expect("ARGS")?;
                let n = self.bump_u32()?;
                let line = self.bump_u32()?;
                let mut args = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    args.push(self.read_expr()?);
                }
                Ok(Expr::Call { id, name, args, pos: self.pos(line) })
            }
            "INDEX" => {
                let line = self.bump_u32()?;
                let array = Box::new(self.read_expr()?);
                let index = Box::new(self.read_expr()?);
                Ok(Expr::Index { id, array, index, pos: self.pos(line) })
            }
            "FIELD" | "ARROW" => {
                let name = self.bump()?;
                let line = self.bump_u32()?;
                let obj = Box::new(self.read_expr()?);
                Ok(Expr::Field {
                    id,
                    obj,
                    name,
                    is_arrow: op == "ARROW",
                    pos: self.pos(line),
                })
            }
            "SIZEOF" => {
                let ty = self.bump_type()?;
                let line = self.bump_u32()?;
                Ok(Expr::SizeofType { id, ty, pos: self.pos(line) })
            }
            "ARRAYINIT" => {
                let n = self.bump_u32()?;
                let line = self.bump_u32()?;
                let mut elements = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    elements.push(self.read_expr()?);
                }
                Ok(Expr::ArrayInit { id, elements, pos: self.pos(line) })
            }
            other => Err(Error::syntactic(Position::new(self.file.clone(), 0), format!("unknown expression opcode `{}'", other))),
        }
    }

    fn read_stmt(&mut self) -> Result<Stmt> {
        let kw = self.bump()?;
        match kw.as_str() {
            "EXPR" => Ok(Stmt::Expr(self.read_expr()?)),
            "BLOCK" => {
                let n = self.bump_u32()?;
                let mut stmts = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    stmts.push(self.read_stmt()?);
                }
                Ok(Stmt::Block(stmts))
            }
            "IF" => {
                let cond = self.read_expr()?;
                self.expect("THEN")?;
                let then_branch = Box::new(self.read_stmt()?);
                let else_branch = if self.peek() == Some("ELSE") {
                    self.bump()?;
                    Some(Box::new(self.read_stmt()?))
                } else {
                    None
                };
                self.expect("ENDIF")?;
                Ok(Stmt::If { cond, then_branch, else_branch })
            }
            "WHILE" => {
                let cond = self.read_expr()?;
                self.expect("DO")?;
                let body = Box::new(self.read_stmt()?);
                self.expect("ENDWHILE")?;
                Ok(Stmt::While { cond, body })
            }
            "FOR" => {
                self.expect("INIT")?;
                let has_init = self.bump_u16()? != 0;
                let init = if has_init { Some(Box::new(self.read_stmt()?)) } else { None };
                self.expect("COND")?;
                let has_cond = self.bump_u16()? != 0;
                let cond = if has_cond { Some(self.read_expr()?) } else { None };
                self.expect("POST")?;
                let has_post = self.bump_u16()? != 0;
                let post = if has_post { Some(self.read_expr()?) } else { None };
                self.expect("DO")?;
                let body = Box::new(self.read_stmt()?);
                self.expect("ENDFOR")?;
                Ok(Stmt::For { init, cond, post, body })
            }
            "RETURN" => {
                let has_value = self.bump_u16()? != 0;
                let line = self.bump_u32()?;
                let value = if has_value { Some(self.read_expr()?) } else { None };
                Ok(Stmt::Return { value, pos: self.pos(line) })
            }
            "BREAK" => Ok(Stmt::Break(self.pos(self.bump_u32()?))),
            "CONTINUE" => Ok(Stmt::Continue(self.pos(self.bump_u32()?))),
            "GOTO" => {
                let label = self.bump()?;
                let line = self.bump_u32()?;
                Ok(Stmt::Goto { label, pos: self.pos(line) })
            }
            "LABEL" => Ok(Stmt::Label(self.bump()?)),
            "ASM" => {
                let line = self.bump_u32()?;
                let text = unescape_quoted(&self.bump()?);
                Ok(Stmt::Asm { text, pos: self.pos(line) })
            }
            "LOCALDECL" => Ok(Stmt::LocalDecl(Box::new(self.read_local_decl()?))),
            other => Err(Error::syntactic(Position::new(self.file.clone(), 0), format!("unknown statement keyword `{}'", other))),
        }
    }

    fn read_local_decl(&mut self) -> Result<Decl> {
        let kw = self.bump()?;
        match kw.as_str() {
            "CONST" | "CONSTARRAY" => {
                let (decl, storage) = self.read_const_body(kw == "CONSTARRAY")?;
                if let Decl::Const { name, ty, value, array_length, pos } = &decl {
                    let const_value = match value {
                        Expr::Literal { value: Literal::Int(v), .. } => Some(*v),
                        _ => None,
                    };
                    let sym_ty = match array_length {
                        Some(n) => crate::types::Type::array(ty.clone(), *n),
                        None => ty.clone(),
                    };
                    let pos = pos.clone();
                    if self
                        .symbols
                        .insert(Symbol {
                            name: name.clone(),
                            kind: SymbolKind::Const,
                            ty: sym_ty,
                            const_value,
                            storage,
                            offset: 0,
                            is_public: crate::symtab::is_public_name(name),
                        })
                        .is_some()
                    {
                        return Err(Error::semantic(pos, format!("duplicate definition of `{}'", name)));
                    }
                }
                Ok(decl)
            }
            "VAR" => {
                let name = self.bump()?;
                let ty = self.bump_type()?;
                let array_length = self.bump_opt_u16()?;
                self.expect("LOCAL")?;
                let _offset = self.bump_i32()?;
                let line = self.bump_u32()?;
                self.expect("HASINIT")?;
                let has_init = self.bump_u16()? != 0;
                let init = if has_init { Some(self.read_expr()?) } else { None };
                Ok(Decl::Var {
                    name,
                    ty,
                    array_length,
                    init,
                    pos: self.pos(line),
                })
            }
            other => Err(Error::syntactic(Position::new(self.file.clone(), 0), format!("expected a local declaration, found `{}'", other))),
        }
    }

    fn read_const_body(&mut self, is_array: bool) -> Result<(Decl, Storage)> {
        let name = self.bump()?;
        let ty = self.bump_type()?;
        let storage = storage_from_word(&self.bump()?);
        let array_length = if is_array { Some(self.bump_u16()?) } else { None };
        let line = self.bump_u32()?;
        let value = self.read_expr()?;
        Ok((
            Decl::Const {
                name,
                ty,
                value,
                array_length,
                pos: self.pos(line),
            },
            storage,
        ))
    }
}

fn storage_from_word(w: &str) -> Storage {
    match w {
        "GLOBAL" => Storage::Global,
        "STATIC" => Storage::Static,
        "PARAM" => Storage::Param,
        _ => Storage::Local,
    }
}

fn binop_from_name(s: &str) -> Option<BinOp> {
    Some(match s {
        "ADD" => BinOp::Add,
        "SUB" => BinOp::Sub,
        "MUL" => BinOp::Mul,
        "DIV" => BinOp::Div,
        "MOD" => BinOp::Mod,
        "AND" => BinOp::BitAnd,
        "OR" => BinOp::BitOr,
        "XOR" => BinOp::BitXor,
        "SHL" => BinOp::Shl,
        "SHR" => BinOp::Shr,
        "EQ" => BinOp::Eq,
        "NE" => BinOp::Ne,
        "LT" => BinOp::Lt,
        "LE" => BinOp::Le,
        "GT" => BinOp::Gt,
        "GE" => BinOp::Ge,
        "LAND" => BinOp::And,
        "LOR" => BinOp::Or,
        _ => return None,
    })
}

fn unop_from_name(s: &str) -> Option<UnOp> {
    Some(match s {
        "NEG" => UnOp::Neg,
        "NOT" => UnOp::BitNot,
        "LNOT" => UnOp::Not,
        "ADDR" => UnOp::Addr,
        "DEREF" => UnOp::Deref,
        _ => return None,
    })
}

fn collect_labels(stmts: &[Stmt], labels: &mut IndexMap<String, usize>, pos: &Position) -> Result<()> {
    fn walk(stmt: &Stmt, labels: &mut IndexMap<String, usize>, pos: &Position) -> Result<()> {
        match stmt {
            Stmt::Label(name) => {
                if labels.contains_key(name) {
                    return Err(Error::semantic(pos.clone(), format!("duplicate label `{}'", name)));
                }
                let n = labels.len();
                labels.insert(name.clone(), n);
            }
            Stmt::Block(stmts) => {
                for s in stmts {
                    walk(s, labels, pos)?;
                }
            }
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => {
                walk(then_branch, labels, pos)?;
                if let Some(e) = else_branch {
                    walk(e, labels, pos)?;
                }
            }
            Stmt::While { body, .. } => walk(body, labels, pos)?,
            Stmt::For { body, .. } => walk(body, labels, pos)?,
            _ => {}
        }
        Ok(())
    }
    for s in stmts {
        walk(s, labels, pos)?;
    }
    Ok(())
}

/// Parse the serialized AST text emitted by `yaparse` back into a
/// [`Program`] plus its resolved [`SymbolTable`]/[`StructTable`].
pub fn read_program(text: &str, file: &str) -> Result<AstBundle> {
    let mut r = Reader {
        toks: tokenize(text),
        i: 0,
        file: file.to_string(),
        node_ids: NodeIdGen::new(),
        symbols: SymbolTable::new(),
    };
    let mut decls = Vec::new();
    let mut structs = StructTable::new();

    while r.peek().is_some() {
        let kw = r.bump()?;
        match kw.as_str() {
            "STRUCT" => {
                let name = r.bump()?;
                r.expect("SIZE")?;
                let size = r.bump_u16()?;
                r.expect("ALIGN")?;
                let align = r.bump_u16()?;
                let line = r.bump_u32()?;
                let mut fields = Vec::new();
                let mut ast_fields = Vec::new();
                while r.peek() == Some("FIELD") {
                    r.bump()?;
                    let fname = r.bump()?;
                    let fty = r.bump_type()?;
                    let flen = r.bump_opt_u16()?;
                    let foffset = r.bump_u16()?;
                    fields.push(Field {
                        name: fname.clone(),
                        ty: fty.clone(),
                        array_length: flen,
                        offset: foffset,
                    });
                    ast_fields.push(FieldDecl {
                        name: fname,
                        ty: fty,
                        array_length: flen,
                        pos: r.pos(line),
                    });
                }
                r.expect("ENDSTRUCT")?;
                if structs
                    .insert(StructDef {
                        name: name.clone(),
                        fields,
                        size,
                        align,
                    })
                    .is_some()
                {
                    return Err(Error::semantic(r.pos(line), format!("duplicate definition of struct `{}'", name)));
                }
                decls.push(Decl::Struct {
                    name,
                    fields: ast_fields,
                    pos: r.pos(line),
                });
            }
            "CONST" | "CONSTARRAY" => {
                let (decl, storage) = r.read_const_body(kw == "CONSTARRAY")?;
                if let Decl::Const { name, ty, value, array_length, pos } = &decl {
                    let const_value = match value {
                        Expr::Literal { value: Literal::Int(v), .. } => Some(*v),
                        _ => None,
                    };
                    let sym_ty = match array_length {
                        Some(n) => crate::types::Type::array(ty.clone(), *n),
                        None => ty.clone(),
                    };
                    let pos = pos.clone();
                    if r
                        .symbols
                        .insert(Symbol {
                            name: name.clone(),
                            kind: SymbolKind::Const,
                            ty: sym_ty,
                            const_value,
                            storage,
                            offset: 0,
                            is_public: crate::symtab::is_public_name(name),
                        })
                        .is_some()
                    {
                        return Err(Error::semantic(pos, format!("duplicate definition of `{}'", name)));
                    }
                }
                decls.push(decl);
            }
            "VAR" => {
                let name = r.bump()?;
                let ty = r.bump_type()?;
                let array_length = r.bump_opt_u16()?;
                let storage_word = r.bump()?;
                let offset = r.bump_i32()?;
                let line = r.bump_u32()?;
                r.expect("HASINIT")?;
                let has_init = r.bump_u16()? != 0;
                let init = if has_init { Some(r.read_expr()?) } else { None };
                let storage = match storage_word.as_str() {
                    "GLOBAL" => Storage::Global,
                    "STATIC" => Storage::Static,
                    "PARAM" => Storage::Param,
                    _ => Storage::Local,
                };
                let sym_ty = match array_length {
                    Some(n) => crate::types::Type::array(ty.clone(), n),
                    None => ty.clone(),
                };
                if r
                    .symbols
                    .insert(Symbol {
                        name: name.clone(),
                        kind: SymbolKind::Var,
                        ty: sym_ty,
                        const_value: None,
                        storage,
                        offset,
                        is_public: crate::symtab::is_public_name(&name),
                    })
                    .is_some()
                {
                    return Err(Error::semantic(r.pos(line), format!("duplicate definition of `{}'", name)));
                }
                decls.push(Decl::Var {
                    name,
                    ty,
                    array_length,
                    init,
                    pos: r.pos(line),
                });
            }
            "EXTERN" => {
                let name = r.bump()?;
                let ty = r.bump_type()?;
                let line = r.bump_u32()?;
                if r
                    .symbols
                    .insert(Symbol {
                        name: name.clone(),
                        kind: SymbolKind::Var,
                        ty: ty.clone(),
                        const_value: None,
                        storage: Storage::Global,
                        offset: 0,
                        is_public: crate::symtab::is_public_name(&name),
                    })
                    .is_some()
                {
                    return Err(Error::semantic(r.pos(line), format!("duplicate definition of `{}'", name)));
                }
                decls.push(Decl::Extern { name, ty, pos: r.pos(line) });
            }
            "ASM" => {
                let line = r.bump_u32()?;
                let text = unescape_quoted(&r.bump()?);
                decls.push(Decl::Asm { text, pos: r.pos(line) });
            }
            "FUNC" => {
                let name = r.bump()?;
                let return_type = r.bump_type()?;
                let vis = r.bump()?;
                r.expect("PARAMS")?;
                let nparams = r.bump_u32()?;
                let line = r.bump_u32()?;

                let mut params = Vec::new();
                let mut sym_params = Vec::new();
                for idx in 0..nparams {
                    r.expect("PARAM")?;
                    let pname = r.bump()?;
                    let pty = r.bump_type()?;
                    let _reg = r.bump()?;
                    let _stackoff = r.bump()?;
                    sym_params.push(Param {
                        name: pname.clone(),
                        ty: pty.clone(),
                        index: idx as usize,
                    });
                    params.push((pname, pty));
                }

                r.expect("LOCALS")?;
                let nlocals = r.bump_u32()?;
                let mut locals = Vec::new();
                for _ in 0..nlocals {
                    r.expect("LOCAL")?;
                    let lname = r.bump()?;
                    let lty = r.bump_type()?;
                    let loffset = r.bump_i32()?;
                    locals.push(Local {
                        name: lname,
                        ty: lty,
                        offset: loffset,
                    });
                }

                r.expect("FRAMESIZE")?;
                let frame_size = r.bump_u16()?;
                r.expect("BODY")?;
                let mut body = Vec::new();
                while r.peek() != Some("ENDFUNC") {
                    body.push(r.read_stmt()?);
                }
                r.expect("ENDFUNC")?;

                let mut labels = IndexMap::new();
                collect_labels(&body, &mut labels, &r.pos(line))?;

                if r
                    .symbols
                    .insert_function(FunctionSymbol {
                        name: name.clone(),
                        return_type: return_type.clone(),
                        params: sym_params,
                        locals,
                        labels,
                        frame_size,
                        is_public: vis == "PUBLIC",
                    })
                    .is_some()
                {
                    return Err(Error::semantic(r.pos(line), format!("duplicate definition of `{}'", name)));
                }
                decls.push(Decl::Func {
                    name,
                    return_type,
                    params,
                    body,
                    pos: r.pos(line),
                });
            }
            other => {
                return Err(Error::syntactic(
                    Position::new(r.file.clone(), 0),
                    format!("unknown top-level keyword `{}' in serialized AST", other),
                ))
            }
        }
    }

    Ok(AstBundle {
        program: Program { decls },
        symbols: r.symbols,
        structs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast_io::write_program;

    #[test]
    fn round_trips_globals_struct_and_function() {
        let src = r#"
            struct Point { int16 x; int16 y; }
            const int16 N = 3 + 4;
            var uint8 Buf[8];
            func int16 add(int16 a, int16 b) { var int16 total; total = a + b; return total; }
        "#;
        let lexed = crate::lexer::run(src, "t.yapl").unwrap();
        let parsed = crate::parser::parse(&lexed.text).unwrap();

        let text = write_program(&parsed.program, &parsed.symbols, &parsed.structs);
        let bundle = read_program(&text, "t.yapl").unwrap();

        assert_eq!(bundle.program.decls.len(), parsed.program.decls.len());
        assert_eq!(bundle.symbols.get("N").unwrap().const_value, Some(7));
        assert!(bundle.structs.get("Point").is_some());
        let f = bundle.symbols.get_function("add").unwrap();
        assert_eq!(f.frame_size, parsed.symbols.get_function("add").unwrap().frame_size);
    }

    #[test]
    fn round_trips_control_flow_and_labels() {
        let src = "func void f() { goto done; if (1) { break; } else { continue; } while (1) { } for (var int16 i; i < 1; i = i + 1) { } done: return; }";
        let lexed = crate::lexer::run(src, "t.yapl").unwrap();
        let parsed = crate::parser::parse(&lexed.text).unwrap();
        let text = write_program(&parsed.program, &parsed.symbols, &parsed.structs);
        let bundle = read_program(&text, "t.yapl").unwrap();
        let f = bundle.symbols.get_function("f").unwrap();
        assert!(f.labels.contains_key("done"));
    }

    #[test]
    fn local_const_keeps_static_storage_across_round_trip() {
        let src = "func int16 f() { const int16 X = 5; return X; }";
        let lexed = crate::lexer::run(src, "t.yapl").unwrap();
        let parsed = crate::parser::parse(&lexed.text).unwrap();
        assert_eq!(parsed.symbols.get("X").unwrap().storage, Storage::Static);

        let text = write_program(&parsed.program, &parsed.symbols, &parsed.structs);
        let bundle = read_program(&text, "t.yapl").unwrap();

        let sym = bundle.symbols.get("X").unwrap();
        assert_eq!(sym.storage, Storage::Static);
        assert_eq!(sym.const_value, Some(5));
    }
}
