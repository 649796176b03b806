//! The parser: recursive descent from a token stream into a typed AST, a
//! symbol table, and struct layout (spec §4.2).
//!
//! Grammar, precedence, and layout rules all follow spec §4.2 directly; the
//! offset-bookkeeping style (compute every offset in one declarative pass
//! before anything downstream reads it) mirrors the teacher's
//! `write::SectionOffsets`.

use indexmap::IndexMap;

use crate::ast::{BinOp, Decl, Expr, FieldDecl, Literal, NodeIdGen, Program, Stmt, UnOp};
use crate::error::{Error, Result};
use crate::lexer::TokenStreamReader;
use crate::symtab::{is_public_name, FunctionSymbol, Local, Param, Storage, Symbol, SymbolKind, SymbolTable};
use crate::token::{Position, Token, TokenKind};
use crate::types::{align_down, align_up, BaseType, Field, StructDef, StructTable, Type};

/// Everything the parser produces for one translation unit.
pub struct ParseOutput {
    pub program: Program,
    pub symbols: SymbolTable,
    pub structs: StructTable,
}

struct FuncCtx {
    locals: Vec<Local>,
    cursor: i32,
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    node_ids: NodeIdGen,
    symbols: SymbolTable,
    structs: StructTable,
    func_ctx: Option<FuncCtx>,
}

/// Parse a token-stream text (as emitted by [`crate::lexer::run`]) into a
/// [`ParseOutput`].
pub fn parse(token_text: &str) -> Result<ParseOutput> {
    log::debug!("parsing {} byte(s) of token stream", token_text.len());
    let mut reader = TokenStreamReader::new(token_text);
    let mut tokens = Vec::new();
    while let Some(tok) = reader.next_token()? {
        let is_eof = tok.is_eof();
        tokens.push(tok);
        if is_eof {
            break;
        }
    }
    if tokens.last().map(|t| !t.is_eof()).unwrap_or(true) {
        let pos = tokens.last().map(|t| t.position()).unwrap_or_else(|| Position::new("", 1));
        tokens.push(Token::eof(pos.file, pos.line));
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        node_ids: NodeIdGen::new(),
        symbols: SymbolTable::new(),
        structs: StructTable::new(),
        func_ctx: None,
    };
    let program = parser.parse_program()?;
    log::debug!("parsed {} top-level declaration(s)", program.decls.len());
    Ok(ParseOutput {
        program,
        symbols: parser.symbols,
        structs: parser.structs,
    })
}

fn parse_hex_u16(text: &str) -> Option<u16> {
    let hex = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))?;
    u16::from_str_radix(hex, 16).ok()
}

fn unescape(inner: &str) -> String {
    let mut out = String::new();
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

impl Parser {
    fn cur(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn at_eof(&self) -> bool {
        self.cur().is_eof()
    }

    fn bump(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn err(&self, msg: impl Into<String>) -> Error {
        Error::syntactic(self.cur().position(), msg)
    }

    fn is_kw(&self, text: &str) -> bool {
        self.cur().is(TokenKind::Keyword, text)
    }

    fn is_punct(&self, text: &str) -> bool {
        self.cur().is(TokenKind::Punctuation, text)
    }

    fn eat_punct(&mut self, text: &str) -> Result<Token> {
        if self.is_punct(text) {
            Ok(self.bump())
        } else {
            Err(self.err(format!("expected `{}', found `{}'", text, self.cur().text)))
        }
    }

    fn eat_kw(&mut self, text: &str) -> Result<Token> {
        if self.is_kw(text) {
            Ok(self.bump())
        } else {
            Err(self.err(format!("expected `{}', found `{}'", text, self.cur().text)))
        }
    }

    fn eat_ident(&mut self) -> Result<Token> {
        if self.cur().kind == TokenKind::Identifier {
            Ok(self.bump())
        } else {
            Err(self.err(format!("expected an identifier, found `{}'", self.cur().text)))
        }
    }

    fn eat_literal(&mut self) -> Result<Token> {
        if self.cur().kind == TokenKind::Literal {
            Ok(self.bump())
        } else {
            Err(self.err(format!("expected a literal, found `{}'", self.cur().text)))
        }
    }

    /// Parse a literal token into an AST [`Literal`].
    fn literal_value(&self, tok: &Token) -> Literal {
        if let Some(inner) = tok.text.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
            Literal::Str(unescape(inner))
        } else {
            Literal::Int(parse_hex_u16(&tok.text).unwrap_or(0) as i64)
        }
    }

    // ---- Types -----------------------------------------------------

    /// `Type` in expression-context (prefix) notation: `@T` pointer, `[N]T`
    /// array (`N` must already be a single literal token — an arithmetic
    /// dimension expression inside a cast/`sizeof` is not supported; only
    /// declaration-position array bounds are lexer-folded).
    fn parse_type(&mut self) -> Result<Type> {
        if self.is_punct("@") {
            self.bump();
            return Ok(Type::pointer(self.parse_type()?));
        }
        if self.is_punct("[") {
            self.bump();
            let lit = self.eat_literal()?;
            let n = parse_hex_u16(&lit.text)
                .ok_or_else(|| Error::syntactic(lit.position(), "malformed array dimension"))?;
            self.eat_punct("]")?;
            let elem = self.parse_type()?;
            return Ok(Type::array(elem, n));
        }
        if self.is_kw("void") {
            self.bump();
            return Ok(Type::Void);
        }
        if self.cur().kind == TokenKind::Keyword {
            let text = self.cur().text.clone();
            if let Some(bt) = BaseType::from_name(&text) {
                self.bump();
                return Ok(Type::Base(bt));
            }
            return Err(self.err(format!("`{}' is not a type", text)));
        }
        if self.cur().kind == TokenKind::Identifier {
            let name = self.bump().text;
            return Ok(Type::Struct(name));
        }
        Err(self.err("expected a type"))
    }

    /// An optional postfix `[N]` on a declared name — `N` is always a
    /// single literal here because the lexer already folded it (spec
    /// §4.1 "Declaration folding").
    fn parse_decl_array_len(&mut self) -> Result<Option<u16>> {
        if !self.is_punct("[") {
            return Ok(None);
        }
        self.bump();
        let lit = self.eat_literal()?;
        let n = parse_hex_u16(&lit.text)
            .ok_or_else(|| Error::syntactic(lit.position(), "malformed array dimension"))?;
        self.eat_punct("]")?;
        Ok(Some(n))
    }

    // ---- Program / declarations -------------------------------------

    fn parse_program(&mut self) -> Result<Program> {
        let mut decls = Vec::new();
        while !self.at_eof() {
            decls.push(self.parse_decl()?);
        }
        Ok(Program { decls })
    }

    fn parse_decl(&mut self) -> Result<Decl> {
        if self.is_kw("struct") {
            self.parse_struct_decl()
        } else if self.is_kw("const") {
            self.parse_const_decl(Storage::Global)
        } else if self.is_kw("var") {
            self.parse_var_decl(Storage::Global)
        } else if self.is_kw("func") {
            self.parse_func_decl()
        } else if self.is_kw("extern") {
            self.parse_extern_decl()
        } else if self.cur().is(TokenKind::Keyword, "#asm") {
            self.parse_asm_decl()
        } else {
            Err(self.err(format!("expected a declaration, found `{}'", self.cur().text)))
        }
    }

    fn parse_asm_decl(&mut self) -> Result<Decl> {
        let pos = self.cur().position();
        self.bump();
        let lit = self.eat_literal()?;
        let text = match self.literal_value(&lit) {
            Literal::Str(s) => s,
            Literal::Int(_) => return Err(Error::syntactic(pos, "#asm requires a string literal")),
        };
        Ok(Decl::Asm { text, pos })
    }

    fn parse_struct_decl(&mut self) -> Result<Decl> {
        let pos = self.cur().position();
        self.bump();
        let name = self.eat_ident()?.text;
        self.eat_punct("{")?;

        let mut layout_fields = Vec::new();
        let mut ast_fields = Vec::new();
        let mut cursor: u16 = 0;
        let mut max_align: u16 = 2;

        while !self.is_punct("}") {
            let field_pos = self.cur().position();
            let ty = self.parse_type()?;
            let fname = self.eat_ident()?.text;
            let array_length = self.parse_decl_array_len()?;
            self.eat_punct(";")?;

            let stored_ty = match array_length {
                Some(n) => Type::array(ty.clone(), n),
                None => ty.clone(),
            };
            let size = stored_ty
                .size(&self.structs)
                .ok_or_else(|| Error::semantic(field_pos.clone(), format!("field `{}' has unknown size", fname)))?;
            let align = stored_ty
                .align(&self.structs)
                .ok_or_else(|| Error::semantic(field_pos.clone(), format!("field `{}' has unknown alignment", fname)))?;

            let offset = align_up(cursor, align);
            cursor = offset + size;
            max_align = max_align.max(align);

            layout_fields.push(Field {
                name: fname.clone(),
                ty: ty.clone(),
                array_length,
                offset,
            });
            ast_fields.push(FieldDecl {
                name: fname,
                ty,
                array_length,
                pos: field_pos,
            });
        }
        self.eat_punct("}")?;
        if self.is_punct(";") {
            self.bump();
        }

        let size = align_up(cursor, max_align);
        if self
            .structs
            .insert(StructDef {
                name: name.clone(),
                fields: layout_fields,
                size,
                align: max_align,
            })
            .is_some()
        {
            return Err(Error::semantic(pos, format!("duplicate definition of struct `{}'", name)));
        }

        Ok(Decl::Struct {
            name,
            fields: ast_fields,
            pos,
        })
    }

    fn parse_const_decl(&mut self, storage: Storage) -> Result<Decl> {
        let pos = self.cur().position();
        self.bump();
        let ty = self.parse_type()?;
        let name = self.eat_ident()?.text;
        let array_length = self.parse_decl_array_len()?;
        self.eat_punct("=")?;
        let value_tok = self.eat_literal()?;
        let value_lit = self.literal_value(&value_tok);
        self.eat_punct(";")?;

        let const_value = match &value_lit {
            Literal::Int(n) => Some(*n),
            Literal::Str(_) => None,
        };
        let sym_ty = match array_length {
            Some(n) => Type::array(ty.clone(), n),
            None => ty.clone(),
        };
        if self
            .symbols
            .insert(Symbol {
                is_public: is_public_name(&name),
                name: name.clone(),
                kind: SymbolKind::Const,
                ty: sym_ty,
                const_value,
                storage,
                offset: 0,
            })
            .is_some()
        {
            return Err(Error::semantic(pos, format!("duplicate definition of `{}'", name)));
        }

        let value = Expr::Literal {
            id: self.node_ids.next(),
            value: value_lit,
            pos: value_tok.position(),
        };
        Ok(Decl::Const {
            name,
            ty,
            value,
            array_length,
            pos,
        })
    }

    fn parse_var_decl(&mut self, storage: Storage) -> Result<Decl> {
        let pos = self.cur().position();
        self.bump();
        let ty = self.parse_type()?;
        let name = self.eat_ident()?.text;
        let array_length = self.parse_decl_array_len()?;

        let init = if self.is_punct("=") {
            self.bump();
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.eat_punct(";")?;

        let sym_ty = match array_length {
            Some(n) => Type::array(ty.clone(), n),
            None => ty.clone(),
        };

        if let Some(ctx) = self.func_ctx.as_mut() {
            let size = sym_ty.size(&self.structs).unwrap_or(2);
            let align = sym_ty.align(&self.structs).unwrap_or(2);
            ctx.cursor -= size as i32;
            ctx.cursor = -(align_down((-ctx.cursor) as u16, align) as i32);
            ctx.locals.push(Local {
                name: name.clone(),
                ty: sym_ty,
                offset: ctx.cursor,
            });
        } else if self
            .symbols
            .insert(Symbol {
                is_public: is_public_name(&name),
                name: name.clone(),
                kind: SymbolKind::Var,
                ty: sym_ty,
                const_value: None,
                storage,
                offset: 0,
            })
            .is_some()
        {
            return Err(Error::semantic(pos, format!("duplicate definition of `{}'", name)));
        }

        Ok(Decl::Var {
            name,
            ty,
            array_length,
            init,
            pos,
        })
    }

    fn parse_extern_decl(&mut self) -> Result<Decl> {
        let pos = self.cur().position();
        self.bump();
        let ty = self.parse_type()?;
        let name = self.eat_ident()?.text;
        self.eat_punct(";")?;
        if self
            .symbols
            .insert(Symbol {
                is_public: is_public_name(&name),
                name: name.clone(),
                kind: SymbolKind::Var,
                ty: ty.clone(),
                const_value: None,
                storage: Storage::Global,
                offset: 0,
            })
            .is_some()
        {
            return Err(Error::semantic(pos, format!("duplicate definition of `{}'", name)));
        }
        Ok(Decl::Extern { name, ty, pos })
    }

    fn parse_func_decl(&mut self) -> Result<Decl> {
        let pos = self.cur().position();
        self.bump();
        let return_type = self.parse_type()?;
        let name = self.eat_ident()?.text;
        self.eat_punct("(")?;
        let mut params = Vec::new();
        if !self.is_punct(")") {
            loop {
                let pty = self.parse_type()?;
                let pname = self.eat_ident()?.text;
                params.push((pname, pty));
                if self.is_punct(",") {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        self.eat_punct(")")?;

        let sym_params: Vec<Param> = params
            .iter()
            .enumerate()
            .map(|(i, (n, t))| Param {
                name: n.clone(),
                ty: t.clone(),
                index: i,
            })
            .collect();

        self.func_ctx = Some(FuncCtx {
            locals: Vec::new(),
            cursor: 0,
        });

        self.eat_punct("{")?;
        let mut body = Vec::new();
        while !self.is_punct("}") {
            body.push(self.parse_stmt()?);
        }
        self.eat_punct("}")?;

        let ctx = self.func_ctx.take().unwrap();
        let frame_size = align_up((-ctx.cursor).unsigned_abs() as u16, 2);

        let mut labels = IndexMap::new();
        collect_labels(&body, &mut labels, &pos)?;

        if self
            .symbols
            .insert_function(FunctionSymbol {
                name: name.clone(),
                return_type: return_type.clone(),
                params: sym_params,
                locals: ctx.locals,
                labels,
                frame_size,
                is_public: is_public_name(&name),
            })
            .is_some()
        {
            return Err(Error::semantic(pos, format!("duplicate definition of `{}'", name)));
        }

        Ok(Decl::Func {
            name,
            return_type,
            params,
            body,
            pos,
        })
    }

    // ---- Statements ---------------------------------------------------

    fn parse_stmt(&mut self) -> Result<Stmt> {
        if self.is_punct("{") {
            self.bump();
            let mut stmts = Vec::new();
            while !self.is_punct("}") {
                stmts.push(self.parse_stmt()?);
            }
            self.eat_punct("}")?;
            return Ok(Stmt::Block(stmts));
        }
        if self.is_kw("if") {
            self.bump();
            self.eat_punct("(")?;
            let cond = self.parse_expr()?;
            self.eat_punct(")")?;
            let then_branch = Box::new(self.parse_stmt()?);
            let else_branch = if self.is_kw("else") {
                self.bump();
                Some(Box::new(self.parse_stmt()?))
            } else {
                None
            };
            return Ok(Stmt::If {
                cond,
                then_branch,
                else_branch,
            });
        }
        if self.is_kw("while") {
            self.bump();
            self.eat_punct("(")?;
            let cond = self.parse_expr()?;
            self.eat_punct(")")?;
            let body = Box::new(self.parse_stmt()?);
            return Ok(Stmt::While { cond, body });
        }
        if self.is_kw("for") {
            self.bump();
            self.eat_punct("(")?;
            let init = if self.is_punct(";") {
                None
            } else {
                Some(Box::new(self.parse_simple_stmt()?))
            };
            self.eat_punct(";")?;
            let cond = if self.is_punct(";") { None } else { Some(self.parse_expr()?) };
            self.eat_punct(";")?;
            let post = if self.is_punct(")") { None } else { Some(self.parse_expr()?) };
            self.eat_punct(")")?;
            let body = Box::new(self.parse_stmt()?);
            return Ok(Stmt::For { init, cond, post, body });
        }
        if self.is_kw("return") {
            let pos = self.cur().position();
            self.bump();
            let value = if self.is_punct(";") { None } else { Some(self.parse_expr()?) };
            self.eat_punct(";")?;
            return Ok(Stmt::Return { value, pos });
        }
        if self.is_kw("break") {
            let pos = self.cur().position();
            self.bump();
            self.eat_punct(";")?;
            return Ok(Stmt::Break(pos));
        }
        if self.is_kw("continue") {
            let pos = self.cur().position();
            self.bump();
            self.eat_punct(";")?;
            return Ok(Stmt::Continue(pos));
        }
        if self.is_kw("goto") {
            let pos = self.cur().position();
            self.bump();
            let label = self.eat_ident()?.text;
            self.eat_punct(";")?;
            return Ok(Stmt::Goto { label, pos });
        }
        if self.cur().is(TokenKind::Keyword, "#asm") {
            let pos = self.cur().position();
            self.bump();
            let lit = self.eat_literal()?;
            let text = match self.literal_value(&lit) {
                Literal::Str(s) => s,
                Literal::Int(_) => return Err(Error::syntactic(pos, "#asm requires a string literal")),
            };
            return Ok(Stmt::Asm { text, pos });
        }
        if self.is_kw("const") {
            return Ok(Stmt::LocalDecl(Box::new(self.parse_const_decl(Storage::Static)?)));
        }
        if self.is_kw("var") {
            return Ok(Stmt::LocalDecl(Box::new(self.parse_var_decl(Storage::Local)?)));
        }
        // A label: `ident ':'`.
        if self.cur().kind == TokenKind::Identifier && self.peek_at(1).map(|t| t.is(TokenKind::Punctuation, ":")).unwrap_or(false) {
            let name = self.bump().text;
            self.bump(); // ':'
            return Ok(Stmt::Label(name));
        }
        self.parse_simple_stmt()
    }

    fn parse_simple_stmt(&mut self) -> Result<Stmt> {
        let expr = self.parse_expr()?;
        self.eat_punct(";")?;
        Ok(Stmt::Expr(expr))
    }

    fn peek_at(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n)
    }

    // ---- Expressions ----------------------------------------------------
    //
    // Precedence, weakest to strongest, per spec §4.2: assignment (lowest,
    // right-associative), `||`, `&&`, `==/!=/<=/>=/</>`, `+/-/|/^`,
    // `*///%/&/<</>>`, unary `- ~ ! @ &`, postfix `( ) [ ] . ->`.

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_assign()
    }

    fn parse_assign(&mut self) -> Result<Expr> {
        let lhs = self.parse_or()?;
        if self.is_punct("=") {
            let pos = self.cur().position();
            self.bump();
            let rhs = self.parse_assign()?;
            return Ok(Expr::Assign {
                id: self.node_ids.next(),
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            });
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while self.is_punct("||") {
            let pos = self.cur().position();
            self.bump();
            let rhs = self.parse_and()?;
            lhs = Expr::Binary {
                id: self.node_ids.next(),
                op: BinOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_rel()?;
        while self.is_punct("&&") {
            let pos = self.cur().position();
            self.bump();
            let rhs = self.parse_rel()?;
            lhs = Expr::Binary {
                id: self.node_ids.next(),
                op: BinOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn parse_rel(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_addlevel()?;
        loop {
            let op = match self.cur().text.as_str() {
                "==" if self.cur().kind == TokenKind::Punctuation => BinOp::Eq,
                "!=" if self.cur().kind == TokenKind::Punctuation => BinOp::Ne,
                "<=" if self.cur().kind == TokenKind::Punctuation => BinOp::Le,
                ">=" if self.cur().kind == TokenKind::Punctuation => BinOp::Ge,
                "<" if self.cur().kind == TokenKind::Punctuation => BinOp::Lt,
                ">" if self.cur().kind == TokenKind::Punctuation => BinOp::Gt,
                _ => break,
            };
            let pos = self.cur().position();
            self.bump();
            let rhs = self.parse_addlevel()?;
            lhs = Expr::Binary {
                id: self.node_ids.next(),
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn parse_addlevel(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_mullevel()?;
        loop {
            let op = match self.cur().text.as_str() {
                "+" if self.cur().kind == TokenKind::Punctuation => BinOp::Add,
                "-" if self.cur().kind == TokenKind::Punctuation => BinOp::Sub,
                "|" if self.cur().kind == TokenKind::Punctuation => BinOp::BitOr,
                "^" if self.cur().kind == TokenKind::Punctuation => BinOp::BitXor,
                _ => break,
            };
            let pos = self.cur().position();
            self.bump();
            let rhs = self.parse_mullevel()?;
            lhs = Expr::Binary {
                id: self.node_ids.next(),
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn parse_mullevel(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.cur().text.as_str() {
                "*" if self.cur().kind == TokenKind::Punctuation => BinOp::Mul,
                "/" if self.cur().kind == TokenKind::Punctuation => BinOp::Div,
                "%" if self.cur().kind == TokenKind::Punctuation => BinOp::Mod,
                "&" if self.cur().kind == TokenKind::Punctuation => BinOp::BitAnd,
                "<<" if self.cur().kind == TokenKind::Punctuation => BinOp::Shl,
                ">>" if self.cur().kind == TokenKind::Punctuation => BinOp::Shr,
                _ => break,
            };
            let pos = self.cur().position();
            self.bump();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                id: self.node_ids.next(),
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let op = match self.cur().text.as_str() {
            "-" if self.cur().kind == TokenKind::Punctuation => Some(UnOp::Neg),
            "~" if self.cur().kind == TokenKind::Punctuation => Some(UnOp::BitNot),
            "!" if self.cur().kind == TokenKind::Punctuation => Some(UnOp::Not),
            "@" if self.cur().kind == TokenKind::Punctuation => Some(UnOp::Addr),
            "&" if self.cur().kind == TokenKind::Punctuation => Some(UnOp::Addr),
            _ => None,
        };
        if let Some(op) = op {
            let pos = self.cur().position();
            self.bump();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                id: self.node_ids.next(),
                op,
                operand: Box::new(operand),
                pos,
            });
        }
        if self.is_punct("*") {
            let pos = self.cur().position();
            self.bump();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                id: self.node_ids.next(),
                op: UnOp::Deref,
                operand: Box::new(operand),
                pos,
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.is_punct("[") {
                let pos = self.cur().position();
                self.bump();
                let index = self.parse_expr()?;
                self.eat_punct("]")?;
                expr = Expr::Index {
                    id: self.node_ids.next(),
                    array: Box::new(expr),
                    index: Box::new(index),
                    pos,
                };
            } else if self.is_punct(".") {
                let pos = self.cur().position();
                self.bump();
                let name = self.eat_ident()?.text;
                expr = Expr::Field {
                    id: self.node_ids.next(),
                    obj: Box::new(expr),
                    name,
                    is_arrow: false,
                    pos,
                };
            } else if self.is_punct("->") {
                let pos = self.cur().position();
                self.bump();
                let name = self.eat_ident()?.text;
                expr = Expr::Field {
                    id: self.node_ids.next(),
                    obj: Box::new(expr),
                    name,
                    is_arrow: true,
                    pos,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let pos = self.cur().position();

        if self.is_kw("sizeof") {
            self.bump();
            self.eat_punct("(")?;
            let ty = self.parse_type()?;
            self.eat_punct(")")?;
            return Ok(Expr::SizeofType {
                id: self.node_ids.next(),
                ty,
                pos,
            });
        }

        if self.is_punct("(") {
            // Disambiguate `(Type)expr` cast from a parenthesized
            // expression by attempting a type parse and backtracking.
            let save = self.pos;
            self.bump();
            if let Some(ty) = self.try_parse_type() {
                if self.is_punct(")") {
                    self.bump();
                    let operand = self.parse_unary()?;
                    return Ok(Expr::Cast {
                        id: self.node_ids.next(),
                        ty,
                        operand: Box::new(operand),
                        pos,
                    });
                }
            }
            self.pos = save;
            self.bump();
            let inner = self.parse_expr()?;
            self.eat_punct(")")?;
            return Ok(inner);
        }

        if self.cur().kind == TokenKind::Literal {
            let tok = self.bump();
            let value = self.literal_value(&tok);
            return Ok(Expr::Literal {
                id: self.node_ids.next(),
                value,
                pos,
            });
        }

        if self.cur().kind == TokenKind::Identifier {
            let name = self.bump().text;
            if self.is_punct("(") {
                self.bump();
                let mut args = Vec::new();
                if !self.is_punct(")") {
                    loop {
                        args.push(self.parse_expr()?);
                        if self.is_punct(",") {
                            self.bump();
                        } else {
                            break;
                        }
                    }
                }
                self.eat_punct(")")?;
                return Ok(Expr::Call {
                    id: self.node_ids.next(),
                    name,
                    args,
                    pos,
                });
            }
            return Ok(Expr::Ident {
                id: self.node_ids.next(),
                name,
                pos,
            });
        }

        if self.is_punct("{") {
            self.bump();
            let mut elements = Vec::new();
            if !self.is_punct("}") {
                loop {
                    elements.push(self.parse_expr()?);
                    if self.is_punct(",") {
                        self.bump();
                    } else {
                        break;
                    }
                }
            }
            self.eat_punct("}")?;
            return Ok(Expr::ArrayInit {
                id: self.node_ids.next(),
                elements,
                pos,
            });
        }

        Err(self.err(format!("unexpected token `{}' in expression", self.cur().text)))
    }

    /// Best-effort type parse used only to probe a `(Type)` cast prefix;
    /// never reports a diagnostic, so parse errors here are swallowed and
    /// the caller backtracks.
    fn try_parse_type(&mut self) -> Option<Type> {
        let is_type_start = self.is_punct("@")
            || self.is_punct("[")
            || self.is_kw("void")
            || (self.cur().kind == TokenKind::Keyword && BaseType::from_name(&self.cur().text).is_some())
            || self.cur().kind == TokenKind::Identifier;
        if !is_type_start {
            return None;
        }
        let save = self.pos;
        match self.parse_type() {
            Ok(ty) => Some(ty),
            Err(_) => {
                self.pos = save;
                None
            }
        }
    }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer;

    fn parse_source(src: &str) -> ParseOutput {
        let lexed = lexer::run(src, "t.yapl").unwrap();
        parse(&lexed.text).unwrap()
    }

    #[test]
    fn parses_global_var_and_const() {
        let out = parse_source("const int16 N = 3 + 4; var uint8 Buf[8];");
        assert_eq!(out.program.decls.len(), 2);
        assert_eq!(out.symbols.get("N").unwrap().const_value, Some(7));
        assert_eq!(out.symbols.get("Buf").unwrap().ty, Type::array(Type::Base(BaseType::Uint8), 8));
    }

    #[test]
    fn parses_struct_with_layout() {
        let out = parse_source("struct Point { uint8 tag; int16 x; int16 y; }");
        let def = out.structs.get("Point").unwrap();
        assert_eq!(def.fields[0].offset, 0);
        assert_eq!(def.fields[1].offset, 2);
        assert_eq!(def.fields[2].offset, 4);
        assert_eq!(def.size, 6);
        assert_eq!(def.align, 2);
    }

    #[test]
    fn parses_function_with_locals_and_params() {
        let out = parse_source(
            "func int16 add(int16 a, int16 b) { var int16 total; total = a + b; return total; }",
        );
        let f = out.symbols.get_function("add").unwrap();
        assert_eq!(f.params.len(), 2);
        assert_eq!(f.params[0].register(), Some(1));
        assert_eq!(f.locals.len(), 1);
        assert_eq!(f.locals[0].offset, -2);
        assert_eq!(f.frame_size, 2);
    }

    #[test]
    fn parses_if_while_for_and_calls() {
        let out = parse_source(
            "func void run() { for (var int16 i; i < 10; i = i + 1) { if (i == 5) { break; } else { continue; } } }",
        );
        assert!(out.symbols.get_function("run").is_some());
    }

    #[test]
    fn parses_cast_and_sizeof_and_pointer_types() {
        let out = parse_source("func int16 f() { return (int16)sizeof(@int16); }");
        assert!(out.symbols.get_function("f").is_some());
    }

    #[test]
    fn parses_goto_and_label() {
        let out = parse_source("func void f() { goto done; done: return; }");
        let f = out.symbols.get_function("f").unwrap();
        assert!(f.labels.contains_key("done"));
    }

    #[test]
    fn short_circuit_parses_as_nested_binary() {
        let out = parse_source("func int16 f() { return alwayszero() && alwaysone(); }");
        assert!(out.symbols.get_function("f").is_some());
    }
}
