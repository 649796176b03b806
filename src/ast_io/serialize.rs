//! Writer for the serialized AST format (spec §4.2, §4.3).

use std::fmt::Write as _;

use crate::ast::{BinOp, Decl, Expr, Literal, Program, Stmt, UnOp};
use crate::symtab::{FunctionSymbol, Storage, SymbolTable};
use crate::types::StructTable;

use super::encode_type;

fn binop_name(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "ADD",
        BinOp::Sub => "SUB",
        BinOp::Mul => "MUL",
        BinOp::Div => "DIV",
        BinOp::Mod => "MOD",
        BinOp::BitAnd => "AND",
        BinOp::BitOr => "OR",
        BinOp::BitXor => "XOR",
        BinOp::Shl => "SHL",
        BinOp::Shr => "SHR",
        BinOp::Eq => "EQ",
        BinOp::Ne => "NE",
        BinOp::Lt => "LT",
        BinOp::Le => "LE",
        BinOp::Gt => "GT",
        BinOp::Ge => "GE",
        BinOp::And => "LAND",
        BinOp::Or => "LOR",
    }
}

fn unop_name(op: UnOp) -> &'static str {
    match op {
        UnOp::Neg => "NEG",
        UnOp::BitNot => "NOT",
        UnOp::Not => "LNOT",
        UnOp::Addr => "ADDR",
        UnOp::Deref => "DEREF",
    }
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

fn write_expr(out: &mut String, expr: &Expr) {
    match expr {
        Expr::Literal { value, pos, .. } => match value {
            Literal::Int(v) => writeln!(out, "LIT 0x{:04X} {}", (*v as u16), pos.line).unwrap(),
            Literal::Str(s) => writeln!(out, "STR {} {}", quote(s), pos.line).unwrap(),
        },
        Expr::Ident { name, pos, .. } => writeln!(out, "ID {} {}", name, pos.line).unwrap(),
        Expr::Binary { op, lhs, rhs, pos, .. } => {
            writeln!(out, "BINARY {} {}", binop_name(*op), pos.line).unwrap();
            write_expr(out, lhs);
            write_expr(out, rhs);
        }
        Expr::Unary { op, operand, pos, .. } => {
            writeln!(out, "UNARY {} {}", unop_name(*op), pos.line).unwrap();
            write_expr(out, operand);
        }
        Expr::Assign { lhs, rhs, pos, .. } => {
            writeln!(out, "ASSIGN {}", pos.line).unwrap();
            write_expr(out, lhs);
            write_expr(out, rhs);
        }
        Expr::Cast { ty, operand, pos, .. } => {
            writeln!(out, "CAST {} {}", encode_type(ty), pos.line).unwrap();
            write_expr(out, operand);
        }
        Expr::Call { name, args, pos, .. } => {
            writeln!(out, "CALL {} ARGS {} {}", name, args.len(), pos.line).unwrap();
            for a in args {
                write_expr(out, a);
            }
        }
        Expr::Index { array, index, pos, .. } => {
            writeln!(out, "INDEX {}", pos.line).unwrap();
            write_expr(out, array);
            write_expr(out, index);
        }
        Expr::Field {
            obj,
            name,
            is_arrow,
            pos,
            ..
        } => {
            let kw = if *is_arrow { "ARROW" } else { "FIELD" };
            writeln!(out, "{} {} {}", kw, name, pos.line).unwrap();
            write_expr(out, obj);
        }
        Expr::SizeofType { ty, pos, .. } => {
            writeln!(out, "SIZEOF {} {}", encode_type(ty), pos.line).unwrap();
        }
        Expr::ArrayInit { elements, pos, .. } => {
            writeln!(out, "ARRAYINIT {} {}", elements.len(), pos.line).unwrap();
            for e in elements {
                write_expr(out, e);
            }
        }
    }
}

fn write_stmt(out: &mut String, stmt: &Stmt, symbols: &SymbolTable, func: &FunctionSymbol) {
    match stmt {
        Stmt::Expr(e) => {
            out.push_str("EXPR\n");
            write_expr(out, e);
        }
        Stmt::Block(stmts) => {
            writeln!(out, "BLOCK {}", stmts.len()).unwrap();
            for s in stmts {
                write_stmt(out, s, symbols, func);
            }
        }
        Stmt::If {
            cond,
            then_branch,
            else_branch,
        } => {
            out.push_str("IF\n");
            write_expr(out, cond);
            out.push_str("THEN\n");
            write_stmt(out, then_branch, symbols, func);
            if let Some(e) = else_branch {
                out.push_str("ELSE\n");
                write_stmt(out, e, symbols, func);
            }
            out.push_str("ENDIF\n");
        }
        Stmt::While { cond, body } => {
            out.push_str("WHILE\n");
            write_expr(out, cond);
            out.push_str("DO\n");
            write_stmt(out, body, symbols, func);
            out.push_str("ENDWHILE\n");
        }
        Stmt::For { init, cond, post, body } => {
            out.push_str("FOR\n");
            writeln!(out, "INIT {}", init.is_some() as u8).unwrap();
            if let Some(s) = init {
                write_stmt(out, s, symbols, func);
            }
            writeln!(out, "COND {}", cond.is_some() as u8).unwrap();
            if let Some(e) = cond {
                write_expr(out, e);
            }
            writeln!(out, "POST {}", post.is_some() as u8).unwrap();
            if let Some(e) = post {
                write_expr(out, e);
            }
            out.push_str("DO\n");
            write_stmt(out, body, symbols, func);
            out.push_str("ENDFOR\n");
        }
        Stmt::Return { value, pos } => {
            writeln!(out, "RETURN {} {}", value.is_some() as u8, pos.line).unwrap();
            if let Some(v) = value {
                write_expr(out, v);
            }
        }
        Stmt::Break(pos) => writeln!(out, "BREAK {}", pos.line).unwrap(),
        Stmt::Continue(pos) => writeln!(out, "CONTINUE {}", pos.line).unwrap(),
        Stmt::Goto { label, pos } => writeln!(out, "GOTO {} {}", label, pos.line).unwrap(),
        Stmt::Label(name) => writeln!(out, "LABEL {}", name).unwrap(),
        Stmt::Asm { text, pos } => {
            writeln!(out, "ASM {} {}", pos.line, quote(text)).unwrap();
        }
        Stmt::LocalDecl(decl) => {
            out.push_str("LOCALDECL\n");
            write_local_decl(out, decl, symbols, func);
        }
    }
}

fn write_local_decl(out: &mut String, decl: &Decl, symbols: &SymbolTable, func: &FunctionSymbol) {
    match decl {
        Decl::Const { name, ty, value, array_length, pos } => {
            let storage = symbols.get(name).map(|s| s.storage).unwrap_or(Storage::Static);
            write_const(out, name, ty, value, *array_length, storage, pos.line);
        }
        Decl::Var {
            name,
            ty,
            array_length,
            init,
            pos,
        } => {
            let offset = func.find_local(name).map(|l| l.offset).unwrap_or(0);
            writeln!(
                out,
                "VAR {} {} {} LOCAL {} {}",
                name,
                encode_type(ty),
                array_length.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string()),
                offset,
                pos.line
            )
            .unwrap();
            writeln!(out, "HASINIT {}", init.is_some() as u8).unwrap();
            if let Some(e) = init {
                write_expr(out, e);
            }
        }
        _ => unreachable!("only const/var declarations can appear as local declarations"),
    }
}

fn write_const(
    out: &mut String,
    name: &str,
    ty: &crate::types::Type,
    value: &Expr,
    array_length: Option<u16>,
    storage: Storage,
    line: u32,
) {
    match array_length {
        Some(n) => writeln!(out, "CONSTARRAY {} {} {} {} {}", name, encode_type(ty), storage_name(storage), n, line).unwrap(),
        None => writeln!(out, "CONST {} {} {} {}", name, encode_type(ty), storage_name(storage), line).unwrap(),
    }
    write_expr(out, value);
}

fn storage_name(storage: Storage) -> &'static str {
    match storage {
        Storage::Global => "GLOBAL",
        Storage::Static => "STATIC",
        Storage::Param => "PARAM",
        Storage::Local => "LOCAL",
    }
}

/// Render a [`Program`] into the spec §4.2/§4.3 serialized AST text, pulling
/// resolved storage class / offset information from the symbol and struct
/// tables the parser computed.
pub fn write_program(program: &Program, symbols: &SymbolTable, structs: &StructTable) -> String {
    let mut out = String::new();

    for decl in &program.decls {
        match decl {
            Decl::Struct { name, pos, .. } => {
                let def = structs.get(name).expect("struct must be in struct table");
                writeln!(out, "STRUCT {} SIZE {} ALIGN {} {}", def.name, def.size, def.align, pos.line).unwrap();
                for f in &def.fields {
                    writeln!(
                        out,
                        "  FIELD {} {} {} {}",
                        f.name,
                        encode_type(&f.ty),
                        f.array_length.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string()),
                        f.offset
                    )
                    .unwrap();
                }
                out.push_str("ENDSTRUCT\n");
            }
            Decl::Const {
                name,
                ty,
                value,
                array_length,
                pos,
            } => {
                let storage = symbols.get(name).map(|s| s.storage).unwrap_or(Storage::Global);
                write_const(&mut out, name, ty, value, *array_length, storage, pos.line);
            }
            Decl::Var {
                name,
                ty,
                array_length,
                init,
                pos,
            } => {
                let sym = symbols.get(name).expect("global var must be in symbol table");
                writeln!(
                    out,
                    "VAR {} {} {} {} {} {}",
                    name,
                    encode_type(ty),
                    array_length.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string()),
                    storage_name(sym.storage),
                    sym.offset,
                    pos.line
                )
                .unwrap();
                writeln!(out, "HASINIT {}", init.is_some() as u8).unwrap();
                if let Some(e) = init {
                    write_expr(&mut out, e);
                }
            }
            Decl::Extern { name, ty, pos } => {
                writeln!(out, "EXTERN {} {} {}", name, encode_type(ty), pos.line).unwrap();
            }
            Decl::Asm { text, pos } => {
                writeln!(out, "ASM {} {}", pos.line, quote(text)).unwrap();
            }
            Decl::Func {
                name,
                return_type,
                params,
                body,
                pos,
            } => {
                let func = symbols.get_function(name).expect("function must be in symbol table");
                writeln!(
                    out,
                    "FUNC {} {} {} PARAMS {} {}",
                    name,
                    encode_type(return_type),
                    if func.is_public { "PUBLIC" } else { "STATIC" },
                    params.len(),
                    pos.line
                )
                .unwrap();
                for (pname, pty) in params {
                    let p = func.find_param(pname).expect("param must be in function symbol");
                    writeln!(
                        out,
                        "  PARAM {} {} {} {}",
                        pname,
                        encode_type(pty),
                        p.register().map(|r| r.to_string()).unwrap_or_else(|| "-".to_string()),
                        p.stack_offset().map(|o| o.to_string()).unwrap_or_else(|| "-".to_string())
                    )
                    .unwrap();
                }
                writeln!(out, "LOCALS {}", func.locals.len()).unwrap();
                for l in &func.locals {
                    writeln!(out, "  LOCAL {} {} {}", l.name, encode_type(&l.ty), l.offset).unwrap();
                }
                writeln!(out, "FRAMESIZE {}", func.frame_size).unwrap();
                out.push_str("BODY\n");
                for stmt in body {
                    write_stmt(&mut out, stmt, symbols, func);
                }
                out.push_str("ENDFUNC\n");
            }
        }
    }

    out
}
