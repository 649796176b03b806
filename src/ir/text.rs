//! Writer for the IR text format (spec §6 "IR format").

use std::fmt::Write as _;

use super::{ArithOp, CmpOp, Instr, IrGlobal, IrProgram, Operand, Width};

fn write_operand(out: &mut String, op: &Operand) {
    write!(out, "{}", op).unwrap();
}

fn write_instr(out: &mut String, instr: &Instr) {
    match instr {
        Instr::ConstLoad { dst, value } => {
            writeln!(out, "{} = CONST {}", dst, value).unwrap();
        }
        Instr::LoadLocal { dst, offset, width } => {
            writeln!(out, "{} = LOAD.{} {}", dst, width.suffix(), offset).unwrap();
        }
        Instr::StoreLocal { offset, width, src } => {
            writeln!(out, "STORE.{} {}, {}", width.suffix(), offset, src).unwrap();
        }
        Instr::LoadGlobal { dst, name, width } => {
            writeln!(out, "{} = LOADG.{} {}", dst, width.suffix(), name).unwrap();
        }
        Instr::StoreGlobal { name, width, src } => {
            writeln!(out, "STOREG.{} {}, {}", width.suffix(), name, src).unwrap();
        }
        Instr::LoadIndirect { dst, addr, width } => {
            writeln!(out, "{} = LOADI.{} {}", dst, width.suffix(), addr).unwrap();
        }
        Instr::StoreIndirect { addr, width, src } => {
            writeln!(out, "STOREI.{} {}, {}", width.suffix(), addr, src).unwrap();
        }
        Instr::Arith {
            dst,
            op,
            lhs,
            rhs,
            width,
            sign,
        } => {
            write!(
                out,
                "{} = {}.{}.{} ",
                dst,
                op.mnemonic(),
                width.suffix(),
                sign.suffix()
            )
            .unwrap();
            write_operand(out, lhs);
            out.push_str(", ");
            write_operand(out, rhs);
            out.push('\n');
        }
        Instr::UnaryArith {
            dst,
            op,
            operand,
            width,
        } => {
            write!(out, "{} = {}.{} ", dst, op, width.suffix()).unwrap();
            write_operand(out, operand);
            out.push('\n');
        }
        Instr::Compare {
            dst,
            op,
            lhs,
            rhs,
            sign,
        } => {
            write!(out, "{} = {}.{} ", dst, op.mnemonic(), sign.suffix()).unwrap();
            write_operand(out, lhs);
            out.push_str(", ");
            write_operand(out, rhs);
            out.push('\n');
        }
        Instr::AddrGlobal { dst, name } => {
            writeln!(out, "{} = ADDRG {}", dst, name).unwrap();
        }
        Instr::AddrLocal { dst, offset } => {
            writeln!(out, "{} = ADDRL {}", dst, offset).unwrap();
        }
        Instr::FieldOffset { dst, base, offset } => {
            writeln!(out, "{} = FIELDOFF {}, {}", dst, base, offset).unwrap();
        }
        Instr::Jump { label } => {
            writeln!(out, "JUMP {}", label).unwrap();
        }
        Instr::JumpZ { cond, label } => {
            writeln!(out, "JUMPZ {}, {}", cond, label).unwrap();
        }
        Instr::JumpNz { cond, label } => {
            writeln!(out, "JUMPNZ {}, {}", cond, label).unwrap();
        }
        Instr::Call { dst, name, args } => {
            if let Some(dst) = dst {
                write!(out, "{} = CALL {} ARGS {}", dst, name, args.len()).unwrap();
            } else {
                write!(out, "CALL {} ARGS {}", name, args.len()).unwrap();
            }
            for a in args {
                out.push(' ');
                write_operand(out, a);
            }
            out.push('\n');
        }
        Instr::Return { value } => {
            if let Some(v) = value {
                writeln!(out, "RETURN {}", v).unwrap();
            } else {
                writeln!(out, "RETURN").unwrap();
            }
        }
        Instr::Label { name } => {
            writeln!(out, "LABEL {}", name).unwrap();
        }
        Instr::InlineAsm { text } => {
            writeln!(out, "ASM \"{}\"", text.replace('\\', "\\\\").replace('"', "\\\"")).unwrap();
        }
    }
}

fn vis(is_public: bool) -> &'static str {
    if is_public {
        "PUBLIC"
    } else {
        "STATIC"
    }
}

/// Render an [`IrProgram`] in the spec §6 text format.
pub fn write_program(prog: &IrProgram) -> String {
    let mut out = String::new();
    writeln!(out, "#ir 1").unwrap();
    writeln!(out, "#source {}", prog.source_file).unwrap();

    for g in &prog.globals {
        match g {
            IrGlobal::Data {
                name,
                is_public,
                ty,
                size,
                init,
            } => {
                write!(out, "DATA {} {} {} {}", name, vis(*is_public), ty, size).unwrap();
                if let Some(bytes) = init {
                    out.push(' ');
                    for b in bytes {
                        write!(out, "{:02x}", b).unwrap();
                    }
                }
                out.push('\n');
            }
            IrGlobal::Const {
                name,
                is_public,
                ty,
                value,
            } => {
                writeln!(out, "CONST {} {} {} {}", name, vis(*is_public), ty, value).unwrap();
            }
        }
    }

    for s in &prog.structs {
        writeln!(out, "STRUCT {} SIZE {} ALIGN {}", s.name, s.size, s.align).unwrap();
        for f in &s.fields {
            writeln!(out, "  FIELD {} {} {}", f.name, f.ty, f.offset).unwrap();
        }
        writeln!(out, "ENDSTRUCT").unwrap();
    }

    for f in &prog.functions {
        writeln!(
            out,
            "FUNC {} {} FRAMESIZE {}",
            f.name,
            vis(f.is_public),
            f.frame_size
        )
        .unwrap();
        for instr in &f.instrs {
            write_instr(&mut out, instr);
        }
        writeln!(out, "ENDFUNC").unwrap();
    }

    out
}

impl std::fmt::Display for ArithOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

impl std::fmt::Display for CmpOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{IrFunction, VReg};

    #[test]
    fn short_circuit_and_has_jumpz_between_calls() {
        // if (alwayszero() && alwaysone()) ...
        let mut f = IrFunction {
            name: "f".into(),
            is_public: false,
            frame_size: 0,
            instrs: Vec::new(),
        };
        let t0 = VReg(0);
        let t1 = VReg(1);
        f.instrs.push(Instr::Call {
            dst: Some(t0),
            name: "alwayszero".into(),
            args: vec![],
        });
        f.instrs.push(Instr::JumpZ {
            cond: t0,
            label: "L_and_false".into(),
        });
        f.instrs.push(Instr::Call {
            dst: Some(t1),
            name: "alwaysone".into(),
            args: vec![],
        });
        f.instrs.push(Instr::Label {
            name: "L_and_false".into(),
        });

        let prog = IrProgram {
            source_file: "t.yapl".into(),
            globals: vec![],
            structs: vec![],
            functions: vec![f],
        };
        let text = write_program(&prog);
        let call_zero = text.find("CALL alwayszero").unwrap();
        let jumpz = text.find("JUMPZ").unwrap();
        let call_one = text.find("CALL alwaysone").unwrap();
        assert!(call_zero < jumpz && jumpz < call_one);
    }
}
