//! Textual single-instruction syntax.
//!
//! Rule documents spell replacement code as one string per instruction,
//! using the same format [`Insn`]'s `Display` prints:
//!
//! ```text
//! IADD
//! BIPUSH 12
//! LDC 4294967295L
//! INVOKESTATIC net/example/Pos#getX (J)I
//! GETSTATIC net/example/Pos#ORIGIN J
//! CHECKCAST java/util/Set
//! ```
//!
//! Jumps, labels and switches cannot be expressed: templates are straight-line code.

use crate::{
    assembly::{Insn, Opcode},
    metadata::constant::Constant,
    Error, Result,
};

/// Parses one instruction.
///
/// # Errors
///
/// Returns [`Error::Config`] if the mnemonic is unknown, operands are missing
/// or malformed, or the instruction is a control transfer.
pub fn parse_insn(text: &str) -> Result<Insn> {
    let text = text.trim();
    let (mnemonic, operands) = match text.split_once(char::is_whitespace) {
        Some((m, rest)) => (m, rest.trim()),
        None => (text, ""),
    };
    let opcode: Opcode = mnemonic
        .parse()
        .map_err(|_| Error::Config(format!("unknown instruction '{mnemonic}'")))?;

    let insn = match opcode {
        Opcode::BIPUSH | Opcode::SIPUSH | Opcode::NEWARRAY => Insn::IntOp {
            opcode,
            operand: parse_number(operands, text)?,
        },
        op if op.is_var_load() || op.is_var_store() => Insn::Var {
            opcode,
            var: parse_number(operands, text)?,
        },
        Opcode::IINC => {
            let (var, incr) = operands
                .split_once(char::is_whitespace)
                .ok_or_else(|| Error::Config(format!("IINC needs two operands: '{text}'")))?;
            Insn::Iinc {
                var: parse_number(var, text)?,
                incr: parse_number(incr.trim(), text)?,
            }
        }
        Opcode::LDC => Insn::Ldc(parse_literal(operands)?),
        Opcode::GETSTATIC | Opcode::PUTSTATIC | Opcode::GETFIELD | Opcode::PUTFIELD => {
            let (owner, name, desc) = split_member(operands, text)?;
            Insn::Field {
                opcode,
                owner: owner.to_string(),
                name: name.to_string(),
                desc: desc.parse()?,
            }
        }
        op if op.is_invoke() => {
            let (owner, name, desc) = split_member(operands, text)?;
            Insn::invoke(op, owner, name, desc.parse()?)
        }
        Opcode::NEW | Opcode::ANEWARRAY | Opcode::CHECKCAST | Opcode::INSTANCEOF => {
            if operands.is_empty() {
                return Err(Error::Config(format!("missing type operand: '{text}'")));
            }
            Insn::Type {
                opcode,
                desc: operands.to_string(),
            }
        }
        op if op.is_conditional_branch()
            || matches!(
                op,
                Opcode::GOTO
                    | Opcode::JSR
                    | Opcode::RET
                    | Opcode::TABLESWITCH
                    | Opcode::LOOKUPSWITCH
                    | Opcode::INVOKEDYNAMIC
                    | Opcode::MULTIANEWARRAY
                    | Opcode::WIDE
            ) =>
        {
            return Err(Error::Config(format!(
                "instruction not allowed in a template: '{text}'"
            )));
        }
        op => {
            if !operands.is_empty() {
                return Err(Error::Config(format!("unexpected operand: '{text}'")));
            }
            Insn::Op(op)
        }
    };
    Ok(insn)
}

/// Parses a literal: `null`, `"text"`, `12`, `12L`, `1.5F`, `1.5D` or `1.5`.
///
/// # Errors
///
/// Returns [`Error::Config`] if the literal cannot be parsed.
pub fn parse_literal(text: &str) -> Result<Constant> {
    let bad = || Error::Config(format!("invalid literal '{text}'"));
    let text = text.trim();
    if text == "null" {
        return Ok(Constant::Null);
    }
    if let Some(inner) = text.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
        return Ok(Constant::String(inner.to_string()));
    }
    if let Some(body) = text.strip_suffix(['L', 'l']) {
        return body.parse().map(Constant::Long).map_err(|_| bad());
    }
    if let Some(body) = text.strip_suffix(['F', 'f']) {
        return body.parse().map(Constant::Float).map_err(|_| bad());
    }
    if let Some(body) = text.strip_suffix(['D', 'd']) {
        return body.parse().map(Constant::Double).map_err(|_| bad());
    }
    if text.contains(['.', 'e', 'E']) {
        return text.parse().map(Constant::Double).map_err(|_| bad());
    }
    text.parse().map(Constant::Int).map_err(|_| bad())
}

/// Splits `owner#name desc`.
pub(crate) fn split_member<'a>(operands: &'a str, text: &str) -> Result<(&'a str, &'a str, &'a str)> {
    let bad = || Error::Config(format!("expected 'owner#name descriptor' in '{text}'"));
    let (owner, rest) = operands.split_once('#').ok_or_else(bad)?;
    let (name, desc) = rest.split_once(char::is_whitespace).ok_or_else(bad)?;
    if owner.is_empty() || name.is_empty() {
        return Err(bad());
    }
    Ok((owner, name, desc.trim()))
}

fn parse_number<T: std::str::FromStr>(operand: &str, text: &str) -> Result<T> {
    operand
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid numeric operand in '{text}'")))
}

/// Parses a sequence of instruction strings.
///
/// # Errors
///
/// Returns the first parse error.
pub fn parse_insns<S: AsRef<str>>(lines: &[S]) -> Result<Vec<Insn>> {
    lines.iter().map(|line| parse_insn(line.as_ref())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::typesystem::JvmType;

    #[test]
    fn test_parse_simple_and_int_ops() {
        assert_eq!(parse_insn("IADD").unwrap(), Insn::Op(Opcode::IADD));
        assert_eq!(
            parse_insn("  BIPUSH   -4 ").unwrap(),
            Insn::IntOp {
                opcode: Opcode::BIPUSH,
                operand: -4
            }
        );
        assert_eq!(parse_insn("ILOAD 3").unwrap(), Insn::var(Opcode::ILOAD, 3));
        assert_eq!(
            parse_insn("IINC 2 -1").unwrap(),
            Insn::Iinc { var: 2, incr: -1 }
        );
    }

    #[test]
    fn test_parse_members() {
        let insn = parse_insn("INVOKESTATIC net/example/Pos#getX (J)I").unwrap();
        assert_eq!(insn.to_string(), "INVOKESTATIC net/example/Pos#getX (J)I");

        let field = parse_insn("GETFIELD a/B#value J").unwrap();
        assert_eq!(
            field,
            Insn::field(Opcode::GETFIELD, "a/B", "value", JvmType::Long)
        );
    }

    #[test]
    fn test_parse_literals() {
        assert_eq!(parse_literal("12").unwrap(), Constant::Int(12));
        assert_eq!(parse_literal("-12L").unwrap(), Constant::Long(-12));
        assert_eq!(parse_literal("1.5F").unwrap(), Constant::Float(1.5));
        assert_eq!(parse_literal("2.5").unwrap(), Constant::Double(2.5));
        assert_eq!(parse_literal("\"hi\"").unwrap(), Constant::String("hi".into()));
        assert_eq!(parse_literal("null").unwrap(), Constant::Null);
        assert!(parse_literal("x1").is_err());
    }

    #[test]
    fn test_parse_rejects() {
        assert!(parse_insn("FROB").is_err());
        assert!(parse_insn("GOTO L1").is_err());
        assert!(parse_insn("IADD 3").is_err());
        assert!(parse_insn("INVOKESTATIC nohash (J)I").is_err());
        assert!(parse_insn("NEW").is_err());
    }
}
