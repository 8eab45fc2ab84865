//! Recursive-descent parser over the token stream, producing the
//! [`Program`] AST. Every fallible path returns a `ParseError` instead of
//! aborting the process, so a caller embedding this crate can recover from
//! a malformed line.

use crate::ast::{Directive, Instruction, Node, Program};
use crate::encoder::insn::mnemonic_size_suffix;
use crate::error::ParseError;
use crate::lexer::{tokenize, Spanned, Token};
use crate::operand::{MemOperand, Operand};
use crate::reg;

pub fn parse(src: &str) -> Result<Program, ParseError> {
    let toks = tokenize(src)?;
    Parser { toks, pos: 0 }.parse_program()
}

struct Parser {
    toks: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.toks[self.pos].tok
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let i = (self.pos + offset).min(self.toks.len() - 1);
        &self.toks[i].tok
    }

    fn line(&self) -> u32 {
        self.toks[self.pos].line
    }

    fn next(&mut self) -> Token {
        let t = self.toks[self.pos].tok.clone();
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
        t
    }

    fn accept(&mut self, want: &Token) -> bool {
        if self.peek() == want {
            self.next();
            true
        } else {
            false
        }
    }

    fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut nodes = Vec::new();
        loop {
            match self.peek() {
                Token::Eof => break,
                Token::Newline => {
                    self.next();
                }
                Token::Ident(_) if *self.peek_at(1) == Token::Colon => {
                    let name = match self.next() {
                        Token::Ident(s) => s,
                        _ => unreachable!(),
                    };
                    self.next(); // colon
                    nodes.push(Node::Label(name));
                }
                Token::Directive(_) => {
                    nodes.push(Node::Directive(self.parse_directive()?));
                }
                Token::Ident(_) => {
                    let mnemonic = match self.next() {
                        Token::Ident(s) => s,
                        _ => unreachable!(),
                    };
                    nodes.push(Node::Instruction(self.parse_instruction(mnemonic)?));
                }
                _ => {
                    return Err(ParseError::Expected {
                        line: self.line(),
                        expected: "a label, directive, or instruction",
                    })
                }
            }
        }
        Ok(Program { nodes })
    }

    fn at_statement_end(&self) -> bool {
        matches!(self.peek(), Token::Newline | Token::Eof)
    }

    fn parse_directive(&mut self) -> Result<Directive, ParseError> {
        let name = match self.next() {
            Token::Directive(s) => s,
            _ => unreachable!(),
        };
        let mut args = Vec::new();
        while !self.at_statement_end() {
            match self.peek().clone() {
                Token::Ident(s) => {
                    args.push(s);
                    self.next();
                }
                Token::Number(s) => {
                    args.push(s);
                    self.next();
                }
                _ => {
                    self.next();
                }
            }
        }
        if self.accept(&Token::Newline) {}
        Ok(Directive { name, args })
    }

    fn parse_instruction(&mut self, mnemonic: String) -> Result<Instruction, ParseError> {
        let mut operands = Vec::new();
        while !self.at_statement_end() {
            operands.push(self.parse_operand()?);
            self.accept(&Token::Comma);
        }
        if self.accept(&Token::Newline) {}

        // A memory operand with no other way to learn its width (no paired
        // register operand) takes it from the mnemonic's own AT&T size
        // suffix, e.g. `movl $0, (%rax)`.
        if let Some(width) = mnemonic_size_suffix(&mnemonic) {
            for op in &mut operands {
                if let Operand::Memory(mem) = op {
                    if mem.size_hint.is_none() {
                        mem.size_hint = Some(width);
                    }
                }
            }
        }

        Ok(Instruction { mnemonic, operands })
    }

    /// Parses an optionally-negative integer literal, decimal or
    /// `0x`-prefixed hex, mirroring `parser.c`'s `parse_number`.
    fn parse_integer(&mut self) -> Result<i64, ParseError> {
        let negative = self.accept(&Token::Minus);
        let line = self.line();
        let text = match self.next() {
            Token::Number(s) => s,
            _ => {
                return Err(ParseError::Expected {
                    line,
                    expected: "a number",
                })
            }
        };
        let value = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))
        {
            i64::from_str_radix(hex, 16)
        } else {
            text.parse::<i64>()
        }
        .map_err(|_| ParseError::InvalidInteger { line, text })?;
        Ok(if negative { -value } else { value })
    }

    fn parse_register(&mut self) -> Result<reg::Register, ParseError> {
        let line = self.line();
        let name = match self.next() {
            Token::Register(s) => s,
            _ => {
                return Err(ParseError::Expected {
                    line,
                    expected: "a register",
                })
            }
        };
        reg::lookup(&name).map_err(|_| ParseError::Expected {
            line,
            expected: "a known register name",
        })
    }

    /// `disp(base, index, scale)`: displacement and parens are both
    /// optional, and within the parens each of base/index/scale may be
    /// elided, matching `parser.c`'s `parse_mem`.
    fn parse_mem(&mut self, disp: i64, has_disp: bool) -> Result<Operand, ParseError> {
        let mut mem = MemOperand {
            base: None,
            index: None,
            scale: 1,
            disp,
            has_disp,
            size_hint: None,
        };

        self.accept(&Token::LParen);
        if matches!(self.peek(), Token::Register(_)) {
            mem.base = Some(self.parse_register()?);
        }
        if self.accept(&Token::Comma) {
            if matches!(self.peek(), Token::Register(_)) {
                mem.index = Some(self.parse_register()?);
            }
            if self.accept(&Token::Comma) {
                if let Token::Number(_) = self.peek() {
                    let line = self.line();
                    let scale = self.parse_integer()?;
                    if !matches!(scale, 1 | 2 | 4 | 8) {
                        return Err(ParseError::InvalidScale { line, scale });
                    }
                    mem.scale = scale as u8;
                }
            }
        }
        self.accept(&Token::RParen);
        Ok(Operand::Memory(mem))
    }

    fn parse_operand(&mut self) -> Result<Operand, ParseError> {
        match self.peek().clone() {
            Token::ImmPrefix => {
                self.next();
                // `$label` (used by `mov $label, %reg`) is an immediate
                // prefix applied to a label reference rather than a
                // number; `$123`/`$0x7b` is the plain numeric case.
                if let Token::Ident(name) = self.peek().clone() {
                    self.next();
                    Ok(Operand::LabelRef(name))
                } else {
                    Ok(Operand::Immediate(self.parse_integer()?))
                }
            }
            Token::Register(_) => Ok(Operand::Register(self.parse_register()?)),
            Token::Minus | Token::Number(_) => {
                let disp = self.parse_integer()?;
                if matches!(self.peek(), Token::LParen) {
                    self.parse_mem(disp, true)
                } else {
                    Ok(Operand::Immediate(disp))
                }
            }
            Token::LParen => self.parse_mem(0, false),
            Token::Ident(name) => {
                self.next();
                Ok(Operand::LabelRef(name))
            }
            _ => Err(ParseError::ExpectedOperand { line: self.line() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_and_jmp() {
        let prog = parse("L: jmp L\n").unwrap();
        assert_eq!(
            prog.nodes,
            vec![
                Node::Label("L".into()),
                Node::Instruction(Instruction {
                    mnemonic: "jmp".into(),
                    operands: vec![Operand::LabelRef("L".into())],
                }),
            ]
        );
    }

    #[test]
    fn mov_imm_reg() {
        let prog = parse("mov $1, %rax\n").unwrap();
        assert_eq!(
            prog.nodes,
            vec![Node::Instruction(Instruction {
                mnemonic: "mov".into(),
                operands: vec![
                    Operand::Immediate(1),
                    Operand::Register(reg::lookup("%rax").unwrap()),
                ],
            })]
        );
    }

    #[test]
    fn mem_with_disp_and_sib() {
        let prog = parse("mov 8(%rbp,%rax,4), %rcx\n").unwrap();
        let Node::Instruction(insn) = &prog.nodes[0] else {
            panic!("expected instruction");
        };
        let Operand::Memory(mem) = &insn.operands[0] else {
            panic!("expected memory operand");
        };
        assert_eq!(mem.disp, 8);
        assert!(mem.has_disp);
        assert_eq!(mem.scale, 4);
        assert_eq!(mem.base.unwrap().name(), "%rbp");
        assert_eq!(mem.index.unwrap().name(), "%rax");
    }

    #[test]
    fn non_power_of_two_scale_is_rejected() {
        let err = parse("mov (%rax,%rbx,3), %rcx\n").unwrap_err();
        assert!(matches!(err, ParseError::InvalidScale { scale: 3, .. }));
    }

    #[test]
    fn mnemonic_suffix_supplies_bare_mem_size_hint() {
        let prog = parse("movl $0, (%rax)\n").unwrap();
        let Node::Instruction(insn) = &prog.nodes[0] else {
            panic!("expected instruction");
        };
        let Operand::Memory(mem) = &insn.operands[1] else {
            panic!("expected memory operand");
        };
        assert_eq!(mem.size_hint, Some(reg::Width::W32));
    }

    #[test]
    fn directive_with_string_arg() {
        let prog = parse(".string \"hi\"\n").unwrap();
        assert_eq!(
            prog.nodes,
            vec![Node::Directive(Directive {
                name: ".string".into(),
                args: vec!["hi".into()],
            })]
        );
    }
}
