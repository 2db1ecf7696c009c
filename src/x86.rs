//! Full IR translator for 32- and 64-bit x86.
//!
//! Operands are recovered from Capstone's Intel-syntax text: registers with
//! their widths, immediates, and `[base + index*scale + disp]` memory
//! references (including rip-relative). Instructions outside the modeled
//! set lower through the shared flow fallback, so block structure stays
//! correct even where data semantics are opaque.

use crate::decode::DecodedInstruction;
use crate::ir::{BinOp, CastKind, Expr, Stmt, UnOp, Var};
use crate::translate::{lower_flow, TranslationContext, Translator};
use crate::ArchProfile;

/// One parsed Intel-syntax operand.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Op {
    Reg {
        name: String,
        bits: u16,
    },
    Imm(i64),
    Mem {
        base: Option<String>,
        index: Option<(String, u8)>,
        disp: i64,
        bits: Option<u16>,
    },
    /// Segment-prefixed, FPU/SIMD, or otherwise unparsed.
    Other,
}

/// IR translator for X86_32/X86_64.
#[derive(Debug, Clone, Copy)]
pub struct X86Translator {
    word_bits: u16,
}

impl X86Translator {
    pub fn new(profile: &ArchProfile) -> Self {
        Self {
            word_bits: profile.word_bits,
        }
    }

    fn sp_name(&self) -> &'static str {
        if self.word_bits == 64 {
            "rsp"
        } else {
            "esp"
        }
    }

    fn bp_name(&self) -> &'static str {
        if self.word_bits == 64 {
            "rbp"
        } else {
            "ebp"
        }
    }
}

impl Translator for X86Translator {
    fn translate(&self, insn: &DecodedInstruction, ctx: &mut TranslationContext) -> Vec<Stmt> {
        self.lift(insn, ctx)
            .unwrap_or_else(|| lower_flow(insn, self.word_bits))
    }
}

/// Flag-update shapes after an ALU operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagUpdate {
    /// add-like: zf/sf from the result, cf/of/pf unmodeled.
    Add,
    /// sub/cmp-like: zf/sf from the result, cf = borrow, of/pf unmodeled.
    Sub,
    /// and/or/xor/test: zf/sf from the result, cf = of = 0, pf unmodeled.
    Logic,
    /// shifts: zf/sf from the result, cf/of/pf unmodeled.
    Shift,
    /// inc/dec: like Add but cf is architecturally preserved.
    NoCarry,
}

impl X86Translator {
    fn lift(&self, insn: &DecodedInstruction, ctx: &mut TranslationContext) -> Option<Vec<Stmt>> {
        let ops = parse_operands(&insn.operands);
        let m = insn.mnemonic.as_str();

        match m {
            "nop" => Some(vec![Stmt::Nop]),

            "mov" | "movabs" => {
                let (dst, src) = two(&ops)?;
                let bits = self.pick_bits(dst, src);
                let value = self.read(src, bits, ctx, insn);
                self.assign(dst, value, ctx, insn)
            }
            "movzx" => self.lift_extend(CastKind::ZeroExtend, &ops, ctx, insn),
            "movsx" | "movsxd" => self.lift_extend(CastKind::SignExtend, &ops, ctx, insn),
            "lea" => {
                let (dst, src) = two(&ops)?;
                let Op::Mem { base, index, disp, .. } = src else {
                    return None;
                };
                let ea = self.addr_expr(base, index, *disp, ctx, insn);
                let bits = self.op_bits(dst)?;
                let value = if bits == self.word_bits {
                    ea
                } else {
                    Expr::cast(CastKind::Truncate, ea, bits)
                };
                self.assign(dst, value, ctx, insn)
            }

            "add" => self.lift_binop(BinOp::Add, FlagUpdate::Add, true, &ops, ctx, insn),
            "sub" => self.lift_binop(BinOp::Sub, FlagUpdate::Sub, true, &ops, ctx, insn),
            "and" => self.lift_binop(BinOp::And, FlagUpdate::Logic, true, &ops, ctx, insn),
            "or" => self.lift_binop(BinOp::Or, FlagUpdate::Logic, true, &ops, ctx, insn),
            "xor" => self.lift_binop(BinOp::Xor, FlagUpdate::Logic, true, &ops, ctx, insn),
            "cmp" => self.lift_binop(BinOp::Sub, FlagUpdate::Sub, false, &ops, ctx, insn),
            "test" => self.lift_binop(BinOp::And, FlagUpdate::Logic, false, &ops, ctx, insn),
            "shl" | "sal" => self.lift_binop(BinOp::Shl, FlagUpdate::Shift, true, &ops, ctx, insn),
            "shr" => self.lift_binop(BinOp::Shr, FlagUpdate::Shift, true, &ops, ctx, insn),
            "sar" => self.lift_binop(BinOp::Sar, FlagUpdate::Shift, true, &ops, ctx, insn),
            "imul" => self.lift_imul(&ops, ctx, insn),

            "inc" => self.lift_step(BinOp::Add, &ops, ctx, insn),
            "dec" => self.lift_step(BinOp::Sub, &ops, ctx, insn),
            "neg" => self.lift_neg(&ops, ctx, insn),
            "not" => {
                let dst = one(&ops)?;
                let bits = self.op_bits(dst).unwrap_or(self.word_bits);
                let value = Expr::unary(UnOp::Not, self.read(dst, bits, ctx, insn));
                self.assign(dst, value, ctx, insn)
            }

            "push" => self.lift_push(&ops, ctx, insn),
            "pop" => self.lift_pop(&ops, ctx, insn),
            "leave" => Some(self.lift_leave(ctx)),
            "xchg" => self.lift_xchg(&ops, ctx, insn),

            "call" | "lcall" => self.lift_call(&ops, ctx, insn),
            "ret" | "retf" | "iret" | "iretd" | "iretq" => Some(vec![Stmt::Return]),
            "jmp" | "ljmp" => {
                let target = self.target_expr(ops.first()?, ctx, insn);
                Some(vec![Stmt::Jump { target }])
            }
            "int" | "int1" | "int3" | "into" | "ud2" | "hlt" | "syscall" | "sysenter" => {
                Some(vec![Stmt::Trap {
                    reason: insn.mnemonic.clone(),
                }])
            }

            "jecxz" | "jrcxz" | "jcxz" => {
                let counter = match m {
                    "jrcxz" => ctx.reg("rcx", 64),
                    "jecxz" => ctx.reg("ecx", 32),
                    _ => ctx.reg("cx", 16),
                };
                let bits = counter.bits;
                let cond = Expr::binary(
                    BinOp::CmpEq,
                    Expr::var(counter),
                    Expr::constant(0, bits),
                );
                let target = self.target_expr(ops.first()?, ctx, insn);
                Some(vec![Stmt::Branch { cond, target }])
            }

            _ => {
                if let Some(cc) = m.strip_prefix("cmov") {
                    return self.lift_cmov(cc, &ops, ctx, insn);
                }
                if let Some(cc) = m.strip_prefix("set") {
                    let cond = self.cond_expr(cc, ctx)?;
                    let dst = one(&ops)?;
                    let value = Expr::cast(CastKind::ZeroExtend, cond, 8);
                    return self.assign(dst, value, ctx, insn);
                }
                if let Some(cc) = m.strip_prefix('j') {
                    let cond = self.cond_expr(cc, ctx)?;
                    let target = self.target_expr(ops.first()?, ctx, insn);
                    return Some(vec![Stmt::Branch { cond, target }]);
                }
                None
            }
        }
    }

    /// `cmovcc dst, src` lowers to a branch over the assignment: the
    /// instruction is sequential at decode level but its IR ends a block.
    fn lift_cmov(
        &self,
        cc: &str,
        ops: &[Op],
        ctx: &mut TranslationContext,
        insn: &DecodedInstruction,
    ) -> Option<Vec<Stmt>> {
        let (dst, src) = two(ops)?;
        let cond = self.cond_expr(cc, ctx)?;
        let bits = self.pick_bits(dst, src);
        let value = self.read(src, bits, ctx, insn);
        let mut stmts = vec![Stmt::Branch {
            cond: Expr::unary(UnOp::Not, cond),
            target: Expr::constant(insn.end_address(), self.word_bits),
        }];
        self.write(dst, value, ctx, insn, &mut stmts)?;
        Some(stmts)
    }

    fn lift_binop(
        &self,
        op: BinOp,
        flags: FlagUpdate,
        writeback: bool,
        ops: &[Op],
        ctx: &mut TranslationContext,
        insn: &DecodedInstruction,
    ) -> Option<Vec<Stmt>> {
        let (dst, src) = two(ops)?;
        let bits = self.pick_bits(dst, src);
        let a = self.read(dst, bits, ctx, insn);
        let b = self.read(src, bits, ctx, insn);
        let t = ctx.fresh_temp(bits);
        let mut stmts = vec![Stmt::Assign {
            dst: t.clone(),
            src: Expr::binary(op, a.clone(), b.clone()),
        }];
        self.set_flags(&mut stmts, flags, &t, &a, &b, ctx);
        if writeback {
            self.write(dst, Expr::var(t), ctx, insn, &mut stmts)?;
        }
        Some(stmts)
    }

    fn lift_imul(
        &self,
        ops: &[Op],
        ctx: &mut TranslationContext,
        insn: &DecodedInstruction,
    ) -> Option<Vec<Stmt>> {
        match ops {
            // Two-operand form: dst = dst * src.
            [_, _] => self.lift_binop(BinOp::Mul, FlagUpdate::Add, true, ops, ctx, insn),
            // Three-operand form: dst = src * imm.
            [dst, src, imm] => {
                let bits = self.op_bits(dst).unwrap_or(self.word_bits);
                let a = self.read(src, bits, ctx, insn);
                let b = self.read(imm, bits, ctx, insn);
                let t = ctx.fresh_temp(bits);
                let mut stmts = vec![Stmt::Assign {
                    dst: t.clone(),
                    src: Expr::binary(BinOp::Mul, a.clone(), b.clone()),
                }];
                self.set_flags(&mut stmts, FlagUpdate::Add, &t, &a, &b, ctx);
                self.write(dst, Expr::var(t), ctx, insn, &mut stmts)?;
                Some(stmts)
            }
            // One-operand widening form is left to the intrinsic fallback.
            _ => None,
        }
    }

    fn lift_step(
        &self,
        op: BinOp,
        ops: &[Op],
        ctx: &mut TranslationContext,
        insn: &DecodedInstruction,
    ) -> Option<Vec<Stmt>> {
        let dst = one(ops)?;
        let bits = self.op_bits(dst).unwrap_or(self.word_bits);
        let a = self.read(dst, bits, ctx, insn);
        let b = Expr::constant(1, bits);
        let t = ctx.fresh_temp(bits);
        let mut stmts = vec![Stmt::Assign {
            dst: t.clone(),
            src: Expr::binary(op, a.clone(), b.clone()),
        }];
        self.set_flags(&mut stmts, FlagUpdate::NoCarry, &t, &a, &b, ctx);
        self.write(dst, Expr::var(t), ctx, insn, &mut stmts)?;
        Some(stmts)
    }

    fn lift_neg(
        &self,
        ops: &[Op],
        ctx: &mut TranslationContext,
        insn: &DecodedInstruction,
    ) -> Option<Vec<Stmt>> {
        let dst = one(ops)?;
        let bits = self.op_bits(dst).unwrap_or(self.word_bits);
        let a = self.read(dst, bits, ctx, insn);
        let t = ctx.fresh_temp(bits);
        let mut stmts = vec![Stmt::Assign {
            dst: t.clone(),
            src: Expr::unary(UnOp::Neg, a.clone()),
        }];
        // neg sets CF iff the operand was nonzero.
        let cf = ctx.reg("cf", 1);
        stmts.push(Stmt::Assign {
            dst: cf,
            src: Expr::binary(BinOp::CmpNe, a, Expr::constant(0, bits)),
        });
        self.set_result_flags(&mut stmts, &t, ctx);
        self.write(dst, Expr::var(t), ctx, insn, &mut stmts)?;
        Some(stmts)
    }

    fn lift_push(
        &self,
        ops: &[Op],
        ctx: &mut TranslationContext,
        insn: &DecodedInstruction,
    ) -> Option<Vec<Stmt>> {
        let src = one(ops)?;
        let bits = self.op_bits(src).unwrap_or(self.word_bits);
        let value = self.read(src, bits, ctx, insn);
        let t = ctx.fresh_temp(bits);
        let sp = ctx.reg(self.sp_name(), self.word_bits);
        Some(vec![
            Stmt::Assign { dst: t.clone(), src: value },
            Stmt::Assign {
                dst: sp.clone(),
                src: Expr::binary(
                    BinOp::Sub,
                    Expr::var(sp.clone()),
                    Expr::constant(bits as u64 / 8, self.word_bits),
                ),
            },
            Stmt::Store {
                addr: Expr::var(sp),
                value: Expr::var(t),
                bits,
            },
        ])
    }

    fn lift_pop(
        &self,
        ops: &[Op],
        ctx: &mut TranslationContext,
        insn: &DecodedInstruction,
    ) -> Option<Vec<Stmt>> {
        let dst = one(ops)?;
        let bits = self.op_bits(dst).unwrap_or(self.word_bits);
        let sp = ctx.reg(self.sp_name(), self.word_bits);
        let t = ctx.fresh_temp(bits);
        let mut stmts = vec![
            Stmt::Assign {
                dst: t.clone(),
                src: Expr::load(Expr::var(sp.clone()), bits),
            },
            Stmt::Assign {
                dst: sp.clone(),
                src: Expr::binary(
                    BinOp::Add,
                    Expr::var(sp),
                    Expr::constant(bits as u64 / 8, self.word_bits),
                ),
            },
        ];
        self.write(dst, Expr::var(t), ctx, insn, &mut stmts)?;
        Some(stmts)
    }

    fn lift_leave(&self, ctx: &mut TranslationContext) -> Vec<Stmt> {
        let w = self.word_bits;
        let sp = ctx.reg(self.sp_name(), w);
        let bp = ctx.reg(self.bp_name(), w);
        let t = ctx.fresh_temp(w);
        vec![
            Stmt::Assign { dst: sp.clone(), src: Expr::var(bp.clone()) },
            Stmt::Assign { dst: t.clone(), src: Expr::load(Expr::var(sp.clone()), w) },
            Stmt::Assign {
                dst: sp.clone(),
                src: Expr::binary(BinOp::Add, Expr::var(sp), Expr::constant(w as u64 / 8, w)),
            },
            Stmt::Assign { dst: bp, src: Expr::var(t) },
        ]
    }

    fn lift_xchg(
        &self,
        ops: &[Op],
        ctx: &mut TranslationContext,
        insn: &DecodedInstruction,
    ) -> Option<Vec<Stmt>> {
        let (a, b) = two(ops)?;
        let bits = self.pick_bits(a, b);
        let t = ctx.fresh_temp(bits);
        let va = self.read(a, bits, ctx, insn);
        let vb = self.read(b, bits, ctx, insn);
        let mut stmts = vec![Stmt::Assign { dst: t.clone(), src: va }];
        self.write(a, vb, ctx, insn, &mut stmts)?;
        self.write(b, Expr::var(t), ctx, insn, &mut stmts)?;
        Some(stmts)
    }

    fn lift_call(
        &self,
        ops: &[Op],
        ctx: &mut TranslationContext,
        insn: &DecodedInstruction,
    ) -> Option<Vec<Stmt>> {
        let w = self.word_bits;
        let target = self.target_expr(ops.first()?, ctx, insn);
        let sp = ctx.reg(self.sp_name(), w);
        Some(vec![
            Stmt::Assign {
                dst: sp.clone(),
                src: Expr::binary(
                    BinOp::Sub,
                    Expr::var(sp.clone()),
                    Expr::constant(w as u64 / 8, w),
                ),
            },
            Stmt::Store {
                addr: Expr::var(sp),
                value: Expr::constant(insn.end_address(), w),
                bits: w,
            },
            Stmt::Call { target },
        ])
    }

    fn lift_extend(
        &self,
        kind: CastKind,
        ops: &[Op],
        ctx: &mut TranslationContext,
        insn: &DecodedInstruction,
    ) -> Option<Vec<Stmt>> {
        let (dst, src) = two(ops)?;
        let dst_bits = self.op_bits(dst)?;
        let src_bits = self.op_bits(src)?;
        let value = Expr::cast(kind, self.read(src, src_bits, ctx, insn), dst_bits);
        self.assign(dst, value, ctx, insn)
    }

    /// Jump/call target operand: immediates are absolute addresses in
    /// Capstone's Intel output; registers and memory are read indirect.
    fn target_expr(
        &self,
        op: &Op,
        ctx: &mut TranslationContext,
        insn: &DecodedInstruction,
    ) -> Expr {
        match op {
            Op::Imm(v) => Expr::constant(*v as u64, self.word_bits),
            _ => self.read(op, self.word_bits, ctx, insn),
        }
    }

    /// Condition-code expression over the flag registers.
    fn cond_expr(&self, cc: &str, ctx: &mut TranslationContext) -> Option<Expr> {
        let flag = |ctx: &mut TranslationContext, name: &str| Expr::var(ctx.reg(name, 1));
        let not = |e: Expr| Expr::unary(UnOp::Not, e);
        let zf = flag(ctx, "zf");
        let sf = flag(ctx, "sf");
        let cf = flag(ctx, "cf");
        let of = flag(ctx, "of");
        let pf = flag(ctx, "pf");
        let sf_ne_of = Expr::binary(BinOp::Xor, sf.clone(), of.clone());
        Some(match cc {
            "e" | "z" => zf,
            "ne" | "nz" => not(zf),
            "s" => sf,
            "ns" => not(sf),
            "b" | "c" | "nae" => cf,
            "ae" | "nb" | "nc" => not(cf),
            "be" | "na" => Expr::binary(BinOp::Or, cf, zf),
            "a" | "nbe" => Expr::binary(BinOp::And, not(cf), not(zf)),
            "l" | "nge" => sf_ne_of,
            "ge" | "nl" => not(sf_ne_of),
            "le" | "ng" => Expr::binary(BinOp::Or, zf, sf_ne_of),
            "g" | "nle" => Expr::binary(BinOp::And, not(zf), not(sf_ne_of)),
            "o" => of,
            "no" => not(of),
            "p" | "pe" => pf,
            "np" | "po" => not(pf),
            _ => return None,
        })
    }

    fn set_flags(
        &self,
        stmts: &mut Vec<Stmt>,
        kind: FlagUpdate,
        result: &Var,
        a: &Expr,
        b: &Expr,
        ctx: &mut TranslationContext,
    ) {
        match kind {
            FlagUpdate::Sub => {
                let cf = ctx.reg("cf", 1);
                stmts.push(Stmt::Assign {
                    dst: cf,
                    src: Expr::binary(BinOp::CmpLtu, a.clone(), b.clone()),
                });
            }
            FlagUpdate::Logic => {
                let cf = ctx.reg("cf", 1);
                let of = ctx.reg("of", 1);
                stmts.push(Stmt::Assign { dst: cf, src: Expr::constant(0, 1) });
                stmts.push(Stmt::Assign { dst: of, src: Expr::constant(0, 1) });
            }
            FlagUpdate::Add | FlagUpdate::Shift | FlagUpdate::NoCarry => {}
        }
        self.set_result_flags(stmts, result, ctx);
    }

    /// zf and sf, which every ALU update computes the same way.
    fn set_result_flags(&self, stmts: &mut Vec<Stmt>, result: &Var, ctx: &mut TranslationContext) {
        let bits = result.bits;
        let zf = ctx.reg("zf", 1);
        let sf = ctx.reg("sf", 1);
        stmts.push(Stmt::Assign {
            dst: zf,
            src: Expr::binary(
                BinOp::CmpEq,
                Expr::var(result.clone()),
                Expr::constant(0, bits),
            ),
        });
        stmts.push(Stmt::Assign {
            dst: sf,
            src: Expr::binary(
                BinOp::CmpLt,
                Expr::var(result.clone()),
                Expr::constant(0, bits),
            ),
        });
    }

    /// Width agreement for a two-operand instruction.
    fn pick_bits(&self, dst: &Op, src: &Op) -> u16 {
        self.op_bits(dst)
            .or_else(|| self.op_bits(src))
            .unwrap_or(self.word_bits)
    }

    fn op_bits(&self, op: &Op) -> Option<u16> {
        match op {
            Op::Reg { bits, .. } => Some(*bits),
            Op::Mem { bits, .. } => *bits,
            Op::Imm(_) | Op::Other => None,
        }
    }

    fn read(
        &self,
        op: &Op,
        bits: u16,
        ctx: &mut TranslationContext,
        insn: &DecodedInstruction,
    ) -> Expr {
        match op {
            Op::Reg { name, bits: rb } => Expr::var(ctx.reg(name, *rb)),
            Op::Imm(v) => Expr::constant(*v as u64, bits),
            Op::Mem { base, index, disp, bits: mb } => Expr::load(
                self.addr_expr(base, index, *disp, ctx, insn),
                mb.unwrap_or(bits),
            ),
            Op::Other => Expr::unknown(bits),
        }
    }

    fn assign(
        &self,
        dst: &Op,
        value: Expr,
        ctx: &mut TranslationContext,
        insn: &DecodedInstruction,
    ) -> Option<Vec<Stmt>> {
        let mut stmts = Vec::new();
        self.write(dst, value, ctx, insn, &mut stmts)?;
        Some(stmts)
    }

    fn write(
        &self,
        dst: &Op,
        value: Expr,
        ctx: &mut TranslationContext,
        insn: &DecodedInstruction,
        stmts: &mut Vec<Stmt>,
    ) -> Option<()> {
        match dst {
            Op::Reg { name, bits } => {
                stmts.push(Stmt::Assign {
                    dst: ctx.reg(name, *bits),
                    src: value,
                });
                Some(())
            }
            Op::Mem { base, index, disp, bits } => {
                let addr = self.addr_expr(base, index, *disp, ctx, insn);
                let bits = bits.unwrap_or_else(|| value.bits());
                stmts.push(Stmt::Store { addr, value, bits });
                Some(())
            }
            Op::Imm(_) | Op::Other => None,
        }
    }

    /// Effective address of a memory operand at the architecture's word
    /// width. A rip base folds to the constant next-instruction address.
    fn addr_expr(
        &self,
        base: &Option<String>,
        index: &Option<(String, u8)>,
        disp: i64,
        ctx: &mut TranslationContext,
        insn: &DecodedInstruction,
    ) -> Expr {
        let w = self.word_bits;
        let mut ea: Option<Expr> = base.as_ref().map(|b| {
            if b == "rip" || b == "eip" {
                Expr::constant(insn.end_address(), w)
            } else {
                let bits = reg_bits(b).unwrap_or(w);
                Expr::var(ctx.reg(b, bits))
            }
        });
        if let Some((r, scale)) = index {
            let bits = reg_bits(r).unwrap_or(w);
            let rv = Expr::var(ctx.reg(r, bits));
            let term = if *scale == 1 {
                rv
            } else {
                Expr::binary(BinOp::Mul, rv, Expr::constant(*scale as u64, w))
            };
            ea = Some(match ea {
                Some(e) => Expr::binary(BinOp::Add, e, term),
                None => term,
            });
        }
        if disp != 0 || ea.is_none() {
            let d = Expr::constant(disp as u64, w);
            ea = Some(match ea {
                Some(e) => Expr::binary(BinOp::Add, e, d),
                None => d,
            });
        }
        ea.unwrap_or_else(|| Expr::constant(0, w))
    }
}

fn one(ops: &[Op]) -> Option<&Op> {
    match ops {
        [a] => Some(a),
        _ => None,
    }
}

fn two(ops: &[Op]) -> Option<(&Op, &Op)> {
    match ops {
        [a, b] => Some((a, b)),
        _ => None,
    }
}

/// Width of an x86 register name in bits, or None for non-GPR names.
fn reg_bits(name: &str) -> Option<u16> {
    match name {
        "rax" | "rbx" | "rcx" | "rdx" | "rsi" | "rdi" | "rbp" | "rsp" | "rip" => Some(64),
        "eax" | "ebx" | "ecx" | "edx" | "esi" | "edi" | "ebp" | "esp" | "eip" => Some(32),
        "ax" | "bx" | "cx" | "dx" | "si" | "di" | "bp" | "sp" => Some(16),
        "al" | "bl" | "cl" | "dl" | "ah" | "bh" | "ch" | "dh" | "sil" | "dil" | "bpl"
        | "spl" => Some(8),
        _ => {
            // r8..r15 with optional d/w/b sub-register suffix.
            let rest = name.strip_prefix('r')?;
            let (digits, bits) = match rest.as_bytes().last()? {
                b'd' => (&rest[..rest.len() - 1], 32),
                b'w' => (&rest[..rest.len() - 1], 16),
                b'b' => (&rest[..rest.len() - 1], 8),
                _ => (rest, 64),
            };
            let n: u8 = digits.parse().ok()?;
            (8..=15).contains(&n).then_some(bits)
        }
    }
}

fn parse_operands(text: &str) -> Vec<Op> {
    let t = text.trim();
    if t.is_empty() {
        return Vec::new();
    }
    t.split(',').map(parse_operand).collect()
}

fn parse_operand(text: &str) -> Op {
    let t = text.trim();

    for (prefix, bits) in [
        ("byte ptr", 8u16),
        ("word ptr", 16),
        ("dword ptr", 32),
        ("qword ptr", 64),
    ] {
        if let Some(rest) = t.strip_prefix(prefix) {
            return parse_mem(rest.trim(), Some(bits));
        }
    }
    if t.starts_with("tbyte ptr") || t.starts_with("xmmword ptr") || t.starts_with("ymmword ptr")
    {
        return Op::Other;
    }
    if t.starts_with('[') {
        return parse_mem(t, None);
    }
    if let Some(bits) = reg_bits(t) {
        return Op::Reg {
            name: t.to_string(),
            bits,
        };
    }
    match parse_imm(t) {
        Some(v) => Op::Imm(v),
        None => Op::Other,
    }
}

fn parse_mem(text: &str, bits: Option<u16>) -> Op {
    // Segment-prefixed operands are not modeled.
    if text.contains(':') {
        return Op::Other;
    }
    let inner = match text.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        Some(i) => i,
        None => return Op::Other,
    };

    let mut base: Option<String> = None;
    let mut index: Option<(String, u8)> = None;
    let mut disp: i64 = 0;

    let normalized = inner.replace(' ', "").replace('-', "+-");
    for term in normalized.split('+') {
        if term.is_empty() {
            continue;
        }
        if let Some((r, s)) = term.split_once('*') {
            if reg_bits(r).is_none() || index.is_some() {
                return Op::Other;
            }
            let scale: u8 = match s.parse() {
                Ok(v) => v,
                Err(_) => return Op::Other,
            };
            index = Some((r.to_string(), scale));
        } else if reg_bits(term).is_some() {
            if base.is_none() {
                base = Some(term.to_string());
            } else if index.is_none() {
                index = Some((term.to_string(), 1));
            } else {
                return Op::Other;
            }
        } else {
            match parse_imm(term) {
                Some(v) => disp = disp.wrapping_add(v),
                None => return Op::Other,
            }
        }
    }

    Op::Mem {
        base,
        index,
        disp,
        bits,
    }
}

fn parse_imm(text: &str) -> Option<i64> {
    let (neg, t) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let v = match t.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok()?,
        None => t.parse::<u64>().ok()?,
    };
    let v = v as i64;
    Some(if neg { v.wrapping_neg() } else { v })
}
