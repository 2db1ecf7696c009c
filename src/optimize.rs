//! IR cleanup: constant folding, algebraic identities, branch folding,
//! and dead temporary elimination.
//!
//! The pass is pure and total. It never removes stores, register
//! assignments, intrinsics, or control transfers, and running it on its
//! own output changes nothing.

use std::collections::HashSet;

use crate::ir::{BinOp, CastKind, Const, Expr, Stmt, UnOp, Var, VarKind};

/// Clean up one block's statement sequence.
pub fn optimize(stmts: &[Stmt]) -> Vec<Stmt> {
    let folded: Vec<Stmt> = stmts.iter().filter_map(fold_stmt).collect();
    eliminate_dead_temps(folded)
}

/// Fold one statement, or drop it (`None`) when it has no effect.
fn fold_stmt(stmt: &Stmt) -> Option<Stmt> {
    match stmt {
        Stmt::Nop => None,
        Stmt::Assign { dst, src } => Some(Stmt::Assign {
            dst: dst.clone(),
            src: fold_expr(src),
        }),
        Stmt::Store { addr, value, bits } => Some(Stmt::Store {
            addr: fold_expr(addr),
            value: fold_expr(value),
            bits: *bits,
        }),
        Stmt::Jump { target } => Some(Stmt::Jump {
            target: fold_expr(target),
        }),
        Stmt::Branch { cond, target } => {
            let cond = fold_expr(cond);
            let target = fold_expr(target);
            match &cond {
                // branch-never disappears, branch-always becomes a jump
                Expr::Const(c) if c.is_zero() => None,
                Expr::Const(_) => Some(Stmt::Jump { target }),
                _ => Some(Stmt::Branch { cond, target }),
            }
        }
        Stmt::Call { target } => Some(Stmt::Call {
            target: fold_expr(target),
        }),
        Stmt::Return => Some(Stmt::Return),
        Stmt::Trap { reason } => Some(Stmt::Trap {
            reason: reason.clone(),
        }),
        Stmt::Intrinsic { name, args } => Some(Stmt::Intrinsic {
            name: name.clone(),
            args: args.iter().map(fold_expr).collect(),
        }),
    }
}

/// Bottom-up constant folding and algebraic simplification.
fn fold_expr(expr: &Expr) -> Expr {
    match expr {
        Expr::Const(_) | Expr::Var(_) | Expr::Unknown { .. } => expr.clone(),
        Expr::Load { addr, bits } => Expr::load(fold_expr(addr), *bits),
        Expr::Unary { op, arg } => {
            let arg = fold_expr(arg);
            if let Expr::Const(c) = &arg {
                let v = match op {
                    UnOp::Neg => c.value().wrapping_neg(),
                    UnOp::Not => !c.value(),
                };
                return Expr::constant(v, c.bits());
            }
            Expr::unary(*op, arg)
        }
        Expr::Cast { kind, arg, bits } => {
            let arg = fold_expr(arg);
            if arg.bits() == *bits {
                return arg;
            }
            if let Expr::Const(c) = &arg {
                let v = match kind {
                    CastKind::ZeroExtend | CastKind::Truncate => c.value(),
                    CastKind::SignExtend => c.value_signed() as u64,
                };
                return Expr::constant(v, *bits);
            }
            Expr::cast(*kind, arg, *bits)
        }
        Expr::Binary { op, lhs, rhs } => {
            let lhs = fold_expr(lhs);
            let rhs = fold_expr(rhs);
            if let (Expr::Const(a), Expr::Const(b)) = (&lhs, &rhs) {
                return Expr::Const(eval_binop(*op, *a, *b));
            }
            if let Some(e) = fold_identity(*op, &lhs, &rhs) {
                return e;
            }
            Expr::binary(*op, lhs, rhs)
        }
    }
}

fn eval_binop(op: BinOp, a: Const, b: Const) -> Const {
    let bits = a.bits();
    let shift = (b.value() as u32).min(63);
    let truth = |v: bool| Const::new(v as u64, 1);
    match op {
        BinOp::Add => Const::new(a.value().wrapping_add(b.value()), bits),
        BinOp::Sub => Const::new(a.value().wrapping_sub(b.value()), bits),
        BinOp::Mul => Const::new(a.value().wrapping_mul(b.value()), bits),
        BinOp::And => Const::new(a.value() & b.value(), bits),
        BinOp::Or => Const::new(a.value() | b.value(), bits),
        BinOp::Xor => Const::new(a.value() ^ b.value(), bits),
        BinOp::Shl => Const::new(
            if b.value() >= bits as u64 {
                0
            } else {
                a.value() << shift
            },
            bits,
        ),
        BinOp::Shr => Const::new(
            if b.value() >= bits as u64 {
                0
            } else {
                a.value() >> shift
            },
            bits,
        ),
        BinOp::Sar => Const::new((a.value_signed() >> shift.min(bits as u32 - 1)) as u64, bits),
        BinOp::CmpEq => truth(a.value() == b.value()),
        BinOp::CmpNe => truth(a.value() != b.value()),
        BinOp::CmpLt => truth(a.value_signed() < b.value_signed()),
        BinOp::CmpLtu => truth(a.value() < b.value()),
    }
}

/// Algebraic identities over a partially-constant operation.
fn fold_identity(op: BinOp, lhs: &Expr, rhs: &Expr) -> Option<Expr> {
    let rhs_const = match rhs {
        Expr::Const(c) => Some(*c),
        _ => None,
    };
    if let Some(c) = rhs_const {
        match op {
            BinOp::Add | BinOp::Sub | BinOp::Or | BinOp::Xor | BinOp::Shl | BinOp::Shr
            | BinOp::Sar
                if c.is_zero() =>
            {
                return Some(lhs.clone());
            }
            BinOp::Mul if c.value() == 1 => return Some(lhs.clone()),
            BinOp::Mul | BinOp::And if c.is_zero() => {
                return Some(Expr::constant(0, lhs.bits()));
            }
            BinOp::And if c.is_all_ones() && c.bits() == lhs.bits() => {
                return Some(lhs.clone());
            }
            _ => {}
        }
    }
    // x ^ x and x - x need a repeatable operand: loads may observe
    // different values on each evaluation.
    if matches!(op, BinOp::Xor | BinOp::Sub) && lhs == rhs && is_repeatable(lhs) {
        return Some(Expr::constant(0, lhs.bits()));
    }
    None
}

/// True when re-evaluating the expression is guaranteed to produce the
/// same value (no loads, no unknowns).
fn is_repeatable(expr: &Expr) -> bool {
    match expr {
        Expr::Const(_) | Expr::Var(_) => true,
        Expr::Unknown { .. } | Expr::Load { .. } => false,
        Expr::Binary { lhs, rhs, .. } => is_repeatable(lhs) && is_repeatable(rhs),
        Expr::Unary { arg, .. } | Expr::Cast { arg, .. } => is_repeatable(arg),
    }
}

/// Backward liveness over temporaries: an assignment to a temp nothing
/// later reads is removed. Registers and memory are always observable.
fn eliminate_dead_temps(stmts: Vec<Stmt>) -> Vec<Stmt> {
    let mut live: HashSet<String> = HashSet::new();
    let mut kept: Vec<Stmt> = Vec::with_capacity(stmts.len());

    for stmt in stmts.into_iter().rev() {
        if let Stmt::Assign { dst, .. } = &stmt {
            if dst.kind == VarKind::Temp && !live.contains(&dst.name) {
                continue;
            }
        }
        if let Stmt::Assign { dst, .. } = &stmt {
            live.remove(&dst.name);
        }
        each_used_expr(&stmt, &mut |e| mark_temps(e, &mut live));
        kept.push(stmt);
    }
    kept.reverse();
    kept
}

fn each_used_expr(stmt: &Stmt, f: &mut dyn FnMut(&Expr)) {
    match stmt {
        Stmt::Assign { src, .. } => f(src),
        Stmt::Store { addr, value, .. } => {
            f(addr);
            f(value);
        }
        Stmt::Jump { target } | Stmt::Call { target } => f(target),
        Stmt::Branch { cond, target } => {
            f(cond);
            f(target);
        }
        Stmt::Intrinsic { args, .. } => {
            for a in args {
                f(a);
            }
        }
        Stmt::Return | Stmt::Trap { .. } | Stmt::Nop => {}
    }
}

fn mark_temps(expr: &Expr, live: &mut HashSet<String>) {
    match expr {
        Expr::Var(Var {
            name,
            kind: VarKind::Temp,
            ..
        }) => {
            live.insert(name.clone());
        }
        Expr::Var(_) | Expr::Const(_) | Expr::Unknown { .. } => {}
        Expr::Binary { lhs, rhs, .. } => {
            mark_temps(lhs, live);
            mark_temps(rhs, live);
        }
        Expr::Unary { arg, .. } | Expr::Cast { arg, .. } => mark_temps(arg, live),
        Expr::Load { addr, .. } => mark_temps(addr, live),
    }
}
