//! Deferred translation units and the parallel region driver.
//!
//! Decoding is sequential (the continuation address and decode mode are
//! stateful), but translation of an already-decoded block is pure given a
//! private context. A [`LiftTask`] captures exactly that: one decoded
//! block, a shared translator handle, and a fresh translation context of
//! its own, so tasks run on any thread in any order.

use std::sync::Arc;

use rayon::prelude::*;

use crate::block::DecodedBlock;
use crate::ir::Stmt;
use crate::optimize::optimize;
use crate::session::Session;
use crate::translate::{TranslationContext, Translator};
use crate::Address;

/// One block's deferred translation.
pub struct LiftTask {
    block: DecodedBlock,
    translator: Arc<dyn Translator>,
    tctx: TranslationContext,
    optimize: bool,
}

/// What a task produced.
#[derive(Debug, Clone, PartialEq)]
pub struct LiftOutcome {
    pub start: Address,
    pub stmts: Vec<Stmt>,
    /// False when the underlying block was truncated by a decode failure.
    pub completed_cleanly: bool,
}

impl LiftTask {
    pub fn new(block: DecodedBlock, translator: Arc<dyn Translator>, optimize: bool) -> Self {
        Self {
            block,
            translator,
            tctx: TranslationContext::new(),
            optimize,
        }
    }

    pub fn start(&self) -> Address {
        self.block.start
    }

    /// Translate the captured block. Consumes the task.
    pub fn run(mut self) -> LiftOutcome {
        let mut stmts = Vec::new();
        for insn in &self.block.insns {
            stmts.extend(self.translator.translate(insn, &mut self.tctx));
        }
        if self.optimize {
            stmts = optimize(&stmts);
        }
        LiftOutcome {
            start: self.block.start,
            stmts,
            completed_cleanly: self.block.termination.is_complete(),
        }
    }
}

/// Lift every block in `[start, end)` with translation fanned out across
/// the rayon pool.
///
/// Block boundaries are discovered sequentially (decode state demands
/// it); the per-block translation work then runs in parallel. Results
/// come back in address order regardless of which thread finished first.
pub fn lift_region_parallel(
    session: &mut Session,
    start: Address,
    end: Address,
    optimize: bool,
) -> Vec<LiftOutcome> {
    let mut tasks = Vec::new();
    let mut at = start;
    while at < end {
        let (task, next) = session.block_task(at, optimize);
        tasks.push(task);
        if next <= at {
            break;
        }
        at = next;
    }
    log::debug!(
        "region 0x{:x}..0x{:x}: {} block(s) queued for parallel lift",
        start,
        end,
        tasks.len()
    );
    tasks.into_par_iter().map(LiftTask::run).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::MappedImage;
    use crate::testkit::{self, TestDecoder, TestTranslator};

    fn test_session(bytes: Vec<u8>) -> Session {
        Session::with_parts(
            MappedImage::new(0x1000, bytes),
            testkit::profile(),
            Arc::new(TestDecoder),
            Arc::new(TestTranslator),
        )
    }

    #[test]
    fn test_region_results_in_address_order() {
        // three one-ret blocks
        let mut s = test_session(vec![0x50, 0x50, 0x50]);
        let outcomes = lift_region_parallel(&mut s, 0x1000, 0x1003, false);
        assert_eq!(outcomes.len(), 3);
        assert_eq!(
            outcomes.iter().map(|o| o.start).collect::<Vec<_>>(),
            vec![0x1000, 0x1001, 0x1002]
        );
        assert!(outcomes.iter().all(|o| o.completed_cleanly));
    }

    #[test]
    fn test_region_walks_past_truncation() {
        // ret, garbage byte, ret: the middle block truncates but the walk
        // resynchronizes and reaches the final ret
        let mut s = test_session(vec![0x50, 0xff, 0x50]);
        let outcomes = lift_region_parallel(&mut s, 0x1000, 0x1003, false);
        assert_eq!(outcomes.len(), 3);
        assert!(!outcomes[1].completed_cleanly);
        assert!(outcomes[2].completed_cleanly);
    }

    #[test]
    fn test_parallel_tasks_have_private_temp_numbering() {
        // each block is csel+ret; csel allocates no temps but binds regs,
        // and each task's context starts fresh
        let mut s = test_session(vec![0x30, 0x01, 0x50, 0x30, 0x02, 0x50]);
        let outcomes = lift_region_parallel(&mut s, 0x1000, 0x1006, false);
        assert_eq!(outcomes.len(), 2);
        // identical structure out of both tasks, modulo the immediate
        assert_eq!(outcomes[0].stmts.len(), outcomes[1].stmts.len());
    }

    #[test]
    fn test_optimized_region_drops_nops() {
        // mode-toggle lifts to Nop; optimized output omits it
        let mut s = test_session(vec![0x40, 0x00, 0x50]);
        let outcomes = lift_region_parallel(&mut s, 0x1000, 0x1003, true);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].stmts, vec![Stmt::Return]);
    }
}
