use std::collections::HashSet;

use crate::{
    ir::{
        function::{BlockRef, Function, Terminator},
        Program,
    },
    utils::diagnostics::Diagnostic,
};

pub mod dead_code;
pub mod dom;
pub mod indexed_memops;
pub mod indvar;
pub mod loop_utils;

// Common graph algorithms for control flow graphs.

/**
 * Apply a function to each successor of a block.
 */
pub fn for_each_successor(function: &Function, block: BlockRef, mut func: impl FnMut(BlockRef)) {
    match function.block(block).term {
        Terminator::Return(_) => {}
        Terminator::Jump(target) => {
            func(target);
        }
        Terminator::CondJump { true_, false_, .. } => {
            func(true_);
            func(false_);
        }
    }
}

/**
 * Compute the reverse postorder of the control flow graph of a function.
 * The returned vector does not include unreachable blocks.
 *
 * Reverse postorder is usually a good linearization of the control flow graph
 * for analysis purposes.
 */
pub fn reverse_postorder(function: &Function) -> Vec<BlockRef> {
    let mut postorder = Vec::new();
    let mut discovered = vec![false; function.n_blocks()];
    let mut finished = vec![false; function.n_blocks()];
    let mut stack = vec![function.entry];
    while let Some(&block) = stack.last() {
        if !discovered[block.0] {
            discovered[block.0] = true;
            for_each_successor(function, block, |succ| {
                if !discovered[succ.0] {
                    stack.push(succ);
                }
            });
        } else {
            stack.pop();
            if !finished[block.0] {
                postorder.push(block);
                finished[block.0] = true;
            }
        }
    }
    postorder.reverse();
    postorder
}

/**
 * Compute the predecessors of each block in the control flow graph of a
 * function. Skips unreachable blocks.
 */
pub fn predecessors(function: &Function) -> Vec<HashSet<BlockRef>> {
    let mut preds = vec![HashSet::new(); function.n_blocks()];
    let mut visited = vec![false; function.n_blocks()];

    fn dfs(
        function: &Function,
        preds: &mut Vec<HashSet<BlockRef>>,
        visited: &mut Vec<bool>,
        block: BlockRef,
    ) {
        if !visited[block.0] {
            visited[block.0] = true;
            for_each_successor(function, block, |succ| {
                preds[succ.0].insert(block);
                dfs(function, preds, visited, succ);
            });
        }
    }

    dfs(function, &mut preds, &mut visited, function.entry);
    preds
}

/// The passes this crate knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pass {
    /// Rewrite unit-stride loop addresses to favor indexed load/store fusion.
    IndexedMemops,
    /// Dead code elimination.
    DeadCode,
}

/// Runs the requested passes over every function, in order. Each pass
/// reports whether it changed anything; in debug builds every function is
/// verified after each changed pass and a verifier failure aborts with a
/// rendered diagnostic.
pub fn optimize(program: &mut Program, passes: &[Pass]) {
    for pass in passes {
        for function in program.functions.values_mut() {
            let changed = match pass {
                Pass::IndexedMemops => indexed_memops::recognize_indexed_memops(function),
                Pass::DeadCode => dead_code::eliminate_dead_code(function),
            };
            if changed && cfg!(debug_assertions) {
                if let Err(e) = function.verify() {
                    panic!(
                        "{:?} broke {}:\n{}",
                        pass,
                        function.name,
                        Diagnostic::from_ir_error(&e).render(function)
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::constant::{Const, CELL_BYTES};
    use crate::ir::function::{Function, Inst, Param, Phi, Terminator};
    use crate::ir::types::Type;

    /// `for (i = 0; i < n; i++) p[i] = 0;` at cell granularity.
    fn cell_fill() -> Function {
        let params = vec![
            Param {
                name: "p".into(),
                ty: Type::Cell,
            },
            Param {
                name: "n".into(),
                ty: Type::Cell,
            },
        ];
        let mut f = Function::new("fill", None, params);
        let header = f.next_block();
        let exit = f.next_block();
        let zero = f.next_inst(f.entry, Inst::LoadConst(Const::int(0)));
        let p = f.next_inst(f.entry, Inst::GetParam(0));
        let n = f.next_inst(f.entry, Inst::GetParam(1));
        f.block_mut(f.entry).term = Terminator::Jump(header);

        let i = f.next_inst(header, Inst::Phi(Phi::with_capacity(Type::Cell, 2)));
        let cell = f.next_inst(header, Inst::LoadConst(Const::int(CELL_BYTES)));
        let offset = f.next_inst(header, Inst::Mul(i, cell));
        let addr = f.next_inst(header, Inst::PtrAdd { base: p, offset });
        f.next_inst(header, Inst::Store { addr, value: zero });
        let one = f.next_inst(header, Inst::LoadConst(Const::int(1)));
        let i_next = f.next_inst(header, Inst::Add(i, one));
        let cond = f.next_inst(header, Inst::Less(i_next, n));
        f.block_mut(header).term = Terminator::CondJump {
            cond,
            true_: header,
            false_: exit,
        };
        let entry = f.entry;
        match f.inst_mut(i) {
            Inst::Phi(phi) => {
                phi.add_incoming(entry, zero);
                phi.add_incoming(header, i_next);
            }
            _ => unreachable!(),
        }
        f
    }

    #[test]
    fn pipeline_rewrites_then_cleans_up() {
        let mut program = Program::default();
        program.functions.insert("fill".into(), cell_fill());

        optimize(&mut program, &[Pass::IndexedMemops, Pass::DeadCode]);

        let f = &program.functions["fill"];
        assert!(f.verify().is_ok());
        // The index-scaling chain died with the old address computation...
        assert!(!f.iter_insts().any(|(_, inst)| matches!(inst, Inst::Mul(..))));
        // ...and the store now goes through a loop-carried merge value.
        let addr = f
            .iter_insts()
            .find_map(|(_, inst)| match inst {
                Inst::Store { addr, .. } => Some(*addr),
                _ => None,
            })
            .unwrap();
        assert!(matches!(f.inst(addr), Inst::Phi(_)));
    }
}
