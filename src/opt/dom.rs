use crate::{
    ir::function::{BlockRef, Function},
    opt::{predecessors, reverse_postorder},
};

#[derive(Debug, Clone)]
pub struct Dominance {
    doms: Vec<BlockRef>,
}

const UNDEFINED: BlockRef = BlockRef(usize::MAX);

impl Dominance {
    pub fn immediate_dominator(&self, block: BlockRef) -> BlockRef {
        self.doms[block.0]
    }

    /// Does `a` dominate `b`? Reflexive. Unreachable blocks dominate nothing
    /// and are dominated by nothing.
    pub fn dominates(&self, a: BlockRef, b: BlockRef) -> bool {
        if self.doms[b.0] == UNDEFINED {
            return false;
        }
        let mut runner = b;
        loop {
            if runner == a {
                return true;
            }
            let idom = self.doms[runner.0];
            if idom == runner || idom == UNDEFINED {
                return false;
            }
            runner = idom;
        }
    }

    /// Children lists of the dominator tree, indexed by block.
    pub fn dominator_tree(&self) -> Vec<Vec<BlockRef>> {
        let mut children = vec![Vec::new(); self.doms.len()];
        for (i, &idom) in self.doms.iter().enumerate() {
            if idom != UNDEFINED && idom.0 != i {
                children[idom.0].push(BlockRef(i));
            }
        }
        children
    }
}

/**
 * Computes immediate dominators of a function's blocks.
 *
 * See "A Simple, Fast Dominance Algorithm" by Cooper, Harvey, and Kennedy.
 */
pub fn compute_dominance(function: &Function) -> Dominance {
    let rev_postorder = reverse_postorder(function);
    let predecessors = predecessors(function);

    let mut postorder_of = vec![0; function.n_blocks()];
    for (i, block) in rev_postorder.iter().enumerate() {
        postorder_of[block.0] = rev_postorder.len() - i;
    }

    let mut doms = vec![UNDEFINED; function.n_blocks()];
    doms[function.entry.0] = function.entry;

    fn intersect(
        doms: &[BlockRef],
        postorder_of: &[usize],
        mut a: BlockRef,
        mut b: BlockRef,
    ) -> BlockRef {
        while a != b {
            while postorder_of[a.0] < postorder_of[b.0] {
                a = doms[a.0];
            }
            while postorder_of[b.0] < postorder_of[a.0] {
                b = doms[b.0];
            }
        }
        a
    }

    let mut changed = true;
    while changed {
        changed = false;
        for block in rev_postorder.iter() {
            if block == &function.entry {
                continue;
            }
            let mut processed = predecessors[block.0]
                .iter()
                .copied()
                .filter(|pred| doms[pred.0] != UNDEFINED);
            let first = processed.next().expect("reachable block with no processed pred");
            let new_idom =
                processed.fold(first, |idom, pred| intersect(&doms, &postorder_of, idom, pred));
            if doms[block.0] != new_idom {
                doms[block.0] = new_idom;
                changed = true;
            }
        }
    }

    Dominance { doms }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::constant::Const;
    use crate::ir::function::{Function, Inst, Terminator};

    // entry -> a -> c, entry -> b -> c
    fn diamond() -> Function {
        let mut f = Function::new("diamond", None, vec![]);
        let a = f.next_block();
        let b = f.next_block();
        let c = f.next_block();
        let cond = f.next_inst(f.entry, Inst::LoadConst(Const::Bool(true)));
        f.block_mut(f.entry).term = Terminator::CondJump {
            cond,
            true_: a,
            false_: b,
        };
        f.block_mut(a).term = Terminator::Jump(c);
        f.block_mut(b).term = Terminator::Jump(c);
        f
    }

    #[test]
    fn join_is_dominated_by_fork_only() {
        let f = diamond();
        let dom = compute_dominance(&f);
        let (entry, a, b, c) = (f.entry, BlockRef(1), BlockRef(2), BlockRef(3));
        assert_eq!(dom.immediate_dominator(c), entry);
        assert!(dom.dominates(entry, c));
        assert!(!dom.dominates(a, c));
        assert!(!dom.dominates(b, c));
        assert!(dom.dominates(a, a));
    }

    #[test]
    fn tree_children() {
        let f = diamond();
        let dom = compute_dominance(&f);
        let mut children = dom.dominator_tree()[f.entry.0].clone();
        children.sort_by_key(|b| b.0);
        assert_eq!(children, vec![BlockRef(1), BlockRef(2), BlockRef(3)]);
    }
}
