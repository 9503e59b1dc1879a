use std::collections::HashSet;

use thiserror::Error;

use super::{
    function::{BlockRef, Function, Inst, InstRef, Terminator},
    types::Type,
};

/// Structural inconsistencies in a function's instruction graph.
///
/// There is no recovery from these: a malformed function means an earlier
/// stage (or a pass in this crate) has a bug, and compilation aborts.
#[derive(Debug, Error)]
pub enum IrError {
    #[error("{user} uses {operand}, which defines no value")]
    UndefinedOperand { user: InstRef, operand: InstRef },
    #[error("{inst} is a merge value but does not lead {block}")]
    PhiAfterNonPhi { block: BlockRef, inst: InstRef },
    #[error("{inst}: merge value in the entry block")]
    PhiInEntry { inst: InstRef },
    #[error("{inst}: incoming edges do not match the predecessors of {block}")]
    PhiEdgeMismatch { block: BlockRef, inst: InstRef },
    #[error("{block} branches to a block that does not exist")]
    BadBranchTarget { block: BlockRef },
    #[error("{block} branches on {cond}, which is not a bool")]
    NonBoolCond { block: BlockRef, cond: InstRef },
}

impl IrError {
    /// The instruction the error is anchored to, when there is one.
    pub fn inst(&self) -> Option<InstRef> {
        match self {
            IrError::UndefinedOperand { user, .. } => Some(*user),
            IrError::PhiAfterNonPhi { inst, .. }
            | IrError::PhiInEntry { inst }
            | IrError::PhiEdgeMismatch { inst, .. } => Some(*inst),
            IrError::NonBoolCond { cond, .. } => Some(*cond),
            IrError::BadBranchTarget { .. } => None,
        }
    }
}

impl Function {
    /// Checks structural consistency: branch targets exist, operands define
    /// values, merge values lead their blocks and their incoming edges match
    /// the block's predecessors, branch conditions are bools.
    ///
    /// Dominance of defs over uses is not checked.
    pub fn verify(&self) -> Result<(), IrError> {
        let mut preds: Vec<HashSet<BlockRef>> = vec![HashSet::new(); self.n_blocks()];
        for (block_ref, block) in self.iter_blocks() {
            let mut term = block.term.clone();
            let mut bad = false;
            term.for_each_block_ref(|target| {
                if target.0 >= self.n_blocks() {
                    bad = true;
                } else {
                    preds[target.0].insert(block_ref);
                }
            });
            if bad {
                return Err(IrError::BadBranchTarget { block: block_ref });
            }
        }

        for (block_ref, block) in self.iter_blocks() {
            let mut seen_non_phi = false;
            for inst_ref in block.insts.iter().copied() {
                match self.inst(inst_ref) {
                    Inst::Phi(phi) => {
                        if seen_non_phi {
                            return Err(IrError::PhiAfterNonPhi {
                                block: block_ref,
                                inst: inst_ref,
                            });
                        }
                        if block_ref == self.entry {
                            return Err(IrError::PhiInEntry { inst: inst_ref });
                        }
                        let incoming: HashSet<BlockRef> =
                            phi.incoming.iter().map(|(pred, _)| *pred).collect();
                        if incoming != preds[block_ref.0] || incoming.len() != phi.incoming.len() {
                            return Err(IrError::PhiEdgeMismatch {
                                block: block_ref,
                                inst: inst_ref,
                            });
                        }
                    }
                    _ => seen_non_phi = true,
                }
                let mut bad_operand = None;
                self.inst(inst_ref).for_each_operand(|operand| {
                    if operand.0 >= self.n_insts() || !self.inst(operand).has_result() {
                        bad_operand.get_or_insert(operand);
                    }
                });
                if let Some(operand) = bad_operand {
                    return Err(IrError::UndefinedOperand {
                        user: inst_ref,
                        operand,
                    });
                }
            }
            if let Terminator::CondJump { cond, .. } = block.term {
                if !self.inst(cond).has_result() {
                    return Err(IrError::UndefinedOperand {
                        user: cond,
                        operand: cond,
                    });
                }
                if self.inst_ty(cond) != Type::Bool {
                    return Err(IrError::NonBoolCond {
                        block: block_ref,
                        cond,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::constant::Const;
    use crate::ir::function::{Function, Inst, Phi, Terminator};
    use crate::ir::types::Type;

    #[test]
    fn accepts_straight_line() {
        let mut f = Function::new("f", None, vec![]);
        let a = f.next_inst(f.entry, Inst::LoadConst(Const::int(1)));
        let b = f.next_inst(f.entry, Inst::LoadConst(Const::int(2)));
        f.next_inst(f.entry, Inst::Add(a, b));
        assert!(f.verify().is_ok());
    }

    #[test]
    fn rejects_use_of_tombstone() {
        let mut f = Function::new("f", None, vec![]);
        let a = f.next_inst(f.entry, Inst::LoadConst(Const::int(1)));
        let b = f.next_inst(f.entry, Inst::LoadConst(Const::int(2)));
        f.next_inst(f.entry, Inst::Add(a, b));
        f.remove_inst(b);
        assert!(f.verify().is_err());
    }

    #[test]
    fn rejects_phi_edge_from_non_predecessor() {
        let mut f = Function::new("f", None, vec![]);
        let body = f.next_block();
        let zero = f.next_inst(f.entry, Inst::LoadConst(Const::int(0)));
        f.block_mut(f.entry).term = Terminator::Jump(body);
        let mut phi = Phi::with_capacity(Type::Cell, 2);
        phi.add_incoming(f.entry, zero);
        phi.add_incoming(body, zero); // body is not a predecessor of itself
        f.next_inst(body, Inst::Phi(phi));
        assert!(f.verify().is_err());
    }
}
