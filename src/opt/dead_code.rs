use crate::ir::function::{Function, Inst, InstRef};

/// Eliminates instructions whose values are never used.
///
/// Assumes SSA form. Side-effecting instructions and terminator operands are
/// the roots; anything not reachable from a root through operand edges is
/// unlinked. Reports whether anything was removed.
pub fn eliminate_dead_code(function: &mut Function) -> bool {
    let mut useful = vec![false; function.n_insts()];

    for block_ref in function.iter_block_refs() {
        function
            .block_mut(block_ref)
            .term
            .for_each_inst_ref(|inst| {
                useful[inst.0] = true;
            });
    }

    for (inst_ref, inst) in function.iter_insts() {
        if inst.has_side_effects() {
            useful[inst_ref.0] = true;
        }
    }

    let mut worklist = (0..function.n_insts())
        .filter(|i| useful[*i])
        .map(InstRef)
        .collect::<Vec<_>>();
    while let Some(inst_ref) = worklist.pop() {
        function.inst(inst_ref).for_each_operand(|operand| {
            if !useful[operand.0] {
                useful[operand.0] = true;
                worklist.push(operand);
            }
        });
    }

    let mut dead = Vec::new();
    for (inst_ref, inst) in function.iter_insts() {
        if !useful[inst_ref.0] && !matches!(inst, Inst::Illegal) {
            dead.push(inst_ref);
        }
    }
    for inst_ref in dead.iter().copied() {
        function.remove_inst(inst_ref);
    }
    !dead.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::constant::Const;
    use crate::ir::function::{Param, Terminator};
    use crate::ir::types::Type;

    #[test]
    fn removes_unused_chain_keeps_roots() {
        let mut f = Function::new(
            "f",
            None,
            vec![Param {
                name: "p".into(),
                ty: Type::Cell,
            }],
        );
        let a = f.next_inst(f.entry, Inst::LoadConst(Const::int(1)));
        let b = f.next_inst(f.entry, Inst::LoadConst(Const::int(2)));
        let dead = f.next_inst(f.entry, Inst::Mul(a, b));
        let addr = f.next_inst(f.entry, Inst::GetParam(0));
        let _store = f.next_inst(f.entry, Inst::Store { addr, value: b });
        let ret = f.next_inst(f.entry, Inst::Add(b, b));
        f.block_mut(f.entry).term = Terminator::Return(Some(ret));

        assert!(eliminate_dead_code(&mut f));
        assert!(matches!(f.inst(a), Inst::Illegal));
        assert!(matches!(f.inst(dead), Inst::Illegal));
        assert!(matches!(f.inst(b), Inst::LoadConst(_)));
        assert!(matches!(f.inst(ret), Inst::Add(..)));
        assert!(f.verify().is_ok());

        // A second pass finds nothing left to do.
        assert!(!eliminate_dead_code(&mut f));
    }
}
