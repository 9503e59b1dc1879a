//! Affine-recurrence (induction variable) analysis.
//!
//! The step of a recurrence is restricted to compile-time constants. That is
//! all the downstream consumers need: they ask whether a value advances by a
//! specific constant number of bytes per iteration, and anything fancier
//! would be a slide into full scalar-evolution analysis.

use std::collections::{HashMap, HashSet};

use num_bigint::BigInt;

use crate::ir::{
    constant::Const,
    function::{Function, Inst, InstRef},
};

use super::{dom::Dominance, loop_utils::Loop};

/// How a value changes across iterations of a given loop.
///
/// The descriptor is deliberately a tagged variant: a consumer must decide
/// what to do with a loop-varying value whose shape the analysis could not
/// pin down (`Unknown`), rather than assume everything is affine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recurrence {
    /// Same value on every iteration.
    Invariant,
    /// `base + step * iteration`, with `base` the value on loop entry
    /// (a header merge value) and `step` in bytes per iteration.
    Affine { base: InstRef, step: BigInt },
    /// Varies across iterations in a way the analysis cannot describe.
    Unknown,
}

/// Per-loop induction variable analysis. Computed once per loop invocation
/// by the passes that need it; never cached across loops.
#[derive(Debug)]
pub struct IndVarAnalysis {
    recs: HashMap<InstRef, Recurrence>,
}

impl IndVarAnalysis {
    pub fn on_loop(function: &Function, dom: &Dominance, loop_: &Loop) -> Self {
        let mut in_loop: HashSet<InstRef> = HashSet::new();
        for block_ref in loop_.body.iter() {
            in_loop.extend(function.block(*block_ref).insts.iter().copied());
        }

        let mut recs = HashMap::new();
        // Everything defined outside the loop region is invariant, as are
        // leaves wherever they sit.
        for (inst_ref, inst) in function.iter_insts() {
            if inst.has_result() && (!in_loop.contains(&inst_ref) || inst.is_leaf()) {
                recs.insert(inst_ref, Recurrence::Invariant);
            }
        }

        // Base induction variables: header merge values updated in-loop by a
        // consistent constant.
        'next_phi: for phi_ref in function.phis(loop_.header) {
            let Inst::Phi(phi) = function.inst(phi_ref) else {
                unreachable!();
            };
            let mut delta: Option<BigInt> = None;
            for (src_block, src_value) in phi.incoming.iter() {
                if !loop_.body.contains(src_block) {
                    continue;
                }
                let step = match function.inst(*src_value) {
                    Inst::Add(lhs, rhs) if *lhs == phi_ref || *rhs == phi_ref => {
                        let other = if *lhs == phi_ref { *rhs } else { *lhs };
                        as_int_const(function, other).cloned()
                    }
                    Inst::Sub(lhs, rhs) if *lhs == phi_ref => {
                        as_int_const(function, *rhs).map(|n| -n)
                    }
                    _ => None,
                };
                let Some(step) = step else {
                    recs.insert(phi_ref, Recurrence::Unknown);
                    continue 'next_phi;
                };
                match &delta {
                    None => delta = Some(step),
                    Some(existing) if *existing == step => {}
                    Some(_) => {
                        recs.insert(phi_ref, Recurrence::Unknown);
                        continue 'next_phi;
                    }
                }
            }
            match delta {
                Some(step) => {
                    recs.insert(
                        phi_ref,
                        Recurrence::Affine {
                            base: phi_ref,
                            step,
                        },
                    );
                }
                None => {
                    recs.insert(phi_ref, Recurrence::Unknown);
                }
            }
        }

        // Derived values, walked in dominator-tree order so operands are
        // classified before their users.
        let dom_tree = dom.dominator_tree();
        let mut stack = vec![loop_.header];
        while let Some(block_ref) = stack.pop() {
            for inst_ref in function.block(block_ref).insts.iter().copied() {
                if recs.contains_key(&inst_ref) {
                    continue;
                }
                if let Some(rec) = derive(function, &recs, function.inst(inst_ref)) {
                    recs.insert(inst_ref, rec);
                }
            }
            stack.extend(
                dom_tree[block_ref.0]
                    .iter()
                    .copied()
                    .filter(|child| loop_.body.contains(child)),
            );
        }

        Self { recs }
    }

    /// The oracle interface: `None` means the analysis has no descriptor for
    /// this value at all, which is distinct from `Unknown`.
    pub fn recurrence(&self, inst_ref: InstRef) -> Option<&Recurrence> {
        self.recs.get(&inst_ref)
    }
}

fn as_int_const<'a>(function: &'a Function, inst_ref: InstRef) -> Option<&'a BigInt> {
    match function.inst(inst_ref) {
        Inst::LoadConst(Const::Int(n)) => Some(n),
        _ => None,
    }
}

/// Recurrence of a derived in-loop computation, or `None` when the
/// instruction is not modeled (loads, calls, merge values outside the
/// header, comparisons) or any operand is unmodeled.
fn derive(
    function: &Function,
    recs: &HashMap<InstRef, Recurrence>,
    inst: &Inst,
) -> Option<Recurrence> {
    use Recurrence::*;
    let rec = |inst_ref: InstRef| recs.get(&inst_ref);
    match inst {
        Inst::Add(lhs, rhs) => combine_sum(rec(*lhs)?, rec(*rhs)?, false),
        Inst::PtrAdd { base, offset } => combine_sum(rec(*base)?, rec(*offset)?, false),
        Inst::Sub(lhs, rhs) => combine_sum(rec(*lhs)?, rec(*rhs)?, true),
        Inst::Neg(operand) => match rec(*operand)? {
            Invariant => Some(Invariant),
            Affine { base, step } => Some(Affine {
                base: *base,
                step: -step,
            }),
            Unknown => Some(Unknown),
        },
        Inst::Mul(lhs, rhs) => match (rec(*lhs)?, rec(*rhs)?) {
            (Invariant, Invariant) => Some(Invariant),
            (Unknown, _) | (_, Unknown) => Some(Unknown),
            (Affine { .. }, Affine { .. }) => Some(Unknown),
            (Affine { base, step }, Invariant) => Some(match as_int_const(function, *rhs) {
                Some(c) => Affine {
                    base: *base,
                    step: step * c,
                },
                None => Unknown, // non-constant step
            }),
            (Invariant, Affine { base, step }) => Some(match as_int_const(function, *lhs) {
                Some(c) => Affine {
                    base: *base,
                    step: step * c,
                },
                None => Unknown,
            }),
        },
        Inst::Div(lhs, rhs) => match (rec(*lhs)?, rec(*rhs)?) {
            (Invariant, Invariant) => Some(Invariant),
            // Division does not stay in the affine domain.
            _ => Some(Unknown),
        },
        _ => None,
    }
}

fn combine_sum(lhs: &Recurrence, rhs: &Recurrence, negate_rhs: bool) -> Option<Recurrence> {
    use Recurrence::*;
    Some(match (lhs, rhs) {
        (Invariant, Invariant) => Invariant,
        (Unknown, _) | (_, Unknown) => Unknown,
        (Affine { base, step }, Invariant) => Affine {
            base: *base,
            step: step.clone(),
        },
        (Invariant, Affine { base, step }) => Affine {
            base: *base,
            step: if negate_rhs { -step } else { step.clone() },
        },
        (
            Affine {
                base: base_l,
                step: step_l,
            },
            Affine {
                base: base_r,
                step: step_r,
            },
        ) => {
            if base_l != base_r {
                // Mixing recurrences of two different induction variables is
                // out of scope.
                Unknown
            } else {
                Affine {
                    base: *base_l,
                    step: if negate_rhs {
                        step_l - step_r
                    } else {
                        step_l + step_r
                    },
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::constant::CELL_BYTES;
    use crate::ir::function::{BlockRef, Function, Param, Phi, Terminator};
    use crate::ir::types::Type;
    use crate::opt::dom::compute_dominance;
    use crate::opt::loop_utils::LoopAnalysis;

    /// `for (i = 0; i < n; i += di) { offset = i * scale; addr = p + offset; }`
    /// in a single-block loop body. Returns (function, header, i, addr).
    fn counting_loop(di: i64, scale: i64) -> (Function, BlockRef, InstRef, InstRef) {
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
        let mut f = Function::new("walk", None, params);
        let header = f.next_block();
        let exit = f.next_block();

        let zero = f.next_inst(f.entry, Inst::LoadConst(Const::int(0)));
        let p = f.next_inst(f.entry, Inst::GetParam(0));
        let n = f.next_inst(f.entry, Inst::GetParam(1));
        f.block_mut(f.entry).term = Terminator::Jump(header);

        let i = f.next_inst(header, Inst::Phi(Phi::with_capacity(Type::Cell, 2)));
        let scale_c = f.next_inst(header, Inst::LoadConst(Const::int(scale)));
        let offset = f.next_inst(header, Inst::Mul(i, scale_c));
        let addr = f.next_inst(header, Inst::PtrAdd { base: p, offset });
        f.next_inst(header, Inst::Load { addr });
        let di_c = f.next_inst(header, Inst::LoadConst(Const::int(di)));
        let i_next = f.next_inst(header, Inst::Add(i, di_c));
        let done = f.next_inst(header, Inst::Less(i_next, n));
        f.block_mut(header).term = Terminator::CondJump {
            cond: done,
            true_: header,
            false_: exit,
        };
        match f.inst_mut(i) {
            Inst::Phi(phi) => {
                phi.add_incoming(BlockRef(0), zero);
                phi.add_incoming(header, i_next);
            }
            _ => unreachable!(),
        }
        (f, header, i, addr)
    }

    fn analyze(f: &Function, header: BlockRef) -> IndVarAnalysis {
        let loops = LoopAnalysis::new(f);
        let loop_rc = loops.get_loop(header).unwrap();
        let loop_ = loop_rc.borrow();
        IndVarAnalysis::on_loop(f, &compute_dominance(f), &loop_)
    }

    #[test]
    fn base_and_derived_steps() {
        let (f, header, i, addr) = counting_loop(1, CELL_BYTES as i64);
        let ivs = analyze(&f, header);
        assert_eq!(
            ivs.recurrence(i),
            Some(&Recurrence::Affine {
                base: i,
                step: BigInt::from(1)
            })
        );
        assert_eq!(
            ivs.recurrence(addr),
            Some(&Recurrence::Affine {
                base: i,
                step: BigInt::from(CELL_BYTES)
            })
        );
    }

    #[test]
    fn step_scales_through_mul_and_delta() {
        let (f, header, _, addr) = counting_loop(2, 32);
        let ivs = analyze(&f, header);
        match ivs.recurrence(addr) {
            Some(Recurrence::Affine { step, .. }) => assert_eq!(*step, BigInt::from(64)),
            other => panic!("expected affine recurrence, got {:?}", other),
        }
    }

    #[test]
    fn out_of_loop_values_are_invariant() {
        let (f, header, _, _) = counting_loop(1, 32);
        let ivs = analyze(&f, header);
        // %1 is the GetParam(0) in the entry block.
        let p = InstRef(1);
        assert!(matches!(f.inst(p), Inst::GetParam(0)));
        assert_eq!(ivs.recurrence(p), Some(&Recurrence::Invariant));
    }

    #[test]
    fn non_constant_update_is_unknown() {
        let (mut f, header, i, _) = counting_loop(1, 32);
        // Replace the constant update with `i + n`.
        let i_next = match f.inst(i) {
            Inst::Phi(phi) => phi.value_from(header).unwrap(),
            _ => unreachable!(),
        };
        let n = InstRef(2);
        assert!(matches!(f.inst(n), Inst::GetParam(1)));
        *f.inst_mut(i_next) = Inst::Add(i, n);
        let ivs = analyze(&f, header);
        assert_eq!(ivs.recurrence(i), Some(&Recurrence::Unknown));
    }

    #[test]
    fn loads_are_not_modeled() {
        let (f, header, _, addr) = counting_loop(1, 32);
        let load = f
            .iter_insts()
            .find_map(|(inst_ref, inst)| match inst {
                Inst::Load { .. } => Some(inst_ref),
                _ => None,
            })
            .unwrap();
        let _ = addr;
        let ivs = analyze(&f, header);
        assert_eq!(ivs.recurrence(load), None);
    }
}
