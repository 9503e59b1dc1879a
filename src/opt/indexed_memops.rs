//! Recognize loop memory accesses that advance by one cell per iteration
//! and rewrite their address arithmetic to favor indexed load/store fusion.
//!
//! No indexed operation is generated here. The rewrite only decouples the
//! address from the loop's own index: the address becomes a loop-carried
//! merge value advanced by an explicit one-cell step, which is the shape the
//! later fusion stage pattern-matches when it emits the machine's indexed
//! loads and stores.

use std::cmp::Reverse;

use crate::ir::{
    constant::{Const, CELL_BYTES, INT_CELL},
    function::{BlockRef, Function, Inst, InstRef, Phi},
};

use super::{
    dom::compute_dominance,
    indvar::{IndVarAnalysis, Recurrence},
    loop_utils::{Loop, LoopAnalysis},
};

/// Entry point: attempts the rewrite on every loop of the function and
/// reports whether anything changed. Block structure and branch edges are
/// never altered, only data computations within existing blocks.
pub fn recognize_indexed_memops(function: &mut Function) -> bool {
    if function.no_optimize {
        return false;
    }
    let loops = LoopAnalysis::new(function);
    let mut all = loops.all_loops(function);
    // Innermost first, so an address in a nested loop is judged against the
    // loop that actually varies it.
    all.sort_by_cached_key(|l| Reverse(l.borrow().depth()));

    let mut changed = false;
    for loop_rc in all {
        changed |= run_on_loop(function, &loops, &loop_rc.borrow());
    }
    changed
}

fn run_on_loop(function: &mut Function, loops: &LoopAnalysis, loop_: &Loop) -> bool {
    let Some(preheader) = loops.preheader(function, loop_) else {
        return false;
    };
    if !loops.is_simplified(function, loop_) {
        return false;
    }

    let dom = compute_dominance(function);
    let ivs = IndVarAnalysis::on_loop(function, &dom, loop_);

    // Snapshot the candidates before touching anything: the rewrite inserts
    // and removes instructions in the very blocks being scanned.
    let mut candidates = Vec::new();
    for block_ref in function.iter_block_refs().filter(|b| loop_.body.contains(b)) {
        for inst_ref in function.block(block_ref).insts.iter().copied() {
            let addr = match function.inst(inst_ref) {
                Inst::Load { addr } => *addr,
                Inst::Store { addr, .. } => *addr,
                _ => continue,
            };
            if is_unit_cell_stride(function, &ivs, addr) {
                candidates.push((block_ref, inst_ref, addr));
            }
        }
    }

    let mut changed = false;
    for (block_ref, inst_ref, addr) in candidates {
        // An earlier candidate sharing this address computation has already
        // redirected it; there is nothing left to rewrite.
        if !matches!(function.inst(addr), Inst::PtrAdd { .. }) {
            continue;
        }
        changed |= decouple_address(function, addr, inst_ref, block_ref, preheader);
    }
    changed
}

/// Is `addr` an indexed-address computation that moves forward by exactly
/// one cell per iteration of the loop?
fn is_unit_cell_stride(function: &Function, ivs: &IndVarAnalysis, addr: InstRef) -> bool {
    if !matches!(function.inst(addr), Inst::PtrAdd { .. }) {
        return false;
    }
    match ivs.recurrence(addr) {
        Some(Recurrence::Affine { step, .. }) => *step == *INT_CELL,
        Some(Recurrence::Invariant) | Some(Recurrence::Unknown) => false,
        // An address the analysis has no descriptor for is allowed through.
        // Deliberately permissive; see DESIGN.md before changing this.
        None => true,
    }
}

/// Rewrites a classified address so the memory instruction reads through a
/// loop-carried pointer instead of index arithmetic:
///
/// 1. a new merge value is created at the top of the memory instruction's
///    block, with room for exactly two incoming edges;
/// 2. its preheader edge carries the address base, or a synthesized
///    zero-offset address when the base is opaque, so the initial value is
///    always a concretely computed address;
/// 3. every use of the old computation is redirected to the merge value and
///    the old computation is unlinked;
/// 4. a one-cell advance of the merge value is inserted right before the
///    memory instruction and fed back as the in-loop edge.
fn decouple_address(
    function: &mut Function,
    addr: InstRef,
    mem_inst: InstRef,
    block_ref: BlockRef,
    preheader: BlockRef,
) -> bool {
    let Inst::PtrAdd { base, .. } = *function.inst(addr) else {
        unreachable!("decoupling an address that is not an indexed computation");
    };
    let ty = function.inst_ty(addr);

    let phi_ref = function.next_inst_after_phis(block_ref, Inst::Phi(Phi::with_capacity(ty, 2)));
    function.annotate_inst_mut(phi_ref).str = Some("baseptr".to_string());

    let init = if function.inst(base).is_leaf() {
        let zero = function.next_inst(preheader, Inst::LoadConst(Const::int(0)));
        function.next_inst(preheader, Inst::PtrAdd { base, offset: zero })
    } else {
        base
    };
    match function.inst_mut(phi_ref) {
        Inst::Phi(phi) => phi.add_incoming(preheader, init),
        _ => unreachable!(),
    }

    function.replace_all_uses(addr, phi_ref);
    function.remove_inst(addr);

    // Advance by one cell without involving the loop's own index.
    let cell = function.next_inst_before(block_ref, Inst::LoadConst(Const::int(CELL_BYTES)), mem_inst);
    let next = function.next_inst_before(
        block_ref,
        Inst::PtrAdd {
            base: phi_ref,
            offset: cell,
        },
        mem_inst,
    );
    match function.inst_mut(phi_ref) {
        Inst::Phi(phi) => phi.add_incoming(block_ref, next),
        _ => unreachable!(),
    }

    true
}
