//! Utilities for loop analysis

use std::{cell::RefCell, collections::HashSet, rc::Rc};

use crate::ir::function::{BlockRef, Function};

use super::{
    dom::{compute_dominance, Dominance},
    for_each_successor, predecessors, reverse_postorder,
};

#[derive(Debug, Clone)]
pub struct Loop {
    pub header: BlockRef,
    pub body: HashSet<BlockRef>,
    /// In-loop blocks with an edge back to the header.
    pub latches: HashSet<BlockRef>,
    /// Blocks outside the loop that an in-loop block branches to.
    pub exits: HashSet<BlockRef>,

    pub parent: Option<Rc<RefCell<Loop>>>,
}

impl Loop {
    pub fn depth(&self) -> usize {
        match &self.parent {
            Some(parent) => parent.borrow().depth() + 1,
            None => 0,
        }
    }
}

// Does not hold a reference to the function to avoid borrowing issues.
#[derive(Debug, Clone)]
pub struct LoopAnalysis {
    loops: Vec<Option<Rc<RefCell<Loop>>>>, // Map from BlockRef to innermost Loop
    predecessors: Vec<HashSet<BlockRef>>,
}

impl LoopAnalysis {
    pub fn new(function: &Function) -> Self {
        let mut ret = Self {
            loops: vec![None; function.n_blocks()],
            predecessors: predecessors(function),
        };
        ret.analyze(
            function,
            &compute_dominance(function),
            &reverse_postorder(function),
            None,
        );
        ret
    }

    fn analyze(
        &mut self,
        function: &Function,
        dom: &Dominance,
        rev_postorder: &[BlockRef], // Blocks in reverse postorder
        parent: Option<Rc<RefCell<Loop>>>,
    ) {
        let mut visited = HashSet::new();
        for block_ref in rev_postorder.iter().copied() {
            if !visited.insert(block_ref) {
                continue;
            }
            self.loops[block_ref.0] = parent.clone();
            // A back edge is an edge to a block that dominates its source.
            let mut body: HashSet<BlockRef> = HashSet::new();
            for pred in self.predecessors[block_ref.0].iter() {
                if dom.dominates(block_ref, *pred) {
                    body.insert(block_ref);
                    let mut stack = vec![*pred];
                    while let Some(block) = stack.pop() {
                        if body.insert(block) {
                            stack.extend(self.predecessors[block.0].iter().copied());
                        }
                    }
                }
            }
            if body.is_empty() {
                continue;
            }
            visited.extend(&body);
            let header = block_ref;
            let mut latches = HashSet::new();
            let mut exits = HashSet::new();
            for block_ref in &body {
                for_each_successor(function, *block_ref, |succ| {
                    if succ == header {
                        latches.insert(*block_ref);
                    }
                    if !body.contains(&succ) {
                        exits.insert(succ);
                    }
                })
            }
            let inner_rev_postorder = rev_postorder
                .iter()
                .copied()
                .filter(|block_ref| body.contains(block_ref) && block_ref != &header)
                .collect::<Vec<_>>();
            let loop_ = Rc::new(RefCell::new(Loop {
                header,
                body,
                latches,
                exits,
                parent: parent.clone(),
            }));
            self.loops[header.0] = Some(loop_.clone());
            self.analyze(function, dom, &inner_rev_postorder, Some(loop_));
        }
    }

    pub fn get_loop(&self, block_ref: BlockRef) -> Option<Rc<RefCell<Loop>>> {
        self.loops[block_ref.0].clone()
    }

    pub fn is_header(&self, block_ref: BlockRef) -> bool {
        self.get_loop(block_ref)
            .map(|l| l.borrow().header == block_ref)
            .unwrap_or(false)
    }

    /// Every loop in the function, one entry per header.
    pub fn all_loops(&self, function: &Function) -> Vec<Rc<RefCell<Loop>>> {
        function
            .iter_block_refs()
            .filter_map(|b| match self.get_loop(b) {
                Some(l) if l.borrow().header == b => Some(l),
                _ => None,
            })
            .collect()
    }

    /// The loop's dedicated entry block: the unique out-of-loop predecessor
    /// of the header, provided the header is its only successor. This pass
    /// never creates preheaders; loops lacking one are rejected.
    pub fn preheader(&self, function: &Function, loop_: &Loop) -> Option<BlockRef> {
        let external_preds = self.predecessors[loop_.header.0]
            .iter()
            .filter(|pred| !loop_.body.contains(pred))
            .copied()
            .collect::<Vec<_>>();
        if external_preds.len() != 1 {
            return None;
        }
        let pred = external_preds[0];
        let mut other_successors = false;
        for_each_successor(function, pred, |succ| {
            if succ != loop_.header {
                other_successors = true;
            }
        });
        (!other_successors).then_some(pred)
    }

    /// Canonical simplified form: dedicated preheader, a single latch, and
    /// dedicated exits (no block outside the loop with a predecessor both
    /// inside and outside it).
    pub fn is_simplified(&self, function: &Function, loop_: &Loop) -> bool {
        if self.preheader(function, loop_).is_none() {
            return false;
        }
        if loop_.latches.len() != 1 {
            return false;
        }
        loop_.exits.iter().all(|exit| {
            self.predecessors[exit.0]
                .iter()
                .all(|pred| loop_.body.contains(pred))
        })
    }
}
