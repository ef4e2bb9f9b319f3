use log::debug;

use crate::{
    block::BlockId,
    dominators::PostDominators,
    edge::{Edge, SeseInfo},
    opcode::Opcode,
    procedure::Procedure,
    scev::affine_recurrence,
};

/// Walk the loop forest and mark the edges whose counts are recoverable
/// from a well-founded induction or branch variable. A marked edge gets
/// weight zero, which forces it out of the spanning tree and into the
/// chord set, where its "increment" costs one division at each loop exit
/// instead of one memory update per trip.
pub fn reweight_loops(proc: &Procedure, edges: &mut [Edge]) {
    let dominators = proc.dominators();
    let natural_loops = proc.natural_loops();
    let post_dominators = PostDominators::new(proc);

    let same_cycle = |a: BlockId, b: BlockId| -> bool {
        let index_of = |block| natural_loops.inner_most_loop_of(block).map(|l| l.index());
        index_of(a) == index_of(b)
    };

    // Two blocks are SESE-related when one bounds the other on every path,
    // in either order, and both sit in the same cycle of the forest.
    let sese_related = |a: BlockId, b: BlockId| -> bool {
        if !same_cycle(a, b) {
            return false;
        }
        (dominators.dominates(proc, a, b) && post_dominators.post_dominates(proc, b, a))
            || (post_dominators.post_dominates(proc, a, b) && dominators.dominates(proc, b, a))
    };

    for loop_index in natural_loops.loops_in_preorder() {
        let loop_ = natural_loops.loop_(loop_index);

        let (Some(_pre_header), Some(latch)) = (loop_.pre_header(proc), loop_.back_block(proc))
        else {
            continue;
        };

        let header = loop_.header();
        let exit_blocks = loop_.exit_blocks(proc);

        // The exit blocks are where the recovered count lands; without a
        // dominating header the induction value would not be visible there.
        if exit_blocks.is_empty()
            || !exit_blocks
                .iter()
                .all(|&exit| dominators.dominates(proc, header, exit))
        {
            continue;
        }

        for &phi in proc.block(header).iter() {
            if proc.value(phi).opcode() != Opcode::Phi {
                break;
            }

            let Some((recurrence, chain)) = affine_recurrence(proc, loop_, phi) else {
                continue;
            };

            let info = SeseInfo {
                induction_var: phi,
                init_value: recurrence.init,
                step: recurrence.step,
                exit_blocks: exit_blocks.clone(),
            };

            // Induction-variable rule: every step of the chain runs exactly
            // once per trip around the back edge, so the recovered count is
            // the back edge's count.
            if chain
                .op_blocks
                .iter()
                .all(|&block| sese_related(block, latch))
            {
                debug!(
                    "{}: induction variable @{} marks back edge BB{} -> BB{}",
                    proc.name(),
                    phi.0,
                    latch.0,
                    header.0
                );
                mark_edge(edges, latch, header, info);
                continue;
            }

            // Branch-variable rule: the steps run on some trips only, but
            // all inside one control-equivalent sub-region. The recovered
            // count then belongs to the edge entering that region.
            if !chain
                .op_blocks
                .iter()
                .all(|&block| chain.op_blocks.iter().all(|&other| sese_related(block, other)))
            {
                continue;
            }

            let Some(&region_entry) = chain.op_blocks.iter().find(|&&candidate| {
                chain
                    .op_blocks
                    .iter()
                    .all(|&other| dominators.dominates(proc, candidate, other))
            }) else {
                continue;
            };

            // The region must be a proper sub-region reached over a single
            // edge; then the edge's count is exactly the region's count.
            if region_entry == header {
                continue;
            }
            let preds = proc.block(region_entry).predecessor_list();
            if preds.len() != 1 || !loop_.contains(preds[0]) {
                continue;
            }
            let pred = preds[0];

            debug!(
                "{}: branch variable @{} marks region edge BB{} -> BB{}",
                proc.name(),
                phi.0,
                pred.0,
                region_entry.0
            );
            mark_edge(edges, pred, region_entry, info);
        }
    }
}

/// Attach the SESE mark to the edge `origin -> dest`, honouring the
/// tie-break between competing phis: a larger |step| wins, except that a
/// mark with step 1 is never replaced.
fn mark_edge(edges: &mut [Edge], origin: BlockId, dest: BlockId, info: SeseInfo) {
    let Some(edge) = edges
        .iter_mut()
        .find(|edge| edge.origin() == origin && edge.dest() == dest)
    else {
        return;
    };

    match edge.sese() {
        Some(existing) => {
            if existing.step == 1 {
                return;
            }
            if info.step.abs() > existing.step.abs() {
                edge.set_sese(info);
            }
        }
        None => edge.set_sese(info),
    }
}
