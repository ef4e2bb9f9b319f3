use crate::{
    block::{blocks_in_pre_order, BasicBlock, BlockId},
    procedure::Procedure,
    rpo::rpo_sort,
};

/// Breaks critical edges in the IR.
///
/// Critical edges are edges that are neither the only edge leaving a
/// block, nor the only edge entering one.
///
/// When you want something to happen "along" an edge, you can either do it
/// at the end of the predecessor block, or at the start of the successor
/// block. Critical edges have to be broken in order to prevent "edge
/// actions" from affecting other edges. Counter increments are exactly such
/// edge actions, so the instrumenters run this first.
///
/// The blocks inserted along split edges are flagged, and the graph file
/// names them accordingly.
pub fn break_critical_edges(proc: &mut Procedure) {
    let mut pred_count = vec![0u32; proc.blocks.len()];

    for block in blocks_in_pre_order(BlockId(0), proc) {
        for tgt in proc.block(block).successor_list().iter().copied() {
            pred_count[tgt.0] += 1;
        }
    }

    let mut work = Vec::new();
    let num_blocks = proc.blocks.len();

    for bid in (0..num_blocks).map(BlockId) {
        let succs = proc.block_mut(bid).successor_list_mut();

        if succs.len() > 1 {
            for succ in succs {
                if pred_count[succ.0] > 1 {
                    let split_bid = BlockId(num_blocks + work.len());

                    work.push((bid, split_bid, *succ));

                    *succ = split_bid;
                }
            }
        }
    }

    if !work.is_empty() {
        proc.invalidate_cfg();

        proc.blocks
            .resize_with(num_blocks + work.len(), || BasicBlock::new(usize::MAX));

        for (bid, split_bid, old_target) in work.drain(..) {
            let value = proc.add_jump();

            proc.block_mut(split_bid).index = split_bid.0;
            proc.block_mut(split_bid).split = true;
            proc.add_to_block(split_bid, value);

            proc.block_mut(split_bid).successor_list_mut().push(old_target);
            proc.block_mut(split_bid).predecessor_list_mut().push(bid);

            assert!(proc
                .block_mut(old_target)
                .replace_predecessor(bid, split_bid));
        }

        proc.reset_reachability();
        rpo_sort(proc);
    }
}
