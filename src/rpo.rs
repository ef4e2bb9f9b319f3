use crate::{
    block::{blocks_in_post_order, BlockId},
    procedure::Procedure,
    sparse_collection::SparseElement,
};

/// Compute the Block post-order for a Procedure. In the returned Vec a
/// BlockId will appear after all of its successors.
pub fn compute_po(proc: &Procedure) -> Vec<BlockId> {
    blocks_in_post_order(BlockId(0), proc)
}

/// Compute the Block reverse-post-order for a Procedure. In the returned
/// Vec a BlockId will appear before any of its successors.
pub fn compute_rpo(proc: &Procedure) -> Vec<BlockId> {
    let mut po = compute_po(proc);
    po.reverse();
    po
}

/// Sort Procedure's blocks using reverse postorder DFS, renumbering
/// successor and predecessor edges as needed.
///
/// Note that blocks unreachable from the entry block will be discarded.
pub fn rpo_sort(proc: &mut Procedure) {
    let rpo = compute_rpo(proc);

    if block_order_matches(proc, &rpo) {
        return;
    }

    // Create the mapping from old BlockId to new BlockId.
    // Dead blocks will have a usize::MAX entry.
    let remap = order_to_remap(&rpo, proc.blocks.len());

    for (old, &new) in remap.iter().enumerate() {
        if new.0 != usize::MAX {
            let bid = BlockId(old);

            for succ in proc.block_mut(bid).successor_list_mut() {
                let target = remap[succ.0];
                debug_assert_ne!(target.0, usize::MAX);
                *succ = target;
            }

            for pred in proc.block_mut(bid).predecessor_list_mut() {
                let target = remap[pred.0];
                debug_assert_ne!(target.0, usize::MAX);
                *pred = target;
            }
        }
    }

    permute_and_truncate(&mut proc.blocks, remap);

    for (i, block) in proc.blocks.iter_mut().enumerate() {
        block.index = i;
    }
    assert_eq!(proc.blocks.len(), rpo.len());

    proc.reset_value_owners();
}

fn order_to_remap(order: &[BlockId], len: usize) -> Vec<BlockId> {
    let mut remap = vec![BlockId::from(usize::MAX); len];

    for (i, &bid) in order.iter().enumerate() {
        // check for duplicates in `order`
        let bid_as_usize: usize = bid.into();
        debug_assert_eq!(remap[bid_as_usize], BlockId::from(usize::MAX));
        remap[bid_as_usize] = BlockId::from(i);
    }

    remap
}

/// Replace 'values' with a Vec where each entry is moved to the slot
/// specified in remap.
///
/// Entries that map to usize::MAX are discarded, in which case the Vec will
/// shrink. Entries other than usize::MAX must be unique.
pub fn permute_and_truncate<T: SparseElement>(values: &mut Vec<T>, mut remap: Vec<T::Id>)
where
    T::Id: PartialOrd + Ord,
{
    let mut slot = T::Id::from(0usize);

    while slot < T::Id::from(values.len()) {
        let mut desired_slot = remap[slot.into()];

        while slot != desired_slot {
            if desired_slot.into() != usize::MAX {
                values.swap(slot.into(), desired_slot.into());
                std::mem::swap(&mut remap[desired_slot.into()], &mut desired_slot);
            } else {
                values.swap_remove(slot.into());

                if slot.into() == values.len() {
                    return;
                }

                desired_slot = remap[values.len()];
            }
        }

        slot = T::Id::from(slot.into() + 1);
    }
}

/// Are the Blocks in procedure already in the order specified by rpo?
fn block_order_matches(proc: &Procedure, order: &[BlockId]) -> bool {
    order.len() == proc.blocks.len()
        && order.iter().enumerate().all(|(i, &b)| {
            let bid_as_usize: usize = b.into();
            i == bid_as_usize
        })
}
