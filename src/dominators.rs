use std::borrow::Cow;
use std::hash::Hash;
use std::marker::PhantomData;

use crate::utils::index_set::{IndexSet, KeyIndex};

/// The shape of a control-flow graph, as the analyses want to see it. Nodes
/// are dense: `node_index` maps a node into `0..num_nodes()` and `node` maps
/// back (possibly to None for holes).
pub trait Graph {
    type Node: Copy + Clone + PartialEq + Eq + Hash;

    fn node_index(&self, node: Self::Node) -> usize;
    fn node(&self, index: usize) -> Option<Self::Node>;
    fn num_nodes(&self) -> usize;
    fn root(&self) -> Self::Node;
    fn predecessors(&self, node: Self::Node) -> Cow<[Self::Node]>;
    fn successors(&self, node: Self::Node) -> Cow<[Self::Node]>;

    fn display(&self, node: Option<Self::Node>) -> String {
        match node {
            Some(node) => format!("#{}", self.node_index(node)),
            None => "<null>".to_string(),
        }
    }
}

pub struct GraphNodeWorklist<Node: Copy + Clone + PartialEq + Eq + Hash + KeyIndex> {
    seen: IndexSet<Node>,
    stack: Vec<Node>,
}

impl<Node: Copy + Clone + PartialEq + Eq + Hash + KeyIndex> GraphNodeWorklist<Node> {
    pub fn new() -> Self {
        Self {
            seen: IndexSet::new(),
            stack: Vec::new(),
        }
    }

    pub fn push(&mut self, node: Node) -> bool {
        if self.seen.insert(node) {
            self.stack.push(node);
            true
        } else {
            false
        }
    }

    pub fn push_all<I>(&mut self, iter: I)
    where
        I: Iterator<Item = Node>,
    {
        for node in iter {
            self.push(node);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn saw(&self, node: Node) -> bool {
        self.seen.contains(&node)
    }

    pub fn pop(&mut self) -> Option<Node> {
        self.stack.pop()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphVisitOrder {
    Pre,
    Post,
}

pub struct PostOrderGraphNodeWorklist<Node: Copy + Clone + PartialEq + Eq + Hash + KeyIndex> {
    worklist: GraphNodeWorklist<Node>,
    order: Vec<(Node, GraphVisitOrder)>,
}

impl<Node: Copy + Clone + PartialEq + Eq + Hash + KeyIndex> PostOrderGraphNodeWorklist<Node> {
    pub fn new() -> Self {
        Self {
            worklist: GraphNodeWorklist::new(),
            order: Vec::new(),
        }
    }

    pub fn push_pre(&mut self, node: Node) -> bool {
        self.push(node, GraphVisitOrder::Pre)
    }

    pub fn push_post(&mut self, node: Node) {
        self.order.push((node, GraphVisitOrder::Post));
    }

    pub fn push(&mut self, node: Node, order: GraphVisitOrder) -> bool {
        match order {
            GraphVisitOrder::Pre => {
                if self.worklist.push(node) {
                    self.order.push((node, order));
                    true
                } else {
                    false
                }
            }
            GraphVisitOrder::Post => {
                self.order.push((node, order));
                true
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn pop(&mut self) -> Option<(Node, GraphVisitOrder)> {
        self.order.pop()
    }
}

const NO_NODE: usize = usize::MAX;

/// Immediate-dominator tree, computed with the iterative Cooper–Harvey–
/// Kennedy scheme over a reverse-postorder numbering. Queries climb the
/// idom chain, which is plenty fast at the CFG sizes a single procedure
/// produces.
pub struct Dominators<G: Graph> {
    idom: Vec<usize>,
    root: usize,
    marker: PhantomData<G::Node>,
}

impl<G: Graph> Dominators<G> {
    pub fn new(graph: &G) -> Self {
        let n = graph.num_nodes();
        let root = graph.node_index(graph.root());

        // Reverse postorder of the reachable nodes, by explicit DFS so a
        // deep graph cannot blow the program stack.
        let mut postorder = Vec::with_capacity(n);
        let mut seen = vec![false; n];
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        seen[root] = true;

        while let Some((index, succ_position)) = stack.pop() {
            let node = graph.node(index).expect("dense graph index");
            let successors = graph.successors(node);

            if succ_position < successors.len() {
                stack.push((index, succ_position + 1));
                let succ = graph.node_index(successors[succ_position]);
                if !seen[succ] {
                    seen[succ] = true;
                    stack.push((succ, 0));
                }
            } else {
                postorder.push(index);
            }
        }

        let mut rpo_number = vec![NO_NODE; n];
        for (i, &index) in postorder.iter().rev().enumerate() {
            rpo_number[index] = i;
        }

        let mut idom = vec![NO_NODE; n];
        idom[root] = root;

        let intersect = |idom: &[usize], mut a: usize, mut b: usize| -> usize {
            while a != b {
                while rpo_number[a] > rpo_number[b] {
                    a = idom[a];
                }
                while rpo_number[b] > rpo_number[a] {
                    b = idom[b];
                }
            }
            a
        };

        let mut changed = true;
        while changed {
            changed = false;

            for &index in postorder.iter().rev() {
                if index == root {
                    continue;
                }

                let node = graph.node(index).expect("dense graph index");
                let mut new_idom = NO_NODE;

                for &pred in graph.predecessors(node).iter() {
                    let pred = graph.node_index(pred);
                    if idom[pred] == NO_NODE {
                        continue;
                    }
                    new_idom = if new_idom == NO_NODE {
                        pred
                    } else {
                        intersect(&idom, pred, new_idom)
                    };
                }

                if new_idom != NO_NODE && idom[index] != new_idom {
                    idom[index] = new_idom;
                    changed = true;
                }
            }
        }

        Self {
            idom,
            root,
            marker: PhantomData,
        }
    }

    pub fn idom(&self, graph: &G, node: G::Node) -> Option<G::Node> {
        let index = graph.node_index(node);
        if index == self.root || self.idom[index] == NO_NODE {
            None
        } else {
            graph.node(self.idom[index])
        }
    }

    pub fn is_reachable(&self, graph: &G, node: G::Node) -> bool {
        self.idom[graph.node_index(node)] != NO_NODE
    }

    pub fn dominates(&self, graph: &G, from: G::Node, to: G::Node) -> bool {
        self.dominates_index(graph.node_index(from), graph.node_index(to))
    }

    pub fn strictly_dominates(&self, graph: &G, from: G::Node, to: G::Node) -> bool {
        from != to && self.dominates(graph, from, to)
    }

    fn dominates_index(&self, from: usize, to: usize) -> bool {
        let mut current = to;

        if self.idom[current] == NO_NODE {
            return false;
        }

        loop {
            if current == from {
                return true;
            }
            if current == self.root {
                return false;
            }
            current = self.idom[current];
        }
    }

    pub(crate) fn into_idom_table(self) -> (Vec<usize>, usize) {
        (self.idom, self.root)
    }
}

/// DFS tree over a graph, answering ancestor queries by pre/post interval
/// containment. Used to spot back edges when rooting the backwards graph.
struct DfsTree {
    pre: Vec<usize>,
    post: Vec<usize>,
}

impl DfsTree {
    fn new<G: Graph>(graph: &G) -> Self {
        let n = graph.num_nodes();
        let mut this = Self {
            pre: vec![NO_NODE; n],
            post: vec![0; n],
        };

        let root = graph.node_index(graph.root());
        let mut number = 0;
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        this.pre[root] = number;
        number += 1;

        while let Some((index, succ_position)) = stack.pop() {
            let node = graph.node(index).expect("dense graph index");
            let successors = graph.successors(node);

            if succ_position < successors.len() {
                stack.push((index, succ_position + 1));
                let succ = graph.node_index(successors[succ_position]);
                if this.pre[succ] == NO_NODE {
                    this.pre[succ] = number;
                    number += 1;
                    stack.push((succ, 0));
                }
            } else {
                this.post[index] = number;
                number += 1;
            }
        }

        this
    }

    fn is_descendant(&self, a: usize, b: usize) -> bool {
        self.pre[a] != NO_NODE
            && self.pre[b] != NO_NODE
            && self.pre[a] <= self.pre[b]
            && self.post[b] <= self.post[a]
    }
}

/// A node of the backwards graph: either the synthetic root that fans out
/// to every exit, or a node of the underlying graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SingleGraphNode<N: Copy + Clone + PartialEq + Eq + Hash> {
    node: N,
    is_root: bool,
}

impl<N: Copy + Clone + PartialEq + Eq + Hash> SingleGraphNode<N> {
    pub fn new(node: N) -> Self {
        Self {
            node,
            is_root: false,
        }
    }

    pub fn root(placeholder: N) -> Self {
        Self {
            node: placeholder,
            is_root: true,
        }
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    pub fn node(&self) -> N {
        self.node
    }
}

/// The reverse of a graph, with a synthetic root whose successors are the
/// graph's terminal nodes. Loops are a form of terminality (you can loop
/// forever), so targets of back edges are roots too; otherwise nodes inside
/// an infinite loop would have no path from the backwards root.
pub struct BackwardsGraph<'a, G: Graph> {
    graph: &'a G,
    root_successor_list: Vec<SingleGraphNode<G::Node>>,
    root_successor_indices: Vec<bool>,
}

impl<'a, G: Graph> BackwardsGraph<'a, G> {
    pub fn new(graph: &'a G) -> Self {
        let mut this = Self {
            graph,
            root_successor_list: Vec::new(),
            root_successor_indices: vec![false; graph.num_nodes()],
        };

        let mut seen = vec![false; graph.num_nodes()];

        let mut add_root_successor = |this: &mut Self, seen: &mut Vec<bool>, node: G::Node| {
            let index = graph.node_index(node);
            if seen[index] {
                return;
            }

            this.root_successor_list.push(SingleGraphNode::new(node));
            this.root_successor_indices[index] = true;

            // Everything that reaches a root successor is already served by
            // it, so only the first root in a region sticks.
            let mut worklist = vec![node];
            seen[index] = true;
            while let Some(node) = worklist.pop() {
                for &pred in graph.predecessors(node).iter() {
                    let pred_index = graph.node_index(pred);
                    if !seen[pred_index] {
                        seen[pred_index] = true;
                        worklist.push(pred);
                    }
                }
            }
        };

        {
            let dfs = DfsTree::new(graph);
            for i in 0..graph.num_nodes() {
                if let Some(node) = graph.node(i) {
                    for &succ in graph.successors(node).iter() {
                        if !dfs.is_descendant(i, graph.node_index(succ)) {
                            add_root_successor(&mut this, &mut seen, succ);
                            break;
                        }
                    }
                }
            }
        }

        for i in 0..graph.num_nodes() {
            if let Some(node) = graph.node(i) {
                if graph.successors(node).is_empty() {
                    add_root_successor(&mut this, &mut seen, node);
                }
            }
        }

        // Any node still unseen sits in a region with backward edges but no
        // forward exit. Taking the highest-numbered nodes first is a rough
        // heuristic that works out when the input is already sorted nicely.
        for i in (0..graph.num_nodes()).rev() {
            if let Some(node) = graph.node(i) {
                add_root_successor(&mut this, &mut seen, node);
            }
        }

        this
    }

    fn placeholder(&self) -> G::Node {
        self.graph.root()
    }
}

impl<'a, G: Graph> Graph for BackwardsGraph<'a, G> {
    type Node = SingleGraphNode<G::Node>;

    fn node_index(&self, node: Self::Node) -> usize {
        if node.is_root() {
            0
        } else {
            self.graph.node_index(node.node()) + 1
        }
    }

    fn node(&self, index: usize) -> Option<Self::Node> {
        if index == 0 {
            Some(SingleGraphNode::root(self.placeholder()))
        } else {
            self.graph.node(index - 1).map(SingleGraphNode::new)
        }
    }

    fn num_nodes(&self) -> usize {
        self.graph.num_nodes() + 1
    }

    fn root(&self) -> Self::Node {
        SingleGraphNode::root(self.placeholder())
    }

    fn successors(&self, node: Self::Node) -> Cow<[Self::Node]> {
        if node.is_root() {
            Cow::Borrowed(&self.root_successor_list)
        } else {
            Cow::Owned(
                self.graph
                    .predecessors(node.node())
                    .iter()
                    .copied()
                    .map(SingleGraphNode::new)
                    .collect(),
            )
        }
    }

    fn predecessors(&self, node: Self::Node) -> Cow<[Self::Node]> {
        if node.is_root() {
            return Cow::Borrowed(&[]);
        }

        let mut result = vec![];

        if self.root_successor_indices[self.graph.node_index(node.node())] {
            result.push(SingleGraphNode::root(self.placeholder()));
        }

        for &succ in self.graph.successors(node.node()).iter() {
            result.push(SingleGraphNode::new(succ));
        }

        Cow::Owned(result)
    }
}

/// Post-dominance over a procedure-shaped graph, flattened to an idom table
/// over backwards-graph indices so queries need no graph at hand.
pub struct PostDominators {
    idom: Vec<usize>,
    root: usize,
}

impl PostDominators {
    pub fn new<G: Graph>(graph: &G) -> Self {
        let backwards = BackwardsGraph::new(graph);
        let dominators = Dominators::new(&backwards);
        let (idom, root) = dominators.into_idom_table();
        Self { idom, root }
    }

    /// Does every path from `to` out of the procedure pass through `from`?
    pub fn post_dominates<G: Graph>(&self, graph: &G, from: G::Node, to: G::Node) -> bool {
        let from = graph.node_index(from) + 1;
        let mut current = graph.node_index(to) + 1;

        if self.idom[current] == NO_NODE {
            return false;
        }

        loop {
            if current == from {
                return true;
            }
            if current == self.root {
                return false;
            }
            current = self.idom[current];
        }
    }
}
