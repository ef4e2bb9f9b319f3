use std::collections::BTreeMap;
use std::path::Path;

use tempfile::TempDir;

use crate::{
    block::{BasicBlockBuilder, BlockId},
    dominators::PostDominators,
    graph_file,
    instrument::run_pass,
    interp::{Interp, InterpError},
    module::Module,
    opcode::Opcode,
    procedure::Procedure,
    propagate::{self, PropagateOptions},
    register_pass,
    scev::affine_recurrence,
    spanning_tree::{find_exit_block, SpanningTree},
    typ::Type,
    value::ValueId,
    Options, ProfileVariant,
};

fn propagate_with(dir: &Path, prof: &str, extension: &str, separate: bool) {
    let options = PropagateOptions {
        output_extension: Some(extension.to_string()),
        separate,
    };
    propagate::run(&graph_file::info_path(dir), &dir.join(prof), &options).unwrap();
}

/// Parse a `.edges` result: one `(origin, dest, weight)` per line, in edge
/// index order, one Vec per blank-line-separated result set.
fn read_edge_sets(path: &Path) -> Vec<Vec<(String, String, i64)>> {
    let text = std::fs::read_to_string(path).unwrap();
    let mut sets = vec![];
    let mut current = vec![];

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !current.is_empty() {
                sets.push(std::mem::take(&mut current));
            }
            continue;
        }
        let mut parts = line.split_whitespace();
        let origin = parts.next().unwrap().to_string();
        assert_eq!(parts.next(), Some("->"));
        let dest = parts.next().unwrap().to_string();
        assert_eq!(parts.next(), Some(":"));
        let weight: i64 = parts.next().unwrap().parse().unwrap();
        current.push((origin, dest, weight));
    }
    if !current.is_empty() {
        sets.push(current);
    }

    sets
}

fn read_edges(path: &Path) -> Vec<(String, String, i64)> {
    let mut sets = read_edge_sets(path);
    assert_eq!(sets.len(), 1, "expected a single result set");
    sets.pop().unwrap()
}

fn read_bb(path: &Path) -> BTreeMap<String, i64> {
    let text = std::fs::read_to_string(path).unwrap();
    let mut map = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        let block = parts.next().unwrap().to_string();
        assert_eq!(parts.next(), Some(":"));
        map.insert(block, parts.next().unwrap().parse().unwrap());
    }
    map
}

fn weights_of(edges: &[(String, String, i64)]) -> Vec<i64> {
    edges.iter().map(|(_, _, weight)| *weight).collect()
}

/// entry -> A -> B -> return.
fn straight_line() -> Procedure {
    let mut proc = Procedure::new("main");
    let b0 = proc.add_block();
    let b1 = proc.add_block();
    let b2 = proc.add_block();
    let b3 = proc.add_block();

    BasicBlockBuilder::new(&mut proc, b0).jump(b1);
    BasicBlockBuilder::new(&mut proc, b1).jump(b2);
    BasicBlockBuilder::new(&mut proc, b2).jump(b3);
    BasicBlockBuilder::new(&mut proc, b3).return_(None);

    proc
}

/// entry branches on arg0 into L or R, both meet at a join that returns.
fn diamond() -> Procedure {
    let mut proc = Procedure::new("main");
    let b0 = proc.add_block();
    let b1 = proc.add_block();
    let b2 = proc.add_block();
    let b3 = proc.add_block();

    let mut builder = BasicBlockBuilder::new(&mut proc, b0);
    let condition = builder.argument(Type::Int64, 0);
    builder.branch(condition, b1, b2);

    BasicBlockBuilder::new(&mut proc, b1).jump(b3);
    BasicBlockBuilder::new(&mut proc, b2).jump(b3);
    BasicBlockBuilder::new(&mut proc, b3).return_(None);

    proc
}

/// for i in 0..bound: entry, header with the phi, body-latch, exit.
/// Returns the procedure and the header phi.
fn counted_loop(name: &str, bound: i64) -> (Procedure, ValueId) {
    let mut proc = Procedure::new(name);
    let b0 = proc.add_block();
    let b1 = proc.add_block();
    let b2 = proc.add_block();
    let b3 = proc.add_block();

    let mut builder = BasicBlockBuilder::new(&mut proc, b0);
    let zero = builder.const32(0);
    builder.jump(b1);

    let mut builder = BasicBlockBuilder::new(&mut proc, b1);
    let i = builder.phi(Type::Int32);
    let limit = builder.const32(bound as i32);
    let keep_going = builder.binary(Opcode::LessThan, i, limit);
    builder.branch(keep_going, b2, b3);

    let mut builder = BasicBlockBuilder::new(&mut proc, b2);
    let one = builder.const32(1);
    let next = builder.binary(Opcode::Add, i, one);
    builder.jump(b1);

    let mut builder = BasicBlockBuilder::new(&mut proc, b3);
    builder.return_(Some(i));

    proc.phi_add_incoming(i, b0, zero);
    proc.phi_add_incoming(i, b2, next);

    (proc, i)
}

#[test]
fn pass_registry_resolves_known_names() {
    assert_eq!(register_pass("nisse"), Some(ProfileVariant::Nisse));
    assert_eq!(register_pass("ks"), Some(ProfileVariant::Ks));
    assert_eq!(register_pass("ball"), Some(ProfileVariant::Ball));
    assert_eq!(register_pass("loop-unroll"), None);
}

#[test]
fn dominance_on_a_diamond() {
    let proc = diamond();
    let dominators = proc.dominators();
    let post = PostDominators::new(&proc);

    assert!(dominators.dominates(&proc, BlockId(0), BlockId(3)));
    assert!(!dominators.dominates(&proc, BlockId(1), BlockId(3)));
    assert!(post.post_dominates(&proc, BlockId(3), BlockId(0)));
    assert!(!post.post_dominates(&proc, BlockId(1), BlockId(0)));
}

#[test]
fn interpreter_runs_arithmetic() {
    let mut module = Module::new("calc");
    let mut proc = Procedure::new("main");
    let b0 = proc.add_block();

    let mut builder = BasicBlockBuilder::new(&mut proc, b0);
    let a = builder.argument(Type::Int64, 0);
    let b = builder.argument(Type::Int64, 1);
    let sum = builder.binary(Opcode::Add, a, b);
    let two = builder.const64(2);
    let result = builder.binary(Opcode::Mul, sum, two);
    builder.return_(Some(result));

    module.add_procedure(proc);

    let dir = TempDir::new().unwrap();
    let mut interp = Interp::new(&module, dir.path());
    assert_eq!(interp.run("main", &[3, 4]).unwrap(), Some(14));
}

#[test]
fn scalar_evolution_sees_the_counted_loop() {
    let (proc, phi) = counted_loop("f", 10);
    let natural_loops = proc.natural_loops();
    assert_eq!(natural_loops.num_loops(), 1);

    let loop_ = natural_loops.loop_(0);
    assert_eq!(loop_.header(), BlockId(1));
    assert_eq!(loop_.pre_header(&proc), Some(BlockId(0)));
    assert_eq!(loop_.back_block(&proc), Some(BlockId(2)));
    assert_eq!(loop_.exit_blocks(&proc), vec![BlockId(3)]);

    let (recurrence, chain) = affine_recurrence(&proc, loop_, phi).unwrap();
    assert_eq!(recurrence.step, 1);
    assert_eq!(chain.op_blocks, vec![BlockId(2)]);
}

#[test]
fn nisse_marks_the_back_edge() {
    let (proc, _) = counted_loop("f", 10);
    let st = SpanningTree::analyze(&proc, ProfileVariant::Nisse).unwrap();

    let sese: Vec<_> = st.chords.iter().filter(|edge| edge.is_sese()).collect();
    assert_eq!(sese.len(), 1);
    let back_edge = sese[0];
    assert_eq!(back_edge.origin(), BlockId(2));
    assert_eq!(back_edge.dest(), BlockId(1));
    let info = back_edge.sese().unwrap();
    assert_eq!(info.step, 1);
    assert_eq!(info.exit_blocks, vec![BlockId(3)]);
}

// An increment that a break can skip past fails the induction rule but
// still sits in a single-entry sub-region, so the edge into that region
// gets the mark instead of the back edge.
#[test]
fn branch_variable_marks_the_region_edge() {
    let mut proc = Procedure::new("f");
    let b0 = proc.add_block();
    let b1 = proc.add_block(); // header
    let b2 = proc.add_block(); // increment, then maybe break
    let b3 = proc.add_block(); // latch
    let b6 = proc.add_block(); // exit taken by the break
    let b7 = proc.add_block(); // exit taken by the header
    let b5 = proc.add_block();

    let mut builder = BasicBlockBuilder::new(&mut proc, b0);
    let zero = builder.const32(0);
    builder.jump(b1);

    let mut builder = BasicBlockBuilder::new(&mut proc, b1);
    let i = builder.phi(Type::Int32);
    let limit = builder.const32(10);
    let keep_going = builder.binary(Opcode::LessThan, i, limit);
    builder.branch(keep_going, b2, b7);

    let mut builder = BasicBlockBuilder::new(&mut proc, b2);
    let one = builder.const32(1);
    let next = builder.binary(Opcode::Add, i, one);
    let four = builder.const32(4);
    let done = builder.binary(Opcode::Equal, next, four);
    builder.branch(done, b6, b3);

    BasicBlockBuilder::new(&mut proc, b3).jump(b1);
    BasicBlockBuilder::new(&mut proc, b6).jump(b5);
    BasicBlockBuilder::new(&mut proc, b7).jump(b5);
    BasicBlockBuilder::new(&mut proc, b5).return_(None);

    proc.phi_add_incoming(i, b0, zero);
    proc.phi_add_incoming(i, b3, next);

    let st = SpanningTree::analyze(&proc, ProfileVariant::Nisse).unwrap();

    let region_edge = st
        .edges
        .iter()
        .find(|edge| edge.origin() == b1 && edge.dest() == b2)
        .unwrap();
    let info = region_edge.sese().unwrap();
    assert_eq!(info.step, 1);
    assert_eq!(info.exit_blocks, vec![b6, b7]);

    let back_edge = st
        .edges
        .iter()
        .find(|edge| edge.origin() == b3 && edge.dest() == b1)
        .unwrap();
    assert!(!back_edge.is_sese());
}

#[test]
fn spanning_tree_partitions_the_edges() {
    let proc = diamond();
    let st = SpanningTree::analyze(&proc, ProfileVariant::Ks).unwrap();

    assert_eq!(st.edges.len(), 5);
    assert_eq!(st.tree.len(), proc.num_blocks() - 1);
    assert_eq!(st.tree.len() + st.chords.len(), st.edges.len());
    for tree_edge in &st.tree {
        assert!(!st.chords.iter().any(|chord| chord == tree_edge));
    }
}

// Scenario: straight-line function. The lone chord is the synthetic edge,
// instrumentation is suppressed, and the propagator recovers the unique
// flow from the graph structure alone.
#[test]
fn straight_line_recovers_without_counters() {
    let dir = TempDir::new().unwrap();
    let mut module = Module::new("m");
    module.add_procedure(straight_line());

    run_pass(&mut module, ProfileVariant::Ks, &Options::default(), dir.path()).unwrap();

    // No counters were placed, so running the program records nothing.
    let mut interp = Interp::new(&module, dir.path());
    interp.run("main", &[]).unwrap();

    propagate_with(dir.path(), "main.prof", "-agg", false);

    let edges = read_edges(&dir.path().join("main-agg.edges"));
    assert_eq!(weights_of(&edges), vec![1, 1, 1, 1]);

    let bb = read_bb(&dir.path().join("main-agg.bb"));
    assert_eq!(
        bb,
        BTreeMap::from([
            ("0".to_string(), 1),
            ("1".to_string(), 1),
            ("2".to_string(), 1),
            ("3".to_string(), 1),
        ])
    );
}

// Scenario: if-then-else diamond, two runs down the left arm.
#[test]
fn diamond_ks_round_trip() {
    let dir = TempDir::new().unwrap();
    let mut module = Module::new("m");
    module.add_procedure(diamond());

    run_pass(&mut module, ProfileVariant::Ks, &Options::default(), dir.path()).unwrap();

    let mut interp = Interp::new(&module, dir.path());
    interp.run("main", &[1]).unwrap();
    interp.run("main", &[1]).unwrap();

    propagate_with(dir.path(), "main.prof", "-agg", false);

    let edges = read_edges(&dir.path().join("main-agg.edges"));
    assert_eq!(
        edges,
        vec![
            ("0".to_string(), "1".to_string(), 2),
            ("0".to_string(), "2".to_string(), 0),
            ("1".to_string(), "3".to_string(), 2),
            ("2".to_string(), "3".to_string(), 0),
            ("3".to_string(), "0".to_string(), 2),
        ]
    );

    let bb = read_bb(&dir.path().join("main-agg.bb"));
    assert_eq!(bb["0"], 2);
    assert_eq!(bb["1"], 2);
    assert_eq!(bb["2"], 0);
    assert_eq!(bb["3"], 2);
}

// Same diamond under the naive DFS tree, with both arms exercised.
#[test]
fn diamond_ball_round_trip() {
    let dir = TempDir::new().unwrap();
    let mut module = Module::new("m");
    module.add_procedure(diamond());

    run_pass(&mut module, ProfileVariant::Ball, &Options::default(), dir.path()).unwrap();

    let mut interp = Interp::new(&module, dir.path());
    for _ in 0..5 {
        interp.run("main", &[1]).unwrap();
    }
    for _ in 0..3 {
        interp.run("main", &[0]).unwrap();
    }

    propagate_with(dir.path(), "main.prof", "-agg", false);

    let edges = read_edges(&dir.path().join("main-agg.edges"));
    assert_eq!(weights_of(&edges), vec![5, 3, 5, 3, 8]);

    let bb = read_bb(&dir.path().join("main-agg.bb"));
    assert_eq!(bb["1"], 5);
    assert_eq!(bb["2"], 3);
    assert_eq!(bb["3"], 8);
}

// Per-invocation mode keeps each run's profile apart.
#[test]
fn separate_mode_keeps_invocations_apart() {
    let dir = TempDir::new().unwrap();
    let mut module = Module::new("m");
    module.add_procedure(diamond());

    run_pass(&mut module, ProfileVariant::Ks, &Options::default(), dir.path()).unwrap();

    let mut interp = Interp::new(&module, dir.path());
    interp.run("main", &[1]).unwrap();
    interp.run("main", &[0]).unwrap();

    propagate_with(dir.path(), "main.prof", "-s", true);

    let sets = read_edge_sets(&dir.path().join("main-s.edges"));
    assert_eq!(sets.len(), 2);
    assert_eq!(weights_of(&sets[0]), vec![1, 0, 1, 0, 1]);
    assert_eq!(weights_of(&sets[1]), vec![0, 1, 0, 1, 1]);
}

// Scenario: simple counted loop, executed once. One range increment at the
// exit recovers ten trips around the back edge.
#[test]
fn counted_loop_nisse_round_trip() {
    let dir = TempDir::new().unwrap();
    let mut module = Module::new("m");
    let (proc, _) = counted_loop("main", 10);
    module.add_procedure(proc);

    run_pass(&mut module, ProfileVariant::Nisse, &Options::default(), dir.path()).unwrap();

    let mut interp = Interp::new(&module, dir.path());
    assert_eq!(interp.run("main", &[]).unwrap(), Some(10));

    propagate_with(dir.path(), "main.prof", "-agg", false);

    let edges = read_edges(&dir.path().join("main-agg.edges"));
    assert_eq!(
        edges,
        vec![
            ("0".to_string(), "1".to_string(), 1),
            ("1".to_string(), "2".to_string(), 10),
            ("1".to_string(), "3".to_string(), 1),
            ("2".to_string(), "1".to_string(), 10),
            ("3".to_string(), "0".to_string(), 1),
        ]
    );

    let bb = read_bb(&dir.path().join("main-agg.bb"));
    assert_eq!(bb["1"], 11); // header: one entry plus ten back edges
    assert_eq!(bb["2"], 10); // body
    assert_eq!(bb["3"], 1);
}

// Scenario: nested loops, outer 3 trips, inner 4 per outer trip. Both back
// edges are range-counted at their exits.
#[test]
fn nested_loops_nisse_round_trip() {
    let dir = TempDir::new().unwrap();
    let mut module = Module::new("m");

    let mut proc = Procedure::new("main");
    let b0 = proc.add_block();
    let b1 = proc.add_block(); // outer header
    let b2 = proc.add_block(); // inner pre-header
    let b3 = proc.add_block(); // inner header
    let b4 = proc.add_block(); // inner latch
    let b5 = proc.add_block(); // outer latch, inner exit
    let b6 = proc.add_block(); // outer exit

    let mut builder = BasicBlockBuilder::new(&mut proc, b0);
    let i_init = builder.const32(0);
    builder.jump(b1);

    let mut builder = BasicBlockBuilder::new(&mut proc, b1);
    let i = builder.phi(Type::Int32);
    let outer_limit = builder.const32(3);
    let outer_cond = builder.binary(Opcode::LessThan, i, outer_limit);
    builder.branch(outer_cond, b2, b6);

    let mut builder = BasicBlockBuilder::new(&mut proc, b2);
    let j_init = builder.const32(0);
    builder.jump(b3);

    let mut builder = BasicBlockBuilder::new(&mut proc, b3);
    let j = builder.phi(Type::Int32);
    let inner_limit = builder.const32(4);
    let inner_cond = builder.binary(Opcode::LessThan, j, inner_limit);
    builder.branch(inner_cond, b4, b5);

    let mut builder = BasicBlockBuilder::new(&mut proc, b4);
    let one = builder.const32(1);
    let j_next = builder.binary(Opcode::Add, j, one);
    builder.jump(b3);

    let mut builder = BasicBlockBuilder::new(&mut proc, b5);
    let one = builder.const32(1);
    let i_next = builder.binary(Opcode::Add, i, one);
    builder.jump(b1);

    let mut builder = BasicBlockBuilder::new(&mut proc, b6);
    builder.return_(None);

    proc.phi_add_incoming(i, b0, i_init);
    proc.phi_add_incoming(i, b5, i_next);
    proc.phi_add_incoming(j, b2, j_init);
    proc.phi_add_incoming(j, b4, j_next);

    module.add_procedure(proc);

    run_pass(&mut module, ProfileVariant::Nisse, &Options::default(), dir.path()).unwrap();

    let mut interp = Interp::new(&module, dir.path());
    interp.run("main", &[]).unwrap();

    propagate_with(dir.path(), "main.prof", "-agg", false);

    let edges = read_edges(&dir.path().join("main-agg.edges"));
    assert_eq!(
        edges,
        vec![
            ("0".to_string(), "1".to_string(), 1),
            ("1".to_string(), "2".to_string(), 3),
            ("1".to_string(), "6".to_string(), 1),
            ("2".to_string(), "3".to_string(), 3),
            ("3".to_string(), "4".to_string(), 12),
            ("3".to_string(), "5".to_string(), 3),
            ("4".to_string(), "3".to_string(), 12),
            ("5".to_string(), "1".to_string(), 3),
            ("6".to_string(), "0".to_string(), 1),
        ]
    );

    let bb = read_bb(&dir.path().join("main-agg.bb"));
    assert_eq!(bb["1"], 4); // outer header: entry plus three back edges
    assert_eq!(bb["3"], 15); // inner header: three entries plus twelve back edges
    assert_eq!(bb["4"], 12);
    assert_eq!(bb["5"], 3);
    assert_eq!(bb["6"], 1);
}

// Scenario: a function with both a return and an unreachable tail. The
// return block is the exit; the unreachable block gets no dump call.
#[test]
fn unreachable_tail_prefers_the_return_exit() {
    let dir = TempDir::new().unwrap();
    let mut module = Module::new("m");

    let mut proc = Procedure::new("main");
    let b0 = proc.add_block();
    let b1 = proc.add_block();
    let b2 = proc.add_block();
    let b3 = proc.add_block();
    let b4 = proc.add_block(); // return
    let b5 = proc.add_block(); // unreachable

    let mut builder = BasicBlockBuilder::new(&mut proc, b0);
    let arm = builder.argument(Type::Int64, 0);
    builder.branch(arm, b1, b2);
    BasicBlockBuilder::new(&mut proc, b1).jump(b3);
    BasicBlockBuilder::new(&mut proc, b2).jump(b3);

    let mut builder = BasicBlockBuilder::new(&mut proc, b3);
    let tail = builder.argument(Type::Int64, 1);
    builder.branch(tail, b4, b5);

    BasicBlockBuilder::new(&mut proc, b4).return_(None);
    BasicBlockBuilder::new(&mut proc, b5).unreachable();

    module.add_procedure(proc);

    assert_eq!(find_exit_block(module.procedure(crate::ProcedureId(0))), Some(b4));

    run_pass(&mut module, ProfileVariant::Ks, &Options::default(), dir.path()).unwrap();

    // The dump call sits in the return block and nowhere else.
    let proc = module.procedure(crate::ProcedureId(0));
    let has_dump = |block: BlockId| {
        proc.block(block)
            .iter()
            .any(|&value| proc.value(value).opcode() == Opcode::CCall)
    };
    assert!(has_dump(b4));
    assert!(!has_dump(b5));

    let mut interp = Interp::new(&module, dir.path());
    interp.run("main", &[1, 1]).unwrap();
    assert!(matches!(
        interp.run("main", &[1, 0]),
        Err(InterpError::Unreachable(_))
    ));

    propagate_with(dir.path(), "main.prof", "-agg", false);

    let edges = read_edges(&dir.path().join("main-agg.edges"));
    assert_eq!(
        edges,
        vec![
            ("0".to_string(), "1".to_string(), 1),
            ("0".to_string(), "2".to_string(), 0),
            ("1".to_string(), "3".to_string(), 1),
            ("2".to_string(), "3".to_string(), 0),
            ("3".to_string(), "4".to_string(), 1),
            ("3".to_string(), "5".to_string(), 0),
            ("4".to_string(), "0".to_string(), 1),
        ]
    );
}

// A whole module under Nisse: a helper with a loop and a main with a
// diamond share the module-wide arrays through their running offsets, and
// main's single dump covers both.
#[test]
fn nisse_module_offsets_round_trip() {
    let dir = TempDir::new().unwrap();
    let mut module = Module::new("m");

    let (helper, _) = counted_loop("helper", 7);
    let helper_id = module.add_procedure(helper);

    let mut proc = Procedure::new("main");
    let b0 = proc.add_block();
    let b1 = proc.add_block();
    let b2 = proc.add_block();
    let b3 = proc.add_block();

    let mut builder = BasicBlockBuilder::new(&mut proc, b0);
    let trips = builder.call(Type::Int32, helper_id, &[]);
    let zero = builder.const32(0);
    let went_around = builder.binary(Opcode::GreaterThan, trips, zero);
    builder.branch(went_around, b1, b2);
    BasicBlockBuilder::new(&mut proc, b1).jump(b3);
    BasicBlockBuilder::new(&mut proc, b2).jump(b3);
    BasicBlockBuilder::new(&mut proc, b3).return_(None);

    module.add_procedure(proc);

    run_pass(&mut module, ProfileVariant::Nisse, &Options::default(), dir.path()).unwrap();

    // Two chords each, one shared counter array.
    assert_eq!(module.globals().len(), 2);
    assert_eq!(module.globals()[0].byte_size, 8 * 4);

    let mut interp = Interp::new(&module, dir.path());
    interp.run("main", &[]).unwrap();

    // A second program run truncates the profile and rebuilds the index
    // array to the same layout, so the records come out identical.
    let first_run = std::fs::read_to_string(dir.path().join("main.prof")).unwrap();
    let mut interp = Interp::new(&module, dir.path());
    interp.run("main", &[]).unwrap();
    let second_run = std::fs::read_to_string(dir.path().join("main.prof")).unwrap();
    assert_eq!(first_run, second_run);

    propagate_with(dir.path(), "main.prof", "-agg", false);

    let helper_edges = read_edges(&dir.path().join("helper-agg.edges"));
    assert_eq!(weights_of(&helper_edges), vec![1, 7, 1, 7, 1]);

    let main_edges = read_edges(&dir.path().join("main-agg.edges"));
    assert_eq!(weights_of(&main_edges), vec![1, 0, 1, 0, 1]);

    let helper_bb = read_bb(&dir.path().join("helper-agg.bb"));
    assert_eq!(helper_bb["1"], 8);
}

// The exit hook can be suppressed without touching the counters.
#[test]
fn disable_print_suppresses_the_dump() {
    let dir = TempDir::new().unwrap();
    let mut module = Module::new("m");
    module.add_procedure(diamond());

    let options = Options {
        disable_print: true,
    };
    run_pass(&mut module, ProfileVariant::Ks, &options, dir.path()).unwrap();

    let proc = module.procedure(crate::ProcedureId(0));
    for index in 0..proc.num_blocks() {
        for &value in proc.block(BlockId(index)).iter() {
            assert_ne!(proc.value(value).opcode(), Opcode::CCall);
        }
    }

    let mut interp = Interp::new(&module, dir.path());
    interp.run("main", &[1]).unwrap();
    assert!(!dir.path().join("main.prof").exists());
}
