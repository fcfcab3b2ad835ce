//! Translation of a netlist into a scheduled evaluation graph.
//!
//! Signals become store slots, driving expressions become slot-resolved
//! nodes, and the combinational thunks are topologically sorted so one
//! settle pass reaches a fixpoint. Combinational cycles are rejected here
//! with the signals on the cycle.

use std::collections::{BTreeMap, BTreeSet};

use num_bigint::BigUint;
use num_traits::{One, Zero};
use tracing::debug;
use weft_core::{Shape, Value, eval};
use weftc::{EffectKind, Netlist};

use crate::error::SimError;
use crate::expr::{MemState, Node};
use crate::graph::{
    CombThunk, DomainInfo, EffectAction, EffectThunk, ReadPortThunk, RegThunk, SimGraph, Slot,
    WritePortThunk,
};

/// Compile `net` into an evaluation graph ready to be driven.
pub fn compile(net: &Netlist) -> Result<SimGraph, SimError> {
    let mut graph = SimGraph::new();

    for (idx, ns) in net.signals.iter().enumerate() {
        let signal = &ns.signal;
        graph.index.insert(signal.id(), idx);
        graph.slots.push(Slot {
            name: signal.name().to_string(),
            shape: signal.shape(),
            init: eval::to_bits(signal.init(), signal.width()),
        });
    }
    graph.initial_slot = graph.slots.len();
    graph.slots.push(Slot {
        name: "$initial".to_string(),
        shape: Shape::unsigned(1),
        init: BigUint::one(),
    });
    graph.store = graph.slots.iter().map(|s| s.init.clone()).collect();

    for nd in &net.domains {
        graph.domains.push(DomainInfo {
            name: nd.domain.name().to_string(),
            clk: nd.clk,
            rst: nd.rst,
            edge: nd.domain.clk_edge(),
        });
    }

    for (mem_idx, nm) in net.memories.iter().enumerate() {
        let width = nm.data.shape.width();
        graph.memories.push(MemState {
            rows: nm.data.init.iter().map(|row| eval::to_bits(row, width)).collect(),
            width,
        });
        let wp_base = graph.write_ports.len();
        for wp in &nm.write_ports {
            graph.write_ports.push(WritePortThunk {
                memory: mem_idx,
                domain: wp.domain,
                addr: wp.addr,
                data: wp.data,
                en: wp.en,
                granularity: wp.granularity,
            });
        }
        for rp in &nm.read_ports {
            match rp.domain {
                Some(domain) => {
                    graph.read_ports.push(ReadPortThunk {
                        memory: mem_idx,
                        domain,
                        addr: rp.addr,
                        data_slot: rp.data,
                        en: rp.en,
                        transparent_for: rp.transparent_for.iter().map(|&i| wp_base + i).collect(),
                    });
                }
                None => {
                    // An asynchronous read port is just combinational
                    // logic over the memory rows.
                    let width = graph.slots[rp.data].shape.width();
                    let addr_shape = graph.slots[rp.addr].shape;
                    let node = Node::MemRow {
                        memory: mem_idx,
                        addr: Box::new(Node::Slot { index: rp.addr, shape: addr_shape }),
                        width,
                    };
                    graph.comb.push(CombThunk {
                        target: rp.data,
                        ranges: vec![(0, width)],
                        node,
                        deps: vec![rp.addr],
                    });
                }
            }
        }
    }

    for ca in &net.comb {
        let node = compile_value(&ca.expr, &graph)?;
        let mut deps = Vec::new();
        node.deps(&mut deps);
        deps.sort_unstable();
        deps.dedup();
        graph.comb.push(CombThunk {
            target: ca.target,
            ranges: ca.ranges.clone(),
            node,
            deps,
        });
    }

    for ra in &net.regs {
        let node = compile_value(&ra.next, &graph)?;
        graph.regs.push(RegThunk {
            domain: ra.domain,
            target: ra.target,
            ranges: ra.ranges.clone(),
            node,
        });
    }

    for effect in &net.effects {
        let guard = compile_value(&effect.guard, &graph)?;
        let action = match &effect.kind {
            EffectKind::Print { format, args } => EffectAction::Print {
                format: format.clone(),
                args: args
                    .iter()
                    .map(|a| compile_value(a, &graph))
                    .collect::<Result<_, _>>()?,
            },
            EffectKind::Property { kind, condition, message } => EffectAction::Property {
                kind: *kind,
                condition: compile_value(condition, &graph)?,
                message: message.clone(),
            },
        };
        graph.effects.push(EffectThunk {
            domain: effect.domain,
            guard,
            action,
            last: None,
        });
    }

    schedule(&mut graph)?;
    graph.settle();
    debug!(
        slots = graph.slots.len(),
        comb = graph.comb.len(),
        regs = graph.regs.len(),
        "simulation graph compiled"
    );
    Ok(graph)
}

/// Resolve a netlist expression into a slot-addressed node.
fn compile_value(value: &Value, graph: &SimGraph) -> Result<Node, SimError> {
    Ok(match value {
        Value::Const(c) => Node::Const {
            bits: eval::to_bits(&c.value, c.shape.width()),
            shape: c.shape,
        },
        Value::Signal(signal) => {
            let index = graph.index[&signal.id()];
            Node::Slot { index, shape: signal.shape() }
        }
        Value::Op { op, args, shape } => Node::Op {
            op: *op,
            args: args
                .iter()
                .map(|a| compile_value(a, graph))
                .collect::<Result<_, _>>()?,
            shape: *shape,
        },
        Value::Slice { base, start, stop } => Node::Slice {
            base: Box::new(compile_value(base, graph)?),
            start: *start,
            stop: *stop,
        },
        Value::Part { base, offset, width, stride } => Node::Part {
            base: Box::new(compile_value(base, graph)?),
            offset: Box::new(compile_value(offset, graph)?),
            width: *width,
            stride: *stride,
        },
        Value::Concat(parts) => Node::Concat(
            parts
                .iter()
                .map(|p| compile_value(p, graph))
                .collect::<Result<_, _>>()?,
        ),
        Value::Replicate { base, count } => Node::Replicate {
            base: Box::new(compile_value(base, graph)?),
            count: *count,
        },
        Value::ArrayProxy { elems, index } => Node::ArrayIndex {
            elems: elems
                .iter()
                .map(|e| compile_value(e, graph))
                .collect::<Result<_, _>>()?,
            index: Box::new(compile_value(index, graph)?),
            shape: value.shape(),
        },
        Value::ClockSignal(domain) | Value::ResetSignal { domain, .. } => {
            return Err(SimError::UnresolvedDomainRef { domain: domain.clone() });
        }
        // Formal-verification holes read as zero in simulation.
        Value::AnyConst(shape) | Value::AnyValue(shape) => Node::Const {
            bits: BigUint::zero(),
            shape: *shape,
        },
        Value::Initial => Node::Slot {
            index: graph.initial_slot,
            shape: Shape::unsigned(1),
        },
    })
}

/// Topologically order the combinational thunks; report cycles with the
/// signals they run through.
fn schedule(graph: &mut SimGraph) -> Result<(), SimError> {
    let mut writers: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (idx, thunk) in graph.comb.iter().enumerate() {
        writers.entry(thunk.target).or_default().push(idx);
    }

    // Edge list: writer thunk -> reader thunk; also the trigger map for
    // the event-driven run-time.
    let mut successors: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    let mut indegree: Vec<usize> = vec![0; graph.comb.len()];
    for (idx, thunk) in graph.comb.iter().enumerate() {
        for &dep in &thunk.deps {
            graph.triggers.entry(dep).or_default().push(idx);
            if let Some(writer_list) = writers.get(&dep) {
                for &writer in writer_list {
                    successors.entry(writer).or_default().push(idx);
                    indegree[idx] += 1;
                }
            }
        }
    }

    let mut ready: BTreeSet<usize> = indegree
        .iter()
        .enumerate()
        .filter(|&(_, &d)| d == 0)
        .map(|(i, _)| i)
        .collect();
    let mut order = Vec::with_capacity(graph.comb.len());
    while let Some(idx) = ready.pop_first() {
        order.push(idx);
        if let Some(next) = successors.get(&idx) {
            for &reader in next {
                indegree[reader] -= 1;
                if indegree[reader] == 0 {
                    ready.insert(reader);
                }
            }
        }
    }
    if order.len() != graph.comb.len() {
        let mut signals: Vec<String> = graph
            .comb
            .iter()
            .enumerate()
            .filter(|(idx, _)| !order.contains(idx))
            .map(|(_, t)| graph.slots[t.target].name.clone())
            .collect();
        signals.sort();
        signals.dedup();
        return Err(SimError::CombinationalCycle { signals });
    }
    graph.order = order;
    Ok(())
}
