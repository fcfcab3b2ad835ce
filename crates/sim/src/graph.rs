//! The scheduled evaluation graph and the thunks that drive it.
//!
//! A `SimGraph` holds a dense value store (one slot per netlist signal,
//! plus the initial-cycle flag), combinational thunks in topological
//! order, per-domain register and memory-port thunks, and a trigger map
//! from slots to the thunks that read them. The collaborating run-time
//! (and the tests) drive it through `set`/`get`, `settle` and `tick`.

use std::collections::BTreeMap;

use num_bigint::{BigInt, BigUint};
use num_traits::Zero;
use weft_core::{ClockEdge, PropertyKind, Shape, Signal, SignalId, eval};

use crate::error::SimError;
use crate::expr::{MemState, Node};

#[derive(Debug)]
pub(crate) struct Slot {
    pub name: String,
    pub shape: Shape,
    pub init: BigUint,
}

#[derive(Debug)]
pub(crate) struct CombThunk {
    pub target: usize,
    pub ranges: Vec<(u32, u32)>,
    pub node: Node,
    pub deps: Vec<usize>,
}

#[derive(Debug)]
pub(crate) struct RegThunk {
    pub domain: usize,
    pub target: usize,
    pub ranges: Vec<(u32, u32)>,
    pub node: Node,
}

#[derive(Debug)]
pub(crate) struct DomainInfo {
    pub name: String,
    pub clk: usize,
    pub rst: Option<usize>,
    pub edge: ClockEdge,
}

#[derive(Debug)]
pub(crate) struct WritePortThunk {
    pub memory: usize,
    pub domain: usize,
    pub addr: usize,
    pub data: usize,
    pub en: usize,
    pub granularity: Option<u32>,
}

#[derive(Debug)]
pub(crate) struct ReadPortThunk {
    pub memory: usize,
    pub domain: usize,
    pub addr: usize,
    pub data_slot: usize,
    pub en: usize,
    /// Global write-port thunk indices whose same-edge writes this port
    /// observes.
    pub transparent_for: Vec<usize>,
}

#[derive(Debug)]
pub(crate) enum EffectAction {
    Print { format: String, args: Vec<Node> },
    Property { kind: PropertyKind, condition: Node, message: Option<String> },
}

#[derive(Debug)]
pub(crate) struct EffectThunk {
    pub domain: Option<usize>,
    pub guard: Node,
    pub action: EffectAction,
    /// Fingerprint of the last evaluation, for change-triggered
    /// combinational effects.
    pub last: Option<Vec<BigUint>>,
}

#[derive(Debug)]
pub struct SimGraph {
    pub(crate) slots: Vec<Slot>,
    pub(crate) store: Vec<BigUint>,
    pub(crate) comb: Vec<CombThunk>,
    /// Topological evaluation order over `comb`.
    pub(crate) order: Vec<usize>,
    pub(crate) triggers: BTreeMap<usize, Vec<usize>>,
    pub(crate) domains: Vec<DomainInfo>,
    pub(crate) regs: Vec<RegThunk>,
    pub(crate) memories: Vec<MemState>,
    pub(crate) write_ports: Vec<WritePortThunk>,
    pub(crate) read_ports: Vec<ReadPortThunk>,
    pub(crate) effects: Vec<EffectThunk>,
    pub(crate) initial_slot: usize,
    pub(crate) index: BTreeMap<SignalId, usize>,
    log: Vec<String>,
    violations: Vec<String>,
}

impl SimGraph {
    pub(crate) fn new() -> SimGraph {
        SimGraph {
            slots: Vec::new(),
            store: Vec::new(),
            comb: Vec::new(),
            order: Vec::new(),
            triggers: BTreeMap::new(),
            domains: Vec::new(),
            regs: Vec::new(),
            memories: Vec::new(),
            write_ports: Vec::new(),
            read_ports: Vec::new(),
            effects: Vec::new(),
            initial_slot: 0,
            index: BTreeMap::new(),
            log: Vec::new(),
            violations: Vec::new(),
        }
    }

    /// The store slot of `signal`, if the netlist knows it.
    pub fn slot_of(&self, signal: &Signal) -> Option<usize> {
        self.index.get(&signal.id()).copied()
    }

    /// Set a slot value from outside (stimulus, instance outputs). Does
    /// not re-settle; call [`SimGraph::settle`] when done poking.
    pub fn set(&mut self, signal: &Signal, value: impl Into<BigInt>) {
        if let Some(slot) = self.slot_of(signal) {
            self.set_slot(slot, value);
        }
    }

    pub fn set_slot(&mut self, slot: usize, value: impl Into<BigInt>) {
        let shape = self.slots[slot].shape;
        self.store[slot] = eval::to_bits(&value.into(), shape.width());
    }

    /// The current value of `signal`, interpreted under its shape.
    pub fn get(&self, signal: &Signal) -> BigInt {
        self.slot_of(signal)
            .map(|slot| self.get_slot(slot))
            .unwrap_or_else(BigInt::zero)
    }

    pub fn get_slot(&self, slot: usize) -> BigInt {
        eval::from_bits(&self.store[slot], self.slots[slot].shape)
    }

    /// The combinational thunks that read `slot`. The event-driven
    /// run-time uses this to requeue recomputation on change; `settle`
    /// does not need it.
    pub fn trigger_fanout(&self, slot: usize) -> &[usize] {
        self.triggers.get(&slot).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn domain_names(&self) -> Vec<&str> {
        self.domains.iter().map(|d| d.name.as_str()).collect()
    }

    fn domain(&self, name: &str) -> Option<&DomainInfo> {
        self.domains.iter().find(|d| d.name == name)
    }

    /// The edge on which the run-time should invoke [`SimGraph::tick`].
    pub fn domain_edge(&self, name: &str) -> Option<ClockEdge> {
        self.domain(name).map(|d| d.edge)
    }

    /// Clock and reset slots, for the run-time to drive as stimulus.
    pub fn domain_clk(&self, name: &str) -> Option<usize> {
        self.domain(name).map(|d| d.clk)
    }

    pub fn domain_rst(&self, name: &str) -> Option<usize> {
        self.domain(name).and_then(|d| d.rst)
    }

    /// Messages produced by print effects, in order.
    pub fn log(&self) -> &[String] {
        &self.log
    }

    /// Failed assertions and assumptions.
    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    /// Coverage and reset of recorded output, mostly for tests.
    pub fn clear_output(&mut self) {
        self.log.clear();
        self.violations.clear();
    }

    /// Recompute every combinational signal. One pass in topological
    /// order suffices because cycles were rejected at compile time.
    pub fn settle(&mut self) {
        for i in 0..self.order.len() {
            let idx = self.order[i];
            let thunk = &self.comb[idx];
            let value = thunk.node.eval(&self.store, &self.memories);
            let target = thunk.target;
            let ranges = thunk.ranges.clone();
            self.commit_masked(target, &ranges, value);
        }
        self.run_comb_effects();
    }

    /// One active edge of `domain`: settle, sample every register input,
    /// memory port and synchronous effect, then commit and settle again.
    pub fn tick(&mut self, domain: &str) -> Result<(), SimError> {
        let domain_idx = self
            .domains
            .iter()
            .position(|d| d.name == domain)
            .ok_or_else(|| SimError::UnknownDomain { name: domain.to_string() })?;
        self.settle();

        // Sample phase: everything reads the pre-edge state.
        let reg_updates: Vec<(usize, Vec<(u32, u32)>, BigUint)> = self
            .regs
            .iter()
            .filter(|r| r.domain == domain_idx)
            .map(|r| {
                (r.target, r.ranges.clone(), r.node.eval(&self.store, &self.memories))
            })
            .collect();

        let mut read_updates: Vec<(usize, BigUint)> = Vec::new();
        for port in self.read_ports.iter().filter(|p| p.domain == domain_idx) {
            if self.store[port.en].is_zero() {
                continue;
            }
            let addr = &self.store[port.addr];
            let mem = &self.memories[port.memory];
            let mut value = addr
                .try_into()
                .ok()
                .and_then(|row: usize| mem.rows.get(row).cloned())
                .unwrap_or_else(BigUint::zero);
            for &wp_idx in &port.transparent_for {
                let wp = &self.write_ports[wp_idx];
                if self.store[wp.addr] == *addr && !self.store[wp.en].is_zero() {
                    value = merge_write(
                        &value,
                        &self.store[wp.data],
                        &self.store[wp.en],
                        wp.granularity,
                        mem.width,
                    );
                }
            }
            read_updates.push((port.data_slot, value));
        }

        let write_updates: Vec<(usize, usize, BigUint, BigUint, Option<u32>)> = self
            .write_ports
            .iter()
            .filter(|p| p.domain == domain_idx)
            .filter(|p| !self.store[p.en].is_zero())
            .filter_map(|p| {
                let row: usize = (&self.store[p.addr]).try_into().ok()?;
                if row >= self.memories[p.memory].rows.len() {
                    return None;
                }
                Some((
                    p.memory,
                    row,
                    self.store[p.data].clone(),
                    self.store[p.en].clone(),
                    p.granularity,
                ))
            })
            .collect();

        let effect_output = self.sample_effects(Some(domain_idx));

        // Commit phase.
        for (memory, row, data, en, granularity) in write_updates {
            let width = self.memories[memory].width;
            let merged = merge_write(&self.memories[memory].rows[row], &data, &en, granularity, width);
            self.memories[memory].rows[row] = merged;
        }
        for (target, ranges, value) in reg_updates {
            self.commit_masked(target, &ranges, value);
        }
        for (slot, value) in read_updates {
            self.store[slot] = value;
        }
        self.store[self.initial_slot] = BigUint::zero();

        self.settle();
        self.record_effects(effect_output);
        Ok(())
    }

    /// Write `value` into the driven ranges of `target`, leaving other
    /// bits untouched.
    fn commit_masked(&mut self, target: usize, ranges: &[(u32, u32)], value: BigUint) {
        let width = self.slots[target].shape.width();
        if ranges.len() == 1 && ranges[0] == (0, width) {
            self.store[target] = value;
            return;
        }
        let mut current = self.store[target].clone();
        for &(lo, hi) in ranges {
            current = splice_bits(&current, &value, lo, hi);
        }
        self.store[target] = current;
    }

    fn sample_effects(&mut self, domain: Option<usize>) -> Vec<EffectOutput> {
        let mut out = Vec::new();
        for effect in self.effects.iter().filter(|e| e.domain == domain) {
            let guard = effect.guard.eval(&self.store, &self.memories);
            if guard.is_zero() {
                continue;
            }
            match &effect.action {
                EffectAction::Print { format, args } => {
                    let values: Vec<BigInt> = args
                        .iter()
                        .map(|a| eval::from_bits(&a.eval(&self.store, &self.memories), a.shape()))
                        .collect();
                    out.push(EffectOutput::Log(render_format(format, &values)));
                }
                EffectAction::Property { kind, condition, message } => {
                    let holds =
                        !condition.eval(&self.store, &self.memories).is_zero();
                    let text = message.clone().unwrap_or_else(|| "property".to_string());
                    match kind {
                        PropertyKind::Assert | PropertyKind::Assume if !holds => {
                            out.push(EffectOutput::Violation(format!("{}: {}", kind, text)));
                        }
                        PropertyKind::Cover if holds => {
                            out.push(EffectOutput::Log(format!("cover: {}", text)));
                        }
                        _ => {}
                    }
                }
            }
        }
        out
    }

    /// Combinational effects fire when their guard holds and their
    /// observed values changed since the last settle.
    fn run_comb_effects(&mut self) {
        let mut outputs = Vec::new();
        for effect in self.effects.iter_mut() {
            if effect.domain.is_some() {
                continue;
            }
            let guard = effect.guard.eval(&self.store, &self.memories);
            let mut fingerprint = vec![guard.clone()];
            let output = match &effect.action {
                EffectAction::Print { format, args } => {
                    let values: Vec<BigInt> = args
                        .iter()
                        .map(|a| {
                            let bits = a.eval(&self.store, &self.memories);
                            fingerprint.push(bits.clone());
                            eval::from_bits(&bits, a.shape())
                        })
                        .collect();
                    EffectOutput::Log(render_format(format, &values))
                }
                EffectAction::Property { kind, condition, message } => {
                    let bits = condition.eval(&self.store, &self.memories);
                    fingerprint.push(bits.clone());
                    let holds = !bits.is_zero();
                    let text = message.clone().unwrap_or_else(|| "property".to_string());
                    match kind {
                        PropertyKind::Assert | PropertyKind::Assume if !holds => {
                            EffectOutput::Violation(format!("{}: {}", kind, text))
                        }
                        PropertyKind::Cover if holds => {
                            EffectOutput::Log(format!("cover: {}", text))
                        }
                        _ => {
                            effect.last = Some(fingerprint);
                            continue;
                        }
                    }
                }
            };
            let changed = effect.last.as_ref() != Some(&fingerprint);
            let fired = !guard.is_zero() && changed;
            effect.last = Some(fingerprint);
            if fired {
                outputs.push(output);
            }
        }
        self.record_effects(outputs);
    }

    fn record_effects(&mut self, outputs: Vec<EffectOutput>) {
        for output in outputs {
            match output {
                EffectOutput::Log(s) => self.log.push(s),
                EffectOutput::Violation(s) => self.violations.push(s),
            }
        }
    }
}

enum EffectOutput {
    Log(String),
    Violation(String),
}

/// Replace bits `[lo, hi)` of `current` with the same bits of `source`.
fn splice_bits(current: &BigUint, source: &BigUint, lo: u32, hi: u32) -> BigUint {
    let span = eval::to_bits(&BigInt::from(-1), hi - lo);
    let chunk = (source >> (lo as usize)) & &span;
    let keep_low = current & eval::to_bits(&BigInt::from(-1), lo);
    let keep_high = (current >> (hi as usize)) << (hi as usize);
    keep_high | (chunk << (lo as usize)) | keep_low
}

/// Merge a write into `row`: whole-row when the port has no granularity,
/// per-granule otherwise (enable bit `i` gates granule `i`).
fn merge_write(
    row: &BigUint,
    data: &BigUint,
    en: &BigUint,
    granularity: Option<u32>,
    width: u32,
) -> BigUint {
    match granularity {
        None => data.clone(),
        Some(0) => data.clone(),
        Some(g) => {
            let mut merged = row.clone();
            for i in 0..width.div_ceil(g) {
                if en.bit(i as u64) {
                    let lo = i * g;
                    let hi = (lo + g).min(width);
                    merged = splice_bits(&merged, data, lo, hi);
                }
            }
            merged
        }
    }
}

/// Substitute `{}` placeholders with decimal values; `{{`/`}}` escape
/// literal braces.
fn render_format(format: &str, values: &[BigInt]) -> String {
    let mut out = String::new();
    let mut next = 0usize;
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '{' {
            if chars.peek() == Some(&'{') {
                chars.next();
                out.push('{');
            } else if chars.peek() == Some(&'}') {
                chars.next();
                if let Some(v) = values.get(next) {
                    out.push_str(&v.to_string());
                }
                next += 1;
            } else {
                out.push(c);
            }
        } else if c == '}' && chars.peek() == Some(&'}') {
            chars.next();
            out.push('}');
        } else {
            out.push(c);
        }
    }
    out
}
