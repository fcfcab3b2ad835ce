//! The solved netlist.
//!
//! Every driven signal is bound to a single expression (combinational) or
//! a `(next, domain, init)` register record (synchronous), with priority
//! muxing already folded in. Instances, memories, IO buffers, and
//! triggered effects are preserved as primitive records with resolved
//! clock domains.

mod builder;
mod lower;

pub use builder::build_netlist;

use std::collections::BTreeMap;

use num_bigint::BigInt;
use weft_core::{
    ClockDomain, Dir, MemoryData, ParamValue, PropertyKind, Signal, SignalId, Value,
};

/// A signal known to the netlist, with the hierarchical path of the
/// fragment where it was first encountered.
#[derive(Debug)]
pub struct NetSignal {
    pub signal: Signal,
    pub path: String,
}

/// A resolved synchronous clock domain. The combinational pseudo-domain is
/// not listed; drivers reference it as `None`.
#[derive(Debug)]
pub struct NetDomain {
    pub domain: ClockDomain,
    /// Indexes into [`Netlist::signals`].
    pub clk: usize,
    pub rst: Option<usize>,
}

#[derive(Debug)]
pub struct NetPort {
    pub name: String,
    pub signal: usize,
    pub dir: Dir,
}

/// A fully folded combinational driver. `ranges` lists the driven bit
/// spans; bits outside them read as the signal's init value through the
/// expression itself.
#[derive(Debug)]
pub struct CombAssign {
    pub target: usize,
    pub ranges: Vec<(u32, u32)>,
    pub expr: Value,
}

/// A register: on the active edge of `domain`, `target` takes the value of
/// `next` (which already folds in priority muxing and, when applicable,
/// the domain reset).
#[derive(Debug)]
pub struct RegAssign {
    pub target: usize,
    pub domain: usize,
    pub ranges: Vec<(u32, u32)>,
    pub next: Value,
    pub init: BigInt,
}

#[derive(Debug)]
pub struct NetInstance {
    pub path: String,
    pub type_name: String,
    pub parameters: Vec<(String, ParamValue)>,
    pub inputs: Vec<(String, Value)>,
    /// Output ports and the signal indexes they drive.
    pub outputs: Vec<(String, usize)>,
    pub inouts: Vec<(String, Value)>,
    pub attributes: Vec<(String, String)>,
}

#[derive(Debug)]
pub struct NetWritePort {
    pub domain: usize,
    pub addr: usize,
    pub data: usize,
    pub en: usize,
    pub granularity: Option<u32>,
}

#[derive(Debug)]
pub struct NetReadPort {
    /// `None` reads combinationally.
    pub domain: Option<usize>,
    pub addr: usize,
    pub data: usize,
    pub en: usize,
    pub transparent_for: Vec<usize>,
}

#[derive(Debug)]
pub struct NetMemory {
    pub path: String,
    pub data: MemoryData,
    pub write_ports: Vec<NetWritePort>,
    pub read_ports: Vec<NetReadPort>,
}

#[derive(Debug)]
pub struct NetIoBuffer {
    pub path: String,
    pub port_name: String,
    pub width: u32,
    pub i: Option<usize>,
    pub o: Option<Value>,
    pub oe: Option<Value>,
}

/// A print or verification property, triggered while `guard` is nonzero:
/// once per active edge for a synchronous domain, on change for `None`
/// (combinational).
#[derive(Debug)]
pub struct Effect {
    pub domain: Option<usize>,
    pub guard: Value,
    pub kind: EffectKind,
}

#[derive(Debug)]
pub enum EffectKind {
    Print { format: String, args: Vec<Value> },
    Property { kind: PropertyKind, condition: Value, message: Option<String> },
}

#[derive(Default, Debug)]
pub struct Netlist {
    pub signals: Vec<NetSignal>,
    pub domains: Vec<NetDomain>,
    pub ports: Vec<NetPort>,
    pub comb: Vec<CombAssign>,
    pub regs: Vec<RegAssign>,
    pub instances: Vec<NetInstance>,
    pub memories: Vec<NetMemory>,
    pub io_buffers: Vec<NetIoBuffer>,
    pub effects: Vec<Effect>,
    /// Pass-through metadata, keyed by the hierarchical path of the
    /// fragment that carried it.
    pub attributes: Vec<(String, String, String)>,
    pub(crate) index: BTreeMap<SignalId, usize>,
}

impl Netlist {
    /// The netlist index of `signal`, if it appears in the design.
    pub fn signal_index(&self, signal: &Signal) -> Option<usize> {
        self.index.get(&signal.id()).copied()
    }

    /// Intern `signal`, recording `path` on first sight.
    pub(crate) fn intern(&mut self, signal: &Signal, path: &str) -> usize {
        if let Some(&idx) = self.index.get(&signal.id()) {
            return idx;
        }
        let idx = self.signals.len();
        self.signals.push(NetSignal { signal: signal.clone(), path: path.to_string() });
        self.index.insert(signal.id(), idx);
        idx
    }
}
