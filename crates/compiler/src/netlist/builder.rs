//! Net assembly: fragment tree in, solved netlist out.
//!
//! The walk resolves clock-domain names against their declaration scopes,
//! rewrites `ClockSignal`/`ResetSignal` references into concrete signals,
//! checks the per-bit single-driving-domain invariant, and folds every
//! driven signal's statements into one priority expression per domain.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use num_bigint::BigInt;
use tracing::debug;
use weft_core::{
    BuildError, COMB, ClockDomain, Dir, DomainError, Shape, Signal, SignalId, Statement, Value,
    eval, match_value,
};

use crate::error::CompileError;
use crate::fragment::{Fragment, FragmentKind};
use crate::netlist::lower::{drive_expr, raw_bits};
use crate::netlist::{
    CombAssign, Effect, EffectKind, NetDomain, NetInstance, NetIoBuffer, NetMemory, NetPort,
    NetReadPort, NetWritePort, Netlist, RegAssign,
};

/// Who drives a bit. At most one owner may exist per bit across the whole
/// design.
#[derive(Clone, PartialEq, Eq)]
enum Owner {
    Comb,
    Sync(usize),
    InstanceOutput,
    MemoryPort(Option<usize>),
    IoBuffer,
    InputPort,
}

type Scopes = Vec<BTreeMap<String, usize>>;

#[derive(Default)]
struct Builder {
    net: Netlist,
    /// Resolved statements per domain (`None` is combinational), in
    /// depth-first traversal order.
    flat: BTreeMap<Option<usize>, Vec<Statement>>,
    owners: BTreeMap<(SignalId, u32), Owner>,
}

/// Assemble `fragment` into a netlist. `top_ports` is the ordered boundary
/// interface; every bit of an `In` port must be free of internal drivers.
pub fn build_netlist(
    fragment: &Fragment,
    top_ports: &[(String, Signal, Dir)],
) -> Result<Netlist, CompileError> {
    let mut builder = Builder::default();
    let mut root_scope = BTreeMap::new();
    builder.collect_global_domains(fragment, &fragment.name.clone(), &mut root_scope)?;
    let mut scopes = vec![root_scope];
    builder.walk(fragment, &fragment.name.clone(), &mut scopes)?;
    builder.bind_ports(top_ports)?;
    builder.solve()?;
    debug!(
        signals = builder.net.signals.len(),
        comb = builder.net.comb.len(),
        regs = builder.net.regs.len(),
        "netlist assembled"
    );
    Ok(builder.net)
}

impl Builder {
    fn owner_name(&self, owner: &Owner) -> String {
        match owner {
            Owner::Comb => COMB.to_string(),
            Owner::Sync(idx) => self.net.domains[*idx].domain.name().to_string(),
            Owner::InstanceOutput => "instance output".to_string(),
            Owner::MemoryPort(_) => "memory read port".to_string(),
            Owner::IoBuffer => "io buffer".to_string(),
            Owner::InputPort => "input port".to_string(),
        }
    }

    fn claim(&mut self, id: SignalId, bit: u32, owner: Owner) -> Result<(), CompileError> {
        match self.owners.get(&(id, bit)) {
            Some(existing) if *existing != owner => {
                let signal = self
                    .net
                    .index
                    .get(&id)
                    .map(|&idx| self.net.signals[idx].signal.name().to_string())
                    .unwrap_or_default();
                Err(DomainError::DriverConflict {
                    signal,
                    bit,
                    first: self.owner_name(existing),
                    second: self.owner_name(&owner),
                }
                .into())
            }
            Some(_) => Ok(()),
            None => {
                self.owners.insert((id, bit), owner);
                Ok(())
            }
        }
    }

    fn register_domain(&mut self, cd: &ClockDomain, path: &str) -> usize {
        let clk = self.net.intern(cd.clk(), path);
        let rst = cd.rst().map(|r| self.net.intern(r, path));
        self.net.domains.push(NetDomain { domain: cd.clone(), clk, rst });
        self.net.domains.len() - 1
    }

    /// First pass: non-local domains become visible to the whole design.
    fn collect_global_domains(
        &mut self,
        fragment: &Fragment,
        path: &str,
        root_scope: &mut BTreeMap<String, usize>,
    ) -> Result<(), CompileError> {
        for cd in &fragment.domains {
            if !cd.is_local() {
                if root_scope.contains_key(cd.name()) {
                    return Err(DomainError::DuplicateDomain { name: cd.name().to_string() }.into());
                }
                let idx = self.register_domain(cd, path);
                root_scope.insert(cd.name().to_string(), idx);
            }
        }
        for sub in &fragment.subfragments {
            let sub_path = format!("{}.{}", path, sub.name);
            self.collect_global_domains(sub, &sub_path, root_scope)?;
        }
        Ok(())
    }

    /// Resolve a domain name against the scope chain, innermost first. The
    /// default `sync` domain is created on first use if nobody declared it.
    fn resolve_domain(&mut self, scopes: &mut Scopes, name: &str) -> Result<usize, CompileError> {
        for scope in scopes.iter().rev() {
            if let Some(&idx) = scope.get(name) {
                return Ok(idx);
            }
        }
        if name == "sync" {
            let cd = ClockDomain::new("sync");
            let idx = self.register_domain(&cd, "top");
            scopes[0].insert("sync".to_string(), idx);
            debug!("created the default sync domain");
            return Ok(idx);
        }
        Err(DomainError::UnknownDomain { name: name.to_string() }.into())
    }

    /// Replace `ClockSignal`/`ResetSignal` references inside `v` with the
    /// concrete signals of their resolved domains.
    fn resolve_value(&mut self, v: &Value, scopes: &mut Scopes) -> Result<Value, CompileError> {
        // Scan for referenced domains first so resolution (which may
        // create `sync` or fail) happens outside the rewrite closure.
        let refs: RefCell<BTreeSet<(String, bool, bool)>> = RefCell::new(BTreeSet::new());
        weft_core::rewrite(v, &|node| {
            match node {
                Value::ClockSignal(d) => {
                    refs.borrow_mut().insert((d.clone(), false, false));
                }
                Value::ResetSignal { domain, allow_reset_less } => {
                    refs.borrow_mut().insert((domain.clone(), true, *allow_reset_less));
                }
                _ => {}
            }
            None
        });
        let mut subst: BTreeMap<(String, bool), Value> = BTreeMap::new();
        for (name, is_reset, allow) in refs.into_inner() {
            if name == COMB {
                return Err(DomainError::CombDomain.into());
            }
            let idx = self.resolve_domain(scopes, &name)?;
            let domain = &self.net.domains[idx].domain;
            let replacement = if is_reset {
                match domain.rst() {
                    Some(rst) => rst.value(),
                    None if allow => Value::constant(0, Shape::unsigned(1)),
                    None => {
                        return Err(DomainError::ResetlessDomain { name }.into());
                    }
                }
            } else {
                domain.clk().value()
            };
            subst.insert((name, is_reset), replacement);
        }
        Ok(weft_core::rewrite(v, &|node| match node {
            Value::ClockSignal(d) => subst.get(&(d.clone(), false)).cloned(),
            Value::ResetSignal { domain, .. } => subst.get(&(domain.clone(), true)).cloned(),
            _ => None,
        }))
    }

    fn resolve_stmt(
        &mut self,
        stmt: &Statement,
        scopes: &mut Scopes,
    ) -> Result<Statement, CompileError> {
        // Same two-phase approach as resolve_value, over a whole statement.
        let error: RefCell<Option<CompileError>> = RefCell::new(None);
        let resolver = RefCell::new((self, scopes));
        let resolved = stmt.rewrite_values(&|node| match node {
            Value::ClockSignal(_) | Value::ResetSignal { .. } => {
                let mut borrow = resolver.borrow_mut();
                let (builder, scopes) = &mut *borrow;
                match builder.resolve_value(node, &mut **scopes) {
                    Ok(v) => Some(v),
                    Err(e) => {
                        *error.borrow_mut() = Some(e);
                        None
                    }
                }
            }
            _ => None,
        });
        if let Some(e) = error.into_inner() {
            return Err(e);
        }
        Ok(resolved)
    }

    fn walk(
        &mut self,
        fragment: &Fragment,
        path: &str,
        scopes: &mut Scopes,
    ) -> Result<(), CompileError> {
        debug!(path, "assembling fragment");
        for (key, value) in &fragment.attributes {
            self.net.attributes.push((path.to_string(), key.clone(), value.clone()));
        }
        let mut local_scope = BTreeMap::new();
        for cd in &fragment.domains {
            if cd.is_local() {
                if local_scope.contains_key(cd.name()) {
                    return Err(DomainError::DuplicateDomain { name: cd.name().to_string() }.into());
                }
                let idx = self.register_domain(cd, path);
                local_scope.insert(cd.name().to_string(), idx);
            }
        }
        scopes.push(local_scope);

        match &fragment.kind {
            FragmentKind::Logic { drivers } => {
                for (domain_name, stmts) in drivers {
                    let key = if domain_name == COMB {
                        None
                    } else {
                        Some(self.resolve_domain(scopes, domain_name)?)
                    };
                    let owner = match key {
                        None => Owner::Comb,
                        Some(idx) => Owner::Sync(idx),
                    };
                    for stmt in stmts {
                        let resolved = self.resolve_stmt(stmt, scopes)?;
                        let mut referenced = BTreeMap::new();
                        resolved.signals(&mut referenced);
                        for signal in referenced.values() {
                            self.net.intern(signal, path);
                        }
                        for (id, bit) in resolved.target_bits() {
                            self.claim(id, bit, owner.clone())?;
                        }
                        self.flat.entry(key).or_default().push(resolved);
                    }
                }
            }
            FragmentKind::Instance(instance) => {
                let mut inputs = Vec::new();
                for (name, value) in &instance.inputs {
                    let resolved = self.resolve_value(value, scopes)?;
                    let mut referenced = BTreeMap::new();
                    weft_core::signals_of(&resolved, &mut referenced);
                    for signal in referenced.values() {
                        self.net.intern(signal, path);
                    }
                    inputs.push((name.clone(), resolved));
                }
                let mut outputs = Vec::new();
                for (name, signal) in &instance.outputs {
                    let idx = self.net.intern(signal, path);
                    for bit in 0..signal.width() {
                        self.claim(signal.id(), bit, Owner::InstanceOutput)?;
                    }
                    outputs.push((name.clone(), idx));
                }
                self.net.instances.push(NetInstance {
                    path: path.to_string(),
                    type_name: instance.type_name.clone(),
                    parameters: instance.parameters.clone(),
                    inputs,
                    outputs,
                    inouts: instance.inouts.clone(),
                    attributes: instance.attributes.clone(),
                });
            }
            FragmentKind::Memory(memory) => {
                let mut write_ports = Vec::new();
                for port in &memory.write_ports {
                    if port.domain == COMB {
                        return Err(DomainError::CombDomain.into());
                    }
                    let domain = self.resolve_domain(scopes, &port.domain)?;
                    write_ports.push(NetWritePort {
                        domain,
                        addr: self.net.intern(&port.addr, path),
                        data: self.net.intern(&port.data, path),
                        en: self.net.intern(&port.en, path),
                        granularity: port.granularity,
                    });
                }
                let mut read_ports = Vec::new();
                for port in &memory.read_ports {
                    let domain = match &port.domain {
                        None => None,
                        Some(name) => Some(self.resolve_domain(scopes, name)?),
                    };
                    for &wp in &port.transparent_for {
                        if Some(write_ports[wp].domain) != domain {
                            return Err(BuildError::BadMemoryPort {
                                what: format!(
                                    "read port is transparent for write port {} in a different domain",
                                    wp
                                ),
                            }
                            .into());
                        }
                    }
                    let data = self.net.intern(&port.data, path);
                    for bit in 0..port.data.width() {
                        self.claim(port.data.id(), bit, Owner::MemoryPort(domain))?;
                    }
                    read_ports.push(NetReadPort {
                        domain,
                        addr: self.net.intern(&port.addr, path),
                        data,
                        en: self.net.intern(&port.en, path),
                        transparent_for: port.transparent_for.clone(),
                    });
                }
                self.net.memories.push(NetMemory {
                    path: path.to_string(),
                    data: memory.data.clone(),
                    write_ports,
                    read_ports,
                });
            }
            FragmentKind::IoBuffer(buffer) => {
                let i = match &buffer.i {
                    Some(signal) => {
                        let idx = self.net.intern(signal, path);
                        for bit in 0..signal.width() {
                            self.claim(signal.id(), bit, Owner::IoBuffer)?;
                        }
                        Some(idx)
                    }
                    None => None,
                };
                let o = match &buffer.o {
                    Some(v) => Some(self.resolve_value(v, scopes)?),
                    None => None,
                };
                let oe = match &buffer.oe {
                    Some(v) => Some(self.resolve_value(v, scopes)?),
                    None => None,
                };
                self.net.io_buffers.push(NetIoBuffer {
                    path: path.to_string(),
                    port_name: buffer.port.name.clone(),
                    width: buffer.port.width,
                    i,
                    o,
                    oe,
                });
            }
        }

        for sub in &fragment.subfragments {
            let sub_path = format!("{}.{}", path, sub.name);
            self.walk(sub, &sub_path, scopes)?;
        }
        scopes.pop();
        Ok(())
    }

    fn bind_ports(&mut self, top_ports: &[(String, Signal, Dir)]) -> Result<(), CompileError> {
        for (name, signal, dir) in top_ports {
            let idx = self.net.intern(signal, "top");
            if *dir == Dir::In {
                for bit in 0..signal.width() {
                    self.claim(signal.id(), bit, Owner::InputPort)?;
                }
            }
            self.net.ports.push(NetPort { name: name.clone(), signal: idx, dir: *dir });
        }
        Ok(())
    }

    /// Fold drivers into per-signal expressions and collect triggered
    /// effects.
    fn solve(&mut self) -> Result<(), CompileError> {
        // Group driven bits per signal per domain.
        let mut comb_bits: BTreeMap<SignalId, Vec<u32>> = BTreeMap::new();
        let mut sync_bits: BTreeMap<(usize, SignalId), Vec<u32>> = BTreeMap::new();
        for ((id, bit), owner) in &self.owners {
            match owner {
                Owner::Comb => comb_bits.entry(*id).or_default().push(*bit),
                Owner::Sync(domain) => {
                    sync_bits.entry((*domain, *id)).or_default().push(*bit)
                }
                _ => {}
            }
        }

        let flat = std::mem::take(&mut self.flat);
        let empty: Vec<Statement> = Vec::new();

        let comb_stmts = flat.get(&None).unwrap_or(&empty);
        for (id, bits) in comb_bits {
            let signal = self.net.signals[self.net.index[&id]].signal.clone();
            let width = signal.width();
            let init = Value::constant(
                BigInt::from(eval::to_bits(signal.init(), width)),
                Shape::unsigned(width),
            );
            let expr = drive_expr(comb_stmts, &signal, init)?;
            let target = self.net.index[&id];
            self.net.comb.push(CombAssign { target, ranges: to_ranges(&bits), expr });
        }

        for ((domain_idx, id), bits) in &sync_bits {
            let stmts = flat.get(&Some(*domain_idx)).unwrap_or(&empty);
            let signal = self.net.signals[self.net.index[id]].signal.clone();
            let width = signal.width();
            let current = raw_bits(&signal.value())?;
            let mut next = drive_expr(stmts, &signal, current)?;
            let domain = &self.net.domains[*domain_idx].domain;
            let resettable = !(signal.is_reset_less() && !domain.is_async_reset());
            if let Some(rst) = domain.rst() {
                if resettable {
                    let init = Value::constant(
                        BigInt::from(eval::to_bits(signal.init(), width)),
                        Shape::unsigned(width),
                    );
                    next = Value::mux(&rst.value(), &init, &next)?;
                }
            }
            self.net.regs.push(RegAssign {
                target: self.net.index[id],
                domain: *domain_idx,
                ranges: to_ranges(bits),
                next,
                init: signal.init().clone(),
            });
        }

        let one = Value::constant(1, Shape::unsigned(1));
        for (key, stmts) in &flat {
            self.collect_effects(stmts, one.clone(), *key)?;
        }
        Ok(())
    }

    /// Gather prints and properties with their accumulated guards. Within
    /// a switch, a case's guard includes the negation of every earlier
    /// case's match so that exactly one case triggers.
    fn collect_effects(
        &mut self,
        stmts: &[Statement],
        guard: Value,
        domain: Option<usize>,
    ) -> Result<(), CompileError> {
        for stmt in stmts {
            match stmt {
                Statement::Print { format, args } => {
                    self.net.effects.push(Effect {
                        domain,
                        guard: guard.clone(),
                        kind: EffectKind::Print { format: format.clone(), args: args.clone() },
                    });
                }
                Statement::Property { kind, condition, message, .. } => {
                    self.net.effects.push(Effect {
                        domain,
                        guard: guard.clone(),
                        kind: EffectKind::Property {
                            kind: *kind,
                            condition: condition.clone(),
                            message: message.clone(),
                        },
                    });
                }
                Statement::Switch { test, cases, .. } => {
                    let mut prior_miss = Value::constant(1, Shape::unsigned(1));
                    for case in cases {
                        let matched = match &case.patterns {
                            Some(patterns) => match_value(test, patterns)?,
                            None => Value::constant(1, Shape::unsigned(1)),
                        };
                        let case_guard = guard.and(&prior_miss)?.and(&matched)?;
                        self.collect_effects(&case.body, case_guard, domain)?;
                        prior_miss = prior_miss.and(&matched.not()?)?;
                    }
                }
                Statement::Assign { .. } => {}
            }
        }
        Ok(())
    }
}

/// Collapse a sorted bit list into contiguous `(lo, hi)` ranges.
fn to_ranges(bits: &[u32]) -> Vec<(u32, u32)> {
    let mut ranges: Vec<(u32, u32)> = Vec::new();
    for &bit in bits {
        match ranges.last_mut() {
            Some((_, hi)) if *hi == bit => *hi += 1,
            _ => ranges.push((bit, bit + 1)),
        }
    }
    ranges
}
