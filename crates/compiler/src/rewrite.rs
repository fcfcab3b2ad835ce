//! Fragment rewriters.
//!
//! Each rewriter maps a fragment tree to a transformed copy and composes
//! as a plain function pipeline. They run after elaboration and before
//! domain resolution in the netlist builder.

use std::collections::{BTreeMap, BTreeSet};

use weft_core::{
    COMB, Pattern, Signal, SignalId, Statement, SwitchCase, Value, rewrite as rewrite_value,
    signals_of, target_bits,
};

use crate::error::CompileError;
use crate::fragment::{Fragment, FragmentKind};

/// Renames clock domains: driver tags, `ClockSignal`/`ResetSignal`
/// references, memory port domains, and declared domain names, recursing
/// into subfragments. Unmapped names pass through; `comb` is never
/// renamed.
pub struct DomainRenamer {
    map: BTreeMap<String, String>,
}

impl DomainRenamer {
    pub fn new(map: BTreeMap<String, String>) -> DomainRenamer {
        DomainRenamer { map }
    }

    pub fn single(from: &str, to: &str) -> DomainRenamer {
        DomainRenamer::new(BTreeMap::from([(from.to_string(), to.to_string())]))
    }

    fn rename(&self, name: &str) -> String {
        if name == COMB {
            return name.to_string();
        }
        self.map.get(name).cloned().unwrap_or_else(|| name.to_string())
    }

    pub fn apply(&self, fragment: &Fragment) -> Fragment {
        let patch = |v: &Value| match v {
            Value::ClockSignal(d) => Some(Value::ClockSignal(self.rename(d))),
            Value::ResetSignal { domain, allow_reset_less } => Some(Value::ResetSignal {
                domain: self.rename(domain),
                allow_reset_less: *allow_reset_less,
            }),
            _ => None,
        };
        let kind = match &fragment.kind {
            FragmentKind::Logic { drivers } => {
                // Two domains may map onto one name; their statement
                // lists concatenate in iteration order.
                let mut renamed = weft_core::DomainStmts::new();
                for (domain, stmts) in drivers {
                    renamed
                        .entry(self.rename(domain))
                        .or_default()
                        .extend(stmts.iter().map(|s| s.rewrite_values(&patch)));
                }
                FragmentKind::Logic { drivers: renamed }
            }
            FragmentKind::Instance(instance) => {
                let mut instance = instance.clone();
                for (_, value) in instance.inputs.iter_mut() {
                    *value = rewrite_value(value, &patch);
                }
                for (_, value) in instance.inouts.iter_mut() {
                    *value = rewrite_value(value, &patch);
                }
                FragmentKind::Instance(instance)
            }
            FragmentKind::Memory(memory) => {
                let mut memory = memory.clone();
                for port in memory.write_ports.iter_mut() {
                    port.domain = self.rename(&port.domain);
                }
                for port in memory.read_ports.iter_mut() {
                    port.domain = port.domain.as_deref().map(|d| self.rename(d));
                }
                FragmentKind::Memory(memory)
            }
            FragmentKind::IoBuffer(buffer) => {
                let mut buffer = buffer.clone();
                buffer.o = buffer.o.as_ref().map(|v| rewrite_value(v, &patch));
                buffer.oe = buffer.oe.as_ref().map(|v| rewrite_value(v, &patch));
                FragmentKind::IoBuffer(buffer)
            }
        };
        Fragment {
            kind,
            name: fragment.name.clone(),
            subfragments: fragment.subfragments.iter().map(|s| self.apply(s)).collect(),
            domains: fragment
                .domains
                .iter()
                .map(|cd| cd.renamed(&self.rename(cd.name())))
                .collect(),
            ports: fragment.ports.clone(),
            attributes: fragment.attributes.clone(),
        }
    }
}

/// Per-domain reset controls: whenever the control condition is asserted,
/// every signal driven in that domain is re-assigned its init value,
/// overriding the ordinary drivers. Stacked inserters OR their conditions.
pub struct ResetInserter {
    controls: BTreeMap<String, Value>,
}

impl ResetInserter {
    pub fn new(controls: BTreeMap<String, Value>) -> ResetInserter {
        ResetInserter { controls }
    }

    pub fn single(domain: &str, cond: Value) -> ResetInserter {
        ResetInserter::new(BTreeMap::from([(domain.to_string(), cond)]))
    }

    pub fn apply(&self, fragment: &Fragment) -> Result<Fragment, CompileError> {
        let mut out = fragment.clone();
        if let FragmentKind::Logic { drivers } = &mut out.kind {
            for (domain, cond) in &self.controls {
                if domain == COMB {
                    continue;
                }
                let Some(stmts) = drivers.get_mut(domain) else { continue };
                let mut resets = Vec::new();
                for signal in driven_signals(stmts) {
                    if signal.is_reset_less() {
                        continue;
                    }
                    resets.push(Statement::Assign {
                        lhs: signal.value(),
                        rhs: Value::constant(signal.init().clone(), signal.shape()),
                        src_loc: None,
                    });
                }
                if resets.is_empty() {
                    continue;
                }
                stmts.push(guarded(cond, resets)?);
            }
        }
        out.subfragments = fragment
            .subfragments
            .iter()
            .map(|s| self.apply(s))
            .collect::<Result<_, _>>()?;
        Ok(out)
    }
}

/// Per-domain enable controls: assignments in the domain only take effect
/// while the control condition is asserted. Stacked inserters AND their
/// conditions.
pub struct EnableInserter {
    controls: BTreeMap<String, Value>,
}

impl EnableInserter {
    pub fn new(controls: BTreeMap<String, Value>) -> EnableInserter {
        EnableInserter { controls }
    }

    pub fn single(domain: &str, cond: Value) -> EnableInserter {
        EnableInserter::new(BTreeMap::from([(domain.to_string(), cond)]))
    }

    pub fn apply(&self, fragment: &Fragment) -> Result<Fragment, CompileError> {
        let mut out = fragment.clone();
        if let FragmentKind::Logic { drivers } = &mut out.kind {
            for (domain, cond) in &self.controls {
                if domain == COMB {
                    continue;
                }
                let Some(stmts) = drivers.get_mut(domain) else { continue };
                let body = std::mem::take(stmts);
                stmts.push(guarded(cond, body)?);
            }
        }
        out.subfragments = fragment
            .subfragments
            .iter()
            .map(|s| self.apply(s))
            .collect::<Result<_, _>>()?;
        Ok(out)
    }
}

/// Wrap `body` in a switch that applies it only while `cond` is nonzero.
fn guarded(cond: &Value, body: Vec<Statement>) -> Result<Statement, CompileError> {
    Ok(Statement::Switch {
        test: cond.bool()?,
        cases: vec![SwitchCase { patterns: Some(vec![Pattern::bits("1")?]), body }],
        src_loc: None,
    })
}

/// Every signal assigned anywhere in `stmts`, in id order. Signals that
/// only appear as selectors (a part offset, an array index) are not
/// driven and are excluded.
fn driven_signals(stmts: &[Statement]) -> Vec<Signal> {
    let mut referenced: BTreeMap<SignalId, Signal> = BTreeMap::new();
    let mut driven_ids: BTreeSet<SignalId> = BTreeSet::new();
    collect_driven(stmts, &mut referenced, &mut driven_ids);
    referenced
        .into_iter()
        .filter(|(id, _)| driven_ids.contains(id))
        .map(|(_, signal)| signal)
        .collect()
}

fn collect_driven(
    stmts: &[Statement],
    referenced: &mut BTreeMap<SignalId, Signal>,
    driven_ids: &mut BTreeSet<SignalId>,
) {
    for stmt in stmts {
        match stmt {
            Statement::Assign { lhs, .. } => {
                signals_of(lhs, referenced);
                driven_ids.extend(target_bits(lhs).into_iter().map(|(id, _)| id));
            }
            Statement::Switch { cases, .. } => {
                for case in cases {
                    collect_driven(&case.body, referenced, driven_ids);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;
    use weft_core::{ClockDomain, Module, Shape};

    fn one_reg_fragment(domain: &str) -> (Fragment, Signal) {
        let mut m = Module::new();
        let reg = Signal::builder(Shape::unsigned(4)).name("reg").init(5).build();
        m.add_assignment(domain, reg.value(), Value::int(1)).unwrap();
        let data = m.finish().unwrap();
        (Fragment::logic("top", data.statements), reg)
    }

    #[test]
    fn test_domain_renamer_drivers_and_refs() {
        let mut m = Module::new();
        let reg = Signal::new(Shape::unsigned(1));
        let probe = Signal::new(Shape::unsigned(1));
        m.add_assignment("a", reg.value(), Value::int(1)).unwrap();
        m.add_assignment(COMB, probe.value(), Value::clock("a")).unwrap();
        let mut fragment = Fragment::logic("top", m.finish().unwrap().statements);
        fragment.domains.push(ClockDomain::new("a"));

        let renamed = DomainRenamer::single("a", "b").apply(&fragment);
        let FragmentKind::Logic { drivers } = &renamed.kind else { panic!() };
        assert!(drivers.contains_key("b"));
        assert!(!drivers.contains_key("a"));
        let Statement::Assign { rhs, .. } = &drivers[COMB][0] else { panic!() };
        assert_eq!(*rhs, Value::clock("b"));
        assert_eq!(renamed.domains[0].name(), "b");
    }

    #[test]
    fn test_reset_inserter_appends_guarded_resets() {
        let (fragment, reg) = one_reg_fragment("sync");
        let rst = Signal::new(Shape::unsigned(1));
        let out = ResetInserter::single("sync", rst.value()).apply(&fragment).unwrap();
        let FragmentKind::Logic { drivers } = &out.kind else { panic!() };
        let stmts = &drivers["sync"];
        assert_eq!(stmts.len(), 2);
        let Statement::Switch { cases, .. } = &stmts[1] else { panic!("expected guard") };
        let Statement::Assign { lhs, rhs, .. } = &cases[0].body[0] else { panic!() };
        assert_eq!(*lhs, reg.value());
        assert_eq!(rhs.as_const(), Some(&BigInt::from(5)));
    }

    #[test]
    fn test_reset_inserter_skips_reset_less() {
        let mut m = Module::new();
        let keep = Signal::builder(Shape::unsigned(1)).name("keep").reset_less().build();
        m.add_assignment("sync", keep.value(), Value::int(1)).unwrap();
        let fragment = Fragment::logic("top", m.finish().unwrap().statements);
        let rst = Signal::new(Shape::unsigned(1));
        let out = ResetInserter::single("sync", rst.value()).apply(&fragment).unwrap();
        let FragmentKind::Logic { drivers } = &out.kind else { panic!() };
        assert_eq!(drivers["sync"].len(), 1);
    }

    #[test]
    fn test_enable_inserter_wraps_domain() {
        let (fragment, _) = one_reg_fragment("sync");
        let en = Signal::new(Shape::unsigned(1));
        let out = EnableInserter::single("sync", en.value()).apply(&fragment).unwrap();
        let FragmentKind::Logic { drivers } = &out.kind else { panic!() };
        assert_eq!(drivers["sync"].len(), 1);
        let Statement::Switch { cases, .. } = &drivers["sync"][0] else { panic!() };
        assert_eq!(cases[0].body.len(), 1);
        // Stacking a second enable nests another guard outside the first.
        let en2 = Signal::new(Shape::unsigned(1));
        let out = EnableInserter::single("sync", en2.value()).apply(&out).unwrap();
        let FragmentKind::Logic { drivers } = &out.kind else { panic!() };
        let Statement::Switch { cases, .. } = &drivers["sync"][0] else { panic!() };
        assert!(matches!(cases[0].body[0], Statement::Switch { .. }));
    }

    #[test]
    fn test_comb_domain_untouched() {
        let (fragment, _) = one_reg_fragment(COMB);
        let en = Signal::new(Shape::unsigned(1));
        let out = EnableInserter::single(COMB, en.value()).apply(&fragment).unwrap();
        let FragmentKind::Logic { drivers } = &out.kind else { panic!() };
        assert!(matches!(drivers[COMB][0], Statement::Assign { .. }));
    }
}
