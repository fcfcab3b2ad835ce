//! The module builder.
//!
//! A module collects per-domain statements through an explicit scope stack:
//! `enter_if`/`enter_elif`/`enter_else`, `enter_switch`/`enter_case`, and
//! `enter_fsm`/`enter_state`, each closed by `exit_scope`. Conditional
//! scopes compile into switch statements when they close. The builder also
//! tracks submodules, locally declared clock domains, and a per-bit driver
//! map that rejects assignments to a bit already driven in another domain.

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{COMB, ClockDomain};
use crate::elab::Elaboratable;
use crate::error::{BuildError, DomainError};
use crate::shape::Shape;
use crate::stmt::{PropertyKind, Statement, SwitchCase, placeholder_count};
use crate::value::{
    Pattern, Signal, SignalId, SrcLoc, Value, is_assignable, signals_of, target_bits,
};

/// Statement lists keyed by domain name, in name order.
pub type DomainStmts = BTreeMap<String, Vec<Statement>>;

/// A sealed module, produced by [`Module::finish`] and consumed by the
/// elaboration driver.
pub struct ModuleData {
    pub statements: DomainStmts,
    pub submodules: Vec<(String, Box<dyn Elaboratable>)>,
    pub domains: Vec<ClockDomain>,
}

impl std::fmt::Debug for ModuleData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleData")
            .field("statements", &self.statements)
            .field("submodules", &self.submodules.iter().map(|(name, _)| name).collect::<Vec<_>>())
            .field("domains", &self.domains)
            .finish()
    }
}

#[derive(Default)]
struct Body {
    stmts: DomainStmts,
    pending: Option<IfChain>,
}

/// Completed `if`/`elif`/`else` arms at one nesting level, waiting to be
/// lowered into a switch when the chain can no longer be extended.
struct IfChain {
    arms: Vec<(Option<Value>, DomainStmts)>,
}

struct FsmFrame {
    name: String,
    domain: String,
    init: Option<String>,
    states: Vec<(String, DomainStmts)>,
    /// Stand-in for the state signal, swapped for the real one when the
    /// FSM closes and the state count is known.
    state_placeholder: Signal,
    /// Stand-ins for state encodings referenced by `fsm_next` before all
    /// states are defined.
    next_placeholders: BTreeMap<String, Signal>,
    ongoing: Vec<(String, Signal)>,
}

enum Frame {
    Root(Body),
    IfArm { cond: Option<Value>, body: Body },
    Switch { test: Value, cases: Vec<(Option<Vec<Pattern>>, DomainStmts)>, src_loc: SrcLoc },
    Case { patterns: Option<Vec<Pattern>>, body: Body },
    Fsm(FsmFrame),
    State { name: String, body: Body },
}

impl Body {
    /// Lower any pending if-chain into a switch; must run before anything
    /// other than an `elif`/`else` continuation happens at this level.
    fn flush(&mut self) -> Result<(), BuildError> {
        if let Some(chain) = self.pending.take() {
            for (domain, stmt) in lower_if_chain(chain)? {
                self.stmts.entry(domain).or_default().push(stmt);
            }
        }
        Ok(())
    }

    fn add(&mut self, domain: &str, stmt: Statement) -> Result<(), BuildError> {
        self.flush()?;
        self.stmts.entry(domain.to_string()).or_default().push(stmt);
        Ok(())
    }
}

/// Compile completed if-chain arms into one switch statement per involved
/// domain.
///
/// The switch test concatenates each arm condition (reduced to one bit)
/// with a constant one as the most significant bit; arm `i` matches on its
/// own bit with all others wild, and the `else` arm matches on the constant
/// bit, so case order alone encodes the priority.
fn lower_if_chain(chain: IfChain) -> Result<Vec<(String, Statement)>, BuildError> {
    let conds: Vec<&Value> = chain.arms.iter().filter_map(|(c, _)| c.as_ref()).collect();
    let n = conds.len();
    let mut parts = Vec::with_capacity(n + 1);
    for cond in &conds {
        parts.push(cond.bool()?);
    }
    parts.push(Value::constant(1, Shape::unsigned(1)));
    let test = Value::cat(parts)?;

    let mut domains: BTreeSet<String> = BTreeSet::new();
    for (_, stmts) in &chain.arms {
        domains.extend(stmts.keys().cloned());
    }

    let mut out = Vec::new();
    for domain in domains {
        let mut cases = Vec::new();
        let mut cond_index = 0;
        for (cond, stmts) in &chain.arms {
            let mut pattern = vec!['-'; n + 1];
            match cond {
                Some(_) => {
                    pattern[n - cond_index] = '1';
                    cond_index += 1;
                }
                None => pattern[0] = '1',
            }
            cases.push(SwitchCase {
                patterns: Some(vec![Pattern::bits(&pattern.into_iter().collect::<String>())?]),
                body: stmts.get(&domain).cloned().unwrap_or_default(),
            });
        }
        out.push((
            domain,
            Statement::Switch { test: test.clone(), cases, src_loc: None },
        ));
    }
    Ok(out)
}

/// A mutable design builder. Sealed with [`Module::finish`].
pub struct Module {
    frames: Vec<Frame>,
    submodules: Vec<(String, Box<dyn Elaboratable>)>,
    anon_submodules: u32,
    domains: Vec<ClockDomain>,
    driver_map: BTreeMap<(SignalId, u32), String>,
    signal_names: BTreeMap<SignalId, String>,
    fsm_counter: u32,
}

impl Default for Module {
    fn default() -> Self {
        Module::new()
    }
}

impl Module {
    pub fn new() -> Module {
        Module {
            frames: vec![Frame::Root(Body::default())],
            submodules: Vec::new(),
            anon_submodules: 0,
            domains: Vec::new(),
            driver_map: BTreeMap::new(),
            signal_names: BTreeMap::new(),
            fsm_counter: 0,
        }
    }

    fn top_body(&mut self) -> Result<&mut Body, BuildError> {
        match self.frames.last_mut() {
            Some(Frame::Root(body))
            | Some(Frame::IfArm { body, .. })
            | Some(Frame::Case { body, .. })
            | Some(Frame::State { body, .. }) => Ok(body),
            Some(Frame::Switch { .. }) => Err(BuildError::StatementInSwitch),
            Some(Frame::Fsm(_)) => Err(BuildError::StatementInFsm),
            None => Err(BuildError::UnbalancedScope),
        }
    }

    /// Record the bits of `lhs` as driven in `domain`, rejecting any bit
    /// already driven in a different domain.
    fn claim_targets(&mut self, domain: &str, lhs: &Value) -> Result<(), BuildError> {
        let mut named = BTreeMap::new();
        signals_of(lhs, &mut named);
        for (id, signal) in &named {
            self.signal_names.entry(*id).or_insert_with(|| signal.name().to_string());
        }
        for (id, bit) in target_bits(lhs) {
            match self.driver_map.get(&(id, bit)) {
                Some(existing) if existing != domain => {
                    return Err(DomainError::DriverConflict {
                        signal: self.signal_names.get(&id).cloned().unwrap_or_default(),
                        bit,
                        first: existing.clone(),
                        second: domain.to_string(),
                    }
                    .into());
                }
                Some(_) => {}
                None => {
                    self.driver_map.insert((id, bit), domain.to_string());
                }
            }
        }
        Ok(())
    }

    /// Append `lhs <- rhs` to the current scope in `domain`.
    #[track_caller]
    pub fn add_assignment(
        &mut self,
        domain: &str,
        lhs: Value,
        rhs: Value,
    ) -> Result<(), BuildError> {
        let src_loc = SrcLoc::caller();
        if !is_assignable(&lhs) {
            return Err(BuildError::NotAssignable { what: lhs.to_string() });
        }
        // The scope must accept statements before any driver bits are
        // claimed, so a rejected assignment leaves no trace.
        self.top_body()?;
        self.claim_targets(domain, &lhs)?;
        self.top_body()?
            .add(domain, Statement::Assign { lhs, rhs, src_loc: Some(src_loc) })
    }

    /// Append a formatted print. The number of `{}` placeholders must match
    /// the argument count.
    pub fn add_print(
        &mut self,
        domain: &str,
        format: &str,
        args: Vec<Value>,
    ) -> Result<(), BuildError> {
        if placeholder_count(format) != args.len() {
            return Err(BuildError::PlaceholderMismatch {
                format: format.to_string(),
                args: args.len(),
            });
        }
        self.top_body()?
            .add(domain, Statement::Print { format: format.to_string(), args })
    }

    #[track_caller]
    pub fn add_assert(
        &mut self,
        domain: &str,
        condition: Value,
        message: Option<&str>,
    ) -> Result<(), BuildError> {
        self.add_property(domain, PropertyKind::Assert, condition, message)
    }

    #[track_caller]
    pub fn add_assume(
        &mut self,
        domain: &str,
        condition: Value,
        message: Option<&str>,
    ) -> Result<(), BuildError> {
        self.add_property(domain, PropertyKind::Assume, condition, message)
    }

    #[track_caller]
    pub fn add_cover(
        &mut self,
        domain: &str,
        condition: Value,
        message: Option<&str>,
    ) -> Result<(), BuildError> {
        self.add_property(domain, PropertyKind::Cover, condition, message)
    }

    #[track_caller]
    fn add_property(
        &mut self,
        domain: &str,
        kind: PropertyKind,
        condition: Value,
        message: Option<&str>,
    ) -> Result<(), BuildError> {
        let src_loc = SrcLoc::caller();
        self.top_body()?.add(
            domain,
            Statement::Property {
                kind,
                condition,
                message: message.map(str::to_string),
                src_loc: Some(src_loc),
            },
        )
    }

    // ------------------------------------------------------------------
    // Conditional scopes
    // ------------------------------------------------------------------

    pub fn enter_if(&mut self, cond: Value) -> Result<(), BuildError> {
        self.top_body()?.flush()?;
        self.frames.push(Frame::IfArm { cond: Some(cond), body: Body::default() });
        Ok(())
    }

    pub fn enter_elif(&mut self, cond: Value) -> Result<(), BuildError> {
        self.check_chain_open(BuildError::OrphanElif)?;
        self.frames.push(Frame::IfArm { cond: Some(cond), body: Body::default() });
        Ok(())
    }

    pub fn enter_else(&mut self) -> Result<(), BuildError> {
        self.check_chain_open(BuildError::OrphanElse)?;
        self.frames.push(Frame::IfArm { cond: None, body: Body::default() });
        Ok(())
    }

    /// The current level must hold an if-chain that has not been closed by
    /// an `else` arm.
    fn check_chain_open(&mut self, err: BuildError) -> Result<(), BuildError> {
        match self.top_body() {
            Ok(body) => match &body.pending {
                Some(chain) if chain.arms.last().is_some_and(|(c, _)| c.is_some()) => Ok(()),
                _ => Err(err),
            },
            Err(e) => Err(e),
        }
    }

    #[track_caller]
    pub fn enter_switch(&mut self, test: Value) -> Result<(), BuildError> {
        let src_loc = SrcLoc::caller();
        self.top_body()?.flush()?;
        self.frames.push(Frame::Switch { test, cases: Vec::new(), src_loc });
        Ok(())
    }

    pub fn enter_case(&mut self, patterns: Vec<Pattern>) -> Result<(), BuildError> {
        match self.frames.last() {
            Some(Frame::Switch { test, .. }) => {
                let width = test.shape().width();
                for pattern in &patterns {
                    if let Some(w) = pattern.width() {
                        if w != width {
                            tracing::warn!(
                                pattern = ?pattern,
                                test_width = width,
                                "case pattern width does not match the switch test"
                            );
                        }
                    }
                }
                self.frames.push(Frame::Case { patterns: Some(patterns), body: Body::default() });
                Ok(())
            }
            _ => Err(BuildError::CaseOutsideSwitch),
        }
    }

    /// The always-matching case. Cases added after it are accepted but can
    /// never be reached.
    pub fn enter_default(&mut self) -> Result<(), BuildError> {
        match self.frames.last() {
            Some(Frame::Switch { .. }) => {
                self.frames.push(Frame::Case { patterns: None, body: Body::default() });
                Ok(())
            }
            _ => Err(BuildError::CaseOutsideSwitch),
        }
    }

    // ------------------------------------------------------------------
    // FSM scopes
    // ------------------------------------------------------------------

    /// Open a finite state machine whose state register lives in `domain`.
    /// The initial state is `init` if given, otherwise the first state
    /// defined.
    pub fn enter_fsm(
        &mut self,
        name: Option<&str>,
        domain: &str,
        init: Option<&str>,
    ) -> Result<(), BuildError> {
        self.top_body()?.flush()?;
        let name = match name {
            Some(n) => n.to_string(),
            None => {
                let n = format!("fsm${}", self.fsm_counter);
                self.fsm_counter += 1;
                n
            }
        };
        let state_placeholder =
            Signal::named(Shape::unsigned(0), &format!("{}$state$pending", name));
        self.frames.push(Frame::Fsm(FsmFrame {
            name,
            domain: domain.to_string(),
            init: init.map(str::to_string),
            states: Vec::new(),
            state_placeholder,
            next_placeholders: BTreeMap::new(),
            ongoing: Vec::new(),
        }));
        Ok(())
    }

    pub fn enter_state(&mut self, name: &str) -> Result<(), BuildError> {
        match self.frames.last() {
            Some(Frame::Fsm(fsm)) => {
                if fsm.states.iter().any(|(n, _)| n == name) {
                    return Err(BuildError::DuplicateState {
                        fsm: fsm.name.clone(),
                        state: name.to_string(),
                    });
                }
                self.frames.push(Frame::State { name: name.to_string(), body: Body::default() });
                Ok(())
            }
            _ => Err(BuildError::OutsideFsm),
        }
    }

    fn enclosing_fsm(&mut self) -> Result<usize, BuildError> {
        self.frames
            .iter()
            .rposition(|f| matches!(f, Frame::Fsm(_)))
            .ok_or(BuildError::OutsideFsm)
    }

    /// Assign the encoding of `state` to the state register, in the FSM's
    /// domain and under the guards of the current scope. The state may be
    /// defined later in the same FSM.
    #[track_caller]
    pub fn fsm_next(&mut self, state: &str) -> Result<(), BuildError> {
        let src_loc = SrcLoc::caller();
        let fsm_idx = self.enclosing_fsm()?;
        let (lhs, rhs, domain) = {
            let Frame::Fsm(fsm) = &mut self.frames[fsm_idx] else { unreachable!() };
            let placeholder = fsm
                .next_placeholders
                .entry(state.to_string())
                .or_insert_with(|| {
                    Signal::named(Shape::unsigned(0), &format!("$fsm$next${}", state))
                })
                .clone();
            (fsm.state_placeholder.value(), placeholder.value(), fsm.domain.clone())
        };
        self.top_body()?
            .add(&domain, Statement::Assign { lhs, rhs, src_loc: Some(src_loc) })
    }

    /// One iff the FSM is currently in `state`. The state may be defined
    /// later in the same FSM.
    pub fn fsm_ongoing(&mut self, state: &str) -> Result<Value, BuildError> {
        let fsm_idx = self.enclosing_fsm()?;
        let Frame::Fsm(fsm) = &mut self.frames[fsm_idx] else { unreachable!() };
        if let Some((_, sig)) = fsm.ongoing.iter().find(|(n, _)| n == state) {
            return Ok(sig.value());
        }
        let sig = Signal::named(Shape::unsigned(1), &format!("{}_{}", fsm.name, state));
        fsm.ongoing.push((state.to_string(), sig.clone()));
        Ok(sig.value())
    }

    // ------------------------------------------------------------------
    // Scope exit
    // ------------------------------------------------------------------

    /// Close the innermost open scope.
    pub fn exit_scope(&mut self) -> Result<(), BuildError> {
        if self.frames.len() < 2 {
            return Err(BuildError::UnbalancedScope);
        }
        let Some(frame) = self.frames.pop() else {
            return Err(BuildError::UnbalancedScope);
        };
        match frame {
            Frame::Root(_) => unreachable!("root frame is never popped"),
            Frame::IfArm { cond, mut body } => {
                body.flush()?;
                let parent = self.top_body()?;
                parent
                    .pending
                    .get_or_insert_with(|| IfChain { arms: Vec::new() })
                    .arms
                    .push((cond, body.stmts));
                Ok(())
            }
            Frame::Case { patterns, mut body } => {
                body.flush()?;
                match self.frames.last_mut() {
                    Some(Frame::Switch { cases, .. }) => {
                        cases.push((patterns, body.stmts));
                        Ok(())
                    }
                    _ => unreachable!("case frame always sits on a switch frame"),
                }
            }
            Frame::Switch { test, cases, src_loc } => {
                let mut domains: BTreeSet<String> = BTreeSet::new();
                for (_, stmts) in &cases {
                    domains.extend(stmts.keys().cloned());
                }
                let parent = self.top_body()?;
                parent.flush()?;
                for domain in domains {
                    let switch = Statement::Switch {
                        test: test.clone(),
                        cases: cases
                            .iter()
                            .map(|(patterns, stmts)| SwitchCase {
                                patterns: patterns.clone(),
                                body: stmts.get(&domain).cloned().unwrap_or_default(),
                            })
                            .collect(),
                        src_loc: Some(src_loc),
                    };
                    parent.stmts.entry(domain).or_default().push(switch);
                }
                Ok(())
            }
            Frame::State { name, mut body } => {
                body.flush()?;
                match self.frames.last_mut() {
                    Some(Frame::Fsm(fsm)) => {
                        fsm.states.push((name, body.stmts));
                        Ok(())
                    }
                    _ => unreachable!("state frame always sits on an FSM frame"),
                }
            }
            Frame::Fsm(fsm) => self.finish_fsm(fsm),
        }
    }

    /// Materialize an FSM: allocate the state register now that the state
    /// count is known, patch the placeholder references, and lower the
    /// states into a switch on the state register.
    fn finish_fsm(&mut self, fsm: FsmFrame) -> Result<(), BuildError> {
        if fsm.states.is_empty() {
            return Err(BuildError::EmptyFsm { fsm: fsm.name });
        }
        let encoding: BTreeMap<&str, u64> = fsm
            .states
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.as_str(), i as u64))
            .collect();
        let check_defined = |state: &str| -> Result<u64, BuildError> {
            encoding.get(state).copied().ok_or_else(|| BuildError::UndefinedState {
                fsm: fsm.name.clone(),
                state: state.to_string(),
            })
        };
        for state in fsm.next_placeholders.keys() {
            check_defined(state)?;
        }
        for (state, _) in &fsm.ongoing {
            check_defined(state)?;
        }
        let init_name = match &fsm.init {
            Some(name) => name.as_str(),
            None => fsm.states[0].0.as_str(),
        };
        let init_enc = check_defined(init_name)?;

        let state_shape = Shape::for_range(0, fsm.states.len().max(2) as i64);
        let state_sig = Signal::builder(state_shape)
            .name(&format!("{}_state", fsm.name))
            .init(init_enc)
            .build();

        let mut subst: BTreeMap<SignalId, Value> = BTreeMap::new();
        subst.insert(fsm.state_placeholder.id(), state_sig.value());
        for (name, placeholder) in &fsm.next_placeholders {
            subst.insert(
                placeholder.id(),
                Value::constant(encoding[name.as_str()], state_shape),
            );
        }
        let patch = |v: &Value| match v {
            Value::Signal(s) => subst.get(&s.id()).cloned(),
            _ => None,
        };

        self.claim_targets(&fsm.domain, &state_sig.value())?;

        let mut domains: BTreeSet<String> = BTreeSet::new();
        for (_, stmts) in &fsm.states {
            domains.extend(stmts.keys().cloned());
        }
        let mut switches = Vec::new();
        for domain in domains {
            let cases = fsm
                .states
                .iter()
                .map(|(name, stmts)| SwitchCase {
                    patterns: Some(vec![Pattern::int(encoding[name.as_str()])]),
                    body: stmts
                        .get(&domain)
                        .map(|body| body.iter().map(|s| s.rewrite_values(&patch)).collect())
                        .unwrap_or_default(),
                })
                .collect();
            switches.push((
                domain,
                Statement::Switch { test: state_sig.value(), cases, src_loc: None },
            ));
        }

        let mut ongoing_assigns = Vec::new();
        for (name, sig) in &fsm.ongoing {
            self.claim_targets(COMB, &sig.value())?;
            ongoing_assigns.push(Statement::Assign {
                lhs: sig.value(),
                rhs: state_sig
                    .value()
                    .eq(&Value::constant(encoding[name.as_str()], state_shape))?,
                src_loc: None,
            });
        }

        let parent = self.top_body()?;
        parent.flush()?;
        for (domain, switch) in switches {
            parent.stmts.entry(domain).or_default().push(switch);
        }
        if !ongoing_assigns.is_empty() {
            parent.stmts.entry(COMB.to_string()).or_default().extend(ongoing_assigns);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Submodules and domains
    // ------------------------------------------------------------------

    /// Attach a child design node. Without a name it becomes `U$0`, `U$1`,
    /// … in declaration order.
    pub fn add_submodule<E>(&mut self, name: Option<&str>, child: E) -> Result<(), BuildError>
    where
        E: Elaboratable + 'static,
    {
        let name = match name {
            Some(n) => n.to_string(),
            None => {
                let n = format!("U${}", self.anon_submodules);
                self.anon_submodules += 1;
                n
            }
        };
        if self.submodules.iter().any(|(n, _)| *n == name) {
            return Err(BuildError::DuplicateSubmodule { name });
        }
        self.submodules.push((name, Box::new(child)));
        Ok(())
    }

    /// Declare a clock domain local to this module's subtree (or global,
    /// if the domain was built with `local(false)`).
    pub fn add_domain(&mut self, cd: ClockDomain) -> Result<(), BuildError> {
        if cd.name() == COMB || self.domains.iter().any(|d| d.name() == cd.name()) {
            return Err(BuildError::BadDomainDeclaration { name: cd.name().to_string() });
        }
        self.domains.push(cd);
        Ok(())
    }

    /// Seal the builder. Every scope must have been exited.
    pub fn finish(mut self) -> Result<ModuleData, BuildError> {
        if self.frames.len() != 1 {
            return Err(BuildError::UnbalancedScope);
        }
        let Some(Frame::Root(mut body)) = self.frames.pop() else {
            return Err(BuildError::UnbalancedScope);
        };
        body.flush()?;
        Ok(ModuleData {
            statements: body.stmts,
            submodules: self.submodules,
            domains: self.domains,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShapeError;

    fn sig(width: u32) -> Signal {
        Signal::new(Shape::unsigned(width))
    }

    #[test]
    fn test_plain_assignment() {
        let mut m = Module::new();
        let a = sig(4);
        m.add_assignment(COMB, a.value(), Value::int(3)).unwrap();
        let data = m.finish().unwrap();
        assert_eq!(data.statements[COMB].len(), 1);
    }

    #[test]
    fn test_not_assignable() {
        let mut m = Module::new();
        let a = sig(4);
        let err = m
            .add_assignment(COMB, a.value().add(&Value::int(1)).unwrap(), Value::int(0))
            .unwrap_err();
        assert!(matches!(err, BuildError::NotAssignable { .. }));
    }

    #[test]
    fn test_driver_conflict_names_both_domains() {
        let mut m = Module::new();
        let a = Signal::named(Shape::unsigned(1), "flag");
        m.add_assignment(COMB, a.value(), Value::int(1)).unwrap();
        let err = m.add_assignment("sync", a.value(), Value::int(0)).unwrap_err();
        match err {
            BuildError::Domain(DomainError::DriverConflict { signal, first, second, .. }) => {
                assert_eq!(signal, "flag");
                assert_eq!(first, "comb");
                assert_eq!(second, "sync");
            }
            other => panic!("expected driver conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_same_domain_twice_is_fine() {
        let mut m = Module::new();
        let a = sig(4);
        m.add_assignment("sync", a.value(), Value::int(1)).unwrap();
        m.add_assignment("sync", a.value(), Value::int(2)).unwrap();
        assert_eq!(m.finish().unwrap().statements["sync"].len(), 2);
    }

    #[test]
    fn test_if_else_lowering() {
        let mut m = Module::new();
        let a = sig(4);
        let c = sig(1);
        m.enter_if(c.value()).unwrap();
        m.add_assignment(COMB, a.value(), Value::int(1)).unwrap();
        m.exit_scope().unwrap();
        m.enter_else().unwrap();
        m.add_assignment(COMB, a.value(), Value::int(2)).unwrap();
        m.exit_scope().unwrap();
        let data = m.finish().unwrap();
        let stmts = &data.statements[COMB];
        assert_eq!(stmts.len(), 1);
        let Statement::Switch { test, cases, .. } = &stmts[0] else {
            panic!("expected a switch");
        };
        assert_eq!(test.shape(), Shape::unsigned(2));
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].patterns, Some(vec![Pattern::bits("-1").unwrap()]));
        assert_eq!(cases[1].patterns, Some(vec![Pattern::bits("1-").unwrap()]));
        assert_eq!(cases[0].body.len(), 1);
        assert_eq!(cases[1].body.len(), 1);
    }

    #[test]
    fn test_elif_chain_priority_patterns() {
        let mut m = Module::new();
        let a = sig(4);
        let (c1, c2) = (sig(1), sig(1));
        m.enter_if(c1.value()).unwrap();
        m.add_assignment(COMB, a.value(), Value::int(1)).unwrap();
        m.exit_scope().unwrap();
        m.enter_elif(c2.value()).unwrap();
        m.add_assignment(COMB, a.value(), Value::int(2)).unwrap();
        m.exit_scope().unwrap();
        m.enter_else().unwrap();
        m.add_assignment(COMB, a.value(), Value::int(3)).unwrap();
        m.exit_scope().unwrap();
        let data = m.finish().unwrap();
        let Statement::Switch { test, cases, .. } = &data.statements[COMB][0] else {
            panic!("expected a switch");
        };
        assert_eq!(test.shape(), Shape::unsigned(3));
        let patterns: Vec<_> = cases
            .iter()
            .map(|c| c.patterns.as_ref().unwrap()[0].clone())
            .collect();
        assert_eq!(
            patterns,
            vec![
                Pattern::bits("--1").unwrap(),
                Pattern::bits("-1-").unwrap(),
                Pattern::bits("1--").unwrap(),
            ]
        );
    }

    #[test]
    fn test_orphan_elif() {
        let mut m = Module::new();
        assert_eq!(m.enter_elif(Value::int(1)).unwrap_err(), BuildError::OrphanElif);
        assert_eq!(m.enter_else().unwrap_err(), BuildError::OrphanElse);
        // An else arm closes the chain for good.
        let a = sig(1);
        m.enter_if(a.value()).unwrap();
        m.exit_scope().unwrap();
        m.enter_else().unwrap();
        m.exit_scope().unwrap();
        assert_eq!(m.enter_elif(a.value()).unwrap_err(), BuildError::OrphanElif);
    }

    #[test]
    fn test_statement_flushes_chain() {
        let mut m = Module::new();
        let a = sig(4);
        let b = sig(4);
        let c = sig(1);
        m.enter_if(c.value()).unwrap();
        m.add_assignment(COMB, a.value(), Value::int(1)).unwrap();
        m.exit_scope().unwrap();
        // This assignment ends the chain, so a following elif is orphaned.
        m.add_assignment(COMB, b.value(), Value::int(0)).unwrap();
        assert_eq!(m.enter_elif(c.value()).unwrap_err(), BuildError::OrphanElif);
        let data = m.finish().unwrap();
        assert_eq!(data.statements[COMB].len(), 2);
    }

    #[test]
    fn test_switch_case_default() {
        let mut m = Module::new();
        let a = sig(4);
        let t = sig(2);
        m.enter_switch(t.value()).unwrap();
        m.enter_case(vec![Pattern::int(0), Pattern::int(1)]).unwrap();
        m.add_assignment(COMB, a.value(), Value::int(1)).unwrap();
        m.exit_scope().unwrap();
        m.enter_default().unwrap();
        m.add_assignment(COMB, a.value(), Value::int(2)).unwrap();
        m.exit_scope().unwrap();
        m.exit_scope().unwrap();
        let data = m.finish().unwrap();
        let Statement::Switch { cases, .. } = &data.statements[COMB][0] else {
            panic!("expected a switch");
        };
        assert_eq!(cases[0].patterns, Some(vec![Pattern::int(0), Pattern::int(1)]));
        assert_eq!(cases[1].patterns, None);
    }

    #[test]
    fn test_statement_directly_in_switch() {
        let mut m = Module::new();
        let a = sig(4);
        m.enter_switch(a.value()).unwrap();
        let err = m.add_assignment(COMB, a.value(), Value::int(0)).unwrap_err();
        assert_eq!(err, BuildError::StatementInSwitch);
    }

    #[test]
    fn test_case_outside_switch() {
        let mut m = Module::new();
        assert_eq!(m.enter_case(vec![]).unwrap_err(), BuildError::CaseOutsideSwitch);
    }

    #[test]
    fn test_fsm_two_states() {
        let mut m = Module::new();
        let start = sig(1);
        let done = sig(1);
        let busy = sig(1);
        m.enter_fsm(Some("ctrl"), "sync", None).unwrap();
        m.enter_state("IDLE").unwrap();
        m.enter_if(start.value()).unwrap();
        m.fsm_next("RUN").unwrap();
        m.exit_scope().unwrap();
        m.exit_scope().unwrap();
        m.enter_state("RUN").unwrap();
        m.add_assignment(COMB, busy.value(), Value::int(1)).unwrap();
        m.enter_if(done.value()).unwrap();
        m.fsm_next("IDLE").unwrap();
        m.exit_scope().unwrap();
        m.exit_scope().unwrap();
        m.exit_scope().unwrap();
        let data = m.finish().unwrap();

        // The sync domain holds the state switch; comb holds the busy logic.
        let Statement::Switch { test, cases, .. } = &data.statements["sync"][0] else {
            panic!("expected a state switch");
        };
        let Value::Signal(state) = test else { panic!("expected the state register") };
        assert_eq!(state.name(), "ctrl_state");
        assert_eq!(state.shape(), Shape::unsigned(1));
        assert_eq!(state.init(), &num_bigint::BigInt::from(0));
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].patterns, Some(vec![Pattern::int(0)]));
        assert_eq!(cases[1].patterns, Some(vec![Pattern::int(1)]));
        assert!(data.statements[COMB].len() == 1);
    }

    #[test]
    fn test_fsm_explicit_init() {
        let mut m = Module::new();
        m.enter_fsm(Some("f"), "sync", Some("B")).unwrap();
        m.enter_state("A").unwrap();
        m.exit_scope().unwrap();
        m.enter_state("B").unwrap();
        m.exit_scope().unwrap();
        m.exit_scope().unwrap();
        let data = m.finish().unwrap();
        let Statement::Switch { test, .. } = &data.statements["sync"][0] else {
            panic!("expected a state switch");
        };
        let Value::Signal(state) = test else { panic!() };
        assert_eq!(state.init(), &num_bigint::BigInt::from(1));
    }

    #[test]
    fn test_fsm_ongoing_is_comparison() {
        let mut m = Module::new();
        let lit = sig(1);
        m.enter_fsm(Some("f"), "sync", None).unwrap();
        let running = m.fsm_ongoing("RUN").unwrap();
        m.enter_state("IDLE").unwrap();
        m.exit_scope().unwrap();
        m.enter_state("RUN").unwrap();
        m.fsm_next("IDLE").unwrap();
        m.exit_scope().unwrap();
        m.exit_scope().unwrap();
        m.add_assignment(COMB, lit.value(), running).unwrap();
        let data = m.finish().unwrap();
        // One comb assignment drives the ongoing flag from the state register.
        let ongoing = &data.statements[COMB][0];
        let Statement::Assign { rhs, .. } = ongoing else { panic!("expected assignment") };
        let Value::Op { op, .. } = rhs else { panic!("expected a comparison") };
        assert_eq!(*op, crate::value::Op::Eq);
    }

    #[test]
    fn test_fsm_undefined_state() {
        let mut m = Module::new();
        m.enter_fsm(Some("f"), "sync", None).unwrap();
        m.enter_state("A").unwrap();
        m.fsm_next("MISSING").unwrap();
        m.exit_scope().unwrap();
        let err = m.exit_scope().unwrap_err();
        assert_eq!(
            err,
            BuildError::UndefinedState { fsm: "f".to_string(), state: "MISSING".to_string() }
        );
    }

    #[test]
    fn test_fsm_without_states() {
        let mut m = Module::new();
        m.enter_fsm(Some("f"), "sync", None).unwrap();
        assert_eq!(m.exit_scope().unwrap_err(), BuildError::EmptyFsm { fsm: "f".to_string() });
    }

    #[test]
    fn test_fsm_duplicate_state() {
        let mut m = Module::new();
        m.enter_fsm(Some("f"), "sync", None).unwrap();
        m.enter_state("A").unwrap();
        m.exit_scope().unwrap();
        let err = m.enter_state("A").unwrap_err();
        assert_eq!(
            err,
            BuildError::DuplicateState { fsm: "f".to_string(), state: "A".to_string() }
        );
    }

    #[test]
    fn test_submodule_auto_names() {
        struct Nothing;
        impl Elaboratable for Nothing {
            fn elaborate(&self, _: Option<&dyn std::any::Any>) -> crate::elab::ElabResult {
                crate::elab::ElabResult::Module(Module::new())
            }
        }
        let mut m = Module::new();
        m.add_submodule(None, Nothing).unwrap();
        m.add_submodule(None, Nothing).unwrap();
        m.add_submodule(Some("core"), Nothing).unwrap();
        let err = m.add_submodule(Some("core"), Nothing).unwrap_err();
        assert!(matches!(err, BuildError::DuplicateSubmodule { .. }));
        let data = m.finish().unwrap();
        let names: Vec<_> = data.submodules.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["U$0", "U$1", "core"]);
    }

    #[test]
    fn test_domain_declarations() {
        let mut m = Module::new();
        m.add_domain(ClockDomain::new("video")).unwrap();
        assert!(m.add_domain(ClockDomain::new("video")).is_err());
        assert!(m.add_domain(ClockDomain::new(COMB)).is_err());
    }

    #[test]
    fn test_unbalanced_scopes() {
        let mut m = Module::new();
        assert_eq!(m.exit_scope().unwrap_err(), BuildError::UnbalancedScope);
        let a = sig(1);
        m.enter_if(a.value()).unwrap();
        assert!(matches!(m.finish().unwrap_err(), BuildError::UnbalancedScope));
    }

    #[test]
    fn test_print_placeholders() {
        let mut m = Module::new();
        let a = sig(4);
        m.add_print(COMB, "a={}", vec![a.value()]).unwrap();
        let err = m.add_print(COMB, "a={} b={}", vec![a.value()]).unwrap_err();
        assert!(matches!(err, BuildError::PlaceholderMismatch { .. }));
    }

    #[test]
    fn test_shape_error_propagates() {
        // A 0-width condition cannot be reduced... it can; but a reversed
        // slice in a condition surfaces as a shape error before any scope
        // state is touched.
        let a = sig(4);
        assert!(matches!(
            a.value().slice(3, 1),
            Err(ShapeError::ReversedSlice { .. })
        ));
    }
}
