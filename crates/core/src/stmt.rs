//! Statements: the per-domain bodies of a module.
//!
//! A statement is an assignment, a switch over pattern cases, a formatted
//! print, or a verification property. Statements are immutable once built;
//! the module builder assembles them and the netlist builder consumes them.

use std::collections::{BTreeMap, BTreeSet};

use crate::value::{
    Pattern, Signal, SignalId, SrcLoc, Value, rewrite, signals_of, target_bits,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Assign {
        lhs: Value,
        rhs: Value,
        src_loc: Option<SrcLoc>,
    },
    Switch {
        test: Value,
        cases: Vec<SwitchCase>,
        src_loc: Option<SrcLoc>,
    },
    Print {
        format: String,
        args: Vec<Value>,
    },
    Property {
        kind: PropertyKind,
        condition: Value,
        message: Option<String>,
        src_loc: Option<SrcLoc>,
    },
}

/// One case of a switch. `patterns` of `None` is the default case, which
/// always matches; cases after it are accepted but unreachable.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub patterns: Option<Vec<Pattern>>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    Assert,
    Assume,
    Cover,
}

impl std::fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyKind::Assert => write!(f, "assert"),
            PropertyKind::Assume => write!(f, "assume"),
            PropertyKind::Cover => write!(f, "cover"),
        }
    }
}

impl Statement {
    /// The bits this statement may write; a switch contributes the union of
    /// its branches.
    pub fn target_bits(&self) -> BTreeSet<(SignalId, u32)> {
        let mut out = BTreeSet::new();
        self.collect_target_bits(&mut out);
        out
    }

    fn collect_target_bits(&self, out: &mut BTreeSet<(SignalId, u32)>) {
        match self {
            Statement::Assign { lhs, .. } => {
                out.extend(target_bits(lhs));
            }
            Statement::Switch { cases, .. } => {
                for case in cases {
                    for stmt in &case.body {
                        stmt.collect_target_bits(out);
                    }
                }
            }
            Statement::Print { .. } | Statement::Property { .. } => {}
        }
    }

    /// Every signal referenced by this statement, targets and sources both.
    pub fn signals(&self, out: &mut BTreeMap<SignalId, Signal>) {
        match self {
            Statement::Assign { lhs, rhs, .. } => {
                signals_of(lhs, out);
                signals_of(rhs, out);
            }
            Statement::Switch { test, cases, .. } => {
                signals_of(test, out);
                for case in cases {
                    for stmt in &case.body {
                        stmt.signals(out);
                    }
                }
            }
            Statement::Print { args, .. } => {
                for arg in args {
                    signals_of(arg, out);
                }
            }
            Statement::Property { condition, .. } => signals_of(condition, out),
        }
    }

    /// Rebuild this statement with `f` applied to every contained value,
    /// recursing through switch bodies.
    pub fn rewrite_values<F>(&self, f: &F) -> Statement
    where
        F: Fn(&Value) -> Option<Value>,
    {
        match self {
            Statement::Assign { lhs, rhs, src_loc } => Statement::Assign {
                lhs: rewrite(lhs, f),
                rhs: rewrite(rhs, f),
                src_loc: *src_loc,
            },
            Statement::Switch { test, cases, src_loc } => Statement::Switch {
                test: rewrite(test, f),
                cases: cases
                    .iter()
                    .map(|case| SwitchCase {
                        patterns: case.patterns.clone(),
                        body: case.body.iter().map(|s| s.rewrite_values(f)).collect(),
                    })
                    .collect(),
                src_loc: *src_loc,
            },
            Statement::Print { format, args } => Statement::Print {
                format: format.clone(),
                args: args.iter().map(|a| rewrite(a, f)).collect(),
            },
            Statement::Property { kind, condition, message, src_loc } => Statement::Property {
                kind: *kind,
                condition: rewrite(condition, f),
                message: message.clone(),
                src_loc: *src_loc,
            },
        }
    }
}

/// Number of `{}` placeholders in a print format string. `{{` and `}}`
/// escape literal braces.
pub fn placeholder_count(format: &str) -> usize {
    let mut count = 0;
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '{' {
            if chars.peek() == Some(&'{') {
                chars.next();
            } else if chars.peek() == Some(&'}') {
                chars.next();
                count += 1;
            }
        } else if c == '}' && chars.peek() == Some(&'}') {
            chars.next();
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Shape;

    #[test]
    fn test_switch_targets_union_of_branches() {
        let a = Signal::new(Shape::unsigned(2));
        let b = Signal::new(Shape::unsigned(1));
        let test = Signal::new(Shape::unsigned(1));
        let stmt = Statement::Switch {
            test: test.value(),
            cases: vec![
                SwitchCase {
                    patterns: Some(vec![Pattern::int(0)]),
                    body: vec![Statement::Assign {
                        lhs: a.value(),
                        rhs: Value::int(1),
                        src_loc: None,
                    }],
                },
                SwitchCase {
                    patterns: None,
                    body: vec![Statement::Assign {
                        lhs: b.value(),
                        rhs: Value::int(0),
                        src_loc: None,
                    }],
                },
            ],
            src_loc: None,
        };
        let bits = stmt.target_bits();
        assert!(bits.contains(&(a.id(), 0)));
        assert!(bits.contains(&(a.id(), 1)));
        assert!(bits.contains(&(b.id(), 0)));
        assert_eq!(bits.len(), 3);
    }

    #[test]
    fn test_placeholder_count() {
        assert_eq!(placeholder_count("no holes"), 0);
        assert_eq!(placeholder_count("a={} b={}"), 2);
        assert_eq!(placeholder_count("{{literal}} {}"), 1);
    }
}
