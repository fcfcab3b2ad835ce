//! Driver lowering: from statement trees to single folded expressions.
//!
//! For one signal in one domain, the statement list becomes a priority
//! expression by folding assignments in textual order over a starting
//! value (the init constant for combinational logic, the register's
//! current value for synchronous logic). Later assignments end up as outer
//! muxes and therefore win; switch cases conjoin their match conditions
//! with the surrounding scope.

use weft_core::{Shape, ShapeError, Signal, SignalId, Statement, Value, match_value};

/// Reinterpret as raw unsigned bits of the same width.
pub(crate) fn raw_bits(v: &Value) -> Result<Value, ShapeError> {
    if v.shape().is_signed() { v.as_unsigned() } else { Ok(v.clone()) }
}

/// Replace bits `[lo, hi)` of `acc` (width `width`) with `val`.
fn splice(acc: &Value, lo: u32, hi: u32, val: &Value, width: u32) -> Result<Value, ShapeError> {
    if lo == 0 && hi == width {
        return Ok(val.clone());
    }
    let mut parts = Vec::new();
    if lo > 0 {
        parts.push(acc.slice(0, lo)?);
    }
    parts.push(val.clone());
    if hi < width {
        parts.push(acc.slice(hi, width)?);
    }
    Value::cat(parts)
}

fn conjoin(guard: &Option<Value>, cond: Value) -> Result<Option<Value>, ShapeError> {
    match guard {
        None => Ok(Some(cond)),
        Some(g) => Ok(Some(g.and(&cond)?)),
    }
}

/// Does this statement (or any branch of it) assign to `id`?
fn targets(stmt: &Statement, id: SignalId) -> bool {
    match stmt {
        Statement::Assign { lhs, .. } => lhs_targets(lhs, id),
        Statement::Switch { cases, .. } => cases
            .iter()
            .any(|case| case.body.iter().any(|s| targets(s, id))),
        _ => false,
    }
}

fn lhs_targets(lhs: &Value, id: SignalId) -> bool {
    match lhs {
        Value::Signal(s) => s.id() == id,
        Value::Slice { base, .. } | Value::Part { base, .. } => lhs_targets(base, id),
        Value::Concat(parts) => parts.iter().any(|p| lhs_targets(p, id)),
        Value::ArrayProxy { elems, .. } => elems.iter().any(|e| lhs_targets(e, id)),
        _ => false,
    }
}

/// One partial write produced by assignment lowering: under `guard` (if
/// any), bits `[lo, hi)` of the target signal receive `value`.
struct PartialWrite {
    guard: Option<Value>,
    lo: u32,
    hi: u32,
    value: Value,
}

/// Decompose `lhs <- rhs` into partial writes of `sig`. Slices and
/// concatenations resolve statically; dynamic part selects and array
/// proxies expand into one guarded write per possible offset or index.
fn lower_assign(
    lhs: &Value,
    rhs: &Value,
    sig: &Signal,
    out: &mut Vec<PartialWrite>,
) -> Result<(), ShapeError> {
    let width = lhs.shape().width();
    let value = rhs.resize(width)?;
    descend(lhs, 0, width, value, None, sig, out)
}

fn descend(
    lhs: &Value,
    lo: u32,
    hi: u32,
    value: Value,
    guard: Option<Value>,
    sig: &Signal,
    out: &mut Vec<PartialWrite>,
) -> Result<(), ShapeError> {
    if lo >= hi {
        return Ok(());
    }
    match lhs {
        Value::Signal(s) => {
            if s.id() == sig.id() {
                out.push(PartialWrite { guard, lo, hi, value });
            }
        }
        Value::Slice { base, start, .. } => {
            descend(base, start + lo, start + hi, value, guard, sig, out)?;
        }
        Value::Concat(parts) => {
            let mut offset = 0u32;
            for part in parts {
                let w = part.shape().width();
                let span_lo = lo.max(offset);
                let span_hi = hi.min(offset + w);
                if span_lo < span_hi {
                    let sub = value.slice(span_lo - lo, span_hi - lo)?;
                    descend(part, span_lo - offset, span_hi - offset, sub, guard.clone(), sig, out)?;
                }
                offset += w;
            }
        }
        Value::Part { base, offset, width: _, stride } => {
            let base_width = base.shape().width();
            let offset_width = offset.shape().width();
            let mut position = 0u32;
            let mut k = 0u64;
            while position < base_width {
                if offset_width < 64 && k >= (1u64 << offset_width) {
                    break;
                }
                let span_hi = (position + hi).min(base_width);
                let span_lo = position + lo;
                if span_lo < span_hi {
                    let sub = value.slice(0, span_hi - span_lo)?;
                    let sel = (**offset).eq(&Value::constant(k, Shape::unsigned(offset_width.max(1))))?;
                    let combined = conjoin(&guard, sel)?;
                    descend(base, span_lo, span_hi, sub, combined, sig, out)?;
                }
                k += 1;
                position = position.saturating_add(*stride);
            }
        }
        Value::ArrayProxy { elems, index } => {
            let index_width = index.shape().width().max(1);
            for (k, elem) in elems.iter().enumerate() {
                let w = elem.shape().width();
                let span_hi = hi.min(w);
                if lo >= span_hi {
                    continue;
                }
                let sub = value.slice(0, span_hi - lo)?;
                let sel = (**index).eq(&Value::constant(k as u64, Shape::unsigned(index_width)))?;
                let combined = conjoin(&guard, sel)?;
                descend(elem, lo, span_hi, sub, combined, sig, out)?;
            }
        }
        // Assignability was checked when the statement was built.
        _ => {}
    }
    Ok(())
}

/// Fold the statements of one domain into the driving expression for
/// `sig`, starting from `start` (init constant or current register value,
/// as raw bits of the signal's width).
pub(crate) fn drive_expr(
    stmts: &[Statement],
    sig: &Signal,
    start: Value,
) -> Result<Value, ShapeError> {
    let width = sig.width();
    let mut acc = start;
    for stmt in stmts {
        if !targets(stmt, sig.id()) {
            continue;
        }
        match stmt {
            Statement::Assign { lhs, rhs, .. } => {
                let mut writes = Vec::new();
                lower_assign(lhs, rhs, sig, &mut writes)?;
                for write in writes {
                    let spliced = splice(&acc, write.lo, write.hi, &write.value, width)?;
                    acc = match write.guard {
                        Some(guard) => Value::mux(&guard, &spliced, &acc)?,
                        None => spliced,
                    };
                }
            }
            Statement::Switch { test, cases, .. } => {
                let branch_values: Vec<Value> = cases
                    .iter()
                    .map(|case| drive_expr(&case.body, sig, acc.clone()))
                    .collect::<Result<_, _>>()?;
                // Earlier cases take priority: fold from the last case
                // inward so the first match ends up outermost. A default
                // case displaces everything after it.
                let mut folded = acc.clone();
                for (case, value) in cases.iter().zip(branch_values).rev() {
                    folded = match &case.patterns {
                        None => value,
                        Some(patterns) => {
                            Value::mux(&match_value(test, patterns)?, &value, &folded)?
                        }
                    };
                }
                acc = folded;
            }
            _ => {}
        }
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;
    use weft_core::{Pattern, SwitchCase, eval};

    fn assign(lhs: Value, rhs: Value) -> Statement {
        Statement::Assign { lhs, rhs, src_loc: None }
    }

    /// Evaluate a closed constant expression (no signals).
    fn const_of(v: &Value) -> BigInt {
        v.as_const().expect("expression should fold").clone()
    }

    #[test]
    fn test_later_assignment_wins() {
        let sig = Signal::new(Shape::unsigned(4));
        let start = Value::constant(0, Shape::unsigned(4));
        let stmts = vec![
            assign(sig.value(), Value::int(3)),
            assign(sig.value(), Value::int(9)),
        ];
        let expr = drive_expr(&stmts, &sig, start).unwrap();
        assert_eq!(const_of(&expr), BigInt::from(9));
    }

    #[test]
    fn test_partial_write_splices() {
        let sig = Signal::new(Shape::unsigned(4));
        let start = Value::constant(0b1001, Shape::unsigned(4));
        let stmts = vec![assign(sig.value().slice(1, 3).unwrap(), Value::constant(0b11, 2u32))];
        let expr = drive_expr(&stmts, &sig, start).unwrap();
        assert_eq!(const_of(&expr), BigInt::from(0b1111));
    }

    #[test]
    fn test_priority_mux_law() {
        // Guarded assignments fold into Mux(g2, v2, Mux(g1, v1, init)).
        let sig = Signal::new(Shape::unsigned(4));
        let g1 = Signal::new(Shape::unsigned(1));
        let g2 = Signal::new(Shape::unsigned(1));
        let stmts = vec![
            Statement::Switch {
                test: g1.value(),
                cases: vec![SwitchCase {
                    patterns: Some(vec![Pattern::bits("1").unwrap()]),
                    body: vec![assign(sig.value(), Value::int(1))],
                }],
                src_loc: None,
            },
            Statement::Switch {
                test: g2.value(),
                cases: vec![SwitchCase {
                    patterns: Some(vec![Pattern::bits("1").unwrap()]),
                    body: vec![assign(sig.value(), Value::int(2))],
                }],
                src_loc: None,
            },
        ];
        let start = Value::constant(7, Shape::unsigned(4));
        let expr = drive_expr(&stmts, &sig, start).unwrap();
        let reference = Value::mux(
            &match_value(&g2.value(), &[Pattern::bits("1").unwrap()]).unwrap(),
            &Value::int(2).resize(4).unwrap(),
            &Value::mux(
                &match_value(&g1.value(), &[Pattern::bits("1").unwrap()]).unwrap(),
                &Value::int(1).resize(4).unwrap(),
                &Value::constant(7, Shape::unsigned(4)),
            )
            .unwrap(),
        )
        .unwrap();
        assert_eq!(expr, reference);
    }

    #[test]
    fn test_default_case_displaces_later_cases() {
        let sig = Signal::new(Shape::unsigned(4));
        let test_sig = Signal::new(Shape::unsigned(2));
        let stmts = vec![Statement::Switch {
            test: test_sig.value(),
            cases: vec![
                SwitchCase {
                    patterns: None,
                    body: vec![assign(sig.value(), Value::int(5))],
                },
                SwitchCase {
                    patterns: Some(vec![Pattern::int(0)]),
                    body: vec![assign(sig.value(), Value::int(9))],
                },
            ],
            src_loc: None,
        }];
        let start = Value::constant(0, Shape::unsigned(4));
        let expr = drive_expr(&stmts, &sig, start).unwrap();
        // The default always matches first, so the folded expression is
        // just the default's value.
        assert_eq!(const_of(&expr), BigInt::from(5));
    }

    #[test]
    fn test_array_proxy_write() {
        let a = Signal::new(Shape::unsigned(4));
        let b = Signal::new(Shape::unsigned(4));
        let idx = Signal::new(Shape::unsigned(1));
        let lhs = Value::array([a.value(), b.value()], &idx.value()).unwrap();
        let stmts = vec![assign(lhs, Value::int(9))];
        let start = Value::constant(0, Shape::unsigned(4));
        let expr = drive_expr(&stmts, &b, start).unwrap();
        // b is written only when idx == 1.
        let Value::Op { op: weft_core::Op::Mux, args, .. } = &expr else {
            panic!("expected a guarded write, got {}", expr);
        };
        assert_eq!(args[1].as_const(), Some(&BigInt::from(9)));
        assert_eq!(args[2].as_const(), Some(&BigInt::from(0)));
    }

    #[test]
    fn test_dynamic_part_write() {
        let sig = Signal::new(Shape::unsigned(8));
        let off = Signal::new(Shape::unsigned(2));
        let lhs = sig.value().word_select(&off.value(), 4).unwrap();
        let stmts = vec![assign(lhs, Value::constant(0xF, 4u32))];
        let start = Value::constant(0, Shape::unsigned(8));
        let expr = drive_expr(&stmts, &sig, start).unwrap();
        // Two possible word positions, so two nested guarded writes.
        let mut muxes = 0;
        let mut walk = &expr;
        while let Value::Op { op: weft_core::Op::Mux, args, .. } = walk {
            muxes += 1;
            walk = &args[2];
        }
        assert_eq!(muxes, 2);
    }

    #[test]
    fn test_signed_rhs_sign_extends() {
        let sig = Signal::new(Shape::unsigned(6));
        let stmts = vec![assign(sig.value(), Value::constant(-1, Shape::signed(2)))];
        let start = Value::constant(0, Shape::unsigned(6));
        let expr = drive_expr(&stmts, &sig, start).unwrap();
        assert_eq!(
            eval::to_bits(&const_of(&expr), 6),
            eval::to_bits(&BigInt::from(0b111111), 6)
        );
    }
}
