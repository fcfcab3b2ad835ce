//! Canonical netlist serialization.
//!
//! Produces a JSON form that is byte-identical for two elaborations of the
//! same design, even though the two runs allocate different signal ids:
//! signals are referred to by netlist index, and auto-generated names are
//! replaced by index-based ones. Back ends may also consume this form
//! directly.

use serde_json::{Value as Json, json};
use weft_core::{ClockEdge, Dir, ParamValue, PropertyKind, Value};

use crate::netlist::{EffectKind, Netlist};

impl Netlist {
    pub fn to_canonical_json(&self) -> Json {
        canonical_json(self)
    }

    /// The compact string form used for byte comparison.
    pub fn to_canonical_string(&self) -> String {
        self.to_canonical_json().to_string()
    }
}

fn canonical_json(net: &Netlist) -> Json {
    let signals: Vec<Json> = net
        .signals
        .iter()
        .enumerate()
        .map(|(idx, ns)| {
            let s = &ns.signal;
            let auto = s.name() == format!("sig${}", s.id());
            json!({
                "name": if auto { format!("s{}", idx) } else { s.name().to_string() },
                "path": ns.path,
                "width": s.width(),
                "signed": s.shape().is_signed(),
                "init": s.init().to_string(),
                "reset_less": s.is_reset_less(),
            })
        })
        .collect();

    let domains: Vec<Json> = net
        .domains
        .iter()
        .map(|nd| {
            json!({
                "name": nd.domain.name(),
                "clk": nd.clk,
                "rst": nd.rst,
                "edge": match nd.domain.clk_edge() {
                    ClockEdge::Pos => "pos",
                    ClockEdge::Neg => "neg",
                },
                "async_reset": nd.domain.is_async_reset(),
            })
        })
        .collect();

    let ports: Vec<Json> = net
        .ports
        .iter()
        .map(|p| {
            json!({
                "name": p.name,
                "signal": p.signal,
                "dir": match p.dir {
                    Dir::In => "in",
                    Dir::Out => "out",
                    Dir::InOut => "inout",
                },
            })
        })
        .collect();

    let comb: Vec<Json> = net
        .comb
        .iter()
        .map(|c| {
            json!({
                "target": c.target,
                "ranges": c.ranges,
                "expr": expr_json(net, &c.expr),
            })
        })
        .collect();

    let regs: Vec<Json> = net
        .regs
        .iter()
        .map(|r| {
            json!({
                "target": r.target,
                "domain": r.domain,
                "ranges": r.ranges,
                "next": expr_json(net, &r.next),
                "init": r.init.to_string(),
            })
        })
        .collect();

    let instances: Vec<Json> = net
        .instances
        .iter()
        .map(|i| {
            json!({
                "path": i.path,
                "type": i.type_name,
                "parameters": i.parameters.iter().map(|(name, value)| {
                    json!({"name": name, "value": param_json(value)})
                }).collect::<Vec<_>>(),
                "inputs": i.inputs.iter().map(|(name, value)| {
                    json!({"name": name, "value": expr_json(net, value)})
                }).collect::<Vec<_>>(),
                "outputs": i.outputs.iter().map(|(name, idx)| {
                    json!({"name": name, "signal": idx})
                }).collect::<Vec<_>>(),
                "attributes": i.attributes,
            })
        })
        .collect();

    let memories: Vec<Json> = net
        .memories
        .iter()
        .map(|m| {
            json!({
                "path": m.path,
                "depth": m.data.depth,
                "width": m.data.shape.width(),
                "init": m.data.init.iter().map(|row| row.to_string()).collect::<Vec<_>>(),
                "write_ports": m.write_ports.iter().map(|p| json!({
                    "domain": p.domain,
                    "addr": p.addr,
                    "data": p.data,
                    "en": p.en,
                    "granularity": p.granularity,
                })).collect::<Vec<_>>(),
                "read_ports": m.read_ports.iter().map(|p| json!({
                    "domain": p.domain,
                    "addr": p.addr,
                    "data": p.data,
                    "en": p.en,
                    "transparent_for": p.transparent_for,
                })).collect::<Vec<_>>(),
            })
        })
        .collect();

    let io_buffers: Vec<Json> = net
        .io_buffers
        .iter()
        .map(|b| {
            json!({
                "path": b.path,
                "port": b.port_name,
                "width": b.width,
                "i": b.i,
                "o": b.o.as_ref().map(|v| expr_json(net, v)),
                "oe": b.oe.as_ref().map(|v| expr_json(net, v)),
            })
        })
        .collect();

    let effects: Vec<Json> = net
        .effects
        .iter()
        .map(|e| {
            let kind = match &e.kind {
                EffectKind::Print { format, args } => json!({
                    "print": format,
                    "args": args.iter().map(|a| expr_json(net, a)).collect::<Vec<_>>(),
                }),
                EffectKind::Property { kind, condition, message } => json!({
                    "property": match kind {
                        PropertyKind::Assert => "assert",
                        PropertyKind::Assume => "assume",
                        PropertyKind::Cover => "cover",
                    },
                    "condition": expr_json(net, condition),
                    "message": message,
                }),
            };
            json!({
                "domain": e.domain,
                "guard": expr_json(net, &e.guard),
                "kind": kind,
            })
        })
        .collect();

    json!({
        "signals": signals,
        "domains": domains,
        "ports": ports,
        "comb": comb,
        "regs": regs,
        "instances": instances,
        "memories": memories,
        "io_buffers": io_buffers,
        "effects": effects,
        "attributes": net.attributes,
    })
}

fn param_json(value: &ParamValue) -> Json {
    match value {
        ParamValue::Int(v) => json!({"int": v.to_string()}),
        ParamValue::Str(s) => json!({"str": s}),
        ParamValue::Const(v, shape) => json!({
            "const": v.to_string(),
            "width": shape.width(),
            "signed": shape.is_signed(),
        }),
    }
}

fn expr_json(net: &Netlist, value: &Value) -> Json {
    match value {
        Value::Const(c) => json!({
            "const": c.value.to_string(),
            "width": c.shape.width(),
            "signed": c.shape.is_signed(),
        }),
        Value::Signal(s) => json!({"sig": net.index.get(&s.id())}),
        Value::Op { op, args, .. } => json!({
            "op": format!("{:?}", op).to_lowercase(),
            "args": args.iter().map(|a| expr_json(net, a)).collect::<Vec<_>>(),
        }),
        Value::Slice { base, start, stop } => json!({
            "slice": [start, stop],
            "of": expr_json(net, base),
        }),
        Value::Part { base, offset, width, stride } => json!({
            "part": {"width": width, "stride": stride},
            "of": expr_json(net, base),
            "offset": expr_json(net, offset),
        }),
        Value::Concat(parts) => json!({
            "cat": parts.iter().map(|p| expr_json(net, p)).collect::<Vec<_>>(),
        }),
        Value::Replicate { base, count } => json!({
            "rep": count,
            "of": expr_json(net, base),
        }),
        Value::ArrayProxy { elems, index } => json!({
            "array": elems.iter().map(|e| expr_json(net, e)).collect::<Vec<_>>(),
            "index": expr_json(net, index),
        }),
        Value::ClockSignal(domain) => json!({"clock": domain}),
        Value::ResetSignal { domain, allow_reset_less } => json!({
            "reset": domain,
            "allow_reset_less": allow_reset_less,
        }),
        Value::AnyConst(shape) => json!({
            "anyconst": {"width": shape.width(), "signed": shape.is_signed()},
        }),
        Value::AnyValue(shape) => json!({
            "anyvalue": {"width": shape.width(), "signed": shape.is_signed()},
        }),
        Value::Initial => json!("initial"),
    }
}
