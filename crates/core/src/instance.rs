//! Black-box instances and IO buffers.
//!
//! An instance is an opaque leaf with named, directed port connections,
//! preserved through the pipeline for back-end emitters. IO buffers connect
//! an external IO port to internal combinational signals.

use num_bigint::BigInt;

use crate::shape::Shape;
use crate::value::{Signal, Value};

/// Port and interface directionality. Flipping swaps input and output and
/// leaves bidirectional ports alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum Dir {
    In,
    Out,
    InOut,
}

impl Dir {
    pub fn flip(self) -> Dir {
        match self {
            Dir::In => Dir::Out,
            Dir::Out => Dir::In,
            Dir::InOut => Dir::InOut,
        }
    }
}

/// A parameter value on an instance: an integer, a string, or a constant
/// with an explicit shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(BigInt),
    Str(String),
    Const(BigInt, Shape),
}

/// An instantiation of an externally-defined cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Instance {
    pub type_name: String,
    pub parameters: Vec<(String, ParamValue)>,
    /// Input ports carry arbitrary expressions into the cell.
    pub inputs: Vec<(String, Value)>,
    /// Output ports drive the connected signals.
    pub outputs: Vec<(String, Signal)>,
    /// Bidirectional ports connect to IO-capable values.
    pub inouts: Vec<(String, Value)>,
    pub attributes: Vec<(String, String)>,
}

impl Instance {
    pub fn new(type_name: &str) -> Instance {
        Instance { type_name: type_name.to_string(), ..Instance::default() }
    }

    pub fn param(mut self, name: &str, value: ParamValue) -> Self {
        self.parameters.push((name.to_string(), value));
        self
    }

    pub fn param_int(self, name: &str, value: impl Into<BigInt>) -> Self {
        self.param(name, ParamValue::Int(value.into()))
    }

    pub fn param_str(self, name: &str, value: &str) -> Self {
        self.param(name, ParamValue::Str(value.to_string()))
    }

    pub fn input(mut self, name: &str, value: Value) -> Self {
        self.inputs.push((name.to_string(), value));
        self
    }

    pub fn output(mut self, name: &str, signal: &Signal) -> Self {
        self.outputs.push((name.to_string(), signal.clone()));
        self
    }

    pub fn inout(mut self, name: &str, value: Value) -> Self {
        self.inouts.push((name.to_string(), value));
        self
    }

    pub fn attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.push((name.to_string(), value.to_string()));
        self
    }
}

/// An external IO port, outside the value algebra: it can only be wired to
/// IO buffers and instance inout ports.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IoPort {
    pub name: String,
    pub width: u32,
}

impl IoPort {
    pub fn new(name: &str, width: u32) -> IoPort {
        IoPort { name: name.to_string(), width }
    }
}

/// A primitive buffer between an external IO port and internal signals.
///
/// `i` receives the pad value; `o` drives the pad when `oe` (default
/// constant one) is asserted.
#[derive(Debug, Clone, PartialEq)]
pub struct IoBufferInstance {
    pub port: IoPort,
    pub i: Option<Signal>,
    pub o: Option<Value>,
    pub oe: Option<Value>,
}

impl IoBufferInstance {
    pub fn new(port: IoPort) -> IoBufferInstance {
        IoBufferInstance { port, i: None, o: None, oe: None }
    }

    pub fn with_input(mut self, i: &Signal) -> Self {
        self.i = Some(i.clone());
        self
    }

    pub fn with_output(mut self, o: Value) -> Self {
        self.o = Some(o);
        self
    }

    pub fn with_output_enable(mut self, oe: Value) -> Self {
        self.oe = Some(oe);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_flip() {
        assert_eq!(Dir::In.flip(), Dir::Out);
        assert_eq!(Dir::Out.flip(), Dir::In);
        assert_eq!(Dir::InOut.flip(), Dir::InOut);
    }

    #[test]
    fn test_instance_builder() {
        let q = Signal::new(Shape::unsigned(8));
        let inst = Instance::new("RAMB18")
            .param_int("WIDTH", 8)
            .param_str("MODE", "TDP")
            .input("clk", Value::clock("sync"))
            .output("dout", &q);
        assert_eq!(inst.type_name, "RAMB18");
        assert_eq!(inst.parameters.len(), 2);
        assert_eq!(inst.inputs.len(), 1);
        assert_eq!(inst.outputs[0].1, q);
    }
}
