//! Memories.
//!
//! A memory is a block of rows with read and write ports. Each port owns
//! its address, data and enable signals; designs drive the address and
//! enable (and write data) combinationally and read the data signal back.
//! During net assembly the memory lowers to a backing storage block plus
//! primitive per-port records.

use num_bigint::BigInt;
use num_traits::Zero;

use crate::error::BuildError;
use crate::eval;
use crate::shape::Shape;
use crate::value::Signal;

/// The backing storage description: geometry plus initial row values.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryData {
    pub name: String,
    pub depth: usize,
    pub shape: Shape,
    pub init: Vec<BigInt>,
}

impl MemoryData {
    /// Rows not covered by `init` start at zero; all rows are truncated
    /// into the row shape.
    pub fn new(name: &str, depth: usize, shape: Shape, init: Vec<BigInt>) -> MemoryData {
        let mut rows: Vec<BigInt> = init.into_iter().map(|v| eval::truncate(&v, shape)).collect();
        rows.resize(depth, BigInt::zero());
        MemoryData { name: name.to_string(), depth, shape, init: rows }
    }
}

/// Identifies a write port of a memory, for transparency lists.
pub type WritePortIndex = usize;

#[derive(Debug, Clone, PartialEq)]
pub struct WritePort {
    pub domain: String,
    pub addr: Signal,
    pub data: Signal,
    /// One enable bit per granule; a single bit when no granularity is set.
    pub en: Signal,
    pub granularity: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadPort {
    /// `None` reads asynchronously: the data output follows the addressed
    /// row combinationally.
    pub domain: Option<String>,
    pub addr: Signal,
    pub data: Signal,
    pub en: Signal,
    /// Write ports (of the same memory) whose same-cycle writes this port
    /// observes.
    pub transparent_for: Vec<WritePortIndex>,
}

/// A memory with its ports, added to a design as a submodule.
#[derive(Debug, Clone, PartialEq)]
pub struct Memory {
    pub data: MemoryData,
    pub write_ports: Vec<WritePort>,
    pub read_ports: Vec<ReadPort>,
}

impl Memory {
    pub fn new(data: MemoryData) -> Memory {
        Memory { data, write_ports: Vec::new(), read_ports: Vec::new() }
    }

    fn addr_shape(&self) -> Shape {
        Shape::for_range(0, self.data.depth.max(1) as i64)
    }

    /// Add a write port in `domain`; the write applies on the active edge
    /// while the enable is asserted. Returns the port's index for use in
    /// transparency lists.
    pub fn write_port(&mut self, domain: &str) -> WritePortIndex {
        self.write_port_with_granularity(domain, None)
    }

    /// A granular write port has one enable bit per `granularity`-bit
    /// granule of the row.
    pub fn write_port_with_granularity(
        &mut self,
        domain: &str,
        granularity: Option<u32>,
    ) -> WritePortIndex {
        let index = self.write_ports.len();
        let prefix = format!("{}_w{}", self.data.name, index);
        let en_width = match granularity {
            Some(g) if g > 0 => self.data.shape.width().div_ceil(g),
            _ => 1,
        };
        self.write_ports.push(WritePort {
            domain: domain.to_string(),
            addr: Signal::named(self.addr_shape(), &format!("{}_addr", prefix)),
            data: Signal::named(self.data.shape, &format!("{}_data", prefix)),
            en: Signal::named(Shape::unsigned(en_width), &format!("{}_en", prefix)),
            granularity,
        });
        index
    }

    /// Add a read port. A `Some(domain)` port registers the read data on
    /// the active edge while enabled (the enable defaults to asserted); a
    /// `None` port reads combinationally.
    pub fn read_port(
        &mut self,
        domain: Option<&str>,
        transparent_for: Vec<WritePortIndex>,
    ) -> Result<usize, BuildError> {
        for &wp in &transparent_for {
            if wp >= self.write_ports.len() {
                return Err(BuildError::BadMemoryPort {
                    what: format!("transparency for missing write port {}", wp),
                });
            }
            if domain.is_none() {
                return Err(BuildError::BadMemoryPort {
                    what: "transparency on an asynchronous read port".to_string(),
                });
            }
        }
        let index = self.read_ports.len();
        let prefix = format!("{}_r{}", self.data.name, index);
        self.read_ports.push(ReadPort {
            domain: domain.map(str::to_string),
            addr: Signal::named(self.addr_shape(), &format!("{}_addr", prefix)),
            data: Signal::named(self.data.shape, &format!("{}_data", prefix)),
            en: Signal::builder(Shape::unsigned(1))
                .name(&format!("{}_en", prefix))
                .init(1)
                .build(),
            transparent_for,
        });
        Ok(index)
    }
}
