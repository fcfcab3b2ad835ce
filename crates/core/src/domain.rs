//! Clock domains.
//!
//! A clock domain names a clock signal, an optional reset, and the edge on
//! which its registers update. The combinational pseudo-domain `comb` has no
//! clock and is never represented by a `ClockDomain` object.

use serde::Serialize;

use crate::shape::Shape;
use crate::value::Signal;

/// Name of the predefined combinational domain.
pub const COMB: &str = "comb";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ClockEdge {
    Pos,
    Neg,
}

/// A synchronous clock domain.
///
/// Cloning shares the underlying clock and reset signals; two clones refer
/// to the same domain storage.
#[derive(Debug, Clone, PartialEq)]
pub struct ClockDomain {
    name: String,
    clk: Signal,
    rst: Option<Signal>,
    clk_edge: ClockEdge,
    async_reset: bool,
    local: bool,
}

impl ClockDomain {
    /// A positive-edge domain with a synchronous reset, local to the
    /// declaring fragment's subtree.
    pub fn new(name: &str) -> ClockDomain {
        ClockDomain::builder(name).build()
    }

    pub fn builder(name: &str) -> ClockDomainBuilder {
        ClockDomainBuilder {
            name: name.to_string(),
            clk_edge: ClockEdge::Pos,
            reset_less: false,
            async_reset: false,
            local: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn clk(&self) -> &Signal {
        &self.clk
    }

    pub fn rst(&self) -> Option<&Signal> {
        self.rst.as_ref()
    }

    pub fn clk_edge(&self) -> ClockEdge {
        self.clk_edge
    }

    pub fn is_async_reset(&self) -> bool {
        self.async_reset
    }

    /// Local domains are visible only to the fragment that declares them
    /// and its descendants; others propagate to the whole design.
    pub fn is_local(&self) -> bool {
        self.local
    }

    /// The same domain under a different name, sharing clock and reset
    /// signals. Used by domain renaming.
    pub fn renamed(&self, name: &str) -> ClockDomain {
        ClockDomain { name: name.to_string(), ..self.clone() }
    }
}

pub struct ClockDomainBuilder {
    name: String,
    clk_edge: ClockEdge,
    reset_less: bool,
    async_reset: bool,
    local: bool,
}

impl ClockDomainBuilder {
    pub fn edge(mut self, edge: ClockEdge) -> Self {
        self.clk_edge = edge;
        self
    }

    /// A domain without a reset signal.
    pub fn reset_less(mut self) -> Self {
        self.reset_less = true;
        self
    }

    pub fn async_reset(mut self) -> Self {
        self.async_reset = true;
        self
    }

    /// With `false`, the domain propagates upward and becomes visible to
    /// the whole design rather than just the declaring subtree.
    pub fn local(mut self, local: bool) -> Self {
        self.local = local;
        self
    }

    pub fn build(self) -> ClockDomain {
        let clk = Signal::named(Shape::unsigned(1), "clk");
        let rst = if self.reset_less {
            None
        } else {
            Some(Signal::named(Shape::unsigned(1), "rst"))
        };
        ClockDomain {
            name: self.name,
            clk,
            rst,
            clk_edge: self.clk_edge,
            async_reset: self.async_reset,
            local: self.local,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_domain() {
        let cd = ClockDomain::new("sync");
        assert_eq!(cd.name(), "sync");
        assert_eq!(cd.clk_edge(), ClockEdge::Pos);
        assert!(cd.rst().is_some());
        assert!(!cd.is_async_reset());
        assert_eq!(cd.clk().width(), 1);
    }

    #[test]
    fn test_reset_less_domain() {
        let cd = ClockDomain::builder("pix").edge(ClockEdge::Neg).reset_less().build();
        assert!(cd.rst().is_none());
        assert_eq!(cd.clk_edge(), ClockEdge::Neg);
    }

    #[test]
    fn test_renamed_shares_signals() {
        let cd = ClockDomain::new("a");
        let renamed = cd.renamed("b");
        assert_eq!(renamed.name(), "b");
        assert_eq!(renamed.clk(), cd.clk());
    }
}
