//! Weft Compiler Library
//!
//! Lowers the `weft-core` IR to a driver-resolved netlist:
//!
//! 1. [`elaborate`] expands a root elaboratable into a [`Fragment`] tree,
//!    following delegation and naming the hierarchy deterministically.
//! 2. The rewriters in [`rewrite`] transform fragment trees: domain
//!    renaming, reset insertion, enable insertion.
//! 3. [`build_netlist`] resolves clock domains, enforces the per-bit
//!    single-driver invariant, folds priority muxes, and lowers memories,
//!    instances and IO buffers to primitive records.
//!
//! The resulting [`Netlist`] is consumed by back ends and by the
//! `weft-sim` simulator compiler; its canonical JSON form
//! ([`Netlist::to_canonical_json`]) is stable across elaborations of the
//! same design.

pub mod canon;
pub mod elaborate;
pub mod error;
pub mod fragment;
pub mod netlist;
pub mod rewrite;

pub use elaborate::elaborate;
pub use error::{CompileError, ElabError};
pub use fragment::{Fragment, FragmentKind};
pub use netlist::{
    CombAssign, Effect, EffectKind, NetDomain, NetInstance, NetIoBuffer, NetMemory, NetPort,
    NetReadPort, NetSignal, NetWritePort, Netlist, RegAssign, build_netlist,
};
pub use rewrite::{DomainRenamer, EnableInserter, ResetInserter};
