//! The fragment tree: the flattened intermediate form between elaboration
//! and net assembly.
//!
//! Each fragment is either a block of per-domain driver statements or a
//! primitive leaf (instance, memory, IO buffer), with named subfragments
//! and locally declared clock domains. Fragments are immutable; rewriters
//! produce transformed copies.

use std::collections::BTreeMap;

use weft_core::{ClockDomain, Dir, DomainStmts, Instance, IoBufferInstance, Memory, Signal};

#[derive(Clone, Debug)]
pub enum FragmentKind {
    /// Ordinary logic: statement lists keyed by domain name.
    Logic { drivers: DomainStmts },
    Instance(Instance),
    Memory(Memory),
    IoBuffer(IoBufferInstance),
}

#[derive(Clone, Debug)]
pub struct Fragment {
    pub kind: FragmentKind,
    /// The name this fragment carries within its parent; `top` for the
    /// root. Hierarchical paths are formed by joining these with dots.
    pub name: String,
    pub subfragments: Vec<Fragment>,
    /// Clock domains declared here. Local domains are visible to this
    /// subtree; non-local ones propagate to the whole design.
    pub domains: Vec<ClockDomain>,
    /// Boundary signals, filled in for the root when a netlist is built.
    pub ports: Vec<(String, Signal, Dir)>,
    /// Pass-through metadata for back ends.
    pub attributes: BTreeMap<String, String>,
}

impl Fragment {
    pub fn logic(name: &str, drivers: DomainStmts) -> Fragment {
        Fragment {
            kind: FragmentKind::Logic { drivers },
            name: name.to_string(),
            subfragments: Vec::new(),
            domains: Vec::new(),
            ports: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn leaf(name: &str, kind: FragmentKind) -> Fragment {
        Fragment {
            kind,
            name: name.to_string(),
            subfragments: Vec::new(),
            domains: Vec::new(),
            ports: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// Depth-first visit of this fragment and all descendants with their
    /// hierarchical paths.
    pub fn visit<'a, F>(&'a self, f: &mut F)
    where
        F: FnMut(&'a Fragment, &str),
    {
        fn go<'a, F>(fragment: &'a Fragment, path: &str, f: &mut F)
        where
            F: FnMut(&'a Fragment, &str),
        {
            f(fragment, path);
            for sub in &fragment.subfragments {
                let sub_path = format!("{}.{}", path, sub.name);
                go(sub, &sub_path, f);
            }
        }
        go(self, &self.name.clone(), f);
    }
}
