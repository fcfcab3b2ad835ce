//! The elaboration driver.
//!
//! Expands a root elaboratable into a fragment tree: each node's
//! `elaborate` is invoked, delegation chains are followed to a module or a
//! primitive leaf, and submodules recurse depth-first in declaration
//! order. Traversal and naming are fully deterministic.

use std::any::Any;

use tracing::debug;
use weft_core::{ElabResult, Elaboratable};

use crate::error::{CompileError, ElabError};
use crate::fragment::{Fragment, FragmentKind};

/// How many `Delegate` links may be followed for one node before the chain
/// is declared non-terminating.
const MAX_DELEGATION: usize = 256;

/// Expand `root` into a fragment tree. The root fragment is named `top`.
pub fn elaborate(
    root: &dyn Elaboratable,
    platform: Option<&dyn Any>,
) -> Result<Fragment, CompileError> {
    elaborate_node(root, platform, "top")
}

fn elaborate_node(
    node: &dyn Elaboratable,
    platform: Option<&dyn Any>,
    path: &str,
) -> Result<Fragment, CompileError> {
    debug!(path, "elaborating");
    let mut result = node.elaborate(platform);
    let mut depth = 0;
    loop {
        match result {
            ElabResult::Module(module) => {
                let data = module.finish()?;
                let name = leaf_name(path);
                let mut fragment = Fragment::logic(&name, data.statements);
                fragment.domains = data.domains;
                for (sub_name, child) in &data.submodules {
                    let sub_path = format!("{}.{}", path, sub_name);
                    let mut sub = elaborate_node(child.as_ref(), platform, &sub_path)?;
                    sub.name = sub_name.clone();
                    fragment.subfragments.push(sub);
                }
                return Ok(fragment);
            }
            ElabResult::Instance(instance) => {
                return Ok(Fragment::leaf(&leaf_name(path), FragmentKind::Instance(instance)));
            }
            ElabResult::Memory(memory) => {
                return Ok(Fragment::leaf(&leaf_name(path), FragmentKind::Memory(memory)));
            }
            ElabResult::IoBuffer(buffer) => {
                return Ok(Fragment::leaf(&leaf_name(path), FragmentKind::IoBuffer(buffer)));
            }
            ElabResult::Delegate(delegate) => {
                depth += 1;
                if depth > MAX_DELEGATION {
                    return Err(ElabError::DelegationTooDeep {
                        path: path.to_string(),
                        depth,
                    }
                    .into());
                }
                result = delegate.elaborate(platform);
            }
        }
    }
}

fn leaf_name(path: &str) -> String {
    path.rsplit('.').next().unwrap_or(path).to_string()
}
