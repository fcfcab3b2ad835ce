//! The elaboratable capability.
//!
//! Anything that can appear in a design tree implements [`Elaboratable`]:
//! its `elaborate` method returns either a finished [`Module`], a primitive
//! leaf (instance, memory, IO buffer), or a delegate to elaborate in its
//! place. The elaboration driver recurses until it reaches a module or a
//! leaf.

use std::any::Any;

use crate::instance::{Instance, IoBufferInstance};
use crate::memory::Memory;
use crate::module::Module;

/// What one elaboration step produced.
pub enum ElabResult {
    Module(Module),
    Instance(Instance),
    Memory(Memory),
    IoBuffer(IoBufferInstance),
    /// Elaborate this value instead. Delegation chains must terminate.
    Delegate(Box<dyn Elaboratable>),
}

/// A design node that can be expanded into hardware.
///
/// `elaborate` must be deterministic: elaborating the same node twice with
/// the same platform must describe the same hardware. The platform is
/// opaque to the core; it is passed through for the node's own use.
pub trait Elaboratable {
    fn elaborate(&self, platform: Option<&dyn Any>) -> ElabResult;
}

impl Elaboratable for Instance {
    fn elaborate(&self, _platform: Option<&dyn Any>) -> ElabResult {
        ElabResult::Instance(self.clone())
    }
}

impl Elaboratable for Memory {
    fn elaborate(&self, _platform: Option<&dyn Any>) -> ElabResult {
        ElabResult::Memory(self.clone())
    }
}

impl Elaboratable for IoBufferInstance {
    fn elaborate(&self, _platform: Option<&dyn Any>) -> ElabResult {
        ElabResult::IoBuffer(self.clone())
    }
}
