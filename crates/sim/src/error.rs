//! Simulator compilation errors.

/// Error raised while translating a netlist into an evaluation graph, or
/// while driving the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    /// The combinational dependency graph has a cycle through the listed
    /// signals. Asynchronous feedback cannot be simulated.
    CombinationalCycle { signals: Vec<String> },
    /// `tick` was called with a domain name the netlist does not define.
    UnknownDomain { name: String },
    /// A clock-domain reference survived net assembly; the netlist was
    /// not produced by the standard builder.
    UnresolvedDomainRef { domain: String },
}

impl std::fmt::Display for SimError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimError::CombinationalCycle { signals } => {
                write!(f, "combinational feedback loop through: {}", signals.join(", "))
            }
            SimError::UnknownDomain { name } => {
                write!(f, "no clock domain named {:?} in this design", name)
            }
            SimError::UnresolvedDomainRef { domain } => {
                write!(f, "unresolved clock/reset reference to domain {:?}", domain)
            }
        }
    }
}

impl std::error::Error for SimError {}
