//! Capability gate: server-issued permission registry, resolved per session.
//!
//! Availability is an explicit tri-state — `Loading` is never collapsed
//! into `Unavailable`, so a control cannot flash enabled-then-disabled (or
//! the reverse) while the registry is still in flight. When a capability is
//! missing the reason always names the exact capability id; a gated control
//! is disabled with an explanation, never silently hidden.
//!
//! The gate is also the enforcement point: [`CapabilityGate::guard`]
//! returns `Err` unless the capability is available, so a gated mutation
//! cannot fire even when invoked programmatically.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Well-known capability ids for the board surface.
pub mod caps {
    pub const MANAGE_COLUMNS: &str = "kanban.manageColumns";
    pub const QUICK_COMPOSER: &str = "kanban.quickComposer";
    pub const METRICS: &str = "kanban.metrics";
    pub const ASSIST: &str = "kanban.assist";
}

/// Tri-state availability of one capability-gated control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Availability {
    /// The registry has not answered yet. Not a denial.
    Loading,
    Available,
    /// Denied, with a human-readable reason naming the missing id.
    Unavailable { reason: String },
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }
}

/// Why a gated operation was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    /// Registry still loading; the operation must wait, not fail over.
    Loading { capability: String },
    /// The session does not hold the capability.
    Denied { capability: String },
}

impl fmt::Display for CapabilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loading { capability } => {
                write!(f, "capability registry still loading ({capability})")
            }
            Self::Denied { capability } => {
                write!(f, "requires capability {capability}")
            }
        }
    }
}

impl std::error::Error for CapabilityError {}

/// The set of capabilities granted to this session.
///
/// Starts in the loading state; `resolve` installs the granted set once the
/// registry answers. Resolving again replaces the grant wholesale (the
/// registry snapshot is authoritative, not diffed).
#[derive(Debug, Clone, Default)]
pub struct CapabilityGate {
    granted: Option<HashSet<String>>,
}

impl CapabilityGate {
    /// A gate that has not heard from the registry yet.
    pub fn loading() -> Self {
        Self { granted: None }
    }

    /// A gate resolved with the given grant set.
    pub fn resolved<I, S>(granted: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            granted: Some(granted.into_iter().map(Into::into).collect()),
        }
    }

    /// Install the registry's answer.
    pub fn resolve<I, S>(&mut self, granted: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.granted = Some(granted.into_iter().map(Into::into).collect());
    }

    pub fn is_loading(&self) -> bool {
        self.granted.is_none()
    }

    /// Availability of one capability, for rendering a gated control.
    pub fn availability(&self, capability: &str) -> Availability {
        match &self.granted {
            None => Availability::Loading,
            Some(set) if set.contains(capability) => Availability::Available,
            Some(_) => Availability::Unavailable {
                reason: format!("requires capability {capability}"),
            },
        }
    }

    /// Enforcement: `Ok` only when the capability is available right now.
    pub fn guard(&self, capability: &str) -> Result<(), CapabilityError> {
        match &self.granted {
            None => Err(CapabilityError::Loading {
                capability: capability.to_string(),
            }),
            Some(set) if set.contains(capability) => Ok(()),
            Some(_) => Err(CapabilityError::Denied {
                capability: capability.to_string(),
            }),
        }
    }
}

// ===================================================================
// Tests
// ===================================================================
