//! Tool-name allowlist.
//!
//! The permitted set is resolved once per call from two explicit inputs: the
//! operator's comma-separated override and the gateway's default set. A
//! non-blank override replaces the defaults entirely; an override that is
//! blank after trimming (including `" , "`) resolves to the defaults, not to
//! an empty set.

use std::collections::BTreeSet;

use tracing::{info, info_span};

use crate::{AppError, Result};

/// Built-in tool names permitted when no override is configured.
pub const DEFAULT_ALLOWED_TOOLS: [&str; 5] = [
    "kernel_version",
    "self_check",
    "policy_evaluate",
    "workspace_search",
    "audit_query",
];

/// Where a resolved allowlist came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowlistOrigin {
    /// The operator's override string.
    Override,
    /// The default set.
    Default,
}

/// A resolved, immutable set of permitted tool names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allowlist {
    tools: BTreeSet<String>,
    origin: AllowlistOrigin,
}

impl Allowlist {
    /// Resolve the permitted set from an override string and a default set.
    #[must_use]
    pub fn resolve<S: AsRef<str>>(raw_override: &str, defaults: &[S]) -> Self {
        let overridden: BTreeSet<String> = raw_override
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .collect();

        if overridden.is_empty() {
            Self {
                tools: defaults.iter().map(|s| s.as_ref().to_owned()).collect(),
                origin: AllowlistOrigin::Default,
            }
        } else {
            Self {
                tools: overridden,
                origin: AllowlistOrigin::Override,
            }
        }
    }

    /// Whether `tool` is permitted.
    #[must_use]
    pub fn contains(&self, tool: &str) -> bool {
        self.tools.contains(tool)
    }

    /// Permitted names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(String::as_str)
    }

    /// Number of permitted names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether nothing is permitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Where this set came from.
    #[must_use]
    pub fn origin(&self) -> AllowlistOrigin {
        self.origin
    }

    /// Reject `tool` unless it is permitted.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Unauthorized` naming the tool and listing every
    /// permitted name.
    pub fn authorize(&self, tool: &str) -> Result<()> {
        let _span = info_span!(
            "allowlist_check",
            tool = %tool,
            origin = ?self.origin,
            permitted = self.len()
        )
        .entered();

        if self.contains(tool) {
            return Ok(());
        }

        info!("tool rejected by allowlist");
        Err(AppError::Unauthorized(format!(
            "tool '{tool}' is not allowed; permitted tools: {}",
            self.names().collect::<Vec<_>>().join(", ")
        )))
    }
}
