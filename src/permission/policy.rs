//! Auto-approval policy keyed by tool kind.

use crate::models::{PermissionOption, PermissionOptionKind};

/// Which tool kinds are approved without asking the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutoApprovePolicy {
    /// Auto-approve `read` tools.
    pub read: bool,
    /// Auto-approve `list` and `search` tools.
    pub list: bool,
    /// Auto-approve `execute` tools.
    pub execute: bool,
}

impl AutoApprovePolicy {
    /// Whether a request for a tool of wire kind `kind` is auto-approved.
    #[must_use]
    pub fn covers(&self, kind: Option<&str>) -> bool {
        match kind {
            Some("read") => self.read,
            Some("list" | "search") => self.list,
            Some("execute") => self.execute,
            _ => false,
        }
    }
}

/// Option picked when a request is auto-approved.
///
/// Prefers the first allow-kind option, then the first option whose name
/// contains "allow", then the first option. `None` when there are no
/// options, which resolves the request as cancelled.
#[must_use]
pub fn pick_auto_option(options: &[PermissionOption]) -> Option<&PermissionOption> {
    options
        .iter()
        .find(|option| {
            matches!(
                option.kind,
                PermissionOptionKind::AllowOnce | PermissionOptionKind::AllowAlways
            ) || option.name.to_lowercase().contains("allow")
        })
        .or_else(|| options.first())
}
