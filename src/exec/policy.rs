//! Safety policy for raw command strings.
//!
//! Composed invocations are handed to a shell, so the policy is a whitelist
//! prefix (`kubectl`) plus a denylist of shell-abuse patterns. Redirection
//! (`>`, `>>`, `<`) is denied anywhere in the command, not only after `;`.
//! A rejection is a normal negative result, never an error.

use std::fmt;
use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};

/// Message returned to callers whenever a command is refused.
pub const REJECTION_MESSAGE: &str = "Invalid or potentially dangerous command";

/// Built-in deny patterns, matched case-insensitively anywhere in the command.
const BUILTIN_DENY: &[&str] = &[
    r";\s*rm(\s|$)",
    r";\s*wget(\s|$)",
    r";\s*curl(\s|$)",
    r">",
    r"<",
    r"\|\s*rm(\s|$)",
    r"\|\s*bash",
    r"--kubeconfig",
];

fn builtin_deny() -> &'static [Regex] {
    static SET: OnceLock<Vec<Regex>> = OnceLock::new();
    SET.get_or_init(|| {
        BUILTIN_DENY
            .iter()
            .filter_map(|p| compile_case_insensitive(p).ok())
            .collect()
    })
}

fn compile_case_insensitive(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// Returns true if `value` can be interpolated into a shell string as a
/// namespace, context or pod selector: `[A-Za-z0-9][A-Za-z0-9._:@/-]*`.
pub fn is_safe_selector(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '@' | '/' | '-'))
}

/// Why a command (or one of its selectors) was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyViolation {
    /// Trimmed command does not start with `kubectl`.
    NotKubectl,
    /// Command matched a deny pattern.
    DeniedPattern { pattern: String },
    /// A namespace/context/pod selector contains characters outside the
    /// selector alphabet.
    UnsafeSelector { field: &'static str, value: String },
}

impl fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyViolation::NotKubectl => write!(f, "command must start with kubectl"),
            PolicyViolation::DeniedPattern { pattern } => {
                write!(f, "command matches denied pattern {}", pattern)
            }
            PolicyViolation::UnsafeSelector { field, value } => {
                write!(f, "{} '{}' is not a valid selector", field, value)
            }
        }
    }
}

/// Whitelist-prefix + denylist validator for raw kubectl command strings.
///
/// Evaluation order:
/// 1. Prefix: trimmed command must start with `kubectl`
/// 2. Built-in deny patterns
/// 3. Operator-configured extra deny patterns
#[derive(Default)]
pub struct PolicyValidator {
    extra_deny: Vec<Regex>,
}

impl PolicyValidator {
    /// Build a validator with additional case-insensitive deny patterns.
    pub fn with_extra_deny(patterns: &[String]) -> crate::Result<Self> {
        let extra_deny = patterns
            .iter()
            .map(|p| {
                compile_case_insensitive(p).map_err(|e| {
                    crate::KubegateError::InvalidConfig("policy".to_string(), e.to_string())
                })
            })
            .collect::<crate::Result<Vec<_>>>()?;
        Ok(Self { extra_deny })
    }

    /// Returns true if the command may be run.
    pub fn validate(&self, raw_command: &str) -> bool {
        self.check(raw_command).is_ok()
    }

    /// Check a raw command, returning the first violated rule.
    pub fn check(&self, raw_command: &str) -> std::result::Result<(), PolicyViolation> {
        if !raw_command.trim().starts_with("kubectl") {
            return Err(PolicyViolation::NotKubectl);
        }

        for re in builtin_deny().iter().chain(self.extra_deny.iter()) {
            if re.is_match(raw_command) {
                return Err(PolicyViolation::DeniedPattern {
                    pattern: re.as_str().to_string(),
                });
            }
        }

        Ok(())
    }

    /// Check each selector of an execution target.
    pub fn check_selectors(
        &self,
        namespace: &str,
        context: &str,
        pod: Option<&str>,
    ) -> std::result::Result<(), PolicyViolation> {
        let fields = [("namespace", Some(namespace)), ("context", Some(context)), ("pod", pod)];
        for (field, value) in fields {
            if let Some(value) = value {
                if !is_safe_selector(value) {
                    return Err(PolicyViolation::UnsafeSelector {
                        field,
                        value: value.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}
