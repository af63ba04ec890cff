//! Target architecture selection.
//!
//! Only the two macOS hardware architectures are accepted. Any other selector
//! is rejected at parse time, before the pipeline touches the filesystem.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Accepted selector spellings, used in error messages.
const SUPPORTED_SELECTORS: &[&str] = &["arm64", "x86_64"];

/// A supported macOS target architecture.
///
/// # Examples
///
/// ```
/// use pkgsmith::arch::Architecture;
///
/// let arch: Architecture = "arm64".parse().expect("supported architecture");
/// assert_eq!(arch.platform_tag(), "macos-arm64");
///
/// let tagged: Architecture = "macos-x86_64".parse().expect("platform tags also parse");
/// assert_eq!(tagged, Architecture::X86_64);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Architecture {
    /// Apple silicon.
    #[serde(rename = "arm64")]
    Arm64,
    /// Intel.
    #[serde(rename = "x86_64")]
    X86_64,
}

impl Architecture {
    /// Every supported architecture, in build order.
    pub const ALL: [Self; 2] = [Self::Arm64, Self::X86_64];

    /// Return the selector spelling (`arm64` or `x86_64`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Arm64 => "arm64",
            Self::X86_64 => "x86_64",
        }
    }

    /// Return the platform tag used in artifact names (`macos-arm64`).
    #[must_use]
    pub const fn platform_tag(self) -> &'static str {
        match self {
            Self::Arm64 => "macos-arm64",
            Self::X86_64 => "macos-x86_64",
        }
    }

    /// Comma-separated list of accepted selectors, for diagnostics.
    #[must_use]
    pub fn expected_list() -> String {
        SUPPORTED_SELECTORS.join(", ")
    }

    /// Parse a list of selectors into sorted, de-duplicated architectures.
    ///
    /// Every selector is checked before any is returned.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidArchitecture`] for the first unknown
    /// selector, or when the list is empty.
    pub fn parse_selectors<S: AsRef<str>>(selectors: &[S]) -> Result<Vec<Self>> {
        let mut parsed = selectors
            .iter()
            .map(|s| s.as_ref().parse::<Self>())
            .collect::<Result<Vec<_>>>()?;
        parsed.sort_unstable();
        parsed.dedup();
        if parsed.is_empty() {
            return Err(PipelineError::InvalidArchitecture {
                value: String::new(),
                expected: Self::expected_list(),
            });
        }
        Ok(parsed)
    }

    /// Return the value for `hostArchitectures` in a distribution definition.
    #[must_use]
    pub const fn host_architecture(self) -> &'static str {
        self.as_str()
    }

    /// Return the flag that makes the macOS `arch` tool run a universal
    /// binary as this architecture (`-arm64`, `-x86_64`).
    #[must_use]
    pub const fn arch_flag(self) -> &'static str {
        match self {
            Self::Arm64 => "-arm64",
            Self::X86_64 => "-x86_64",
        }
    }

    /// Returns `true` when `machine`, as printed by `platform.machine()`,
    /// names this architecture.
    #[must_use]
    pub fn matches_machine(self, machine: &str) -> bool {
        match self {
            Self::Arm64 => matches!(machine, "arm64" | "aarch64"),
            Self::X86_64 => matches!(machine, "x86_64" | "amd64" | "AMD64"),
        }
    }
}

impl FromStr for Architecture {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self> {
        let selector = value.strip_prefix("macos-").unwrap_or(value);
        match selector {
            "arm64" => Ok(Self::Arm64),
            "x86_64" => Ok(Self::X86_64),
            _ => Err(PipelineError::InvalidArchitecture {
                value: value.to_owned(),
                expected: Self::expected_list(),
            }),
        }
    }
}

impl TryFrom<&str> for Architecture {
    type Error = PipelineError;

    fn try_from(value: &str) -> Result<Self> {
        value.parse()
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::arm("arm64", Architecture::Arm64)]
    #[case::intel("x86_64", Architecture::X86_64)]
    #[case::arm_tag("macos-arm64", Architecture::Arm64)]
    #[case::intel_tag("macos-x86_64", Architecture::X86_64)]
    fn parses_supported_selectors(#[case] input: &str, #[case] expected: Architecture) {
        assert_eq!(input.parse::<Architecture>().expect("supported"), expected);
    }

    #[rstest]
    #[case::empty("")]
    #[case::aarch64("aarch64")]
    #[case::upper("ARM64")]
    #[case::linux("linux-x86_64")]
    #[case::bare_prefix("macos-")]
    fn rejects_unknown_selectors(#[case] input: &str) {
        let err = input
            .parse::<Architecture>()
            .expect_err("expected rejection");
        assert!(
            matches!(err, PipelineError::InvalidArchitecture { ref value, .. } if value == input),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn selector_lists_are_sorted_and_deduplicated() {
        let parsed = Architecture::parse_selectors(&["x86_64", "arm64", "macos-x86_64"])
            .expect("valid selectors");
        assert_eq!(parsed, Architecture::ALL);
    }

    #[rstest]
    #[case::empty(&[])]
    #[case::one_bad(&["arm64", "ppc"])]
    fn selector_lists_reject_bad_input(#[case] selectors: &[&str]) {
        let err = Architecture::parse_selectors(selectors).expect_err("rejected");
        assert!(matches!(err, PipelineError::InvalidArchitecture { .. }));
    }

    #[test]
    fn platform_tags_are_distinct() {
        assert_ne!(
            Architecture::Arm64.platform_tag(),
            Architecture::X86_64.platform_tag()
        );
    }

    #[rstest]
    #[case::arm_native(Architecture::Arm64, "arm64", true)]
    #[case::arm_linux(Architecture::Arm64, "aarch64", true)]
    #[case::arm_under_rosetta(Architecture::Arm64, "x86_64", false)]
    #[case::intel_native(Architecture::X86_64, "x86_64", true)]
    #[case::intel_on_arm(Architecture::X86_64, "arm64", false)]
    fn machine_names_match_their_architecture(
        #[case] arch: Architecture,
        #[case] machine: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(arch.matches_machine(machine), expected);
    }

    #[test]
    fn serializes_as_selector() {
        let json = serde_json::to_string(&Architecture::X86_64).expect("serialize");
        assert_eq!(json, "\"x86_64\"");
    }
}
