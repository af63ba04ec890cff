//! `productbuild` distribution definitions.

use crate::arch::Architecture;
use crate::config::PackagingConfig;
use crate::error::{PipelineError, Result};
use crate::naming::ArtifactName;
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt::Write as _;
use std::fs;

/// File name of the distribution definition inside the staging directory.
pub const DISTRIBUTION_FILE: &str = "distribution.xml";

/// File name the license is copied to inside the resources directory.
pub const LICENSE_FILE: &str = "LICENSE.txt";

/// Inputs for one architecture's `distribution.xml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionDefinition {
    /// Installer window title.
    pub title: String,
    /// Human-readable application name for the choice entry.
    pub display_name: String,
    /// Package identifier shared by the pkg-ref and choice.
    pub identifier: String,
    /// Version shown in the title and pkg-ref.
    pub version: String,
    /// Component package file name referenced by the pkg-ref.
    pub component_file: String,
    /// Target hardware architecture.
    pub architecture: Architecture,
    /// Minimum macOS version, if restricted.
    pub min_os_version: Option<String>,
    /// Whether a license file is included in the resources directory.
    pub has_license: bool,
}

impl DistributionDefinition {
    /// Derive a definition from configuration and an artifact name.
    #[must_use]
    pub fn new(config: &PackagingConfig, name: &ArtifactName) -> Self {
        let display = &config.application.display_name;
        let min_os = config.package.min_os_version.trim();
        Self {
            title: format!("{display} {}", name.version()),
            display_name: display.clone(),
            identifier: config.layout.identifier.clone(),
            version: name.version().to_string(),
            component_file: name.component_filename(),
            architecture: name.arch(),
            min_os_version: (!min_os.is_empty()).then(|| min_os.to_owned()),
            has_license: config.package.license.is_some(),
        }
    }

    fn choice_id(&self) -> String {
        format!("{}.choice", self.identifier)
    }

    /// Render the definition as XML.
    ///
    /// # Examples
    ///
    /// ```
    /// use pkgsmith::arch::Architecture;
    /// use pkgsmith::config::PackagingConfig;
    /// use pkgsmith::distribution::DistributionDefinition;
    /// use pkgsmith::naming::ArtifactName;
    /// use pkgsmith::version::Version;
    ///
    /// let name = ArtifactName::new(
    ///     "azure-cli",
    ///     Version::try_from("2.76.0").expect("valid"),
    ///     Architecture::Arm64,
    /// );
    /// let xml = DistributionDefinition::new(&PackagingConfig::default(), &name).render();
    /// assert!(xml.contains(r#"<options customize="never" require-scripts="false" hostArchitectures="arm64"/>"#));
    /// assert!(xml.contains(">azure-cli-component-2.76.0-macos-arm64.pkg</pkg-ref>"));
    /// ```
    #[must_use]
    pub fn render(&self) -> String {
        let id = escape(&self.identifier);
        let choice = escape(&self.choice_id());
        let mut xml = String::new();
        let _ = writeln!(xml, r#"<?xml version="1.0" encoding="utf-8"?>"#);
        let _ = writeln!(xml, r#"<installer-gui-script minSpecVersion="2">"#);
        let _ = writeln!(xml, "  <title>{}</title>", escape(&self.title));
        if self.has_license {
            let _ = writeln!(xml, r#"  <license file="{LICENSE_FILE}"/>"#);
        }
        let _ = writeln!(
            xml,
            r#"  <options customize="never" require-scripts="false" hostArchitectures="{}"/>"#,
            self.architecture.host_architecture()
        );
        let _ = writeln!(
            xml,
            r#"  <domains enable_anywhere="false" enable_currentUserHome="false" enable_localSystem="true"/>"#
        );
        if let Some(min) = &self.min_os_version {
            let _ = writeln!(xml, "  <allowed-os-versions>");
            let _ = writeln!(xml, r#"    <os-version min="{}"/>"#, escape(min));
            let _ = writeln!(xml, "  </allowed-os-versions>");
        }
        let _ = writeln!(
            xml,
            r#"  <pkg-ref id="{id}" version="{}" onConclusion="none">{}</pkg-ref>"#,
            escape(&self.version),
            escape(&self.component_file)
        );
        let _ = writeln!(xml, "  <choices-outline>");
        let _ = writeln!(xml, r#"    <line choice="{choice}"/>"#);
        let _ = writeln!(xml, "  </choices-outline>");
        let _ = writeln!(
            xml,
            r#"  <choice id="{choice}" title="{}" description="{}" start_selected="true">"#,
            escape(&self.display_name),
            escape(&format!(
                "Install {} {} command-line tool",
                self.display_name, self.version
            ))
        );
        let _ = writeln!(xml, r#"    <pkg-ref id="{id}"/>"#);
        let _ = writeln!(xml, "  </choice>");
        let _ = writeln!(xml, "</installer-gui-script>");
        xml
    }

    /// Write `distribution.xml` into `staging_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ArtifactWrite`] if the file cannot be written.
    pub fn write_to(&self, staging_dir: &Utf8Path) -> Result<Utf8PathBuf> {
        let path = staging_dir.join(DISTRIBUTION_FILE);
        fs::write(&path, self.render()).map_err(|e| PipelineError::artifact_write(&path, &e))?;
        Ok(path)
    }
}

/// Escape text for use in XML content and attribute values.
#[must_use]
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}
