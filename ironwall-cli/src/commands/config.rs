//! `ironwall config` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use ironwall_core::config::IronwallConfig;
use ironwall_core::error::{ConfigError, IronwallError};
use ironwall_filter_engine::FilterConfig;

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Sections accepted by `config show --section`.
const SECTIONS: [&str; 3] = ["general", "engine", "policy"];

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(config_path, writer).await,
        ConfigAction::Show { section } => execute_show(config_path, section, writer).await,
    }
}

/// Load `ironwall.toml`, falling back to defaults (plus env overrides) when
/// the file does not exist. Any other load failure is returned.
pub async fn load_or_default(config_path: &Path) -> Result<IronwallConfig, IronwallError> {
    match IronwallConfig::load(config_path).await {
        Err(IronwallError::Config(ConfigError::FileNotFound { path })) => {
            warn!(path = %path, "config file not found, using defaults");
            let mut config = IronwallConfig::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
        other => other,
    }
}

/// Load the configuration file and the policy file it points to.
async fn load_effective(config_path: &Path) -> Result<(IronwallConfig, FilterConfig), IronwallError> {
    let config = IronwallConfig::load(config_path).await?;
    let filter = FilterConfig::resolve(&config.engine).await?;
    Ok((config, filter))
}

/// Execute the config validate subcommand.
///
/// Loads `ironwall.toml`, applies env overrides, then loads and compiles the
/// policy file named by `engine.policy_path`. Any failure is reported and
/// turned into `CliError::Config`.
async fn execute_validate(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    info!(path = %config_path.display(), "validating configuration");

    let report = match load_effective(config_path).await {
        Ok((_, filter)) => {
            let signatures = filter.policy.compile_signatures().map(|s| s.len());
            match signatures {
                Ok(signatures) => ConfigValidationReport {
                    source: config_path.display().to_string(),
                    valid: true,
                    errors: Vec::new(),
                    policy: Some(PolicySummary {
                        path: non_empty(&filter.base.policy_path),
                        blacklist_entries: filter.policy.blacklist.len(),
                        geo_rules: filter.policy.geo.to_table().rules().len(),
                        signatures,
                    }),
                },
                Err(e) => ConfigValidationReport::invalid(config_path, e.to_string()),
            }
        }
        Err(e) => ConfigValidationReport::invalid(config_path, e.to_string()),
    };

    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }

    Ok(())
}

/// Execute the config show subcommand.
///
/// Displays the effective configuration (file + env overrides + defaults).
/// The `policy` section shows the policy file contents after defaults are applied.
async fn execute_show(
    config_path: &Path,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(path = %config_path.display(), "loading configuration");

    let (config, filter) = load_effective(config_path).await?;
    let source = config_path.display().to_string();

    let report = match section.as_deref() {
        None => ConfigReport::new(source, None, &config)?,
        Some("general") => ConfigReport::new(source, Some("general"), &config.general)?,
        Some("engine") => ConfigReport::new(source, Some("engine"), &config.engine)?,
        Some("policy") => ConfigReport::new(source, Some("policy"), &filter.policy)?,
        Some(other) => {
            return Err(CliError::Command(format!(
                "unknown section: {} (expected: {})",
                other,
                SECTIONS.join(", ")
            )));
        }
    };

    writer.render(&report)?;

    Ok(())
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_owned())
}

/// Configuration display report.
///
/// Text output shows the TOML form; JSON output embeds the same values as
/// a JSON object.
#[derive(Serialize)]
pub struct ConfigReport {
    /// Configuration file path
    pub source: String,
    /// Optional section name (None = full config)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Effective values
    pub config: serde_json::Value,
    /// Serialized TOML configuration
    #[serde(skip)]
    pub config_toml: String,
}

impl ConfigReport {
    fn new<T: Serialize>(source: String, section: Option<&str>, value: &T) -> Result<Self, CliError> {
        Ok(Self {
            source,
            section: section.map(str::to_owned),
            config: serde_json::to_value(value)?,
            config_toml: toml::to_string_pretty(value)
                .unwrap_or_else(|e| format!("(serialization error: {})", e)),
        })
    }
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if let Some(ref section) = self.section {
            let section_label = format!("[{}]", section);
            writeln!(
                w,
                "Configuration {} (source: {})",
                section_label.bold(),
                self.source
            )?;
        } else {
            writeln!(w, "Configuration (source: {})", self.source.bold())?;
        }

        writeln!(w)?;
        write!(w, "{}", self.config_toml)?;

        Ok(())
    }
}

/// Counts from a successfully loaded policy.
#[derive(Debug, Serialize)]
pub struct PolicySummary {
    /// Policy file path (None = built-in defaults)
    pub path: Option<String>,
    pub blacklist_entries: usize,
    pub geo_rules: usize,
    pub signatures: usize,
}

/// Configuration validation report.
#[derive(Serialize)]
pub struct ConfigValidationReport {
    /// Configuration file path
    pub source: String,
    /// Whether the configuration is valid
    pub valid: bool,
    /// Validation error messages (empty if valid)
    pub errors: Vec<String>,
    /// Loaded policy summary (valid configurations only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<PolicySummary>,
}

impl ConfigValidationReport {
    fn invalid(source: &Path, error: String) -> Self {
        Self {
            source: source.display().to_string(),
            valid: false,
            errors: vec![error],
            policy: None,
        }
    }
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;

        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }

        if let Some(ref policy) = self.policy {
            let path = policy.path.as_deref().unwrap_or("(built-in defaults)");
            writeln!(w, "  Policy: {}", path)?;
            writeln!(w, "    Blacklist entries: {}", policy.blacklist_entries)?;
            writeln!(w, "    Geo rules:         {}", policy.geo_rules)?;
            writeln!(w, "    Signatures:        {}", policy.signatures)?;
        }

        Ok(())
    }
}
