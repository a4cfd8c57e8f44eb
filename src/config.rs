//! Controller configuration
//!
//! Built once at startup from CLI flags and environment, validated, then
//! shared read-only with every reconciliation.

use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;

use crate::template::ManagedTemplate;
use crate::Error;

/// Maximum length of a Kubernetes object name (DNS-1123 subdomain)
const MAX_NAME_LEN: usize = 253;

/// Default deadline for a single reconciliation pass
pub const DEFAULT_RECONCILE_TIMEOUT: Duration = Duration::from_secs(30);

/// How the controller decides whether the managed resource already exists
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum MatchMode {
    /// A managed instance named like the template is listed in the namespace
    #[default]
    ExternalSecret,
    /// A core Secret named like the trigger secret is listed in the namespace
    TargetSecret,
}

impl std::fmt::Display for MatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchMode::ExternalSecret => write!(f, "external-secret"),
            MatchMode::TargetSecret => write!(f, "target-secret"),
        }
    }
}

/// Immutable configuration record for one controller instance
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Image pull secret name that activates the managed resource
    pub trigger_secret_name: String,
    /// Blueprint cloned into every namespace that needs it
    pub template: Arc<ManagedTemplate>,
    /// Existence check strategy
    pub match_mode: MatchMode,
    /// Deadline applied to each reconciliation pass
    pub reconcile_timeout: Duration,
}

impl ControllerConfig {
    /// Validate and assemble the configuration
    pub fn new(
        trigger_secret_name: impl Into<String>,
        template: ManagedTemplate,
        match_mode: MatchMode,
        reconcile_timeout: Duration,
    ) -> Result<Self, Error> {
        let trigger_secret_name = trigger_secret_name.into();
        validate_object_name(&trigger_secret_name)
            .map_err(|e| Error::configuration(format!("invalid trigger secret name: {}", e)))?;
        validate_object_name(&template.name())
            .map_err(|e| Error::configuration(format!("invalid template name: {}", e)))?;
        if reconcile_timeout.is_zero() {
            return Err(Error::configuration("reconcile timeout must be non-zero"));
        }

        Ok(Self {
            trigger_secret_name,
            template: Arc::new(template),
            match_mode,
            reconcile_timeout,
        })
    }

    /// Name the existence check looks for, depending on the match mode
    pub fn managed_identity(&self) -> String {
        match self.match_mode {
            MatchMode::ExternalSecret => self.template.name(),
            MatchMode::TargetSecret => self.trigger_secret_name.clone(),
        }
    }
}

/// Validate a Kubernetes object name (DNS-1123 subdomain)
///
/// Lowercase alphanumerics, `-` and `.`, starting and ending alphanumeric.
pub(crate) fn validate_object_name(s: &str) -> Result<(), String> {
    if s.is_empty() {
        return Err("name cannot be empty".to_string());
    }
    if s.len() > MAX_NAME_LEN {
        return Err(format!("name exceeds {} characters: {}", MAX_NAME_LEN, s));
    }

    let is_alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();

    if !s.starts_with(is_alnum) || !s.ends_with(is_alnum) {
        return Err(format!(
            "name must start and end with a lowercase letter or digit: {}",
            s
        ));
    }

    if let Some(c) = s.chars().find(|&c| !is_alnum(c) && c != '-' && c != '.') {
        return Err(format!("name contains invalid character '{}': {}", c, s));
    }

    Ok(())
}
