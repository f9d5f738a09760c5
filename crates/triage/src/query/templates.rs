//! KQL Template Registry
//!
//! Canonical log-query templates rendered with Tera. Keys form a closed enum;
//! legacy names are resolved through a fixed, versioned alias table. Every
//! parameter passes through the sanitizer before it reaches a template, and the
//! only way to obtain a [`SanitizedQuery`] is through [`TemplateRegistry`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tera::{Context, Tera};
use tracing::debug;

use super::{sanitizer, ValidationError};

/// Parameters supplied to a template, by placeholder name.
pub type TemplateParams = BTreeMap<String, String>;

/// Build a parameter map from literal pairs.
pub fn params<const N: usize>(pairs: [(&str, &str); N]) -> TemplateParams {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

/// Canonical template keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKey {
    ContainerLogs,
    AppExceptions,
    SqlErrors,
    ImpactAnalysis,
    FailurePatterns,
    DependencyFailures,
    RecentChanges,
    ExceptionCount,
    SqlErrorCount,
}

impl TemplateKey {
    pub const ALL: [TemplateKey; 9] = [
        TemplateKey::ContainerLogs,
        TemplateKey::AppExceptions,
        TemplateKey::SqlErrors,
        TemplateKey::ImpactAnalysis,
        TemplateKey::FailurePatterns,
        TemplateKey::DependencyFailures,
        TemplateKey::RecentChanges,
        TemplateKey::ExceptionCount,
        TemplateKey::SqlErrorCount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKey::ContainerLogs => "container_logs",
            TemplateKey::AppExceptions => "app_exceptions",
            TemplateKey::SqlErrors => "sql_errors",
            TemplateKey::ImpactAnalysis => "impact_analysis",
            TemplateKey::FailurePatterns => "failure_patterns",
            TemplateKey::DependencyFailures => "dependency_failures",
            TemplateKey::RecentChanges => "recent_changes",
            TemplateKey::ExceptionCount => "exception_count",
            TemplateKey::SqlErrorCount => "sql_error_count",
        }
    }

    /// Exact, case-insensitive match against canonical names only.
    pub fn from_canonical(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|key| key.as_str() == name)
    }

    fn descriptor(&self) -> TemplateDescriptor {
        let (template, required): (&'static str, &'static [&'static str]) = match self {
            TemplateKey::ContainerLogs => (CONTAINER_LOGS, STANDARD_PARAMS),
            TemplateKey::AppExceptions => (APP_EXCEPTIONS, STANDARD_PARAMS),
            TemplateKey::SqlErrors => (SQL_ERRORS, STANDARD_PARAMS),
            TemplateKey::ImpactAnalysis => (IMPACT_ANALYSIS, STANDARD_PARAMS),
            TemplateKey::FailurePatterns => (FAILURE_PATTERNS, STANDARD_PARAMS),
            TemplateKey::DependencyFailures => (DEPENDENCY_FAILURES, STANDARD_PARAMS),
            TemplateKey::RecentChanges => (RECENT_CHANGES, STANDARD_PARAMS),
            TemplateKey::ExceptionCount => (EXCEPTION_COUNT, STANDARD_PARAMS),
            TemplateKey::SqlErrorCount => (SQL_ERROR_COUNT, STANDARD_PARAMS),
        };
        TemplateDescriptor {
            key: *self,
            template,
            required,
        }
    }
}

impl fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bumped whenever an alias is added, removed or retargeted.
pub const ALIAS_TABLE_VERSION: u32 = 1;

/// Legacy and alternate names accepted for canonical templates.
pub const ALIAS_TABLE: &[(&str, TemplateKey)] = &[
    ("container", TemplateKey::ContainerLogs),
    ("containers", TemplateKey::ContainerLogs),
    ("container_app_logs", TemplateKey::ContainerLogs),
    ("containerappconsolelogs", TemplateKey::ContainerLogs),
    ("app", TemplateKey::AppExceptions),
    ("exceptions", TemplateKey::AppExceptions),
    ("appexceptions", TemplateKey::AppExceptions),
    ("sql", TemplateKey::SqlErrors),
    ("sqlerrors", TemplateKey::SqlErrors),
    ("azurediagnostics", TemplateKey::SqlErrors),
];

/// A template key with its raw text and required parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateDescriptor {
    pub key: TemplateKey,
    pub template: &'static str,
    pub required: &'static [&'static str],
}

/// A rendered query whose every interpolated value passed the sanitizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedQuery(String);

impl SanitizedQuery {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SanitizedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable after construction; share it behind an `Arc`.
pub struct TemplateRegistry {
    tera: Tera,
    descriptors: Vec<TemplateDescriptor>,
}

impl TemplateRegistry {
    /// Parse every canonical template. A parse failure is a startup fault.
    pub fn new() -> Result<Self, ValidationError> {
        let descriptors: Vec<TemplateDescriptor> =
            TemplateKey::ALL.iter().map(TemplateKey::descriptor).collect();

        let mut tera = Tera::default();
        tera.add_raw_templates(
            descriptors
                .iter()
                .map(|d| (d.key.as_str(), d.template))
                .collect::<Vec<_>>(),
        )
        .map_err(|e| ValidationError::Render {
            template: "registry",
            message: e.to_string(),
        })?;

        Ok(Self { tera, descriptors })
    }

    /// Canonical keys in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = TemplateKey> + '_ {
        self.descriptors.iter().map(|d| d.key)
    }

    pub fn descriptor(&self, key: TemplateKey) -> Option<&TemplateDescriptor> {
        self.descriptors.iter().find(|d| d.key == key)
    }

    pub fn aliases(&self) -> &'static [(&'static str, TemplateKey)] {
        ALIAS_TABLE
    }

    /// Resolve a key name: canonical names first, then the alias table.
    pub fn resolve(name: &str) -> Result<TemplateKey, ValidationError> {
        if let Some(key) = TemplateKey::from_canonical(name) {
            return Ok(key);
        }

        let lowered = name.trim().to_ascii_lowercase();
        ALIAS_TABLE
            .iter()
            .find(|(alias, _)| *alias == lowered)
            .map(|(alias, key)| {
                debug!("Resolved template alias {} -> {}", alias, key);
                *key
            })
            .ok_or_else(|| ValidationError::UnknownTemplate(name.to_string()))
    }

    /// Render a template by name (canonical or alias).
    pub fn render(&self, name: &str, params: &TemplateParams) -> Result<SanitizedQuery, ValidationError> {
        let key = Self::resolve(name)?;
        self.render_key(key, params)
    }

    /// Render a canonical template. Every parameter is sanitized; the first
    /// failure aborts the call.
    pub fn render_key(
        &self,
        key: TemplateKey,
        params: &TemplateParams,
    ) -> Result<SanitizedQuery, ValidationError> {
        let descriptor = self
            .descriptor(key)
            .ok_or_else(|| ValidationError::UnknownTemplate(key.as_str().to_string()))?;

        if let Some(missing) = descriptor.required.iter().find(|p| !params.contains_key(**p)) {
            return Err(ValidationError::MissingParameter {
                template: key.as_str(),
                parameter: *missing,
            });
        }

        let mut context = Context::new();
        for (name, value) in params {
            context.insert(name.as_str(), sanitizer::validate(value)?);
        }

        let rendered = self
            .tera
            .render(key.as_str(), &context)
            .map_err(|e| ValidationError::Render {
                template: key.as_str(),
                message: e.to_string(),
            })?;

        Ok(SanitizedQuery(rendered.trim().to_string()))
    }
}

const STANDARD_PARAMS: &[&str] = &["resource_name", "lookback"];

const CONTAINER_LOGS: &str = r#"
ContainerAppConsoleLogs
| where TimeGenerated > ago({{ lookback }})
| where ContainerAppName has "{{ resource_name }}"
| project TimeGenerated, ContainerAppName, Log_s
| top 20 by TimeGenerated desc
"#;

const APP_EXCEPTIONS: &str = r#"
AppExceptions
| where TimeGenerated > ago({{ lookback }})
| where AppRoleName has "{{ resource_name }}" or "{{ resource_name }}" == "Unknown"
| summarize Count=count() by ProblemId, OuterMessage
| top 5 by Count desc
"#;

const SQL_ERRORS: &str = r#"
AzureDiagnostics
| where TimeGenerated > ago({{ lookback }})
| where Resource has "{{ resource_name }}"
| where Category == "SQLErrors" or Category == "Timeouts"
| project TimeGenerated, error_number_d, Message
| top 20 by TimeGenerated desc
"#;

const IMPACT_ANALYSIS: &str = r#"
union withsource=SourceTable AppRequests, AppDependencies, AppExceptions
| where TimeGenerated > ago({{ lookback }})
| where AppRoleName has "{{ resource_name }}"
| summarize Total=count(), Failed=countif(Success == false or SourceTable == "AppExceptions"), Users=dcount(UserId) by SourceTable
| extend FailureRate=round(100.0 * Failed / Total, 2)
"#;

const FAILURE_PATTERNS: &str = r#"
AppRequests
| where TimeGenerated > ago({{ lookback }})
| where AppRoleName has "{{ resource_name }}"
| where Success == false
| project Name, ResultCode, AppRoleInstance, ClientCity, ClientOS
| evaluate autocluster()
"#;

const DEPENDENCY_FAILURES: &str = r#"
AppRequests
| where TimeGenerated > ago({{ lookback }})
| where AppRoleName has "{{ resource_name }}" and Success == false
| project OperationId, RequestName=Name
| join kind=inner (
    AppDependencies
    | where TimeGenerated > ago({{ lookback }})
    | where Success == false
    | project OperationId, DependencyName=Name, DependencyType, Target, ResultCode
  ) on OperationId
| summarize Count=count() by RequestName, DependencyType, Target, ResultCode
| top 10 by Count desc
"#;

const RECENT_CHANGES: &str = r#"
AzureActivity
| where TimeGenerated > ago({{ lookback }})
| where _ResourceId has "{{ resource_name }}"
| where CategoryValue == "Administrative"
| where OperationNameValue has_any ("write", "deploy", "restart", "swap")
| project TimeGenerated, OperationNameValue, ActivityStatusValue, Caller
| top 10 by TimeGenerated desc
"#;

const EXCEPTION_COUNT: &str = r#"
AppExceptions
| where TimeGenerated > ago({{ lookback }})
| where AppRoleName has "{{ resource_name }}"
| count
"#;

const SQL_ERROR_COUNT: &str = r#"
AzureDiagnostics
| where TimeGenerated > ago({{ lookback }})
| where Resource has "{{ resource_name }}"
| where Category == "SQLErrors" or Category == "Timeouts"
| count
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TemplateRegistry {
        TemplateRegistry::new().unwrap()
    }

    #[test]
    fn test_every_key_has_a_descriptor() {
        let registry = registry();
        let keys: Vec<_> = registry.keys().collect();
        assert_eq!(keys, TemplateKey::ALL.to_vec());
        for key in keys {
            let descriptor = registry.descriptor(key).unwrap();
            assert!(descriptor.required.contains(&"resource_name"));
            assert!(descriptor.template.contains("{{ resource_name }}"));
        }
    }

    #[test]
    fn test_render_interpolates_parameters() {
        let query = registry()
            .render_key(
                TemplateKey::ContainerLogs,
                &params([("resource_name", "orders-api"), ("lookback", "30m")]),
            )
            .unwrap();

        assert!(query.as_str().starts_with("ContainerAppConsoleLogs"));
        assert!(query.as_str().contains(r#"ContainerAppName has "orders-api""#));
        assert!(query.as_str().contains("ago(30m)"));
        assert!(!query.as_str().contains("{{"));
    }

    #[test]
    fn test_resolution_prefers_canonical_then_alias() {
        assert_eq!(TemplateRegistry::resolve("sql_errors"), Ok(TemplateKey::SqlErrors));
        assert_eq!(TemplateRegistry::resolve("Container_Logs"), Ok(TemplateKey::ContainerLogs));
        assert_eq!(TemplateRegistry::resolve("container"), Ok(TemplateKey::ContainerLogs));
        assert_eq!(TemplateRegistry::resolve("AppExceptions"), Ok(TemplateKey::AppExceptions));
        assert_eq!(
            TemplateRegistry::resolve("containerish_logs"),
            Err(ValidationError::UnknownTemplate("containerish_logs".to_string()))
        );
    }

    #[test]
    fn test_aliases_target_canonical_keys() {
        let registry = registry();
        assert_eq!(ALIAS_TABLE_VERSION, 1);
        for (alias, key) in registry.aliases() {
            assert!(TemplateKey::from_canonical(alias).is_none(), "alias {} shadows a key", alias);
            assert!(registry.descriptor(*key).is_some());
        }
    }

    #[test]
    fn test_render_by_alias_matches_canonical() {
        let registry = registry();
        let p = params([("resource_name", "db-01"), ("lookback", "1h")]);
        assert_eq!(registry.render("sql", &p), registry.render_key(TemplateKey::SqlErrors, &p));
    }

    #[test]
    fn test_missing_parameter_is_rejected() {
        let err = registry()
            .render_key(TemplateKey::ExceptionCount, &params([("resource_name", "orders-api")]))
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingParameter {
                template: "exception_count",
                parameter: "lookback",
            }
        );
    }

    #[test]
    fn test_single_bad_parameter_aborts_render() {
        let err = registry()
            .render_key(
                TemplateKey::AppExceptions,
                &params([("resource_name", "orders-api\" or 1==1 //"), ("lookback", "30m")]),
            )
            .unwrap_err();
        assert_eq!(err, ValidationError::ForbiddenSequence("//"));

        let err = registry()
            .render_key(
                TemplateKey::AppExceptions,
                &params([("resource_name", "orders-api"), ("lookback", "30m | take 1")]),
            )
            .unwrap_err();
        assert_eq!(err, ValidationError::ForbiddenSequence("|"));
    }
}
