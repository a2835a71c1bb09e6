use crate::error::{HealthError, Result};
use crate::health::check::{qualified_id, HealthCheck};
use crate::health::configuration::HealthCheckConfiguration;
use config::{Config, ConfigError, Environment, File};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthSettings {
    /// Policy for every check without an explicit override.
    #[serde(default)]
    pub defaults: HealthCheckConfiguration,
    /// Overrides keyed by check id, `group.id`, a `*` wildcard or a regex.
    #[serde(default)]
    pub checks: BTreeMap<String, HealthCheckConfiguration>,
    #[serde(default)]
    pub agent: AgentSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    pub host_name: String,
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub routes: Vec<RouteSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteSettings {
    pub id: String,
    #[serde(default = "default_auto_startup")]
    pub auto_startup: bool,
}

fn default_auto_startup() -> bool {
    true
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            host_name: "health-agent".to_string(),
            poll_interval_ms: 10_000,
            routes: Vec::new(),
        }
    }
}

impl HealthSettings {
    /// Defaults, then `health.toml` if present, then `HEALTH_*` variables
    /// (`__` separates nested keys).
    pub fn load() -> Result<Self> {
        Self::build(File::with_name("health").required(false))
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        Self::build(File::from(path.as_ref()).required(true))
    }

    fn build<S>(file: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = Config::builder()
            .add_source(Config::try_from(&HealthSettings::default())?)
            .add_source(file)
            .add_source(
                Environment::with_prefix("HEALTH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: HealthSettings = config.try_deserialize()?;
        settings.validate()?;

        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.agent.poll_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Agent poll interval must be greater than 0".to_string(),
            )
            .into());
        }

        if self.agent.host_name.trim().is_empty() {
            return Err(ConfigError::Message("Host name cannot be empty".to_string()).into());
        }

        let configurations = std::iter::once(("defaults", &self.defaults))
            .chain(self.checks.iter().map(|(key, value)| (key.as_str(), value)));
        for (name, configuration) in configurations {
            if configuration.failure_threshold == Some(0) {
                return Err(ConfigError::Message(format!(
                    "Failure threshold for '{}' must be greater than 0",
                    name
                ))
                .into());
            }
        }

        if let Some(route) = self.agent.routes.iter().find(|route| route.id.trim().is_empty()) {
            return Err(ConfigError::Message(format!(
                "Route id cannot be empty (auto_startup = {})",
                route.auto_startup
            ))
            .into());
        }

        self.overrides().map(|_| ())
    }

    pub fn overrides(&self) -> Result<CheckOverrides> {
        CheckOverrides::new(self.defaults.clone(), &self.checks)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Compiled form of the `checks` section.
#[derive(Debug, Clone)]
pub struct CheckOverrides {
    defaults: HealthCheckConfiguration,
    exact: BTreeMap<String, HealthCheckConfiguration>,
    patterns: Vec<(Regex, HealthCheckConfiguration)>,
}

impl CheckOverrides {
    pub fn new(
        defaults: HealthCheckConfiguration,
        checks: &BTreeMap<String, HealthCheckConfiguration>,
    ) -> Result<Self> {
        let mut patterns = Vec::with_capacity(checks.len());
        for (key, configuration) in checks {
            patterns.push((compile_pattern(key)?, configuration.clone()));
        }

        Ok(Self {
            defaults,
            exact: checks.clone(),
            patterns,
        })
    }

    /// Override for the check if one matches, exact keys first.
    pub fn matching(&self, check: &dyn HealthCheck) -> Option<&HealthCheckConfiguration> {
        let qualified = qualified_id(check);

        self.exact
            .get(check.id())
            .or_else(|| self.exact.get(&qualified))
            .or_else(|| {
                self.patterns
                    .iter()
                    .find(|(pattern, _)| pattern.is_match(check.id()) || pattern.is_match(&qualified))
                    .map(|(_, configuration)| configuration)
            })
    }

    /// Override, then the check's own configuration, then the defaults.
    pub fn resolve(&self, check: &dyn HealthCheck) -> HealthCheckConfiguration {
        let own = check.configuration().merge(&self.defaults);
        match self.matching(check) {
            Some(configuration) => configuration.merge(&own),
            None => own,
        }
    }

    pub fn apply(&self, check: &dyn HealthCheck) {
        check.set_configuration(self.resolve(check));
    }
}

fn compile_pattern(key: &str) -> std::result::Result<Regex, HealthError> {
    let expression = if key.contains('*') && regex::escape(key) == key.replace('*', "\\*") {
        regex::escape(key).replace("\\*", ".*")
    } else {
        key.to_string()
    };

    Ok(Regex::new(&format!("^(?:{})$", expression))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::check::ProbeCheck;
    use std::io::Write;
    use std::time::Duration;

    fn check(id: &str, group: Option<&str>) -> ProbeCheck<impl crate::health::check::HealthProbe> {
        let check = ProbeCheck::from_fn(id.to_string(), |builder, _options| {
            builder.up();
            Ok(())
        });
        match group {
            Some(group) => check.with_group(group),
            None => check,
        }
    }

    #[test]
    fn test_default_settings() {
        let settings = HealthSettings::default();
        assert_eq!(settings.agent.host_name, "health-agent");
        assert_eq!(settings.agent.poll_interval_ms, 10_000);
        assert!(settings.checks.is_empty());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = HealthSettings::default();
        settings.agent.poll_interval_ms = 0;
        assert!(settings.validate().is_err());

        let mut settings = HealthSettings::default();
        settings.agent.host_name = "  ".to_string();
        assert!(settings.validate().is_err());

        let mut settings = HealthSettings::default();
        settings.defaults.failure_threshold = Some(0);
        assert!(settings.validate().is_err());

        let mut settings = HealthSettings::default();
        settings
            .checks
            .insert("route:(".to_string(), HealthCheckConfiguration::default());
        assert!(matches!(settings.validate(), Err(HealthError::InvalidPattern(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[defaults]
interval_ms = 5000
failure_threshold = 2

[checks.context]
enabled = false

[checks."route:*"]
failure_threshold = 5

[agent]
host_name = "orders"
poll_interval_ms = 1000

[[agent.routes]]
id = "orders"

[[agent.routes]]
id = "billing"
auto_startup = false
"#
        )
        .unwrap();

        let settings = HealthSettings::load_from(file.path()).unwrap();
        assert_eq!(settings.defaults.interval_ms, Some(5000));
        assert_eq!(settings.defaults.failure_threshold, Some(2));
        assert_eq!(settings.checks["context"].enabled, Some(false));
        assert_eq!(settings.checks["route:*"].failure_threshold, Some(5));
        assert_eq!(settings.agent.host_name, "orders");
        assert_eq!(settings.agent.poll_interval_ms, 1000);
        assert_eq!(settings.agent.routes.len(), 2);
        assert!(settings.agent.routes[0].auto_startup);
        assert!(!settings.agent.routes[1].auto_startup);
    }

    #[test]
    fn test_load_from_missing_file_fails() {
        assert!(HealthSettings::load_from("/this/path/does/not/exist.toml").is_err());
    }

    #[test]
    fn test_overrides_resolution_order() {
        let mut checks = BTreeMap::new();
        checks.insert(
            "context".to_string(),
            HealthCheckConfiguration::new().with_enabled(false),
        );
        checks.insert(
            "routes.*".to_string(),
            HealthCheckConfiguration::new().with_failure_threshold(7),
        );
        let defaults = HealthCheckConfiguration::new()
            .with_interval(Duration::from_secs(1))
            .with_failure_threshold(2);
        let overrides = CheckOverrides::new(defaults, &checks).unwrap();

        let context = check("context", Some("runtime"));
        let resolved = overrides.resolve(&context);
        assert_eq!(resolved.enabled, Some(false));
        assert_eq!(resolved.failure_threshold, Some(2));
        assert_eq!(resolved.interval_ms, Some(1000));

        let route = check("route:orders", Some("routes"));
        let resolved = overrides.resolve(&route);
        assert_eq!(resolved.failure_threshold, Some(7));
        assert_eq!(resolved.enabled, None);

        let own = check("own", None)
            .with_configuration(HealthCheckConfiguration::new().with_failure_threshold(4));
        overrides.apply(&own);
        assert_eq!(own.configuration().failure_threshold, Some(4));
        assert_eq!(own.configuration().interval_ms, Some(1000));
    }

    #[test]
    fn test_wildcard_and_regex_patterns() {
        let wildcard = compile_pattern("route:*").unwrap();
        assert!(wildcard.is_match("route:orders"));
        assert!(!wildcard.is_match("context"));

        let literal = compile_pattern("runtime.context").unwrap();
        assert!(literal.is_match("runtime.context"));

        let regex = compile_pattern("route:(orders|billing)").unwrap();
        assert!(regex.is_match("route:billing"));
        assert!(!regex.is_match("route:shipping"));
    }

    #[test]
    fn test_to_toml() {
        let mut settings = HealthSettings::default();
        settings.defaults.failure_threshold = Some(2);
        let rendered = settings.to_toml().unwrap();
        assert!(rendered.contains("failure_threshold = 2"));
        assert!(rendered.contains("host_name = \"health-agent\""));
    }
}
