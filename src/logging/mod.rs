//! Structured logging setup: tracing filter directives and request-id
//! generation for the request pipeline.

pub mod middleware;

pub use middleware::generate_request_id;

use crate::config::LoggingConfig;

/// Build a tracing filter string like `"info,tokencap::adapter=debug"` from
/// the configured base level plus any per-component overrides.
pub fn build_filter_directives(config: &LoggingConfig) -> String {
    let mut directives = vec![config.level.clone()];
    if let Some(component_levels) = &config.component_levels {
        let mut components: Vec<_> = component_levels.iter().collect();
        components.sort_by_key(|(name, _)| name.clone());
        for (component, level) in components {
            directives.push(format!("tokencap::{component}={level}"));
        }
    }
    directives.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn base_level_only() {
        let config = LoggingConfig {
            level: "info".to_string(),
            ..Default::default()
        };
        assert_eq!(build_filter_directives(&config), "info");
    }

    #[test]
    fn component_overrides_are_appended_sorted() {
        let mut component_levels = HashMap::new();
        component_levels.insert("adapter".to_string(), "debug".to_string());
        component_levels.insert("budget".to_string(), "trace".to_string());
        let config = LoggingConfig {
            level: "warn".to_string(),
            component_levels: Some(component_levels),
            ..Default::default()
        };
        assert_eq!(
            build_filter_directives(&config),
            "warn,tokencap::adapter=debug,tokencap::budget=trace"
        );
    }
}
