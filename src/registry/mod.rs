//! Explicit plugin table of assistant modules.
//!
//! Optional feature modules (calendar, notes, media, ...) implement
//! [`AssistantModule`] and are registered by name at startup.  The bridge
//! consults the registry before acting on a cross-process command, so a
//! command can only ever name a module that was actually loaded.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ModulesConfig;

/// A feature module the assistant can show and reload.
pub trait AssistantModule: Send + Sync {
    /// Registry key; matched case-insensitively.
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Refresh module state before its view is reloaded.
    fn reload(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Built-in modules
// ---------------------------------------------------------------------------

/// Names of the modules shipped with the runtime.
pub const BUILTIN_MODULES: &[(&str, &str)] = &[
    ("calendar", "Upcoming events"),
    ("markdown", "Notes and documents"),
    ("media", "Playback control"),
    ("utils", "Clock, timers and small helpers"),
];

/// A module whose behaviour lives in the render surface and the request
/// server; the runtime only needs its identity.
#[derive(Debug, Clone)]
pub struct BuiltinModule {
    name: &'static str,
    description: &'static str,
}

impl AssistantModule for BuiltinModule {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }
}

// ---------------------------------------------------------------------------
// ModuleRegistry
// ---------------------------------------------------------------------------

#[derive(Default, Clone)]
pub struct ModuleRegistry {
    modules: HashMap<String, Arc<dyn AssistantModule>>,
    order: Vec<String>,
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.order)
            .finish()
    }
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in modules listed in `config.enabled`.
    /// Unknown names are logged and skipped.
    pub fn with_builtins(config: &ModulesConfig) -> Self {
        let mut registry = Self::new();
        for wanted in &config.enabled {
            match BUILTIN_MODULES
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
            {
                Some(&(name, description)) => {
                    registry.register(Arc::new(BuiltinModule { name, description }))
                }
                None => log::warn!("registry: unknown module `{wanted}` in config, skipped"),
            }
        }
        registry
    }

    /// Add `module`, replacing any module registered under the same name.
    pub fn register(&mut self, module: Arc<dyn AssistantModule>) {
        let key = module.name().to_ascii_lowercase();
        if self.modules.insert(key.clone(), module).is_some() {
            log::warn!("registry: module `{key}` registered twice, keeping the last");
        } else {
            self.order.push(key.clone());
        }
        log::debug!("registry: registered `{key}`");
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn AssistantModule>> {
        self.modules.get(&name.to_ascii_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        reloads: std::sync::atomic::AtomicUsize,
    }

    impl AssistantModule for Counter {
        fn name(&self) -> &str {
            "Counter"
        }

        fn reload(&self) -> anyhow::Result<()> {
            self.reloads.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn builtins_follow_config_order() {
        let registry = ModuleRegistry::with_builtins(&ModulesConfig::default());
        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, vec!["calendar", "markdown", "media", "utils"]);
    }

    #[test]
    fn unknown_config_names_are_skipped() {
        let cfg = ModulesConfig {
            enabled: vec!["Calendar".into(), "weather".into()],
        };
        let registry = ModuleRegistry::with_builtins(&cfg);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("calendar"));
        assert!(!registry.contains("weather"));
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut registry = ModuleRegistry::new();
        registry.register(Arc::new(Counter {
            reloads: Default::default(),
        }));
        assert!(registry.contains("counter"));
        assert!(registry.contains("COUNTER"));
        registry.get("counter").unwrap().reload().unwrap();
    }

    #[test]
    fn re_registering_replaces_without_duplicating() {
        let mut registry = ModuleRegistry::new();
        for _ in 0..2 {
            registry.register(Arc::new(Counter {
                reloads: Default::default(),
            }));
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn empty_registry() {
        let registry = ModuleRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get("calendar").is_none());
    }
}
