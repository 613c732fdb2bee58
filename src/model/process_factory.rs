//! Process factory with static and dynamic registration.
//!
//! The factory maps process class names and their aliases to
//! [`ProcessWrapperFactory`] instances. Built-in processes are registered at
//! construction; further factories are registered explicitly or discovered
//! by scanning a plugin directory for shared libraries exporting
//! [`PLUGIN_ENTRY_SYMBOL`]. The scan runs once, on first use.
//!
//! Processes created from a plugin must be dropped before the factory that
//! loaded the plugin.

use crate::model::process::Process;
use crate::model::processes::BuiltinProcessType;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, RwLock};

/// Name of the constructor every process plugin exports.
///
/// Signature: `extern "C" fn() -> *mut Box<dyn ProcessWrapperFactory>`.
pub const PLUGIN_ENTRY_SYMBOL: &[u8] = b"lumass_create_wrapper_factory";

/// Constructor of one process type.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessWrapperFactory: Send + Sync {
    fn create_wrapper(&self) -> Box<dyn Process>;

    fn is_sink_process(&self) -> bool;

    fn wrapper_class_name(&self) -> String;

    /// User-facing name, if different from the class name.
    fn alias(&self) -> Option<String> {
        None
    }
}

/// Factory for a process type compiled into the crate.
struct BuiltinWrapperFactory(BuiltinProcessType);

impl ProcessWrapperFactory for BuiltinWrapperFactory {
    fn create_wrapper(&self) -> Box<dyn Process> {
        self.0.create()
    }

    fn is_sink_process(&self) -> bool {
        self.0.is_sink()
    }

    fn wrapper_class_name(&self) -> String {
        self.0.class_name().to_string()
    }

    fn alias(&self) -> Option<String> {
        Some(self.0.alias().to_string())
    }
}

#[derive(Default)]
struct Registry {
    factories: HashMap<String, Arc<dyn ProcessWrapperFactory>>,
    /// alias → class name
    aliases: HashMap<String, String>,
    /// Class names and aliases of sink processes.
    sinks: Vec<String>,
    // Dropped after `factories`.
    #[cfg(feature = "plugins")]
    libraries: Vec<libloading::Library>,
}

/// Registry `class name | alias → process constructor`.
pub struct ProcessFactory {
    registry: RwLock<Registry>,
    plugin_dir: Option<PathBuf>,
    scanned: OnceLock<usize>,
}

impl ProcessFactory {
    /// An empty factory without plugin directory.
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            plugin_dir: None,
            scanned: OnceLock::new(),
        }
    }

    /// A factory with all built-in process types registered.
    pub fn with_builtins() -> Self {
        let factory = Self::new();
        for ty in BuiltinProcessType::all() {
            factory.register(Box::new(BuiltinWrapperFactory(*ty)));
        }
        factory
    }

    /// Scan `dir` for plugins on first use.
    pub fn with_plugin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugin_dir = Some(dir.into());
        self
    }

    /// The process-wide factory: built-ins plus the default plugin directory.
    pub fn global() -> Arc<ProcessFactory> {
        static GLOBAL: OnceLock<Arc<ProcessFactory>> = OnceLock::new();
        GLOBAL
            .get_or_init(|| {
                let mut factory = ProcessFactory::with_builtins();
                factory.plugin_dir = crate::config::default_plugin_dir();
                Arc::new(factory)
            })
            .clone()
    }

    pub fn plugin_dir(&self) -> Option<&Path> {
        self.plugin_dir.as_deref()
    }

    /// Register a process type. A class registered twice is replaced.
    pub fn register(&self, factory: Box<dyn ProcessWrapperFactory>) {
        let class = factory.wrapper_class_name();
        let alias = factory.alias().filter(|a| !a.is_empty() && *a != class);
        let sink = factory.is_sink_process();

        let Ok(mut registry) = self.registry.write() else {
            tracing::error!("Process registry poisoned, dropping '{}'", class);
            return;
        };
        if registry.factories.contains_key(&class) {
            tracing::warn!("Process type '{}' registered twice, replacing", class);
            let stale: Vec<String> = registry
                .aliases
                .iter()
                .filter(|(_, c)| **c == class)
                .map(|(a, _)| a.clone())
                .collect();
            for old in &stale {
                registry.aliases.remove(old);
            }
            registry
                .sinks
                .retain(|s| *s != class && !stale.contains(s));
        }
        if sink {
            registry.sinks.push(class.clone());
        }
        if let Some(alias) = alias {
            if sink {
                registry.sinks.push(alias.clone());
            }
            registry.aliases.insert(alias, class.clone());
        }
        tracing::debug!("Registered process type '{}'", class);
        registry.factories.insert(class, Arc::from(factory));
    }

    /// Create a process by class name or alias. `None` for unknown types.
    pub fn create_process(&self, name: &str) -> Option<Box<dyn Process>> {
        self.ensure_scanned();
        let factory = {
            let registry = self.registry.read().ok()?;
            let class = registry
                .aliases
                .get(name)
                .map(String::as_str)
                .unwrap_or(name);
            registry.factories.get(class).cloned()
        };
        let Some(factory) = factory else {
            tracing::debug!("No process type registered as '{}'", name);
            return None;
        };
        let mut process = factory.create_wrapper();
        process.state_mut().set_sink(factory.is_sink_process());
        Some(process)
    }

    /// Create a process by alias only.
    pub fn create_process_from_alias(&self, alias: &str) -> Option<Box<dyn Process>> {
        let class = self.class_for_alias(alias)?;
        self.create_process(&class)
    }

    pub fn class_for_alias(&self, alias: &str) -> Option<String> {
        self.ensure_scanned();
        let registry = self.registry.read().ok()?;
        registry.aliases.get(alias).cloned()
    }

    pub fn alias_for_class(&self, class: &str) -> Option<String> {
        self.ensure_scanned();
        let registry = self.registry.read().ok()?;
        registry
            .aliases
            .iter()
            .find(|(_, c)| c.as_str() == class)
            .map(|(a, _)| a.clone())
    }

    /// True if `name` starts with the class name or alias of a sink process.
    pub fn is_sink(&self, name: &str) -> bool {
        self.ensure_scanned();
        self.registry
            .read()
            .map(|r| r.sinks.iter().any(|s| name.starts_with(s.as_str())))
            .unwrap_or(false)
    }

    /// Sorted catalogue of user-facing process names.
    pub fn registered_processes(&self) -> Vec<String> {
        self.ensure_scanned();
        let Ok(registry) = self.registry.read() else {
            return Vec::new();
        };
        let mut names: Vec<String> = registry
            .factories
            .keys()
            .map(|class| {
                registry
                    .aliases
                    .iter()
                    .find(|(_, c)| *c == class)
                    .map(|(a, _)| a.clone())
                    .unwrap_or_else(|| class.clone())
            })
            .collect();
        names.sort();
        names
    }

    /// Number of plugins loaded by the directory scan.
    pub fn loaded_plugins(&self) -> usize {
        self.ensure_scanned()
    }

    fn ensure_scanned(&self) -> usize {
        *self.scanned.get_or_init(|| match &self.plugin_dir {
            Some(dir) => self.scan_plugin_dir(dir),
            None => 0,
        })
    }

    #[cfg(feature = "plugins")]
    fn scan_plugin_dir(&self, dir: &Path) -> usize {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!("Plugin directory '{}' not scanned: {}", dir.display(), e);
                return 0;
            }
        };

        let mut loaded = 0;
        for path in entries.filter_map(|e| e.ok()).map(|e| e.path()) {
            let is_library = path
                .extension()
                .map(|ext| ext == std::env::consts::DLL_EXTENSION)
                .unwrap_or(false);
            if !is_library {
                continue;
            }
            match self.load_plugin(&path) {
                Ok(class) => {
                    tracing::info!("Loaded process plugin '{}' from {}", class, path.display());
                    loaded += 1;
                }
                Err(e) => tracing::warn!("Skipping plugin {}: {}", path.display(), e),
            }
        }
        loaded
    }

    #[cfg(not(feature = "plugins"))]
    fn scan_plugin_dir(&self, dir: &Path) -> usize {
        tracing::warn!(
            "Dynamic process loading is unavailable; ignoring plugin directory '{}'",
            dir.display()
        );
        0
    }

    #[cfg(feature = "plugins")]
    fn load_plugin(&self, path: &Path) -> crate::error::Result<String> {
        use crate::error::LumassError;

        type EntryPoint = unsafe extern "C" fn() -> *mut Box<dyn ProcessWrapperFactory>;

        // SAFETY: loading runs the library's initialisers; plugins are trusted
        // code built with the same toolchain as the host.
        let library = unsafe { libloading::Library::new(path) }
            .map_err(|e| LumassError::Plugin(e.to_string()))?;
        let factory = unsafe {
            let entry: libloading::Symbol<EntryPoint> = library
                .get(PLUGIN_ENTRY_SYMBOL)
                .map_err(|e| LumassError::Plugin(e.to_string()))?;
            let raw = entry();
            if raw.is_null() {
                return Err(LumassError::Plugin(
                    "entry point returned no factory".to_string(),
                ));
            }
            // SAFETY: ownership of the boxed factory passes to the host.
            *Box::from_raw(raw)
        };

        let class = factory.wrapper_class_name();
        self.register(factory);
        self.registry
            .write()
            .map_err(|_| LumassError::Plugin("process registry poisoned".to_string()))?
            .libraries
            .push(library);
        Ok(class)
    }
}

impl Default for ProcessFactory {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for ProcessFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.registry.read().map(|r| r.factories.len()).unwrap_or(0);
        f.debug_struct("ProcessFactory")
            .field("registered", &count)
            .field("plugin_dir", &self.plugin_dir)
            .finish()
    }
}
