use std::collections::BTreeMap;

use thiserror::Error;

use crate::device::{ClassEntry, DebugSymbols, ModuleDebugInfo, ModuleEntry};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error(
        "module debug info for application {key:#x} reports identity {incoming:#x}, \
         expected {existing:#x}; its classes were not merged"
    )]
    ConflictingIdentity { key: u32, existing: u32, incoming: u32 },
}

/// One logical application, merged from all of its modules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationInfo {
    identity: Option<u32>,
    name: String,
    classes: Vec<ClassEntry>,
}

impl ApplicationInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the module's classes in order. The first load also fixes the
    /// application's identity and name.
    pub fn load(&mut self, module: &ModuleDebugInfo) {
        if self.identity.is_none() {
            self.identity = Some(module.unique_id);
            self.name = module.app_name.clone();
        }
        self.classes.extend(module.classes.iter().cloned());
    }

    pub fn identity(&self) -> Option<u32> {
        self.identity
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn classes(&self) -> &[ClassEntry] {
        &self.classes
    }
}

/// Applications keyed by the identity the device reports for their modules.
///
/// Iteration is in ascending key order, which fixes the numbering of the
/// visible class list.
#[derive(Debug, Clone, Default)]
pub struct ApplicationRegistry {
    apps: BTreeMap<u32, ApplicationInfo>,
}

impl ApplicationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registry for the modules currently installed on the device.
    ///
    /// Modules without host debug info are skipped. Conflicts are returned
    /// alongside the registry instead of aborting the build.
    pub fn collect(
        modules: &[ModuleEntry],
        symbols: &dyn DebugSymbols,
    ) -> (Self, Vec<RegistryError>) {
        let mut registry = Self::new();
        let mut conflicts = Vec::new();
        for module in modules {
            let Some(info) = symbols.lookup(module.unique_id, &module.name) else {
                tracing::debug!(
                    target: "jdwgate.registry",
                    module = %module.name,
                    unique_id = module.unique_id,
                    "no debug info for module"
                );
                continue;
            };
            if let Err(err) = registry.merge(module.unique_id, &info) {
                tracing::warn!(target: "jdwgate.registry", error = %err, "registry conflict");
                conflicts.push(err);
            }
        }
        (registry, conflicts)
    }

    /// Inserts or merges `module` under `key`.
    ///
    /// A module whose debug info reports a different identity than the
    /// application already stored under `key` is rejected; the stored entry
    /// stays unchanged.
    pub fn merge(&mut self, key: u32, module: &ModuleDebugInfo) -> Result<(), RegistryError> {
        let app = self.apps.entry(key).or_default();
        match app.identity() {
            Some(existing) if existing != module.unique_id => {
                Err(RegistryError::ConflictingIdentity {
                    key,
                    existing,
                    incoming: module.unique_id,
                })
            }
            _ => {
                app.load(module);
                Ok(())
            }
        }
    }

    pub fn get(&self, key: u32) -> Option<&ApplicationInfo> {
        self.apps.get(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &ApplicationInfo)> {
        self.apps.iter().map(|(key, app)| (*key, app))
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}
