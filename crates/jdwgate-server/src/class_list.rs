use std::collections::BTreeSet;

use crate::{
    device::{ClassEntry, ModuleEntry},
    registry::ApplicationRegistry,
};

/// Runtime classes that are always present on the device but never appear in
/// application debug info, as `(package, class)`.
pub const BUILTIN_CLASSES: &[(&str, &str)] = &[
    ("com.rim.resources", "net_rim_rimsecuridlibRIMResources"),
    ("net.rim.device.cldc.impl.softtoken.rimsecuridlib", "RimSecurIDLib"),
    ("net.rim.device.cldc.impl.softtoken.rimsecuridlib", "RimDatabaseFullException"),
    ("net.rim.device.cldc.impl.softtoken.rimsecuridlib", "RimDecryptFailException"),
    ("net.rim.device.cldc.impl.softtoken.rimsecuridlib", "RimDuplicateNameException"),
    ("net.rim.device.cldc.impl.softtoken.rimsecuridlib", "RimDuplicateTokenException"),
    ("net.rim.device.cldc.impl.softtoken.rimsecuridlib", "RimInvalidParamException"),
    ("net.rim.device.cldc.impl.softtoken.rimsecuridlib", "RimSecurIDLib"),
    ("net.rim.device.cldc.impl.softtoken.rimsecuridlib", "RimWrongDeviceIDException"),
    ("net.rim.device.cldc.impl.softtoken.rimsecuridlib", "RimWrongFormFactorException"),
];

/// A class reported to the debugger, with the reference type id it is known
/// by on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleClass {
    pub type_id: u32,
    pub entry: ClassEntry,
}

/// The classes a session reports through `VirtualMachine.AllClasses`.
///
/// Built once per session and never modified afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibleClassList {
    classes: Vec<VisibleClass>,
}

impl VisibleClassList {
    /// Derives the list from the registry, restricted to applications that
    /// still have a module installed. Type ids are assigned from 1 in
    /// registry order; hidden classes do not consume an id.
    pub fn build(
        registry: &ApplicationRegistry,
        installed: &[ModuleEntry],
        include_builtin: bool,
    ) -> Self {
        let live: BTreeSet<u32> = installed.iter().map(|module| module.unique_id).collect();

        let app_classes = registry
            .iter()
            .filter(|(key, _)| live.contains(key))
            .flat_map(|(_, app)| app.classes())
            .filter(|class| !class.is_hidden())
            .cloned();

        let builtin = BUILTIN_CLASSES
            .iter()
            .filter(|_| include_builtin)
            .map(|(package, name)| ClassEntry::new(*package, *name, 0));

        let classes = app_classes
            .chain(builtin)
            .zip(1u32..)
            .map(|(entry, type_id)| VisibleClass { type_id, entry })
            .collect();

        Self { classes }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VisibleClass> {
        self.classes.iter()
    }

    pub fn get(&self, type_id: u32) -> Option<&VisibleClass> {
        let index = usize::try_from(type_id.checked_sub(1)?).ok()?;
        self.classes.get(index)
    }
}
