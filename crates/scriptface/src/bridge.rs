use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::info;

use crate::{
    builtins::{BuiltinNamespace, BuiltinRegistry},
    config::BridgeConfig,
    contract::InterfaceContract,
    declarations,
    error::{ConfigError, LoadError},
    handle::ModuleHandle,
    loader::ModuleLoader,
    source::ScriptSource,
};

/// Host entry point tying a configured builtin registry to a module loader.
///
/// The bridge holds no loaded modules; every load returns a fresh handle
/// owned by the caller.
#[derive(Debug)]
pub struct ScriptBridge {
    loader: ModuleLoader,
    registry: BuiltinRegistry,
}

impl ScriptBridge {
    /// Create a bridge over a fully configured registry.
    pub fn new(config: BridgeConfig, registry: BuiltinRegistry) -> Self {
        Self {
            loader: ModuleLoader::new(config),
            registry,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &BridgeConfig {
        self.loader.config()
    }

    /// The builtin registry backing this bridge.
    pub fn registry(&self) -> &BuiltinRegistry {
        &self.registry
    }

    /// Load `source` as an implementation of `contract`, binding the
    /// contract's builtin namespace.
    pub fn load(
        &self,
        source: &ScriptSource,
        contract: &Arc<InterfaceContract>,
    ) -> Result<ModuleHandle, LoadError> {
        let namespace = contract
            .namespace()
            .map(|name| self.registry.bind(name))
            .transpose()?;
        self.loader.load(source, contract, namespace)
    }

    /// Resolve `location` against the working directory and search roots,
    /// then load it.
    pub fn load_location(
        &self,
        location: &str,
        contract: &Arc<InterfaceContract>,
    ) -> Result<ModuleHandle, LoadError> {
        let source = ScriptSource::locate(location, &self.config().search_roots)?;
        self.load(&source, contract)
    }

    /// Load the default implementation declared by `contract`.
    pub fn load_default(
        &self,
        contract: &Arc<InterfaceContract>,
    ) -> Result<ModuleHandle, LoadError> {
        let location = contract
            .default_location()
            .ok_or_else(|| ConfigError::NoDefaultImplementation(contract.name().to_string()))?;
        self.load_location(location, contract)
    }

    /// Re-read the handle's source and load it again as a new handle.
    ///
    /// The existing handle is left untouched.
    pub fn reload(&self, handle: &ModuleHandle) -> Result<ModuleHandle, LoadError> {
        let source = handle.source().reload()?;
        info!(module = source.id(), "reloading script module");
        self.load(&source, handle.contract())
    }

    /// Declaration text for `contract` and its registered namespace.
    pub fn declarations(&self, contract: &InterfaceContract) -> String {
        declarations::render(contract, self.namespace_for(contract))
    }

    /// Write the declaration file for `contract` into `dir`.
    pub fn write_declarations(
        &self,
        dir: impl AsRef<Path>,
        contract: &InterfaceContract,
    ) -> io::Result<PathBuf> {
        declarations::write(dir, contract, self.namespace_for(contract))
    }

    fn namespace_for(&self, contract: &InterfaceContract) -> Option<&BuiltinNamespace> {
        contract
            .namespace()
            .and_then(|name| self.registry.namespace(name))
            .map(Arc::as_ref)
    }
}
