//! File-backed modules and explicit reloads.
#[cfg(test)]
mod tests {
    use std::{fs, sync::Arc};

    use scriptface::{
        BridgeConfig, BuiltinRegistry, ExportSignature, InterfaceContract, Kind, LoadError,
        ScriptBridge, ScriptSource,
    };

    fn version_contract() -> Arc<InterfaceContract> {
        InterfaceContract::builder("Versioned")
            .implementation("versioned.rhai")
            .export(ExportSignature::new("version").returns(Kind::Int))
            .build()
            .unwrap()
    }

    #[test]
    fn reload_produces_a_new_handle_from_current_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("versioned.rhai");
        fs::write(&path, "fn version() { 1 }").unwrap();

        let config = BridgeConfig::default().with_search_root(dir.path());
        let bridge = ScriptBridge::new(config, BuiltinRegistry::new());
        let first = bridge.load_default(&version_contract()).unwrap();
        assert_eq!(first.source().path(), Some(path.as_path()));
        assert_eq!(first.invoke::<_, i64>("version", ()).unwrap(), 1);

        fs::write(&path, "fn version() { 2 }").unwrap();
        // No implicit invalidation: the loaded handle keeps its code.
        assert_eq!(first.invoke::<_, i64>("version", ()).unwrap(), 1);

        let second = bridge.reload(&first).unwrap();
        assert_eq!(second.invoke::<_, i64>("version", ()).unwrap(), 2);
        assert_eq!(first.invoke::<_, i64>("version", ()).unwrap(), 1);
    }

    #[test]
    fn reload_reports_a_broken_edit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("versioned.rhai");
        fs::write(&path, "fn version() { 1 }").unwrap();

        let bridge = ScriptBridge::new(BridgeConfig::default(), BuiltinRegistry::new());
        let handle = bridge
            .load(&ScriptSource::from_path(&path).unwrap(), &version_contract())
            .unwrap();

        fs::write(&path, "fn revision() { 2 }").unwrap();
        let err = bridge.reload(&handle).unwrap_err();
        assert!(matches!(err, LoadError::Contract(ref e) if e.missing == ["version"]));
        assert_eq!(handle.invoke::<_, i64>("version", ()).unwrap(), 1);
    }

    #[test]
    fn load_location_reads_from_search_roots() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("scripts")).unwrap();
        fs::write(dir.path().join("scripts/v.rhai"), "fn version() { 7 }").unwrap();

        let config = BridgeConfig::default().with_search_root(dir.path());
        let bridge = ScriptBridge::new(config, BuiltinRegistry::new());
        let handle = bridge
            .load_location("scripts/v.rhai", &version_contract())
            .unwrap();
        assert_eq!(handle.invoke::<_, i64>("version", ()).unwrap(), 7);
    }
}
