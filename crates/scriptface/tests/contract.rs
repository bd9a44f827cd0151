//! Load-time failures: no handle is produced for a script that does not
//! satisfy its contract or cannot be compiled and initialized.
#[cfg(test)]
mod tests {
    use scriptface::{
        BridgeConfig, BuiltinRegistry, ConfigError, LoadError, ScriptBridge, ScriptSource,
        testutils::{bridge, calculator_contract, data_processor_contract},
    };

    fn load_calculator(script: &str) -> Result<scriptface::ModuleHandle, LoadError> {
        bridge()
            .unwrap()
            .load(&ScriptSource::inline("calc", script), &calculator_contract().unwrap())
    }

    #[test]
    fn missing_exports_are_named_exactly() {
        let err = load_calculator("fn add(a, b) { a + b }").unwrap_err();
        match err {
            LoadError::Contract(err) => {
                assert_eq!(err.interface, "Calculator");
                assert_eq!(err.module, "calc");
                assert_eq!(err.missing, ["multiply", "divide"]);
                assert!(err.arity.is_empty());
                assert!(err.to_string().contains("missing exports [multiply, divide]"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn arity_mismatch_is_a_contract_error() {
        let err = load_calculator(
            r#"
            fn add(a, b, c) { a + b + c }
            fn multiply(a, b) { a * b }
            fn divide(a, b) { a / b }
            "#,
        )
        .unwrap_err();
        match err {
            LoadError::Contract(err) => {
                assert!(err.missing.is_empty());
                assert_eq!(err.arity.len(), 1);
                assert_eq!(err.arity[0].export, "add");
                assert_eq!(err.arity[0].expected, 2);
                assert_eq!(err.arity[0].found, [3]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn private_functions_do_not_satisfy_the_contract() {
        let err = load_calculator(
            r#"
            fn add(a, b) { a + b }
            fn multiply(a, b) { a * b }
            private fn divide(a, b) { a / b }
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, LoadError::Contract(ref e) if e.missing == ["divide"]));
    }

    #[test]
    fn parse_errors_carry_the_source_id() {
        let err = load_calculator("fn add(a, b) { a + }").unwrap_err();
        match err {
            LoadError::Parse { id, .. } => assert_eq!(id, "calc"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn undefined_variables_are_rejected_at_compile_time() {
        let err = load_calculator(
            r#"
            fn add(a, b) { a + c }
            fn multiply(a, b) { a * b }
            fn divide(a, b) { a / b }
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, LoadError::Parse { .. }));
    }

    #[test]
    fn initialization_failure_is_reported() {
        let err = load_calculator(
            r#"
            fn add(a, b) { a + b }
            fn multiply(a, b) { a * b }
            fn divide(a, b) { a / b }
            throw "not ready";
            "#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            LoadError::Initialization { ref message, .. } if message.contains("not ready")
        ));
    }

    #[test]
    fn unregistered_namespace_is_a_config_error() {
        let bridge = ScriptBridge::new(BridgeConfig::default(), BuiltinRegistry::new());
        let err = bridge
            .load(
                &ScriptSource::inline("dp", "fn processPerson(p) { p }"),
                &data_processor_contract().unwrap(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            LoadError::Config(ConfigError::UnknownNamespace(ref ns)) if ns == "DataProcessor_Builtins"
        ));
    }

    #[test]
    fn load_default_without_location_fails() {
        let contract = data_processor_contract().unwrap();
        let err = bridge().unwrap().load_default(&contract).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Config(ConfigError::NoDefaultImplementation(_))
        ));
    }

    #[test]
    fn missing_default_implementation_file_is_an_io_error() {
        let err = bridge()
            .unwrap()
            .load_default(&calculator_contract().unwrap())
            .unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
