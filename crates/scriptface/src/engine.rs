use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use rhai::{
    Engine,
    default_limits::MAX_STRINGS_INTERNED,
    packages::{Package, StandardPackage},
};
use tracing::{debug, info};

use crate::{builtins::BoundNamespace, config::BridgeConfig};

/// Wall-clock deadline shared between a handle and its engine's progress hook.
#[derive(Debug, Clone, Default)]
pub(crate) struct Deadline(Arc<Mutex<Option<Instant>>>);

impl Deadline {
    pub(crate) fn arm(&self, timeout: Duration) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now() + timeout);
    }

    pub(crate) fn disarm(&self) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn expired(&self) -> bool {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some_and(|deadline| Instant::now() > deadline)
    }
}

/// Build the engine backing one module handle.
pub(crate) fn build_engine(
    config: &BridgeConfig,
    module_id: &str,
    namespace: Option<&BoundNamespace>,
    deadline: Deadline,
) -> Engine {
    let mut engine = Engine::new_raw();
    engine.register_global_module(StandardPackage::new().as_shared_module());

    engine.set_max_strings_interned(MAX_STRINGS_INTERNED);
    engine.set_strict_variables(true);
    engine.set_fail_on_invalid_map_property(true);

    engine.set_max_operations(config.max_operations);
    engine.set_max_call_levels(config.max_call_levels);
    engine.set_max_expr_depths(config.max_expr_depth, config.max_function_expr_depth);
    engine.set_max_string_size(config.max_string_size);
    engine.set_max_array_size(config.max_array_size);
    engine.set_max_map_size(config.max_map_size);
    engine.set_max_variables(config.max_variables);
    engine.set_max_functions(config.max_functions);
    engine.set_max_modules(config.max_modules);

    if let Some(namespace) = namespace {
        engine.register_static_module(namespace.name(), namespace.module());
    }

    let print_id = module_id.to_string();
    engine.on_print(move |text| {
        info!(target: "scriptface::script", module = %print_id, "{text}");
    });
    let debug_id = module_id.to_string();
    engine.on_debug(move |text, source, pos| {
        debug!(
            target: "scriptface::script",
            module = %debug_id,
            source = source.unwrap_or_default(),
            line = pos.line().unwrap_or(0),
            "{text}"
        );
    });

    engine.on_progress(move |_| {
        if deadline.expired() {
            Some("deadline exceeded".into())
        } else {
            None
        }
    });

    engine
}
