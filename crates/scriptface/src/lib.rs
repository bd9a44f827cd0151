#![warn(missing_docs)]

//! # scriptface
//!
//! Typed host interfaces implemented by Rhai script modules.
//!
//! ## Overview
//!
//! The host declares an [`InterfaceContract`]: the functions a script module
//! must export and the kinds of their arguments and results. A
//! [`ScriptBridge`] loads a script, checks it against the contract and
//! returns a [`ModuleHandle`] through which the exports are invoked with
//! ordinary Rust values. Scripts reach host functionality through a builtin
//! namespace registered ahead of time in a [`BuiltinRegistry`].
//!
//! ## Features
//!
//! - **Kind-directed marshalling**: values cross the boundary as [`Value`]
//!   and are checked against a declared [`Kind`], so decode failures name the
//!   exact field that broke
//! - **Load-time contract checks**: missing exports and arity mismatches are
//!   reported before a handle exists
//! - **Typed errors**: script exceptions, decode failures, timeouts and
//!   runtime faults are distinct [`InvocationError`] variants
//! - **Declaration files**: [`declarations`] renders the builtins and
//!   required exports for script authors
//!
//! ## Example
//!
//! ```
//! use scriptface::{
//!     BridgeConfig, BuiltinRegistry, ExportSignature, InterfaceContract, Kind, ScriptBridge,
//!     ScriptSource,
//! };
//!
//! let contract = InterfaceContract::builder("Greeter")
//!     .export(ExportSignature::new("greet").param("name", Kind::String).returns(Kind::String))
//!     .build()
//!     .unwrap();
//! let bridge = ScriptBridge::new(BridgeConfig::default(), BuiltinRegistry::new());
//! let source = ScriptSource::inline("greeter", r#"fn greet(name) { "hello " + name }"#);
//! let handle = bridge.load(&source, &contract).unwrap();
//! let greeting: String = handle.invoke("greet", ("world".to_string(),)).unwrap();
//! assert_eq!(greeting, "hello world");
//! ```

/// Host-side facade over registry and loader.
mod bridge;
/// Builtin descriptors, providers and the registry.
mod builtins;
/// Engine limits and search roots.
mod config;
/// Interface contracts and export signatures.
mod contract;
/// Rhai engine construction.
mod engine;
/// Error types.
mod error;
/// Module handles and invocation.
mod handle;
/// Boundary kinds and record schemas.
mod kind;
/// Script compilation and contract checking.
mod loader;
/// Host and script value conversion.
mod marshal;
/// Script sources.
mod source;
/// The marshalled value union.
mod value;

pub mod declarations;
pub mod testutils;

pub use bridge::ScriptBridge;
pub use builtins::{
    BoundNamespace, BuiltinDescriptor, BuiltinFn, BuiltinNamespace, BuiltinProvider,
    BuiltinRegistry, HostFn,
};
pub use config::BridgeConfig;
pub use contract::{ContractBuilder, ExportSignature, InterfaceContract, Param, default_namespace};
pub use error::{
    ArityMismatch, BuiltinError, BuiltinResult, ConfigError, ContractError, DecodeError,
    DecodeReason, DecodeStage, ErrorInfo, InvocationError, InvocationErrorKind, LoadError,
    PathSegment,
};
pub use handle::{IntoArgs, ModuleHandle};
pub use kind::{Field, Kind, MAX_SAFE_INTEGER, RecordKind};
pub use loader::ModuleLoader;
pub use marshal::{Marshal, RecordReader, RecordWriter, decode, encode, from_dynamic, to_dynamic};
pub use source::ScriptSource;
pub use value::Value;
