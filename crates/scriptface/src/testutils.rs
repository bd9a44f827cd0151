//! Test utilities for `scriptface`.
//!
//! Shared fixtures for unit and integration tests: two sample interfaces
//! (a calculator and a record-heavy data processor), the host records they
//! exchange, builtin providers backing them, and the Rhai scripts that
//! implement them. External test crates reach them via
//! `use scriptface::testutils::*`.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use crate::{
    BridgeConfig, BuiltinDescriptor, BuiltinError, BuiltinProvider, BuiltinRegistry, BuiltinResult,
    ConfigError, DecodeError, ExportSignature, InterfaceContract, Kind, Marshal, RecordKind,
    RecordReader, RecordWriter, ScriptBridge, Value,
};

/// Calculator implementation using `Calculator_Builtins`.
pub const CALCULATOR_SCRIPT: &str = include_str!("../tests/fixtures/calculator.rhai");

/// DataProcessor implementation using `DataProcessor_Builtins`.
pub const DATA_PROCESSOR_SCRIPT: &str = include_str!("../tests/fixtures/data_processor.rhai");

/// Directory holding the fixture scripts.
pub fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

/// Postal address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    /// Street line.
    pub street: String,
    /// City.
    pub city: String,
    /// Postal code.
    pub zip_code: String,
}

impl Marshal for Address {
    fn kind() -> Kind {
        RecordKind::new("Address")
            .field("street", Kind::String)
            .field("city", Kind::String)
            .field("zipCode", Kind::String)
            .build()
    }

    fn encode(&self) -> Result<Value, DecodeError> {
        RecordWriter::new()
            .field("street", &self.street)?
            .field("city", &self.city)?
            .field("zipCode", &self.zip_code)?
            .finish()
    }

    fn decode(value: &Value) -> Result<Self, DecodeError> {
        let r = RecordReader::new(value, "Address")?;
        Ok(Self {
            street: r.required("street")?,
            city: r.required("city")?,
            zip_code: r.required("zipCode")?,
        })
    }
}

/// A person with an optional address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Person {
    /// Display name.
    pub name: String,
    /// Age in years.
    pub age: i64,
    /// Home address.
    pub address: Option<Address>,
}

impl Marshal for Person {
    fn kind() -> Kind {
        RecordKind::new("Person")
            .field("name", Kind::String)
            .field("age", Kind::Int)
            .optional("address", Address::kind())
            .build()
    }

    fn encode(&self) -> Result<Value, DecodeError> {
        RecordWriter::new()
            .field("name", &self.name)?
            .field("age", &self.age)?
            .field("address", &self.address)?
            .finish()
    }

    fn decode(value: &Value) -> Result<Self, DecodeError> {
        let r = RecordReader::new(value, "Person")?;
        Ok(Self {
            name: r.required("name")?,
            age: r.required("age")?,
            address: r.optional("address")?,
        })
    }
}

/// Outcome of processing a person.
#[derive(Debug, Clone, PartialEq)]
pub struct CalculationResult {
    /// Computed score.
    pub value: f64,
    /// Human-readable summary.
    pub message: String,
    /// Processing time, when the script records one.
    pub timestamp: Option<String>,
    /// Outcome tags.
    pub tags: Vec<String>,
}

impl Marshal for CalculationResult {
    fn kind() -> Kind {
        RecordKind::new("CalculationResult")
            .field("value", Kind::Float)
            .field("message", Kind::String)
            .optional("timestamp", Kind::String)
            .field("tags", Kind::seq(Kind::String))
            .build()
    }

    fn encode(&self) -> Result<Value, DecodeError> {
        RecordWriter::new()
            .field("value", &self.value)?
            .field("message", &self.message)?
            .field("timestamp", &self.timestamp)?
            .field("tags", &self.tags)?
            .finish()
    }

    fn decode(value: &Value) -> Result<Self, DecodeError> {
        let r = RecordReader::new(value, "CalculationResult")?;
        Ok(Self {
            value: r.required("value")?,
            message: r.required("message")?,
            timestamp: r.optional("timestamp")?,
            tags: r.required("tags")?,
        })
    }
}

/// Builtins for the DataProcessor interface. Records every call so tests
/// can check ordering.
#[derive(Debug, Default)]
pub struct DataProcessorBuiltins {
    calls: Mutex<Vec<String>>,
}

impl DataProcessorBuiltins {
    /// Calls made so far, as `builtin:argument` entries.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, builtin: &str, detail: &str) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(format!("{builtin}:{detail}"));
    }
}

impl BuiltinProvider for DataProcessorBuiltins {
    fn namespace(&self) -> &str {
        "DataProcessor_Builtins"
    }

    fn builtins(self: Arc<Self>) -> Vec<BuiltinDescriptor> {
        let validate = self.clone();
        let create = self.clone();
        let formatter = self;
        vec![
            BuiltinDescriptor::typed(
                "validatePerson",
                &["person"],
                move |person: Option<Person>| -> BuiltinResult<bool> {
                    let name = person.as_ref().map(|p| p.name.as_str()).unwrap_or("");
                    validate.record("validatePerson", name);
                    Ok(person.is_some_and(|p| !p.name.is_empty() && p.age > 0))
                },
            ),
            BuiltinDescriptor::typed(
                "createAddress",
                &["street", "city", "zipCode"],
                move |street: String, city: String, zip_code: String| -> BuiltinResult<Address> {
                    create.record("createAddress", &street);
                    Ok(Address {
                        street,
                        city,
                        zip_code,
                    })
                },
            ),
            BuiltinDescriptor::typed(
                "formatAddress",
                &["person"],
                move |person: Option<Person>| -> BuiltinResult<String> {
                    let name = person.as_ref().map(|p| p.name.as_str()).unwrap_or("");
                    formatter.record("formatAddress", name);
                    Ok(match person.and_then(|p| p.address) {
                        Some(a) => format!("{}, {} {}", a.street, a.city, a.zip_code),
                        None => "No address".to_string(),
                    })
                },
            ),
        ]
    }
}

/// Builtins for the Calculator interfaces.
#[derive(Debug, Default)]
pub struct CalculatorBuiltins;

impl BuiltinProvider for CalculatorBuiltins {
    fn namespace(&self) -> &str {
        "Calculator_Builtins"
    }

    fn builtins(self: Arc<Self>) -> Vec<BuiltinDescriptor> {
        vec![
            BuiltinDescriptor::typed("hostMultiply", &["a", "b"], |a: i64, b: i64| {
                a.checked_mul(b)
                    .ok_or_else(|| BuiltinError::failed("integer overflow"))
            }),
            BuiltinDescriptor::typed("checkedDivide", &["a", "b"], |a: f64, b: f64| {
                if b == 0.0 {
                    Err(BuiltinError::failed("Division by zero"))
                } else {
                    Ok(a / b)
                }
            }),
        ]
    }
}

/// `add`, `multiply` and `divide`, with builtins and a default
/// implementation at `calculator.rhai`.
pub fn calculator_contract() -> Result<Arc<InterfaceContract>, ConfigError> {
    InterfaceContract::builder("Calculator")
        .with_builtins()
        .implementation("calculator.rhai")
        .export(
            ExportSignature::new("add")
                .param("a", Kind::Int)
                .param("b", Kind::Int)
                .returns(Kind::Int),
        )
        .export(
            ExportSignature::new("multiply")
                .param("a", Kind::Int)
                .param("b", Kind::Int)
                .returns(Kind::Int),
        )
        .export(
            ExportSignature::new("divide")
                .param("a", Kind::Float)
                .param("b", Kind::Float)
                .returns(Kind::Float),
        )
        .build()
}

/// `safeDivide`, which catches builtin failures inside the script.
pub fn checked_calculator_contract() -> Result<Arc<InterfaceContract>, ConfigError> {
    InterfaceContract::builder("CheckedCalculator")
        .builtins("Calculator_Builtins")
        .export(
            ExportSignature::new("safeDivide")
                .param("a", Kind::Float)
                .param("b", Kind::Float)
                .returns(Kind::Float),
        )
        .build()
}

/// `createPerson` and `processPerson` over host records.
pub fn data_processor_contract() -> Result<Arc<InterfaceContract>, ConfigError> {
    InterfaceContract::builder("DataProcessor")
        .with_builtins()
        .export(
            ExportSignature::new("processPerson")
                .param("person", Person::kind())
                .returns(CalculationResult::kind()),
        )
        .export(
            ExportSignature::new("createPerson")
                .param("name", Kind::String)
                .param("age", Kind::Int)
                .param("street", Kind::String)
                .param("city", Kind::String)
                .param("zipCode", Kind::String)
                .returns(Person::kind()),
        )
        .build()
}

/// A registry holding both sample providers.
pub fn registry(data: Arc<DataProcessorBuiltins>) -> Result<BuiltinRegistry, ConfigError> {
    let mut registry = BuiltinRegistry::new();
    registry.register_provider(Arc::new(CalculatorBuiltins))?;
    registry.register_provider(data)?;
    Ok(registry)
}

/// A bridge over the sample registry with the given configuration.
pub fn bridge_with(
    config: BridgeConfig,
    data: Arc<DataProcessorBuiltins>,
) -> Result<ScriptBridge, ConfigError> {
    Ok(ScriptBridge::new(config, registry(data)?))
}

/// A bridge over the sample registry with default configuration.
pub fn bridge() -> Result<ScriptBridge, ConfigError> {
    bridge_with(BridgeConfig::default(), Arc::default())
}
