//! Script-author facing declaration files.
//!
//! A declaration file describes the record types crossing the boundary, the
//! builtins available under the injected namespace and the functions a
//! module must export. It is documentation for script authors and is never
//! parsed back.

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::debug;

use crate::{
    builtins::BuiltinNamespace,
    contract::{InterfaceContract, Param, default_namespace},
    kind::{Kind, RecordKind, collect_records},
};

/// Render the declaration text for `contract` and its builtin namespace.
pub fn render(contract: &InterfaceContract, namespace: Option<&BuiltinNamespace>) -> String {
    let mut records = contract.records();
    if let Some(namespace) = namespace {
        for builtin in namespace.builtins() {
            for param in builtin.params() {
                collect_records(&param.kind, &mut records);
            }
            collect_records(builtin.returns(), &mut records);
        }
    }

    Declarations {
        contract,
        namespace,
        records,
    }
    .to_string()
}

/// One declaration file, rendered through [`fmt::Display`].
struct Declarations<'a> {
    contract: &'a InterfaceContract,
    namespace: Option<&'a BuiltinNamespace>,
    records: Vec<Arc<RecordKind>>,
}

impl fmt::Display for Declarations<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "// Declarations for interface {}.", self.contract.name())?;
        writeln!(f, "// Generated file; edits are overwritten.")?;

        for record in &self.records {
            writeln!(f)?;
            write_record(f, record)?;
        }

        if let Some(namespace) = self.namespace {
            writeln!(f)?;
            writeln!(f, "module {} {{", namespace.name())?;
            for builtin in namespace.builtins() {
                writeln!(
                    f,
                    "    fn {}({}) -> {};",
                    builtin.name(),
                    render_params(builtin.params()),
                    builtin.returns()
                )?;
            }
            writeln!(f, "}}")?;
        }

        writeln!(f)?;
        writeln!(f, "interface {} {{", self.contract.name())?;
        for export in self.contract.exports() {
            writeln!(
                f,
                "    fn {}({}) -> {};",
                export.name,
                render_params(&export.params),
                export.returns
            )?;
        }
        writeln!(f, "}}")
    }
}

/// Write the declaration file for `contract` into `dir`, returning its path.
///
/// The file is named after the builtin namespace, `<Namespace>.d.rhai`.
pub fn write(
    dir: impl AsRef<Path>,
    contract: &InterfaceContract,
    namespace: Option<&BuiltinNamespace>,
) -> io::Result<PathBuf> {
    let name = contract
        .namespace()
        .map(str::to_string)
        .unwrap_or_else(|| default_namespace(contract.name()));
    let path = dir.as_ref().join(format!("{name}.d.rhai"));
    fs::create_dir_all(dir.as_ref())?;
    fs::write(&path, render(contract, namespace))?;
    debug!(path = %path.display(), interface = contract.name(), "wrote declarations");
    Ok(path)
}

fn write_record(f: &mut fmt::Formatter<'_>, record: &RecordKind) -> fmt::Result {
    writeln!(f, "record {} {{", record.name)?;
    for field in &record.fields {
        writeln!(f, "    {}: {},", field.name, field.kind)?;
    }
    writeln!(f, "}}")
}

fn render_params(params: &[Param]) -> String {
    params
        .iter()
        .map(|p| match &p.kind {
            Kind::Any => p.name.clone(),
            kind => format!("{}: {kind}", p.name),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
