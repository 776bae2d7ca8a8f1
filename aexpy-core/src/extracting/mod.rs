//! Extraction: Distribution → ApiDescription.
//!
//! The inspector runs out of process, because importing the target package
//! mutates interpreter state. Its entries then go through alias resolution,
//! privacy marking and the in-process enrichers:
//!
//! ```text
//! inspector → aliases → private → externals → attributes → types → callgraph → kwargs
//! ```
//!
//! Each enricher is a named producer; a failing one is recorded in the
//! producer chain and skipped.

pub mod alias;
pub mod attributes;
pub mod callgraph;
pub mod callsites;
pub mod kwargs;
pub mod source;

use std::path::PathBuf;

use crate::environment::{ExecutionEnvironment, Invocation};
use crate::error::{Error, Result};
use crate::models::{ApiDescription, ApiEntry, Distribution, TRANSFER_BEGIN};
use crate::produce::{ensure_success, produce, ProduceContext};
use crate::typing::{enrich_types, MypyTypeChecker, SourceTypeChecker};

pub use alias::{mark_private, resolve_aliases};
pub use callgraph::CallGraph;

/// Options of one extraction run.
#[derive(Clone, Debug)]
pub struct ExtractOptions {
    /// Path of the `aexpy-inspect` executable.
    pub inspector: PathBuf,
    /// Run the AST, type and call-graph enrichers.
    pub enrich: bool,
    /// Install the wheel (or the dependencies) into the environment first.
    pub install: bool,
    /// Ask mypy for inferred types when it is installed in the environment.
    pub mypy: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            inspector: PathBuf::from("aexpy-inspect"),
            enrich: true,
            install: false,
            mypy: true,
        }
    }
}

/// Payload after the transfer marker. Anything printed before it is logged.
pub fn split_transfer(stdout: &str) -> Result<&str> {
    let Some((logs, payload)) = stdout.split_once(TRANSFER_BEGIN) else {
        return Err(Error::Protocol(format!(
            "subprocess output has no {} marker",
            TRANSFER_BEGIN
        )));
    };
    for line in logs.lines().filter(|l| !l.trim().is_empty()) {
        tracing::debug!(target: "aexpy::inspector", "{}", line);
    }
    let payload = payload.trim();
    if payload.is_empty() {
        return Err(Error::Protocol("subprocess sent an empty payload".to_string()));
    }
    Ok(payload)
}

/// Split inspector stdout at the transfer marker and decode the entries.
pub fn parse_transfer(stdout: &str) -> Result<Vec<ApiEntry>> {
    Ok(serde_json::from_str(split_transfer(stdout)?)?)
}

/// Extract the API description of `distribution` inside `env`.
///
/// The returned context always carries a product; its state tells whether
/// the stage succeeded.
pub fn extract(
    distribution: &Distribution,
    env: &dyn ExecutionEnvironment,
    options: &ExtractOptions,
) -> ProduceContext<ApiDescription> {
    produce(ApiDescription::new(distribution.clone()), |context| {
        ensure_success(distribution, "distribution")?;
        tracing::info!(release = %distribution.release, env = %env.describe(), "Extracting");

        if options.install {
            context.using("install", |_| install(distribution, env))?;
        }
        context.using("inspector", |description| {
            let entries = inspect(distribution, env, &options.inspector)?;
            add_entries(description, entries)
        })?;

        context.using("alias", |description| {
            resolve_aliases(description);
            alias::materialize_externals(description);
            alias::repair_parents(description);
            alias::normalize_mros(description);
            mark_private(description);
            Ok(())
        })?;

        if options.enrich {
            enrich(context, options.mypy.then_some(env));
        }
        context.product.calc_callers();
        tracing::info!(entries = context.product.len(), "Extracted");
        Ok(())
    })
}

/// Run the in-process enrichers. Each one may fail on its own.
///
/// With an environment, types come from mypy run inside it; without one, or
/// when mypy is unavailable there, from annotations alone.
pub fn enrich(context: &mut ProduceContext<ApiDescription>, env: Option<&dyn ExecutionEnvironment>) {
    context.try_using("attributes", |description| {
        let added = attributes::enrich_instance_attributes(description);
        tracing::info!(added, "Detected instance attributes");
        Ok(())
    });
    context.try_using("types", |description| {
        let typed = match env.and_then(|env| mypy_checker(description, env)) {
            Some(checker) => enrich_types(description, &checker),
            None => enrich_types(description, &SourceTypeChecker::new(description)),
        };
        tracing::info!(typed, "Resolved types");
        Ok(())
    });
    let graph = context.try_using("callgraph", |description| {
        let checker = SourceTypeChecker::new(description);
        let graph = CallGraph::build(description, Some(&checker));
        graph.apply(description);
        tracing::info!(edges = graph.edge_count(), "Built call graph");
        Ok(graph)
    });
    if let Some(graph) = graph {
        context.try_using("kwargs", |description| {
            let added = kwargs::enrich_kwargs(description, &graph);
            tracing::info!(added, "Inferred keyword candidates");
            Ok(())
        });
    }
}

fn mypy_checker(description: &ApiDescription, env: &dyn ExecutionEnvironment) -> Option<MypyTypeChecker> {
    match MypyTypeChecker::run(description, env) {
        Ok(checker) => {
            tracing::info!(symbols = checker.len(), "Using mypy inferred types");
            Some(checker)
        }
        Err(e) => {
            tracing::info!(error = %e, "mypy unavailable, falling back to annotations");
            None
        }
    }
}

fn install(distribution: &Distribution, env: &dyn ExecutionEnvironment) -> Result<()> {
    let specs: Vec<String> = match &distribution.wheel_file {
        Some(wheel) => vec![wheel.display().to_string()],
        None => distribution.dependencies.clone(),
    };
    if specs.is_empty() {
        return Ok(());
    }
    tracing::info!(count = specs.len(), "Installing into extraction environment");
    env.run_python(
        Invocation::python()
            .args(["-m", "pip", "install", "--disable-pip-version-check", "-q"])
            .args(&specs),
    )?
    .check("pip install")?;
    Ok(())
}

fn inspect(
    distribution: &Distribution,
    env: &dyn ExecutionEnvironment,
    inspector: &std::path::Path,
) -> Result<Vec<ApiEntry>> {
    let input = serde_json::to_string(distribution)?;
    let mut invocation = Invocation::new(inspector).stdin(input);
    if let Some(root) = &distribution.root_path {
        if !root.exists() {
            return Err(Error::MissingPath(root.clone()));
        }
        invocation = invocation.python_path(root);
    }
    let command = invocation.display();
    let output = env.run(invocation)?;
    for line in output.err.lines().filter(|l| !l.trim().is_empty()) {
        tracing::debug!(target: "aexpy::inspector", "{}", line);
    }
    let output = output.check(&command)?;
    let entries = parse_transfer(&output.out)?;
    tracing::info!(count = entries.len(), "Received entries from inspector");
    Ok(entries)
}

/// Add inspector entries, keeping the first of any duplicate id.
fn add_entries(description: &mut ApiDescription, entries: Vec<ApiEntry>) -> Result<()> {
    for entry in entries {
        let id = entry.id().to_string();
        if let Err(e) = description.add_entry(entry) {
            tracing::warn!(entry = %id, error = %e, "Skipped duplicate entry");
        }
    }
    if description.modules().next().is_none() {
        return Err(Error::NoTopModule(description.distribution.top_modules.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FunctionEntry, ModuleEntry, ProduceState, Release};

    #[test]
    fn test_parse_transfer() {
        let entries = vec![
            ApiEntry::from(ModuleEntry::new("pkg")),
            ApiEntry::from(FunctionEntry::new("pkg.f")),
        ];
        let stdout = format!(
            "importing pkg\nwarning: something\n{}\n{}\n",
            TRANSFER_BEGIN,
            serde_json::to_string(&entries).unwrap()
        );
        assert_eq!(parse_transfer(&stdout).unwrap(), entries);
    }

    #[test]
    fn test_parse_transfer_without_marker() {
        let err = parse_transfer("[]").unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert!(matches!(parse_transfer(TRANSFER_BEGIN), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_add_entries_requires_a_module() {
        let mut desc = ApiDescription::default();
        let err = add_entries(&mut desc, vec![FunctionEntry::new("pkg.f").into()]).unwrap_err();
        assert!(matches!(err, Error::NoTopModule(_)));
    }

    #[test]
    fn test_add_entries_skips_duplicates() {
        let mut desc = ApiDescription::default();
        let mut first = FunctionEntry::new("pkg.f");
        first.base.docs = "first".into();
        let mut second = FunctionEntry::new("pkg.f");
        second.base.docs = "second".into();
        add_entries(
            &mut desc,
            vec![ModuleEntry::new("pkg").into(), first.into(), second.into()],
        )
        .unwrap();
        assert_eq!(desc.len(), 2);
        assert_eq!(desc.get("pkg.f").unwrap().base().docs, "first");
    }

    #[test]
    fn test_extract_rejects_failed_distribution() {
        let mut dist = Distribution::new(Release::new("pkg", "1.0"));
        dist.info.state = ProduceState::Failure;
        let env = crate::environment::CurrentEnvironment::default();
        let context = extract(&dist, &env, &ExtractOptions::default());
        assert_eq!(context.product.info.state, ProduceState::Failure);
        assert!(context.product.info.creation.is_some());
        assert!(context.error.is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_with_fake_inspector() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let mut pkg = ModuleEntry::new("pkg");
        pkg.members.insert("f".into(), "pkg.f".into());
        pkg.members.insert("Path".into(), "pathlib.Path".into());
        let mut f = FunctionEntry::new("pkg.f");
        f.base.src = "def f():\n    return 1\n".into();
        let payload = serde_json::to_string(&vec![ApiEntry::from(pkg), ApiEntry::from(f)]).unwrap();
        let payload_path = dir.path().join("payload.json");
        std::fs::write(&payload_path, payload).unwrap();

        let script = dir.path().join("inspect.sh");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\ncat > /dev/null\necho loading\necho {}\ncat {}\n",
                TRANSFER_BEGIN,
                payload_path.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut dist = Distribution::new(Release::new("pkg", "1.0"));
        dist.info.state = ProduceState::Success;
        dist.top_modules = vec!["pkg".into()];
        let env = crate::environment::CurrentEnvironment::default();
        let options = ExtractOptions {
            inspector: script,
            ..Default::default()
        };
        let context = extract(&dist, &env, &options);
        assert!(context.is_success(), "{:?}", context.error);
        assert!(context.product.get("pathlib.Path").unwrap().is_external());
        assert!(context
            .product
            .info
            .producer
            .contains("inspector,alias,attributes,types,callgraph,kwargs"));
    }
}
