//! Trigger verification of breaking changes.
//!
//! Every entry ranked Low or above gets a trigger snippet (see
//! [`triggers::generate`]). The snippets run once against the old release
//! and once against the new one, each side in its own environment; an entry
//! is verified when its snippet passes on the old side and fails on the new.
//!
//! Raw outputs are kept under `data.verify` next to the trigger:
//!
//! ```json
//! { "verify": { "trigger": ["import pkg", "..."], "old": {"exit": 0, ...}, "new": {"exit": 1, ...} } }
//! ```

pub mod triggers;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::environment::{
    select_python, CommandOutput, CurrentEnvironment, ExecutionEnvironment, Invocation, VenvEnvironment,
};
use crate::error::{Error, Result};
use crate::models::{ApiDescription, ApiDifference, DiffEntry, Distribution, VerifyData, VerifyState};

pub use triggers::{generate, snippet};

/// Verifier identity recorded on every judged entry.
pub const VERIFIER_ID: &str = "aexpy.trigger";

/// Options of the verifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyOptions {
    /// Wall-clock limit per snippet.
    pub timeout_secs: u64,
    /// Base interpreter; unset picks one matching each release's pyversion.
    pub python: Option<String>,
    /// Install each release into a fresh virtual environment instead of
    /// putting its root path on `PYTHONPATH`.
    pub venv: bool,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            python: None,
            venv: false,
        }
    }
}

/// One side of a verification: an environment plus an optional source root.
pub struct Sandbox {
    env: Box<dyn ExecutionEnvironment>,
    root: Option<PathBuf>,
}

impl Sandbox {
    pub fn new(env: Box<dyn ExecutionEnvironment>, root: Option<PathBuf>) -> Self {
        Self { env, root }
    }

    /// Environment able to import `dist`.
    ///
    /// With `venv`, the wheel (or, lacking one, the dependency list) is
    /// installed into a fresh virtual environment; otherwise the caller's
    /// interpreter is used and the distribution root goes on the path.
    pub fn prepare(dist: &Distribution, options: &VerifyOptions) -> Result<Self> {
        let python = select_python(options.python.as_deref(), &dist.pyversion);
        if !options.venv {
            return Ok(Self::new(
                Box::new(CurrentEnvironment::new(&python)),
                dist.root_path.clone(),
            ));
        }
        let env = VenvEnvironment::create(&python)?;
        match &dist.wheel_file {
            Some(wheel) => {
                env.install(&[wheel.to_string_lossy().into_owned()])?;
                Ok(Self::new(Box::new(env), None))
            }
            None => {
                env.install(&dist.dependencies)?;
                Ok(Self::new(Box::new(env), dist.root_path.clone()))
            }
        }
    }

    fn run(&self, program: String, timeout: Duration) -> Result<CommandOutput> {
        let mut invocation = Invocation::python().arg("-c").arg(program).timeout(timeout);
        if let Some(root) = &self.root {
            invocation = invocation.python_path(root);
        }
        self.env.run_python(invocation)
    }

    pub fn describe(&self) -> String {
        self.env.describe()
    }
}

/// Runs trigger snippets and judges the entries of a difference.
#[derive(Clone, Debug, Default)]
pub struct Verifier {
    options: VerifyOptions,
}

impl Verifier {
    pub fn new(options: VerifyOptions) -> Self {
        Self { options }
    }

    /// Verify `difference` with environments built from its distributions.
    ///
    /// Returns the number of entries marked [`VerifyState::Pass`]. A side
    /// whose environment cannot be built leaves its entries `Unknown`; only
    /// when neither side can be built is an error returned.
    pub fn verify(&self, difference: &mut ApiDifference, old: &ApiDescription) -> Result<usize> {
        if attach_triggers(difference, old) == 0 {
            tracing::info!("No trigger to verify");
            return Ok(0);
        }
        let old_side = Sandbox::prepare(&difference.old, &self.options)
            .map_err(|e| tracing::error!(error = %e, release = %difference.old.release, "Failed to prepare environment"))
            .ok();
        let new_side = Sandbox::prepare(&difference.new, &self.options)
            .map_err(|e| tracing::error!(error = %e, release = %difference.new.release, "Failed to prepare environment"))
            .ok();
        if old_side.is_none() && new_side.is_none() {
            return Err(Error::Verification(format!(
                "no environment for {} nor {}",
                difference.old.release, difference.new.release
            )));
        }
        Ok(self.verify_in(difference, old_side.as_ref(), new_side.as_ref()))
    }

    /// Run attached triggers in the given sandboxes and judge every entry
    /// that has one.
    pub fn verify_in(&self, difference: &mut ApiDifference, old: Option<&Sandbox>, new: Option<&Sandbox>) -> usize {
        let timeout = Duration::from_secs(self.options.timeout_secs);
        for (side, sandbox) in [("old", old), ("new", new)] {
            let Some(sandbox) = sandbox else {
                continue;
            };
            tracing::info!(side, env = %sandbox.describe(), "Running triggers");
            for entry in difference.entries.values_mut() {
                let Some(trigger) = trigger_of(entry) else {
                    continue;
                };
                match sandbox.run(snippet(&trigger), timeout) {
                    Ok(output) => {
                        tracing::debug!(side, id = %entry.id, exit = ?output.exit, "Trigger finished");
                        if !output.err.trim().is_empty() {
                            tracing::trace!(side, id = %entry.id, "stderr:\n{}", output.err);
                        }
                        if let Some(Value::Object(verify)) = entry.data.get_mut("verify") {
                            verify.insert(side.to_string(), json!(output));
                        }
                    }
                    Err(e) => {
                        tracing::warn!(side, id = %entry.id, error = %e, "Trigger could not run");
                    }
                }
            }
        }

        let mut passed = 0;
        for entry in difference.entries.values_mut() {
            if trigger_of(entry).is_none() {
                continue;
            }
            entry.verify = judge(entry);
            if entry.verify.state == VerifyState::Pass {
                passed += 1;
            }
        }
        tracing::info!(passed, "Verified triggers");
        passed
    }
}

/// Generate and store triggers for breaking entries; returns how many were
/// attached.
pub fn attach_triggers(difference: &mut ApiDifference, old: &ApiDescription) -> usize {
    let mut count = 0;
    for entry in difference.entries.values_mut() {
        if !entry.rank.is_breaking() {
            continue;
        }
        let trigger = generate(entry, old);
        if trigger.is_empty() {
            continue;
        }
        entry.data.insert("verify".to_string(), json!({ "trigger": trigger }));
        count += 1;
    }
    count
}

fn trigger_of(entry: &DiffEntry) -> Option<Vec<String>> {
    let trigger = entry.data.get("verify")?.get("trigger")?;
    serde_json::from_value(trigger.clone()).ok()
}

fn exit_of(entry: &DiffEntry, side: &str) -> Option<Option<i32>> {
    let output = entry.data.get("verify")?.get(side)?;
    serde_json::from_value::<CommandOutput>(output.clone()).ok().map(|o| o.exit)
}

/// Pass iff old exits 0 and new exits non-zero. A side that did not run or
/// timed out makes the verdict Unknown.
fn judge(entry: &DiffEntry) -> VerifyData {
    let (old, new) = (exit_of(entry, "old").flatten(), exit_of(entry, "new").flatten());
    let (state, message) = match (old, new) {
        (Some(0), Some(n)) if n != 0 => (VerifyState::Pass, format!("old exit 0, new exit {}", n)),
        (Some(o), Some(n)) => (VerifyState::Fail, format!("old exit {}, new exit {}", o, n)),
        _ => (VerifyState::Unknown, "trigger did not complete on both sides".to_string()),
    };
    VerifyData {
        state,
        message,
        verifier: VERIFIER_ID.to_string(),
    }
}
