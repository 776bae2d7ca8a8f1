//! Command implementations for the aexpy CLI
//!
//! Each command module provides a `run` function that executes one stage.
//! Stages read their input product, run, write their product (even a failed
//! one) and turn a failed product into an error so the process exits with 1.

pub mod diff;
pub mod extract;
pub mod preprocess;
pub mod report;
pub mod view;

use std::path::Path;

use aexpy_core::io;
use aexpy_core::models::{ProduceState, Product};
use aexpy_core::{FileCache, ProduceContext};
use anyhow::{bail, Context};
use serde::de::DeserializeOwned;

use crate::output::stage_summary;

/// Settings shared by every stage command.
pub struct StageSettings {
    pub gzip: bool,
    pub cache: Option<FileCache>,
    /// Ignore cached products.
    pub force: bool,
}

/// Read a typed product from a file or `-`.
pub fn load<T: DeserializeOwned>(input: &Path, what: &str) -> anyhow::Result<T> {
    io::read_product(input).with_context(|| format!("Failed to read {} from {}", what, input.display()))
}

/// A successful product cached for `stage`/`key`, unless `--force` was given.
pub fn cached<T: Product>(settings: &StageSettings, stage: &str, key: &str) -> Option<T> {
    if settings.force {
        return None;
    }
    let cache = settings.cache.as_ref()?;
    match cache.read::<T>(stage, key) {
        Ok(Some(product)) if product.info().state == ProduceState::Success => {
            tracing::info!(stage, key, "Using cached product");
            Some(product)
        }
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(stage, key, error = %e, "Ignoring unreadable cached product");
            None
        }
    }
}

/// Write a product to `output`.
pub fn emit<T: Product>(product: &T, output: &Path, gzip: bool) -> anyhow::Result<()> {
    io::write_product(output, product, gzip)
        .with_context(|| format!("Failed to write {} to {}", product.title(), output.display()))?;
    if !io::is_stdio(output) {
        tracing::info!(path = %output.display(), "Wrote product");
    }
    Ok(())
}

/// Cache and write the product of a finished stage.
///
/// The product is written even when the stage failed; the failure is then
/// returned as an error.
pub fn finish<T: Product>(
    context: ProduceContext<T>,
    stage: &str,
    key: &str,
    output: &Path,
    settings: &StageSettings,
) -> anyhow::Result<()> {
    if let Some(cache) = &settings.cache {
        cache
            .write(stage, key, &context.product, &context.log)
            .with_context(|| format!("Failed to cache {} product", stage))?;
    }
    emit(&context.product, output, settings.gzip)?;
    eprintln!("{}", stage_summary(stage, &context.product));
    if !context.is_success() {
        bail!(
            "{} of {} failed: {}",
            stage,
            context.product.title(),
            context.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

/// Write a product taken from the cache.
pub fn reuse<T: Product>(product: &T, stage: &str, output: &Path, settings: &StageSettings) -> anyhow::Result<()> {
    emit(product, output, settings.gzip)?;
    eprintln!("{} (cached)", stage_summary(stage, product));
    Ok(())
}
