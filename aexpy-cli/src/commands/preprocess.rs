//! Preprocess command - package directory to Distribution

use std::path::{Path, PathBuf};

use aexpy_core::models::Release;
use aexpy_core::preprocessing::read_dist_info;
use aexpy_core::{preprocess, PreprocessOptions};
use anyhow::Context;
use clap::Args;

use super::{finish, StageSettings};

#[derive(Args, Debug)]
pub struct PreprocessArgs {
    /// Directory holding the unpacked package
    pub path: PathBuf,

    /// Output file, `-` for stdout
    #[arg(default_value = "-")]
    pub output: PathBuf,

    /// Release as project@version (default: dist-info metadata, then the directory name)
    #[arg(short, long)]
    pub release: Option<String>,

    /// Top level module to import (repeatable; detected when omitted)
    #[arg(short, long = "module")]
    pub modules: Vec<String>,

    /// Target interpreter version, e.g. 3.12
    #[arg(short, long)]
    pub pyversion: Option<String>,

    /// Requirement installed before extraction (repeatable; default: Requires-Dist)
    #[arg(short, long = "dependency")]
    pub dependencies: Vec<String>,

    /// Wheel the directory was unpacked from
    #[arg(short, long)]
    pub wheel: Option<PathBuf>,
}

/// `--release`, else Name/Version of the dist-info, else `<dir>@unknown`.
fn resolve_release(explicit: Option<&str>, root: &Path) -> anyhow::Result<Release> {
    if let Some(text) = explicit {
        return text.parse().context("Invalid --release");
    }
    if let Some(info) = read_dist_info(root) {
        let name = info.get_all("Name").first().map(|s| s.to_string());
        let version = info.get_all("Version").first().map(|s| s.to_string());
        if let (Some(name), Some(version)) = (name, version) {
            return Ok(Release::new(name, version));
        }
    }
    let project = root
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| Release::default().project);
    Ok(Release::new(project, Release::default().version))
}

pub fn run(args: &PreprocessArgs, settings: &StageSettings) -> anyhow::Result<()> {
    let release = resolve_release(args.release.as_deref(), &args.path)?;
    let options = PreprocessOptions {
        release,
        root: args.path.clone(),
        top_modules: args.modules.clone(),
        pyversion: args.pyversion.clone(),
        dependencies: args.dependencies.clone(),
        wheel_file: args.wheel.clone(),
    };
    let key = options.release.to_string();
    let context = preprocess(&options);
    finish(context, "preprocess", &key, &args.output, settings)
}
