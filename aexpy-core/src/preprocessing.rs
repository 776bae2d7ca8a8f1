//! Preprocessing: an unpacked package directory → Distribution.
//!
//! Top modules come from the caller, else from `*.dist-info/top_level.txt`,
//! else from the directory layout. File statistics are gathered with a
//! gitignore-aware parallel walk over `*.py`.

use std::fs;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::models::{Distribution, Release};
use crate::produce::{produce, ProduceContext};

/// Interpreter version assumed when neither the caller nor the package
/// metadata names one.
pub const DEFAULT_PYVERSION: &str = "3.12";

/// File names never treated as importable top modules.
const NON_MODULES: &[&str] = &["setup", "conftest", "tests", "test", "docs", "examples", "__pycache__"];

#[derive(Clone, Debug, Default)]
pub struct PreprocessOptions {
    pub release: Release,
    pub root: PathBuf,
    /// Explicit top modules; detected when empty.
    pub top_modules: Vec<String>,
    pub pyversion: Option<String>,
    /// Explicit dependencies; read from `Requires-Dist` when empty.
    pub dependencies: Vec<String>,
    pub wheel_file: Option<PathBuf>,
}

/// Contents of a `*.dist-info` directory.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DistInfo {
    pub metadata: Vec<(String, String)>,
    pub top_level: Vec<String>,
    pub description: String,
}

impl DistInfo {
    /// Values of one metadata header, in file order.
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.metadata
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Requirement specs without environment markers that exclude a plain
    /// install (`extra == ...`).
    pub fn requirements(&self) -> Vec<String> {
        self.get_all("Requires-Dist")
            .into_iter()
            .filter(|r| !r.contains("extra =="))
            .map(|r| r.split(';').next().unwrap_or(r).trim().to_string())
            .filter(|r| !r.is_empty())
            .collect()
    }

    /// Lowest `3.x` allowed by `Requires-Python`.
    pub fn pyversion(&self) -> Option<String> {
        let spec = self.get_all("Requires-Python").into_iter().next()?;
        spec.split(',')
            .map(str::trim)
            .find_map(|item| item.strip_prefix(">=").or_else(|| item.strip_prefix("~=")))
            .map(str::trim)
            .filter(|v| v.starts_with("3."))
            .map(|v| v.split('.').take(2).collect::<Vec<_>>().join("."))
    }
}

/// Parse RFC 822 style `METADATA`: headers with indented continuation lines,
/// then the long description after the first blank line.
pub fn parse_metadata(text: &str) -> (Vec<(String, String)>, String) {
    let mut headers: Vec<(String, String)> = Vec::new();
    let mut lines = text.lines();
    for line in lines.by_ref() {
        if line.trim().is_empty() {
            break;
        }
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = headers.last_mut() {
                value.push('\n');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            headers.push((key.trim().to_string(), value.trim().to_string()));
        }
    }
    let body = lines.collect::<Vec<_>>().join("\n");
    (headers, body.trim().to_string())
}

/// Read the first `*.dist-info` directory under `root`, if any.
pub fn read_dist_info(root: &Path) -> Option<DistInfo> {
    let dir = fs::read_dir(root)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| p.is_dir() && p.extension().is_some_and(|e| e == "dist-info"))?;
    let text = fs::read_to_string(dir.join("METADATA")).ok()?;
    let (metadata, description) = parse_metadata(&text);
    let mut info = DistInfo {
        metadata,
        top_level: Vec::new(),
        description,
    };
    info.top_level = match fs::read_to_string(dir.join("top_level.txt")) {
        Ok(text) => text
            .lines()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        Err(_) => info
            .get_all("Name")
            .first()
            .map(|name| vec![name.replace('-', "_")])
            .unwrap_or_default(),
    };
    tracing::debug!(dir = %dir.display(), top = ?info.top_level, "Read dist-info");
    Some(info)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_alphabetic() || c == '_') && chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Packages (directories with `__init__.py`) and top-level `*.py` files
/// under `root`, sorted.
pub fn detect_top_modules(root: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(root) else {
        return Vec::new();
    };
    let mut modules: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let path = e.path();
            let name = if path.is_dir() && path.join("__init__.py").is_file() {
                path.file_name()?.to_str()?.to_string()
            } else if path.is_file() && path.extension().is_some_and(|x| x == "py") {
                path.file_stem()?.to_str()?.to_string()
            } else {
                return None;
            };
            let excluded = NON_MODULES.contains(&name.as_str()) || name.starts_with("test_");
            (is_identifier(&name) && !excluded).then_some(name)
        })
        .collect();
    modules.sort();
    modules.dedup();
    modules
}

/// Aggregate size statistics over Python sources.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileStats {
    pub count: u64,
    pub size: u64,
    pub loc: u64,
}

/// Count `*.py` files, bytes and lines below `root`.
pub fn count_files(root: &Path) -> FileStats {
    let files: Vec<PathBuf> = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .build()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|e| e == "py"))
        .collect();

    files
        .par_iter()
        .map(|path| match fs::read(path) {
            Ok(content) => FileStats {
                count: 1,
                size: content.len() as u64,
                loc: bytecount::count(&content, b'\n') as u64
                    + u64::from(!content.is_empty() && !content.ends_with(b"\n")),
            },
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to read file");
                FileStats::default()
            }
        })
        .reduce(FileStats::default, |a, b| FileStats {
            count: a.count + b.count,
            size: a.size + b.size,
            loc: a.loc + b.loc,
        })
}

/// Preprocess stage: build a Distribution for a package directory.
pub fn preprocess(options: &PreprocessOptions) -> ProduceContext<Distribution> {
    let mut product = Distribution::new(options.release.clone());
    product.root_path = Some(options.root.clone());
    product.wheel_file = options.wheel_file.clone();

    produce(product, |context| {
        if !options.root.is_dir() {
            return Err(Error::MissingPath(options.root.clone()));
        }

        let info = context.try_using("dist-info", |_| {
            read_dist_info(&options.root).ok_or_else(|| Error::Other("no dist-info directory".into()))
        });

        context.using("modules", |dist| {
            dist.top_modules = if !options.top_modules.is_empty() {
                options.top_modules.clone()
            } else if let Some(top) = info.as_ref().map(|i| i.top_level.clone()).filter(|t| !t.is_empty()) {
                top
            } else {
                detect_top_modules(&options.root)
            };
            if dist.top_modules.is_empty() {
                return Err(Error::InvalidInput(format!(
                    "no top level module found in {}",
                    options.root.display()
                )));
            }
            dist.pyversion = options
                .pyversion
                .clone()
                .or_else(|| info.as_ref().and_then(DistInfo::pyversion))
                .unwrap_or_else(|| DEFAULT_PYVERSION.to_string());
            dist.dependencies = if options.dependencies.is_empty() {
                info.as_ref().map(DistInfo::requirements).unwrap_or_default()
            } else {
                options.dependencies.clone()
            };
            if let Some(info) = &info {
                dist.metadata = info.metadata.clone();
                dist.description = info.description.clone();
            }
            tracing::info!(top = ?dist.top_modules, pyversion = %dist.pyversion, "Resolved modules");
            Ok(())
        })?;

        context.using("counter", |dist| {
            let stats = count_files(&options.root);
            dist.file_count = stats.count;
            dist.file_size = stats.size;
            dist.loc_count = stats.loc;
            tracing::info!(files = stats.count, bytes = stats.size, loc = stats.loc, "Counted files");
            Ok(())
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn package() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "pkg/__init__.py", "from .core import run\n");
        write(dir.path(), "pkg/core.py", "def run():\n    return 1\n");
        write(dir.path(), "helper.py", "X = 1");
        write(dir.path(), "setup.py", "setup()\n");
        write(dir.path(), "tests/__init__.py", "");
        write(dir.path(), "README.md", "# demo\n");
        dir
    }

    #[test]
    fn test_detect_top_modules() {
        let dir = package();
        assert_eq!(detect_top_modules(dir.path()), vec!["helper", "pkg"]);
    }

    #[test]
    fn test_count_files() {
        let dir = package();
        let stats = count_files(dir.path());
        assert_eq!(stats.count, 5);
        // 1 + 2 + 1 (no trailing newline) + 1 + 0
        assert_eq!(stats.loc, 5);
    }

    #[test]
    fn test_parse_metadata() {
        let text = "Metadata-Version: 2.1\nName: demo-lib\nRequires-Python: >=3.9, <4\n\
                    Requires-Dist: requests (>=2)\nRequires-Dist: pytest ; extra == 'test'\n\
                    Summary: a long\n  summary\n\nBody text.\n";
        let (headers, body) = parse_metadata(text);
        assert_eq!(body, "Body text.");
        let info = DistInfo {
            metadata: headers,
            ..Default::default()
        };
        assert_eq!(info.get_all("summary"), vec!["a long\nsummary"]);
        assert_eq!(info.requirements(), vec!["requests (>=2)"]);
        assert_eq!(info.pyversion().as_deref(), Some("3.9"));
    }

    #[test]
    fn test_dist_info_top_level() {
        let dir = package();
        write(dir.path(), "demo_lib-1.0.dist-info/METADATA", "Name: demo-lib\nVersion: 1.0\n");
        let info = read_dist_info(dir.path()).unwrap();
        assert_eq!(info.top_level, vec!["demo_lib"]);
        write(dir.path(), "demo_lib-1.0.dist-info/top_level.txt", "pkg\n");
        let info = read_dist_info(dir.path()).unwrap();
        assert_eq!(info.top_level, vec!["pkg"]);
    }

    #[test]
    fn test_preprocess() {
        let dir = package();
        let options = PreprocessOptions {
            release: Release::new("demo", "1.0"),
            root: dir.path().to_path_buf(),
            ..Default::default()
        };
        let context = preprocess(&options);
        assert!(context.is_success(), "{:?}", context.error);
        let dist = &context.product;
        assert_eq!(dist.top_modules, vec!["helper", "pkg"]);
        assert_eq!(dist.pyversion, DEFAULT_PYVERSION);
        assert_eq!(dist.file_count, 5);
        assert!(dist.info.producer.ends_with("[dist-info!,modules,counter]"));
    }

    #[test]
    fn test_preprocess_missing_root() {
        let options = PreprocessOptions {
            root: PathBuf::from("/nonexistent/aexpy/root"),
            ..Default::default()
        };
        let context = preprocess(&options);
        assert!(!context.is_success());
        assert!(context.error.unwrap().contains("path does not exist"));
    }
}
