//! Known abstract base classes a class may implement without naming them.

use pyo3::prelude::*;

/// `(module, class)` pairs checked with `issubclass` for every class.
pub const KNOWN_ABCS: &[(&str, &[&str])] = &[
    (
        "collections.abc",
        &[
            "Container",
            "Hashable",
            "Iterable",
            "Iterator",
            "Reversible",
            "Generator",
            "Sized",
            "Callable",
            "Collection",
            "Sequence",
            "MutableSequence",
            "Set",
            "MutableSet",
            "Mapping",
            "MutableMapping",
            "MappingView",
            "ItemsView",
            "KeysView",
            "ValuesView",
            "Awaitable",
            "Coroutine",
            "AsyncIterable",
            "AsyncIterator",
            "AsyncGenerator",
        ],
    ),
    ("numbers", &["Complex", "Real", "Rational", "Integral"]),
    ("io", &["IOBase", "RawIOBase", "BufferedIOBase", "TextIOBase"]),
    (
        "importlib.abc",
        &[
            "Loader",
            "MetaPathFinder",
            "PathEntryFinder",
            "InspectLoader",
            "ExecutionLoader",
            "FileLoader",
            "SourceLoader",
        ],
    ),
];

/// Import every known ABC that exists in the running interpreter.
///
/// Some names come and go between Python versions; missing ones are skipped.
pub fn load(py: Python<'_>) -> Vec<(String, Bound<'_, PyAny>)> {
    let mut loaded = Vec::new();
    for (module, names) in KNOWN_ABCS {
        let Ok(m) = py.import_bound(*module) else {
            tracing::debug!(module, "ABC module unavailable");
            continue;
        };
        for name in names.iter() {
            match m.getattr(*name) {
                Ok(cls) => loaded.push((format!("{}.{}", module, name), cls)),
                Err(_) => tracing::debug!(module, name, "ABC unavailable"),
            }
        }
    }
    loaded
}
