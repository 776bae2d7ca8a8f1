//! End-to-end diff scenarios on hand-built descriptions.
//!
//! Each test builds an old and a new description the way the extractor
//! would leave them, runs the full diff stage and checks kinds, data and
//! ranks of the resulting entries.

use aexpy_core::diffing::{diff, DiffOptions};
use aexpy_core::extracting::kwargs::kwargs_keys;
use aexpy_core::extracting::{mark_private, resolve_aliases};
use aexpy_core::models::{
    ApiDescription, ApiDifference, ApiEntry, BreakingRank, ClassEntry, DiffEntry, Distribution,
    FunctionEntry, ItemScope, ModuleEntry, Parameter, ParameterKind, ProduceState, Release,
};
use pretty_assertions::assert_eq;
use serde_json::json;

// ============================================================================
// Builders
// ============================================================================

fn description(version: &str, entries: Vec<ApiEntry>) -> ApiDescription {
    let dist = Distribution::new(Release::new("demo", version));
    let mut desc = ApiDescription::from_entries(dist, entries).expect("unique ids");
    resolve_aliases(&mut desc);
    mark_private(&mut desc);
    desc.info.state = ProduceState::Success;
    desc
}

fn module(id: &str, members: &[&str]) -> ModuleEntry {
    let mut m = ModuleEntry::new(id);
    for name in members {
        m.members.insert(name.to_string(), format!("{}.{}", id, name));
    }
    m
}

fn class(id: &str, bases: &[&str], mros: &[&str], members: &[&str]) -> ApiEntry {
    let mut c = ClassEntry::new(id);
    c.bases = bases.iter().map(|s| s.to_string()).collect();
    c.mros = mros.iter().map(|s| s.to_string()).collect();
    for name in members {
        c.members.insert(name.to_string(), format!("{}.{}", id, name));
    }
    c.into()
}

fn function(id: &str, params: Vec<Parameter>) -> FunctionEntry {
    let mut f = FunctionEntry::new(id);
    for mut p in params {
        p.source = id.to_string();
        f.parameters.push(p);
    }
    f
}

fn param(name: &str) -> Parameter {
    Parameter::new(ParameterKind::PositionalOrKeyword, name)
}

fn run(old: &ApiDescription, new: &ApiDescription) -> ApiDifference {
    diff(old, new, &DiffOptions::default())
        .into_result()
        .expect("diff stage succeeds")
}

fn only<'a>(difference: &'a ApiDifference, kind: &str) -> &'a DiffEntry {
    let found = difference.kind(kind);
    assert_eq!(found.len(), 1, "expected one {} in {:#?}", kind, difference.entries);
    found[0]
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_added_required_parameter_is_high() {
    let old = description(
        "1.0",
        vec![
            module("mod", &["foo"]).into(),
            function("mod.foo", vec![param("x")]).into(),
        ],
    );
    let new = description(
        "2.0",
        vec![
            module("mod", &["foo"]).into(),
            function("mod.foo", vec![param("x"), param("y")]).into(),
        ],
    );

    let difference = run(&old, &new);
    assert_eq!(difference.entries.len(), 1, "{:#?}", difference.entries);
    let entry = only(&difference, "AddParameter");
    assert_eq!(entry.data_str("new"), Some("y"));
    assert_eq!(entry.data_str("old"), Some(""));
    assert_eq!(entry.rank, BreakingRank::High);
    assert_eq!(difference.evaluate().0, BreakingRank::High);
}

#[test]
fn test_changed_method_default_is_low() {
    let method = |default: &str| -> ApiEntry {
        let mut f = function(
            "mod.C.m",
            vec![param("self"), param("a").with_default(Some(default))],
        );
        f.base.scope = ItemScope::Instance;
        f.into()
    };
    let old = description(
        "1.0",
        vec![
            module("mod", &["C"]).into(),
            class("mod.C", &[], &["mod.C", "builtins.object"], &["m"]),
            method("int('1')"),
        ],
    );
    let new = description(
        "2.0",
        vec![
            module("mod", &["C"]).into(),
            class("mod.C", &[], &["mod.C", "builtins.object"], &["m"]),
            method("int('2')"),
        ],
    );

    let difference = run(&old, &new);
    let entry = only(&difference, "ChangeParameterDefault");
    assert_eq!(entry.data.get("olddefault"), Some(&json!("int('1')")));
    assert_eq!(entry.data.get("newdefault"), Some(&json!("int('2')")));
    assert_eq!(entry.rank, BreakingRank::Low);
    assert_eq!(difference.evaluate().0, BreakingRank::Low);
}

#[test]
fn test_removed_base_class_is_medium() {
    let entries = |c: ApiEntry| {
        vec![
            module("mod", &["A", "B", "C"]).into(),
            class("mod.A", &[], &["mod.A", "builtins.object"], &[]),
            class("mod.B", &[], &["mod.B", "builtins.object"], &[]),
            c,
        ]
    };
    let old = description(
        "1.0",
        entries(class(
            "mod.C",
            &["mod.A", "mod.B"],
            &["mod.C", "mod.A", "mod.B", "builtins.object"],
            &[],
        )),
    );
    let new = description(
        "2.0",
        entries(class("mod.C", &["mod.A"], &["mod.C", "mod.A", "builtins.object"], &[])),
    );

    let difference = run(&old, &new);
    let entry = only(&difference, "RemoveBaseClass");
    assert_eq!(entry.data_str("name"), Some("mod.B"));
    assert_eq!(entry.rank, BreakingRank::Medium);
}

#[test]
fn test_export_list_withdrawal_removes_alias() {
    let exporting = |slots: &[&str]| -> ApiEntry {
        let mut m = module("mod", &["f", "g"]);
        m.slots = Some(slots.iter().map(|s| s.to_string()).collect());
        m.into()
    };
    let old = description(
        "1.0",
        vec![
            exporting(&["f", "g"]),
            function("mod.f", vec![]).into(),
            function("mod.g", vec![]).into(),
        ],
    );
    let new = description(
        "2.0",
        vec![
            exporting(&["g"]),
            function("mod.f", vec![]).into(),
            function("mod.g", vec![]).into(),
        ],
    );

    assert!(!old.get("mod.f").unwrap().base().private);
    assert!(new.get("mod.f").unwrap().base().private);
    assert!(!new.get("mod.g").unwrap().base().private);

    let difference = run(&old, &new);
    assert!(difference.kind("RemoveFunction").is_empty());
    let entry = only(&difference, "RemoveAlias");
    assert_eq!(entry.data_str("name"), Some("f"));
    assert_eq!(entry.data_str("target"), Some("mod.f"));
    assert_eq!(entry.rank, BreakingRank::High);
}

#[test]
fn test_renamed_kwargs_candidate() {
    let with_candidates = |body: &str| -> ApiEntry {
        let src = format!("def g(**kw):\n{}\n", body);
        let mut params: Vec<Parameter> = kwargs_keys(&src, "kw")
            .expect("parseable source")
            .into_iter()
            .map(|key| Parameter::new(ParameterKind::VarKeywordCandidate, key).with_default(None))
            .collect();
        params.push(Parameter::new(ParameterKind::VarKeyword, "kw"));
        let mut f = function("mod.g", params);
        f.base.src = src;
        f.into()
    };
    let old = description(
        "1.0",
        vec![
            module("mod", &["g"]).into(),
            with_candidates("    return kw[\"timeout\"]"),
        ],
    );
    let new = description(
        "2.0",
        vec![
            module("mod", &["g"]).into(),
            with_candidates("    return kw[\"timeout_s\"]"),
        ],
    );

    let difference = run(&old, &new);
    let removed = only(&difference, "RemoveVarKeywordCandidate");
    assert_eq!(removed.data_str("old"), Some("timeout"));
    assert_eq!(removed.rank, BreakingRank::Medium);
    let added = only(&difference, "AddVarKeywordCandidate");
    assert_eq!(added.data_str("new"), Some("timeout_s"));
    assert_eq!(added.rank, BreakingRank::Compatible);
    assert_eq!(difference.evaluate().0, BreakingRank::Medium);
}

#[test]
fn test_swapped_positionals_move() {
    let old = description(
        "1.0",
        vec![
            module("mod", &["h"]).into(),
            function("mod.h", vec![param("a"), param("b"), param("c")]).into(),
        ],
    );
    let new = description(
        "2.0",
        vec![
            module("mod", &["h"]).into(),
            function("mod.h", vec![param("b"), param("a"), param("c")]).into(),
        ],
    );

    let difference = run(&old, &new);
    let moves = difference.kind("MoveParameter");
    assert_eq!(moves.len(), 2, "{:#?}", difference.entries);
    let data: Vec<_> = moves
        .iter()
        .map(|e| serde_json::Value::Object(e.data.clone()))
        .collect();
    assert_eq!(
        data,
        vec![
            json!({ "name": "a", "oldindex": 0, "newindex": 1 }),
            json!({ "name": "b", "oldindex": 1, "newindex": 0 }),
        ]
    );
    assert!(moves.iter().all(|e| e.rank == BreakingRank::High));
    assert_eq!(difference.entries.len(), 2);
}

// ============================================================================
// Cross-cutting behavior
// ============================================================================

#[test]
fn test_entry_ids_are_unique_and_stable() {
    let old = description(
        "1.0",
        vec![
            module("mod", &["f", "g"]).into(),
            function("mod.f", vec![param("x")]).into(),
            function("mod.g", vec![]).into(),
        ],
    );
    let new = description(
        "2.0",
        vec![
            module("mod", &["f"]).into(),
            function("mod.f", vec![param("y")]).into(),
        ],
    );

    let first = run(&old, &new);
    let second = run(&old, &new);
    let ids: Vec<_> = first.entries.keys().collect();
    assert_eq!(ids, second.entries.keys().collect::<Vec<_>>());
    for (id, entry) in &first.entries {
        assert_eq!(id, &entry.id);
    }
    assert!(first.info.producer.ends_with("[differ,evaluator]"));
}

#[test]
fn test_private_removal_is_low() {
    let old = description(
        "1.0",
        vec![
            module("mod", &["_helper"]).into(),
            function("mod._helper", vec![]).into(),
        ],
    );
    let new = description("2.0", vec![module("mod", &[]).into()]);

    let difference = run(&old, &new);
    let entry = only(&difference, "RemoveFunction");
    assert_eq!(entry.rank, BreakingRank::Low);
    assert!(difference.breaking(BreakingRank::Medium).is_empty());
}

#[test]
fn test_report_of_scenario() {
    let old = description(
        "1.0",
        vec![
            module("mod", &["foo"]).into(),
            function("mod.foo", vec![param("x")]).into(),
        ],
    );
    let new = description("2.0", vec![module("mod", &[]).into()]);

    let difference = run(&old, &new);
    let report = aexpy_core::report(&difference)
        .into_result()
        .expect("report stage succeeds");
    assert!(report.content.starts_with("📜 demo@1.0 → demo@2.0"));
    assert!(report.content.contains("🚧 Breakings"));
    assert!(report.content.contains("Remove function (mod)"));
}
