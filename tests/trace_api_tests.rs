//! End-to-end tests for the public trace API.
//!
//! Builds a small dataflow trace (two source firings feeding a merge stage,
//! a flush and a final sink firing), then exercises queries, iteration
//! orders, sorting, attribute mutation, scheduler-edge maintenance and the
//! loader's rebuild fallback against it.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use tempfile::TempDir;

use tracegraphdb::prelude::*;
use tracegraphdb::{db_dir_for, PROPERTIES_FILE};

/// Install a test-writer subscriber once so the library's tracing output is
/// visible under `--nocapture`.
fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt().with_test_writer().init();
    });
}

fn small_config() -> TraceConfig {
    init_tracing();
    // tiny caches and commit batches so the tests exercise eviction and
    // coalescing, not just the happy path
    TraceConfig {
        step_cache_capacity: 4,
        dependency_cache_capacity: 4,
        max_uncommitted: 3,
        ..TraceConfig::default()
    }
}

fn step(id: StepId, actor: &str, action: &str, class: &str) -> StepData {
    StepData {
        id,
        actor: actor.into(),
        action: action.into(),
        actor_class: class.into(),
        ..StepData::default()
    }
}

fn tokens(port: &str, count: i64) -> BTreeMap<String, i64> {
    BTreeMap::from([(port.to_string(), count)])
}

/// Feeds the five-step fixture into a builder.
struct FixtureSource {
    calls: u32,
}

impl FixtureSource {
    fn new() -> Self {
        Self { calls: 0 }
    }
}

impl TraceSource for FixtureSource {
    fn read_into(&mut self, builder: &mut TraceBuilder) -> Result<()> {
        self.calls += 1;
        feed_fixture(builder)
    }
}

fn feed_fixture(builder: &mut TraceBuilder) -> Result<()> {
    builder.add_step(StepData {
        write_tokens: tokens("out", 2),
        attributes: HashMap::from([("latency".to_string(), AttrValue::Float(1.5))]),
        ..step(0, "src", "emit", "Source")
    })?;
    builder.add_step(StepData {
        write_tokens: tokens("out", 1),
        ..step(1, "src", "emit", "Source")
    })?;
    builder.add_step(StepData {
        read_tokens: tokens("in", 3),
        write_tokens: tokens("out", 1),
        ..step(2, "mix", "combine", "Merge")
    })?;
    builder.add_step(StepData {
        write_variables: vec!["buf".into()],
        ..step(3, "src", "flush", "Source")
    })?;
    builder.add_step(StepData {
        read_tokens: tokens("in", 1),
        read_variables: vec!["buf".into()],
        ..step(4, "sink", "take", "Sink")
    })?;

    builder.add_fsm_dependency(
        Endpoint::new(0, "src", "emit"),
        Endpoint::new(1, "src", "emit"),
        HashMap::new(),
    )?;
    builder.add_fsm_dependency(
        Endpoint::new(1, "src", "emit"),
        Endpoint::new(3, "src", "flush"),
        HashMap::new(),
    )?;
    builder.add_tokens_dependency(
        Endpoint::new(0, "src", "emit"),
        Endpoint::new(2, "mix", "combine"),
        "out",
        "in",
        2,
        HashMap::new(),
    )?;
    builder.add_tokens_dependency(
        Endpoint::new(1, "src", "emit"),
        Endpoint::new(2, "mix", "combine"),
        "out",
        "in",
        1,
        HashMap::new(),
    )?;
    builder.add_guard_dependency(
        Endpoint::new(2, "mix", "combine"),
        Endpoint::new(4, "sink", "take"),
        "ready",
        Direction::Read,
        HashMap::from([("weight".to_string(), AttrValue::Int(7))]),
    )?;
    builder.add_variable_dependency(
        Endpoint::new(3, "src", "flush"),
        Endpoint::new(4, "sink", "take"),
        "buf",
        Direction::Write,
        HashMap::new(),
    )?;

    builder.add_attributes(HashMap::from([(
        "network".to_string(),
        AttrValue::String("demo".into()),
    )]))?;
    Ok(())
}

fn build_fixture(trace_file: &Path) -> Trace {
    let mut builder = TraceBuilder::new(trace_file);
    builder.configure(&small_config()).unwrap();
    feed_fixture(&mut builder).unwrap();
    builder.build().unwrap()
}

fn ids(iter: impl Iterator<Item = Step>) -> Vec<StepId> {
    iter.map(|s| s.id()).collect()
}

// ============================================================================
// Build and Query Tests
// ============================================================================

mod build_and_query {
    use super::*;

    #[test]
    fn test_counts() {
        let dir = TempDir::new().unwrap();
        let trace = build_fixture(&dir.path().join("app.tracex"));

        assert_eq!(trace.step_count(), 5);
        assert_eq!(trace.dependency_count(), 6);
        assert_eq!(trace.steps_of_actor("src"), 3);
        assert_eq!(trace.steps_of_actor("mix"), 1);
        assert_eq!(trace.steps_of_actor("nobody"), 0);
        assert_eq!(trace.steps_of_action("src", "emit"), 2);
        assert_eq!(trace.steps_of_action("src", "flush"), 1);
        assert_eq!(trace.steps_of_action("src", "take"), 0);
    }

    #[test]
    fn test_step_accessors() {
        let dir = TempDir::new().unwrap();
        let trace = build_fixture(&dir.path().join("app.tracex"));

        let s2 = trace.step(2).unwrap();
        assert_eq!(s2.actor(), "mix");
        assert_eq!(s2.action(), "combine");
        assert_eq!(s2.actor_class(), "Merge");
        assert_eq!(s2.read_tokens(), tokens("in", 3));
        assert_eq!(s2.write_tokens(), tokens("out", 1));
        assert!(s2.read_variables().is_empty());

        let s4 = trace.step(4).unwrap();
        assert_eq!(s4.read_variables(), vec!["buf".to_string()]);
        assert!(s4.write_tokens().is_empty());
    }

    #[test]
    fn test_unknown_step_is_none() {
        let dir = TempDir::new().unwrap();
        let trace = build_fixture(&dir.path().join("app.tracex"));
        assert!(trace.step(99).is_none());
    }

    #[test]
    fn test_build_time_attributes() {
        let dir = TempDir::new().unwrap();
        let trace = build_fixture(&dir.path().join("app.tracex"));

        let s0 = trace.step(0).unwrap();
        assert_eq!(s0.attribute("latency"), Some(AttrValue::Float(1.5)));
        assert_eq!(
            trace.attribute("network"),
            Some(AttrValue::String("demo".into()))
        );
    }

    #[test]
    fn test_out_of_order_step_ids_rejected() {
        let dir = TempDir::new().unwrap();
        let mut builder = TraceBuilder::new(&dir.path().join("app.tracex"));
        builder.configure(&small_config()).unwrap();
        builder.add_step(step(0, "a", "x", "A")).unwrap();
        let err = builder.add_step(step(5, "a", "x", "A")).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn test_unconfigured_builder_rejects_steps() {
        let dir = TempDir::new().unwrap();
        let mut builder = TraceBuilder::new(&dir.path().join("app.tracex"));
        let err = builder.add_step(step(0, "a", "x", "A")).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }
}

// ============================================================================
// Dependency Tests
// ============================================================================

mod dependencies {
    use super::*;

    #[test]
    fn test_incoming_and_outgoing_sets() {
        let dir = TempDir::new().unwrap();
        let trace = build_fixture(&dir.path().join("app.tracex"));

        let s2 = trace.step(2).unwrap();
        let incoming = s2.incoming();
        assert_eq!(incoming.len(), 2);
        assert!(incoming
            .iter()
            .all(|d| d.kind() == DependencyKind::Tokens && d.target_id() == Some(2)));

        let outgoing = s2.outgoing();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].kind(), DependencyKind::Guard);
    }

    #[test]
    fn test_tokens_payload() {
        let dir = TempDir::new().unwrap();
        let trace = build_fixture(&dir.path().join("app.tracex"));

        let s0 = trace.step(0).unwrap();
        let tokens_dep = s0
            .outgoing()
            .into_iter()
            .find(|d| d.kind() == DependencyKind::Tokens)
            .unwrap();
        assert_eq!(tokens_dep.source_port().as_deref(), Some("out"));
        assert_eq!(tokens_dep.target_port().as_deref(), Some("in"));
        assert_eq!(tokens_dep.count(), Some(2));
        assert_eq!(tokens_dep.source_actor(), "src");
        assert_eq!(tokens_dep.target_actor(), "mix");
        // payload fields of other kinds stay absent
        assert_eq!(tokens_dep.guard(), None);
        assert_eq!(tokens_dep.direction(), None);
    }

    #[test]
    fn test_guard_payload_and_attributes() {
        let dir = TempDir::new().unwrap();
        let trace = build_fixture(&dir.path().join("app.tracex"));

        let s4 = trace.step(4).unwrap();
        let guard_dep = s4
            .incoming()
            .into_iter()
            .find(|d| d.kind() == DependencyKind::Guard)
            .unwrap();
        assert_eq!(guard_dep.guard().as_deref(), Some("ready"));
        assert_eq!(guard_dep.direction(), Some(Direction::Read));
        assert_eq!(guard_dep.attribute("weight"), Some(AttrValue::Int(7)));

        let variable_dep = s4
            .incoming()
            .into_iter()
            .find(|d| d.kind() == DependencyKind::Variable)
            .unwrap();
        assert_eq!(variable_dep.variable().as_deref(), Some("buf"));
        assert_eq!(variable_dep.direction(), Some(Direction::Write));
    }

    #[test]
    fn test_endpoint_views() {
        let dir = TempDir::new().unwrap();
        let trace = build_fixture(&dir.path().join("app.tracex"));

        let dep = trace.step(3).unwrap().outgoing().remove(0);
        let source = dep.source().unwrap();
        let target = dep.target().unwrap();
        assert_eq!(source.id(), 3);
        assert_eq!(target.id(), 4);
        assert_eq!(dep.source_action(), "flush");
        assert_eq!(dep.target_action(), "take");
    }
}

// ============================================================================
// Iteration Order Tests
// ============================================================================

mod iteration {
    use super::*;

    #[test]
    fn test_id_orders() {
        let dir = TempDir::new().unwrap();
        let trace = build_fixture(&dir.path().join("app.tracex"));

        assert_eq!(
            ids(trace.steps(Order::IncreasingId).unwrap()),
            vec![0, 1, 2, 3, 4]
        );
        assert_eq!(
            ids(trace.steps(Order::DecreasingId).unwrap()),
            vec![4, 3, 2, 1, 0]
        );
    }

    #[test]
    fn test_topological_orders_sort_implicitly() {
        let dir = TempDir::new().unwrap();
        let trace = build_fixture(&dir.path().join("app.tracex"));

        assert!(!trace.is_sorted());
        let forward = ids(trace.steps(Order::IncreasingTo).unwrap());
        assert!(trace.is_sorted());
        assert_eq!(forward, vec![0, 1, 2, 3, 4]);

        let mut backward = ids(trace.steps(Order::DecreasingTo).unwrap());
        backward.reverse();
        assert_eq!(backward, forward);
    }

    #[test]
    fn test_filtered_by_actor() {
        let dir = TempDir::new().unwrap();
        let trace = build_fixture(&dir.path().join("app.tracex"));

        assert_eq!(
            ids(trace.steps_by_actor(Order::IncreasingId, "src").unwrap()),
            vec![0, 1, 3]
        );
        assert_eq!(
            ids(trace.steps_by_actor(Order::DecreasingTo, "src").unwrap()),
            vec![3, 1, 0]
        );
        assert_eq!(
            ids(trace.steps_by_actor(Order::IncreasingId, "nobody").unwrap()),
            Vec::<StepId>::new()
        );
    }

    #[test]
    fn test_linear_fsm_chain_with_alternating_actors() {
        let dir = TempDir::new().unwrap();
        let mut builder = TraceBuilder::new(&dir.path().join("chain.tracex"));
        builder.configure(&small_config()).unwrap();
        for id in 0..5u64 {
            let actor = if id % 2 == 0 { "A" } else { "B" };
            builder.add_step(step(id, actor, "fire", "Alt")).unwrap();
        }
        for id in 0..4u64 {
            let source_actor = if id % 2 == 0 { "A" } else { "B" };
            let target_actor = if id % 2 == 0 { "B" } else { "A" };
            builder
                .add_fsm_dependency(
                    Endpoint::new(id, source_actor, "fire"),
                    Endpoint::new(id + 1, target_actor, "fire"),
                    HashMap::new(),
                )
                .unwrap();
        }
        let trace = builder.build().unwrap();

        assert_eq!(
            ids(trace.steps(Order::IncreasingTo).unwrap()),
            vec![0, 1, 2, 3, 4]
        );
        assert_eq!(
            ids(trace.steps(Order::DecreasingTo).unwrap()),
            vec![4, 3, 2, 1, 0]
        );
        assert_eq!(
            ids(trace.steps_by_actor(Order::IncreasingTo, "A").unwrap()),
            vec![0, 2, 4]
        );
        assert_eq!(
            ids(trace.steps_by_actor(Order::DecreasingId, "B").unwrap()),
            vec![3, 1]
        );
    }

    #[test]
    fn test_filtered_by_action() {
        let dir = TempDir::new().unwrap();
        let trace = build_fixture(&dir.path().join("app.tracex"));

        assert_eq!(
            ids(trace
                .steps_by_action(Order::IncreasingId, "src", "emit")
                .unwrap()),
            vec![0, 1]
        );
        assert_eq!(
            ids(trace
                .steps_by_action(Order::IncreasingId, "src", "take")
                .unwrap()),
            Vec::<StepId>::new()
        );
    }
}

// ============================================================================
// Sorting Tests
// ============================================================================

mod sorting {
    use super::*;

    #[test]
    fn test_sort_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let trace = build_fixture(&dir.path().join("app.tracex"));

        trace.sort().unwrap();
        assert!(trace.is_sorted());
        trace.sort().unwrap();
        assert_eq!(ids(trace.steps(Order::IncreasingTo).unwrap()).len(), 5);
    }

    #[test]
    fn test_dependencies_survive_the_sort() {
        let dir = TempDir::new().unwrap();
        let trace = build_fixture(&dir.path().join("app.tracex"));

        trace.sort().unwrap();
        assert_eq!(trace.dependency_count(), 6);
        assert_eq!(trace.step(2).unwrap().incoming().len(), 2);
        assert_eq!(trace.step(4).unwrap().incoming().len(), 2);
    }

    #[test]
    fn test_sorted_order_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let trace_file = dir.path().join("app.tracex");
        let trace = build_fixture(&trace_file);
        trace.sort().unwrap();
        assert!(trace.close());

        let reopened = Trace::open(&trace_file, &small_config()).unwrap();
        assert!(reopened.is_sorted());
        assert_eq!(
            ids(reopened.steps(Order::IncreasingTo).unwrap()),
            vec![0, 1, 2, 3, 4]
        );
    }

    #[test]
    fn test_cycle_is_detected() {
        let dir = TempDir::new().unwrap();
        let mut builder = TraceBuilder::new(&dir.path().join("cyclic.tracex"));
        builder.configure(&small_config()).unwrap();
        builder.add_step(step(0, "a", "x", "A")).unwrap();
        builder.add_step(step(1, "a", "y", "A")).unwrap();
        builder
            .add_fsm_dependency(
                Endpoint::new(0, "a", "x"),
                Endpoint::new(1, "a", "y"),
                HashMap::new(),
            )
            .unwrap();
        builder
            .add_variable_dependency(
                Endpoint::new(1, "a", "y"),
                Endpoint::new(0, "a", "x"),
                "v",
                Direction::Write,
                HashMap::new(),
            )
            .unwrap();
        let trace = builder.build().unwrap();

        let err = trace.sort().unwrap_err();
        assert!(matches!(
            err,
            Error::SchedulingCycle { placed: 0, total: 2 }
        ));
        assert!(!trace.is_sorted());
    }
}

// ============================================================================
// Attribute Protocol Tests
// ============================================================================

mod attributes {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let dir = TempDir::new().unwrap();
        let trace = build_fixture(&dir.path().join("app.tracex"));

        let s1 = trace.step(1).unwrap();
        assert!(s1.set_attribute("energy", AttrValue::Float(0.25)));
        assert_eq!(s1.attribute("energy"), Some(AttrValue::Float(0.25)));
        assert!(s1.has_attribute("energy"));
        assert!(s1.remove_attribute("energy"));
        assert!(!s1.remove_attribute("energy"));
        assert_eq!(s1.attribute("energy"), None);
    }

    #[test]
    fn test_reserved_names_are_rejected_but_readable() {
        let dir = TempDir::new().unwrap();
        let trace = build_fixture(&dir.path().join("app.tracex"));

        let s0 = trace.step(0).unwrap();
        assert!(!s0.set_attribute("_tg_actor", AttrValue::String("evil".into())));
        assert!(!s0.remove_attribute("_tg_actor"));
        assert_eq!(s0.actor(), "src");
        // exact-key reads of structural properties still work
        assert_eq!(
            s0.attribute("_tg_actor"),
            Some(AttrValue::String("src".into()))
        );
    }

    #[test]
    fn test_enumeration_excludes_structural_keys() {
        let dir = TempDir::new().unwrap();
        let trace = build_fixture(&dir.path().join("app.tracex"));

        let s0 = trace.step(0).unwrap();
        assert_eq!(s0.attribute_names(), vec!["latency".to_string()]);
        let all = s0.attributes();
        assert_eq!(all.len(), 1);
        assert_eq!(all.get("latency"), Some(&AttrValue::Float(1.5)));
    }

    #[test]
    fn test_structured_values_roundtrip_through_storage() {
        let dir = TempDir::new().unwrap();
        let trace = build_fixture(&dir.path().join("app.tracex"));

        let s3 = trace.step(3).unwrap();
        let map = AttrValue::StringIntMap(BTreeMap::from([("a".to_string(), 1)]));
        assert!(s3.set_attribute("histogram", map.clone()));
        assert_eq!(s3.attribute("histogram"), Some(map));

        let blob = AttrValue::Blob {
            tag: "profile/v1".into(),
            bytes: vec![1, 2, 3],
        };
        assert!(s3.set_attribute("profile", blob.clone()));
        assert_eq!(s3.attribute("profile"), Some(blob));
    }

    #[test]
    fn test_dependency_attributes() {
        let dir = TempDir::new().unwrap();
        let trace = build_fixture(&dir.path().join("app.tracex"));

        let dep = trace.step(2).unwrap().outgoing().remove(0);
        assert!(dep.set_attribute("slack", AttrValue::Int(3)));
        assert_eq!(dep.attribute("slack"), Some(AttrValue::Int(3)));
        assert!(!dep.set_attribute("_tg_guard", AttrValue::Int(0)));
        let mut names = dep.attribute_names();
        names.sort();
        assert_eq!(names, vec!["slack".to_string(), "weight".to_string()]);
        dep.remove_attributes();
        assert!(dep.attribute_names().is_empty());
        // structural payload untouched by the bulk removal
        assert_eq!(dep.guard().as_deref(), Some("ready"));
    }

    #[test]
    fn test_mutations_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let trace_file = dir.path().join("app.tracex");
        let trace = build_fixture(&trace_file);
        trace
            .step(1)
            .unwrap()
            .set_attribute("checked", AttrValue::Bool(true));
        trace.set_attribute("revision", AttrValue::Int(2));
        assert!(trace.close());

        let reopened = Trace::open(&trace_file, &small_config()).unwrap();
        assert_eq!(
            reopened.step(1).unwrap().attribute("checked"),
            Some(AttrValue::Bool(true))
        );
        assert_eq!(reopened.attribute("revision"), Some(AttrValue::Int(2)));
    }
}

// ============================================================================
// Scheduler Dependency Tests
// ============================================================================

mod scheduler {
    use super::*;

    #[test]
    fn test_add_and_remove() {
        let dir = TempDir::new().unwrap();
        let trace = build_fixture(&dir.path().join("app.tracex"));

        let dep = trace.add_scheduler_dependency(2, 3).unwrap();
        assert_eq!(dep.kind(), DependencyKind::Scheduler);
        assert_eq!(dep.source_id(), Some(2));
        assert_eq!(dep.target_id(), Some(3));
        assert_eq!(dep.source_actor(), "mix");
        assert_eq!(dep.target_actor(), "src");
        assert_eq!(trace.dependency_count(), 7);

        let outgoing = trace.step(2).unwrap().outgoing();
        assert!(outgoing
            .iter()
            .any(|d| d.kind() == DependencyKind::Scheduler));

        assert_eq!(trace.remove_scheduler_dependencies().unwrap(), 1);
        assert_eq!(trace.dependency_count(), 6);
        assert!(!trace
            .step(2)
            .unwrap()
            .outgoing()
            .iter()
            .any(|d| d.kind() == DependencyKind::Scheduler));
    }

    #[test]
    fn test_unknown_endpoint_fails() {
        let dir = TempDir::new().unwrap();
        let trace = build_fixture(&dir.path().join("app.tracex"));
        let err = trace.add_scheduler_dependency(0, 42).unwrap_err();
        assert!(matches!(err, Error::Lookup(42)));
    }

    #[test]
    fn test_scheduler_edges_constrain_the_sort() {
        let dir = TempDir::new().unwrap();
        let trace = build_fixture(&dir.path().join("app.tracex"));

        // force 3 before 2; both orders are valid without it
        trace.add_scheduler_dependency(3, 2).unwrap();
        let order = ids(trace.steps(Order::IncreasingTo).unwrap());
        let pos = |id: StepId| order.iter().position(|x| *x == id).unwrap();
        assert!(pos(3) < pos(2));
    }
}

// ============================================================================
// Loader Tests
// ============================================================================

mod loader {
    use super::*;
    use std::fs;

    #[test]
    fn test_first_load_builds() {
        let dir = TempDir::new().unwrap();
        let trace_file = dir.path().join("app.tracex");
        let mut source = FixtureSource::new();

        let trace = TraceLoader::load(&trace_file, &small_config(), &mut source).unwrap();
        assert_eq!(source.calls, 1);
        assert_eq!(trace.step_count(), 5);
        assert!(db_dir_for(&trace_file).exists());
    }

    #[test]
    fn test_second_load_reuses_database() {
        let dir = TempDir::new().unwrap();
        let trace_file = dir.path().join("app.tracex");
        let mut source = FixtureSource::new();

        TraceLoader::load(&trace_file, &small_config(), &mut source)
            .unwrap()
            .close();
        let trace = TraceLoader::load(&trace_file, &small_config(), &mut source).unwrap();
        assert_eq!(source.calls, 1);
        assert_eq!(trace.dependency_count(), 6);
    }

    #[test]
    fn test_corrupt_metadata_triggers_rebuild() {
        let dir = TempDir::new().unwrap();
        let trace_file = dir.path().join("app.tracex");
        let mut source = FixtureSource::new();

        TraceLoader::load(&trace_file, &small_config(), &mut source)
            .unwrap()
            .close();
        fs::write(
            db_dir_for(&trace_file).join(PROPERTIES_FILE),
            "steps=not-a-number\n",
        )
        .unwrap();

        let trace = TraceLoader::load(&trace_file, &small_config(), &mut source).unwrap();
        assert_eq!(source.calls, 2);
        assert_eq!(trace.step_count(), 5);
    }

    #[test]
    fn test_discard_flag_forces_rebuild() {
        let dir = TempDir::new().unwrap();
        let trace_file = dir.path().join("app.tracex");
        let mut source = FixtureSource::new();

        TraceLoader::load(&trace_file, &small_config(), &mut source)
            .unwrap()
            .close();
        let config = TraceConfig {
            discard_trace_data: true,
            ..small_config()
        };
        TraceLoader::load(&trace_file, &config, &mut source)
            .unwrap()
            .close();
        assert_eq!(source.calls, 2);
    }
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

mod lifecycle {
    use super::*;

    #[test]
    fn test_close_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let trace = build_fixture(&dir.path().join("app.tracex"));
        assert!(trace.close());
        assert!(trace.close());
    }

    #[test]
    fn test_failed_close_can_be_retried() {
        let dir = TempDir::new().unwrap();
        let trace_file = dir.path().join("app.tracex");
        let trace = build_fixture(&trace_file);

        // squat on the metadata file name so the final store cannot land
        let props_path = db_dir_for(&trace_file).join(PROPERTIES_FILE);
        std::fs::remove_file(&props_path).unwrap();
        std::fs::create_dir(&props_path).unwrap();
        assert!(!trace.close(), "close must report the failed shutdown");

        std::fs::remove_dir(&props_path).unwrap();
        assert!(trace.close(), "close must succeed once the cause is gone");
        assert!(trace.close(), "a successful close stays idempotent");

        let reopened = Trace::open(&trace_file, &small_config()).unwrap();
        assert_eq!(reopened.step_count(), 5);
    }

    #[test]
    fn test_views_keep_the_trace_usable_after_handle_drop() {
        let dir = TempDir::new().unwrap();
        let trace = build_fixture(&dir.path().join("app.tracex"));
        let s0 = trace.step(0).unwrap();
        drop(trace);
        // the view holds the shared state alive
        assert_eq!(s0.actor(), "src");
        assert_eq!(s0.outgoing().len(), 2);
    }

    #[test]
    fn test_drop_without_close_persists() {
        let dir = TempDir::new().unwrap();
        let trace_file = dir.path().join("app.tracex");
        {
            let trace = build_fixture(&trace_file);
            trace.step(0).unwrap().set_attribute("seen", AttrValue::Bool(true));
        }
        let reopened = Trace::open(&trace_file, &small_config()).unwrap();
        assert_eq!(
            reopened.step(0).unwrap().attribute("seen"),
            Some(AttrValue::Bool(true))
        );
    }
}
