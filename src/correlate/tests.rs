use super::*;
use crate::classify::NodeDescriptor;
use crate::error::EngineError;
use crate::store::{write_classification, DataFiles};
use std::fs;
use tempfile::TempDir;

fn descriptor(node: &str, index: u64, setter: bool, checkpoint: bool) -> NodeDescriptor {
    NodeDescriptor {
        key: NodeKey::new("ecall_entry", node),
        global_index: index,
        is_context_setter: setter,
        is_checkpoint: checkpoint,
    }
}

/// entry -> A -> B(ret)
fn straight_line_table() -> Vec<NodeDescriptor> {
    vec![
        descriptor("entry", 0, false, true),
        descriptor("A", 1, true, false),
        descriptor("B", 2, false, true),
    ]
}

fn key(node: &str) -> NodeKey {
    NodeKey::new("ecall_entry", node)
}

fn run(
    table: &[NodeDescriptor],
    visits: &[(&str, Option<u64>)],
) -> (JoinOutcome, ScanOutcome) {
    let index = ClassificationIndex::from_descriptors(table);
    let timings = visits.iter().map(|(_, e)| Ok(*e));
    let trace = visits.iter().map(|(n, _)| Ok(key(n)));
    let joined = join(&index, timings, trace).unwrap();
    let scanned = build_observations(&joined.samples);
    (joined, scanned)
}

fn observations_for<'a>(
    observations: &'a [ContextObservation],
    node: &str,
) -> Vec<&'a ContextObservation> {
    observations
        .iter()
        .filter(|o| o.checkpoint == key(node))
        .collect()
}

#[test]
fn test_two_training_passes() {
    let visits = [
        ("entry", Some(5)),
        ("A", None),
        ("B", Some(100)),
        ("entry", Some(6)),
        ("A", None),
        ("B", Some(140)),
    ];
    let (joined, scanned) = run(&straight_line_table(), &visits);
    assert_eq!(joined.misses, 0);

    let b = observations_for(&scanned.observations, "B");
    assert_eq!(b.len(), 2);
    let mut elapsed: Vec<u64> = b.iter().map(|o| o.elapsed).collect();
    elapsed.sort_unstable();
    assert_eq!(elapsed, vec![100, 140]);
    for o in &b {
        assert_eq!(
            o.context,
            Context::Resolved {
                key: key("A"),
                index: 1
            }
        );
    }
}

#[test]
fn test_first_visit_closes_with_start() {
    let (_, scanned) = run(&straight_line_table(), &[("entry", Some(5)), ("A", None)]);
    assert_eq!(scanned.observations.len(), 1);
    assert_eq!(scanned.observations[0].context, Context::Start);
    assert_eq!(scanned.observations[0].context.index(), -1);
}

#[test]
fn test_second_entry_visit_is_preceded_by_previous_pass() {
    let visits = [
        ("entry", Some(5)),
        ("A", None),
        ("B", Some(100)),
        ("entry", Some(6)),
    ];
    let (_, scanned) = run(&straight_line_table(), &visits);
    let entry = observations_for(&scanned.observations, "entry");
    assert_eq!(entry.len(), 2);
    // latest first
    assert_eq!(entry[0].context.index(), 2);
    assert_eq!(entry[1].context, Context::Start);
}

#[test]
fn test_join_miss_yields_unresolved_context() {
    // X was compiled in a unit that never ran the enumerate phase
    let visits = [("entry", Some(5)), ("X", None), ("B", Some(80))];
    let (joined, scanned) = run(&straight_line_table(), &visits);

    assert_eq!(joined.misses, 1);
    assert!(joined.missed_keys.contains(&key("X")));

    let b = observations_for(&scanned.observations, "B");
    assert_eq!(b.len(), 1);
    assert_eq!(b[0].context, Context::Unresolved { key: key("X") });
    assert_eq!(b[0].context.index(), -1);
    assert!(!b[0].context.contributes_to_baseline());
}

#[test]
fn test_missed_checkpoint_is_not_opened() {
    let visits = [("entry", Some(5)), ("ghost", Some(9))];
    let (_, scanned) = run(&straight_line_table(), &visits);
    // only the entry visit (closed by Start)
    assert_eq!(scanned.observations.len(), 1);
    assert_eq!(scanned.observations[0].checkpoint, key("entry"));
}

#[test]
fn test_untimed_checkpoint_is_counted() {
    let visits = [("entry", Some(5)), ("A", None), ("B", None)];
    let (_, scanned) = run(&straight_line_table(), &visits);
    assert_eq!(scanned.untimed_checkpoints, 1);
    assert!(observations_for(&scanned.observations, "B").is_empty());
}

#[test]
fn test_node_with_both_roles_closes_then_opens() {
    let table = vec![
        descriptor("pre", 0, true, false),
        descriptor("header", 1, true, true),
        descriptor("body", 2, true, false),
        descriptor("exit", 3, false, true),
    ];
    let visits = [
        ("pre", None),
        ("header", Some(10)),
        ("body", None),
        ("header", Some(12)),
        ("exit", Some(4)),
    ];
    let (_, scanned) = run(&table, &visits);

    let exit = observations_for(&scanned.observations, "exit");
    assert_eq!(exit.len(), 1);
    assert_eq!(exit[0].context.index(), 1);

    let header = observations_for(&scanned.observations, "header");
    let contexts: Vec<i64> = header.iter().map(|o| o.context.index()).collect();
    assert_eq!(contexts, vec![2, 0]);
}

#[test]
fn test_length_mismatch_uses_common_prefix() {
    let index = ClassificationIndex::from_descriptors(&straight_line_table());
    let timings = vec![Ok(Some(5)), Ok(None), Ok(Some(100)), Ok(Some(7))];
    let trace = vec![Ok(key("entry")), Ok(key("A")), Ok(key("B"))];
    let joined = join(&index, timings, trace).unwrap();
    assert!(joined.length_mismatch);
    assert_eq!(joined.samples.len(), 3);
}

#[test]
fn test_classification_index_later_record_wins() {
    let index = ClassificationIndex::from_descriptors(&[
        descriptor("A", 0, false, false),
        descriptor("A", 7, true, true),
    ]);
    assert_eq!(index.len(), 1);
    let class = index.get(&key("A")).unwrap();
    assert_eq!(class.global_index, 7);
    assert!(class.is_checkpoint);
}

fn write_training_data(dir: &std::path::Path) -> DataFiles {
    let files = DataFiles::new(dir);
    let mut table = Vec::new();
    write_classification(&mut table, &straight_line_table()).unwrap();
    fs::write(files.classification_table(), table).unwrap();
    fs::write(files.raw_timings(), "5\n-1\n100\n6\n-1\n140\n").unwrap();
    fs::write(
        files.trace(),
        "ecall_entry\nentry\necall_entry\nA\necall_entry\nB\n\
         ecall_entry\nentry\necall_entry\nA\necall_entry\nB\n",
    )
    .unwrap();
    files
}

#[test]
fn test_correlator_writes_and_reuses_cache() {
    let dir = TempDir::new().unwrap();
    let files = write_training_data(dir.path());

    let (first, report) = Correlator::new(&files, true).observations().unwrap();
    assert_eq!(report.source, ObservationSource::Correlated);
    assert!(report.cache_written);
    assert_eq!(report.visits, 6);
    assert!(files.observation_cache().exists());

    // raw streams are no longer needed once the cache exists
    fs::remove_file(files.raw_timings()).unwrap();
    fs::remove_file(files.trace()).unwrap();

    let (second, report) = Correlator::new(&files, true).observations().unwrap();
    assert_eq!(report.source, ObservationSource::Cache);
    assert_eq!(first, second);
}

#[test]
fn test_correlator_without_cache_ignores_cache_file() {
    let dir = TempDir::new().unwrap();
    let files = write_training_data(dir.path());
    fs::write(files.observation_cache(), "garbage\n").unwrap();

    let (observations, report) = Correlator::new(&files, false).observations().unwrap();
    assert_eq!(report.source, ObservationSource::Correlated);
    assert!(!report.cache_written);
    assert_eq!(observations.len(), 4);
}

#[test]
fn test_correlator_reports_missing_trace() {
    let dir = TempDir::new().unwrap();
    let files = write_training_data(dir.path());
    fs::remove_file(files.trace()).unwrap();

    let err = Correlator::new(&files, false).observations().unwrap_err();
    assert!(matches!(err, EngineError::MissingInput { kind: "trace file", .. }));
}
