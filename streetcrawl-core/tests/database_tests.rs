// Tests for database functionality

use streetcrawl_core::data::{Database, EdgeKind, PanoramaStatus, RunCounts};
use tempfile::TempDir;

fn create_test_db() -> (TempDir, Database) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = Database::new(&db_path).unwrap();
    (temp_dir, db)
}

// ============================================================================
// Database Creation Tests
// ============================================================================

#[test]
fn test_database_creation() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");

    let db = Database::new(&db_path);
    assert!(db.is_ok());
    assert!(db_path.exists());
}

#[test]
fn test_database_exists() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");

    assert!(!Database::exists(&db_path));
    let _db = Database::new(&db_path).unwrap();
    assert!(Database::exists(&db_path));
}

#[test]
fn test_reopen_keeps_data() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");

    let db = Database::new(&db_path).unwrap();
    db.upsert_panorama("P0", 43.65, -79.40, PanoramaStatus::Pending)
        .unwrap();
    db.close().unwrap();

    let db = Database::new(&db_path).unwrap();
    assert_eq!(db.count_panoramas().unwrap(), 1);
    assert_eq!(db.get_pending(10).unwrap(), vec!["P0".to_string()]);
}

#[test]
fn test_new_store_is_empty() {
    let (_temp_dir, db) = create_test_db();

    assert_eq!(db.count_panoramas().unwrap(), 0);
    assert_eq!(db.count_edges(EdgeKind::Neighbor).unwrap(), 0);
    assert_eq!(db.count_edges(EdgeKind::Link).unwrap(), 0);
    assert!(db.get_pending(10).unwrap().is_empty());
}

// ============================================================================
// Panorama Tests
// ============================================================================

#[test]
fn test_upsert_new_panorama() {
    let (_temp_dir, db) = create_test_db();

    let inserted = db
        .upsert_panorama("P0", 43.65, -79.40, PanoramaStatus::Pending)
        .unwrap();
    assert!(inserted);

    let row = db.get_panorama("P0").unwrap().unwrap();
    assert_eq!(row.id, "P0");
    assert_eq!(row.lat, 43.65);
    assert_eq!(row.lon, -79.40);
    assert_eq!(row.status, PanoramaStatus::Pending);
    assert!(row.discovered_at > 0);
    assert!(row.processed_at.is_none());
}

#[test]
fn test_upsert_existing_panorama_is_noop() {
    let (_temp_dir, db) = create_test_db();

    db.upsert_panorama("P0", 43.65, -79.40, PanoramaStatus::Pending)
        .unwrap();
    let inserted = db
        .upsert_panorama("P0", 10.0, 10.0, PanoramaStatus::Pending)
        .unwrap();

    assert!(!inserted);
    assert_eq!(db.count_panoramas().unwrap(), 1);

    // First write wins for coordinates
    let row = db.get_panorama("P0").unwrap().unwrap();
    assert_eq!(row.lat, 43.65);
    assert_eq!(row.lon, -79.40);
}

#[test]
fn test_upsert_never_downgrades_processed() {
    let (_temp_dir, db) = create_test_db();

    db.upsert_panorama("P0", 43.65, -79.40, PanoramaStatus::Pending)
        .unwrap();
    db.mark_processed("P0").unwrap();
    db.upsert_panorama("P0", 43.65, -79.40, PanoramaStatus::Pending)
        .unwrap();

    let row = db.get_panorama("P0").unwrap().unwrap();
    assert_eq!(row.status, PanoramaStatus::Processed);
    assert!(row.processed_at.is_some());
}

#[test]
fn test_upsert_processed_promotes_pending() {
    let (_temp_dir, db) = create_test_db();

    db.upsert_panorama("P0", 43.65, -79.40, PanoramaStatus::Pending)
        .unwrap();
    let inserted = db
        .upsert_panorama("P0", 43.65, -79.40, PanoramaStatus::Processed)
        .unwrap();

    assert!(!inserted);
    let row = db.get_panorama("P0").unwrap().unwrap();
    assert_eq!(row.status, PanoramaStatus::Processed);
}

#[test]
fn test_upsert_new_processed_panorama() {
    let (_temp_dir, db) = create_test_db();

    db.upsert_panorama("P0", 43.65, -79.40, PanoramaStatus::Processed)
        .unwrap();

    let row = db.get_panorama("P0").unwrap().unwrap();
    assert_eq!(row.status, PanoramaStatus::Processed);
    assert!(row.processed_at.is_some());
    assert!(db.get_pending(10).unwrap().is_empty());
}

#[test]
fn test_mark_processed_unknown_id_is_noop() {
    let (_temp_dir, db) = create_test_db();

    assert!(db.mark_processed("missing").is_ok());
    assert_eq!(db.count_panoramas().unwrap(), 0);
}

#[test]
fn test_get_panorama_missing() {
    let (_temp_dir, db) = create_test_db();
    assert!(db.get_panorama("missing").unwrap().is_none());
}

#[test]
fn test_invalid_coordinates_rejected() {
    let (_temp_dir, db) = create_test_db();

    assert!(
        db.upsert_panorama("A", 91.0, 0.0, PanoramaStatus::Pending)
            .is_err()
    );
    assert!(
        db.upsert_panorama("B", 0.0, -180.5, PanoramaStatus::Pending)
            .is_err()
    );
    assert!(
        db.upsert_panorama("C", f64::NAN, 0.0, PanoramaStatus::Pending)
            .is_err()
    );
    assert_eq!(db.count_panoramas().unwrap(), 0);
}

#[test]
fn test_boundary_coordinates_accepted() {
    let (_temp_dir, db) = create_test_db();

    assert!(
        db.upsert_panorama("N", 90.0, 180.0, PanoramaStatus::Pending)
            .unwrap()
    );
    assert!(
        db.upsert_panorama("S", -90.0, -180.0, PanoramaStatus::Pending)
            .unwrap()
    );
}

#[test]
fn test_count_by_status() {
    let (_temp_dir, db) = create_test_db();

    for id in ["A", "B", "C"] {
        db.upsert_panorama(id, 43.65, -79.40, PanoramaStatus::Pending)
            .unwrap();
    }
    db.mark_processed("B").unwrap();

    assert_eq!(db.count_panoramas().unwrap(), 3);
    assert_eq!(db.count_by_status(PanoramaStatus::Pending).unwrap(), 2);
    assert_eq!(db.count_by_status(PanoramaStatus::Processed).unwrap(), 1);
}

// ============================================================================
// Frontier Tests
// ============================================================================

#[test]
fn test_get_pending_insertion_order() {
    let (_temp_dir, db) = create_test_db();

    for id in ["C", "A", "B"] {
        db.upsert_panorama(id, 43.65, -79.40, PanoramaStatus::Pending)
            .unwrap();
    }

    assert_eq!(
        db.get_pending(10).unwrap(),
        vec!["C".to_string(), "A".to_string(), "B".to_string()]
    );
}

#[test]
fn test_get_pending_respects_limit() {
    let (_temp_dir, db) = create_test_db();

    for id in ["A", "B", "C", "D"] {
        db.upsert_panorama(id, 43.65, -79.40, PanoramaStatus::Pending)
            .unwrap();
    }

    assert_eq!(db.get_pending(2).unwrap(), vec!["A", "B"]);
    assert!(db.get_pending(0).unwrap().is_empty());
}

#[test]
fn test_get_pending_skips_processed() {
    let (_temp_dir, db) = create_test_db();

    for id in ["A", "B", "C"] {
        db.upsert_panorama(id, 43.65, -79.40, PanoramaStatus::Pending)
            .unwrap();
    }
    db.mark_processed("A").unwrap();

    assert_eq!(db.get_pending(10).unwrap(), vec!["B", "C"]);
}

// ============================================================================
// Edge Tests
// ============================================================================

#[test]
fn test_insert_neighbor_edge() {
    let (_temp_dir, db) = create_test_db();

    db.upsert_panorama("A", 43.65, -79.40, PanoramaStatus::Pending)
        .unwrap();
    db.upsert_panorama("B", 43.651, -79.40, PanoramaStatus::Pending)
        .unwrap();

    assert!(db.insert_edge(EdgeKind::Neighbor, "A", "B", None).unwrap());
    assert_eq!(db.count_edges(EdgeKind::Neighbor).unwrap(), 1);
    assert_eq!(db.count_edges(EdgeKind::Link).unwrap(), 0);
    assert_eq!(db.get_edges_from(EdgeKind::Neighbor, "A").unwrap(), vec!["B"]);
}

#[test]
fn test_insert_link_edge_with_direction() {
    let (_temp_dir, db) = create_test_db();

    db.upsert_panorama("A", 43.65, -79.40, PanoramaStatus::Pending)
        .unwrap();
    db.upsert_panorama("B", 43.651, -79.40, PanoramaStatus::Pending)
        .unwrap();

    assert!(
        db.insert_edge(EdgeKind::Link, "A", "B", Some(87.5))
            .unwrap()
    );

    let direction: Option<f64> = db
        .get_connection()
        .query_row(
            "SELECT direction FROM links WHERE source_id = 'A' AND target_id = 'B'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(direction, Some(87.5));
}

#[test]
fn test_duplicate_edge_is_ignored() {
    let (_temp_dir, db) = create_test_db();

    db.upsert_panorama("A", 43.65, -79.40, PanoramaStatus::Pending)
        .unwrap();
    db.upsert_panorama("B", 43.651, -79.40, PanoramaStatus::Pending)
        .unwrap();

    assert!(db.insert_edge(EdgeKind::Link, "A", "B", None).unwrap());
    assert!(!db.insert_edge(EdgeKind::Link, "A", "B", None).unwrap());
    assert_eq!(db.count_edges(EdgeKind::Link).unwrap(), 1);
}

#[test]
fn test_edges_are_directed() {
    let (_temp_dir, db) = create_test_db();

    db.upsert_panorama("A", 43.65, -79.40, PanoramaStatus::Pending)
        .unwrap();
    db.upsert_panorama("B", 43.651, -79.40, PanoramaStatus::Pending)
        .unwrap();

    assert!(db.insert_edge(EdgeKind::Neighbor, "A", "B", None).unwrap());
    assert!(db.insert_edge(EdgeKind::Neighbor, "B", "A", None).unwrap());
    assert_eq!(db.count_edges(EdgeKind::Neighbor).unwrap(), 2);
}

#[test]
fn test_same_pair_in_both_relations() {
    let (_temp_dir, db) = create_test_db();

    db.upsert_panorama("A", 43.65, -79.40, PanoramaStatus::Pending)
        .unwrap();
    db.upsert_panorama("B", 43.651, -79.40, PanoramaStatus::Pending)
        .unwrap();

    assert!(db.insert_edge(EdgeKind::Neighbor, "A", "B", None).unwrap());
    assert!(db.insert_edge(EdgeKind::Link, "A", "B", None).unwrap());
}

#[test]
fn test_edge_to_unknown_panorama_rejected() {
    let (_temp_dir, db) = create_test_db();

    db.upsert_panorama("A", 43.65, -79.40, PanoramaStatus::Pending)
        .unwrap();

    assert!(
        db.insert_edge(EdgeKind::Neighbor, "A", "ghost", None)
            .is_err()
    );
    assert_eq!(db.count_edges(EdgeKind::Neighbor).unwrap(), 0);
}

#[test]
fn test_get_edges_from_insertion_order() {
    let (_temp_dir, db) = create_test_db();

    for id in ["A", "B", "C", "D"] {
        db.upsert_panorama(id, 43.65, -79.40, PanoramaStatus::Pending)
            .unwrap();
    }
    db.insert_edge(EdgeKind::Link, "A", "D", None).unwrap();
    db.insert_edge(EdgeKind::Link, "A", "B", None).unwrap();
    db.insert_edge(EdgeKind::Link, "B", "C", None).unwrap();

    assert_eq!(
        db.get_edges_from(EdgeKind::Link, "A").unwrap(),
        vec!["D", "B"]
    );
    assert!(db.get_edges_from(EdgeKind::Link, "C").unwrap().is_empty());
}

// ============================================================================
// Transaction Tests
// ============================================================================

#[test]
fn test_transaction_commit() {
    let (_temp_dir, db) = create_test_db();

    let tx = db.transaction().unwrap();
    db.upsert_panorama("A", 43.65, -79.40, PanoramaStatus::Pending)
        .unwrap();
    tx.commit().unwrap();

    assert_eq!(db.count_panoramas().unwrap(), 1);
}

#[test]
fn test_transaction_rollback_on_drop() {
    let (_temp_dir, db) = create_test_db();

    {
        let _tx = db.transaction().unwrap();
        db.upsert_panorama("A", 43.65, -79.40, PanoramaStatus::Pending)
            .unwrap();
    }

    assert_eq!(db.count_panoramas().unwrap(), 0);
}

// ============================================================================
// Run Tests
// ============================================================================

#[test]
fn test_create_run() {
    let (_temp_dir, db) = create_test_db();

    let run_id = db.create_run(25).unwrap();
    assert!(!run_id.is_empty());

    let runs = db.get_recent_runs(10).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].id, run_id);
    assert_eq!(runs[0].status, "running");
    assert_eq!(runs[0].max_new, 25);
    assert!(runs[0].end_time.is_none());
}

#[test]
fn test_complete_run() {
    let (_temp_dir, db) = create_test_db();

    let run_id = db.create_run(25).unwrap();
    let counts = RunCounts {
        processed: 20,
        failed: 5,
        discovered: 40,
        discarded: 3,
    };
    db.complete_run(&run_id, &counts).unwrap();

    let run = &db.get_recent_runs(1).unwrap()[0];
    assert_eq!(run.status, "completed");
    assert!(run.end_time.is_some());
    assert_eq!(run.processed, 20);
    assert_eq!(run.failed, 5);
    assert_eq!(run.discovered, 40);
    assert_eq!(run.discarded, 3);
}

#[test]
fn test_fail_run() {
    let (_temp_dir, db) = create_test_db();

    let run_id = db.create_run(10).unwrap();
    db.fail_run(&run_id, &RunCounts::default()).unwrap();

    let run = &db.get_recent_runs(1).unwrap()[0];
    assert_eq!(run.status, "failed");
    assert_eq!(run.processed, 0);
}

#[test]
fn test_recent_runs_newest_first() {
    let (_temp_dir, db) = create_test_db();

    let first = db.create_run(1).unwrap();
    let second = db.create_run(2).unwrap();
    let third = db.create_run(3).unwrap();

    let runs = db.get_recent_runs(2).unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].id, third);
    assert_eq!(runs[1].id, second);
    assert_ne!(runs[1].id, first);
}

#[test]
fn test_run_ids_are_unique() {
    let (_temp_dir, db) = create_test_db();

    let a = db.create_run(1).unwrap();
    let b = db.create_run(1).unwrap();
    assert_ne!(a, b);
}

// ============================================================================
// Status Tests
// ============================================================================

#[test]
fn test_status_round_trip() {
    for status in [PanoramaStatus::Pending, PanoramaStatus::Processed] {
        assert_eq!(PanoramaStatus::parse(status.as_str()), Some(status));
    }
    assert_eq!(PanoramaStatus::parse("done"), None);
}

#[test]
fn test_edge_kind_tables() {
    assert_eq!(EdgeKind::Neighbor.table(), "neighbors");
    assert_eq!(EdgeKind::Link.table(), "links");
}
