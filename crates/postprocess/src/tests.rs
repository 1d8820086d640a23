use super::*;
use anyhow::Result;
use config::IngestConfig;
use std::io::Cursor;
use storage::{MemoryStore, ObjectStore};

const OUT: &str = "merged-formatted-csv-file";

fn setup(merged: &str) -> (MemoryStore, IngestConfig) {
    let cfg = IngestConfig::default();
    let store = MemoryStore::new();
    store.put(OUT, &cfg.merged_name, merged.as_bytes()).unwrap();
    (store, cfg)
}

// -------------------- Gap filling --------------------

#[test]
fn fills_missing_slots() -> Result<()> {
    let (store, cfg) = setup("0,511\n8,512\n32,513\n");
    let report = fill_gaps(&store, &cfg, OUT, &cfg.merged_name)?.unwrap();

    assert_eq!(report.segments, vec!["ecg_0.csv".to_string()]);
    assert_eq!(report.records, 3);
    assert_eq!(report.filled, 2);
    assert_eq!(
        store.lines(&cfg.gaps_container, "ecg_0.csv").unwrap(),
        vec!["0,511\n", "8,512\n", "16,-1\n", "24,-1\n", "32,513\n"]
    );
    Ok(())
}

#[test]
fn large_gap_starts_new_segment() -> Result<()> {
    let (store, cfg) = setup("0,1\n8,2\n40008,3\n40016,4\n");
    let report = fill_gaps(&store, &cfg, OUT, &cfg.merged_name)?.unwrap();

    assert_eq!(
        report.segments,
        vec!["ecg_0.csv".to_string(), "ecg_40008.csv".to_string()]
    );
    assert_eq!(report.filled, 0);
    assert_eq!(store.lines(&cfg.gaps_container, "ecg_0.csv").unwrap(), vec!["0,1\n", "8,2\n"]);
    assert_eq!(
        store.lines(&cfg.gaps_container, "ecg_40008.csv").unwrap(),
        vec!["40008,3\n", "40016,4\n"]
    );
    Ok(())
}

#[test]
fn gap_just_below_split_is_filled() -> Result<()> {
    let (store, cfg) = setup("0,1\n29992,2\n");
    let report = fill_gaps(&store, &cfg, OUT, &cfg.merged_name)?.unwrap();
    assert_eq!(report.segments.len(), 1);
    assert_eq!(report.filled, 29992 / 8 - 1);
    Ok(())
}

#[test]
fn misaligned_timestamps_are_an_error() {
    let (store, cfg) = setup("0,1\n5,2\n");
    let err = fill_gaps(&store, &cfg, OUT, &cfg.merged_name).unwrap_err();
    assert!(err.to_string().contains("not a multiple of 8"));
}

#[test]
fn extreme_timestamp_distance_is_an_error() {
    let (store, cfg) = setup("-9223372036854775808,511\n9223372036854775800,511\n");
    let err = fill_gaps(&store, &cfg, OUT, &cfg.merged_name).unwrap_err();
    assert!(err.to_string().contains("does not fit in i64"));
}

#[test]
fn timestamps_near_i64_max_are_filled() -> Result<()> {
    let (store, cfg) = setup("9223372036854775783,1\n9223372036854775807,2\n");
    let report = fill_gaps(&store, &cfg, OUT, &cfg.merged_name)?.unwrap();
    assert_eq!(report.filled, 2);
    assert_eq!(
        store.lines(&cfg.gaps_container, "ecg_9223372036854775783.csv").unwrap(),
        vec![
            "9223372036854775783,1\n",
            "9223372036854775791,-1\n",
            "9223372036854775799,-1\n",
            "9223372036854775807,2\n"
        ]
    );
    Ok(())
}

#[test]
fn non_canonical_name_leaves_destination_untouched() -> Result<()> {
    let (store, cfg) = setup("0,1\n");
    store.put(&cfg.gaps_container, "ecg_old.csv", b"keep\n")?;
    store.clear_operations();

    assert!(fill_gaps(&store, &cfg, OUT, &cfg.staging_name)?.is_none());
    assert!(fill_gaps(&store, &cfg, OUT, "other.csv")?.is_none());

    // No list, delete, read or write was issued for either trigger.
    assert!(store.operations().is_empty());
    assert_eq!(store.get(&cfg.gaps_container, "ecg_old.csv"), Some(b"keep\n".to_vec()));
    Ok(())
}

#[test]
fn destination_is_cleared_first() -> Result<()> {
    let (store, cfg) = setup("8,1\n");
    store.put(&cfg.gaps_container, "ecg_old.csv", b"stale\n")?;
    fill_gaps(&store, &cfg, OUT, &cfg.merged_name)?;
    assert_eq!(store.list(&cfg.gaps_container)?, vec!["ecg_8.csv".to_string()]);
    Ok(())
}

#[test]
fn empty_merged_stream_writes_nothing() -> Result<()> {
    let (store, cfg) = setup("");
    let report = fill_gaps(&store, &cfg, OUT, &cfg.merged_name)?.unwrap();
    assert!(report.segments.is_empty());
    assert!(store.list(&cfg.gaps_container)?.is_empty());
    Ok(())
}

// -------------------- ECG conversion --------------------

#[test]
fn strip_timestamps_keeps_values_and_skips_blank_lines() -> Result<()> {
    let mut out = Vec::new();
    let n = strip_timestamps(Cursor::new(b"0,511\n\n8,-1\n16,3".to_vec()), &mut out)?;
    assert_eq!(n, 3);
    assert_eq!(String::from_utf8(out)?, "511\n-1\n3");
    Ok(())
}

#[test]
fn ecg_name_replaces_every_csv() {
    assert_eq!(ecg_name("ecg_0.csv"), "ecg_0.ecg");
    assert_eq!(ecg_name("csv_1.csv"), "ecg_1.ecg");
}

#[test]
fn convert_writes_to_ecg_container() -> Result<()> {
    let cfg = IngestConfig::default();
    let store = MemoryStore::new();
    store.put(&cfg.gaps_container, "ecg_0.csv", b"0,511\n8,-1\n")?;

    let name = convert_to_ecg(&store, &cfg, &cfg.gaps_container, "ecg_0.csv")?;

    assert_eq!(name, "ecg_0.ecg");
    assert_eq!(store.get(&cfg.ecg_container, "ecg_0.ecg"), Some(b"511\n-1\n".to_vec()));
    Ok(())
}

#[test]
fn gaps_then_ecg_chain() -> Result<()> {
    let (store, cfg) = setup("0,511\n16,520\n");
    let report = fill_gaps(&store, &cfg, OUT, &cfg.merged_name)?.unwrap();
    for seg in &report.segments {
        convert_to_ecg(&store, &cfg, &cfg.gaps_container, seg)?;
    }
    assert_eq!(store.get(&cfg.ecg_container, "ecg_0.ecg"), Some(b"511\n-1\n520\n".to_vec()));
    Ok(())
}
