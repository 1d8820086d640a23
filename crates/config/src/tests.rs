use super::*;

#[test]
fn defaults_match_pipeline_names() {
    let c = IngestConfig::default();
    assert_eq!(c.merged_name, "merged.csv");
    assert_eq!(c.staging_name, "merged-tmp.csv");
    assert_eq!(c.output_container, "merged-formatted-csv-file");
    assert_eq!(c.gap_step, 8);
    assert_eq!(c.gap_split, 30_000);
    assert_eq!(c.order, OrderKind::Lexicographic);
    assert!(!c.dedup);
    assert!(c.validate().is_ok());
}

#[test]
fn order_kind_parses_case_insensitively() {
    assert_eq!("Numeric".parse::<OrderKind>().unwrap(), OrderKind::Numeric);
    assert_eq!("lex".parse::<OrderKind>().unwrap(), OrderKind::Lexicographic);
    assert!("chronological".parse::<OrderKind>().is_err());
}

#[test]
fn validate_rejects_same_staging_and_merged_name() {
    let c = IngestConfig {
        staging_name: "merged.csv".to_string(),
        ..IngestConfig::default()
    };
    assert!(c.validate().is_err());
}

#[test]
fn validate_rejects_non_positive_step() {
    let c = IngestConfig {
        gap_step: 0,
        ..IngestConfig::default()
    };
    assert!(c.validate().is_err());
}

// Environment mutation is process-global, so all env checks share one test.
#[test]
fn from_env_overrides_and_rejects_garbage() {
    std::env::set_var("SENSORFOLD_MERGED_NAME", "all.csv");
    std::env::set_var("SENSORFOLD_ORDER", "numeric");
    std::env::set_var("SENSORFOLD_DEDUP", "true");
    let c = IngestConfig::from_env().unwrap();
    assert_eq!(c.merged_name, "all.csv");
    assert_eq!(c.order, OrderKind::Numeric);
    assert!(c.dedup);

    std::env::set_var("SENSORFOLD_GAP_STEP", "eight");
    assert!(IngestConfig::from_env().is_err());

    for key in [
        "SENSORFOLD_MERGED_NAME",
        "SENSORFOLD_ORDER",
        "SENSORFOLD_DEDUP",
        "SENSORFOLD_GAP_STEP",
    ] {
        std::env::remove_var(key);
    }
}
