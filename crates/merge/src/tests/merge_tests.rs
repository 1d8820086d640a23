use crate::*;
use anyhow::Result;
use std::io::{BufReader, Cursor, Write};
use tempfile::tempdir;

fn lex(lines: &[&str]) -> SortedBatch {
    SortedBatch::from_lines(lines.iter().copied(), OrderKind::Lexicographic)
}

fn existing(lines: &[&str]) -> Option<Cursor<Vec<u8>>> {
    Some(Cursor::new(lines.concat().into_bytes()))
}

fn merge_to_vec(existing: Option<Cursor<Vec<u8>>>, batch: SortedBatch) -> Result<(MergeStats, String)> {
    let mut out = Vec::new();
    let stats = merge_into(existing, batch, &mut out)?;
    Ok((stats, String::from_utf8(out)?))
}

/// Deterministic pseudo-random sorted lines with equal-width timestamps.
fn sorted_lines(seed: u64, n: usize) -> Vec<String> {
    let mut x = seed;
    let mut lines: Vec<String> = (0..n)
        .map(|_| {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            format!("{:06},{}\n", (x >> 33) % 1000, (x >> 20) % 1024)
        })
        .collect();
    lines.sort();
    lines
}

// -------------------- First ingestion --------------------

#[test]
fn first_ingestion_writes_batch_in_order() -> Result<()> {
    let (stats, out) = merge_to_vec(None, lex(&["48,520\n", "0,511\n", "24,515\n"]))?;
    assert_eq!(out, "0,511\n24,515\n48,520\n");
    assert_eq!(stats.existing_lines, 0);
    assert_eq!(stats.batch_lines, 3);
    assert_eq!(stats.written_lines, 3);
    Ok(())
}

#[test]
fn first_ingestion_with_empty_batch_writes_nothing() -> Result<()> {
    let (stats, out) = merge_to_vec(None, lex(&[]))?;
    assert!(out.is_empty());
    assert_eq!(stats, MergeStats::default());
    Ok(())
}

// -------------------- Basic merge --------------------

#[test]
fn merge_interleaves_batch_into_existing() -> Result<()> {
    let (stats, out) = merge_to_vec(existing(&["0,511\n", "48,520\n"]), lex(&["24,515\n"]))?;
    assert_eq!(out, "0,511\n24,515\n48,520\n");
    assert_eq!(stats.existing_lines, 2);
    assert_eq!(stats.batch_lines, 1);
    assert_eq!(stats.written_lines, 3);
    Ok(())
}

#[test]
fn merge_batch_after_existing() -> Result<()> {
    let (_, out) = merge_to_vec(existing(&["1,1\n", "2,2\n"]), lex(&["3,3\n", "4,4\n"]))?;
    assert_eq!(out, "1,1\n2,2\n3,3\n4,4\n");
    Ok(())
}

#[test]
fn merge_batch_before_existing_copies_tail() -> Result<()> {
    let (stats, out) = merge_to_vec(existing(&["5,5\n", "6,6\n", "7,7\n"]), lex(&["1,1\n"]))?;
    assert_eq!(out, "1,1\n5,5\n6,6\n7,7\n");
    assert_eq!(stats.existing_lines, 3);
    Ok(())
}

#[test]
fn merge_empty_existing_object() -> Result<()> {
    let (stats, out) = merge_to_vec(existing(&[]), lex(&["1,1\n"]))?;
    assert_eq!(out, "1,1\n");
    assert_eq!(stats.existing_lines, 0);
    Ok(())
}

#[test]
fn merge_empty_batch_copies_existing() -> Result<()> {
    let (_, out) = merge_to_vec(existing(&["1,1\n", "2,2\n"]), lex(&[]))?;
    assert_eq!(out, "1,1\n2,2\n");
    Ok(())
}

#[test]
fn existing_tail_without_newline_is_copied_verbatim() -> Result<()> {
    let (_, out) = merge_to_vec(existing(&["1,1\n", "9,9"]), lex(&["5,5\n"]))?;
    assert_eq!(out, "1,1\n5,5\n9,9");
    Ok(())
}

#[test]
fn existing_tail_without_newline_is_terminated_before_batch_lines() -> Result<()> {
    let (stats, out) = merge_to_vec(existing(&["1,1\n", "5,5"]), lex(&["9,9\n"]))?;
    assert_eq!(out, "1,1\n5,5\n9,9\n");
    assert_eq!(stats.written_lines, 3);
    assert_eq!(out.lines().count(), stats.written_lines);
    Ok(())
}

#[test]
fn existing_tail_without_newline_may_repeat_previous_line() -> Result<()> {
    let (stats, out) = merge_to_vec(existing(&["5,5\n", "5,5"]), lex(&["7,7\n"]))?;
    assert_eq!(out, "5,5\n5,5\n7,7\n");
    assert_eq!(stats.existing_lines, 2);
    Ok(())
}

#[test]
fn existing_tail_without_newline_as_only_existing_line() -> Result<()> {
    let mut iter = MergeIterator::new(existing(&["5,5"]), lex(&["6,6\n", "7,7\n"]))?;
    assert_eq!(iter.next_entry()?, Some((Side::Existing, "5,5\n".to_string())));
    assert_eq!(iter.collect_all()?, vec!["6,6\n", "7,7\n"]);
    Ok(())
}

#[test]
fn existing_stream_in_another_order_is_rejected() {
    // Written lexicographically, read back numerically.
    let batch = SortedBatch::from_lines(["5,511\n"], OrderKind::Numeric);
    let mut out = Vec::new();
    let err = merge_into(existing(&["10,511\n", "9,511\n"]), batch, &mut out).unwrap_err();
    assert!(err.to_string().contains("sorts before line 1"), "{err}");
}

// -------------------- Tie-break --------------------

#[test]
fn equal_lines_emit_batch_first() -> Result<()> {
    let mut iter = MergeIterator::new(existing(&["5,5\n"]), lex(&["5,5\n"]))?;
    assert_eq!(iter.next_entry()?, Some((Side::Batch, "5,5\n".to_string())));
    assert_eq!(iter.next_entry()?, Some((Side::Existing, "5,5\n".to_string())));
    assert_eq!(iter.next_entry()?, None);
    Ok(())
}

#[test]
fn tie_break_is_deterministic_across_runs() -> Result<()> {
    let run = || -> Result<Vec<(Side, String)>> {
        let mut iter = MergeIterator::new(
            existing(&["1,1\n", "2,2\n", "2,2\n", "3,3\n"]),
            lex(&["2,2\n", "3,3\n"]),
        )?;
        let mut v = Vec::new();
        while let Some(e) = iter.next_entry()? {
            v.push(e);
        }
        Ok(v)
    };
    let first = run()?;
    assert_eq!(first, run()?);
    let sides: Vec<Side> = first.iter().map(|(s, _)| *s).collect();
    assert_eq!(
        sides,
        vec![
            Side::Existing,
            Side::Batch,
            Side::Existing,
            Side::Existing,
            Side::Batch,
            Side::Existing,
        ]
    );
    Ok(())
}

// -------------------- Completeness / sortedness --------------------

#[test]
fn merge_is_complete_and_sorted() -> Result<()> {
    for seed in 1..20u64 {
        let a = sorted_lines(seed, (seed as usize * 7) % 50);
        let b = sorted_lines(seed * 31, (seed as usize * 13) % 40);
        let a_refs: Vec<&str> = a.iter().map(String::as_str).collect();

        let (stats, out) = merge_to_vec(existing(&a_refs), lex(&b.iter().map(String::as_str).collect::<Vec<_>>()))?;
        let lines: Vec<String> = out.split_inclusive('\n').map(str::to_string).collect();

        assert_eq!(lines.len(), a.len() + b.len(), "seed {}", seed);
        assert_eq!(stats.written_lines, lines.len());

        let mut sorted = lines.clone();
        sorted.sort();
        assert_eq!(lines, sorted, "seed {} not sorted", seed);

        let mut expected: Vec<String> = a.iter().chain(b.iter()).cloned().collect();
        expected.sort();
        assert_eq!(sorted, expected, "seed {} lost or invented a line", seed);
    }
    Ok(())
}

#[test]
fn merging_same_batch_twice_duplicates_records() -> Result<()> {
    let batch = ["24,515\n"];
    let (_, once) = merge_to_vec(existing(&["0,511\n", "48,520\n"]), lex(&batch))?;
    let (_, twice) = merge_to_vec(Some(Cursor::new(once.into_bytes())), lex(&batch))?;
    assert_eq!(twice, "0,511\n24,515\n24,515\n48,520\n");
    Ok(())
}

// -------------------- Lexicographic width regression --------------------

#[test]
fn lexicographic_merge_breaks_numeric_order_across_widths() -> Result<()> {
    // Byte order puts "10," before "9,"; this is the stored order.
    let (_, out) = merge_to_vec(existing(&["10,511\n"]), lex(&["9,511\n"]))?;
    assert_eq!(out, "10,511\n9,511\n");
    Ok(())
}

#[test]
fn numeric_merge_keeps_chronological_order_across_widths() -> Result<()> {
    let batch = SortedBatch::from_lines(["9,511\n", "11,511\n"], OrderKind::Numeric);
    let (_, out) = merge_to_vec(existing(&["8,511\n", "10,511\n"]), batch)?;
    assert_eq!(out, "8,511\n9,511\n10,511\n11,511\n");
    Ok(())
}

// -------------------- Failures --------------------

struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
        Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn write_failure_aborts_merge() {
    let err = merge_into(existing(&["1,1\n"]), lex(&["2,2\n"]), &mut FailingWriter).unwrap_err();
    assert!(err.to_string().contains("failed to write merged line 1"));
}

#[test]
fn invalid_existing_bytes_abort_merge() {
    let bad = Some(Cursor::new(vec![b'1', b',', 0xff, b'\n']));
    let mut out = Vec::new();
    assert!(merge_into(bad, lex(&["2,2\n"]), &mut out).is_err());
}

// -------------------- File-backed --------------------

#[test]
fn merge_streams_from_file() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("merged.csv");
    let a = sorted_lines(7, 500);
    std::fs::write(&path, a.concat())?;

    let reader = BufReader::new(std::fs::File::open(&path)?);
    let b = sorted_lines(8, 50);
    let mut out = Vec::new();
    let stats = merge_into(Some(reader), SortedBatch::from_lines(b.clone(), OrderKind::Lexicographic), &mut out)?;

    assert_eq!(stats.existing_lines, 500);
    assert_eq!(stats.batch_lines, 50);
    assert_eq!(String::from_utf8(out)?.lines().count(), 550);
    Ok(())
}
