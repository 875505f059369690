// SPDX-License-Identifier: MIT

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use trace_diff::*;
use diff::{edit_distance, DiffConfig, DiffError, DiffEvent, SearchPolicy};
use record::LogRecord;
use utils::{find_cause, Result};

mod common;
use common::{check_script, diff_files, diff_records, lcs_len, rec, recs};

fn random_records(rng: &mut StdRng, max_len: usize, alphabet: u32) -> Vec<LogRecord> {
    let len = rng.gen_range(0..=max_len);
    (0..len).map(|_| rec(rng.gen_range(0..alphabet))).collect()
}

fn tiny_windows() -> DiffConfig {
    DiffConfig {
        compare_window: 1,
        display_window: 1,
        prefetch: 1,
        ..Default::default()
    }
}

#[test]
fn diff_identical() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let a = recs(&[1, 2, 3, 4, 5]);
    let events = diff_records(dir.path(), &a, &a, DiffConfig::default())?;
    assert_eq!(events, [DiffEvent::Common { a: 0, b: 0, len: 5 }]);

    let events = diff_records(dir.path(), &[], &[], DiffConfig::default())?;
    assert!(events.is_empty());
    Ok(())
}

#[test]
fn diff_pure_insertions() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let base = recs(&[1, 2, 3, 4, 5, 6]);

    for count in [1, 2, 3, 5] {
        let inserted: Vec<LogRecord> = (0..count).map(|i| rec(100 + i)).collect();
        let len = count as u64;

        for at in [0, 1, 3, 5, 6] {
            let mut longer = base[..at].to_vec();
            longer.extend_from_slice(&inserted);
            longer.extend_from_slice(&base[at..]);

            for (side, a, b) in [(Side::B, &base, &longer), (Side::A, &longer, &base)] {
                let events = diff_records(dir.path(), a, b, DiffConfig::default())?;
                check_script(a, b, &events);
                let only: Vec<_> = events
                    .iter()
                    .filter(|event| matches!(event, DiffEvent::OnlyIn { .. }))
                    .collect();
                assert_eq!(
                    only,
                    [&DiffEvent::OnlyIn { side, start: at as u64, len }],
                    "{} records inserted at {} into {:?}",
                    count,
                    at,
                    side
                );
            }
        }

        // Everything inserted.
        let events = diff_records(dir.path(), &[], &inserted, DiffConfig::default())?;
        assert_eq!(events, [DiffEvent::OnlyIn { side: Side::B, start: 0, len }]);
        let events = diff_records(dir.path(), &inserted, &[], DiffConfig::default())?;
        assert_eq!(events, [DiffEvent::OnlyIn { side: Side::A, start: 0, len }]);
    }
    Ok(())
}

#[test]
fn diff_replacement() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let a = recs(&[1, 2, 3, 9]);
    let b = recs(&[1, 4, 9]);
    let events = diff_records(dir.path(), &a, &b, DiffConfig::default())?;
    assert_eq!(
        events,
        [
            DiffEvent::Common { a: 0, b: 0, len: 1 },
            DiffEvent::OnlyIn { side: Side::A, start: 1, len: 2 },
            DiffEvent::OnlyIn { side: Side::B, start: 1, len: 1 },
            DiffEvent::Common { a: 3, b: 2, len: 1 },
        ]
    );
    Ok(())
}

#[test]
fn diff_snake_at_box_edge() -> Result<()> {
    // The forward search hits the right edge of the box while the
    // backward search is still one step away.
    let dir = tempfile::tempdir()?;
    let a = recs(&[1, 0]);
    let b = recs(&[0, 2, 2]);

    for config in [DiffConfig::default(), tiny_windows()] {
        let events = diff_records(dir.path(), &a, &b, config.clone())?;
        assert_eq!(
            events,
            [
                DiffEvent::OnlyIn { side: Side::A, start: 0, len: 1 },
                DiffEvent::Common { a: 1, b: 0, len: 1 },
                DiffEvent::OnlyIn { side: Side::B, start: 1, len: 2 },
            ]
        );

        let events = diff_records(dir.path(), &b, &a, config)?;
        assert_eq!(
            events,
            [
                DiffEvent::OnlyIn { side: Side::B, start: 0, len: 1 },
                DiffEvent::Common { a: 0, b: 1, len: 1 },
                DiffEvent::OnlyIn { side: Side::A, start: 1, len: 2 },
            ]
        );
    }
    Ok(())
}

/// All logs of up to `max_len` records over `alphabet` names.
fn all_logs(max_len: usize, alphabet: u32) -> Vec<Vec<LogRecord>> {
    let mut logs = vec![Vec::new()];
    let mut start = 0;
    for _ in 0..max_len {
        let end = logs.len();
        for idx in start..end {
            for name in 0..alphabet {
                let mut log = logs[idx].clone();
                log.push(rec(name));
                logs.push(log);
            }
        }
        start = end;
    }
    logs
}

#[test]
fn diff_minimal_exhaustive() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let logs = all_logs(5, 3);
    assert_eq!(logs.len(), 1 + 3 + 9 + 27 + 81 + 243);

    let mut paths = Vec::new();
    for (idx, log) in logs.iter().enumerate() {
        let path = dir.path().join(format!("{}.log", idx));
        common::write_log(&path, log)?;
        paths.push(path);
    }

    let config = DiffConfig {
        compare_window: 3,
        display_window: 2,
        prefetch: 2,
        ..Default::default()
    };
    for (a, path_a) in logs.iter().zip(&paths) {
        for (b, path_b) in logs.iter().zip(&paths) {
            let events = diff_files(path_a, path_b, config.clone())?;
            check_script(a, b, &events);
            let optimal = a.len() + b.len() - 2 * lcs_len(a, b);
            assert_eq!(edit_distance(&events) as usize, optimal, "a = {:?}, b = {:?}", a, b);
        }
    }
    Ok(())
}

#[test]
fn diff_minimal_random() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut rng = StdRng::seed_from_u64(5);
    for round in 0..400 {
        let alphabet = [2, 3, 5, 20][round % 4];
        let a = random_records(&mut rng, 20, alphabet);
        let b = random_records(&mut rng, 20, alphabet);

        let events = diff_records(dir.path(), &a, &b, DiffConfig::default())?;
        check_script(&a, &b, &events);
        let optimal = a.len() + b.len() - 2 * lcs_len(&a, &b);
        assert_eq!(edit_distance(&events) as usize, optimal, "a = {:?}, b = {:?}", a, b);

        // Paging through one-record windows must not change the result.
        let paged = diff_records(dir.path(), &a, &b, tiny_windows())?;
        assert_eq!(paged, events);
    }
    Ok(())
}

#[test]
fn diff_larger_random() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut rng = StdRng::seed_from_u64(6);
    for _ in 0..10 {
        // Mostly shared logs with scattered edits.
        let a: Vec<LogRecord> = (0..600).map(|_| rec(rng.gen_range(0..50))).collect();
        let mut b = Vec::new();
        for record in &a {
            match rng.gen_range(0..20) {
                0 => {}
                1 => {
                    b.push(rec(rng.gen_range(0..50)));
                    b.push(*record);
                }
                _ => b.push(*record),
            }
        }

        let config = DiffConfig {
            compare_window: 16,
            display_window: 8,
            prefetch: 5,
            ..Default::default()
        };
        let events = diff_records(dir.path(), &a, &b, config)?;
        check_script(&a, &b, &events);
        let optimal = a.len() + b.len() - 2 * lcs_len(&a, &b);
        assert_eq!(edit_distance(&events) as usize, optimal);
    }
    Ok(())
}

#[test]
fn diff_too_different() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let a = recs(&[1, 2, 3, 4, 5, 6]);
    let b = recs(&[11, 12, 13, 14, 15, 16]);

    let config = DiffConfig {
        max_d: 5,
        ..Default::default()
    };
    let err = diff_records(dir.path(), &a, &b, config).unwrap_err();
    assert!(matches!(
        find_cause::<DiffError>(err.as_ref()),
        Some(DiffError::TooDifferent { max_d: 5 })
    ));

    // The ceiling is inclusive.
    let config = DiffConfig {
        max_d: 12,
        ..Default::default()
    };
    let events = diff_records(dir.path(), &a, &b, config)?;
    assert_eq!(edit_distance(&events), 12);
    Ok(())
}

#[test]
fn diff_config_is_validated() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let a = recs(&[1]);
    let config = DiffConfig {
        max_d: 10,
        search: SearchPolicy::Heuristic { threshold: 11 },
        ..Default::default()
    };
    let err = diff_records(dir.path(), &a, &a, config).unwrap_err();
    assert!(matches!(find_cause::<DiffError>(err.as_ref()), Some(DiffError::Config(_))));
    Ok(())
}

#[test]
fn diff_heuristic_is_valid() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut rng = StdRng::seed_from_u64(7);
    let mut approximate = 0;
    for _ in 0..200 {
        let a = random_records(&mut rng, 60, 4);
        let b = random_records(&mut rng, 60, 4);

        let config = DiffConfig {
            search: SearchPolicy::Heuristic { threshold: 2 },
            ..Default::default()
        };
        let events = diff_records(dir.path(), &a, &b, config)?;
        check_script(&a, &b, &events);

        let optimal = a.len() + b.len() - 2 * lcs_len(&a, &b);
        let found = edit_distance(&events) as usize;
        assert!(found >= optimal);
        if found > optimal {
            approximate += 1;
        }
    }
    // A threshold this low must cut some searches short.
    assert!(approximate > 0);
    Ok(())
}
