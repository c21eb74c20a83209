use rand::{rngs::StdRng, SeedableRng};

use attnvec::sampling::{NegativeTable, NEGATIVE_TABLE_SIZE};

#[test]
fn table_proportions_track_sqrt_counts() {
    let counts: Vec<i64> = vec![400, 100, 25];
    let mut rng = StdRng::seed_from_u64(7);
    let table = NegativeTable::new(&counts, &mut rng);

    let z: f64 = counts.iter().map(|&c| (c as f64).sqrt()).sum();
    let mut seen = vec![0usize; counts.len()];
    for &c in table.as_slice() {
        seen[c] += 1;
    }
    for (i, &c) in counts.iter().enumerate() {
        let expected = ((c as f64).sqrt() * NEGATIVE_TABLE_SIZE as f64 / z).floor() as i64;
        assert!(
            (seen[i] as i64 - expected).abs() <= 1,
            "class {i}: {} entries, expected about {expected}",
            seen[i]
        );
    }
    assert!(table.len() >= NEGATIVE_TABLE_SIZE);
    assert!(table.len() <= NEGATIVE_TABLE_SIZE + counts.len());
}

#[test]
fn draws_skip_the_target_and_stay_balanced() {
    let counts: Vec<i64> = vec![100, 100, 100];
    let mut rng = StdRng::seed_from_u64(7);
    let mut table = NegativeTable::new(&counts, &mut rng);

    let mut seen = vec![0usize; 3];
    for _ in 0..10_000 {
        let neg = table.next(0);
        seen[neg] += 1;
    }
    assert_eq!(seen[0], 0);
    for &count in &seen[1..] {
        assert!(
            (4750..=5250).contains(&count),
            "draws unbalanced: {seen:?}"
        );
    }
}
