use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

mod common;
use common::create_test_buffer_pool;

use opaldb::index::hash::LinearHashTable;

#[test]
fn test_insert_lookup_and_remove_sample() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(50)?;
    let table: LinearHashTable<i32, i32> = LinearHashTable::new(buffer_pool, 1000)?;

    // Insert a few values
    for i in 0..5 {
        assert!(table.insert(i, i)?);
        assert_eq!(table.get_value(&i)?, vec![i]);
    }

    // Check the inserted values are all there
    for i in 0..5 {
        assert_eq!(table.get_value(&i)?, vec![i]);
    }

    // Insert one more value for each key; the exact duplicate is refused
    for i in 0..5 {
        if i == 0 {
            assert!(!table.insert(i, 2 * i)?);
        } else {
            assert!(table.insert(i, 2 * i)?);
        }
        let mut values = table.get_value(&i)?;
        values.sort_unstable();
        if i == 0 {
            assert_eq!(values, vec![0]);
        } else {
            assert_eq!(values, vec![i, 2 * i]);
        }
    }

    // A key that was never inserted
    assert_eq!(table.get_value(&20)?, Vec::<i32>::new());

    // Remove one value per key
    for i in 0..5 {
        assert!(table.remove(&i, &i)?);
        let values = table.get_value(&i)?;
        if i == 0 {
            assert!(values.is_empty());
        } else {
            assert_eq!(values, vec![2 * i]);
        }
    }

    // Remove the rest; (0, 0) is already gone
    for i in 0..5 {
        if i == 0 {
            assert!(!table.remove(&i, &(2 * i))?);
        } else {
            assert!(table.remove(&i, &(2 * i))?);
        }
    }

    Ok(())
}

#[test]
fn test_growth_keeps_all_entries() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(50)?;
    let table: LinearHashTable<i32, i32> = LinearHashTable::new(buffer_pool, 100)?;
    let initial_size = table.size();

    // Overfill the initial allocation so the table must grow on its own
    let count = (initial_size + 200) as i32;
    for i in 0..count {
        assert!(table.insert(i, i)?, "failed to insert {}", i);
    }
    assert!(table.size() > initial_size);

    for i in 0..count {
        assert_eq!(table.get_value(&i)?, vec![i], "lost key {}", i);
    }

    Ok(())
}

#[test]
fn test_explicit_resize_keeps_all_entries() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(50)?;
    let table: LinearHashTable<i32, i32> = LinearHashTable::new(buffer_pool, 1000)?;

    for i in 0..500 {
        assert!(table.insert(i, i * 7)?);
    }

    let doubled = table.size() * 2;
    assert!(table.resize(doubled)?);
    assert!(table.size() >= doubled);

    for i in 0..500 {
        assert_eq!(table.get_value(&i)?, vec![i * 7]);
    }

    Ok(())
}

#[test]
fn test_concurrent_disjoint_inserts() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(50)?;
    let table: Arc<LinearHashTable<i32, i32>> =
        Arc::new(LinearHashTable::new(buffer_pool, 1000)?);

    let mut handles = Vec::new();
    for t in 0..3 {
        let table = table.clone();
        handles.push(thread::spawn(move || {
            for i in 0..50 {
                let key = t * 1000 + i;
                assert!(table.insert(key, key).unwrap());
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    for t in 0..3 {
        for i in 0..50 {
            let key = t * 1000 + i;
            assert_eq!(table.get_value(&key)?, vec![key]);
        }
    }

    Ok(())
}

#[test]
fn test_probe_continuity_across_tombstones() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(50)?;
    let table: LinearHashTable<i32, i32> = LinearHashTable::new(buffer_pool, 1000)?;

    // Several values under one key build a probe chain
    for v in 0..20 {
        assert!(table.insert(7, v)?);
    }

    // Punch holes in the middle of the chain
    for v in (0..20).step_by(2) {
        assert!(table.remove(&7, &v)?);
    }

    // Survivors must still be reachable past the tombstones
    let mut values = table.get_value(&7)?;
    values.sort_unstable();
    assert_eq!(values, (0..20).filter(|v| v % 2 == 1).collect::<Vec<_>>());

    // Reinserting through the tombstoned region must not duplicate
    for v in (0..20).step_by(2) {
        assert!(table.insert(7, v)?);
        assert!(!table.insert(7, v)?);
    }
    let mut values = table.get_value(&7)?;
    values.sort_unstable();
    assert_eq!(values, (0..20).collect::<Vec<_>>());

    Ok(())
}

#[test]
fn test_random_ops_match_model() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(50)?;
    let table: LinearHashTable<i32, i32> = LinearHashTable::new(buffer_pool, 1000)?;
    let mut model: HashSet<(i32, i32)> = HashSet::new();
    let mut rng = StdRng::seed_from_u64(0xDB);

    for _ in 0..2000 {
        let key = rng.gen_range(0..50);
        let value = rng.gen_range(0..10);
        if rng.gen_bool(0.6) {
            assert_eq!(table.insert(key, value)?, model.insert((key, value)));
        } else {
            assert_eq!(table.remove(&key, &value)?, model.remove(&(key, value)));
        }
    }

    for key in 0..50 {
        let mut values = table.get_value(&key)?;
        values.sort_unstable();
        let mut expected: Vec<i32> = model
            .iter()
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| *v)
            .collect();
        expected.sort_unstable();
        assert_eq!(values, expected, "mismatch for key {}", key);
    }

    Ok(())
}
