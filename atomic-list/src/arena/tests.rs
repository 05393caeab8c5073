use super::*;

use crate::tests::run;

#[test]
fn acquire_until_exhausted() {
  run(|| {
    let arena = Arena::<u32>::new(3);
    let mut seen = [false; 4];

    for _ in 0..3 {
      let (index, fresh) = arena.acquire().unwrap();
      assert_ne!(index, SENTINEL);
      assert!(!seen[index as usize], "slot {index} handed out twice");
      seen[index as usize] = true;

      assert!(fresh.is_pending());
      assert!(!fresh.is_retired());
      assert_eq!(fresh.next(), NONE);
      assert_eq!(fresh.generation(), 1);
      assert_eq!(arena.cell(index).load(), fresh);
    }

    assert!(arena.acquire().is_none());
  });
}

#[test]
fn release_bumps_generation_on_reuse() {
  run(|| {
    let arena = Arena::<u16>::new(2);
    let (index, fresh) = arena.acquire().unwrap();
    arena.cell(index).store(fresh.with_payload(42).with_next(7));

    arena.release(index);
    let freed = arena.cell(index).load();
    assert!(freed.is_retired());
    assert!(!freed.is_pending());
    // the last link survives until the slot is handed out again
    assert_eq!(freed.next(), 7);
    assert_eq!(freed.generation(), fresh.generation());

    let (again, reused) = arena.acquire().unwrap();
    assert_eq!(again, index);
    assert_eq!(reused.generation(), fresh.generation() + 1);
    assert_eq!(reused.next(), NONE);
  });
}

#[test]
fn sentinel_is_never_handed_out() {
  run(|| {
    let arena = Arena::<u8>::new(1);
    assert!(arena.sentinel().load().is_live());
    assert_eq!(arena.sentinel().load().next(), NONE);

    let (index, _) = arena.acquire().unwrap();
    assert_eq!(index, 1);
    assert!(arena.acquire().is_none());
  });
}

#[test]
#[cfg(not(feature = "loom"))]
fn concurrent_acquire_hands_out_unique_slots() {
  use std::sync::{Arc, Barrier};

  const THREADS: usize = 8;
  const PER_THREAD: usize = 64;

  let arena = Arc::new(Arena::<u32>::new((THREADS * PER_THREAD) as u32));
  let acquired = Arc::new(crossbeam_queue::ArrayQueue::new(THREADS * PER_THREAD));
  let b = Arc::new(Barrier::new(THREADS));

  let handles = (0..THREADS)
    .map(|i| {
      let arena = arena.clone();
      let acquired = acquired.clone();
      let b = b.clone();
      std::thread::spawn(move || {
        b.wait();
        for round in 0..PER_THREAD {
          let (index, _) = arena.acquire().unwrap();
          // give some back to exercise interleaved pushes and pops
          if (i + round) % 3 == 0 {
            arena.release(index);
            let (index, _) = arena.acquire().unwrap();
            acquired.push(index).unwrap();
          } else {
            acquired.push(index).unwrap();
          }
        }
      })
    })
    .collect::<std::vec::Vec<_>>();

  for handle in handles {
    handle.join().unwrap();
  }

  let mut indexes = std::vec::Vec::new();
  while let Some(index) = acquired.pop() {
    indexes.push(index);
  }
  indexes.sort_unstable();
  indexes.dedup();
  assert_eq!(indexes.len(), THREADS * PER_THREAD);
  assert!(arena.acquire().is_none());
}

#[test]
fn abandoned_slot_keeps_its_generation() {
  run(|| {
    let arena = Arena::<u32>::new(1);
    let (index, fresh) = arena.acquire().unwrap();
    arena.abandon(index);

    let freed = arena.cell(index).load();
    assert!(freed.is_retired());
    assert!(!freed.is_pending());

    let (again, reused) = arena.acquire().unwrap();
    assert_eq!(again, index);
    assert_eq!(reused.generation(), fresh.generation());
  });
}

#[test]
#[cfg(not(feature = "loom"))]
fn worn_out_slot_is_retired_until_reset() {
  let mut arena = Arena::<u32>::new(1);
  let mut last = 0;
  while let Some((index, fresh)) = arena.acquire() {
    assert_eq!(fresh.generation(), last + 1);
    last = fresh.generation();
    arena.release(index);
  }
  assert_eq!(last, Snapshot::<u32>::MAX_GENERATION);
  assert!(arena.cell(1).load().is_retired());

  arena.reset();
  let (index, fresh) = arena.acquire().unwrap();
  assert_eq!(index, 1);
  assert_eq!(fresh.generation(), 1);
  assert!(arena.acquire().is_none());
}
