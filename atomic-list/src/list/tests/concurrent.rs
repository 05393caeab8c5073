use std::{
  collections::BTreeSet,
  sync::{
    atomic::{AtomicU32, Ordering},
    Arc, Barrier,
  },
  thread,
  vec::Vec,
};

use crossbeam_queue::SegQueue;
use rand::Rng;

use crate::{tests::init_tracing, AtomicList, Cursor};

/// Walks at most `steps` nodes from `from`, stopping at the last node before
/// the end.
fn pick<'a>(from: Cursor<'a, u32>, rng: &mut impl Rng, max: u32) -> Cursor<'a, u32> {
  let steps = rng.random_range(0..=max);
  let mut it = from;
  let mut next = from;
  for _ in 0..steps {
    if next.is_end() {
      break;
    }
    it = next;
    next = next.advance();
  }
  it
}

fn join(handles: Vec<thread::JoinHandle<()>>) {
  for handle in handles {
    handle.join().unwrap();
  }
}

#[test]
fn preinserted_list_keeps_its_size() {
  const THREADS: u32 = 16;
  const ITERATIONS: u32 = 32768;
  const LIST_SIZE: u32 = 13;
  // slots hold live nodes too, not only insertions in flight, so the worst
  // case is every insertion running ahead of every erasure
  const CAPACITY: u32 = LIST_SIZE + THREADS / 2 * ITERATIONS + THREADS;

  init_tracing();

  let list = Arc::new(AtomicList::<u32>::new(CAPACITY).unwrap());
  let counter = Arc::new(AtomicU32::new(1));

  for _ in 0..LIST_SIZE {
    list
      .push_front(counter.fetch_add(1, Ordering::Relaxed))
      .unwrap();
  }

  let locked = list.begin().advance();
  assert!(locked.update(u32::MAX));

  let b = Arc::new(Barrier::new(THREADS as usize));
  let handles = (0..THREADS)
    .map(|i| {
      let list = list.clone();
      let counter = counter.clone();
      let b = b.clone();
      thread::spawn(move || {
        let mut rng = rand::rng();
        b.wait();

        for _ in 0..ITERATIONS {
          if i % 2 == 0 {
            // the locked node makes some positions refuse
            while list
              .erase_after_weak(&pick(list.begin(), &mut rng, LIST_SIZE * 2))
              .is_none()
            {}
          } else {
            let value = counter.fetch_add(1, Ordering::Relaxed);
            while list
              .insert_after_weak(&pick(list.begin(), &mut rng, LIST_SIZE * 2), value)
              .unwrap()
              .is_none()
            {}
          }
          thread::yield_now();
        }
      })
    })
    .collect();
  join(handles);

  assert_eq!(list.size(), LIST_SIZE as usize);
  assert_eq!(list.iter().count(), LIST_SIZE as usize);
  assert_eq!(locked.get(), Some(u32::MAX));
  assert!(locked.is_locked());
  assert!(list.iter().any(|value| value == u32::MAX));

  let mut list = Arc::into_inner(list).unwrap();
  list.clear();
  assert_eq!(list.size(), 0);
}

#[test]
fn reachable_values_match_recorded_history() {
  const INSERTERS: u32 = 4;
  const ERASERS: u32 = 4;
  const ITERATIONS: u32 = 2000;
  const INITIAL: u32 = 8;

  let list = Arc::new(AtomicList::<u32>::new(INITIAL + INSERTERS * ITERATIONS + INSERTERS).unwrap());
  let counter = Arc::new(AtomicU32::new(0));
  let removed = Arc::new(SegQueue::new());

  let mut expected = BTreeSet::new();
  for _ in 0..INITIAL {
    let value = counter.fetch_add(1, Ordering::Relaxed);
    list.push_front(value).unwrap();
    expected.insert(value);
  }

  let b = Arc::new(Barrier::new((INSERTERS + ERASERS) as usize));
  let handles = (0..INSERTERS + ERASERS)
    .map(|i| {
      let list = list.clone();
      let counter = counter.clone();
      let removed = removed.clone();
      let b = b.clone();
      thread::spawn(move || {
        let mut rng = rand::rng();
        b.wait();

        for _ in 0..ITERATIONS {
          if i < ERASERS {
            // starting before the front lets the first node go too
            loop {
              let it = pick(list.before_begin(), &mut rng, INITIAL * 2);
              if let Some(value) = list.remove_after_weak(&it) {
                removed.push(value);
                break;
              }
            }
          } else {
            let value = counter.fetch_add(1, Ordering::Relaxed);
            while list
              .insert_after_weak(&pick(list.before_begin(), &mut rng, INITIAL * 2), value)
              .unwrap()
              .is_none()
            {}
          }
        }
      })
    })
    .collect();
  join(handles);

  expected.extend(INITIAL..INITIAL + INSERTERS * ITERATIONS);
  let mut erased = 0;
  while let Some(value) = removed.pop() {
    assert!(expected.remove(&value), "value {value} erased twice");
    erased += 1;
  }
  assert_eq!(erased, ERASERS * ITERATIONS);

  let reachable = list.iter().collect::<Vec<_>>();
  assert_eq!(reachable.len(), list.len());
  assert_eq!(reachable.len(), INITIAL as usize);
  assert_eq!(reachable.into_iter().collect::<BTreeSet<_>>(), expected);
}

#[test]
fn lock_and_erase_never_both_win() {
  const ERASERS: usize = 4;
  const ATTEMPTS: usize = 256;
  const SIZE: u32 = 32;

  for _ in 0..64 {
    let list = Arc::new(AtomicList::<u32>::new(SIZE).unwrap());
    for value in 0..SIZE {
      list.push_front(value).unwrap();
    }

    let mut target = list.begin();
    for _ in 0..5 {
      target = target.advance();
    }

    let b = Arc::new(Barrier::new(ERASERS + 1));
    let handles = (0..ERASERS)
      .map(|_| {
        let list = list.clone();
        let b = b.clone();
        thread::spawn(move || {
          let mut rng = rand::rng();
          b.wait();
          for _ in 0..ATTEMPTS {
            let _ = list.erase_after_weak(&pick(list.begin(), &mut rng, 8));
          }
        })
      })
      .collect();

    b.wait();
    let locked = target.update(u32::MAX);
    join(handles);

    if locked {
      assert_eq!(target.get(), Some(u32::MAX));
      assert!(list.iter().any(|value| value == u32::MAX));
    } else {
      assert_eq!(target.get(), None);
      assert!(list.iter().all(|value| value != u32::MAX));
    }
    assert_eq!(list.iter().count(), list.len());
  }
}

#[test]
fn concurrent_push_front_keeps_every_value() {
  const THREADS: u32 = 8;
  const PER_THREAD: u32 = 1000;

  let list = Arc::new(AtomicList::<u32>::new(THREADS * PER_THREAD).unwrap());
  let b = Arc::new(Barrier::new(THREADS as usize));
  let handles = (0..THREADS)
    .map(|i| {
      let list = list.clone();
      let b = b.clone();
      thread::spawn(move || {
        b.wait();
        for value in i * PER_THREAD..(i + 1) * PER_THREAD {
          assert_eq!(list.push_front(value).unwrap().get(), Some(value));
        }
      })
    })
    .collect();
  join(handles);

  assert_eq!(list.len(), (THREADS * PER_THREAD) as usize);
  let values = list.iter().collect::<BTreeSet<_>>();
  assert_eq!(values, (0..THREADS * PER_THREAD).collect::<BTreeSet<_>>());
  assert!(list.push_front(0).is_err());
}

#[test]
fn contended_inserts_give_back_their_slots() {
  const THREADS: u32 = 8;
  const PER_THREAD: u32 = 200;
  const CAPACITY: u32 = 1 + THREADS * PER_THREAD + THREADS;

  let list = Arc::new(AtomicList::<u32>::new(CAPACITY).unwrap());
  list.push_front(0).unwrap();

  let b = Arc::new(Barrier::new(THREADS as usize));
  let handles = (0..THREADS)
    .map(|i| {
      let list = list.clone();
      let b = b.clone();
      thread::spawn(move || {
        b.wait();
        for value in 0..PER_THREAD {
          // everyone hammers the same anchor
          while list
            .insert_after_weak(&list.begin(), i * PER_THREAD + value + 1)
            .unwrap()
            .is_none()
          {
            thread::yield_now();
          }
        }
      })
    })
    .collect();
  join(handles);

  assert_eq!(list.len(), (1 + THREADS * PER_THREAD) as usize);
  assert_eq!(list.begin().get(), Some(0));

  let mut pushed = 0;
  while list.push_front(u32::MAX).is_ok() {
    pushed += 1;
  }
  assert_eq!(pushed, THREADS);
  assert_eq!(list.len(), CAPACITY as usize);
}
