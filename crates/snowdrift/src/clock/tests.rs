use crate::{
    Clock, ClockMode, ClockSource, DEFAULT_EPOCH, Error, Layout, LogicalClock, Stamp, SystemClock,
    WallClock, mock::MockTime,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread::scope;

#[test]
fn logical_adopts_wall_clock_when_it_moves_ahead() {
    let time = Arc::new(MockTime::after_epoch(100));
    let clock = LogicalClock::new(&Layout::DEFAULT, Arc::clone(&time));

    time.advance(5);
    assert_eq!(clock.get_and_increment(50), DEFAULT_EPOCH + 105);
}

#[test]
fn logical_advances_by_increment_when_wall_clock_stalls() {
    let time = MockTime::after_epoch(100);
    let clock = LogicalClock::new(&Layout::DEFAULT, &time);

    assert_eq!(clock.get_and_increment(3), DEFAULT_EPOCH + 103);
    assert_eq!(clock.get_and_increment(3), DEFAULT_EPOCH + 106);
    assert_eq!(clock.get_and_increment(1), DEFAULT_EPOCH + 107);
    assert_eq!(clock.last_issued(), DEFAULT_EPOCH + 107);
}

#[test]
fn logical_is_strictly_increasing_sequentially() {
    let clock = LogicalClock::new(&Layout::DEFAULT, SystemClock);
    let mut last = 0;
    for _ in 0..100_000 {
        let next = clock.get_and_increment(1);
        assert!(next > last, "{next} <= {last}");
        last = next;
    }
}

#[test]
fn logical_is_distinct_across_threads() {
    const THREADS: usize = 8;
    const CALLS: usize = 10_000;

    let time = MockTime::after_epoch(0);
    let clock = LogicalClock::new(&Layout::DEFAULT, &time);
    let seen = Mutex::new(HashSet::with_capacity(THREADS * CALLS));

    scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                let mut local = Vec::with_capacity(CALLS);
                for _ in 0..CALLS {
                    local.push(clock.get_and_increment(1));
                }
                seen.lock().unwrap().extend(local);
            });
        }
    });

    assert_eq!(seen.lock().unwrap().len(), THREADS * CALLS);
}

#[test]
fn logical_stamps_always_start_at_sequence_zero() {
    let time = MockTime::after_epoch(0);
    let clock = LogicalClock::new(&Layout::DEFAULT, &time);
    let first = clock.stamp(10).unwrap();
    let second = clock.stamp(10).unwrap();
    assert_eq!(first.sequence, 0);
    assert_eq!(second.sequence, 0);
    assert_eq!(second.millis - first.millis, 10);
}

#[test]
fn wall_reserves_disjoint_ranges_within_a_millisecond() {
    let time = MockTime::after_epoch(7);
    let clock = WallClock::new(&Layout::DEFAULT, &time);

    let a = clock.stamp(1000).unwrap();
    let b = clock.stamp(1000).unwrap();
    assert_eq!(
        a,
        Stamp {
            millis: DEFAULT_EPOCH + 7,
            sequence: 0
        }
    );
    assert_eq!(
        b,
        Stamp {
            millis: DEFAULT_EPOCH + 7,
            sequence: 1000
        }
    );
}

#[test]
fn wall_borrows_next_millisecond_when_full() {
    let time = MockTime::after_epoch(7);
    let clock = WallClock::new(&Layout::DEFAULT, &time);

    clock.stamp(4000).unwrap();
    let spill = clock.stamp(100).unwrap();
    assert_eq!(
        spill,
        Stamp {
            millis: DEFAULT_EPOCH + 8,
            sequence: 0
        }
    );

    // The wall clock catching up to the borrowed millisecond continues the
    // same window.
    time.advance(1);
    assert_eq!(clock.stamp(1).unwrap().sequence, 100);

    time.advance(1);
    assert_eq!(
        clock.stamp(1).unwrap(),
        Stamp {
            millis: DEFAULT_EPOCH + 9,
            sequence: 0
        }
    );
}

#[test]
fn wall_keeps_window_when_clock_steps_back() {
    let time = MockTime::after_epoch(50);
    let clock = WallClock::new(&Layout::DEFAULT, &time);

    let before = clock.stamp(10).unwrap();
    time.set(DEFAULT_EPOCH + 10);
    let after = clock.stamp(10).unwrap();
    assert_eq!(after.millis, before.millis);
    assert_eq!(after.sequence, 10);
}

#[test]
fn clock_before_epoch_is_an_error() {
    let time = MockTime::new(DEFAULT_EPOCH - 1);
    for mode in [ClockMode::Wall, ClockMode::Logical] {
        let clock = Clock::new(mode, &Layout::DEFAULT, &time);
        assert_eq!(
            clock.stamp(1),
            Err(Error::ClockBehindEpoch {
                now: DEFAULT_EPOCH - 1,
                epoch: DEFAULT_EPOCH,
            })
        );
    }
}

#[test]
fn clock_reports_its_mode() {
    let layout = Layout::DEFAULT;
    assert_eq!(
        Clock::new(ClockMode::Wall, &layout, SystemClock).mode(),
        ClockMode::Wall
    );
    assert_eq!(
        Clock::new(ClockMode::Logical, &layout, SystemClock).mode(),
        ClockMode::Logical
    );
}
