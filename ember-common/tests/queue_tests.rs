// SPDX-License-Identifier: MIT

//! Unit tests for the SPSC frame queue.

use ember_common::queue::SpscQueue;

#[test]
fn starts_empty() {
    let mut q: SpscQueue<u32, 4> = SpscQueue::new();
    assert!(q.is_empty());
    assert!(!q.is_full());
    assert_eq!(q.len(), 0);
    assert_eq!(q.dequeue(), None);
}

#[test]
fn fifo_order_is_strict() {
    let mut q: SpscQueue<u32, 8> = SpscQueue::new();
    for i in 0..5 {
        assert!(q.enqueue(i));
    }
    for i in 0..5 {
        assert_eq!(q.dequeue(), Some(i));
    }
    assert!(q.is_empty());
}

#[test]
fn accepts_exactly_capacity_elements() {
    let mut q: SpscQueue<u32, 4> = SpscQueue::new();
    for i in 0..4 {
        assert!(q.enqueue(i), "enqueue {i} within capacity must succeed");
    }
    assert!(q.is_full());
    assert!(!q.enqueue(99));
    assert_eq!(q.len(), 4);
}

#[test]
fn failed_enqueue_mutates_nothing() {
    let mut q: SpscQueue<u32, 2> = SpscQueue::new();
    assert!(q.enqueue(1));
    assert!(q.enqueue(2));
    assert!(!q.enqueue(3));
    assert_eq!(q.dequeue(), Some(1));
    assert_eq!(q.dequeue(), Some(2));
    assert_eq!(q.dequeue(), None);
}

#[test]
fn dequeue_after_drain_fails() {
    let mut q: SpscQueue<u32, 3> = SpscQueue::new();
    q.enqueue(7);
    assert_eq!(q.dequeue(), Some(7));
    assert_eq!(q.dequeue(), None);
    assert_eq!(q.dequeue(), None);
}

#[test]
fn peek_is_non_destructive() {
    let mut q: SpscQueue<u32, 3> = SpscQueue::new();
    assert_eq!(q.peek(), None);
    q.enqueue(42);
    assert_eq!(q.peek(), Some(42));
    assert_eq!(q.peek(), Some(42));
    assert_eq!(q.len(), 1);
    assert_eq!(q.dequeue(), Some(42));
}

#[test]
fn interleaved_operations_preserve_order() {
    let mut q: SpscQueue<u32, 3> = SpscQueue::new();
    let mut produced = 0u32;
    let mut expected = 0u32;

    // Wrap the cursors several times over.
    for round in 0..50 {
        let pushes = 1 + round % 3;
        for _ in 0..pushes {
            if q.enqueue(produced) {
                produced += 1;
            }
        }
        let pops = 1 + (round + 1) % 3;
        for _ in 0..pops {
            if let Some(v) = q.dequeue() {
                assert_eq!(v, expected);
                expected += 1;
            }
        }
    }
    while let Some(v) = q.dequeue() {
        assert_eq!(v, expected);
        expected += 1;
    }
    assert_eq!(expected, produced);
}

#[test]
fn overflow_scenario_capacity_plus_one() {
    // Scenario: capacity+1 enqueues with no dequeue; the last one fails and
    // the original frames come back in order.
    const CAP: usize = 10;
    let mut q: SpscQueue<[u8; 8], CAP> = SpscQueue::new();
    for i in 0..CAP {
        assert!(q.enqueue([i as u8; 8]));
    }
    assert!(!q.enqueue([0xEE; 8]));
    for i in 0..CAP {
        assert_eq!(q.dequeue(), Some([i as u8; 8]));
    }
    assert!(q.is_empty());
}

#[test]
fn producer_counts_drops() {
    let mut q: SpscQueue<u32, 2> = SpscQueue::new();
    let (mut tx, mut rx) = q.split();
    assert!(tx.enqueue(1));
    assert!(tx.enqueue(2));
    assert!(!tx.enqueue(3));
    assert!(!tx.enqueue(4));
    assert_eq!(tx.dropped(), 2);
    assert_eq!(rx.dequeue(), Some(1));
    assert!(tx.enqueue(5));
    assert_eq!(rx.dropped(), 2);
}

#[test]
fn split_halves_share_one_buffer() {
    let mut q: SpscQueue<u32, 4> = SpscQueue::new();
    let (mut tx, mut rx) = q.split();
    assert!(rx.is_empty());
    tx.enqueue(10);
    tx.enqueue(11);
    assert_eq!(rx.peek(), Some(10));
    assert_eq!(rx.dequeue(), Some(10));
    assert_eq!(rx.dequeue(), Some(11));
    assert_eq!(rx.dequeue(), None);
}
