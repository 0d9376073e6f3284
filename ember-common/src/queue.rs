// SPDX-License-Identifier: MIT

//! Fixed-capacity single-producer/single-consumer frame queue.
//!
//! This is the bridge between the CAN RX interrupt (producer) and the
//! cooperative main loop (consumer). There is deliberately no shared `size`
//! counter: `head` is written only by the consumer and `tail` only by the
//! producer, so each cursor has exactly one writer and empty/full are derived
//! from the pair. Cursors run over `0..2*N` (one wrap bit) so the buffer
//! holds exactly `N` elements with no reserved slot.
//!
//! No growth, no blocking: a full queue rejects the element and bumps a drop
//! counter the caller can inspect.

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Fixed-capacity SPSC queue holding `N` elements of `T`.
pub struct SpscQueue<T, const N: usize> {
    buffer: [UnsafeCell<MaybeUninit<T>>; N],
    /// Consumer cursor, in `0..2*N`.
    head: AtomicUsize,
    /// Producer cursor, in `0..2*N`.
    tail: AtomicUsize,
    /// Frames rejected because the queue was full.
    dropped: AtomicU32,
}

// One producer and one consumer on distinct cursors; safe to share across
// the interrupt/main boundary once split.
unsafe impl<T: Send, const N: usize> Sync for SpscQueue<T, N> {}

impl<T: Copy, const N: usize> SpscQueue<T, N> {
    const SLOT: UnsafeCell<MaybeUninit<T>> = UnsafeCell::new(MaybeUninit::uninit());

    /// Create an empty queue. Usable in statics.
    pub const fn new() -> Self {
        Self {
            buffer: [Self::SLOT; N],
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            dropped: AtomicU32::new(0),
        }
    }

    /// Number of elements the queue can hold.
    pub const fn capacity(&self) -> usize {
        N
    }

    #[inline]
    fn wrap(cursor: usize) -> usize {
        if cursor == 2 * N - 1 {
            0
        } else {
            cursor + 1
        }
    }

    #[inline]
    fn len_raw(head: usize, tail: usize) -> usize {
        if tail >= head {
            tail - head
        } else {
            2 * N - head + tail
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    pub fn is_full(&self) -> bool {
        self.len() == N
    }

    /// Current number of queued elements.
    pub fn len(&self) -> usize {
        Self::len_raw(
            self.head.load(Ordering::Acquire),
            self.tail.load(Ordering::Acquire),
        )
    }

    /// Frames rejected so far because the queue was full.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Add an element at the back. Returns `false` (buffer untouched) if full.
    pub fn enqueue(&mut self, element: T) -> bool {
        unsafe { self.enqueue_unchecked(element) }
    }

    /// Remove the front element, or `None` if empty.
    pub fn dequeue(&mut self) -> Option<T> {
        unsafe { self.dequeue_unchecked() }
    }

    /// Read the front element without removing it.
    pub fn peek(&mut self) -> Option<T> {
        unsafe { self.peek_unchecked() }
    }

    /// Split into the producer and consumer ends.
    ///
    /// Taking `&mut self` guarantees exactly one of each half exists, which
    /// is what makes the lock-free cursor scheme sound.
    pub fn split(&mut self) -> (Producer<'_, T, N>, Consumer<'_, T, N>) {
        (
            Producer {
                queue: self,
                _not_sync: PhantomData,
            },
            Consumer {
                queue: self,
                _not_sync: PhantomData,
            },
        )
    }

    /// # Safety
    /// Caller must be the sole producer.
    unsafe fn enqueue_unchecked(&self, element: T) -> bool {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        if Self::len_raw(head, tail) == N {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        (*self.buffer[tail % N].get()).write(element);
        self.tail.store(Self::wrap(tail), Ordering::Release);
        true
    }

    /// # Safety
    /// Caller must be the sole consumer.
    unsafe fn dequeue_unchecked(&self) -> Option<T> {
        let element = self.peek_unchecked()?;
        let head = self.head.load(Ordering::Relaxed);
        self.head.store(Self::wrap(head), Ordering::Release);
        Some(element)
    }

    /// # Safety
    /// Caller must be the sole consumer.
    unsafe fn peek_unchecked(&self) -> Option<T> {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        if head == tail {
            return None;
        }
        Some((*self.buffer[head % N].get()).assume_init())
    }
}

impl<T: Copy, const N: usize> Default for SpscQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Producing end of a split queue. Owned by the interrupt context.
pub struct Producer<'q, T, const N: usize> {
    queue: &'q SpscQueue<T, N>,
    _not_sync: PhantomData<*const ()>,
}

unsafe impl<T: Send, const N: usize> Send for Producer<'_, T, N> {}

impl<T: Copy, const N: usize> Producer<'_, T, N> {
    /// Add an element at the back. Returns `false` and counts a drop if full.
    pub fn enqueue(&mut self, element: T) -> bool {
        unsafe { self.queue.enqueue_unchecked(element) }
    }

    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    pub fn dropped(&self) -> u32 {
        self.queue.dropped()
    }
}

/// Consuming end of a split queue. Owned by the main loop.
pub struct Consumer<'q, T, const N: usize> {
    queue: &'q SpscQueue<T, N>,
    _not_sync: PhantomData<*const ()>,
}

unsafe impl<T: Send, const N: usize> Send for Consumer<'_, T, N> {}

impl<T: Copy, const N: usize> Consumer<'_, T, N> {
    /// Remove the front element, or `None` if empty.
    pub fn dequeue(&mut self) -> Option<T> {
        unsafe { self.queue.dequeue_unchecked() }
    }

    /// Read the front element without removing it.
    pub fn peek(&self) -> Option<T> {
        unsafe { self.queue.peek_unchecked() }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn dropped(&self) -> u32 {
        self.queue.dropped()
    }
}
