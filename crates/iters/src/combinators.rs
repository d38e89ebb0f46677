// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::{Error, Lender, Ring, Stream};

/// A finite, non-restartable stream over a vector of items.
pub struct Array<T> {
    items: std::vec::IntoIter<T>,
}

pub fn array<T>(items: Vec<T>) -> Array<T> {
    Array {
        items: items.into_iter(),
    }
}

impl<T> Stream for Array<T> {
    type Item = T;

    fn next(&mut self) -> Result<Option<T>, Error> {
        Ok(self.items.next())
    }
}

/// Adapt any infallible iterator into a stream.
pub struct List<I> {
    iter: I,
}

pub fn list<I: IntoIterator>(items: I) -> List<I::IntoIter> {
    List {
        iter: items.into_iter(),
    }
}

impl<I: Iterator> Stream for List<I> {
    type Item = I::Item;

    fn next(&mut self) -> Result<Option<I::Item>, Error> {
        Ok(self.iter.next())
    }
}

/// Exhausts `first`, then `second`. End-of-stream handling is transparent:
/// the chain ends only when both inputs have ended.
pub struct Chain<A, B> {
    first: Option<A>,
    second: B,
}

pub fn chain<A, B>(first: A, second: B) -> Chain<A, B>
where
    A: Stream,
    B: Stream<Item = A::Item>,
{
    Chain {
        first: Some(first),
        second,
    }
}

impl<A, B> Stream for Chain<A, B>
where
    A: Stream,
    B: Stream<Item = A::Item>,
{
    type Item = A::Item;

    fn next(&mut self) -> Result<Option<A::Item>, Error> {
        if let Some(first) = &mut self.first {
            if let Some(item) = first.next()? {
                return Ok(Some(item));
            }
            self.first = None;
        }
        self.second.next()
    }
}

/// Splits a stream into chunks of up to `chunk` items.
///
/// Each [`Chunk`] borrows the splitter: it must be dropped before the next
/// chunk can be requested. Items a chunk did not consume are drained (and
/// discarded) when the next chunk is requested, so that chunk boundaries
/// stay aligned with the underlying stream.
pub struct Chunkify<S: Stream> {
    inner: S,
    chunk: usize,
    /// Items of the current chunk not yet pulled from `inner`.
    remaining: usize,
    done: bool,
}

pub fn chunkify<S: Stream>(inner: S, chunk: usize) -> Chunkify<S> {
    assert!(chunk > 0, "chunk size must not be zero");
    Chunkify {
        inner,
        chunk,
        remaining: 0,
        done: false,
    }
}

impl<S: Stream> Chunkify<S> {
    pub fn next_chunk(&mut self) -> Result<Option<Chunk<'_, S>>, Error> {
        while self.remaining > 0 {
            match self.inner.next()? {
                Some(_) => self.remaining -= 1,
                None => {
                    self.remaining = 0;
                    self.done = true;
                }
            }
        }
        if self.done {
            return Ok(None);
        }

        // Pull one item to decide whether another chunk exists at all.
        match self.inner.next()? {
            None => {
                self.done = true;
                Ok(None)
            }
            Some(first) => {
                self.remaining = self.chunk - 1;
                Ok(Some(Chunk {
                    parent: self,
                    first: Some(first),
                }))
            }
        }
    }
}

/// One chunk of a [`Chunkify`] stream.
pub struct Chunk<'a, S: Stream> {
    parent: &'a mut Chunkify<S>,
    first: Option<S::Item>,
}

impl<'a, S: Stream> Stream for Chunk<'a, S> {
    type Item = S::Item;

    fn next(&mut self) -> Result<Option<S::Item>, Error> {
        if let Some(first) = self.first.take() {
            return Ok(Some(first));
        }
        if self.parent.remaining == 0 {
            return Ok(None);
        }
        match self.parent.inner.next()? {
            Some(item) => {
                self.parent.remaining -= 1;
                Ok(Some(item))
            }
            None => {
                self.parent.remaining = 0;
                self.parent.done = true;
                Ok(None)
            }
        }
    }
}

struct TeeShared<S: Stream> {
    inner: S,
    /// Items already pulled from `inner` that one side has not consumed yet.
    /// Memory use is proportional to how far the two sides drift apart.
    pending: [VecDeque<S::Item>; 2],
}

/// One side of a [`tee`]. Both sides yield the exact sequence of the input,
/// in the input's order.
pub struct Tee<S: Stream> {
    shared: Rc<RefCell<TeeShared<S>>>,
    side: usize,
}

pub fn tee<S>(inner: S) -> (Tee<S>, Tee<S>)
where
    S: Stream,
    S::Item: Clone,
{
    let shared = Rc::new(RefCell::new(TeeShared {
        inner,
        pending: [VecDeque::new(), VecDeque::new()],
    }));
    (
        Tee {
            shared: Rc::clone(&shared),
            side: 0,
        },
        Tee { shared, side: 1 },
    )
}

impl<S> Stream for Tee<S>
where
    S: Stream,
    S::Item: Clone,
{
    type Item = S::Item;

    fn next(&mut self) -> Result<Option<S::Item>, Error> {
        let mut shared = self.shared.borrow_mut();
        if let Some(item) = shared.pending[self.side].pop_front() {
            return Ok(Some(item));
        }
        match shared.inner.next()? {
            None => Ok(None),
            Some(item) => {
                shared.pending[1 - self.side].push_back(item.clone());
                Ok(Some(item))
            }
        }
    }
}

/// Views a stream of owned items as a [`Lender`] by keeping ownership of the
/// last yielded item until the next call.
pub struct Constify<S: Stream> {
    inner: S,
    last: Option<S::Item>,
}

pub fn constify<S: Stream>(inner: S) -> Constify<S> {
    Constify { inner, last: None }
}

impl<S: Stream> Lender for Constify<S> {
    type Item = S::Item;

    fn next(&mut self) -> Result<Option<&S::Item>, Error> {
        self.last = self.inner.next()?;
        Ok(self.last.as_ref())
    }
}

impl<S: Stream> Constify<S> {
    /// Take back the stream, dropping the retained item.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

/// Drains a [`Ring`] as a stream of fixed-size elements.
pub struct RingElements {
    ring: Ring,
    element_size: usize,
}

pub fn ring_elements(ring: Ring, element_size: usize) -> RingElements {
    assert!(element_size > 0, "element size must not be zero");
    RingElements { ring, element_size }
}

impl Stream for RingElements {
    type Item = Vec<u8>;

    fn next(&mut self) -> Result<Option<Vec<u8>>, Error> {
        let readable = self.ring.peek();
        if readable.is_empty() {
            return Ok(None);
        }
        if readable.len() < self.element_size {
            return Err(Error::invalid(format!(
                "{} trailing bytes do not make a {}-byte element",
                readable.len(),
                self.element_size,
            )));
        }
        let element = readable[..self.element_size].to_vec();
        self.ring.pop(self.element_size)?;
        Ok(Some(element))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::page_size;

    #[test]
    fn chain_concatenates() {
        let chained = chain(array(vec![1, 2]), array(vec![3]));
        assert_eq!(chained.collect().unwrap(), &[1, 2, 3]);

        let empty_first = chain(array(Vec::<i32>::new()), array(vec![4]));
        assert_eq!(empty_first.collect().unwrap(), &[4]);
    }

    #[test]
    fn list_adapts_plain_iterators() {
        let items = list(std::collections::VecDeque::from([1, 2, 3]));
        assert_eq!(items.collect().unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn chunkify_preserves_order_across_chunks() {
        let mut chunks = chunkify(array((0..7).collect()), 3);
        let mut seen = Vec::new();
        let mut sizes = Vec::new();
        while let Some(chunk) = chunks.next_chunk().unwrap() {
            let items = chunk.collect().unwrap();
            sizes.push(items.len());
            seen.extend(items);
        }
        assert_eq!(seen, (0..7).collect::<Vec<_>>());
        assert_eq!(sizes, &[3, 3, 1]);
    }

    #[test]
    fn chunkify_discards_undrained_items() {
        let mut chunks = chunkify(array((0..6).collect()), 3);
        {
            let mut chunk = chunks.next_chunk().unwrap().unwrap();
            assert_eq!(chunk.next().unwrap(), Some(0));
            // Dropped with 1 and 2 unconsumed.
        }
        let second = chunks.next_chunk().unwrap().unwrap();
        assert_eq!(second.collect().unwrap(), &[3, 4, 5]);
        assert!(chunks.next_chunk().unwrap().is_none());
    }

    #[test]
    fn tee_clones_the_sequence() {
        let (mut left, mut right) = tee(array(vec![1, 2, 3]));

        // Interleave consumption; both sides see the full sequence.
        assert_eq!(left.next().unwrap(), Some(1));
        assert_eq!(left.next().unwrap(), Some(2));
        assert_eq!(right.next().unwrap(), Some(1));
        assert_eq!(left.next().unwrap(), Some(3));
        assert_eq!(left.next().unwrap(), None);
        assert_eq!(right.collect().unwrap(), &[2, 3]);
    }

    #[test]
    fn constify_retains_the_last_item() {
        let mut lender = constify(array(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(lender.next().unwrap().map(String::as_str), Some("a"));
        assert_eq!(lender.next().unwrap().map(String::as_str), Some("b"));
        assert_eq!(lender.next().unwrap(), None);
    }

    #[quickcheck_macros::quickcheck]
    fn chain_concatenates_any_inputs(a: Vec<u32>, b: Vec<u32>) -> bool {
        let chained = chain(array(a.clone()), array(b.clone()));
        let expected: Vec<u32> = a.into_iter().chain(b).collect();
        chained.collect().unwrap() == expected
    }

    #[quickcheck_macros::quickcheck]
    fn tee_emits_the_input_sequence_twice(items: Vec<u32>) -> bool {
        let (left, right) = tee(array(items.clone()));
        left.collect().unwrap() == items && right.collect().unwrap() == items
    }

    #[test]
    fn ring_elements_drain_whole_elements() {
        let mut ring = Ring::new(page_size()).unwrap();
        ring.push(b"abcd").unwrap();
        ring.push(b"efgh").unwrap();

        let elements = ring_elements(ring, 4);
        assert_eq!(
            elements.collect().unwrap(),
            vec![b"abcd".to_vec(), b"efgh".to_vec()],
        );
    }
}
