// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Lazy, fallible sequences and the byte containers that back them.
//!
//! A [`Stream`] is a pull-based iterator whose `next` can fail: the end of
//! the sequence is `Ok(None)`, an error is a real error, never a sentinel
//! item. A [`Lender`] yields borrowed items that stay valid until the next
//! call.
//!
//! The containers ([`Ring`], [`Queue`], [`Stack`], [`Sstack`]) are byte
//! oriented: sources and sinks use them to batch variable-size payloads
//! without per-item allocations.

mod combinators;
pub use combinators::{
    array, chain, chunkify, constify, list, ring_elements, tee, Array, Chain, Chunk, Chunkify,
    Constify, List, RingElements, Tee,
};

mod ring;
pub use ring::{page_size, Ring};

mod queue;
pub use queue::Queue;

mod stack;
pub use stack::Stack;

mod sstack;
pub use sstack::Sstack;

/// Error raised by streams and containers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    Invalid(String),

    /// The container cannot currently hold the pushed data
    /// (but a smaller or later push may succeed).
    #[error("not enough space left in the buffer")]
    NoBufs,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Error::Invalid(message.into())
    }
}

/// A pull-based sequence of owned items.
///
/// Ordering is part of the contract: a Stream yields items in source order,
/// and combinators document how they preserve it.
pub trait Stream {
    type Item;

    /// Yield the next item, `Ok(None)` once the sequence is exhausted.
    ///
    /// After an error, the stream may be polled again; whether it recovers
    /// is up to the implementation.
    fn next(&mut self) -> Result<Option<Self::Item>, Error>;

    /// Drain the stream into a vector.
    fn collect(mut self) -> Result<Vec<Self::Item>, Error>
    where
        Self: Sized,
    {
        let mut items = Vec::new();
        while let Some(item) = self.next()? {
            items.push(item);
        }
        Ok(items)
    }
}

impl<S: Stream + ?Sized> Stream for &mut S {
    type Item = S::Item;

    fn next(&mut self) -> Result<Option<Self::Item>, Error> {
        (**self).next()
    }
}

impl<S: Stream + ?Sized> Stream for Box<S> {
    type Item = S::Item;

    fn next(&mut self) -> Result<Option<Self::Item>, Error> {
        (**self).next()
    }
}

/// A pull-based sequence yielding borrowed items.
///
/// The yielded reference is valid until the next call to `next` (which
/// invalidates it by construction: `next` borrows the lender mutably).
pub trait Lender {
    type Item;

    fn next(&mut self) -> Result<Option<&Self::Item>, Error>;
}
