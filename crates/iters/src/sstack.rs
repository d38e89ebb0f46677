// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

use crate::{Error, Stack};

const MAX_ALIGN: usize = 16;

/// A segmented stack: a growable arena made of fixed-size [`Stack`] chunks.
///
/// Intended for the many small, same-lifetime allocations a producer makes
/// while assembling a batch: allocate freely, then [`Sstack::pop_all`] to
/// reclaim everything at once without freeing the chunks themselves.
pub struct Sstack {
    stacks: Vec<Stack>,
    chunk_size: usize,
    /// Index of the stack currently being filled.
    current: usize,
}

impl Sstack {
    pub fn new(chunk_size: usize) -> Sstack {
        Sstack {
            stacks: vec![Stack::new(chunk_size)],
            chunk_size,
            current: 0,
        }
    }

    fn grow(&mut self) {
        self.current += 1;
        if self.current == self.stacks.len() {
            self.stacks.push(Stack::new(self.chunk_size));
        }
    }

    /// Reserve `size` bytes, moving on to the next chunk when the current
    /// one is full.
    pub fn reserve(&mut self, size: usize) -> Result<&mut [u8], Error> {
        if size > self.chunk_size {
            return Err(Error::invalid(format!(
                "cannot reserve {size} bytes in an sstack of {}-byte chunks",
                self.chunk_size,
            )));
        }
        loop {
            let room = self.chunk_size - self.stacks[self.current].used();
            if room >= size {
                return self.stacks[self.current].reserve(size);
            }
            self.grow();
        }
    }

    /// Push a copy of `data`.
    pub fn push(&mut self, data: &[u8]) -> Result<&mut [u8], Error> {
        let reserved = self.reserve(data.len())?;
        reserved.copy_from_slice(data);
        Ok(reserved)
    }

    /// Allocate `size` bytes, rounded up so that consecutive allocations
    /// stay aligned for any payload.
    pub fn alloc(&mut self, size: usize) -> Result<&mut [u8], Error> {
        let rounded = size
            .checked_add(MAX_ALIGN - 1)
            .map(|s| s & !(MAX_ALIGN - 1))
            .ok_or(Error::NoBufs)?;
        Ok(&mut self.reserve(rounded)?[..size])
    }

    /// Push a copy of `string` and hand it back as a borrowed `str`.
    pub fn strdup(&mut self, string: &str) -> Result<&str, Error> {
        let bytes = self.push(string.as_bytes())?;
        // Unwrap because `bytes` is a verbatim copy of a valid `str`.
        Ok(std::str::from_utf8(bytes).unwrap())
    }

    /// Reclaim every allocation at once; the chunks are kept for re-use.
    pub fn pop_all(&mut self) {
        for stack in &mut self.stacks {
            let used = stack.used();
            // Unwrap because `used` bytes are always poppable.
            stack.pop(used).unwrap();
        }
        self.current = 0;
    }

    /// Drop the chunks beyond the one currently in use.
    pub fn shrink(&mut self) {
        self.stacks.truncate(self.current + 1);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn allocations_span_chunks() {
        let mut sstack = Sstack::new(64);
        for i in 0..32u8 {
            let bytes = sstack.push(&[i; 16]).unwrap();
            assert_eq!(bytes, &[i; 16]);
        }
        assert!(sstack.stacks.len() > 1);
    }

    #[test]
    fn alloc_rounds_up_for_alignment() {
        let mut sstack = Sstack::new(64);
        assert_eq!(sstack.alloc(3).unwrap().len(), 3);
        assert_eq!(sstack.stacks[0].used(), 16);
    }

    #[test]
    fn strdup_copies_the_string() {
        let mut sstack = Sstack::new(64);
        let copy = sstack.strdup("hello").unwrap();
        assert_eq!(copy, "hello");
    }

    #[test]
    fn pop_all_resets_and_shrink_drops_chunks() {
        let mut sstack = Sstack::new(64);
        for _ in 0..8 {
            sstack.push(&[0u8; 48]).unwrap();
        }
        let chunks = sstack.stacks.len();
        assert!(chunks > 1);

        sstack.pop_all();
        assert_eq!(sstack.stacks.len(), chunks);
        assert_eq!(sstack.stacks[0].used(), 0);

        sstack.shrink();
        assert_eq!(sstack.stacks.len(), 1);
    }

    #[test]
    fn oversized_reservations_are_rejected() {
        let mut sstack = Sstack::new(64);
        assert!(matches!(sstack.reserve(65), Err(Error::Invalid(_))));
    }
}
