// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

use backend::Backend;
use fsentry::OwnedFsevent;
use iters::Stream;

use crate::{no_partial, Error};

/// Drive a stream of (already enriched) fsevents into a backend, in
/// batches of up to `batch_size` events.
///
/// Events apply in source order. A batch that fails with a "try again"
/// error is retried exactly once; any other failure aborts the run. The
/// no-partial guard is applied here, so partial events never reach
/// `sink.update`.
///
/// Returns the number of events the backend reported applied.
pub fn run(
    events: impl Stream<Item = OwnedFsevent>,
    sink: &mut dyn Backend,
    batch_size: usize,
) -> Result<usize, Error> {
    let guarded = no_partial(events);
    let mut batches = iters::chunkify(guarded, batch_size);
    let mut applied = 0;

    while let Some(batch) = batches.next_chunk()? {
        // Buffer the batch so it can be replayed on a transient failure.
        let batch: Vec<OwnedFsevent> = batch.collect()?;
        let mut retried = false;

        loop {
            match sink.update(&mut iters::array(batch.clone())) {
                Ok(count) => {
                    applied += count;
                    break;
                }
                Err(backend::Error::Io(error))
                    if error.kind() == std::io::ErrorKind::WouldBlock && !retried =>
                {
                    tracing::debug!("sink busy, retrying the current batch");
                    retried = true;
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    tracing::debug!(applied, "pipeline drained");
    Ok(applied)
}
