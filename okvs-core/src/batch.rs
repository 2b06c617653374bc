//! Fixed worker pool for batched decoding.
//!
//! Every batch runs on its own rayon pool of `num_threads` workers, all reading the shared, read-only codeword array.
//! Workers never communicate, so no locking is involved.

use std::num::NonZeroUsize;

use rayon::prelude::*;

/// Applies `f` to every item on up to `num_threads` threads and returns the results in input order.
pub(crate) fn map_parallel<T, U, F>(items: &[T], num_threads: NonZeroUsize, f: F) -> Vec<U>
where
    T: Sync,
    U: Send,
    F: Fn(&T) -> U + Sync + Send,
{
    if num_threads.get() <= 1 || items.len() <= 1 {
        return items.iter().map(f).collect();
    }
    match rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads.get())
        .build()
    {
        Ok(pool) => pool.install(|| items.par_iter().map(f).collect()),
        Err(err) => {
            tracing::warn!("cannot build decode pool, decoding on the calling thread: {err}");
            items.iter().map(f).collect()
        }
    }
}
