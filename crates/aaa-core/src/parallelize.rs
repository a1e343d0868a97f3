//! Bounded-concurrency task pool.

use futures::future::join_all;
use std::cell::RefCell;
use std::future::Future;

/// Outcome of one pooled task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled<T, E> {
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> Settled<T, E> {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Settled::Fulfilled(_))
    }
}

impl<T, E> From<Result<T, E>> for Settled<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Settled::Fulfilled(value),
            Err(error) => Settled::Rejected(error),
        }
    }
}

/// Runs `tasks` with at most `concurrency` in flight.
///
/// Tasks are pulled from the iterator lazily: a worker takes the next one only
/// when its previous task settled. Results come back in submission order.
pub async fn parallelize<I, Fut, T, E>(concurrency: usize, tasks: I) -> Vec<Settled<T, E>>
where
    I: IntoIterator<Item = Fut>,
    Fut: Future<Output = Result<T, E>>,
{
    let queue = RefCell::new(tasks.into_iter().enumerate());
    let results = RefCell::new(Vec::new());

    let (pending, settled_by_index) = (&queue, &results);
    let workers = (0..concurrency.max(1)).map(move |_| async move {
        loop {
            let next = pending.borrow_mut().next();
            let Some((index, task)) = next else {
                break;
            };
            let settled = Settled::from(task.await);
            settled_by_index.borrow_mut().push((index, settled));
        }
    });
    join_all(workers).await;

    let mut results = results.into_inner();
    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, settled)| settled).collect()
}
