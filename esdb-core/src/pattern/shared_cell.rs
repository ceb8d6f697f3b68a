use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use anyhow::anyhow;
use arc_swap::ArcSwap;
use futures::future::{BoxFuture, ready};
use futures::FutureExt;
use tokio::select;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

type Factory<I, O> = dyn Fn(I, BrokenHandle<I, O>) -> BoxFuture<'static, Result<O>> + Send + Sync;

type Outcome<O> = Option<Result<O>>;

enum SlotState<O> {
    Idle,
    Producing(watch::Receiver<Outcome<O>>),
    Disposed,
}

/// One generation of the produced resource.
struct Slot<O> {
    generation: u64,
    state: SlotState<O>,
}

impl<O> Slot<O> where O: Clone {
    fn is_pending(&self) -> bool {
        match &self.state {
            SlotState::Producing(outcome) => outcome.borrow().is_none(),
            SlotState::Idle | SlotState::Disposed => false,
        }
    }

    async fn wait(&self) -> Result<O> {
        let mut outcome = match &self.state {
            SlotState::Producing(outcome) => outcome.clone(),
            SlotState::Idle | SlotState::Disposed => return Err(Error::ResourceDisposed),
        };
        let settled = match outcome.wait_for(Option::is_some).await {
            Ok(settled) => (*settled).clone(),
            Err(_) => None,
        };
        settled.unwrap_or(Err(Error::ResourceDisposed))
    }
}

struct Inner<I, O> {
    slot: ArcSwap<Slot<O>>,
    factory: Box<Factory<I, O>>,
    initial_input: I,
    retry_delay: Duration,
    generation: AtomicU64,
    disposed: CancellationToken,
}

impl<I, O> Inner<I, O>
    where
        I: Clone + Debug + Send + Sync + 'static,
        O: Clone + Send + Sync + 'static,
{
    /// Swaps `expected` for a fresh slot and starts exactly one production for it.
    ///
    /// Returns `false` without touching the factory when `expected` is still pending,
    /// when it has already been replaced by someone else, or when the cell is disposed.
    fn replace(self: &Arc<Self>, expected: &Arc<Slot<O>>, input: I) -> bool {
        if self.disposed.is_cancelled() {
            return false;
        }
        if expected.is_pending() {
            trace!("slot {} still producing, ignore replacement with {:?}", expected.generation, input);
            return false;
        }
        let (tx, rx) = watch::channel(None);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let next = Arc::new(Slot { generation, state: SlotState::Producing(rx) });
        let previous = self.slot.compare_and_swap(expected, next.clone());
        if !Arc::ptr_eq(&*previous, expected) {
            trace!("slot {} already superseded by {}", expected.generation, previous.generation);
            return false;
        }
        debug!("slot {} replaced by {}, producing with {:?}", expected.generation, generation, input);
        self.produce(next, tx, input);
        true
    }

    fn produce(self: &Arc<Self>, slot: Arc<Slot<O>>, tx: watch::Sender<Outcome<O>>, input: I) {
        let handle = BrokenHandle {
            inner: Arc::downgrade(self),
            slot: Arc::downgrade(&slot),
            generation: slot.generation,
        };
        let generation = slot.generation;
        let production = match catch_unwind(AssertUnwindSafe(|| (self.factory)(input, handle))) {
            Ok(production) => production,
            Err(_) => ready(Err(Error::production(anyhow!("slot {} factory panicked", generation)))).boxed(),
        };
        let disposed = self.disposed.clone();
        let retry_delay = self.retry_delay;
        let inner = Arc::downgrade(self);
        tokio::spawn(async move {
            let outcome = select! {
                _ = disposed.cancelled() => Err(Error::ResourceDisposed),
                outcome = AssertUnwindSafe(production).catch_unwind() => outcome.unwrap_or_else(|_| {
                    Err(Error::production(anyhow!("slot {} production panicked", generation)))
                }),
            };
            let failed = match &outcome {
                Ok(_) => false,
                Err(error) => {
                    warn!("slot {} production failed: {}", slot.generation, error);
                    true
                }
            };
            tx.send_replace(Some(outcome));
            if failed && !disposed.is_cancelled() {
                select! {
                    _ = disposed.cancelled() => {}
                    _ = tokio::time::sleep(retry_delay) => {
                        if let Some(inner) = inner.upgrade() {
                            let input = inner.initial_input.clone();
                            inner.replace(&slot, input);
                        }
                    }
                }
            }
        });
    }
}

impl<I, O> Drop for Inner<I, O> {
    fn drop(&mut self) {
        self.disposed.cancel();
    }
}

/// A single expensive resource shared by any number of concurrent consumers.
///
/// The cell owns one slot at a time. A slot is produced by the user supplied factory
/// exactly once; consumers either get its settled value right away or wait for it.
/// Reporting a slot broken swaps in a new slot with a compare-and-swap against the
/// exact slot that was reported, so concurrent reports of the same breakage coalesce
/// into a single new production and holders of old values are never invalidated.
/// A failed production is retried after `retry_delay` with the initial input.
pub struct SharedResourceCell<I, O> {
    inner: Arc<Inner<I, O>>,
}

impl<I, O> Clone for SharedResourceCell<I, O> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<I, O> Debug for SharedResourceCell<I, O> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedResourceCell")
            .field("generation", &self.inner.slot.load().generation)
            .field("retry_delay", &self.inner.retry_delay)
            .field("disposed", &self.inner.disposed.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<I, O> SharedResourceCell<I, O>
    where
        I: Clone + Debug + Send + Sync + 'static,
        O: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(initial_input: I, retry_delay: Duration, factory: F) -> Self
        where
            F: Fn(I, BrokenHandle<I, O>) -> Fut + Send + Sync + 'static,
            Fut: Future<Output=Result<O>> + Send + 'static,
    {
        let inner = Inner {
            slot: ArcSwap::from_pointee(Slot { generation: 0, state: SlotState::Idle }),
            factory: Box::new(move |input: I, handle: BrokenHandle<I, O>| factory(input, handle).boxed()),
            initial_input,
            retry_delay,
            generation: AtomicU64::new(0),
            disposed: CancellationToken::new(),
        };
        Self { inner: Arc::new(inner) }
    }

    pub async fn current(&self) -> Result<O> {
        self.current_with(&CancellationToken::new()).await
    }

    /// Returns the settled value of the current slot, waiting for an in flight production
    /// or starting the first one. Cancelling only abandons the wait, the production goes on.
    pub async fn current_with(&self, cancel: &CancellationToken) -> Result<O> {
        loop {
            let slot = self.inner.slot.load_full();
            match &slot.state {
                SlotState::Disposed => return Err(Error::ResourceDisposed),
                SlotState::Idle => {
                    self.inner.replace(&slot, self.inner.initial_input.clone());
                }
                SlotState::Producing(_) => {
                    return select! {
                        _ = cancel.cancelled() => Err(Error::Cancelled),
                        outcome = slot.wait() => outcome,
                    };
                }
            }
        }
    }

    /// Reports the current slot broken. See [`BrokenHandle::report_broken`] to target
    /// the slot a value was obtained from instead.
    pub fn reset(&self, next_input: I) -> bool {
        let slot = self.inner.slot.load_full();
        if matches!(slot.state, SlotState::Idle) {
            return false;
        }
        self.inner.replace(&slot, next_input)
    }

    pub fn dispose(&self) {
        if self.inner.disposed.is_cancelled() {
            return;
        }
        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner.slot.store(Arc::new(Slot { generation, state: SlotState::Disposed }));
        self.inner.disposed.cancel();
        debug!("shared resource cell disposed at generation {}", generation);
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.is_cancelled()
    }

    pub fn generation(&self) -> u64 {
        self.inner.slot.load().generation
    }
}

/// Reports breakage of the exact slot a value was produced by.
pub struct BrokenHandle<I, O> {
    inner: Weak<Inner<I, O>>,
    slot: Weak<Slot<O>>,
    generation: u64,
}

impl<I, O> Clone for BrokenHandle<I, O> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            slot: self.slot.clone(),
            generation: self.generation,
        }
    }
}

impl<I, O> Debug for BrokenHandle<I, O> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokenHandle")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl<I, O> BrokenHandle<I, O>
    where
        I: Clone + Debug + Send + Sync + 'static,
        O: Clone + Send + Sync + 'static,
{
    /// Generation of the slot this handle reports on.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns `true` when this call started a new production.
    pub fn report_broken(&self, next_input: I) -> bool {
        match (self.inner.upgrade(), self.slot.upgrade()) {
            (Some(inner), Some(slot)) => inner.replace(&slot, next_input),
            _ => false,
        }
    }
}
