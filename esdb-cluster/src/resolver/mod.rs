use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::select;
use tokio::sync::{Notify, watch};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use esdb_core::endpoint::Endpoint;
use esdb_core::error::{Error, Result};
use esdb_core::pattern::backoff::BackoffPolicy;

use crate::config::settings::ClusterSettings;
use crate::gossip::{GossipClient, GossipClientFactory};
use crate::gossip::outcome::DiscoveryOutcome;
use crate::node_selector::NodeSelector;
use crate::resolver::clients::GossipClients;
use crate::resolver::result::{ResolverResult, ResolverStatus};
use crate::resolver::state::ResolverState;
use crate::topology::ClusterTopology;

mod clients;
pub mod result;
pub mod state;

type Listener = Arc<dyn Fn(&ResolverResult) + Send + Sync>;

struct Shared {
    settings: ClusterSettings,
    selector: NodeSelector,
    clients: GossipClients,
    state: Mutex<ResolverState>,
    leader_hint: Mutex<Option<Endpoint>>,
    wake: Notify,
    results: watch::Sender<Option<ResolverResult>>,
    listeners: Mutex<Vec<Listener>>,
    sequence: AtomicU64,
    cancel: CancellationToken,
}

/// Keeps discovering the cluster through gossip and publishes where clients should connect.
///
/// A single driver task runs discovery rounds: once at start, then every refresh interval
/// and whenever [`GossipResolver::trigger`] is called. Triggers arriving while a round runs
/// coalesce into one follow-up round. Each round publishes exactly one [`ResolverResult`],
/// either the selected node or the error the last attempt ended with.
///
/// The driver stops on [`GossipResolver::dispose`] or once the last handle is dropped.
#[derive(Clone)]
pub struct GossipResolver {
    shared: Arc<Shared>,
    _driver: Arc<DropGuard>,
}

impl Debug for GossipResolver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GossipResolver")
            .field("state", &*self.shared.state.lock())
            .field("preference", &self.shared.selector.preference())
            .field("clients", &self.shared.clients)
            .finish_non_exhaustive()
    }
}

impl GossipResolver {
    pub fn start(settings: ClusterSettings, factory: Arc<dyn GossipClientFactory>) -> Result<Self> {
        settings.validate()?;
        let (results, _) = watch::channel(None);
        let shared = Shared {
            selector: NodeSelector::new(settings.node_preference),
            clients: GossipClients::new(settings.seeds.clone(), factory),
            settings,
            state: Mutex::new(ResolverState::Idle),
            leader_hint: Mutex::new(None),
            wake: Notify::new(),
            results,
            listeners: Mutex::new(vec![]),
            sequence: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        };
        let shared = Arc::new(shared);
        info!(
            "start gossip resolver with seeds [{}], prefer {}",
            itertools::join(&shared.settings.seeds, ", "),
            shared.selector.preference(),
        );
        let driver = Arc::new(shared.cancel.clone().drop_guard());
        tokio::spawn(Shared::drive(shared.clone()));
        Ok(Self { shared, _driver: driver })
    }

    /// Waits for the next publish and returns it, or the error it carries.
    ///
    /// A round already in flight answers the call, otherwise a new round is requested.
    pub async fn resolve(&self) -> Result<ResolverResult> {
        let cancel = &self.shared.cancel;
        if cancel.is_cancelled() {
            return Err(Error::ResourceDisposed);
        }
        let mut results = self.shared.results.subscribe();
        let seen = results.borrow_and_update().as_ref().map(|r| r.sequence).unwrap_or(0);
        match self.state() {
            ResolverState::Idle | ResolverState::Discovering | ResolverState::Reseeding => {}
            ResolverState::Published | ResolverState::Failed => self.trigger(None),
            ResolverState::Disposed => return Err(Error::ResourceDisposed),
        }
        let next = select! {
            _ = cancel.cancelled() => None,
            next = results.wait_for(|r| r.as_ref().is_some_and(|r| r.sequence > seen)) => {
                next.ok().and_then(|r| r.clone())
            }
        };
        let result = next.ok_or(Error::ResourceDisposed)?;
        match &result.status {
            ResolverStatus::Ok => Ok(result),
            ResolverStatus::Error(error) => Err(error.clone()),
        }
    }

    pub fn latest(&self) -> Option<ResolverResult> {
        self.shared.results.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<ResolverResult>> {
        self.shared.results.subscribe()
    }

    /// Registers a balancer callback, called with the latest result right away if there is
    /// one and then with every publish.
    pub fn on_resolver_result<F>(&self, handler: F) where F: Fn(&ResolverResult) + Send + Sync + 'static {
        let handler: Listener = Arc::new(handler);
        self.shared.listeners.lock().push(handler.clone());
        if let Some(latest) = self.latest() {
            handler(&latest);
        }
    }

    /// Requests an out of cycle round. A leader hint is queried before any other endpoint.
    pub fn trigger(&self, leader_hint: Option<Endpoint>) {
        if self.shared.cancel.is_cancelled() {
            return;
        }
        if let Some(hint) = leader_hint {
            debug!("leader hint {} received", hint);
            *self.shared.leader_hint.lock() = Some(hint);
        }
        self.shared.wake.notify_one();
    }

    pub fn state(&self) -> ResolverState {
        *self.shared.state.lock()
    }

    pub fn known_endpoints(&self) -> Vec<Endpoint> {
        self.shared.clients.endpoints()
    }

    pub fn settings(&self) -> &ClusterSettings {
        &self.shared.settings
    }

    pub fn dispose(&self) {
        if self.shared.cancel.is_cancelled() {
            return;
        }
        self.shared.transition(ResolverState::Disposed);
        self.shared.cancel.cancel();
        self.shared.listeners.lock().clear();
        info!("gossip resolver disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }
}

impl Shared {
    async fn drive(self: Arc<Self>) {
        let mut backoff = BackoffPolicy::new(self.settings.backoff);
        loop {
            select! {
                _ = self.cancel.cancelled() => break,
                _ = self.round(&mut backoff) => {}
            }
            select! {
                _ = self.cancel.cancelled() => break,
                _ = self.wake.notified() => {
                    debug!("out of cycle discovery round requested");
                }
                _ = Self::refresh_tick(self.settings.refresh_interval) => {
                    debug!("periodic discovery round");
                }
            }
        }
        self.transition(ResolverState::Disposed);
        debug!("gossip resolver driver stopped");
    }

    async fn refresh_tick(interval: Option<Duration>) {
        match interval {
            Some(interval) => tokio::time::sleep(interval).await,
            None => std::future::pending().await,
        }
    }

    async fn round(&self, backoff: &mut BackoffPolicy) {
        let mut preferred = self.leader_hint.lock().take().or_else(|| self.last_address());
        let max_attempts = self.settings.max_discover_attempts;
        let mut last_error = Error::DiscoveryTimeout;
        for attempt in 1..=max_attempts {
            self.transition(ResolverState::Discovering);
            let discovered = self.attempt(preferred.take()).await.and_then(|topology| {
                let selected = self.selector.select(&topology)?.endpoint.clone();
                Ok((topology, selected))
            });
            match discovered {
                Ok((topology, selected)) => {
                    backoff.reset();
                    self.clients.update(&topology);
                    self.transition(ResolverState::Published);
                    let sequence = self.next_sequence();
                    self.publish(ResolverResult::ok(sequence, vec![selected], Arc::new(topology)));
                    return;
                }
                Err(error) => {
                    warn!("discovery attempt {}/{} failed: {}", attempt, max_attempts, error);
                    last_error = error;
                    if !self.clients.is_seeded() {
                        self.transition(ResolverState::Reseeding);
                        info!("known gossip endpoints failing, reseed from [{}]", itertools::join(&self.settings.seeds, ", "));
                        self.clients.reseed();
                    }
                    if attempt < max_attempts {
                        let delay = backoff.next_backoff();
                        debug!("next discovery attempt in {:?}", delay);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        backoff.reset();
        self.transition(ResolverState::Failed);
        let sequence = self.next_sequence();
        self.publish(ResolverResult::error(sequence, last_error));
    }

    /// Asks the preferred endpoint alone first, then races every other known endpoint and
    /// takes the first usable topology.
    async fn attempt(&self, preferred: Option<Endpoint>) -> Result<ClusterTopology> {
        let timeout = self.settings.gossip_timeout;
        let mut failures = vec![];
        if let Some(preferred) = &preferred {
            match self.clients.get_or_create(preferred) {
                Ok(client) => match query(preferred.clone(), client, timeout).await {
                    DiscoveryOutcome::Success(topology) => return Ok(topology),
                    failure => failures.push(failure),
                },
                Err(error) => failures.push(transport_failure(preferred, error)),
            }
        }
        let mut candidates = self.clients.snapshot();
        if candidates.is_empty() {
            // every client creation failed so far, the seeds get another chance
            for seed in self.clients.seeds() {
                match self.clients.get_or_create(seed) {
                    Ok(client) => candidates.push((seed.clone(), client)),
                    Err(error) => failures.push(transport_failure(seed, error)),
                }
            }
        }
        let mut racing = candidates
            .into_iter()
            .filter(|(endpoint, _)| Some(endpoint) != preferred.as_ref())
            .map(|(endpoint, client)| query(endpoint, client, timeout))
            .collect::<FuturesUnordered<_>>();
        while let Some(outcome) = racing.next().await {
            match outcome {
                DiscoveryOutcome::Success(topology) => return Ok(topology),
                failure => failures.push(failure),
            }
        }
        DiscoveryOutcome::aggregate(failures).into_result()
    }

    fn last_address(&self) -> Option<Endpoint> {
        self.results.borrow()
            .as_ref()
            .filter(|r| r.is_ok())
            .and_then(|r| r.addresses.first().cloned())
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn publish(&self, result: ResolverResult) {
        if self.cancel.is_cancelled() {
            return;
        }
        info!("publish {}", result);
        self.results.send_replace(Some(result.clone()));
        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            listener(&result);
        }
    }

    fn transition(&self, next: ResolverState) {
        let mut state = self.state.lock();
        if *state == next {
            return;
        }
        if state.can_transition_to(next) {
            debug!("resolver state {} -> {}", *state, next);
            *state = next;
        } else {
            debug!("ignore resolver state change {} -> {}", *state, next);
        }
    }
}

fn transport_failure(endpoint: &Endpoint, error: anyhow::Error) -> DiscoveryOutcome {
    DiscoveryOutcome::GossipTransportFailure(Error::transport(error.context(format!("gossip {}", endpoint))))
}

async fn query(endpoint: Endpoint, client: Arc<dyn GossipClient>, timeout: Duration) -> DiscoveryOutcome {
    match tokio::time::timeout(timeout, client.cluster_topology(timeout)).await {
        Err(_) => {
            debug!("gossip {} timed out after {:?}", endpoint, timeout);
            DiscoveryOutcome::DiscoveryTimeout
        }
        Ok(Err(error)) => {
            debug!("gossip {} failed: {:?}", endpoint, error);
            transport_failure(&endpoint, error)
        }
        Ok(Ok(members)) => {
            let topology = ClusterTopology::new(members);
            debug!("gossip {} answered {}", endpoint, topology);
            if topology.has_alive_member() {
                DiscoveryOutcome::Success(topology)
            } else {
                DiscoveryOutcome::NoViableEndpoints
            }
        }
    }
}
