use std::fmt::{Display, Formatter};

/// Lifecycle of a [`GossipResolver`](crate::resolver::GossipResolver).
///
/// `Idle -> Discovering -> {Published, Reseeding, Failed} -> Discovering`, `Disposed`
/// is reachable from every state and terminal.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ResolverState {
    Idle,
    Discovering,
    Published,
    Reseeding,
    Failed,
    Disposed,
}

impl ResolverState {
    pub fn can_transition_to(&self, next: ResolverState) -> bool {
        use ResolverState::*;
        match (self, next) {
            (Disposed, _) => false,
            (_, Disposed) => true,
            (Idle, Discovering) => true,
            (Discovering, Published | Reseeding | Failed | Discovering) => true,
            (Reseeding, Discovering | Failed) => true,
            (Published | Failed, Discovering) => true,
            _ => false,
        }
    }
}

impl Display for ResolverState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
