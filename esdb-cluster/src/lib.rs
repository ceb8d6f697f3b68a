pub const CLUSTER_CONFIG: &'static str = include_str!("../cluster.toml");

pub mod channel;
pub mod config;
pub mod gossip;
pub mod leader_change;
pub mod member;
pub mod node_preference;
pub mod node_selector;
pub mod resolver;
pub mod topology;
#[cfg(test)]
pub(crate) mod test_kit;

#[cfg(test)]
mod test {
    use tracing::Level;

    use esdb_core::ext::init_logger;

    #[ctor::ctor]
    fn init() {
        init_logger(Level::DEBUG)
    }
}
