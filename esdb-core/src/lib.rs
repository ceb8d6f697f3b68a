pub mod config;
pub mod endpoint;
pub mod error;
pub mod ext;
pub mod pattern;

#[cfg(test)]
mod test {
    use tracing::Level;

    use crate::ext::init_logger;

    #[ctor::ctor]
    fn init() {
        init_logger(Level::DEBUG)
    }
}
