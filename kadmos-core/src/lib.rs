pub mod config;
pub mod core_dht;
pub mod logging;
pub mod metrics;
pub mod test_utils;

pub use config::Config;
pub use logging::{init_logging, LogLevel};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let _ = LogLevel::Info;
        let _ = Config::default();
        let _ = core_dht::DhtKey::MIN;
    }
}
