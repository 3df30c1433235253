use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Failed to initialize {component}: {source}")]
    Bridge {
        component: &'static str,
        #[source]
        source: bridge_traits::BridgeError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
