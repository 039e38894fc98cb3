pub mod backoff;
pub mod config;
pub mod error;
pub mod log;

pub use backoff::Backoff;
pub use config::Config;
pub use error::{
    FetchError,
    CAP_EXCEEDED_MARKER,
};
