//! Request description types shared by the executor and the cache.

mod key;
mod options;

pub use key::RequestKey;
pub use options::RequestOptions;
