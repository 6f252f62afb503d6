#![cfg_attr(feature = "strict", deny(warnings))]

pub use error::{CasClientError, Result};
pub use interface::ObjectClient;
pub use local_client::LocalClient;
pub use memory_client::MemoryClient;
pub use object_store_client::ObjectStoreClient;

mod error;
mod interface;
mod local_client;
mod memory_client;
mod object_store_client;
