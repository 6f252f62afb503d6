mod dataset;
mod error;
mod index;
mod key;
mod metadata;

pub use dataset::{join_object_key, DatasetSummary, INDEX_OBJECT_KEY, METADATA_OBJECT_KEY};
pub use error::CasTypesError;
pub use index::{parse_index, serialize_index, IndexWriter};
pub use key::{Key, KEY_PREFIX_LEN, KEY_SIZE};
pub use metadata::Metadata;
