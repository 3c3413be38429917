pub mod blob;

pub use blob::{BlobStore, FsBlobStore, AUTH_STATE_KEY};
