pub mod captures;
pub mod profile_store;

pub use captures::CaptureArchive;
pub use profile_store::{ProfileStore, StoredProfile};
