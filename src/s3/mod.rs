pub mod checksum;
pub mod limits;
pub mod local;
pub mod store;

pub use self::{
    local::LocalStore,
    store::{ObjectStore, PartETag},
};
