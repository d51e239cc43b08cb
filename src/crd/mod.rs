//! Custom Resource Definitions for the YTsaurus operator

mod spyt;
mod types;
mod ytsaurus;

pub use spyt::{Spyt, SpytSpec, SpytStatus};
pub use types::{
    ClusterState, ExecNodesSpec, InstanceSpec, UiSpec, UpdateState, UpdateStatus,
    DEFAULT_POOL_NAME,
};
pub use ytsaurus::{Ytsaurus, YtsaurusSpec, YtsaurusStatus};
