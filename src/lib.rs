pub mod config;
pub mod engine;
pub mod gate;
pub mod ledger;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod protocol;
pub mod reaper;
pub mod store;
pub mod timer;
pub mod waitlist;
pub mod wal;
pub mod wire;
