pub mod classify;
pub mod consts;
pub mod error;
pub mod flags;
pub mod frame;
pub mod header;
pub mod ledger;
pub mod parallel;
pub mod pipeline;
pub mod stages;
