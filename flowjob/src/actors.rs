//! The local cluster is a small actor system: a coordinator owns the job table, and every job
//! gets a worker that owns its process and a broadcaster that fans its output out to readers.

pub mod broadcaster;
pub mod coordinator;
pub mod worker;
