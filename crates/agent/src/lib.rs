//! The emissary conversation loop.
//!
//! One turn = one user message + the prior history, run against the remote
//! model until it stops requesting tools and produces a final answer.

mod loop_runner;

pub use loop_runner::AgentLoop;
