//! Worker module for issuing calls
//!
//! A Worker owns one sequential stream of calls against a single method:
//! **pace -> render -> dispatch -> record -> repeat**.
//!
//! Each iteration:
//!
//! 1. Polls the stop signal without blocking
//! 2. Waits for the next pacing tick, if a rate is configured
//! 3. Claims the next run-wide request number
//! 4. Renders the payload and metadata templates for that request number
//! 5. Dispatches the call according to the method's streaming shape
//! 6. Records the outcome; failures are collected, never fatal to the loop
//!
//! # Example
//!
//! ```ignore
//! use rpcbench_core::worker::WorkerBuilder;
//!
//! let worker = WorkerBuilder::new("w0")
//!     .method(method)
//!     .transport(transport)
//!     .config(config)
//!     .request_counter(counter)
//!     .calls(100)
//!     .build()?;
//!
//! match worker.run(stop_rx).await {
//!     Ok(stats) => println!("Completed: {}", stats.completed),
//!     Err(failures) => println!("{} calls failed", failures.len()),
//! }
//! ```

mod builder;
mod dispatch;
mod executor;
mod rate_limiter;
mod stats;

pub use builder::WorkerBuilder;
pub use executor::Worker;
pub use rate_limiter::Pacer;
pub use stats::WorkerStats;

#[cfg(test)]
mod tests;
