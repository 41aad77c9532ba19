//! replaytk Environment Abstraction Layer
//!
//! This crate isolates everything the playback engine needs from the outside
//! world so the same engine runs against a **real** clock (tokio) or a
//! **virtual** clock advanced by hand.
//!
//! # Seams
//!
//! - Time (`now()`, `sleep()`) via [`ReplayContext`]
//! - Recorded logs (`read()`) via [`LogSource`]
//! - Entity identity via [`EntityId`]
//!
//! # Example
//!
//! ```ignore
//! use replaytk_env::{ReplayContext, TokioContext};
//!
//! async fn frame_loop<Ctx: ReplayContext>(ctx: &Ctx) {
//!     loop {
//!         tick(ctx.now());
//!         ctx.sleep(Duration::from_millis(33)).await;
//!     }
//! }
//! ```

mod context;
mod source;
mod types;
mod error;
mod tokio_impl;

pub use context::ReplayContext;
pub use source::{FsLogSource, LogSource, MemoryLogSource};
pub use types::EntityId;
pub use error::EnvError;
pub use tokio_impl::TokioContext;
