//! # Bounded slot pool.
//!
//! A [`SlotPool`] bounds how many messages of one subscription are in flight.
//! Capacity is handed out as [`Slot`]s: RAII permits that return their
//! capacity when dropped, so every acquire is paired with exactly one release
//! no matter how the holder exits (success, error, panic, cancellation).
//!
//! ## Architecture
//! ```text
//! FetchLoop ── try_acquire() ──► Slot ──(moved into)──► Dispatcher task
//!                                                          │
//!                                                     drop(Slot)
//!                                                          │
//!                         in_use -= 1, permit returned ◄───┘
//!                         notify waiters (acquire / await_idle)
//! ```
//!
//! ## Rules
//! - `in_use` never exceeds `capacity` (semaphore permits).
//! - Release is structural (`Drop`); there is no public `release`.
//! - `available()` is a non-blocking, possibly stale snapshot.

mod slot;

pub use slot::{Slot, SlotPool};
