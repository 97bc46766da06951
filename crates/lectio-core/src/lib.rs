//! Reading session and listening coordination for the daily reader.
//!
//! The crate is UI-agnostic: a view layer (terminal driver, web bridge) sends
//! [`session::SessionCommand`]s and renders the [`session::ReaderSnapshot`]
//! it gets back. Everything that talks to the outside world sits behind the
//! traits in [`api`] and [`audio::output`].

pub mod api;
pub mod audio;
pub mod bindings;
pub mod cache;
pub mod cancellation;
pub mod config;
pub mod cursor;
pub mod error;
pub mod listening;
pub mod narration;
pub mod passage;
pub mod progress;
pub mod session;

#[cfg(test)]
mod test_support;
