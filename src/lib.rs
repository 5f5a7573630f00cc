#![allow(
    clippy::collapsible_if,
    clippy::needless_range_loop,
    clippy::identity_op,
    clippy::manual_range_contains,
    clippy::too_many_arguments
)]

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod bulk;
pub mod cache;
pub mod common;
pub mod engine;
pub mod error;
pub mod hasher;
pub mod path_codec;

pub use error::{FxxhError, Result};
