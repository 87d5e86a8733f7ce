// Allow pre-existing clippy lints across the codebase
#![allow(
    clippy::collapsible_if,
    clippy::len_without_is_empty,
    clippy::doc_lazy_continuation,
    clippy::manual_range_contains,
    clippy::result_large_err
)]

/// Use mimalloc as the global allocator for all binaries.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod aio;
pub mod common;
pub mod wc;
