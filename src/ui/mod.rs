//! Message rendering.

pub mod embeds;
