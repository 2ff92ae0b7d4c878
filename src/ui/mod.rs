//! Discord-facing rendering: embeds and the presentation sink.

pub mod embeds;
pub mod presenter;

pub use presenter::DiscordPresenter;
