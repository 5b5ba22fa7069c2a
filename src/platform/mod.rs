//! Chat platform access
//!
//! Discovery talks to the platform only through the [`PlatformClient`] trait.
//! [`DiscordClient`] is the REST implementation shipped with the binary.

mod discord;
mod traits;

pub use discord::DiscordClient;
pub use traits::PlatformClient;
