//! Tile caching and background loading.
//!
//! Each [`TileLoader`] owns one [`RecencyCache`] of decoded tiles and one
//! [`LoadingQueue`] of pending requests for a single WMS source. Misses are
//! fetched by a small pool of tokio tasks and announced on an event channel
//! so the draw context can repaint.

mod cache;
mod fetch;
mod loader;
mod queue;

pub use cache::RecencyCache;
pub use fetch::{HttpFetcher, TileFetcher, decode_tile};
pub use loader::{
    EventReceiver, EventSender, LoaderConfig, LoaderEvent, TileId, TileLoader, channel,
};
pub use queue::LoadingQueue;

#[cfg(test)]
pub(crate) use fetch::tests::png_tile;
