//! RESP2 wire codec and the [`RespStore`] client

mod client;
mod codec;

pub use client::{parse_info, RespStore, DEFAULT_TIMEOUT};
pub use codec::{FrameError, RespValue};
