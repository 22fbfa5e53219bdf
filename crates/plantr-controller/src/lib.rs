// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]

mod assets;
mod controller;
mod error;
mod http;
mod render;

pub use assets::AssetResolver;
pub use controller::{Controller, ControllerConfig};
pub use error::ControllerError;
pub use http::{AppState, RpcError, build_router};
