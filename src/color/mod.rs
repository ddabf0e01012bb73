// SPDX-License-Identifier: GPL-3.0-only

//! Color space negotiation across a filter chain

pub mod manager;
pub mod strategy;

pub use manager::ColorSpaceManager;
pub use strategy::ColorSpaceStrategy;
