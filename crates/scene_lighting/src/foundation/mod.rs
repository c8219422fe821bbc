//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the crate:
//! - Math types and bounding volumes
//! - Light identifier allocation
//! - Logging utilities

pub mod id;
pub mod logging;
pub mod math;
