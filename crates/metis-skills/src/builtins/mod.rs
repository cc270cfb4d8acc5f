//! Built-in skill handlers
//!
//! Handlers ship compiled into the binary and are bound to skill
//! directories by name during a registry scan.

pub mod weather;

use crate::handler::HandlerSet;
use std::sync::Arc;

/// Handler set with every built-in handler registered
#[must_use]
pub fn default_handlers() -> HandlerSet {
    let mut set = HandlerSet::new();
    set.register("get_weather", Arc::new(weather::WeatherHandler));
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_handlers_register_builtins() {
        let set = default_handlers();
        assert!(set.contains("get_weather"));
    }
}
