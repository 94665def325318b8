//! Message type registry

use std::collections::BTreeMap;

use pubsub_bench_transport::MessageType;

use crate::error::{TopologyError, TopologyResult};

/// Maps message type tags to payload sizes
///
/// Tags of the form `stamped<N><unit>` with unit `b`, `kb` or `mb` are
/// resolved without registration (`kb` = 1024 bytes). Other tags must be
/// registered explicitly.
#[derive(Debug, Clone, Default)]
pub struct MessageRegistry {
    custom: BTreeMap<String, usize>,
}

impl MessageRegistry {
    /// Create a registry that only knows `stamped*` tags
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom tag
    pub fn register(&mut self, name: impl Into<String>, size: usize) {
        self.custom.insert(name.into(), size);
    }

    /// Resolve a tag
    pub fn resolve(&self, name: &str) -> TopologyResult<MessageType> {
        if let Some(size) = self.custom.get(name) {
            return Ok(MessageType::new(name, *size));
        }
        parse_stamped(name)
            .map(|size| MessageType::new(name, size))
            .ok_or_else(|| TopologyError::UnknownMessageType(name.to_string()))
    }
}

fn parse_stamped(name: &str) -> Option<usize> {
    let rest = name.strip_prefix("stamped")?;
    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    let (number, unit) = rest.split_at(digits);
    let number: usize = number.parse().ok()?;
    let multiplier = match unit {
        "b" => 1,
        "kb" => 1024,
        "mb" => 1024 * 1024,
        _ => return None,
    };
    number.checked_mul(multiplier)
}
