use std::time::Instant;

use bytes::Bytes;
use tensormux_core::{DType, IoName, Shape};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("input content error for '{name}': {reason}")]
pub struct ContentError {
    pub name: IoName,
    pub reason: String,
}

#[derive(Debug, Error)]
#[error("failed to allocate output buffer for '{name}': {reason}")]
pub struct AllocationError {
    pub name: IoName,
    pub reason: String,
}

/// Faults scoped to a single payload. Siblings in the same batch keep
/// executing; the batch-level status never carries these.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error("expected {expected} bytes of data for inference input '{name}', got {got}")]
    InputTooShort {
        name: IoName,
        got: usize,
        expected: usize,
    },
    #[error("unexpected size {got} for inference input '{name}', expecting {expected}")]
    InputTooLarge {
        name: IoName,
        got: usize,
        expected: usize,
    },
    #[error(transparent)]
    Allocation(#[from] AllocationError),
}

/// Streams one request's input bytes. Content for one input may arrive in
/// several chunks; `max_bytes` tells the source how much slice capacity is
/// left, but a source that returns more is caught as over-supply by the
/// assembler rather than trusted.
pub trait ContentSource: Send {
    /// Next chunk for `name`, or `None` once the source is exhausted.
    fn next_chunk(&mut self, name: &IoName, max_bytes: usize)
        -> Result<Option<&[u8]>, ContentError>;
}

/// Receives one request's outputs. `shape` is the per-instance shape of the
/// output being delivered.
pub trait ResponseSink: Send {
    fn requires_output(&self, name: &IoName) -> bool;

    fn allocate(
        &mut self,
        name: &IoName,
        byte_size: usize,
        shape: &Shape,
    ) -> Result<&mut [u8], AllocationError>;
}

/// One input the request declared, with the per-instance dims it echoed.
#[derive(Clone, Debug)]
pub struct InputBinding {
    pub name: IoName,
    pub dims: Shape,
}

/// A caller-supplied input value that supplements or replaces a declared
/// input for this one request.
#[derive(Clone, Debug)]
pub struct InputOverride {
    pub dtype: DType,
    pub dims: Shape,
    pub value: Bytes,
}

/// Ordered name-to-override map; insertion order is preserved so tensor
/// assembly stays deterministic.
#[derive(Clone, Debug, Default)]
pub struct OverrideMap {
    entries: Vec<(IoName, InputOverride)>,
}

impl OverrideMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<IoName>, value: InputOverride) {
        self.entries.push((name.into(), value));
    }

    pub fn get(&self, name: &IoName) -> Option<&InputOverride> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IoName, &InputOverride)> {
        self.entries.iter().map(|(n, v)| (n, v))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Timings {
    pub queued_us: u64,
    pub compute_us: u64,
}

/// One inference request plus its response destination, as handed to a
/// runner for one execution. Position in the batch fixes the byte offset of
/// the request's slice in every assembled and scattered tensor.
pub struct Payload {
    /// Inputs the request supplied, in request order.
    pub inputs: Vec<InputBinding>,
    /// Caller-declared batch size for this one request.
    pub batch_size: usize,
    pub overrides: Option<OverrideMap>,
    pub source: Box<dyn ContentSource>,
    pub sink: Option<Box<dyn ResponseSink>>,
    /// When the request entered the queue; taken by the dispatcher to close
    /// the queue-wait measurement. Leave unset to opt out of metering.
    pub queued_at: Option<Instant>,
    pub compute_started: Option<Instant>,
    pub timings: Timings,
    error: Option<PayloadError>,
}

impl Payload {
    pub fn new(batch_size: usize, source: Box<dyn ContentSource>) -> Self {
        Self {
            inputs: Vec::new(),
            batch_size,
            overrides: None,
            source,
            sink: None,
            queued_at: None,
            compute_started: None,
            timings: Timings::default(),
            error: None,
        }
    }

    pub fn with_inputs(mut self, inputs: Vec<InputBinding>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn ResponseSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_overrides(mut self, overrides: OverrideMap) -> Self {
        self.overrides = Some(overrides);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn error(&self) -> Option<&PayloadError> {
        self.error.as_ref()
    }

    /// Record a fault on this payload. The first recorded fault wins;
    /// later ones are dropped so the terminal status names the root cause.
    pub fn fail(&mut self, error: PayloadError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    pub fn binding(&self, name: &IoName) -> Option<&InputBinding> {
        self.inputs.iter().find(|b| &b.name == name)
    }

    pub fn override_for(&self, name: &IoName) -> Option<&InputOverride> {
        self.overrides.as_ref().and_then(|map| map.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoContent;

    impl ContentSource for NoContent {
        fn next_chunk(
            &mut self,
            _name: &IoName,
            _max_bytes: usize,
        ) -> Result<Option<&[u8]>, ContentError> {
            Ok(None)
        }
    }

    #[test]
    fn first_recorded_fault_wins() {
        let mut payload = Payload::new(1, Box::new(NoContent));
        payload.fail(PayloadError::InputTooShort {
            name: "x".into(),
            got: 0,
            expected: 4,
        });
        payload.fail(PayloadError::InputTooLarge {
            name: "x".into(),
            got: 8,
            expected: 4,
        });
        assert!(matches!(
            payload.error(),
            Some(PayloadError::InputTooShort { .. })
        ));
    }

    #[test]
    fn override_map_preserves_insertion_order() {
        let mut map = OverrideMap::new();
        map.insert(
            "b",
            InputOverride {
                dtype: DType::U8,
                dims: Shape::from_slice(&[1]),
                value: Bytes::from_static(&[1]),
            },
        );
        map.insert(
            "a",
            InputOverride {
                dtype: DType::U8,
                dims: Shape::from_slice(&[1]),
                value: Bytes::from_static(&[2]),
            },
        );
        let names: Vec<_> = map.iter().map(|(n, _)| n.as_str().to_string()).collect();
        assert_eq!(names, ["b", "a"]);
    }
}
