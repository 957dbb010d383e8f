#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tensormux_core::{
    ArtifactCatalog, CapabilityClass, ContractEntry, DType, DeviceProbe, DeviceQueryError,
    InstanceGroup, InstanceKind, IoName, ModelConfig, Shape, TensorContract,
};
use tensormux_exec::{
    AllocationError, ContentError, ContentSource, ModelBackend, Payload, ResponseSink,
};
use tensormux_engine_echo::EchoEngine;

/// Outputs a sink received, keyed by output name, published when the sink
/// is dropped so tests can inspect them after the payloads are gone.
pub type Published = Arc<Mutex<HashMap<String, (Shape, Vec<u8>)>>>;

pub struct VecSource {
    chunks: HashMap<IoName, Vec<Bytes>>,
    cursors: HashMap<IoName, usize>,
    fail_on: Option<IoName>,
}

impl VecSource {
    pub fn new() -> Self {
        Self {
            chunks: HashMap::new(),
            cursors: HashMap::new(),
            fail_on: None,
        }
    }

    pub fn with_input(mut self, name: &str, chunks: Vec<Vec<u8>>) -> Self {
        self.chunks
            .insert(name.into(), chunks.into_iter().map(Bytes::from).collect());
        self
    }

    pub fn failing_on(mut self, name: &str) -> Self {
        self.fail_on = Some(name.into());
        self
    }
}

impl ContentSource for VecSource {
    fn next_chunk(
        &mut self,
        name: &IoName,
        _max_bytes: usize,
    ) -> Result<Option<&[u8]>, ContentError> {
        if self.fail_on.as_ref() == Some(name) {
            return Err(ContentError {
                name: name.clone(),
                reason: "synthetic content failure".to_string(),
            });
        }
        let Some(chunks) = self.chunks.get(name) else {
            return Ok(None);
        };
        let cursor = self.cursors.entry(name.clone()).or_insert(0);
        if *cursor >= chunks.len() {
            return Ok(None);
        }
        let idx = *cursor;
        *cursor += 1;
        Ok(Some(&chunks[idx]))
    }
}

pub struct VecSink {
    required: Vec<IoName>,
    fail_on: Option<IoName>,
    buffers: HashMap<IoName, (Shape, Vec<u8>)>,
    published: Published,
}

impl VecSink {
    /// A sink requiring the given outputs, paired with the handle its
    /// buffers are published to on drop.
    pub fn requiring(required: &[&str]) -> (Published, Box<Self>) {
        let published: Published = Arc::new(Mutex::new(HashMap::new()));
        let sink = Box::new(Self {
            required: required.iter().map(|n| IoName::from(*n)).collect(),
            fail_on: None,
            buffers: HashMap::new(),
            published: published.clone(),
        });
        (published, sink)
    }

    pub fn failing_on(mut self: Box<Self>, name: &str) -> Box<Self> {
        self.fail_on = Some(name.into());
        self
    }
}

impl ResponseSink for VecSink {
    fn requires_output(&self, name: &IoName) -> bool {
        self.required.contains(name)
    }

    fn allocate(
        &mut self,
        name: &IoName,
        byte_size: usize,
        shape: &Shape,
    ) -> Result<&mut [u8], AllocationError> {
        if self.fail_on.as_ref() == Some(name) {
            return Err(AllocationError {
                name: name.clone(),
                reason: "synthetic allocation failure".to_string(),
            });
        }
        let slot = self
            .buffers
            .entry(name.clone())
            .or_insert_with(|| (shape.clone(), Vec::new()));
        slot.0 = shape.clone();
        slot.1.clear();
        slot.1.resize(byte_size, 0);
        Ok(&mut slot.1[..])
    }
}

impl Drop for VecSink {
    fn drop(&mut self) {
        let mut published = self.published.lock().unwrap();
        for (name, data) in self.buffers.drain() {
            published.insert(name.0, data);
        }
    }
}

pub struct FixedProbe(pub CapabilityClass);

impl DeviceProbe for FixedProbe {
    fn capability(&self, _device_id: u32) -> Result<CapabilityClass, DeviceQueryError> {
        Ok(self.0)
    }
}

pub struct BrokenProbe;

impl DeviceProbe for BrokenProbe {
    fn capability(&self, device_id: u32) -> Result<CapabilityClass, DeviceQueryError> {
        Err(DeviceQueryError {
            device_id,
            reason: "driver unavailable".to_string(),
        })
    }
}

pub fn probe() -> FixedProbe {
    FixedProbe(CapabilityClass { major: 7, minor: 5 })
}

pub fn catalog() -> ArtifactCatalog {
    let mut catalog = ArtifactCatalog::new();
    catalog.insert("model.echo", "models/ident/model.echo");
    catalog
}

pub fn entry(name: &str, dtype: DType, dims: &[usize]) -> ContractEntry {
    ContractEntry {
        name: name.into(),
        dtype,
        dims: Shape::from_slice(dims),
    }
}

pub fn cpu_group(name: &str, count: u32) -> InstanceGroup {
    InstanceGroup {
        name: name.to_string(),
        count,
        kind: InstanceKind::Cpu,
    }
}

/// A single-instance CPU model with one f32 input `x` of dims [2] and one
/// f32 output `y` of dims [2].
pub fn identity_config(max_batch_size: i64) -> ModelConfig {
    ModelConfig {
        name: "ident".to_string(),
        max_batch_size,
        contract: TensorContract {
            inputs: vec![entry("x", DType::F32, &[2])],
            outputs: vec![entry("y", DType::F32, &[2])],
        },
        default_artifact: "model.echo".to_string(),
        cc_artifacts: HashMap::new(),
        instance_groups: vec![cpu_group("g0", 1)],
    }
}

pub fn identity_engine() -> EchoEngine {
    EchoEngine::new(["x"], ["y"])
}

/// A payload supplying `data` for input `x` in one chunk, requiring `y`.
pub fn identity_payload(batch_size: usize, data: Vec<u8>) -> (Published, Payload) {
    let source = VecSource::new().with_input("x", vec![data]);
    let (published, sink) = VecSink::requiring(&["y"]);
    let payload = Payload::new(batch_size, Box::new(source)).with_sink(sink);
    (published, payload)
}

pub fn load_backend(engine: &EchoEngine, config: &ModelConfig) -> ModelBackend<EchoEngine> {
    ModelBackend::load(engine, &(), config, &catalog(), &probe()).expect("backend load")
}

pub fn f32_bytes(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 4);
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}
