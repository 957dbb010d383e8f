use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::{Device, ModelConfig};

/// Compute-capability class of a device, used to pick among artifact
/// variants compiled for different device generations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CapabilityClass {
    pub major: u32,
    pub minor: u32,
}

impl fmt::Display for CapabilityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Error)]
#[error("unable to get device properties for gpu{device_id}: {reason}")]
pub struct DeviceQueryError {
    pub device_id: u32,
    pub reason: String,
}

/// Capability lookup for one device, answered by the driver layer.
pub trait DeviceProbe {
    fn capability(&self, device_id: u32) -> Result<CapabilityClass, DeviceQueryError>;
}

/// Resolved map from logical artifact name to its on-disk location.
#[derive(Clone, Debug, Default)]
pub struct ArtifactCatalog {
    paths: HashMap<String, PathBuf>,
}

impl ArtifactCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) {
        self.paths.insert(name.into(), path.into());
    }

    pub fn get(&self, name: &str) -> Option<&Path> {
        self.paths.get(name).map(PathBuf::as_path)
    }
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("unable to find artifact '{name}' for model '{model}'")]
    NotFound { model: String, name: String },
    #[error(transparent)]
    DeviceQuery(#[from] DeviceQueryError),
}

/// The artifact one context should load.
#[derive(Clone, Debug)]
pub struct ResolvedArtifact {
    pub name: String,
    pub path: PathBuf,
    pub capability: Option<CapabilityClass>,
}

/// Pick the artifact for `device`: CPU instances take the default artifact,
/// GPU instances take the one registered for the device's capability class,
/// falling back to the default when no class-specific variant exists.
pub fn resolve_artifact(
    config: &ModelConfig,
    catalog: &ArtifactCatalog,
    device: Device,
    probe: &dyn DeviceProbe,
) -> Result<ResolvedArtifact, ArtifactError> {
    let (name, capability) = match device {
        Device::Cpu => (config.default_artifact.clone(), None),
        Device::Cuda { device_id } => {
            let cc = probe.capability(device_id)?;
            let name = config
                .cc_artifacts
                .get(&cc.to_string())
                .cloned()
                .unwrap_or_else(|| config.default_artifact.clone());
            (name, Some(cc))
        }
    };

    let path = catalog
        .get(&name)
        .ok_or_else(|| ArtifactError::NotFound {
            model: config.name.clone(),
            name: name.clone(),
        })?
        .to_path_buf();

    Ok(ResolvedArtifact {
        name,
        path,
        capability,
    })
}
