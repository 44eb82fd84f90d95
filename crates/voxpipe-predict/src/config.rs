//! Prediction node configuration.
//!
//! Built in code with [`PredictConfig::builder`] or loaded from TOML:
//!
//! ```toml
//! model_definition = "net.toml"   # relative to this file
//! weights = "weights.toml"
//! device = "cpu"                  # or "accelerator:0"
//! isolation = "process"           # or "in-process"
//!
//! [inputs]
//! data = "RAW"                    # array key
//! gain = { attribute = "gain" }   # batch attribute
//!
//! [outputs]
//! softmax = "PRED"
//!
//! [array_specs.PRED]
//! interpolatable = false
//!
//! [worker]
//! connect_timeout_ms = 5000
//! ```

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use voxpipe_core::{ArrayKey, ArrayKeyRegistry, ArraySpec};
use voxpipe_worker::{DeviceSelector, WorkerConfig, WorkerSettings};

/// Where a model input layer reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Array(ArrayKey),
    /// A tensor stored on the batch rather than an ROI-indexed array.
    Attribute(String),
}

impl From<ArrayKey> for InputSource {
    fn from(key: ArrayKey) -> Self {
        InputSource::Array(key)
    }
}

/// How the model runtime is hosted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Isolation {
    /// A `voxpipe-worker` child process.
    #[default]
    Process,
    /// A dedicated thread in this process, running the reference runtime.
    InProcess,
}

/// Validated configuration for a [`Predict`](crate::Predict) node.
#[derive(Debug, Clone)]
pub struct PredictConfig {
    inputs: BTreeMap<String, InputSource>,
    outputs: BTreeMap<String, ArrayKey>,
    array_specs: BTreeMap<ArrayKey, ArraySpec>,
    settings: WorkerSettings,
    isolation: Isolation,
    worker: WorkerConfig,
}

impl PredictConfig {
    /// Starts a configuration for the given model files.
    pub fn builder(model_definition: impl Into<PathBuf>, weights: impl Into<PathBuf>) -> PredictConfigBuilder {
        PredictConfigBuilder {
            model_definition: model_definition.into(),
            weights: weights.into(),
            device: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            array_specs: Vec::new(),
            isolation: Isolation::default(),
            worker: WorkerConfig::default(),
        }
    }

    /// Loads a TOML config. Relative model paths are resolved against the
    /// file's directory.
    pub fn from_toml_file(path: impl AsRef<Path>, registry: &ArrayKeyRegistry) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::PathNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml_str(&text, base, registry)
    }

    /// Input array keys must already be registered. Output keys are
    /// registered if new.
    pub fn from_toml_str(text: &str, base_dir: &Path, registry: &ArrayKeyRegistry) -> Result<Self> {
        let file: PredictFile = toml::from_str(text)?;

        let mut builder = Self::builder(
            base_dir.join(&file.model_definition),
            base_dir.join(&file.weights),
        )
        .isolation(file.isolation)
        .worker(file.worker);

        if let Some(device) = &file.device {
            builder = builder.device(device.parse()?);
        }

        for (layer, entry) in file.inputs {
            builder = match entry {
                InputEntry::Array(name) => builder.input(layer, registry.resolve(&name)?),
                InputEntry::Attribute { attribute } => builder.attribute_input(layer, attribute),
            };
        }
        for (layer, name) in file.outputs {
            builder = builder.output(layer, registry.register(&name)?);
        }
        for (name, spec) in file.array_specs {
            builder = builder.array_spec(registry.resolve(&name)?, spec);
        }

        builder.build()
    }

    /// Model input layer -> source.
    pub fn inputs(&self) -> &BTreeMap<String, InputSource> {
        &self.inputs
    }

    /// Model output layer -> key it is written to.
    pub fn outputs(&self) -> &BTreeMap<String, ArrayKey> {
        &self.outputs
    }

    /// Spec overrides for output `key`.
    pub fn array_spec(&self, key: &ArrayKey) -> Option<&ArraySpec> {
        self.array_specs.get(key)
    }

    /// Model files and device handed to the worker.
    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    /// Where the worker runs.
    pub fn isolation(&self) -> Isolation {
        self.isolation
    }

    /// Process worker settings. Ignored for in-process isolation.
    pub fn worker(&self) -> &WorkerConfig {
        &self.worker
    }

    /// Array keys read by the model, in layer order.
    pub fn array_inputs(&self) -> impl Iterator<Item = &ArrayKey> {
        self.inputs.values().filter_map(|source| match source {
            InputSource::Array(key) => Some(key),
            InputSource::Attribute(_) => None,
        })
    }

    /// Output keys in layer-name order.
    pub fn output_keys(&self) -> impl Iterator<Item = &ArrayKey> {
        self.outputs.values()
    }
}

#[derive(Debug, Clone)]
pub struct PredictConfigBuilder {
    model_definition: PathBuf,
    weights: PathBuf,
    device: Option<DeviceSelector>,
    inputs: Vec<(String, InputSource)>,
    outputs: Vec<(String, ArrayKey)>,
    array_specs: Vec<(ArrayKey, ArraySpec)>,
    isolation: Isolation,
    worker: WorkerConfig,
}

impl PredictConfigBuilder {
    /// Feeds array `key` to model input `layer`.
    pub fn input(mut self, layer: impl Into<String>, key: ArrayKey) -> Self {
        self.inputs.push((layer.into(), InputSource::Array(key)));
        self
    }

    /// Feeds batch attribute `name` to model input `layer`.
    pub fn attribute_input(mut self, layer: impl Into<String>, name: impl Into<String>) -> Self {
        self.inputs
            .push((layer.into(), InputSource::Attribute(name.into())));
        self
    }

    /// Writes model output `layer` to `key`.
    pub fn output(mut self, layer: impl Into<String>, key: ArrayKey) -> Self {
        self.outputs.push((layer.into(), key));
        self
    }

    /// Overrides merged onto the advertised spec of output `key`.
    pub fn array_spec(mut self, key: ArrayKey, spec: ArraySpec) -> Self {
        self.array_specs.push((key, spec));
        self
    }

    /// Device to run on. Defaults to the CPU.
    pub fn device(mut self, device: DeviceSelector) -> Self {
        self.device = Some(device);
        self
    }

    /// Defaults to a separate worker process.
    pub fn isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = isolation;
        self
    }

    /// Spawn and timeout settings for the worker process.
    pub fn worker(mut self, worker: WorkerConfig) -> Self {
        self.worker = worker;
        self
    }

    /// Validates paths and layer mappings.
    pub fn build(self) -> Result<PredictConfig> {
        let settings = WorkerSettings::configure(&self.model_definition, &self.weights, self.device)?;

        if self.inputs.is_empty() {
            return Err(Error::Config("at least one input is required".to_string()));
        }
        if self.outputs.is_empty() {
            return Err(Error::Config("at least one output is required".to_string()));
        }

        let mut inputs = BTreeMap::new();
        for (layer, source) in self.inputs {
            check_layer_name(&layer)?;
            if let InputSource::Attribute(name) = &source {
                if name.trim().is_empty() {
                    return Err(Error::Config(format!(
                        "input layer {:?} reads an unnamed attribute",
                        layer
                    )));
                }
            }
            if inputs.insert(layer.clone(), source).is_some() {
                return Err(Error::Config(format!("input layer {:?} given twice", layer)));
            }
        }

        let input_keys: BTreeSet<&ArrayKey> = inputs
            .values()
            .filter_map(|source| match source {
                InputSource::Array(key) => Some(key),
                InputSource::Attribute(_) => None,
            })
            .collect();

        let mut outputs = BTreeMap::new();
        let mut output_keys = BTreeSet::new();
        for (layer, key) in self.outputs {
            check_layer_name(&layer)?;
            if input_keys.contains(&key) {
                return Err(Error::Config(format!(
                    "{} is both an input and an output",
                    key
                )));
            }
            if !output_keys.insert(key.clone()) {
                return Err(Error::Config(format!("{} is written by two output layers", key)));
            }
            if outputs.insert(layer.clone(), key).is_some() {
                return Err(Error::Config(format!("output layer {:?} given twice", layer)));
            }
        }

        let mut array_specs = BTreeMap::new();
        for (key, spec) in self.array_specs {
            if !output_keys.contains(&key) {
                return Err(Error::Config(format!(
                    "array spec given for {}, which is not an output",
                    key
                )));
            }
            array_specs.insert(key, spec);
        }

        if self.isolation == Isolation::Process {
            self.worker.validate()?;
        }

        Ok(PredictConfig {
            inputs,
            outputs,
            array_specs,
            settings,
            isolation: self.isolation,
            worker: self.worker,
        })
    }
}

fn check_layer_name(layer: &str) -> Result<()> {
    if layer.trim().is_empty() {
        return Err(Error::Config("layer names must not be empty".to_string()));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PredictFile {
    model_definition: PathBuf,
    weights: PathBuf,
    #[serde(default)]
    device: Option<String>,
    #[serde(default)]
    isolation: Isolation,
    inputs: BTreeMap<String, InputEntry>,
    outputs: BTreeMap<String, String>,
    #[serde(default)]
    array_specs: BTreeMap<String, ArraySpec>,
    #[serde(default)]
    worker: WorkerConfig,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InputEntry {
    Array(String),
    Attribute { attribute: String },
}
