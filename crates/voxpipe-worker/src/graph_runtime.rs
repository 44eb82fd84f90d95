//! Reference model runtime.
//!
//! Interprets a small layer graph described in TOML. It runs on the host
//! only and exists so the worker can be exercised end to end without a
//! numeric framework.
//!
//! Model definition:
//!
//! ```toml
//! name = "tiny"
//! inputs = ["data"]
//!
//! [[layers]]
//! name = "cropped"
//! op = "crop"
//! input = "data"
//! context = [2, 2, 2]
//!
//! [[layers]]
//! name = "scaled"
//! op = "scale"
//! input = "cropped"
//! param = "gain"
//! ```
//!
//! Weights:
//!
//! ```toml
//! [params.gain]
//! gain = 2.0
//! bias = 0.5
//! ```

use crate::protocol::{DeviceSelector, ModelInfo, NamedTensors};
use crate::runtime::{ModelRuntime, RuntimeError};
use ndarray::{ArrayD, Axis, Slice};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

#[derive(Debug, Deserialize)]
struct GraphDefinition {
    name: String,
    inputs: Vec<String>,
    #[serde(default)]
    layers: Vec<LayerDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
struct LayerDefinition {
    name: String,
    input: String,
    #[serde(flatten)]
    op: OpDefinition,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum OpDefinition {
    Identity,
    Relu,
    Sigmoid,
    Scale { param: String },
    Softmax { axis: usize },
    Crop { context: Vec<usize> },
}

#[derive(Debug, Default, Deserialize)]
struct WeightsFile {
    #[serde(default)]
    params: BTreeMap<String, ScaleParams>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
struct ScaleParams {
    gain: f32,
    #[serde(default)]
    bias: f32,
}

#[derive(Debug, Clone)]
enum Op {
    Identity,
    Relu,
    Sigmoid,
    Scale(ScaleParams),
    Softmax(usize),
    Crop(Vec<usize>),
}

#[derive(Debug, Clone)]
struct Layer {
    name: String,
    input: String,
    op: Op,
}

#[derive(Debug)]
struct LoadedGraph {
    name: String,
    inputs: Vec<String>,
    layers: Vec<Layer>,
}

/// Host-only interpreter for TOML layer graphs.
#[derive(Debug, Default)]
pub struct GraphRuntime {
    device: Option<DeviceSelector>,
    graph: Option<LoadedGraph>,
}

impl GraphRuntime {
    pub const NAME: &'static str = "reference-graph";

    /// Runtime with no model loaded.
    pub fn new() -> Self {
        Self::default()
    }

    fn compile(definition: GraphDefinition, weights: WeightsFile) -> Result<LoadedGraph, RuntimeError> {
        if definition.inputs.is_empty() {
            return Err(RuntimeError::Load("model declares no inputs".to_string()));
        }

        let mut known: HashSet<&str> = HashSet::new();
        for input in &definition.inputs {
            if !known.insert(input) {
                return Err(RuntimeError::Load(format!("duplicate input {:?}", input)));
            }
        }

        let mut layers = Vec::with_capacity(definition.layers.len());
        for layer in &definition.layers {
            if !known.contains(layer.input.as_str()) {
                return Err(RuntimeError::Load(format!(
                    "layer {:?} reads {:?}, which is neither an input nor an earlier layer",
                    layer.name, layer.input
                )));
            }
            let op = match &layer.op {
                OpDefinition::Identity => Op::Identity,
                OpDefinition::Relu => Op::Relu,
                OpDefinition::Sigmoid => Op::Sigmoid,
                OpDefinition::Scale { param } => {
                    let params = weights.params.get(param).ok_or_else(|| {
                        RuntimeError::Load(format!(
                            "layer {:?} needs weights {:?}",
                            layer.name, param
                        ))
                    })?;
                    Op::Scale(*params)
                }
                OpDefinition::Softmax { axis } => Op::Softmax(*axis),
                OpDefinition::Crop { context } => Op::Crop(context.clone()),
            };
            if !known.insert(&layer.name) {
                return Err(RuntimeError::Load(format!(
                    "duplicate layer name {:?}",
                    layer.name
                )));
            }
            layers.push(Layer {
                name: layer.name.clone(),
                input: layer.input.clone(),
                op,
            });
        }

        Ok(LoadedGraph {
            name: definition.name,
            inputs: definition.inputs,
            layers,
        })
    }
}

fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, RuntimeError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| RuntimeError::Load(format!("{}: {}", path.display(), e)))?;
    toml::from_str(&text).map_err(|e| RuntimeError::Load(format!("{}: {}", path.display(), e)))
}

impl Op {
    fn apply(&self, layer: &str, x: &ArrayD<f32>) -> Result<ArrayD<f32>, RuntimeError> {
        match self {
            Op::Identity => Ok(x.clone()),
            Op::Relu => Ok(x.mapv(|v| v.max(0.0))),
            Op::Sigmoid => Ok(x.mapv(|v| 1.0 / (1.0 + (-v).exp()))),
            Op::Scale(p) => Ok(x.mapv(|v| v * p.gain + p.bias)),
            Op::Softmax(axis) => {
                if *axis >= x.ndim() {
                    return Err(RuntimeError::Forward(format!(
                        "layer {:?}: softmax axis {} out of range for shape {:?}",
                        layer,
                        axis,
                        x.shape()
                    )));
                }
                let mut out = x.clone();
                for mut lane in out.lanes_mut(Axis(*axis)) {
                    let max = lane.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
                    lane.mapv_inplace(|v| (v - max).exp());
                    let sum = lane.sum();
                    lane.mapv_inplace(|v| v / sum);
                }
                Ok(out)
            }
            Op::Crop(context) => {
                if context.len() > x.ndim() {
                    return Err(RuntimeError::Forward(format!(
                        "layer {:?}: crop over {} axes of shape {:?}",
                        layer,
                        context.len(),
                        x.shape()
                    )));
                }
                let first = x.ndim() - context.len();
                for (i, &c) in context.iter().enumerate() {
                    if x.shape()[first + i] <= 2 * c {
                        return Err(RuntimeError::Forward(format!(
                            "layer {:?}: shape {:?} too small for context {:?}",
                            layer,
                            x.shape(),
                            context
                        )));
                    }
                }
                Ok(x.slice_each_axis(|ax| {
                    let index = ax.axis.index();
                    if index < first {
                        Slice::from(..)
                    } else {
                        let c = context[index - first] as isize;
                        Slice::new(c, Some(ax.len as isize - c), 1)
                    }
                })
                .to_owned())
            }
        }
    }
}

impl ModelRuntime for GraphRuntime {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn select_device(&mut self, device: DeviceSelector) -> Result<(), RuntimeError> {
        match device {
            DeviceSelector::Cpu => {
                self.device = Some(device);
                Ok(())
            }
            DeviceSelector::Accelerator(index) => Err(RuntimeError::Device(format!(
                "accelerator {} not available, {} runs on the host only",
                index,
                Self::NAME
            ))),
        }
    }

    fn load(&mut self, model_definition: &Path, weights: &Path) -> Result<ModelInfo, RuntimeError> {
        let device = self
            .device
            .ok_or_else(|| RuntimeError::Load("no device selected".to_string()))?;
        let definition: GraphDefinition = read_toml(model_definition)?;
        let weights: WeightsFile = read_toml(weights)?;
        let graph = Self::compile(definition, weights)?;

        let info = ModelInfo {
            name: graph.name.clone(),
            inputs: graph.inputs.clone(),
            outputs: graph.layers.iter().map(|l| l.name.clone()).collect(),
            device,
        };
        self.graph = Some(graph);
        Ok(info)
    }

    fn forward(&mut self, mut inputs: NamedTensors) -> Result<NamedTensors, RuntimeError> {
        let graph = self
            .graph
            .as_ref()
            .ok_or_else(|| RuntimeError::Forward("no model loaded".to_string()))?;

        let mut values: HashMap<&str, ArrayD<f32>> = HashMap::new();
        for name in &graph.inputs {
            let tensor = inputs
                .remove(name)
                .ok_or_else(|| RuntimeError::Forward(format!("missing input {:?}", name)))?;
            values.insert(name, tensor);
        }
        if !inputs.is_empty() {
            let unknown: Vec<_> = inputs.keys().collect();
            return Err(RuntimeError::Forward(format!(
                "model {:?} has no input layers {:?}",
                graph.name, unknown
            )));
        }

        for layer in &graph.layers {
            let source = &values[layer.input.as_str()];
            let result = layer.op.apply(&layer.name, source)?;
            values.insert(&layer.name, result);
        }

        Ok(graph
            .layers
            .iter()
            .filter_map(|l| values.remove(l.name.as_str()).map(|t| (l.name.clone(), t)))
            .collect())
    }

    fn release(&mut self) {
        self.graph = None;
        self.device = None;
    }
}
