//! Predict node integration tests
//!
//! Runs the node against the reference runtime in an in-process worker.

use crate::helpers::tolerances::{FLOAT_EPSILON, SOFTMAX_EPSILON};
use crate::helpers::*;
use approx::assert_relative_eq;
use std::sync::Arc;
use voxpipe::prelude::*;
use voxpipe::{Coordinate, GraphRuntime, InProcessBridge, ModelRuntime};

fn softmax_node(files: &ModelFiles, keys: &Keys) -> Predict {
    let config = files
        .config()
        .input("data", keys.raw.clone())
        .output("softmax", keys.pred.clone())
        .output("logits", keys.logits.clone())
        .build()
        .unwrap();
    let mut node = Predict::new(config).unwrap();
    node.setup(&ProviderSpec::new().with(keys.raw.clone(), raw_spec()))
        .unwrap();
    node
}

/// Serves crops of one stored volume.
struct VolumeSource {
    key: ArrayKey,
    volume: Array,
}

impl BatchFilter for VolumeSource {
    type Error = voxpipe::core::Error;

    fn setup(&mut self, _upstream: &ProviderSpec) -> std::result::Result<(), Self::Error> {
        Ok(())
    }

    fn consumes(&self) -> Vec<ArrayKey> {
        Vec::new()
    }

    fn provides(&self) -> ProviderSpec {
        ProviderSpec::new().with(self.key.clone(), self.volume.spec().clone())
    }

    fn prepare(&self, _request: &Request) -> std::result::Result<Request, Self::Error> {
        Ok(Request::new())
    }

    fn process(
        &mut self,
        mut batch: Batch,
        request: &Request,
    ) -> std::result::Result<Batch, Self::Error> {
        if let Some(roi) = request.roi(&self.key) {
            batch.insert(self.key.clone(), self.volume.crop(roi)?);
        }
        Ok(batch)
    }
}

#[test]
fn test_predict_end_to_end() {
    let files = ModelFiles::new();
    let keys = Keys::new();
    let mut node = softmax_node(&files, &keys);

    let provided = node.provides();
    let advertised = provided.get(&keys.pred).unwrap();
    assert_eq!(advertised.roi, None);
    assert_eq!(advertised.dtype, Some(DataType::Float32));
    assert_eq!(node.consumes(), vec![keys.raw.clone()]);

    let request = Request::new().with_roi(keys.pred.clone(), roi([2, 2, 2], [6, 6, 6]));
    let batch = batch_with(&keys.raw, raw_volume(|z, _, _| z as f32 * 0.1));
    assert!(!batch.contains(&keys.pred));

    let batch = node.process(batch, &request).unwrap();

    let pred = batch.get(&keys.pred).unwrap();
    assert_eq!(pred.spec().roi, Some(roi([2, 2, 2], [6, 6, 6])));
    assert_eq!(pred.spec().voxel_size, Some(Coordinate::from([1, 1, 1])));
    assert_eq!(pred.spec().dtype, Some(DataType::Float32));
    assert_eq!(pred.data().shape(), &[6, 6, 6]);
    assert!(!batch.contains(&keys.logits));

    let data = pred.data().as_f32().unwrap();
    for y in 0..6 {
        for x in 0..6 {
            let sum: f32 = (0..6).map(|z| data[[z, y, x]]).sum();
            assert_relative_eq!(sum, 1.0, epsilon = SOFTMAX_EPSILON);
        }
    }
    // Raw intensity grows with z, so does the probability.
    assert!(data[[5, 0, 0]] > data[[0, 0, 0]]);
}

#[test]
fn test_successive_predictions_do_not_leak() {
    let files = ModelFiles::new();
    let keys = Keys::new();
    let mut node = softmax_node(&files, &keys);
    let request = Request::new().with_roi(keys.logits.clone(), roi([2, 2, 2], [6, 6, 6]));

    let first = node
        .process(batch_with(&keys.raw, raw_volume(|_, _, _| 1.0)), &request)
        .unwrap();
    let second = node
        .process(batch_with(&keys.raw, raw_volume(|_, _, _| 3.0)), &request)
        .unwrap();

    let first = first.get(&keys.logits).unwrap().data().as_f32().unwrap().clone();
    let second = second.get(&keys.logits).unwrap().data().as_f32().unwrap().clone();
    assert!(first.iter().all(|&v| (v - 2.0).abs() < FLOAT_EPSILON));
    assert!(second.iter().all(|&v| (v - 6.0).abs() < FLOAT_EPSILON));
}

#[test]
fn test_pull_through_source() {
    let files = ModelFiles::new();
    let keys = Keys::new();
    let mut node = softmax_node(&files, &keys);
    let mut source = VolumeSource {
        key: keys.raw.clone(),
        volume: raw_volume(|z, y, x| (z + y + x) as f32),
    };
    source.setup(&ProviderSpec::new()).unwrap();
    node.setup(&source.provides()).unwrap();

    // The model eats 2 voxels of context per side.
    let pred_roi = roi([3, 3, 3], [4, 4, 4]);
    let context = Coordinate::from([2, 2, 2]);
    let raw_roi = pred_roi.grow(&context, &context).unwrap();
    assert_eq!(raw_roi, roi([1, 1, 1], [8, 8, 8]));

    let request = Request::new()
        .with_roi(keys.pred.clone(), pred_roi.clone())
        .with_roi(keys.raw.clone(), raw_roi.clone());
    let upstream = node.prepare(&request).unwrap();
    assert!(!upstream.contains(&keys.pred));
    assert_eq!(upstream.roi(&keys.raw), Some(&raw_roi));

    let batch = source.process(Batch::new(), &upstream).unwrap();
    let batch = node.process(batch, &request).unwrap();

    assert_eq!(batch.get(&keys.pred).unwrap().spec().roi, Some(pred_roi));
    assert_eq!(batch.get(&keys.pred).unwrap().data().shape(), &[4, 4, 4]);
    assert_eq!(batch.get(&keys.raw).unwrap().spec().roi, Some(raw_roi));
}

#[test]
fn test_mismatched_request_roi_is_an_error() {
    let files = ModelFiles::new();
    let keys = Keys::new();
    let mut node = softmax_node(&files, &keys);

    // The model produces 6^3 from a 10^3 input.
    let request = Request::new().with_roi(keys.pred.clone(), roi([2, 2, 2], [4, 4, 4]));
    let err = node
        .process(batch_with(&keys.raw, raw_volume(|_, _, _| 0.0)), &request)
        .unwrap_err();
    assert!(matches!(
        err,
        voxpipe::predict::Error::Data(voxpipe::core::Error::ShapeMismatch { .. })
    ));
}

#[test]
fn test_missing_model_files_fail_at_construction() {
    let files = ModelFiles::new();
    let keys = Keys::new();
    let missing = files.path().join("missing-net.toml");

    let err = PredictConfig::builder(&missing, &files.weights)
        .input("data", keys.raw.clone())
        .output("softmax", keys.pred.clone())
        .build()
        .unwrap_err();
    assert!(err.is_config());
    assert!(err.to_string().contains("missing-net.toml"));
}

#[test]
fn test_device_claim_failure_is_sticky() {
    let files = ModelFiles::new();
    let keys = Keys::new();
    let config = files
        .config()
        .device(DeviceSelector::Accelerator(0))
        .input("data", keys.raw.clone())
        .output("softmax", keys.pred.clone())
        .build()
        .unwrap();
    let mut node = Predict::new(config).unwrap();
    node.setup(&ProviderSpec::new().with(keys.raw.clone(), raw_spec()))
        .unwrap();
    let request = Request::new().with_roi(keys.pred.clone(), roi([2, 2, 2], [6, 6, 6]));

    for _ in 0..2 {
        let err = node
            .process(batch_with(&keys.raw, raw_volume(|_, _, _| 0.0)), &request)
            .unwrap_err();
        assert!(err.is_startup());
    }
    assert_eq!(node.worker_state(), WorkerState::Failed);
}

#[test]
fn test_shared_worker_serializes_predictions() {
    let files = ModelFiles::new();
    let keys = Keys::new();
    let worker: Arc<dyn WorkerBridge> = Arc::new(InProcessBridge::new(Arc::new(|| {
        Box::new(GraphRuntime::new()) as Box<dyn ModelRuntime>
    })));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let config = files
                .config()
                .input("data", keys.raw.clone())
                .output("logits", keys.logits.clone())
                .build()
                .unwrap();
            let mut node = Predict::with_worker(config, Arc::clone(&worker));
            let raw = keys.raw.clone();
            let logits = keys.logits.clone();
            std::thread::spawn(move || {
                node.setup(&ProviderSpec::new().with(raw.clone(), raw_spec()))
                    .unwrap();
                let request = Request::new().with_roi(logits.clone(), roi([2, 2, 2], [6, 6, 6]));
                let value = i as f32;
                let batch = node
                    .process(batch_with(&raw, raw_volume(move |_, _, _| value)), &request)
                    .unwrap();
                batch.get(&logits).unwrap().data().as_f32().unwrap()[[3, 3, 3]]
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        assert_relative_eq!(handle.join().unwrap(), 2.0 * i as f32);
    }
    assert_eq!(worker.state(), WorkerState::Running);
    worker.stop().unwrap();
}

#[test]
fn test_config_from_toml_file() {
    let files = ModelFiles::new();
    let keys = Keys::new();
    let path = files.path().join("predict.toml");
    std::fs::write(
        &path,
        r#"
model_definition = "unet-lite.toml"
weights = "unet-lite.weights.toml"
isolation = "in-process"

[inputs]
data = "RAW"

[outputs]
softmax = "PRED"

[array_specs.PRED]
interpolatable = false
"#,
    )
    .unwrap();

    let config = PredictConfig::from_toml_file(&path, &keys.registry).unwrap();
    let mut node = Predict::new(config).unwrap();
    node.setup(&ProviderSpec::new().with(keys.raw.clone(), raw_spec()))
        .unwrap();
    assert_eq!(
        node.provides().get(&keys.pred).unwrap().interpolatable,
        Some(false)
    );

    let request = Request::new().with_roi(keys.pred.clone(), roi([2, 2, 2], [6, 6, 6]));
    let batch = node
        .process(batch_with(&keys.raw, raw_volume(|_, _, _| 0.5)), &request)
        .unwrap();
    assert!(batch.contains(&keys.pred));

    node.teardown().unwrap();
    assert_eq!(node.worker_state(), WorkerState::Stopped);
}

#[test]
fn test_errors_convert_to_umbrella_error() {
    fn run(node: &mut Predict, keys: &Keys) -> voxpipe::Result<Batch> {
        let request = Request::new().with_roi(keys.pred.clone(), roi([2, 2, 2], [6, 6, 6]));
        Ok(node.process(Batch::new(), &request)?)
    }

    let files = ModelFiles::new();
    let keys = Keys::new();
    let mut node = softmax_node(&files, &keys);
    let err = run(&mut node, &keys).unwrap_err();
    assert!(matches!(err, voxpipe::Error::Predict(_)));
    assert!(err.to_string().contains("RAW"));
}
