use tract_onnx::prelude::*;

/// Input edge length expected by the classifier.
pub const IMAGE_SIZE: usize = 224;

/// Output labels of the chest X-ray classifier, in model output order.
/// The classifier emits one score per entry; this ordering is the contract
/// between the ONNX graph and every consumer of a result row.
pub const PATHOLOGIES: [&str; 18] = [
    "Atelectasis",
    "Consolidation",
    "Infiltration",
    "Pneumothorax",
    "Edema",
    "Emphysema",
    "Fibrosis",
    "Effusion",
    "Pneumonia",
    "Pleural_Thickening",
    "Cardiomegaly",
    "Nodule",
    "Mass",
    "Hernia",
    "Lung Lesion",
    "Fracture",
    "Lung Opacity",
    "Enlarged Cardiomediastinum",
];

/// Decode an uploaded image into the classifier's input plane: grayscale,
/// 224x224, max-val scaled from [0, 255] into [-1024, 1024] (the range the
/// model was trained on). Returns the flattened 224*224 pixel buffer.
pub fn preprocess(image_bytes: &[u8]) -> Result<Vec<f32>, PredictError> {
    let gray = image::load_from_memory(image_bytes)?.to_luma8();
    let resized = image::imageops::resize(
        &gray,
        IMAGE_SIZE as u32,
        IMAGE_SIZE as u32,
        image::imageops::FilterType::Triangle,
    );

    let plane = resized
        .pixels()
        .map(|p| (2.0 * (p.0[0] as f32 / 255.0) - 1.0) * 1024.0)
        .collect();

    Ok(plane)
}

/// Stack preprocessed planes into a single (k, 1, 224, 224) input tensor so
/// the whole batch goes through one forward pass.
pub fn stack_batch(planes: &[Vec<f32>]) -> Result<Tensor, PredictError> {
    let k = planes.len();
    let mut flat = Vec::with_capacity(k * IMAGE_SIZE * IMAGE_SIZE);
    for plane in planes {
        if plane.len() != IMAGE_SIZE * IMAGE_SIZE {
            return Err(PredictError::Shape(format!(
                "expected {} pixels per item, got {}",
                IMAGE_SIZE * IMAGE_SIZE,
                plane.len()
            )));
        }
        flat.extend_from_slice(plane);
    }

    Tensor::from_shape(&[k, 1, IMAGE_SIZE, IMAGE_SIZE], &flat)
        .map_err(|e| PredictError::Shape(e.to_string()))
}

/// Label -> score JSON object in the fixed label ordering.
pub fn scores_to_json(scores: &[f32]) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = PATHOLOGIES
        .iter()
        .zip(scores)
        .map(|(label, score)| (label.to_string(), serde_json::json!(score)))
        .collect();
    serde_json::Value::Object(map)
}

/// Argmax label for a score vector.
pub fn top_label(scores: &[f32]) -> Option<&'static str> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &s) in scores.iter().enumerate().take(PATHOLOGIES.len()) {
        match best {
            Some((_, b)) if s <= b => {}
            _ => best = Some((i, s)),
        }
    }
    best.map(|(i, _)| PATHOLOGIES[i])
}

/// A batch classifier: stacked input tensor in, one score vector per item
/// out, in input order. Implementations are synchronous; callers own the
/// deadline.
pub trait Predictor: Send + Sync {
    fn predict_batch(&self, batch: Tensor) -> Result<Vec<Vec<f32>>, PredictError>;
}

/// ONNX classifier executed with tract. One instance per worker process;
/// the plan is loaded once and reused for every batch.
pub struct OnnxPredictor {
    plan: TypedRunnableModel<TypedModel>,
}

impl OnnxPredictor {
    /// Load and optimize the ONNX graph. `device` is accepted for parity
    /// with the deployment surface; tract executes on CPU only.
    pub fn load(model_path: &str, device: &str) -> Result<Self, PredictError> {
        if device.eq_ignore_ascii_case("gpu") {
            tracing::warn!("INFERENCE_DEVICE=gpu requested but the ONNX engine is CPU-only; falling back to cpu");
        }

        let plan = tract_onnx::onnx()
            .model_for_path(model_path)
            .map_err(|e| PredictError::ModelLoad(e.to_string()))?
            .into_optimized()
            .map_err(|e| PredictError::ModelLoad(e.to_string()))?
            .into_runnable()
            .map_err(|e| PredictError::ModelLoad(e.to_string()))?;

        tracing::info!(model_path, "ONNX model loaded");
        Ok(Self { plan })
    }
}

impl Predictor for OnnxPredictor {
    fn predict_batch(&self, batch: Tensor) -> Result<Vec<Vec<f32>>, PredictError> {
        let outputs = self
            .plan
            .run(tvec!(batch.into()))
            .map_err(|e| PredictError::Inference(e.to_string()))?;

        let view = outputs[0]
            .to_array_view::<f32>()
            .map_err(|e| PredictError::Inference(e.to_string()))?;

        let mut results = Vec::new();
        for row in view.outer_iter() {
            let scores: Vec<f32> = row.iter().copied().collect();
            if scores.len() != PATHOLOGIES.len() {
                return Err(PredictError::Shape(format!(
                    "expected {} scores per item, got {}",
                    PATHOLOGIES.len(),
                    scores.len()
                )));
            }
            results.push(scores);
        }

        Ok(results)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("tensor shape error: {0}")]
    Shape(String),

    #[error("failed to load model: {0}")]
    ModelLoad(String),

    #[error("inference failed: {0}")]
    Inference(String),
}
