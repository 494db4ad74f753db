/// Face encoder backed by two ONNX Runtime sessions via `ort`.
///
/// Landmarks come from a YOLO-pose face model (boxes plus five keypoints,
/// letterboxed input, greedy NMS). Embeddings come from a 128-d recognition
/// network run on the aligned crop. Sessions are not reentrant, so each sits
/// behind its own `Mutex` and the encoder can be shared across threads.
use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;

use crate::alignment::aligned_face::AlignedFace;
use crate::detection::domain::detected_face::DetectedFace;
use crate::detection::domain::face_encoder::{EncoderError, FaceEncoder};
use crate::detection::domain::face_landmarks::{FaceLandmarks, Point};
use crate::shared::config::ModelConfig;
use crate::shared::constants::{
    DETECTOR_MODEL_NAME, DETECTOR_MODEL_URL, ENCODER_MODEL_NAME,
};
use crate::shared::embedding::Embedding;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

use super::model_resolver::{self, ProgressFn};

/// Fallback detector input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

const NMS_IOU_THRESH: f64 = 0.45;

/// 5 landmarks × (x, y, conf).
const NUM_KEYPOINT_VALUES: usize = 15;

/// Minimum keypoint confidence to treat a landmark as visible.
const KEYPOINT_CONF_THRESH: f64 = 0.5;

const EMBED_INPUT_SIZE: usize = 112;
const NORM_MEAN: f32 = 127.5;
const NORM_STD: f32 = 127.5;

type BoxError = Box<dyn std::error::Error>;

pub struct OnnxFaceEncoder {
    detector: Mutex<Session>,
    embedder: Mutex<Session>,
    input_size: u32,
    confidence: f64,
}

impl OnnxFaceEncoder {
    /// Load both models. Either file being unusable is fatal.
    pub fn new(detector_path: &Path, encoder_path: &Path, confidence: f64) -> Result<Self, EncoderError> {
        let detector = load_session(detector_path).map_err(|e| model_error(detector_path, e))?;
        let embedder = load_session(encoder_path).map_err(|e| model_error(encoder_path, e))?;
        let input_size = square_input_size(&detector).unwrap_or(DEFAULT_INPUT_SIZE);
        log::info!(
            "Loaded detector {} ({input_size}px) and encoder {}",
            detector_path.display(),
            encoder_path.display()
        );

        Ok(Self {
            detector: Mutex::new(detector),
            embedder: Mutex::new(embedder),
            input_size,
            confidence,
        })
    }

    /// Resolve both assets (configured path, cache, download) and load them.
    pub fn from_config(models: &ModelConfig, progress: Option<ProgressFn>) -> Result<Self, EncoderError> {
        let detector = model_resolver::resolve(
            DETECTOR_MODEL_NAME,
            Some(DETECTOR_MODEL_URL),
            models.detector.as_deref(),
            models.min_model_bytes,
            progress,
        )
        .map_err(|e| EncoderError::Model(Box::new(e)))?;
        let encoder = model_resolver::resolve(
            ENCODER_MODEL_NAME,
            None,
            models.encoder.as_deref(),
            models.min_model_bytes,
            None,
        )
        .map_err(|e| EncoderError::Model(Box::new(e)))?;
        Self::new(&detector, &encoder, models.detector_confidence)
    }

    fn run_detector(&self, frame: &Frame) -> Result<Vec<DetectedFace>, BoxError> {
        let Some((input, lb)) = letterbox(frame, self.input_size) else {
            return Ok(Vec::new());
        };
        let input_value = ort::value::Tensor::from_array(input)?;
        let mut session = self
            .detector
            .lock()
            .map_err(|e| format!("Lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("detector produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;

        let mut raw = parse_detections(data, tensor.shape(), self.confidence, &lb)?;
        Ok(nms(&mut raw, NMS_IOU_THRESH)
            .into_iter()
            .map(RawDetection::into_face)
            .collect())
    }

    fn run_embedder(&self, face: &AlignedFace) -> Result<Vec<f32>, BoxError> {
        let tensor = preprocess(face.data(), face.size(), face.size());
        let input_value = ort::value::Tensor::from_array(tensor)?;
        let mut session = self
            .embedder
            .lock()
            .map_err(|e| format!("Lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs![input_value])?;
        let array = outputs[0].try_extract_array::<f32>()?;
        let slice = array.as_slice().ok_or("Cannot get embedding slice")?;
        Ok(slice.to_vec())
    }
}

impl FaceEncoder for OnnxFaceEncoder {
    fn detect_landmarks(&self, frame: &Frame) -> Result<Vec<DetectedFace>, EncoderError> {
        self.run_detector(frame)
            .map_err(|e| EncoderError::Inference(e.to_string()))
    }

    fn compute_embedding(&self, face: &AlignedFace) -> Result<Embedding, EncoderError> {
        let values = self
            .run_embedder(face)
            .map_err(|e| EncoderError::Inference(e.to_string()))?;
        Ok(Embedding::new(values)?)
    }
}

fn load_session(path: &Path) -> Result<Session, BoxError> {
    let intra_threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let session = Session::builder()?
        .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
        .with_inter_threads(1)?
        .with_intra_threads(intra_threads)?
        .with_execution_providers(preferred_execution_providers())?
        .commit_from_file(path)?;
    Ok(session)
}

fn model_error(path: &Path, e: BoxError) -> EncoderError {
    EncoderError::Model(format!("{}: {e}", path.display()).into())
}

/// Platform accelerator when one is compiled in; CPU otherwise.
fn preferred_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}

/// Input height from an NCHW `[1, 3, H, W]` shape, if static.
fn square_input_size(session: &Session) -> Option<u32> {
    let input = session.inputs().first()?;
    if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
        if shape.len() >= 4 && shape[2] > 0 {
            return Some(shape[2] as u32);
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Detector pre/post-processing
// ---------------------------------------------------------------------------

/// Mapping from letterboxed model coordinates back to the frame.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Letterbox {
    scale: f64,
    pad_x: u32,
    pad_y: u32,
}

impl Letterbox {
    fn to_frame(&self, x: f64, y: f64) -> Point {
        (
            (x - self.pad_x as f64) / self.scale,
            (y - self.pad_y as f64) / self.scale,
        )
    }
}

/// Letterbox-resize to `target_size` × `target_size` NCHW float32, padded
/// with YOLO gray. `None` for a degenerate frame.
fn letterbox(frame: &Frame, target_size: u32) -> Option<(ndarray::Array4<f32>, Letterbox)> {
    if frame.is_degenerate() {
        return None;
    }
    let src = frame.as_ndarray()?; // [H, W, C]
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;
    let last_channel = frame.channels() as usize - 1;

    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c.min(last_channel)]] as f32 / 255.0;
            }
        }
    }

    Some((tensor, Letterbox { scale, pad_x, pad_y }))
}

#[derive(Clone, Debug)]
struct RawDetection {
    /// Position in the model output, i.e. scan order.
    order: usize,
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    confidence: f64,
    keypoints: [Point; 5],
}

impl RawDetection {
    fn into_face(self) -> DetectedFace {
        DetectedFace::new(
            Region::from_corners(self.x1, self.y1, self.x2, self.y2),
            FaceLandmarks::new(self.keypoints),
            self.confidence,
        )
    }
}

/// Decodes `[1, features, detections]` or `[1, detections, features]` rows of
/// `[cx, cy, w, h, conf, kp0_x, kp0_y, kp0_conf, ...]`.
fn parse_detections(
    data: &[f32],
    shape: &[usize],
    confidence: f64,
    letterbox: &Letterbox,
) -> Result<Vec<RawDetection>, String> {
    if shape.len() != 3 {
        return Err(format!("Unexpected detector output shape: {shape:?}"));
    }
    let transposed = shape[1] < shape[2];
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if data.len() < num_dets * num_feats {
        return Err(format!(
            "Detector output has {} values, shape {shape:?} needs {}",
            data.len(),
            num_dets * num_feats
        ));
    }
    let at = |det: usize, feat: usize| -> f64 {
        if transposed {
            data[feat * num_dets + det] as f64
        } else {
            data[det * num_feats + feat] as f64
        }
    };

    let mut dets = Vec::new();
    if num_feats < 5 {
        return Ok(dets);
    }
    for i in 0..num_dets {
        let conf = at(i, 4);
        if conf < confidence {
            continue;
        }
        let (cx, cy, w, h) = (at(i, 0), at(i, 1), at(i, 2), at(i, 3));
        let (x1, y1) = letterbox.to_frame(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.to_frame(cx + w / 2.0, cy + h / 2.0);

        // invisible keypoints stay at (0, 0)
        let mut keypoints = [(0.0, 0.0); 5];
        if num_feats >= 5 + NUM_KEYPOINT_VALUES {
            for (k, slot) in keypoints.iter_mut().enumerate() {
                if at(i, 5 + k * 3 + 2) >= KEYPOINT_CONF_THRESH {
                    *slot = letterbox.to_frame(at(i, 5 + k * 3), at(i, 5 + k * 3 + 1));
                }
            }
        }

        dets.push(RawDetection {
            order: i,
            x1,
            y1,
            x2,
            y2,
            confidence: conf,
            keypoints,
        });
    }
    Ok(dets)
}

/// Greedy NMS by descending confidence; survivors are returned in scan order.
fn nms(dets: &mut [RawDetection], iou_thresh: f64) -> Vec<RawDetection> {
    dets.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; dets.len()];

    for i in 0..dets.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(dets[i].clone());
        let a = Region::from_corners(dets[i].x1, dets[i].y1, dets[i].x2, dets[i].y2);
        for j in (i + 1)..dets.len() {
            if suppressed[j] {
                continue;
            }
            let b = Region::from_corners(dets[j].x1, dets[j].y1, dets[j].x2, dets[j].y2);
            if a.iou(&b) > iou_thresh {
                suppressed[j] = true;
            }
        }
    }
    keep.sort_by_key(|d| d.order);
    keep
}

// ---------------------------------------------------------------------------
// Embedder preprocessing
// ---------------------------------------------------------------------------

/// Resize an RGB crop to 112x112, normalize to [-1, 1], NCHW layout.
fn preprocess(rgb_data: &[u8], width: u32, height: u32) -> ndarray::Array4<f32> {
    let src_w = width as usize;
    let src_h = height as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, EMBED_INPUT_SIZE, EMBED_INPUT_SIZE));
    if src_w == 0 || src_h == 0 {
        return tensor;
    }

    for y in 0..EMBED_INPUT_SIZE {
        let src_y =
            (((y as f64 + 0.5) * src_h as f64 / EMBED_INPUT_SIZE as f64) as usize).min(src_h - 1);
        for x in 0..EMBED_INPUT_SIZE {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / EMBED_INPUT_SIZE as f64) as usize)
                .min(src_w - 1);
            let offset = (src_y * src_w + src_x) * 3;
            if offset + 2 < rgb_data.len() {
                for c in 0..3 {
                    tensor[[0, c, y, x]] = (rgb_data[offset + c] as f32 - NORM_MEAN) / NORM_STD;
                }
            }
        }
    }

    tensor
}
