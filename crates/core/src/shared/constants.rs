/// Length of every face embedding produced by the encoder.
pub const EMBEDDING_DIM: usize = 128;

pub const DETECTOR_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const DETECTOR_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

/// No public mirror is published for the 128-d encoder; it must be placed in
/// the model cache directory or configured explicitly.
pub const ENCODER_MODEL_NAME: &str = "face_encoder_128.onnx";

/// Model files smaller than this are treated as truncated downloads.
pub const MIN_MODEL_BYTES: u64 = 1_000_000;

/// Format of minted identity ids: `person_` + zero-padded sequence number.
pub const PERSON_ID_PREFIX: &str = "person_";
pub const PERSON_ID_WIDTH: usize = 4;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
