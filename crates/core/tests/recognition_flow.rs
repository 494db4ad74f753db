use std::sync::Arc;

use facematch_core::alignment::aligned_face::AlignedFace;
use facematch_core::detection::domain::detected_face::DetectedFace;
use facematch_core::detection::domain::face_encoder::{EncoderError, FaceEncoder};
use facematch_core::detection::domain::face_landmarks::FaceLandmarks;
use facematch_core::identity::infrastructure::json_identity_file::open_store;
use facematch_core::identity::infrastructure::shared_identity_store::SharedIdentityStore;
use facematch_core::pipeline::face_recognition_use_case::FaceRecognitionUseCase;
use facematch_core::shared::config::RecognitionConfig;
use facematch_core::shared::constants::EMBEDDING_DIM;
use facematch_core::shared::embedding::Embedding;
use facematch_core::shared::frame::Frame;
use facematch_core::shared::region::Region;

/// One frontal face in the middle of every frame; the embedding tracks
/// the brightness of the aligned crop.
struct CenteredFaceEncoder;

impl FaceEncoder for CenteredFaceEncoder {
    fn detect_landmarks(&self, frame: &Frame) -> Result<Vec<DetectedFace>, EncoderError> {
        let size = frame.width().min(frame.height()) as f64 / 2.0;
        let (x, y) = (size / 2.0, size / 2.0);
        let at = |fx: f64, fy: f64| (x + fx * size, y + fy * size);
        let landmarks = FaceLandmarks::new([
            at(0.34, 0.46),
            at(0.66, 0.46),
            at(0.50, 0.64),
            at(0.37, 0.82),
            at(0.63, 0.82),
        ]);
        Ok(vec![DetectedFace::new(Region::new(x, y, size, size), landmarks, 0.95)])
    }

    fn compute_embedding(&self, face: &AlignedFace) -> Result<Embedding, EncoderError> {
        let data = face.data();
        let mean = data.iter().map(|&v| v as f64).sum::<f64>() / data.len().max(1) as f64;
        Ok(Embedding::new(vec![(mean / 255.0) as f32; EMBEDDING_DIM])?)
    }
}

fn checkerboard(index: usize, base: u8) -> Frame {
    let (w, h) = (128u32, 128u32);
    let mut data = Vec::with_capacity((w * h * 3) as usize);
    for y in 0..h {
        for x in 0..w {
            let v = if (x + y) % 2 == 0 {
                base.saturating_add(40)
            } else {
                base.saturating_sub(40)
            };
            data.extend_from_slice(&[v, v, v]);
        }
    }
    Frame::new(data, w, h, 3, index)
}

fn burst(base: u8) -> Vec<Frame> {
    (0..5).map(|i| checkerboard(i, base)).collect()
}

fn use_case(config: &RecognitionConfig) -> FaceRecognitionUseCase {
    let store = SharedIdentityStore::new(open_store(config.store.clone()));
    FaceRecognitionUseCase::new(Arc::new(CenteredFaceEncoder), store, config)
}

fn config_in(dir: &tempfile::TempDir) -> RecognitionConfig {
    let mut config = RecognitionConfig::default();
    config.store.path = dir.path().join("store").join("identities.json");
    config
}

#[test]
fn test_identities_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);

    let (alice, bob) = {
        let uc = use_case(&config);
        let alice = uc.learn(&burst(128), None).unwrap().person_id.unwrap();
        let bob = uc.learn(&burst(90), None).unwrap().person_id.unwrap();
        let again = uc.learn(&burst(128), None).unwrap().person_id.unwrap();
        assert_eq!(alice, again);
        (alice, bob)
    };
    assert!(config.store.path.exists());

    let uc = use_case(&config);
    let summary = uc.store().summary().unwrap();
    assert_eq!(summary, vec![(alice, 2), (bob, 1)]);

    assert_eq!(uc.recognize(&burst(128), None).unwrap().person_id, Some(alice));
    assert_eq!(uc.recognize(&burst(90), None).unwrap().person_id, Some(bob));

    let carol = uc.learn(&burst(200), None).unwrap().person_id.unwrap();
    assert_eq!(carol.to_string(), "person_0003");
}

#[test]
fn test_corrupt_store_starts_empty_and_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    std::fs::create_dir_all(config.store.path.parent().unwrap()).unwrap();
    std::fs::write(&config.store.path, "{ not json").unwrap();

    let uc = use_case(&config);
    assert!(uc.store().summary().unwrap().is_empty());
    assert_eq!(uc.recognize(&burst(128), None).unwrap().person_id, None);

    let id = uc.learn(&burst(128), None).unwrap().person_id.unwrap();
    assert_eq!(id.to_string(), "person_0001");

    let reopened = use_case(&config);
    assert_eq!(reopened.store().summary().unwrap(), vec![(id, 1)]);
}

#[test]
fn test_recognition_reports_frames_used() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let uc = use_case(&config);

    let mut frames = burst(128);
    frames.push(Frame::new(vec![128; 128 * 128 * 3], 128, 128, 3, 5));

    let outcome = uc.learn(&frames, None).unwrap();
    assert_eq!(outcome.frames_total, 6);
    assert_eq!(outcome.frames_used, 5);
    assert!(outcome.person_id.is_some());
}
