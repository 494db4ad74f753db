pub mod detected_face;
pub mod face_encoder;
pub mod face_landmarks;
