pub mod aligned_face;
pub mod face_aligner;
pub mod similarity_transform;
