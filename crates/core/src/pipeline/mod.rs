pub mod face_recognition_use_case;
