pub mod frame_quality_scorer;
