//! gradecast-engine — feedback propagation for diagram exercises.
//!
//! The algorithmic core behind semi-automatic grading: an online
//! clustering index over diagram elements, per-class feedback aggregation
//! with consensus building, coverage/confidence scoring, and an
//! active-learning selector, wired together by a per-exercise engine.

pub mod assessment;
pub mod controller;
pub mod engine;
pub mod error;
pub mod selector;
pub mod similarity;
