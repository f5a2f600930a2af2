//! 检测模块：技术检测核心逻辑
pub mod analyzer;
pub mod detector;

pub use self::detector::TechDetector;
