//! 提取模块：从页面 HTML 中提取检测所需的信号
pub mod html_extractor;

pub use self::html_extractor::{HtmlExtractor, PageSignals};
