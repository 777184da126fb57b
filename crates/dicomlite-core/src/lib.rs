//! # DICOM-lite Core
//!
//! 核心模块，提供基础数据结构、错误定义、时钟抽象和通用工具。

pub mod clock;
pub mod error;
pub mod models;
pub mod utils;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{DicomLiteError, ErrorKind, Result};
pub use models::*;
