//! # DICOM-lite 存储模块
//!
//! 负责上传文件（blob）在本地文件系统中的存放与删除。

pub mod storage;

pub use storage::*;
