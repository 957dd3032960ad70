//! # 图片流水线模块（media）
//!
//! ## 设计思路
//!
//! 后台车辆表单里的每张图片都经过同一条链路：
//! 选图 → 补白边 → 拖动/缩放裁剪（带防抖预览）→ Done 压缩 → 上传 → 登记待确认 → 保存后清理孤儿。
//! 每个阶段一个子模块，阶段之间只通过 `source.rs` 中的数据模型交互。
//!
//! - `commands`：入参适配与 `{code, stage, message}` 错误输出
//! - `service`：可注入状态（`MediaService`），持有配置快照与共享资源
//! - `adjuster`：单行调整会话，防抖预览与 Done
//! - `loader` / `padding` / `cropper` / `compress`：纯同步的 CPU 阶段
//! - `preview`：预览地址表与单槽防抖任务
//! - `upload` / `orphan`：端点、上传协调、待确认列表
//! - `config` / `error` / `source` / `cancel`：配置、错误、数据模型、取消标志
//!
//! ## 新同事快速上手
//!
//! ```text
//! CLI / 上层调用
//!    ↓
//! commands.rs（参数适配）
//!    ↓
//! service.rs（配置快照、会话创建、提交）
//!    ├─ padding.rs（解码 + 白色画布补边）
//!    ├─ adjuster.rs（平移/缩放 → 像素框 → 防抖预览）
//!    │    ├─ cropper.rs（像素框计算 + 提取）
//!    │    └─ compress.rs（降采样 + JPEG 编码）
//!    └─ upload.rs（上传 → 登记 → 删除旧图）
//!         └─ orphan.rs（待确认列表 + 孤儿清理）
//!    ↓
//! 返回 JSON 或 CommandError
//! ```
//!
//! ## 分层职责建议
//!
//! - 画布/边框问题先看 `padding.rs`
//! - 预览卡顿或闪烁先看 `adjuster.rs` 与 `preview.rs`
//! - 服务端残留图片先看 `orphan.rs` 的清理策略

pub mod commands;
mod adjuster;
mod cancel;
mod compress;
mod config;
mod cropper;
mod error;
mod loader;
mod orphan;
mod padding;
mod preview;
mod service;
mod source;
mod upload;

#[cfg(test)]
mod testing;

pub use adjuster::{AdjustSession, PreviewStats};
pub use cancel::CancelFlag;
pub use compress::{CompressOptions, compress, compress_bytes};
pub use config::{CompressionProfile, DELETE_IMAGE_PATH, PipelineConfig, UploadTarget};
pub use cropper::{clamp_zoom, compute_pixel_area, extract};
pub use error::ImageError;
pub use loader::load_file_as_data_url;
pub use orphan::{CleanupPolicy, CleanupReport, PENDING_UPLOADS_KEY, PendingUploads};
pub use padding::pad;
pub use preview::{LatestTaskSlot, ObjectUrl, ObjectUrlRegistry};
pub use service::{MediaService, SubmittedImage, SubmittedSummary};
pub use source::{CropRegion, EncodedImage, FinalAsset, PaddedImage, PixelArea, SourceImage, UploadRecord};
pub use upload::{HttpImageEndpoint, ImageEndpoint, UploadCoordinator};
