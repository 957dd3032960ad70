//! # 摩托车租赁后台 · 图片流水线库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │              调用方（CLI / 后台表单宿主）                  │
//! │                                                          │
//! │   upload ── cleanup ── pending ── profile                │
//! └───────┬──────────────────────────────────────────────────┘
//!         ↕ Result<T, CommandError> → JSON
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕            图片流水线 (Rust)                      │
//! │                                                          │
//! │  ┌─ error ────── AppError (应用边界错误)                   │
//! │  │                                                       │
//! │  ├─ media ────── 补边 · 裁剪 · 防抖预览 · 压缩 · 上传       │
//! │  │   ├─ upload          上传协调 (先登记后删旧)            │
//! │  │   └─ orphan          待确认列表 + 孤儿清理              │
//! │  │                                                       │
//! │  ├─ store              键值存储 (内存 / JSON / SQLite)     │
//! │  ├─ settings           settings.json 读写                 │
//! │  └─ storage            数据目录 + 存储后端选择             │
//! └──────────────────────────────────────────────────────────┘
//!         ↕ HTTP (multipart / JSON)
//!   /api/upload-image-{bike,hero}   /api/delete-image
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 应用级错误 `AppError`，包装 `ImageError` 与 I/O、配置错误 |
//! | [`media`] | 图片调整会话、压缩、上传协调、孤儿清理 |
//! | [`store`] | `KeyValueStore` 接口及其三种实现 |
//! | [`settings`] | 设置文件加载（缺失/损坏回退默认）与保存 |
//! | [`storage`] | 数据目录解析与存储后端打开 |

pub mod error;
pub mod media;
pub mod settings;
pub mod storage;
pub mod store;
