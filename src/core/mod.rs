//! 核心层：凭证生命周期
//!
//! 包含存储抽象、凭证签发与核销状态机。核心逻辑只依赖 `Store` 契约，
//! 不依赖任何具体驱动。

pub mod issuer;
pub mod redeemer;
pub mod store;
