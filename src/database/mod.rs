// 数据库模块
// 包含实体定义和存储实现（Postgres / 内存）

pub mod models; // 数据库实体定义
pub mod operations; // 存储操作实现

// 重新导出常用类型，方便其他模块使用
pub use models::location::{LocationRecord, NewLocation};
pub use models::user::{NewUser, TrackingAction, TrackingChange, UserRecord, UserWithLocation};
pub use operations::{LocationStore, StoreError};
