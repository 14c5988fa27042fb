// 业务规则层：在 LocationStore 之上实现注册、位置写入、查询和管理员追踪控制

pub mod ingestion;
pub mod registry;
pub mod tracking;
pub mod view;

pub use ingestion::{Ingested, LocationSubmission, submit_location};
pub use registry::{RegisterUser, deactivate_all, deactivate_user, register_user};
pub use tracking::{
    start_all_tracking, start_tracking, stop_all_tracking, stop_tracking, tracking_status,
};
pub use view::{LocationView, UserView, get_user, list_active_users};
