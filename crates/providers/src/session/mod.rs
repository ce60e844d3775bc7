//! 会话管理模块

pub mod session_manager;

pub use session_manager::{
    SessionManager, DEVICE_SERVER_PATH, INSTALLATION_PATH, SESSION_SERVER_PATH,
};
