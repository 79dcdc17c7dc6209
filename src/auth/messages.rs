//! User-facing messages returned in `AuthOutcome`.

pub const LOGIN_SUCCEEDED: &str = "登入成功";
pub const INVALID_CREDENTIALS: &str = "電子郵件或密碼錯誤";
pub const ALREADY_SIGNED_IN: &str = "已經登入，請先登出";
pub const REGISTER_SUCCEEDED: &str = "註冊成功";
pub const EMAIL_TAKEN: &str = "此電子郵件已被註冊";
pub const LOGGED_OUT: &str = "已登出";
pub const PROFILE_UPDATED: &str = "個人資料已更新";
pub const NOT_SIGNED_IN: &str = "使用者未登入";
pub const PASSWORD_CHANGED: &str = "密碼已更新";
pub const PASSWORD_CHANGE_FAILED: &str = "密碼更新失敗";
pub const SESSION_REFRESHED: &str = "登入狀態已更新";
pub const SESSION_EXPIRED: &str = "登入已過期，請重新登入";
pub const STORAGE_FAILED: &str = "無法儲存登入狀態";
pub const NETWORK_ERROR: &str = "網路錯誤，請稍後再試";
pub const REQUEST_FAILED: &str = "操作失敗，請稍後再試";
