use crate::traits::UserSession;

/// 从配置读取的固定登录用户。
#[derive(Clone, Debug, Default)]
pub struct StaticSession {
    user_name: Option<String>,
}

impl StaticSession {
    pub fn new(user_name: Option<String>) -> Self {
        let user_name = user_name.filter(|name| !name.trim().is_empty());
        Self { user_name }
    }
}

impl UserSession for StaticSession {
    fn logged_in_user_name(&self) -> Option<String> {
        self.user_name.clone()
    }
}
