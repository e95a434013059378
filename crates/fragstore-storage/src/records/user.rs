use serde::{Deserialize, Serialize};

use super::{Record, RecordKind, RecordStore};

/// Account record, keyed `user_<person_id>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_name: String,
    pub person_id: String,
    pub profile: String,
    pub password: String,
    pub email: String,
    pub profile_pic_url: String,
    pub account_time: i64,
    pub birth_date: i64,
    pub gender: String,
    pub last_edit: i64,
    pub phone_number: String,
}

impl Record for User {
    const KIND: RecordKind = RecordKind::User;

    fn id(&self) -> &str {
        &self.person_id
    }

    fn storage_key(id: &str) -> String {
        format!("user_{}", id)
    }
}

pub type UserStore = RecordStore<User>;
