use chrono::{DateTime, Utc};
use docdao::{
    bson::{self, oid::ObjectId},
    prelude::*,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub logins: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<bson::DateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<bson::DateTime>,
}

impl Account {
    pub fn new(email: &str, name: &str) -> Self {
        Self {
            email: email.to_string(),
            name: name.to_string(),
            ..Self::default()
        }
    }
}

impl Document for Account {
    fn collection_name() -> &'static str {
        "accounts"
    }

    fn name_singular() -> &'static str {
        "account"
    }

    fn name_plural() -> &'static str {
        "accounts"
    }

    fn indexes() -> Vec<IndexSpec> {
        vec![IndexSpec::ascending("email").unique()]
    }

    fn stamp_created(&mut self, at: DateTime<Utc>) {
        let at = bson::DateTime::from_millis(at.timestamp_millis());
        self.created_at = Some(at);
        self.updated_at = Some(at);
    }

    fn updated_at_field() -> Option<&'static str> {
        Some("updated_at")
    }
}
