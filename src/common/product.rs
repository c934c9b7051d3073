use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub image_url: String,
    pub title: String,
    pub subtitle: String,
}

impl Product {
    pub fn new(
        image_url: impl Into<String>,
        title: impl Into<String>,
        subtitle: impl Into<String>,
    ) -> Self {
        Self {
            image_url: image_url.into(),
            title: title.into(),
            subtitle: subtitle.into(),
        }
    }
}
