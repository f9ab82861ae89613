//! Signed browser upload forms.

use serde::{Deserialize, Serialize};

/// One hidden field of a signed POST form.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    pub value: String,
}

/// Everything a browser needs to POST a file straight to the bucket:
/// the form action URL and the fields that must accompany the file.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UploadForm {
    pub url: String,
    pub fields: Vec<FormField>,
}

#[cfg(test)]
impl UploadForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}
