use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::Error;

/// List leads.
///
/// Maps the query parameters of `GET /api/v4/leads`. Values are sent in the
/// query string exactly as given.
#[derive(Debug, Clone)]
pub struct GetLeadsRequest {
    /// Number of leads per page, defaults to 50.
    pub limit: u32,
    /// Page to return, the first page is 1.
    pub page: u32,
}

impl Default for GetLeadsRequest {
    fn default() -> Self {
        Self { limit: 50, page: 1 }
    }
}

impl GetLeadsRequest {
    pub(crate) fn params(&self) -> Vec<(String, String)> {
        vec![
            ("limit".to_string(), self.limit.to_string()),
            ("page".to_string(), self.page.to_string()),
        ]
    }
}

/// Create a contact.
///
/// `POST /api/v4/contacts` is a bulk endpoint: the body is a list even when
/// creating a single contact.
#[derive(Serialize, Debug, Clone)]
pub struct CreateContactRequest {
    pub name: String,
}

impl CreateContactRequest {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    pub(crate) fn body(&self) -> Value {
        json!([self])
    }
}

/// Envelope of `GET /leads`.
#[derive(Deserialize, Debug, Default)]
pub struct LeadsResponse {
    #[serde(rename = "_embedded", default)]
    pub embedded: Option<EmbeddedLeads>,
}

#[derive(Deserialize, Debug, Default)]
pub struct EmbeddedLeads {
    #[serde(default)]
    pub leads: Vec<Value>,
}

impl LeadsResponse {
    /// The embedded lead records. An absent collection means no leads.
    pub fn into_leads(self) -> Vec<Value> {
        self.embedded.map(|e| e.leads).unwrap_or_default()
    }
}

/// Envelope of `POST /contacts`.
#[derive(Deserialize, Debug, Default)]
pub struct ContactsResponse {
    #[serde(rename = "_embedded", default)]
    pub embedded: Option<EmbeddedContacts>,
}

#[derive(Deserialize, Debug, Default)]
pub struct EmbeddedContacts {
    #[serde(default)]
    pub contacts: Vec<Value>,
}

impl ContactsResponse {
    /// The first created contact, as amoCRM echoes it back.
    pub fn into_first_contact(self) -> Result<Value, Error> {
        self.embedded
            .map(|e| e.contacts)
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or(Error::UnexpectedPayload(
                "Contact creation returned empty payload",
            ))
    }
}
