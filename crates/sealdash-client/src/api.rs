//! Typed dashboard endpoints over the encrypted transport.
//!
//! Every call, reads included, goes through [`EncryptedTransport`]; there is
//! no plaintext path.

use std::fmt::Write;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::transport::EncryptedTransport;

// =============================================================================
// Schemas
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
    /// Item count or page count, depending on the endpoint.
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub max_devices: Option<u32>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Unpaged product catalog used to fill pickers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCatalog {
    pub products: Vec<Product>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductList {
    pub products: Vec<Product>,
    #[serde(default)]
    pub pagination: Pagination,
}

/// Body of product create and update calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInput {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub max_devices: u32,
}

/// Per-product license counters. Sums are null for products without licenses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductLicenseStats {
    #[serde(default)]
    pub total_licenses: u64,
    #[serde(default)]
    pub active_licenses: Option<u64>,
    #[serde(default)]
    pub expired_licenses: Option<u64>,
    #[serde(default)]
    pub revoked_licenses: Option<u64>,
    #[serde(default)]
    pub avg_usage: Option<f64>,
    #[serde(default)]
    pub max_usage: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductStats {
    pub product: Product,
    #[serde(default)]
    pub license_stats: ProductLicenseStats,
    #[serde(default)]
    pub estimated_revenue: f64,
    #[serde(default)]
    pub recent_validations: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    #[serde(default)]
    pub id: Option<i64>,
    pub key: String,
    #[serde(default)]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub usage_count: Option<u64>,
    #[serde(default)]
    pub credit_number: Option<String>,
    #[serde(default)]
    pub machine_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseList {
    pub licenses: Vec<License>,
    #[serde(default)]
    pub pagination: Pagination,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseRequest {
    pub product_id: i64,
    pub user_id: String,
    pub expires_days: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LicenseStats {
    pub total_licenses: u64,
    pub active_licenses: u64,
    pub expired_licenses: u64,
    pub revoked_licenses: u64,
    #[serde(default)]
    pub avg_usage_per_license: f64,
    #[serde(default)]
    pub max_usage: u64,
    #[serde(default)]
    pub recent_validations: u64,
}

/// A product setting row. Columns beyond the id are kept as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setting {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Body of setting create calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingInput {
    pub product_id: i64,
    pub number_of_credits: i64,
    pub license_duration_hours: i64,
}

/// Body of setting update calls; the product comes from the path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingUpdate {
    pub number_of_credits: i64,
    pub license_duration_hours: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingList {
    pub settings: Vec<Setting>,
    #[serde(default)]
    pub pagination: Pagination,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: Option<i64>,
    pub username: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserList {
    pub users: Vec<User>,
    #[serde(default)]
    pub pagination: Pagination,
}

/// Outcome of a state-changing call.
///
/// Product and license endpoints answer `{success, message?, license_key?}`;
/// user endpoints answer `{result: "success"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_key: Option<String>,
}

impl MutationResult {
    pub fn is_success(&self) -> bool {
        self.success.unwrap_or(false) || self.result.as_deref() == Some("success")
    }
}

/// Paging and search parameters for list endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub query: Option<String>,
}

impl ListQuery {
    pub const fn page(page: u32) -> Self {
        Self {
            page: Some(page),
            per_page: None,
            query: None,
        }
    }

    /// `?page=..&per_page=..&query=..`, or empty when nothing is set.
    pub fn to_query_string(&self) -> String {
        let mut out = String::new();
        let mut push = |key: &str, value: &str| {
            out.push(if out.is_empty() { '?' } else { '&' });
            let _ = write!(out, "{key}={}", encode_component(value));
        };
        if let Some(page) = self.page {
            push("page", &page.to_string());
        }
        if let Some(per_page) = self.per_page {
            push("per_page", &per_page.to_string());
        }
        if let Some(query) = self.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            push("query", query);
        }
        out
    }
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
pub(crate) fn encode_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}

// =============================================================================
// Client
// =============================================================================

/// Dashboard API client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DashboardApi {
    transport: EncryptedTransport,
}

impl DashboardApi {
    pub const fn new(transport: EncryptedTransport) -> Self {
        Self { transport }
    }

    pub const fn transport(&self) -> &EncryptedTransport {
        &self.transport
    }

    /// Raw encrypted call returning the decrypted JSON.
    pub async fn call(&self, method: Method, endpoint: &str, body: Option<&Value>) -> Result<Value> {
        self.transport
            .request_encrypted(method, endpoint, body)
            .await
    }

    // -------------------------------------------------------------------------
    // Licenses
    // -------------------------------------------------------------------------

    pub async fn license_stats(&self) -> Result<LicenseStats> {
        self.transport
            .fetch_encrypted(Method::GET, "/api/licenses/stats")
            .await
    }

    pub async fn list_licenses(&self, query: &ListQuery) -> Result<LicenseList> {
        let endpoint = format!("/api/licenses{}", query.to_query_string());
        self.transport.fetch_encrypted(Method::GET, &endpoint).await
    }

    pub async fn create_license(&self, request: &LicenseRequest) -> Result<MutationResult> {
        self.transport.send_encrypted("/api/licenses", request).await
    }

    pub async fn revoke_license(&self, key: &str) -> Result<MutationResult> {
        let endpoint = format!("/api/licenses/{}/revoke", encode_component(key));
        self.transport.fetch_encrypted(Method::POST, &endpoint).await
    }

    pub async fn get_license(&self, key: &str) -> Result<License> {
        let endpoint = format!("/api/licenses/{}", encode_component(key));
        self.transport.fetch_encrypted(Method::GET, &endpoint).await
    }

    pub async fn delete_license(&self, key: &str) -> Result<MutationResult> {
        let endpoint = format!("/api/licenses/{}", encode_component(key));
        self.transport
            .fetch_encrypted(Method::DELETE, &endpoint)
            .await
    }

    // -------------------------------------------------------------------------
    // Products
    // -------------------------------------------------------------------------

    pub async fn list_products(&self, page: u32) -> Result<ProductList> {
        let endpoint = format!("/api/products{}", ListQuery::page(page).to_query_string());
        self.transport.fetch_encrypted(Method::GET, &endpoint).await
    }

    /// Every product, without paging.
    pub async fn all_products(&self) -> Result<ProductCatalog> {
        self.transport
            .fetch_encrypted(Method::GET, "/api/products/all")
            .await
    }

    pub async fn create_product(&self, product: &ProductInput) -> Result<MutationResult> {
        self.transport.send_encrypted("/api/products", product).await
    }

    pub async fn update_product(&self, id: i64, product: &ProductInput) -> Result<MutationResult> {
        self.transport
            .request_encrypted(Method::PUT, &format!("/api/products/{id}"), Some(product))
            .await
    }

    pub async fn delete_product(&self, id: i64) -> Result<MutationResult> {
        self.transport
            .fetch_encrypted(Method::DELETE, &format!("/api/products/{id}"))
            .await
    }

    pub async fn product_stats(&self, id: i64) -> Result<ProductStats> {
        self.transport
            .fetch_encrypted(Method::GET, &format!("/api/products/{id}/stats"))
            .await
    }

    // -------------------------------------------------------------------------
    // Settings and users
    // -------------------------------------------------------------------------

    pub async fn list_settings(&self, query: &ListQuery) -> Result<SettingList> {
        let endpoint = format!("/api/settings{}", query.to_query_string());
        self.transport.fetch_encrypted(Method::GET, &endpoint).await
    }

    pub async fn create_setting(&self, setting: &SettingInput) -> Result<MutationResult> {
        self.transport.send_encrypted("/api/settings", setting).await
    }

    /// Settings are keyed by product id.
    pub async fn get_setting(&self, product_id: i64) -> Result<Setting> {
        self.transport
            .fetch_encrypted(Method::GET, &format!("/api/settings/{product_id}"))
            .await
    }

    pub async fn update_setting(
        &self,
        product_id: i64,
        update: &SettingUpdate,
    ) -> Result<MutationResult> {
        self.transport
            .request_encrypted(
                Method::PUT,
                &format!("/api/settings/{product_id}"),
                Some(update),
            )
            .await
    }

    pub async fn delete_setting(&self, product_id: i64) -> Result<MutationResult> {
        self.transport
            .fetch_encrypted(Method::DELETE, &format!("/api/settings/{product_id}"))
            .await
    }

    pub async fn list_users(&self, query: &ListQuery) -> Result<UserList> {
        let endpoint = format!("/api/auth/users{}", query.to_query_string());
        self.transport.fetch_encrypted(Method::GET, &endpoint).await
    }

    pub async fn set_user_role(&self, username: &str, role: &str) -> Result<MutationResult> {
        let endpoint = format!(
            "/api/auth/users/{}/{}",
            encode_component(username),
            encode_component(role)
        );
        self.transport.fetch_encrypted(Method::PUT, &endpoint).await
    }

    pub async fn delete_user(&self, username: &str) -> Result<MutationResult> {
        let endpoint = format!("/api/auth/users/{}", encode_component(username));
        self.transport
            .fetch_encrypted(Method::DELETE, &endpoint)
            .await
    }
}
