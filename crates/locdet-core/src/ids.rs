//! Identifier generation and API-version extraction.
//!
//! All public identifiers share the `{prefix}_{YYYYMMDD_HHMMSS}_{8 hex}`
//! shape so they sort roughly by creation time and stay greppable in logs.

use chrono::Utc;

fn stamped_id(prefix: &str) -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}_{timestamp}_{}", &uuid[..8])
}

/// Generate a request ID: `req_{timestamp}_{random}`.
pub fn generate_request_id() -> String {
    stamped_id("req")
}

/// Generate a job ID: `job_{timestamp}_{random}`.
pub fn generate_job_id() -> String {
    stamped_id("job")
}

/// Generate a feedback ID: `fb_{timestamp}_{random}`.
pub fn generate_feedback_id() -> String {
    stamped_id("fb")
}

/// Extract the API version from a request path.
///
/// Path-based versioning: `/api/v1/jobs` → `v1`. Defaults to `v1` for
/// unversioned paths such as `/health`.
pub fn extract_api_version(path: &str) -> String {
    let rest = match path.strip_prefix("/api/v") {
        Some(rest) => rest,
        None => return "v1".to_string(),
    };
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() || !rest[digits.len()..].starts_with('/') {
        return "v1".to_string();
    }
    format!("v{digits}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_shape() {
        let id = generate_request_id();
        assert!(id.starts_with("req_"));
        // req_ + 8 date + _ + 6 time + _ + 8 hex
        assert_eq!(id.len(), "req_".len() + 8 + 1 + 6 + 1 + 8);
    }

    #[test]
    fn job_and_feedback_prefixes() {
        assert!(generate_job_id().starts_with("job_"));
        assert!(generate_feedback_id().starts_with("fb_"));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(generate_job_id(), generate_job_id());
    }

    #[test]
    fn api_version_from_path() {
        assert_eq!(extract_api_version("/api/v1/jobs"), "v1");
        assert_eq!(extract_api_version("/api/v2/jobs/job_1"), "v2");
        assert_eq!(extract_api_version("/health"), "v1");
        assert_eq!(extract_api_version("/api/vx/jobs"), "v1");
        assert_eq!(extract_api_version("/api/v1"), "v1");
    }
}
